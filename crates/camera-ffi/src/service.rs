//! `new_service` / `send_frame` / `free_service`.

use std::ffi::{c_char, c_void, CStr};
use std::ptr;
use std::time::Instant;

use tracing::{debug, info};

use camera_capture::{CaptureTimestamp, FrameBuffer};
use camera_pipeline::{ConfigError, PipelineConfig, PipelineService, ShutdownReport, SubmitOutcome};

use crate::error::{FfiError, FfiResult};
use crate::handle::HandleRegistry;
use crate::{guarded, init_logging, report};

/// A service plus the clock its frame timestamps are relative to.
pub(crate) struct ServiceEntry {
    service: PipelineService,
    started: Instant,
}

static SERVICES: HandleRegistry<ServiceEntry> = HandleRegistry::new();

/// Create a pipeline for `width` x `height` BGR frames sent to `endpoint`.
///
/// Returns NULL on failure; the reason is logged.
///
/// # Safety
///
/// `endpoint` must be null or point to a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn new_service(width: u32, height: u32, endpoint: *const u8) -> *mut c_void {
    init_logging();
    let result = guarded("new_service", || {
        let endpoint = c_str(endpoint, "endpoint")?;
        create(PipelineConfig::new(width, height, endpoint))
    });
    handle_or_null("new_service", result)
}

/// Create a pipeline from a JSON-encoded configuration.
///
/// # Safety
///
/// `config_json` must be null or point to a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn new_service_with_config(config_json: *const u8) -> *mut c_void {
    init_logging();
    let result = guarded("new_service_with_config", || {
        let json = c_str(config_json, "config")?;
        let config: PipelineConfig = serde_json::from_str(json)?;
        create(config)
    });
    handle_or_null("new_service_with_config", result)
}

/// Queue one frame. `data` must hold one full frame of the configured size.
/// Never blocks on encoding.
///
/// # Safety
///
/// `data` must be null or valid for reads of width * height * bytes-per-pixel
/// bytes.
#[no_mangle]
pub unsafe extern "C" fn send_frame(svc: *mut c_void, data: *const u8) {
    if let Err(e) = guarded("send_frame", || submit(svc, data)) {
        report("send_frame", &e);
    }
}

/// Destroy a pipeline. Returns once the encoder and transport are released
/// (or the shutdown timeout passed). The handle is invalid afterwards;
/// unknown and already freed handles are reported.
#[no_mangle]
pub extern "C" fn free_service(svc: *mut c_void) {
    if let Err(e) = guarded("free_service", || destroy(svc)) {
        report("free_service", &e);
    }
}

fn create(config: PipelineConfig) -> FfiResult<*mut c_void> {
    let service = PipelineService::create(config)?;
    let handle = SERVICES.insert(ServiceEntry {
        service,
        started: Instant::now(),
    });
    info!(handle = handle as usize, "Service created");
    Ok(handle)
}

pub(crate) unsafe fn submit(svc: *mut c_void, data: *const u8) -> FfiResult<SubmitOutcome> {
    if svc.is_null() {
        return Err(FfiError::NullHandle);
    }
    if data.is_null() {
        return Err(FfiError::NullArgument("frame data"));
    }

    SERVICES.with(svc, |entry| -> FfiResult<SubmitOutcome> {
        let config = entry.service.config();
        let size = config.frame_size().ok_or(ConfigError::InvalidDimensions {
            width: config.width,
            height: config.height,
        })?;
        // The caller guarantees `data` covers one full frame.
        let pixels = std::slice::from_raw_parts(data, size);

        let frame = FrameBuffer::copy_from_slice(
            pixels,
            config.width,
            config.height,
            config.pixel_format,
            CaptureTimestamp::now(entry.started),
        )?;
        Ok(entry.service.submit_frame(frame)?)
    })?
}

pub(crate) fn destroy(svc: *mut c_void) -> FfiResult<ShutdownReport> {
    if svc.is_null() {
        return Err(FfiError::NullHandle);
    }

    let entry = SERVICES.remove(svc)?;
    let report = entry.service.destroy();
    debug!(
        handle = svc as usize,
        discarded = report.discarded_frames,
        timed_out = report.timed_out,
        "Service destroyed"
    );
    Ok(report)
}

/// Borrow a NUL-terminated string argument.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn c_str<'a>(ptr: *const u8, name: &'static str) -> FfiResult<&'a str> {
    if ptr.is_null() {
        return Err(FfiError::NullArgument(name));
    }
    Ok(CStr::from_ptr(ptr as *const c_char).to_str()?)
}

fn handle_or_null(op: &'static str, result: FfiResult<*mut c_void>) -> *mut c_void {
    result.unwrap_or_else(|e| {
        report(op, &e);
        ptr::null_mut()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_pipeline::ContractViolation;

    const ENDPOINT: &[u8] = b"udp://127.0.0.1:9\0";

    fn frame_bytes(width: u32, height: u32) -> Vec<u8> {
        vec![0x40; (width * height * 3) as usize]
    }

    #[test]
    fn test_service_lifecycle() {
        let svc = unsafe { new_service(32, 24, ENDPOINT.as_ptr()) };
        assert!(!svc.is_null());

        let data = frame_bytes(32, 24);
        let outcome = unsafe { submit(svc, data.as_ptr()) }.unwrap();
        assert_eq!(outcome.sequence, 0);
        unsafe { send_frame(svc, data.as_ptr()) };

        let report = destroy(svc).unwrap();
        assert!(!report.timed_out);
        assert_eq!(report.metrics.frames_submitted, 2);
    }

    #[test]
    fn test_double_free_is_reported() {
        let svc = unsafe { new_service(16, 16, ENDPOINT.as_ptr()) };
        assert!(!svc.is_null());

        free_service(svc);
        assert!(matches!(
            destroy(svc),
            Err(FfiError::Contract(ContractViolation::DoubleDestroy))
        ));
        // Must not crash.
        free_service(svc);
    }

    #[test]
    fn test_send_after_free_is_reported() {
        let svc = unsafe { new_service(16, 16, ENDPOINT.as_ptr()) };
        free_service(svc);

        let data = frame_bytes(16, 16);
        let err = unsafe { submit(svc, data.as_ptr()) }.unwrap_err();
        assert!(matches!(
            err,
            FfiError::Contract(ContractViolation::UseAfterDestroy)
        ));
        assert_eq!(err.status_code(), crate::STATUS_BAD_HANDLE);
    }

    #[test]
    fn test_null_arguments() {
        assert!(unsafe { new_service(16, 16, ptr::null()) }.is_null());
        assert!(matches!(destroy(ptr::null_mut()), Err(FfiError::NullHandle)));
        unsafe { send_frame(ptr::null_mut(), ptr::null()) };
    }

    #[test]
    fn test_invalid_service_arguments_return_null() {
        assert!(unsafe { new_service(0, 480, ENDPOINT.as_ptr()) }.is_null());
        assert!(unsafe { new_service(640, 480, b"not an endpoint\0".as_ptr()) }.is_null());
    }

    #[test]
    fn test_new_service_with_config() {
        let json = b"{\"width\":8,\"height\":8,\"endpoint\":\"udp://127.0.0.1:9\",\"queue_capacity\":2,\"pixel_format\":\"rgba32\",\"codec\":\"raw\"}\0";
        let svc = unsafe { new_service_with_config(json.as_ptr()) };
        assert!(!svc.is_null());

        let data = vec![0u8; 8 * 8 * 4];
        unsafe { submit(svc, data.as_ptr()) }.unwrap();
        destroy(svc).unwrap();

        assert!(unsafe { new_service_with_config(b"{\"width\":8}\0".as_ptr()) }.is_null());
    }
}
