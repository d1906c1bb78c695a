//! `new_encoder` / `encode_frame` / `encoder_output` / `free_encoder`.

use std::ffi::c_void;
use std::ptr;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info};

use camera_capture::{CaptureTimestamp, FrameBuffer};
use camera_encoder::{EncodedPayload, Encoder, EncoderConfig};
use camera_ipc::ConfigError;

use crate::error::{FfiError, FfiResult};
use crate::handle::HandleRegistry;
use crate::{guarded, init_logging, report};

/// An encoder plus the output of its last successful call.
pub(crate) struct EncoderEntry {
    encoder: Encoder,
    started: Instant,
    frame_size: usize,
    next_sequence: u64,
    last_output: Option<Bytes>,
}

static ENCODERS: HandleRegistry<EncoderEntry> = HandleRegistry::new();

/// Create an encoder for `width` x `height` BGR frames.
///
/// Returns NULL for non-positive dimensions or if the codec fails to start.
#[no_mangle]
pub extern "C" fn new_encoder(width: i32, height: i32) -> *mut c_void {
    init_logging();
    let result = guarded("new_encoder", || create(width, height));
    result.unwrap_or_else(|e| {
        report("new_encoder", &e);
        ptr::null_mut()
    })
}

/// Encode one frame. Returns 0 on success, or a negative status:
/// -1 bad handle, -2 dimension mismatch, -3 invalid input, -4 codec failure.
///
/// # Safety
///
/// `frame` must be null or valid for reads of width * height * 3 bytes.
#[no_mangle]
pub unsafe extern "C" fn encode_frame(encoder: *mut c_void, frame: *const c_void) -> i32 {
    match guarded("encode_frame", || encode(encoder, frame as *const u8)) {
        Ok(_) => 0,
        Err(e) => {
            report("encode_frame", &e);
            e.status_code()
        }
    }
}

/// Bytes produced by the last successful `encode_frame`. Writes the length
/// to `out_len` (when not null) and returns NULL if there is no output yet.
/// The pointer stays valid until the next `encode_frame` or `free_encoder`
/// on this handle.
///
/// # Safety
///
/// `out_len` must be null or valid for a write of one `size_t`.
#[no_mangle]
pub unsafe extern "C" fn encoder_output(encoder: *mut c_void, out_len: *mut usize) -> *const u8 {
    let output = guarded("encoder_output", || last_output(encoder));
    let (data, len) = match output {
        Ok(Some(bytes)) => (bytes.as_ptr(), bytes.len()),
        Ok(None) => (ptr::null(), 0),
        Err(e) => {
            report("encoder_output", &e);
            (ptr::null(), 0)
        }
    };

    if !out_len.is_null() {
        *out_len = len;
    }
    data
}

/// Destroy an encoder. The handle and any output pointer are invalid
/// afterwards.
#[no_mangle]
pub extern "C" fn free_encoder(encoder: *mut c_void) {
    let result = guarded("free_encoder", || {
        if encoder.is_null() {
            return Err(FfiError::NullHandle);
        }
        let entry = ENCODERS.remove(encoder)?;
        debug!(
            handle = encoder as usize,
            frames = entry.encoder.frames_encoded(),
            "Encoder destroyed"
        );
        Ok(())
    });
    if let Err(e) = result {
        report("free_encoder", &e);
    }
}

fn create(width: i32, height: i32) -> FfiResult<*mut c_void> {
    let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
        return Err(ConfigError::InvalidDimensions {
            width: width.max(0) as u32,
            height: height.max(0) as u32,
        }
        .into());
    };

    let config = EncoderConfig {
        width: w,
        height: h,
        ..Default::default()
    };
    let frame_size = config
        .format
        .buffer_size(w, h)
        .ok_or(ConfigError::InvalidDimensions {
            width: w,
            height: h,
        })?;
    let encoder = Encoder::new(&config)?;

    let handle = ENCODERS.insert(EncoderEntry {
        encoder,
        started: Instant::now(),
        frame_size,
        next_sequence: 0,
        last_output: None,
    });
    info!(handle = handle as usize, width = w, height = h, "Encoder created");
    Ok(handle)
}

pub(crate) unsafe fn encode(encoder: *mut c_void, frame: *const u8) -> FfiResult<EncodedPayload> {
    if encoder.is_null() {
        return Err(FfiError::NullHandle);
    }
    if frame.is_null() {
        return Err(FfiError::NullArgument("frame"));
    }

    ENCODERS.with(encoder, |entry| -> FfiResult<EncodedPayload> {
        // The caller guarantees `frame` covers one full frame.
        let pixels = std::slice::from_raw_parts(frame, entry.frame_size);
        let (width, height) = entry.encoder.dimensions();

        let buffer = FrameBuffer::copy_from_slice(
            pixels,
            width,
            height,
            entry.encoder.format(),
            CaptureTimestamp::now(entry.started),
        )?
        .with_sequence(entry.next_sequence);
        entry.next_sequence += 1;

        let payload = entry.encoder.encode(&buffer)?;
        entry.last_output = Some(payload.data.clone());
        Ok(payload)
    })?
}

fn last_output(encoder: *mut c_void) -> FfiResult<Option<Bytes>> {
    if encoder.is_null() {
        return Err(FfiError::NullHandle);
    }
    Ok(ENCODERS.with(encoder, |entry| entry.last_output.clone())?)
}
