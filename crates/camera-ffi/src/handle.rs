//! Opaque handles for objects owned on the Rust side of the C boundary.

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{const_mutex, Mutex};

use camera_pipeline::ContractViolation;

type Slot<T> = Arc<Mutex<Option<T>>>;

/// Maps handle ids to live objects.
///
/// Ids increase monotonically and are never reused, so an id below the
/// next one that is missing from the map was released earlier. That is what
/// lets double-free and use-after-free be reported instead of corrupting
/// memory.
pub struct HandleRegistry<T> {
    entries: Mutex<BTreeMap<usize, Slot<T>>>,
    next_id: AtomicUsize,
}

impl<T> HandleRegistry<T> {
    pub const fn new() -> Self {
        Self {
            entries: const_mutex(BTreeMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Take ownership of `value` and return its handle.
    pub fn insert(&self, value: T) -> *mut c_void {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .insert(id, Arc::new(Mutex::new(Some(value))));
        id as *mut c_void
    }

    /// Run `f` on the object behind `handle`. Calls on the same handle are
    /// serialized.
    pub fn with<R>(
        &self,
        handle: *mut c_void,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, ContractViolation> {
        let id = handle as usize;
        let slot = self.entries.lock().get(&id).cloned();

        let Some(slot) = slot else {
            return Err(self.missing(id, ContractViolation::UseAfterDestroy));
        };

        let mut guard = slot.lock();
        match guard.as_mut() {
            Some(value) => Ok(f(value)),
            None => Err(ContractViolation::UseAfterDestroy),
        }
    }

    /// Release `handle` and hand the object back. Waits for a call in
    /// progress on the same handle to finish.
    pub fn remove(&self, handle: *mut c_void) -> Result<T, ContractViolation> {
        let id = handle as usize;
        let slot = self.entries.lock().remove(&id);

        let Some(slot) = slot else {
            return Err(self.missing(id, ContractViolation::DoubleDestroy));
        };

        let value = slot.lock().take();
        value.ok_or(ContractViolation::DoubleDestroy)
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn missing(&self, id: usize, released: ContractViolation) -> ContractViolation {
        if id != 0 && id < self.next_id.load(Ordering::Relaxed) {
            released
        } else {
            ContractViolation::UnknownHandle(id)
        }
    }
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_with_remove() {
        let registry = HandleRegistry::new();
        let handle = registry.insert(41u32);

        assert_eq!(registry.with(handle, |v| {
            *v += 1;
            *v
        }), Ok(42));
        assert_eq!(registry.remove(handle), Ok(42));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_released_handle_is_detected() {
        let registry = HandleRegistry::new();
        let handle = registry.insert("frame");
        registry.remove(handle).unwrap();

        assert_eq!(
            registry.with(handle, |_| ()),
            Err(ContractViolation::UseAfterDestroy)
        );
        assert_eq!(registry.remove(handle), Err(ContractViolation::DoubleDestroy));
    }

    #[test]
    fn test_foreign_handle_is_unknown() {
        let registry: HandleRegistry<u8> = HandleRegistry::new();
        let bogus = 0xdead_beef_usize as *mut c_void;

        assert_eq!(
            registry.remove(bogus),
            Err(ContractViolation::UnknownHandle(0xdead_beef))
        );
    }

    #[test]
    fn test_ids_are_not_reused() {
        let registry = HandleRegistry::new();
        let first = registry.insert(1u8);
        registry.remove(first).unwrap();
        let second = registry.insert(2u8);
        assert_ne!(first, second);
    }
}
