//! Single-slot key/value frame bus.
//!
//! Producers overwrite, readers always see the latest value. There is no
//! queueing: a reader that polls slower than the producer publishes simply
//! misses intermediate frames.

pub mod errors;
pub mod keys;
pub mod memory;

pub use errors::BusError;
pub use memory::MemoryBus;

use std::sync::Arc;

pub trait FrameBus: Send + Sync {
    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), BusError>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BusError>;

    fn delete(&self, key: &str) -> Result<(), BusError>;

    fn exists(&self, key: &str) -> Result<bool, BusError> {
        Ok(self.get(key)?.is_some())
    }
}

pub type SharedBus = Arc<dyn FrameBus>;

/// Publishes without letting a bus failure reach the caller.
///
/// Returns whether the write landed.
pub fn publish(bus: &dyn FrameBus, key: &str, value: Vec<u8>) -> bool {
    match bus.set(key, value) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(key, error = %e, "Frame bus publish failed");
            false
        }
    }
}

/// Best-effort delete, failures are logged.
pub fn clear(bus: &dyn FrameBus, key: &str) -> bool {
    match bus.delete(key) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(key, error = %e, "Frame bus delete failed");
            false
        }
    }
}

/// Best-effort read, failures are logged and read as absent.
pub fn fetch(bus: &dyn FrameBus, key: &str) -> Option<Vec<u8>> {
    match bus.get(key) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, error = %e, "Frame bus read failed");
            None
        }
    }
}
