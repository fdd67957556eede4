use crate::{BusError, FrameBus};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// In-process bus: one mutex-guarded map, every operation is a whole-value swap.
#[derive(Default)]
pub struct MemoryBus {
    slots: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.slots().keys().cloned().collect();
        keys.sort();
        keys
    }
}

fn check_key(key: &str) -> Result<(), BusError> {
    if key.is_empty() {
        return Err(BusError::InvalidKey(key.to_string()));
    }
    Ok(())
}

impl FrameBus for MemoryBus {
    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), BusError> {
        check_key(key)?;
        self.slots().insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BusError> {
        check_key(key)?;
        Ok(self.slots().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), BusError> {
        check_key(key)?;
        self.slots().remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, BusError> {
        check_key(key)?;
        Ok(self.slots().contains_key(key))
    }
}
