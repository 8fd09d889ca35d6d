//! State shared by all driver instances of the process.
//!
//! The parameter store keeps values a driver wants to find again in a later
//! instance. The device communication map lets instances exchange data
//! during a run. Both hold values of any type; lookups name the expected
//! type and miss when it does not match.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

type Entries = HashMap<String, Arc<dyn Any + Send + Sync>>;

fn parameter_store() -> MutexGuard<'static, Entries> {
    static STORE: OnceLock<Mutex<Entries>> = OnceLock::new();
    STORE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

fn communication() -> MutexGuard<'static, Entries> {
    static MAP: OnceLock<Mutex<Entries>> = OnceLock::new();
    MAP.get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

/// Stores `value` under `key`, replacing what was stored before.
///
/// Keys are shared by all drivers, so they should carry the driver's name.
pub fn store_parameter<T: Any + Send + Sync>(key: &str, value: T) {
    parameter_store().insert(key.to_string(), Arc::new(value));
}

/// The value stored under `key`, if there is one of type `T`.
pub fn restore_parameter<T: Any + Clone>(key: &str) -> Option<T> {
    parameter_store()
        .get(key)
        .and_then(|value| value.downcast_ref::<T>())
        .cloned()
}

/// Handle to the process-wide device communication map.
///
/// Entries can be added, read and removed, and the map can be cleared, but
/// there is no way to swap the map itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceCommunication;

impl DeviceCommunication {
    pub fn insert<T: Any + Send + Sync>(&self, key: &str, value: T) {
        communication().insert(key.to_string(), Arc::new(value));
    }

    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        communication()
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        communication().contains_key(key)
    }

    /// Removes an entry; returns whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        communication().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        communication().len()
    }

    pub fn is_empty(&self) -> bool {
        communication().is_empty()
    }

    /// Drops all entries.
    pub fn clear(&self) {
        communication().clear();
    }
}
