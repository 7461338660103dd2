//! Runtime variable store
//!
//! A name/value registry seeded while a profile is applied and read by the
//! interpolation engine for the rest of the process lifetime. The store is an
//! ordinary value: construct one, share it behind an `Arc`, and hand it to
//! everything that needs it. Tests build their own isolated instance.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread-safe runtime variable registry.
///
/// Every write is a single-key upsert under a short exclusive lock; reads
/// clone the value out so no lock is held by callers.
#[derive(Debug, Default)]
pub struct VariableStore {
    values: RwLock<BTreeMap<String, Value>>,
}

impl VariableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with variables.
    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let store = Self::new();
        for (name, value) in values {
            store.set(name, value);
        }
        store
    }

    /// Insert or overwrite a variable, returning the previous value.
    pub fn set(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        let name = name.into();
        log::trace!("Setting runtime variable '{}'", name);
        self.write().insert(name, value)
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.read().get(name).cloned()
    }

    /// Check whether a variable is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Delete a variable, returning its last value.
    pub fn remove(&self, name: &str) -> Option<Value> {
        log::trace!("Removing runtime variable '{}'", name);
        self.write().remove(name)
    }

    /// Snapshot of every variable, sorted by name.
    pub fn dump(&self) -> BTreeMap<String, Value> {
        self.read().clone()
    }

    /// Drop every variable.
    pub fn reset(&self) {
        self.write().clear();
    }

    /// Number of defined variables.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Value>> {
        match self.values.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Value>> {
        match self.values.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
