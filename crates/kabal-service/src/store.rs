//! # In-Memory Store
//!
//! Thread-safe, cloneable key-value store. All operations are synchronous:
//! the lock is `parking_lot`, which is non-poisoning, and is never held
//! across I/O.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread-safe, cloneable in-memory store.
#[derive(Debug)]
pub struct Store<K, T> {
    data: Arc<RwLock<HashMap<K, T>>>,
}

impl<K, T> Clone for Store<K, T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<K, T> Default for Store<K, T> {
    fn default() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K: Copy + Eq + Hash, T: Clone> Store<K, T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: K, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    /// Retrieve a record by id.
    pub fn get(&self, id: &K) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// All records matching `pred`.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.data.read().values().filter(|v| pred(v)).cloned().collect()
    }

    /// Atomically read-validate-update a record.
    ///
    /// The closure works on a clone of the record. The clone replaces the
    /// stored record only when the closure returns `Ok`, so a failed
    /// operation never leaves a partial change behind. The whole operation
    /// runs under one write lock.
    ///
    /// Returns `None` if the record doesn't exist.
    pub fn try_update<R, E>(
        &self,
        id: &K,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        let mut guard = self.data.write();
        let mut draft = guard.get(id)?.clone();
        let result = f(&mut draft);
        if result.is_ok() {
            guard.insert(*id, draft);
        }
        Some(result)
    }

    /// Shared access for multi-record reads.
    pub fn read(&self) -> RwLockReadGuard<'_, HashMap<K, T>> {
        self.data.read()
    }

    /// Exclusive access for multi-record updates.
    pub fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, T>> {
        self.data.write()
    }
}
