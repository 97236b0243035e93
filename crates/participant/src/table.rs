//! In-flight transaction parts keyed by identity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use common::TxnPartId;

use crate::part::TxnPart;

/// Concurrency-safe table of in-flight parts.
///
/// The lock is held only for the lookup, insert or removal itself. Removal
/// is a single atomic pop, so of two handlers racing on one identity
/// exactly one gets the part.
#[derive(Clone, Default)]
pub struct TxnPartTable {
    parts: Arc<Mutex<HashMap<TxnPartId, Arc<TxnPart>>>>,
}

impl TxnPartTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `part`, returning any entry it replaced.
    pub fn put(&self, part: Arc<TxnPart>) -> Option<Arc<TxnPart>> {
        self.lock().insert(part.id().clone(), part)
    }

    /// Removes and returns the entry for `id`, if present.
    pub fn pop(&self, id: &TxnPartId) -> Option<Arc<TxnPart>> {
        self.lock().remove(id)
    }

    /// Removes the entry for `part`'s identity only if it is that exact
    /// part. Returns true if it was removed.
    pub fn pop_exact(&self, part: &Arc<TxnPart>) -> bool {
        let mut parts = self.lock();
        match parts.get(part.id()) {
            Some(current) if Arc::ptr_eq(current, part) => {
                parts.remove(part.id());
                true
            }
            _ => false,
        }
    }

    /// Runs `f` on the entry for `id` while the table lock is held.
    pub fn with_part<R>(&self, id: &TxnPartId, f: impl FnOnce(&TxnPart) -> R) -> Option<R> {
        self.lock().get(id).map(|part| f(part))
    }

    pub fn contains(&self, id: &TxnPartId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identities currently in the table, sorted.
    pub fn ids(&self) -> Vec<TxnPartId> {
        let mut ids: Vec<TxnPartId> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TxnPartId, Arc<TxnPart>>> {
        self.parts.lock().expect("transaction part table lock poisoned")
    }
}
