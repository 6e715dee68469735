//! Live-reader tracking for snapshot isolation
//!
//! Each read transaction registers the transaction id of the meta snapshot
//! it observes. Writers consult the table for the oldest registered
//! snapshot when deciding which freed pages may be reused. The table is
//! process-local: this engine does not support multi-process access.

use crate::error::{Error, Result, TransactionId};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Default reader capacity
pub const MAX_READERS: usize = 126;

/// Registry of live reader snapshots
pub struct ReaderTable {
    /// Snapshot txn id -> number of readers pinned to it
    slots: Mutex<BTreeMap<u64, usize>>,
    capacity: usize,
    live: Mutex<usize>,
}

impl ReaderTable {
    /// Create a table with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self { slots: Mutex::new(BTreeMap::new()), capacity, live: Mutex::new(0) }
    }

    /// Register a reader pinned to `txn_id`
    pub fn register(&self, txn_id: TransactionId) -> Result<()> {
        let mut slots = self.slots.lock();
        let mut live = self.live.lock();
        if *live >= self.capacity {
            return Err(Error::ReadersFull);
        }
        *live += 1;
        *slots.entry(txn_id.0).or_insert(0) += 1;
        Ok(())
    }

    /// Remove one reader pinned to `txn_id`
    pub fn deregister(&self, txn_id: TransactionId) {
        let mut slots = self.slots.lock();
        let mut live = self.live.lock();
        if let Some(count) = slots.get_mut(&txn_id.0) {
            *count -= 1;
            if *count == 0 {
                slots.remove(&txn_id.0);
            }
            *live = live.saturating_sub(1);
        }
    }

    /// The oldest registered snapshot, if any reader is live
    pub fn oldest(&self) -> Option<TransactionId> {
        self.slots.lock().keys().next().copied().map(TransactionId)
    }

    /// Number of live readers
    pub fn count(&self) -> usize {
        *self.live.lock()
    }
}
