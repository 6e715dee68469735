//! Transaction management with compile-time mode safety
//!
//! One writer at a time, serialized by the environment's writer lock; any
//! number of readers, each pinned to the meta snapshot it observed at
//! begin. A writer builds its whole working set in memory and publishes it
//! with the dual-meta commit protocol: dirty pages, data sync, meta page,
//! meta sync, flip. Aborting is always a pure in-memory discard.

use parking_lot::MutexGuard;
use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::{debug, trace};

use crate::btree::{self, NodeSource, TreeWriter};
use crate::cursor::Range;
use crate::env::Environment;
use crate::error::{Error, PageId, Result, TransactionId};
use crate::freelist::FreeList;
use crate::meta::{self, Meta};
use crate::node::Node;

/// Transaction mode marker traits
pub mod mode {
    /// Sealed trait for transaction modes
    pub(crate) mod sealed {
        pub trait Sealed {}
    }

    /// Transaction mode trait
    pub trait Mode: sealed::Sealed {
        /// Whether this is a write transaction
        const IS_WRITE: bool;
    }
}

/// Read-only transaction mode
#[derive(Debug)]
pub struct Read;

impl mode::sealed::Sealed for Read {}
impl mode::Mode for Read {
    const IS_WRITE: bool = false;
}

/// Read-write transaction mode
#[derive(Debug)]
pub struct Write;

impl mode::sealed::Sealed for Write {}
impl mode::Mode for Write {
    const IS_WRITE: bool = true;
}

/// A database transaction
pub struct Transaction<'env, M: mode::Mode> {
    env: &'env Environment,
    /// Meta snapshot fixed at begin
    snapshot: Meta,
    /// Slot the snapshot was read from
    active_slot: PageId,
    mode_data: ModeData<'env>,
    _mode: PhantomData<M>,
}

/// Type alias for a read-only transaction
pub type ReadTransaction<'env> = Transaction<'env, Read>;

/// Type alias for a read-write transaction
pub type WriteTransaction<'env> = Transaction<'env, Write>;

enum ModeData<'env> {
    Read {
        registered: bool,
    },
    Write(Box<WriteState<'env>>),
}

struct WriteState<'env> {
    _guard: MutexGuard<'env, ()>,
    txn_id: TransactionId,
    root: PageId,
    dirty: HashMap<PageId, Node>,
    freelist: FreeList,
    /// Pages of the freelist chain this transaction loaded; replaced by a
    /// fresh chain at commit
    old_chain: Vec<PageId>,
    next_pgno: u64,
    savepoints: Vec<Savepoint>,
}

/// In-memory savepoint for nested transactions
struct Savepoint {
    root: PageId,
    dirty: HashMap<PageId, Node>,
    freelist: FreeList,
    next_pgno: u64,
}

impl<'env> Transaction<'env, Read> {
    pub(crate) fn new_read(env: &'env Environment) -> Result<Self> {
        let inner = env.inner();
        // Register under the cache lock so a committing writer cannot
        // publish a new meta between the snapshot read and registration
        let (snapshot, active_slot) = {
            let cache = inner.meta_cache.read();
            inner.readers.register(cache.0.txn_id)?;
            *cache
        };
        Ok(Self {
            env,
            snapshot,
            active_slot,
            mode_data: ModeData::Read { registered: true },
            _mode: PhantomData,
        })
    }
}

impl<'env> Transaction<'env, Write> {
    pub(crate) fn new_write(env: &'env Environment) -> Result<Self> {
        let inner = env.inner();
        if inner.pager.read_only() {
            return Err(Error::ReadOnly);
        }
        let guard = inner.write_lock.lock();
        let (snapshot, active_slot) = *inner.meta_cache.read();
        let txn_id = TransactionId(snapshot.txn_id.0 + 1);

        // Pages freed before the oldest live reader snapshot are fair game
        let oldest = inner.readers.oldest().unwrap_or(snapshot.txn_id);
        let (freelist, old_chain) =
            FreeList::load(&inner.pager, snapshot.freelist_root, oldest)?;
        trace!(
            txn = txn_id.0,
            oldest_reader = oldest.0,
            reusable = freelist.reusable_len(),
            pending = freelist.pending_len(),
            "write transaction begins"
        );

        Ok(Self {
            env,
            snapshot,
            active_slot,
            mode_data: ModeData::Write(Box::new(WriteState {
                _guard: guard,
                txn_id,
                root: snapshot.root,
                dirty: HashMap::new(),
                freelist,
                old_chain,
                next_pgno: snapshot.high_water,
                savepoints: Vec::new(),
            })),
            _mode: PhantomData,
        })
    }

    fn write_state(&mut self) -> &mut WriteState<'env> {
        match &mut self.mode_data {
            ModeData::Write(state) => state,
            ModeData::Read { .. } => unreachable!("write transaction carries write state"),
        }
    }

    /// Insert or overwrite a key
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let env = self.env;
        let state = self.write_state();
        let root = state.root;
        let mut writer = TreeWriter {
            pager: &env.inner().pager,
            dirty: &mut state.dirty,
            freelist: &mut state.freelist,
            next_pgno: &mut state.next_pgno,
            txn_id: state.txn_id,
        };
        state.root = btree::insert(&mut writer, root, key, value)?;
        Ok(())
    }

    /// Remove a key, reporting whether it existed
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let env = self.env;
        let state = self.write_state();
        let root = state.root;
        let mut writer = TreeWriter {
            pager: &env.inner().pager,
            dirty: &mut state.dirty,
            freelist: &mut state.freelist,
            next_pgno: &mut state.next_pgno,
            txn_id: state.txn_id,
        };
        let (new_root, existed) = btree::delete(&mut writer, root, key)?;
        state.root = new_root;
        Ok(existed)
    }

    /// Open a savepoint
    ///
    /// Nesting is purely in-memory: only the outermost [`commit`] touches
    /// disk. A nested read simply sees the parent's working set.
    ///
    /// [`commit`]: Transaction::commit
    pub fn begin_nested(&mut self) {
        let state = self.write_state();
        let savepoint = Savepoint {
            root: state.root,
            dirty: state.dirty.clone(),
            freelist: state.freelist.clone(),
            next_pgno: state.next_pgno,
        };
        state.savepoints.push(savepoint);
    }

    /// Merge the innermost savepoint into its parent
    ///
    /// Fails with [`Error::TxnAborted`] when no savepoint is open.
    pub fn commit_nested(&mut self) -> Result<()> {
        let state = self.write_state();
        state.savepoints.pop().map(|_| ()).ok_or(Error::TxnAborted)
    }

    /// Discard every change made since the innermost savepoint
    ///
    /// Fails with [`Error::TxnAborted`] when no savepoint is open.
    pub fn abort_nested(&mut self) -> Result<()> {
        let state = self.write_state();
        let savepoint = state.savepoints.pop().ok_or(Error::TxnAborted)?;
        state.root = savepoint.root;
        state.dirty = savepoint.dirty;
        state.freelist = savepoint.freelist;
        state.next_pgno = savepoint.next_pgno;
        Ok(())
    }

    /// Number of open savepoints
    pub fn nesting_depth(&self) -> usize {
        match &self.mode_data {
            ModeData::Write(state) => state.savepoints.len(),
            ModeData::Read { .. } => 0,
        }
    }
}

impl<'env, M: mode::Mode> Transaction<'env, M> {
    /// The transaction id: the snapshot's id for readers, the id this
    /// writer will commit as for writers
    pub fn id(&self) -> TransactionId {
        match &self.mode_data {
            ModeData::Read { .. } => self.snapshot.txn_id,
            ModeData::Write(state) => state.txn_id,
        }
    }

    fn current_root(&self) -> PageId {
        match &self.mode_data {
            ModeData::Read { .. } => self.snapshot.root,
            ModeData::Write(state) => state.root,
        }
    }

    /// Look up a key
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        btree::get(self, self.current_root(), key)
    }

    /// Ordered scan over `[start, end)`
    pub fn range(&self, start: &[u8], end: &[u8]) -> Result<Range<'_, Self>> {
        Range::seek(self, self.current_root(), start, end)
    }

    /// Commit the transaction
    ///
    /// For a reader this only releases the snapshot pin. For a writer it
    /// runs the full protocol: dirty pages and the rebuilt freelist chain
    /// go out first, then a data sync makes them durable, then the new
    /// meta lands in the inactive slot, and a final sync makes the commit
    /// visible to crash recovery. The in-process meta cache flips last.
    pub fn commit(mut self) -> Result<()> {
        let inner = self.env.inner();
        let state = match &mut self.mode_data {
            ModeData::Read { .. } => return Ok(()),
            ModeData::Write(state) => state,
        };
        if state.dirty.is_empty() && state.freelist.freed_len() == 0 {
            // Nothing changed; leave the meta alone
            return Ok(());
        }
        state.savepoints.clear();

        // The old chain is superseded by the one written below
        let old_chain = std::mem::take(&mut state.old_chain);
        for page_id in old_chain {
            state.freelist.free(page_id);
        }
        let freelist = std::mem::replace(&mut state.freelist, FreeList::new(TransactionId(0)));
        let (freelist_root, chain_pages) =
            freelist.save(state.txn_id, &mut state.next_pgno, inner.pager.page_size());

        for (&page_id, node) in &state.dirty {
            inner.pager.write_node(page_id, state.txn_id, node)?;
        }
        for page in &chain_pages {
            inner.pager.write_sealed(page)?;
        }
        inner.pager.sync()?;

        let new_meta = Meta {
            txn_id: state.txn_id,
            root: state.root,
            freelist_root,
            high_water: state.next_pgno,
        };
        let slot = meta::inactive_slot(self.active_slot);
        inner.pager.write_sealed(&new_meta.to_page(inner.pager.page_size(), slot))?;
        inner.pager.sync()?;

        *inner.meta_cache.write() = (new_meta, slot);
        debug!(
            txn = new_meta.txn_id.0,
            root = new_meta.root.0,
            high_water = new_meta.high_water,
            dirty = state.dirty.len(),
            "commit durable"
        );
        Ok(())
    }

    /// Abort the transaction, discarding in-memory state only
    ///
    /// Dropping an unfinished transaction does the same. For readers this
    /// is safe to call from any thread.
    pub fn abort(self) {}
}

impl<M: mode::Mode> NodeSource for Transaction<'_, M> {
    fn node(&self, page_id: PageId) -> Result<Node> {
        if let ModeData::Write(state) = &self.mode_data {
            if let Some(node) = state.dirty.get(&page_id) {
                return Ok(node.clone());
            }
        }
        self.env.inner().pager.read_node(page_id)
    }
}

impl<M: mode::Mode> Drop for Transaction<'_, M> {
    fn drop(&mut self) {
        if let ModeData::Read { registered } = &mut self.mode_data {
            if *registered {
                self.env.inner().readers.deregister(self.snapshot.txn_id);
                *registered = false;
            }
        }
    }
}
