//! Environment management
//!
//! The environment owns the database file, the cached active meta, the
//! live-reader table, and the writer lock. Transactions borrow it, so the
//! lifecycle rule that no reader may outlive an open/close cycle is
//! enforced by the compiler.

use bitflags::bitflags;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, PageId, PageKind, Result, TransactionId};
use crate::freelist::FreeList;
use crate::io::FileIo;
use crate::meta::{self, FileHeader, Meta, FIRST_APP_PAGE, HEADER_PAGE, META_SLOT_A, META_SLOT_B};
use crate::node::{LeafNode, Node};
use crate::page::{
    check_page_size, PageBuf, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};
use crate::pager::Pager;
use crate::reader::{ReaderTable, MAX_READERS};
use crate::txn::{ReadTransaction, Transaction, WriteTransaction};

bitflags! {
    /// Environment open flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EnvFlags: u32 {
        /// Refuse writes; `begin_write` returns `ReadOnly`
        const READ_ONLY = 0x01;
    }
}

/// Shared environment state
pub(crate) struct EnvInner {
    pub(crate) pager: Pager,
    /// Active meta and the slot it came from; flipped by commits
    pub(crate) meta_cache: RwLock<(Meta, PageId)>,
    pub(crate) readers: ReaderTable,
    pub(crate) write_lock: Mutex<()>,
}

/// A handle to one open database file
pub struct Environment {
    inner: Arc<EnvInner>,
}

/// Builder for opening or creating an environment
pub struct EnvBuilder {
    page_size: usize,
    max_readers: usize,
    flags: EnvFlags,
}

impl EnvBuilder {
    /// Start from the defaults: 4 KiB pages, 126 readers, read-write
    pub fn new() -> Self {
        Self { page_size: DEFAULT_PAGE_SIZE, max_readers: MAX_READERS, flags: EnvFlags::empty() }
    }

    /// Page size used when the file is created; an existing file keeps the
    /// size recorded in its header
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Capacity of the live-reader table
    pub fn max_readers(mut self, max_readers: usize) -> Self {
        self.max_readers = max_readers;
        self
    }

    /// Open for reading only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.flags.set(EnvFlags::READ_ONLY, read_only);
        self
    }

    /// Open the database file at `path`, creating it when absent
    pub fn open(self, path: impl AsRef<Path>) -> Result<Environment> {
        let path = path.as_ref();
        let read_only = self.flags.contains(EnvFlags::READ_ONLY);
        let io = FileIo::open(path, read_only)?;

        let (pager, active, slot) = if io.len()? == 0 {
            if read_only {
                return Err(Error::InvalidParameter(
                    "cannot create a database in read-only mode",
                ));
            }
            check_page_size(self.page_size)?;
            let pager = initialize(io, self.page_size)?;
            let cache = load_active_meta(&pager)?;
            debug!(?path, page_size = self.page_size, "created database");
            (pager, cache.0, cache.1)
        } else {
            let header = probe_header(&io)?;
            let pager = Pager::new(io, header.page_size as usize);
            let (active, slot) = load_active_meta(&pager)?;
            debug!(
                ?path,
                page_size = header.page_size,
                txn = active.txn_id.0,
                "opened database"
            );
            (pager, active, slot)
        };

        Ok(Environment {
            inner: Arc::new(EnvInner {
                pager,
                meta_cache: RwLock::new((active, slot)),
                readers: ReaderTable::new(self.max_readers),
                write_lock: Mutex::new(()),
            }),
        })
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// First-time initialization: header page, empty root leaf, meta slot A
/// at txn 1, sync, meta slot B at txn 0, sync
fn initialize(io: FileIo, page_size: usize) -> Result<Pager> {
    let pager = Pager::new(io, page_size);

    let header = FileHeader::new(page_size);
    let mut page = PageBuf::new(page_size, PageKind::Header, HEADER_PAGE, TransactionId(0));
    let len = header.encode(&mut page);
    pager.write_page(&mut page, len)?;

    let root = PageId(FIRST_APP_PAGE);
    pager.write_node(root, TransactionId(1), &Node::Leaf(LeafNode::empty()))?;

    let meta_a = Meta {
        txn_id: TransactionId(1),
        root,
        freelist_root: PageId(0),
        high_water: FIRST_APP_PAGE + 1,
    };
    pager.write_sealed(&meta_a.to_page(page_size, META_SLOT_A))?;
    pager.sync()?;

    let meta_b = Meta { txn_id: TransactionId(0), ..meta_a };
    pager.write_sealed(&meta_b.to_page(page_size, META_SLOT_B))?;
    pager.sync()?;

    Ok(pager)
}

/// Find the file header without knowing the page size
///
/// The header lives at page id 2, so its offset depends on the page size
/// it records. Each candidate size is probed until a header page validates
/// and agrees with its own offset.
fn probe_header(io: &FileIo) -> Result<FileHeader> {
    let mut candidates = vec![DEFAULT_PAGE_SIZE];
    let mut size = MIN_PAGE_SIZE;
    while size <= MAX_PAGE_SIZE {
        if size != DEFAULT_PAGE_SIZE {
            candidates.push(size);
        }
        size *= 2;
    }
    for page_size in candidates {
        let offset = HEADER_PAGE.to_offset(page_size);
        let Ok(bytes) = io.read_at(offset, page_size) else {
            continue;
        };
        let Ok(page) = PageBuf::from_bytes(bytes, HEADER_PAGE, Some(PageKind::Header)) else {
            continue;
        };
        let Ok(header) = FileHeader::decode(page.payload()) else {
            continue;
        };
        if header.page_size as usize == page_size {
            return Ok(header);
        }
    }
    Err(Error::Corruption {
        details: "no valid file header at any supported page size".into(),
        page_id: Some(HEADER_PAGE),
    })
}

fn read_meta_slot(pager: &Pager, slot: PageId) -> Option<Meta> {
    let page = pager.read_page(slot, Some(PageKind::Meta)).ok()?;
    Meta::decode(page.payload()).ok()
}

/// Read both slots and pick the newest one that validates
fn load_active_meta(pager: &Pager) -> Result<(Meta, PageId)> {
    meta::select_active(
        read_meta_slot(pager, META_SLOT_A),
        read_meta_slot(pager, META_SLOT_B),
    )
}

/// Environment statistics
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    /// Page size recorded in the file header
    pub page_size: usize,
    /// Transaction id of the active meta
    pub last_txn_id: TransactionId,
    /// Root page of the active tree
    pub root: PageId,
    /// Next fresh page id; the logical file size in pages
    pub high_water: u64,
    /// Currently registered readers
    pub live_readers: usize,
    /// Freed pages available for reuse right now
    pub freelist_reusable: usize,
    /// Freed pages still pinned by a live reader
    pub freelist_pending: usize,
}

impl Environment {
    /// Open with default options
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        EnvBuilder::new().open(path)
    }

    /// Begin a read transaction pinned to the current state
    pub fn begin_read(&self) -> Result<ReadTransaction<'_>> {
        Transaction::new_read(self)
    }

    /// Begin the write transaction; blocks while another writer is active
    pub fn begin_write(&self) -> Result<WriteTransaction<'_>> {
        Transaction::new_write(self)
    }

    /// Snapshot of meta, reader, and freelist occupancy
    ///
    /// Takes the writer lock briefly so the freelist chain cannot be
    /// rewritten mid-walk.
    pub fn stat(&self) -> Result<Stat> {
        let inner = self.inner();
        let _guard = inner.write_lock.lock();
        let (active, _) = *inner.meta_cache.read();
        let oldest = inner.readers.oldest().unwrap_or(active.txn_id);
        let (freelist, _) = FreeList::load(&inner.pager, active.freelist_root, oldest)?;
        Ok(Stat {
            page_size: inner.pager.page_size(),
            last_txn_id: active.txn_id,
            root: active.root,
            high_water: active.high_water,
            live_readers: inner.readers.count(),
            freelist_reusable: freelist.reusable_len(),
            freelist_pending: freelist.pending_len(),
        })
    }

    pub(crate) fn inner(&self) -> &EnvInner {
        &self.inner
    }
}
