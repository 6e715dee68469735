//! Free page management and deferred reclamation
//!
//! Every freed page is recorded together with the transaction that freed
//! it. A page may be handed out again only once its freeing transaction is
//! older than the oldest live reader snapshot, so no reader can observe a
//! page being rewritten underneath it.
//!
//! On disk the freelist is a chain of `FREELIST` pages anchored in the
//! meta page, each holding `(txn_id, page_id)` records and a next pointer.
//! The chain itself is copy-on-write: a commit writes a fresh chain and
//! frees the pages of the old one.

use crate::error::{Error, PageId, PageKind, Result, TransactionId};
use crate::page::{usable_payload, PageBuf};
use crate::pager::Pager;
use byteorder::{ByteOrder, LittleEndian};

/// Per-page chain header: next pointer + record count
const CHAIN_HDR_SIZE: usize = 12;

/// Size of one `(txn_id, page_id)` record
const RECORD_SIZE: usize = 16;

/// Records that fit in one freelist page
fn records_per_page(page_size: usize) -> usize {
    (usable_payload(page_size) - CHAIN_HDR_SIZE) / RECORD_SIZE
}

/// The writer's view of reclaimable pages
#[derive(Debug, Clone)]
pub struct FreeList {
    /// Records freed before the oldest live reader; safe to hand out
    reusable: Vec<(TransactionId, PageId)>,
    /// Records a live reader may still observe
    pending: Vec<(TransactionId, PageId)>,
    /// Pages freed by the current writer, tagged at commit
    freed: Vec<PageId>,
    /// Snapshot threshold this view was computed against
    oldest_reader: TransactionId,
}

impl FreeList {
    /// An empty view with the given reclamation threshold
    pub fn new(oldest_reader: TransactionId) -> Self {
        Self { reusable: Vec::new(), pending: Vec::new(), freed: Vec::new(), oldest_reader }
    }

    /// Load the chain anchored at `root` and partition its records against
    /// the oldest live reader
    ///
    /// Also returns the chain's own page ids so the caller can free them;
    /// the commit will write a replacement chain.
    pub fn load(
        pager: &Pager,
        root: PageId,
        oldest_reader: TransactionId,
    ) -> Result<(Self, Vec<PageId>)> {
        let mut list = Self::new(oldest_reader);
        let mut chain = Vec::new();
        let mut at = root;
        while !at.is_null() {
            if chain.contains(&at) {
                return Err(Error::Corruption {
                    details: "freelist chain contains a cycle".into(),
                    page_id: Some(at),
                });
            }
            let page = pager.read_page(at, Some(PageKind::Freelist))?;
            let (next, records) = decode_chain_page(page.payload())?;
            for (txn_id, page_id) in records {
                if txn_id < oldest_reader {
                    list.reusable.push((txn_id, page_id));
                } else {
                    list.pending.push((txn_id, page_id));
                }
            }
            chain.push(at);
            at = next;
        }
        Ok((list, chain))
    }

    /// Threshold this view was computed against
    pub fn oldest_reader(&self) -> TransactionId {
        self.oldest_reader
    }

    /// Hand out one reusable page id, if any
    pub fn reserve(&mut self) -> Option<PageId> {
        self.reusable.pop().map(|(_, page_id)| page_id)
    }

    /// Record a page freed by the current writer
    pub fn free(&mut self, page_id: PageId) {
        self.freed.push(page_id);
    }

    /// Return a page that was allocated and then discarded within the
    /// current transaction
    ///
    /// Such a page was never part of any durable state, so no reader can
    /// hold a reference to it and it is immediately reusable.
    pub fn reclaim_fresh(&mut self, page_id: PageId) {
        self.reusable.push((TransactionId(0), page_id));
    }

    /// Number of immediately reusable pages
    pub fn reusable_len(&self) -> usize {
        self.reusable.len()
    }

    /// Number of pages still held back by live readers
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of pages freed by the current writer
    pub fn freed_len(&self) -> usize {
        self.freed.len()
    }

    fn record_count(&self) -> usize {
        self.reusable.len() + self.pending.len() + self.freed.len()
    }

    /// Serialize the surviving records into a fresh chain
    ///
    /// Chain pages are drawn from the reusable set first, falling back to
    /// the high-water mark. The page estimate counts every reserved chain
    /// page as a potential record, so the encoded list always fits.
    /// Returns the new chain root (null when there is nothing to record)
    /// and the sealed chain pages.
    pub fn save(
        mut self,
        txn_id: TransactionId,
        next_pgno: &mut u64,
        page_size: usize,
    ) -> (PageId, Vec<PageBuf>) {
        let cap = records_per_page(page_size);
        let mut chain: Vec<PageId> = Vec::new();
        loop {
            let total = self.record_count() + chain.len();
            let needed = total.div_ceil(cap);
            if chain.len() >= needed {
                break;
            }
            let id = self.reserve().unwrap_or_else(|| {
                let id = PageId(*next_pgno);
                *next_pgno += 1;
                id
            });
            chain.push(id);
        }

        // Reserving may have shrunk the list below the estimate; keep just
        // enough chain pages to hold the remaining records plus the
        // surplus pages themselves, which turn back into records
        let total = self.record_count() + chain.len();
        if total == 0 {
            return (PageId(0), Vec::new());
        }
        let used = total.div_ceil(cap + 1);
        let surplus = chain.split_off(used);

        let mut records = self.reusable;
        records.append(&mut self.pending);
        records.extend(self.freed.into_iter().map(|id| (txn_id, id)));
        records.extend(surplus.into_iter().map(|id| (txn_id, id)));

        let mut pages = Vec::with_capacity(chain.len());
        for (i, &page_id) in chain.iter().enumerate() {
            let next = chain.get(i + 1).copied().unwrap_or(PageId(0));
            let start = i * cap;
            let end = ((i + 1) * cap).min(records.len());
            let mut page = PageBuf::new(page_size, PageKind::Freelist, page_id, txn_id);
            let len = encode_chain_page(page.payload_mut(), next, &records[start..end]);
            page.seal(len);
            pages.push(page);
        }
        (chain[0], pages)
    }
}

fn encode_chain_page(out: &mut [u8], next: PageId, records: &[(TransactionId, PageId)]) -> usize {
    LittleEndian::write_u64(&mut out[0..], next.0);
    LittleEndian::write_u32(&mut out[8..], records.len() as u32);
    let mut at = CHAIN_HDR_SIZE;
    for (txn_id, page_id) in records {
        LittleEndian::write_u64(&mut out[at..], txn_id.0);
        LittleEndian::write_u64(&mut out[at + 8..], page_id.0);
        at += RECORD_SIZE;
    }
    at
}

fn decode_chain_page(payload: &[u8]) -> Result<(PageId, Vec<(TransactionId, PageId)>)> {
    if payload.len() < CHAIN_HDR_SIZE {
        return Err(Error::Decoding("freelist page truncated".into()));
    }
    let next = PageId(LittleEndian::read_u64(&payload[0..]));
    let count = LittleEndian::read_u32(&payload[8..]) as usize;
    if payload.len() < CHAIN_HDR_SIZE + count * RECORD_SIZE {
        return Err(Error::Decoding("freelist records truncated".into()));
    }
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let at = CHAIN_HDR_SIZE + i * RECORD_SIZE;
        records.push((
            TransactionId(LittleEndian::read_u64(&payload[at..])),
            PageId(LittleEndian::read_u64(&payload[at + 8..])),
        ));
    }
    Ok((next, records))
}
