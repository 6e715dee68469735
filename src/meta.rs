//! Meta pages and the file header
//!
//! Two meta pages at fixed slots define the database state: the B+ tree
//! root, the freelist root, the monotonic transaction id, and the
//! high-water mark. A commit writes the inactive slot; on open the slot
//! with the higher transaction id whose checksum validates wins.
//!
//! The file header (page 2) is static after creation and records the
//! format version, the page size, and the two meta-slot offsets.

use crate::error::{Error, PageId, PageKind, Result, TransactionId};
use crate::page::{PageBuf, MAX_PAGE_SIZE, MIN_PAGE_SIZE};
use byteorder::{ByteOrder, LittleEndian};

/// Page id of meta slot A
pub const META_SLOT_A: PageId = PageId(0);

/// Page id of meta slot B
pub const META_SLOT_B: PageId = PageId(1);

/// Page id of the file header
pub const HEADER_PAGE: PageId = PageId(2);

/// First page id available to data, branch, leaf, and freelist pages
pub const FIRST_APP_PAGE: u64 = 3;

/// On-disk format version
pub const FORMAT_VERSION: u32 = 1;

/// Magic string stored in the file header
pub const HEADER_MAGIC: &[u8] = b"pagekv format";

/// File header contents (static after creation)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Format version
    pub version: u32,
    /// Page size the file was created with
    pub page_size: u32,
    /// Byte offset of meta slot A
    pub meta_offset_a: u64,
    /// Byte offset of meta slot B
    pub meta_offset_b: u64,
}

impl FileHeader {
    /// Build the header for a database created with `page_size`
    pub fn new(page_size: usize) -> Self {
        Self {
            version: FORMAT_VERSION,
            page_size: page_size as u32,
            meta_offset_a: META_SLOT_A.to_offset(page_size),
            meta_offset_b: META_SLOT_B.to_offset(page_size),
        }
    }

    /// Encode into a page image, returning the payload length
    pub fn encode(&self, page: &mut PageBuf) -> usize {
        let out = page.payload_mut();
        let mut at = 0;
        LittleEndian::write_u32(&mut out[at..], HEADER_MAGIC.len() as u32);
        at += 4;
        out[at..at + HEADER_MAGIC.len()].copy_from_slice(HEADER_MAGIC);
        at += HEADER_MAGIC.len();
        LittleEndian::write_u32(&mut out[at..], self.version);
        at += 4;
        LittleEndian::write_u32(&mut out[at..], self.page_size);
        at += 4;
        LittleEndian::write_u64(&mut out[at..], self.meta_offset_a);
        at += 8;
        LittleEndian::write_u64(&mut out[at..], self.meta_offset_b);
        at += 8;
        at
    }

    /// Decode from a header-page payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 4 {
            return Err(Error::Decoding("file header truncated".into()));
        }
        let magic_len = LittleEndian::read_u32(payload) as usize;
        let rest = &payload[4..];
        if magic_len != HEADER_MAGIC.len() || rest.len() < magic_len + 24 {
            return Err(Error::Decoding("file header truncated".into()));
        }
        if &rest[..magic_len] != HEADER_MAGIC {
            return Err(Error::Decoding("file header magic mismatch".into()));
        }
        let rest = &rest[magic_len..];
        let header = Self {
            version: LittleEndian::read_u32(&rest[0..]),
            page_size: LittleEndian::read_u32(&rest[4..]),
            meta_offset_a: LittleEndian::read_u64(&rest[8..]),
            meta_offset_b: LittleEndian::read_u64(&rest[16..]),
        };
        header.validate()?;
        Ok(header)
    }

    /// Validate version and page size bounds
    pub fn validate(&self) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(Error::VersionMismatch {
                expected: FORMAT_VERSION,
                found: self.version,
            });
        }
        let page_size = self.page_size as usize;
        if !page_size.is_power_of_two()
            || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size)
        {
            return Err(Error::Corruption {
                details: format!("invalid page size {page_size} in file header"),
                page_id: Some(HEADER_PAGE),
            });
        }
        Ok(())
    }
}

/// Database state as stored in a meta slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    /// Last committed transaction id
    pub txn_id: TransactionId,
    /// Root page of the B+ tree
    pub root: PageId,
    /// Head page of the freelist chain (null = empty)
    pub freelist_root: PageId,
    /// Number of pages ever allocated, i.e. the next fresh page id
    pub high_water: u64,
}

/// Fixed meta payload size: txn_id, root, freelist_root, high_water
const META_PAYLOAD_SIZE: usize = 32;

impl Meta {
    /// Encode into a page image, returning the payload length
    pub fn encode(&self, page: &mut PageBuf) -> usize {
        let out = page.payload_mut();
        LittleEndian::write_u64(&mut out[0..], self.txn_id.0);
        LittleEndian::write_u64(&mut out[8..], self.root.0);
        LittleEndian::write_u64(&mut out[16..], self.freelist_root.0);
        LittleEndian::write_u64(&mut out[24..], self.high_water);
        META_PAYLOAD_SIZE
    }

    /// Decode from a meta-page payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < META_PAYLOAD_SIZE {
            return Err(Error::Decoding("meta payload truncated".into()));
        }
        Ok(Self {
            txn_id: TransactionId(LittleEndian::read_u64(&payload[0..])),
            root: PageId(LittleEndian::read_u64(&payload[8..])),
            freelist_root: PageId(LittleEndian::read_u64(&payload[16..])),
            high_water: LittleEndian::read_u64(&payload[24..]),
        })
    }

    /// Build the page image for this meta in the given slot
    pub fn to_page(&self, page_size: usize, slot: PageId) -> PageBuf {
        let mut page = PageBuf::new(page_size, PageKind::Meta, slot, self.txn_id);
        let len = self.encode(&mut page);
        page.seal(len);
        page
    }
}

/// Pick the active meta from the two slots
///
/// `None` marks a slot whose image failed validation. The slot with the
/// higher transaction id among the valid ones wins; neither valid means
/// the database is unrecoverable.
pub fn select_active(a: Option<Meta>, b: Option<Meta>) -> Result<(Meta, PageId)> {
    match (a, b) {
        (Some(a), Some(b)) => {
            if a.txn_id >= b.txn_id {
                Ok((a, META_SLOT_A))
            } else {
                Ok((b, META_SLOT_B))
            }
        }
        (Some(a), None) => Ok((a, META_SLOT_A)),
        (None, Some(b)) => Ok((b, META_SLOT_B)),
        (None, None) => Err(Error::Corrupted),
    }
}

/// The slot a commit with the given active slot must write to
pub fn inactive_slot(active: PageId) -> PageId {
    if active == META_SLOT_A {
        META_SLOT_B
    } else {
        META_SLOT_A
    }
}
