//! Common page header codec and page-image helpers
//!
//! Pages are the fundamental unit of storage. Every page is a fixed-size
//! byte block beginning with a 32-byte common header:
//!
//! ```text
//! magic:u32  kind:u8  reserved:[u8;3]  page_id:u64  txn_id:u64
//! payload_len:u32  checksum:u32
//! ```
//!
//! All integers are little-endian. Bytes past the payload are zeroed before
//! the checksum is computed.

use crate::checksum;
use crate::error::{Error, PageId, PageKind, Result, TransactionId};
use byteorder::{ByteOrder, LittleEndian};
use static_assertions::const_assert;

/// Magic number identifying pagekv pages ("PKV1")
pub const PAGE_MAGIC: u32 = 0x3156_4B50;

/// Size of the common page header
pub const PAGE_HDR_SIZE: usize = 32;

/// Default page size (4 KiB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest supported page size
pub const MIN_PAGE_SIZE: usize = 512;

/// Largest supported page size
pub const MAX_PAGE_SIZE: usize = 65536;

pub(crate) const MAGIC_OFFSET: usize = 0;
pub(crate) const KIND_OFFSET: usize = 4;
pub(crate) const PAGE_ID_OFFSET: usize = 8;
pub(crate) const TXN_ID_OFFSET: usize = 16;
pub(crate) const PAYLOAD_LEN_OFFSET: usize = 24;
pub(crate) const CHECKSUM_OFFSET: usize = 28;

const_assert!(CHECKSUM_OFFSET + 4 == PAGE_HDR_SIZE);
const_assert!(MIN_PAGE_SIZE.is_power_of_two());
const_assert!(MAX_PAGE_SIZE.is_power_of_two());
const_assert!(DEFAULT_PAGE_SIZE >= MIN_PAGE_SIZE && DEFAULT_PAGE_SIZE <= MAX_PAGE_SIZE);

/// Validate a page size chosen at database creation
pub fn check_page_size(page_size: usize) -> Result<()> {
    if !page_size.is_power_of_two() || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(Error::InvalidParameter(
            "page size must be a power of two between 512 and 65536",
        ));
    }
    Ok(())
}

/// Usable payload capacity of a page
pub fn usable_payload(page_size: usize) -> usize {
    page_size - PAGE_HDR_SIZE
}

/// Decoded common page header
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    /// Page kind tag
    pub kind: PageKind,
    /// Page number this page was written as
    pub page_id: PageId,
    /// Transaction that produced this page version
    pub txn_id: TransactionId,
    /// Length of the payload that follows the header
    pub payload_len: u32,
    /// CRC32 over the page image with this field zeroed
    pub checksum: u32,
}

impl PageHeader {
    /// Parse the common header from the front of a page image
    pub fn parse(image: &[u8]) -> Result<Self> {
        if image.len() < PAGE_HDR_SIZE {
            return Err(Error::Decoding("page image shorter than header".into()));
        }
        let magic = LittleEndian::read_u32(&image[MAGIC_OFFSET..]);
        if magic != PAGE_MAGIC {
            return Err(Error::Corruption {
                details: format!("bad page magic 0x{magic:08x}"),
                page_id: None,
            });
        }
        let tag = image[KIND_OFFSET];
        let kind = PageKind::from_tag(tag).ok_or_else(|| Error::Corruption {
            details: format!("unknown page kind tag {tag}"),
            page_id: None,
        })?;
        Ok(Self {
            kind,
            page_id: PageId(LittleEndian::read_u64(&image[PAGE_ID_OFFSET..])),
            txn_id: TransactionId(LittleEndian::read_u64(&image[TXN_ID_OFFSET..])),
            payload_len: LittleEndian::read_u32(&image[PAYLOAD_LEN_OFFSET..]),
            checksum: LittleEndian::read_u32(&image[CHECKSUM_OFFSET..]),
        })
    }
}

/// An owned page image
///
/// Encoders fill the payload area and call [`PageBuf::seal`]; the pager
/// validates images read from disk with [`PageBuf::from_bytes`].
pub struct PageBuf {
    buf: Vec<u8>,
    payload_len: usize,
}

impl PageBuf {
    /// Create a fresh page image with the header fields populated
    pub fn new(page_size: usize, kind: PageKind, page_id: PageId, txn_id: TransactionId) -> Self {
        let mut buf = vec![0u8; page_size];
        LittleEndian::write_u32(&mut buf[MAGIC_OFFSET..], PAGE_MAGIC);
        buf[KIND_OFFSET] = kind.tag();
        LittleEndian::write_u64(&mut buf[PAGE_ID_OFFSET..], page_id.0);
        LittleEndian::write_u64(&mut buf[TXN_ID_OFFSET..], txn_id.0);
        Self { buf, payload_len: 0 }
    }

    /// Validate a page image read from disk
    ///
    /// Checks magic, the stored page id against the id the caller read
    /// from, the checksum, and (when given) the expected kind.
    pub fn from_bytes(buf: Vec<u8>, page_id: PageId, expected: Option<PageKind>) -> Result<Self> {
        let header = PageHeader::parse(&buf).map_err(|e| match e {
            Error::Corruption { details, .. } => Error::Corruption {
                details,
                page_id: Some(page_id),
            },
            other => other,
        })?;
        checksum::verify(&buf, page_id)?;
        if header.page_id != page_id {
            return Err(Error::Corruption {
                details: format!("page stamped as {} read at {}", header.page_id, page_id),
                page_id: Some(page_id),
            });
        }
        if header.payload_len as usize > buf.len() - PAGE_HDR_SIZE {
            return Err(Error::Corruption {
                details: format!("payload length {} exceeds page", header.payload_len),
                page_id: Some(page_id),
            });
        }
        if let Some(expected) = expected {
            if header.kind != expected {
                return Err(Error::InvalidPageKind { expected, found: header.kind });
            }
        }
        Ok(Self { payload_len: header.payload_len as usize, buf })
    }

    /// Decoded common header of this image
    pub fn header(&self) -> Result<PageHeader> {
        PageHeader::parse(&self.buf)
    }

    /// The page kind tag
    pub fn kind(&self) -> Result<PageKind> {
        let tag = self.buf[KIND_OFFSET];
        PageKind::from_tag(tag).ok_or_else(|| Error::Corruption {
            details: format!("unknown page kind tag {tag}"),
            page_id: None,
        })
    }

    /// The payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.buf[PAGE_HDR_SIZE..PAGE_HDR_SIZE + self.payload_len]
    }

    /// Writable payload area (full capacity)
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[PAGE_HDR_SIZE..]
    }

    /// Finish an image for writing: record the payload length, zero the
    /// unused tail, and stamp the checksum.
    pub fn seal(&mut self, payload_len: usize) {
        debug_assert!(payload_len <= self.buf.len() - PAGE_HDR_SIZE);
        self.payload_len = payload_len;
        LittleEndian::write_u32(&mut self.buf[PAYLOAD_LEN_OFFSET..], payload_len as u32);
        for byte in &mut self.buf[PAGE_HDR_SIZE + payload_len..] {
            *byte = 0;
        }
        checksum::stamp(&mut self.buf);
    }

    /// Raw image bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Page size of this image
    pub fn page_size(&self) -> usize {
        self.buf.len()
    }
}
