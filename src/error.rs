//! Error types for pagekv

use std::fmt;
use std::io;
use thiserror::Error;

/// The main error type for pagekv operations
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(String),

    /// Database corruption detected
    #[error("corruption detected: {details}")]
    Corruption {
        /// Description of the corruption
        details: String,
        /// Page where corruption was detected
        page_id: Option<PageId>,
    },

    /// Neither meta slot validates; the database is unrecoverable
    #[error("both meta pages are invalid")]
    Corrupted,

    /// Key/value pair cannot fit within a single leaf page
    #[error("entry too large: {size} bytes (max {max})")]
    ValueTooLarge {
        /// Size that was attempted
        size: usize,
        /// Maximum size a leaf page can hold
        max: usize,
    },

    /// Operation on a transaction that was already committed or aborted
    #[error("transaction is no longer usable")]
    TxnAborted,

    /// Mutation attempted on a read transaction or read-only environment
    #[error("write attempted on a read-only handle")]
    ReadOnly,

    /// Reader table is at capacity
    #[error("reader table full")]
    ReadersFull,

    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// On-disk format version mismatch
    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected format version
        expected: u32,
        /// Found format version
        found: u32,
    },

    /// Page kind tag did not match what the caller expected
    #[error("invalid page kind: expected {expected:?}, found {found:?}")]
    InvalidPageKind {
        /// Expected page kind
        expected: PageKind,
        /// Found page kind
        found: PageKind,
    },

    /// Payload decoding failed
    #[error("decoding error: {0}")]
    Decoding(std::borrow::Cow<'static, str>),
}

/// Page identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(pub u64);

impl PageId {
    /// Convert to byte offset in the file
    pub fn to_offset(self, page_size: usize) -> u64 {
        self.0 * page_size as u64
    }

    /// Whether this is the null sentinel
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page kind tags as persisted in the common page header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageKind {
    /// File header page (static after creation)
    Header = 1,
    /// Meta page (one of the two alternating slots)
    Meta = 2,
    /// Leaf page (contains key/value cells)
    Leaf = 3,
    /// Branch page (internal B+ tree node)
    Branch = 4,
    /// Freelist page (reclaimable page records)
    Freelist = 5,
}

impl PageKind {
    /// Decode a kind tag read from a page header
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(PageKind::Header),
            2 => Some(PageKind::Meta),
            3 => Some(PageKind::Leaf),
            4 => Some(PageKind::Branch),
            5 => Some(PageKind::Freelist),
            _ => None,
        }
    }

    /// The on-disk tag for this kind
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Result type alias for pagekv operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
