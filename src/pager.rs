//! Checked page access above the raw file
//!
//! The pager maps page ids to file offsets, validates the common header
//! and checksum on every read, and seals images (payload length, zeroed
//! tail, checksum) on every write. It keeps no cache of its own; the host
//! page cache is enough for this engine.

use crate::error::{Error, PageId, PageKind, Result, TransactionId};
use crate::io::FileIo;
use crate::node::Node;
use crate::page::{usable_payload, PageBuf};

/// Page-granular access to the database file
pub struct Pager {
    io: FileIo,
    page_size: usize,
}

impl Pager {
    /// Wrap a file backend with a fixed page size
    pub fn new(io: FileIo, page_size: usize) -> Self {
        Self { io, page_size }
    }

    /// The page size this database was created with
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Usable payload capacity of a page
    pub fn usable(&self) -> usize {
        usable_payload(self.page_size)
    }

    /// Whether the underlying file refuses writes
    pub fn read_only(&self) -> bool {
        self.io.read_only()
    }

    /// Read and validate the page at `page_id`
    ///
    /// `expected` narrows the accepted kind; corruption of any byte in the
    /// image, padding included, fails the checksum.
    pub fn read_page(&self, page_id: PageId, expected: Option<PageKind>) -> Result<PageBuf> {
        let bytes = self.io.read_at(page_id.to_offset(self.page_size), self.page_size)?;
        PageBuf::from_bytes(bytes, page_id, expected)
    }

    /// Read a page and decode it as a tree node
    pub fn read_node(&self, page_id: PageId) -> Result<Node> {
        let page = self.read_page(page_id, None)?;
        let kind = page.kind()?;
        if kind != PageKind::Leaf && kind != PageKind::Branch {
            return Err(Error::InvalidPageKind { expected: PageKind::Leaf, found: kind });
        }
        Node::decode(kind, page.payload()).map_err(|e| Error::Corruption {
            details: e.to_string(),
            page_id: Some(page_id),
        })
    }

    /// Seal and write a page image at its recorded id
    ///
    /// The file is extended lazily: writing past the current end grows it.
    pub fn write_page(&self, page: &mut PageBuf, payload_len: usize) -> Result<()> {
        page.seal(payload_len);
        let header = page.header()?;
        self.io.write_at(header.page_id.to_offset(self.page_size), page.as_bytes())
    }

    /// Write an already-sealed page image
    pub fn write_sealed(&self, page: &PageBuf) -> Result<()> {
        let header = page.header()?;
        self.io.write_at(header.page_id.to_offset(self.page_size), page.as_bytes())
    }

    /// Encode a node into a page stamped with the writer's txn id and
    /// write it out
    pub fn write_node(
        &self,
        page_id: PageId,
        txn_id: TransactionId,
        node: &Node,
    ) -> Result<()> {
        let page = node.to_page(self.page_size, page_id, txn_id);
        self.write_sealed(&page)
    }

    /// Flush all written pages to durable storage
    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    /// Raw backend access for open-time bootstrap
    pub(crate) fn io(&self) -> &FileIo {
        &self.io
    }
}
