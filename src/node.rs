//! Leaf and branch payload codecs
//!
//! A leaf holds an ordered run of `(key, value)` cells; a branch holds
//! child pointers interleaved with separator keys. Nodes are decoded into
//! owned structures, mutated in memory by the writer, and re-encoded into
//! fresh pages at commit.
//!
//! Overflow is judged by serialized byte size, never by cell count, and
//! the split point is chosen by cumulative byte size so variable-length
//! cells always land in halves that fit.

use crate::error::{Error, PageId, PageKind, Result, TransactionId};
use crate::page::{usable_payload, PageBuf};
use byteorder::{ByteOrder, LittleEndian};

/// Per-cell overhead in a leaf: key length + value length prefixes
pub const LEAF_CELL_OVERHEAD: usize = 8;

/// Per-entry overhead in a branch: separator length prefix + child id
pub const BRANCH_ENTRY_OVERHEAD: usize = 12;

/// Payload prefix shared by both node kinds: the entry count
const COUNT_SIZE: usize = 4;

/// Largest key accepted, chosen so at least four cells fit per leaf
pub fn max_key_size(page_size: usize) -> usize {
    usable_payload(page_size) / 4 - LEAF_CELL_OVERHEAD
}

/// Largest cell accepted: a lone cell must still fit a leaf page
pub fn max_cell_size(page_size: usize) -> usize {
    usable_payload(page_size) - COUNT_SIZE - LEAF_CELL_OVERHEAD
}

/// A decoded B+ tree node
#[derive(Debug, Clone)]
pub enum Node {
    /// Leaf node with key/value cells
    Leaf(LeafNode),
    /// Branch node with children and separators
    Branch(BranchNode),
}

impl Node {
    /// Kind tag this node encodes as
    pub fn kind(&self) -> PageKind {
        match self {
            Node::Leaf(_) => PageKind::Leaf,
            Node::Branch(_) => PageKind::Branch,
        }
    }

    /// Serialized payload size
    pub fn encoded_size(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.encoded_size(),
            Node::Branch(branch) => branch.encoded_size(),
        }
    }

    /// Decode a node payload given its page kind
    pub fn decode(kind: PageKind, payload: &[u8]) -> Result<Self> {
        match kind {
            PageKind::Leaf => Ok(Node::Leaf(LeafNode::decode(payload)?)),
            PageKind::Branch => Ok(Node::Branch(BranchNode::decode(payload)?)),
            other => Err(Error::Decoding(
                format!("page kind {other:?} is not a tree node").into(),
            )),
        }
    }

    /// Encode into a fresh page image
    pub fn to_page(&self, page_size: usize, page_id: PageId, txn_id: TransactionId) -> PageBuf {
        let mut page = PageBuf::new(page_size, self.kind(), page_id, txn_id);
        let len = match self {
            Node::Leaf(leaf) => leaf.encode(page.payload_mut()),
            Node::Branch(branch) => branch.encode(page.payload_mut()),
        };
        page.seal(len);
        page
    }
}

/// An ordered run of key/value cells
#[derive(Debug, Clone, Default)]
pub struct LeafNode {
    /// Cells in strictly ascending key order
    pub cells: Vec<(Vec<u8>, Vec<u8>)>,
}

impl LeafNode {
    /// An empty leaf
    pub fn empty() -> Self {
        Self { cells: Vec::new() }
    }

    /// Serialized payload size
    pub fn encoded_size(&self) -> usize {
        COUNT_SIZE
            + self
                .cells
                .iter()
                .map(|(k, v)| LEAF_CELL_OVERHEAD + k.len() + v.len())
                .sum::<usize>()
    }

    /// Binary-search for a key
    pub fn search(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        self.cells.binary_search_by(|(k, _)| k.as_slice().cmp(key))
    }

    /// Look up a value
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.search(key).ok().map(|i| self.cells[i].1.as_slice())
    }

    /// Insert or overwrite a cell, keeping the order
    pub fn upsert(&mut self, key: Vec<u8>, value: Vec<u8>) {
        match self.search(&key) {
            Ok(i) => self.cells[i].1 = value,
            Err(i) => self.cells.insert(i, (key, value)),
        }
    }

    /// Remove a cell, reporting whether it existed
    pub fn remove(&mut self, key: &[u8]) -> bool {
        match self.search(key) {
            Ok(i) => {
                self.cells.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    /// Split into two halves by cumulative byte size
    ///
    /// Returns `(left, separator, right)` where the separator is a copy of
    /// the right half's smallest key. Fails when no split index yields two
    /// halves that each fit the usable payload.
    pub fn split(mut self, usable: usize) -> Result<(LeafNode, Vec<u8>, LeafNode)> {
        let sizes: Vec<usize> = self
            .cells
            .iter()
            .map(|(k, v)| LEAF_CELL_OVERHEAD + k.len() + v.len())
            .collect();
        let i = split_index(&sizes, COUNT_SIZE, COUNT_SIZE, usable).ok_or({
            Error::ValueTooLarge { size: self.encoded_size(), max: usable }
        })?;
        let right = LeafNode { cells: self.cells.split_off(i) };
        let sep = right.cells[0].0.clone();
        Ok((self, sep, right))
    }

    /// Encode into a payload buffer, returning the length written
    pub fn encode(&self, out: &mut [u8]) -> usize {
        LittleEndian::write_u32(&mut out[0..], self.cells.len() as u32);
        let mut at = COUNT_SIZE;
        for (key, value) in &self.cells {
            LittleEndian::write_u32(&mut out[at..], key.len() as u32);
            LittleEndian::write_u32(&mut out[at + 4..], value.len() as u32);
            at += LEAF_CELL_OVERHEAD;
            out[at..at + key.len()].copy_from_slice(key);
            at += key.len();
            out[at..at + value.len()].copy_from_slice(value);
            at += value.len();
        }
        at
    }

    /// Decode from a leaf payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < COUNT_SIZE {
            return Err(Error::Decoding("leaf payload truncated".into()));
        }
        let count = LittleEndian::read_u32(payload) as usize;
        let mut at = COUNT_SIZE;
        let mut cells = Vec::with_capacity(count);
        for _ in 0..count {
            if payload.len() < at + LEAF_CELL_OVERHEAD {
                return Err(Error::Decoding("leaf cell header truncated".into()));
            }
            let key_len = LittleEndian::read_u32(&payload[at..]) as usize;
            let val_len = LittleEndian::read_u32(&payload[at + 4..]) as usize;
            at += LEAF_CELL_OVERHEAD;
            if payload.len() < at + key_len + val_len {
                return Err(Error::Decoding("leaf cell body truncated".into()));
            }
            let key = payload[at..at + key_len].to_vec();
            at += key_len;
            let value = payload[at..at + val_len].to_vec();
            at += val_len;
            cells.push((key, value));
        }
        let node = Self { cells };
        if !node.cells.windows(2).all(|w| w[0].0 < w[1].0) {
            return Err(Error::Decoding("leaf keys out of order".into()));
        }
        Ok(node)
    }
}

/// Child pointers interleaved with separator keys
///
/// `children[i]` covers keys `k` with `seps[i-1] <= k < seps[i]`, with the
/// outer separators taken as minus and plus infinity.
#[derive(Debug, Clone)]
pub struct BranchNode {
    /// Child page ids, always one more than `seps`
    pub children: Vec<PageId>,
    /// Separator keys, copies of each right child's smallest key at split
    pub seps: Vec<Vec<u8>>,
}

impl BranchNode {
    /// Index of the child covering `key`
    pub fn child_index(&self, key: &[u8]) -> usize {
        self.seps.partition_point(|sep| sep.as_slice() <= key)
    }

    /// Serialized payload size
    pub fn encoded_size(&self) -> usize {
        COUNT_SIZE
            + 8
            + self
                .seps
                .iter()
                .map(|sep| BRANCH_ENTRY_OVERHEAD + sep.len())
                .sum::<usize>()
    }

    /// Split into two halves by cumulative byte size
    ///
    /// The separator between the halves moves up to the parent rather than
    /// being copied into either half.
    pub fn split(mut self, usable: usize) -> Result<(BranchNode, Vec<u8>, BranchNode)> {
        // Entry 0 is the leading child id; entry i > 0 carries seps[i-1].
        // The right half's first entry loses its separator to the parent,
        // which only shrinks it, so sizing by full entries stays safe.
        let mut sizes = Vec::with_capacity(self.children.len());
        sizes.push(8);
        for sep in &self.seps {
            sizes.push(BRANCH_ENTRY_OVERHEAD + sep.len());
        }
        let i = split_index(&sizes, COUNT_SIZE, COUNT_SIZE + 8, usable).ok_or({
            Error::ValueTooLarge { size: self.encoded_size(), max: usable }
        })?;
        let right_children = self.children.split_off(i);
        let mut right_seps = self.seps.split_off(i - 1);
        let promoted = right_seps.remove(0);
        Ok((
            self,
            promoted,
            BranchNode { children: right_children, seps: right_seps },
        ))
    }

    /// Encode into a payload buffer, returning the length written
    pub fn encode(&self, out: &mut [u8]) -> usize {
        debug_assert_eq!(self.children.len(), self.seps.len() + 1);
        LittleEndian::write_u32(&mut out[0..], self.children.len() as u32);
        let mut at = COUNT_SIZE;
        LittleEndian::write_u64(&mut out[at..], self.children[0].0);
        at += 8;
        for (sep, child) in self.seps.iter().zip(&self.children[1..]) {
            LittleEndian::write_u32(&mut out[at..], sep.len() as u32);
            at += 4;
            out[at..at + sep.len()].copy_from_slice(sep);
            at += sep.len();
            LittleEndian::write_u64(&mut out[at..], child.0);
            at += 8;
        }
        at
    }

    /// Decode from a branch payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < COUNT_SIZE + 8 {
            return Err(Error::Decoding("branch payload truncated".into()));
        }
        let count = LittleEndian::read_u32(payload) as usize;
        if count == 0 {
            return Err(Error::Decoding("branch has no children".into()));
        }
        let mut at = COUNT_SIZE;
        let mut children = Vec::with_capacity(count);
        let mut seps = Vec::with_capacity(count.saturating_sub(1));
        children.push(PageId(LittleEndian::read_u64(&payload[at..])));
        at += 8;
        for _ in 1..count {
            if payload.len() < at + 4 {
                return Err(Error::Decoding("branch entry truncated".into()));
            }
            let sep_len = LittleEndian::read_u32(&payload[at..]) as usize;
            at += 4;
            if payload.len() < at + sep_len + 8 {
                return Err(Error::Decoding("branch entry truncated".into()));
            }
            seps.push(payload[at..at + sep_len].to_vec());
            at += sep_len;
            children.push(PageId(LittleEndian::read_u64(&payload[at..])));
            at += 8;
        }
        if !seps.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::Decoding("branch separators out of order".into()));
        }
        Ok(Self { children, seps })
    }
}

/// Choose a split index by cumulative byte size
///
/// `sizes[i]` is the serialized size of entry `i`; splitting at `i` puts
/// entries `[0, i)` on the left and `[i, n)` on the right. The primary
/// candidate is the smallest `i` whose left half exceeds half the usable
/// payload; when that candidate leaves a half that does not fit (an
/// oversized entry), the smallest index where both halves fit is used
/// instead. `None` means no split works and the insert must be rejected.
fn split_index(sizes: &[usize], left_base: usize, right_base: usize, usable: usize) -> Option<usize> {
    let n = sizes.len();
    if n < 2 {
        return None;
    }
    let total: usize = sizes.iter().sum();
    let half = usable / 2;
    let mut prefix = 0usize;
    let mut primary = None;
    for (i, size) in sizes.iter().enumerate().take(n - 1) {
        prefix += size;
        let split_at = i + 1;
        if left_base + prefix > half {
            primary = Some((split_at, prefix));
            break;
        }
    }
    if let Some((i, prefix)) = primary {
        if left_base + prefix <= usable && right_base + (total - prefix) <= usable {
            return Some(i);
        }
    }
    // Oversized-entry fallback: first index where both halves fit
    let mut prefix = 0usize;
    for (i, size) in sizes.iter().enumerate().take(n - 1) {
        prefix += size;
        let split_at = i + 1;
        if left_base + prefix <= usable && right_base + (total - prefix) <= usable {
            return Some(split_at);
        }
    }
    None
}
