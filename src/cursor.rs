//! Ordered range scans
//!
//! Copy-on-write invalidates leaf sibling pointers, so scans never follow
//! them. A scan instead keeps a cursor stack of `(branch, child_index)`
//! frames from the root down to the current leaf and walks to the next
//! leaf by backtracking up the stack, exactly the shape the snapshot had
//! when the scan started. Sparse leaves left behind by deletes cost a few
//! extra frames and nothing else.

use crate::btree::NodeSource;
use crate::error::{Error, PageId, Result};
use crate::node::{BranchNode, LeafNode, Node};

/// Descent depth bound; a deeper path means a corrupt parent chain
const MAX_DEPTH: usize = 64;

/// Lazy ordered sequence of `(key, value)` pairs in `[start, end)`
///
/// Bound to one snapshot; concurrent commits are invisible to it. Items
/// are `Result` because every step may touch a page that fails
/// validation; after an error the iterator fuses.
pub struct Range<'txn, S: NodeSource + ?Sized> {
    src: &'txn S,
    end: Vec<u8>,
    stack: Vec<(BranchNode, usize)>,
    leaf: Option<(LeafNode, usize)>,
    finished: bool,
}

impl<'txn, S: NodeSource + ?Sized> Range<'txn, S> {
    /// Position a scan at the first key `>= start`
    pub(crate) fn seek(src: &'txn S, root: PageId, start: &[u8], end: &[u8]) -> Result<Self> {
        let mut range = Self {
            src,
            end: end.to_vec(),
            stack: Vec::new(),
            leaf: None,
            finished: false,
        };
        if start >= end {
            range.finished = true;
            return Ok(range);
        }
        let mut at = root;
        for _ in 0..MAX_DEPTH {
            match src.node(at)? {
                Node::Branch(branch) => {
                    let child_index = branch.child_index(start);
                    at = branch.children[child_index];
                    range.stack.push((branch, child_index));
                }
                Node::Leaf(leaf) => {
                    let cell = leaf.cells.partition_point(|(k, _)| k.as_slice() < start);
                    range.leaf = Some((leaf, cell));
                    return Ok(range);
                }
            }
        }
        Err(Error::Corruption {
            details: format!("tree deeper than {MAX_DEPTH} levels"),
            page_id: Some(at),
        })
    }

    /// Step to the leftmost leaf of the next sibling subtree
    ///
    /// Pops exhausted frames; returns `false` once the stack empties,
    /// which is the end of the tree.
    fn next_leaf(&mut self) -> Result<bool> {
        self.leaf = None;
        loop {
            let descend_from = match self.stack.last_mut() {
                None => return Ok(false),
                Some((branch, child_index)) => {
                    if *child_index + 1 < branch.children.len() {
                        *child_index += 1;
                        Some(branch.children[*child_index])
                    } else {
                        None
                    }
                }
            };
            match descend_from {
                None => {
                    self.stack.pop();
                }
                Some(mut at) => {
                    for _ in 0..MAX_DEPTH {
                        match self.src.node(at)? {
                            Node::Branch(branch) => {
                                at = branch.children[0];
                                self.stack.push((branch, 0));
                            }
                            Node::Leaf(leaf) => {
                                self.leaf = Some((leaf, 0));
                                return Ok(true);
                            }
                        }
                    }
                    return Err(Error::Corruption {
                        details: format!("tree deeper than {MAX_DEPTH} levels"),
                        page_id: Some(at),
                    });
                }
            }
        }
    }
}

impl<S: NodeSource + ?Sized> Iterator for Range<'_, S> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if let Some((leaf, cell)) = &mut self.leaf {
                if *cell < leaf.cells.len() {
                    let (key, value) = leaf.cells[*cell].clone();
                    *cell += 1;
                    if key.as_slice() >= self.end.as_slice() {
                        self.finished = true;
                        return None;
                    }
                    return Some(Ok((key, value)));
                }
            }
            match self.next_leaf() {
                Ok(true) => {}
                Ok(false) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
