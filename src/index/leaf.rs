//! # Leaf Nodes
//!
//! A leaf holds the actual child entries, in one of three encodings:
//!
//! | Kind      | Entry layout              | Order       | Lookup            |
//! |-----------|---------------------------|-------------|-------------------|
//! | plain     | child ref (4B)            | sorted      | binary search     |
//! | hinted    | child ref + hint (8B)     | sorted      | binary search     |
//! | hashed    | child ref + hash (8B)     | unordered   | linear hash scan  |
//!
//! Sorted leaves keep strictly ascending name order at all times — the
//! invariant that makes binary search and the root's boundary probes
//! valid. Hashed leaves only promise compaction: removal shifts the tail
//! down, insertion appends.
//!
//! ## Search
//!
//! The binary search narrows `[low, high]` until the window is at most two
//! entries wide, then probes `low` and `high` explicitly. The explicit
//! tail is what pins down the "insertion point when absent" value at both
//! ends of the array: a miss reports the index of the first entry greater
//! than the name, or `count` when the name is beyond the last entry.
//!
//! Every comparison may dereference a child record and can therefore fail
//! if the store cannot materialize the cell; search propagates that error
//! and never folds it into "not found".
//!
//! ## Views
//!
//! `LeafNode` borrows cell bytes immutably, `LeafNodeMut` mutably. Both
//! validate the tag on construction. Entry mutation is ripple-copy over
//! the dense array; the backing allocation never shrinks on removal.

use std::cmp::Ordering;

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::NODE_HEADER_SIZE;
use crate::store::{CellRef, CellStore};

use super::name::{
    compare_name, compare_with_hint, encode_hint, hash_name, Upcase, HINT_UNITS,
};
use super::node::{NodeHeader, NodeKind};

/// Entry of a hinted leaf.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct HintEntry {
    child: U32,
    hint: [u8; HINT_UNITS],
}

impl HintEntry {
    pub fn new(child: CellRef, hint: [u8; HINT_UNITS]) -> Self {
        Self {
            child: U32::new(child.bits()),
            hint,
        }
    }

    pub fn child(&self) -> CellRef {
        CellRef::from_bits(self.child.get())
    }

    pub fn hint(&self) -> &[u8; HINT_UNITS] {
        &self.hint
    }
}

/// Entry of a hashed leaf.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct HashEntry {
    child: U32,
    hash: U32,
}

impl HashEntry {
    pub fn new(child: CellRef, hash: u32) -> Self {
        Self {
            child: U32::new(child.bits()),
            hash: U32::new(hash),
        }
    }

    pub fn child(&self) -> CellRef {
        CellRef::from_bits(self.child.get())
    }

    pub fn hash(&self) -> u32 {
        self.hash.get()
    }
}

/// Outcome of a leaf search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    Found { index: usize, child: CellRef },
    /// `index` is the insertion point: the first entry greater than the
    /// name, or `count`. Meaningless for hashed leaves, which have no
    /// order.
    NotFound { index: usize },
}

#[derive(Debug)]
pub struct LeafNode<'a> {
    data: &'a [u8],
    kind: NodeKind,
}

pub struct LeafNodeMut<'a> {
    data: &'a mut [u8],
    kind: NodeKind,
}

fn leaf_kind(data: &[u8]) -> Result<NodeKind> {
    let header = NodeHeader::from_bytes(data)?;
    let kind = header.kind()?;
    ensure!(kind.is_leaf(), "expected a leaf node, got {:?}", kind);
    let capacity = (data.len() - NODE_HEADER_SIZE) / kind.entry_size();
    ensure!(
        usize::from(header.count()) <= capacity,
        "leaf count {} exceeds cell capacity {}",
        header.count(),
        capacity
    );
    Ok(kind)
}

impl<'a> LeafNode<'a> {
    pub fn from_cell(data: &'a [u8]) -> Result<Self> {
        let kind = leaf_kind(data)?;
        Ok(Self { data, kind })
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn count(&self) -> u16 {
        NodeHeader::from_bytes(self.data).unwrap().count()
    }

    /// Entries this cell can hold without growing.
    pub fn capacity(&self) -> usize {
        (self.data.len() - NODE_HEADER_SIZE) / self.kind.entry_size()
    }

    pub fn free_slots(&self) -> usize {
        self.capacity() - usize::from(self.count())
    }

    fn entry_offset(&self, index: usize) -> usize {
        NODE_HEADER_SIZE + index * self.kind.entry_size()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        ensure!(
            index < usize::from(self.count()),
            "entry index {} out of bounds (count={})",
            index,
            self.count()
        );
        Ok(())
    }

    /// Child reference of the entry at `index`. Works for every encoding;
    /// the child is the first field of each entry shape.
    pub fn child_at(&self, index: usize) -> Result<CellRef> {
        self.check_index(index)?;
        let off = self.entry_offset(index);
        let bits = u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap());
        Ok(CellRef::from_bits(bits))
    }

    pub fn hint_at(&self, index: usize) -> Result<[u8; HINT_UNITS]> {
        ensure!(
            self.kind == NodeKind::HintLeaf,
            "hint access on a {:?} node",
            self.kind
        );
        self.check_index(index)?;
        let off = self.entry_offset(index) + 4;
        Ok(self.data[off..off + HINT_UNITS].try_into().unwrap())
    }

    pub fn hash_at(&self, index: usize) -> Result<u32> {
        ensure!(
            self.kind == NodeKind::HashLeaf,
            "hash access on a {:?} node",
            self.kind
        );
        self.check_index(index)?;
        let off = self.entry_offset(index) + 4;
        Ok(u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap()))
    }

    /// Raw bytes of the entries in `[start, end)`, for wholesale moves
    /// between cells.
    pub fn raw_entries(&self, start: usize, end: usize) -> Result<&'a [u8]> {
        ensure!(
            start <= end && end <= usize::from(self.count()),
            "entry range {}..{} out of bounds (count={})",
            start,
            end,
            self.count()
        );
        Ok(&self.data[self.entry_offset(start)..self.entry_offset(end)])
    }

    /// Compares `name` against the entry at `index`, using the hint fast
    /// path when this leaf carries hints.
    pub(crate) fn compare_at<S: CellStore>(
        &self,
        store: &S,
        upcase: Upcase,
        name: &[u16],
        index: usize,
    ) -> Result<Ordering> {
        let child = self.child_at(index)?;
        match self.kind {
            NodeKind::HintLeaf => {
                let hint = self.hint_at(index)?;
                compare_with_hint(store, upcase, name, &hint, child)
            }
            NodeKind::PlainLeaf | NodeKind::HashLeaf => {
                compare_name(store, upcase, name, child)
            }
            NodeKind::Root => unreachable!("leaf view cannot hold a root"),
        }
    }

    /// Locates `name` in this leaf.
    pub fn find<S: CellStore>(
        &self,
        store: &S,
        upcase: Upcase,
        name: &[u16],
    ) -> Result<SearchResult> {
        let count = usize::from(self.count());
        if count == 0 {
            return Ok(SearchResult::NotFound { index: 0 });
        }
        if self.kind == NodeKind::HashLeaf {
            return self.find_hashed(store, upcase, name);
        }

        let mut low = 0usize;
        let mut high = count - 1;
        while high - low > 1 {
            let probe = low + (high - low) / 2;
            match self.compare_at(store, upcase, name, probe)? {
                Ordering::Equal => {
                    return Ok(SearchResult::Found {
                        index: probe,
                        child: self.child_at(probe)?,
                    })
                }
                Ordering::Less => high = probe,
                Ordering::Greater => low = probe,
            }
        }

        // explicit tail: probe low, then high
        match self.compare_at(store, upcase, name, low)? {
            Ordering::Equal => {
                return Ok(SearchResult::Found {
                    index: low,
                    child: self.child_at(low)?,
                })
            }
            Ordering::Less => return Ok(SearchResult::NotFound { index: low }),
            Ordering::Greater => {}
        }
        if high == low {
            return Ok(SearchResult::NotFound { index: low + 1 });
        }
        match self.compare_at(store, upcase, name, high)? {
            Ordering::Equal => Ok(SearchResult::Found {
                index: high,
                child: self.child_at(high)?,
            }),
            Ordering::Less => Ok(SearchResult::NotFound { index: high }),
            Ordering::Greater => Ok(SearchResult::NotFound { index: high + 1 }),
        }
    }

    fn find_hashed<S: CellStore>(
        &self,
        store: &S,
        upcase: Upcase,
        name: &[u16],
    ) -> Result<SearchResult> {
        let target = hash_name(upcase, name);
        let count = usize::from(self.count());
        for i in 0..count {
            if self.hash_at(i)? != target {
                continue;
            }
            // hash hit; a full comparison decides whether it is real
            let child = self.child_at(i)?;
            if compare_name(store, upcase, name, child)? == Ordering::Equal {
                return Ok(SearchResult::Found { index: i, child });
            }
        }
        Ok(SearchResult::NotFound { index: count })
    }
}

impl<'a> LeafNodeMut<'a> {
    pub fn from_cell(data: &'a mut [u8]) -> Result<Self> {
        let kind = leaf_kind(data)?;
        Ok(Self { data, kind })
    }

    /// Initializes a fresh leaf over a cell, discarding prior contents.
    pub fn init(data: &'a mut [u8], kind: NodeKind) -> Result<Self> {
        ensure!(kind.is_leaf(), "cannot init a leaf as {:?}", kind);
        ensure!(
            data.len() >= NODE_HEADER_SIZE + kind.entry_size(),
            "cell of {} bytes cannot hold a {:?} leaf",
            data.len(),
            kind
        );
        let header = NodeHeader::from_bytes_mut(data)?;
        header.set_tag(kind.tag());
        header.set_count(0);
        Ok(Self { data, kind })
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn count(&self) -> u16 {
        NodeHeader::from_bytes(self.data).unwrap().count()
    }

    pub fn capacity(&self) -> usize {
        (self.data.len() - NODE_HEADER_SIZE) / self.kind.entry_size()
    }

    pub fn free_slots(&self) -> usize {
        self.capacity() - usize::from(self.count())
    }

    fn entry_offset(&self, index: usize) -> usize {
        NODE_HEADER_SIZE + index * self.kind.entry_size()
    }

    pub fn as_ref(&self) -> LeafNode<'_> {
        LeafNode {
            data: self.data,
            kind: self.kind,
        }
    }

    /// Writes a new entry at `index`, rippling later entries up one slot.
    /// The caller supplies the insertion point (from `find`) and must have
    /// verified capacity and absence of the name.
    pub fn insert_at(
        &mut self,
        index: usize,
        child: CellRef,
        name: &[u16],
        upcase: Upcase,
    ) -> Result<()> {
        let count = usize::from(self.count());
        ensure!(
            index <= count,
            "insert index {} out of bounds (count={})",
            index,
            count
        );
        ensure!(count < self.capacity(), "leaf is full: {} entries", count);

        let stride = self.kind.entry_size();
        let start = self.entry_offset(index);
        let end = self.entry_offset(count);
        self.data.copy_within(start..end, start + stride);

        match self.kind {
            NodeKind::PlainLeaf => {
                self.data[start..start + 4].copy_from_slice(&child.bits().to_le_bytes());
            }
            NodeKind::HintLeaf => {
                let entry = HintEntry::new(child, encode_hint(name));
                self.data[start..start + stride].copy_from_slice(entry.as_bytes());
            }
            NodeKind::HashLeaf => {
                let entry = HashEntry::new(child, hash_name(upcase, name));
                self.data[start..start + stride].copy_from_slice(entry.as_bytes());
            }
            NodeKind::Root => unreachable!("leaf view cannot hold a root"),
        }

        let header = NodeHeader::from_bytes_mut(self.data)?;
        header.set_count(count as u16 + 1);
        Ok(())
    }

    /// Removes the entry at `index`, rippling later entries down one slot.
    /// The allocation is not shrunk; capacity is reclaimed only when the
    /// whole leaf is freed.
    pub fn remove_at(&mut self, index: usize) -> Result<()> {
        let count = usize::from(self.count());
        ensure!(
            index < count,
            "remove index {} out of bounds (count={})",
            index,
            count
        );

        let start = self.entry_offset(index + 1);
        let end = self.entry_offset(count);
        let dest = self.entry_offset(index);
        self.data.copy_within(start..end, dest);

        let header = NodeHeader::from_bytes_mut(self.data)?;
        header.set_count(count as u16 - 1);
        Ok(())
    }

    /// Rewrites a hinted leaf as a plain leaf under the same handle,
    /// dropping the hints and keeping the sort order. Entries narrow from
    /// 8 to 4 bytes, so the rewrite always fits. One-way: a plain leaf is
    /// never hinted again.
    pub fn retag_plain(&mut self) -> Result<()> {
        ensure!(
            self.kind == NodeKind::HintLeaf,
            "only a hinted leaf can be rewritten as plain, got {:?}",
            self.kind
        );
        let count = usize::from(self.count());
        for i in 0..count {
            let src = NODE_HEADER_SIZE + i * 8;
            let dst = NODE_HEADER_SIZE + i * 4;
            self.data.copy_within(src..src + 4, dst);
        }
        let header = NodeHeader::from_bytes_mut(self.data)?;
        header.set_tag(NodeKind::PlainLeaf.tag());
        self.kind = NodeKind::PlainLeaf;
        Ok(())
    }

    /// Adopts a raw entry block moved from another leaf of the same kind.
    pub fn adopt_raw_entries(&mut self, raw: &[u8], count: usize) -> Result<()> {
        ensure!(
            raw.len() == count * self.kind.entry_size(),
            "raw entry block of {} bytes does not hold {} entries",
            raw.len(),
            count
        );
        ensure!(
            count <= self.capacity(),
            "{} entries exceed leaf capacity {}",
            count,
            self.capacity()
        );
        self.data[NODE_HEADER_SIZE..NODE_HEADER_SIZE + raw.len()].copy_from_slice(raw);
        let header = NodeHeader::from_bytes_mut(self.data)?;
        header.set_count(count as u16);
        Ok(())
    }

    /// Drops entries from the tail, keeping the first `count`.
    pub fn truncate(&mut self, count: usize) -> Result<()> {
        let current = usize::from(self.count());
        ensure!(
            count <= current,
            "cannot truncate {} entries to {}",
            current,
            count
        );
        let header = NodeHeader::from_bytes_mut(self.data)?;
        header.set_count(count as u16);
        Ok(())
    }
}
