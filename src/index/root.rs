//! # Root Nodes
//!
//! A root is the optional second level of an index: an ordered array of
//! leaf references whose key ranges are non-overlapping and ascending.
//! There is never a root of roots; the tree is one or two levels deep by
//! construction.
//!
//! ## Leaf Selection
//!
//! `find_leaf` binary-searches the leaf array using each leaf's **last**
//! entry as the partition key. A probe that compares below the last entry
//! is refined with a second comparison against the leaf's **first** entry
//! to decide whether the name can only be inside that leaf or must belong
//! further left. Collapsing this into a single comparison breaks
//! correctness exactly at leaf boundaries, where a name can fall in the
//! gap between one leaf's maximum and the next leaf's minimum.
//!
//! The search tail is explicit and asymmetric: the `low` probe refines
//! against the first entry, the `high` probe does not — a name known to be
//! above `low`'s last entry and below `high`'s last entry belongs to
//! `high` whether or not it is below `high`'s first entry, because that is
//! where an insert must place it. A name above every leaf reports "no
//! leaf, nearest slot is the last one" so the caller knows which leaf to
//! grow or split.

use eyre::{ensure, Result};

use crate::config::NODE_HEADER_SIZE;
use crate::store::{CellRef, CellStore};

use super::leaf::LeafNode;
use super::name::Upcase;
use super::node::{NodeHeader, NodeKind};

use std::cmp::Ordering;

/// Outcome of a root descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootSearch {
    /// Slot of the last leaf examined. When `leaf` is `None`, the name
    /// falls outside every leaf's range and this is the nearest slot.
    pub slot: usize,
    /// The only leaf that could contain the name, if any.
    pub leaf: Option<CellRef>,
}

#[derive(Debug)]
pub struct RootNode<'a> {
    data: &'a [u8],
}

pub struct RootNodeMut<'a> {
    data: &'a mut [u8],
}

fn check_root(data: &[u8]) -> Result<()> {
    let header = NodeHeader::from_bytes(data)?;
    let kind = header.kind()?;
    ensure!(kind == NodeKind::Root, "expected a root node, got {:?}", kind);
    let capacity = (data.len() - NODE_HEADER_SIZE) / NodeKind::Root.entry_size();
    ensure!(
        usize::from(header.count()) <= capacity,
        "root count {} exceeds cell capacity {}",
        header.count(),
        capacity
    );
    Ok(())
}

impl<'a> RootNode<'a> {
    pub fn from_cell(data: &'a [u8]) -> Result<Self> {
        check_root(data)?;
        Ok(Self { data })
    }

    pub fn count(&self) -> u16 {
        NodeHeader::from_bytes(self.data).unwrap().count()
    }

    pub fn capacity(&self) -> usize {
        (self.data.len() - NODE_HEADER_SIZE) / NodeKind::Root.entry_size()
    }

    pub fn free_slots(&self) -> usize {
        self.capacity() - usize::from(self.count())
    }

    fn slot_offset(&self, slot: usize) -> usize {
        NODE_HEADER_SIZE + slot * NodeKind::Root.entry_size()
    }

    pub fn leaf_at(&self, slot: usize) -> Result<CellRef> {
        ensure!(
            slot < usize::from(self.count()),
            "leaf slot {} out of bounds (count={})",
            slot,
            self.count()
        );
        let off = self.slot_offset(slot);
        let bits = u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap());
        Ok(CellRef::from_bits(bits))
    }

    fn compare_to_last<S: CellStore>(
        &self,
        store: &S,
        upcase: Upcase,
        name: &[u16],
        leaf_cell: CellRef,
    ) -> Result<Ordering> {
        self.compare_to_boundary(store, upcase, name, leaf_cell, true)
    }

    fn compare_to_first<S: CellStore>(
        &self,
        store: &S,
        upcase: Upcase,
        name: &[u16],
        leaf_cell: CellRef,
    ) -> Result<Ordering> {
        self.compare_to_boundary(store, upcase, name, leaf_cell, false)
    }

    fn compare_to_boundary<S: CellStore>(
        &self,
        store: &S,
        upcase: Upcase,
        name: &[u16],
        leaf_cell: CellRef,
        last: bool,
    ) -> Result<Ordering> {
        let data = store.cell(leaf_cell)?;
        let leaf = LeafNode::from_cell(data)?;
        let count = usize::from(leaf.count());
        ensure!(count > 0, "empty leaf {leaf_cell:?} linked in root index");
        let index = if last { count - 1 } else { 0 };
        leaf.compare_at(store, upcase, name, index)
    }

    /// Selects the leaf that would contain `name`, if any leaf can.
    pub fn find_leaf<S: CellStore>(
        &self,
        store: &S,
        upcase: Upcase,
        name: &[u16],
    ) -> Result<RootSearch> {
        let count = usize::from(self.count());
        ensure!(count > 0, "root node has no leaves");

        let mut low = 0usize;
        let mut high = count - 1;
        while high - low > 1 {
            let probe = low + (high - low) / 2;
            let leaf_cell = self.leaf_at(probe)?;
            match self.compare_to_last(store, upcase, name, leaf_cell)? {
                Ordering::Equal => {
                    return Ok(RootSearch {
                        slot: probe,
                        leaf: Some(leaf_cell),
                    })
                }
                Ordering::Less => {
                    // below the last entry; at or above the first entry
                    // means it can only be inside this leaf
                    if self.compare_to_first(store, upcase, name, leaf_cell)? != Ordering::Less {
                        return Ok(RootSearch {
                            slot: probe,
                            leaf: Some(leaf_cell),
                        });
                    }
                    high = probe;
                }
                Ordering::Greater => low = probe,
            }
        }

        // window is one or two slots wide: probe low, then high
        let low_cell = self.leaf_at(low)?;
        match self.compare_to_last(store, upcase, name, low_cell)? {
            Ordering::Equal => {
                return Ok(RootSearch {
                    slot: low,
                    leaf: Some(low_cell),
                })
            }
            Ordering::Less => {
                if self.compare_to_first(store, upcase, name, low_cell)? != Ordering::Less {
                    return Ok(RootSearch {
                        slot: low,
                        leaf: Some(low_cell),
                    });
                }
                // between the previous leaf and this one, or off the left end
                return Ok(RootSearch { slot: low, leaf: None });
            }
            Ordering::Greater => {}
        }
        if high == low {
            // off the high end of a one-leaf window
            return Ok(RootSearch { slot: high, leaf: None });
        }
        let high_cell = self.leaf_at(high)?;
        match self.compare_to_last(store, upcase, name, high_cell)? {
            // above low's range and not above high's last entry: this leaf
            // would hold the name whether or not it is below high's first
            Ordering::Equal | Ordering::Less => Ok(RootSearch {
                slot: high,
                leaf: Some(high_cell),
            }),
            Ordering::Greater => Ok(RootSearch { slot: high, leaf: None }),
        }
    }
}

impl<'a> RootNodeMut<'a> {
    pub fn from_cell(data: &'a mut [u8]) -> Result<Self> {
        check_root(data)?;
        Ok(Self { data })
    }

    /// Initializes a root over a cell with a single leaf slot filled.
    pub fn init(data: &'a mut [u8], first_leaf: CellRef) -> Result<Self> {
        let mut root = Self::init_empty(data)?;
        root.push_leaf(first_leaf)?;
        Ok(root)
    }

    /// Initializes a root with no leaves yet. Only structural bulk
    /// operations build roots this way; a live index never exposes one.
    pub fn init_empty(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() >= NODE_HEADER_SIZE + NodeKind::Root.entry_size(),
            "cell of {} bytes cannot hold a root node",
            data.len()
        );
        let header = NodeHeader::from_bytes_mut(data)?;
        header.set_tag(NodeKind::Root.tag());
        header.set_count(0);
        Ok(Self { data })
    }

    pub fn count(&self) -> u16 {
        NodeHeader::from_bytes(self.data).unwrap().count()
    }

    pub fn capacity(&self) -> usize {
        (self.data.len() - NODE_HEADER_SIZE) / NodeKind::Root.entry_size()
    }

    pub fn free_slots(&self) -> usize {
        self.capacity() - usize::from(self.count())
    }

    fn slot_offset(&self, slot: usize) -> usize {
        NODE_HEADER_SIZE + slot * NodeKind::Root.entry_size()
    }

    pub fn as_ref(&self) -> RootNode<'_> {
        RootNode { data: self.data }
    }

    fn write_slot(&mut self, slot: usize, cell: CellRef) {
        let off = self.slot_offset(slot);
        self.data[off..off + 4].copy_from_slice(&cell.bits().to_le_bytes());
    }

    /// Replaces the leaf reference in an existing slot (relocation
    /// write-back).
    pub fn set_leaf_at(&mut self, slot: usize, cell: CellRef) -> Result<()> {
        ensure!(
            slot < usize::from(self.count()),
            "leaf slot {} out of bounds (count={})",
            slot,
            self.count()
        );
        self.write_slot(slot, cell);
        Ok(())
    }

    /// Links a new leaf immediately after `slot`, rippling later slots up.
    pub fn insert_leaf_after(&mut self, slot: usize, cell: CellRef) -> Result<()> {
        let count = usize::from(self.count());
        ensure!(
            slot < count,
            "leaf slot {} out of bounds (count={})",
            slot,
            count
        );
        ensure!(count < self.capacity(), "root is full: {} leaves", count);

        let start = self.slot_offset(slot + 1);
        let end = self.slot_offset(count);
        self.data
            .copy_within(start..end, start + NodeKind::Root.entry_size());
        self.write_slot(slot + 1, cell);

        let header = NodeHeader::from_bytes_mut(self.data)?;
        header.set_count(count as u16 + 1);
        Ok(())
    }

    /// Appends a leaf at the end of the array.
    pub fn push_leaf(&mut self, cell: CellRef) -> Result<()> {
        let count = usize::from(self.count());
        ensure!(count < self.capacity(), "root is full: {} leaves", count);
        self.write_slot(count, cell);
        let header = NodeHeader::from_bytes_mut(self.data)?;
        header.set_count(count as u16 + 1);
        Ok(())
    }

    /// Unlinks the leaf at `slot`, rippling later slots down.
    pub fn remove_leaf_at(&mut self, slot: usize) -> Result<()> {
        let count = usize::from(self.count());
        ensure!(
            slot < count,
            "leaf slot {} out of bounds (count={})",
            slot,
            count
        );

        let start = self.slot_offset(slot + 1);
        let end = self.slot_offset(count);
        let dest = self.slot_offset(slot);
        self.data.copy_within(start..end, dest);

        let header = NodeHeader::from_bytes_mut(self.data)?;
        header.set_count(count as u16 - 1);
        Ok(())
    }
}
