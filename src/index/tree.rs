//! # Index Operations
//!
//! The operations a parent object performs against its child index: name
//! lookup, ordinal lookup, insertion, removal, whole-index duplication,
//! and child re-parenting. Everything here works through a [`CellStore`]
//! and the per-parent [`ChildSet`] bookkeeping; no global state.
//!
//! ## Structural Growth
//!
//! An index starts as `NIL`, becomes a single leaf on the first insert,
//! and grows through three transitions:
//!
//! 1. **Leaf growth** — the leaf cell is resized (1.5x, at least one
//!    entry) when its array fills. Resizing may relocate the cell, and
//!    every caller writes the surviving handle back into whatever pointed
//!    at the old one.
//! 2. **Hinted → plain rewrite** — a hinted leaf that reaches the fast
//!    ceiling is rewritten in place under the same handle, halving its
//!    entry stride. A hashed leaf at the structural limit is likewise
//!    rewritten as a sorted plain leaf, since hashed entries carry no
//!    order for a root to partition.
//! 3. **Root promotion and leaf split** — a plain leaf at the structural
//!    limit gets a root allocated above it; an overfull leaf under a root
//!    splits, the original keeping the smaller half (`old / 2`) and the
//!    new right-hand leaf taking the remainder.
//!
//! ## Failure Discipline
//!
//! Multi-step operations are ordered "all allocations succeed, then all
//! linking writes happen". A failed allocation mid-split frees the cells
//! the split already took and leaves the index exactly as it was. A
//! failed duplication frees every copy made so far. Re-parenting marks
//! every child writable before rewriting any back-reference, so a
//! mid-walk failure changes nothing.
//!
//! ## Leaf Selection on Insert
//!
//! When a root is present, the target leaf is chosen to avoid splits
//! (always the lowest-order leaf that can take the name):
//!
//! - a name inside some leaf's range goes to that leaf if it has room;
//! - a name off the edge of its neighborhood prefers an adjacent leaf
//!   with room before splitting;
//! - after any split the descent is re-run, because slots shift.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use crate::config::{IndexConfig, ROOT_ENTRY_SIZE};
use crate::store::{CellRef, CellStore, StorageClass};

use super::leaf::{LeafNode, LeafNodeMut, SearchResult};
use super::name::compare_units;
use super::node::{node_kind, node_size_for, NodeHeader, NodeKind};
use super::record::{KeyRecord, KeyRecordMut};
use super::root::{RootNode, RootNodeMut};

type NameBuf = SmallVec<[u16; 32]>;

/// Per-class index bookkeeping a parent stores: the handle of the index
/// (a bare leaf or a root), plus the child count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildList {
    pub root: CellRef,
    pub count: u32,
}

impl Default for ChildList {
    fn default() -> Self {
        Self {
            root: CellRef::NIL,
            count: 0,
        }
    }
}

/// The full child bookkeeping of one parent: one [`ChildList`] per
/// storage class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildSet {
    lists: [ChildList; StorageClass::COUNT],
}

impl ChildSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self, class: StorageClass) -> ChildList {
        self.lists[class.index()]
    }

    pub fn list_mut(&mut self, class: StorageClass) -> &mut ChildList {
        &mut self.lists[class.index()]
    }

    /// Children across both classes.
    pub fn total(&self) -> u32 {
        self.lists.iter().map(|list| list.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

enum Fresh {
    No,
    Leaf,
    Root,
}

/// Index operations bound to a store and a configuration.
///
/// Mutating methods need the exclusive `&mut` borrow this struct holds;
/// lookups only read. One `KeyIndex` can serve any number of parents —
/// the per-parent state lives in each [`ChildSet`].
pub struct KeyIndex<'a, S: CellStore> {
    store: &'a mut S,
    config: IndexConfig,
}

impl<'a, S: CellStore> KeyIndex<'a, S> {
    pub fn new(store: &'a mut S, config: IndexConfig) -> Self {
        debug_assert!(config.max_leaf_entries >= 2);
        debug_assert!(config.max_fast_entries >= 1);
        debug_assert!(config.max_fast_entries <= config.max_leaf_entries);
        Self { store, config }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Finds the child with the given name, trying the stable list first
    /// and then the volatile one.
    pub fn find_subkey(&self, set: &ChildSet, name: &[u16]) -> Result<Option<CellRef>> {
        for class in StorageClass::ALL {
            let list = set.list(class);
            if list.count == 0 {
                continue;
            }
            if let Some(child) = self.find_in_list(list, name)? {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    fn find_in_list(&self, list: ChildList, name: &[u16]) -> Result<Option<CellRef>> {
        let upcase = self.config.upcase;
        let mut leaf_cell = list.root;
        if node_kind(self.store.cell(list.root)?)? == NodeKind::Root {
            let root = RootNode::from_cell(self.store.cell(list.root)?)?;
            match root.find_leaf(self.store, upcase, name)?.leaf {
                Some(cell) => leaf_cell = cell,
                None => return Ok(None),
            }
        }
        let leaf = LeafNode::from_cell(self.store.cell(leaf_cell)?)?;
        match leaf.find(self.store, upcase, name)? {
            SearchResult::Found { child, .. } => Ok(Some(child)),
            SearchResult::NotFound { .. } => Ok(None),
        }
    }

    /// Returns the `ordinal`'th child, counting stable children first and
    /// volatile children after them. Sorted leaves enumerate in name
    /// order; hashed leaves in insertion order.
    pub fn subkey_by_ordinal(&self, set: &ChildSet, ordinal: u32) -> Result<Option<CellRef>> {
        let stable = set.list(StorageClass::Stable);
        if ordinal < stable.count {
            return self.nth_in_list(stable, ordinal).map(Some);
        }
        let volatile = set.list(StorageClass::Volatile);
        let rest = ordinal - stable.count;
        if rest < volatile.count {
            return self.nth_in_list(volatile, rest).map(Some);
        }
        Ok(None)
    }

    fn nth_in_list(&self, list: ChildList, mut ordinal: u32) -> Result<CellRef> {
        if node_kind(self.store.cell(list.root)?)? == NodeKind::Root {
            let root = RootNode::from_cell(self.store.cell(list.root)?)?;
            for slot in 0..usize::from(root.count()) {
                let leaf_cell = root.leaf_at(slot)?;
                let leaf = LeafNode::from_cell(self.store.cell(leaf_cell)?)?;
                let here = u32::from(leaf.count());
                if ordinal < here {
                    return leaf.child_at(ordinal as usize);
                }
                ordinal -= here;
            }
            bail!("ordinal walked past the last leaf; child counts are inconsistent");
        }
        let leaf = LeafNode::from_cell(self.store.cell(list.root)?)?;
        leaf.child_at(ordinal as usize)
    }

    /// Adds `child` to the index. The child's record supplies its name
    /// and its handle supplies the storage class. The name must not
    /// already be present.
    pub fn add_subkey(&mut self, set: &mut ChildSet, child: CellRef) -> Result<()> {
        let name: NameBuf = {
            let record = KeyRecord::from_cell(self.store.cell(child)?)?;
            record.name().to_units()
        };
        let class = child.class();

        let mut fresh = Fresh::No;
        if set.list(class).count == 0 {
            // first child in this class: allocate the initial leaf
            let kind = NodeKind::from(self.config.leaf_style);
            let cell = self.store.allocate(node_size_for(kind, 1), class, child)?;
            self.store.mark_dirty(cell)?;
            LeafNodeMut::init(self.store.cell_mut(cell)?, kind)?;
            set.list_mut(class).root = cell;
            fresh = Fresh::Leaf;
        } else {
            let handle = set.list(class).root;
            let (kind, node_count) = {
                let header = NodeHeader::from_bytes(self.store.cell(handle)?)?;
                (header.kind()?, usize::from(header.count()))
            };
            if kind == NodeKind::HintLeaf && node_count >= self.config.max_fast_entries {
                // outgrew the hint-bearing format; rewrite in place
                self.store.mark_dirty(handle)?;
                LeafNodeMut::from_cell(self.store.cell_mut(handle)?)?.retag_plain()?;
            } else if (kind == NodeKind::PlainLeaf || kind == NodeKind::HashLeaf)
                && node_count >= self.config.max_leaf_entries
            {
                if kind == NodeKind::HashLeaf {
                    // hashed entries carry no order a root could partition
                    self.rewrite_hashed_sorted(handle)?;
                }
                let root_cell = self
                    .store
                    .allocate(node_size_for(NodeKind::Root, 2), class, handle)?;
                self.store.mark_dirty(root_cell)?;
                RootNodeMut::init(self.store.cell_mut(root_cell)?, handle)?;
                set.list_mut(class).root = root_cell;
                fresh = Fresh::Root;
            }
        }

        match self.insert_descend(set, class, &name, child) {
            Ok(()) => {
                set.list_mut(class).count += 1;
                Ok(())
            }
            Err(err) => {
                self.undo_fresh_nodes(set, class, fresh);
                Err(err)
            }
        }
    }

    /// Rolls back the node allocations of a failed insert. Only nodes
    /// created by this call are touched; a root that already took a split
    /// stays, since it holds live entries.
    fn undo_fresh_nodes(&mut self, set: &mut ChildSet, class: StorageClass, fresh: Fresh) {
        match fresh {
            Fresh::No => {}
            Fresh::Leaf => {
                let cell = set.list(class).root;
                self.store.free(cell);
                set.list_mut(class).root = CellRef::NIL;
            }
            Fresh::Root => {
                let root_cell = set.list(class).root;
                let sole_leaf = self
                    .store
                    .cell(root_cell)
                    .ok()
                    .and_then(|data| {
                        let root = RootNode::from_cell(data).ok()?;
                        if root.count() == 1 {
                            root.leaf_at(0).ok()
                        } else {
                            None
                        }
                    });
                if let Some(leaf) = sole_leaf {
                    self.store.free(root_cell);
                    set.list_mut(class).root = leaf;
                }
            }
        }
    }

    fn insert_descend(
        &mut self,
        set: &mut ChildSet,
        class: StorageClass,
        name: &[u16],
        child: CellRef,
    ) -> Result<()> {
        let handle = set.list(class).root;
        if node_kind(self.store.cell(handle)?)? == NodeKind::Root {
            let (leaf_cell, slot) = self.select_leaf(set, class, name)?;
            let placed = self.add_to_leaf(leaf_cell, child, name)?;
            if placed != leaf_cell {
                // growth relocated the leaf; the root slot follows it
                let root_cell = set.list(class).root;
                RootNodeMut::from_cell(self.store.cell_mut(root_cell)?)?
                    .set_leaf_at(slot, placed)?;
            }
        } else {
            let placed = self.add_to_leaf(handle, child, name)?;
            set.list_mut(class).root = placed;
        }
        Ok(())
    }

    /// Inserts into a specific leaf, growing its cell first if the entry
    /// array is full. Returns the surviving leaf handle, which differs
    /// from `leaf_cell` when growth relocated the node.
    fn add_to_leaf(&mut self, leaf_cell: CellRef, child: CellRef, name: &[u16]) -> Result<CellRef> {
        let upcase = self.config.upcase;
        self.store.mark_dirty(leaf_cell)?;

        // resolve the insertion point before growing, so the resize is the
        // last step that can fail
        let (index, free_slots, stride) = {
            let leaf = LeafNode::from_cell(self.store.cell(leaf_cell)?)?;
            let index = match leaf.find(self.store, upcase, name)? {
                SearchResult::Found { child: present, .. } => {
                    bail!("child {present:?} already holds this name")
                }
                SearchResult::NotFound { index } => index,
            };
            (index, leaf.free_slots(), leaf.kind().entry_size())
        };

        let mut target = leaf_cell;
        if free_slots == 0 {
            let old_size = self.store.cell_size(leaf_cell)?;
            let grown = (old_size + old_size / 2).max(old_size + stride);
            target = self.store.resize(leaf_cell, grown)?;
        }

        let mut leaf = LeafNodeMut::from_cell(self.store.cell_mut(target)?)?;
        leaf.insert_at(index, child, name, upcase)?;
        Ok(target)
    }

    /// Chooses the leaf an insert should land in, splitting as a last
    /// resort. Returns the leaf handle and its root slot. The root handle
    /// in `set` may change (root growth relocates it); callers re-read it
    /// after this returns.
    fn select_leaf(
        &mut self,
        set: &mut ChildSet,
        class: StorageClass,
        name: &[u16],
    ) -> Result<(CellRef, usize)> {
        let upcase = self.config.upcase;
        let limit = self.config.max_leaf_entries;
        // the root will be edited or grown either way
        self.store.mark_dirty(set.list(class).root)?;

        loop {
            let root_cell = set.list(class).root;
            let (search, root_count) = {
                let root = RootNode::from_cell(self.store.cell(root_cell)?)?;
                (
                    root.find_leaf(self.store, upcase, name)?,
                    usize::from(root.count()),
                )
            };

            let split_slot = match search.leaf {
                Some(leaf_cell) => {
                    // the name can only live inside this leaf
                    if self.leaf_count_of(leaf_cell)? < limit {
                        return Ok((leaf_cell, search.slot));
                    }
                    search.slot
                }
                None => {
                    let slot = search.slot;
                    let candidate = self.root_leaf_at(root_cell, slot)?;
                    let off_left = {
                        let leaf = LeafNode::from_cell(self.store.cell(candidate)?)?;
                        leaf.compare_at(self.store, upcase, name, 0)?
                            == std::cmp::Ordering::Less
                    };
                    if off_left {
                        // prefer the leaf to the left; at the left end the
                        // candidate itself is the leftmost leaf
                        let neighbor_slot = slot.saturating_sub(1);
                        let neighbor = self.root_leaf_at(root_cell, neighbor_slot)?;
                        if self.leaf_count_of(neighbor)? < limit {
                            return Ok((neighbor, neighbor_slot));
                        }
                    } else {
                        // off the right edge of the candidate
                        if self.leaf_count_of(candidate)? < limit {
                            return Ok((candidate, slot));
                        }
                        if slot + 1 < root_count {
                            let right = self.root_leaf_at(root_cell, slot + 1)?;
                            if self.leaf_count_of(right)? < limit {
                                return Ok((right, slot + 1));
                            }
                        }
                    }
                    slot
                }
            };

            // no leaf can take the name without splitting; split and
            // search again, since slots shift
            self.split_leaf(set, class, split_slot)?;
        }
    }

    fn root_leaf_at(&self, root_cell: CellRef, slot: usize) -> Result<CellRef> {
        RootNode::from_cell(self.store.cell(root_cell)?)?.leaf_at(slot)
    }

    fn leaf_count_of(&self, leaf_cell: CellRef) -> Result<usize> {
        let leaf = LeafNode::from_cell(self.store.cell(leaf_cell)?)?;
        Ok(usize::from(leaf.count()))
    }

    /// Splits the leaf in `slot` of the root. The original leaf keeps the
    /// smaller half (`old / 2`); the new right-hand leaf takes the rest.
    fn split_leaf(&mut self, set: &mut ChildSet, class: StorageClass, slot: usize) -> Result<()> {
        let root_cell = set.list(class).root;
        let (leaf_cell, old_count, kind) = {
            let root = RootNode::from_cell(self.store.cell(root_cell)?)?;
            let leaf_cell = root.leaf_at(slot)?;
            let leaf = LeafNode::from_cell(self.store.cell(leaf_cell)?)?;
            (leaf_cell, usize::from(leaf.count()), leaf.kind())
        };
        ensure!(old_count >= 2, "cannot split a leaf holding {old_count} entries");
        let keep = old_count / 2;
        let moved = old_count - keep;

        self.store.mark_dirty(leaf_cell)?;
        // one spare slot so the insert that forced this split cannot
        // immediately force a regrow
        let new_leaf = self
            .store
            .allocate(node_size_for(kind, moved + 1), class, leaf_cell)?;

        match self.split_commit(set, class, slot, leaf_cell, new_leaf, keep, moved, kind) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.store.free(new_leaf);
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn split_commit(
        &mut self,
        set: &mut ChildSet,
        class: StorageClass,
        slot: usize,
        leaf_cell: CellRef,
        new_leaf: CellRef,
        keep: usize,
        moved: usize,
        kind: NodeKind,
    ) -> Result<()> {
        self.store.mark_dirty(new_leaf)?;

        // grow the root first: the entry moves below are plain memory
        // writes, so every fallible step precedes them
        {
            let root_cell = set.list(class).root;
            let free = RootNode::from_cell(self.store.cell(root_cell)?)?.free_slots();
            if free == 0 {
                let new_size = self.store.cell_size(root_cell)? + ROOT_ENTRY_SIZE;
                let relocated = self.store.resize(root_cell, new_size)?;
                set.list_mut(class).root = relocated;
            }
        }

        let arena = Bump::new();
        let moved_bytes: &[u8] = {
            let leaf = LeafNode::from_cell(self.store.cell(leaf_cell)?)?;
            arena.alloc_slice_copy(leaf.raw_entries(keep, keep + moved)?)
        };

        {
            let data = self.store.cell_mut(new_leaf)?;
            let mut leaf = LeafNodeMut::init(data, kind)?;
            leaf.adopt_raw_entries(moved_bytes, moved)?;
        }
        {
            let data = self.store.cell_mut(leaf_cell)?;
            LeafNodeMut::from_cell(data)?.truncate(keep)?;
        }
        {
            let root_cell = set.list(class).root;
            let data = self.store.cell_mut(root_cell)?;
            RootNodeMut::from_cell(data)?.insert_leaf_after(slot, new_leaf)?;
        }
        Ok(())
    }

    /// Rewrites a hashed leaf as a sorted plain leaf under the same
    /// handle. Runs once, right before the leaf is promoted under a root.
    fn rewrite_hashed_sorted(&mut self, leaf_cell: CellRef) -> Result<()> {
        let upcase = self.config.upcase;
        let arena = Bump::new();

        let mut entries: BumpVec<(CellRef, &[u16])> = BumpVec::new_in(&arena);
        {
            let leaf = LeafNode::from_cell(self.store.cell(leaf_cell)?)?;
            for i in 0..usize::from(leaf.count()) {
                let child = leaf.child_at(i)?;
                let record = KeyRecord::from_cell(self.store.cell(child)?)?;
                let units: NameBuf = record.name().to_units();
                entries.push((child, &*arena.alloc_slice_copy(&units)));
            }
        }
        entries.sort_by(|a, b| compare_units(a.1.iter().copied(), b.1.iter().copied(), upcase));

        self.store.mark_dirty(leaf_cell)?;
        let data = self.store.cell_mut(leaf_cell)?;
        let mut leaf = LeafNodeMut::init(data, NodeKind::PlainLeaf)?;
        for (i, (child, units)) in entries.iter().enumerate() {
            leaf.insert_at(i, *child, units, upcase)?;
        }
        Ok(())
    }

    /// Removes `child` from the index, locating it by the name in its
    /// record. Returns `false` when the name is not present; errors are
    /// reserved for store failures.
    pub fn remove_subkey(&mut self, set: &mut ChildSet, child: CellRef) -> Result<bool> {
        let upcase = self.config.upcase;
        let name: NameBuf = {
            let record = KeyRecord::from_cell(self.store.cell(child)?)?;
            record.name().to_units()
        };
        let class = child.class();
        if set.list(class).count == 0 {
            return Ok(false);
        }

        let mut leaf_cell = set.list(class).root;
        let mut root_info: Option<(CellRef, usize)> = None;
        if node_kind(self.store.cell(leaf_cell)?)? == NodeKind::Root {
            let root_cell = leaf_cell;
            let search = RootNode::from_cell(self.store.cell(root_cell)?)?
                .find_leaf(self.store, upcase, &name)?;
            match search.leaf {
                Some(cell) => {
                    root_info = Some((root_cell, search.slot));
                    leaf_cell = cell;
                }
                None => return Ok(false),
            }
        }

        let index = {
            let leaf = LeafNode::from_cell(self.store.cell(leaf_cell)?)?;
            match leaf.find(self.store, upcase, &name)? {
                SearchResult::Found { index, child: found } => {
                    debug_assert_eq!(found, child, "index entry names a different child");
                    index
                }
                SearchResult::NotFound { .. } => return Ok(false),
            }
        };

        // every lookup is done; mark everything that will change before
        // mutating anything
        self.store.mark_dirty(leaf_cell)?;
        if let Some((root_cell, _)) = root_info {
            self.store.mark_dirty(root_cell)?;
        }

        let remaining = {
            let mut leaf = LeafNodeMut::from_cell(self.store.cell_mut(leaf_cell)?)?;
            leaf.remove_at(index)?;
            usize::from(leaf.count())
        };

        if remaining == 0 {
            self.store.free(leaf_cell);
            match root_info {
                Some((root_cell, slot)) => {
                    let left = {
                        let mut root = RootNodeMut::from_cell(self.store.cell_mut(root_cell)?)?;
                        root.remove_leaf_at(slot)?;
                        usize::from(root.count())
                    };
                    if left == 0 {
                        self.store.free(root_cell);
                        set.list_mut(class).root = CellRef::NIL;
                    }
                }
                None => {
                    set.list_mut(class).root = CellRef::NIL;
                }
            }
        }
        set.list_mut(class).count -= 1;
        Ok(true)
    }

    /// Deep-copies an index (root plus leaves, or a bare leaf) into newly
    /// allocated cells of the given class. Child references are carried
    /// over unchanged — the children themselves are shared, only the
    /// index structure is copied. A failure frees every cell this call
    /// allocated.
    pub fn duplicate_index(&mut self, index_cell: CellRef, class: StorageClass) -> Result<CellRef> {
        if node_kind(self.store.cell(index_cell)?)? != NodeKind::Root {
            return self.duplicate_cell(index_cell, class);
        }

        let leaf_count = usize::from(RootNode::from_cell(self.store.cell(index_cell)?)?.count());
        let size = self.store.cell_size(index_cell)?;
        let new_root = self.store.allocate(size, class, index_cell)?;

        let mut copied: SmallVec<[CellRef; 16]> = SmallVec::new();
        match self.duplicate_leaves_into(index_cell, new_root, leaf_count, class, &mut copied) {
            Ok(()) => Ok(new_root),
            Err(err) => {
                for cell in copied {
                    self.store.free(cell);
                }
                self.store.free(new_root);
                Err(err)
            }
        }
    }

    fn duplicate_leaves_into(
        &mut self,
        old_root: CellRef,
        new_root: CellRef,
        leaf_count: usize,
        class: StorageClass,
        copied: &mut SmallVec<[CellRef; 16]>,
    ) -> Result<()> {
        self.store.mark_dirty(new_root)?;
        // header first: a half-built copy is a well-formed, shorter root
        RootNodeMut::init_empty(self.store.cell_mut(new_root)?)?;
        for slot in 0..leaf_count {
            let leaf = self.root_leaf_at(old_root, slot)?;
            let copy = self.duplicate_cell(leaf, class)?;
            copied.push(copy);
            RootNodeMut::from_cell(self.store.cell_mut(new_root)?)?.push_leaf(copy)?;
        }
        Ok(())
    }

    fn duplicate_cell(&mut self, cell: CellRef, class: StorageClass) -> Result<CellRef> {
        let size = self.store.cell_size(cell)?;
        let copy = self.store.allocate(size, class, cell)?;
        match self.fill_cell_from(copy, cell) {
            Ok(()) => Ok(copy),
            Err(err) => {
                self.store.free(copy);
                Err(err)
            }
        }
    }

    fn fill_cell_from(&mut self, dst: CellRef, src: CellRef) -> Result<()> {
        self.store.mark_dirty(dst)?;
        let bytes = self.store.cell(src)?.to_vec();
        let out = self.store.cell_mut(dst)?;
        ensure!(
            out.len() == bytes.len(),
            "cell copy size mismatch: {} != {}",
            out.len(),
            bytes.len()
        );
        out.copy_from_slice(&bytes);
        Ok(())
    }

    /// Rewrites the parent back-reference of every child to `parent`.
    ///
    /// Two phases: the first marks every child's cell dirty, proving each
    /// one writable; only the second writes. A failure in the first phase
    /// therefore leaves every back-reference untouched.
    pub fn reparent_children(&mut self, set: &ChildSet, parent: CellRef) -> Result<()> {
        let total = set.total();
        for ordinal in 0..total {
            let child = self
                .subkey_by_ordinal(set, ordinal)?
                .ok_or_else(|| eyre::eyre!("child {ordinal} of {total} vanished mid-walk"))?;
            self.store.mark_dirty(child)?;
        }
        for ordinal in 0..total {
            let child = self
                .subkey_by_ordinal(set, ordinal)?
                .ok_or_else(|| eyre::eyre!("child {ordinal} of {total} vanished mid-walk"))?;
            let data = self.store.cell_mut(child)?;
            KeyRecordMut::from_cell(data)?.set_parent(parent);
        }
        Ok(())
    }

    /// Frees every node of the index and clears the bookkeeping. Child
    /// records are untouched; they belong to the caller.
    pub fn free_index(&mut self, set: &mut ChildSet) -> Result<()> {
        for class in StorageClass::ALL {
            let list = set.list(class);
            if !list.root.is_nil() {
                if node_kind(self.store.cell(list.root)?)? == NodeKind::Root {
                    let root = RootNode::from_cell(self.store.cell(list.root)?)?;
                    let mut leaves: SmallVec<[CellRef; 16]> = SmallVec::new();
                    for slot in 0..usize::from(root.count()) {
                        leaves.push(root.leaf_at(slot)?);
                    }
                    for leaf in leaves {
                        self.store.free(leaf);
                    }
                }
                self.store.free(list.root);
            }
            *set.list_mut(class) = ChildList::default();
        }
        Ok(())
    }
}
