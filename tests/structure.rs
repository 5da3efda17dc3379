//! Structural coverage: capacity boundaries, splits, encoding
//! transitions, relocation write-back, duplication fidelity, and the
//! all-or-nothing discipline under allocation failure.

use eyre::Result;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use celltree::index::{
    create_record, node_kind, utf16_units, KeyRecord, LeafNode, NodeKind, RootNode,
};
use celltree::{
    CellRef, CellStore, ChildSet, IndexConfig, KeyIndex, LeafStyle, MemArena, StorageClass,
    StoreError,
};

fn small(style: LeafStyle, max_leaf: usize, max_fast: usize) -> IndexConfig {
    IndexConfig {
        leaf_style: style,
        ..IndexConfig::with_limits(max_leaf, max_fast)
    }
}

fn add(
    arena: &mut MemArena,
    set: &mut ChildSet,
    config: IndexConfig,
    name: &str,
) -> Result<CellRef> {
    let child = create_record(
        arena,
        StorageClass::Stable,
        &utf16_units(name),
        CellRef::NIL,
    )?;
    KeyIndex::new(arena, config).add_subkey(set, child)?;
    Ok(child)
}

fn find(
    arena: &mut MemArena,
    set: &ChildSet,
    config: IndexConfig,
    name: &str,
) -> Result<Option<CellRef>> {
    KeyIndex::new(arena, config).find_subkey(set, &utf16_units(name))
}

fn kind_of(arena: &MemArena, cell: CellRef) -> NodeKind {
    node_kind(arena.cell(cell).unwrap()).unwrap()
}

fn name_of(arena: &MemArena, child: CellRef) -> String {
    let record = KeyRecord::from_cell(arena.cell(child).unwrap()).unwrap();
    String::from_utf16(&record.name().to_units()).unwrap()
}

/// Names held by each leaf of a two-level index, leaf by leaf.
fn leaf_names(arena: &MemArena, root_cell: CellRef) -> Vec<Vec<String>> {
    let root = RootNode::from_cell(arena.cell(root_cell).unwrap()).unwrap();
    (0..usize::from(root.count()))
        .map(|slot| {
            let leaf_cell = root.leaf_at(slot).unwrap();
            let leaf = LeafNode::from_cell(arena.cell(leaf_cell).unwrap()).unwrap();
            (0..usize::from(leaf.count()))
                .map(|i| name_of(arena, leaf.child_at(i).unwrap()))
                .collect()
        })
        .collect()
}

#[test]
fn inserting_exactly_the_limit_never_splits() -> Result<()> {
    let config = small(LeafStyle::Plain, 4, 2);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    for name in ["a", "b", "c", "d"] {
        add(&mut arena, &mut set, config, name)?;
    }

    let root = set.list(StorageClass::Stable).root;
    assert_eq!(kind_of(&arena, root), NodeKind::PlainLeaf);
    // 4 child records + 1 leaf node
    assert_eq!(arena.live_cells(), 5);
    Ok(())
}

#[test]
fn one_past_the_limit_always_splits() -> Result<()> {
    let config = small(LeafStyle::Plain, 4, 2);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    for name in ["a", "b", "c", "d", "e"] {
        add(&mut arena, &mut set, config, name)?;
    }

    let root = set.list(StorageClass::Stable).root;
    assert_eq!(kind_of(&arena, root), NodeKind::Root);
    let leaves = leaf_names(&arena, root);
    assert_eq!(leaves.len(), 2);
    let total: usize = leaves.iter().map(Vec::len).sum();
    assert_eq!(total, 5);
    Ok(())
}

#[test]
fn split_keeps_ranges_ordered_and_non_overlapping() -> Result<()> {
    let config = small(LeafStyle::Plain, 4, 2);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    for name in ["apple", "banana", "cherry", "date", "elderberry"] {
        add(&mut arena, &mut set, config, name)?;
    }

    let root = set.list(StorageClass::Stable).root;
    let leaves = leaf_names(&arena, root);
    assert_eq!(leaves.len(), 2);
    // left leaf keeps the smaller half of the four pre-split entries
    assert_eq!(leaves[0], ["apple", "banana"]);
    assert_eq!(leaves[1], ["cherry", "date", "elderberry"]);
    assert!(leaves[0].last().unwrap() < leaves[1].first().unwrap());

    assert!(find(&mut arena, &set, config, "cherry")?.is_some());
    Ok(())
}

#[test]
fn deep_fill_keeps_every_leaf_sorted() -> Result<()> {
    let config = small(LeafStyle::Plain, 4, 2);
    let mut names: Vec<String> = (0..40).map(|i| format!("k{i:02}")).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(11);
    names.shuffle(&mut rng);

    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    for name in &names {
        add(&mut arena, &mut set, config, name)?;
    }

    for name in &names {
        assert!(find(&mut arena, &set, config, name)?.is_some(), "lost {name}");
    }

    let root = set.list(StorageClass::Stable).root;
    assert_eq!(kind_of(&arena, root), NodeKind::Root);
    let leaves = leaf_names(&arena, root);
    let flattened: Vec<&String> = leaves.iter().flatten().collect();
    assert_eq!(flattened.len(), 40);
    // concatenated leaves read in strictly ascending order: each leaf is
    // sorted and consecutive leaf ranges do not overlap
    for pair in flattened.windows(2) {
        assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
    }
    Ok(())
}

#[test]
fn edge_inserts_reuse_leaves_with_room() -> Result<()> {
    let config = small(LeafStyle::Plain, 4, 2);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    // two leaves with spare slots: ["b", "c"] and ["d", "e", "m"]
    for name in ["b", "c", "d", "e", "m"] {
        add(&mut arena, &mut set, config, name)?;
    }
    let root = set.list(StorageClass::Stable).root;
    let leaves_before = leaf_names(&arena, root).len();
    assert_eq!(leaves_before, 2);

    // off the left end of the leftmost leaf and off the right end of the
    // rightmost: both reuse the edge leaf instead of splitting
    add(&mut arena, &mut set, config, "a")?;
    add(&mut arena, &mut set, config, "z")?;

    let root = set.list(StorageClass::Stable).root;
    let after = leaf_names(&arena, root);
    assert_eq!(after.len(), leaves_before);
    assert_eq!(after[0].first().unwrap(), "a");
    assert_eq!(after[1].last().unwrap(), "z");
    assert!(find(&mut arena, &set, config, "a")?.is_some());
    assert!(find(&mut arena, &set, config, "z")?.is_some());
    Ok(())
}

#[test]
fn interior_gap_names_land_in_the_right_bounding_leaf() -> Result<()> {
    let config = small(LeafStyle::Plain, 4, 2);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    for name in ["b", "c", "d", "e", "m"] {
        add(&mut arena, &mut set, config, name)?;
    }
    // ["b", "c"] and ["d", "e", "m"]: "cz" falls in the boundary gap and
    // belongs to the right-hand leaf, which has room
    add(&mut arena, &mut set, config, "cz")?;

    let root = set.list(StorageClass::Stable).root;
    let leaves = leaf_names(&arena, root);
    assert_eq!(leaves.len(), 2);
    assert_eq!(leaves[1].first().unwrap(), "cz");
    assert!(find(&mut arena, &set, config, "cz")?.is_some());
    Ok(())
}

#[test]
fn leaf_relocation_updates_the_handle() -> Result<()> {
    let config = IndexConfig::default();
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    add(&mut arena, &mut set, config, "first")?;
    let before = set.list(StorageClass::Stable).root;

    // the initial leaf holds one entry; the second insert must grow it,
    // and growth relocates
    add(&mut arena, &mut set, config, "second")?;
    let after = set.list(StorageClass::Stable).root;

    assert_ne!(before, after);
    assert!(find(&mut arena, &set, config, "first")?.is_some());
    assert!(find(&mut arena, &set, config, "second")?.is_some());
    Ok(())
}

#[test]
fn hinted_tree_degrades_hint_leaves_before_splitting() -> Result<()> {
    let config = small(LeafStyle::Hinted, 6, 3);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    for i in 0..12 {
        add(&mut arena, &mut set, config, &format!("name{i:02}"))?;
    }

    let root = set.list(StorageClass::Stable).root;
    assert_eq!(kind_of(&arena, root), NodeKind::Root);
    // the hinted leaf was rewritten plain at the fast ceiling, so every
    // leaf under the root is plain
    let view = RootNode::from_cell(arena.cell(root)?)?;
    for slot in 0..usize::from(view.count()) {
        assert_eq!(kind_of(&arena, view.leaf_at(slot)?), NodeKind::PlainLeaf);
    }
    for i in 0..12 {
        assert!(find(&mut arena, &set, config, &format!("name{i:02}"))?.is_some());
    }
    Ok(())
}

#[test]
fn hashed_leaf_is_sorted_plain_after_promotion() -> Result<()> {
    let config = small(LeafStyle::Hashed, 4, 2);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    for name in ["w", "q", "z", "m", "t", "a"] {
        add(&mut arena, &mut set, config, name)?;
    }

    let root = set.list(StorageClass::Stable).root;
    assert_eq!(kind_of(&arena, root), NodeKind::Root);
    let leaves = leaf_names(&arena, root);
    let flattened: Vec<&String> = leaves.iter().flatten().collect();
    for pair in flattened.windows(2) {
        assert!(pair[0] < pair[1]);
    }
    for name in ["w", "q", "z", "m", "t", "a"] {
        assert!(find(&mut arena, &set, config, name)?.is_some());
    }
    Ok(())
}

#[test]
fn removals_collapse_the_tree_back_to_nil() -> Result<()> {
    let config = small(LeafStyle::Plain, 4, 2);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    let mut children = Vec::new();
    for name in ["a", "b", "c", "d", "e", "f"] {
        children.push(add(&mut arena, &mut set, config, name)?);
    }
    let root = set.list(StorageClass::Stable).root;
    assert_eq!(kind_of(&arena, root), NodeKind::Root);

    for child in &children {
        assert!(KeyIndex::new(&mut arena, config).remove_subkey(&mut set, *child)?);
    }

    assert!(set.list(StorageClass::Stable).root.is_nil());
    assert_eq!(set.total(), 0);
    // every index node is gone; only the child records remain
    assert_eq!(arena.live_cells(), children.len());
    Ok(())
}

#[test]
fn failed_promotion_leaves_the_index_untouched() -> Result<()> {
    let config = small(LeafStyle::Plain, 4, 2);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    for name in ["a", "b", "c", "d"] {
        add(&mut arena, &mut set, config, name)?;
    }
    let extra = create_record(
        &mut arena,
        StorageClass::Stable,
        &utf16_units("e"),
        CellRef::NIL,
    )?;
    let live_before = arena.live_cells();
    let root_before = set.list(StorageClass::Stable).root;

    // the promotion's root allocation is denied outright
    arena.set_alloc_budget(Some(0));
    let result = KeyIndex::new(&mut arena, config).add_subkey(&mut set, extra);
    arena.set_alloc_budget(None);

    let err = result.unwrap_err();
    assert_eq!(
        err.downcast_ref::<StoreError>(),
        Some(&StoreError::OutOfSpace { size: 12 })
    );
    assert_eq!(set.list(StorageClass::Stable).count, 4);
    assert_eq!(set.list(StorageClass::Stable).root, root_before);
    assert_eq!(arena.live_cells(), live_before);
    for name in ["a", "b", "c", "d"] {
        assert!(find(&mut arena, &set, config, name)?.is_some());
    }
    Ok(())
}

#[test]
fn failed_split_unwinds_a_fresh_root() -> Result<()> {
    let config = small(LeafStyle::Plain, 4, 2);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    for name in ["a", "b", "c", "d"] {
        add(&mut arena, &mut set, config, name)?;
    }
    let extra = create_record(
        &mut arena,
        StorageClass::Stable,
        &utf16_units("e"),
        CellRef::NIL,
    )?;
    let live_before = arena.live_cells();
    let root_before = set.list(StorageClass::Stable).root;

    // the promotion root fits the budget, the split's new leaf does not;
    // the fresh root must be unwound and the old leaf restored
    arena.set_alloc_budget(Some(1));
    let result = KeyIndex::new(&mut arena, config).add_subkey(&mut set, extra);
    arena.set_alloc_budget(None);

    assert!(result.is_err());
    assert_eq!(set.list(StorageClass::Stable).root, root_before);
    assert_eq!(kind_of(&arena, root_before), NodeKind::PlainLeaf);
    assert_eq!(set.list(StorageClass::Stable).count, 4);
    assert_eq!(arena.live_cells(), live_before);
    for name in ["a", "b", "c", "d"] {
        assert!(find(&mut arena, &set, config, name)?.is_some());
    }
    // the index still accepts the insert once space exists
    KeyIndex::new(&mut arena, config).add_subkey(&mut set, extra)?;
    assert!(find(&mut arena, &set, config, "e")?.is_some());
    Ok(())
}

#[test]
fn failed_split_under_an_existing_root_changes_nothing() -> Result<()> {
    let config = small(LeafStyle::Plain, 4, 2);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    // build a root, then fill the right-hand leaf to the limit
    for name in ["k0", "k1", "k2", "k3", "k4", "k5"] {
        add(&mut arena, &mut set, config, name)?;
    }
    let root = set.list(StorageClass::Stable).root;
    assert_eq!(kind_of(&arena, root), NodeKind::Root);
    let before = leaf_names(&arena, root);
    let extra = create_record(
        &mut arena,
        StorageClass::Stable,
        &utf16_units("k6"),
        CellRef::NIL,
    )?;
    let live_before = arena.live_cells();

    arena.set_alloc_budget(Some(0));
    let result = KeyIndex::new(&mut arena, config).add_subkey(&mut set, extra);
    arena.set_alloc_budget(None);

    assert!(result.is_err());
    assert_eq!(set.list(StorageClass::Stable).count, 6);
    assert_eq!(arena.live_cells(), live_before);
    assert_eq!(leaf_names(&arena, set.list(StorageClass::Stable).root), before);
    Ok(())
}

#[test]
fn unresolvable_is_distinct_from_not_found() -> Result<()> {
    let config = small(LeafStyle::Plain, 4, 2);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    let victim = add(&mut arena, &mut set, config, "broken")?;
    add(&mut arena, &mut set, config, "healthy")?;

    // tear the record out from under the index
    arena.free(victim);

    let err = find(&mut arena, &set, config, "broken").unwrap_err();
    assert_eq!(
        err.downcast_ref::<StoreError>(),
        Some(&StoreError::Unresolvable(victim))
    );
    Ok(())
}

#[test]
fn duplicate_index_is_a_faithful_independent_copy() -> Result<()> {
    let config = small(LeafStyle::Plain, 4, 2);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    let mut children = Vec::new();
    for i in 0..9 {
        children.push(add(&mut arena, &mut set, config, &format!("c{i}"))?);
    }
    let original_root = set.list(StorageClass::Stable).root;

    let copy_root =
        KeyIndex::new(&mut arena, config).duplicate_index(original_root, StorageClass::Stable)?;

    assert_ne!(copy_root, original_root);
    // same leaf population, different handles
    assert_eq!(leaf_names(&arena, copy_root), leaf_names(&arena, original_root));
    let orig = RootNode::from_cell(arena.cell(original_root)?)?;
    let copy = RootNode::from_cell(arena.cell(copy_root)?)?;
    assert_eq!(orig.count(), copy.count());
    for slot in 0..usize::from(orig.count()) {
        assert_ne!(orig.leaf_at(slot)?, copy.leaf_at(slot)?);
    }

    // the copy resolves every name to the same shared child records
    let mut copy_set = ChildSet::new();
    *copy_set.list_mut(StorageClass::Stable) = celltree::ChildList {
        root: copy_root,
        count: set.list(StorageClass::Stable).count,
    };
    for (i, child) in children.iter().enumerate() {
        assert_eq!(
            find(&mut arena, &copy_set, config, &format!("c{i}"))?,
            Some(*child)
        );
    }

    // releasing the copy leaves the original intact
    KeyIndex::new(&mut arena, config).free_index(&mut copy_set)?;
    for i in 0..9 {
        assert!(find(&mut arena, &set, config, &format!("c{i}"))?.is_some());
    }
    Ok(())
}

#[test]
fn duplicate_of_a_bare_leaf_copies_the_cell() -> Result<()> {
    let config = IndexConfig::default();
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    let child = add(&mut arena, &mut set, config, "solo")?;
    let leaf = set.list(StorageClass::Stable).root;

    let copy = KeyIndex::new(&mut arena, config).duplicate_index(leaf, StorageClass::Volatile)?;

    assert_ne!(copy, leaf);
    assert_eq!(copy.class(), StorageClass::Volatile);
    let view = LeafNode::from_cell(arena.cell(copy)?)?;
    assert_eq!(view.count(), 1);
    assert_eq!(view.child_at(0)?, child);
    Ok(())
}

#[test]
fn failed_duplicate_frees_every_partial_copy() -> Result<()> {
    let config = small(LeafStyle::Plain, 4, 2);
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    for i in 0..9 {
        add(&mut arena, &mut set, config, &format!("c{i}"))?;
    }
    let root = set.list(StorageClass::Stable).root;
    let live_before = arena.live_cells();

    // enough budget for the root copy and one leaf, not the rest
    arena.set_alloc_budget(Some(2));
    let result = KeyIndex::new(&mut arena, config).duplicate_index(root, StorageClass::Stable);
    arena.set_alloc_budget(None);

    assert!(result.is_err());
    assert_eq!(arena.live_cells(), live_before);
    // the original is untouched
    for i in 0..9 {
        assert!(find(&mut arena, &set, config, &format!("c{i}"))?.is_some());
    }
    Ok(())
}

#[test]
fn reparent_failure_changes_no_backreference() -> Result<()> {
    let config = IndexConfig::default();
    let mut arena = MemArena::new();
    let mut set = ChildSet::new();
    let mut children = Vec::new();
    for name in ["a", "b", "c"] {
        let child = create_record(
            &mut arena,
            StorageClass::Stable,
            &utf16_units(name),
            CellRef::NIL,
        )?;
        KeyIndex::new(&mut arena, config).add_subkey(&mut set, child)?;
        children.push(child);
    }
    let new_parent = create_record(
        &mut arena,
        StorageClass::Stable,
        &utf16_units("parent"),
        CellRef::NIL,
    )?;

    // one child's record disappears; the first marking pass must fail
    // before any back-reference is written
    arena.free(children[1]);
    let result = KeyIndex::new(&mut arena, config).reparent_children(&set, new_parent);

    assert!(result.is_err());
    for child in [children[0], children[2]] {
        let record = KeyRecord::from_cell(arena.cell(child)?)?;
        assert_eq!(record.parent(), CellRef::NIL);
    }
    Ok(())
}
