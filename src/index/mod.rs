//! # Child-Name Index
//!
//! This module implements the hierarchical child index: an ordered map
//! from a 16-bit-code-unit name to a child cell reference, built as a one-
//! or two-level tree of serialized nodes in a cell store.
//!
//! ## Structure
//!
//! Leaf nodes are arrays of child references, sorted by the children's
//! names; a binary search finds the entry of interest. When one leaf is
//! not enough, a single root node fans out over many leaves, partitioned
//! by each leaf's last entry. The tree is never deeper than two levels.
//!
//! One level:
//!
//! ```text
//! parent --->+------+
//!            |  x------------> <child record named "apple">
//!            +------+
//!            |  x------------> <child record named "banana">
//!            +------+
//!            |  x------------> <child record named "zucchini">
//!            +------+
//! ```
//!
//! Two levels:
//!
//! ```text
//! parent --->+------+     +------+
//!            |  x-------->|  x----------> "aaa"
//!            +------+     +------+
//!            |      |     |  x----------> "abc"
//!            |      |     +------+
//!            +------+
//!            |      |     +------+
//!            |  x-------->|  x----------> "war"
//!            |      |     +------+
//!            +------+     |  x----------> "zoo"
//!                         +------+
//! ```
//!
//! Never more than two levels: a root's children are always leaves, and
//! the type layer enforces it — there is no way to link a root under a
//! root. Each node fits in one storage block, which bounds fan-out to
//! about a thousand entries per leaf and a million children per parent in
//! the best case.
//!
//! ## Leaf Encodings
//!
//! | Encoding | Per entry            | Found via                        |
//! |----------|----------------------|----------------------------------|
//! | plain    | child ref            | binary search, full comparisons  |
//! | hinted   | child ref + prefix   | binary search, hint short-circuit|
//! | hashed   | child ref + hash     | linear scan, hash short-circuit  |
//!
//! The hinted form wins when names differ early: four cached characters
//! decide most probes without materializing the child record. The hashed
//! form trades ordering away for cheap membership probes on large
//! fan-out. Both fall back to the plain form as they grow — hinted at the
//! fast-index ceiling, hashed when a root must partition what has no
//! order.
//!
//! ## Name Storage
//!
//! The index stores no names. Names live in the child records; the
//! comparator dereferences a child to read its name, and the hint/hash
//! caches exist to make that dereference rare. See [`record`] for the
//! record surface and [`name`] for comparison semantics.
//!
//! ## Module Map
//!
//! - [`name`]: comparator, hints, hashing
//! - [`record`]: the child-record surface (name + parent back-reference)
//! - [`node`]: tags and headers shared by all node kinds
//! - [`leaf`]: leaf views and entry operations
//! - [`root`]: root views and boundary search
//! - [`tree`]: the operations a parent performs ([`KeyIndex`])

pub mod leaf;
pub mod name;
pub mod node;
pub mod record;
pub mod root;
pub mod tree;

pub use leaf::{LeafNode, LeafNodeMut, SearchResult};
pub use name::{latin1_upcase, utf16_units, Upcase};
pub use node::{node_kind, NodeKind};
pub use record::{create_record, record_size, KeyRecord, KeyRecordMut};
pub use root::{RootNode, RootNodeMut, RootSearch};
pub use tree::{ChildList, ChildSet, KeyIndex};
