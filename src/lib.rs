//! # celltree — Two-Level Child-Name Index
//!
//! celltree is an embeddable ordered index mapping child names to opaque
//! cell references, designed for stores that address serialized records by
//! integer handle. It is the index a hierarchical namespace keeps per
//! parent: lookup by name, lookup by ordinal, insert, remove, duplicate,
//! and re-parent, over a tree that is never deeper than two levels.
//!
//! ## Quick Start
//!
//! ```ignore
//! use celltree::{ChildSet, IndexConfig, KeyIndex, MemArena, StorageClass};
//! use celltree::index::{create_record, utf16_units};
//! use celltree::CellRef;
//!
//! let mut store = MemArena::new();
//! let mut set = ChildSet::new();
//!
//! let child = create_record(
//!     &mut store,
//!     StorageClass::Stable,
//!     &utf16_units("printers"),
//!     CellRef::NIL,
//! )?;
//!
//! let mut index = KeyIndex::new(&mut store, IndexConfig::default());
//! index.add_subkey(&mut set, child)?;
//!
//! assert_eq!(index.find_subkey(&set, &utf16_units("PRINTERS"))?, Some(child));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │   Index Operations (KeyIndex)         │  find / add / remove /
//! ├───────────────────────────────────────┤  duplicate / reparent
//! │   Root Nodes      │   Leaf Nodes      │  boundary search, entry
//! ├───────────────────┴───────────────────┤  arrays, three encodings
//! │   Comparator / Hints / Hashing        │  case-insensitive names
//! ├───────────────────────────────────────┤
//! │   Cell Store (CellStore trait)        │  allocate / resize / free /
//! └───────────────────────────────────────┘  materialize / mark dirty
//! ```
//!
//! The cell store is a collaborator, not part of this crate's job: any
//! allocator that hands out integer handles to resizable byte records can
//! sit underneath. [`MemArena`] is the bundled in-memory implementation.
//!
//! ## Concurrency
//!
//! The index is a synchronous data structure. Mutating operations demand
//! `&mut` access to the store, which makes single-writer a compile-time
//! guarantee inside one process; share a store across threads through the
//! usual reader-writer lock (see [`store::SharedStore`]).
//!
//! ## Module Overview
//!
//! - [`store`]: cell handles, the store trait, the in-memory arena
//! - [`index`]: nodes, comparator, and the operations themselves
//! - [`config`]: layout constants and per-index tuning

#[macro_use]
mod macros;

pub mod config;
pub mod index;
pub mod store;

pub use config::{IndexConfig, LeafStyle};
pub use index::{ChildList, ChildSet, KeyIndex};
pub use store::{CellRef, CellStore, MemArena, StorageClass, StoreError};
