//! # Store Module
//!
//! The boundary between the index and whatever owns the bytes. The index
//! only ever sees cells: variable-size records addressed by opaque
//! [`CellRef`] handles, allocated and resized on request, materialized as
//! borrows for the duration of an access.
//!
//! ## Safety Model
//!
//! Stores that page data in and out traditionally pair every dereference
//! with an explicit release call, and every early-exit path that forgets
//! the release leaks a pin. Here the materialized view is a plain borrow:
//!
//! ```text
//! CellStore::cell(&self, ..) -> &[u8]        // borrows &self immutably
//! CellStore::cell_mut(&mut self, ..)         // requires &mut self
//! CellStore::resize(&mut self, ..)           // requires &mut self exclusively
//! ```
//!
//! The borrow checker prevents holding a view across an allocation or
//! resize at compile time, and guarantees release on every exit path with
//! zero runtime cost. There is nothing to forget.
//!
//! ## Exclusive Access
//!
//! Mutating index operations take the store by `&mut`, so "the caller
//! holds the store exclusively" is a compile-time precondition rather than
//! a convention. To share a store across threads, wrap it in the usual
//! reader-writer lock:
//!
//! ```ignore
//! use celltree::store::SharedStore;
//!
//! let store: SharedStore<MemArena> = Arc::new(RwLock::new(MemArena::new()));
//! let mut guard = store.write();
//! // &mut *guard satisfies every mutating entry point
//! ```
//!
//! Lookups only need `&S`, so concurrent readers are possible under the
//! same lock's read side, provided no writer is active.
//!
//! ## Module Organization
//!
//! - [`cell`]: handles, storage classes, the [`CellStore`] trait, errors
//! - [`arena`]: `MemArena`, the in-memory reference store with dirty
//!   tracking, deliberate relocation on resize, and failure injection

mod arena;
mod cell;

pub use arena::MemArena;
pub use cell::{CellRef, CellStore, StorageClass, StoreError};

use std::sync::Arc;

use parking_lot::RwLock;

/// Conventional wrapper for sharing one store between threads.
pub type SharedStore<S> = Arc<RwLock<S>>;
