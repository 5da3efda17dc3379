//! # Cell Handles and the Store Boundary
//!
//! A cell is a variable-size record in the backing store, addressed by a
//! [`CellRef`] handle. The index never owns the bytes behind a handle; it
//! asks the store to materialize them for the duration of a borrow.
//!
//! ## Handle Encoding
//!
//! ```text
//! bit  31        30..0
//! +---------+-----------------+
//! | class   | slot            |
//! +---------+-----------------+
//! ```
//!
//! The storage class rides in the top bit so that any handle reveals which
//! class it belongs to without a store round-trip. The all-ones pattern is
//! reserved as [`CellRef::NIL`].
//!
//! ## Error Taxonomy
//!
//! [`StoreError`] is deliberately small. `Unresolvable` is the analog of a
//! mapping/paging failure: the handle may be valid on disk, but the store
//! cannot produce the bytes right now. Callers propagate it immediately and
//! never retry. `OutOfSpace` is an allocation or resize denial; a
//! structural operation that hits it must unwind its own allocations before
//! returning. "Name not present" is not an error and never appears here —
//! lookups express it as `Ok(None)`.

use std::fmt;

use thiserror::Error;

/// Which store a cell lives in. Stable cells persist; volatile cells are
/// rebuilt from scratch on every load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    Stable,
    Volatile,
}

impl StorageClass {
    pub const COUNT: usize = 2;

    /// Lookup order: stable first, then volatile.
    pub const ALL: [StorageClass; Self::COUNT] = [StorageClass::Stable, StorageClass::Volatile];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            StorageClass::Stable => 0,
            StorageClass::Volatile => 1,
        }
    }
}

/// Opaque handle to a cell in the backing store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef(u32);

impl CellRef {
    const VOLATILE_BIT: u32 = 1 << 31;

    /// The null handle. A parent with no children stores this.
    pub const NIL: CellRef = CellRef(u32::MAX);

    pub fn new(class: StorageClass, slot: u32) -> Self {
        debug_assert!(slot < Self::VOLATILE_BIT, "cell slot {slot} overflows the handle");
        match class {
            StorageClass::Stable => CellRef(slot),
            StorageClass::Volatile => CellRef(slot | Self::VOLATILE_BIT),
        }
    }

    /// Rebuilds a handle from its serialized form.
    #[inline]
    pub fn from_bits(bits: u32) -> Self {
        CellRef(bits)
    }

    /// Serialized form of the handle.
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_nil(self) -> bool {
        self.0 == u32::MAX
    }

    /// Storage class encoded in the handle. Meaningless for [`CellRef::NIL`].
    #[inline]
    pub fn class(self) -> StorageClass {
        if self.0 & Self::VOLATILE_BIT != 0 {
            StorageClass::Volatile
        } else {
            StorageClass::Stable
        }
    }

    #[inline]
    pub fn slot(self) -> u32 {
        self.0 & !Self::VOLATILE_BIT
    }
}

impl fmt::Debug for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "CellRef(nil)")
        } else {
            match self.class() {
                StorageClass::Stable => write!(f, "CellRef(stable:{})", self.slot()),
                StorageClass::Volatile => write!(f, "CellRef(volatile:{})", self.slot()),
            }
        }
    }
}

/// Failures the backing store can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not materialize the cell behind a handle.
    #[error("cell {0:?} cannot be materialized")]
    Unresolvable(CellRef),

    /// An allocation or resize request was denied.
    #[error("allocation of {size} bytes denied by the store")]
    OutOfSpace { size: usize },
}

/// The backing store the index is built atop.
///
/// Materialized views are plain borrows, so "release on every exit path"
/// is enforced by the borrow checker rather than by per-call bookkeeping:
/// a view cannot outlive the store borrow it came from, and no early
/// return can leak one.
///
/// Mutation protocol: a cell must be marked dirty (`mark_dirty`) before it
/// is written through `cell_mut`. A cell returned by `allocate` or
/// `resize` still needs marking before its first write; `resize` is the
/// exception and hands back an already-dirty cell, since relocation itself
/// rewrote it.
pub trait CellStore {
    /// Allocates a zeroed cell of `size` bytes in the given class.
    ///
    /// `near` is a colocation hint: a cell the allocation would ideally
    /// land close to, or [`CellRef::NIL`] when the caller has no
    /// preference. Stores are free to ignore it.
    fn allocate(
        &mut self,
        size: usize,
        class: StorageClass,
        near: CellRef,
    ) -> Result<CellRef, StoreError>;

    /// Grows or shrinks a cell. May relocate: the returned handle replaces
    /// `cell`, which is invalid after a successful call. Contents are
    /// preserved up to the smaller of the two sizes and the returned cell
    /// is already dirty.
    fn resize(&mut self, cell: CellRef, new_size: usize) -> Result<CellRef, StoreError>;

    /// Releases a cell. Freeing an invalid or nil handle is a no-op.
    fn free(&mut self, cell: CellRef);

    /// Materializes a cell for reading.
    fn cell(&self, cell: CellRef) -> Result<&[u8], StoreError>;

    /// Materializes a cell for writing. The cell must already be dirty.
    fn cell_mut(&mut self, cell: CellRef) -> Result<&mut [u8], StoreError>;

    /// Current size of a cell in bytes.
    fn cell_size(&self, cell: CellRef) -> Result<usize, StoreError>;

    /// Marks a cell about to be mutated. Must succeed before any in-place
    /// write; failure aborts the surrounding operation.
    fn mark_dirty(&mut self, cell: CellRef) -> Result<(), StoreError>;
}
