//! # Configuration Module
//!
//! Centralizes the layout constants and the runtime tuning knobs for the
//! index. The serialized layout (header and entry sizes, default capacity
//! thresholds) lives in [`constants`]; the per-index choices (leaf
//! encoding, capacity overrides, upcase function) live in [`IndexConfig`].
//!
//! Capacity thresholds are runtime values on purpose: structural behavior
//! (leaf splits, root promotion) only shows up near the limits, and tests
//! need to reach those limits with a handful of entries rather than a
//! thousand.

pub mod constants;

pub use constants::*;

use crate::index::name::{latin1_upcase, Upcase};

/// Physical encoding used for newly created leaf nodes.
///
/// The encoding is a property of each physical node, not of the index as a
/// whole: a hinted leaf silently rewrites itself as plain when it outgrows
/// the hint-bearing format, and the index keeps working across the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafStyle {
    /// Child references only. Every comparison dereferences the child.
    Plain,
    /// Child references plus a 4-character name prefix that decides most
    /// comparisons without touching the child record.
    Hinted,
    /// Child references plus a full-name hash; unordered, scanned linearly.
    Hashed,
}

/// Runtime configuration for one index.
#[derive(Debug, Clone, Copy)]
pub struct IndexConfig {
    /// Encoding for freshly allocated leaves.
    pub leaf_style: LeafStyle,
    /// Structural growth threshold (see [`constants::MAX_LEAF_ENTRIES`]).
    pub max_leaf_entries: usize,
    /// Hinted-leaf ceiling (see [`constants::MAX_FAST_ENTRIES`]).
    pub max_fast_entries: usize,
    /// Case-folding function applied to every code unit before comparison
    /// and hashing. Injected so the embedding application controls locale
    /// behavior; the default upcases ASCII and Latin-1.
    pub upcase: Upcase,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            leaf_style: LeafStyle::Hinted,
            max_leaf_entries: MAX_LEAF_ENTRIES,
            max_fast_entries: MAX_FAST_ENTRIES,
            upcase: latin1_upcase,
        }
    }
}

impl IndexConfig {
    /// Configuration with shrunken capacity thresholds, for exercising
    /// structural transitions with few entries.
    pub fn with_limits(max_leaf_entries: usize, max_fast_entries: usize) -> Self {
        Self {
            max_leaf_entries,
            max_fast_entries,
            ..Self::default()
        }
    }
}
