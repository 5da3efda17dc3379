//! # Name Comparison and Hashing
//!
//! Child names are sequences of 16-bit code units, compared
//! case-insensitively through an injected upcase function. The index never
//! stores full names; it stores child references and, depending on the
//! leaf encoding, a short prefix hint or a hash. The routines here decide
//! ordering and equality, dereferencing the child record only when the
//! cached hint cannot.
//!
//! ## Ordering
//!
//! Per-code-unit comparison of the upcased units; if one name is a prefix
//! of the other, the shorter sorts first. A zero-length name is valid and
//! sorts before everything.
//!
//! ## Hints
//!
//! A hint caches the first four code units of a name, one byte each. Only
//! names whose leading units all fit in a byte are hintable; a wide unit
//! anywhere in the prefix forces `hint[0] == 0`, which readers treat as
//! "no hint, do the full comparison". The hint is filled back to front so
//! a wide unit voids everything before it in one break.
//!
//! ## Hash
//!
//! `h' = h * 37 + upcase(unit)`, seed 0, wrapping. The value is persisted
//! inside hashed leaves, so it must be bit-exact reproducible: both the
//! code-unit walk and the byte-wise walk over a compressed name produce
//! identical values for identical unit sequences.

use std::cmp::Ordering;

use eyre::Result;

use crate::store::{CellRef, CellStore};

use super::record::KeyRecord;

/// Case-folding function applied to every code unit before comparison.
pub type Upcase = fn(u16) -> u16;

/// Number of code units cached in a leaf entry hint.
pub const HINT_UNITS: usize = 4;

/// Default upcase: ASCII `a-z` plus the Latin-1 letter range.
pub fn latin1_upcase(unit: u16) -> u16 {
    match unit {
        0x0061..=0x007A => unit - 0x20,
        0x00E0..=0x00F6 | 0x00F8..=0x00FE => unit - 0x20,
        _ => unit,
    }
}

/// Encodes a string as the code-unit form used throughout the index.
pub fn utf16_units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

/// Ordinal comparison of two upcased unit sequences.
pub(crate) fn compare_units<A, B>(a: A, b: B, upcase: Upcase) -> Ordering
where
    A: IntoIterator<Item = u16>,
    B: IntoIterator<Item = u16>,
{
    let mut a = a.into_iter();
    let mut b = b.into_iter();
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let (x, y) = (upcase(x), upcase(y));
                if x != y {
                    return if x < y { Ordering::Less } else { Ordering::Greater };
                }
            }
        }
    }
}

/// Compares a search name against the name stored in a child record.
///
/// The child is dereferenced through the store; an unresolvable cell
/// propagates as an error, which callers must not conflate with any
/// ordering outcome.
pub fn compare_name<S: CellStore>(
    store: &S,
    upcase: Upcase,
    search: &[u16],
    child: CellRef,
) -> Result<Ordering> {
    let data = store.cell(child)?;
    let record = KeyRecord::from_cell(data)?;
    Ok(compare_units(
        search.iter().copied(),
        record.name().units(),
        upcase,
    ))
}

/// Hint-accelerated comparison.
///
/// Compares up to [`HINT_UNITS`] leading units against the cached hint; a
/// mismatch decides the ordering without dereferencing the child at all.
/// If every available hint character matches — including the degenerate
/// case of an absent hint — falls through to [`compare_name`].
pub fn compare_with_hint<S: CellStore>(
    store: &S,
    upcase: Upcase,
    search: &[u16],
    hint: &[u8; HINT_UNITS],
    child: CellRef,
) -> Result<Ordering> {
    let hint_len = hint.iter().position(|&b| b == 0).unwrap_or(HINT_UNITS);
    let valid = search.len().min(hint_len);
    for i in 0..valid {
        let (a, b) = (upcase(search[i]), upcase(u16::from(hint[i])));
        if a != b {
            return Ok(if a < b { Ordering::Less } else { Ordering::Greater });
        }
    }
    compare_name(store, upcase, search, child)
}

/// Builds the hint stored alongside a child reference.
pub fn encode_hint(name: &[u16]) -> [u8; HINT_UNITS] {
    let mut hint = [0u8; HINT_UNITS];
    let take = name.len().min(HINT_UNITS);
    // back to front so one wide unit leaves hint[0] == 0
    for i in (0..take).rev() {
        if name[i] > u16::from(u8::MAX) {
            hint[0] = 0;
            break;
        }
        hint[i] = name[i] as u8;
    }
    hint
}

/// Rolling hash over the upcased code units. Persisted; must stay
/// bit-exact.
pub fn hash_name(upcase: Upcase, name: &[u16]) -> u32 {
    name.iter().fold(0u32, |h, &unit| {
        h.wrapping_mul(37).wrapping_add(u32::from(upcase(unit)))
    })
}

/// Byte-wise variant for compressed names. Identical unit sequences hash
/// identically through either walk.
pub fn hash_name_bytes(upcase: Upcase, name: &[u8]) -> u32 {
    name.iter().fold(0u32, |h, &b| {
        h.wrapping_mul(37).wrapping_add(u32::from(upcase(u16::from(b))))
    })
}
