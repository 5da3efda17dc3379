//! # Key Records
//!
//! A key record is the serialized child object a leaf entry points at. The
//! index does not own these records — they belong to the embedding layer —
//! but it reads their names during every full comparison and rewrites their
//! parent back-references during a subtree move, so the minimal record
//! surface is defined here.
//!
//! ## Layout
//!
//! ```text
//! Offset  Size  Field      Description
//! ------  ----  --------   ----------------------------------------
//! 0       2     flags      Bit 0: name is compressed (one byte/unit)
//! 2       2     name_len   Name length in code units
//! 4       4     parent     Back-reference to the owning parent cell
//! 8       ...   name       name_len bytes (compressed) or
//!                          name_len little-endian u16s (wide)
//! ```
//!
//! A name whose code units all fit in one byte is stored compressed. The
//! wide form is the fallback for anything else. Comparisons never care
//! which form they hit: [`NameRef`] decodes units on the fly.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::store::{CellRef, CellStore, StorageClass};
use crate::zerocopy_accessors;

use super::name::{hash_name_bytes, Upcase};

pub const RECORD_HEADER_SIZE: usize = 8;

/// Flag bit: the name is stored one byte per code unit.
pub const NAME_COMPRESSED: u16 = 0x0001;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RecordHeader {
    flags: U16,
    name_len: U16,
    parent: U32,
}

impl RecordHeader {
    zerocopy_accessors! {
        flags: u16,
        name_len: u16,
    }

    pub fn parent(&self) -> CellRef {
        CellRef::from_bits(self.parent.get())
    }

    pub fn set_parent(&mut self, parent: CellRef) {
        self.parent = U32::new(parent.bits());
    }
}

const _: () = assert!(RECORD_HEADER_SIZE == size_of::<RecordHeader>());

/// Borrowed view of a stored name, in either encoding.
#[derive(Debug, Clone, Copy)]
pub enum NameRef<'a> {
    Compressed(&'a [u8]),
    Wide(&'a [u8]),
}

impl<'a> NameRef<'a> {
    pub fn len(&self) -> usize {
        match self {
            NameRef::Compressed(bytes) => bytes.len(),
            NameRef::Wide(bytes) => bytes.len() / 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unit(&self, i: usize) -> u16 {
        match self {
            NameRef::Compressed(bytes) => u16::from(bytes[i]),
            NameRef::Wide(bytes) => u16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]),
        }
    }

    pub fn units(self) -> impl Iterator<Item = u16> + 'a {
        (0..self.len()).map(move |i| self.unit(i))
    }

    pub fn to_units(self) -> smallvec::SmallVec<[u16; 32]> {
        self.units().collect()
    }

    /// Hash of the name; both encodings produce the same value for the
    /// same unit sequence.
    pub fn hash(&self, upcase: Upcase) -> u32 {
        match self {
            NameRef::Compressed(bytes) => hash_name_bytes(upcase, bytes),
            NameRef::Wide(_) => self.units().fold(0u32, |h, unit| {
                h.wrapping_mul(37).wrapping_add(u32::from(upcase(unit)))
            }),
        }
    }
}

/// Read-only view of a key record.
#[derive(Debug)]
pub struct KeyRecord<'a> {
    data: &'a [u8],
}

impl<'a> KeyRecord<'a> {
    pub fn from_cell(data: &'a [u8]) -> Result<Self> {
        ensure!(
            data.len() >= RECORD_HEADER_SIZE,
            "cell too small for a key record: {} bytes",
            data.len()
        );
        let record = Self { data };
        let header = record.header();
        let name_bytes = if header.flags() & NAME_COMPRESSED != 0 {
            header.name_len() as usize
        } else {
            header.name_len() as usize * 2
        };
        ensure!(
            data.len() >= RECORD_HEADER_SIZE + name_bytes,
            "key record name extends beyond its cell: need {}, have {}",
            RECORD_HEADER_SIZE + name_bytes,
            data.len()
        );
        Ok(record)
    }

    fn header(&self) -> &RecordHeader {
        RecordHeader::ref_from_bytes(&self.data[..RECORD_HEADER_SIZE]).unwrap()
    }

    pub fn compressed(&self) -> bool {
        self.header().flags() & NAME_COMPRESSED != 0
    }

    pub fn name_len(&self) -> usize {
        self.header().name_len() as usize
    }

    pub fn parent(&self) -> CellRef {
        self.header().parent()
    }

    pub fn name(&self) -> NameRef<'a> {
        let len = self.name_len();
        if self.compressed() {
            NameRef::Compressed(&self.data[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + len])
        } else {
            NameRef::Wide(&self.data[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + 2 * len])
        }
    }
}

/// Mutable view of a key record. Only the parent back-reference is
/// writable; names are immutable once stored.
pub struct KeyRecordMut<'a> {
    data: &'a mut [u8],
}

impl<'a> KeyRecordMut<'a> {
    pub fn from_cell(data: &'a mut [u8]) -> Result<Self> {
        KeyRecord::from_cell(data)?;
        Ok(Self { data })
    }

    pub fn set_parent(&mut self, parent: CellRef) {
        let header =
            RecordHeader::mut_from_bytes(&mut self.data[..RECORD_HEADER_SIZE]).unwrap();
        header.set_parent(parent);
    }
}

/// Whether a name qualifies for the compressed encoding.
pub fn compressible(name: &[u16]) -> bool {
    name.iter().all(|&unit| unit <= u16::from(u8::MAX))
}

/// Serialized size of a key record holding `name`.
pub fn record_size(name: &[u16]) -> usize {
    let name_bytes = if compressible(name) {
        name.len()
    } else {
        name.len() * 2
    };
    RECORD_HEADER_SIZE + name_bytes
}

/// Serializes a key record into `buf`, picking the compressed encoding
/// whenever the name allows it.
pub fn write_record(buf: &mut [u8], name: &[u16], parent: CellRef) -> Result<()> {
    ensure!(
        buf.len() >= record_size(name),
        "buffer too small for key record: {} < {}",
        buf.len(),
        record_size(name)
    );
    ensure!(
        name.len() <= usize::from(u16::MAX),
        "name of {} units overflows the record header",
        name.len()
    );

    let compressed = compressible(name);
    let header = RecordHeader {
        flags: U16::new(if compressed { NAME_COMPRESSED } else { 0 }),
        name_len: U16::new(name.len() as u16),
        parent: U32::new(parent.bits()),
    };
    buf[..RECORD_HEADER_SIZE].copy_from_slice(header.as_bytes());

    let mut offset = RECORD_HEADER_SIZE;
    if compressed {
        for &unit in name {
            buf[offset] = unit as u8;
            offset += 1;
        }
    } else {
        for &unit in name {
            buf[offset..offset + 2].copy_from_slice(&unit.to_le_bytes());
            offset += 2;
        }
    }
    Ok(())
}

/// Allocates and initializes a key record cell.
pub fn create_record<S: CellStore>(
    store: &mut S,
    class: StorageClass,
    name: &[u16],
    parent: CellRef,
) -> Result<CellRef> {
    let cell = store.allocate(record_size(name), class, parent)?;
    store.mark_dirty(cell)?;
    write_record(store.cell_mut(cell)?, name, parent)?;
    Ok(cell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::name::{latin1_upcase, utf16_units};
    use crate::store::MemArena;

    #[test]
    fn record_header_is_8_bytes() {
        assert_eq!(size_of::<RecordHeader>(), 8);
    }

    #[test]
    fn narrow_name_roundtrips_compressed() {
        let name = utf16_units("services");
        let mut buf = vec![0u8; record_size(&name)];
        write_record(&mut buf, &name, CellRef::NIL).unwrap();

        let record = KeyRecord::from_cell(&buf).unwrap();

        assert!(record.compressed());
        assert_eq!(record.name_len(), 8);
        assert_eq!(record.name().to_units().as_slice(), name.as_slice());
        assert_eq!(buf.len(), RECORD_HEADER_SIZE + 8);
    }

    #[test]
    fn wide_name_roundtrips_uncompressed() {
        let name = vec![0x263A, u16::from(b'x')];
        let mut buf = vec![0u8; record_size(&name)];
        write_record(&mut buf, &name, CellRef::NIL).unwrap();

        let record = KeyRecord::from_cell(&buf).unwrap();

        assert!(!record.compressed());
        assert_eq!(record.name().to_units().as_slice(), name.as_slice());
        assert_eq!(buf.len(), RECORD_HEADER_SIZE + 4);
    }

    #[test]
    fn empty_name_is_a_valid_record() {
        let mut buf = vec![0u8; record_size(&[])];
        write_record(&mut buf, &[], CellRef::NIL).unwrap();

        let record = KeyRecord::from_cell(&buf).unwrap();

        assert_eq!(record.name_len(), 0);
        assert!(record.name().is_empty());
    }

    #[test]
    fn parent_backreference_is_rewritable() {
        let name = utf16_units("child");
        let mut buf = vec![0u8; record_size(&name)];
        write_record(&mut buf, &name, CellRef::NIL).unwrap();

        let parent = CellRef::new(StorageClass::Stable, 17);
        KeyRecordMut::from_cell(&mut buf).unwrap().set_parent(parent);

        let record = KeyRecord::from_cell(&buf).unwrap();
        assert_eq!(record.parent(), parent);
        assert_eq!(record.name().to_units().as_slice(), name.as_slice());
    }

    #[test]
    fn truncated_record_is_rejected() {
        let name = utf16_units("longname");
        let mut buf = vec![0u8; record_size(&name)];
        write_record(&mut buf, &name, CellRef::NIL).unwrap();

        let result = KeyRecord::from_cell(&buf[..RECORD_HEADER_SIZE + 2]);

        assert!(result.is_err());
    }

    #[test]
    fn both_encodings_hash_identically() {
        let narrow = utf16_units("Control");
        let mut compressed = vec![0u8; record_size(&narrow)];
        write_record(&mut compressed, &narrow, CellRef::NIL).unwrap();

        // force the wide encoding by appending a wide unit, then dropping it
        let mut widened = narrow.clone();
        widened.push(0x2603);
        let mut wide = vec![0u8; record_size(&widened)];
        write_record(&mut wide, &widened, CellRef::NIL).unwrap();

        let a = KeyRecord::from_cell(&compressed).unwrap();
        let b = KeyRecord::from_cell(&wide).unwrap();
        let b_prefix: Vec<u16> = b.name().units().take(narrow.len()).collect();

        assert_eq!(b_prefix, narrow);
        assert_eq!(
            a.name().hash(latin1_upcase),
            crate::index::name::hash_name(latin1_upcase, &b_prefix),
        );
    }

    #[test]
    fn create_record_allocates_and_fills() {
        let mut arena = MemArena::new();
        let name = utf16_units("alpha");

        let cell = create_record(&mut arena, StorageClass::Stable, &name, CellRef::NIL).unwrap();

        let record = KeyRecord::from_cell(arena.cell(cell).unwrap()).unwrap();
        assert_eq!(record.name().to_units().as_slice(), name.as_slice());
        assert!(arena.is_dirty(cell));
    }
}
