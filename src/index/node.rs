//! # Node Tags and Headers
//!
//! Every index node — root or leaf, in any encoding — serializes as a
//! 4-byte header followed by a dense entry array:
//!
//! ```text
//! +--------+--------+--------+--------+----------------------------+
//! |   tag (2 bytes)  | count (2 bytes) | entries (count * stride)  |
//! +--------+--------+--------+--------+----------------------------+
//! ```
//!
//! The tag is two ASCII bytes naming the node kind; the entry stride is a
//! function of the kind. Cells are allocated with room for some number of
//! entries, so a node's capacity is derived from its cell size rather
//! than stored.

use eyre::{ensure, Result};
use zerocopy::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{
    LeafStyle, NODE_HEADER_SIZE, PLAIN_ENTRY_SIZE, ROOT_ENTRY_SIZE, WIDE_ENTRY_SIZE,
};
use crate::zerocopy_accessors;

/// Physical kind of an index node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Fan-out node: an ordered array of leaf references.
    Root,
    /// Sorted leaf of bare child references.
    PlainLeaf,
    /// Sorted leaf of child references with name-prefix hints.
    HintLeaf,
    /// Unordered leaf of child references with full-name hashes.
    HashLeaf,
}

impl NodeKind {
    pub fn tag(self) -> u16 {
        u16::from_le_bytes(match self {
            NodeKind::Root => *b"rt",
            NodeKind::PlainLeaf => *b"pl",
            NodeKind::HintLeaf => *b"nh",
            NodeKind::HashLeaf => *b"kh",
        })
    }

    pub fn from_tag(tag: u16) -> Option<NodeKind> {
        match &tag.to_le_bytes() {
            b"rt" => Some(NodeKind::Root),
            b"pl" => Some(NodeKind::PlainLeaf),
            b"nh" => Some(NodeKind::HintLeaf),
            b"kh" => Some(NodeKind::HashLeaf),
            _ => None,
        }
    }

    pub fn is_leaf(self) -> bool {
        self != NodeKind::Root
    }

    /// Bytes per entry in this node's array.
    pub fn entry_size(self) -> usize {
        match self {
            NodeKind::Root => ROOT_ENTRY_SIZE,
            NodeKind::PlainLeaf => PLAIN_ENTRY_SIZE,
            NodeKind::HintLeaf | NodeKind::HashLeaf => WIDE_ENTRY_SIZE,
        }
    }
}

impl From<LeafStyle> for NodeKind {
    fn from(style: LeafStyle) -> Self {
        match style {
            LeafStyle::Plain => NodeKind::PlainLeaf,
            LeafStyle::Hinted => NodeKind::HintLeaf,
            LeafStyle::Hashed => NodeKind::HashLeaf,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeHeader {
    tag: U16,
    count: U16,
}

const _: () = assert!(NODE_HEADER_SIZE == size_of::<NodeHeader>());

impl NodeHeader {
    zerocopy_accessors! {
        tag: u16,
        count: u16,
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= NODE_HEADER_SIZE,
            "cell too small for a node header: {} bytes",
            data.len()
        );
        Self::ref_from_bytes(&data[..NODE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read node header: {:?}", e))
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            data.len() >= NODE_HEADER_SIZE,
            "cell too small for a node header: {} bytes",
            data.len()
        );
        Self::mut_from_bytes(&mut data[..NODE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read node header: {:?}", e))
    }

    pub fn kind(&self) -> Result<NodeKind> {
        NodeKind::from_tag(self.tag())
            .ok_or_else(|| eyre::eyre!("unknown node tag {:#06x}", self.tag()))
    }
}

/// Kind of the node stored in a cell.
pub fn node_kind(data: &[u8]) -> Result<NodeKind> {
    NodeHeader::from_bytes(data)?.kind()
}

/// Cell size needed for a node with room for `entries` entries.
pub fn node_size_for(kind: NodeKind, entries: usize) -> usize {
    NODE_HEADER_SIZE + entries * kind.entry_size()
}
