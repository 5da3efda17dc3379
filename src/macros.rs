//! # Internal Macros
//!
//! This module provides internal macros for reducing boilerplate in celltree.
//!
//! ## zerocopy_accessors!
//!
//! Generates getter and setter methods for zerocopy struct fields that use
//! little-endian wrapper types (U16, U32).
//!
//! ### Usage
//!
//! ```ignore
//! use zerocopy::little_endian::U16;
//!
//! #[repr(C)]
//! struct NodeHeader {
//!     tag: U16,
//!     count: U16,
//! }
//!
//! impl NodeHeader {
//!     zerocopy_accessors! {
//!         tag: u16,
//!         count: u16,
//!     }
//! }
//!
//! // Generates:
//! // pub fn tag(&self) -> u16 { self.tag.get() }
//! // pub fn set_tag(&mut self, val: u16) { self.tag = U16::new(val); }
//! // pub fn count(&self) -> u16 { self.count.get() }
//! // pub fn set_count(&mut self, val: u16) { self.count = U16::new(val); }
//! ```

/// Generates getter and setter methods for zerocopy little-endian fields.
#[macro_export]
macro_rules! zerocopy_accessors {
    (@impl $field:ident, u16) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u16 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u16) {
                self.$field = ::zerocopy::little_endian::U16::new(val);
            }
        }
    };
    (@impl $field:ident, u32) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u32 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u32) {
                self.$field = ::zerocopy::little_endian::U32::new(val);
            }
        }
    };
    ($($field:ident : $ty:tt),* $(,)?) => {
        $(
            $crate::zerocopy_accessors!(@impl $field, $ty);
        )*
    };
}
