//! Attribute records and typed values.

use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::header::{index_from_wire, index_to_wire};

/// Typed value wire structure (`Res_value`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct RawValue {
    /// Size of this structure, always 8.
    pub size: U16,
    /// Always 0.
    pub res0: u8,
    pub data_type: u8,
    pub data: U32,
}

/// Attribute wire structure (`ResXMLTree_attribute`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct RawAttribute {
    /// Namespace uri string index, or `NO_INDEX`.
    pub namespace: U32,
    /// Attribute name string index.
    pub name: U32,
    /// Original value string index, or `NO_INDEX`.
    pub raw_value: U32,
    pub typed_value: RawValue,
}

impl RawAttribute {
    /// Size of an attribute record in bytes.
    pub const SIZE: usize = 20;
}

/// A typed resource value: a type tag plus four bytes of data.
///
/// The compiler only produces [`Value::TYPE_STRING`] values. Other types are
/// kept verbatim when decoding files produced by other tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value {
    pub data_type: u8,
    pub data: u32,
}

impl Value {
    /// Size of the wire structure.
    pub const SIZE: u16 = 8;

    pub const TYPE_NULL: u8 = 0x00;
    pub const TYPE_REFERENCE: u8 = 0x01;
    pub const TYPE_ATTRIBUTE: u8 = 0x02;
    /// `data` is a string pool index.
    pub const TYPE_STRING: u8 = 0x03;
    pub const TYPE_FLOAT: u8 = 0x04;
    pub const TYPE_DIMENSION: u8 = 0x05;
    pub const TYPE_FRACTION: u8 = 0x06;
    pub const TYPE_INT_DEC: u8 = 0x10;
    pub const TYPE_INT_HEX: u8 = 0x11;
    pub const TYPE_INT_BOOLEAN: u8 = 0x12;
    pub const TYPE_FIRST_COLOR_INT: u8 = 0x1c;
    pub const TYPE_LAST_COLOR_INT: u8 = 0x1f;

    /// A string reference value.
    pub const fn string(index: u32) -> Self {
        Self {
            data_type: Self::TYPE_STRING,
            data: index,
        }
    }

    /// String pool index this value references, if it is a string.
    pub fn string_index(&self) -> Option<u32> {
        (self.data_type == Self::TYPE_STRING).then_some(self.data)
    }

    pub(crate) fn to_raw(self) -> RawValue {
        RawValue {
            size: U16::new(Self::SIZE),
            res0: 0,
            data_type: self.data_type,
            data: U32::new(self.data),
        }
    }

    pub(crate) fn from_raw(raw: &RawValue) -> Self {
        Self {
            data_type: raw.data_type,
            data: raw.data.get(),
        }
    }
}

/// An attribute of a start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Namespace uri string index, `None` for unqualified attributes.
    pub namespace: Option<u32>,
    /// Local name string index.
    pub name: u32,
    /// Original value string index.
    pub raw_value: Option<u32>,
    pub typed_value: Value,
}

impl Attribute {
    pub(crate) fn to_raw(&self) -> RawAttribute {
        RawAttribute {
            namespace: U32::new(index_to_wire(self.namespace)),
            name: U32::new(self.name),
            raw_value: U32::new(index_to_wire(self.raw_value)),
            typed_value: self.typed_value.to_raw(),
        }
    }

    pub(crate) fn from_raw(raw: &RawAttribute) -> Self {
        Self {
            namespace: index_from_wire(raw.namespace.get()),
            name: raw.name.get(),
            raw_value: index_from_wire(raw.raw_value.get()),
            typed_value: Value::from_raw(&raw.typed_value),
        }
    }
}
