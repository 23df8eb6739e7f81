//! Property definitions, value kinds, and borrowed views for the named-member protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved pseudo-property that always resolves to the enumerable member count.
pub const MEMBERS: &str = "members";

/// Element type of a property slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    Int,
    Float,
    Bytes,
    String,
}

impl PropertyKind {
    /// Size in bytes of a single element (strings count as one opaque element).
    pub fn element_size(self) -> usize {
        match self {
            Self::Int => std::mem::size_of::<i32>(),
            Self::Float => std::mem::size_of::<f64>(),
            Self::Bytes => 1,
            Self::String => 1,
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bytes => "bytes",
            Self::String => "string",
        };
        f.write_str(s)
    }
}

/// Whether operators may write a slot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyAccess {
    /// Written by operators, applied at the next encode/decode call.
    #[default]
    ReadWrite,
    /// Fixed for the open session or published by the encoder itself.
    ReadOnly,
}

/// Static description of a property slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
    /// Length of the underlying array; 1 for scalars and strings.
    pub element_count: usize,
    pub access: PropertyAccess,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, kind: PropertyKind, element_count: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            element_count,
            access: PropertyAccess::ReadWrite,
        }
    }

    pub fn scalar(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self::new(name, kind, 1)
    }

    pub fn read_only(mut self) -> Self {
        self.access = PropertyAccess::ReadOnly;
        self
    }

    pub fn is_writable(&self) -> bool {
        self.access == PropertyAccess::ReadWrite
    }

    /// Size in bytes of the slot's backing storage.
    pub fn byte_size(&self) -> usize {
        self.element_count * self.kind.element_size()
    }
}

/// Concrete property value.
///
/// Scalars are one-element arrays so that every slot has the same
/// `kind + element_count` shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(Vec<i32>),
    Float(Vec<f64>),
    Bytes(Vec<u8>),
    String(String),
}

impl PropertyValue {
    pub fn int(v: i32) -> Self {
        Self::Int(vec![v])
    }

    pub fn float(v: f64) -> Self {
        Self::Float(vec![v])
    }

    pub fn string(v: impl Into<String>) -> Self {
        Self::String(v.into())
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Int(_) => PropertyKind::Int,
            Self::Float(_) => PropertyKind::Float,
            Self::Bytes(_) => PropertyKind::Bytes,
            Self::String(_) => PropertyKind::String,
        }
    }

    /// Number of elements carried by the value (strings are a single element).
    pub fn element_count(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Bytes(v) => v.len(),
            Self::String(_) => 1,
        }
    }

    /// The scalar integer, if this is a one-element `Int`.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i32]> {
        match self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Overwrite `self` in place with `src`, reusing the existing allocation.
    ///
    /// The caller has already checked that kinds and lengths agree.
    pub fn assign_from(&mut self, src: PropertyValue) {
        match (self, src) {
            (Self::Int(dst), Self::Int(src)) => dst.copy_from_slice(&src),
            (Self::Float(dst), Self::Float(src)) => dst.copy_from_slice(&src),
            (Self::Bytes(dst), Self::Bytes(src)) => dst.copy_from_slice(&src),
            (dst, src) => *dst = src,
        }
    }

    pub fn view(&self) -> PropertyView<'_> {
        match self {
            Self::Int(v) => PropertyView::Int(v),
            Self::Float(v) => PropertyView::Float(v),
            Self::Bytes(v) => PropertyView::Bytes(v),
            Self::String(s) => PropertyView::String(s),
        }
    }
}

/// Borrowed view of a live property slot.
///
/// Views are only handed out inside a closure (see the session's property
/// access handle), so a view cannot outlive the next mutating call.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PropertyView<'a> {
    Int(&'a [i32]),
    Float(&'a [f64]),
    Bytes(&'a [u8]),
    String(&'a str),
}

impl PropertyView<'_> {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Int(_) => PropertyKind::Int,
            Self::Float(_) => PropertyKind::Float,
            Self::Bytes(_) => PropertyKind::Bytes,
            Self::String(_) => PropertyKind::String,
        }
    }

    pub fn element_count(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Bytes(v) => v.len(),
            Self::String(_) => 1,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int([v]) => Some(*v),
            _ => None,
        }
    }

    /// Copy the viewed data into an owned value.
    pub fn to_owned_value(&self) -> PropertyValue {
        match self {
            Self::Int(v) => PropertyValue::Int(v.to_vec()),
            Self::Float(v) => PropertyValue::Float(v.to_vec()),
            Self::Bytes(v) => PropertyValue::Bytes(v.to_vec()),
            Self::String(s) => PropertyValue::String((*s).to_string()),
        }
    }
}
