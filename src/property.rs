//! Property values and the trait contract generated property stores
//! implement.
//!
//! Per the redesign notes, heterogeneous dynamically-typed values become
//! a fixed, compile-time enum of supported formats; the per-agent key
//! set and field access becomes code generated by
//! `#[derive(rtc_agent_derive::PropertyStore)]` rather than reflected at
//! runtime. See `components/rtc-agent-derive` and `SPEC_FULL.md` §4.9.

use crate::event::EventName;

/// One array element type, used by [`PropertyValue::Array`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementType {
    Int,
    Float,
    Bool,
}

/// Row- or column-major layout of a tensor's flattened `data`, carried
/// over the wire alongside `dims`/`origin` (`SPEC_FULL.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MajorOrder {
    Row,
    Column,
}

/// The fixed set of value formats a property (or wire message) may
/// carry. Publish-time dispatch is a match over this enum instead of
/// generic reflection, per the non-goal in `SPEC_FULL.md` §1.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Nothing,
    Int(i64),
    Float(f64),
    Bool(bool),
    Symbol(EventName),
    String(String),
    /// 1-D or N-D array of a single primitive element type, encoded over
    /// the wire as a tensor message. `dims` is empty for a flat 1-D
    /// array of `data.len()` elements; `origin`, when present, anchors
    /// the array within a larger logical tensor.
    Array {
        element: ElementType,
        dims: Vec<i32>,
        major_order: MajorOrder,
        origin: Option<Vec<i32>>,
        data: ArrayData,
    },
    /// A fixed-arity tuple of heterogeneous values, per `SPEC_FULL.md`
    /// §4.6's "tuple of the above" payload format.
    Tuple(Vec<PropertyValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Nothing => "nothing",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Symbol(_) => "symbol",
            PropertyValue::String(_) => "string",
            PropertyValue::Array { .. } => "array",
            PropertyValue::Tuple(_) => "tuple",
        }
    }
}

/// Read/write access mode for a property key, checked before dispatching
/// a write or a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Readable,
    Writable,
    ReadWrite,
}

impl AccessMode {
    pub fn is_readable(self) -> bool {
        matches!(self, AccessMode::Readable | AccessMode::ReadWrite)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, AccessMode::Writable | AccessMode::ReadWrite)
    }
}

/// The trait a `#[derive(PropertyStore)]`-generated struct implements so
/// the HSM's default read/write handler and the property poller can
/// operate over the whole key set without per-field code.
///
/// `Key` is the generated enum listing every annotated field.
pub trait PropertyStore {
    type Key: Copy + Eq + std::fmt::Debug + 'static;

    /// All keys, in declaration order — the order `Properties` reads
    /// them back in and the order publication configs are naturally
    /// registered in.
    fn keys() -> &'static [Self::Key];

    fn key_name(key: Self::Key) -> EventName;
    fn key_by_name(name: EventName) -> Option<Self::Key>;
    fn access_mode(key: Self::Key) -> AccessMode;

    /// Timestamp of the most recent successful write to `key`; `-1` if
    /// never written.
    fn last_update_ns(&self, key: Self::Key) -> i64;

    fn get(&self, key: Self::Key) -> Result<PropertyValue, crate::error::PropertyError>;

    /// Validates and applies a write, stamping `last_update_ns` with
    /// `now_ns` on success. Rejects writes to read-only keys and
    /// type-mismatched values.
    fn set(&mut self, key: Self::Key, value: PropertyValue, now_ns: i64) -> Result<(), crate::error::PropertyError>;
}

/// Storage slot for one property: a typed value plus the timestamp of
/// its most recent successful write. Fields of a
/// `#[derive(PropertyStore)]` struct are declared with this wrapper so
/// the derive macro has somewhere to keep `last_update_ns` without
/// needing to inject hidden fields into the user's struct.
#[derive(Debug, Clone)]
pub struct Property<T> {
    value: T,
    last_update_ns: i64,
}

impl<T> Property<T> {
    pub fn new(value: T) -> Self {
        Property {
            value,
            last_update_ns: crate::clock::NEVER,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn last_update_ns(&self) -> i64 {
        self.last_update_ns
    }

    /// Reads never mutate `last_update_ns`; only `set` does.
    pub fn set(&mut self, value: T, now_ns: i64) {
        self.value = value;
        self.last_update_ns = now_ns;
    }
}

macro_rules! impl_property_value_conversion {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for PropertyValue {
            fn from(v: $ty) -> Self {
                PropertyValue::$variant(v)
            }
        }

        impl TryFrom<PropertyValue> for $ty {
            type Error = &'static str;

            fn try_from(v: PropertyValue) -> Result<Self, Self::Error> {
                match v {
                    PropertyValue::$variant(inner) => Ok(inner),
                    _ => Err(stringify!($variant)),
                }
            }
        }
    };
}

impl_property_value_conversion!(i64, Int);
impl_property_value_conversion!(f64, Float);
impl_property_value_conversion!(bool, Bool);
impl_property_value_conversion!(String, String);
impl_property_value_conversion!(EventName, Symbol);

impl From<Vec<i64>> for PropertyValue {
    fn from(data: Vec<i64>) -> Self {
        PropertyValue::Array {
            element: ElementType::Int,
            dims: Vec::new(),
            major_order: MajorOrder::Row,
            origin: None,
            data: ArrayData::Int(data),
        }
    }
}

impl TryFrom<PropertyValue> for Vec<i64> {
    type Error = &'static str;

    fn try_from(v: PropertyValue) -> Result<Self, Self::Error> {
        match v {
            PropertyValue::Array {
                data: ArrayData::Int(data),
                ..
            } => Ok(data),
            _ => Err("array<int>"),
        }
    }
}

impl From<Vec<f64>> for PropertyValue {
    fn from(data: Vec<f64>) -> Self {
        PropertyValue::Array {
            element: ElementType::Float,
            dims: Vec::new(),
            major_order: MajorOrder::Row,
            origin: None,
            data: ArrayData::Float(data),
        }
    }
}

impl TryFrom<PropertyValue> for Vec<f64> {
    type Error = &'static str;

    fn try_from(v: PropertyValue) -> Result<Self, Self::Error> {
        match v {
            PropertyValue::Array {
                data: ArrayData::Float(data),
                ..
            } => Ok(data),
            _ => Err("array<float>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_set_stamps_timestamp_and_read_does_not() {
        let mut p = Property::new(0i64);
        assert_eq!(p.last_update_ns(), crate::clock::NEVER);
        p.set(42, 1000);
        assert_eq!(*p.get(), 42);
        assert_eq!(p.last_update_ns(), 1000);
        let _ = p.get();
        assert_eq!(p.last_update_ns(), 1000, "reads must not bump the timestamp");
    }

    #[test]
    fn round_trip_scalar_conversions() {
        let v: PropertyValue = 7i64.into();
        assert_eq!(i64::try_from(v).unwrap(), 7);
        let v: PropertyValue = true.into();
        assert!(bool::try_from(v).unwrap());
        let v: PropertyValue = "hi".to_string().into();
        assert_eq!(String::try_from(v).unwrap(), "hi");
    }

    #[test]
    fn mismatched_conversion_is_rejected() {
        let v: PropertyValue = 7i64.into();
        assert!(bool::try_from(v).is_err());
    }
}
