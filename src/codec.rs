//! Fixed binary wire format: a length-prefixed, self-describing record
//! with a `{timestamp_ns, correlation_id, tag}` header, a discriminated
//! value, and a symbol key. Bit-exact compatibility with any specific
//! upstream codec is out of scope (`SPEC_FULL.md` §6); what's required
//! is `encode ∘ decode = identity` for every supported format.

use crate::event::EventName;
use crate::property::{ArrayData, ElementType, MajorOrder, PropertyValue};

/// The header every message carries ahead of its key/value body.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeader {
    pub timestamp_ns: i64,
    pub correlation_id: i64,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: MessageHeader,
    pub key: EventName,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    BufferTooSmall,
    Truncated,
    UnknownFormat(u8),
    UnknownElementType(u8),
    InvalidUtf8,
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::BufferTooSmall => write!(f, "buffer too small to encode message"),
            CodecError::Truncated => write!(f, "message truncated"),
            CodecError::UnknownFormat(b) => write!(f, "unknown format discriminant {b}"),
            CodecError::UnknownElementType(b) => write!(f, "unknown element type {b}"),
            CodecError::InvalidUtf8 => write!(f, "invalid utf-8 in string/symbol/tag"),
        }
    }
}

impl std::error::Error for CodecError {}

const FMT_NOTHING: u8 = 0;
const FMT_INT: u8 = 1;
const FMT_FLOAT: u8 = 2;
const FMT_BOOL: u8 = 3;
const FMT_SYMBOL: u8 = 4;
const FMT_STRING: u8 = 5;
const FMT_ARRAY: u8 = 6;
const FMT_TENSOR: u8 = 7;
const FMT_TUPLE: u8 = 8;

const ELEM_INT: u8 = 0;
const ELEM_FLOAT: u8 = 1;
const ELEM_BOOL: u8 = 2;

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Writer { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(CodecError::BufferTooSmall);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn put_u8(&mut self, b: u8) -> Result<(), CodecError> {
        self.put(&[b])
    }

    fn put_i32(&mut self, v: i32) -> Result<(), CodecError> {
        self.put(&v.to_le_bytes())
    }

    fn put_i64(&mut self, v: i64) -> Result<(), CodecError> {
        self.put(&v.to_le_bytes())
    }

    fn put_f64(&mut self, v: f64) -> Result<(), CodecError> {
        self.put(&v.to_le_bytes())
    }

    fn put_str(&mut self, s: &str) -> Result<(), CodecError> {
        self.put_i32(s.len() as i32)?;
        self.put(s.as_bytes())
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(CodecError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn get_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn get_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn get_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn get_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn get_str(&mut self) -> Result<String, CodecError> {
        let len = self.get_i32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

fn element_type_byte(e: ElementType) -> u8 {
    match e {
        ElementType::Int => ELEM_INT,
        ElementType::Float => ELEM_FLOAT,
        ElementType::Bool => ELEM_BOOL,
    }
}

fn element_type_from_byte(b: u8) -> Result<ElementType, CodecError> {
    match b {
        ELEM_INT => Ok(ElementType::Int),
        ELEM_FLOAT => Ok(ElementType::Float),
        ELEM_BOOL => Ok(ElementType::Bool),
        other => Err(CodecError::UnknownElementType(other)),
    }
}

fn encode_value(w: &mut Writer, value: &PropertyValue) -> Result<(), CodecError> {
    match value {
        PropertyValue::Nothing => w.put_u8(FMT_NOTHING),
        PropertyValue::Int(v) => {
            w.put_u8(FMT_INT)?;
            w.put_i64(*v)
        }
        PropertyValue::Float(v) => {
            w.put_u8(FMT_FLOAT)?;
            w.put_f64(*v)
        }
        PropertyValue::Bool(v) => {
            w.put_u8(FMT_BOOL)?;
            w.put_u8(if *v { 1 } else { 0 })
        }
        PropertyValue::Symbol(s) => {
            w.put_u8(FMT_SYMBOL)?;
            w.put_str(s.as_str())
        }
        PropertyValue::String(s) => {
            w.put_u8(FMT_STRING)?;
            w.put_str(s)
        }
        PropertyValue::Array {
            element,
            dims,
            major_order,
            origin,
            data,
        } => {
            let has_tensor_metadata = !dims.is_empty() || origin.is_some();
            w.put_u8(if has_tensor_metadata { FMT_TENSOR } else { FMT_ARRAY })?;
            w.put_u8(element_type_byte(*element))?;
            if has_tensor_metadata {
                w.put_u8(match major_order {
                    MajorOrder::Row => 0,
                    MajorOrder::Column => 1,
                })?;
                w.put_i32(dims.len() as i32)?;
                for d in dims {
                    w.put_i32(*d)?;
                }
                match origin {
                    Some(o) => {
                        w.put_u8(1)?;
                        w.put_i32(o.len() as i32)?;
                        for v in o {
                            w.put_i32(*v)?;
                        }
                    }
                    None => w.put_u8(0)?,
                }
            }
            match data {
                ArrayData::Int(v) => {
                    w.put_i32(v.len() as i32)?;
                    for x in v {
                        w.put_i64(*x)?;
                    }
                }
                ArrayData::Float(v) => {
                    w.put_i32(v.len() as i32)?;
                    for x in v {
                        w.put_f64(*x)?;
                    }
                }
                ArrayData::Bool(v) => {
                    w.put_i32(v.len() as i32)?;
                    for x in v {
                        w.put_u8(if *x { 1 } else { 0 })?;
                    }
                }
            }
            Ok(())
        }
        PropertyValue::Tuple(elements) => {
            w.put_u8(FMT_TUPLE)?;
            w.put_i32(elements.len() as i32)?;
            for element in elements {
                encode_value(w, element)?;
            }
            Ok(())
        }
    }
}

fn decode_value(r: &mut Reader) -> Result<PropertyValue, CodecError> {
    let fmt = r.get_u8()?;
    match fmt {
        FMT_NOTHING => Ok(PropertyValue::Nothing),
        FMT_INT => Ok(PropertyValue::Int(r.get_i64()?)),
        FMT_FLOAT => Ok(PropertyValue::Float(r.get_f64()?)),
        FMT_BOOL => Ok(PropertyValue::Bool(r.get_u8()? != 0)),
        FMT_SYMBOL => Ok(PropertyValue::Symbol(EventName::new(leak_str(r.get_str()?)))),
        FMT_STRING => Ok(PropertyValue::String(r.get_str()?)),
        FMT_ARRAY | FMT_TENSOR => {
            let element = element_type_from_byte(r.get_u8()?)?;
            let (major_order, dims, origin) = if fmt == FMT_TENSOR {
                let major_order = if r.get_u8()? == 0 { MajorOrder::Row } else { MajorOrder::Column };
                let ndims = r.get_i32()? as usize;
                let mut dims = Vec::with_capacity(ndims);
                for _ in 0..ndims {
                    dims.push(r.get_i32()?);
                }
                let has_origin = r.get_u8()? != 0;
                let origin = if has_origin {
                    let n = r.get_i32()? as usize;
                    let mut o = Vec::with_capacity(n);
                    for _ in 0..n {
                        o.push(r.get_i32()?);
                    }
                    Some(o)
                } else {
                    None
                };
                (major_order, dims, origin)
            } else {
                (MajorOrder::Row, Vec::new(), None)
            };
            let n = r.get_i32()? as usize;
            let data = match element {
                ElementType::Int => {
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(r.get_i64()?);
                    }
                    ArrayData::Int(v)
                }
                ElementType::Float => {
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(r.get_f64()?);
                    }
                    ArrayData::Float(v)
                }
                ElementType::Bool => {
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(r.get_u8()? != 0);
                    }
                    ArrayData::Bool(v)
                }
            };
            Ok(PropertyValue::Array {
                element,
                dims,
                major_order,
                origin,
                data,
            })
        }
        FMT_TUPLE => {
            let n = r.get_i32()? as usize;
            let mut elements = Vec::with_capacity(n);
            for _ in 0..n {
                elements.push(decode_value(r)?);
            }
            Ok(PropertyValue::Tuple(elements))
        }
        other => Err(CodecError::UnknownFormat(other)),
    }
}

/// Symbol names decoded off the wire must become `'static` to be used as
/// `EventName`s (our interner only accepts statics, since every name an
/// agent deals with is known at compile time — see `SPEC_FULL.md`'s
/// redesign note on symbol-keyed events). Wire-decoded symbols are
/// necessarily a closed, small set in practice (property/event names),
/// so leaking is bounded by the number of distinct symbols ever seen,
/// not by message volume.
fn leak_str(s: String) -> &'static str {
    Box::leak(s.into_boxed_str())
}

/// Encodes `message` into `buf`, returning the number of bytes written.
pub fn encode(buf: &mut [u8], message: &Message) -> Result<usize, CodecError> {
    let mut w = Writer::new(buf);
    w.put_i64(message.header.timestamp_ns)?;
    w.put_i64(message.header.correlation_id)?;
    w.put_str(&message.header.tag)?;
    w.put_str(message.key.as_str())?;
    encode_value(&mut w, &message.value)?;
    Ok(w.pos)
}

/// Decodes a [`Message`] from the front of `buf`.
pub fn decode(buf: &[u8]) -> Result<Message, CodecError> {
    let mut r = Reader::new(buf);
    let timestamp_ns = r.get_i64()?;
    let correlation_id = r.get_i64()?;
    let tag = r.get_str()?;
    let key = EventName::new(leak_str(r.get_str()?));
    let value = decode_value(&mut r)?;
    Ok(Message {
        header: MessageHeader {
            timestamp_ns,
            correlation_id,
            tag,
        },
        key,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: PropertyValue) {
        let message = Message {
            header: MessageHeader {
                timestamp_ns: 123,
                correlation_id: 456,
                tag: "agent-1".into(),
            },
            key: EventName::new("temperature"),
            value: value.clone(),
        };
        let mut buf = [0u8; 512];
        let n = encode(&mut buf, &message).unwrap();
        let decoded = decode(&buf[..n]).unwrap();
        assert_eq!(decoded.value, value);
        assert_eq!(decoded.header, message.header);
        assert_eq!(decoded.key, message.key);
    }

    #[test]
    fn round_trips_every_scalar_format() {
        roundtrip(PropertyValue::Nothing);
        roundtrip(PropertyValue::Int(-42));
        roundtrip(PropertyValue::Float(3.5));
        roundtrip(PropertyValue::Bool(true));
        roundtrip(PropertyValue::Symbol(EventName::new("Playing")));
        roundtrip(PropertyValue::String("hello".into()));
    }

    #[test]
    fn round_trips_flat_array() {
        roundtrip(PropertyValue::Array {
            element: ElementType::Int,
            dims: Vec::new(),
            major_order: MajorOrder::Row,
            origin: None,
            data: ArrayData::Int(vec![1, 2, 3]),
        });
    }

    #[test]
    fn round_trips_tensor_with_dims_and_origin() {
        roundtrip(PropertyValue::Array {
            element: ElementType::Float,
            dims: vec![2, 3],
            major_order: MajorOrder::Column,
            origin: Some(vec![0, 0]),
            data: ArrayData::Float(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        });
    }

    #[test]
    fn round_trips_tuple() {
        roundtrip(PropertyValue::Tuple(vec![
            PropertyValue::Int(1),
            PropertyValue::Float(2.5),
            PropertyValue::String("three".into()),
        ]));
    }

    #[test]
    fn round_trips_nested_tuple() {
        roundtrip(PropertyValue::Tuple(vec![
            PropertyValue::Tuple(vec![PropertyValue::Bool(true), PropertyValue::Nothing]),
            PropertyValue::Symbol(EventName::new("Playing")),
        ]));
    }

    #[test]
    fn buffer_too_small_is_reported_not_panicked() {
        let message = Message {
            header: MessageHeader {
                timestamp_ns: 1,
                correlation_id: 1,
                tag: "t".into(),
            },
            key: EventName::new("k"),
            value: PropertyValue::String("a long string that won't fit".into()),
        };
        let mut buf = [0u8; 4];
        assert_eq!(encode(&mut buf, &message), Err(CodecError::BufferTooSmall));
    }
}
