//! Schema descriptors for schema-driven binary messages.
//!
//! A schema is a table from field number to the codec for that position plus
//! a fold function that folds each decoded value into the caller's aggregate.
//! The codec set is closed: new formats add table entries, never new codec
//! subclasses. Nested messages decode into [`Record`], a small universal
//! aggregate that keeps fields in arrival order.

use crate::scalar::{varint_len, zigzag_len};

/// Wire encoding hint carried in the low three bits of a field tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    /// Decode the hint from a tag. Unassigned encodings are a structural
    /// violation, reported by the message codec.
    pub fn from_tag(tag: u64) -> Option<WireType> {
        match tag & 7 {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

/// Scalar kind of a packed (length-delimited) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedKind {
    Varint,
    Zigzag,
    Fixed32,
    Fixed64,
}

/// One decoded field value.
///
/// `Packed` only appears on the encode side: the decoder folds packed runs
/// one element at a time, so an aggregate never sees the run as a unit.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Varint(u64),
    Zigzag(i64),
    Fixed32(u32),
    Fixed64(u64),
    Bytes(Vec<u8>),
    Message(Record),
    Packed(Vec<FieldValue>),
}

impl FieldValue {
    /// The wire encoding this value travels under.
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldValue::Varint(_) | FieldValue::Zigzag(_) => WireType::Varint,
            FieldValue::Fixed32(_) => WireType::Fixed32,
            FieldValue::Fixed64(_) => WireType::Fixed64,
            FieldValue::Bytes(_) | FieldValue::Message(_) | FieldValue::Packed(_) => {
                WireType::LengthDelimited
            }
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Varint(v) | FieldValue::Fixed64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Zigzag(v) => Some(*v),
            _ => None,
        }
    }

    /// Fixed32 bits reinterpreted as an IEEE-754 single.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            FieldValue::Fixed32(bits) => Some(f32::from_bits(*bits)),
            _ => None,
        }
    }

    /// Fixed64 bits reinterpreted as an IEEE-754 double.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Fixed64(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            FieldValue::Message(r) => Some(r),
            _ => None,
        }
    }

    /// Encoded length of the value payload, excluding tag and any length
    /// prefix of its own.
    pub fn payload_len(&self) -> usize {
        match self {
            FieldValue::Varint(v) => varint_len(*v),
            FieldValue::Zigzag(v) => zigzag_len(*v),
            FieldValue::Fixed32(_) => 4,
            FieldValue::Fixed64(_) => 8,
            FieldValue::Bytes(b) => b.len(),
            FieldValue::Message(r) => r.encoded_len(),
            FieldValue::Packed(items) => items.iter().map(FieldValue::payload_len).sum(),
        }
    }
}

/// Universal aggregate for nested messages: field values in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub fields: Vec<(u32, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value decoded for a field number.
    pub fn get(&self, number: u32) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, v)| v)
    }

    /// Every value decoded for a field number, in arrival order.
    pub fn get_all(&self, number: u32) -> impl Iterator<Item = &FieldValue> {
        self.fields
            .iter()
            .filter(move |(n, _)| *n == number)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fold function for record-target schemas.
    pub fn push_field(rec: &mut Record, number: u32, value: FieldValue) {
        rec.fields.push((number, value));
    }

    /// Encoded length of this record's fields, excluding any outer prefix.
    pub fn encoded_len(&self) -> usize {
        self.fields
            .iter()
            .map(|(number, value)| field_len(*number, value))
            .sum()
    }
}

/// Encoded length of one tagged field: tag varint, any length prefix, and
/// the payload.
pub fn field_len(number: u32, value: &FieldValue) -> usize {
    let tag = ((number as u64) << 3) | wire_bits(value.wire_type());
    let payload = value.payload_len();
    match value.wire_type() {
        WireType::LengthDelimited => varint_len(tag) + varint_len(payload as u64) + payload,
        _ => varint_len(tag) + payload,
    }
}

pub(crate) fn wire_bits(wire: WireType) -> u64 {
    match wire {
        WireType::Varint => 0,
        WireType::Fixed64 => 1,
        WireType::LengthDelimited => 2,
        WireType::Fixed32 => 5,
    }
}

/// Unknown-field policy for message decoding.
///
/// Strict decoding treats an unrecognized field number as malformed input;
/// skip-unknown discards the value by its wire type, the usual
/// forward-compatibility posture for evolving schemas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strictness {
    #[default]
    Strict,
    SkipUnknown,
}

/// Codec selected for one structural position.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind<'s> {
    Varint,
    Zigzag,
    Fixed32,
    Fixed64,
    Bytes,
    Packed(PackedKind),
    Message(&'s MessageSchema<'s>),
}

impl FieldKind<'_> {
    /// The wire encoding a conforming producer uses for this kind.
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldKind::Varint | FieldKind::Zigzag => WireType::Varint,
            FieldKind::Fixed32 => WireType::Fixed32,
            FieldKind::Fixed64 => WireType::Fixed64,
            FieldKind::Bytes | FieldKind::Packed(_) | FieldKind::Message(_) => {
                WireType::LengthDelimited
            }
        }
    }
}

/// One schema table entry: the codec for a field number and the fold that
/// threads its values into the aggregate.
#[derive(Clone, Copy)]
pub struct FieldRule<'s, M = Record> {
    pub number: u32,
    pub kind: FieldKind<'s>,
    pub fold: fn(&mut M, u32, FieldValue),
}

impl<'s> FieldRule<'s, Record> {
    /// A rule that collects into a [`Record`] in arrival order.
    pub fn collect(number: u32, kind: FieldKind<'s>) -> Self {
        Self { number, kind, fold: Record::push_field }
    }
}

impl<M> core::fmt::Debug for FieldRule<'_, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FieldRule")
            .field("number", &self.number)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Field table for one message format.
#[derive(Debug, Clone, Copy)]
pub struct MessageSchema<'s, M = Record> {
    fields: &'s [FieldRule<'s, M>],
    strictness: Strictness,
}

impl<'s, M> MessageSchema<'s, M> {
    pub fn new(fields: &'s [FieldRule<'s, M>]) -> Self {
        Self { fields, strictness: Strictness::Strict }
    }

    pub fn with_strictness(fields: &'s [FieldRule<'s, M>], strictness: Strictness) -> Self {
        Self { fields, strictness }
    }

    /// Look up the rule for a field number.
    pub fn field(&self, number: u32) -> Option<&FieldRule<'s, M>> {
        self.fields.iter().find(|rule| rule.number == number)
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }
}
