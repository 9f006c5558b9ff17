//! Composite codecs: messages, repeated runs, and keyed maps.
//!
//! These are the recursive layer over the scalar codecs: a message decoder
//! dispatches each tagged field to the codec its schema names, folds the
//! decoded value into the caller's aggregate, and loops until its window is
//! exhausted. Length-prefixed constructs narrow the cursor's limit to exactly
//! their declared size for their duration, so a malformed child can never
//! read past its frame into a sibling's bytes.
//!
//! Item decoders must consume at least one byte before completing; the
//! repeated codecs rely on that to make progress.

use core::mem;

use crate::cursor::{Cursor, CursorMut};
use crate::scalar::{
    Fixed32Decoder, Fixed32Encoder, Fixed64Decoder, Fixed64Encoder, VarintDecoder, VarintEncoder,
    ZigzagDecoder, zigzag_encode,
};
use crate::schema::{
    field_len, wire_bits, FieldKind, FieldValue, MessageSchema, PackedKind, Record, Strictness,
    WireType,
};
use crate::step::{suspend, Decode, DecodeError, Encode, Step};

/// Feed `dec` from a sub-window of at most `left` bytes, restoring the
/// cursor's limit and part flag afterwards.
///
/// When the chunk holds the whole remainder of the window, the inner cursor
/// reports done at the boundary - the hard anti-overrun edge. When it holds
/// less, the inner cursor reports a pause even if the outer stream has
/// ended; the caller distinguishes truncation by checking the outer state.
fn feed_within<D: Decode>(dec: D, cur: &mut Cursor<'_>, left: &mut u64) -> Step<D, D::Value> {
    let take = (*left).min(cur.remaining() as u64) as usize;
    let saved_limit = cur.limit();
    let saved_part = cur.is_part();
    cur.set_limit(cur.index() + take);
    cur.set_part((take as u64) < *left);
    let before = cur.index();
    let step = dec.feed(cur);
    *left -= (cur.index() - before) as u64;
    cur.set_limit(saved_limit);
    cur.set_part(saved_part);
    step
}

/// Feed through the optional window: narrowed when a length prefix was seen,
/// direct otherwise. Converts a pause that hides a true end of stream into
/// an incomplete failure.
fn feed_bounded<D: Decode>(
    dec: D,
    cur: &mut Cursor<'_>,
    left: &mut Option<u64>,
    expected: &'static str,
) -> Step<D, D::Value> {
    match left {
        Some(left) => {
            let step = feed_within(dec, cur, left);
            if step.is_pending() && cur.is_done() && *left > 0 {
                return Step::Failed(DecodeError::Incomplete { expected });
            }
            step
        }
        None => dec.feed(cur),
    }
}

/// Scalar decoder selected by packed kind, yielding a tagged field value.
#[derive(Debug, Clone)]
pub enum ScalarDecoder {
    Varint(VarintDecoder),
    Zigzag(ZigzagDecoder),
    Fixed32(Fixed32Decoder),
    Fixed64(Fixed64Decoder),
}

impl ScalarDecoder {
    pub fn new(kind: PackedKind) -> Self {
        match kind {
            PackedKind::Varint => ScalarDecoder::Varint(VarintDecoder::new()),
            PackedKind::Zigzag => ScalarDecoder::Zigzag(ZigzagDecoder::new()),
            PackedKind::Fixed32 => ScalarDecoder::Fixed32(Fixed32Decoder::new()),
            PackedKind::Fixed64 => ScalarDecoder::Fixed64(Fixed64Decoder::new()),
        }
    }
}

impl Decode for ScalarDecoder {
    type Value = FieldValue;

    fn feed(self, cur: &mut Cursor<'_>) -> Step<Self, FieldValue> {
        match self {
            ScalarDecoder::Varint(d) => d
                .feed(cur)
                .map(FieldValue::Varint)
                .map_pending(ScalarDecoder::Varint),
            ScalarDecoder::Zigzag(d) => d
                .feed(cur)
                .map(FieldValue::Zigzag)
                .map_pending(ScalarDecoder::Zigzag),
            ScalarDecoder::Fixed32(d) => d
                .feed(cur)
                .map(FieldValue::Fixed32)
                .map_pending(ScalarDecoder::Fixed32),
            ScalarDecoder::Fixed64(d) => d
                .feed(cur)
                .map(FieldValue::Fixed64)
                .map_pending(ScalarDecoder::Fixed64),
        }
    }
}

/// Length-prefixed byte run decoder.
#[derive(Debug, Clone)]
pub struct BytesDecoder {
    state: BytesState,
}

#[derive(Debug, Clone)]
enum BytesState {
    Prefix(VarintDecoder),
    Body { left: usize, buf: Vec<u8> },
}

impl BytesDecoder {
    pub fn new() -> Self {
        Self { state: BytesState::Prefix(VarintDecoder::new()) }
    }
}

impl Default for BytesDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decode for BytesDecoder {
    type Value = Vec<u8>;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, Vec<u8>> {
        loop {
            match mem::replace(&mut self.state, BytesState::Prefix(VarintDecoder::new())) {
                BytesState::Prefix(dec) => match dec.feed(cur) {
                    Step::Done(len) => {
                        self.state = BytesState::Body { left: len as usize, buf: Vec::new() };
                    }
                    Step::Pending(dec) => {
                        self.state = BytesState::Prefix(dec);
                        return Step::Pending(self);
                    }
                    Step::Failed(err) => return Step::Failed(err),
                },
                BytesState::Body { mut left, mut buf } => {
                    let window = cur.window();
                    let take = left.min(window.len());
                    buf.extend_from_slice(&window[..take]);
                    cur.set_index(cur.index() + take);
                    left -= take;
                    if left == 0 {
                        return Step::Done(buf);
                    }
                    self.state = BytesState::Body { left, buf };
                    return suspend(self, cur, "length-delimited bytes");
                }
            }
        }
    }
}

/// Discards one value of a given wire type. Used by skip-unknown decoding.
#[derive(Debug, Clone)]
pub(crate) enum SkipDecoder {
    Varint(VarintDecoder),
    Fixed { left: u8 },
    Prefix(VarintDecoder),
    Discard { left: u64 },
}

impl SkipDecoder {
    fn new(wire: WireType) -> Self {
        match wire {
            WireType::Varint => SkipDecoder::Varint(VarintDecoder::new()),
            WireType::Fixed32 => SkipDecoder::Fixed { left: 4 },
            WireType::Fixed64 => SkipDecoder::Fixed { left: 8 },
            WireType::LengthDelimited => SkipDecoder::Prefix(VarintDecoder::new()),
        }
    }
}

impl Decode for SkipDecoder {
    type Value = ();

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, ()> {
        loop {
            match self {
                SkipDecoder::Varint(dec) => {
                    return dec.feed(cur).map(|_| ()).map_pending(SkipDecoder::Varint)
                }
                SkipDecoder::Fixed { mut left } => {
                    let take = (left as usize).min(cur.remaining());
                    cur.set_index(cur.index() + take);
                    left -= take as u8;
                    if left == 0 {
                        return Step::Done(());
                    }
                    return suspend(SkipDecoder::Fixed { left }, cur, "fixed-width value");
                }
                SkipDecoder::Prefix(dec) => match dec.feed(cur) {
                    Step::Done(len) => self = SkipDecoder::Discard { left: len },
                    Step::Pending(dec) => return Step::Pending(SkipDecoder::Prefix(dec)),
                    Step::Failed(err) => return Step::Failed(err),
                },
                SkipDecoder::Discard { mut left } => {
                    let take = left.min(cur.remaining() as u64) as usize;
                    cur.set_index(cur.index() + take);
                    left -= take as u64;
                    if left == 0 {
                        return Step::Done(());
                    }
                    return suspend(SkipDecoder::Discard { left }, cur, "length-delimited value");
                }
            }
        }
    }
}

/// Packed run decoder: varint length prefix, then scalar elements until the
/// narrowed window is exhausted.
#[derive(Debug, Clone)]
pub struct PackedDecoder {
    kind: PackedKind,
    state: PackedState,
}

#[derive(Debug, Clone)]
enum PackedState {
    Prefix(VarintDecoder),
    Items { left: u64, active: ScalarDecoder, items: Vec<FieldValue> },
}

impl PackedDecoder {
    pub fn new(kind: PackedKind) -> Self {
        Self { kind, state: PackedState::Prefix(VarintDecoder::new()) }
    }
}

impl Decode for PackedDecoder {
    type Value = Vec<FieldValue>;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, Vec<FieldValue>> {
        loop {
            match mem::replace(&mut self.state, PackedState::Prefix(VarintDecoder::new())) {
                PackedState::Prefix(dec) => match dec.feed(cur) {
                    Step::Done(len) => {
                        self.state = PackedState::Items {
                            left: len,
                            active: ScalarDecoder::new(self.kind),
                            items: Vec::new(),
                        };
                    }
                    Step::Pending(dec) => {
                        self.state = PackedState::Prefix(dec);
                        return Step::Pending(self);
                    }
                    Step::Failed(err) => return Step::Failed(err),
                },
                PackedState::Items { mut left, active, mut items } => {
                    if left == 0 {
                        return Step::Done(items);
                    }
                    match feed_within(active, cur, &mut left) {
                        Step::Done(value) => {
                            items.push(value);
                            self.state = PackedState::Items {
                                left,
                                active: ScalarDecoder::new(self.kind),
                                items,
                            };
                        }
                        Step::Pending(active) => {
                            if cur.is_done() && left > 0 {
                                return Step::Failed(DecodeError::Incomplete {
                                    expected: "packed run",
                                });
                            }
                            self.state = PackedState::Items { left, active, items };
                            return Step::Pending(self);
                        }
                        Step::Failed(err) => return Step::Failed(err),
                    }
                }
            }
        }
    }
}

/// Repeated-value decoder: runs the item codec until the cursor is done,
/// folding each completed item into its builder.
pub struct ListDecoder<D: Decode + Clone> {
    proto: D,
    active: Option<D>,
    items: Vec<D::Value>,
}

impl<D: Decode + Clone> ListDecoder<D> {
    pub fn new(proto: D) -> Self {
        Self { proto, active: None, items: Vec::new() }
    }
}

impl<D: Decode + Clone> Decode for ListDecoder<D> {
    type Value = Vec<D::Value>;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, Vec<D::Value>> {
        loop {
            let active = match self.active.take() {
                Some(dec) => dec,
                None if cur.is_cont() => self.proto.clone(),
                None if cur.is_done() => return Step::Done(self.items),
                None => return suspend(self, cur, "list item"),
            };
            match active.feed(cur) {
                Step::Done(value) => self.items.push(value),
                Step::Pending(dec) => {
                    self.active = Some(dec);
                    return Step::Pending(self);
                }
                Step::Failed(err) => return Step::Failed(err),
            }
        }
    }
}

/// Keyed-map decoder: alternating key and value codecs, one entry per pair,
/// until the cursor is done.
pub struct MapDecoder<K: Decode + Clone, V: Decode + Clone> {
    key_proto: K,
    val_proto: V,
    state: MapState<K, V>,
    entries: Vec<(K::Value, V::Value)>,
}

enum MapState<K: Decode, V: Decode> {
    Boundary,
    Key(K),
    Value { key: K::Value, dec: V },
}

impl<K: Decode + Clone, V: Decode + Clone> MapDecoder<K, V> {
    pub fn new(key_proto: K, val_proto: V) -> Self {
        Self { key_proto, val_proto, state: MapState::Boundary, entries: Vec::new() }
    }
}

impl<K: Decode + Clone, V: Decode + Clone> Decode for MapDecoder<K, V> {
    type Value = Vec<(K::Value, V::Value)>;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, Self::Value> {
        loop {
            match mem::replace(&mut self.state, MapState::Boundary) {
                MapState::Boundary => {
                    if cur.is_cont() {
                        self.state = MapState::Key(self.key_proto.clone());
                    } else if cur.is_done() {
                        return Step::Done(self.entries);
                    } else {
                        return suspend(self, cur, "map key");
                    }
                }
                MapState::Key(dec) => match dec.feed(cur) {
                    Step::Done(key) => {
                        self.state = MapState::Value { key, dec: self.val_proto.clone() };
                    }
                    Step::Pending(dec) => {
                        self.state = MapState::Key(dec);
                        return Step::Pending(self);
                    }
                    Step::Failed(err) => return Step::Failed(err),
                },
                MapState::Value { key, dec } => match dec.feed(cur) {
                    Step::Done(value) => {
                        self.entries.push((key, value));
                        self.state = MapState::Boundary;
                    }
                    Step::Pending(dec) => {
                        self.state = MapState::Value { key, dec };
                        return Step::Pending(self);
                    }
                    Step::Failed(err) => return Step::Failed(err),
                },
            }
        }
    }
}

/// One decoded field value, any kind the schema can name.
#[derive(Debug, Clone)]
enum ValueDecoder<'s> {
    Scalar(ScalarDecoder),
    Bytes(BytesDecoder),
    Nested(Box<MessageDecoder<'s, Record>>),
}

impl<'s> Decode for ValueDecoder<'s> {
    type Value = FieldValue;

    fn feed(self, cur: &mut Cursor<'_>) -> Step<Self, FieldValue> {
        match self {
            ValueDecoder::Scalar(dec) => dec.feed(cur).map_pending(ValueDecoder::Scalar),
            ValueDecoder::Bytes(dec) => dec
                .feed(cur)
                .map(FieldValue::Bytes)
                .map_pending(ValueDecoder::Bytes),
            ValueDecoder::Nested(dec) => (*dec)
                .feed(cur)
                .map(FieldValue::Message)
                .map_pending(|dec| ValueDecoder::Nested(Box::new(dec))),
        }
    }
}

/// Schema-driven message decoder.
///
/// Framed messages read a varint length prefix and narrow the cursor to
/// exactly that many bytes for their duration; unframed messages run until
/// the outer cursor itself reports done. The aggregate is built lazily on
/// the first successful child decode and bound exactly once, at completion -
/// a message with no fields binds the empty default.
#[derive(Debug, Clone)]
pub struct MessageDecoder<'s, M = Record> {
    schema: &'s MessageSchema<'s, M>,
    left: Option<u64>,
    builder: Option<M>,
    state: MState<'s, M>,
}

#[derive(Clone)]
enum MState<'s, M> {
    Prefix(VarintDecoder),
    Tag(VarintDecoder),
    Value { number: u32, fold: fn(&mut M, u32, FieldValue), dec: ValueDecoder<'s> },
    Packed { number: u32, fold: fn(&mut M, u32, FieldValue), dec: PackedDecoder },
    Skip(SkipDecoder),
}

impl<M> core::fmt::Debug for MState<'_, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MState::Prefix(dec) => f.debug_tuple("Prefix").field(dec).finish(),
            MState::Tag(dec) => f.debug_tuple("Tag").field(dec).finish(),
            MState::Value { number, dec, .. } => f
                .debug_struct("Value")
                .field("number", number)
                .field("dec", dec)
                .finish(),
            MState::Packed { number, dec, .. } => f
                .debug_struct("Packed")
                .field("number", number)
                .field("dec", dec)
                .finish(),
            MState::Skip(dec) => f.debug_tuple("Skip").field(dec).finish(),
        }
    }
}

impl<'s, M> MessageDecoder<'s, M> {
    /// Decode without a length prefix, until the outer cursor is done.
    pub fn new(schema: &'s MessageSchema<'s, M>) -> Self {
        Self { schema, left: None, builder: None, state: MState::Tag(VarintDecoder::new()) }
    }

    /// Decode a varint length prefix, then exactly that many bytes.
    pub fn framed(schema: &'s MessageSchema<'s, M>) -> Self {
        Self { schema, left: None, builder: None, state: MState::Prefix(VarintDecoder::new()) }
    }
}

impl<'s, M: Default> Decode for MessageDecoder<'s, M> {
    type Value = M;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, M> {
        loop {
            match mem::replace(&mut self.state, MState::Tag(VarintDecoder::new())) {
                MState::Prefix(dec) => match dec.feed(cur) {
                    Step::Done(len) => {
                        self.left = Some(len);
                    }
                    Step::Pending(dec) => {
                        self.state = MState::Prefix(dec);
                        return Step::Pending(self);
                    }
                    Step::Failed(err) => return Step::Failed(err),
                },
                MState::Tag(dec) => {
                    if dec.is_fresh() {
                        // Field boundary: the message may legitimately end here.
                        if self.left == Some(0)
                            || (self.left.is_none() && cur.is_done())
                        {
                            return Step::Done(self.builder.take().unwrap_or_default());
                        }
                    }
                    match feed_bounded(dec, cur, &mut self.left, "message field") {
                        Step::Done(tag) => {
                            let at = cur.index().saturating_sub(1);
                            let number = (tag >> 3) as u32;
                            let Some(wire) = WireType::from_tag(tag) else {
                                return Step::Failed(DecodeError::Malformed {
                                    expected: "assigned wire type",
                                    at,
                                });
                            };
                            if number == 0 {
                                return Step::Failed(DecodeError::Malformed {
                                    expected: "nonzero field number",
                                    at,
                                });
                            }
                            match self.schema.field(number) {
                                Some(rule) => {
                                    if wire != rule.kind.wire_type() {
                                        return Step::Failed(DecodeError::Malformed {
                                            expected: "wire type matching the schema",
                                            at,
                                        });
                                    }
                                    self.state = match rule.kind {
                                        FieldKind::Packed(kind) => MState::Packed {
                                            number,
                                            fold: rule.fold,
                                            dec: PackedDecoder::new(kind),
                                        },
                                        FieldKind::Varint => MState::Value {
                                            number,
                                            fold: rule.fold,
                                            dec: ValueDecoder::Scalar(ScalarDecoder::Varint(
                                                VarintDecoder::new(),
                                            )),
                                        },
                                        FieldKind::Zigzag => MState::Value {
                                            number,
                                            fold: rule.fold,
                                            dec: ValueDecoder::Scalar(ScalarDecoder::Zigzag(
                                                ZigzagDecoder::new(),
                                            )),
                                        },
                                        FieldKind::Fixed32 => MState::Value {
                                            number,
                                            fold: rule.fold,
                                            dec: ValueDecoder::Scalar(ScalarDecoder::Fixed32(
                                                Fixed32Decoder::new(),
                                            )),
                                        },
                                        FieldKind::Fixed64 => MState::Value {
                                            number,
                                            fold: rule.fold,
                                            dec: ValueDecoder::Scalar(ScalarDecoder::Fixed64(
                                                Fixed64Decoder::new(),
                                            )),
                                        },
                                        FieldKind::Bytes => MState::Value {
                                            number,
                                            fold: rule.fold,
                                            dec: ValueDecoder::Bytes(BytesDecoder::new()),
                                        },
                                        FieldKind::Message(nested) => MState::Value {
                                            number,
                                            fold: rule.fold,
                                            dec: ValueDecoder::Nested(Box::new(
                                                MessageDecoder::framed(nested),
                                            )),
                                        },
                                    };
                                }
                                None => match self.schema.strictness() {
                                    Strictness::Strict => {
                                        return Step::Failed(DecodeError::Malformed {
                                            expected: "field number known to the schema",
                                            at,
                                        });
                                    }
                                    Strictness::SkipUnknown => {
                                        self.state = MState::Skip(SkipDecoder::new(wire));
                                    }
                                },
                            }
                        }
                        Step::Pending(dec) => {
                            self.state = MState::Tag(dec);
                            return Step::Pending(self);
                        }
                        Step::Failed(err) => return Step::Failed(err),
                    }
                }
                MState::Value { number, fold, dec } => {
                    match feed_bounded(dec, cur, &mut self.left, "field value") {
                        Step::Done(value) => {
                            fold(self.builder.get_or_insert_with(M::default), number, value);
                        }
                        Step::Pending(dec) => {
                            self.state = MState::Value { number, fold, dec };
                            return Step::Pending(self);
                        }
                        Step::Failed(err) => return Step::Failed(err),
                    }
                }
                MState::Packed { number, fold, dec } => {
                    match feed_bounded(dec, cur, &mut self.left, "packed run") {
                        Step::Done(items) => {
                            let builder = self.builder.get_or_insert_with(M::default);
                            for item in items {
                                fold(builder, number, item);
                            }
                        }
                        Step::Pending(dec) => {
                            self.state = MState::Packed { number, fold, dec };
                            return Step::Pending(self);
                        }
                        Step::Failed(err) => return Step::Failed(err),
                    }
                }
                MState::Skip(dec) => {
                    match feed_bounded(dec, cur, &mut self.left, "skipped field") {
                        Step::Done(()) => {}
                        Step::Pending(dec) => {
                            self.state = MState::Skip(dec);
                            return Step::Pending(self);
                        }
                        Step::Failed(err) => return Step::Failed(err),
                    }
                }
            }
        }
    }
}

/// Schema-driven message encoder over an ordered field list.
///
/// Lengths are computed up front, so framed output is deterministic and a
/// nested message's prefix never needs back-patching. The not-yet-written
/// remainder of the field list is the continuing state.
#[derive(Debug, Clone)]
pub struct MessageEncoder {
    framed: bool,
    fields: Vec<(u32, FieldValue)>,
    idx: usize,
    stage: EncodeStage,
}

#[derive(Debug, Clone)]
enum EncodeStage {
    Start,
    Prefix(VarintEncoder),
    Tag,
    TagBytes(VarintEncoder),
    Value(ValueEncoder),
}

#[derive(Debug, Clone)]
enum ValueEncoder {
    Varint(VarintEncoder),
    Fixed32(Fixed32Encoder),
    Fixed64(Fixed64Encoder),
    BytesLen(VarintEncoder, Vec<u8>),
    BytesBody { buf: Vec<u8>, at: usize },
    Nested(Box<MessageEncoder>),
    PackedLen(VarintEncoder, Vec<FieldValue>),
    PackedBody { items: Vec<FieldValue>, idx: usize, active: ScalarEncoder },
}

#[derive(Debug, Clone)]
enum ScalarEncoder {
    Varint(VarintEncoder),
    Fixed32(Fixed32Encoder),
    Fixed64(Fixed64Encoder),
}

impl ScalarEncoder {
    fn for_item(item: &FieldValue) -> Result<ScalarEncoder, DecodeError> {
        match item {
            FieldValue::Varint(v) => Ok(ScalarEncoder::Varint(VarintEncoder::new(*v))),
            FieldValue::Zigzag(v) => {
                Ok(ScalarEncoder::Varint(VarintEncoder::new(zigzag_encode(*v))))
            }
            FieldValue::Fixed32(bits) => Ok(ScalarEncoder::Fixed32(Fixed32Encoder::new(*bits))),
            FieldValue::Fixed64(bits) => Ok(ScalarEncoder::Fixed64(Fixed64Encoder::new(*bits))),
            _ => Err(DecodeError::Malformed { expected: "packed scalar element", at: 0 }),
        }
    }

    fn pull(self, out: &mut CursorMut<'_>) -> Step<Self, ()> {
        match self {
            ScalarEncoder::Varint(enc) => enc.pull(out).map_pending(ScalarEncoder::Varint),
            ScalarEncoder::Fixed32(enc) => enc.pull(out).map_pending(ScalarEncoder::Fixed32),
            ScalarEncoder::Fixed64(enc) => enc.pull(out).map_pending(ScalarEncoder::Fixed64),
        }
    }
}

impl ValueEncoder {
    fn for_value(value: FieldValue) -> Result<ValueEncoder, DecodeError> {
        Ok(match value {
            FieldValue::Varint(v) => ValueEncoder::Varint(VarintEncoder::new(v)),
            FieldValue::Zigzag(v) => ValueEncoder::Varint(VarintEncoder::new(zigzag_encode(v))),
            FieldValue::Fixed32(bits) => ValueEncoder::Fixed32(Fixed32Encoder::new(bits)),
            FieldValue::Fixed64(bits) => ValueEncoder::Fixed64(Fixed64Encoder::new(bits)),
            FieldValue::Bytes(buf) => {
                ValueEncoder::BytesLen(VarintEncoder::new(buf.len() as u64), buf)
            }
            FieldValue::Message(rec) => {
                ValueEncoder::Nested(Box::new(MessageEncoder::framed(rec.fields)))
            }
            FieldValue::Packed(items) => {
                let payload: usize = items.iter().map(FieldValue::payload_len).sum();
                ValueEncoder::PackedLen(VarintEncoder::new(payload as u64), items)
            }
        })
    }

    fn pull(mut self, out: &mut CursorMut<'_>) -> Step<Self, ()> {
        loop {
            self = match self {
                ValueEncoder::Varint(enc) => {
                    return enc.pull(out).map_pending(ValueEncoder::Varint)
                }
                ValueEncoder::Fixed32(enc) => {
                    return enc.pull(out).map_pending(ValueEncoder::Fixed32)
                }
                ValueEncoder::Fixed64(enc) => {
                    return enc.pull(out).map_pending(ValueEncoder::Fixed64)
                }
                ValueEncoder::BytesLen(enc, buf) => match enc.pull(out) {
                    Step::Done(()) => ValueEncoder::BytesBody { buf, at: 0 },
                    Step::Pending(enc) => return Step::Pending(ValueEncoder::BytesLen(enc, buf)),
                    Step::Failed(err) => return Step::Failed(err),
                },
                ValueEncoder::BytesBody { buf, mut at } => {
                    at += out.push_slice(&buf[at..]);
                    if at == buf.len() {
                        return Step::Done(());
                    }
                    return Step::Pending(ValueEncoder::BytesBody { buf, at });
                }
                ValueEncoder::Nested(enc) => {
                    return (*enc)
                        .pull(out)
                        .map_pending(|enc| ValueEncoder::Nested(Box::new(enc)))
                }
                ValueEncoder::PackedLen(enc, items) => match enc.pull(out) {
                    Step::Done(()) => {
                        if items.is_empty() {
                            return Step::Done(());
                        }
                        let active = match ScalarEncoder::for_item(&items[0]) {
                            Ok(active) => active,
                            Err(err) => return Step::Failed(err),
                        };
                        ValueEncoder::PackedBody { items, idx: 0, active }
                    }
                    Step::Pending(enc) => {
                        return Step::Pending(ValueEncoder::PackedLen(enc, items))
                    }
                    Step::Failed(err) => return Step::Failed(err),
                },
                ValueEncoder::PackedBody { items, mut idx, active } => match active.pull(out) {
                    Step::Done(()) => {
                        idx += 1;
                        if idx == items.len() {
                            return Step::Done(());
                        }
                        let active = match ScalarEncoder::for_item(&items[idx]) {
                            Ok(active) => active,
                            Err(err) => return Step::Failed(err),
                        };
                        ValueEncoder::PackedBody { items, idx, active }
                    }
                    Step::Pending(active) => {
                        return Step::Pending(ValueEncoder::PackedBody { items, idx, active })
                    }
                    Step::Failed(err) => return Step::Failed(err),
                },
            };
        }
    }
}

impl MessageEncoder {
    /// Encode fields with no outer length prefix.
    pub fn new(fields: Vec<(u32, FieldValue)>) -> Self {
        Self { framed: false, fields, idx: 0, stage: EncodeStage::Start }
    }

    /// Encode a varint length prefix followed by the fields.
    pub fn framed(fields: Vec<(u32, FieldValue)>) -> Self {
        Self { framed: true, fields, idx: 0, stage: EncodeStage::Start }
    }

    /// Total encoded length, including the prefix when framed.
    pub fn encoded_len(&self) -> usize {
        let body: usize = self
            .fields
            .iter()
            .map(|(number, value)| field_len(*number, value))
            .sum();
        if self.framed {
            crate::scalar::varint_len(body as u64) + body
        } else {
            body
        }
    }
}

impl Encode for MessageEncoder {
    fn pull(mut self, out: &mut CursorMut<'_>) -> Step<Self, ()> {
        loop {
            match mem::replace(&mut self.stage, EncodeStage::Tag) {
                EncodeStage::Start => {
                    if self.framed {
                        let body: usize = self
                            .fields
                            .iter()
                            .map(|(number, value)| field_len(*number, value))
                            .sum();
                        self.stage = EncodeStage::Prefix(VarintEncoder::new(body as u64));
                    }
                }
                EncodeStage::Prefix(enc) => match enc.pull(out) {
                    Step::Done(()) => {}
                    Step::Pending(enc) => {
                        self.stage = EncodeStage::Prefix(enc);
                        return Step::Pending(self);
                    }
                    Step::Failed(err) => return Step::Failed(err),
                },
                EncodeStage::Tag => {
                    if self.idx == self.fields.len() {
                        return Step::Done(());
                    }
                    let (number, value) = &self.fields[self.idx];
                    let tag = ((*number as u64) << 3) | wire_bits(value.wire_type());
                    self.stage = EncodeStage::TagBytes(VarintEncoder::new(tag));
                }
                EncodeStage::TagBytes(enc) => match enc.pull(out) {
                    Step::Done(()) => {
                        let value =
                            mem::replace(&mut self.fields[self.idx].1, FieldValue::Varint(0));
                        match ValueEncoder::for_value(value) {
                            Ok(enc) => self.stage = EncodeStage::Value(enc),
                            Err(err) => return Step::Failed(err),
                        }
                    }
                    Step::Pending(enc) => {
                        self.stage = EncodeStage::TagBytes(enc);
                        return Step::Pending(self);
                    }
                    Step::Failed(err) => return Step::Failed(err),
                },
                EncodeStage::Value(enc) => match enc.pull(out) {
                    Step::Done(()) => {
                        self.idx += 1;
                    }
                    Step::Pending(enc) => {
                        self.stage = EncodeStage::Value(enc);
                        return Step::Pending(self);
                    }
                    Step::Failed(err) => return Step::Failed(err),
                },
            }
        }
    }
}
