//! Binary codec scenarios: schema-driven messages, packed runs, repeated
//! and keyed-map decoding, round trips, and failure taxonomy.

mod common;

use common::decode_split;
use pretty_assertions::assert_eq;
use spool_core::{
    decode, encode_to_vec, Cursor, CursorMut, Decode, DecodeError, DocumentParser, Encode,
    FieldKind, FieldRule, FieldValue, ListDecoder, MapDecoder, MessageDecoder, MessageEncoder,
    MessageSchema, PackedDecoder, PackedKind, Record, Step, Strictness, VarintDecoder,
    ZigzagDecoder,
};

// =============================================================================
// Message decoding
// =============================================================================

#[test]
fn message_with_varint_field() {
    let rules = [FieldRule::collect(1, FieldKind::Varint)];
    let schema = MessageSchema::new(&rules);
    let rec: Record = decode(MessageDecoder::new(&schema), &[0x08, 0x96, 0x01]).unwrap();
    assert_eq!(rec.fields, vec![(1, FieldValue::Varint(150))]);
}

#[test]
fn message_reencodes_to_the_same_bytes() {
    let enc = MessageEncoder::new(vec![(1, FieldValue::Varint(150))]);
    assert_eq!(enc.encoded_len(), 3);
    assert_eq!(encode_to_vec(enc).unwrap(), vec![0x08, 0x96, 0x01]);
}

#[test]
fn empty_message_binds_the_empty_default() {
    let rules = [FieldRule::collect(1, FieldKind::Varint)];
    let schema = MessageSchema::new(&rules);
    let rec: Record = decode(MessageDecoder::new(&schema), &[]).unwrap();
    assert!(rec.is_empty());
}

#[test]
fn fixed32_field_reads_as_ieee_single() {
    let rules = [FieldRule::collect(1, FieldKind::Fixed32)];
    let schema = MessageSchema::new(&rules);
    let rec: Record =
        decode(MessageDecoder::new(&schema), &[0x0d, 0x00, 0x00, 0x80, 0x3f]).unwrap();
    assert_eq!(rec.get(1).and_then(FieldValue::as_f32), Some(1.0));
}

#[test]
fn message_folds_into_a_custom_aggregate() {
    #[derive(Debug, Default, PartialEq)]
    struct Point {
        x: u64,
        y: i64,
    }
    fn fold_x(p: &mut Point, _number: u32, value: FieldValue) {
        if let Some(x) = value.as_u64() {
            p.x = x;
        }
    }
    fn fold_y(p: &mut Point, _number: u32, value: FieldValue) {
        if let Some(y) = value.as_i64() {
            p.y = y;
        }
    }
    let rules = [
        FieldRule { number: 1, kind: FieldKind::Varint, fold: fold_x },
        FieldRule { number: 2, kind: FieldKind::Zigzag, fold: fold_y },
    ];
    let schema = MessageSchema::new(&rules);
    // x = 150, y = -2
    let point: Point = decode(MessageDecoder::new(&schema), &[0x08, 0x96, 0x01, 0x10, 0x03]).unwrap();
    assert_eq!(point, Point { x: 150, y: -2 });
}

#[test]
fn nested_message_decodes_into_a_record() {
    let inner_rules = [FieldRule::collect(1, FieldKind::Varint)];
    let inner = MessageSchema::new(&inner_rules);
    let outer_rules = [FieldRule::collect(2, FieldKind::Message(&inner))];
    let outer = MessageSchema::new(&outer_rules);
    let rec: Record =
        decode(MessageDecoder::new(&outer), &[0x12, 0x03, 0x08, 0x96, 0x01]).unwrap();
    let nested = rec.get(2).and_then(FieldValue::as_record).unwrap();
    assert_eq!(nested.fields, vec![(1, FieldValue::Varint(150))]);
}

// =============================================================================
// Unknown fields: strict by default, skippable by choice
// =============================================================================

#[test]
fn unknown_field_is_fatal_when_strict() {
    let rules = [FieldRule::collect(1, FieldKind::Varint)];
    let schema = MessageSchema::new(&rules);
    let result: Result<Record, _> =
        decode(MessageDecoder::new(&schema), &[0x08, 0x96, 0x01, 0x10, 0x01]);
    assert_eq!(
        result,
        Err(DecodeError::Malformed { expected: "field number known to the schema", at: 3 })
    );
}

#[test]
fn unknown_fields_skip_by_wire_type_when_lenient() {
    let rules = [FieldRule::collect(1, FieldKind::Varint)];
    let schema = MessageSchema::with_strictness(&rules, Strictness::SkipUnknown);
    // unknown varint (2), unknown length-delimited (3), unknown fixed32 (4)
    let bytes = [
        0x08, 0x96, 0x01, // field 1 = 150
        0x10, 0xac, 0x02, // field 2, skipped varint
        0x1a, 0x02, 0xab, 0xcd, // field 3, skipped bytes
        0x25, 0x01, 0x02, 0x03, 0x04, // field 4, skipped fixed32
    ];
    let rec: Record = decode(MessageDecoder::new(&schema), &bytes).unwrap();
    assert_eq!(rec.fields, vec![(1, FieldValue::Varint(150))]);
}

#[test]
fn wire_type_contradicting_the_schema_is_malformed() {
    let rules = [FieldRule::collect(1, FieldKind::Varint)];
    let schema = MessageSchema::new(&rules);
    // field 1 arrives length-delimited although the schema says varint
    let result: Result<Record, _> = decode(MessageDecoder::new(&schema), &[0x0a, 0x01, 0x00]);
    assert_eq!(
        result,
        Err(DecodeError::Malformed { expected: "wire type matching the schema", at: 0 })
    );
}

// =============================================================================
// Framing: the narrowed window is a hard boundary
// =============================================================================

#[test]
fn framed_message_stops_exactly_at_its_length() {
    let rules = [FieldRule::collect(1, FieldKind::Varint)];
    let schema = MessageSchema::new(&rules);
    // prefix 3, message bytes, then a trailing byte that belongs to a sibling
    let bytes = [0x03, 0x08, 0x96, 0x01, 0x42];
    let mut cur = Cursor::terminal(&bytes);
    let step = MessageDecoder::framed(&schema).feed(&mut cur);
    match step {
        Step::Done(rec) => {
            let rec: Record = rec;
            assert_eq!(rec.fields, vec![(1, FieldValue::Varint(150))]);
        }
        other => panic!("expected completion, got {other:?}"),
    }
    // the sibling byte is untouched
    assert_eq!(cur.index(), 4);
    assert_eq!(cur.head(), 0x42);
}

#[test]
fn framed_message_cut_by_its_own_length_is_incomplete() {
    let rules = [FieldRule::collect(1, FieldKind::Varint)];
    let schema = MessageSchema::new(&rules);
    // declared length 2 cuts the varint value mid-group
    let result: Result<Record, _> =
        decode(MessageDecoder::framed(&schema), &[0x02, 0x08, 0x96, 0x01]);
    assert_eq!(result, Err(DecodeError::Incomplete { expected: "varint" }));
}

#[test]
fn framed_message_truncated_by_the_stream_is_incomplete() {
    let rules = [FieldRule::collect(1, FieldKind::Varint)];
    let schema = MessageSchema::new(&rules);
    // declared length 4, stream ends after 3 message bytes
    let result: Result<Record, _> =
        decode(MessageDecoder::framed(&schema), &[0x04, 0x08, 0x96, 0x01]);
    assert_eq!(result, Err(DecodeError::Incomplete { expected: "message field" }));
}

// =============================================================================
// Packed, repeated, and keyed-map runs
// =============================================================================

#[test]
fn packed_zigzag_run() {
    // length 3, payload 06 96 01 -> zigzag 3 and 75
    let items = decode(PackedDecoder::new(PackedKind::Zigzag), &[0x03, 0x06, 0x96, 0x01]).unwrap();
    assert_eq!(items, vec![FieldValue::Zigzag(3), FieldValue::Zigzag(75)]);
}

#[test]
fn packed_field_folds_each_element() {
    let rules = [FieldRule::collect(1, FieldKind::Packed(PackedKind::Zigzag))];
    let schema = MessageSchema::new(&rules);
    let rec: Record =
        decode(MessageDecoder::new(&schema), &[0x0a, 0x03, 0x06, 0x96, 0x01]).unwrap();
    assert_eq!(
        rec.fields,
        vec![(1, FieldValue::Zigzag(3)), (1, FieldValue::Zigzag(75))]
    );
}

#[test]
fn empty_packed_run_folds_nothing() {
    let rules = [FieldRule::collect(1, FieldKind::Packed(PackedKind::Varint))];
    let schema = MessageSchema::new(&rules);
    let rec: Record = decode(MessageDecoder::new(&schema), &[0x0a, 0x00]).unwrap();
    assert!(rec.is_empty());
}

#[test]
fn list_of_varints_runs_to_end_of_stream() {
    let items = decode(ListDecoder::new(VarintDecoder::new()), &[0x96, 0x01, 0x02, 0x7f]).unwrap();
    assert_eq!(items, vec![150, 2, 127]);
}

#[test]
fn list_item_cut_by_end_of_stream_is_incomplete() {
    let result = decode(ListDecoder::new(VarintDecoder::new()), &[0x02, 0x96]);
    assert_eq!(result, Err(DecodeError::Incomplete { expected: "varint" }));
}

#[test]
fn map_alternates_keys_and_values() {
    let dec = MapDecoder::new(VarintDecoder::new(), ZigzagDecoder::new());
    let entries = decode(dec, &[0x01, 0x02, 0x02, 0x03]).unwrap();
    assert_eq!(entries, vec![(1, 1), (2, -2)]);
}

#[test]
fn map_missing_its_value_is_incomplete() {
    let dec = MapDecoder::new(VarintDecoder::new(), ZigzagDecoder::new());
    assert_eq!(
        decode(dec, &[0x01]),
        Err(DecodeError::Incomplete { expected: "varint" })
    );
}

// =============================================================================
// Encoding
// =============================================================================

#[test]
fn message_round_trip_with_every_field_kind() {
    let mut nested = Record::new();
    Record::push_field(&mut nested, 1, FieldValue::Varint(7));

    let fields = vec![
        (1, FieldValue::Varint(150)),
        (2, FieldValue::Bytes(b"hi".to_vec())),
        (3, FieldValue::Message(nested.clone())),
        (4, FieldValue::Packed(vec![FieldValue::Zigzag(3), FieldValue::Zigzag(75)])),
        (5, FieldValue::Fixed32(0x3f80_0000)),
        (6, FieldValue::Fixed64(0x0102_0304_0506_0708)),
    ];
    let enc = MessageEncoder::new(fields);
    let expected_len = enc.encoded_len();
    let bytes = encode_to_vec(enc).unwrap();
    assert_eq!(bytes.len(), expected_len);

    let inner_rules = [FieldRule::collect(1, FieldKind::Varint)];
    let inner = MessageSchema::new(&inner_rules);
    let rules = [
        FieldRule::collect(1, FieldKind::Varint),
        FieldRule::collect(2, FieldKind::Bytes),
        FieldRule::collect(3, FieldKind::Message(&inner)),
        FieldRule::collect(4, FieldKind::Packed(PackedKind::Zigzag)),
        FieldRule::collect(5, FieldKind::Fixed32),
        FieldRule::collect(6, FieldKind::Fixed64),
    ];
    let schema = MessageSchema::new(&rules);
    let rec: Record = decode(MessageDecoder::new(&schema), &bytes).unwrap();
    assert_eq!(
        rec.fields,
        vec![
            (1, FieldValue::Varint(150)),
            (2, FieldValue::Bytes(b"hi".to_vec())),
            (3, FieldValue::Message(nested)),
            (4, FieldValue::Zigzag(3)),
            (4, FieldValue::Zigzag(75)),
            (5, FieldValue::Fixed32(0x3f80_0000)),
            (6, FieldValue::Fixed64(0x0102_0304_0506_0708)),
        ]
    );
}

#[test]
fn encoder_output_is_window_size_invariant() {
    let fields = vec![
        (1, FieldValue::Varint(300)),
        (2, FieldValue::Bytes(b"chunked".to_vec())),
        (4, FieldValue::Packed(vec![FieldValue::Varint(1), FieldValue::Varint(200)])),
    ];
    let whole = encode_to_vec(MessageEncoder::new(fields.clone())).unwrap();

    // Pull through a one-byte window: every suspension point is exercised.
    let mut enc = MessageEncoder::new(fields);
    let mut trickled = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        let mut out = CursorMut::new(&mut byte);
        match enc.pull(&mut out) {
            Step::Pending(next) => {
                trickled.extend_from_slice(out.written());
                enc = next;
            }
            Step::Done(()) => {
                trickled.extend_from_slice(out.written());
                break;
            }
            Step::Failed(err) => panic!("encode failed: {err}"),
        }
    }
    assert_eq!(trickled, whole);
}

#[test]
fn framed_encoder_emits_its_own_prefix() {
    let enc = MessageEncoder::framed(vec![(1, FieldValue::Varint(150))]);
    assert_eq!(encode_to_vec(enc).unwrap(), vec![0x03, 0x08, 0x96, 0x01]);
}

// =============================================================================
// Fault propagation
// =============================================================================

#[test]
fn trapped_fault_propagates_verbatim() {
    let mut cur = Cursor::fault("mmap region revoked");
    let step = VarintDecoder::new().feed(&mut cur);
    assert_eq!(
        step,
        Step::Failed(DecodeError::Trapped("mmap region revoked".to_string()))
    );

    let mut cur = Cursor::fault("mmap region revoked");
    let step = DocumentParser::new().feed(&mut cur);
    assert!(matches!(step, Step::Failed(DecodeError::Trapped(_))));
}

#[test]
fn resumed_decode_survives_a_split_tag() {
    let rules = [FieldRule::collect(1, FieldKind::Varint)];
    let schema = MessageSchema::new(&rules);
    // split inside the value varint
    let rec: Record = decode_split(MessageDecoder::new(&schema), &[0x08, 0x96, 0x01], 2).unwrap();
    assert_eq!(rec.fields, vec![(1, FieldValue::Varint(150))]);
}
