//! Document grammar scenarios: shapes, literals, escapes, and rejections.

mod common;

use common::decode_split;
use pretty_assertions::assert_eq;
use spool_core::{decode, DecodeError, DocumentParser, Value};

fn obj(entries: Vec<(&str, Value)>) -> Value {
    Value::Object(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

// =============================================================================
// Shapes
// =============================================================================

#[test]
fn empty_object() {
    assert_eq!(decode(DocumentParser::new(), b"{}"), Ok(Value::Object(vec![])));
}

#[test]
fn empty_array() {
    assert_eq!(decode(DocumentParser::new(), b"[]"), Ok(Value::Array(vec![])));
}

#[test]
fn whitespace_everywhere() {
    let doc = b"  \n\t{ a :\r\n 1 , b : [ ] }  \n";
    assert_eq!(
        decode(DocumentParser::new(), doc),
        Ok(obj(vec![("a", Value::Int(1)), ("b", Value::Array(vec![]))]))
    );
}

#[test]
fn nested_containers() {
    let doc = b"{outer: {inner: [1, [2, {deep: null}]]}}";
    assert_eq!(
        decode(DocumentParser::new(), doc),
        Ok(obj(vec![(
            "outer",
            obj(vec![(
                "inner",
                Value::Array(vec![
                    Value::Int(1),
                    Value::Array(vec![Value::Int(2), obj(vec![("deep", Value::Null)])]),
                ])
            )])
        )]))
    );
}

#[test]
fn entries_keep_arrival_order() {
    let doc = b"{z: 1, a: 2, z2: 3}";
    let Value::Object(entries) = decode(DocumentParser::new(), doc).unwrap() else {
        panic!("expected object");
    };
    let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["z", "a", "z2"]);
}

// =============================================================================
// Literals
// =============================================================================

#[test]
fn keywords_and_bare_words() {
    let doc = b"[true, false, null, plain_word]";
    assert_eq!(
        decode(DocumentParser::new(), doc),
        Ok(Value::Array(vec![
            Value::Bool(true),
            Value::Bool(false),
            Value::Null,
            Value::Str("plain_word".to_string()),
        ]))
    );
}

#[test]
fn numbers_integer_and_float() {
    let doc = b"[0, -42, 3.14, 1e3, -2.5e-2]";
    assert_eq!(
        decode(DocumentParser::new(), doc),
        Ok(Value::Array(vec![
            Value::Int(0),
            Value::Int(-42),
            Value::Float(3.14),
            Value::Float(1000.0),
            Value::Float(-0.025),
        ]))
    );
}

#[test]
fn quoted_keys_and_values() {
    let doc = br#"{"spaced key": "value", plain: "mixed"}"#;
    assert_eq!(
        decode(DocumentParser::new(), doc),
        Ok(obj(vec![
            ("spaced key", Value::Str("value".to_string())),
            ("plain", Value::Str("mixed".to_string())),
        ]))
    );
}

#[test]
fn unicode_identifiers() {
    let doc = "{héllo: wörld}".as_bytes();
    assert_eq!(
        decode(DocumentParser::new(), doc),
        Ok(obj(vec![("héllo", Value::Str("wörld".to_string()))]))
    );
}

// =============================================================================
// String escapes
// =============================================================================

#[test]
fn simple_escapes() {
    let doc = br#"{s: "a\n\t\"\\\/b"}"#;
    assert_eq!(
        decode(DocumentParser::new(), doc),
        Ok(obj(vec![("s", Value::Str("a\n\t\"\\/b".to_string()))]))
    );
}

#[test]
fn unicode_escape() {
    let doc = br#"{s: "A\u00E9"}"#;
    assert_eq!(
        decode(DocumentParser::new(), doc),
        Ok(obj(vec![("s", Value::Str("Aé".to_string()))]))
    );
}

#[test]
fn surrogate_pair_escape() {
    let doc = br#"{s: "\uD83E\uDD80"}"#;
    assert_eq!(
        decode(DocumentParser::new(), doc),
        Ok(obj(vec![("s", Value::Str("🦀".to_string()))]))
    );
}

#[test]
fn lone_surrogate_is_malformed() {
    let doc = br#"{s: "\uDD80"}"#;
    assert!(matches!(
        decode(DocumentParser::new(), doc),
        Err(DecodeError::Malformed { expected: "leading surrogate", .. })
    ));
}

#[test]
fn raw_multibyte_in_strings() {
    let doc = "{s: \"snow: ☃\"}".as_bytes();
    assert_eq!(
        decode(DocumentParser::new(), doc),
        Ok(obj(vec![("s", Value::Str("snow: ☃".to_string()))]))
    );
}

// =============================================================================
// Rejections
// =============================================================================

#[test]
fn trailing_characters_fail() {
    assert_eq!(
        decode(DocumentParser::new(), b"{}{}"),
        Err(DecodeError::Malformed { expected: "end of document", at: 2 })
    );
}

#[test]
fn trailing_whitespace_is_fine() {
    assert_eq!(decode(DocumentParser::new(), b"{} \n\t "), Ok(Value::Object(vec![])));
}

#[test]
fn root_must_be_a_container() {
    assert!(matches!(
        decode(DocumentParser::new(), b"42"),
        Err(DecodeError::Malformed { expected: "'{' or '['", .. })
    ));
}

#[test]
fn missing_colon_fails() {
    assert!(matches!(
        decode(DocumentParser::new(), b"{a 1}"),
        Err(DecodeError::Malformed { expected: "':'", .. })
    ));
}

#[test]
fn trailing_comma_fails() {
    assert!(matches!(
        decode(DocumentParser::new(), b"[1,]"),
        Err(DecodeError::Malformed { expected: "value", .. })
    ));
    assert!(matches!(
        decode(DocumentParser::new(), b"{a: 1,}"),
        Err(DecodeError::Malformed { expected: "object key", .. })
    ));
}

#[test]
fn unescaped_control_character_fails() {
    assert!(matches!(
        decode(DocumentParser::new(), b"{s: \"a\x01b\"}"),
        Err(DecodeError::Malformed { expected: "string character", .. })
    ));
}

#[test]
fn unknown_escape_fails() {
    assert!(matches!(
        decode(DocumentParser::new(), br#"{s: "\q"}"#),
        Err(DecodeError::Malformed { expected: "escape character", .. })
    ));
}

#[test]
fn bad_number_fails() {
    assert!(matches!(
        decode(DocumentParser::new(), b"[1e]"),
        Err(DecodeError::Malformed { expected: "number literal", .. })
    ));
}

// =============================================================================
// Truncation vs suspension
// =============================================================================

#[test]
fn truncated_document_is_incomplete() {
    assert!(matches!(
        decode(DocumentParser::new(), b"{a: 1"),
        Err(DecodeError::Incomplete { .. })
    ));
    assert!(matches!(
        decode(DocumentParser::new(), b"{a: \"unclosed"),
        Err(DecodeError::Incomplete { expected: "string" })
    ));
    assert!(matches!(
        decode(DocumentParser::new(), b""),
        Err(DecodeError::Incomplete { .. })
    ));
}

#[test]
fn split_inside_every_construct_still_parses() {
    let doc = br#"{key: [1, true, "sA"], other: -3.5}"#;
    let whole = decode(DocumentParser::new(), doc).unwrap();
    for at in 0..=doc.len() {
        assert_eq!(decode_split(DocumentParser::new(), doc, at), Ok(whole.clone()));
    }
}
