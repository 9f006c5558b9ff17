//! Character-oriented document grammar: objects and arrays.
//!
//! An explicit state machine rather than recursive descent, so the parser
//! can suspend between any two steps - mid-identifier, mid-escape, even
//! between the two halves of a surrogate pair - and resume exactly there on
//! the next chunk. Nesting lives in an explicit frame stack; the in-flight
//! token accumulates in an owned buffer because input chunks are transient.
//!
//! The grammar is delimiter-shaped: a document is one object or array;
//! values are nested containers, quoted strings with escapes, numbers,
//! keywords, or bare identifier words; object keys are quoted strings or
//! bare identifiers. After the root closes, only trailing whitespace is
//! tolerated.

use core::mem;

use phf::phf_map;
use unicode_xid::UnicodeXID;

use crate::cursor::Cursor;
use crate::step::{suspend, Decode, DecodeError, Step};
use crate::text::Utf8Decoder;

/// Owned document value built by the grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

#[derive(Debug, Clone, Copy)]
enum Keyword {
    True,
    False,
    Null,
}

impl Keyword {
    fn value(self) -> Value {
        match self {
            Keyword::True => Value::Bool(true),
            Keyword::False => Value::Bool(false),
            Keyword::Null => Value::Null,
        }
    }
}

/// Literal words with fixed meanings. A constant table; bare words not
/// listed here read as strings.
static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "true" => Keyword::True,
    "false" => Keyword::False,
    "null" => Keyword::Null,
};

#[derive(Debug, Clone)]
enum Frame {
    Array(Vec<Value>),
    Object { entries: Vec<(String, Value)>, key: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TokenCtx {
    Key,
    Value,
}

#[derive(Debug, Clone, Copy)]
enum MbCtx {
    Str(TokenCtx),
    IdentStart(TokenCtx),
    IdentCont(TokenCtx),
}

#[derive(Debug, Clone)]
enum PState {
    /// Whitespace before the opening delimiter.
    Leading,
    /// Object context: expecting a key, or the closer when nothing has been
    /// parsed since the opening brace.
    KeyStart { first: bool },
    /// Between a key and its ':'.
    AfterKey,
    /// Expecting a value; ']' is also legal directly after '[' or ','-free.
    ValueStart { allow_close: bool },
    /// Bare word accumulating in the buffer.
    Ident { ctx: TokenCtx },
    /// Inside a quoted string.
    Str { ctx: TokenCtx },
    /// Just consumed a backslash.
    StrEscape { ctx: TokenCtx },
    /// Hex digits of a \u escape; `pending` holds a waiting high surrogate.
    StrUnicode { ctx: TokenCtx, pending: Option<u16>, digits: u8, acc: u16 },
    /// Between a high surrogate escape and the '\u' of its partner.
    StrSurrogate { ctx: TokenCtx, high: u16, expect_u: bool },
    /// Numeric literal accumulating in the buffer.
    Number,
    /// A value just closed; expecting ',' or the frame's closer.
    AfterValue,
    /// Mid-character in a multi-byte UTF-8 sequence.
    Mb { dec: Utf8Decoder, ctx: MbCtx },
    /// Root closed; only whitespace may remain.
    Trailing(Value),
}

/// Resumable parser for one document.
#[derive(Debug, Clone)]
pub struct DocumentParser {
    state: PState,
    stack: Vec<Frame>,
    buf: String,
}

impl DocumentParser {
    pub fn new() -> Self {
        Self { state: PState::Leading, stack: Vec::new(), buf: String::new() }
    }

    fn fold_value(&mut self, value: Value) {
        let frame = self
            .stack
            .last_mut()
            .expect("value completed outside any frame");
        match frame {
            Frame::Array(items) => items.push(value),
            Frame::Object { entries, key } => {
                let key = key.take().expect("object value folded without a key");
                entries.push((key, value));
            }
        }
        self.state = PState::AfterValue;
    }

    fn close_frame(&mut self) {
        let value = match self.stack.pop().expect("closer without an open frame") {
            Frame::Array(items) => Value::Array(items),
            Frame::Object { entries, .. } => Value::Object(entries),
        };
        if self.stack.is_empty() {
            self.state = PState::Trailing(value);
        } else {
            self.fold_value(value);
        }
    }

    fn bind_key(&mut self, key: String) {
        match self.stack.last_mut() {
            Some(Frame::Object { key: slot, .. }) => *slot = Some(key),
            _ => unreachable!("key parsed outside an object frame"),
        }
        self.state = PState::AfterKey;
    }

    fn finish_ident(&mut self, ctx: TokenCtx) {
        let word = mem::take(&mut self.buf);
        match ctx {
            TokenCtx::Key => self.bind_key(word),
            TokenCtx::Value => {
                let value = match KEYWORDS.get(word.as_str()) {
                    Some(keyword) => keyword.value(),
                    None => Value::Str(word),
                };
                self.fold_value(value);
            }
        }
    }

    fn finish_string(&mut self, ctx: TokenCtx) {
        let text = mem::take(&mut self.buf);
        match ctx {
            TokenCtx::Key => self.bind_key(text),
            TokenCtx::Value => self.fold_value(Value::Str(text)),
        }
    }

    fn finish_number(&mut self, at: usize) -> Result<(), DecodeError> {
        let literal = mem::take(&mut self.buf);
        let value = if literal.contains(['.', 'e', 'E']) {
            literal
                .parse::<f64>()
                .ok()
                .map(Value::Float)
        } else {
            literal.parse::<i64>().ok().map(Value::Int)
        };
        match value {
            Some(value) => {
                self.fold_value(value);
                Ok(())
            }
            None => Err(DecodeError::Malformed { expected: "number literal", at }),
        }
    }
}

impl Default for DocumentParser {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn skip_ws(cur: &mut Cursor<'_>) {
    let window = cur.window();
    let skip = window
        .iter()
        .position(|&b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
        .unwrap_or(window.len());
    cur.set_index(cur.index() + skip);
}

fn is_ident_start_byte(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn hex_digit(b: u8) -> Option<u16> {
    match b {
        b'0'..=b'9' => Some((b - b'0') as u16),
        b'a'..=b'f' => Some((b - b'a' + 10) as u16),
        b'A'..=b'F' => Some((b - b'A' + 10) as u16),
        _ => None,
    }
}

impl Decode for DocumentParser {
    type Value = Value;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, Value> {
        loop {
            match mem::replace(&mut self.state, PState::Leading) {
                PState::Leading => {
                    skip_ws(cur);
                    if !cur.is_cont() {
                        self.state = PState::Leading;
                        return suspend(self, cur, "'{' or '['");
                    }
                    match cur.head() {
                        b'{' => {
                            cur.step();
                            self.stack.push(Frame::Object { entries: Vec::new(), key: None });
                            self.state = PState::KeyStart { first: true };
                        }
                        b'[' => {
                            cur.step();
                            self.stack.push(Frame::Array(Vec::new()));
                            self.state = PState::ValueStart { allow_close: true };
                        }
                        _ => {
                            return Step::Failed(DecodeError::Malformed {
                                expected: "'{' or '['",
                                at: cur.index(),
                            });
                        }
                    }
                }
                PState::KeyStart { first } => {
                    skip_ws(cur);
                    if !cur.is_cont() {
                        self.state = PState::KeyStart { first };
                        return suspend(self, cur, "object key");
                    }
                    let b = cur.head();
                    match b {
                        b'}' if first => {
                            cur.step();
                            self.close_frame();
                        }
                        b'"' => {
                            cur.step();
                            self.buf.clear();
                            self.state = PState::Str { ctx: TokenCtx::Key };
                        }
                        _ if is_ident_start_byte(b) => {
                            cur.step();
                            self.buf.clear();
                            self.buf.push(b as char);
                            self.state = PState::Ident { ctx: TokenCtx::Key };
                        }
                        _ if b >= 0x80 => {
                            self.buf.clear();
                            self.state = PState::Mb {
                                dec: Utf8Decoder::new(),
                                ctx: MbCtx::IdentStart(TokenCtx::Key),
                            };
                        }
                        _ => {
                            return Step::Failed(DecodeError::Malformed {
                                expected: "object key",
                                at: cur.index(),
                            });
                        }
                    }
                }
                PState::AfterKey => {
                    skip_ws(cur);
                    if !cur.is_cont() {
                        self.state = PState::AfterKey;
                        return suspend(self, cur, "':'");
                    }
                    if cur.head() == b':' {
                        cur.step();
                        self.state = PState::ValueStart { allow_close: false };
                    } else {
                        return Step::Failed(DecodeError::Malformed {
                            expected: "':'",
                            at: cur.index(),
                        });
                    }
                }
                PState::ValueStart { allow_close } => {
                    skip_ws(cur);
                    if !cur.is_cont() {
                        self.state = PState::ValueStart { allow_close };
                        return suspend(self, cur, "value");
                    }
                    let b = cur.head();
                    match b {
                        b'{' => {
                            cur.step();
                            self.stack.push(Frame::Object { entries: Vec::new(), key: None });
                            self.state = PState::KeyStart { first: true };
                        }
                        b'[' => {
                            cur.step();
                            self.stack.push(Frame::Array(Vec::new()));
                            self.state = PState::ValueStart { allow_close: true };
                        }
                        b']' if allow_close => {
                            cur.step();
                            self.close_frame();
                        }
                        b'"' => {
                            cur.step();
                            self.buf.clear();
                            self.state = PState::Str { ctx: TokenCtx::Value };
                        }
                        b'-' | b'0'..=b'9' => {
                            cur.step();
                            self.buf.clear();
                            self.buf.push(b as char);
                            self.state = PState::Number;
                        }
                        _ if is_ident_start_byte(b) => {
                            cur.step();
                            self.buf.clear();
                            self.buf.push(b as char);
                            self.state = PState::Ident { ctx: TokenCtx::Value };
                        }
                        _ if b >= 0x80 => {
                            self.buf.clear();
                            self.state = PState::Mb {
                                dec: Utf8Decoder::new(),
                                ctx: MbCtx::IdentStart(TokenCtx::Value),
                            };
                        }
                        _ => {
                            return Step::Failed(DecodeError::Malformed {
                                expected: "value",
                                at: cur.index(),
                            });
                        }
                    }
                }
                PState::Ident { ctx } => {
                    let mut next = None;
                    while cur.is_cont() {
                        let b = cur.head();
                        if is_ident_continue_byte(b) {
                            cur.step();
                            self.buf.push(b as char);
                        } else if b >= 0x80 {
                            next = Some(PState::Mb {
                                dec: Utf8Decoder::new(),
                                ctx: MbCtx::IdentCont(ctx),
                            });
                            break;
                        } else {
                            break;
                        }
                    }
                    if let Some(state) = next {
                        self.state = state;
                    } else if cur.is_cont() || cur.is_done() {
                        // Terminated by a delimiter byte or by true end of
                        // stream; either way the word is complete.
                        self.finish_ident(ctx);
                    } else {
                        self.state = PState::Ident { ctx };
                        return suspend(self, cur, "identifier");
                    }
                }
                PState::Str { ctx } => {
                    let window = cur.window();
                    let stop = window
                        .iter()
                        .position(|&b| b == b'"' || b == b'\\' || b < 0x20 || b >= 0x80)
                        .unwrap_or(window.len());
                    self.buf.extend(window[..stop].iter().map(|&b| b as char));
                    cur.set_index(cur.index() + stop);
                    if !cur.is_cont() {
                        self.state = PState::Str { ctx };
                        return suspend(self, cur, "string");
                    }
                    let b = cur.head();
                    match b {
                        b'"' => {
                            cur.step();
                            self.finish_string(ctx);
                        }
                        b'\\' => {
                            cur.step();
                            self.state = PState::StrEscape { ctx };
                        }
                        _ if b >= 0x80 => {
                            self.state = PState::Mb {
                                dec: Utf8Decoder::new(),
                                ctx: MbCtx::Str(ctx),
                            };
                        }
                        _ => {
                            // Control bytes must travel escaped.
                            return Step::Failed(DecodeError::Malformed {
                                expected: "string character",
                                at: cur.index(),
                            });
                        }
                    }
                }
                PState::StrEscape { ctx } => {
                    if !cur.is_cont() {
                        self.state = PState::StrEscape { ctx };
                        return suspend(self, cur, "escape character");
                    }
                    let b = cur.head();
                    cur.step();
                    let ch = match b {
                        b'"' => Some('"'),
                        b'\\' => Some('\\'),
                        b'/' => Some('/'),
                        b'b' => Some('\u{8}'),
                        b'f' => Some('\u{c}'),
                        b'n' => Some('\n'),
                        b'r' => Some('\r'),
                        b't' => Some('\t'),
                        b'u' => None,
                        _ => {
                            return Step::Failed(DecodeError::Malformed {
                                expected: "escape character",
                                at: cur.index() - 1,
                            });
                        }
                    };
                    match ch {
                        Some(ch) => {
                            self.buf.push(ch);
                            self.state = PState::Str { ctx };
                        }
                        None => {
                            self.state =
                                PState::StrUnicode { ctx, pending: None, digits: 0, acc: 0 };
                        }
                    }
                }
                PState::StrUnicode { ctx, pending, mut digits, mut acc } => {
                    while digits < 4 {
                        if !cur.is_cont() {
                            self.state = PState::StrUnicode { ctx, pending, digits, acc };
                            return suspend(self, cur, "unicode escape");
                        }
                        let b = cur.head();
                        let Some(value) = hex_digit(b) else {
                            return Step::Failed(DecodeError::Malformed {
                                expected: "hex digit",
                                at: cur.index(),
                            });
                        };
                        cur.step();
                        acc = (acc << 4) | value;
                        digits += 1;
                    }
                    match pending {
                        None if (0xd800..=0xdbff).contains(&acc) => {
                            self.state = PState::StrSurrogate { ctx, high: acc, expect_u: false };
                        }
                        None if (0xdc00..=0xdfff).contains(&acc) => {
                            return Step::Failed(DecodeError::Malformed {
                                expected: "leading surrogate",
                                at: cur.index().saturating_sub(1),
                            });
                        }
                        None => {
                            match char::from_u32(acc as u32) {
                                Some(ch) => self.buf.push(ch),
                                None => {
                                    return Step::Failed(DecodeError::Malformed {
                                        expected: "unicode scalar value",
                                        at: cur.index().saturating_sub(1),
                                    });
                                }
                            }
                            self.state = PState::Str { ctx };
                        }
                        Some(high) => {
                            if !(0xdc00..=0xdfff).contains(&acc) {
                                return Step::Failed(DecodeError::Malformed {
                                    expected: "trailing surrogate",
                                    at: cur.index().saturating_sub(1),
                                });
                            }
                            let code = 0x1_0000
                                + (((high as u32 - 0xd800) << 10) | (acc as u32 - 0xdc00));
                            match char::from_u32(code) {
                                Some(ch) => self.buf.push(ch),
                                None => {
                                    return Step::Failed(DecodeError::Malformed {
                                        expected: "unicode scalar value",
                                        at: cur.index().saturating_sub(1),
                                    });
                                }
                            }
                            self.state = PState::Str { ctx };
                        }
                    }
                }
                PState::StrSurrogate { ctx, high, expect_u } => {
                    if !cur.is_cont() {
                        self.state = PState::StrSurrogate { ctx, high, expect_u };
                        return suspend(self, cur, "surrogate pair");
                    }
                    let b = cur.head();
                    cur.step();
                    if !expect_u && b == b'\\' {
                        self.state = PState::StrSurrogate { ctx, high, expect_u: true };
                    } else if expect_u && b == b'u' {
                        self.state =
                            PState::StrUnicode { ctx, pending: Some(high), digits: 0, acc: 0 };
                    } else {
                        return Step::Failed(DecodeError::Malformed {
                            expected: "trailing surrogate escape",
                            at: cur.index() - 1,
                        });
                    }
                }
                PState::Number => {
                    while cur.is_cont() {
                        let b = cur.head();
                        if matches!(b, b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-') {
                            cur.step();
                            self.buf.push(b as char);
                        } else {
                            break;
                        }
                    }
                    if cur.is_cont() || cur.is_done() {
                        if let Err(err) = self.finish_number(cur.index()) {
                            return Step::Failed(err);
                        }
                    } else {
                        self.state = PState::Number;
                        return suspend(self, cur, "number");
                    }
                }
                PState::AfterValue => {
                    skip_ws(cur);
                    if !cur.is_cont() {
                        self.state = PState::AfterValue;
                        return suspend(self, cur, "',' or closing delimiter");
                    }
                    let b = cur.head();
                    let in_array = matches!(self.stack.last(), Some(Frame::Array(_)));
                    match b {
                        b',' => {
                            cur.step();
                            self.state = if in_array {
                                PState::ValueStart { allow_close: false }
                            } else {
                                PState::KeyStart { first: false }
                            };
                        }
                        b']' if in_array => {
                            cur.step();
                            self.close_frame();
                        }
                        b'}' if !in_array => {
                            cur.step();
                            self.close_frame();
                        }
                        _ => {
                            return Step::Failed(DecodeError::Malformed {
                                expected: if in_array { "',' or ']'" } else { "',' or '}'" },
                                at: cur.index(),
                            });
                        }
                    }
                }
                PState::Mb { dec, ctx } => match dec.feed(cur) {
                    Step::Done(ch) => match ctx {
                        MbCtx::Str(sctx) => {
                            self.buf.push(ch);
                            self.state = PState::Str { ctx: sctx };
                        }
                        MbCtx::IdentStart(tctx) => {
                            if ch.is_xid_start() {
                                self.buf.push(ch);
                                self.state = PState::Ident { ctx: tctx };
                            } else {
                                return Step::Failed(DecodeError::Malformed {
                                    expected: "identifier",
                                    at: cur.index().saturating_sub(1),
                                });
                            }
                        }
                        MbCtx::IdentCont(tctx) => {
                            if ch.is_xid_continue() {
                                self.buf.push(ch);
                                self.state = PState::Ident { ctx: tctx };
                            } else {
                                return Step::Failed(DecodeError::Malformed {
                                    expected: "identifier character",
                                    at: cur.index().saturating_sub(1),
                                });
                            }
                        }
                    },
                    Step::Pending(dec) => {
                        self.state = PState::Mb { dec, ctx };
                        return Step::Pending(self);
                    }
                    Step::Failed(err) => return Step::Failed(err),
                },
                PState::Trailing(value) => {
                    skip_ws(cur);
                    if cur.is_cont() {
                        return Step::Failed(DecodeError::Malformed {
                            expected: "end of document",
                            at: cur.index(),
                        });
                    }
                    if cur.is_done() {
                        return Step::Done(value);
                    }
                    self.state = PState::Trailing(value);
                    return suspend(self, cur, "end of document");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::decode;

    #[test]
    fn keyword_table() {
        assert_eq!(KEYWORDS.get("true").copied().map(Keyword::value), Some(Value::Bool(true)));
        assert_eq!(KEYWORDS.get("null").copied().map(Keyword::value), Some(Value::Null));
        assert!(KEYWORDS.get("nil").is_none());
    }

    #[test]
    fn empty_object_and_array() {
        assert_eq!(decode(DocumentParser::new(), b"{}"), Ok(Value::Object(vec![])));
        assert_eq!(decode(DocumentParser::new(), b"[]"), Ok(Value::Array(vec![])));
    }

    #[test]
    fn bare_words_and_keywords() {
        let doc = decode(DocumentParser::new(), b"{flag: true, name: spool}").unwrap();
        assert_eq!(
            doc,
            Value::Object(vec![
                ("flag".to_string(), Value::Bool(true)),
                ("name".to_string(), Value::Str("spool".to_string())),
            ])
        );
    }
}
