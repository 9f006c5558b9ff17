//! Resumable UTF-8 decoding for character-oriented grammars.
//!
//! A multi-byte character split across two chunks is the textual analogue of
//! a varint split mid-group: the lead byte's bits and the count of expected
//! continuation bytes are the continuing state. Overlong encodings,
//! surrogate code points, and out-of-range values are rejected at the byte
//! where they become undeniable.

use crate::cursor::Cursor;
use crate::step::{suspend, Decode, DecodeError, Step};

/// Incremental decoder for one UTF-8 character.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Utf8Decoder {
    acc: u32,
    need: u8,
    min: u32,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decode for Utf8Decoder {
    type Value = char;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, char> {
        while cur.is_cont() {
            let byte = cur.head();
            if self.need == 0 {
                cur.step();
                match byte {
                    0x00..=0x7f => return Step::Done(byte as char),
                    0xc2..=0xdf => {
                        self.acc = (byte & 0x1f) as u32;
                        self.need = 1;
                        self.min = 0x80;
                    }
                    0xe0..=0xef => {
                        self.acc = (byte & 0x0f) as u32;
                        self.need = 2;
                        self.min = 0x800;
                    }
                    0xf0..=0xf4 => {
                        self.acc = (byte & 0x07) as u32;
                        self.need = 3;
                        self.min = 0x1_0000;
                    }
                    _ => {
                        return Step::Failed(DecodeError::Malformed {
                            expected: "utf-8 lead byte",
                            at: cur.index() - 1,
                        });
                    }
                }
            } else {
                if byte & 0xc0 != 0x80 {
                    return Step::Failed(DecodeError::Malformed {
                        expected: "utf-8 continuation byte",
                        at: cur.index(),
                    });
                }
                cur.step();
                self.acc = (self.acc << 6) | (byte & 0x3f) as u32;
                self.need -= 1;
                if self.need == 0 {
                    let code = self.acc;
                    if code < self.min || (0xd800..=0xdfff).contains(&code) || code > 0x10_ffff {
                        return Step::Failed(DecodeError::Malformed {
                            expected: "utf-8 scalar value",
                            at: cur.index() - 1,
                        });
                    }
                    // In range and not a surrogate, so the conversion holds.
                    match char::from_u32(code) {
                        Some(ch) => return Step::Done(ch),
                        None => {
                            return Step::Failed(DecodeError::Malformed {
                                expected: "utf-8 scalar value",
                                at: cur.index() - 1,
                            });
                        }
                    }
                }
            }
        }
        suspend(self, cur, "utf-8 sequence")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::decode;

    #[test]
    fn ascii_single_step() {
        assert_eq!(decode(Utf8Decoder::new(), b"a"), Ok('a'));
    }

    #[test]
    fn multibyte_whole() {
        assert_eq!(decode(Utf8Decoder::new(), "é".as_bytes()), Ok('é'));
        assert_eq!(decode(Utf8Decoder::new(), "語".as_bytes()), Ok('語'));
        assert_eq!(decode(Utf8Decoder::new(), "🦀".as_bytes()), Ok('🦀'));
    }

    #[test]
    fn multibyte_split_across_chunks() {
        let bytes = "🦀".as_bytes();
        let mut first = Cursor::fragment(&bytes[..2]);
        let dec = match Utf8Decoder::new().feed(&mut first) {
            Step::Pending(dec) => dec,
            other => panic!("expected suspension, got {other:?}"),
        };
        let mut rest = Cursor::terminal(&bytes[2..]);
        assert_eq!(dec.feed(&mut rest), Step::Done('🦀'));
    }

    #[test]
    fn rejects_overlong_and_surrogates() {
        // Overlong encoding of '/'
        assert!(decode(Utf8Decoder::new(), &[0xc0, 0xaf]).is_err());
        // A UTF-16 surrogate half
        assert!(decode(Utf8Decoder::new(), &[0xed, 0xa0, 0x80]).is_err());
        // Stray continuation byte
        assert!(decode(Utf8Decoder::new(), &[0x80]).is_err());
    }

    #[test]
    fn truncated_sequence_is_incomplete() {
        assert_eq!(
            decode(Utf8Decoder::new(), &"é".as_bytes()[..1]),
            Err(DecodeError::Incomplete { expected: "utf-8 sequence" })
        );
    }
}
