//! Scalar codecs: variable-length and fixed-width integers.
//!
//! Every decoder here is a small accumulator (value + shift) that survives
//! suspension between any two bytes, so a varint split across three socket
//! reads decodes identically to one arriving whole. Encoders mirror that:
//! the unwritten remainder of a value is itself the continuing state.

use crate::cursor::{Cursor, CursorMut};
use crate::step::{suspend, Decode, DecodeError, Encode, Step};

/// Base-128 varint decoder: 7-bit groups, least-significant first, top bit
/// signalling continuation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarintDecoder {
    acc: u64,
    shift: u32,
}

impl VarintDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// No bytes consumed yet. Composite codecs use this to tell a field
    /// boundary from a suspension mid-tag.
    #[inline]
    pub(crate) fn is_fresh(&self) -> bool {
        self.shift == 0
    }
}

impl Decode for VarintDecoder {
    type Value = u64;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, u64> {
        while cur.is_cont() {
            let byte = cur.head();
            cur.step();
            if self.shift >= 64 {
                return Step::Failed(DecodeError::Overflow { at: cur.index() - 1 });
            }
            self.acc |= ((byte & 0x7f) as u64) << self.shift;
            if byte & 0x80 == 0 {
                return Step::Done(self.acc);
            }
            self.shift += 7;
        }
        suspend(self, cur, "varint")
    }
}

/// Zigzag-coded signed integer decoder: varint accumulation, then the
/// even/odd remap that keeps small negatives short.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZigzagDecoder {
    inner: VarintDecoder,
}

impl ZigzagDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decode for ZigzagDecoder {
    type Value = i64;

    fn feed(self, cur: &mut Cursor<'_>) -> Step<Self, i64> {
        self.inner
            .feed(cur)
            .map(zigzag_decode)
            .map_pending(|inner| Self { inner })
    }
}

/// Little-endian fixed-width 32-bit decoder: one byte per step at shifts
/// 0, 8, 16, 24.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fixed32Decoder {
    acc: u32,
    shift: u32,
}

impl Fixed32Decoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decode for Fixed32Decoder {
    type Value = u32;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, u32> {
        while cur.is_cont() {
            self.acc |= (cur.head() as u32) << self.shift;
            cur.step();
            self.shift += 8;
            if self.shift == 32 {
                return Step::Done(self.acc);
            }
        }
        suspend(self, cur, "fixed32")
    }
}

/// Little-endian fixed-width 64-bit decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fixed64Decoder {
    acc: u64,
    shift: u32,
}

impl Fixed64Decoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decode for Fixed64Decoder {
    type Value = u64;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, u64> {
        while cur.is_cont() {
            self.acc |= (cur.head() as u64) << self.shift;
            cur.step();
            self.shift += 8;
            if self.shift == 64 {
                return Step::Done(self.acc);
            }
        }
        suspend(self, cur, "fixed64")
    }
}

/// Varint encoder; the not-yet-written groups are the continuing state.
#[derive(Debug, Clone)]
pub struct VarintEncoder {
    value: u64,
}

impl VarintEncoder {
    pub fn new(value: u64) -> Self {
        Self { value }
    }
}

impl Encode for VarintEncoder {
    fn pull(mut self, out: &mut CursorMut<'_>) -> Step<Self, ()> {
        while out.is_cont() {
            if self.value >= 0x80 {
                out.push((self.value as u8 & 0x7f) | 0x80);
                self.value >>= 7;
            } else {
                out.push(self.value as u8);
                return Step::Done(());
            }
        }
        Step::Pending(self)
    }
}

/// Zigzag encoder over the varint encoder.
#[derive(Debug, Clone)]
pub struct ZigzagEncoder {
    inner: VarintEncoder,
}

impl ZigzagEncoder {
    pub fn new(value: i64) -> Self {
        Self { inner: VarintEncoder::new(zigzag_encode(value)) }
    }
}

impl Encode for ZigzagEncoder {
    fn pull(self, out: &mut CursorMut<'_>) -> Step<Self, ()> {
        self.inner.pull(out).map_pending(|inner| Self { inner })
    }
}

/// Little-endian fixed-width 32-bit encoder.
#[derive(Debug, Clone)]
pub struct Fixed32Encoder {
    bits: u32,
    shift: u32,
}

impl Fixed32Encoder {
    pub fn new(bits: u32) -> Self {
        Self { bits, shift: 0 }
    }
}

impl Encode for Fixed32Encoder {
    fn pull(mut self, out: &mut CursorMut<'_>) -> Step<Self, ()> {
        while out.is_cont() {
            out.push((self.bits >> self.shift) as u8);
            self.shift += 8;
            if self.shift == 32 {
                return Step::Done(());
            }
        }
        Step::Pending(self)
    }
}

/// Little-endian fixed-width 64-bit encoder.
#[derive(Debug, Clone)]
pub struct Fixed64Encoder {
    bits: u64,
    shift: u32,
}

impl Fixed64Encoder {
    pub fn new(bits: u64) -> Self {
        Self { bits, shift: 0 }
    }
}

impl Encode for Fixed64Encoder {
    fn pull(mut self, out: &mut CursorMut<'_>) -> Step<Self, ()> {
        while out.is_cont() {
            out.push((self.bits >> self.shift) as u8);
            self.shift += 8;
            if self.shift == 64 {
                return Step::Done(());
            }
        }
        Step::Pending(self)
    }
}

/// Map an unsigned zigzag code back to its signed value.
///
/// Even codes halve to non-negative values, odd codes to negatives; a
/// bijection over the full 64-bit signed range.
#[inline]
pub fn zigzag_decode(code: u64) -> i64 {
    ((code >> 1) as i64) ^ -((code & 1) as i64)
}

/// Map a signed value to its unsigned zigzag code.
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Encoded length of a varint, in bytes. Deterministic for every value.
pub fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Encoded length of a zigzag-coded signed value.
pub fn zigzag_len(value: i64) -> usize {
    varint_len(zigzag_encode(value))
}
