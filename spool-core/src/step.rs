//! The continuation primitive shared by every codec in the engine.
//!
//! A decode or encode in flight is an ordinary value in one of three states:
//! still continuing, complete, or failed. Feeding it a cursor consumes the
//! value and returns its successor, so a terminal state can never transition
//! again and two feeds can never race on the same continuation - ownership
//! makes the single-writer discipline structural rather than advisory.
//!
//! The contract for [`Decode::feed`] is maximal forward progress: consume
//! everything the cursor offers, then either suspend (cursor paused), finish
//! (value recognized), or fail (structural violation, truncation, or a
//! trapped storage fault). [`Encode::pull`] is the mirror image, bounded by
//! the output window's capacity instead of input availability.

use crate::cursor::{Cursor, CursorMut};
use core::fmt;

/// Error codes for a failed decode.
///
/// Small, comparable, and cheap to clone; offsets are relative to the cursor
/// that was being fed when the failure was detected. Composite codecs forward
/// the first child failure unchanged - there is no partial recovery and no
/// skip-and-continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// More elements were needed but the stream legitimately ended.
    Incomplete { expected: &'static str },
    /// The input cannot satisfy the expected structure.
    Malformed { expected: &'static str, at: usize },
    /// A bounded accumulator exceeded capacity.
    Overflow { at: usize },
    /// The underlying storage faulted; the message is propagated verbatim.
    Trapped(String),
    /// Format detection ended with more than one surviving interpretation.
    Ambiguous,
}

impl DecodeError {
    /// Short human-readable label for this error code.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Incomplete { .. } => "incomplete",
            Self::Malformed { .. } => "malformed",
            Self::Overflow { .. } => "overflow",
            Self::Trapped(_) => "trapped fault",
            Self::Ambiguous => "ambiguous input",
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete { expected } => {
                write!(f, "incomplete input: expected {expected}")
            }
            Self::Malformed { expected, at } => {
                write!(f, "malformed input at offset {at}: expected {expected}")
            }
            Self::Overflow { at } => write!(f, "accumulator overflow at offset {at}"),
            Self::Trapped(message) => write!(f, "trapped input fault: {message}"),
            Self::Ambiguous => write!(f, "ambiguous input: multiple surviving interpretations"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// One round of progress: still continuing, complete, or failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<C, T> {
    /// More input (or output capacity) is needed; holds the resumable state.
    Pending(C),
    /// The computation finished with a value.
    Done(T),
    /// The computation failed; terminal.
    Failed(DecodeError),
}

impl<C, T> Step<C, T> {
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Step::Pending(_))
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Step::Failed(_))
    }

    /// Map the completion value, threading the other states through.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<C, U> {
        match self {
            Step::Pending(c) => Step::Pending(c),
            Step::Done(v) => Step::Done(f(v)),
            Step::Failed(e) => Step::Failed(e),
        }
    }

    /// Map the continuing state, threading the other states through.
    pub fn map_pending<D>(self, f: impl FnOnce(C) -> D) -> Step<D, T> {
        match self {
            Step::Pending(c) => Step::Pending(f(c)),
            Step::Done(v) => Step::Done(v),
            Step::Failed(e) => Step::Failed(e),
        }
    }
}

/// A resumable decode toward `Value`.
pub trait Decode: Sized {
    type Value;

    /// Make maximal forward progress against one input window.
    fn feed(self, cur: &mut Cursor<'_>) -> Step<Self, Self::Value>;
}

/// A resumable encode, bounded by output capacity.
pub trait Encode: Sized {
    /// Write as much as the window accepts; suspend holding the remainder.
    fn pull(self, out: &mut CursorMut<'_>) -> Step<Self, ()>;
}

/// Suspend or fail, depending on why the cursor stopped offering bytes.
///
/// Every decoder ends its feed loop here: a paused cursor suspends, a done
/// cursor means truncation (`Incomplete`), and a faulted cursor propagates
/// the trapped fault verbatim.
pub(crate) fn suspend<C, T>(state: C, cur: &Cursor<'_>, expected: &'static str) -> Step<C, T> {
    if let Some(message) = cur.trapped() {
        Step::Failed(DecodeError::Trapped(message.to_string()))
    } else if cur.is_done() {
        Step::Failed(DecodeError::Incomplete { expected })
    } else {
        Step::Pending(state)
    }
}

/// Run a decoder over a single terminal window.
pub fn decode<D: Decode>(dec: D, bytes: &[u8]) -> Result<D::Value, DecodeError> {
    let mut cur = Cursor::terminal(bytes);
    match dec.feed(&mut cur) {
        Step::Done(value) => Ok(value),
        Step::Failed(err) => Err(err),
        // A decoder honoring the feed contract turns a done cursor into
        // Incomplete rather than suspending on it.
        Step::Pending(_) => Err(DecodeError::Incomplete { expected: "terminal input" }),
    }
}

/// Run an encoder to completion, growing the output as needed.
pub fn encode_to_vec<E: Encode>(mut enc: E) -> Result<Vec<u8>, DecodeError> {
    let mut bytes = Vec::new();
    let mut window = [0u8; 64];
    loop {
        let mut out = CursorMut::new(&mut window);
        match enc.pull(&mut out) {
            Step::Pending(next) => {
                bytes.extend_from_slice(out.written());
                enc = next;
            }
            Step::Done(()) => {
                bytes.extend_from_slice(out.written());
                return Ok(bytes);
            }
            Step::Failed(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_carries_position() {
        let err = DecodeError::Malformed { expected: "'}'", at: 12 };
        assert_eq!(err.to_string(), "malformed input at offset 12: expected '}'");
        assert_eq!(err.message(), "malformed");
    }

    #[test]
    fn suspend_distinguishes_pause_from_truncation() {
        let frag = Cursor::fragment(b"");
        assert!(matches!(
            suspend::<(), u8>((), &frag, "varint"),
            Step::Pending(())
        ));

        let term = Cursor::terminal(b"");
        assert_eq!(
            suspend::<(), u8>((), &term, "varint"),
            Step::Failed(DecodeError::Incomplete { expected: "varint" })
        );

        let fault = Cursor::fault("socket reset");
        assert_eq!(
            suspend::<(), u8>((), &fault, "varint"),
            Step::Failed(DecodeError::Trapped("socket reset".to_string()))
        );
    }
}
