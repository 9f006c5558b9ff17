//! Seam for compressed frames.
//!
//! The sliding-window inflate state itself lives with the transport layer,
//! outside this engine; what the engine owns is the routing decision and the
//! discipline around speculative use. An inflater carries the compression
//! dictionary shared by every subsequent frame on the connection, so a
//! usage branch that may be abandoned must work on an explicit duplicate
//! and release it, never on the original.

use crate::cursor::Cursor;
use crate::step::{Decode, DecodeError, Step};

/// Per-frame routing decision supplied by the negotiated-compression
/// collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRouting {
    Plain,
    Compressed,
}

/// Stateful inflate context owned by the connection.
///
/// `duplicate` clones the full dictionary state so one branch can be
/// explored and abandoned; `release` disposes of a branch explicitly.
/// Dropping a duplicate without releasing it must leave the original
/// untouched.
pub trait FrameInflater {
    /// Inflate `input`, appending to `output`. Advances the dictionary.
    fn inflate(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), DecodeError>;

    /// Clone the dictionary state for a speculative branch.
    fn duplicate(&self) -> Box<dyn FrameInflater>;

    /// Dispose of this context.
    fn release(self: Box<Self>) {}
}

/// Routes a frame's payload through an inflater before the inner decoder,
/// or feeds the inner decoder directly for plain frames.
pub struct InflateDecoder<D: Decode> {
    inner: D,
    inflater: Option<Box<dyn FrameInflater>>,
}

impl<D: Decode + core::fmt::Debug> core::fmt::Debug for InflateDecoder<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InflateDecoder")
            .field("inner", &self.inner)
            .field("inflater", &self.inflater.as_ref().map(|_| "..."))
            .finish()
    }
}

impl<D: Decode> InflateDecoder<D> {
    /// Route per the collaborator's decision. A compressed route requires
    /// the connection's inflater (or a duplicate of it).
    pub fn new(inner: D, routing: FrameRouting, inflater: Option<Box<dyn FrameInflater>>) -> Self {
        let inflater = match routing {
            FrameRouting::Plain => None,
            FrameRouting::Compressed => inflater,
        };
        Self { inner, inflater }
    }
}

impl<D: Decode> Decode for InflateDecoder<D> {
    type Value = D::Value;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, D::Value> {
        let Some(mut inflater) = self.inflater.take() else {
            return self.inner.feed(cur).map_pending(|inner| Self { inner, inflater: None });
        };

        let mut inflated = Vec::new();
        if let Err(err) = inflater.inflate(cur.window(), &mut inflated) {
            return Step::Failed(err);
        }
        cur.set_index(cur.limit());

        let mut body = if cur.is_part() {
            Cursor::fragment(&inflated)
        } else {
            Cursor::terminal(&inflated)
        };
        match self.inner.feed(&mut body) {
            Step::Done(value) => {
                if body.is_cont() {
                    // Inflated bytes past the decoded value would silently
                    // desynchronize the frame.
                    return Step::Failed(DecodeError::Malformed {
                        expected: "end of frame payload",
                        at: body.index(),
                    });
                }
                inflater.release();
                Step::Done(value)
            }
            Step::Pending(inner) => Step::Pending(Self { inner, inflater: Some(inflater) }),
            Step::Failed(err) => Step::Failed(err),
        }
    }
}
