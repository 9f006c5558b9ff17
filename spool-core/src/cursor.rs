//! Chunk cursors: positionable views over transient input and output windows.
//!
//! A `Cursor` is a position record over borrowed bytes, never an owner of
//! them. The transport driver creates one per arriving chunk, feeds it to a
//! continuation, and discards it. Cloning a cursor copies three words of
//! position state - not bytes - which is what keeps speculative multi-grammar
//! racing cheap: each candidate advances its own copy over the same backing
//! window.
//!
//! A cursor is in exactly one of four states:
//! - **cont**: `index < limit`, the current byte is readable
//! - **paused**: exhausted, but the chunk was marked as a fragment - more
//!   input is expected on a later feed
//! - **done**: exhausted and the stream has genuinely ended here
//! - **error**: the underlying storage faulted; the fault rides along

/// Read cursor over a borrowed input window.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    data: &'a [u8],
    index: usize,
    limit: usize,
    part: bool,
    fault: Option<&'a str>,
}

impl<'a> Cursor<'a> {
    /// An intermediate fragment: when exhausted, the stream is merely paused.
    pub fn fragment(data: &'a [u8]) -> Self {
        Self { data, index: 0, limit: data.len(), part: true, fault: None }
    }

    /// The final chunk: when exhausted, the stream has truly ended.
    pub fn terminal(data: &'a [u8]) -> Self {
        Self { data, index: 0, limit: data.len(), part: false, fault: None }
    }

    /// A cursor carrying a trapped storage fault.
    ///
    /// Decoders fed a faulted cursor fail immediately, propagating the
    /// captured message verbatim.
    pub fn fault(message: &'a str) -> Self {
        Self { data: &[], index: 0, limit: 0, part: false, fault: Some(message) }
    }

    /// More bytes are readable at the current position.
    #[inline]
    pub fn is_cont(&self) -> bool {
        self.fault.is_none() && self.index < self.limit
    }

    /// Exhausted with no more input ever coming.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.fault.is_none() && self.index >= self.limit && !self.part
    }

    /// The limit is an artificial pause rather than true end of stream.
    #[inline]
    pub fn is_part(&self) -> bool {
        self.part
    }

    /// The underlying storage faulted.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.fault.is_some()
    }

    /// The trapped fault, if any.
    #[inline]
    pub fn trapped(&self) -> Option<&'a str> {
        self.fault
    }

    /// The current byte. Only defined in the cont state.
    #[inline]
    pub fn head(&self) -> u8 {
        debug_assert!(self.is_cont());
        self.data[self.index]
    }

    /// Advance past the current byte. Only defined in the cont state.
    #[inline]
    pub fn step(&mut self) {
        debug_assert!(self.is_cont());
        self.index += 1;
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Reposition. Used to rewind for speculative attempts; `n` must not
    /// exceed the limit.
    #[inline]
    pub fn set_index(&mut self, n: usize) {
        debug_assert!(n <= self.limit);
        self.index = n;
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Narrow or restore the limit. Used to carve size-delimited sub-windows;
    /// `n` must not exceed the backing window.
    #[inline]
    pub fn set_limit(&mut self, n: usize) {
        debug_assert!(n <= self.data.len());
        self.limit = n;
    }

    #[inline]
    pub fn set_part(&mut self, part: bool) {
        self.part = part;
    }

    /// Bytes readable before the limit.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit - self.index
    }

    /// The readable window, for bulk scans. Advancing past a scanned prefix
    /// is the caller's job via [`set_index`](Self::set_index).
    #[inline]
    pub fn window(&self) -> &'a [u8] {
        &self.data[self.index..self.limit]
    }
}

/// Write cursor over a borrowed output window.
///
/// The encode dual of [`Cursor`]: encoders push bytes until the window's
/// capacity runs out, then suspend holding the unwritten remainder.
#[derive(Debug)]
pub struct CursorMut<'a> {
    data: &'a mut [u8],
    index: usize,
    limit: usize,
}

impl<'a> CursorMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        let limit = data.len();
        Self { data, index: 0, limit }
    }

    /// Capacity remains at the current position.
    #[inline]
    pub fn is_cont(&self) -> bool {
        self.index < self.limit
    }

    /// The window is full.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.index >= self.limit
    }

    /// Write one byte. Only defined in the cont state.
    #[inline]
    pub fn push(&mut self, byte: u8) {
        debug_assert!(self.is_cont());
        self.data[self.index] = byte;
        self.index += 1;
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Cap the writable window; `n` must not exceed the backing buffer.
    #[inline]
    pub fn set_limit(&mut self, n: usize) {
        debug_assert!(n <= self.data.len());
        self.limit = n;
    }

    /// Capacity left before the limit.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit - self.index
    }

    /// Write as much of `bytes` as capacity allows; returns the count taken.
    pub fn push_slice(&mut self, bytes: &[u8]) -> usize {
        let take = self.remaining().min(bytes.len());
        self.data[self.index..self.index + take].copy_from_slice(&bytes[..take]);
        self.index += take;
        take
    }

    /// Everything written so far.
    #[inline]
    pub fn written(&self) -> &[u8] {
        &self.data[..self.index]
    }
}
