//! Speculative format detection: race several grammars over one stream.
//!
//! Every round, each still-continuing candidate is fed its own copy of the
//! incoming cursor - copies of position records, never of bytes - so no
//! candidate's progress can corrupt another's. Candidates make maximal
//! progress per round and suspend internally, which is what lets the race
//! span chunk boundaries without buffering the stream.
//!
//! Resolution: at true end of input, the single surviving interpretation
//! wins; once every other candidate has failed, later rounds delegate to
//! the sole survivor with no further racing; if everything fails, the
//! last-eliminated candidate's failure surfaces. The two low-confidence
//! fallbacks (raw text, raw bytes) stay eligible only inside a bounded
//! detection window, and yield to any structured interpretation that also
//! completes - ties within one confidence tier are ambiguous.

use core::mem;

use memchr::memchr;

use crate::cursor::Cursor;
use crate::grammar::{skip_ws, DocumentParser, Value};
use crate::message::MessageDecoder;
use crate::schema::{MessageSchema, Record};
use crate::step::{suspend, Decode, DecodeError, Step};
use crate::text::Utf8Decoder;

/// Default detection window, in elements consumed.
pub const DEFAULT_WINDOW: usize = 128;

/// Tuning knobs for a detection run.
#[derive(Debug, Clone, Copy)]
pub struct DetectOptions {
    /// Elements the detector will consume before forcing the raw-text and
    /// raw-bytes fallbacks to fail.
    pub window: usize,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self { window: DEFAULT_WINDOW }
    }
}

/// The interpretation a detection run resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Detected {
    Markup { root: String },
    Object(Value),
    BlockText(Vec<String>),
    Message(Record),
    Text(String),
    Bytes(Vec<u8>),
}

/// Shallow markup recognizer: leading whitespace, `<`, an element name, and
/// then anything until end of stream. Enough structure to be eliminated
/// honestly by non-markup input.
#[derive(Debug, Clone)]
struct MarkupProbe {
    state: MarkupState,
    root: String,
}

#[derive(Debug, Clone, Copy)]
enum MarkupState {
    Leading,
    Name,
    Body,
}

impl MarkupProbe {
    fn new() -> Self {
        Self { state: MarkupState::Leading, root: String::new() }
    }
}

impl Decode for MarkupProbe {
    type Value = String;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, String> {
        loop {
            match self.state {
                MarkupState::Leading => {
                    skip_ws(cur);
                    if !cur.is_cont() {
                        return suspend(self, cur, "markup document");
                    }
                    if cur.head() != b'<' {
                        return Step::Failed(DecodeError::Malformed {
                            expected: "'<'",
                            at: cur.index(),
                        });
                    }
                    cur.step();
                    self.state = MarkupState::Name;
                }
                MarkupState::Name => {
                    while cur.is_cont() && cur.head().is_ascii_alphanumeric() {
                        self.root.push(cur.head() as char);
                        cur.step();
                    }
                    if !cur.is_cont() {
                        return suspend(self, cur, "element name");
                    }
                    if self.root.is_empty()
                        || !matches!(cur.head(), b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r')
                    {
                        return Step::Failed(DecodeError::Malformed {
                            expected: "element name",
                            at: cur.index(),
                        });
                    }
                    self.state = MarkupState::Body;
                }
                MarkupState::Body => {
                    cur.set_index(cur.limit());
                    if cur.is_done() {
                        return Step::Done(mem::take(&mut self.root));
                    }
                    return suspend(self, cur, "markup content");
                }
            }
        }
    }
}

/// Shallow block-structured-text recognizer: lines of `key: free text`,
/// optionally indented, blank lines allowed.
#[derive(Debug, Clone)]
struct BlockProbe {
    lines: Vec<String>,
    line: Vec<u8>,
    state: BlockState,
}

#[derive(Debug, Clone, Copy)]
enum BlockState {
    Indent,
    Key,
    Rest,
}

impl BlockProbe {
    fn new() -> Self {
        Self { lines: Vec::new(), line: Vec::new(), state: BlockState::Indent }
    }

    fn finish_line(&mut self, at: usize) -> Result<(), DecodeError> {
        let mut line = mem::take(&mut self.line);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        match String::from_utf8(line) {
            Ok(text) => {
                self.lines.push(text);
                Ok(())
            }
            Err(_) => Err(DecodeError::Malformed { expected: "utf-8 text", at }),
        }
    }
}

impl Decode for BlockProbe {
    type Value = Vec<String>;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, Vec<String>> {
        loop {
            if !cur.is_cont() {
                if cur.is_done() {
                    match self.state {
                        // A key with no ':' yet cannot end a document.
                        BlockState::Key => return suspend(self, cur, "':'"),
                        BlockState::Indent | BlockState::Rest => {
                            if !self.line.is_empty() {
                                if let Err(err) = self.finish_line(cur.index()) {
                                    return Step::Failed(err);
                                }
                            }
                            return Step::Done(self.lines);
                        }
                    }
                }
                return suspend(self, cur, "block text");
            }
            match self.state {
                BlockState::Indent => {
                    let b = cur.head();
                    match b {
                        b' ' => {
                            cur.step();
                            self.line.push(b);
                        }
                        b'\n' => {
                            cur.step();
                            if let Err(err) = self.finish_line(cur.index()) {
                                return Step::Failed(err);
                            }
                        }
                        b'\r' => {
                            cur.step();
                            self.line.push(b);
                        }
                        _ if b.is_ascii_alphabetic() || b == b'_' => {
                            cur.step();
                            self.line.push(b);
                            self.state = BlockState::Key;
                        }
                        _ => {
                            return Step::Failed(DecodeError::Malformed {
                                expected: "block entry key",
                                at: cur.index(),
                            });
                        }
                    }
                }
                BlockState::Key => {
                    let b = cur.head();
                    if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
                        cur.step();
                        self.line.push(b);
                    } else if b == b':' {
                        cur.step();
                        self.line.push(b);
                        self.state = BlockState::Rest;
                    } else {
                        return Step::Failed(DecodeError::Malformed {
                            expected: "':'",
                            at: cur.index(),
                        });
                    }
                }
                BlockState::Rest => {
                    let window = cur.window();
                    let (segment, saw_newline) = match memchr(b'\n', window) {
                        Some(pos) => (&window[..pos], true),
                        None => (window, false),
                    };
                    if let Some(bad) = segment
                        .iter()
                        .position(|&b| b < 0x20 && b != b'\t' && b != b'\r')
                    {
                        return Step::Failed(DecodeError::Malformed {
                            expected: "printable text",
                            at: cur.index() + bad,
                        });
                    }
                    self.line.extend_from_slice(segment);
                    cur.set_index(cur.index() + segment.len() + usize::from(saw_newline));
                    if saw_newline {
                        if let Err(err) = self.finish_line(cur.index()) {
                            return Step::Failed(err);
                        }
                        self.state = BlockState::Indent;
                    }
                }
            }
        }
    }
}

/// Raw-text fallback: any valid UTF-8, validated incrementally.
#[derive(Debug, Clone)]
struct TextProbe {
    text: String,
    mb: Option<Utf8Decoder>,
}

impl TextProbe {
    fn new() -> Self {
        Self { text: String::new(), mb: None }
    }
}

impl Decode for TextProbe {
    type Value = String;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, String> {
        loop {
            if let Some(dec) = self.mb.take() {
                match dec.feed(cur) {
                    Step::Done(ch) => self.text.push(ch),
                    Step::Pending(dec) => {
                        self.mb = Some(dec);
                        return Step::Pending(self);
                    }
                    Step::Failed(err) => return Step::Failed(err),
                }
            }
            let window = cur.window();
            let stop = window.iter().position(|&b| b >= 0x80).unwrap_or(window.len());
            self.text.extend(window[..stop].iter().map(|&b| b as char));
            cur.set_index(cur.index() + stop);
            if cur.is_cont() {
                self.mb = Some(Utf8Decoder::new());
            } else if cur.is_done() {
                return Step::Done(self.text);
            } else {
                return suspend(self, cur, "text");
            }
        }
    }
}

/// Raw-bytes fallback: accepts anything.
#[derive(Debug, Clone, Default)]
struct BytesProbe {
    bytes: Vec<u8>,
}

impl Decode for BytesProbe {
    type Value = Vec<u8>;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, Vec<u8>> {
        self.bytes.extend_from_slice(cur.window());
        cur.set_index(cur.limit());
        if cur.is_done() {
            return Step::Done(self.bytes);
        }
        suspend(self, cur, "bytes")
    }
}

#[derive(Debug, Clone)]
enum Candidate<'s> {
    Markup(MarkupProbe),
    Object(DocumentParser),
    Block(BlockProbe),
    Binary(MessageDecoder<'s, Record>),
    Text(TextProbe),
    Bytes(BytesProbe),
}

impl<'s> Candidate<'s> {
    fn feed(self, cur: &mut Cursor<'_>) -> Step<Self, Detected> {
        match self {
            Candidate::Markup(probe) => probe
                .feed(cur)
                .map(|root| Detected::Markup { root })
                .map_pending(Candidate::Markup),
            Candidate::Object(parser) => parser
                .feed(cur)
                .map(Detected::Object)
                .map_pending(Candidate::Object),
            Candidate::Block(probe) => probe
                .feed(cur)
                .map(Detected::BlockText)
                .map_pending(Candidate::Block),
            Candidate::Binary(dec) => dec
                .feed(cur)
                .map(Detected::Message)
                .map_pending(Candidate::Binary),
            Candidate::Text(probe) => probe
                .feed(cur)
                .map(Detected::Text)
                .map_pending(Candidate::Text),
            Candidate::Bytes(probe) => probe
                .feed(cur)
                .map(Detected::Bytes)
                .map_pending(Candidate::Bytes),
        }
    }
}

#[derive(Debug, Clone)]
enum Slot<'s> {
    Live(Candidate<'s>),
    Complete(Detected),
    Failed,
}

/// Confidence tiers by roster position: structured formats, then raw text,
/// then raw bytes.
const RANKS: [u8; 6] = [0, 0, 0, 0, 1, 2];
const FALLBACKS: [usize; 2] = [4, 5];

/// Races the candidate roster over one stream of chunks.
#[derive(Debug, Clone)]
pub struct Detector<'s> {
    slots: Vec<Slot<'s>>,
    consumed: usize,
    window: usize,
    sole: Option<usize>,
    last_failure: Option<DecodeError>,
}

impl<'s> Detector<'s> {
    /// Build the fixed roster: markup, object-notation, block text, the
    /// schema-driven binary format, and the two raw fallbacks.
    pub fn new(schema: &'s MessageSchema<'s>, opts: DetectOptions) -> Self {
        Self {
            slots: vec![
                Slot::Live(Candidate::Markup(MarkupProbe::new())),
                Slot::Live(Candidate::Object(DocumentParser::new())),
                Slot::Live(Candidate::Block(BlockProbe::new())),
                Slot::Live(Candidate::Binary(MessageDecoder::new(schema))),
                Slot::Live(Candidate::Text(TextProbe::new())),
                Slot::Live(Candidate::Bytes(BytesProbe::default())),
            ],
            consumed: 0,
            window: opts.window,
            sole: None,
            last_failure: None,
        }
    }

    fn all_failed(&self) -> Step<Self, Detected> {
        Step::Failed(
            self.last_failure
                .clone()
                .unwrap_or(DecodeError::Incomplete { expected: "detectable format" }),
        )
    }
}

impl<'s> Decode for Detector<'s> {
    type Value = Detected;

    fn feed(mut self, cur: &mut Cursor<'_>) -> Step<Self, Detected> {
        // Once a single live candidate remains, delegate to it directly.
        if let Some(idx) = self.sole {
            match mem::replace(&mut self.slots[idx], Slot::Failed) {
                Slot::Live(cand) => match cand.feed(cur) {
                    Step::Done(value) => return Step::Done(value),
                    Step::Pending(cand) => {
                        self.slots[idx] = Slot::Live(cand);
                        return Step::Pending(self);
                    }
                    Step::Failed(err) => return Step::Failed(err),
                },
                Slot::Complete(value) => {
                    if cur.is_cont() {
                        return Step::Failed(DecodeError::Malformed {
                            expected: "end of detected document",
                            at: cur.index(),
                        });
                    }
                    if cur.is_done() {
                        return Step::Done(value);
                    }
                    self.slots[idx] = Slot::Complete(value);
                    return suspend(self, cur, "end of detected document");
                }
                Slot::Failed => return self.all_failed(),
            }
        }

        // One racing round: each live candidate reads its own position copy
        // over this chunk's shared window.
        let start = *cur;
        for i in 0..self.slots.len() {
            if let Slot::Live(cand) = mem::replace(&mut self.slots[i], Slot::Failed) {
                let mut own = start;
                self.slots[i] = match cand.feed(&mut own) {
                    Step::Done(value) => Slot::Complete(value),
                    Step::Pending(cand) => Slot::Live(cand),
                    Step::Failed(err) => {
                        self.last_failure = Some(err);
                        Slot::Failed
                    }
                };
            }
        }
        cur.set_index(cur.limit());
        self.consumed += start.remaining();

        // Past the window, low-confidence fallbacks are no longer eligible.
        if self.consumed >= self.window {
            for &i in &FALLBACKS {
                if matches!(self.slots[i], Slot::Live(_)) {
                    self.slots[i] = Slot::Failed;
                    self.last_failure = Some(DecodeError::Malformed {
                        expected: "structured format within the detection window",
                        at: self.consumed,
                    });
                }
            }
        }

        let live: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Slot::Live(_)))
            .map(|(i, _)| i)
            .collect();
        let complete: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Slot::Complete(_)))
            .map(|(i, _)| i)
            .collect();

        if live.is_empty() && complete.is_empty() {
            return self.all_failed();
        }

        if cur.is_done() {
            // Candidates self-resolve on a done cursor; anything still
            // continuing counts against a unique interpretation.
            if !live.is_empty() {
                return if live.len() + complete.len() >= 2 {
                    Step::Failed(DecodeError::Ambiguous)
                } else {
                    Step::Failed(DecodeError::Incomplete { expected: "detectable format" })
                };
            }
            let best = complete.iter().map(|&i| RANKS[i]).min();
            let winners: Vec<usize> = complete
                .iter()
                .copied()
                .filter(|&i| Some(RANKS[i]) == best)
                .collect();
            if winners.len() >= 2 {
                return Step::Failed(DecodeError::Ambiguous);
            }
            if let Slot::Complete(value) = mem::replace(&mut self.slots[winners[0]], Slot::Failed)
            {
                return Step::Done(value);
            }
            return self.all_failed();
        }

        if live.len() == 1 && complete.is_empty() {
            self.sole = Some(live[0]);
        }
        if let Some(message) = cur.trapped() {
            return Step::Failed(DecodeError::Trapped(message.to_string()));
        }
        Step::Pending(self)
    }
}
