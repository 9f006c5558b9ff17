//! SPOOL Core Engine
//!
//! Incremental codec engine: resumable parsers, decoders and encoders over
//! chunked input. Every wire-level format in the system - structured-data
//! documents, schema-driven binary messages, protocol frames - is built from
//! the continuations defined here. A continuation fed a partial chunk makes
//! maximal progress and hands control back; feeding the rest later resumes
//! exactly where it stopped, so decoding never blocks the thread that owns
//! the socket.
//!
//! # Architecture
//!
//! - **cursor.rs** - position records over transient input/output windows
//! - **step.rs** - the three-state continuation primitive and error codes
//! - **scalar.rs** - varint, zigzag and fixed-width integer codecs
//! - **schema.rs** - field tables, wire types and the universal record
//! - **message.rs** - message, repeated, keyed-map and packed codecs
//! - **text.rs** - resumable UTF-8 character decoding
//! - **grammar.rs** - the object/array document grammar
//! - **detect.rs** - speculative multi-format detection
//! - **inflate.rs** - the compressed-frame seam

pub mod cursor;
pub mod detect;
pub mod grammar;
pub mod inflate;
pub mod message;
pub mod scalar;
pub mod schema;
pub mod step;
pub mod text;

pub use cursor::{Cursor, CursorMut};
pub use detect::{DetectOptions, Detected, Detector, DEFAULT_WINDOW};
pub use grammar::{DocumentParser, Value};
pub use inflate::{FrameInflater, FrameRouting, InflateDecoder};
pub use message::{
    BytesDecoder, ListDecoder, MapDecoder, MessageDecoder, MessageEncoder, PackedDecoder,
    ScalarDecoder,
};
pub use scalar::{
    varint_len, zigzag_decode, zigzag_encode, zigzag_len, Fixed32Decoder, Fixed32Encoder,
    Fixed64Decoder, Fixed64Encoder, VarintDecoder, VarintEncoder, ZigzagDecoder, ZigzagEncoder,
};
pub use schema::{
    field_len, FieldKind, FieldRule, FieldValue, MessageSchema, PackedKind, Record, Strictness,
    WireType,
};
pub use step::{decode, encode_to_vec, Decode, DecodeError, Encode, Step};
pub use text::Utf8Decoder;
