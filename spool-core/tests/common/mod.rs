//! Shared test helpers: chunked feeding and a seeded chunk-split generator.
//!
//! Uses seeded RNG for reproducibility. Failures print the seed; replay with
//! SPOOL_TEST_SEED.
#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spool_core::{Cursor, Decode, DecodeError, Step};

/// Feed a decoder a run of fragments, the last chunk terminal. Completion
/// before the terminal chunk is legal for self-delimiting codecs.
pub fn decode_chunked<D: Decode>(mut dec: D, chunks: &[&[u8]]) -> Result<D::Value, DecodeError> {
    let (last, fragments) = chunks.split_last().expect("at least one chunk");
    for chunk in fragments {
        let mut cur = Cursor::fragment(chunk);
        match dec.feed(&mut cur) {
            Step::Pending(next) => dec = next,
            Step::Done(value) => return Ok(value),
            Step::Failed(err) => return Err(err),
        }
    }
    let mut cur = Cursor::terminal(last);
    match dec.feed(&mut cur) {
        Step::Done(value) => Ok(value),
        Step::Failed(err) => Err(err),
        Step::Pending(_) => Err(DecodeError::Incomplete { expected: "terminal chunk" }),
    }
}

/// One split point: `bytes[..at]` as a fragment, the rest terminal.
pub fn decode_split<D: Decode>(dec: D, bytes: &[u8], at: usize) -> Result<D::Value, DecodeError> {
    decode_chunked(dec, &[&bytes[..at], &bytes[at..]])
}

/// Feed one byte per fragment, then an empty terminal chunk.
pub fn decode_byte_at_a_time<D: Decode>(dec: D, bytes: &[u8]) -> Result<D::Value, DecodeError> {
    let mut chunks: Vec<&[u8]> = bytes.chunks(1).collect();
    chunks.push(&[]);
    decode_chunked(dec, &chunks)
}

/// Every split point must decode identically to the whole input.
pub fn assert_split_invariant<D, F>(make: F, bytes: &[u8])
where
    D: Decode,
    D::Value: PartialEq + std::fmt::Debug,
    F: Fn() -> D,
{
    let whole = spool_core::decode(make(), bytes).expect("whole-input decode failed");
    for at in 0..=bytes.len() {
        let split = decode_split(make(), bytes, at)
            .unwrap_or_else(|err| panic!("split at {at} failed: {err}"));
        assert_eq!(split, whole, "split at {at} diverged from whole-input decode");
    }
}

/// Seeded generator for random chunk partitions.
pub struct Gen {
    pub rng: StdRng,
    pub seed: u64,
}

impl Gen {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), seed }
    }

    pub fn from_env_or_random() -> Self {
        let seed = std::env::var("SPOOL_TEST_SEED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(rand::random);
        Self::new(seed)
    }

    /// Split `bytes` into 1..=max_chunks contiguous pieces at random cuts.
    pub fn partition(&mut self, bytes: &[u8], max_chunks: usize) -> Vec<Vec<u8>> {
        let count = self.rng.gen_range(1..=max_chunks.max(1));
        let mut cuts: Vec<usize> = (0..count - 1)
            .map(|_| self.rng.gen_range(0..=bytes.len()))
            .collect();
        cuts.sort_unstable();
        let mut chunks = Vec::with_capacity(count);
        let mut start = 0;
        for cut in cuts {
            chunks.push(bytes[start..cut].to_vec());
            start = cut;
        }
        chunks.push(bytes[start..].to_vec());
        chunks
    }
}
