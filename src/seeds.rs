//! Deterministic seed derivation.
//!
//! One base seed drives a whole batch of runs. Each run, and each consumer inside a run
//! (fault injection, the learner), gets its own stream so that changing one consumer's
//! draw count never shifts another's. Not cryptographic.

/// Seed for the random stream named `stream` in run `run`.
///
/// Implementation:
/// - FNV-1a over the stream name (stable across platforms)
/// - SplitMix64 finalizer over `base`, `run` and that hash
#[must_use]
pub fn stream_seed(base: u64, run: usize, stream: &str) -> u64 {
    let mut h: u64 = 14695981039346656037u64;
    for b in stream.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211u64);
    }
    splitmix64(splitmix64(base ^ h).wrapping_add(run as u64))
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
