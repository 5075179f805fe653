//! Deterministic uniform variates keyed by event identity.
//!
//! No generator state is carried between calls: the variate for an event is
//! a pure function of its key and the seed, so any worker may compute it in
//! any order and get the same value.

use crate::event::key::EventKey;

/// Default seed for the training partition.
pub const DEFAULT_SEED: u64 = 12345;

const MANTISSA_BITS: u32 = 52;

/// SplitMix64 finalizer.
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Uniform variate in the open interval (0, 1).
///
/// The top 52 bits of the mixed hash are mapped by `(h + 0.5) / 2^52`; every
/// value of that form is exactly representable, so 0 and 1 are never hit.
pub fn uniform(key: EventKey, seed: u64) -> f64 {
    let h = splitmix64(key.0 ^ splitmix64(seed)) >> (64 - MANTISSA_BITS);
    (h as f64 + 0.5) / (1u64 << MANTISSA_BITS) as f64
}
