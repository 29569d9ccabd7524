//! Randomness entry points.
//!
//! Protocol operations take an injected `impl RngCore + CryptoRng`, so a
//! caller can substitute a deterministic generator for test vectors. These
//! helpers supply the OS-backed default.

use rand_core::{CryptoRng, OsRng, RngCore};

#[inline]
pub fn get_rng() -> impl RngCore + CryptoRng {
    OsRng
}

#[inline]
pub fn random_bytes<const N: usize>(rng: &mut (impl RngCore + CryptoRng)) -> [u8; N] {
    let mut array = [0u8; N];
    rng.fill_bytes(&mut array);

    array
}
