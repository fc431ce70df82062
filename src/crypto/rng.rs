//! Randomness is the one shared external resource: everything that needs
//! entropy (keypairs, path secrets, ECIES ephemerals) draws from the OS
//! CSPRNG through this module.

use rand_core::{CryptoRng, OsRng, RngCore};

#[inline]
pub fn get_rng() -> impl RngCore + CryptoRng {
    OsRng
}

/// Fills a fixed-size array from the CSPRNG.
#[inline]
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut array = [0u8; N];
    get_rng().fill_bytes(&mut array);

    array
}
