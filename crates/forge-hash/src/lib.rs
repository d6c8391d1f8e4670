// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! FNV-1a hashing. Not cryptographic; meant for hash maps and checksums
//! where speed matters more than resistance to adversarial input.

use std::hash::{BuildHasher, Hasher};

const OFFSET_BASIS: u64 = 14695981039346656037;
const PRIME: u64 = 1099511628211;

/// A [`std::hash::Hasher`] implementing 64-bit FNV-1a.
#[derive(Clone, Copy, Debug)]
pub struct FnvHasher(u64);

impl Default for FnvHasher {
    fn default() -> Self {
        Self(OFFSET_BASIS)
    }
}

impl Hasher for FnvHasher {
    fn write(&mut self, bytes: &[u8]) {
        let mut hash = self.0;
        for &byte in bytes {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(PRIME);
        }
        self.0 = hash;
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// A [`std::hash::BuildHasher`] for `HashMap<_, _, FnvBuildHasher>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FnvBuildHasher;

impl BuildHasher for FnvBuildHasher {
    type Hasher = FnvHasher;

    fn build_hasher(&self) -> FnvHasher {
        FnvHasher::default()
    }
}

/// Hashes `bytes` with a fresh FNV-1a state.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

/// Combines two hashes by hashing the concatenation of their little-endian
/// byte representations under the same kernel.
pub fn combine(a: u64, b: u64) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(&a.to_le_bytes());
    hasher.write(&b.to_le_bytes());
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_fnv1a_vectors() {
        // Canonical FNV-1a 64-bit test vectors for the empty string and "a".
        assert_eq!(hash_bytes(b""), OFFSET_BASIS);
        assert_eq!(hash_bytes(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn combine_is_order_sensitive() {
        assert_ne!(combine(1, 2), combine(2, 1));
    }

    #[test]
    fn build_hasher_matches_direct_call() {
        let built = FnvBuildHasher.build_hasher();
        let mut built = built;
        built.write(b"hello");
        assert_eq!(built.finish(), hash_bytes(b"hello"));
    }
}
