//! Stable hashing for directory buckets.
//!
//! The hash kind is recorded in the file header so bucket mapping stays
//! invariant across toolchains and platforms.

use std::fmt;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

/// Type of stable hash used by a store (u32 code in the file header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    /// 64-bit xxhash with seed=0.
    Xx64Seed0 = 1,
}

impl HashKind {
    pub fn to_u32(self) -> u32 {
        match self {
            HashKind::Xx64Seed0 => 1,
        }
    }

    /// Unknown codes return None.
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1 => Some(HashKind::Xx64Seed0),
            _ => None,
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKind::Xx64Seed0 => write!(f, "xxhash64(seed=0)"),
        }
    }
}

pub const HASH_KIND_DEFAULT: HashKind = HashKind::Xx64Seed0;

pub fn hash64(kind: HashKind, key: &[u8]) -> u64 {
    match kind {
        HashKind::Xx64Seed0 => {
            let mut h = XxHash64::with_seed(0);
            key.hash(&mut h);
            h.finish()
        }
    }
}

#[inline]
pub fn bucket_index(hash: u64, buckets: u32) -> u32 {
    debug_assert!(buckets > 0, "buckets must be > 0");
    (hash % (buckets as u64)) as u32
}

#[inline]
pub fn bucket_of_key(kind: HashKind, key: &[u8], buckets: u32) -> u32 {
    bucket_index(hash64(kind, key), buckets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_and_spread() {
        let a = hash64(HashKind::Xx64Seed0, b"sym:1");
        let b = hash64(HashKind::Xx64Seed0, b"sym:1");
        assert_eq!(a, b);
        assert_ne!(a, hash64(HashKind::Xx64Seed0, b"sym:2"));

        let mut used = std::collections::HashSet::new();
        for i in 0..1000 {
            let k = format!("sym:{}", i);
            used.insert(bucket_of_key(HASH_KIND_DEFAULT, k.as_bytes(), 64));
        }
        assert!(used.len() > 48, "poor bucket spread: {}", used.len());
    }

    #[test]
    fn kind_codes_roundtrip() {
        assert_eq!(HashKind::from_u32(1), Some(HashKind::Xx64Seed0));
        assert_eq!(HashKind::from_u32(HashKind::Xx64Seed0.to_u32()), Some(HashKind::Xx64Seed0));
        assert_eq!(HashKind::from_u32(0), None);
    }
}
