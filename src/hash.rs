//! # Hash Backends
//!
//! Seeded, non-cryptographic hash functions behind a common trait so the
//! sketcher can swap families without touching the pipeline. The file
//! format records `bytes_per_hash`, which is all a reader needs; only the
//! sketcher selects a backend.

use anyhow::{bail, Result};
use std::fmt;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// A deterministic seeded hash over feature bytes.
///
/// Implementations must be pure functions of `(feature, seed)` with
/// uniformly distributed low bits. Hash values are returned widened to
/// `u64`; only the low `bytes_per_hash() * 8` bits are significant.
pub trait MinHasher: Send + Sync {
    /// Width of one stored hash value in bytes (4 or 8).
    fn bytes_per_hash(&self) -> u32;

    /// Hash a feature under the given seed.
    fn hash(&self, feature: &[u8], seed: u32) -> u64;

    /// The maximum representable hash value at this width.
    ///
    /// Items with no features store this value in every slot so they never
    /// collide with an item that produced at least one real hash.
    fn max_hash(&self) -> u64 {
        match self.bytes_per_hash() {
            4 => u32::MAX as u64,
            _ => u64::MAX,
        }
    }
}

/// MurmurHash3 (x86, 32-bit), 4 bytes per hash value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Murmur3x86;

impl MinHasher for Murmur3x86 {
    fn bytes_per_hash(&self) -> u32 {
        4
    }

    fn hash(&self, feature: &[u8], seed: u32) -> u64 {
        mur3::murmurhash3_x86_32(feature, seed) as u64
    }
}

/// XXH3, 64-bit, 8 bytes per hash value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3;

impl MinHasher for Xxh3 {
    fn bytes_per_hash(&self) -> u32 {
        8
    }

    fn hash(&self, feature: &[u8], seed: u32) -> u64 {
        xxh3_64_with_seed(feature, seed as u64)
    }
}

/// Runtime selector for the hash family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashBackend {
    /// MurmurHash3_x86_32 (4-byte hashes).
    #[default]
    Murmur3,
    /// XXH3-64 (8-byte hashes).
    Xxh3,
}

impl HashBackend {
    /// Parse a backend name as accepted on the command line.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "murmur3" => Ok(Self::Murmur3),
            "xxh3" => Ok(Self::Xxh3),
            other => bail!("unknown hash backend: {}", other),
        }
    }

    /// Instantiate the backend.
    pub fn hasher(self) -> Box<dyn MinHasher> {
        match self {
            Self::Murmur3 => Box::new(Murmur3x86),
            Self::Xxh3 => Box::new(Xxh3),
        }
    }
}

impl fmt::Display for HashBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Murmur3 => write!(f, "murmur3"),
            Self::Xxh3 => write!(f, "xxh3"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backends_are_deterministic() {
        for hasher in [HashBackend::Murmur3.hasher(), HashBackend::Xxh3.hasher()] {
            let a = hasher.hash(b"hello", 7);
            let b = hasher.hash(b"hello", 7);
            assert_eq!(a, b);
            assert_ne!(hasher.hash(b"hello", 8), a);
            assert_ne!(hasher.hash(b"hellp", 7), a);
        }
    }

    #[test]
    fn test_murmur3_fits_four_bytes() {
        let hasher = Murmur3x86;
        assert_eq!(hasher.bytes_per_hash(), 4);
        assert_eq!(hasher.max_hash(), u32::MAX as u64);
        for seed in 0..64 {
            assert!(hasher.hash(b"some feature", seed) <= u32::MAX as u64);
        }
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(HashBackend::parse("murmur3").unwrap(), HashBackend::Murmur3);
        assert_eq!(HashBackend::parse("xxh3").unwrap(), HashBackend::Xxh3);
        assert!(HashBackend::parse("fnv").is_err());
    }
}
