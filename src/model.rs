//! # Data Model
//!
//! Core identifiers and parameters shared across the pipeline: sketch
//! parameters carried in MinHash file headers, the packed global document
//! reference used in index records, and the per-item flag alphabet.

use anyhow::{bail, Result};
use std::fmt;

/// Number of items accumulated per sector block in a MinHash file.
///
/// The on-disk format commits to this value; readers reject files written
/// with any other sector size.
pub const SECTOR_SIZE: usize = 512;

/// Magic bytes at the start of every MinHash file.
pub const MINHASH_MAGIC: &[u8; 8] = b"DoubriH4";

/// Magic bytes at the start of every index file.
pub const INDEX_MAGIC: &[u8; 8] = b"DoubriI4";

/// Largest item index representable in an index record (48 bits).
pub const MAX_ITEM_INDEX: u64 = (1 << 48) - 1;

/// Flag byte for an item not known to duplicate any earlier item.
pub const FLAG_ACTIVE: u8 = b' ';

/// Flag byte for a committed duplicate. Terminal: never cleared.
pub const FLAG_DUPLICATE: u8 = b'D';

/// Transient flag for a duplicate detected in the band currently being
/// processed. Promoted to [`FLAG_DUPLICATE`] at end of band; never on disk.
pub const FLAG_PENDING: u8 = b'd';

/// Global document reference for cross-group deduplication.
///
/// Encodes the owning group and the item's position in that group's shard
/// concatenation in a single 64-bit value.
/// Format: `(group << 48) | item`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocRef {
    /// The group that produced the item.
    pub group: u16,
    /// Item index within the group (48 bits).
    pub item: u64,
}

impl DocRef {
    /// Create a new document reference.
    ///
    /// Fails when `item` does not fit in 48 bits.
    pub fn new(group: u16, item: u64) -> Result<Self> {
        if item > MAX_ITEM_INDEX {
            bail!("item index is out of range: {}", item);
        }
        Ok(Self { group, item })
    }

    /// Encode as a 64-bit integer for storage and comparison.
    /// Format: `(group << 48) | item`.
    pub fn to_u64(self) -> u64 {
        ((self.group as u64) << 48) | self.item
    }

    /// Decode from a 64-bit integer.
    pub fn from_u64(value: u64) -> Self {
        Self {
            group: ((value >> 48) & 0xFFFF) as u16,
            item: value & MAX_ITEM_INDEX,
        }
    }

    /// Encode as big-endian bytes, the index record representation.
    ///
    /// Big-endian keeps byte-wise record comparison equal to numeric
    /// `(group, item)` ordering.
    pub fn to_bytes(self) -> [u8; 8] {
        self.to_u64().to_be_bytes()
    }

    /// Decode from big-endian bytes.
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self::from_u64(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}:{}", self.group, self.item)
    }
}

/// Sketch parameters shared by every shard of a group.
///
/// These are carried in the MinHash file header and must agree across all
/// shards deduplicated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SketchParams {
    /// Bytes per stored hash value (4 or 8).
    pub bytes_per_hash: u32,
    /// Hash values per bucket (the band width `H`).
    pub num_hash_values: u32,
    /// First band number.
    pub begin: u32,
    /// One past the last band number.
    pub end: u32,
}

impl SketchParams {
    /// Number of bands stored per item.
    pub fn num_bands(&self) -> u32 {
        self.end - self.begin
    }

    /// Bytes occupied by one bucket (`H · bytes_per_hash`).
    pub fn bytes_per_bucket(&self) -> usize {
        self.bytes_per_hash as usize * self.num_hash_values as usize
    }

    /// Hash values stored per item across all bands.
    pub fn hashes_per_item(&self) -> usize {
        self.num_bands() as usize * self.num_hash_values as usize
    }

    /// Bytes occupied by one item across all bands.
    pub fn bytes_per_item(&self) -> usize {
        self.num_bands() as usize * self.bytes_per_bucket()
    }

    /// Check the parameters for values the format cannot represent.
    pub fn validate(&self) -> Result<()> {
        if self.bytes_per_hash != 4 && self.bytes_per_hash != 8 {
            bail!("unsupported bytes_per_hash: {}", self.bytes_per_hash);
        }
        if self.num_hash_values == 0 {
            bail!("num_hash_values must be positive");
        }
        if self.begin >= self.end {
            bail!(
                "empty band range: begin {} is not below end {}",
                self.begin,
                self.end
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_ref_round_trip() {
        let doc = DocRef::new(513, 0x0000_7FFF_FFFF_FFFF).unwrap();
        assert_eq!(DocRef::from_u64(doc.to_u64()), doc);
        assert_eq!(DocRef::from_bytes(doc.to_bytes()), doc);
    }

    #[test]
    fn test_doc_ref_rejects_wide_item() {
        assert!(DocRef::new(0, 1 << 48).is_err());
        assert!(DocRef::new(0, MAX_ITEM_INDEX).is_ok());
    }

    #[test]
    fn test_doc_ref_byte_order_matches_numeric_order() {
        let a = DocRef::new(1, 100).unwrap();
        let b = DocRef::new(1, 101).unwrap();
        let c = DocRef::new(2, 0).unwrap();
        assert!(a.to_bytes() < b.to_bytes());
        assert!(b.to_bytes() < c.to_bytes());
    }

    #[test]
    fn test_params_validation() {
        let good = SketchParams {
            bytes_per_hash: 4,
            num_hash_values: 20,
            begin: 0,
            end: 40,
        };
        assert!(good.validate().is_ok());
        assert_eq!(good.num_bands(), 40);
        assert_eq!(good.bytes_per_bucket(), 80);
        assert_eq!(good.bytes_per_item(), 3200);

        let bad = SketchParams {
            bytes_per_hash: 2,
            ..good
        };
        assert!(bad.validate().is_err());

        let empty = SketchParams {
            begin: 3,
            end: 3,
            ..good
        };
        assert!(empty.validate().is_err());
    }
}
