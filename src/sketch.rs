//! # Sketcher
//!
//! Streams a JSONL corpus into a MinHash file: one row of
//! `num_bands · H` minima per document, computed over the document's
//! character n-gram set with the configured hash backend.

use crate::features::{char_ngrams, document_text};
use crate::hash::{HashBackend, MinHasher};
use crate::minhash_file::MinHashWriter;
use crate::model::SketchParams;
use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, info};

/// Sketcher configuration, mirroring the command-line surface.
#[derive(Debug, Clone)]
pub struct SketchOptions {
    /// N-gram length in characters.
    pub ngram: usize,
    /// Hash values per bucket (the band width `H`).
    pub num_hash_values: u32,
    /// First band number.
    pub begin: u32,
    /// One past the last band number.
    pub end: u32,
    /// Name of the JSON field holding the document text.
    pub text_field: String,
    /// Hash family to sketch with.
    pub backend: HashBackend,
}

impl Default for SketchOptions {
    fn default() -> Self {
        Self {
            ngram: 5,
            num_hash_values: 20,
            begin: 0,
            end: 40,
            text_field: "text".to_string(),
            backend: HashBackend::Murmur3,
        }
    }
}

impl SketchOptions {
    /// The file-format parameters these options produce.
    pub fn params(&self) -> SketchParams {
        SketchParams {
            bytes_per_hash: self.backend.hasher().bytes_per_hash(),
            num_hash_values: self.num_hash_values,
            begin: self.begin,
            end: self.end,
        }
    }
}

/// Compute one item's flat MinHash row into `row`.
///
/// Slot `(band - begin) · H + j` holds the minimum of
/// `hash(feature, band · H + j)` over all features. An empty feature set
/// fills the row with the backend's maximum hash value, so featureless
/// items never collide with real ones.
pub fn compute_row(
    hasher: &dyn MinHasher,
    features: &FxHashSet<&str>,
    params: &SketchParams,
    row: &mut [u64],
) {
    debug_assert_eq!(row.len(), params.hashes_per_item());
    if features.is_empty() {
        row.fill(hasher.max_hash());
        return;
    }

    let h = params.num_hash_values;
    for band in params.begin..params.end {
        for j in 0..h {
            let seed = band * h + j;
            let slot = ((band - params.begin) * h + j) as usize;
            row[slot] = features
                .iter()
                .map(|f| hasher.hash(f.as_bytes(), seed))
                .min()
                .expect("non-empty feature set");
        }
    }
}

/// Sketch a JSONL stream into the MinHash file at `output`.
///
/// Returns the number of items written. A document whose text field is
/// missing, not a string, or shorter than `ngram` characters contributes
/// an empty feature set.
pub fn sketch_stream<R: BufRead>(input: R, output: &Path, options: &SketchOptions) -> Result<u64> {
    let hasher = options.backend.hasher();
    let params = options.params();
    let mut writer = MinHashWriter::create(output, params)?;
    let mut row = vec![0u64; params.hashes_per_item()];

    info!(
        output = %output.display(),
        backend = %options.backend,
        ngram = options.ngram,
        num_hash_values = params.num_hash_values,
        begin = params.begin,
        end = params.end,
        "sketching"
    );

    for (lineno, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read input line {}", lineno + 1))?;
        let doc: serde_json::Value = serde_json::from_str(&line)
            .with_context(|| format!("invalid JSON at input line {}", lineno + 1))?;

        let text = document_text(&doc, &options.text_field).unwrap_or("");
        let features = if text.chars().count() < options.ngram {
            FxHashSet::default()
        } else {
            char_ngrams(text, options.ngram)
        };
        if features.is_empty() {
            debug!(line = lineno + 1, "no features; storing sentinel row");
        }

        compute_row(hasher.as_ref(), &features, &params, &mut row);
        writer.put(&row)?;
    }

    let num_items = writer.num_items();
    writer.close()?;
    info!(num_items, "sketch complete");
    Ok(num_items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minhash_file::MinHashReader;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn options() -> SketchOptions {
        SketchOptions {
            ngram: 5,
            num_hash_values: 2,
            begin: 0,
            end: 1,
            ..SketchOptions::default()
        }
    }

    fn column(path: &Path, band: u32) -> Vec<u8> {
        let mut reader = MinHashReader::open(path).unwrap();
        let mut out = vec![0u8; reader.column_len()];
        reader.read_bucket_column(band, &mut out).unwrap();
        out
    }

    #[test]
    fn test_identical_texts_share_buckets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shard.mh");
        let input = concat!(
            "{\"text\": \"hello world\"}\n",
            "{\"text\": \"hello world\"}\n",
            "{\"text\": \"completely different content here\"}\n",
        );
        let n = sketch_stream(Cursor::new(input), &path, &options()).unwrap();
        assert_eq!(n, 3);

        let col = column(&path, 0);
        let bucket = col.len() / 3;
        assert_eq!(col[0..bucket], col[bucket..2 * bucket]);
        assert_ne!(col[0..bucket], col[2 * bucket..3 * bucket]);
    }

    #[test]
    fn test_featureless_documents_get_sentinel_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shard.mh");
        // Empty text, short text, and a missing field all sketch alike.
        let input = concat!(
            "{\"text\": \"\"}\n",
            "{\"text\": \"abc\"}\n",
            "{\"other\": \"hello world\"}\n",
        );
        sketch_stream(Cursor::new(input), &path, &options()).unwrap();

        let col = column(&path, 0);
        assert!(col.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_row_respects_band_seed_layout() {
        let params = SketchParams {
            bytes_per_hash: 4,
            num_hash_values: 2,
            begin: 3,
            end: 5,
        };
        let hasher = HashBackend::Murmur3.hasher();
        let text = "a longer piece of text for sketching";
        let features = char_ngrams(text, 5);
        let mut row = vec![0u64; params.hashes_per_item()];
        compute_row(hasher.as_ref(), &features, &params, &mut row);

        // Slot 0 belongs to band 3, seed 3·2 + 0 = 6.
        let expected = features
            .iter()
            .map(|f| hasher.hash(f.as_bytes(), 6))
            .min()
            .unwrap();
        assert_eq!(row[0], expected);

        // Last slot belongs to band 4, seed 4·2 + 1 = 9.
        let expected = features
            .iter()
            .map(|f| hasher.hash(f.as_bytes(), 9))
            .min()
            .unwrap();
        assert_eq!(row[3], expected);
    }

    #[test]
    fn test_xxh3_backend_writes_eight_byte_hashes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wide.mh");
        let opts = SketchOptions {
            backend: HashBackend::Xxh3,
            ..options()
        };
        sketch_stream(Cursor::new("{\"text\": \"hello world\"}\n"), &path, &opts).unwrap();

        let reader = MinHashReader::open(&path).unwrap();
        assert_eq!(reader.params().bytes_per_hash, 8);
    }

    #[test]
    fn test_invalid_json_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.mh");
        let err = sketch_stream(Cursor::new("not json\n"), &path, &options());
        assert!(err.is_err());
    }

    /// Any pure function of `(feature, seed)` can back the sketcher.
    struct FoldHasher;

    impl crate::hash::MinHasher for FoldHasher {
        fn bytes_per_hash(&self) -> u32 {
            4
        }

        fn hash(&self, feature: &[u8], seed: u32) -> u64 {
            let mut acc = 0x811c_9dc5u32 ^ seed;
            for &b in feature {
                acc = acc.wrapping_mul(0x0100_0193) ^ b as u32;
            }
            acc as u64
        }
    }

    #[test]
    fn test_pluggable_hasher_drives_the_row() {
        let params = SketchParams {
            bytes_per_hash: 4,
            num_hash_values: 2,
            begin: 0,
            end: 1,
        };
        let hasher = FoldHasher;
        let features = char_ngrams("equal inputs, equal sketches", 5);

        let mut a = vec![0u64; params.hashes_per_item()];
        let mut b = vec![0u64; params.hashes_per_item()];
        compute_row(&hasher, &features, &params, &mut a);
        compute_row(&hasher, &features, &params, &mut b);
        assert_eq!(a, b);

        let expected = features
            .iter()
            .map(|f| hasher.hash(f.as_bytes(), 0))
            .min()
            .unwrap();
        assert_eq!(a[0], expected);
        assert!(a.iter().all(|&v| v <= u32::MAX as u64));
    }
}
