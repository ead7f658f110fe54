//! # Doubri
//!
//! Near-duplicate detection over large JSON-Lines corpora with MinHash and
//! banded locality-sensitive hashing.
//!
//! The pipeline runs in four stages, each with a thin binary front end:
//!
//! 1. **Sketch** ([`sketch`]): JSONL shard → MinHash file (`.mh`), one row
//!    of per-band buckets per document.
//! 2. **Dedup** ([`dedup`]): all shards of a group → flag file (`.dup`),
//!    source manifest (`.src`), and one sorted index (`.idx.NNNNN`) per
//!    band. Within a group, the earliest item of every colliding bucket
//!    stays active.
//! 3. **Merge** ([`merge`]): per-group indices of independent runs → one
//!    merged index per band, detecting duplicates across groups.
//! 4. **Apply** ([`apply`]): flag file + JSONL shard → the active
//!    documents only.

pub mod apply;
pub mod dedup;
pub mod features;
pub mod flags;
pub mod hash;
pub mod index_file;
pub mod logging;
pub mod manifest;
pub mod merge;
pub mod minhash_file;
pub mod model;
pub mod sketch;

// Re-export main types for convenience
pub use dedup::{DedupOptions, GroupDeduper};
pub use flags::FlagStore;
pub use hash::{HashBackend, MinHasher};
pub use index_file::{IndexReader, IndexWriter};
pub use manifest::SourceManifest;
pub use merge::{merge_band, merge_indices};
pub use minhash_file::{MinHashReader, MinHashWriter};
pub use model::{DocRef, SketchParams};
pub use sketch::{sketch_stream, SketchOptions};
