#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};

use doubri_rs::dedup::{DedupOptions, GroupDeduper};
use doubri_rs::sketch::{sketch_stream, SketchOptions};

/// The parameters the end-to-end scenarios fix: 5-grams, H = 2, a single
/// band, 4-byte hashes.
pub fn scenario_options() -> SketchOptions {
    SketchOptions {
        ngram: 5,
        num_hash_values: 2,
        begin: 0,
        end: 1,
        ..SketchOptions::default()
    }
}

/// Render texts as a JSONL corpus with a `text` field per line.
pub fn jsonl(texts: &[&str]) -> String {
    texts
        .iter()
        .map(|t| format!("{}\n", serde_json::json!({ "text": t })))
        .collect()
}

/// Sketch `texts` into a MinHash file at `path`.
pub fn sketch_texts(path: &Path, texts: &[&str], options: &SketchOptions) -> u64 {
    sketch_stream(Cursor::new(jsonl(texts)), path, options).expect("sketching failed")
}

/// Sketch one shard per slice of `shards` and deduplicate them as one
/// group, writing outputs under `dir/basename`.
pub fn dedup_shards(
    dir: &Path,
    basename: &str,
    shards: &[&[&str]],
    group: u16,
    options: &SketchOptions,
) -> (GroupDeduper, PathBuf) {
    let mut paths = Vec::new();
    for (k, texts) in shards.iter().enumerate() {
        let path = dir.join(format!("{basename}-shard{k}.mh"));
        sketch_texts(&path, texts, options);
        paths.push(path);
    }

    let base = dir.join(basename);
    let mut deduper = GroupDeduper::open(&paths, None).expect("group open failed");
    deduper
        .run(
            &base,
            &DedupOptions {
                group,
                save_index: true,
            },
        )
        .expect("dedup run failed");
    (deduper, base)
}
