//! # K-way Index Merger
//!
//! Unions per-group index files for one band into a single sorted index
//! for the combined population. A min-heap over the full record bytes
//! (bucket first, then packed `(group, item)`) yields a total order, so
//! the first record popped in any equal-bucket run is the one with the
//! lowest `(group, item)` — the global representative. Every other member
//! of the run is a cross-group duplicate.
//!
//! The merge is single-threaded: the heap is sequential and disk I/O is
//! the bottleneck.

use crate::index_file::{IndexReader, IndexWriter};
use crate::model::DocRef;
use anyhow::{bail, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Outcome of merging one band.
#[derive(Debug, Clone, Copy)]
pub struct MergeStats {
    /// Band number.
    pub band: u32,
    /// Sum of the inputs' total item counts.
    pub num_total_items: u64,
    /// Records emitted to the merged index.
    pub num_emitted: u64,
    /// Cross-group duplicates dropped.
    pub num_duplicates: u64,
}

/// A heap entry: one pending record of one source stream.
///
/// `Ord` is reversed so `BinaryHeap` pops the smallest record first; the
/// source index breaks exact ties deterministically.
struct Pending {
    record: Vec<u8>,
    source: usize,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record && self.source == other.source
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .record
            .cmp(&self.record)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merge one band's indices from `sources` into `{output}.idx.{band:05}`.
///
/// Every dropped duplicate's `(group, item)` reference is passed to
/// `on_duplicate`, in emission order, for downstream flag consolidation.
pub fn merge_band(
    sources: &[impl AsRef<Path>],
    output: &Path,
    band: u32,
    mut on_duplicate: impl FnMut(DocRef),
) -> Result<MergeStats> {
    if sources.is_empty() {
        bail!("no source indices to merge");
    }
    let started = Instant::now();

    let mut readers = Vec::with_capacity(sources.len());
    let mut num_total_items = 0u64;
    let mut bytes_per_bucket = None;
    for source in sources {
        let reader = IndexReader::open(source.as_ref(), band)?;
        match bytes_per_bucket {
            None => bytes_per_bucket = Some(reader.bytes_per_bucket()),
            Some(expected) if expected != reader.bytes_per_bucket() => {
                bail!(
                    "inconsistent bytes_per_bucket across sources: {} has {}, expected {}",
                    source.as_ref().display(),
                    reader.bytes_per_bucket(),
                    expected
                );
            }
            Some(_) => {}
        }
        num_total_items += reader.num_total_items();
        readers.push(reader);
    }
    let bytes_per_bucket = bytes_per_bucket.expect("at least one source");

    let mut writer = IndexWriter::create(output, band, bytes_per_bucket, num_total_items)?;
    info!(band, num_sources = readers.len(), path = %writer.path().display(), "merging indices");

    // Prime the heap with the first record of every stream.
    let mut heap = BinaryHeap::with_capacity(readers.len());
    for (source, reader) in readers.iter_mut().enumerate() {
        let mut record = Vec::new();
        if reader.next_record(&mut record)? {
            heap.push(Pending { record, source });
        }
    }

    let mut num_duplicates = 0u64;
    while let Some(top) = heap.pop() {
        writer.write_record(&top.record)?;
        let bucket = &top.record[..bytes_per_bucket];

        // Everything with the same bucket, wherever it came from, is a
        // duplicate of the record just emitted.
        while heap
            .peek()
            .is_some_and(|next| &next.record[..bytes_per_bucket] == bucket)
        {
            let dup = heap.pop().expect("peeked entry");
            let (_, doc) = IndexReader::split_record(&dup.record);
            on_duplicate(doc);
            num_duplicates += 1;
            refill(&mut readers, &mut heap, dup)?;
        }

        refill(&mut readers, &mut heap, top)?;
    }

    let num_emitted = writer.num_active_items();
    writer.close()?;

    info!(
        band,
        num_total_items,
        num_emitted,
        num_duplicates,
        elapsed_s = started.elapsed().as_secs_f64(),
        "merge complete"
    );
    Ok(MergeStats {
        band,
        num_total_items,
        num_emitted,
        num_duplicates,
    })
}

/// Push the next record of `entry`'s stream, reusing its buffer.
fn refill(
    readers: &mut [IndexReader],
    heap: &mut BinaryHeap<Pending>,
    mut entry: Pending,
) -> Result<()> {
    if readers[entry.source].next_record(&mut entry.record)? {
        heap.push(entry);
    }
    Ok(())
}

/// Merge every band in `[begin, end)`.
pub fn merge_indices(
    sources: &[impl AsRef<Path>],
    output: &Path,
    begin: u32,
    end: u32,
    mut on_duplicate: impl FnMut(u32, DocRef),
) -> Result<Vec<MergeStats>> {
    let mut stats = Vec::with_capacity((end.saturating_sub(begin)) as usize);
    for band in begin..end {
        stats.push(merge_band(sources, output, band, |doc| {
            on_duplicate(band, doc)
        })?);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_file::{IndexReader, IndexWriter};
    use tempfile::tempdir;

    fn write_index(basename: &Path, band: u32, total: u64, entries: &[([u8; 4], u16, u64)]) {
        let mut writer = IndexWriter::create(basename, band, 4, total).unwrap();
        for (bucket, group, item) in entries {
            writer
                .write_entry(bucket, DocRef::new(*group, *item).unwrap())
                .unwrap();
        }
        writer.close().unwrap();
    }

    fn read_all(basename: &Path, band: u32) -> Vec<([u8; 4], DocRef)> {
        let mut reader = IndexReader::open(basename, band).unwrap();
        let mut record = Vec::new();
        let mut out = Vec::new();
        while reader.next_record(&mut record).unwrap() {
            let (bucket, doc) = IndexReader::split_record(&record);
            out.push((bucket.try_into().unwrap(), doc));
        }
        out
    }

    #[test]
    fn test_shared_bucket_keeps_lowest_group_and_item() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("ga");
        let b = dir.path().join("gb");
        write_index(&a, 0, 10, &[([0, 0, 0, 5], 0, 3), ([0, 0, 0, 9], 0, 4)]);
        write_index(&b, 0, 20, &[([0, 0, 0, 5], 1, 0), ([0, 0, 0, 7], 1, 1)]);

        let out = dir.path().join("merged");
        let mut dups = Vec::new();
        let stats = merge_band(&[&a, &b], &out, 0, |doc| dups.push(doc)).unwrap();

        assert_eq!(stats.num_total_items, 30);
        assert_eq!(stats.num_emitted, 3);
        assert_eq!(stats.num_duplicates, 1);
        assert_eq!(dups, vec![DocRef::new(1, 0).unwrap()]);

        let records = read_all(&out, 0);
        assert_eq!(
            records,
            vec![
                ([0, 0, 0, 5], DocRef::new(0, 3).unwrap()),
                ([0, 0, 0, 7], DocRef::new(1, 1).unwrap()),
                ([0, 0, 0, 9], DocRef::new(0, 4).unwrap()),
            ]
        );

        let reader = IndexReader::open(&out, 0).unwrap();
        assert_eq!(reader.num_total_items(), 30);
        assert_eq!(reader.num_active_items(), 3);
    }

    #[test]
    fn test_run_spanning_three_groups() {
        let dir = tempdir().unwrap();
        let bases: Vec<_> = (0..3).map(|g| dir.path().join(format!("g{g}"))).collect();
        // All three groups carry bucket 8; group 1 holds the lowest id.
        write_index(&bases[0], 0, 1, &[([0, 0, 0, 8], 2, 0)]);
        write_index(&bases[1], 0, 1, &[([0, 0, 0, 8], 1, 5)]);
        write_index(&bases[2], 0, 1, &[([0, 0, 0, 8], 2, 1)]);

        let out = dir.path().join("merged");
        let mut dups = Vec::new();
        let stats = merge_band(&bases, &out, 0, |doc| dups.push(doc)).unwrap();

        assert_eq!(stats.num_emitted, 1);
        assert_eq!(stats.num_duplicates, 2);
        assert_eq!(
            read_all(&out, 0),
            vec![([0, 0, 0, 8], DocRef::new(1, 5).unwrap())]
        );
        assert_eq!(
            dups,
            vec![DocRef::new(2, 0).unwrap(), DocRef::new(2, 1).unwrap()]
        );
    }

    #[test]
    fn test_merged_output_is_strictly_sorted() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        write_index(
            &a,
            0,
            3,
            &[([0, 0, 1, 0], 0, 0), ([0, 0, 3, 0], 0, 1), ([0, 0, 5, 0], 0, 2)],
        );
        write_index(
            &b,
            0,
            3,
            &[([0, 0, 2, 0], 1, 0), ([0, 0, 3, 0], 1, 1), ([0, 0, 6, 0], 1, 2)],
        );

        let out = dir.path().join("merged");
        merge_band(&[&a, &b], &out, 0, |_| {}).unwrap();

        let records = read_all(&out, 0);
        assert_eq!(records.len(), 5);
        for pair in records.windows(2) {
            assert!(
                (pair[0].0, pair[0].1.to_u64()) < (pair[1].0, pair[1].1.to_u64()),
                "merged records must be strictly increasing"
            );
        }
    }

    #[test]
    fn test_single_source_copies_through() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("only");
        write_index(&a, 0, 2, &[([0, 0, 0, 1], 0, 0), ([0, 0, 0, 2], 0, 1)]);

        let out = dir.path().join("merged");
        let stats = merge_band(&[&a], &out, 0, |_| {}).unwrap();
        assert_eq!(stats.num_emitted, 2);
        assert_eq!(stats.num_duplicates, 0);
        assert_eq!(read_all(&out, 0), read_all(&a, 0));
    }

    #[test]
    fn test_empty_sources_produce_empty_index() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("ea");
        let b = dir.path().join("eb");
        write_index(&a, 0, 0, &[]);
        write_index(&b, 0, 0, &[]);

        let out = dir.path().join("merged");
        let stats = merge_band(&[&a, &b], &out, 0, |_| {}).unwrap();
        assert_eq!(stats.num_emitted, 0);
        assert_eq!(stats.num_duplicates, 0);
        assert!(read_all(&out, 0).is_empty());
    }

    #[test]
    fn test_merge_indices_covers_every_band() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("ma");
        write_index(&a, 0, 1, &[([0, 0, 0, 1], 0, 0)]);
        write_index(&a, 1, 1, &[([0, 0, 0, 2], 0, 0)]);

        let out = dir.path().join("merged");
        let stats = merge_indices(&[&a], &out, 0, 2, |_, _| {}).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(read_all(&out, 0).len(), 1);
        assert_eq!(read_all(&out, 1).len(), 1);
    }
}
