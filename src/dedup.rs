//! # Group Deduper
//!
//! Deduplicates all shards of a group, one band at a time: load that
//! band's bucket column from every shard in parallel into one contiguous
//! buffer, sort the item indices by `(bucket bytes, item index)`, mark
//! every non-first member of each equal-bucket run, write the band's
//! sorted index, then commit the marks. The item-index tie-break keeps the
//! same representative alive across bands, so the final flag vector does
//! not depend on band order or sort parallelism.

use crate::flags::FlagStore;
use crate::index_file::IndexWriter;
use crate::manifest::{ManifestEntry, SourceManifest};
use crate::minhash_file::MinHashReader;
use crate::model::{DocRef, SketchParams, MAX_ITEM_INDEX};
use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, trace};

/// One shard of a group, with its position in the concatenated numbering.
#[derive(Debug, Clone)]
pub struct GroupShard {
    /// Path of the shard's MinHash file.
    pub path: PathBuf,
    /// Items in the shard.
    pub num_items: u64,
    /// Index of the shard's first item in the group numbering.
    pub start_index: u64,
}

/// Options for a group dedup run.
#[derive(Debug, Clone)]
pub struct DedupOptions {
    /// Group id recorded in index entries and the manifest.
    pub group: u16,
    /// Whether to write per-band index files.
    pub save_index: bool,
}

/// Per-band outcome, logged and returned for inspection.
#[derive(Debug, Clone, Copy)]
pub struct BandStats {
    /// Band number.
    pub band: u32,
    /// Active items when the band started.
    pub num_active_before: u64,
    /// Duplicates detected by this band.
    pub num_detected: u64,
    /// Active items after promotion.
    pub num_active_after: u64,
}

/// The group dedup engine.
///
/// Owns the big bucket buffer and the flag vector for the whole run; the
/// per-band sort sees the buffer only as a borrowed slice.
pub struct GroupDeduper {
    shards: Vec<GroupShard>,
    params: SketchParams,
    num_items: u64,
    flags: FlagStore,
}

impl GroupDeduper {
    /// Open all shard headers, enforce parameter consistency, and size the
    /// run.
    ///
    /// `memory_limit` bounds the bucket buffer plus item array; when
    /// `None`, the system's available memory is probed where possible.
    /// Groups that do not fit are rejected before anything is allocated.
    pub fn open(paths: &[PathBuf], memory_limit: Option<u64>) -> Result<Self> {
        if paths.is_empty() {
            bail!("no input shards");
        }

        let mut shards = Vec::with_capacity(paths.len());
        let mut params: Option<SketchParams> = None;
        let mut num_items = 0u64;

        info!(num_files = paths.len(), "opening hash files");
        for path in paths {
            let reader = MinHashReader::open(path)?;
            match params {
                None => {
                    let p = reader.params();
                    info!(
                        bytes_per_hash = p.bytes_per_hash,
                        num_hash_values = p.num_hash_values,
                        begin = p.begin,
                        end = p.end,
                        "group parameters"
                    );
                    params = Some(p);
                }
                Some(p) if p != reader.params() => {
                    bail!(
                        "inconsistent parameters in {}: {:?}, expected {:?}",
                        path.display(),
                        reader.params(),
                        p
                    );
                }
                Some(_) => {}
            }
            shards.push(GroupShard {
                path: path.clone(),
                num_items: reader.num_items(),
                start_index: num_items,
            });
            num_items += reader.num_items();
        }
        let params = params.expect("at least one shard");

        if num_items > MAX_ITEM_INDEX {
            bail!("too many items in the group: {}", num_items);
        }

        let required = num_items * (params.bytes_per_bucket() as u64 + 8);
        if let Some(limit) = memory_limit.or_else(available_memory) {
            if required > limit {
                bail!(
                    "group needs {} bytes for buckets but only {} are available",
                    required,
                    limit
                );
            }
        }
        info!(num_items, bytes = required, "group sized");

        Ok(Self {
            shards,
            params,
            num_items,
            flags: FlagStore::new(num_items as usize),
        })
    }

    /// The shared shard parameters.
    pub fn params(&self) -> SketchParams {
        self.params
    }

    /// Total items across all shards.
    pub fn num_items(&self) -> u64 {
        self.num_items
    }

    /// The shards in group order.
    pub fn shards(&self) -> &[GroupShard] {
        &self.shards
    }

    /// The current flag vector.
    pub fn flags(&self) -> &FlagStore {
        &self.flags
    }

    /// The source manifest describing this group.
    pub fn manifest(&self, group: u16) -> SourceManifest {
        SourceManifest {
            group,
            entries: self
                .shards
                .iter()
                .map(|s| ManifestEntry {
                    num_items: s.num_items,
                    path: s.path.display().to_string(),
                })
                .collect(),
        }
    }

    /// Deduplicate every band, writing one index per band under `basename`.
    pub fn run(&mut self, basename: &Path, options: &DedupOptions) -> Result<Vec<BandStats>> {
        let started = Instant::now();
        let num_active_before = self.flags.count_active() as u64;

        let mut buffer = vec![0u8; self.num_items as usize * self.params.bytes_per_bucket()];
        let mut stats = Vec::with_capacity(self.params.num_bands() as usize);
        for band in self.params.begin..self.params.end {
            info!(band, "deduplicating");
            stats.push(self.deduplicate_band(&mut buffer, basename, band, options)?);
        }

        let num_active_after = self.flags.count_active() as u64;
        info!(
            num_items = self.num_items,
            num_active_before,
            num_active_after,
            active_ratio = ratio(num_active_after, self.num_items),
            elapsed_s = started.elapsed().as_secs_f64(),
            "group deduplication complete"
        );
        Ok(stats)
    }

    /// Process one band: load, sort, sweep, write index, promote.
    fn deduplicate_band(
        &mut self,
        buffer: &mut [u8],
        basename: &Path,
        band: u32,
        options: &DedupOptions,
    ) -> Result<BandStats> {
        let started = Instant::now();
        let bytes_per_bucket = self.params.bytes_per_bucket();

        // Load this band's bucket column from every shard, in parallel,
        // into the shard's disjoint range of the buffer.
        let read_started = Instant::now();
        let mut slices = Vec::with_capacity(self.shards.len());
        let mut rest = &mut buffer[..];
        for shard in &self.shards {
            let (head, tail) = rest.split_at_mut(shard.num_items as usize * bytes_per_bucket);
            slices.push(head);
            rest = tail;
        }
        self.shards
            .par_iter()
            .zip(slices)
            .try_for_each(|(shard, slice)| -> Result<()> {
                trace!(band, num_items = shard.num_items, path = %shard.path.display(), "reading buckets");
                let mut reader = MinHashReader::open(&shard.path)?;
                if reader.num_items() != shard.num_items {
                    bail!(
                        "shard changed since the group was opened: {}",
                        shard.path.display()
                    );
                }
                reader.read_bucket_column(band, slice)
            })?;
        trace!(band, elapsed_s = read_started.elapsed().as_secs_f64(), "read complete");

        // Sort item indices by (bucket bytes, item index). The tie-break
        // makes the order a strict total order, so the result does not
        // depend on the parallel sort's partitioning.
        let sort_started = Instant::now();
        let buffer = &buffer[..];
        let bucket = |i: u64| -> &[u8] {
            let at = i as usize * bytes_per_bucket;
            &buffer[at..at + bytes_per_bucket]
        };
        let mut order: Vec<u64> = (0..self.num_items).collect();
        order.par_sort_unstable_by(|&a, &b| bucket(a).cmp(bucket(b)).then(a.cmp(&b)));
        trace!(band, elapsed_s = sort_started.elapsed().as_secs_f64(), "sort complete");

        let num_active_before = self.flags.count_active() as u64;

        // Sweep equal-bucket runs; the first (lowest-index) member of each
        // run survives, the rest become pending duplicates.
        let mut i = 0;
        while i < order.len() {
            let run_bucket = bucket(order[i]);
            let mut j = i + 1;
            while j < order.len() && bucket(order[j]) == run_bucket {
                self.flags.mark_pending(order[j] as usize);
                j += 1;
            }
            i = j;
        }

        // Items that became duplicates in this band still belong in this
        // band's index; only items already committed by an earlier band
        // are omitted.
        if options.save_index {
            let mut writer =
                IndexWriter::create(basename, band, bytes_per_bucket, self.num_items)?;
            info!(band, path = %writer.path().display(), "saving the index");
            for &item in &order {
                if !self.flags.is_duplicate(item as usize) {
                    writer.write_entry(bucket(item), DocRef::new(options.group, item)?)?;
                }
            }
            writer.close()?;
        }

        let num_detected = self.flags.promote_pending() as u64;
        let num_active_after = self.flags.count_active() as u64;

        info!(
            band,
            num_active_before,
            num_detected,
            num_active_after,
            active_ratio = ratio(num_active_after, self.num_items),
            detection_ratio = ratio(num_detected, self.num_items),
            elapsed_s = started.elapsed().as_secs_f64(),
            "band complete"
        );
        Ok(BandStats {
            band,
            num_active_before,
            num_detected,
            num_active_after,
        })
    }
}

/// Best-effort probe of the memory available to this process, in bytes.
///
/// Reads `MemAvailable` from `/proc/meminfo`; returns `None` on platforms
/// without it, in which case the memory-budget check is skipped.
pub fn available_memory() -> Option<u64> {
    let text = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb = rest.trim().split_whitespace().next()?.parse::<u64>().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

/// Read newline-delimited shard paths, as the deduper accepts on stdin.
pub fn read_shard_list<R: std::io::BufRead>(input: R) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for line in input.lines() {
        let line = line.context("failed to read the shard list")?;
        let line = line.trim();
        if !line.is_empty() {
            paths.push(PathBuf::from(line));
        }
    }
    Ok(paths)
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
