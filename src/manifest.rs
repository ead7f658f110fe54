//! # Source Manifest
//!
//! The `.src` file a group dedup run writes next to its flag file: the
//! group id and, in order, every shard with its item count. The applicator
//! uses it to locate one shard's byte range inside the group flag file.

use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// One shard line of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Items the shard contributed.
    pub num_items: u64,
    /// Shard path as recorded by the dedup run.
    pub path: String,
}

/// The parsed `.src` manifest of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceManifest {
    /// Group id from the `#G` line.
    pub group: u16,
    /// Shards in group order.
    pub entries: Vec<ManifestEntry>,
}

impl SourceManifest {
    /// Total item count across all shards.
    pub fn total_items(&self) -> u64 {
        self.entries.iter().map(|e| e.num_items).sum()
    }

    /// Locate the flag range `[offset, offset + size)` of `target`.
    ///
    /// With `strip`, only file names are compared, so a manifest recorded
    /// with full paths still matches a bare target name. A target that
    /// matches more than one entry is an error.
    pub fn locate(&self, target: &str, strip: bool) -> Result<(u64, u64)> {
        let target_key = if strip { file_name(target) } else { target };
        let mut found: Option<(u64, u64)> = None;
        let mut offset = 0u64;
        for entry in &self.entries {
            let key = if strip {
                file_name(&entry.path)
            } else {
                entry.path.as_str()
            };
            if key == target_key {
                if found.is_some() {
                    bail!("target matches more than one source entry: {}", target);
                }
                found = Some((offset, entry.num_items));
            }
            offset += entry.num_items;
        }
        found.with_context(|| format!("target does not exist in the source list: {}", target))
    }

    /// Write the manifest to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = String::new();
        writeln!(out, "#G {}", self.group)?;
        for entry in &self.entries {
            writeln!(out, "{}\t{}", entry.num_items, entry.path)?;
        }
        fs::write(path, out)
            .with_context(|| format!("failed to write source list: {}", path.display()))
    }

    /// Parse the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read source list: {}", path.display()))?;
        let mut lines = text.lines();

        let header = lines
            .next()
            .with_context(|| format!("empty source list: {}", path.display()))?;
        let group = header
            .strip_prefix("#G ")
            .with_context(|| format!("missing #G header in {}", path.display()))?
            .trim()
            .parse::<u16>()
            .with_context(|| format!("invalid group id in {}", path.display()))?;

        let mut entries = Vec::new();
        for (lineno, line) in lines.enumerate() {
            let (count, shard) = line.split_once('\t').with_context(|| {
                format!("no TAB separator at line {} of {}", lineno + 2, path.display())
            })?;
            let num_items = count.parse::<u64>().with_context(|| {
                format!("invalid item count at line {} of {}", lineno + 2, path.display())
            })?;
            entries.push(ManifestEntry {
                num_items,
                path: shard.to_string(),
            });
        }

        Ok(Self { group, entries })
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
