//! # Flag Applicator
//!
//! Filters a JSONL stream against a slice of a group flag file: lines
//! whose flag byte is `' '` pass through, everything else is dropped. The
//! caller locates the slice with the source manifest, or uses the whole
//! file when the stream is known to align 1:1.

use crate::model::FLAG_ACTIVE;
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Outcome of one apply run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    /// Lines consumed from the input.
    pub num_lines: u64,
    /// Lines passed through as active.
    pub num_active: u64,
}

/// Byte length of the flag file, which equals its item count.
pub fn flag_file_len(path: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("failed to stat flag file: {}", path.display()))?;
    Ok(metadata.len())
}

/// Read `[offset, offset + size)` from the flag file.
pub fn read_flag_range(path: &Path, offset: u64, size: u64) -> Result<Vec<u8>> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open flag file: {}", path.display()))?;
    file.seek(SeekFrom::Start(offset))
        .with_context(|| format!("failed to seek to {} in {}", offset, path.display()))?;
    let mut flags = vec![0u8; size as usize];
    file.read_exact(&mut flags).with_context(|| {
        format!(
            "failed to read {} bytes at offset {} from {}",
            size,
            offset,
            path.display()
        )
    })?;
    Ok(flags)
}

/// Stream `input` through `output`, keeping lines whose flag is active.
///
/// The stream must contain exactly `flags.len()` lines; shorter or longer
/// input is a fatal alignment error (output already emitted stands).
pub fn apply_flags<R: BufRead, W: Write>(flags: &[u8], input: R, mut output: W) -> Result<ApplyStats> {
    let size = flags.len() as u64;
    let mut num_lines = 0u64;
    let mut num_active = 0u64;

    for line in input.lines() {
        let line = line.context("failed to read an input line")?;
        if num_lines >= size {
            bail!("input is longer than {} lines", size);
        }
        if flags[num_lines as usize] == FLAG_ACTIVE {
            writeln!(output, "{}", line).context("failed to write an output line")?;
            num_active += 1;
        }
        num_lines += 1;
    }

    if num_lines < size {
        bail!("input is shorter than {} lines: got {}", size, num_lines);
    }
    Ok(ApplyStats {
        num_lines,
        num_active,
    })
}
