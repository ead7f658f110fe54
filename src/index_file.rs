//! # Index File Codec
//!
//! Writer and reader for `DoubriI4` files: the sorted record stream one
//! band of one group produces, and the input/output of the cross-group
//! merger. A record is the bucket bytes followed by the big-endian packed
//! `(group, item)` id, so records sort correctly as raw byte strings.

use crate::model::{DocRef, INDEX_MAGIC};
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Byte length of the file header.
pub const HEADER_LEN: u64 = 32;

/// Offset of the `num_active_items` header field, patched on close.
const NUM_ACTIVE_OFFSET: u64 = 24;

/// Path of the index file for `band` under `basename`:
/// `{basename}.idx.{band:05}`.
pub fn index_path(basename: &Path, band: u32) -> PathBuf {
    let mut name = basename.as_os_str().to_os_string();
    name.push(format!(".idx.{:05}", band));
    PathBuf::from(name)
}

/// Streaming writer for index files.
///
/// Entries must be appended in ascending record order; the writer patches
/// `num_active_items` into the header on close.
pub struct IndexWriter {
    file: BufWriter<File>,
    path: PathBuf,
    bucket_number: u32,
    bytes_per_bucket: usize,
    num_active_items: u64,
}

impl IndexWriter {
    /// Create the index file for `band` under `basename`.
    pub fn create(
        basename: &Path,
        band: u32,
        bytes_per_bucket: usize,
        num_total_items: u64,
    ) -> Result<Self> {
        let path = index_path(basename, band);
        let file = File::create(&path)
            .with_context(|| format!("failed to create index file: {}", path.display()))?;
        let mut file = BufWriter::new(file);

        file.write_all(INDEX_MAGIC)?;
        file.write_all(&band.to_le_bytes())?;
        file.write_all(&(bytes_per_bucket as u32).to_le_bytes())?;
        file.write_all(&num_total_items.to_le_bytes())?;
        file.write_all(&0u64.to_le_bytes())?; // num_active_items, patched on close

        Ok(Self {
            file,
            path,
            bucket_number: band,
            bytes_per_bucket,
            num_active_items: 0,
        })
    }

    /// The path this writer is producing.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry: bucket bytes plus the packed `(group, item)` id.
    pub fn write_entry(&mut self, bucket: &[u8], doc: DocRef) -> Result<()> {
        if bucket.len() != self.bytes_per_bucket {
            bail!(
                "bucket is {} bytes, expected {} in {}",
                bucket.len(),
                self.bytes_per_bucket,
                self.path.display()
            );
        }
        self.file.write_all(bucket)?;
        self.file.write_all(&doc.to_bytes())?;
        self.num_active_items += 1;
        Ok(())
    }

    /// Append one raw record (bucket bytes + 8-byte id), as produced by an
    /// [`IndexReader`].
    pub fn write_record(&mut self, record: &[u8]) -> Result<()> {
        if record.len() != self.bytes_per_bucket + 8 {
            bail!(
                "record is {} bytes, expected {} in {}",
                record.len(),
                self.bytes_per_bucket + 8,
                self.path.display()
            );
        }
        self.file.write_all(record)?;
        self.num_active_items += 1;
        Ok(())
    }

    /// Entries written so far.
    pub fn num_active_items(&self) -> u64 {
        self.num_active_items
    }

    /// Patch the final entry count into the header and flush.
    pub fn close(mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(NUM_ACTIVE_OFFSET))?;
        self.file.write_all(&self.num_active_items.to_le_bytes())?;
        self.file
            .flush()
            .with_context(|| format!("failed to finalize {}", self.path.display()))?;
        Ok(())
    }
}

/// Sequential reader for index files.
pub struct IndexReader {
    file: BufReader<File>,
    path: PathBuf,
    bucket_number: u32,
    bytes_per_bucket: usize,
    num_total_items: u64,
    num_active_items: u64,
    remaining: u64,
}

impl IndexReader {
    /// Open the index file for `band` under `basename` and validate its
    /// header.
    pub fn open(basename: &Path, band: u32) -> Result<Self> {
        let path = index_path(basename, band);
        let file = File::open(&path)
            .with_context(|| format!("failed to open index file: {}", path.display()))?;
        let mut file = BufReader::new(file);

        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header)
            .with_context(|| format!("failed to read the header of {}", path.display()))?;
        if &header[0..8] != INDEX_MAGIC {
            bail!("invalid magic in index file: {}", path.display());
        }

        let bucket_number = u32::from_le_bytes(header[8..12].try_into().unwrap());
        let bytes_per_bucket = u32::from_le_bytes(header[12..16].try_into().unwrap()) as usize;
        let num_total_items = u64::from_le_bytes(header[16..24].try_into().unwrap());
        let num_active_items = u64::from_le_bytes(header[24..32].try_into().unwrap());

        if bucket_number != band {
            bail!(
                "index {} is for band {}, expected {}",
                path.display(),
                bucket_number,
                band
            );
        }
        if bytes_per_bucket == 0 {
            bail!("zero bytes_per_bucket in {}", path.display());
        }

        Ok(Self {
            file,
            path,
            bucket_number,
            bytes_per_bucket,
            num_total_items,
            num_active_items,
            remaining: num_active_items,
        })
    }

    /// The band this index covers.
    pub fn bucket_number(&self) -> u32 {
        self.bucket_number
    }

    /// Bytes per bucket in every record.
    pub fn bytes_per_bucket(&self) -> usize {
        self.bytes_per_bucket
    }

    /// Total items (including duplicates) the contributors represented.
    pub fn num_total_items(&self) -> u64 {
        self.num_total_items
    }

    /// Entries stored in this file.
    pub fn num_active_items(&self) -> u64 {
        self.num_active_items
    }

    /// Byte length of one record (bucket + 8-byte id).
    pub fn record_len(&self) -> usize {
        self.bytes_per_bucket + 8
    }

    /// Read the next record into `record`, resizing it as needed.
    ///
    /// Returns `false` once all `num_active_items` records were consumed.
    /// Hitting EOF earlier is a format error.
    pub fn next_record(&mut self, record: &mut Vec<u8>) -> Result<bool> {
        if self.remaining == 0 {
            return Ok(false);
        }
        record.resize(self.record_len(), 0);
        self.file.read_exact(record).with_context(|| {
            format!(
                "premature EOF in {} ({} records left)",
                self.path.display(),
                self.remaining
            )
        })?;
        self.remaining -= 1;
        Ok(true)
    }

    /// Split a record into its bucket bytes and document reference.
    pub fn split_record(record: &[u8]) -> (&[u8], DocRef) {
        let (bucket, id) = record.split_at(record.len() - 8);
        (bucket, DocRef::from_bytes(id.try_into().unwrap()))
    }
}
