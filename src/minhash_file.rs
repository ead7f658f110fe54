//! # MinHash File Codec
//!
//! Writer and reader for `DoubriH4` files. Items stream in row by row, but
//! the deduper later reads one bucket column across the whole file, so the
//! body is laid out in sector blocks of [`SECTOR_SIZE`] items: each block
//! holds the block's items regrouped band by band. Reading a column then
//! costs one seek per block instead of one per item.
//!
//! Header fields are little-endian; hash payload bytes are big-endian so
//! byte-wise bucket comparison matches numeric hash order.

use crate::model::{SketchParams, MINHASH_MAGIC, SECTOR_SIZE};
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Byte length of the file header.
pub const HEADER_LEN: u64 = 32;

/// Offset of the `num_items` header field, patched on close.
const NUM_ITEMS_OFFSET: u64 = 8;

/// Streaming writer for MinHash files.
///
/// Rows are buffered per band and flushed as a sector block after every
/// [`SECTOR_SIZE`] items; [`MinHashWriter::close`] flushes the short tail
/// block and patches the item count into the header.
pub struct MinHashWriter {
    file: BufWriter<File>,
    path: PathBuf,
    params: SketchParams,
    /// Per-band accumulation buffers for the current sector block.
    bands: Vec<Vec<u8>>,
    /// Items in the current sector block.
    fill: usize,
    num_items: u64,
}

impl MinHashWriter {
    /// Create `path` and reserve the header.
    pub fn create(path: &Path, params: SketchParams) -> Result<Self> {
        params.validate()?;
        let file = File::create(path)
            .with_context(|| format!("failed to create MinHash file: {}", path.display()))?;
        let mut file = BufWriter::new(file);

        file.write_all(MINHASH_MAGIC)?;
        file.write_all(&0u32.to_le_bytes())?; // num_items, patched on close
        file.write_all(&params.bytes_per_hash.to_le_bytes())?;
        file.write_all(&params.num_hash_values.to_le_bytes())?;
        file.write_all(&params.begin.to_le_bytes())?;
        file.write_all(&params.end.to_le_bytes())?;
        file.write_all(&(SECTOR_SIZE as u32).to_le_bytes())?;

        let bands = (0..params.num_bands())
            .map(|_| Vec::with_capacity(SECTOR_SIZE * params.bytes_per_bucket()))
            .collect();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            params,
            bands,
            fill: 0,
            num_items: 0,
        })
    }

    /// The parameters this file was opened with.
    pub fn params(&self) -> SketchParams {
        self.params
    }

    /// Items written so far.
    pub fn num_items(&self) -> u64 {
        self.num_items
    }

    /// Append one item's flat row of `num_bands · H` hash values.
    ///
    /// Values are in host order; only the low `bytes_per_hash · 8` bits of
    /// each are stored, big-endian.
    pub fn put(&mut self, row: &[u64]) -> Result<()> {
        if row.len() != self.params.hashes_per_item() {
            bail!(
                "row has {} hash values, expected {}",
                row.len(),
                self.params.hashes_per_item()
            );
        }
        if self.fill == SECTOR_SIZE {
            self.flush_block()?;
        }

        let h = self.params.num_hash_values as usize;
        for (band, values) in row.chunks_exact(h).enumerate() {
            let out = &mut self.bands[band];
            for &v in values {
                match self.params.bytes_per_hash {
                    4 => out.extend_from_slice(&(v as u32).to_be_bytes()),
                    _ => out.extend_from_slice(&v.to_be_bytes()),
                }
            }
        }

        self.fill += 1;
        self.num_items += 1;
        Ok(())
    }

    /// Write the buffered sector block, band by band.
    fn flush_block(&mut self) -> Result<()> {
        for band in &mut self.bands {
            self.file
                .write_all(band)
                .with_context(|| format!("failed to write to {}", self.path.display()))?;
            band.clear();
        }
        self.fill = 0;
        Ok(())
    }

    /// Flush the tail block and patch the item count into the header.
    pub fn close(mut self) -> Result<()> {
        if self.fill > 0 {
            self.flush_block()?;
        }
        if self.num_items >= u32::MAX as u64 {
            bail!(
                "too many items to store in 4 bytes: {} in {}",
                self.num_items,
                self.path.display()
            );
        }
        self.file.seek(SeekFrom::Start(NUM_ITEMS_OFFSET))?;
        self.file.write_all(&(self.num_items as u32).to_le_bytes())?;
        self.file
            .flush()
            .with_context(|| format!("failed to finalize {}", self.path.display()))?;
        Ok(())
    }
}

/// Reader for MinHash files.
///
/// Opening parses and validates the header; [`MinHashReader::read_bucket_column`]
/// gathers one band's buckets for every item with one seek per sector block.
pub struct MinHashReader {
    file: File,
    path: PathBuf,
    params: SketchParams,
    num_items: u64,
}

impl MinHashReader {
    /// Open `path` and validate its header against the compiled-in format.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .with_context(|| format!("failed to open MinHash file: {}", path.display()))?;

        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header)
            .with_context(|| format!("failed to read the header of {}", path.display()))?;

        if &header[0..8] != MINHASH_MAGIC {
            bail!("invalid magic in MinHash file: {}", path.display());
        }
        let field = |at: usize| u32::from_le_bytes(header[at..at + 4].try_into().unwrap());
        let num_items = field(8) as u64;
        let params = SketchParams {
            bytes_per_hash: field(12),
            num_hash_values: field(16),
            begin: field(20),
            end: field(24),
        };
        let sector_size = field(28) as usize;

        if sector_size != SECTOR_SIZE {
            bail!(
                "invalid sector size {} in {} (expected {})",
                sector_size,
                path.display(),
                SECTOR_SIZE
            );
        }
        params
            .validate()
            .with_context(|| format!("invalid header in {}", path.display()))?;

        let expected = HEADER_LEN + num_items * params.bytes_per_item() as u64;
        let actual = file.metadata()?.len();
        if actual != expected {
            bail!(
                "{} is {} bytes, expected {} for {} items",
                path.display(),
                actual,
                expected,
                num_items
            );
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            params,
            num_items,
        })
    }

    /// The parameters read from the header.
    pub fn params(&self) -> SketchParams {
        self.params
    }

    /// Items stored in this file.
    pub fn num_items(&self) -> u64 {
        self.num_items
    }

    /// Byte length of one full bucket column (`num_items · H · bytes_per_hash`).
    pub fn column_len(&self) -> usize {
        self.num_items as usize * self.params.bytes_per_bucket()
    }

    /// Read the whole bucket column of `band` into `out`.
    ///
    /// `out` must be exactly [`MinHashReader::column_len`] bytes. Issues one
    /// seek+read per sector block plus one for the tail block.
    pub fn read_bucket_column(&mut self, band: u32, out: &mut [u8]) -> Result<()> {
        if band < self.params.begin || band >= self.params.end {
            bail!(
                "band {} outside [{}, {}) in {}",
                band,
                self.params.begin,
                self.params.end,
                self.path.display()
            );
        }
        if out.len() != self.column_len() {
            bail!(
                "column buffer is {} bytes, expected {}",
                out.len(),
                self.column_len()
            );
        }

        let bytes_per_bucket = self.params.bytes_per_bucket() as u64;
        let num_bands = self.params.num_bands() as u64;
        let band_offset = (band - self.params.begin) as u64;

        let num_full = self.num_items / SECTOR_SIZE as u64;
        let num_remaining = self.num_items % SECTOR_SIZE as u64;
        // One band's column within a full sector block.
        let column_bytes = SECTOR_SIZE as u64 * bytes_per_bucket;
        let block_bytes = num_bands * column_bytes;

        let mut cursor = 0usize;
        for sector in 0..num_full {
            let offset = HEADER_LEN + block_bytes * sector + column_bytes * band_offset;
            let len = column_bytes as usize;
            self.read_at(offset, &mut out[cursor..cursor + len])?;
            cursor += len;
        }
        if num_remaining > 0 {
            let tail_column = num_remaining * bytes_per_bucket;
            let offset = HEADER_LEN + block_bytes * num_full + tail_column * band_offset;
            let len = tail_column as usize;
            self.read_at(offset, &mut out[cursor..cursor + len])?;
        }
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("failed to seek to {} in {}", offset, self.path.display()))?;
        self.file.read_exact(buf).with_context(|| {
            format!(
                "failed to read {} bytes at offset {} from {}",
                buf.len(),
                offset,
                self.path.display()
            )
        })?;
        Ok(())
    }
}
