//! # Flag Vector
//!
//! One byte per item of a group, in shard concatenation order. On disk the
//! alphabet is `{' ', 'D'}`; in memory the deduper additionally uses the
//! transient `'d'` between a band's duplicate sweep and its promotion step.

use crate::model::{FLAG_ACTIVE, FLAG_DUPLICATE, FLAG_PENDING};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// The per-item flag vector of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagStore {
    flags: Vec<u8>,
}

impl FlagStore {
    /// Create a store with every item active.
    pub fn new(num_items: usize) -> Self {
        Self {
            flags: vec![FLAG_ACTIVE; num_items],
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether the store has no items.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// The raw flag bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.flags
    }

    /// Whether `item` is still active.
    pub fn is_active(&self, item: usize) -> bool {
        self.flags[item] == FLAG_ACTIVE
    }

    /// Whether `item` is a committed duplicate from an earlier band.
    ///
    /// Items marked `'d'` in the current band do not count until they are
    /// promoted.
    pub fn is_duplicate(&self, item: usize) -> bool {
        self.flags[item] == FLAG_DUPLICATE
    }

    /// Mark `item` as a duplicate found in the current band.
    ///
    /// Items already committed as duplicates keep their terminal flag.
    pub fn mark_pending(&mut self, item: usize) {
        if self.flags[item] == FLAG_ACTIVE {
            self.flags[item] = FLAG_PENDING;
        }
    }

    /// Commit the current band: every `'d'` becomes `'D'`.
    ///
    /// Returns the number of flags promoted.
    pub fn promote_pending(&mut self) -> usize {
        let mut promoted = 0;
        for flag in &mut self.flags {
            if *flag == FLAG_PENDING {
                *flag = FLAG_DUPLICATE;
                promoted += 1;
            }
        }
        promoted
    }

    /// Count items currently active.
    pub fn count_active(&self) -> usize {
        self.flags.iter().filter(|&&f| f == FLAG_ACTIVE).count()
    }

    /// Count items marked `'d'` in the current band.
    pub fn count_pending(&self) -> usize {
        self.flags.iter().filter(|&&f| f == FLAG_PENDING).count()
    }

    /// Load a flag file, validating the on-disk alphabet.
    pub fn load(path: &Path) -> Result<Self> {
        let flags = fs::read(path)
            .with_context(|| format!("failed to read flag file: {}", path.display()))?;
        if let Some(at) = flags
            .iter()
            .position(|&f| f != FLAG_ACTIVE && f != FLAG_DUPLICATE)
        {
            bail!(
                "invalid flag byte 0x{:02x} at offset {} in {}",
                flags[at],
                at,
                path.display()
            );
        }
        Ok(Self { flags })
    }

    /// Save the flags, writing a temporary sibling first and renaming it
    /// into place so a cancelled run never clobbers an existing file.
    ///
    /// Pending flags must be promoted before saving; `'d'` is not part of
    /// the on-disk alphabet.
    pub fn save(&self, path: &Path) -> Result<()> {
        if self.count_pending() > 0 {
            bail!("refusing to save unpromoted pending flags");
        }
        let tmp = temp_sibling(path);
        fs::write(&tmp, &self.flags)
            .with_context(|| format!("failed to write flag file: {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                tmp.display(),
                path.display()
            )
        })?;
        Ok(())
    }
}

fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    std::path::PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pending_promotion() {
        let mut flags = FlagStore::new(4);
        assert_eq!(flags.count_active(), 4);

        flags.mark_pending(1);
        flags.mark_pending(3);
        assert_eq!(flags.count_pending(), 2);
        assert_eq!(flags.count_active(), 2);
        // Pending marks are not committed duplicates yet.
        assert!(!flags.is_duplicate(1));

        assert_eq!(flags.promote_pending(), 2);
        assert_eq!(flags.count_pending(), 0);
        assert!(flags.is_duplicate(1));
        assert_eq!(flags.as_bytes(), b" D D");
    }

    #[test]
    fn test_duplicate_flag_is_terminal() {
        let mut flags = FlagStore::new(1);
        flags.mark_pending(0);
        flags.promote_pending();
        // A later band sees the same item in a run again.
        flags.mark_pending(0);
        assert_eq!(flags.count_pending(), 0);
        assert_eq!(flags.as_bytes(), b"D");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("group.dup");

        let mut flags = FlagStore::new(6);
        flags.mark_pending(1);
        flags.mark_pending(4);
        flags.promote_pending();
        flags.save(&path).unwrap();

        let loaded = FlagStore::load(&path).unwrap();
        assert_eq!(loaded, flags);
        // No temporary file left behind.
        assert!(!dir.path().join("group.dup.tmp").exists());
    }

    #[test]
    fn test_save_rejects_pending() {
        let dir = tempdir().unwrap();
        let mut flags = FlagStore::new(2);
        flags.mark_pending(0);
        assert!(flags.save(&dir.path().join("x.dup")).is_err());
    }

    #[test]
    fn test_load_rejects_foreign_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.dup");
        std::fs::write(&path, b" Dx ").unwrap();
        assert!(FlagStore::load(&path).is_err());
    }
}
