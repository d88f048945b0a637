//! Archive query methods.

use super::{Archive, Entry};
use crate::format::ArchiveFormat;
use crate::volume::{Volume, VolumeSet};
use crate::{Error, Result};

impl Archive {
    /// Returns the entries in container order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns the volumes in discovery order.
    pub fn volumes(&self) -> &[Volume] {
        self.volumes.volumes()
    }

    /// Returns the volume set, for offsets and sizes.
    pub fn volume_set(&self) -> &VolumeSet {
        &self.volumes
    }

    /// Returns true if entries must be decoded in container order.
    pub fn is_solid(&self) -> bool {
        self.backend.is_solid()
    }

    /// Returns the detected container format.
    pub fn format(&self) -> ArchiveFormat {
        self.backend.format()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry at `index`.
    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// Finds an entry by its path.
    ///
    /// Trailing slashes are ignored, so `"docs/"` finds the directory
    /// `docs`. If several entries share a path the last one wins, matching
    /// what extraction leaves on disk.
    pub fn entry_by_path(&self, path: &str) -> Option<&Entry> {
        let path = path.trim_end_matches('/');
        self.entries.iter().rev().find(|e| e.path == path)
    }

    /// Returns the total uncompressed size of all entries.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub(crate) fn lookup(&self, index: usize) -> Result<&Entry> {
        self.entries
            .get(index)
            .ok_or_else(|| Error::EntryNotFound(format!("index {index}")))
    }
}
