//! Archive entry types.

use std::time::SystemTime;

use crate::codec::CompressionId;

/// An entry in an archive.
///
/// Entries are produced by a container backend while the archive is scanned
/// or streamed and never change afterwards. The struct is marked
/// `#[non_exhaustive]`; pattern matching on `Entry` requires a `..`
/// wildcard.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Entry {
    /// Position of the entry in container order.
    pub index: usize,
    /// The path within the archive, with `/` separators and no trailing `/`.
    pub path: String,
    /// Whether this entry is a directory.
    pub is_directory: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Size of the stored payload, when the container records it.
    ///
    /// `None` for entries of solid runs, whose payload is not separable
    /// from their neighbours.
    pub compressed_size: Option<u64>,
    /// The codec that decodes this entry's payload.
    pub compression: CompressionId,
    /// CRC-32 of the uncompressed data.
    ///
    /// # When this is `None`
    ///
    /// - **Tar-based archives**: tar records carry no content checksum
    /// - **Streamed ZIP entries** whose CRC lives in a trailing descriptor
    pub crc32: Option<u32>,
    /// Last modification time.
    pub modified: Option<SystemTime>,
    /// Unix mode bits, when the container records them.
    pub attributes: Option<u32>,
    /// Whether the payload is encrypted.
    pub is_encrypted: bool,
    /// Index of the first volume holding bytes of this entry.
    pub volume_index_first: usize,
    /// Index of the last volume holding bytes of this entry.
    pub volume_index_last: usize,
    /// Where the backend found the entry's payload.
    pub locator: EntryLocator,
}

impl Entry {
    /// Creates a file entry with empty metadata.
    ///
    /// Backends fill in the remaining fields; the index and volume range are
    /// assigned by the façade that reads the entry.
    pub fn new(path: impl Into<String>, size: u64, compression: CompressionId) -> Self {
        let mut path = path.into();
        while path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        Self {
            index: 0,
            path,
            is_directory: false,
            size,
            compressed_size: None,
            compression,
            crc32: None,
            modified: None,
            attributes: None,
            is_encrypted: false,
            volume_index_first: 0,
            volume_index_last: 0,
            locator: EntryLocator::default(),
        }
    }

    /// Creates a directory entry.
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            is_directory: true,
            ..Self::new(path, 0, CompressionId::Stored)
        }
    }

    /// Returns the file name (last component of the path).
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Returns true if this is a file (not a directory).
    pub fn is_file(&self) -> bool {
        !self.is_directory
    }

    /// Returns true if the entry's bytes cross a volume boundary.
    pub fn spans_volumes(&self) -> bool {
        self.volume_index_first != self.volume_index_last
    }

    /// Returns the compression ratio (compressed / uncompressed), if known.
    pub fn compression_ratio(&self) -> Option<f64> {
        match self.compressed_size {
            Some(packed) if self.size > 0 => Some(packed as f64 / self.size as f64),
            _ => None,
        }
    }

    /// Number of raw container bytes still ahead of the reader if the body
    /// is skipped entirely.
    pub(crate) fn payload_len(&self) -> u64 {
        match self.locator.layout {
            BodyLayout::Raw { compressed_size } => compressed_size,
            BodyLayout::Solid => self.size,
        }
    }
}

/// Backend-private position of an entry's payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryLocator {
    /// Logical offset of the entry's header across all volumes.
    pub header_offset: u64,
    /// Logical offset of the first payload byte.
    pub data_offset: u64,
    /// How the payload is laid out.
    pub layout: BodyLayout,
    /// Byte that a decrypted ZipCrypto header must end with.
    pub check_byte: Option<u8>,
}

/// How an entry's payload is stored in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLayout {
    /// The payload is a separate compressed byte range of the given length.
    Raw {
        /// Length of the range, including any encryption header.
        compressed_size: u64,
    },
    /// The payload is the next `size` bytes of the archive's solid stream.
    Solid,
}

impl Default for BodyLayout {
    fn default() -> Self {
        BodyLayout::Raw { compressed_size: 0 }
    }
}
