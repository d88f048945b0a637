//! Container formats.
//!
//! A container backend understands one archive layout: it turns container
//! metadata into [`Entry`] values and knows where each entry's payload
//! lives. Backends are created by a [`BackendFactory`]; the
//! [`FormatRegistry`] keeps the factories in probe priority order and
//! [`detect`] picks the first one that recognizes the leading bytes of the
//! first volume.
//!
//! Backends come in two access flavours:
//!
//! - **Random access** ([`ContainerBackend::scan_entries`] and
//!   [`ContainerBackend::open_entry_body`]): the whole entry list is known up
//!   front and any entry body can be located by seeking.
//! - **Streaming** ([`ContainerBackend::next_entry`] and
//!   [`ContainerBackend::finish_entry`]): entries are read from a forward-only
//!   byte stream, one header at a time.
//!
//! Solid backends only stream. Their streaming input is the decoded output
//! of one archive-scoped decoder session rather than the raw volume bytes.

pub mod compressed_tar;
pub mod detect;
pub(crate) mod reader;
pub mod tar;
pub mod zip;

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use crate::codec::{CodecRegistry, CompressionId};
use crate::read::{BodyLayout, Entry};
use crate::volume::VolumeSet;
use crate::{Error, Result};

pub use detect::detect;

/// Archive formats known to this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ArchiveFormat {
    /// ZIP archive, possibly split or spanned.
    Zip,
    /// Uncompressed tar archive.
    Tar,
    /// Gzip-compressed tar archive.
    TarGz,
    /// BZip2-compressed tar archive.
    TarBz2,
    /// Zstandard-compressed tar archive.
    TarZst,
    /// A format provided by a user-registered backend.
    Custom(&'static str),
}

impl ArchiveFormat {
    /// Returns the typical file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarBz2 => "tar.bz2",
            ArchiveFormat::TarZst => "tar.zst",
            ArchiveFormat::Custom(_) => "",
        }
    }

    /// Returns a human-readable name for this format.
    pub fn name(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "ZIP",
            ArchiveFormat::Tar => "TAR",
            ArchiveFormat::TarGz => "TAR+gzip",
            ArchiveFormat::TarBz2 => "TAR+bzip2",
            ArchiveFormat::TarZst => "TAR+Zstandard",
            ArchiveFormat::Custom(name) => name,
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parses one container layout.
///
/// A backend instance serves one pass: the random-access methods are used by
/// [`Archive`](crate::Archive), the streaming methods by a single
/// [`Reader`](crate::Reader). Backends never decode payloads; they only say
/// where payloads are and which codec they need.
pub trait ContainerBackend: Send {
    /// The format this backend parses.
    fn format(&self) -> ArchiveFormat;

    /// Returns true if entry payloads form one continuous compressed stream.
    fn is_solid(&self) -> bool {
        false
    }

    /// The codec of the solid stream, for solid backends.
    ///
    /// The reader decodes the volumes with one session of this codec and
    /// hands the decoded bytes to [`next_entry`](Self::next_entry).
    fn solid_codec(&self) -> Option<CompressionId> {
        None
    }

    /// Returns true if [`scan_entries`](Self::scan_entries) and
    /// [`open_entry_body`](Self::open_entry_body) are available.
    fn supports_random_access(&self) -> bool;

    /// Reads the complete entry list.
    ///
    /// Entry indices and volume ranges must be filled in.
    fn scan_entries(&mut self, volumes: &mut VolumeSet) -> Result<Vec<Entry>> {
        let _ = volumes;
        Err(Error::UnsupportedFeature {
            feature: "random access on a streaming-only container",
        })
    }

    /// Positions `volumes` at the first payload byte of `entry` and returns
    /// the payload length.
    fn open_entry_body(&self, volumes: &mut VolumeSet, entry: &Entry) -> Result<u64> {
        match entry.locator.layout {
            BodyLayout::Raw { compressed_size } => {
                use std::io::{Seek, SeekFrom};
                volumes.seek(SeekFrom::Start(entry.locator.data_offset))?;
                Ok(compressed_size)
            }
            BodyLayout::Solid => Err(Error::SequentialAccessRequired {
                index: entry.index,
                path: entry.path.clone(),
            }),
        }
    }

    /// Reads the next entry header from a forward-only stream.
    ///
    /// Returns `None` at the end of the container. On success the input is
    /// positioned at the first payload byte.
    fn next_entry(&mut self, input: &mut dyn Read) -> Result<Option<Entry>>;

    /// Skips the rest of `entry`'s payload and any trailing record.
    ///
    /// `unread` is the number of payload bytes the caller did not consume.
    fn finish_entry(&mut self, input: &mut dyn Read, entry: &Entry, unread: u64) -> Result<()>;
}

/// Creates backends for one format and recognizes it.
pub trait BackendFactory: Send + Sync {
    /// The format this factory handles.
    fn format(&self) -> ArchiveFormat;

    /// Returns true if `head`, the leading bytes of the archive, looks like
    /// this format. `head` may be shorter than the configured look-ahead for
    /// small archives.
    fn probe(&self, head: &[u8], codecs: &CodecRegistry) -> bool;

    /// Creates a fresh backend instance.
    fn create(&self) -> Box<dyn ContainerBackend>;
}

/// Container backends in probe priority order.
#[derive(Clone)]
pub struct FormatRegistry {
    factories: Vec<Arc<dyn BackendFactory>>,
}

impl FormatRegistry {
    /// Creates a registry that recognizes nothing.
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Creates the default registry.
    ///
    /// Priority: ZIP, gzip tar, bzip2 tar, Zstandard tar, plain tar.
    /// Compressed tar variants are only present when their codec feature is
    /// enabled.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(zip::ZipFactory);
        #[cfg(feature = "deflate")]
        registry.register(compressed_tar::CompressedTarFactory::gzip());
        #[cfg(feature = "bzip2")]
        registry.register(compressed_tar::CompressedTarFactory::bzip2());
        #[cfg(feature = "zstd")]
        registry.register(compressed_tar::CompressedTarFactory::zstd());
        registry.register(tar::TarFactory);
        registry
    }

    /// Appends a factory with the lowest priority so far.
    pub fn register(&mut self, factory: impl BackendFactory + 'static) {
        self.factories.push(Arc::new(factory));
    }

    /// Inserts a factory ahead of every registered one.
    pub fn register_first(&mut self, factory: impl BackendFactory + 'static) {
        self.factories.insert(0, Arc::new(factory));
    }

    /// Iterates over the factories in priority order.
    pub fn factories(&self) -> impl Iterator<Item = &Arc<dyn BackendFactory>> {
        self.factories.iter()
    }

    /// Returns the number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no factory is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.factories.iter().map(|factory| factory.format()))
            .finish()
    }
}
