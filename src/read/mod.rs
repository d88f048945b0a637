//! Random-access archive reading.
//!
//! This module provides [`Archive`], which loads the entry list of an
//! archive up front and lets callers extract any entry at any time, along
//! with the entry model, the options and the extraction sinks shared with
//! the streaming [`Reader`](crate::Reader).
//!
//! # Example
//!
//! ```rust,no_run
//! use polyarc::{Archive, DirectorySink, ExtractionOptions, ReaderOptions};
//!
//! // Open an archive
//! let mut archive = Archive::open_path("release.zip", ReaderOptions::default())?;
//!
//! // List entries
//! for entry in archive.entries() {
//!     println!("{}: {} bytes", entry.path, entry.size);
//! }
//!
//! // Extract one file, then everything
//! let readme = archive.read_entry(0)?;
//! let mut sink = DirectorySink::new("out", ExtractionOptions::default());
//! archive.extract_all(&mut sink)?;
//! # let _ = readme;
//! # Ok::<(), polyarc::Error>(())
//! ```
//!
//! # Solid Archives
//!
//! Entries of a solid archive can only be decoded in order. For those
//! archives [`Archive::extract_all`] makes one sequential pass,
//! [`Archive::read_entry`] and [`Archive::extract_entry`] make a pass up to
//! the requested entry on every call, and [`Archive::open_entry`] is
//! rejected with [`Error::SequentialAccessRequired`](crate::Error::SequentialAccessRequired).

mod archive_open;
mod archive_query;
pub(crate) mod destination;
mod entry;
mod extraction;
mod metadata;
mod options;
mod path_safety;

pub use destination::{DirectorySink, ExtractResult, ExtractionSink, MemorySink, NullSink};
pub use entry::{BodyLayout, Entry, EntryLocator};
pub use extraction::EntryReader;
pub use options::{
    DEFAULT_LOOK_AHEAD, ExtractionOptions, OverwritePolicy, PathSafety, ReaderOptions,
};

use std::sync::Arc;

use crate::codec::{CodecRegistry, Password};
use crate::format::{BackendFactory, ContainerBackend};
use crate::volume::VolumeSet;

/// An opened archive with its complete entry list.
///
/// The archive exclusively owns its volumes. They are released exactly once,
/// by [`close`](Self::close) or when the archive is dropped. Files opened from
/// paths are closed; caller-supplied sources stay open unless
/// [`ReaderOptions::leave_stream_open`] was turned off.
pub struct Archive {
    pub(crate) volumes: VolumeSet,
    pub(crate) factory: Arc<dyn BackendFactory>,
    pub(crate) backend: Box<dyn ContainerBackend>,
    pub(crate) entries: Vec<Entry>,
    pub(crate) codecs: Arc<CodecRegistry>,
    pub(crate) password: Option<Password>,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("format", &self.backend.format())
            .field("solid", &self.backend.is_solid())
            .field("entries", &self.entries.len())
            .field("volumes", &self.volumes)
            .finish_non_exhaustive()
    }
}
