//! Archive opening.

use std::path::Path;
use std::sync::Arc;

use super::{Archive, Entry, ReaderOptions};
use crate::format::{BackendFactory, ContainerBackend, detect};
use crate::streaming::Reader;
use crate::volume::{ByteSource, VolumeInput, VolumeSet, file_parts, validate_sequence};
use crate::{Error, Result};

/// Display name given to a volume opened from an anonymous stream.
const STREAM_NAME: &str = "<stream>";

struct Loaded {
    factory: Arc<dyn BackendFactory>,
    backend: Box<dyn ContainerBackend>,
    entries: Vec<Entry>,
}

impl Archive {
    /// Opens an archive from one byte source.
    ///
    /// The source is borrowed by default: the archive never closes it. Set
    /// [`ReaderOptions::leave_stream_open`] to `false` to have it closed when
    /// the archive is released.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownFormat`] if no backend recognizes the data
    /// - [`Error::CorruptHeader`] if the container metadata is damaged
    pub fn open(source: impl ByteSource + 'static, options: ReaderOptions) -> Result<Self> {
        Self::open_named(STREAM_NAME, source, options)
    }

    /// Opens an archive from one byte source with a display name.
    pub fn open_named(
        name: impl Into<String>,
        source: impl ByteSource + 'static,
        options: ReaderOptions,
    ) -> Result<Self> {
        let input = VolumeInput::new(name, source, options.ownership());
        Self::open_volumes(vec![input], options)
    }

    /// Opens a pre-split archive from named byte sources in part order.
    ///
    /// Each input carries its own ownership tag.
    pub fn open_volumes(inputs: Vec<VolumeInput>, options: ReaderOptions) -> Result<Self> {
        Self::open_volume_set(VolumeSet::new(inputs)?, options)
    }

    /// Opens an archive from a file path.
    ///
    /// This method auto-detects multi-part archives: when `path` names the
    /// first part of a numbered series (`.001`, `.part1.rar`, `.z01`, ...),
    /// every sibling part is opened as a volume.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VolumeResolution`] if a part of the series is
    /// missing, in addition to the errors of [`open`](Self::open).
    pub fn open_path(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let parts = file_parts(path.as_ref())?;
        if parts.len() > 1 {
            log::debug!(
                "Opening '{}' as {} parts",
                path.as_ref().display(),
                parts.len()
            );
        }
        Self::open_volume_set(VolumeSet::from_paths(&parts)?, options)
    }

    /// Opens an archive from an explicit list of part files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VolumeResolution`] if the list is not a contiguous
    /// run of the naming convention of its first part.
    pub fn open_paths<P: AsRef<Path>>(paths: &[P], options: ReaderOptions) -> Result<Self> {
        validate_sequence(paths)?;
        Self::open_volume_set(VolumeSet::from_paths(paths)?, options)
    }

    /// Opens an archive over an already resolved volume set.
    ///
    /// Nothing is returned on failure: the volumes are released and the
    /// original error is surfaced.
    pub fn open_volume_set(mut volumes: VolumeSet, options: ReaderOptions) -> Result<Self> {
        match Self::load(&mut volumes, &options) {
            Ok(loaded) => {
                log::debug!(
                    "Opened {} archive: {} entries in {} volumes{}",
                    loaded.backend.format(),
                    loaded.entries.len(),
                    volumes.len(),
                    if loaded.backend.is_solid() { " (solid)" } else { "" }
                );
                Ok(Self {
                    volumes,
                    factory: loaded.factory,
                    backend: loaded.backend,
                    entries: loaded.entries,
                    codecs: options.codecs,
                    password: options.password,
                })
            }
            Err(e) => {
                volumes.release();
                Err(e)
            }
        }
    }

    fn load(volumes: &mut VolumeSet, options: &ReaderOptions) -> Result<Loaded> {
        let factory = detect(
            volumes,
            &options.formats,
            &options.codecs,
            options.look_ahead_buffer_size,
        )?;
        let mut backend = factory.create();
        let entries = if backend.supports_random_access() {
            backend.scan_entries(volumes)?
        } else {
            log::debug!("Indexing {} archive with a streaming pass", backend.format());
            let mut reader = Reader::over(
                volumes,
                factory.create(),
                Arc::clone(&options.codecs),
                options.password.clone(),
            )?;
            while reader.advance()?.is_some() {}
            reader.into_history()
        };
        check_volume_ranges(&entries, volumes)?;
        Ok(Loaded {
            factory,
            backend,
            entries,
        })
    }
}

/// Rejects entries whose volume range is inverted or out of bounds.
fn check_volume_ranges(entries: &[Entry], volumes: &VolumeSet) -> Result<()> {
    for entry in entries {
        let first = entry.volume_index_first;
        let last = entry.volume_index_last;
        if first > last || last >= volumes.len() {
            let offset = entry.locator.header_offset;
            return Err(Error::CorruptHeader {
                offset,
                volume: volumes.volume_at(offset),
                reason: format!(
                    "entry '{}' spans volumes {}..={} of {}",
                    entry.path,
                    first,
                    last,
                    volumes.len()
                ),
            });
        }
    }
    Ok(())
}
