//! Extraction sinks.
//!
//! This module provides the [`ExtractionSink`] trait for pluggable extraction
//! targets, along with built-in implementations for common use cases.
//!
//! # Built-in Sinks
//!
//! - [`DirectorySink`] - Writes entries below a directory (default behavior)
//! - [`MemorySink`] - Collects entries in memory
//! - [`NullSink`] - Discards extracted data while still verifying it
//!
//! # Custom Sinks
//!
//! ```rust
//! use polyarc::{Entry, ExtractionSink};
//! use std::io::Write;
//!
//! /// Counts bytes per entry without storing them.
//! #[derive(Default)]
//! struct Sizes {
//!     sizes: Vec<(String, u64)>,
//!     current: Vec<u8>,
//! }
//!
//! impl ExtractionSink for Sizes {
//!     fn create_writer(&mut self, _entry: &Entry) -> polyarc::Result<Option<Box<dyn Write + '_>>> {
//!         self.current.clear();
//!         Ok(Some(Box::new(&mut self.current)))
//!     }
//!
//!     fn on_complete(&mut self, entry: &Entry, success: bool) -> polyarc::Result<()> {
//!         if success {
//!             self.sizes.push((entry.path.clone(), self.current.len() as u64));
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use super::metadata::apply_metadata;
use super::path_safety::validate_path;
use super::{Entry, ExtractionOptions, OverwritePolicy};
use crate::{Error, Result};

/// Where extracted entries go.
///
/// The façades call [`on_start`](Self::on_start) once, then for every entry
/// in container order either [`on_directory`](Self::on_directory) or
/// [`create_writer`](Self::create_writer) followed by
/// [`on_complete`](Self::on_complete), and finally
/// [`on_finish`](Self::on_finish).
pub trait ExtractionSink {
    /// Called before the first entry. `total` is the number of entries when
    /// it is known up front.
    fn on_start(&mut self, total: Option<usize>) -> Result<()> {
        let _ = total;
        Ok(())
    }

    /// Creates a writer for a file entry, or returns `None` to skip it.
    fn create_writer(&mut self, entry: &Entry) -> Result<Option<Box<dyn Write + '_>>>;

    /// Called after the writer returned by
    /// [`create_writer`](Self::create_writer) was dropped.
    ///
    /// `success` is false if decoding or writing failed; the entry's error
    /// is returned to the caller after this call.
    fn on_complete(&mut self, entry: &Entry, success: bool) -> Result<()>;

    /// Called for directory entries.
    fn on_directory(&mut self, entry: &Entry) -> Result<()> {
        let _ = entry;
        Ok(())
    }

    /// Called once after the last entry, or after the first failure.
    fn on_finish(&mut self, success: bool) -> Result<()> {
        let _ = success;
        Ok(())
    }
}

/// Summary of an extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractResult {
    /// File entries written.
    pub entries_extracted: usize,
    /// Directory entries handled.
    pub directories_created: usize,
    /// File entries the sink declined.
    pub entries_skipped: usize,
    /// Decoded bytes written.
    pub bytes_extracted: u64,
}

/// Hands out the body of the entry being extracted.
pub(crate) trait BodyProvider {
    fn open_body(&mut self, entry: &Entry) -> Result<Box<dyn Read + '_>>;
}

/// Streams one entry into `sink`.
///
/// The body is only opened for file entries the sink accepts, so skipped
/// entries are never decoded.
pub(crate) fn write_entry(
    sink: &mut dyn ExtractionSink,
    entry: &Entry,
    result: &mut ExtractResult,
    bodies: &mut dyn BodyProvider,
) -> Result<()> {
    if entry.is_directory {
        sink.on_directory(entry)?;
        result.directories_created += 1;
        return Ok(());
    }

    let copied = match sink.create_writer(entry)? {
        None => {
            log::debug!("Sink skipped '{}'", entry.path);
            result.entries_skipped += 1;
            return Ok(());
        }
        Some(mut writer) => match bodies.open_body(entry) {
            Ok(mut body) => io::copy(&mut body, &mut writer)
                .and_then(|n| writer.flush().map(|()| n))
                .map_err(Error::from_io),
            Err(e) => Err(e),
        },
    };

    match copied {
        Ok(bytes) => {
            sink.on_complete(entry, true)?;
            result.entries_extracted += 1;
            result.bytes_extracted += bytes;
            log::trace!("Extracted '{}' ({} bytes)", entry.path, bytes);
            Ok(())
        }
        Err(e) => {
            if let Err(cleanup) = sink.on_complete(entry, false) {
                log::warn!("Sink cleanup for '{}' failed: {}", entry.path, cleanup);
            }
            Err(e)
        }
    }
}

/// Runs `extract` between [`ExtractionSink::on_start`] and
/// [`ExtractionSink::on_finish`], keeping the first error.
pub(crate) fn run_extraction(
    sink: &mut dyn ExtractionSink,
    total: Option<usize>,
    extract: impl FnOnce(&mut dyn ExtractionSink, &mut ExtractResult) -> Result<()>,
) -> Result<ExtractResult> {
    let mut result = ExtractResult::default();
    sink.on_start(total)?;
    match extract(&mut *sink, &mut result) {
        Ok(()) => {
            sink.on_finish(true)?;
            Ok(result)
        }
        Err(e) => {
            if let Err(finish) = sink.on_finish(false) {
                log::warn!("Sink finish after failed extraction failed: {}", finish);
            }
            Err(e)
        }
    }
}

/// Writes entries below a directory.
///
/// # Features
///
/// - Creates directories as needed, or flattens paths
/// - Applies the [`OverwritePolicy`]
/// - Rejects unsafe paths according to the [`PathSafety`](super::PathSafety) policy
/// - Optionally sets modification times and unix permissions
/// - Removes partially written files
///
/// # Example
///
/// ```rust,no_run
/// use polyarc::{Archive, DirectorySink, ExtractionOptions, ReaderOptions};
///
/// let mut archive = Archive::open_path("bundle.zip", ReaderOptions::default())?;
/// let mut sink = DirectorySink::new("./output", ExtractionOptions::default());
/// archive.extract_all(&mut sink)?;
/// # Ok::<(), polyarc::Error>(())
/// ```
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    options: ExtractionOptions,
    /// File currently being written, for cleanup on failure.
    current: Option<PathBuf>,
}

impl DirectorySink {
    /// Creates a sink writing below `root`.
    pub fn new(root: impl AsRef<Path>, options: ExtractionOptions) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            options,
            current: None,
        }
    }

    /// Returns the destination directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the options in effect.
    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    fn target(&self, entry: &Entry) -> Result<PathBuf> {
        let relative = validate_path(&entry.path, self.options.path_safety)?;
        if self.options.extract_full_path {
            return Ok(self.root.join(relative));
        }
        match relative.file_name() {
            Some(name) => Ok(self.root.join(name)),
            None => Err(Error::PathTraversal {
                path: entry.path.clone(),
            }),
        }
    }
}

impl ExtractionSink for DirectorySink {
    fn on_start(&mut self, _total: Option<usize>) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn create_writer(&mut self, entry: &Entry) -> Result<Option<Box<dyn Write + '_>>> {
        let path = self.target(entry)?;

        if fs::symlink_metadata(&path).is_ok() {
            match self.options.overwrite {
                OverwritePolicy::Error => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("'{}' already exists", path.display()),
                    )));
                }
                OverwritePolicy::Skip => return Ok(None),
                OverwritePolicy::Overwrite => {}
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        self.current = Some(path);
        Ok(Some(Box::new(file)))
    }

    fn on_complete(&mut self, entry: &Entry, success: bool) -> Result<()> {
        let Some(path) = self.current.take() else {
            return Ok(());
        };
        if success {
            apply_metadata(&path, entry, &self.options);
        } else if let Err(e) = fs::remove_file(&path) {
            log::warn!(
                "Failed to clean up partial file '{}': {}",
                path.display(),
                e
            );
        }
        Ok(())
    }

    fn on_directory(&mut self, entry: &Entry) -> Result<()> {
        if !self.options.extract_full_path {
            return Ok(());
        }
        let path = self.root.join(validate_path(&entry.path, self.options.path_safety)?);
        fs::create_dir_all(&path)?;
        Ok(())
    }
}

/// Collects extracted files in memory, keyed by entry path.
///
/// # Example
///
/// ```rust,no_run
/// use polyarc::{Archive, MemorySink, ReaderOptions};
///
/// let mut archive = Archive::open_path("bundle.tar.gz", ReaderOptions::default())?;
/// let mut sink = MemorySink::new();
/// archive.extract_all(&mut sink)?;
/// for (path, data) in sink.files() {
///     println!("{}: {} bytes", path, data.len());
/// }
/// # Ok::<(), polyarc::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    files: BTreeMap<String, Vec<u8>>,
    directories: Vec<String>,
    pending: Vec<u8>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the extracted files.
    pub fn files(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.files
    }

    /// Consumes the sink and returns the extracted files.
    pub fn into_files(self) -> BTreeMap<String, Vec<u8>> {
        self.files
    }

    /// Gets the extracted content for a specific path.
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Directory entries seen, in container order.
    pub fn directories(&self) -> &[String] {
        &self.directories
    }

    /// Returns the number of extracted files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if no files have been extracted.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ExtractionSink for MemorySink {
    fn create_writer(&mut self, entry: &Entry) -> Result<Option<Box<dyn Write + '_>>> {
        self.pending = Vec::with_capacity(usize::try_from(entry.size).unwrap_or(0).min(1 << 20));
        Ok(Some(Box::new(&mut self.pending)))
    }

    fn on_complete(&mut self, entry: &Entry, success: bool) -> Result<()> {
        let data = std::mem::take(&mut self.pending);
        if success {
            self.files.insert(entry.path.clone(), data);
        }
        Ok(())
    }

    fn on_directory(&mut self, entry: &Entry) -> Result<()> {
        self.directories.push(entry.path.clone());
        Ok(())
    }
}

/// Decodes and verifies every entry, discarding the output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ExtractionSink for NullSink {
    fn create_writer(&mut self, _entry: &Entry) -> Result<Option<Box<dyn Write + '_>>> {
        Ok(Some(Box::new(io::sink())))
    }

    fn on_complete(&mut self, _entry: &Entry, _success: bool) -> Result<()> {
        Ok(())
    }
}
