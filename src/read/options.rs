//! Options for opening archives and extracting entries.

use std::fmt;
use std::sync::Arc;

use crate::codec::{CodecRegistry, Password};
use crate::format::FormatRegistry;
use crate::volume::Ownership;

/// Default number of leading bytes handed to format probes.
pub const DEFAULT_LOOK_AHEAD: usize = 64 * 1024;

/// Options for [`Archive`](crate::Archive) and [`Reader`](crate::Reader).
///
/// # Example
///
/// ```rust
/// use polyarc::ReaderOptions;
///
/// let options = ReaderOptions::new()
///     .password("secret")
///     .leave_stream_open(false)
///     .look_ahead_buffer_size(4096);
/// assert!(!options.leave_stream_open);
/// ```
#[derive(Clone)]
pub struct ReaderOptions {
    /// Number of leading bytes the format detector looks at.
    pub look_ahead_buffer_size: usize,
    /// Password for encrypted entries.
    pub password: Option<Password>,
    /// Borrow the caller's byte sources instead of closing them on release.
    ///
    /// On by default. Files the façade opens itself from paths are always
    /// closed on release.
    pub leave_stream_open: bool,
    /// Decoders available to the façade.
    pub codecs: Arc<CodecRegistry>,
    /// Container backends in probe order.
    pub formats: Arc<FormatRegistry>,
}

impl ReaderOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the detection look-ahead.
    ///
    /// Values below 512 bytes are raised to 512 so that a tar header always
    /// fits.
    pub fn look_ahead_buffer_size(mut self, size: usize) -> Self {
        self.look_ahead_buffer_size = size.max(512);
        self
    }

    /// Sets the password for encrypted entries.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets whether the caller's byte sources stay open when the façade is
    /// released. Pass `false` to hand them over to the façade.
    pub fn leave_stream_open(mut self, leave_open: bool) -> Self {
        self.leave_stream_open = leave_open;
        self
    }

    /// Replaces the codec registry.
    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Arc::new(codecs);
        self
    }

    /// Replaces the format registry.
    pub fn formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = Arc::new(formats);
        self
    }

    /// The ownership tag given to sources opened with these options.
    pub fn ownership(&self) -> Ownership {
        Ownership::from_leave_open(self.leave_stream_open)
    }
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            look_ahead_buffer_size: DEFAULT_LOOK_AHEAD,
            password: None,
            leave_stream_open: true,
            codecs: Arc::new(CodecRegistry::with_defaults()),
            formats: Arc::new(FormatRegistry::with_defaults()),
        }
    }
}

impl fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("look_ahead_buffer_size", &self.look_ahead_buffer_size)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("leave_stream_open", &self.leave_stream_open)
            .field("codecs", &self.codecs)
            .field("formats", &self.formats)
            .finish()
    }
}

/// Policy for handling existing files during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Return an error if the file exists.
    #[default]
    Error,
    /// Skip files that already exist.
    Skip,
    /// Overwrite existing files.
    Overwrite,
}

/// Path validation policy for extraction.
///
/// Archive paths are untrusted input. The default rejects anything that
/// could place a file outside the extraction directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathSafety {
    /// Reject `..` components, absolute paths, drive prefixes and
    /// backslashes.
    #[default]
    Strict,
    /// Reject `..` components and absolute paths only.
    Relaxed,
    /// Disables all path validation.
    ///
    /// A malicious archive can then write anywhere the process can. Only use
    /// this for archives you created yourself.
    Disabled,
}

/// Options for [`DirectorySink`](crate::DirectorySink).
///
/// The defaults never replace a file that already exists and copy each
/// entry's modification time. Use
/// `overwrite(OverwritePolicy::Overwrite).preserve_file_time(false)` to
/// replace files and stamp them with the extraction time instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOptions {
    /// Recreate the entry's directories below the destination. When false,
    /// every file lands directly in the destination under its file name.
    pub extract_full_path: bool,
    /// What to do when the destination file exists.
    pub overwrite: OverwritePolicy,
    /// Copy the entry's modification time to the written file.
    pub preserve_file_time: bool,
    /// Copy the entry's unix permission bits to the written file.
    pub preserve_attributes: bool,
    /// Path validation policy.
    pub path_safety: PathSafety,
}

impl ExtractionOptions {
    /// Creates extraction options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether directories are recreated.
    pub fn extract_full_path(mut self, full_path: bool) -> Self {
        self.extract_full_path = full_path;
        self
    }

    /// Sets the overwrite policy.
    pub fn overwrite(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite = policy;
        self
    }

    /// Sets whether modification times are preserved.
    pub fn preserve_file_time(mut self, preserve: bool) -> Self {
        self.preserve_file_time = preserve;
        self
    }

    /// Sets whether permission bits are preserved.
    pub fn preserve_attributes(mut self, preserve: bool) -> Self {
        self.preserve_attributes = preserve;
        self
    }

    /// Sets the path safety policy.
    pub fn path_safety(mut self, policy: PathSafety) -> Self {
        self.path_safety = policy;
        self
    }
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            extract_full_path: true,
            overwrite: OverwritePolicy::Error,
            preserve_file_time: true,
            preserve_attributes: false,
            path_safety: PathSafety::Strict,
        }
    }
}
