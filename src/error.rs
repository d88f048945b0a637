//! Error types for archive operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when opening, enumerating and extracting archives, along
//! with a convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. Errors are
//! classified so callers can react to the kind of failure rather than to a
//! message:
//!
//! ```rust,no_run
//! use polyarc::{Archive, Error, ReaderOptions};
//!
//! fn open(path: &str) -> polyarc::Result<()> {
//!     match Archive::open_path(path, ReaderOptions::default()) {
//!         Ok(archive) => {
//!             println!("{} entries in {} volumes", archive.len(), archive.volumes().len());
//!             Ok(())
//!         }
//!         Err(Error::UnknownFormat { .. }) => {
//!             eprintln!("not an archive this build understands");
//!             Ok(())
//!         }
//!         Err(e @ Error::VolumeResolution { .. }) => {
//!             eprintln!("a part of the archive is missing: {}", e);
//!             Err(e)
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! # fn main() {}
//! ```
//!
//! # Errors Crossing `std::io::Read`
//!
//! Entry bodies implement [`std::io::Read`], so a typed error raised while
//! decoding has to travel through [`std::io::Error`]. The façades box the
//! typed error into the I/O error and unbox it again with
//! [`Error::from_io`], so callers of `read_entry`, `extract_entry` and
//! `extract_all` always see the original classification.

use std::io;
use std::path::PathBuf;

/// The reason a decoded stream was rejected.
///
/// Carried by [`Error::CorruptStream`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StreamFault {
    /// The CRC-32 of the decoded body differs from the declared value.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// The checksum declared by the container.
        expected: u32,
        /// The checksum of the bytes actually produced.
        actual: u32,
    },

    /// The codec finished before producing the declared number of bytes.
    #[error("size mismatch: expected {expected} bytes, decoded {actual}")]
    SizeMismatch {
        /// The declared uncompressed size.
        expected: u64,
        /// The number of bytes the codec produced.
        actual: u64,
    },

    /// The compressed input ended in the middle of the stream.
    #[error("compressed input ended after {consumed} bytes")]
    Truncated {
        /// Compressed bytes consumed before the input ran out.
        consumed: u64,
    },

    /// The bitstream is malformed.
    #[error("{0}")]
    Malformed(String),

    /// A cause reported by a codec or backend implementation.
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

/// Helper struct for formatting errors that optionally name an entry.
struct EntryContext<'a>(Option<&'a str>);

impl std::fmt::Display for EntryContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(path) => write!(f, " in entry '{}'", path),
            None => Ok(()),
        }
    }
}

/// The main error type for archive operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | Byte source failures |
/// | Volumes | [`VolumeResolution`][Self::VolumeResolution], [`NoMoreVolumes`][Self::NoMoreVolumes] | Missing or misnumbered parts |
/// | Format | [`UnknownFormat`][Self::UnknownFormat], [`CorruptHeader`][Self::CorruptHeader] | Unrecognized or damaged container |
/// | Decoding | [`CorruptStream`][Self::CorruptStream], [`UnsupportedCodec`][Self::UnsupportedCodec] | Damaged payload, missing codec |
/// | Access order | [`SequentialAccessRequired`][Self::SequentialAccessRequired], [`BodyUnavailable`][Self::BodyUnavailable] | Solid-archive ordering rules |
/// | Security | [`PasswordRequired`][Self::PasswordRequired], [`WrongPassword`][Self::WrongPassword], [`PathTraversal`][Self::PathTraversal] | Encryption, unsafe paths |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred on a byte source or during extraction.
    ///
    /// Conversions from [`io::Error`] go through [`Error::from_io`], which
    /// first unboxes errors this crate raised itself.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// A part of a multi-volume archive could not be resolved.
    ///
    /// Returned when a referenced part does not exist, when part numbering
    /// is not contiguous, or when an explicit part list does not follow the
    /// naming convention of its first part.
    #[error("Cannot resolve volume {}: {reason}", path.display())]
    VolumeResolution {
        /// The part that could not be resolved.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// No registered container backend recognized the first volume.
    #[error("Unknown archive format (probed {probed} bytes of '{volume}')")]
    UnknownFormat {
        /// Display name of the probed volume.
        volume: String,
        /// Number of bytes the detector looked at.
        probed: usize,
    },

    /// The container metadata is malformed.
    ///
    /// Detection succeeded but the backend could not parse the container
    /// layout, or an entry referenced volumes that do not exist.
    #[error("Corrupt header at offset {offset:#x} (volume {volume}): {reason}")]
    CorruptHeader {
        /// Logical offset across all volumes where the problem was found.
        offset: u64,
        /// Index of the volume containing `offset`.
        volume: usize,
        /// A description of the corruption.
        reason: String,
    },

    /// An entry's payload failed to decode or verify.
    #[error("Corrupt stream{}: {fault}", EntryContext(entry.as_deref()))]
    CorruptStream {
        /// The entry being decoded, when known.
        entry: Option<String>,
        /// The underlying fault.
        #[source]
        fault: StreamFault,
    },

    /// The entry's compression identifier has no registered decoder.
    ///
    /// The façade stays open and other entries remain extractable.
    #[error("Unsupported codec {codec}{}", EntryContext(entry.as_deref()))]
    UnsupportedCodec {
        /// Name of the compression identifier.
        codec: String,
        /// The entry that requested it, when known.
        entry: Option<String>,
    },

    /// Random access was attempted on a solid run out of order.
    ///
    /// Solid archives decode all entries of a run with one decoder session,
    /// so an entry can only be reached by streaming through its predecessors.
    #[error("Sequential access required to reach entry {index} ('{path}')")]
    SequentialAccessRequired {
        /// Container index of the requested entry.
        index: usize,
        /// Path of the requested entry.
        path: String,
    },

    /// The streaming reader has no more entries.
    ///
    /// This is a normal termination signal. [`Reader::advance`] reports it
    /// as `Ok(None)`; it is only returned as an error by operations that
    /// need an entry to exist, such as [`Reader::advance_to`].
    ///
    /// [`Reader::advance`]: crate::Reader::advance
    /// [`Reader::advance_to`]: crate::Reader::advance_to
    #[error("End of archive reached")]
    EndOfArchive,

    /// A multi-volume archive ended before an entry's declared size was read.
    #[error("No more volumes after volume {volume} while reading entry '{entry}'")]
    NoMoreVolumes {
        /// Index of the last available volume.
        volume: usize,
        /// The entry that was cut short.
        entry: String,
    },

    /// The entry is encrypted and no password was provided.
    #[error("Password required for entry '{entry}'")]
    PasswordRequired {
        /// The encrypted entry.
        entry: String,
    },

    /// The provided password does not decrypt the entry.
    #[error("Wrong password for entry '{entry}'")]
    WrongPassword {
        /// The encrypted entry.
        entry: String,
    },

    /// An entry path would escape the extraction directory.
    #[error("Path traversal detected in entry '{path}'")]
    PathTraversal {
        /// The offending path as stored in the archive.
        path: String,
    },

    /// No entry matches the requested index or path.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// The current entry's body was already handed out or consumed.
    #[error("Body of entry '{entry}' is no longer available")]
    BodyUnavailable {
        /// The entry whose body was requested.
        entry: String,
    },

    /// The streaming reader is not positioned on an entry.
    #[error("Reader is not positioned on an entry; call advance() first")]
    NoCurrentEntry,

    /// A container feature this build does not handle.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },
}

impl Error {
    /// Creates a [`Error::CorruptStream`] for the given entry.
    pub fn corrupt_stream(entry: Option<&str>, fault: StreamFault) -> Self {
        Self::CorruptStream {
            entry: entry.map(str::to_string),
            fault,
        }
    }

    /// Recovers a typed error that was boxed into an [`io::Error`].
    ///
    /// I/O errors that did not originate from this crate are wrapped in
    /// [`Error::Io`].
    pub fn from_io(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Io(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(typed)) => *typed,
            Some(Err(other)) => Error::Io(io::Error::new(kind, other)),
            None => Error::Io(io::Error::from(kind)),
        }
    }

    /// Attaches an entry name to errors raised without one.
    pub(crate) fn with_entry(self, path: &str) -> Self {
        match self {
            Error::CorruptStream { entry: None, fault } => Error::CorruptStream {
                entry: Some(path.to_string()),
                fault,
            },
            Error::UnsupportedCodec { codec, entry: None } => Error::UnsupportedCodec {
                codec,
                entry: Some(path.to_string()),
            },
            other => other,
        }
    }

    /// Returns true for the normal end-of-stream signal.
    pub fn is_end_of_archive(&self) -> bool {
        matches!(self, Error::EndOfArchive)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::from_io(err)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(inner) => inner,
            other => io::Error::other(other),
        }
    }
}

/// A specialized Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_error_survives_io_roundtrip() {
        let original = Error::SequentialAccessRequired {
            index: 3,
            path: "c.txt".into(),
        };
        let io_err: io::Error = original.into();
        match Error::from_io(io_err) {
            Error::SequentialAccessRequired { index, path } => {
                assert_eq!(index, 3);
                assert_eq!(path, "c.txt");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_plain_io_error_stays_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        match Error::from_io(io_err) {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_io_error_exposes_source() {
        use std::error::Error as _;

        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "locked").into();
        let source = err.source().expect("io source");
        let inner = source.downcast_ref::<io::Error>().unwrap();
        assert_eq!(inner.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_io_variant_unwraps_on_conversion() {
        let err = Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_with_entry_fills_missing_context() {
        let err = Error::corrupt_stream(None, StreamFault::Truncated { consumed: 7 });
        let err = err.with_entry("b.txt");
        let msg = err.to_string();
        assert!(msg.contains("b.txt"), "{msg}");
        assert!(msg.contains("7 bytes"), "{msg}");
    }

    #[test]
    fn test_with_entry_keeps_existing_context() {
        let err = Error::UnsupportedCodec {
            codec: "LZMA".into(),
            entry: Some("a.bin".into()),
        };
        match err.with_entry("other") {
            Error::UnsupportedCodec { entry, .. } => assert_eq!(entry.as_deref(), Some("a.bin")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_checksum_display() {
        let fault = StreamFault::ChecksumMismatch {
            expected: 0xdeadbeef,
            actual: 0x1,
        };
        assert_eq!(
            fault.to_string(),
            "checksum mismatch: expected 0xdeadbeef, got 0x00000001"
        );
    }

    #[test]
    fn test_end_of_archive_is_not_a_fault() {
        assert!(Error::EndOfArchive.is_end_of_archive());
        assert!(!Error::NoCurrentEntry.is_end_of_archive());
    }
}
