//! # polyarc
//!
//! A format-agnostic engine for reading compressed archive containers.
//!
//! This crate separates *how bytes are grouped into volumes and entries*
//! (the container format) from *which codec decompresses an entry's
//! payload*. ZIP, tar and compressed tar archives, whether stored in one
//! file or split into numbered parts, are all read through the same two
//! façades:
//!
//! - [`Archive`]: random access. The entry list is loaded at open time and
//!   any entry can be extracted at any time.
//! - [`Reader`]: forward-only streaming. Entries are visited once, in
//!   container order; this is the only way to decode solid archives.
//!
//! ## Quick Start
//!
//! ### Extracting an Archive
//!
//! ```rust,no_run
//! use polyarc::{Archive, DirectorySink, ExtractionOptions, ReaderOptions, Result};
//!
//! fn main() -> Result<()> {
//!     // Open from a file path; split archives are discovered automatically
//!     let mut archive = Archive::open_path("backup.zip", ReaderOptions::default())?;
//!
//!     // List entries
//!     for entry in archive.entries() {
//!         println!("{}: {} bytes", entry.path, entry.size);
//!     }
//!
//!     // Extract all entries to a directory
//!     let mut sink = DirectorySink::new("./output", ExtractionOptions::default());
//!     archive.extract_all(&mut sink)?;
//!     Ok(())
//! }
//! ```
//!
//! ### Streaming a Solid Archive
//!
//! ```rust,no_run
//! use polyarc::{Reader, ReaderOptions, Result};
//! use std::fs::File;
//! use std::io::Read;
//!
//! fn main() -> Result<()> {
//!     let mut reader = Reader::open(File::open("sources.tar.gz")?, ReaderOptions::default())?;
//!     while let Some(entry) = reader.advance()? {
//!         if entry.path == "VERSION" {
//!             let mut version = String::new();
//!             reader.body()?.read_to_string(&mut version)?;
//!             println!("version {}", version.trim());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Reading Encrypted Entries
//!
//! ```rust,no_run
//! use polyarc::{Archive, ReaderOptions, Result};
//!
//! fn main() -> Result<()> {
//!     let options = ReaderOptions::new().password("secret");
//!     let mut archive = Archive::open_path("private.zip", options)?;
//!     let data = archive.read_entry(0)?;
//!     println!("{} bytes", data.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `deflate` | Yes | Deflate and gzip decoding, `.tar.gz` archives |
//! | `bzip2` | Yes | BZip2 decoding, `.tar.bz2` archives |
//! | `zstd` | No | Zstandard decoding, `.tar.zst` archives |
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`], which is an alias for
//! `std::result::Result<T, Error>`. See the [`error`] module for the
//! classification.
//!
//! ## Safety
//!
//! - **Path traversal protection**: [`DirectorySink`] rejects entries that
//!   would land outside the destination
//! - **CRC verification**: entry bodies are checked against the declared
//!   size and checksum
//! - **Ordering**: solid runs cannot be read out of order
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Default buffer size for reading operations.
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod codec;
pub mod error;
pub mod format;
pub mod read;
pub mod streaming;
pub(crate) mod timestamp;
pub mod volume;

pub use codec::{CodecRegistry, CompressionId, Password};
pub use error::{Error, Result, StreamFault};
pub use format::{ArchiveFormat, FormatRegistry};
pub use read::{
    Archive, DirectorySink, Entry, EntryReader, ExtractResult, ExtractionOptions, ExtractionSink,
    MemorySink, NullSink, OverwritePolicy, PathSafety, ReaderOptions,
};
pub use streaming::{EntryBody, Reader};
pub use volume::{ByteSource, Ownership, SharedSource, Volume, VolumeInput, VolumeSet, file_parts};
