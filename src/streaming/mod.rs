//! Forward-only streaming access.
//!
//! This module provides [`Reader`], which walks an archive's entries in
//! container order and hands out each entry's decoded body at most once.
//! It is the only way to read solid archives such as `.tar.gz`, where all
//! entries share one decoder session, and it works for every other format
//! too without needing the container's index.
//!
//! # Example
//!
//! ```rust,no_run
//! use polyarc::{MemorySink, Reader, ReaderOptions};
//! use std::fs::File;
//!
//! let mut reader = Reader::open(File::open("src.tar.bz2")?, ReaderOptions::default())?;
//! let mut sink = MemorySink::new();
//! let result = reader.extract_all(&mut sink)?;
//! println!("{} files, {} bytes", result.entries_extracted, result.bytes_extracted);
//! # Ok::<(), polyarc::Error>(())
//! ```
//!
//! # Solid Archives
//!
//! For solid archives:
//! - Entries must be processed in order
//! - Skipping an entry still decompresses it (but discards the data)
//! - [`Reader::advance_to`] refuses to go back to an entry that was passed
//! - After the last entry the rest of the stream is decoded so the codec's
//!   own trailer (for example the gzip CRC) is verified

pub(crate) mod body;
mod reader;

pub use reader::{EntryBody, Reader};
