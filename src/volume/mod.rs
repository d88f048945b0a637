//! Volumes: the physical inputs of an archive.
//!
//! An archive is read from one or more *volumes*. Each volume has a stable
//! index, a display name and a byte source that is either owned (closed by
//! the façade on release) or borrowed (left open for the caller).
//!
//! # Reading Multi-Volume Archives
//!
//! ```rust,ignore
//! use polyarc::volume::file_parts;
//! use polyarc::{Archive, ReaderOptions};
//!
//! // Discover the sibling parts of a split archive
//! let parts = file_parts("backup.part1.rar")?;
//! println!("Archive spans {} parts", parts.len());
//!
//! // Or let the archive discover them itself
//! let archive = Archive::open_path("backup.zip.001", ReaderOptions::default())?;
//! for volume in archive.volumes() {
//!     println!("{}: {} ({} bytes)", volume.index(), volume.name(), volume.size());
//! }
//! ```
//!
//! # Keeping a Source Open
//!
//! A façade drops every byte source it holds when it closes, but only calls
//! [`ByteSource::close`] on the ones it owns. Caller-supplied sources are
//! borrowed by default, so a [`SharedSource`] clone kept by the caller stays
//! readable; `leave_stream_open(false)` hands the source over instead.

mod parts;
mod set;
mod source;

pub use parts::{PartScheme, file_parts, validate_sequence};
pub use set::{Volume, VolumeInput, VolumeSet};
pub use source::{ByteSource, Ownership, SharedSource};
