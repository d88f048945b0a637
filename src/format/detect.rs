//! Archive format detection.
//!
//! Detection reads a prefix of the archive, rewinds, and asks every
//! registered [`BackendFactory`] in priority order whether it recognizes
//! that prefix. Nothing is consumed: the winning backend parses from the
//! true start of the first volume.

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use super::reader::read_full;
use super::{BackendFactory, FormatRegistry};
use crate::codec::CodecRegistry;
use crate::volume::VolumeSet;
use crate::{Error, Result};

/// Selects the backend for the archive in `volumes`.
///
/// # Arguments
///
/// * `volumes` - The archive; it is rewound to offset 0 on success
/// * `formats` - Candidate backends in priority order
/// * `codecs` - Codecs available to probes of compressed containers
/// * `look_ahead` - Maximum number of leading bytes shown to the probes
///
/// # Errors
///
/// Returns [`Error::UnknownFormat`] if no backend recognizes the prefix.
pub fn detect(
    volumes: &mut VolumeSet,
    formats: &FormatRegistry,
    codecs: &CodecRegistry,
    look_ahead: usize,
) -> Result<Arc<dyn BackendFactory>> {
    volumes.seek(SeekFrom::Start(0))?;
    let mut head = vec![0u8; look_ahead.max(1)];
    let probed = read_full(volumes, &mut head)?;
    head.truncate(probed);
    volumes.seek(SeekFrom::Start(0))?;

    let volume = volumes
        .volumes()
        .first()
        .map(|v| v.name().to_string())
        .unwrap_or_default();

    for factory in formats.factories() {
        if factory.probe(&head, codecs) {
            log::debug!(
                "Detected {} in '{}' after probing {} bytes",
                factory.format(),
                volume,
                probed
            );
            return Ok(Arc::clone(factory));
        }
    }

    log::debug!("No backend recognized '{}' ({} bytes probed)", volume, probed);
    Err(Error::UnknownFormat { volume, probed })
}
