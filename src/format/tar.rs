//! Tar container backend.
//!
//! Supports the POSIX ustar layout with its path prefix, GNU long names
//! (`L` records) and pax extended headers (`x` records carrying `path`,
//! `size` and `mtime`). Regular files and directories become entries;
//! links, devices and other special records are skipped.
//!
//! Tar entries are stored, never compressed: compression of tar archives
//! happens around the whole stream and is handled by the
//! [`compressed_tar`](super::compressed_tar) backend.

use std::io::{Read, Seek, SeekFrom};
use std::time::{Duration, SystemTime};

use super::reader::{read_bytes, read_full, skip};
use super::{ArchiveFormat, BackendFactory, ContainerBackend};
use crate::codec::{CodecRegistry, CompressionId};
use crate::error::StreamFault;
use crate::read::{BodyLayout, Entry, EntryLocator};
use crate::volume::VolumeSet;
use crate::{Error, Result};

/// Size of a tar header or data block.
pub const BLOCK_SIZE: usize = 512;

/// Largest long-name or pax record accepted.
const MAX_META_RECORD: u64 = 1024 * 1024;

const CHECKSUM_FIELD: std::ops::Range<usize> = 148..156;

/// Returns true if `block` is a tar header with a valid checksum.
pub fn is_tar_header(block: &[u8]) -> bool {
    block.len() >= BLOCK_SIZE && !is_zero_block(block) && checksum_ok(&block[..BLOCK_SIZE])
}

/// Returns true if `block` can open a tar stream: a valid header, or the
/// end-of-archive marker of an empty archive.
pub(crate) fn starts_tar_stream(block: &[u8]) -> bool {
    block.len() >= BLOCK_SIZE && (is_zero_block(block) || checksum_ok(&block[..BLOCK_SIZE]))
}

fn is_zero_block(block: &[u8]) -> bool {
    block[..BLOCK_SIZE.min(block.len())].iter().all(|&b| b == 0)
}

fn checksum_ok(block: &[u8]) -> bool {
    let Ok(stored) = parse_octal(&block[CHECKSUM_FIELD]) else {
        return false;
    };
    let (unsigned, signed) = header_sums(block);
    stored == unsigned || stored as i64 == signed
}

/// Sums the header with the checksum field read as spaces.
fn header_sums(block: &[u8]) -> (u64, i64) {
    let mut unsigned = 0u64;
    let mut signed = 0i64;
    for (i, &b) in block[..BLOCK_SIZE].iter().enumerate() {
        let b = if CHECKSUM_FIELD.contains(&i) { b' ' } else { b };
        unsigned += u64::from(b);
        signed += i64::from(b as i8);
    }
    (unsigned, signed)
}

/// Number of zero bytes that follow `size` payload bytes.
pub(crate) fn padding(size: u64) -> u64 {
    (BLOCK_SIZE as u64 - size % BLOCK_SIZE as u64) % BLOCK_SIZE as u64
}

fn parse_octal(field: &[u8]) -> std::result::Result<u64, String> {
    let text = field
        .iter()
        .copied()
        .skip_while(|&b| b == b' ')
        .take_while(|&b| b != 0 && b != b' ')
        .collect::<Vec<u8>>();
    if text.is_empty() {
        return Ok(0);
    }
    let mut value = 0u64;
    for b in text {
        if !(b'0'..=b'7').contains(&b) {
            return Err(format!("invalid octal digit {:#04x}", b));
        }
        value = value
            .checked_mul(8)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or_else(|| "octal field overflows".to_string())?;
    }
    Ok(value)
}

/// Parses a numeric field in octal or GNU base-256 encoding.
fn parse_numeric(field: &[u8]) -> std::result::Result<u64, String> {
    if field.first().is_some_and(|&b| b & 0x80 != 0) {
        if field[0] & 0x40 != 0 {
            return Err("negative base-256 value".into());
        }
        let mut value = u64::from(field[0] & 0x3f);
        for &b in &field[1..] {
            value = value
                .checked_mul(256)
                .and_then(|v| v.checked_add(u64::from(b)))
                .ok_or_else(|| "base-256 field overflows".to_string())?;
        }
        return Ok(value);
    }
    parse_octal(field)
}

fn field_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Values from a pax extended header that override the next entry.
#[derive(Debug, Default)]
struct PaxOverrides {
    path: Option<String>,
    size: Option<u64>,
    mtime: Option<SystemTime>,
}

fn parse_pax(data: &[u8], overrides: &mut PaxOverrides) -> std::result::Result<(), String> {
    let mut rest = data;
    while !rest.is_empty() && rest[0] != 0 {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or("pax record without length")?;
        let len: usize = std::str::from_utf8(&rest[..space])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or("pax record with invalid length")?;
        if len <= space + 1 || len > rest.len() {
            return Err("pax record length out of range".into());
        }
        let record = &rest[space + 1..len];
        let record = record.strip_suffix(b"\n").unwrap_or(record);
        if let Some(eq) = record.iter().position(|&b| b == b'=') {
            let value = String::from_utf8_lossy(&record[eq + 1..]).into_owned();
            match &record[..eq] {
                b"path" => overrides.path = Some(value),
                b"size" => {
                    overrides.size = Some(value.parse().map_err(|_| "invalid pax size")?);
                }
                b"mtime" => {
                    let secs: f64 = value.parse().map_err(|_| "invalid pax mtime")?;
                    overrides.mtime = Duration::try_from_secs_f64(secs)
                        .ok()
                        .and_then(|d| SystemTime::UNIX_EPOCH.checked_add(d));
                }
                _ => {}
            }
        }
        rest = &rest[len..];
    }
    Ok(())
}

/// Recognizes plain tar archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarFactory;

impl BackendFactory for TarFactory {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Tar
    }

    fn probe(&self, head: &[u8], _codecs: &CodecRegistry) -> bool {
        is_tar_header(head)
    }

    fn create(&self) -> Box<dyn ContainerBackend> {
        Box::new(TarBackend::new())
    }
}

/// Parses tar headers from a byte stream.
#[derive(Debug, Default)]
pub struct TarBackend {
    /// Offset of the next unread byte of the tar stream.
    offset: u64,
    ended: bool,
}

impl TarBackend {
    /// Creates a backend positioned at the start of a tar stream.
    pub fn new() -> Self {
        Self::default()
    }

    fn corrupt(&self, offset: u64, reason: impl Into<String>) -> Error {
        Error::CorruptHeader {
            offset,
            volume: 0,
            reason: reason.into(),
        }
    }

    /// Returns the offset just past a record's padded payload.
    fn record_end(&self, header_offset: u64, size: u64) -> Result<u64> {
        size.checked_add(padding(size))
            .and_then(|padded| self.offset.checked_add(padded))
            .ok_or_else(|| self.corrupt(header_offset, "entry size overflows"))
    }

    fn skip_counted(&mut self, input: &mut dyn Read, count: u64) -> Result<u64> {
        let skipped = skip(input, count)?;
        self.offset += skipped;
        Ok(skipped)
    }

    /// Reads the metadata records of the next entry, leaving the input at
    /// its first payload byte.
    fn read_header(&mut self, input: &mut dyn Read) -> Result<Option<Entry>> {
        if self.ended {
            return Ok(None);
        }
        let record_start = self.offset;
        let mut long_name: Option<String> = None;
        let mut pax = PaxOverrides::default();

        loop {
            let mut block = [0u8; BLOCK_SIZE];
            let n = read_full(input, &mut block)?;
            let header_offset = self.offset;
            self.offset += n as u64;
            if n == 0 {
                self.ended = true;
                return Ok(None);
            }
            if n < BLOCK_SIZE {
                log::debug!(
                    "Tar stream ends with a partial header at offset {}",
                    header_offset
                );
                self.ended = true;
                return Ok(None);
            }
            if is_zero_block(&block) {
                log::trace!("End-of-archive block at offset {}", header_offset);
                self.ended = true;
                return Ok(None);
            }
            if !checksum_ok(&block) {
                return Err(self.corrupt(header_offset, "tar header checksum mismatch"));
            }

            let mut size =
                parse_numeric(&block[124..136]).map_err(|r| self.corrupt(header_offset, r))?;
            self.record_end(header_offset, size)?;
            let typeflag = block[156];

            match typeflag {
                b'L' | b'x' | b'g' => {
                    if size > MAX_META_RECORD {
                        return Err(self.corrupt(header_offset, "oversized extended header"));
                    }
                    let data = read_bytes(input, size as usize)?;
                    self.offset += size;
                    self.skip_counted(input, padding(size))?;
                    match typeflag {
                        b'L' => long_name = Some(field_str(&data)),
                        b'x' => {
                            parse_pax(&data, &mut pax).map_err(|r| self.corrupt(header_offset, r))?
                        }
                        _ => {}
                    }
                    continue;
                }
                b'0' | 0 | b'7' | b'5' => {}
                other => {
                    log::debug!(
                        "Skipping tar record of type {:?} at offset {}",
                        other as char,
                        header_offset
                    );
                    self.skip_counted(input, size + padding(size))?;
                    long_name = None;
                    pax = PaxOverrides::default();
                    continue;
                }
            }

            let mut name = field_str(&block[0..100]);
            if &block[257..263] == b"ustar\0" {
                let prefix = field_str(&block[345..500]);
                if !prefix.is_empty() {
                    name = format!("{}/{}", prefix, name);
                }
            }
            if let Some(long) = long_name.take() {
                name = long;
            }
            if let Some(path) = pax.path.take() {
                name = path;
            }
            if let Some(pax_size) = pax.size.take() {
                size = pax_size;
                self.record_end(header_offset, size)?;
            }

            let is_directory = typeflag == b'5' || name.ends_with('/');
            let path = name.trim_start_matches("./").to_string();
            if path.is_empty() || path == "." {
                self.skip_counted(input, size + padding(size))?;
                continue;
            }

            let mtime = parse_numeric(&block[136..148]).map_err(|r| self.corrupt(header_offset, r))?;
            let mode = parse_numeric(&block[100..108]).map_err(|r| self.corrupt(header_offset, r))?;

            let mut entry = if is_directory {
                Entry::directory(path)
            } else {
                Entry::new(path, size, CompressionId::Stored)
            };
            // Directories may still carry payload bytes that must be skipped.
            entry.compressed_size = Some(size);
            entry.modified = pax.mtime.or_else(|| {
                i64::try_from(mtime)
                    .ok()
                    .and_then(crate::timestamp::from_unix_secs)
            });
            entry.attributes = Some((mode & 0o7777) as u32);
            entry.locator = EntryLocator {
                header_offset: record_start,
                data_offset: self.offset,
                layout: BodyLayout::Raw {
                    compressed_size: size,
                },
                check_byte: None,
            };
            return Ok(Some(entry));
        }
    }
}

impl ContainerBackend for TarBackend {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Tar
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn scan_entries(&mut self, volumes: &mut VolumeSet) -> Result<Vec<Entry>> {
        volumes.seek(SeekFrom::Start(0))?;
        self.offset = 0;
        self.ended = false;

        let mut entries = Vec::new();
        loop {
            let entry = match self.read_header(volumes) {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(Error::CorruptHeader { offset, reason, .. }) => {
                    return Err(Error::CorruptHeader {
                        offset,
                        volume: volumes.volume_at(offset),
                        reason,
                    });
                }
                Err(e) => return Err(e),
            };
            let mut entry = entry;
            let payload = entry.payload_len();
            let end = entry.locator.data_offset + payload;
            entry.index = entries.len();
            entry.volume_index_first = volumes.volume_at(entry.locator.header_offset);
            entry.volume_index_last = volumes.volume_at(end.max(entry.locator.data_offset) - 1);
            if end > volumes.total_size() {
                log::debug!(
                    "Tar entry '{}' extends past the end of the archive",
                    entry.path
                );
            }

            self.offset = end + padding(payload);
            volumes.seek(SeekFrom::Start(self.offset))?;
            entries.push(entry);
        }
        log::debug!("Scanned {} tar entries", entries.len());
        Ok(entries)
    }

    fn next_entry(&mut self, input: &mut dyn Read) -> Result<Option<Entry>> {
        self.read_header(input)
    }

    fn finish_entry(&mut self, input: &mut dyn Read, entry: &Entry, unread: u64) -> Result<()> {
        let skipped = self.skip_counted(input, unread)?;
        if skipped < unread {
            let payload = entry.payload_len();
            return Err(Error::corrupt_stream(
                Some(&entry.path),
                StreamFault::Truncated {
                    consumed: payload - unread + skipped,
                },
            ));
        }
        let pad = padding(entry.payload_len());
        if self.skip_counted(input, pad)? < pad {
            log::debug!("Tar stream ends inside the padding of '{}'", entry.path);
        }
        Ok(())
    }
}
