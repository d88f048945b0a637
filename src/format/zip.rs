//! ZIP container backend.
//!
//! Random access reads the central directory found through the end of
//! central directory record (and its zip64 counterpart). Split and spanned
//! archives record offsets relative to the disk they live on; those are
//! mapped onto the logical stream of the [`VolumeSet`] with the volume start
//! offsets, disk `n` being volume `n`.
//!
//! Streaming reads local file headers in order. Entries whose sizes are
//! deferred to a trailing data descriptor cannot be delimited without the
//! central directory and are rejected in streaming mode.
//!
//! Traditional PKWARE encryption is recognized; the check byte used to
//! validate a password is recorded in the entry's locator.

use std::io::{self, Read, Seek, SeekFrom};
use std::time::SystemTime;

use super::reader::{read_bytes, read_full, read_u16_le, read_u32_le, read_u64_le, skip};
use super::{ArchiveFormat, BackendFactory, ContainerBackend};
use crate::codec::{CodecRegistry, CompressionId};
use crate::error::StreamFault;
use crate::read::{BodyLayout, Entry, EntryLocator};
use crate::timestamp;
use crate::volume::VolumeSet;
use crate::{Error, Result};

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;
const ZIP64_EOCD_SIG: u32 = 0x0606_4b50;
const ZIP64_LOCATOR_SIG: u32 = 0x0706_4b50;
const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;
/// Marks the first disk of a split archive; same value as the descriptor.
const SPANNING_SIG: u32 = DATA_DESCRIPTOR_SIG;
/// Written by some tools when a spanned archive ended up on one disk.
const SINGLE_SEGMENT_SIG: u32 = 0x3030_4b50;

const EOCD_SIZE: usize = 22;
const ZIP64_LOCATOR_SIZE: usize = 20;
const LOCAL_HEADER_SIZE: u64 = 30;
const MAX_COMMENT: usize = u16::MAX as usize;

const FLAG_ENCRYPTED: u16 = 0x0001;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
const FLAG_UTF8: u16 = 0x0800;

const EXTRA_ZIP64: u16 = 0x0001;
const EXTRA_NTFS: u16 = 0x000a;
const EXTRA_EXT_TIMESTAMP: u16 = 0x5455;

const HOST_UNIX: u8 = 3;
const DOS_DIRECTORY: u32 = 0x10;
const UNIX_TYPE_MASK: u32 = 0o170_000;
const UNIX_DIRECTORY: u32 = 0o040_000;

/// Recognizes ZIP archives by their leading signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipFactory;

impl BackendFactory for ZipFactory {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn probe(&self, head: &[u8], _codecs: &CodecRegistry) -> bool {
        let Some(sig) = head.get(..4) else {
            return false;
        };
        let sig = u32::from_le_bytes([sig[0], sig[1], sig[2], sig[3]]);
        matches!(
            sig,
            LOCAL_HEADER_SIG | EOCD_SIG | SPANNING_SIG | SINGLE_SEGMENT_SIG
        )
    }

    fn create(&self) -> Box<dyn ContainerBackend> {
        Box::new(ZipBackend::new())
    }
}

/// Sizes and offsets that a zip64 extra field may widen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct WideFields {
    size: u64,
    compressed_size: u64,
    offset: u64,
    disk: u32,
    zip64: bool,
}

/// Applies the extra fields of a header, returning the most precise
/// modification time found.
fn parse_extra(mut extra: &[u8], fields: &mut WideFields) -> Option<SystemTime> {
    let mut modified = None;
    let mut ntfs = None;
    while extra.len() >= 4 {
        let id = u16::from_le_bytes([extra[0], extra[1]]);
        let len = usize::from(u16::from_le_bytes([extra[2], extra[3]]));
        let Some(data) = extra.get(4..4 + len) else {
            break;
        };
        match id {
            EXTRA_ZIP64 => {
                let mut r = data;
                fields.zip64 = true;
                if fields.size == u64::from(u32::MAX) {
                    if let Ok(v) = read_u64_le(&mut r) {
                        fields.size = v;
                    }
                }
                if fields.compressed_size == u64::from(u32::MAX) {
                    if let Ok(v) = read_u64_le(&mut r) {
                        fields.compressed_size = v;
                    }
                }
                if fields.offset == u64::from(u32::MAX) {
                    if let Ok(v) = read_u64_le(&mut r) {
                        fields.offset = v;
                    }
                }
                if fields.disk == u32::from(u16::MAX) {
                    if let Ok(v) = read_u32_le(&mut r) {
                        fields.disk = v;
                    }
                }
            }
            EXTRA_EXT_TIMESTAMP => {
                if data.len() >= 5 && data[0] & 0x01 != 0 {
                    let secs = i32::from_le_bytes([data[1], data[2], data[3], data[4]]);
                    modified = timestamp::from_unix_secs(i64::from(secs));
                }
            }
            EXTRA_NTFS => {
                // reserved(4), then tag 1 holds mtime, atime, ctime
                if data.len() >= 32 && data[4..6] == [1, 0] {
                    let mtime = u64::from_le_bytes([
                        data[8], data[9], data[10], data[11], data[12], data[13], data[14],
                        data[15],
                    ]);
                    ntfs = timestamp::from_filetime(mtime);
                }
            }
            _ => {}
        }
        extra = &extra[4 + len..];
    }
    ntfs.or(modified)
}

fn decode_name(raw: &[u8], flags: u16) -> String {
    if flags & FLAG_UTF8 == 0 && !raw.is_ascii() {
        log::trace!("Non-UTF-8 ZIP name decoded lossily");
    }
    String::from_utf8_lossy(raw).replace('\\', "/")
}

fn check_byte(flags: u16, crc: u32, dos_time: u16) -> u8 {
    if flags & FLAG_DATA_DESCRIPTOR != 0 {
        (dos_time >> 8) as u8
    } else {
        (crc >> 24) as u8
    }
}

/// The end of central directory, with zip64 values folded in.
#[derive(Debug, Clone, Copy)]
struct CentralDirectory {
    disk: u32,
    cd_disk: u32,
    entries: u64,
    size: u64,
    offset: u64,
}

/// One parsed central directory record.
struct CentralRecord {
    made_by: u16,
    flags: u16,
    method: u16,
    dos_time: u16,
    dos_date: u16,
    crc: u32,
    wide: WideFields,
    external_attr: u32,
    name: String,
    modified: Option<SystemTime>,
}

impl CentralRecord {
    fn parse(r: &mut &[u8]) -> io::Result<Self> {
        let made_by = read_u16_le(r)?;
        let _needed = read_u16_le(r)?;
        let flags = read_u16_le(r)?;
        let method = read_u16_le(r)?;
        let dos_time = read_u16_le(r)?;
        let dos_date = read_u16_le(r)?;
        let crc = read_u32_le(r)?;
        let compressed_size = u64::from(read_u32_le(r)?);
        let size = u64::from(read_u32_le(r)?);
        let name_len = usize::from(read_u16_le(r)?);
        let extra_len = usize::from(read_u16_le(r)?);
        let comment_len = usize::from(read_u16_le(r)?);
        let disk = u32::from(read_u16_le(r)?);
        let _internal_attr = read_u16_le(r)?;
        let external_attr = read_u32_le(r)?;
        let offset = u64::from(read_u32_le(r)?);
        let name = read_bytes(r, name_len)?;
        let extra = read_bytes(r, extra_len)?;
        let _comment = read_bytes(r, comment_len)?;

        let mut wide = WideFields {
            size,
            compressed_size,
            offset,
            disk,
            zip64: false,
        };
        let modified = parse_extra(&extra, &mut wide);
        Ok(Self {
            made_by,
            flags,
            method,
            dos_time,
            dos_date,
            crc,
            wide,
            external_attr,
            name: decode_name(&name, flags),
            modified,
        })
    }

    fn unix_mode(&self) -> Option<u32> {
        ((self.made_by >> 8) as u8 == HOST_UNIX && self.external_attr >> 16 != 0)
            .then_some(self.external_attr >> 16)
    }

    fn is_directory(&self) -> bool {
        self.name.ends_with('/')
            || self.unix_mode().is_some_and(|m| m & UNIX_TYPE_MASK == UNIX_DIRECTORY)
            || (self.unix_mode().is_none() && self.external_attr & DOS_DIRECTORY != 0)
    }

    fn into_entry(self) -> Entry {
        let mut entry = if self.is_directory() {
            Entry::directory(self.name.clone())
        } else {
            Entry::new(
                self.name.clone(),
                self.wide.size,
                CompressionId::from_zip_method(self.method),
            )
        };
        entry.compressed_size = Some(self.wide.compressed_size);
        entry.crc32 = Some(self.crc);
        entry.modified = self
            .modified
            .or_else(|| timestamp::from_dos(self.dos_date, self.dos_time));
        entry.attributes = self.unix_mode().map(|m| m & 0o7777);
        entry.is_encrypted = self.flags & FLAG_ENCRYPTED != 0;
        entry.locator.check_byte = entry
            .is_encrypted
            .then(|| check_byte(self.flags, self.crc, self.dos_time));
        entry
    }
}

/// Remembers how a streamed entry ends.
#[derive(Debug, Clone, Copy)]
struct PendingDescriptor {
    zip64: bool,
}

/// Parses ZIP archives.
#[derive(Debug, Default)]
pub struct ZipBackend {
    /// Offset of the next unread byte in streaming mode.
    offset: u64,
    ended: bool,
    descriptor: Option<PendingDescriptor>,
}

impl ZipBackend {
    /// Creates a backend positioned at the start of the archive.
    pub fn new() -> Self {
        Self::default()
    }

    fn corrupt(volumes: &VolumeSet, offset: u64, reason: impl Into<String>) -> Error {
        Error::CorruptHeader {
            offset,
            volume: volumes.volume_at(offset),
            reason: reason.into(),
        }
    }

    /// Finds and parses the end of central directory record.
    fn find_central_directory(volumes: &mut VolumeSet) -> Result<CentralDirectory> {
        let total = volumes.total_size();
        let tail_len = total.min((EOCD_SIZE + MAX_COMMENT) as u64);
        let tail_start = total - tail_len;
        volumes.seek(SeekFrom::Start(tail_start))?;
        let tail = read_bytes(volumes, tail_len as usize)?;

        let eocd_pos = (0..=tail.len().saturating_sub(EOCD_SIZE))
            .rev()
            .find(|&pos| {
                tail.len() >= EOCD_SIZE
                    && tail[pos..pos + 4] == EOCD_SIG.to_le_bytes()
                    && pos + EOCD_SIZE + usize::from(u16::from_le_bytes([tail[pos + 20], tail[pos + 21]]))
                        <= tail.len()
            })
            .ok_or_else(|| Self::corrupt(volumes, total, "end of central directory not found"))?;

        let mut r = &tail[eocd_pos + 4..];
        let eocd_offset = tail_start + eocd_pos as u64;
        let truncated = |_: io::Error| Self::corrupt(volumes, eocd_offset, "truncated end record");
        let disk = u32::from(read_u16_le(&mut r).map_err(truncated)?);
        let cd_disk = u32::from(read_u16_le(&mut r).map_err(truncated)?);
        let _disk_entries = read_u16_le(&mut r).map_err(truncated)?;
        let entries = u64::from(read_u16_le(&mut r).map_err(truncated)?);
        let size = u64::from(read_u32_le(&mut r).map_err(truncated)?);
        let offset = u64::from(read_u32_le(&mut r).map_err(truncated)?);
        let mut cd = CentralDirectory {
            disk,
            cd_disk,
            entries,
            size,
            offset,
        };

        let needs_zip64 = disk == u32::from(u16::MAX)
            || cd_disk == u32::from(u16::MAX)
            || entries == u64::from(u16::MAX)
            || size == u64::from(u32::MAX)
            || offset == u64::from(u32::MAX);
        if eocd_pos >= ZIP64_LOCATOR_SIZE {
            let loc = &tail[eocd_pos - ZIP64_LOCATOR_SIZE..eocd_pos];
            if loc[..4] == ZIP64_LOCATOR_SIG.to_le_bytes() {
                let mut r = &loc[4..];
                let loc_disk = read_u32_le(&mut r).map_err(truncated)?;
                let zip64_offset = read_u64_le(&mut r).map_err(truncated)?;
                let resolved = Self::resolve(volumes, &cd, loc_disk, zip64_offset);
                cd = Self::read_zip64_end(volumes, resolved)?;
            } else if needs_zip64 {
                return Err(Self::corrupt(volumes, eocd_offset, "zip64 locator missing"));
            }
        }
        log::debug!(
            "ZIP central directory: {} entries, {} bytes at disk {} offset {}",
            cd.entries,
            cd.size,
            cd.cd_disk,
            cd.offset
        );
        Ok(cd)
    }

    fn read_zip64_end(volumes: &mut VolumeSet, at: u64) -> Result<CentralDirectory> {
        volumes.seek(SeekFrom::Start(at))?;
        let truncated = |_: io::Error| Error::CorruptHeader {
            offset: at,
            volume: 0,
            reason: "truncated zip64 end record".into(),
        };
        let record = read_bytes(volumes, 56).map_err(truncated)?;
        let mut r = &record[..];
        if read_u32_le(&mut r).map_err(truncated)? != ZIP64_EOCD_SIG {
            return Err(Self::corrupt(volumes, at, "bad zip64 end record signature"));
        }
        let _record_size = read_u64_le(&mut r).map_err(truncated)?;
        let _made_by = read_u16_le(&mut r).map_err(truncated)?;
        let _needed = read_u16_le(&mut r).map_err(truncated)?;
        let disk = read_u32_le(&mut r).map_err(truncated)?;
        let cd_disk = read_u32_le(&mut r).map_err(truncated)?;
        let _disk_entries = read_u64_le(&mut r).map_err(truncated)?;
        let entries = read_u64_le(&mut r).map_err(truncated)?;
        let size = read_u64_le(&mut r).map_err(truncated)?;
        let offset = read_u64_le(&mut r).map_err(truncated)?;
        Ok(CentralDirectory {
            disk,
            cd_disk,
            entries,
            size,
            offset,
        })
    }

    /// Maps a per-disk offset onto the logical volume stream.
    ///
    /// Offsets are per disk only when the archive really was written to
    /// several disks and is presented as several volumes.
    fn resolve(volumes: &VolumeSet, cd: &CentralDirectory, disk: u32, offset: u64) -> u64 {
        if cd.disk == 0 || volumes.len() < 2 {
            return offset;
        }
        volumes
            .volume_start(disk as usize)
            .map_or(offset, |start| start.saturating_add(offset))
    }

    fn read_local_data_offset(volumes: &mut VolumeSet, header_offset: u64) -> Result<u64> {
        volumes.seek(SeekFrom::Start(header_offset))?;
        let mut header = [0u8; LOCAL_HEADER_SIZE as usize];
        if read_full(volumes, &mut header)? < header.len() {
            return Err(Self::corrupt(volumes, header_offset, "truncated local header"));
        }
        if header[..4] != LOCAL_HEADER_SIG.to_le_bytes() {
            return Err(Self::corrupt(volumes, header_offset, "bad local header signature"));
        }
        let name_len = u64::from(u16::from_le_bytes([header[26], header[27]]));
        let extra_len = u64::from(u16::from_le_bytes([header[28], header[29]]));
        Ok(header_offset + LOCAL_HEADER_SIZE + name_len + extra_len)
    }

    fn read_local_header(&mut self, input: &mut dyn Read, header_offset: u64) -> Result<Entry> {
        let truncated = |_: io::Error| Error::CorruptHeader {
            offset: header_offset,
            volume: 0,
            reason: "truncated local header".into(),
        };
        let fixed = read_bytes(input, LOCAL_HEADER_SIZE as usize - 4).map_err(truncated)?;
        let mut r = &fixed[..];
        let _needed = read_u16_le(&mut r).map_err(truncated)?;
        let flags = read_u16_le(&mut r).map_err(truncated)?;
        let method = read_u16_le(&mut r).map_err(truncated)?;
        let dos_time = read_u16_le(&mut r).map_err(truncated)?;
        let dos_date = read_u16_le(&mut r).map_err(truncated)?;
        let crc = read_u32_le(&mut r).map_err(truncated)?;
        let compressed_size = u64::from(read_u32_le(&mut r).map_err(truncated)?);
        let size = u64::from(read_u32_le(&mut r).map_err(truncated)?);
        let name_len = usize::from(read_u16_le(&mut r).map_err(truncated)?);
        let extra_len = usize::from(read_u16_le(&mut r).map_err(truncated)?);
        let name = read_bytes(input, name_len).map_err(truncated)?;
        let extra = read_bytes(input, extra_len).map_err(truncated)?;
        self.offset += LOCAL_HEADER_SIZE - 4 + (name_len + extra_len) as u64;

        let mut wide = WideFields {
            size,
            compressed_size,
            ..WideFields::default()
        };
        let modified = parse_extra(&extra, &mut wide);
        let name = decode_name(&name, flags);
        let is_directory = name.ends_with('/');
        let deferred = flags & FLAG_DATA_DESCRIPTOR != 0;

        if deferred && !is_directory && wide.compressed_size == 0 && wide.size == 0 {
            return Err(Error::UnsupportedFeature {
                feature: "streamed ZIP entry with sizes in a trailing data descriptor",
            });
        }
        self.descriptor = deferred.then_some(PendingDescriptor { zip64: wide.zip64 });

        let mut entry = if is_directory {
            Entry::directory(name)
        } else {
            Entry::new(name, wide.size, CompressionId::from_zip_method(method))
        };
        entry.compressed_size = Some(wide.compressed_size);
        entry.crc32 = (!deferred || crc != 0).then_some(crc);
        entry.modified = modified.or_else(|| timestamp::from_dos(dos_date, dos_time));
        entry.is_encrypted = flags & FLAG_ENCRYPTED != 0;
        entry.locator = EntryLocator {
            header_offset,
            data_offset: self.offset,
            layout: BodyLayout::Raw {
                compressed_size: wide.compressed_size,
            },
            check_byte: entry
                .is_encrypted
                .then(|| check_byte(flags, crc, dos_time)),
        };
        Ok(entry)
    }

    fn skip_descriptor(&mut self, input: &mut dyn Read, descriptor: PendingDescriptor) -> Result<()> {
        let body = if descriptor.zip64 { 20 } else { 12 };
        let mut first = [0u8; 4];
        let n = read_full(input, &mut first)?;
        self.offset += n as u64;
        let rest = if n == 4 && u32::from_le_bytes(first) == DATA_DESCRIPTOR_SIG {
            body
        } else {
            body - 4
        };
        let skipped = skip(input, rest)?;
        self.offset += skipped;
        if n < 4 || skipped < rest {
            return Err(Error::CorruptHeader {
                offset: self.offset,
                volume: 0,
                reason: "truncated data descriptor".into(),
            });
        }
        Ok(())
    }
}

impl ContainerBackend for ZipBackend {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn scan_entries(&mut self, volumes: &mut VolumeSet) -> Result<Vec<Entry>> {
        let cd = Self::find_central_directory(volumes)?;
        let cd_start = Self::resolve(volumes, &cd, cd.cd_disk, cd.offset);
        if cd_start.saturating_add(cd.size) > volumes.total_size() {
            return Err(Self::corrupt(
                volumes,
                cd_start,
                "central directory extends past the end of the archive",
            ));
        }
        volumes.seek(SeekFrom::Start(cd_start))?;
        let directory = read_bytes(volumes, cd.size as usize)?;

        let mut r = &directory[..];
        let mut records = Vec::new();
        while records.len() as u64 != cd.entries {
            let at = cd_start + (directory.len() - r.len()) as u64;
            match read_u32_le(&mut r) {
                Ok(CENTRAL_HEADER_SIG) => {}
                Ok(_) => {
                    return Err(Self::corrupt(volumes, at, "bad central header signature"));
                }
                Err(_) => {
                    return Err(Self::corrupt(
                        volumes,
                        at,
                        format!(
                            "central directory ends after {} of {} entries",
                            records.len(),
                            cd.entries
                        ),
                    ));
                }
            }
            let record = CentralRecord::parse(&mut r)
                .map_err(|_| Self::corrupt(volumes, at, "truncated central header"))?;
            records.push(record);
        }

        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let header_offset = Self::resolve(volumes, &cd, record.wide.disk, record.wide.offset);
            let data_offset = Self::read_local_data_offset(volumes, header_offset)?;
            let compressed_size = record.wide.compressed_size;
            let data_end = data_offset
                .checked_add(compressed_size)
                .ok_or_else(|| Self::corrupt(volumes, header_offset, "entry size overflows"))?;

            let mut entry = record.into_entry();
            entry.index = entries.len();
            entry.locator.header_offset = header_offset;
            entry.locator.data_offset = data_offset;
            entry.locator.layout = BodyLayout::Raw { compressed_size };
            entry.volume_index_first = volumes.volume_at(header_offset);
            entry.volume_index_last =
                volumes.volume_at(data_end.max(header_offset + 1) - 1);
            entries.push(entry);
        }
        Ok(entries)
    }

    fn next_entry(&mut self, input: &mut dyn Read) -> Result<Option<Entry>> {
        if self.ended {
            return Ok(None);
        }
        loop {
            let header_offset = self.offset;
            let mut sig = [0u8; 4];
            let n = read_full(input, &mut sig)?;
            self.offset += n as u64;
            if n < 4 {
                log::debug!("ZIP stream ends without a central directory");
                self.ended = true;
                return Ok(None);
            }
            match u32::from_le_bytes(sig) {
                LOCAL_HEADER_SIG => return self.read_local_header(input, header_offset).map(Some),
                SPANNING_SIG | SINGLE_SEGMENT_SIG if header_offset == 0 => continue,
                CENTRAL_HEADER_SIG | EOCD_SIG | ZIP64_EOCD_SIG | ZIP64_LOCATOR_SIG => {
                    log::trace!("ZIP local headers end at offset {}", header_offset);
                    self.ended = true;
                    return Ok(None);
                }
                other => {
                    return Err(Error::CorruptHeader {
                        offset: header_offset,
                        volume: 0,
                        reason: format!("unexpected signature {:#010x}", other),
                    });
                }
            }
        }
    }

    fn finish_entry(&mut self, input: &mut dyn Read, entry: &Entry, unread: u64) -> Result<()> {
        let skipped = skip(input, unread)?;
        self.offset += skipped;
        if skipped < unread {
            return Err(Error::corrupt_stream(
                Some(&entry.path),
                StreamFault::Truncated {
                    consumed: entry.payload_len() - unread + skipped,
                },
            ));
        }
        if let Some(descriptor) = self.descriptor.take() {
            self.skip_descriptor(input, descriptor)?;
        }
        Ok(())
    }
}
