//! Shared test utilities for integration tests.
//!
//! This module builds small ZIP and tar archives in memory, wraps them in
//! gzip or bzip2 streams and splits them into numbered part files, so the
//! integration tests do not depend on binary fixtures.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use polyarc::codec::{Password, ZipCryptoKeys};

/// DOS date of 2021-06-15 used for every ZIP entry.
pub const DOS_DATE: u16 = (41 << 9) | (6 << 5) | 15;
/// DOS time of 12:00:00 used for every ZIP entry.
pub const DOS_TIME: u16 = 12 << 11;
/// Modification time written into tar headers (2020-09-13T12:26:40Z).
pub const TAR_MTIME: u64 = 1_600_000_000;

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;

const FLAG_ENCRYPTED: u16 = 0x0001;
const FLAG_UTF8: u16 = 0x0800;

/// ZIP method number for Deflate.
pub const METHOD_DEFLATE: u16 = 8;
/// ZIP method number for BZip2.
pub const METHOD_BZIP2: u16 = 12;

struct ZipRecord {
    name: String,
    method: u16,
    flags: u16,
    crc: u32,
    size: u32,
    payload: Vec<u8>,
    made_by: u16,
    external: u32,
}

/// Builds ZIP archives entry by entry.
///
/// ```ignore
/// let zip = ZipBuilder::new()
///     .stored("a.txt", b"hello")
///     .deflated("b.txt", b"0123456789")
///     .build();
/// ```
#[derive(Default)]
pub struct ZipBuilder {
    records: Vec<ZipRecord>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, name: &str, method: u16, data: &[u8], payload: Vec<u8>) -> Self {
        self.records.push(ZipRecord {
            name: name.to_string(),
            method,
            flags: FLAG_UTF8,
            crc: crc32fast::hash(data),
            size: data.len() as u32,
            payload,
            made_by: 20,
            external: 0,
        });
        self
    }

    /// Adds an uncompressed entry.
    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.push(name, 0, data, data.to_vec())
    }

    /// Adds a Deflate-compressed entry.
    #[cfg(feature = "deflate")]
    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.push(name, METHOD_DEFLATE, data, deflate_raw(data))
    }

    /// Adds a BZip2-compressed entry.
    #[cfg(feature = "bzip2")]
    pub fn bzipped(self, name: &str, data: &[u8]) -> Self {
        self.push(name, METHOD_BZIP2, data, bzip2(data))
    }

    /// Adds an entry with an arbitrary method number and payload.
    ///
    /// `data` is what the payload decodes to; it only feeds the size and
    /// CRC fields.
    pub fn with_method(self, name: &str, method: u16, data: &[u8], payload: &[u8]) -> Self {
        self.push(name, method, data, payload.to_vec())
    }

    /// Adds a stored entry encrypted with traditional PKWARE encryption.
    pub fn encrypted(self, name: &str, data: &[u8], password: &str) -> Self {
        let crc = crc32fast::hash(data);
        let mut keys = ZipCryptoKeys::new(&Password::new(password));
        let mut header = [0x5au8; 12];
        header[11] = (crc >> 24) as u8;

        let mut payload = Vec::with_capacity(header.len() + data.len());
        payload.extend(header.iter().map(|&b| keys.encrypt_byte(b)));
        payload.extend(data.iter().map(|&b| keys.encrypt_byte(b)));

        let mut builder = self.push(name, 0, data, payload);
        if let Some(record) = builder.records.last_mut() {
            record.flags |= FLAG_ENCRYPTED;
        }
        builder
    }

    /// Adds a directory entry. A trailing `/` is appended if missing.
    pub fn directory(mut self, name: &str) -> Self {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        self.records.push(ZipRecord {
            name,
            method: 0,
            flags: FLAG_UTF8,
            crc: 0,
            size: 0,
            payload: Vec::new(),
            made_by: 20,
            external: 0x10,
        });
        self
    }

    /// Sets Unix permission bits on the most recently added entry.
    pub fn mode(mut self, mode: u32) -> Self {
        if let Some(record) = self.records.last_mut() {
            let kind = if record.name.ends_with('/') { 0o040_000 } else { 0o100_000 };
            record.made_by = (3 << 8) | 20;
            record.external = (kind | mode) << 16;
        }
        self
    }

    /// Serializes local headers, central directory and end record.
    pub fn build(self) -> Vec<u8> {
        self.build_with_offsets().0
    }

    /// Like [`build`](Self::build), also returning each local header offset.
    pub fn build_with_offsets(self) -> (Vec<u8>, Vec<usize>) {
        let mut out = Vec::new();
        let mut offsets = Vec::with_capacity(self.records.len());

        for record in &self.records {
            offsets.push(out.len());
            put_u32(&mut out, LOCAL_HEADER_SIG);
            put_u16(&mut out, 20);
            put_u16(&mut out, record.flags);
            put_u16(&mut out, record.method);
            put_u16(&mut out, DOS_TIME);
            put_u16(&mut out, DOS_DATE);
            put_u32(&mut out, record.crc);
            put_u32(&mut out, record.payload.len() as u32);
            put_u32(&mut out, record.size);
            put_u16(&mut out, record.name.len() as u16);
            put_u16(&mut out, 0);
            out.extend_from_slice(record.name.as_bytes());
            out.extend_from_slice(&record.payload);
        }

        let cd_offset = out.len();
        for (record, &offset) in self.records.iter().zip(&offsets) {
            put_u32(&mut out, CENTRAL_HEADER_SIG);
            put_u16(&mut out, record.made_by);
            put_u16(&mut out, 20);
            put_u16(&mut out, record.flags);
            put_u16(&mut out, record.method);
            put_u16(&mut out, DOS_TIME);
            put_u16(&mut out, DOS_DATE);
            put_u32(&mut out, record.crc);
            put_u32(&mut out, record.payload.len() as u32);
            put_u32(&mut out, record.size);
            put_u16(&mut out, record.name.len() as u16);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0);
            put_u16(&mut out, 0);
            put_u32(&mut out, record.external);
            put_u32(&mut out, offset as u32);
            out.extend_from_slice(record.name.as_bytes());
        }
        let cd_size = out.len() - cd_offset;

        put_u32(&mut out, EOCD_SIG);
        put_u16(&mut out, 0);
        put_u16(&mut out, 0);
        put_u16(&mut out, self.records.len() as u16);
        put_u16(&mut out, self.records.len() as u16);
        put_u32(&mut out, cd_size as u32);
        put_u32(&mut out, cd_offset as u32);
        put_u16(&mut out, 0);
        (out, offsets)
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Size of a tar block.
pub const TAR_BLOCK: usize = 512;

/// Builds ustar archives.
#[derive(Default)]
pub struct TarBuilder {
    out: Vec<u8>,
}

impl TarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a regular file with mode 0644.
    pub fn file(self, name: &str, data: &[u8]) -> Self {
        self.file_with_mode(name, data, 0o644)
    }

    /// Adds a regular file with the given permission bits.
    pub fn file_with_mode(mut self, name: &str, data: &[u8], mode: u32) -> Self {
        self.out
            .extend_from_slice(&tar_header(name, data.len() as u64, b'0', mode));
        self.out.extend_from_slice(data);
        let padded = self.out.len().div_ceil(TAR_BLOCK) * TAR_BLOCK;
        self.out.resize(padded, 0);
        self
    }

    /// Adds a directory record.
    pub fn directory(mut self, name: &str) -> Self {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        self.out.extend_from_slice(&tar_header(&name, 0, b'5', 0o755));
        self
    }

    /// Appends the two zero blocks that end the archive.
    pub fn build(mut self) -> Vec<u8> {
        self.out.resize(self.out.len() + 2 * TAR_BLOCK, 0);
        self.out
    }
}

/// Builds one ustar header block with a valid checksum.
pub fn tar_header(name: &str, size: u64, typeflag: u8, mode: u32) -> [u8; TAR_BLOCK] {
    assert!(name.len() <= 100, "tar test names must fit the name field");
    let mut block = [0u8; TAR_BLOCK];
    block[..name.len()].copy_from_slice(name.as_bytes());
    block[100..108].copy_from_slice(format!("{:07o}\0", mode).as_bytes());
    block[108..116].copy_from_slice(b"0001750\0");
    block[116..124].copy_from_slice(b"0001750\0");
    block[124..136].copy_from_slice(format!("{:011o}\0", size).as_bytes());
    block[136..148].copy_from_slice(format!("{:011o}\0", TAR_MTIME).as_bytes());
    block[156] = typeflag;
    block[257..263].copy_from_slice(b"ustar\0");
    block[263..265].copy_from_slice(b"00");
    block[148..156].copy_from_slice(b"        ");
    let sum: u64 = block.iter().map(|&b| u64::from(b)).sum();
    block[148..156].copy_from_slice(format!("{:06o}\0 ", sum).as_bytes());
    block
}

/// Compresses `data` into a raw Deflate stream.
#[cfg(feature = "deflate")]
pub fn deflate_raw(data: &[u8]) -> Vec<u8> {
    use std::io::Write;

    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Wraps `data` in a gzip member.
#[cfg(feature = "deflate")]
pub fn gzip(data: &[u8]) -> Vec<u8> {
    use std::io::Write;

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Compresses `data` into a BZip2 stream.
#[cfg(feature = "bzip2")]
pub fn bzip2(data: &[u8]) -> Vec<u8> {
    use std::io::Write;

    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Returns `len` bytes of deterministic, mildly compressible content.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) % 61 + b'0')
        .collect()
}

/// Splits `data` at the given ascending cut offsets.
pub fn split_at(data: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut parts = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for &cut in cuts {
        parts.push(data[start..cut].to_vec());
        start = cut;
    }
    parts.push(data[start..].to_vec());
    parts
}

/// Splits `data` into `count` parts of roughly equal size.
pub fn split_even(data: &[u8], count: usize) -> Vec<Vec<u8>> {
    let chunk = data.len().div_ceil(count).max(1);
    let cuts: Vec<usize> = (1..count)
        .map(|i| (i * chunk).min(data.len()))
        .collect();
    split_at(data, &cuts)
}

/// Writes `parts` as `<stem>.part1`, `<stem>.part2`, ... into `dir`.
pub fn write_part_files(dir: &Path, stem: &str, parts: &[Vec<u8>]) -> Vec<PathBuf> {
    write_named(dir, parts, |i| format!("{stem}.part{}", i + 1))
}

/// Writes `parts` as `<base>.001`, `<base>.002`, ... into `dir`.
pub fn write_numbered_files(dir: &Path, base: &str, parts: &[Vec<u8>]) -> Vec<PathBuf> {
    write_named(dir, parts, |i| format!("{base}.{:03}", i + 1))
}

fn write_named(dir: &Path, parts: &[Vec<u8>], name: impl Fn(usize) -> String) -> Vec<PathBuf> {
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let path = dir.join(name(i));
            std::fs::write(&path, part).unwrap();
            path
        })
        .collect()
}
