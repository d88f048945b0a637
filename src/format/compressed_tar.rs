//! Tar archives wrapped in a single compressed stream.
//!
//! `.tar.gz`, `.tar.bz2` and `.tar.zst` archives compress the whole tar
//! stream at once, so every entry depends on the decoder state left behind
//! by the previous one. They are solid: the only way to reach an entry is
//! to decode everything in front of it, and only streaming access is
//! offered. The reader decodes the volumes with one archive-scoped session
//! and feeds the decoded bytes to an ordinary [`TarBackend`].

use std::io::Read;

use super::tar::{BLOCK_SIZE, TarBackend, starts_tar_stream};
use super::{ArchiveFormat, BackendFactory, ContainerBackend};
use crate::Result;
use crate::codec::{CodecRegistry, CompressionId, SessionScope};
use crate::read::{BodyLayout, Entry};

/// Recognizes one compressed tar flavour.
#[derive(Debug, Clone, Copy)]
pub struct CompressedTarFactory {
    format: ArchiveFormat,
    codec: CompressionId,
    magic: fn(&[u8]) -> bool,
}

impl CompressedTarFactory {
    /// Creates a factory for tar streams compressed with `codec`.
    ///
    /// `magic` is a cheap signature check run before the prefix is decoded.
    pub fn new(format: ArchiveFormat, codec: CompressionId, magic: fn(&[u8]) -> bool) -> Self {
        Self {
            format,
            codec,
            magic,
        }
    }

    /// `.tar.gz` archives.
    #[cfg(feature = "deflate")]
    pub fn gzip() -> Self {
        Self::new(
            ArchiveFormat::TarGz,
            CompressionId::Gzip,
            crate::codec::gzip::is_gzip,
        )
    }

    /// `.tar.bz2` archives.
    #[cfg(feature = "bzip2")]
    pub fn bzip2() -> Self {
        Self::new(
            ArchiveFormat::TarBz2,
            CompressionId::Bzip2,
            crate::codec::bzip2::is_bzip2,
        )
    }

    /// `.tar.zst` archives.
    #[cfg(feature = "zstd")]
    pub fn zstd() -> Self {
        Self::new(
            ArchiveFormat::TarZst,
            CompressionId::Zstd,
            crate::codec::zstd::is_zstd,
        )
    }

    /// Decodes the start of `head` and checks for a tar header.
    fn decodes_to_tar(&self, head: &[u8], codecs: &CodecRegistry) -> bool {
        let Ok(mut session) = codecs.open_session(self.codec, SessionScope::Entry) else {
            return false;
        };
        let mut input = head;
        let mut block = [0u8; BLOCK_SIZE];
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match session.read(&mut input, &mut block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    log::trace!("{} prefix does not decode: {}", self.format, e);
                    return false;
                }
            }
        }
        starts_tar_stream(&block[..filled])
    }
}

impl BackendFactory for CompressedTarFactory {
    fn format(&self) -> ArchiveFormat {
        self.format
    }

    fn probe(&self, head: &[u8], codecs: &CodecRegistry) -> bool {
        (self.magic)(head) && self.decodes_to_tar(head, codecs)
    }

    fn create(&self) -> Box<dyn ContainerBackend> {
        Box::new(CompressedTarBackend {
            format: self.format,
            codec: self.codec,
            inner: TarBackend::new(),
        })
    }
}

/// Streams tar entries out of a decoded solid stream.
#[derive(Debug)]
pub struct CompressedTarBackend {
    format: ArchiveFormat,
    codec: CompressionId,
    inner: TarBackend,
}

impl ContainerBackend for CompressedTarBackend {
    fn format(&self) -> ArchiveFormat {
        self.format
    }

    fn is_solid(&self) -> bool {
        true
    }

    fn solid_codec(&self) -> Option<CompressionId> {
        Some(self.codec)
    }

    fn supports_random_access(&self) -> bool {
        false
    }

    fn next_entry(&mut self, input: &mut dyn Read) -> Result<Option<Entry>> {
        Ok(self.inner.next_entry(input)?.map(|mut entry| {
            entry.compression = self.codec;
            entry.compressed_size = None;
            entry.locator.layout = BodyLayout::Solid;
            entry
        }))
    }

    fn finish_entry(&mut self, input: &mut dyn Read, entry: &Entry, unread: u64) -> Result<()> {
        self.inner.finish_entry(input, entry, unread)
    }
}

#[cfg(all(test, feature = "deflate"))]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn tar_with_one_file() -> Vec<u8> {
        let mut block = [0u8; BLOCK_SIZE];
        block[..5].copy_from_slice(b"f.txt");
        block[124..136].copy_from_slice(b"00000000003\0");
        block[156] = b'0';
        block[148..156].copy_from_slice(b"        ");
        let sum: u64 = block.iter().map(|&b| u64::from(b)).sum();
        block[148..156].copy_from_slice(format!("{:06o}\0 ", sum).as_bytes());
        let mut out = block.to_vec();
        out.extend_from_slice(b"abc");
        out.resize(BLOCK_SIZE * 4, 0);
        out
    }

    #[test]
    fn test_probe_requires_tar_inside() {
        let codecs = CodecRegistry::with_defaults();
        let factory = CompressedTarFactory::gzip();
        assert!(factory.probe(&gzip(&tar_with_one_file()), &codecs));
        assert!(!factory.probe(&gzip(b"plain text inside gzip"), &codecs));
        assert!(!factory.probe(b"not gzip at all", &codecs));
    }

    #[test]
    fn test_probe_needs_registered_codec() {
        let factory = CompressedTarFactory::gzip();
        assert!(!factory.probe(&gzip(&tar_with_one_file()), &CodecRegistry::empty()));
    }

    #[test]
    fn test_entries_are_solid() {
        let tar = tar_with_one_file();
        let mut backend = CompressedTarFactory::gzip().create();
        assert!(backend.is_solid());
        assert!(!backend.supports_random_access());
        let entry = backend.next_entry(&mut &tar[..]).unwrap().unwrap();
        assert_eq!(entry.path, "f.txt");
        assert_eq!(entry.compression, CompressionId::Gzip);
        assert_eq!(entry.locator.layout, BodyLayout::Solid);
        assert_eq!(entry.compressed_size, None);
    }
}
