//! Solid archive integration tests.
//!
//! Compressed tarballs decode every entry from one compressed stream. These
//! tests verify that:
//! - `extract_all` makes one ordered pass and is repeatable
//! - Out-of-order access is rejected instead of producing wrong bytes
//! - Single-entry requests are redirected to a sequential pass

#![cfg(feature = "deflate")]

mod common;

use std::io::Cursor;

use common::{TarBuilder, gzip, pattern};
use polyarc::codec::CompressionId;
use polyarc::{Archive, ArchiveFormat, Error, MemorySink, ReaderOptions};

fn tarball() -> Vec<u8> {
    gzip(
        &TarBuilder::new()
            .file("a.txt", b"alpha")
            .directory("dir")
            .file("dir/b.bin", &pattern(3000, 7))
            .file("c.txt", b"gamma")
            .build(),
    )
}

fn open() -> Archive {
    Archive::open(Cursor::new(tarball()), ReaderOptions::default()).unwrap()
}

#[test]
fn test_compressed_tar_is_solid() {
    let archive = open();
    assert_eq!(archive.format(), ArchiveFormat::TarGz);
    assert!(archive.is_solid());
    assert_eq!(archive.len(), 4);

    let paths: Vec<&str> = archive.entries().iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, ["a.txt", "dir", "dir/b.bin", "c.txt"]);

    let b = archive.entry(2).unwrap();
    assert_eq!(b.size, 3000);
    assert_eq!(b.compression, CompressionId::Gzip);
    assert_eq!(b.compressed_size, None);
    assert_eq!(b.crc32, None);
}

#[test]
fn test_extract_all_twice_is_identical() {
    let mut archive = open();

    let mut first = MemorySink::new();
    let result = archive.extract_all(&mut first).unwrap();
    assert_eq!(result.entries_extracted, 3);
    assert_eq!(result.directories_created, 1);
    assert_eq!(result.bytes_extracted, 3010);

    let mut second = MemorySink::new();
    archive.extract_all(&mut second).unwrap();

    assert_eq!(first.files(), second.files());
    assert_eq!(first.get("dir/b.bin"), Some(&pattern(3000, 7)[..]));
    assert_eq!(first.directories(), ["dir"]);
}

#[test]
fn test_open_entry_rejected() {
    let mut archive = open();
    match archive.open_entry(2) {
        Err(Error::SequentialAccessRequired { index, path }) => {
            assert_eq!(index, 2);
            assert_eq!(path, "dir/b.bin");
        }
        other => panic!("expected SequentialAccessRequired, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_read_entry_redirects_to_sequential_pass() {
    let mut archive = open();
    assert_eq!(archive.read_entry(3).unwrap(), b"gamma");
    // Each request starts a fresh pass, so earlier entries stay reachable.
    assert_eq!(archive.read_entry(0).unwrap(), b"alpha");
    assert_eq!(archive.read_entry_by_path("dir/b.bin").unwrap(), pattern(3000, 7));
}

#[test]
fn test_extract_entry_redirects_to_sequential_pass() {
    let mut archive = open();
    let mut sink = MemorySink::new();
    let result = archive.extract_entry(2, &mut sink).unwrap();
    assert_eq!(result.entries_extracted, 1);
    assert_eq!(sink.len(), 1);
    assert_eq!(sink.get("dir/b.bin"), Some(&pattern(3000, 7)[..]));
}

#[test]
fn test_sequential_reader_rejects_backwards_access() {
    let mut archive = open();
    let mut reader = archive.extract_all_entries().unwrap();
    assert!(reader.is_solid());

    assert_eq!(reader.advance_to(2).unwrap().path, "dir/b.bin");
    match reader.advance_to(0) {
        Err(Error::SequentialAccessRequired { index, path }) => {
            assert_eq!(index, 0);
            assert_eq!(path, "a.txt");
        }
        other => panic!("expected SequentialAccessRequired, got {other:?}"),
    }
}

#[test]
fn test_skipped_bodies_keep_the_run_aligned() {
    let mut archive = open();
    let mut reader = archive.extract_all_entries().unwrap();

    // Leave the first two entries unread, read only the last one.
    reader.advance().unwrap();
    reader.advance().unwrap();
    reader.advance().unwrap();
    assert_eq!(reader.advance().unwrap().unwrap().path, "c.txt");
    assert_eq!(reader.read_body().unwrap(), b"gamma");
    assert!(reader.advance().unwrap().is_none());
    assert!(reader.is_exhausted());
}

#[cfg(feature = "bzip2")]
#[test]
fn test_bzip2_tarball() {
    let tar = TarBuilder::new()
        .file("x", &pattern(10_000, 2))
        .file("y", b"why")
        .build();
    let mut archive =
        Archive::open(Cursor::new(common::bzip2(&tar)), ReaderOptions::default()).unwrap();
    assert_eq!(archive.format(), ArchiveFormat::TarBz2);
    assert!(archive.is_solid());
    assert_eq!(archive.read_entry(1).unwrap(), b"why");
}

#[test]
fn test_truncated_tarball() {
    let full = tarball();
    let cut = full[..full.len() / 2].to_vec();
    // Indexing at open time streams the whole run and hits the cut.
    let err = Archive::open(Cursor::new(cut), ReaderOptions::default()).unwrap_err();
    assert!(
        matches!(err, Error::CorruptStream { .. } | Error::CorruptHeader { .. }),
        "{err:?}"
    );
}
