//! Multi-volume archive integration tests.
//!
//! These tests verify:
//! - Discovery of sibling parts from the first part's path
//! - Entries spanning part boundaries report their volume range
//! - Missing parts surface as `VolumeResolution` or `NoMoreVolumes`
//! - Explicit part lists are checked against their naming convention

mod common;

use std::io::Cursor;

use common::{TarBuilder, ZipBuilder, pattern, split_at, split_even};
use polyarc::volume::file_parts;
use polyarc::{
    Archive, Error, MemorySink, Ownership, Reader, ReaderOptions, VolumeInput, VolumeSet,
};
use proptest::prelude::*;
use tempfile::tempdir;

/// A ZIP whose second entry starts in part 2 and ends in part 3.
fn spanning_zip() -> (Vec<Vec<u8>>, Vec<u8>) {
    let big = pattern(3000, 5);
    let (zip, offsets) = ZipBuilder::new()
        .stored("small.txt", &pattern(100, 1))
        .stored("big.bin", &big)
        .build_with_offsets();
    let parts = split_at(&zip, &[64, offsets[1] + 10]);
    (parts, big)
}

// =============================================================================
// Discovery
// =============================================================================

#[test]
fn test_part_discovery_and_spanning_entry() {
    let dir = tempdir().unwrap();
    let (parts, big) = spanning_zip();
    let written = common::write_part_files(dir.path(), "x", &parts);

    let discovered = file_parts(dir.path().join("x.part1")).unwrap();
    let names: Vec<String> = discovered
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["x.part1", "x.part2", "x.part3"]);
    assert_eq!(discovered, written);

    let mut archive = Archive::open_path(&written[0], ReaderOptions::default()).unwrap();
    assert_eq!(archive.volumes().len(), 3);

    let small = archive.entry(0).unwrap();
    assert_eq!((small.volume_index_first, small.volume_index_last), (0, 1));
    let spanning = archive.entry(1).unwrap();
    assert_eq!(spanning.path, "big.bin");
    assert_eq!(spanning.volume_index_first, 1);
    assert_eq!(spanning.volume_index_last, 2);
    assert!(spanning.spans_volumes());

    assert_eq!(archive.read_entry(1).unwrap(), big);
    assert_eq!(archive.read_entry(0).unwrap(), pattern(100, 1));
}

#[test]
fn test_volume_metadata() {
    let dir = tempdir().unwrap();
    let (parts, _) = spanning_zip();
    let written = common::write_part_files(dir.path(), "x", &parts);
    let archive = Archive::open_path(&written[0], ReaderOptions::default()).unwrap();

    let mut start = 0u64;
    for (i, (volume, part)) in archive.volumes().iter().zip(&parts).enumerate() {
        assert_eq!(volume.index(), i);
        assert_eq!(volume.size(), part.len() as u64);
        assert_eq!(volume.start_offset(), start);
        assert_eq!(volume.ownership(), Ownership::Owned);
        assert!(volume.name().ends_with(&format!("x.part{}", i + 1)));
        start += part.len() as u64;
    }
    assert_eq!(archive.volume_set().total_size(), start);
}

#[test]
fn test_streaming_over_parts() {
    let dir = tempdir().unwrap();
    let (parts, big) = spanning_zip();
    let written = common::write_part_files(dir.path(), "x", &parts);

    let mut reader = Reader::open_path(&written[0], ReaderOptions::default()).unwrap();
    let small = reader.advance().unwrap().unwrap();
    assert_eq!((small.volume_index_first, small.volume_index_last), (0, 1));

    let spanning = reader.advance().unwrap().unwrap().clone();
    assert_eq!(spanning.volume_index_first, 1);
    assert_eq!(spanning.volume_index_last, 2);
    assert_eq!(reader.read_body().unwrap(), big);
    assert!(reader.advance().unwrap().is_none());
}

#[test]
fn test_open_volumes_from_memory() {
    let (parts, big) = spanning_zip();
    let inputs = parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| {
            VolumeInput::new(
                format!("x.part{}", i + 1),
                Cursor::new(part),
                Ownership::Owned,
            )
        })
        .collect();
    let mut archive = Archive::open_volumes(inputs, ReaderOptions::default()).unwrap();
    assert_eq!(archive.volumes()[2].name(), "x.part3");
    assert_eq!(archive.read_entry(1).unwrap(), big);
}

#[test]
fn test_no_volumes_supplied() {
    let err = VolumeSet::new(Vec::new()).unwrap_err();
    assert!(matches!(err, Error::VolumeResolution { .. }));
}

// =============================================================================
// Missing parts
// =============================================================================

/// A tar holding one 4000-byte file, split into three parts of which the
/// last one is not written.
fn tar_missing_last_part(dir: &std::path::Path) -> std::path::PathBuf {
    let tar = TarBuilder::new().file("big.bin", &pattern(4000, 4)).build();
    let parts = split_at(&tar, &[1500, 3000]);
    let written = common::write_numbered_files(dir, "data.tar", &parts[..2]);
    written[0].clone()
}

#[test]
fn test_missing_trailing_part_random_access() {
    let dir = tempdir().unwrap();
    let first = tar_missing_last_part(dir.path());

    let mut archive = Archive::open_path(&first, ReaderOptions::default()).unwrap();
    assert_eq!(archive.volumes().len(), 2);
    match archive.read_entry(0) {
        Err(Error::NoMoreVolumes { volume, entry }) => {
            assert_eq!(volume, 1);
            assert_eq!(entry, "big.bin");
        }
        other => panic!("expected NoMoreVolumes, got {:?}", other.map(|v| v.len())),
    }
}

#[test]
fn test_missing_trailing_part_on_advance() {
    let dir = tempdir().unwrap();
    let first = tar_missing_last_part(dir.path());

    let mut reader = Reader::open_path(&first, ReaderOptions::default()).unwrap();
    assert_eq!(reader.advance().unwrap().unwrap().path, "big.bin");
    // Skipping the body runs into the end of the last available part.
    match reader.advance() {
        Err(Error::NoMoreVolumes { volume, entry }) => {
            assert_eq!(volume, 1);
            assert_eq!(entry, "big.bin");
        }
        other => panic!("expected NoMoreVolumes, got {other:?}"),
    }
    assert!(reader.is_exhausted());
}

#[test]
fn test_gap_in_numbering() {
    let dir = tempdir().unwrap();
    let (parts, _) = spanning_zip();
    let written = common::write_numbered_files(dir.path(), "x.zip", &parts);
    std::fs::remove_file(&written[1]).unwrap();

    let err = Archive::open_path(&written[0], ReaderOptions::default()).unwrap_err();
    match err {
        Error::VolumeResolution { path, .. } => {
            assert_eq!(path.file_name().unwrap(), "x.zip.002");
        }
        other => panic!("expected VolumeResolution, got {other:?}"),
    }
}

#[test]
fn test_explicit_part_list_out_of_order() {
    let dir = tempdir().unwrap();
    let (parts, _) = spanning_zip();
    let written = common::write_part_files(dir.path(), "x", &parts);
    let shuffled = [written[0].clone(), written[2].clone(), written[1].clone()];

    let err = Archive::open_paths(&shuffled, ReaderOptions::default()).unwrap_err();
    assert!(matches!(err, Error::VolumeResolution { .. }), "{err:?}");

    let mut archive = Archive::open_paths(&written, ReaderOptions::default()).unwrap();
    let mut sink = MemorySink::new();
    assert_eq!(archive.extract_all(&mut sink).unwrap().entries_extracted, 2);
}

#[test]
fn test_first_part_must_exist() {
    let dir = tempdir().unwrap();
    let err = file_parts(dir.path().join("nothing.001")).unwrap_err();
    assert!(matches!(err, Error::VolumeResolution { .. }));
}

// =============================================================================
// Solid runs across parts
// =============================================================================

#[cfg(feature = "deflate")]
#[test]
fn test_solid_run_across_parts() {
    // Pseudo-random bytes, so the compressed stream spans every part.
    let mut state = 0x2545_f491_4f6c_dd1du64;
    let noisy: Vec<u8> = (0..20_000)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect();
    let tar_noisy = TarBuilder::new().file("noise", &noisy).file("tail", b"end").build();

    let gz = common::gzip(&tar_noisy);
    let dir = tempdir().unwrap();
    let written = common::write_numbered_files(dir.path(), "n.tar.gz", &split_even(&gz, 4));

    let mut archive = Archive::open_path(&written[0], ReaderOptions::default()).unwrap();
    assert!(archive.is_solid());
    assert_eq!(archive.volumes().len(), 4);
    let noise = archive.entry(0).unwrap();
    assert_eq!(noise.volume_index_first, 0);
    assert!(noise.volume_index_last >= 2, "{noise:?}");
    assert_eq!(archive.entry(1).unwrap().volume_index_last, 3);

    let mut sink = MemorySink::new();
    archive.extract_all(&mut sink).unwrap();
    assert_eq!(sink.get("noise"), Some(&noisy[..]));
    assert_eq!(sink.get("tail"), Some(&b"end"[..]));
}

// =============================================================================
// Property tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Discovery from the first part returns every written part, in order.
    #[test]
    fn discovery_returns_all_parts(count in 1usize..12, numbered in any::<bool>()) {
        let dir = tempdir().unwrap();
        let parts: Vec<Vec<u8>> = (0..count).map(|i| vec![i as u8; 4]).collect();
        let written = if numbered {
            common::write_numbered_files(dir.path(), "set.bin", &parts)
        } else {
            common::write_part_files(dir.path(), "set", &parts)
        };

        let discovered = file_parts(&written[0]).unwrap();
        prop_assert_eq!(discovered, written);
    }
}

#[cfg(feature = "deflate")]
#[test]
fn test_short_codec_stream_across_parts_is_corrupt() {
    // Poorly compressible, so the Deflate payload spans both parts.
    let data: Vec<u8> = (0u32..4000)
        .map(|i| (i.wrapping_mul(i).wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect();
    let deflated = common::deflate_raw(&data);
    let half = &deflated[..deflated.len() / 2];
    let zip = ZipBuilder::new()
        .with_method("d.bin", common::METHOD_DEFLATE, &data, half)
        .build();

    let inputs = split_at(&zip, &[40])
        .into_iter()
        .enumerate()
        .map(|(i, part)| {
            VolumeInput::new(
                format!("d.part{}", i + 1),
                Cursor::new(part),
                Ownership::Owned,
            )
        })
        .collect();
    let mut archive = Archive::open_volumes(inputs, ReaderOptions::default()).unwrap();
    assert_eq!(archive.volumes().len(), 2);

    let err = archive.read_entry(0).unwrap_err();
    assert!(matches!(err, Error::CorruptStream { .. }), "{err:?}");
}
