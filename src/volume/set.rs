//! The ordered set of volumes backing one archive.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::source::{ByteSource, Ownership};
use crate::{Error, READ_BUFFER_SIZE, Result};

/// One physical input of an archive.
///
/// Volumes are created once when an archive is opened and keep their index
/// for the lifetime of the façade that owns them.
pub struct Volume {
    index: usize,
    name: String,
    start: u64,
    size: u64,
    ownership: Ownership,
    source: Option<Box<dyn ByteSource>>,
    /// Known position of `source`, if any.
    cursor: Option<u64>,
}

impl Volume {
    /// Returns the 0-based index in discovery order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the identifier the volume was supplied under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the size of the volume in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the logical offset of the volume's first byte.
    pub fn start_offset(&self) -> u64 {
        self.start
    }

    /// Returns whether the owning façade closes this volume's source.
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Returns true once the volume's source has been released.
    pub fn is_released(&self) -> bool {
        self.source.is_none()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| io::Error::other(format!("volume '{}' was released", self.name)))?;
        if self.cursor != Some(offset) {
            self.cursor = None;
            source.seek(SeekFrom::Start(offset))?;
        }
        match source.read(buf) {
            Ok(n) => {
                self.cursor = Some(offset + n as u64);
                Ok(n)
            }
            Err(e) => {
                self.cursor = None;
                Err(e)
            }
        }
    }

    fn release(&mut self) {
        let Some(mut source) = self.source.take() else {
            return;
        };
        if self.ownership == Ownership::Owned {
            if let Err(e) = source.close() {
                log::warn!("Failed to close volume {} '{}': {}", self.index, self.name, e);
            }
        }
        log::trace!("Released volume {} '{}' ({:?})", self.index, self.name, self.ownership);
    }
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("start", &self.start)
            .field("size", &self.size)
            .field("ownership", &self.ownership)
            .field("released", &self.is_released())
            .finish()
    }
}

/// A named byte source waiting to become a volume.
pub struct VolumeInput {
    name: String,
    source: Box<dyn ByteSource>,
    ownership: Ownership,
}

impl VolumeInput {
    /// Creates an input from a display name, a source and an ownership tag.
    pub fn new(
        name: impl Into<String>,
        source: impl ByteSource + 'static,
        ownership: Ownership,
    ) -> Self {
        Self {
            name: name.into(),
            source: Box::new(source),
            ownership,
        }
    }
}

/// The ordered volumes of an archive, read as one logical stream.
///
/// `VolumeSet` implements [`Read`] and [`Seek`] over the concatenation of
/// its volumes, so container backends parse multi-volume archives exactly
/// like single-file ones. Sources are released exactly once, either by
/// [`release`](Self::release) or when the set is dropped.
///
/// # Example
///
/// ```rust
/// use std::io::{Cursor, Read};
/// use polyarc::volume::{Ownership, VolumeInput, VolumeSet};
///
/// let mut set = VolumeSet::new(vec![
///     VolumeInput::new("a.001", Cursor::new(b"hel".to_vec()), Ownership::Owned),
///     VolumeInput::new("a.002", Cursor::new(b"lo".to_vec()), Ownership::Owned),
/// ])
/// .unwrap();
///
/// let mut text = String::new();
/// set.read_to_string(&mut text).unwrap();
/// assert_eq!(text, "hello");
/// assert_eq!(set.volume_at(3), 1);
/// ```
pub struct VolumeSet {
    volumes: Vec<Volume>,
    position: u64,
    total_size: u64,
    released: bool,
}

impl VolumeSet {
    /// Acquires the given inputs as volumes, in order.
    ///
    /// Each source is measured by seeking to its end. If measuring fails,
    /// every source acquired so far is released and the original error is
    /// returned.
    pub fn new(inputs: Vec<VolumeInput>) -> Result<Self> {
        if inputs.is_empty() {
            return Err(Error::VolumeResolution {
                path: PathBuf::new(),
                reason: "no volumes supplied".into(),
            });
        }

        let mut set = Self {
            volumes: Vec::with_capacity(inputs.len()),
            position: 0,
            total_size: 0,
            released: false,
        };
        for (index, input) in inputs.into_iter().enumerate() {
            set.volumes.push(Volume {
                index,
                name: input.name,
                start: 0,
                size: 0,
                ownership: input.ownership,
                source: Some(input.source),
                cursor: None,
            });
        }

        let mut start = 0u64;
        for volume in &mut set.volumes {
            let source = volume.source.as_mut().ok_or_else(|| {
                Error::Io(io::Error::other("volume released during acquisition"))
            })?;
            let size = source.seek(SeekFrom::End(0))?;
            volume.start = start;
            volume.size = size;
            start += size;
        }
        set.total_size = start;

        log::debug!(
            "Acquired {} volume(s), {} bytes total",
            set.volumes.len(),
            set.total_size
        );
        Ok(set)
    }

    /// Opens the given files, in order, as owned volumes.
    ///
    /// A missing file is reported as [`Error::VolumeResolution`]; files that
    /// were already opened are released before returning.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut inputs = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let file = File::open(path).map_err(|e| Error::VolumeResolution {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            inputs.push(VolumeInput::new(
                path.display().to_string(),
                BufReader::with_capacity(READ_BUFFER_SIZE, file),
                Ownership::Owned,
            ));
        }
        Self::new(inputs)
    }

    /// Returns the volumes in discovery order.
    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    /// Returns the number of volumes.
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    /// Returns true if the set holds no volumes.
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Returns the combined size of all volumes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Returns the current logical position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the logical offset at which volume `index` starts.
    pub fn volume_start(&self, index: usize) -> Option<u64> {
        self.volumes.get(index).map(|v| v.start)
    }

    /// Returns the index of the volume holding the byte at `offset`.
    ///
    /// Offsets at or past the end map to the last volume.
    pub fn volume_at(&self, offset: u64) -> usize {
        let index = self
            .volumes
            .partition_point(|v| v.start + v.size <= offset);
        index.min(self.volumes.len().saturating_sub(1))
    }

    /// Returns true once [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Releases every volume's source.
    ///
    /// Owned sources are closed, borrowed ones are only dropped. Failures
    /// are logged and never returned, so release cannot mask the error that
    /// caused it. Calling this more than once has no further effect.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for volume in &mut self.volumes {
            volume.release();
        }
        log::debug!("Released {} volume(s)", self.volumes.len());
    }
}

impl Read for VolumeSet {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.released {
            return Err(io::Error::other("volume set was released"));
        }

        let mut filled = 0;
        while filled < buf.len() && self.position < self.total_size {
            let index = self.volume_at(self.position);
            let volume = &mut self.volumes[index];
            let offset = self.position - volume.start;
            let available = volume.size - offset;
            let want = (buf.len() - filled).min(usize::try_from(available).unwrap_or(usize::MAX));

            let n = volume.read_at(offset, &mut buf[filled..filled + want])?;
            if n == 0 {
                // The volume is shorter than when it was measured.
                break;
            }
            filled += n;
            self.position += n as u64;
        }
        Ok(filled)
    }
}

impl Seek for VolumeSet {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(delta) => self.total_size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "Cannot seek before start of stream",
            )
        })?;
        self.position = target;
        Ok(target)
    }
}

impl Drop for VolumeSet {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for VolumeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeSet")
            .field("volumes", &self.volumes)
            .field("total_size", &self.total_size)
            .field("position", &self.position)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::SharedSource;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        inner: Cursor<Vec<u8>>,
        closes: Arc<AtomicUsize>,
        fail_close: bool,
    }

    impl Read for CountingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for CountingSource {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl ByteSource for CountingSource {
        fn close(&mut self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(io::Error::other("close failed"))
            } else {
                Ok(())
            }
        }
    }

    fn counting(data: &[u8], closes: &Arc<AtomicUsize>, fail_close: bool) -> CountingSource {
        CountingSource {
            inner: Cursor::new(data.to_vec()),
            closes: Arc::clone(closes),
            fail_close,
        }
    }

    fn three_volumes() -> VolumeSet {
        VolumeSet::new(vec![
            VolumeInput::new("v0", Cursor::new(vec![0u8; 100]), Ownership::Owned),
            VolumeInput::new("v1", Cursor::new(vec![1u8; 100]), Ownership::Owned),
            VolumeInput::new("v2", Cursor::new(vec![2u8; 50]), Ownership::Owned),
        ])
        .unwrap()
    }

    #[test]
    fn test_read_across_volumes() {
        let mut set = three_volumes();
        let mut buf = Vec::new();
        set.read_to_end(&mut buf).unwrap();

        assert_eq!(buf.len(), 250);
        assert_eq!(buf[99], 0);
        assert_eq!(buf[100], 1);
        assert_eq!(buf[200], 2);
    }

    #[test]
    fn test_seek_then_read_spans_boundary() {
        let mut set = three_volumes();
        set.seek(SeekFrom::Start(98)).unwrap();
        let mut buf = [9u8; 4];
        set.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0, 0, 1, 1]);

        assert_eq!(set.seek(SeekFrom::End(-50)).unwrap(), 200);
        assert_eq!(set.seek(SeekFrom::Current(-25)).unwrap(), 175);
        assert!(set.seek(SeekFrom::Current(-500)).is_err());
    }

    #[test]
    fn test_volume_at_and_starts() {
        let set = three_volumes();
        assert_eq!(set.volume_at(0), 0);
        assert_eq!(set.volume_at(99), 0);
        assert_eq!(set.volume_at(100), 1);
        assert_eq!(set.volume_at(225), 2);
        assert_eq!(set.volume_at(10_000), 2);
        assert_eq!(set.volume_start(2), Some(200));
        assert_eq!(set.volume_start(3), None);
        assert_eq!(set.total_size(), 250);
    }

    #[test]
    fn test_empty_volume_is_skipped() {
        let mut set = VolumeSet::new(vec![
            VolumeInput::new("a", Cursor::new(b"ab".to_vec()), Ownership::Owned),
            VolumeInput::new("empty", Cursor::new(Vec::new()), Ownership::Owned),
            VolumeInput::new("c", Cursor::new(b"cd".to_vec()), Ownership::Owned),
        ])
        .unwrap();
        assert_eq!(set.volume_at(2), 2);

        let mut text = String::new();
        set.read_to_string(&mut text).unwrap();
        assert_eq!(text, "abcd");
    }

    #[test]
    fn test_release_closes_owned_exactly_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut set = VolumeSet::new(vec![
            VolumeInput::new("a", counting(b"a", &closes, false), Ownership::Owned),
            VolumeInput::new("b", counting(b"b", &closes, false), Ownership::Owned),
        ])
        .unwrap();

        set.release();
        set.release();
        drop(set);
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_borrowed_volume_is_not_closed() {
        let closes = Arc::new(AtomicUsize::new(0));
        let set = VolumeSet::new(vec![VolumeInput::new(
            "a",
            counting(b"a", &closes, false),
            Ownership::Borrowed,
        )])
        .unwrap();
        drop(set);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_close_is_logged_not_raised() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut set = VolumeSet::new(vec![
            VolumeInput::new("a", counting(b"a", &closes, true), Ownership::Owned),
            VolumeInput::new("b", counting(b"b", &closes, false), Ownership::Owned),
        ])
        .unwrap();
        set.release();
        assert_eq!(closes.load(Ordering::SeqCst), 2);
        assert!(set.volumes().iter().all(Volume::is_released));
    }

    #[test]
    fn test_read_after_release_fails() {
        let mut set = three_volumes();
        set.release();
        let mut buf = [0u8; 1];
        assert!(set.read(&mut buf).is_err());
    }

    #[test]
    fn test_shared_source_closed_when_owned() {
        let shared = SharedSource::new(Cursor::new(b"data".to_vec()));
        let set = VolumeSet::new(vec![VolumeInput::new(
            "shared",
            shared.clone(),
            Ownership::Owned,
        )])
        .unwrap();
        assert!(!shared.is_closed());
        drop(set);
        assert!(shared.is_closed());
    }

    #[test]
    fn test_missing_path_is_volume_resolution_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let present = dir.path().join("a.001");
        std::fs::write(&present, b"abc").unwrap();
        let missing = dir.path().join("a.002");

        match VolumeSet::from_paths(&[present, missing.clone()]) {
            Err(Error::VolumeResolution { path, .. }) => assert_eq!(path, missing),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_no_inputs_is_rejected() {
        assert!(matches!(
            VolumeSet::new(Vec::new()),
            Err(Error::VolumeResolution { .. })
        ));
    }
}
