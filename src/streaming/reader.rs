//! The forward-only entry reader.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use super::body::BodyDecoder;
use crate::codec::{CodecRegistry, DecoderSession, Password, SessionReader, SessionScope};
use crate::error::StreamFault;
use crate::format::{ContainerBackend, detect};
use crate::read::destination::{BodyProvider, run_extraction, write_entry};
use crate::read::{Entry, ExtractResult, ExtractionSink, ReaderOptions};
use crate::volume::{ByteSource, VolumeInput, VolumeSet, file_parts};
use crate::{Error, Result};

/// Display name given to a volume opened from an anonymous stream.
const STREAM_NAME: &str = "<stream>";

/// The volumes a reader pulls from.
enum Volumes<'a> {
    /// Released when the reader is closed or dropped.
    Owned(VolumeSet),
    /// Belong to an [`Archive`](crate::Archive).
    Borrowed(&'a mut VolumeSet),
}

impl Volumes<'_> {
    fn get(&mut self) -> &mut VolumeSet {
        match self {
            Volumes::Owned(volumes) => volumes,
            Volumes::Borrowed(volumes) => volumes,
        }
    }

    fn get_ref(&self) -> &VolumeSet {
        match self {
            Volumes::Owned(volumes) => volumes,
            Volumes::Borrowed(volumes) => volumes,
        }
    }
}

/// What happened to the current entry's body.
enum BodyState {
    /// Not requested; skipping it costs the whole payload.
    NotTaken,
    /// Handed out through [`Reader::body`].
    Taken(BodyDecoder),
    /// Opening failed after `unread` payload bytes were left unconsumed.
    Failed { unread: u64 },
}

enum State {
    Initial,
    Positioned { entry: Entry, body: BodyState },
    Exhausted,
}

/// Streams the entries of an archive in container order, exactly once.
///
/// The reader is a state machine with three states:
///
/// - **Initial**: opened, no entry read yet
/// - **Positioned**: [`advance`](Self::advance) returned an entry; its body
///   can be requested once with [`body`](Self::body)
/// - **Exhausted**: the end of the archive was reached, or a fault stopped
///   the stream
///
/// Advancing discards whatever is left of the current entry's body. There is
/// no way back: an entry that was passed can only be reached again by
/// opening a new reader. This is what makes solid archives safe to read,
/// since every entry of a solid run is decoded by the one session the
/// reader owns.
///
/// # Example
///
/// ```rust,no_run
/// use polyarc::{Reader, ReaderOptions};
/// use std::fs::File;
/// use std::io::Read;
///
/// let file = File::open("logs.tar.gz")?;
/// let mut reader = Reader::open(file, ReaderOptions::default())?;
/// while let Some(entry) = reader.advance()? {
///     if entry.path.ends_with(".log") {
///         let mut text = String::new();
///         reader.body()?.read_to_string(&mut text)?;
///         println!("{}", text.lines().count());
///     }
/// }
/// # Ok::<(), polyarc::Error>(())
/// ```
pub struct Reader<'a> {
    volumes: Volumes<'a>,
    backend: Box<dyn ContainerBackend>,
    codecs: Arc<CodecRegistry>,
    password: Option<Password>,
    /// Archive-scoped session of a solid run.
    solid: Option<DecoderSession>,
    state: State,
    /// Entries already passed, with their final volume ranges.
    history: Vec<Entry>,
}

impl Reader<'static> {
    /// Opens a reader over one byte source.
    ///
    /// The source is borrowed unless [`ReaderOptions::leave_stream_open`] is
    /// set to `false`, in which case it is closed when the reader is released.
    pub fn open(source: impl ByteSource + 'static, options: ReaderOptions) -> Result<Self> {
        Self::open_named(STREAM_NAME, source, options)
    }

    /// Opens a reader over one byte source with a display name.
    pub fn open_named(
        name: impl Into<String>,
        source: impl ByteSource + 'static,
        options: ReaderOptions,
    ) -> Result<Self> {
        let input = VolumeInput::new(name, source, options.ownership());
        Self::open_volumes(VolumeSet::new(vec![input])?, options)
    }

    /// Opens a reader over a file, discovering sibling parts of a
    /// multi-part archive.
    pub fn open_path(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let parts = file_parts(path)?;
        Self::open_volumes(VolumeSet::from_paths(&parts)?, options)
    }

    /// Opens a reader over an already resolved volume set.
    ///
    /// The volumes are released when the reader is; if detection fails they
    /// are released before the error is returned.
    pub fn open_volumes(mut volumes: VolumeSet, options: ReaderOptions) -> Result<Self> {
        let factory = detect(
            &mut volumes,
            &options.formats,
            &options.codecs,
            options.look_ahead_buffer_size,
        )?;
        Reader::new(
            Volumes::Owned(volumes),
            factory.create(),
            options.codecs,
            options.password,
        )
    }
}

impl<'a> Reader<'a> {
    /// Creates a reader over volumes owned by an archive.
    pub(crate) fn over(
        volumes: &'a mut VolumeSet,
        backend: Box<dyn ContainerBackend>,
        codecs: Arc<CodecRegistry>,
        password: Option<Password>,
    ) -> Result<Self> {
        Self::new(Volumes::Borrowed(volumes), backend, codecs, password)
    }

    fn new(
        mut volumes: Volumes<'a>,
        backend: Box<dyn ContainerBackend>,
        codecs: Arc<CodecRegistry>,
        password: Option<Password>,
    ) -> Result<Self> {
        volumes.get().seek(SeekFrom::Start(0))?;
        let solid = match backend.solid_codec() {
            Some(id) => {
                log::debug!("Starting {} solid run of {} archive", id, backend.format());
                Some(codecs.open_session(id, SessionScope::SolidRun)?)
            }
            None => None,
        };
        Ok(Self {
            volumes,
            backend,
            codecs,
            password,
            solid,
            state: State::Initial,
            history: Vec::new(),
        })
    }

    /// Returns true if the archive is one solid run.
    pub fn is_solid(&self) -> bool {
        self.backend.is_solid()
    }

    /// Returns the volumes being read.
    pub fn volumes(&self) -> &VolumeSet {
        self.volumes.get_ref()
    }

    /// Returns the current entry, if the reader is positioned on one.
    ///
    /// The entry's `volume_index_last` reflects what was known when the
    /// reader reached its header; for solid archives the final value is
    /// recorded once the entry is passed.
    pub fn entry(&self) -> Option<&Entry> {
        match &self.state {
            State::Positioned { entry, .. } => Some(entry),
            _ => None,
        }
    }

    /// Returns true once the end of the archive was reached or a fault
    /// stopped the stream.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    /// Moves to the next entry, discarding the rest of the current one.
    ///
    /// Returns `Ok(None)` at the end of the archive. After an error the
    /// reader is exhausted.
    ///
    /// # Errors
    ///
    /// - [`Error::NoMoreVolumes`] if a multi-volume archive ends inside an
    ///   entry
    /// - [`Error::CorruptHeader`] / [`Error::CorruptStream`] for damaged
    ///   containers or solid streams
    pub fn advance(&mut self) -> Result<Option<&Entry>> {
        match self.step() {
            Ok(true) => Ok(self.entry()),
            Ok(false) => Ok(None),
            Err(e) => {
                self.state = State::Exhausted;
                self.solid = None;
                Err(e)
            }
        }
    }

    /// Advances until the entry with the given container index is current.
    ///
    /// # Errors
    ///
    /// - [`Error::SequentialAccessRequired`] if the entry was already passed
    ///   or its body was already taken
    /// - [`Error::EndOfArchive`] if the archive has fewer entries
    pub fn advance_to(&mut self, index: usize) -> Result<&Entry> {
        if let Some(passed) = self.history.get(index) {
            return Err(Error::SequentialAccessRequired {
                index,
                path: passed.path.clone(),
            });
        }
        loop {
            let current = match &self.state {
                State::Positioned { entry, body } => {
                    Some((entry.index, matches!(body, BodyState::NotTaken)))
                }
                State::Initial => None,
                State::Exhausted => return Err(Error::EndOfArchive),
            };
            match current {
                Some((at, true)) if at == index => break,
                Some((at, false)) if at == index => {
                    let path = self.entry().map(|e| e.path.clone()).unwrap_or_default();
                    return Err(Error::SequentialAccessRequired { index, path });
                }
                _ => {
                    if self.advance()?.is_none() {
                        return Err(Error::EndOfArchive);
                    }
                }
            }
        }
        self.entry().ok_or(Error::NoCurrentEntry)
    }

    /// Returns the current entry's decoded body.
    ///
    /// The body can be requested once per entry. It verifies the declared
    /// size and, when present, the CRC-32; a mismatch fails the read that
    /// completes the body.
    ///
    /// # Errors
    ///
    /// - [`Error::NoCurrentEntry`] before the first [`advance`](Self::advance)
    ///   or after the end
    /// - [`Error::BodyUnavailable`] if the body was already requested
    /// - [`Error::UnsupportedCodec`], [`Error::PasswordRequired`] or
    ///   [`Error::WrongPassword`] if the entry cannot be decoded; the reader
    ///   can still advance past it
    pub fn body(&mut self) -> Result<EntryBody<'_, 'a>> {
        let volume_count = self.volumes.get_ref().len();
        let State::Positioned { entry, body } = &mut self.state else {
            return Err(Error::NoCurrentEntry);
        };
        if !matches!(body, BodyState::NotTaken) {
            return Err(Error::BodyUnavailable {
                entry: entry.path.clone(),
            });
        }

        let mut remaining = entry.payload_len();
        let opened = BodyDecoder::open(
            entry,
            self.volumes.get(),
            &self.codecs,
            self.password.as_ref(),
            volume_count,
            &mut remaining,
        );
        match opened {
            Ok(decoder) => *body = BodyState::Taken(decoder),
            Err(e) => {
                *body = BodyState::Failed { unread: remaining };
                return Err(e);
            }
        }
        Ok(EntryBody { reader: self })
    }

    /// Reads the current entry's body into a vector.
    pub fn read_body(&mut self) -> Result<Vec<u8>> {
        let mut body = self.body()?;
        let mut out = Vec::new();
        body.read_to_end(&mut out).map_err(Error::from_io)?;
        Ok(out)
    }

    /// Walks the remaining entries, writing each into `sink`.
    ///
    /// Stops at the first failing entry; the error is returned after the
    /// sink's cleanup ran.
    pub fn extract_all(&mut self, sink: &mut dyn ExtractionSink) -> Result<ExtractResult> {
        run_extraction(sink, None, |sink, result| self.write_remaining(sink, result))
    }

    pub(crate) fn write_remaining(
        &mut self,
        sink: &mut dyn ExtractionSink,
        result: &mut ExtractResult,
    ) -> Result<()> {
        while let Some(entry) = self.advance()? {
            let entry = entry.clone();
            write_entry(sink, &entry, result, self)?;
        }
        Ok(())
    }

    /// Releases the volumes if the reader owns them.
    pub fn close(mut self) {
        self.release();
    }

    /// Consumes the reader and returns the entries it passed, in order.
    ///
    /// The current entry is not included.
    pub(crate) fn into_history(mut self) -> Vec<Entry> {
        std::mem::take(&mut self.history)
    }

    fn release(&mut self) {
        self.solid = None;
        self.state = State::Exhausted;
        if let Volumes::Owned(volumes) = &mut self.volumes {
            volumes.release();
        }
    }

    /// Leaves the current entry and reads the next header.
    fn step(&mut self) -> Result<bool> {
        match std::mem::replace(&mut self.state, State::Exhausted) {
            State::Exhausted => return Ok(false),
            State::Initial => {}
            State::Positioned { entry, body } => self.leave(entry, body)?,
        }
        match self.next_header()? {
            Some(entry) => {
                log::trace!(
                    "Positioned on entry {} '{}' ({} bytes, volumes {}..={})",
                    entry.index,
                    entry.path,
                    entry.size,
                    entry.volume_index_first,
                    entry.volume_index_last
                );
                self.state = State::Positioned {
                    entry,
                    body: BodyState::NotTaken,
                };
                Ok(true)
            }
            None => {
                self.finish_run()?;
                Ok(false)
            }
        }
    }

    /// Skips what is left of `entry` and records it as passed.
    fn leave(&mut self, mut entry: Entry, body: BodyState) -> Result<()> {
        let unread = match &body {
            BodyState::NotTaken => entry.payload_len(),
            BodyState::Taken(decoder) => decoder.unread_input(),
            BodyState::Failed { unread } => *unread,
        };
        drop(body);

        let volumes = self.volumes.get();
        let result = match self.solid.as_mut() {
            Some(session) => {
                let finished = self.backend.finish_entry(
                    &mut SessionReader::new(session, &mut *volumes),
                    &entry,
                    unread,
                );
                let last = volumes.volume_at(session.total_in().saturating_sub(1));
                entry.volume_index_last = last.max(entry.volume_index_first);
                finished
            }
            None => self.backend.finish_entry(&mut *volumes, &entry, unread),
        };
        result.map_err(|e| classify(volumes, self.solid.as_ref(), e, Some(&entry.path)))?;
        self.history.push(entry);
        Ok(())
    }

    fn next_header(&mut self) -> Result<Option<Entry>> {
        let volumes = self.volumes.get();
        let (next, start, end) = match self.solid.as_mut() {
            Some(session) => {
                let start = session.total_in();
                let next = self
                    .backend
                    .next_entry(&mut SessionReader::new(session, &mut *volumes));
                (next, start, session.total_in())
            }
            None => {
                let start = volumes.position();
                let next = self.backend.next_entry(&mut *volumes);
                let data = volumes.position();
                let end = match &next {
                    Ok(Some(entry)) => data.saturating_add(entry.payload_len()),
                    _ => data,
                };
                (next, start, end)
            }
        };
        let next = next.map_err(|e| classify(volumes, self.solid.as_ref(), e, None))?;

        Ok(next.map(|mut entry| {
            entry.index = self.history.len();
            entry.volume_index_first = volumes.volume_at(start);
            entry.volume_index_last = volumes
                .volume_at(end.max(start + 1) - 1)
                .max(entry.volume_index_first);
            entry
        }))
    }

    /// Drains the solid session so the codec verifies its own trailer.
    fn finish_run(&mut self) -> Result<()> {
        let Some(mut session) = self.solid.take() else {
            return Ok(());
        };
        let volumes = self.volumes.get();
        let trailing = session
            .finish(&mut *volumes)
            .map_err(|e| classify(volumes, None, e, None))?;
        log::debug!(
            "Solid {} run finished: {} -> {} bytes ({} after the last entry)",
            session.id(),
            session.total_in(),
            session.total_out(),
            trailing
        );
        Ok(())
    }

    fn read_body_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let State::Positioned {
            body: BodyState::Taken(decoder),
            ..
        } = &mut self.state
        else {
            return Err(Error::NoCurrentEntry);
        };
        let result = decoder.read(self.volumes.get(), self.solid.as_mut(), buf);
        if result.is_err() && self.solid.is_some() {
            // The solid session is in an unknown state; nothing after this
            // entry can be decoded.
            self.state = State::Exhausted;
            self.solid = None;
        }
        result
    }
}

/// Maps backend errors onto the volume layout.
///
/// Header offsets are logical offsets across all volumes, except inside a
/// solid run where they count decoded bytes; there the session's input
/// position locates the volume instead. Input that ends early in a
/// multi-volume archive means a part is missing.
fn classify(
    volumes: &VolumeSet,
    solid: Option<&DecoderSession>,
    err: Error,
    entry: Option<&str>,
) -> Error {
    let last_volume = volumes.len().saturating_sub(1);
    match err {
        Error::CorruptHeader { offset, reason, .. } => Error::CorruptHeader {
            offset,
            volume: volumes.volume_at(solid.map_or(offset, DecoderSession::total_in)),
            reason,
        },
        Error::CorruptStream {
            entry: named,
            fault: StreamFault::Truncated { .. },
        } if volumes.len() > 1 => Error::NoMoreVolumes {
            volume: last_volume,
            entry: named.or(entry.map(str::to_string)).unwrap_or_default(),
        },
        Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof && volumes.len() > 1 => {
            Error::NoMoreVolumes {
                volume: last_volume,
                entry: entry.unwrap_or_default().to_string(),
            }
        }
        other => other,
    }
}

impl BodyProvider for Reader<'_> {
    fn open_body(&mut self, _entry: &Entry) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.body()?))
    }
}

impl Drop for Reader<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Initial => "initial",
            State::Positioned { .. } => "positioned",
            State::Exhausted => "exhausted",
        };
        f.debug_struct("Reader")
            .field("format", &self.backend.format())
            .field("state", &state)
            .field("entry", &self.entry().map(|e| &e.path))
            .field("passed", &self.history.len())
            .field("solid", &self.solid)
            .finish_non_exhaustive()
    }
}

/// The decoded body of the reader's current entry.
///
/// Reads return typed errors boxed in [`io::Error`]; convert them back with
/// [`Error::from`].
pub struct EntryBody<'r, 'a> {
    reader: &'r mut Reader<'a>,
}

impl EntryBody<'_, '_> {
    /// The entry this body belongs to.
    pub fn entry(&self) -> Option<&Entry> {
        self.reader.entry()
    }
}

impl Read for EntryBody<'_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read_body_chunk(buf).map_err(io::Error::from)
    }
}

impl fmt::Debug for EntryBody<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryBody")
            .field("entry", &self.entry().map(|e| &e.path))
            .finish()
    }
}
