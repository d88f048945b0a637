//! Decoder sessions.

use std::fmt;
use std::io::{self, Read};

use super::{CompressionId, DecodeState, ZipCryptoKeys};
use crate::error::StreamFault;
use crate::{Error, READ_BUFFER_SIZE, Result};

/// How long a [`DecoderSession`] lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionScope {
    /// Created and discarded for a single entry.
    Entry,
    /// Shared by every entry of one solid run, in container order.
    SolidRun,
}

/// The state of one decoding pass.
///
/// A session owns the codec state, a buffer of compressed input and the
/// running byte counters. Input is pulled from a reader handed in on every
/// call, so the session can outlive any single borrow of the volumes and be
/// carried from one entry of a solid run to the next.
pub struct DecoderSession {
    id: CompressionId,
    scope: SessionScope,
    state: Box<dyn DecodeState>,
    buffer: Box<[u8]>,
    start: usize,
    end: usize,
    input_eof: bool,
    finished: bool,
    total_in: u64,
    total_out: u64,
    decryptor: Option<ZipCryptoKeys>,
}

impl DecoderSession {
    /// Creates a session around a freshly constructed codec state.
    pub fn new(id: CompressionId, scope: SessionScope, state: Box<dyn DecodeState>) -> Self {
        Self {
            id,
            scope,
            state,
            buffer: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
            start: 0,
            end: 0,
            input_eof: false,
            finished: false,
            total_in: 0,
            total_out: 0,
            decryptor: None,
        }
    }

    /// Decrypts every input byte with the given keys before decoding.
    pub fn with_decryptor(mut self, keys: ZipCryptoKeys) -> Self {
        self.decryptor = Some(keys);
        self
    }

    /// Returns the codec this session decodes.
    pub fn id(&self) -> CompressionId {
        self.id
    }

    /// Returns the session's scope.
    pub fn scope(&self) -> SessionScope {
        self.scope
    }

    /// Compressed bytes handed to the codec so far.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Compressed bytes pulled from the input so far, including buffered ones.
    pub fn input_pulled(&self) -> u64 {
        self.total_in + (self.end - self.start) as u64
    }

    /// Decompressed bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Returns true once the codec reported the end of its stream.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns true once the input reader reported end of file.
    pub fn input_exhausted(&self) -> bool {
        self.input_eof && self.start == self.end
    }

    /// Decodes into `out`, pulling compressed bytes from `input` as needed.
    ///
    /// Returns the number of bytes written, or 0 once the stream finished.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptStream`] if the codec rejects the input or if
    /// the input ends before the stream does.
    pub fn read(&mut self, input: &mut dyn Read, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() || self.finished {
            return Ok(0);
        }

        let mut stalled = false;
        loop {
            if !self.input_eof && (self.start == self.end || stalled) {
                self.fill(input)?;
            }

            let progress = self
                .state
                .decode(&self.buffer[self.start..self.end], out, self.input_eof)
                .map_err(|fault| Error::corrupt_stream(None, fault))?;

            self.start += progress.consumed;
            self.total_in += progress.consumed as u64;
            self.total_out += progress.produced as u64;
            if progress.finished {
                self.finished = true;
                log::trace!(
                    "{} stream finished after {} -> {} bytes",
                    self.id,
                    self.total_in,
                    self.total_out
                );
            }
            if progress.produced > 0 || self.finished {
                return Ok(progress.produced);
            }
            if progress.consumed == 0 {
                if self.input_eof {
                    return Err(Error::corrupt_stream(
                        None,
                        StreamFault::Truncated {
                            consumed: self.total_in,
                        },
                    ));
                }
                if self.start == 0 && self.end == self.buffer.len() {
                    return Err(Error::corrupt_stream(
                        None,
                        StreamFault::Malformed(format!("{} decoder made no progress", self.id)),
                    ));
                }
                stalled = true;
            } else {
                stalled = false;
            }
        }
    }

    /// Decodes and discards everything up to the end of the stream.
    ///
    /// Used to verify a codec's own trailer once all entries of a run have
    /// been consumed. Returns the number of bytes discarded.
    pub fn finish(&mut self, input: &mut dyn Read) -> Result<u64> {
        let mut scratch = vec![0u8; READ_BUFFER_SIZE];
        let mut discarded = 0u64;
        loop {
            let n = self.read(input, &mut scratch)?;
            if n == 0 {
                return Ok(discarded);
            }
            discarded += n as u64;
        }
    }

    /// Appends more input after the unconsumed bytes.
    fn fill(&mut self, input: &mut dyn Read) -> Result<()> {
        if self.start > 0 {
            self.buffer.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        loop {
            match input.read(&mut self.buffer[self.end..]) {
                Ok(0) => {
                    self.input_eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    if let Some(keys) = self.decryptor.as_mut() {
                        keys.decrypt_in_place(&mut self.buffer[self.end..self.end + n]);
                    }
                    self.end += n;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::from_io(e)),
            }
        }
    }
}

impl fmt::Debug for DecoderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderSession")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("total_in", &self.total_in)
            .field("total_out", &self.total_out)
            .field("finished", &self.finished)
            .field("encrypted", &self.decryptor.is_some())
            .finish()
    }
}

/// Pairs a session with its input so the decoded bytes can be read with
/// [`std::io::Read`].
pub struct SessionReader<'a, R: ?Sized> {
    session: &'a mut DecoderSession,
    input: &'a mut R,
}

impl<'a, R: Read + ?Sized> SessionReader<'a, R> {
    /// Creates a reader over `session`, pulling input from `input`.
    pub fn new(session: &'a mut DecoderSession, input: &'a mut R) -> Self {
        Self { session, input }
    }
}

impl<R: Read> Read for SessionReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.session.read(&mut *self.input, buf).map_err(io::Error::from)
    }
}
