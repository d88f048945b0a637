//! Entry body decoding shared by the random-access and streaming façades.

use std::io::Read;

use crate::codec::{
    CodecRegistry, DecoderSession, ENCRYPTION_HEADER_SIZE, Password, SessionScope, ZipCryptoKeys,
};
use crate::error::StreamFault;
use crate::format::reader::{Limited, read_full};
use crate::read::{BodyLayout, Entry};
use crate::{Error, Result};

enum BodySource {
    /// Directories: nothing to decode, but payload bytes may need skipping.
    Empty { remaining: u64 },
    /// A separate compressed range decoded by an entry-scoped session.
    Raw {
        session: DecoderSession,
        remaining: u64,
        /// The volumes ended before the payload did.
        input_ended: bool,
    },
    /// The next `size` bytes of the solid run's decoded stream.
    Solid,
}

/// Produces exactly `size` verified bytes of one entry.
///
/// The decoder never reads past the entry's payload. Once the declared size
/// has been produced it checks that the codec has nothing left to emit and
/// that the CRC-32 matches, failing the read that completed the body if
/// either check does not hold.
pub(crate) struct BodyDecoder {
    path: String,
    size: u64,
    expected_crc: Option<u32>,
    hasher: crc32fast::Hasher,
    produced: u64,
    source: BodySource,
    /// Index of the last volume, when the archive has more than one.
    last_volume: Option<usize>,
    done: bool,
}

impl BodyDecoder {
    /// Prepares to decode `entry`, whose payload starts at the current
    /// position of `input`.
    ///
    /// `remaining` holds the payload bytes not yet read; it stays accurate
    /// when opening fails so the caller can skip the rest.
    pub(crate) fn open(
        entry: &Entry,
        input: &mut dyn Read,
        codecs: &CodecRegistry,
        password: Option<&Password>,
        volume_count: usize,
        remaining: &mut u64,
    ) -> Result<Self> {
        let source = match entry.locator.layout {
            BodyLayout::Solid => BodySource::Solid,
            BodyLayout::Raw { .. } if entry.is_directory => BodySource::Empty {
                remaining: *remaining,
            },
            BodyLayout::Raw { .. } => {
                let session = codecs
                    .open_session(entry.compression, SessionScope::Entry)
                    .map_err(|e| e.with_entry(&entry.path))?;
                let session = if entry.is_encrypted {
                    let keys = Self::unlock(entry, input, password, remaining)?;
                    session.with_decryptor(keys)
                } else {
                    session
                };
                BodySource::Raw {
                    session,
                    remaining: *remaining,
                    input_ended: false,
                }
            }
        };
        log::trace!(
            "Opened body of '{}' ({} bytes, {})",
            entry.path,
            entry.size,
            entry.compression
        );
        Ok(Self {
            path: entry.path.clone(),
            size: entry.size,
            expected_crc: entry.crc32,
            hasher: crc32fast::Hasher::new(),
            produced: 0,
            source,
            last_volume: (volume_count > 1).then(|| volume_count - 1),
            done: false,
        })
    }

    /// Reads and checks the ZipCrypto header in front of the payload.
    fn unlock(
        entry: &Entry,
        input: &mut dyn Read,
        password: Option<&Password>,
        remaining: &mut u64,
    ) -> Result<ZipCryptoKeys> {
        let password = password.ok_or_else(|| Error::PasswordRequired {
            entry: entry.path.clone(),
        })?;
        let mut header = [0u8; ENCRYPTION_HEADER_SIZE];
        let n = read_full(&mut Limited::new(input, remaining), &mut header)?;
        if n < header.len() {
            return Err(Error::corrupt_stream(
                Some(&entry.path),
                StreamFault::Truncated { consumed: n as u64 },
            ));
        }
        let mut keys = ZipCryptoKeys::new(password);
        let check = keys.decrypt_header(&header);
        if entry.locator.check_byte.is_some_and(|expected| expected != check) {
            return Err(Error::WrongPassword {
                entry: entry.path.clone(),
            });
        }
        Ok(keys)
    }

    /// Payload bytes of the container stream that were not consumed.
    pub(crate) fn unread_input(&self) -> u64 {
        match &self.source {
            BodySource::Empty { remaining } | BodySource::Raw { remaining, .. } => *remaining,
            BodySource::Solid => self.size - self.produced,
        }
    }

    /// Reads decoded bytes.
    ///
    /// `input` is the raw volume stream; `solid` is the running session of
    /// the solid run, if the archive is solid.
    pub(crate) fn read(
        &mut self,
        input: &mut dyn Read,
        solid: Option<&mut DecoderSession>,
        buf: &mut [u8],
    ) -> Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        if self.produced == self.size {
            self.complete(input)?;
            return Ok(0);
        }

        let want = usize::try_from(self.size - self.produced)
            .unwrap_or(usize::MAX)
            .min(buf.len());
        let out = &mut buf[..want];
        let result = match &mut self.source {
            BodySource::Empty { .. } => Ok(0),
            BodySource::Raw {
                session,
                remaining,
                input_ended,
            } => {
                let mut limited = Limited::new(&mut *input, remaining);
                let result = session.read(&mut limited, out);
                *input_ended |= limited.inner_ended();
                result
            }
            BodySource::Solid => match solid {
                Some(session) => session.read(&mut *input, out),
                None => Err(Error::corrupt_stream(
                    None,
                    StreamFault::Malformed("solid stream is not open".into()),
                )),
            },
        };
        let n = result.map_err(|e| self.classify(e))?;

        if n == 0 {
            return Err(self.ended_early());
        }
        self.hasher.update(&out[..n]);
        self.produced += n as u64;
        if self.produced == self.size {
            self.complete(input)?;
        }
        Ok(n)
    }

    /// Verifies a body whose declared size has been produced.
    fn complete(&mut self, input: &mut dyn Read) -> Result<()> {
        self.done = true;
        if let BodySource::Raw {
            session, remaining, ..
        } = &mut self.source
        {
            let mut extra = [0u8; 256];
            let n = session
                .read(&mut Limited::new(&mut *input, remaining), &mut extra)
                .map_err(|e| e.with_entry(&self.path))?;
            if n > 0 {
                return Err(Error::corrupt_stream(
                    Some(&self.path),
                    StreamFault::SizeMismatch {
                        expected: self.size,
                        actual: self.size + n as u64,
                    },
                ));
            }
        }
        if let Some(expected) = self.expected_crc {
            let actual = std::mem::take(&mut self.hasher).finalize();
            if actual != expected {
                return Err(Error::corrupt_stream(
                    Some(&self.path),
                    StreamFault::ChecksumMismatch { expected, actual },
                ));
            }
        }
        log::trace!("Body of '{}' verified ({} bytes)", self.path, self.size);
        Ok(())
    }

    /// The stream stopped before the declared size was produced.
    ///
    /// This is truncation only if the volumes ran out; a codec that finished
    /// early on a complete payload produced the wrong size.
    fn ended_early(&mut self) -> Error {
        self.done = true;
        let fault = match &self.source {
            BodySource::Raw {
                session,
                input_ended: true,
                ..
            } => StreamFault::Truncated {
                consumed: session.total_in(),
            },
            _ => StreamFault::SizeMismatch {
                expected: self.size,
                actual: self.produced,
            },
        };
        self.classify(Error::corrupt_stream(Some(&self.path), fault))
    }

    /// Returns true if the input ended under the decoder.
    ///
    /// A solid session reads the volumes directly, so its truncation is
    /// always the end of the last volume. An entry's payload range is
    /// bounded, so its codec can also starve on a complete payload.
    fn volumes_ran_out(&self) -> bool {
        match &self.source {
            BodySource::Raw { input_ended, .. } => *input_ended,
            BodySource::Solid => true,
            BodySource::Empty { .. } => false,
        }
    }

    /// Names the entry and turns truncation of a multi-volume archive into
    /// [`Error::NoMoreVolumes`] when the volumes ran out.
    fn classify(&self, err: Error) -> Error {
        match (err.with_entry(&self.path), self.last_volume) {
            (
                Error::CorruptStream {
                    fault: StreamFault::Truncated { .. },
                    ..
                },
                Some(volume),
            ) if self.volumes_ran_out() => Error::NoMoreVolumes {
                volume,
                entry: self.path.clone(),
            },
            (err, _) => err,
        }
    }
}

impl std::fmt::Debug for BodyDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyDecoder")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("produced", &self.produced)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
