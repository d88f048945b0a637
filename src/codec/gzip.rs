//! Gzip (RFC 1952) member decoding.
//!
//! Member framing, trailer verification and multi-member chaining are done by
//! [`flate2::bufread::MultiGzDecoder`]. The decoder pulls from an input queue
//! that [`DecodeState::decode`] refills with each slice it is handed; an empty
//! queue reports [`io::ErrorKind::WouldBlock`] until the session marks the
//! input exhausted, so the decoder suspends instead of seeing a false end.

use std::io::{self, BufRead, Read};

use flate2::bufread::MultiGzDecoder;

use super::{Codec, CompressionId, DecodeProgress, DecodeState};
use crate::Result;
use crate::error::StreamFault;

const MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Gzip members, decoded back to back.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

impl Codec for GzipCodec {
    fn id(&self) -> CompressionId {
        CompressionId::Gzip
    }

    fn new_state(&self) -> Result<Box<dyn DecodeState>> {
        Ok(Box::new(GzipState {
            decoder: MultiGzDecoder::new(Feed::default()),
            consumed: 0,
        }))
    }
}

/// Returns true if `data` starts with the gzip magic bytes.
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&MAGIC)
}

/// The bytes of the current `decode` call, offered to the decoder.
#[derive(Debug, Default)]
struct Feed {
    data: Vec<u8>,
    pos: usize,
    exhausted: bool,
}

impl Read for Feed {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for Feed {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos == self.data.len() && !self.exhausted {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        Ok(&self.data[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.data.len());
    }
}

struct GzipState {
    decoder: MultiGzDecoder<Feed>,
    /// Input bytes the decoder has taken over all calls.
    consumed: u64,
}

impl DecodeState for GzipState {
    fn decode(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        input_exhausted: bool,
    ) -> std::result::Result<DecodeProgress, StreamFault> {
        let feed = self.decoder.get_mut();
        feed.data.clear();
        feed.data.extend_from_slice(input);
        feed.pos = 0;
        feed.exhausted = input_exhausted;

        let result = self.decoder.read(output);
        let taken = self.decoder.get_ref().pos;
        self.consumed += taken as u64;

        match result {
            Ok(0) if !output.is_empty() => Ok(DecodeProgress {
                consumed: taken,
                produced: 0,
                finished: true,
            }),
            Ok(produced) => Ok(DecodeProgress {
                consumed: taken,
                produced,
                finished: false,
            }),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(DecodeProgress {
                consumed: taken,
                produced: 0,
                finished: false,
            }),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(StreamFault::Truncated {
                consumed: self.consumed,
            }),
            Err(e) => Err(StreamFault::Malformed(format!("gzip: {}", e))),
        }
    }
}
