//! Deflate codec implementation.

use flate2::{Decompress, FlushDecompress, Status};

use super::{Codec, CompressionId, DecodeProgress, DecodeState};
use crate::Result;
use crate::error::StreamFault;

/// Raw Deflate (RFC 1951), as used by ZIP method 8.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeflateCodec;

impl Codec for DeflateCodec {
    fn id(&self) -> CompressionId {
        CompressionId::Deflate
    }

    fn new_state(&self) -> Result<Box<dyn DecodeState>> {
        Ok(Box::new(Inflater::new()))
    }
}

/// Incremental raw-Deflate decoder.
pub(crate) struct Inflater {
    inner: Decompress,
}

impl Inflater {
    pub(crate) fn new() -> Self {
        Self {
            inner: Decompress::new(false),
        }
    }

    /// Runs one inflate step and reports `(consumed, produced, stream_end)`.
    pub(crate) fn step(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> std::result::Result<(usize, usize, bool), StreamFault> {
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();
        let status = self
            .inner
            .decompress(input, output, FlushDecompress::None)
            .map_err(|e| StreamFault::Malformed(format!("deflate: {}", e)))?;
        let consumed = (self.inner.total_in() - before_in) as usize;
        let produced = (self.inner.total_out() - before_out) as usize;
        Ok((consumed, produced, status == Status::StreamEnd))
    }
}

impl std::fmt::Debug for Inflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inflater").finish_non_exhaustive()
    }
}

impl DecodeState for Inflater {
    fn decode(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        _input_exhausted: bool,
    ) -> std::result::Result<DecodeProgress, StreamFault> {
        let (consumed, produced, finished) = self.step(input, output)?;
        Ok(DecodeProgress {
            consumed,
            produced,
            finished,
        })
    }
}
