//! Stored codec (no compression).

use super::{Codec, CompressionId, DecodeProgress, DecodeState};
use crate::Result;
use crate::error::StreamFault;

/// Passes payload bytes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredCodec;

impl Codec for StoredCodec {
    fn id(&self) -> CompressionId {
        CompressionId::Stored
    }

    fn new_state(&self) -> Result<Box<dyn DecodeState>> {
        Ok(Box::new(StoredState))
    }
}

struct StoredState;

impl DecodeState for StoredState {
    fn decode(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        input_exhausted: bool,
    ) -> std::result::Result<DecodeProgress, StreamFault> {
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        Ok(DecodeProgress {
            consumed: n,
            produced: n,
            // A stored stream ends exactly where its input does.
            finished: input_exhausted && n == input.len(),
        })
    }
}
