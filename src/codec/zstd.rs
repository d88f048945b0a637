//! Zstandard codec implementation.
//!
//! Decodes one or more concatenated frames with the streaming context from
//! the `zstd` crate.

use zstd::stream::raw::{Decoder, InBuffer, Operation, OutBuffer};

use super::{Codec, CompressionId, DecodeProgress, DecodeState};
use crate::Result;
use crate::error::StreamFault;

const MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Zstandard frames (ZIP method 93).
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdCodec;

impl Codec for ZstdCodec {
    fn id(&self) -> CompressionId {
        CompressionId::Zstd
    }

    fn new_state(&self) -> Result<Box<dyn DecodeState>> {
        Ok(Box::new(ZstdState {
            inner: Decoder::new()?,
            frame_done: false,
        }))
    }
}

/// Returns true if `data` starts with a Zstandard frame.
pub fn is_zstd(data: &[u8]) -> bool {
    data.starts_with(&MAGIC)
}

struct ZstdState {
    inner: Decoder<'static>,
    frame_done: bool,
}

impl DecodeState for ZstdState {
    fn decode(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        input_exhausted: bool,
    ) -> std::result::Result<DecodeProgress, StreamFault> {
        let mut consumed = 0;
        let mut produced = 0;

        while consumed < input.len() || produced < output.len() {
            let mut src = InBuffer::around(&input[consumed..]);
            let mut dst = OutBuffer::around(&mut output[produced..]);
            let hint = self
                .inner
                .run(&mut src, &mut dst)
                .map_err(|e| StreamFault::Malformed(format!("zstd: {}", e)))?;
            let c = src.pos();
            let p = dst.pos();
            consumed += c;
            produced += p;
            if c > 0 || p > 0 {
                self.frame_done = hint == 0;
            }
            if (c == 0 && p == 0) || produced == output.len() {
                break;
            }
        }

        Ok(DecodeProgress {
            consumed,
            produced,
            finished: self.frame_done && input_exhausted && consumed == input.len(),
        })
    }
}
