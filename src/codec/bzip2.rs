//! BZip2 codec implementation.

use bzip2::{Decompress, Status};

use super::{Codec, CompressionId, DecodeProgress, DecodeState};
use crate::Result;
use crate::error::StreamFault;

/// BZip2 streams, including concatenated streams as written by parallel
/// compressors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bzip2Codec;

impl Codec for Bzip2Codec {
    fn id(&self) -> CompressionId {
        CompressionId::Bzip2
    }

    fn new_state(&self) -> Result<Box<dyn DecodeState>> {
        Ok(Box::new(Bzip2State {
            inner: Decompress::new(false),
            between_streams: false,
            done: false,
        }))
    }
}

/// Returns true if `data` starts like a BZip2 stream.
pub fn is_bzip2(data: &[u8]) -> bool {
    data.len() >= 4 && &data[..3] == b"BZh" && (b'1'..=b'9').contains(&data[3])
}

struct Bzip2State {
    inner: Decompress,
    between_streams: bool,
    done: bool,
}

impl DecodeState for Bzip2State {
    fn decode(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        input_exhausted: bool,
    ) -> std::result::Result<DecodeProgress, StreamFault> {
        let mut consumed = 0;
        let mut produced = 0;

        while !self.done {
            if self.between_streams {
                if consumed == input.len() {
                    self.done = input_exhausted;
                    break;
                }
                if input[consumed] != b'B' {
                    self.done = true;
                    break;
                }
                self.inner = Decompress::new(false);
                self.between_streams = false;
            }
            if produced == output.len() {
                break;
            }

            let before_in = self.inner.total_in();
            let before_out = self.inner.total_out();
            let status = self
                .inner
                .decompress(&input[consumed..], &mut output[produced..])
                .map_err(|e| StreamFault::Malformed(format!("bzip2: {}", e)))?;
            let c = (self.inner.total_in() - before_in) as usize;
            let p = (self.inner.total_out() - before_out) as usize;
            consumed += c;
            produced += p;

            if status == Status::StreamEnd {
                self.between_streams = true;
                continue;
            }
            if c == 0 && p == 0 {
                break;
            }
        }

        Ok(DecodeProgress {
            consumed,
            produced,
            finished: self.done,
        })
    }
}
