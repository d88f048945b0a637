//! Codec dispatch.
//!
//! Container backends tag every entry with a [`CompressionId`]. The
//! [`CodecRegistry`] maps that identifier to a [`Codec`], which creates the
//! per-session [`DecodeState`] that actually turns compressed bytes into
//! plain ones.
//!
//! Decoding always happens through a [`DecoderSession`]. A session is either
//! entry-scoped (fresh per entry, non-solid archives) or scoped to a solid
//! run, in which case one session decodes every entry of the run in
//! container order.
//!
//! # Example
//!
//! ```rust
//! use polyarc::codec::{CodecRegistry, CompressionId};
//!
//! let registry = CodecRegistry::with_defaults();
//! assert!(registry.contains(CompressionId::Stored));
//!
//! let plain = registry.decode_to_vec(CompressionId::Stored, b"raw bytes").unwrap();
//! assert_eq!(plain, b"raw bytes");
//! ```
//!
//! # Custom Codecs
//!
//! Implement [`Codec`] and [`DecodeState`] and register the codec; entries
//! tagged with its identifier become extractable.

mod copy;
mod session;
mod zipcrypto;

#[cfg(feature = "deflate")]
pub mod deflate;

#[cfg(feature = "deflate")]
pub mod gzip;

#[cfg(feature = "bzip2")]
pub mod bzip2;

#[cfg(feature = "zstd")]
pub mod zstd;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::StreamFault;
use crate::{Error, Result};

pub use copy::StoredCodec;
pub use session::{DecoderSession, SessionReader, SessionScope};
pub use zipcrypto::{ENCRYPTION_HEADER_SIZE, Password, ZipCryptoKeys};

/// Identifies the algorithm that decodes an entry's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CompressionId {
    /// No compression.
    Stored,
    /// Raw Deflate.
    Deflate,
    /// Enhanced Deflate (ZIP method 9).
    Deflate64,
    /// BZip2.
    Bzip2,
    /// Gzip members (Deflate with header and trailer).
    Gzip,
    /// LZMA.
    Lzma,
    /// XZ.
    Xz,
    /// Zstandard.
    Zstd,
    /// A container-specific method number with no well-known name.
    Other(u32),
}

impl CompressionId {
    /// Maps a ZIP compression method number onto an identifier.
    pub fn from_zip_method(method: u16) -> Self {
        match method {
            0 => CompressionId::Stored,
            8 => CompressionId::Deflate,
            9 => CompressionId::Deflate64,
            12 => CompressionId::Bzip2,
            14 => CompressionId::Lzma,
            93 => CompressionId::Zstd,
            95 => CompressionId::Xz,
            other => CompressionId::Other(u32::from(other)),
        }
    }

    /// Returns a human-readable name.
    pub fn name(&self) -> String {
        match self {
            CompressionId::Stored => "Stored".into(),
            CompressionId::Deflate => "Deflate".into(),
            CompressionId::Deflate64 => "Deflate64".into(),
            CompressionId::Bzip2 => "BZip2".into(),
            CompressionId::Gzip => "Gzip".into(),
            CompressionId::Lzma => "LZMA".into(),
            CompressionId::Xz => "XZ".into(),
            CompressionId::Zstd => "Zstd".into(),
            CompressionId::Other(n) => format!("method {}", n),
        }
    }
}

impl fmt::Display for CompressionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// The outcome of one [`DecodeState::decode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeProgress {
    /// Input bytes consumed.
    pub consumed: usize,
    /// Output bytes written.
    pub produced: usize,
    /// The stream ended; no further output will be produced.
    pub finished: bool,
}

/// The mutable state of one codec instance.
///
/// A state is fed input in arbitrary slices and writes into arbitrary
/// output slices. It keeps whatever history the algorithm needs between
/// calls, which is what lets one state span several entries of a solid run.
pub trait DecodeState: Send {
    /// Decodes as much of `input` into `output` as possible.
    ///
    /// `input_exhausted` is true when no input will follow `input`. A call
    /// that consumes and produces nothing while input is exhausted and the
    /// stream has not finished means the input was truncated.
    fn decode(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        input_exhausted: bool,
    ) -> std::result::Result<DecodeProgress, StreamFault>;
}

/// A decoder constructor registered under one [`CompressionId`].
pub trait Codec: Send + Sync {
    /// Returns the identifier this codec decodes.
    fn id(&self) -> CompressionId;

    /// Creates a fresh decoding state.
    fn new_state(&self) -> Result<Box<dyn DecodeState>>;
}

/// Maps compression identifiers to codecs.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<CompressionId, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// Creates a registry with no codecs at all.
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Creates a registry with every codec compiled into this build.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(StoredCodec);
        #[cfg(feature = "deflate")]
        {
            registry.register(deflate::DeflateCodec);
            registry.register(gzip::GzipCodec);
        }
        #[cfg(feature = "bzip2")]
        registry.register(bzip2::Bzip2Codec);
        #[cfg(feature = "zstd")]
        registry.register(zstd::ZstdCodec);
        registry
    }

    /// Registers a codec, returning the one it replaced.
    pub fn register(&mut self, codec: impl Codec + 'static) -> Option<Arc<dyn Codec>> {
        let codec: Arc<dyn Codec> = Arc::new(codec);
        self.codecs.insert(codec.id(), codec)
    }

    /// Returns the codec registered for `id`.
    pub fn get(&self, id: CompressionId) -> Option<&Arc<dyn Codec>> {
        self.codecs.get(&id)
    }

    /// Returns true if `id` has a registered codec.
    pub fn contains(&self, id: CompressionId) -> bool {
        self.codecs.contains_key(&id)
    }

    /// Starts a decoder session for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCodec`] if nothing is registered for `id`.
    pub fn open_session(&self, id: CompressionId, scope: SessionScope) -> Result<DecoderSession> {
        let codec = self.get(id).ok_or_else(|| Error::UnsupportedCodec {
            codec: id.name(),
            entry: None,
        })?;
        let state = codec.new_state()?;
        log::trace!("Opened {:?} session for {}", scope, id);
        Ok(DecoderSession::new(id, scope, state))
    }

    /// Decodes a complete compressed byte sequence in one call.
    pub fn decode_to_vec(&self, id: CompressionId, compressed: &[u8]) -> Result<Vec<u8>> {
        let mut session = self.open_session(id, SessionScope::Entry)?;
        let mut input = compressed;
        let mut output = Vec::new();
        let mut chunk = vec![0u8; crate::READ_BUFFER_SIZE];
        loop {
            let n = session.read(&mut input, &mut chunk)?;
            if n == 0 {
                break;
            }
            output.extend_from_slice(&chunk[..n]);
        }
        Ok(output)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<String> = self.codecs.keys().map(CompressionId::name).collect();
        ids.sort();
        f.debug_struct("CodecRegistry").field("codecs", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_method_mapping() {
        assert_eq!(CompressionId::from_zip_method(0), CompressionId::Stored);
        assert_eq!(CompressionId::from_zip_method(8), CompressionId::Deflate);
        assert_eq!(CompressionId::from_zip_method(12), CompressionId::Bzip2);
        assert_eq!(CompressionId::from_zip_method(93), CompressionId::Zstd);
        assert_eq!(CompressionId::from_zip_method(99), CompressionId::Other(99));
        assert_eq!(CompressionId::Other(99).to_string(), "method 99");
    }

    #[test]
    fn test_unregistered_codec_is_unsupported() {
        let registry = CodecRegistry::with_defaults();
        let err = registry
            .decode_to_vec(CompressionId::Other(99), b"data")
            .unwrap_err();
        match err {
            Error::UnsupportedCodec { codec, entry } => {
                assert_eq!(codec, "method 99");
                assert!(entry.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_registry_rejects_stored() {
        let registry = CodecRegistry::empty();
        assert!(!registry.contains(CompressionId::Stored));
        assert!(registry.open_session(CompressionId::Stored, SessionScope::Entry).is_err());
    }

    struct XorCodec;

    struct XorState;

    impl DecodeState for XorState {
        fn decode(
            &mut self,
            input: &[u8],
            output: &mut [u8],
            input_exhausted: bool,
        ) -> std::result::Result<DecodeProgress, StreamFault> {
            let n = input.len().min(output.len());
            for (dst, src) in output.iter_mut().zip(&input[..n]) {
                *dst = src ^ 0x5a;
            }
            Ok(DecodeProgress {
                consumed: n,
                produced: n,
                finished: input_exhausted && input.is_empty(),
            })
        }
    }

    impl Codec for XorCodec {
        fn id(&self) -> CompressionId {
            CompressionId::Other(0x5a)
        }

        fn new_state(&self) -> Result<Box<dyn DecodeState>> {
            Ok(Box::new(XorState))
        }
    }

    #[test]
    fn test_custom_codec_registration() {
        let mut registry = CodecRegistry::with_defaults();
        assert!(registry.register(XorCodec).is_none());
        let encoded: Vec<u8> = b"custom".iter().map(|b| b ^ 0x5a).collect();
        let decoded = registry
            .decode_to_vec(CompressionId::Other(0x5a), &encoded)
            .unwrap();
        assert_eq!(decoded, b"custom");
        assert!(registry.register(XorCodec).is_some());
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn test_default_registry_contents() {
        let registry = CodecRegistry::default();
        assert!(registry.contains(CompressionId::Deflate));
        assert!(registry.contains(CompressionId::Gzip));
        assert!(!registry.contains(CompressionId::Lzma));
        let debug = format!("{:?}", registry);
        assert!(debug.contains("Deflate"), "{debug}");
    }
}
