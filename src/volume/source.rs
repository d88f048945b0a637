//! Byte sources and their ownership.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};

/// A seekable input that provides the bytes of one volume.
///
/// `close` is called exactly once by the owning volume set when the volume
/// is [`Ownership::Owned`]. Borrowed sources are never closed by this crate.
pub trait ByteSource: Read + Seek + Send {
    /// Releases the underlying resource.
    ///
    /// The default implementation does nothing; dropping the source then
    /// releases it.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ByteSource for File {}

impl<T: AsRef<[u8]> + Send> ByteSource for Cursor<T> {}

impl<S: ByteSource> ByteSource for BufReader<S> {
    fn close(&mut self) -> io::Result<()> {
        self.get_mut().close()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Whether a façade releases a volume's byte source when it is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ownership {
    /// The façade owns the source and closes it on release.
    #[default]
    Owned,
    /// The caller keeps the source; the façade only drops its handle.
    Borrowed,
}

impl Ownership {
    /// Maps the `leave_stream_open` option onto an ownership tag.
    pub fn from_leave_open(leave_open: bool) -> Self {
        if leave_open {
            Ownership::Borrowed
        } else {
            Ownership::Owned
        }
    }
}

/// A cloneable handle to one underlying byte source.
///
/// Every clone reads from the same source and shares its position. Closing
/// any clone closes the source for all of them, which is how a caller can
/// observe whether an archive released a source it was given.
///
/// # Example
///
/// ```rust
/// use std::io::{Cursor, Read};
/// use polyarc::volume::{ByteSource, SharedSource};
///
/// let shared = SharedSource::new(Cursor::new(b"hello".to_vec()));
/// let mut handle = shared.clone();
/// let mut text = String::new();
/// handle.read_to_string(&mut text).unwrap();
/// assert_eq!(text, "hello");
///
/// handle.close().unwrap();
/// assert!(shared.is_closed());
/// ```
pub struct SharedSource<R> {
    inner: Arc<Mutex<Option<R>>>,
}

impl<R> Clone for SharedSource<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> fmt::Debug for SharedSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSource")
            .field("closed", &self.is_closed())
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}

impl<R> SharedSource<R> {
    /// Wraps a source so it can be shared between the caller and a façade.
    pub fn new(source: R) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(source))),
        }
    }

    /// Returns true once any handle has closed the source.
    pub fn is_closed(&self) -> bool {
        self.guard().is_none()
    }

    /// Takes the underlying source back, leaving every handle closed.
    pub fn into_inner(self) -> Option<R> {
        self.guard().take()
    }

    fn guard(&self) -> MutexGuard<'_, Option<R>> {
        // A panic while reading leaves the source itself intact.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_source<T>(&self, f: impl FnOnce(&mut R) -> io::Result<T>) -> io::Result<T> {
        match self.guard().as_mut() {
            Some(source) => f(source),
            None => Err(io::Error::other("byte source has been closed")),
        }
    }
}

impl<R: Read> Read for SharedSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.with_source(|source| source.read(buf))
    }
}

impl<R: Seek> Seek for SharedSource<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.with_source(|source| source.seek(pos))
    }
}

impl<R: Read + Seek + Send> ByteSource for SharedSource<R> {
    fn close(&mut self) -> io::Result<()> {
        drop(self.guard().take());
        Ok(())
    }
}
