//! Low-level binary reading utilities shared by the container parsers.

use std::io::{self, Read};

/// Reads a single byte.
pub(crate) fn read_u8<R: Read + ?Sized>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Reads an unsigned 16-bit little-endian integer.
pub(crate) fn read_u16_le<R: Read + ?Sized>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Reads an unsigned 32-bit little-endian integer.
pub(crate) fn read_u32_le<R: Read + ?Sized>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads an unsigned 64-bit little-endian integer.
pub(crate) fn read_u64_le<R: Read + ?Sized>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads exact number of bytes into a new vector.
pub(crate) fn read_bytes<R: Read + ?Sized>(r: &mut R, count: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; count];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads and discards up to `count` bytes, returning how many were skipped.
///
/// Fewer than `count` bytes are skipped only when the input ends.
pub(crate) fn skip<R: Read + ?Sized>(r: &mut R, count: u64) -> io::Result<u64> {
    let mut scratch = [0u8; 4096];
    let mut skipped = 0u64;
    while skipped < count {
        let want = (count - skipped).min(scratch.len() as u64) as usize;
        match r.read(&mut scratch[..want]) {
            Ok(0) => break,
            Ok(n) => skipped += n as u64,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(skipped)
}

/// Fills `buf` as far as the input allows, returning the number of bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads at most `remaining` bytes from the wrapped reader.
///
/// The limit is borrowed so the caller can see how much of the range is
/// left after the reader is dropped.
pub(crate) struct Limited<'a, R: ?Sized> {
    inner: &'a mut R,
    remaining: &'a mut u64,
    inner_ended: bool,
}

impl<'a, R: Read + ?Sized> Limited<'a, R> {
    pub(crate) fn new(inner: &'a mut R, remaining: &'a mut u64) -> Self {
        Self {
            inner,
            remaining,
            inner_ended: false,
        }
    }

    /// Returns true if the wrapped reader ended before the limit was reached.
    pub(crate) fn inner_ended(&self) -> bool {
        self.inner_ended
    }
}

impl<R: Read + ?Sized> Read for Limited<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if *self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(*self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            self.inner_ended = true;
        }
        *self.remaining -= n as u64;
        Ok(n)
    }
}
