//! Entry extraction for [`Archive`].

use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use super::destination::{BodyProvider, run_extraction, write_entry};
use super::{Archive, Entry, ExtractResult, ExtractionSink};
use crate::streaming::Reader;
use crate::streaming::body::BodyDecoder;
use crate::{Error, Result};

impl Archive {
    /// Opens a random-access reader over one entry's decoded body.
    ///
    /// Entries can be opened in any order and any number of times. The
    /// reader verifies the declared size and CRC-32.
    ///
    /// # Errors
    ///
    /// - [`Error::SequentialAccessRequired`] for solid archives; use
    ///   [`read_entry`](Self::read_entry), [`extract_all`](Self::extract_all)
    ///   or [`extract_all_entries`](Self::extract_all_entries) instead
    /// - [`Error::UnsupportedCodec`] if the entry's codec is not registered;
    ///   the archive stays usable
    /// - [`Error::PasswordRequired`] / [`Error::WrongPassword`] for
    ///   encrypted entries
    pub fn open_entry(&mut self, index: usize) -> Result<EntryReader<'_>> {
        let entry = self.lookup(index)?.clone();
        if self.is_solid() {
            return Err(Error::SequentialAccessRequired {
                index,
                path: entry.path,
            });
        }

        let mut remaining = self.backend.open_entry_body(&mut self.volumes, &entry)?;
        let volume_count = self.volumes.len();
        let decoder = BodyDecoder::open(
            &entry,
            &mut self.volumes,
            &self.codecs,
            self.password.as_ref(),
            volume_count,
            &mut remaining,
        )?;
        Ok(EntryReader {
            archive: self,
            entry,
            decoder,
        })
    }

    /// Decodes one entry into memory.
    ///
    /// For solid archives this streams through every entry in front of the
    /// requested one.
    pub fn read_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        if self.is_solid() {
            self.lookup(index)?;
            let mut reader = self.sequential()?;
            reader.advance_to(index)?;
            return reader.read_body();
        }
        let mut reader = self.open_entry(index)?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).map_err(Error::from_io)?;
        Ok(out)
    }

    /// Decodes the entry with the given path into memory.
    pub fn read_entry_by_path(&mut self, path: &str) -> Result<Vec<u8>> {
        let index = self
            .entry_by_path(path)
            .map(|e| e.index)
            .ok_or_else(|| Error::EntryNotFound(path.to_string()))?;
        self.read_entry(index)
    }

    /// Extracts one entry into `sink`.
    ///
    /// Valid for any entry at any time. For solid archives the request is
    /// redirected to a sequential pass up to the entry, so extracting many
    /// entries one by one costs one pass each; use
    /// [`extract_all`](Self::extract_all) instead.
    pub fn extract_entry(
        &mut self,
        index: usize,
        sink: &mut dyn ExtractionSink,
    ) -> Result<ExtractResult> {
        let entry = self.lookup(index)?.clone();
        run_extraction(sink, Some(1), |sink, result| {
            if self.is_solid() {
                log::debug!(
                    "Entry {} of a solid archive requested; streaming {} preceding entries",
                    index,
                    index
                );
                let mut reader = self.sequential()?;
                let entry = reader.advance_to(index)?.clone();
                write_entry(sink, &entry, result, &mut reader)
            } else {
                write_entry(sink, &entry, result, self)
            }
        })
    }

    /// Extracts every entry into `sink`, in container order.
    ///
    /// Solid archives are decoded in exactly one pass with one decoder
    /// session. The first failing entry stops the extraction; the archive
    /// stays open.
    pub fn extract_all(&mut self, sink: &mut dyn ExtractionSink) -> Result<ExtractResult> {
        let total = self.entries.len();
        run_extraction(sink, Some(total), |sink, result| {
            if self.is_solid() {
                log::debug!("Extracting {} entries in one solid pass", total);
                return self.sequential()?.write_remaining(sink, result);
            }
            for index in 0..total {
                let entry = self.entries[index].clone();
                write_entry(sink, &entry, result, self)?;
            }
            Ok(())
        })
    }

    /// Returns a streaming reader over the archive's own volumes.
    ///
    /// The reader starts before the first entry and does not release the
    /// volumes when dropped.
    pub fn extract_all_entries(&mut self) -> Result<Reader<'_>> {
        self.sequential()
    }

    /// Releases the volumes.
    ///
    /// Owned sources are closed; borrowed ones are left open. Dropping the
    /// archive has the same effect.
    pub fn close(mut self) {
        self.volumes.release();
    }

    fn sequential(&mut self) -> Result<Reader<'_>> {
        Reader::over(
            &mut self.volumes,
            self.factory.create(),
            Arc::clone(&self.codecs),
            self.password.clone(),
        )
    }
}

impl BodyProvider for Archive {
    fn open_body(&mut self, entry: &Entry) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.open_entry(entry.index)?))
    }
}

/// The decoded body of one entry of an [`Archive`].
///
/// Reads return typed errors boxed in [`io::Error`]; convert them back with
/// [`Error::from`].
pub struct EntryReader<'a> {
    archive: &'a mut Archive,
    entry: Entry,
    decoder: BodyDecoder,
}

impl EntryReader<'_> {
    /// The entry being read.
    pub fn entry(&self) -> &Entry {
        &self.entry
    }
}

impl Read for EntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder
            .read(&mut self.archive.volumes, None, buf)
            .map_err(io::Error::from)
    }
}

impl fmt::Debug for EntryReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryReader")
            .field("entry", &self.entry.path)
            .field("decoder", &self.decoder)
            .finish()
    }
}
