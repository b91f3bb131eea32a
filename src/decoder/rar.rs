//! RAR decoder backed by the `unrar` crate.
//!
//! The unrar library only reads archives from a file. Streams backed by one
//! are read in place; any other stream is first copied to a temporary file
//! that lives as long as the decoder.
//!
//! The whole header list is read when the decoder is created. The stored
//! offset of an entry is its position in that list, and extraction reopens
//! the archive and skips headers until it reaches it.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tempfile::NamedTempFile;
use unrar::Archive as RarArchive;

use super::{Decoder, EntryHeader};
use crate::entry::FileTime;
use crate::io::{Stream, StreamCursor};

pub fn open(stream: Stream) -> Result<Box<dyn Decoder>> {
    Ok(Box::new(RarDecoder::new(stream)?))
}

/// File the unrar library reads the archive from
enum Source {
    Path(PathBuf),
    Spilled(NamedTempFile),
}

impl Source {
    fn new(stream: &Stream) -> Result<Self> {
        if let Some(path) = stream.path() {
            return Ok(Source::Path(path.to_path_buf()));
        }

        let mut file = tempfile::Builder::new()
            .prefix("arcview-")
            .suffix(".rar")
            .tempfile()
            .context("Failed to create a temporary RAR file")?;
        io::copy(&mut StreamCursor::new(stream.clone()), &mut file)
            .context("Failed to copy the RAR stream to a temporary file")?;
        log::debug!(
            "Copied {} byte RAR stream to {}",
            stream.size(),
            file.path().display()
        );
        Ok(Source::Spilled(file))
    }

    fn path(&self) -> &Path {
        match self {
            Source::Path(path) => path,
            Source::Spilled(file) => file.path(),
        }
    }
}

#[derive(Debug, Clone)]
struct RarEntry {
    name: String,
    size: u64,
    file_time: FileTime,
    is_directory: bool,
}

pub struct RarDecoder {
    source: Source,
    entries: Vec<RarEntry>,
    /// Error that ended the header list early, reported after `entries`
    walk_error: Option<String>,
    next_index: usize,
    current: Option<usize>,
}

impl RarDecoder {
    pub fn new(stream: Stream) -> Result<Self> {
        let source = Source::new(&stream)?;
        let listing = RarArchive::new(source.path())
            .open_for_listing()
            .map_err(|e| anyhow!("Not a valid RAR file: {}", e))?;

        let mut entries = Vec::new();
        let mut walk_error = None;
        for header in listing {
            match header {
                Ok(header) => {
                    let dos = header.file_time;
                    entries.push(RarEntry {
                        name: header.filename.to_string_lossy().into_owned(),
                        size: header.unpacked_size,
                        file_time: FileTime::from_dos((dos >> 16) as u16, dos as u16),
                        is_directory: header.is_directory(),
                    });
                }
                Err(e) => {
                    walk_error = Some(e.to_string());
                    break;
                }
            }
        }

        if entries.is_empty() {
            if let Some(e) = walk_error {
                bail!("Failed to read the first RAR header: {}", e);
            }
        }

        Ok(Self {
            source,
            entries,
            walk_error,
            next_index: 0,
            current: None,
        })
    }

    fn header(&self, index: usize) -> EntryHeader {
        let entry = &self.entries[index];
        EntryHeader {
            name: Some(entry.name.clone()),
            size: entry.size,
            offset: index as u64,
            file_time: entry.file_time,
        }
    }

    /// Reopen the archive and decompress the entry at `index`
    fn extract(&self, index: usize) -> Result<Vec<u8>> {
        let mut archive = RarArchive::new(self.source.path())
            .open_for_processing()
            .map_err(|e| anyhow!("Failed to reopen RAR archive: {}", e))?;

        let mut position = 0;
        loop {
            let header = archive
                .read_header()
                .map_err(|e| anyhow!("Failed to read RAR header {}: {}", position, e))?
                .with_context(|| format!("RAR archive ended before entry {}", index))?;
            if position == index {
                let (data, _) = header
                    .read()
                    .map_err(|e| anyhow!("Failed to decompress {}: {}", self.entries[index].name, e))?;
                return Ok(data);
            }
            archive = header
                .skip()
                .map_err(|e| anyhow!("Failed to skip RAR entry {}: {}", position, e))?;
            position += 1;
        }
    }
}

impl Decoder for RarDecoder {
    fn at_eof(&self) -> bool {
        self.next_index >= self.entries.len()
    }

    fn parse_entry(&mut self) -> Result<Option<EntryHeader>> {
        if self.at_eof() {
            self.current = None;
            if let Some(e) = self.walk_error.take() {
                bail!("RAR header list is damaged: {}", e);
            }
            return Ok(None);
        }
        let index = self.next_index;
        self.next_index += 1;
        self.current = Some(index);
        Ok(Some(self.header(index)))
    }

    fn parse_entry_at(&mut self, offset: u64) -> Result<EntryHeader> {
        self.current = None;
        let index = usize::try_from(offset)
            .ok()
            .filter(|index| *index < self.entries.len())
            .with_context(|| format!("No RAR entry with index {}", offset))?;
        self.current = Some(index);
        Ok(self.header(index))
    }

    fn uncompress(&mut self, buf: &mut [u8]) -> Result<()> {
        let index = self.current.context("No current RAR entry")?;
        let entry = &self.entries[index];
        if entry.is_directory {
            if !buf.is_empty() {
                bail!("RAR directory {} has no data", entry.name);
            }
            return Ok(());
        }

        let data = self.extract(index)?;
        if data.len() != buf.len() {
            bail!(
                "{} decompressed to {} bytes, expected {}",
                entry.name,
                data.len(),
                buf.len()
            );
        }
        buf.copy_from_slice(&data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{LocalFileReader, MemoryReader};
    use std::io::Write;
    use std::sync::Arc;

    #[test]
    fn file_backed_streams_are_read_in_place() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Rar!").unwrap();
        file.flush().unwrap();

        let stream: Stream = Arc::new(LocalFileReader::new(file.path()).unwrap());
        let source = Source::new(&stream).unwrap();
        assert!(matches!(source, Source::Path(_)));
        assert_eq!(source.path(), file.path());
    }

    #[test]
    fn memory_streams_are_copied_to_a_temporary_file() {
        let stream: Stream = Arc::new(MemoryReader::new(b"not a rar".to_vec()));
        let source = Source::new(&stream).unwrap();
        assert!(matches!(source, Source::Spilled(_)));
        assert_eq!(std::fs::read(source.path()).unwrap(), b"not a rar");

        let path = source.path().to_path_buf();
        drop(source);
        assert!(!path.exists());
    }

    #[test]
    fn garbage_is_rejected() {
        let stream: Stream = Arc::new(MemoryReader::new(b"definitely not a rar archive".to_vec()));
        assert!(RarDecoder::new(stream).is_err());
    }
}
