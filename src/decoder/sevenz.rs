//! 7z decoder backed by `sevenz-rust2`.
//!
//! The 7z header lists every file up front, so the stored offset of an entry
//! is its index in that table. Names are not unique, so extraction goes by
//! that index too.

use std::io::{self, Read};

use anyhow::{anyhow, bail, Context, Result};
use sevenz_rust2::{ArchiveEntry, ArchiveReader, Password};

use super::{Decoder, EntryHeader};
use crate::entry::FileTime;
use crate::io::{Stream, StreamCursor};

pub fn open(stream: Stream) -> Result<Box<dyn Decoder>> {
    Ok(Box::new(SevenZipDecoder::new(stream)?))
}

pub struct SevenZipDecoder {
    reader: ArchiveReader<StreamCursor>,
    next_index: usize,
    current: Option<usize>,
}

impl SevenZipDecoder {
    pub fn new(stream: Stream) -> Result<Self> {
        let reader = ArchiveReader::new(StreamCursor::new(stream), Password::empty())
            .map_err(|e| anyhow!("Not a valid 7z file: {}", e))?;
        Ok(Self {
            reader,
            next_index: 0,
            current: None,
        })
    }

    fn file_count(&self) -> usize {
        self.reader.archive().files.len()
    }

    fn header(&self, index: usize) -> EntryHeader {
        let entry = &self.reader.archive().files[index];
        let file_time = if entry.has_last_modified_date {
            let ticks: u64 = entry.last_modified_date.into();
            FileTime::from_raw(ticks)
        } else {
            FileTime::default()
        };
        EntryHeader {
            name: Some(entry.name().to_string()),
            size: entry.size,
            offset: index as u64,
            file_time,
        }
    }

    /// Decompress the entry at `index`.
    ///
    /// A unique name goes through the reader's name index, which decodes only
    /// the entry's block. A repeated name would resolve to the last entry
    /// carrying it, so those entries are found by walking the blocks in
    /// order and matching the entry record itself.
    fn read_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        let files = &self.reader.archive().files;
        let name = files[index].name().to_string();
        if files.iter().filter(|file| file.name() == name).count() == 1 {
            return self
                .reader
                .read_file(&name)
                .map_err(|e| anyhow!("Failed to decompress {}: {}", name, e));
        }

        let target: *const ArchiveEntry = &files[index];
        let mut data = None;
        self.reader
            .for_each_entries(|entry, reader| {
                if data.is_some() {
                    return Ok(false);
                }
                if std::ptr::eq(entry, target) {
                    let mut buf = Vec::new();
                    reader.read_to_end(&mut buf)?;
                    data = Some(buf);
                    return Ok(false);
                }
                // Later entries of a block start where this one ends
                io::copy(reader, &mut io::sink())?;
                Ok(true)
            })
            .map_err(|e| anyhow!("Failed to decompress {} (entry {}): {}", name, index, e))?;
        data.with_context(|| format!("7z entry {} was not reached while decoding", index))
    }
}

impl Decoder for SevenZipDecoder {
    fn at_eof(&self) -> bool {
        self.next_index >= self.file_count()
    }

    fn parse_entry(&mut self) -> Result<Option<EntryHeader>> {
        if self.at_eof() {
            self.current = None;
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
            .filter(|index| *index < self.file_count())
            .with_context(|| format!("No 7z entry with index {}", offset))?;
        self.current = Some(index);
        Ok(self.header(index))
    }

    fn uncompress(&mut self, buf: &mut [u8]) -> Result<()> {
        let index = self.current.context("No current 7z entry")?;
        let entry = &self.reader.archive().files[index];
        if entry.is_directory || !entry.has_stream {
            if !buf.is_empty() {
                bail!("7z entry {} has no data", entry.name());
            }
            return Ok(());
        }

        let name = entry.name().to_string();
        let data = self.read_entry(index)?;
        if data.len() != buf.len() {
            bail!(
                "{} decompressed to {} bytes, expected {}",
                name,
                data.len(),
                buf.len()
            );
        }
        buf.copy_from_slice(&data);
        Ok(())
    }
}
