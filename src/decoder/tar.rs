//! TAR decoder on top of the `tar` crate.
//!
//! Every step starts a fresh `tar::Archive` at a header position, so a stored
//! offset is simply where an entry's header chain begins (GNU long-name and
//! pax records included) and re-anchoring parses that chain again.

use anyhow::{bail, Context, Result};
use tar::EntryType;

use super::{Decoder, EntryHeader};
use crate::entry::FileTime;
use crate::io::{Stream, StreamCursor};

const BLOCK_SIZE: u64 = 512;

pub fn open(stream: Stream) -> Result<Box<dyn Decoder>> {
    Ok(Box::new(TarDecoder::new(stream)?))
}

struct ParsedEntry {
    header: EntryHeader,
    kind: EntryType,
    data_pos: u64,
    next_pos: u64,
}

pub struct TarDecoder {
    stream: Stream,
    /// First entry, read while validating the archive
    pending: Option<ParsedEntry>,
    next_pos: u64,
    eof: bool,
    current: Option<ParsedEntry>,
}

impl TarDecoder {
    pub fn new(stream: Stream) -> Result<Self> {
        let first = read_entry_at(&stream, 0).context("Not a valid TAR file")?;
        let eof = first.is_none();
        Ok(Self {
            stream,
            pending: first,
            next_pos: 0,
            eof,
            current: None,
        })
    }
}

/// Parse the header chain starting at `pos`, skipping pax global headers
fn read_entry_at(stream: &Stream, pos: u64) -> Result<Option<ParsedEntry>> {
    let mut archive = tar::Archive::new(StreamCursor::at(stream.clone(), pos));
    for entry in archive.entries()? {
        let entry = entry?;
        let header = entry.header();
        let kind = header.entry_type();
        let entry_size = header.entry_size()?;
        let data_pos = pos
            .checked_add(entry.raw_file_position())
            .context("TAR entry position overflows")?;
        let next_pos = entry_size
            .div_ceil(BLOCK_SIZE)
            .checked_mul(BLOCK_SIZE)
            .and_then(|padded| data_pos.checked_add(padded))
            .with_context(|| format!("TAR entry size {} overflows", entry_size))?;

        if kind == EntryType::XGlobalHeader {
            log::trace!("Skipping pax global header at {}", pos + entry.raw_header_position());
            continue;
        }

        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let mtime = header.mtime().unwrap_or(0);
        return Ok(Some(ParsedEntry {
            header: EntryHeader {
                name: Some(name),
                size: entry.size(),
                offset: pos,
                file_time: FileTime::from_unix(i64::try_from(mtime).unwrap_or(i64::MAX)),
            },
            kind,
            data_pos,
            next_pos,
        }));
    }
    Ok(None)
}

impl Decoder for TarDecoder {
    fn at_eof(&self) -> bool {
        self.eof
    }

    fn parse_entry(&mut self) -> Result<Option<EntryHeader>> {
        if self.eof {
            return Ok(None);
        }
        let parsed = match self.pending.take() {
            Some(parsed) => Some(parsed),
            None => read_entry_at(&self.stream, self.next_pos)?,
        };
        let Some(parsed) = parsed else {
            self.eof = true;
            self.current = None;
            return Ok(None);
        };

        self.next_pos = parsed.next_pos;
        let header = parsed.header.clone();
        self.current = Some(parsed);
        Ok(Some(header))
    }

    fn parse_entry_at(&mut self, offset: u64) -> Result<EntryHeader> {
        self.current = None;
        let parsed = read_entry_at(&self.stream, offset)?
            .with_context(|| format!("No TAR entry at offset {}", offset))?;
        let header = parsed.header.clone();
        self.current = Some(parsed);
        Ok(header)
    }

    fn uncompress(&mut self, buf: &mut [u8]) -> Result<()> {
        let current = self.current.as_ref().context("No current TAR entry")?;
        if current.kind == EntryType::GNUSparse {
            bail!("Sparse TAR entries are not supported");
        }
        if buf.len() as u64 != current.header.size {
            bail!(
                "Buffer of {} bytes for a {} byte TAR entry",
                buf.len(),
                current.header.size
            );
        }
        self.stream.read_exact_at(current.data_pos, buf)
    }
}
