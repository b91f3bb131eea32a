//! ZIP archive decoder.
//!
//! The module is organized into three parts:
//!
//! - [`structures`]: ZIP format records (EOCD, ZIP64 records, directory entries)
//! - [`parser`]: binary parsing of those records from a [`Stream`]
//! - [`ZipDecoder`]: the [`Decoder`] walking the Central Directory
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The decoder loads the Central Directory once and reports each entry's
//! Central Directory File Header offset as its stored offset, so re-anchoring
//! is a lookup into memory rather than a new scan of the file.
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - Decompresses STORED, DEFLATE, BZIP2 and LZMA; other methods are listed
//!   but fail to extract

mod parser;
mod structures;

pub use parser::{CentralDirectory, ZipParser};
pub use structures::*;

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use anyhow::{anyhow, bail, Context, Result};
use bzip2::read::BzDecoder;
use flate2::read::DeflateDecoder;
use flate2::Crc;
use xz2::read::XzDecoder;
use xz2::stream::Stream as LzmaStream;

use super::{Decoder, EntryHeader};
use crate::io::{Stream, StreamCursor};

/// Open a ZIP archive listing every entry
pub fn open_any(stream: Stream) -> Result<Box<dyn Decoder>> {
    Ok(Box::new(ZipDecoder::new(stream, false)?))
}

/// Open a ZIP archive listing only STORED and DEFLATE entries
pub fn open_deflated(stream: Stream) -> Result<Box<dyn Decoder>> {
    Ok(Box::new(ZipDecoder::new(stream, true)?))
}

/// Central Directory walker
pub struct ZipDecoder {
    parser: ZipParser,
    cd: CentralDirectory,
    /// Position of the next record within `cd.data`
    next_pos: u64,
    remaining: u64,
    current: Option<ZipFileEntry>,
    deflated_only: bool,
}

impl ZipDecoder {
    pub fn new(stream: Stream, deflated_only: bool) -> Result<Self> {
        let parser = ZipParser::new(stream);
        let cd = parser.read_central_directory()?;
        let remaining = cd.total_entries;
        Ok(Self {
            parser,
            cd,
            next_pos: 0,
            remaining,
            current: None,
            deflated_only,
        })
    }

    fn header(entry: &ZipFileEntry) -> EntryHeader {
        EntryHeader {
            name: Some(entry.file_name.clone()),
            size: entry.uncompressed_size,
            offset: entry.cdfh_offset,
            file_time: entry.file_time(),
        }
    }
}

impl Decoder for ZipDecoder {
    fn at_eof(&self) -> bool {
        self.remaining == 0
    }

    fn parse_entry(&mut self) -> Result<Option<EntryHeader>> {
        while self.remaining > 0 {
            let (entry, next_pos) = self.parser.parse_cdfh(&self.cd, self.next_pos)?;
            self.next_pos = next_pos;
            self.remaining -= 1;

            if self.deflated_only && !entry.compression_method.is_deflate_compatible() {
                log::debug!(
                    "Skipping {} (compression method {})",
                    entry.file_name,
                    entry.compression_method.as_u16()
                );
                continue;
            }

            let header = Self::header(&entry);
            self.current = Some(entry);
            return Ok(Some(header));
        }
        self.current = None;
        Ok(None)
    }

    fn parse_entry_at(&mut self, offset: u64) -> Result<EntryHeader> {
        self.current = None;
        let pos = offset
            .checked_sub(self.cd.offset)
            .filter(|pos| *pos < self.cd.data.len() as u64)
            .with_context(|| format!("Offset {} is outside the Central Directory", offset))?;
        let (entry, _) = self.parser.parse_cdfh(&self.cd, pos)?;
        let header = Self::header(&entry);
        self.current = Some(entry);
        Ok(header)
    }

    fn uncompress(&mut self, buf: &mut [u8]) -> Result<()> {
        let entry = self.current.as_ref().context("No current ZIP entry")?;
        if entry.is_encrypted() {
            bail!("{} is encrypted", entry.file_name);
        }
        if buf.len() as u64 != entry.uncompressed_size {
            bail!(
                "Buffer of {} bytes for {} bytes of {}",
                buf.len(),
                entry.uncompressed_size,
                entry.file_name
            );
        }

        let data_offset = self.parser.get_data_offset(entry)?;
        let compressed = StreamCursor::at(self.parser.stream().clone(), data_offset)
            .take(entry.compressed_size);
        match entry.compression_method {
            CompressionMethod::Stored => {
                if entry.compressed_size != entry.uncompressed_size {
                    bail!("Stored entry {} has mismatched sizes", entry.file_name);
                }
                self.parser.stream().read_exact_at(data_offset, buf)?;
            }
            CompressionMethod::Deflate => {
                DeflateDecoder::new(compressed)
                    .read_exact(buf)
                    .with_context(|| format!("Failed to inflate {}", entry.file_name))?;
            }
            CompressionMethod::Bzip2 => {
                BzDecoder::new(compressed)
                    .read_exact(buf)
                    .with_context(|| format!("Failed to decompress BZIP2 data of {}", entry.file_name))?;
            }
            CompressionMethod::Lzma => {
                lzma_decoder(compressed, entry)?
                    .read_exact(buf)
                    .with_context(|| format!("Failed to decompress LZMA data of {}", entry.file_name))?;
            }
            CompressionMethod::Unknown(method) => {
                bail!(
                    "Unsupported compression method {} for {}",
                    method,
                    entry.file_name
                );
            }
        }

        let mut crc = Crc::new();
        crc.update(buf);
        if crc.sum() != entry.crc32 {
            bail!("CRC mismatch for {}", entry.file_name);
        }
        Ok(())
    }

    fn comment_len(&mut self) -> Result<usize> {
        Ok(self.cd.comment.1)
    }

    fn read_comment(&mut self, buf: &mut [u8]) -> Result<usize> {
        let (offset, len) = self.cd.comment;
        let n = len.min(buf.len());
        self.parser.stream().read_exact_at(offset, &mut buf[..n])?;
        Ok(n)
    }
}

/// General purpose flag: the LZMA stream ends with an end marker
const FLAG_LZMA_EOS: u16 = 0x0002;

/// Wrap ZIP LZMA data in an LZMA-alone decoder.
///
/// ZIP stores a 4 byte version/size prefix and the 5 property bytes in front
/// of the raw stream. The alone header liblzma expects is the same properties
/// followed by the uncompressed size, all ones when an end marker is present.
///
/// # Arguments
///
/// * `compressed` - The entry data, starting at the LZMA prefix
/// * `entry` - Directory record supplying the size and flags
fn lzma_decoder<R: Read>(
    mut compressed: R,
    entry: &ZipFileEntry,
) -> Result<XzDecoder<std::io::Chain<Cursor<Vec<u8>>, R>>> {
    let _version = compressed.read_u16::<LittleEndian>()?;
    let props_size = compressed.read_u16::<LittleEndian>()?;
    if props_size != 5 {
        bail!("Unexpected LZMA properties size {} in {}", props_size, entry.file_name);
    }

    let mut header = vec![0u8; 5];
    compressed.read_exact(&mut header)?;
    let size = if entry.flags & FLAG_LZMA_EOS != 0 {
        u64::MAX
    } else {
        entry.uncompressed_size
    };
    header.extend_from_slice(&size.to_le_bytes());

    let stream = LzmaStream::new_lzma_decoder(u64::MAX)
        .map_err(|e| anyhow!("Failed to set up LZMA decoder: {}", e))?;
    Ok(XzDecoder::new_stream(Cursor::new(header).chain(compressed), stream))
}
