//! Per-format decoders behind one capability.
//!
//! A decoder is the parsed form of one container. It walks the directory one
//! entry at a time, can be re-anchored on an entry through the offset it
//! reported for it, and decompresses the current entry into a caller buffer.
//! The [`Archive`](crate::Archive) never looks inside a decoder; it only sees
//! the [`Decoder`] trait and the [`Opener`] that produced it.
//!
//! ## Formats
//!
//! - [`zip`]: central directory based reader, STORED, DEFLATE, BZIP2 and LZMA
//! - [`tar`]: ustar/GNU/pax headers through the `tar` crate
//! - [`sevenz`]: 7z through `sevenz-rust2`
//! - [`rar`]: RAR 1.5 to 5 through the `unrar` crate

pub mod rar;
pub mod sevenz;
pub mod tar;
pub mod zip;

use anyhow::Result;

use crate::entry::FileTime;
use crate::io::Stream;

/// Metadata the decoder reports for the entry it is positioned on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// `None` when the format stores no usable name
    pub name: Option<String>,
    pub size: u64,
    /// Value to pass to [`Decoder::parse_entry_at`] to find this entry again
    pub offset: u64,
    pub file_time: FileTime,
}

/// Opaque parsed-archive handle
pub trait Decoder {
    /// True when no entry can be read from the current position.
    ///
    /// Right after opening this means the container is empty or could not be
    /// understood past its signature.
    fn at_eof(&self) -> bool;

    /// Advance to the next directory entry, `None` once the directory is exhausted
    fn parse_entry(&mut self) -> Result<Option<EntryHeader>>;

    /// Re-anchor on the entry previously reported with `offset`
    fn parse_entry_at(&mut self, offset: u64) -> Result<EntryHeader>;

    /// Decompress the current entry. `buf` is exactly the declared size.
    fn uncompress(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Length of the archive-wide comment, 0 when there is none
    fn comment_len(&mut self) -> Result<usize> {
        Ok(0)
    }

    /// Copy the archive-wide comment into `buf`, returning the bytes written
    fn read_comment(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }
}

/// Function turning a stream into a decoder for one fixed format
pub type Opener = fn(Stream) -> Result<Box<dyn Decoder>>;
