//! Low-level ZIP archive parser.
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header and data

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use anyhow::{bail, Context, Result};

use super::structures::*;
use crate::entry::try_alloc_zeroed;
use crate::io::Stream;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Central Directory bytes together with their position in the archive
pub struct CentralDirectory {
    pub offset: u64,
    pub data: Vec<u8>,
    pub total_entries: u64,
    /// Absolute offset and length of the archive comment
    pub comment: (u64, usize),
}

/// Low-level ZIP file parser over a [`Stream`].
///
/// Typically used through [`ZipDecoder`](super::ZipDecoder) rather than
/// directly.
///
/// ## Example
///
/// ```ignore
/// let parser = ZipParser::new(stream);
/// let cd = parser.read_central_directory()?;
/// let (entry, next) = parser.parse_cdfh(&cd, 0)?;
/// let offset = parser.get_data_offset(&entry)?;
/// // Read compressed data from offset...
/// ```
pub struct ZipParser {
    stream: Stream,
    size: u64,
}

impl ZipParser {
    /// Create a new parser for the given stream.
    ///
    /// # Arguments
    ///
    /// * `stream` - A shared random-access stream over the archive bytes
    ///
    /// # Returns
    ///
    /// A new parser instance ready to read the archive.
    pub fn new(stream: Stream) -> Self {
        let size = stream.size();
        Self { stream, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The EOCD is located at the end of the ZIP file. This method
    /// handles both the simple case (no comment) and archives with
    /// comments by searching backwards for the signature.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    ///
    /// # Errors
    ///
    /// Returns an error if no valid EOCD can be found, indicating
    /// the file is not a valid ZIP archive.
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            bail!("Not a valid ZIP file (too short)");
        }

        // Try the common case first: no comment, EOCD ends the file
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.stream.read_exact_at(offset, &mut buf)?;

        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok((eocd, offset));
        }

        // The EOCD is followed by a comment, search backwards for it
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.stream.read_exact_at(search_start, &mut buf)?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // Only accept a record whose comment runs exactly to the end of the file
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// Read the ZIP64 End of Central Directory record, located through the
    /// locator that immediately precedes the regular EOCD.
    ///
    /// # Arguments
    ///
    /// * `eocd_offset` - Offset of the regular EOCD in the file
    ///
    /// # Returns
    ///
    /// The parsed ZIP64 EOCD record with 64-bit sizes and offsets.
    pub fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .context("Missing ZIP64 End of Central Directory Locator")?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.stream.read_exact_at(locator_offset, &mut locator_buf)?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.stream
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)?;

        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// Locate and load the whole Central Directory.
    ///
    /// # Errors
    ///
    /// Fails for multi-disk archives, for a directory that lies outside the
    /// file, and for an entry count the directory size cannot hold.
    pub fn read_central_directory(&self) -> Result<CentralDirectory> {
        let (eocd, eocd_offset) = self.find_eocd()?;
        if eocd.is_multi_disk() {
            bail!("Multi-disk ZIP archives are not supported");
        }

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset)?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        let cd_end = cd_offset
            .checked_add(cd_size)
            .filter(|end| *end <= self.size)
            .context("Central Directory lies outside the file")?;
        if total_entries > cd_size / CDFH_MIN_SIZE as u64 {
            bail!(
                "Central Directory of {} bytes cannot hold {} entries",
                cd_size,
                total_entries
            );
        }

        let mut data = usize::try_from(cd_size)
            .ok()
            .and_then(try_alloc_zeroed)
            .context("Central Directory too large")?;
        self.stream.read_exact_at(cd_offset, &mut data)?;
        log::trace!(
            "ZIP central directory at {}..{}, {} entries",
            cd_offset,
            cd_end,
            total_entries
        );

        Ok(CentralDirectory {
            offset: cd_offset,
            data,
            total_entries,
            comment: (
                eocd_offset + EndOfCentralDirectory::SIZE as u64,
                eocd.comment_len as usize,
            ),
        })
    }

    /// Parse the Central Directory File Header at `pos` within `cd`.
    ///
    /// # Arguments
    ///
    /// * `cd` - The Central Directory loaded by [`read_central_directory`](Self::read_central_directory)
    /// * `pos` - Offset of the record within `cd.data`
    ///
    /// # Returns
    ///
    /// The parsed entry, with ZIP64 sizes and offsets applied, and the
    /// position just past its record.
    pub fn parse_cdfh(&self, cd: &CentralDirectory, pos: u64) -> Result<(ZipFileEntry, u64)> {
        let mut cursor = Cursor::new(cd.data.as_slice());
        cursor.set_position(pos);

        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            bail!("Invalid Central Directory File Header at {}", cd.offset + pos);
        }

        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes)?;
        // Use lossy conversion to handle non-UTF8 filenames gracefully
        let file_name = String::from_utf8_lossy(&file_name_bytes).into_owned();

        // ZIP64 extended information lives in extra field 0x0001
        let extra_field_end = cursor.position() + extra_field_length as u64;

        while cursor.position() + 4 <= extra_field_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()?;
            let field_end = (cursor.position() + field_size as u64).min(extra_field_end);

            if header_id == 0x0001 {
                // Present only for header fields set to 0xFFFFFFFF, in this order
                if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    compressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    lfh_offset = cursor.read_u64::<LittleEndian>()?;
                }
            }
            cursor.set_position(field_end);
        }

        let next = extra_field_end + file_comment_length as u64;
        if next > cd.data.len() as u64 {
            bail!("Truncated Central Directory File Header at {}", cd.offset + pos);
        }

        Ok((
            ZipFileEntry {
                file_name,
                flags,
                compression_method: CompressionMethod::from_u16(compression_method),
                compressed_size,
                uncompressed_size,
                crc32,
                lfh_offset,
                last_mod_time,
                last_mod_date,
                cdfh_offset: cd.offset + pos,
            },
            next,
        ))
    }

    /// Get the offset where an entry's compressed data begins.
    ///
    /// The Local File Header repeats the name and carries its own extra
    /// field, which may differ in length from the Central Directory copy.
    ///
    /// # Arguments
    ///
    /// * `entry` - The file entry to get the data offset for
    ///
    /// # Returns
    ///
    /// The absolute offset where the compressed data starts.
    ///
    /// # Errors
    ///
    /// Fails if the Local File Header is missing or its signature is wrong,
    /// or if the offset does not fit in a `u64`.
    pub fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.stream.read_exact_at(entry.lfh_offset, &mut lfh_buf)?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header at {}", entry.lfh_offset);
        }

        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26); // Offset to filename length field

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        entry
            .lfh_offset
            .checked_add(LFH_SIZE as u64 + file_name_length + extra_field_length)
            .with_context(|| format!("Data offset of {} overflows", entry.file_name))
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }
}
