use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use anyhow::{bail, Result};

use crate::entry::FileTime;

/// ZIP compression methods.
///
/// Only the methods the decoder can inflate get their own variant; every
/// other method id is kept as [`CompressionMethod::Unknown`] so the entry is
/// still listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Bzip2,
    Lzma,
    Unknown(u16),
}

impl CompressionMethod {
    /// Map the method id stored in a CDFH or LFH.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// assert_eq!(CompressionMethod::from_u16(8), CompressionMethod::Deflate);
    /// assert_eq!(CompressionMethod::from_u16(95), CompressionMethod::Unknown(95));
    /// ```
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            12 => CompressionMethod::Bzip2,
            14 => CompressionMethod::Lzma,
            _ => CompressionMethod::Unknown(value),
        }
    }

    /// Inverse of [`from_u16`](Self::from_u16)
    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Bzip2 => 12,
            CompressionMethod::Lzma => 14,
            CompressionMethod::Unknown(v) => *v,
        }
    }

    /// STORED or DEFLATE, the methods kept by a deflate-only listing
    pub fn is_deflate_compatible(&self) -> bool {
        matches!(self, CompressionMethod::Stored | CompressionMethod::Deflate)
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Parse the fixed part of the record.
    ///
    /// # Arguments
    ///
    /// * `data` - At least [`SIZE`](Self::SIZE) bytes starting at the signature
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is too short or the signature is wrong.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid End of Central Directory");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Any field saturated to its maximum means the real value lives in the
    /// ZIP64 EOCD
    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }

    pub fn is_multi_disk(&self) -> bool {
        self.disk_number != 0 || self.disk_with_cd != 0
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    /// Parse the locator that precedes the regular EOCD.
    ///
    /// # Arguments
    ///
    /// * `data` - At least [`SIZE`](Self::SIZE) bytes starting at the signature
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 format");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    /// Parse the fixed part of the ZIP64 EOCD. The extensible data sector
    /// that may follow is ignored.
    ///
    /// # Arguments
    ///
    /// * `data` - At least [`MIN_SIZE`](Self::MIN_SIZE) bytes starting at the signature
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 format");
        }

        // Skip record size, versions and disk numbers
        let mut cursor = Cursor::new(&data[4 + 8 + 2 + 2 + 4 + 4..]);
        let _disk_entries = cursor.read_u64::<LittleEndian>()?;

        Ok(Self {
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// General purpose flag: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// Central directory record of one entry
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    /// General purpose bit flags
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    /// Offset of the Local File Header, after ZIP64 extra fields are applied
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    /// Absolute offset of this record's CDFH
    pub cdfh_offset: u64,
}

impl ZipFileEntry {
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Modification time from the DOS date and time fields
    pub fn file_time(&self) -> FileTime {
        FileTime::from_dos(self.last_mod_date, self.last_mod_time)
    }
}
