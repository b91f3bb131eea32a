//! Archive builders shared by the integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use bzip2::write::BzEncoder;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use sevenz_rust2::{ArchiveEntry, ArchiveWriter};
use xz2::stream::{LzmaOptions, Stream as LzmaStream};
use xz2::write::XzEncoder;

/// 2015-06-27 13:45:30 as a DOS date/time pair
pub const DOS_DATE: u16 = ((2015 - 1980) << 9) | (6 << 5) | 27;
pub const DOS_TIME: u16 = (13 << 11) | (45 << 5) | 15;

pub const METHOD_STORED: u16 = 0;
pub const METHOD_DEFLATE: u16 = 8;
pub const METHOD_BZIP2: u16 = 12;
pub const METHOD_LZMA: u16 = 14;
pub const METHOD_XZ: u16 = 95;

pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    crc.sum()
}

/// `len` bytes of repetitive but not constant content
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

struct ZipEntry {
    name: String,
    data: Vec<u8>,
    method: u16,
}

/// Minimal ZIP writer: local headers, data, Central Directory and EOCD
#[derive(Default)]
pub struct ZipBuilder {
    entries: Vec<ZipEntry>,
    comment: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.entry(name, data, METHOD_STORED)
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.entry(name, data, METHOD_DEFLATE)
    }

    /// STORED, DEFLATE, BZIP2 and LZMA compress `data`, other methods write it unchanged
    pub fn entry(mut self, name: &str, data: &[u8], method: u16) -> Self {
        self.entries.push(ZipEntry {
            name: name.to_string(),
            data: data.to_vec(),
            method,
        });
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut records = Vec::new();

        for entry in &self.entries {
            let compressed = compress(entry.method, &entry.data);
            let flags = if entry.method == METHOD_LZMA { 0x0002u16 } else { 0 };
            let crc = crc32(&entry.data);
            let lfh_offset = out.len() as u32;

            out.extend_from_slice(b"PK\x03\x04");
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&flags.to_le_bytes());
            out.extend_from_slice(&entry.method.to_le_bytes());
            out.extend_from_slice(&DOS_TIME.to_le_bytes());
            out.extend_from_slice(&DOS_DATE.to_le_bytes());
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
            out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(entry.name.as_bytes());
            out.extend_from_slice(&compressed);

            records.push((crc, compressed.len() as u32, lfh_offset, flags));
        }

        let cd_offset = out.len() as u32;
        for (entry, (crc, compressed_len, lfh_offset, flags)) in self.entries.iter().zip(records) {
            out.extend_from_slice(b"PK\x01\x02");
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&flags.to_le_bytes());
            out.extend_from_slice(&entry.method.to_le_bytes());
            out.extend_from_slice(&DOS_TIME.to_le_bytes());
            out.extend_from_slice(&DOS_DATE.to_le_bytes());
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&compressed_len.to_le_bytes());
            out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes()); // extra field
            out.extend_from_slice(&0u16.to_le_bytes()); // file comment
            out.extend_from_slice(&0u16.to_le_bytes()); // disk number
            out.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
            out.extend_from_slice(&0u32.to_le_bytes()); // external attributes
            out.extend_from_slice(&lfh_offset.to_le_bytes());
            out.extend_from_slice(entry.name.as_bytes());
        }
        let cd_size = out.len() as u32 - cd_offset;

        let count = self.entries.len() as u16;
        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.comment);
        out
    }
}

fn compress(method: u16, data: &[u8]) -> Vec<u8> {
    match method {
        METHOD_DEFLATE => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        METHOD_BZIP2 => {
            let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        METHOD_LZMA => {
            let options = LzmaOptions::new_preset(6).unwrap();
            let stream = LzmaStream::new_lzma_encoder(&options).unwrap();
            let mut encoder = XzEncoder::new_stream(Vec::new(), stream);
            encoder.write_all(data).unwrap();
            let alone = encoder.finish().unwrap();
            // LZMA-alone header: 5 property bytes and an 8 byte size
            let mut out = vec![9, 20, 5, 0];
            out.extend_from_slice(&alone[..5]);
            out.extend_from_slice(&alone[13..]);
            out
        }
        _ => data.to_vec(),
    }
}

const RAR_MARKER: &[u8] = b"Rar!\x1a\x07\x00";
pub const RAR_METHOD_STORE: u8 = 0x30;
pub const RAR_METHOD_NORMAL: u8 = 0x33;
const RAR_FILE_LARGE: u16 = 0x0100;
const RAR_FILE_UNICODE: u16 = 0x0200;

/// RAR 2.9 style archive writer
#[derive(Default)]
pub struct RarBuilder {
    blocks: Vec<u8>,
}

impl RarBuilder {
    pub fn new() -> Self {
        let mut builder = Self::default();
        // Main header: reserved HighPosAV and PosAV fields
        builder.block(0x73, 0, &[0; 6], &[]);
        builder
    }

    /// Append a block, filling in the header CRC and size
    fn block(&mut self, kind: u8, flags: u16, fields: &[u8], data: &[u8]) {
        let head_size = 7 + fields.len() as u16;
        let mut header = Vec::with_capacity(head_size as usize);
        header.push(kind);
        header.extend_from_slice(&flags.to_le_bytes());
        header.extend_from_slice(&head_size.to_le_bytes());
        header.extend_from_slice(fields);
        let crc = crc32(&header) as u16;

        self.blocks.extend_from_slice(&crc.to_le_bytes());
        self.blocks.extend_from_slice(&header);
        self.blocks.extend_from_slice(data);
    }

    /// File header declaring `pack_size` and `unp_size`, followed by `data`
    #[allow(clippy::too_many_arguments)]
    fn file_block(&mut self, name: &[u8], mut flags: u16, data: &[u8], pack_size: u64, unp_size: u64, method: u8, crc: u32) {
        let large = pack_size > u32::MAX as u64 || unp_size > u32::MAX as u64;
        if large {
            flags |= RAR_FILE_LARGE;
        }

        let mut fields = Vec::new();
        fields.extend_from_slice(&(pack_size as u32).to_le_bytes());
        fields.extend_from_slice(&(unp_size as u32).to_le_bytes());
        fields.push(2); // host OS: Windows
        fields.extend_from_slice(&crc.to_le_bytes());
        fields.extend_from_slice(&(((DOS_DATE as u32) << 16) | DOS_TIME as u32).to_le_bytes());
        fields.push(29);
        fields.push(method);
        fields.extend_from_slice(&(name.len() as u16).to_le_bytes());
        fields.extend_from_slice(&0x20u32.to_le_bytes());
        if large {
            fields.extend_from_slice(&((pack_size >> 32) as u32).to_le_bytes());
            fields.extend_from_slice(&((unp_size >> 32) as u32).to_le_bytes());
        }
        fields.extend_from_slice(name);
        self.block(0x74, 0x8000 | flags, &fields, data);
    }

    pub fn stored(mut self, name: &str, data: &[u8]) -> Self {
        let len = data.len() as u64;
        self.file_block(name.as_bytes(), 0, data, len, len, RAR_METHOD_STORE, crc32(data));
        self
    }

    /// Entry claiming the NORMAL method, with `data` standing in for the packed stream
    pub fn compressed(mut self, name: &str, data: &[u8], unp_size: u64) -> Self {
        self.file_block(name.as_bytes(), 0, data, data.len() as u64, unp_size, RAR_METHOD_NORMAL, 0);
        self
    }

    /// Entry with a Unicode name stored as `narrow\0encoded`
    pub fn stored_unicode(mut self, narrow: &str, encoded: &[u8], data: &[u8]) -> Self {
        let mut name = narrow.as_bytes().to_vec();
        name.push(0);
        name.extend_from_slice(encoded);
        let len = data.len() as u64;
        self.file_block(&name, RAR_FILE_UNICODE, data, len, len, RAR_METHOD_STORE, crc32(data));
        self
    }

    /// Stored entry whose header claims sizes without the data to back them
    pub fn oversized(mut self, name: &str, pack_size: u64, unp_size: u64) -> Self {
        self.file_block(name.as_bytes(), 0, &[], pack_size, unp_size, RAR_METHOD_STORE, 0);
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        self.block(0x7b, 0x4000, &[], &[]);
        let mut out = RAR_MARKER.to_vec();
        out.extend_from_slice(&self.blocks);
        out
    }
}

/// TAR archive from `(name, data)` pairs, names ending in `/` become directories
pub fn tar_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        if name.ends_with('/') {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
        } else {
            header.set_mode(0o644);
        }
        header.set_size(data.len() as u64);
        header.set_mtime(1_600_000_000);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

/// TAR archive with one regular file header declaring `size` bytes it does not carry
pub fn tar_with_declared_size(before: &[(&str, &[u8])], name: &str, size: u64) -> Vec<u8> {
    let mut out = tar_archive(before);
    // Drop the two zero blocks ending the archive
    out.truncate(out.len() - 1024);

    let mut header = tar::Header::new_gnu();
    header.set_path(name).unwrap();
    header.set_mode(0o644);
    header.set_mtime(1_600_000_000);
    header.set_size(size);
    header.set_cksum();
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(&[0; 1024]);
    out
}

/// 2020-09-13 12:26:40 UTC as NT ticks
pub const SEVENZ_MTIME: u64 = (1_600_000_000 + 11_644_473_600) * 10_000_000;

/// 7z archive from `(name, data)` pairs, `None` data makes a directory
pub fn sevenz_archive(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
    let mut writer = ArchiveWriter::new(Cursor::new(Vec::new())).unwrap();
    for (name, data) in entries {
        match data {
            Some(data) => {
                let mut entry = ArchiveEntry::new_file(name);
                entry.has_last_modified_date = true;
                entry.last_modified_date = SEVENZ_MTIME.into();
                writer.push_archive_entry(entry, Some(*data)).unwrap();
            }
            None => {
                let entry = ArchiveEntry::new_directory(name);
                writer.push_archive_entry::<&[u8]>(entry, None).unwrap();
            }
        }
    }
    writer.finish().unwrap().into_inner()
}
