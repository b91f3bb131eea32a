//! The unified archive handle.
//!
//! An [`Archive`] is built with a declared [`Format`] and the [`Opener`] for
//! that format. [`Archive::open`] runs the opener on a stream and walks the
//! whole directory once; afterwards entries are extracted on demand by id or
//! by name, each extraction re-anchoring the decoder on the entry's stored
//! offset.
//!
//! Every operation reports failure as `false`, `None` or
//! [`INVALID_FILE_ID`]. The cause is logged through the `log` facade.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::decoder::{Decoder, Opener};
use crate::entry::{
    name_eq_ignore_case, try_alloc_zeroed, FileData, FileInfo, DATA_TERMINATOR_LEN,
    INVALID_FILE_ID,
};
use crate::fallback::UnrarFallback;
use crate::io::Stream;

/// Container format an [`Archive`] was declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Zip,
    SevenZip,
    Tar,
    Rar,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Zip => "ZIP",
            Format::SevenZip => "7z",
            Format::Tar => "TAR",
            Format::Rar => "RAR",
        })
    }
}

pub struct Archive {
    format: Format,
    opener: Opener,
    stream: Option<Stream>,
    decoder: Option<Box<dyn Decoder>>,
    file_infos: Vec<FileInfo>,
    source_path: Option<PathBuf>,
    fallback: Option<UnrarFallback>,
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("format", &self.format)
            .field("open", &self.is_open())
            .field("entries", &self.file_infos.len())
            .field("stream_size", &self.stream.as_ref().map(|stream| stream.size()))
            .field("source_path", &self.source_path)
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl Archive {
    /// Bind `opener` to `format`. The pair must agree.
    pub fn new(format: Format, opener: Opener) -> Self {
        Self {
            format,
            opener,
            stream: None,
            decoder: None,
            file_infos: Vec::new(),
            source_path: None,
            fallback: None,
        }
    }

    /// Record the file the stream was opened from, used by the RAR fallback
    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Parse `stream` and populate the directory.
    ///
    /// Returns false when the stream is absent or the decoder cannot open it
    /// or finds nothing in it. For RAR the unrar fallback is constructed in
    /// that case (see [`Archive::fallback`]) and the call still fails.
    pub fn open(&mut self, stream: Option<Stream>) -> bool {
        if self.decoder.is_some() {
            log::debug!("{} archive is already open", self.format);
            return false;
        }
        let Some(stream) = stream else {
            log::debug!("No stream to open as {}", self.format);
            return false;
        };
        self.stream = Some(stream.clone());

        let mut decoder = match (self.opener)(stream) {
            Ok(decoder) if !decoder.at_eof() => decoder,
            Ok(_) => {
                log::debug!("{} decoder found no entries", self.format);
                return self.open_fallback();
            }
            Err(e) => {
                log::debug!("Failed to open {} archive: {:#}", self.format, e);
                return self.open_fallback();
            }
        };

        loop {
            let header = match decoder.parse_entry() {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(e) => {
                    log::warn!(
                        "{} directory truncated after {} entries: {:#}",
                        self.format,
                        self.file_infos.len(),
                        e
                    );
                    break;
                }
            };
            let id = self.file_infos.len();
            log::trace!(
                "entry {}: {:?} ({} bytes at {})",
                id,
                header.name,
                header.size,
                header.offset
            );
            self.file_infos.push(FileInfo {
                id,
                name: header.name.unwrap_or_default(),
                size: header.size,
                offset: header.offset,
                file_time: header.file_time,
            });
        }

        log::debug!(
            "Opened {} archive with {} entries",
            self.format,
            self.file_infos.len()
        );
        self.decoder = Some(decoder);
        true
    }

    /// Substitute the unrar backend for a RAR archive the decoder rejected.
    ///
    /// The backend is not connected to the directory, so opening still fails.
    fn open_fallback(&mut self) -> bool {
        if self.format != Format::Rar {
            return false;
        }
        let fallback = UnrarFallback::new();
        log::debug!(
            "Constructed unrar fallback for {} (available: {})",
            self.source_path
                .as_deref()
                .map_or_else(|| "<stream>".into(), |p| p.display().to_string()),
            fallback.is_available()
        );
        self.fallback = Some(fallback);
        false
    }

    /// Whether [`Archive::open`] succeeded
    pub fn is_open(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// The directory in enumeration order. Names are not necessarily unique.
    pub fn file_infos(&self) -> &[FileInfo] {
        &self.file_infos
    }

    /// Id of the first entry whose name matches ignoring case, or
    /// [`INVALID_FILE_ID`]
    pub fn file_id(&self, name: &str) -> usize {
        self.file_infos
            .iter()
            .find(|info| name_eq_ignore_case(&info.name, name))
            .map_or(INVALID_FILE_ID, |info| info.id)
    }

    pub fn file_data_by_name(&mut self, name: &str) -> Option<FileData> {
        let id = self.file_id(name);
        if id == INVALID_FILE_ID {
            log::debug!("No entry named {}", name);
            return None;
        }
        self.file_data_by_id(id)
    }

    /// Decompress entry `id`.
    ///
    /// The result is followed by [`DATA_TERMINATOR_LEN`] zero bytes.
    pub fn file_data_by_id(&mut self, id: usize) -> Option<FileData> {
        let decoder = self.decoder.as_mut()?;
        let info = self.file_infos.get(id)?;
        debug_assert_eq!(info.id, id, "directory entry out of place");

        // TODO: retry through the unrar fallback once it can map ids to names
        if let Err(e) = decoder.parse_entry_at(info.offset) {
            log::debug!("Failed to seek to {} at {}: {:#}", info.name, info.offset, e);
            return None;
        }

        let Some(size) = usize::try_from(info.size)
            .ok()
            .filter(|size| *size <= usize::MAX - DATA_TERMINATOR_LEN)
        else {
            log::debug!("{} is too large to extract ({} bytes)", info.name, info.size);
            return None;
        };
        let Some(mut buf) = try_alloc_zeroed(size + DATA_TERMINATOR_LEN) else {
            log::debug!("Out of memory extracting {} ({} bytes)", info.name, size);
            return None;
        };

        if let Err(e) = decoder.uncompress(&mut buf[..size]) {
            log::debug!("Failed to extract {}: {:#}", info.name, e);
            return None;
        }
        buf[size..].fill(0);
        Some(FileData::from_parts(buf, size))
    }

    /// The archive-wide comment followed by one zero byte, `None` when there
    /// is none or it cannot be read consistently
    pub fn comment(&mut self) -> Option<FileData> {
        let decoder = self.decoder.as_mut()?;
        let len = match decoder.comment_len() {
            Ok(0) | Ok(usize::MAX) => return None,
            Ok(len) => len,
            Err(e) => {
                log::debug!("Failed to read {} comment length: {:#}", self.format, e);
                return None;
            }
        };
        let Some(mut buf) = try_alloc_zeroed(len + 1) else {
            log::debug!("Out of memory reading a {} byte comment", len);
            return None;
        };

        match decoder.read_comment(&mut buf[..len]) {
            Ok(read) if read == len => {}
            Ok(read) => {
                log::debug!("Comment read returned {} of {} bytes", read, len);
                return None;
            }
            Err(e) => {
                log::debug!("Failed to read {} comment: {:#}", self.format, e);
                return None;
            }
        }
        buf[len] = 0;
        Some(FileData::from_parts(buf, len))
    }

    /// The unrar backend constructed when a RAR archive failed to open.
    ///
    /// It only offers discovery by path; it is not linked to the directory.
    pub fn fallback(&self) -> Option<&UnrarFallback> {
        self.fallback.as_ref()
    }

    /// Path the archive was opened from, if any
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }
}
