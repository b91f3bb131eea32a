//! One constructor per format.
//!
//! Each binds the matching decoder opener to a new [`Archive`] and opens the
//! given path or reader. An [`Archive`] is returned even when opening fails;
//! check [`Archive::is_open`].

use std::path::Path;
use std::sync::Arc;

use crate::archive::{Archive, Format};
use crate::decoder::{self, Opener};
use crate::io::{LocalFileReader, ReadAt, Stream};

fn zip_opener(deflated_only: bool) -> Opener {
    if deflated_only {
        decoder::zip::open_deflated
    } else {
        decoder::zip::open_any
    }
}

fn open_path(archive: Archive, path: &Path) -> Archive {
    let mut archive = archive.with_source_path(path);
    let stream = match LocalFileReader::new(path) {
        Ok(reader) => Some(Arc::new(reader) as Stream),
        Err(e) => {
            log::debug!("Failed to open {}: {:#}", path.display(), e);
            None
        }
    };
    archive.open(stream);
    archive
}

fn open_reader(mut archive: Archive, reader: impl ReadAt + 'static) -> Archive {
    let stream: Stream = Arc::new(reader);
    archive.open(Some(stream));
    archive
}

/// Open a ZIP file. `deflated_only` lists only STORED and DEFLATE entries.
pub fn open_zip_archive(path: impl AsRef<Path>, deflated_only: bool) -> Archive {
    open_path(Archive::new(Format::Zip, zip_opener(deflated_only)), path.as_ref())
}

pub fn open_zip_archive_from_reader(reader: impl ReadAt + 'static, deflated_only: bool) -> Archive {
    open_reader(Archive::new(Format::Zip, zip_opener(deflated_only)), reader)
}

pub fn open_7z_archive(path: impl AsRef<Path>) -> Archive {
    open_path(Archive::new(Format::SevenZip, decoder::sevenz::open), path.as_ref())
}

pub fn open_7z_archive_from_reader(reader: impl ReadAt + 'static) -> Archive {
    open_reader(Archive::new(Format::SevenZip, decoder::sevenz::open), reader)
}

pub fn open_tar_archive(path: impl AsRef<Path>) -> Archive {
    open_path(Archive::new(Format::Tar, decoder::tar::open), path.as_ref())
}

pub fn open_tar_archive_from_reader(reader: impl ReadAt + 'static) -> Archive {
    open_reader(Archive::new(Format::Tar, decoder::tar::open), reader)
}

/// Open a RAR file. When the decoder rejects it the unrar fallback
/// is constructed for the path and the archive stays closed.
pub fn open_rar_archive(path: impl AsRef<Path>) -> Archive {
    open_path(Archive::new(Format::Rar, decoder::rar::open), path.as_ref())
}

pub fn open_rar_archive_from_reader(reader: impl ReadAt + 'static) -> Archive {
    open_reader(Archive::new(Format::Rar, decoder::rar::open), reader)
}

/// Open `path` with the constructor for `format`
pub fn open_archive(format: Format, path: impl AsRef<Path>, deflated_only: bool) -> Archive {
    match format {
        Format::Zip => open_zip_archive(path, deflated_only),
        Format::SevenZip => open_7z_archive(path),
        Format::Tar => open_tar_archive(path),
        Format::Rar => open_rar_archive(path),
    }
}
