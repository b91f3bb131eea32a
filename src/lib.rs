//! # arcview
//!
//! Read-only access to ZIP, 7z, TAR and RAR archives behind one handle.
//!
//! Opening an archive walks its directory once. Entries are then extracted on
//! demand, by id or by case-insensitive name, each into a freshly allocated
//! buffer followed by three zero bytes so the payload can be scanned as text.
//!
//! ## Features
//!
//! - ZIP with ZIP64, STORED, DEFLATE, BZIP2 and LZMA (optionally listing only
//!   STORED and DEFLATE entries)
//! - 7z through `sevenz-rust2`, TAR through `tar`
//! - RAR through the `unrar` crate
//! - Archive-wide ZIP comments
//! - An unrar library fallback for RAR archives the `unrar` crate rejects
//!   (cargo feature `unrar-fallback`, on by default)
//!
//! ## Example
//!
//! ```no_run
//! let mut archive = arcview::open_zip_archive("comic.cbz", false);
//! if !archive.is_open() {
//!     return;
//! }
//!
//! for info in archive.file_infos() {
//!     println!("{} ({} bytes)", info.name, info.size);
//! }
//!
//! if let Some(data) = archive.file_data_by_name("ComicInfo.xml") {
//!     println!("{}", String::from_utf8_lossy(&data));
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod decoder;
pub mod entry;
pub mod fallback;
pub mod io;
pub mod openers;

pub use archive::{Archive, Format};
pub use cli::Cli;
pub use decoder::{Decoder, EntryHeader, Opener};
pub use entry::{DATA_TERMINATOR_LEN, FileData, FileInfo, FileTime, INVALID_FILE_ID};
pub use fallback::UnrarFallback;
pub use io::{LocalFileReader, MemoryReader, ReadAt, Stream, StreamCursor};
pub use openers::{
    open_7z_archive, open_7z_archive_from_reader, open_archive, open_rar_archive,
    open_rar_archive_from_reader, open_tar_archive, open_tar_archive_from_reader,
    open_zip_archive, open_zip_archive_from_reader,
};
