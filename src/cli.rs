use std::path::Path;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};

use crate::archive::Format;

#[derive(Parser, Debug)]
#[command(name = "arcview")]
#[command(version)]
#[command(about = "List and extract ZIP, 7z, TAR and RAR archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  arcview data1.zip -x joe         extract all files except joe from data1.zip\n  \
  arcview -p book.cbr | more       send contents of book.cbr via pipe into more\n  \
  arcview -v -t tar backup.img     list a TAR archive with a foreign extension")]
pub struct Cli {
    /// Archive file path
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Display archive comment only
    #[arg(short = 'z')]
    pub comment: bool,

    /// Archive format (default: from the file extension)
    #[arg(short = 't', long = "format", value_enum)]
    pub format: Option<FormatArg>,

    /// List and extract only STORED and DEFLATE entries of ZIP archives
    #[arg(long)]
    pub deflate_only: bool,

    /// Extract the entry with this id (as shown by -v)
    #[arg(long, value_name = "N")]
    pub id: Option<usize>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Zip,
    #[value(name = "7z")]
    SevenZip,
    Tar,
    Rar,
}

impl From<FormatArg> for Format {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Zip => Format::Zip,
            FormatArg::SevenZip => Format::SevenZip,
            FormatArg::Tar => Format::Tar,
            FormatArg::Rar => Format::Rar,
        }
    }
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// The `-t` format, or the one implied by the file extension
    pub fn archive_format(&self) -> Result<Format> {
        if let Some(format) = self.format {
            return Ok(format.into());
        }
        match format_from_extension(Path::new(&self.file)) {
            Some(format) => Ok(format),
            None => bail!(
                "Cannot tell the archive format of {} from its extension, use -t",
                self.file
            ),
        }
    }
}

/// Map a file extension to a format, including the comic book variants
pub fn format_from_extension(path: &Path) -> Option<Format> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "zip" | "cbz" | "epub" | "xps" => Some(Format::Zip),
        "7z" | "cb7" => Some(Format::SevenZip),
        "tar" | "cbt" => Some(Format::Tar),
        "rar" | "cbr" => Some(Format::Rar),
        _ => None,
    }
}
