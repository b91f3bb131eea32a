//! Main entry point for the arcview CLI application.
//!
//! Lists, prints or extracts the entries of a ZIP, 7z, TAR or RAR archive.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use arcview::{open_archive, Archive, Cli, FileInfo};

/// Application entry point.
///
/// Parses command-line arguments, opens the archive with the format chosen
/// by `-t` or the file extension, and dispatches to the requested mode.
fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let format = cli.archive_format()?;
    let mut archive = open_archive(format, &cli.file, cli.deflate_only);
    if !archive.is_open() {
        bail!("Cannot open {} as {}", cli.file, format);
    }

    process_archive(&mut archive, &cli)
}

/// Process an opened archive based on CLI options.
///
/// - Comment mode (`-z`): print the archive comment
/// - List mode (`-l` or `-v`): display archive contents
/// - Extract mode: extract the entries matching the filters
///
/// # Arguments
///
/// * `archive` - An archive opened by one of the `open_*` functions
/// * `cli` - Parsed command-line arguments
///
/// # Returns
///
/// Returns `Ok(())` on success, or an error if processing fails.
fn process_archive(archive: &mut Archive, cli: &Cli) -> Result<()> {
    if cli.comment {
        if let Some(comment) = archive.comment() {
            std::io::stdout().write_all(&comment)?;
            println!();
        }
        return Ok(());
    }

    if cli.list || cli.verbose {
        list_files(archive.file_infos(), cli.verbose);
        return Ok(());
    }

    let entries: Vec<FileInfo> = match cli.id {
        Some(id) => {
            let info = archive
                .file_infos()
                .get(id)
                .with_context(|| format!("No entry with id {}", id))?;
            vec![info.clone()]
        }
        None => {
            let parents = parent_dirs(archive.file_infos());
            archive
                .file_infos()
                .iter()
                .filter(|e| !is_directory(e, &parents) && is_selected(e, cli))
                .cloned()
                .collect()
        }
    };

    let multiple_files = cli.pipe && entries.len() > 1;
    for entry in &entries {
        extract_file(archive, entry, cli, multiple_files)?;
    }

    Ok(())
}

/// Apply the FILES selectors and the `-x` exclusions.
///
/// A selector with wildcards is globbed against the full entry name. A plain
/// selector matches either the full name or the last path component.
/// Exclusions match as substrings or globs.
///
/// # Arguments
///
/// * `entry` - The entry to test
/// * `cli` - Parsed command-line arguments holding the selectors
///
/// # Returns
///
/// `true` if the entry should be listed or extracted.
fn is_selected(entry: &FileInfo, cli: &Cli) -> bool {
    if !cli.files.is_empty() {
        let matches = cli.files.iter().any(|f| {
            if has_glob_chars(f) {
                glob_match(f, &entry.name)
            } else {
                // No wildcards: exact match on filename or full path
                entry.name == *f || base_name(&entry.name) == *f
            }
        });
        if !matches {
            return false;
        }
    }

    !cli
        .exclude
        .iter()
        .any(|x| entry.name.contains(x.as_str()) || glob_match(x, &entry.name))
}

/// Every directory prefix of every entry name
fn parent_dirs(entries: &[FileInfo]) -> HashSet<&str> {
    let mut parents = HashSet::new();
    for entry in entries {
        let name = entry.name.as_str();
        for (i, _) in name.match_indices(['/', '\\']) {
            parents.insert(&name[..i]);
        }
    }
    parents
}

/// Some formats mark directories with a trailing separator, others only by
/// having entries below them
fn is_directory(entry: &FileInfo, parents: &HashSet<&str>) -> bool {
    entry.size == 0
        && (entry.name.ends_with('/')
            || entry.name.ends_with('\\')
            || parents.contains(entry.name.as_str()))
}

/// Last component of an entry name, splitting on either separator.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(base_name("img/logo.png"), "logo.png");
/// assert_eq!(base_name("img\\logo.png"), "logo.png");
/// assert_eq!(base_name("readme.txt"), "readme.txt");
/// ```
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// List the directory.
///
/// - Simple format (`-l`): names, one per line
/// - Verbose format (`-v`): table with size, timestamp and id
fn list_files(entries: &[FileInfo], verbose: bool) {
    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>6}  Name",
            "Length", "Date", "Time", "Id"
        );
        println!("{}", "-".repeat(60));
    }

    let parents = parent_dirs(entries);
    let mut total_size = 0u64;
    let mut file_count = 0usize;

    for entry in entries {
        if verbose {
            let stamp = entry
                .file_time
                .to_datetime()
                .map(|dt| dt.format("%Y-%m-%d  %H:%M").to_string())
                .unwrap_or_else(|| format!("{:>10}  {:>5}", "-", "-"));
            println!(
                "{:>10}  {}  {:>6}  {}",
                entry.size, stamp, entry.id, entry.name
            );
            if !is_directory(entry, &parents) {
                total_size += entry.size;
                file_count += 1;
            }
        } else {
            println!("{}", entry.name);
        }
    }

    if verbose {
        println!("{}", "-".repeat(60));
        println!(
            "{:>10}  {:>27}  {} files ({})",
            total_size,
            "",
            file_count,
            format_size(total_size)
        );
    }
}

/// Extract a single entry.
///
/// - Pipe mode (`-p`): write to stdout instead of a file
/// - Custom output directory (`-d`)
/// - Junk paths (`-j`): ignore the directory structure in the archive
/// - Overwrite control (`-n`, `-o`)
///
/// # Arguments
///
/// * `archive` - The archive the entry belongs to
/// * `entry` - Metadata of the entry to extract
/// * `cli` - Parsed command-line arguments
/// * `show_filename` - In pipe mode, print a header line before the data
///
/// # Returns
///
/// Returns `Ok(())` on success or when the entry is skipped, or an error if
/// decompression or writing fails.
fn extract_file(
    archive: &mut Archive,
    entry: &FileInfo,
    cli: &Cli,
    show_filename: bool,
) -> Result<()> {
    let data = archive
        .file_data_by_id(entry.id)
        .with_context(|| format!("Failed to extract {}", entry.name))?;

    if cli.pipe {
        let mut stdout = std::io::stdout().lock();
        if show_filename {
            writeln!(stdout, "--- {} ---", entry.name)?;
        }
        stdout.write_all(&data)?;
        return Ok(());
    }

    let file_name = if cli.junk_paths {
        base_name(&entry.name).to_string()
    } else {
        entry.name.replace('\\', "/")
    };
    let Some(relative) = safe_relative_path(&file_name) else {
        if !cli.is_very_quiet() {
            eprintln!("Skipping: {} (unsafe path)", entry.name);
        }
        return Ok(());
    };
    let output_path = match cli.extract_dir {
        Some(ref dir) => PathBuf::from(dir).join(relative),
        None => relative,
    };

    if output_path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.name);
            }
            return Ok(());
        }

        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.name);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", entry.name);
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&output_path, &*data)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    Ok(())
}

/// Turn an archive entry name into a path safe to join under the output directory.
///
/// `.` components are dropped. Absolute names and names containing `..`
/// are refused.
///
/// # Arguments
///
/// * `name` - The entry name as stored in the archive
///
/// # Returns
///
/// The relative path, or `None` if the name is unsafe or empty.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(safe_relative_path("img/./logo.png"), Some(PathBuf::from("img/logo.png")));
/// assert_eq!(safe_relative_path("../etc/passwd"), None);
/// assert_eq!(safe_relative_path("/etc/passwd"), None);
/// ```
fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}

/// Check if a pattern contains glob wildcard characters.
///
/// # Arguments
///
/// * `pattern` - The pattern string to check
///
/// # Returns
///
/// `true` if the pattern contains `*` or `?`, `false` otherwise.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
///
/// # Arguments
///
/// * `pattern` - The glob pattern
/// * `text` - The entry name to match against
///
/// # Returns
///
/// `true` if the whole of `text` matches the pattern.
///
/// # Examples
///
/// ```ignore
/// assert!(glob_match("*.txt", "readme.txt"));
/// assert!(glob_match("img/logo?.png", "img/logo1.png"));
/// assert!(!glob_match("*.txt", "readme.md"));
/// ```
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            // Either the star matches nothing, or it eats one more character
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
///
/// # Arguments
///
/// * `size` - The size in bytes to format
///
/// # Returns
///
/// A formatted string with the size and appropriate unit.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// assert_eq!(format_size(1048576), "1.00 MB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_wildcards() {
        assert!(glob_match("*.txt", "readme.txt"));
        assert!(glob_match("img/logo?.png", "img/logo1.png"));
        assert!(!glob_match("*.txt", "readme.md"));
    }

    #[test]
    fn unsafe_paths_are_rejected() {
        assert_eq!(safe_relative_path("img/./logo.png"), Some(PathBuf::from("img/logo.png")));
        assert_eq!(safe_relative_path("../etc/passwd"), None);
        assert_eq!(safe_relative_path("a/../../b"), None);
        assert_eq!(safe_relative_path("/etc/passwd"), None);
        assert_eq!(safe_relative_path(""), None);
    }

    #[test]
    fn sizes_and_names_format_like_the_docs() {
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
        assert_eq!(base_name("img/logo.png"), "logo.png");
        assert_eq!(base_name("img\\logo.png"), "logo.png");
        assert_eq!(base_name("readme.txt"), "readme.txt");
        assert!(has_glob_chars("page?.jpg"));
        assert!(!has_glob_chars("page1.jpg"));
    }

    fn info(id: usize, name: &str, size: u64) -> FileInfo {
        FileInfo {
            id,
            name: name.to_string(),
            size,
            offset: 0,
            file_time: Default::default(),
        }
    }

    #[test]
    fn directories_are_recognized() {
        let entries = [
            info(0, "img", 0),
            info(1, "img/logo.png", 4),
            info(2, "docs/", 0),
            info(3, "empty.txt", 0),
        ];
        let parents = parent_dirs(&entries);
        let dirs: Vec<_> = entries
            .iter()
            .filter(|e| is_directory(e, &parents))
            .map(|e| e.id)
            .collect();
        assert_eq!(dirs, [0, 2]);
    }

    #[test]
    fn base_name_handles_both_separators() {
        assert_eq!(base_name("a/b/c.txt"), "c.txt");
        assert_eq!(base_name("a\\b.txt"), "b.txt");
        assert_eq!(base_name("c.txt"), "c.txt");
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
    }
}
