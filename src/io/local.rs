use super::ReadAt;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Local file reader with random access support
pub struct LocalFileReader {
    #[cfg(unix)]
    file: std::fs::File,
    #[cfg(not(unix))]
    file: std::sync::Mutex<std::fs::File>,
    size: u64,
    path: PathBuf,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        #[cfg(not(unix))]
        let file = std::sync::Mutex::new(file);
        Ok(Self {
            file,
            size,
            path: path.to_path_buf(),
        })
    }
}

impl ReadAt for LocalFileReader {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            Ok(self.file.read_at(buf, offset)?)
        }

        #[cfg(not(unix))]
        {
            use std::io::{Read, Seek, SeekFrom};
            // No pread here, the seek and the read must not interleave
            let mut file = self
                .file
                .lock()
                .map_err(|_| anyhow::anyhow!("File handle lock poisoned"))?;
            file.seek(SeekFrom::Start(offset))?;
            Ok(file.read(buf)?)
        }
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_at_offsets_and_stops_at_end() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();

        let reader = LocalFileReader::new(file.path()).unwrap();
        assert_eq!(reader.size(), 10);
        assert_eq!(reader.path(), Some(file.path()));

        let mut buf = [0u8; 4];
        reader.read_exact_at(3, &mut buf).unwrap();
        assert_eq!(&buf, b"3456");
        assert_eq!(reader.read_at(10, &mut buf).unwrap(), 0);
        assert!(reader.read_exact_at(8, &mut buf).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalFileReader::new(&dir.path().join("missing")).is_err());
    }
}
