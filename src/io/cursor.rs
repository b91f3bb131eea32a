use std::io::{self, Read, Seek, SeekFrom};

use super::Stream;

/// `Read + Seek` view over a [`Stream`], for decoders built on std I/O.
///
/// Each cursor keeps its own position, so several cursors over the same
/// stream never disturb each other.
pub struct StreamCursor {
    stream: Stream,
    pos: u64,
}

impl StreamCursor {
    pub fn new(stream: Stream) -> Self {
        Self::at(stream, 0)
    }

    /// Create a cursor already positioned at `pos`
    pub fn at(stream: Stream, pos: u64) -> Self {
        Self { stream, pos }
    }
}

impl Read for StreamCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self
            .stream
            .read_at(self.pos, buf)
            .map_err(|e| io::Error::other(e.to_string()))?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for StreamCursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.stream.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use std::sync::Arc;

    #[test]
    fn seek_and_read_track_position() {
        let stream: Stream = Arc::new(MemoryReader::new(b"0123456789".to_vec()));
        let mut cursor = StreamCursor::new(stream);

        assert_eq!(cursor.seek(SeekFrom::End(-3)).unwrap(), 7);
        let mut rest = Vec::new();
        cursor.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"789");

        assert_eq!(cursor.seek(SeekFrom::Start(2)).unwrap(), 2);
        assert_eq!(cursor.seek(SeekFrom::Current(1)).unwrap(), 3);
        let mut byte = [0u8; 1];
        cursor.read_exact(&mut byte).unwrap();
        assert_eq!(&byte, b"3");
        assert!(cursor.seek(SeekFrom::Current(-10)).is_err());
    }
}
