use super::ReadAt;
use anyhow::Result;

/// In-memory byte source
pub struct MemoryReader {
    data: Vec<u8>,
}

impl MemoryReader {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl ReadAt for MemoryReader {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_clamped_to_the_buffer_end() {
        let reader = MemoryReader::new(b"abcdef".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(reader.read_at(4, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(reader.read_at(6, &mut buf).unwrap(), 0);
        assert_eq!(reader.read_at(u64::MAX, &mut buf).unwrap(), 0);
    }

    #[test]
    fn read_exact_at_fails_on_short_read() {
        let reader = MemoryReader::new(b"abc".to_vec());
        let mut buf = [0u8; 3];
        reader.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        assert!(reader.read_exact_at(1, &mut buf).is_err());
        assert_eq!(reader.path(), None);
    }
}
