mod cursor;
mod local;
mod memory;

pub use cursor::StreamCursor;
pub use local::LocalFileReader;
pub use memory::MemoryReader;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};

/// Trait for random access reading from a data source
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// File backing the source, for decoders that can only read from a path
    fn path(&self) -> Option<&Path> {
        None
    }

    /// Fill the whole buffer from `offset`, failing on a short read
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                bail!(
                    "Unexpected end of stream at offset {} ({} of {} bytes read)",
                    offset + filled as u64,
                    filled,
                    buf.len()
                );
            }
            filled += n;
        }
        Ok(())
    }
}

/// Shared handle to the byte source an archive is read from
pub type Stream = Arc<dyn ReadAt>;
