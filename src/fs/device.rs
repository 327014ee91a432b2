//! Block-addressed access to the disk image file.

use crate::error::{Error, Result};
use crate::{BLOCK_COUNT, BLOCK_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// The disk image backing a volume, addressed in whole blocks.
///
/// No caching is performed beyond what the host provides; every write reaches
/// the image file before the call returns.
pub struct BlockDevice {
    file: File,
}

impl BlockDevice {
    /// Opens an existing image file for reading and writing.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    /// Creates (or truncates) the image file and gives it its full size.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(BLOCK_COUNT as u64 * BLOCK_SIZE as u64)?;
        Ok(Self { file })
    }

    /// Returns the size of the image in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Reads block `n` into `buf`, which must span exactly one block.
    pub fn read_block(&mut self, n: u32, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), BLOCK_SIZE);
        if n >= BLOCK_COUNT {
            return Err(Error::IoOutOfRange);
        }
        self.file
            .seek(SeekFrom::Start(n as u64 * BLOCK_SIZE as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Writes `buf`, which must span exactly one block, to block `n`.
    pub fn write_block(&mut self, n: u32, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), BLOCK_SIZE);
        if n >= BLOCK_COUNT {
            return Err(Error::IoOutOfRange);
        }
        self.file
            .seek(SeekFrom::Start(n as u64 * BLOCK_SIZE as u64))?;
        self.file.write_all(buf)?;
        self.file.flush()?;
        Ok(())
    }
}
