//! Byte-addressed file content I/O and the descriptor-level operations.

use crate::error::{Error, Result};
use crate::open_file::OpenFlags;
use crate::perm::{ACCESS_READ, ACCESS_WRITE, Mode};
use crate::util::{ceil_division, timestamp_secs};
use crate::volume::Volume;
use crate::BLOCK_SIZE;

impl Volume {
    /// Reads up to `buf.len()` bytes at `offset`, clamped to the file size.
    /// Holes read as zeroes. Returns the number of bytes produced.
    pub fn read_file(&mut self, inode_no: u32, offset: u32, buf: &mut [u8]) -> Result<usize> {
        let mut inode = self.read_inode(inode_no)?;
        let size = inode.size;
        if offset >= size || buf.is_empty() {
            return Ok(0);
        }
        let end = (offset as u64 + buf.len() as u64).min(size as u64) as u32;
        let mut done = 0;
        let mut block_buf = [0u8; BLOCK_SIZE];
        while offset + done < end {
            let pos = offset + done;
            let index = pos / BLOCK_SIZE as u32;
            let inner = (pos % BLOCK_SIZE as u32) as usize;
            let len = (BLOCK_SIZE - inner).min((end - pos) as usize);
            let dst = &mut buf[done as usize..done as usize + len];
            let phys = self.map_block(&inode, index)?;
            if phys == 0 {
                dst.fill(0);
            } else {
                self.dev.read_block(phys, &mut block_buf)?;
                dst.copy_from_slice(&block_buf[inner..inner + len]);
            }
            done += len as u32;
        }
        inode.atime = timestamp_secs();
        if let Err(e) = self.write_inode(inode_no, &inode) {
            eprintln!("ext2fs: cannot update access time of inode {inode_no}: {e}");
        }
        Ok(done as usize)
    }

    /// Writes `buf` at `offset`, allocating blocks on demand. Writing past
    /// the end of the file extends it; skipped-over blocks stay holes.
    ///
    /// When the volume or the inode's reach is exhausted mid-way, the write
    /// stops and the count of bytes already persisted is returned.
    pub fn write_file(&mut self, inode_no: u32, offset: u32, buf: &[u8]) -> Result<usize> {
        let mut inode = self.read_inode(inode_no)?;
        let mut done = 0usize;
        let mut block_buf = [0u8; BLOCK_SIZE];
        while done < buf.len() {
            let Some(pos) = offset.checked_add(done as u32) else {
                break;
            };
            let index = pos / BLOCK_SIZE as u32;
            let inner = (pos % BLOCK_SIZE as u32) as usize;
            let len = (BLOCK_SIZE - inner).min(buf.len() - done);
            let mut phys = match self.map_block(&inode, index) {
                Ok(phys) => phys,
                Err(Error::RangeError) => break,
                Err(e) => return Err(e),
            };
            if phys == 0 {
                phys = match self.allocate_block() {
                    Ok(block) => block,
                    Err(Error::NoSpace) => break,
                    Err(e) => return Err(e),
                };
                if let Err(e) = self.set_map(&mut inode, index, phys) {
                    let _ = self.free_block(phys);
                    match e {
                        Error::NoSpace | Error::RangeError => break,
                        e => return Err(e),
                    }
                }
                // fresh block: bytes outside the copied span must read zero
                block_buf.fill(0);
            } else {
                self.dev.read_block(phys, &mut block_buf)?;
            }
            block_buf[inner..inner + len].copy_from_slice(&buf[done..done + len]);
            self.dev.write_block(phys, &block_buf)?;
            done += len;
        }
        if done > 0 {
            let end = offset + done as u32;
            if end > inode.size {
                inode.size = end;
                inode.blocks = ceil_division(end, BLOCK_SIZE as u32);
            }
            let timestamp = timestamp_secs();
            inode.mtime = timestamp;
            inode.ctime = timestamp;
            self.write_inode(inode_no, &inode)?;
        }
        Ok(done)
    }

    // ---- descriptor-level operations

    /// Opens the regular file at `path` and returns its descriptor.
    pub fn open(&mut self, path: &str, flags: OpenFlags) -> Result<u32> {
        self.session.require()?;
        let ino = self.resolve(path)?;
        let inode = self.read_inode(ino)?;
        if !inode.is_regular() {
            return Err(Error::NotARegularFile);
        }
        let mut access: Mode = 0;
        if flags.can_read() {
            access |= ACCESS_READ;
        }
        if flags.can_write() {
            access |= ACCESS_WRITE;
        }
        self.check_access(&inode, access)?;
        self.open_files.open(ino, flags)
    }

    /// Closes the descriptor `fd`.
    pub fn close(&mut self, fd: u32) -> Result<()> {
        self.session.require()?;
        self.open_files.close(fd)
    }

    /// Reads up to `size` bytes from the open file, advancing its offset by
    /// the count actually produced.
    pub fn read_fd(&mut self, fd: u32, size: usize) -> Result<Vec<u8>> {
        self.session.require()?;
        let (ino, offset) = {
            let slot = self.open_files.get(fd).ok_or(Error::BadFd)?;
            if !slot.flags.can_read() {
                return Err(Error::BadFd);
            }
            (slot.inode_no, slot.offset)
        };
        let mut buf = vec![0; size];
        let n = self.read_file(ino, offset, &mut buf)?;
        buf.truncate(n);
        if let Some(slot) = self.open_files.get(fd) {
            slot.offset += n as u32;
        }
        Ok(buf)
    }

    /// Writes `data` to the open file, advancing its offset by the count
    /// actually persisted.
    pub fn write_fd(&mut self, fd: u32, data: &[u8]) -> Result<usize> {
        self.session.require()?;
        let (ino, offset) = {
            let slot = self.open_files.get(fd).ok_or(Error::BadFd)?;
            if !slot.flags.can_write() {
                return Err(Error::BadFd);
            }
            (slot.inode_no, slot.offset)
        };
        let n = self.write_file(ino, offset, data)?;
        if let Some(slot) = self.open_files.get(fd) {
            slot.offset += n as u32;
        }
        Ok(n)
    }
}
