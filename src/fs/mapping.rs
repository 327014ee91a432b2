//! Mapping of logical file blocks to physical blocks.
//!
//! Slots 0..12 of an inode point at content blocks directly; slot 12 points
//! at a block holding up to 256 further pointers. A zero anywhere in the
//! chain is a hole.

use crate::error::{Error, Result};
use crate::inode::{DIRECT_BLOCKS, INDIRECT_SLOT, Inode, MAX_FILE_BLOCKS};
use crate::util::{ceil_division, timestamp_secs};
use crate::volume::Volume;
use crate::BLOCK_SIZE;

/// Reads pointer `i` out of an indirect block buffer.
fn indirect_entry(buf: &[u8], i: usize) -> u32 {
    let off = i * 4;
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Writes pointer `i` into an indirect block buffer.
fn set_indirect_entry(buf: &mut [u8], i: usize, block: u32) {
    buf[i * 4..i * 4 + 4].copy_from_slice(&block.to_le_bytes());
}

impl Volume {
    /// Returns the physical block backing logical block `index` of the
    /// inode, or zero for a hole.
    pub fn map_block(&mut self, inode: &Inode, index: u32) -> Result<u32> {
        if (index as usize) < DIRECT_BLOCKS {
            return Ok(inode.block[index as usize]);
        }
        if index >= MAX_FILE_BLOCKS {
            return Err(Error::RangeError);
        }
        let indirect = inode.block[INDIRECT_SLOT];
        if indirect == 0 {
            return Ok(0);
        }
        let mut buf = [0u8; BLOCK_SIZE];
        self.dev.read_block(indirect, &mut buf)?;
        Ok(indirect_entry(&buf, index as usize - DIRECT_BLOCKS))
    }

    /// Points logical block `index` of the inode at `block`, allocating the
    /// indirect block on demand.
    ///
    /// When the indirect block cannot be allocated the mapping is left
    /// untouched. Writing zero to an indirect slot never frees the indirect
    /// block itself; truncation is the only place reclaiming it.
    pub fn set_map(&mut self, inode: &mut Inode, index: u32, block: u32) -> Result<()> {
        if (index as usize) < DIRECT_BLOCKS {
            inode.block[index as usize] = block;
            return Ok(());
        }
        if index >= MAX_FILE_BLOCKS {
            return Err(Error::RangeError);
        }
        let mut indirect = inode.block[INDIRECT_SLOT];
        if indirect == 0 {
            indirect = self.allocate_block()?;
            // a fresh indirect block must read as all holes
            if let Err(e) = self.dev.write_block(indirect, &[0u8; BLOCK_SIZE]) {
                let _ = self.free_block(indirect);
                return Err(e);
            }
            inode.block[INDIRECT_SLOT] = indirect;
        }
        let mut buf = [0u8; BLOCK_SIZE];
        self.dev.read_block(indirect, &mut buf)?;
        set_indirect_entry(&mut buf, index as usize - DIRECT_BLOCKS, block);
        self.dev.write_block(indirect, &buf)
    }

    /// Shrinks the file to `length` bytes, freeing every block whose logical
    /// index lies past the new end. Extending through this operation is a
    /// no-op; only writes grow a file.
    pub fn truncate(&mut self, inode_no: u32, length: u32) -> Result<()> {
        let mut inode = self.read_inode(inode_no)?;
        if length >= inode.size {
            return Ok(());
        }
        let keep = ceil_division(length, BLOCK_SIZE as u32);
        for i in keep..DIRECT_BLOCKS as u32 {
            let block = inode.block[i as usize];
            if block != 0 {
                self.free_block(block)?;
                inode.block[i as usize] = 0;
            }
        }
        let indirect = inode.block[INDIRECT_SLOT];
        if indirect != 0 {
            let mut buf = [0u8; BLOCK_SIZE];
            self.dev.read_block(indirect, &mut buf)?;
            let mut dirty = false;
            for i in 0..(MAX_FILE_BLOCKS as usize - DIRECT_BLOCKS) {
                if ((DIRECT_BLOCKS + i) as u32) < keep {
                    continue;
                }
                let block = indirect_entry(&buf, i);
                if block != 0 {
                    self.free_block(block)?;
                    set_indirect_entry(&mut buf, i, 0);
                    dirty = true;
                }
            }
            if keep <= DIRECT_BLOCKS as u32 {
                // no indirect mapping survives
                self.free_block(indirect)?;
                inode.block[INDIRECT_SLOT] = 0;
            } else if dirty {
                self.dev.write_block(indirect, &buf)?;
            }
        }
        inode.size = length;
        inode.blocks = keep;
        let timestamp = timestamp_secs();
        inode.mtime = timestamp;
        inode.ctime = timestamp;
        self.write_inode(inode_no, &inode)
    }

    /// Releases every block owned by inode `n`, zeroes its record and
    /// returns it to the allocator.
    pub fn delete_inode(&mut self, n: u32) -> Result<()> {
        let inode = self.read_inode(n)?;
        for i in 0..DIRECT_BLOCKS {
            let block = inode.block[i];
            if block != 0 {
                self.free_block(block)?;
            }
        }
        let indirect = inode.block[INDIRECT_SLOT];
        if indirect != 0 {
            let mut buf = [0u8; BLOCK_SIZE];
            self.dev.read_block(indirect, &mut buf)?;
            for i in 0..(MAX_FILE_BLOCKS as usize - DIRECT_BLOCKS) {
                let block = indirect_entry(&buf, i);
                if block != 0 {
                    self.free_block(block)?;
                }
            }
            self.free_block(indirect)?;
        }
        self.write_inode(n, &Inode::zeroed())?;
        self.free_inode(n)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inode::FileType;
    use crate::perm::DEFAULT_FILE_MODE;
    use crate::volume::testing::ScratchImage;

    fn fresh_inode(vol: &mut Volume) -> (u32, Inode) {
        let n = vol.allocate_inode().unwrap();
        let inode = Inode::new(FileType::Regular, DEFAULT_FILE_MODE, 0, 0, 0);
        vol.write_inode(n, &inode).unwrap();
        (n, inode)
    }

    #[test]
    fn direct_mapping() {
        let (_img, mut vol) = ScratchImage::mounted();
        let (n, mut inode) = fresh_inode(&mut vol);
        let block = vol.allocate_block().unwrap();
        vol.set_map(&mut inode, 3, block).unwrap();
        vol.write_inode(n, &inode).unwrap();
        assert_eq!(vol.map_block(&inode, 3).unwrap(), block);
        assert_eq!(vol.map_block(&inode, 0).unwrap(), 0);
    }

    #[test]
    fn indirect_mapping_allocates_once() {
        let (_img, mut vol) = ScratchImage::mounted();
        let (_, mut inode) = fresh_inode(&mut vol);
        let free_before = { vol.superblock.free_blocks };
        let a = vol.allocate_block().unwrap();
        vol.set_map(&mut inode, 12, a).unwrap();
        // one data block and one indirect block
        assert_eq!({ vol.superblock.free_blocks }, free_before - 2);
        let b = vol.allocate_block().unwrap();
        vol.set_map(&mut inode, 200, b).unwrap();
        assert_eq!({ vol.superblock.free_blocks }, free_before - 3);
        assert_eq!(vol.map_block(&inode, 12).unwrap(), a);
        assert_eq!(vol.map_block(&inode, 200).unwrap(), b);
        // unset slots in the indirect block stay holes
        assert_eq!(vol.map_block(&inode, 100).unwrap(), 0);
    }

    #[test]
    fn mapping_range() {
        let (_img, mut vol) = ScratchImage::mounted();
        let (_, mut inode) = fresh_inode(&mut vol);
        assert!(matches!(
            vol.map_block(&inode, MAX_FILE_BLOCKS),
            Err(Error::RangeError)
        ));
        assert!(matches!(
            vol.set_map(&mut inode, MAX_FILE_BLOCKS, 500),
            Err(Error::RangeError)
        ));
    }

    #[test]
    fn truncate_reclaims_indirect() {
        let (_img, mut vol) = ScratchImage::mounted();
        let (n, mut inode) = fresh_inode(&mut vol);
        let free_before = { vol.superblock.free_blocks };
        for i in 0..16 {
            let block = vol.allocate_block().unwrap();
            vol.set_map(&mut inode, i, block).unwrap();
        }
        inode.size = 16 * BLOCK_SIZE as u32;
        inode.blocks = 16;
        vol.write_inode(n, &inode).unwrap();
        // 16 content blocks plus the indirect block
        assert_eq!({ vol.superblock.free_blocks }, free_before - 17);
        vol.truncate(n, BLOCK_SIZE as u32).unwrap();
        assert_eq!({ vol.superblock.free_blocks }, free_before - 1);
        let inode = vol.read_inode(n).unwrap();
        assert_eq!({ inode.size }, BLOCK_SIZE as u32);
        assert_eq!({ inode.blocks }, 1);
        assert_eq!({ inode.block[INDIRECT_SLOT] }, 0);
        assert_ne!({ inode.block[0] }, 0);
    }

    #[test]
    fn truncate_never_extends() {
        let (_img, mut vol) = ScratchImage::mounted();
        let (n, mut inode) = fresh_inode(&mut vol);
        inode.size = 100;
        vol.write_inode(n, &inode).unwrap();
        vol.truncate(n, 5000).unwrap();
        let inode = vol.read_inode(n).unwrap();
        assert_eq!({ inode.size }, 100);
    }

    #[test]
    fn delete_reclaims_everything() {
        let (_img, mut vol) = ScratchImage::mounted();
        let (n, mut inode) = fresh_inode(&mut vol);
        let free_blocks = { vol.superblock.free_blocks };
        let free_inodes = { vol.superblock.free_inodes };
        let mut owned = Vec::new();
        for i in [0, 5, 12, 40] {
            let block = vol.allocate_block().unwrap();
            vol.set_map(&mut inode, i, block).unwrap();
            owned.push(block);
        }
        vol.write_inode(n, &inode).unwrap();
        vol.delete_inode(n).unwrap();
        assert_eq!({ vol.superblock.free_blocks }, free_blocks);
        assert_eq!({ vol.superblock.free_inodes }, free_inodes + 1);
        for block in owned {
            assert!(!vol.block_bitmap.get(block));
        }
        assert!(!vol.inode_bitmap.get(n));
        let record = vol.read_inode(n).unwrap();
        assert_eq!({ record.mode }, 0);
        assert_eq!({ record.block }, [0; crate::inode::BLOCK_SLOTS]);
    }
}
