//! The superblock and the usage bitmaps.

use crate::util;
use crate::{BLOCK_COUNT, BLOCK_SIZE, EXT2_SIGNATURE, FIRST_DATA_BLOCK, INODE_COUNT, INODE_SIZE};
use std::mem::size_of;

/// State telling that the filesystem is clean.
pub const FS_STATE_CLEAN: u16 = 1;
/// State telling that the filesystem has errors.
pub const FS_STATE_ERROR: u16 = 2;

/// Error handle action telling to ignore the error.
pub const ERR_ACTION_IGNORE: u16 = 1;
/// Error handle action telling to remount as read-only.
pub const ERR_ACTION_READ_ONLY: u16 = 2;

/// The superblock, stored in block 0 and padded to one full block.
///
/// The two free counters are cached projections of the bitmaps and match
/// their popcount complement at every stable point.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Superblock {
    /// Total number of inodes in the filesystem.
    pub total_inodes: u32,
    /// Total number of blocks in the filesystem.
    pub total_blocks: u32,
    /// Total number of unallocated data blocks.
    pub free_blocks: u32,
    /// Total number of unallocated inodes.
    pub free_inodes: u32,
    /// The first block available for file content.
    pub first_data_block: u32,
    /// log2(block_size) - 10
    pub block_size_log: u32,
    /// The number of inodes per block group. A single group exists.
    pub inodes_per_group: u32,
    /// The timestamp of the last mount operation.
    pub last_mount_timestamp: u32,
    /// The timestamp of the last write operation.
    pub last_write_timestamp: u32,
    /// The timestamp of the last consistency check.
    pub last_check_timestamp: u32,
    /// The filesystem's signature.
    pub signature: u16,
    /// The filesystem's state.
    pub fs_state: u16,
    /// The action to perform when an error is detected.
    pub error_action: u16,
    /// The size of an inode record in bytes.
    pub inode_size: u16,
    /// The filesystem id.
    pub filesystem_id: [u8; 16],
    /// The volume name.
    pub volume_name: [u8; 16],

    /// Structure padding.
    _padding: [u8; 944],
}

const _: () = assert!(size_of::<Superblock>() == BLOCK_SIZE);

impl Superblock {
    /// Creates the superblock of a freshly formatted volume.
    ///
    /// The free counters account for the metadata blocks and the reserved
    /// null inode plus the root directory inode, matching the bitmaps the
    /// format operation writes alongside.
    pub fn new(timestamp: u32, filesystem_id: [u8; 16], label: &str) -> Self {
        let label = label.as_bytes();
        let mut volume_name = [0; 16];
        let len = label.len().min(volume_name.len());
        volume_name[..len].copy_from_slice(&label[..len]);
        Self {
            total_inodes: INODE_COUNT,
            total_blocks: BLOCK_COUNT,
            free_blocks: BLOCK_COUNT - FIRST_DATA_BLOCK,
            free_inodes: INODE_COUNT - 2,
            first_data_block: FIRST_DATA_BLOCK,
            block_size_log: BLOCK_SIZE.trailing_zeros() - 10,
            inodes_per_group: INODE_COUNT,
            last_mount_timestamp: 0,
            last_write_timestamp: timestamp,
            last_check_timestamp: timestamp,
            signature: EXT2_SIGNATURE,
            fs_state: FS_STATE_CLEAN,
            error_action: ERR_ACTION_READ_ONLY,
            inode_size: INODE_SIZE as u16,
            filesystem_id,
            volume_name,
            _padding: [0; 944],
        }
    }

    /// Reads the superblock from the content of block 0.
    pub fn from_block(buf: &[u8]) -> Self {
        unsafe { util::read_struct::<Self>(buf) }
    }

    /// Tells whether the superblock describes a volume this implementation
    /// can operate on.
    pub fn is_valid(&self) -> bool {
        let signature = self.signature;
        let total_blocks = self.total_blocks;
        let total_inodes = self.total_inodes;
        let first_data_block = self.first_data_block;
        signature == EXT2_SIGNATURE
            && total_blocks == BLOCK_COUNT
            && total_inodes == INODE_COUNT
            && first_data_block == FIRST_DATA_BLOCK
    }

    /// Returns the size of a block.
    pub fn block_size(&self) -> u32 {
        1 << (self.block_size_log + 10)
    }
}

/// A packed bit array backed by one full block. Bit `k` sits in byte `k / 8`
/// at position `k % 8`, LSB first.
#[derive(Clone)]
pub struct Bitmap {
    bytes: [u8; BLOCK_SIZE],
}

impl Bitmap {
    /// Creates a bitmap with every bit clear.
    pub fn zeroed() -> Self {
        Self {
            bytes: [0; BLOCK_SIZE],
        }
    }

    /// Loads a bitmap from the content of its block.
    pub fn from_block(buf: &[u8]) -> Self {
        let mut bytes = [0; BLOCK_SIZE];
        bytes.copy_from_slice(buf);
        Self { bytes }
    }

    /// Returns the block-sized backing bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Tells whether bit `i` is set.
    pub fn get(&self, i: u32) -> bool {
        (self.bytes[i as usize / 8] >> (i % 8)) & 1 != 0
    }

    /// Sets bit `i`.
    pub fn set(&mut self, i: u32) {
        self.bytes[i as usize / 8] |= 1 << (i % 8);
    }

    /// Clears bit `i`.
    pub fn clear(&mut self, i: u32) {
        self.bytes[i as usize / 8] &= !(1 << (i % 8));
    }

    /// First-fit scan for a clear bit in `start..end`.
    pub fn first_clear(&self, start: u32, end: u32) -> Option<u32> {
        (start..end).find(|i| !self.get(*i))
    }

    /// Counts the clear bits in `start..end`.
    pub fn count_clear(&self, start: u32, end: u32) -> u32 {
        (start..end).filter(|i| !self.get(*i)).count() as u32
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bitmap_addressing() {
        let mut bitmap = Bitmap::zeroed();
        bitmap.set(0);
        bitmap.set(9);
        bitmap.set(1023);
        assert_eq!(bitmap.as_bytes()[0], 0b0000_0001);
        assert_eq!(bitmap.as_bytes()[1], 0b0000_0010);
        assert_eq!(bitmap.as_bytes()[127], 0b1000_0000);
        assert!(bitmap.get(0));
        assert!(!bitmap.get(1));
        assert!(bitmap.get(9));
        assert!(bitmap.get(1023));
        bitmap.clear(9);
        assert!(!bitmap.get(9));
    }

    #[test]
    fn bitmap_scan() {
        let mut bitmap = Bitmap::zeroed();
        for i in 0..16 {
            bitmap.set(i);
        }
        bitmap.set(17);
        assert_eq!(bitmap.first_clear(0, 1024), Some(16));
        assert_eq!(bitmap.first_clear(17, 1024), Some(18));
        assert_eq!(bitmap.count_clear(0, 20), 3);
    }

    #[test]
    fn superblock_validity() {
        let sb = Superblock::new(1234, [0; 16], "test");
        assert!(sb.is_valid());
        assert_eq!(sb.block_size(), BLOCK_SIZE as u32);
        let mut broken = sb;
        broken.signature = 0x1234;
        assert!(!broken.is_valid());
    }

    #[test]
    fn superblock_roundtrip() {
        let sb = Superblock::new(1234, [7; 16], "vol");
        let back = Superblock::from_block(util::reinterpret(&sb));
        assert!(back.is_valid());
        assert_eq!({ back.last_write_timestamp }, 1234);
        assert_eq!(back.filesystem_id, [7; 16]);
        assert_eq!(&back.volume_name[..3], b"vol");
    }
}
