//! The mounted volume: lifecycle, allocator and inode table.

use crate::device::BlockDevice;
use crate::dirent::DIRENT_TYPE_DIRECTORY;
use crate::error::{Error, Result};
use crate::inode::{FileType, Inode, PERM_MASK, TYPE_MASK};
use crate::open_file::OpenFileTable;
use crate::perm::{self, ACCESS_EXEC, DEFAULT_DIR_MODE, Gid, Mode, Uid};
use crate::session::Session;
use crate::superblock::{Bitmap, Superblock};
use crate::users::UserStore;
use crate::util::{self, timestamp_secs};
use crate::{
    BLOCK_BITMAP_BLOCK, BLOCK_COUNT, BLOCK_SIZE, INODE_BITMAP_BLOCK, INODE_COUNT, INODE_SIZE,
    INODE_TABLE_BLOCK, ROOT_INODE,
};
use std::path::Path;
use uuid::Uuid;

/// Counters and identification reported by the `status` command.
pub struct VolumeStatus {
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub total_inodes: u32,
    pub free_inodes: u32,
    pub first_data_block: u32,
    pub filesystem_id: Uuid,
    pub volume_name: String,
    pub last_mount_timestamp: u32,
    pub last_write_timestamp: u32,
}

/// A mounted filesystem image and every piece of state attached to it: the
/// cached superblock and bitmaps, the open-file table and the current
/// session.
///
/// Every mutation is written through to the image, so the on-disk state
/// observed after an operation returns is the state the next operation sees.
pub struct Volume {
    pub(crate) dev: BlockDevice,
    pub(crate) superblock: Superblock,
    pub(crate) block_bitmap: Bitmap,
    pub(crate) inode_bitmap: Bitmap,
    pub(crate) open_files: OpenFileTable,
    pub(crate) session: Session,
}

impl Volume {
    /// Creates a fresh filesystem on the image file at `path`.
    ///
    /// The image is rewritten entirely: zeroed blocks, a new superblock with
    /// a generated filesystem id, bitmaps marking the metadata blocks used,
    /// an empty inode table and the root directory at inode 2.
    pub fn format(path: &Path, label: Option<&str>) -> Result<()> {
        let mut dev = BlockDevice::create(path)?;
        let zero = [0u8; BLOCK_SIZE];
        for n in 0..BLOCK_COUNT {
            dev.write_block(n, &zero)?;
        }
        let timestamp = timestamp_secs();
        let filesystem_id = *Uuid::new_v4().as_bytes();
        let superblock = Superblock::new(timestamp, filesystem_id, label.unwrap_or(""));
        let mut block_bitmap = Bitmap::zeroed();
        let first_data_block = superblock.first_data_block;
        for n in 0..first_data_block {
            block_bitmap.set(n);
        }
        let mut inode_bitmap = Bitmap::zeroed();
        inode_bitmap.set(ROOT_INODE);
        let mut vol = Self {
            dev,
            superblock,
            block_bitmap,
            inode_bitmap,
            open_files: OpenFileTable::new(),
            session: Session::new(),
        };
        let mut root = Inode::new(FileType::Directory, DEFAULT_DIR_MODE, 0, 0, timestamp);
        root.links = 2;
        vol.write_inode(ROOT_INODE, &root)?;
        vol.dir_insert(ROOT_INODE, b".", ROOT_INODE, DIRENT_TYPE_DIRECTORY)?;
        vol.dir_insert(ROOT_INODE, b"..", ROOT_INODE, DIRENT_TYPE_DIRECTORY)?;
        vol.sync_metadata()
    }

    /// Mounts the image file at `path`.
    ///
    /// The superblock is validated and the bitmaps are loaded into memory;
    /// the session starts logged out with the root directory as its working
    /// directory.
    pub fn mount(path: &Path) -> Result<Self> {
        let mut dev = BlockDevice::open(path)?;
        if dev.size()? != BLOCK_COUNT as u64 * BLOCK_SIZE as u64 {
            return Err(Error::BadFormat);
        }
        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_block(0, &mut buf)?;
        let mut superblock = Superblock::from_block(&buf);
        if !superblock.is_valid() {
            return Err(Error::BadFormat);
        }
        dev.read_block(BLOCK_BITMAP_BLOCK, &mut buf)?;
        let block_bitmap = Bitmap::from_block(&buf);
        dev.read_block(INODE_BITMAP_BLOCK, &mut buf)?;
        let inode_bitmap = Bitmap::from_block(&buf);
        superblock.last_mount_timestamp = timestamp_secs();
        let mut vol = Self {
            dev,
            superblock,
            block_bitmap,
            inode_bitmap,
            open_files: OpenFileTable::new(),
            session: Session::new(),
        };
        vol.sync_superblock()?;
        Ok(vol)
    }

    /// Unmounts the volume, invalidating open files and releasing the image
    /// file handle. All state already sits on disk.
    pub fn unmount(mut self) -> Result<()> {
        self.open_files.clear();
        self.superblock.last_write_timestamp = timestamp_secs();
        self.sync_superblock()
    }

    /// Reports the volume counters.
    pub fn status(&self) -> VolumeStatus {
        let name_len = self
            .superblock
            .volume_name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.superblock.volume_name.len());
        VolumeStatus {
            total_blocks: self.superblock.total_blocks,
            free_blocks: self.superblock.free_blocks,
            total_inodes: self.superblock.total_inodes,
            free_inodes: self.superblock.free_inodes,
            first_data_block: self.superblock.first_data_block,
            filesystem_id: Uuid::from_bytes(self.superblock.filesystem_id),
            volume_name: String::from_utf8_lossy(&self.superblock.volume_name[..name_len])
                .into_owned(),
            last_mount_timestamp: self.superblock.last_mount_timestamp,
            last_write_timestamp: self.superblock.last_write_timestamp,
        }
    }

    // ---- write-through helpers

    pub(crate) fn sync_superblock(&mut self) -> Result<()> {
        self.dev.write_block(0, util::reinterpret(&self.superblock))
    }

    pub(crate) fn sync_block_bitmap(&mut self) -> Result<()> {
        self.dev
            .write_block(BLOCK_BITMAP_BLOCK, self.block_bitmap.as_bytes())
    }

    pub(crate) fn sync_inode_bitmap(&mut self) -> Result<()> {
        self.dev
            .write_block(INODE_BITMAP_BLOCK, self.inode_bitmap.as_bytes())
    }

    fn sync_metadata(&mut self) -> Result<()> {
        self.sync_superblock()?;
        self.sync_block_bitmap()?;
        self.sync_inode_bitmap()
    }

    // ---- allocator

    /// Allocates the lowest free data block, first-fit. The returned block
    /// is not zeroed.
    pub fn allocate_block(&mut self) -> Result<u32> {
        let first = self.superblock.first_data_block;
        let Some(n) = self.block_bitmap.first_clear(first, BLOCK_COUNT) else {
            return Err(Error::NoSpace);
        };
        self.block_bitmap.set(n);
        self.superblock.free_blocks -= 1;
        self.sync_block_bitmap()?;
        self.sync_superblock()?;
        Ok(n)
    }

    /// Frees data block `n`. Freeing an already-free block succeeds without
    /// touching the counter, so a double free during unwind cannot compound
    /// errors.
    pub fn free_block(&mut self, n: u32) -> Result<()> {
        if n < self.superblock.first_data_block || n >= BLOCK_COUNT {
            return Err(Error::InvalidArgument);
        }
        if !self.block_bitmap.get(n) {
            return Ok(());
        }
        self.block_bitmap.clear(n);
        self.superblock.free_blocks += 1;
        self.sync_block_bitmap()?;
        self.sync_superblock()
    }

    /// Allocates the lowest free inode, first-fit from inode 1. Inode 0 is
    /// never returned.
    pub fn allocate_inode(&mut self) -> Result<u32> {
        let Some(n) = self.inode_bitmap.first_clear(1, INODE_COUNT) else {
            return Err(Error::NoSpace);
        };
        self.inode_bitmap.set(n);
        self.superblock.free_inodes -= 1;
        self.sync_inode_bitmap()?;
        self.sync_superblock()?;
        Ok(n)
    }

    /// Frees inode `n`. Idempotent, like [`Self::free_block`].
    pub fn free_inode(&mut self, n: u32) -> Result<()> {
        if n == 0 || n >= INODE_COUNT {
            return Err(Error::InvalidArgument);
        }
        if !self.inode_bitmap.get(n) {
            return Ok(());
        }
        self.inode_bitmap.clear(n);
        self.superblock.free_inodes += 1;
        self.sync_inode_bitmap()?;
        self.sync_superblock()
    }

    // ---- inode table

    /// Reads inode record `n` (1-based). Unallocated inodes read back as the
    /// zeroed record.
    pub fn read_inode(&mut self, n: u32) -> Result<Inode> {
        if n == 0 || n > INODE_COUNT {
            return Err(Error::InvalidArgument);
        }
        let off = (n - 1) as usize * INODE_SIZE;
        let blk = INODE_TABLE_BLOCK + (off / BLOCK_SIZE) as u32;
        let mut buf = [0u8; BLOCK_SIZE];
        self.dev.read_block(blk, &mut buf)?;
        Ok(unsafe { util::read_struct::<Inode>(&buf[off % BLOCK_SIZE..]) })
    }

    /// Writes the full record for inode `n`.
    pub fn write_inode(&mut self, n: u32, inode: &Inode) -> Result<()> {
        if n == 0 || n > INODE_COUNT {
            return Err(Error::InvalidArgument);
        }
        let off = (n - 1) as usize * INODE_SIZE;
        let blk = INODE_TABLE_BLOCK + (off / BLOCK_SIZE) as u32;
        let inner = off % BLOCK_SIZE;
        let mut buf = [0u8; BLOCK_SIZE];
        self.dev.read_block(blk, &mut buf)?;
        buf[inner..inner + INODE_SIZE].copy_from_slice(util::reinterpret(inode));
        self.dev.write_block(blk, &buf)
    }

    // ---- identity

    /// Authenticates against the user store and installs the identity. The
    /// working directory resets to the root.
    pub fn login(&mut self, store: &UserStore, name: &str, pass: &str) -> Result<()> {
        let Some(user) = store.find(name) else {
            return Err(Error::PermissionDenied);
        };
        if !user.check_password(pass) {
            return Err(Error::PermissionDenied);
        }
        self.session.login(name, user.uid, user.gid);
        Ok(())
    }

    /// Clears the current identity.
    pub fn logout(&mut self) {
        self.session.logout();
    }

    /// Checks `access` on `inode` against the logged-in user.
    pub(crate) fn check_access(&self, inode: &Inode, access: Mode) -> Result<()> {
        let (uid, gid) = self.session.require()?;
        if perm::check_permission(inode.permissions(), inode.uid, inode.gid, uid, gid, access) {
            Ok(())
        } else {
            Err(Error::PermissionDenied)
        }
    }

    // ---- attribute operations

    /// Replaces the permission bits of the file at `path`.
    pub fn chmod(&mut self, path: &str, mode: Mode) -> Result<()> {
        self.session.require()?;
        let ino = self.resolve(path)?;
        let mut inode = self.read_inode(ino)?;
        inode.mode = (inode.mode & TYPE_MASK) | (mode & PERM_MASK);
        inode.ctime = timestamp_secs();
        self.write_inode(ino, &inode)
    }

    /// Changes the owner of the file at `path`.
    pub fn chown(&mut self, path: &str, uid: Uid, gid: Gid) -> Result<()> {
        self.session.require()?;
        let ino = self.resolve(path)?;
        let mut inode = self.read_inode(ino)?;
        inode.uid = uid;
        inode.gid = gid;
        inode.ctime = timestamp_secs();
        self.write_inode(ino, &inode)
    }

    /// Changes the session's working directory to `path`.
    pub fn cd(&mut self, path: &str) -> Result<()> {
        self.session.require()?;
        let ino = self.resolve(path)?;
        let inode = self.read_inode(ino)?;
        if !inode.is_directory() {
            return Err(Error::NotADirectory);
        }
        self.check_access(&inode, ACCESS_EXEC)?;
        self.session.set_cwd(ino);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    /// A scratch image file, removed when dropped.
    pub struct ScratchImage(pub PathBuf);

    impl ScratchImage {
        /// Formats and mounts a fresh scratch image.
        pub fn mounted() -> (Self, Volume) {
            let path =
                std::env::temp_dir().join(format!("ext2fs-test-{}.img", Uuid::new_v4()));
            Volume::format(&path, Some("scratch")).unwrap();
            let vol = Volume::mount(&path).unwrap();
            (Self(path), vol)
        }
    }

    impl Drop for ScratchImage {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
        }
    }

    /// Installs a test identity without going through the user store.
    pub fn force_login(vol: &mut Volume, uid: Uid, gid: Gid) {
        vol.session.login("tester", uid, gid);
    }
}
