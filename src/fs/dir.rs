//! Directory content manipulation and the tree-level operations.

use crate::dirent::{DIRENT_TYPE_DIRECTORY, DIRENT_TYPE_REGULAR, DirEntry, MAX_NAME_LEN};
use crate::error::{Error, Result};
use crate::inode::{FileType, Inode};
use crate::perm::{ACCESS_READ, ACCESS_WRITE, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, Gid, Uid};
use crate::util::{ceil_division, timestamp_secs};
use crate::volume::Volume;
use crate::{BLOCK_SIZE, ROOT_INODE};

/// One row of a directory listing.
pub struct DirListEntry {
    pub name: Vec<u8>,
    pub inode: u32,
    pub file_type: u8,
    pub size: u32,
    pub mode: u16,
    pub uid: u16,
    pub gid: u16,
    pub mtime: u32,
}

impl Volume {
    /// Loads content block `index` of the directory. Directories have no
    /// holes; a zero mapping is structural corruption.
    fn dir_block(&mut self, dir: &Inode, index: u32) -> Result<(u32, [u8; BLOCK_SIZE])> {
        let phys = self.map_block(dir, index)?;
        if phys == 0 {
            return Err(Error::BadFormat);
        }
        let mut buf = [0u8; BLOCK_SIZE];
        self.dev.read_block(phys, &mut buf)?;
        Ok((phys, buf))
    }

    /// Looks up `name` in directory `dir_no`, returning the child inode.
    pub fn dir_lookup(&mut self, dir_no: u32, name: &[u8]) -> Result<Option<u32>> {
        let dir = self.read_inode(dir_no)?;
        self.lookup_in(&dir, name)
    }

    pub(crate) fn lookup_in(&mut self, dir: &Inode, name: &[u8]) -> Result<Option<u32>> {
        for index in 0..dir.size / BLOCK_SIZE as u32 {
            let (_, buf) = self.dir_block(dir, index)?;
            let mut off = 0;
            while off < BLOCK_SIZE {
                let entry = DirEntry::decode(&buf[off..])?;
                if !entry.is_free() && entry.name == name {
                    return Ok(Some(entry.inode));
                }
                off += entry.rec_len as usize;
            }
        }
        Ok(None)
    }

    /// Inserts a record binding `name` to `child`.
    ///
    /// A tombstone wide enough is reused as-is; a live record with enough
    /// slack is shrunk to its minimum length and the freed tail carries the
    /// new record. When no block has room, the directory grows by one block
    /// holding a single spanning tombstone and the scan runs again.
    pub fn dir_insert(&mut self, dir_no: u32, name: &[u8], child: u32, file_type: u8) -> Result<()> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(Error::InvalidArgument);
        }
        let mut dir = self.read_inode(dir_no)?;
        if self.lookup_in(&dir, name)?.is_some() {
            return Err(Error::Exists);
        }
        let needed = DirEntry::min_len(name.len()) as usize;
        loop {
            if self.insert_into_slack(&dir, name, child, file_type, needed)? {
                break;
            }
            let index = dir.size / BLOCK_SIZE as u32;
            let block = self.allocate_block()?;
            let mut buf = [0u8; BLOCK_SIZE];
            DirEntry {
                inode: 0,
                rec_len: BLOCK_SIZE as u16,
                file_type: 0,
                name: Vec::new(),
            }
            .encode(&mut buf);
            if let Err(e) = self.dev.write_block(block, &buf) {
                let _ = self.free_block(block);
                return Err(e);
            }
            if let Err(e) = self.set_map(&mut dir, index, block) {
                let _ = self.free_block(block);
                return Err(e);
            }
            dir.size += BLOCK_SIZE as u32;
            dir.blocks = ceil_division(dir.size, BLOCK_SIZE as u32);
        }
        let timestamp = timestamp_secs();
        dir.mtime = timestamp;
        dir.ctime = timestamp;
        self.write_inode(dir_no, &dir)
    }

    /// One pass over the existing records; true when the entry was placed.
    fn insert_into_slack(
        &mut self,
        dir: &Inode,
        name: &[u8],
        child: u32,
        file_type: u8,
        needed: usize,
    ) -> Result<bool> {
        for index in 0..dir.size / BLOCK_SIZE as u32 {
            let (phys, mut buf) = self.dir_block(dir, index)?;
            let mut off = 0;
            while off < BLOCK_SIZE {
                let entry = DirEntry::decode(&buf[off..])?;
                let rec = entry.rec_len as usize;
                if entry.is_free() && rec >= needed {
                    DirEntry {
                        inode: child,
                        rec_len: entry.rec_len,
                        file_type,
                        name: name.to_vec(),
                    }
                    .encode(&mut buf[off..off + rec]);
                    self.dev.write_block(phys, &buf)?;
                    return Ok(true);
                }
                if !entry.is_free() {
                    let min = DirEntry::min_len(entry.name.len()) as usize;
                    if rec - min >= needed {
                        let mut shrunk = entry;
                        shrunk.rec_len = min as u16;
                        shrunk.encode(&mut buf[off..off + min]);
                        DirEntry {
                            inode: child,
                            rec_len: (rec - min) as u16,
                            file_type,
                            name: name.to_vec(),
                        }
                        .encode(&mut buf[off + min..off + rec]);
                        self.dev.write_block(phys, &buf)?;
                        return Ok(true);
                    }
                }
                off += rec;
            }
        }
        Ok(false)
    }

    /// Tombstones the record for `name` and returns it. Neighbouring records
    /// are not coalesced.
    pub fn dir_remove(&mut self, dir_no: u32, name: &[u8]) -> Result<DirEntry> {
        let mut dir = self.read_inode(dir_no)?;
        for index in 0..dir.size / BLOCK_SIZE as u32 {
            let (phys, mut buf) = self.dir_block(&dir, index)?;
            let mut off = 0;
            while off < BLOCK_SIZE {
                let entry = DirEntry::decode(&buf[off..])?;
                if !entry.is_free() && entry.name == name {
                    buf[off..off + 4].copy_from_slice(&0u32.to_le_bytes());
                    self.dev.write_block(phys, &buf)?;
                    let timestamp = timestamp_secs();
                    dir.mtime = timestamp;
                    dir.ctime = timestamp;
                    self.write_inode(dir_no, &dir)?;
                    return Ok(entry);
                }
                off += entry.rec_len as usize;
            }
        }
        Err(Error::NotFound)
    }

    /// Collects the live records of `dir_no` in traversal order, together
    /// with the attributes of the inodes they reference.
    pub fn dir_list(&mut self, dir_no: u32) -> Result<Vec<DirListEntry>> {
        let dir = self.read_inode(dir_no)?;
        let mut entries = Vec::new();
        for index in 0..dir.size / BLOCK_SIZE as u32 {
            let (_, buf) = self.dir_block(&dir, index)?;
            let mut off = 0;
            while off < BLOCK_SIZE {
                let entry = DirEntry::decode(&buf[off..])?;
                let rec_len = entry.rec_len;
                if !entry.is_free() {
                    entries.push(entry);
                }
                off += rec_len as usize;
            }
        }
        entries
            .into_iter()
            .map(|entry| {
                let inode = self.read_inode(entry.inode)?;
                Ok(DirListEntry {
                    name: entry.name,
                    inode: entry.inode,
                    file_type: entry.file_type,
                    size: inode.size,
                    mode: inode.mode,
                    uid: inode.uid,
                    gid: inode.gid,
                    mtime: inode.mtime,
                })
            })
            .collect()
    }

    /// Tells whether the directory contains nothing besides `.` and `..`.
    fn dir_is_empty(&mut self, dir: &Inode) -> Result<bool> {
        for index in 0..dir.size / BLOCK_SIZE as u32 {
            let (_, buf) = self.dir_block(dir, index)?;
            let mut off = 0;
            while off < BLOCK_SIZE {
                let entry = DirEntry::decode(&buf[off..])?;
                if !entry.is_free() && entry.name != b"." && entry.name != b".." {
                    return Ok(false);
                }
                off += entry.rec_len as usize;
            }
        }
        Ok(true)
    }

    // ---- tree-level operations

    /// Resolves the parent directory for a creation or removal, rejecting
    /// trivial final components.
    fn resolve_target<'p>(&mut self, path: &'p str) -> Result<(u32, Inode, &'p str)> {
        let (parent_no, name) = self.resolve_parent(path)?;
        if parent_no == 0 {
            return Err(Error::NotFound);
        }
        if name == "." || name == ".." {
            return Err(Error::InvalidArgument);
        }
        let parent = self.read_inode(parent_no)?;
        if !parent.is_directory() {
            return Err(Error::NotADirectory);
        }
        Ok((parent_no, parent, name))
    }

    /// Creates a directory at `path`.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let (uid, gid) = self.session.require()?;
        let (parent_no, parent, name) = self.resolve_target(path)?;
        self.check_access(&parent, ACCESS_WRITE)?;
        if self.lookup_in(&parent, name.as_bytes())?.is_some() {
            return Err(Error::Exists);
        }
        let ino = self.allocate_inode()?;
        if let Err(e) = self.wire_new_directory(ino, parent_no, name, uid, gid) {
            let _ = self.delete_inode(ino);
            return Err(e);
        }
        let mut parent = self.read_inode(parent_no)?;
        parent.links += 1;
        self.write_inode(parent_no, &parent)
    }

    /// Writes the record of a fresh directory and inserts its `.`, `..` and
    /// parent entries.
    fn wire_new_directory(
        &mut self,
        ino: u32,
        parent_no: u32,
        name: &str,
        uid: Uid,
        gid: Gid,
    ) -> Result<()> {
        let timestamp = timestamp_secs();
        let mut child = Inode::new(FileType::Directory, DEFAULT_DIR_MODE, uid, gid, timestamp);
        child.links = 2;
        self.write_inode(ino, &child)?;
        self.dir_insert(ino, b".", ino, DIRENT_TYPE_DIRECTORY)?;
        self.dir_insert(ino, b"..", parent_no, DIRENT_TYPE_DIRECTORY)?;
        self.dir_insert(parent_no, name.as_bytes(), ino, DIRENT_TYPE_DIRECTORY)
    }

    /// Removes the directory at `path`, which must contain only `.` and
    /// `..`.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        self.session.require()?;
        let (parent_no, parent, name) = self.resolve_target(path)?;
        let child_no = self
            .lookup_in(&parent, name.as_bytes())?
            .ok_or(Error::NotFound)?;
        if child_no == ROOT_INODE || child_no == self.session.cwd() {
            return Err(Error::InvalidArgument);
        }
        let child = self.read_inode(child_no)?;
        if !child.is_directory() {
            return Err(Error::NotADirectory);
        }
        if !self.dir_is_empty(&child)? {
            return Err(Error::NotEmpty);
        }
        self.check_access(&parent, ACCESS_WRITE)?;
        self.dir_remove(parent_no, name.as_bytes())?;
        let mut parent = self.read_inode(parent_no)?;
        parent.links -= 1;
        self.write_inode(parent_no, &parent)?;
        self.delete_inode(child_no)
    }

    /// Creates an empty regular file at `path`.
    pub fn create(&mut self, path: &str) -> Result<()> {
        let (uid, gid) = self.session.require()?;
        let (parent_no, parent, name) = self.resolve_target(path)?;
        self.check_access(&parent, ACCESS_WRITE)?;
        if self.lookup_in(&parent, name.as_bytes())?.is_some() {
            return Err(Error::Exists);
        }
        let ino = self.allocate_inode()?;
        let timestamp = timestamp_secs();
        let child = Inode::new(FileType::Regular, DEFAULT_FILE_MODE, uid, gid, timestamp);
        let wired = self
            .write_inode(ino, &child)
            .and_then(|_| self.dir_insert(parent_no, name.as_bytes(), ino, DIRENT_TYPE_REGULAR));
        if let Err(e) = wired {
            let _ = self.delete_inode(ino);
            return Err(e);
        }
        Ok(())
    }

    /// Removes the regular file at `path`. The inode and its blocks are
    /// reclaimed when the last link goes away.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        self.session.require()?;
        let (parent_no, parent, name) = self.resolve_target(path)?;
        let child_no = self
            .lookup_in(&parent, name.as_bytes())?
            .ok_or(Error::NotFound)?;
        let mut child = self.read_inode(child_no)?;
        if child.is_directory() {
            return Err(Error::IsADirectory);
        }
        if self.open_files.is_open_inode(child_no) {
            return Err(Error::InvalidArgument);
        }
        self.check_access(&parent, ACCESS_WRITE)?;
        self.dir_remove(parent_no, name.as_bytes())?;
        child.links -= 1;
        if child.links == 0 {
            self.delete_inode(child_no)
        } else {
            self.write_inode(child_no, &child)
        }
    }

    /// Lists the directory at `path`.
    pub fn list(&mut self, path: &str) -> Result<Vec<DirListEntry>> {
        self.session.require()?;
        let ino = self.resolve(path)?;
        let inode = self.read_inode(ino)?;
        if !inode.is_directory() {
            return Err(Error::NotADirectory);
        }
        self.check_access(&inode, ACCESS_READ)?;
        self.dir_list(ino)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::volume::testing::{ScratchImage, force_login};

    #[test]
    fn root_self_references() {
        let (_img, mut vol) = ScratchImage::mounted();
        force_login(&mut vol, 1, 1);
        let entries = vol.list("/").unwrap();
        let names: Vec<&[u8]> = entries.iter().map(|e| e.name.as_slice()).collect();
        assert_eq!(names, [b".".as_slice(), b"..".as_slice()]);
        assert!(entries.iter().all(|e| e.inode == ROOT_INODE));
        let root = vol.read_inode(ROOT_INODE).unwrap();
        assert_eq!({ root.links }, 2);
    }

    #[test]
    fn mkdir_wires_link_counts() {
        let (_img, mut vol) = ScratchImage::mounted();
        force_login(&mut vol, 1, 1);
        vol.mkdir("/d").unwrap();
        let root = vol.read_inode(ROOT_INODE).unwrap();
        assert_eq!({ root.links }, 3);
        let child_no = vol.dir_lookup(ROOT_INODE, b"d").unwrap().unwrap();
        let child = vol.read_inode(child_no).unwrap();
        assert_eq!({ child.links }, 2);
        assert_eq!({ child.uid }, 1);
        // the new directory points back at its parent
        assert_eq!(vol.dir_lookup(child_no, b"..").unwrap(), Some(ROOT_INODE));
        vol.mkdir("/d/e").unwrap();
        let child = vol.read_inode(child_no).unwrap();
        assert_eq!({ child.links }, 3);
    }

    #[test]
    fn rmdir_flows() {
        let (_img, mut vol) = ScratchImage::mounted();
        force_login(&mut vol, 1, 1);
        let free_inodes = { vol.superblock.free_inodes };
        let free_blocks = { vol.superblock.free_blocks };
        vol.mkdir("/d").unwrap();
        vol.create("/d/f").unwrap();
        assert!(matches!(vol.rmdir("/d"), Err(Error::NotEmpty)));
        vol.unlink("/d/f").unwrap();
        vol.rmdir("/d").unwrap();
        assert_eq!({ vol.superblock.free_inodes }, free_inodes);
        assert_eq!({ vol.superblock.free_blocks }, free_blocks);
        let root = vol.read_inode(ROOT_INODE).unwrap();
        assert_eq!({ root.links }, 2);
        assert!(matches!(vol.rmdir("/d"), Err(Error::NotFound)));
    }

    #[test]
    fn rmdir_rejects_root_and_files() {
        let (_img, mut vol) = ScratchImage::mounted();
        force_login(&mut vol, 1, 1);
        assert!(matches!(vol.rmdir("/"), Err(Error::InvalidArgument)));
        vol.create("/f").unwrap();
        assert!(matches!(vol.rmdir("/f"), Err(Error::NotADirectory)));
        assert!(matches!(vol.unlink("/"), Err(Error::InvalidArgument)));
    }

    #[test]
    fn name_collisions() {
        let (_img, mut vol) = ScratchImage::mounted();
        force_login(&mut vol, 1, 1);
        vol.create("/x").unwrap();
        assert!(matches!(vol.create("/x"), Err(Error::Exists)));
        assert!(matches!(vol.mkdir("/x"), Err(Error::Exists)));
    }

    #[test]
    fn tombstone_reuse() {
        let (_img, mut vol) = ScratchImage::mounted();
        force_login(&mut vol, 1, 1);
        vol.create("/one").unwrap();
        vol.create("/two").unwrap();
        let blocks_before = {
            let root = vol.read_inode(ROOT_INODE).unwrap();
            root.blocks
        };
        vol.unlink("/one").unwrap();
        vol.create("/eno").unwrap();
        let root = vol.read_inode(ROOT_INODE).unwrap();
        // the tombstone was reused, no new block was appended
        assert_eq!({ root.blocks }, blocks_before);
        let entries = vol.list("/").unwrap();
        let names: Vec<&[u8]> = entries.iter().map(|e| e.name.as_slice()).collect();
        assert!(names.contains(&b"eno".as_slice()));
        assert!(!names.contains(&b"one".as_slice()));
    }

    #[test]
    fn listing_is_stable() {
        let (_img, mut vol) = ScratchImage::mounted();
        force_login(&mut vol, 1, 1);
        vol.create("/a").unwrap();
        vol.mkdir("/b").unwrap();
        let first: Vec<Vec<u8>> = vol.list("/").unwrap().into_iter().map(|e| e.name).collect();
        let second: Vec<Vec<u8>> = vol.list("/").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn directory_grows_past_one_block() {
        let (_img, mut vol) = ScratchImage::mounted();
        force_login(&mut vol, 1, 1);
        // each record takes align4(8 + 6) = 16 bytes; 70 entries exceed one
        // block together with `.` and `..`
        for i in 0..70 {
            vol.create(&format!("/f{i:04}")).unwrap();
        }
        let root = vol.read_inode(ROOT_INODE).unwrap();
        assert!({ root.blocks } > 1);
        assert_eq!({ root.size } % BLOCK_SIZE as u32, 0);
        let entries = vol.list("/").unwrap();
        assert_eq!(entries.len(), 72);
        assert!(vol.resolve("/f0069").unwrap() > 0);
    }

    #[test]
    fn parent_write_permission_required() {
        let (_img, mut vol) = ScratchImage::mounted();
        force_login(&mut vol, 1, 1);
        vol.mkdir("/locked").unwrap();
        vol.chmod("/locked", 0o555).unwrap();
        assert!(matches!(
            vol.create("/locked/f"),
            Err(Error::PermissionDenied)
        ));
        assert!(matches!(
            vol.mkdir("/locked/d"),
            Err(Error::PermissionDenied)
        ));
    }

    #[test]
    fn unlink_keeps_open_files_valid() {
        let (_img, mut vol) = ScratchImage::mounted();
        force_login(&mut vol, 1, 1);
        vol.create("/f").unwrap();
        let fd = vol.open("/f", crate::open_file::OpenFlags::ReadOnly).unwrap();
        assert!(matches!(vol.unlink("/f"), Err(Error::InvalidArgument)));
        vol.close(fd).unwrap();
        vol.unlink("/f").unwrap();
    }
}
