//! Variable-length directory records.
//!
//! A directory's content is a sequence of records filling whole blocks. Each
//! record carries the child's inode number, its own length, a name length, a
//! file type hint and the name bytes. A record whose inode is zero is a
//! tombstone whose span can be reused by a later insertion; the last record
//! of a block always extends to the end of that block.

use crate::error::{Error, Result};
use crate::util::align4;

/// File type hint: regular file.
pub const DIRENT_TYPE_REGULAR: u8 = 1;
/// File type hint: directory.
pub const DIRENT_TYPE_DIRECTORY: u8 = 2;

/// The fixed header size preceding the name bytes.
pub const DIRENT_HEADER: usize = 8;
/// The longest name a record can carry.
pub const MAX_NAME_LEN: usize = 255;

/// A decoded directory record.
#[derive(Clone, Debug)]
pub struct DirEntry {
    /// The referenced inode. Zero marks a tombstone.
    pub inode: u32,
    /// The total record length, a multiple of 4 never crossing a block
    /// boundary.
    pub rec_len: u16,
    /// The file type hint.
    pub file_type: u8,
    /// The name bytes, not null-terminated.
    pub name: Vec<u8>,
}

impl DirEntry {
    /// The smallest record length able to carry a name of `name_len` bytes.
    pub fn min_len(name_len: usize) -> u16 {
        align4(DIRENT_HEADER + name_len) as u16
    }

    /// Tells whether the record is a reusable tombstone.
    pub fn is_free(&self) -> bool {
        self.inode == 0
    }

    /// Decodes the record starting at the beginning of `buf`.
    ///
    /// An inconsistent header (record length not a multiple of 4, shorter
    /// than its header and name, or overflowing `buf`) is structural
    /// corruption.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < DIRENT_HEADER {
            return Err(Error::BadFormat);
        }
        let inode = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let rec_len = u16::from_le_bytes([buf[4], buf[5]]);
        let name_len = buf[6] as usize;
        let file_type = buf[7];
        let rec = rec_len as usize;
        if rec < DIRENT_HEADER || rec % 4 != 0 || rec > buf.len() || DIRENT_HEADER + name_len > rec
        {
            return Err(Error::BadFormat);
        }
        Ok(Self {
            inode,
            rec_len,
            file_type,
            name: buf[DIRENT_HEADER..DIRENT_HEADER + name_len].to_vec(),
        })
    }

    /// Encodes the record at the beginning of `buf`, zero-padding the tail
    /// of its span.
    pub fn encode(&self, buf: &mut [u8]) {
        let rec = self.rec_len as usize;
        debug_assert!(rec <= buf.len());
        debug_assert!(DIRENT_HEADER + self.name.len() <= rec);
        buf[..4].copy_from_slice(&self.inode.to_le_bytes());
        buf[4..6].copy_from_slice(&self.rec_len.to_le_bytes());
        buf[6] = self.name.len() as u8;
        buf[7] = self.file_type;
        buf[DIRENT_HEADER..DIRENT_HEADER + self.name.len()].copy_from_slice(&self.name);
        buf[DIRENT_HEADER + self.name.len()..rec].fill(0);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::BLOCK_SIZE;

    #[test]
    fn codec_roundtrip() {
        let entry = DirEntry {
            inode: 12,
            rec_len: DirEntry::min_len(5),
            file_type: DIRENT_TYPE_REGULAR,
            name: b"hello".to_vec(),
        };
        let mut buf = [0xffu8; 16];
        entry.encode(&mut buf);
        let back = DirEntry::decode(&buf).unwrap();
        assert_eq!(back.inode, 12);
        assert_eq!(back.rec_len, 16);
        assert_eq!(back.file_type, DIRENT_TYPE_REGULAR);
        assert_eq!(back.name, b"hello");
        // padding bytes were cleared
        assert_eq!(buf[13..16], [0, 0, 0]);
    }

    #[test]
    fn spanning_tombstone() {
        let entry = DirEntry {
            inode: 0,
            rec_len: BLOCK_SIZE as u16,
            file_type: 0,
            name: Vec::new(),
        };
        let mut buf = [0u8; BLOCK_SIZE];
        entry.encode(&mut buf);
        let back = DirEntry::decode(&buf).unwrap();
        assert!(back.is_free());
        assert_eq!(back.rec_len as usize, BLOCK_SIZE);
    }

    #[test]
    fn rejects_corrupt_headers() {
        // record length of zero
        assert!(matches!(
            DirEntry::decode(&[0; 12]),
            Err(Error::BadFormat)
        ));
        // record length not a multiple of 4
        let entry = DirEntry {
            inode: 1,
            rec_len: 12,
            file_type: 1,
            name: b"a".to_vec(),
        };
        let mut buf = [0u8; 12];
        entry.encode(&mut buf);
        buf[4] = 10;
        assert!(matches!(DirEntry::decode(&buf), Err(Error::BadFormat)));
        // truncated buffer
        assert!(matches!(DirEntry::decode(&[0; 4]), Err(Error::BadFormat)));
    }

    #[test]
    fn minimum_lengths() {
        assert_eq!(DirEntry::min_len(1), 12);
        assert_eq!(DirEntry::min_len(4), 12);
        assert_eq!(DirEntry::min_len(5), 16);
    }
}
