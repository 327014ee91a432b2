//! Path parsing and resolution.
//!
//! An absolute path resolves from the root directory, a relative one from
//! the session's working directory. `.` and `..` resolve through the
//! directory entries of the directory being walked, so `..` at the root
//! stays at the root. Empty components coming from `//` or a trailing `/`
//! are skipped.

use crate::error::{Error, Result};
use crate::volume::Volume;
use crate::ROOT_INODE;

/// The character used as the path separator.
pub const PATH_SEPARATOR: char = '/';

/// Splits a path into its non-empty components.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_SEPARATOR).filter(|comp| !comp.is_empty())
}

impl Volume {
    /// The inode a walk of `path` starts from.
    fn resolve_start(&self, path: &str) -> u32 {
        if path.starts_with(PATH_SEPARATOR) {
            ROOT_INODE
        } else {
            self.session.cwd()
        }
    }

    /// Walks one component from directory `dir_no`.
    fn step(&mut self, dir_no: u32, comp: &str) -> Result<u32> {
        let dir = self.read_inode(dir_no)?;
        if !dir.is_directory() {
            return Err(Error::NotADirectory);
        }
        if comp == "." {
            return Ok(dir_no);
        }
        self.lookup_in(&dir, comp.as_bytes())?.ok_or(Error::NotFound)
    }

    /// Resolves `path` to an inode number.
    pub fn resolve(&mut self, path: &str) -> Result<u32> {
        let mut cur = self.resolve_start(path);
        for comp in components(path) {
            cur = self.step(cur, comp)?;
        }
        Ok(cur)
    }

    /// Splits `path` into its parent directory and final component.
    ///
    /// The parent inode is zero when an intermediate component does not
    /// exist. A path without any component cannot name a child and is
    /// rejected.
    pub fn resolve_parent<'p>(&mut self, path: &'p str) -> Result<(u32, &'p str)> {
        let comps: Vec<&str> = components(path).collect();
        let Some((last, dirs)) = comps.split_last() else {
            return Err(Error::InvalidArgument);
        };
        let mut cur = self.resolve_start(path);
        for comp in dirs {
            match self.step(cur, comp) {
                Ok(next) => cur = next,
                Err(Error::NotFound) => return Ok((0, last)),
                Err(e) => return Err(e),
            }
        }
        Ok((cur, last))
    }
}
