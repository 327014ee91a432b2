/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! The logged-in user state attached to a mounted volume.

use crate::error::{Error, Result};
use crate::perm::{Gid, Uid};
use crate::ROOT_INODE;

/// The identity and working directory of the current session.
pub struct Session {
    logged_in: bool,
    uid: Uid,
    gid: Gid,
    username: String,
    cwd: u32,
}

impl Session {
    /// Creates a logged-out session rooted at the top directory.
    pub fn new() -> Self {
        Self {
            logged_in: false,
            uid: 0,
            gid: 0,
            username: String::new(),
            cwd: ROOT_INODE,
        }
    }

    /// Installs the identity of an authenticated user. The working directory
    /// resets to the root.
    pub fn login(&mut self, name: &str, uid: Uid, gid: Gid) {
        self.logged_in = true;
        self.uid = uid;
        self.gid = gid;
        self.username = name.to_owned();
        self.cwd = ROOT_INODE;
    }

    /// Clears the identity.
    pub fn logout(&mut self) {
        *self = Self::new();
    }

    /// Returns the current (uid, gid) pair, failing when logged out.
    pub fn require(&self) -> Result<(Uid, Gid)> {
        if self.logged_in {
            Ok((self.uid, self.gid))
        } else {
            Err(Error::NotAuthenticated)
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// The name of the logged-in user, if any.
    pub fn username(&self) -> Option<&str> {
        self.logged_in.then_some(self.username.as_str())
    }

    /// The inode of the working directory.
    pub fn cwd(&self) -> u32 {
        self.cwd
    }

    pub fn set_cwd(&mut self, inode: u32) {
        self.cwd = inode;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn login_cycle() {
        let mut session = Session::new();
        assert!(matches!(session.require(), Err(Error::NotAuthenticated)));
        assert_eq!(session.username(), None);
        session.login("alice", 100, 100);
        assert_eq!(session.require().unwrap(), (100, 100));
        assert_eq!(session.username(), Some("alice"));
        session.set_cwd(7);
        session.logout();
        assert!(matches!(session.require(), Err(Error::NotAuthenticated)));
        assert_eq!(session.cwd(), ROOT_INODE);
    }
}
