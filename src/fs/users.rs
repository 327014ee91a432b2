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

//! The user store backing `login`: a passwd-style text file holding one
//! `name:password-hash:uid:gid` entry per line.

use crate::perm::{Gid, Uid};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand_core::OsRng;
use std::fmt::Formatter;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::{fmt, fs, io};

/// The default path of the user store file.
pub const DEFAULT_STORE_PATH: &str = "users";

/// Hashes the given clear password and returns it with a generated salt, in
/// the format stored by the user store.
pub fn hash_password(pass: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(pass.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Tells whether the given password `pass` corresponds to the hashed
/// password `hash`.
pub fn check_password(hash: &str, pass: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(pass.as_bytes(), &parsed_hash)
        .is_ok()
}

/// An error occurring when meeting an invalid entry.
#[derive(Debug)]
pub struct InvalidEntry;

/// A user known to the identity service.
pub struct UserEntry<'s> {
    /// The user's login name.
    pub name: &'s str,
    /// The user's hashed password.
    pub password: &'s str,
    /// The user ID.
    pub uid: Uid,
    /// The user's group ID.
    pub gid: Gid,
}

impl UserEntry<'_> {
    /// Deserializes entries from the given buffer `buf`.
    pub fn deserialize(buf: &str) -> impl Iterator<Item = Result<UserEntry<'_>, InvalidEntry>> {
        buf.split('\n')
            .filter(|line| !line.is_empty())
            .map(|line| {
                let mut vals = line.split(':');
                let ent = UserEntry {
                    name: vals.next()?,
                    password: vals.next()?,
                    uid: vals.next()?.parse().ok()?,
                    gid: vals.next()?.parse().ok()?,
                };
                if vals.next().is_some() {
                    return None;
                }
                Some(ent)
            })
            .map(|ent| ent.ok_or(InvalidEntry))
    }

    /// Checks the given (not hashed) password `pass` against the entry.
    pub fn check_password(&self, pass: &str) -> bool {
        check_password(self.password, pass)
    }
}

impl fmt::Display for UserEntry<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:{}:{}:{}", self.name, self.password, self.uid, self.gid)
    }
}

/// The content of the user store, loaded from its file.
pub struct UserStore {
    buf: String,
}

impl UserStore {
    /// Loads the store from the file at `path`.
    pub fn load(path: &Path) -> io::Result<Self> {
        Ok(Self {
            buf: fs::read_to_string(path)?,
        })
    }

    /// Iterates over the valid entries of the store.
    pub fn iter(&self) -> impl Iterator<Item = UserEntry<'_>> {
        UserEntry::deserialize(&self.buf).filter_map(Result::ok)
    }

    /// Returns the entry matching the given login name.
    pub fn find(&self, name: &str) -> Option<UserEntry<'_>> {
        self.iter().find(|ent| ent.name == name)
    }
}

/// Writes the store file at path `path` with the entries `data`.
pub fn write<I: IntoIterator<Item = E>, E: fmt::Display>(path: &Path, data: I) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    for line in data {
        write!(file, "{}", line)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("secret").unwrap();
        assert!(check_password(&hash, "secret"));
        assert!(!check_password(&hash, "wrong"));
        assert!(!check_password("not a hash", "secret"));
    }

    #[test]
    fn entry_parsing() {
        let buf = "alice:$hash$:100:100\nbob:$h$:101:50\nbroken line\n";
        let entries: Vec<_> = UserEntry::deserialize(buf).collect();
        assert_eq!(entries.len(), 3);
        let alice = entries[0].as_ref().unwrap();
        assert_eq!(alice.name, "alice");
        assert_eq!(alice.uid, 100);
        assert_eq!(alice.gid, 100);
        assert!(entries[2].is_err());
    }

    #[test]
    fn store_roundtrip() {
        let path =
            std::env::temp_dir().join(format!("ext2fs-users-{}", uuid::Uuid::new_v4()));
        let hash = hash_password("pw").unwrap();
        let alice = UserEntry {
            name: "alice",
            password: &hash,
            uid: 100,
            gid: 100,
        };
        write(&path, [&alice]).unwrap();
        let store = UserStore::load(&path).unwrap();
        let ent = store.find("alice").unwrap();
        assert_eq!(ent.uid, 100);
        assert!(ent.check_password("pw"));
        assert!(!ent.check_password("nope"));
        assert!(store.find("bob").is_none());
        fs::remove_file(&path).unwrap();
    }
}
