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

//! Mode bits and the access check protocol.

/// Type representing a file mode.
pub type Mode = u16;
/// Type representing a user ID.
pub type Uid = u16;
/// Type representing a group ID.
pub type Gid = u16;

/// User: Read, Write and Execute.
pub const S_IRWXU: Mode = 0o0700;
/// User: Read.
pub const S_IRUSR: Mode = 0o0400;
/// User: Write.
pub const S_IWUSR: Mode = 0o0200;
/// User: Execute.
pub const S_IXUSR: Mode = 0o0100;
/// Group: Read, Write and Execute.
pub const S_IRWXG: Mode = 0o0070;
/// Group: Read.
pub const S_IRGRP: Mode = 0o0040;
/// Group: Write.
pub const S_IWGRP: Mode = 0o0020;
/// Group: Execute.
pub const S_IXGRP: Mode = 0o0010;
/// Other: Read, Write and Execute.
pub const S_IRWXO: Mode = 0o0007;
/// Other: Read.
pub const S_IROTH: Mode = 0o0004;
/// Other: Write.
pub const S_IWOTH: Mode = 0o0002;
/// Other: Execute.
pub const S_IXOTH: Mode = 0o0001;
/// Setuid.
pub const S_ISUID: Mode = 0o4000;
/// Setgid.
pub const S_ISGID: Mode = 0o2000;
/// Sticky bit.
pub const S_ISVTX: Mode = 0o1000;

/// Requested access: read.
pub const ACCESS_READ: Mode = 0o4;
/// Requested access: write.
pub const ACCESS_WRITE: Mode = 0o2;
/// Requested access: execute/traverse.
pub const ACCESS_EXEC: Mode = 0o1;

/// Default permissions given to new directories.
pub const DEFAULT_DIR_MODE: Mode = S_IRWXU | S_IRGRP | S_IXGRP | S_IROTH | S_IXOTH;
/// Default permissions given to new regular files.
pub const DEFAULT_FILE_MODE: Mode = S_IRUSR | S_IWUSR | S_IRGRP | S_IROTH;

/// Selects the relevant permission triplet of `mode` for the given user and
/// checks every bit of `access` against it.
///
/// Owner matching takes precedence over group matching. uid 0 receives no
/// special treatment.
pub fn check_permission(
    mode: Mode,
    file_uid: Uid,
    file_gid: Gid,
    uid: Uid,
    gid: Gid,
    access: Mode,
) -> bool {
    let triplet = if uid == file_uid {
        (mode >> 6) & 0o7
    } else if gid == file_gid {
        (mode >> 3) & 0o7
    } else {
        mode & 0o7
    };
    triplet & access == access
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn triplet_selection() {
        // rwx for the owner only
        let mode = S_IRWXU;
        for access in [ACCESS_READ, ACCESS_WRITE, ACCESS_EXEC] {
            assert!(check_permission(mode, 100, 100, 100, 100, access));
            assert!(!check_permission(mode, 100, 100, 101, 100, access));
            assert!(!check_permission(mode, 100, 100, 101, 101, access));
        }
    }

    #[test]
    fn owner_over_group() {
        // Owner triplet applies even when the group also matches and grants
        // more than the owner's.
        let mode = S_IRUSR | S_IRWXG;
        assert!(!check_permission(mode, 100, 100, 100, 100, ACCESS_WRITE));
        assert!(check_permission(mode, 101, 100, 100, 100, ACCESS_WRITE));
    }

    #[test]
    fn no_root_override() {
        let mode = 0o000;
        assert!(!check_permission(mode, 100, 100, 0, 0, ACCESS_READ));
    }

    #[test]
    fn multi_bit_access() {
        let mode = 0o640;
        assert!(check_permission(mode, 1, 1, 1, 1, ACCESS_READ | ACCESS_WRITE));
        assert!(check_permission(mode, 1, 1, 2, 1, ACCESS_READ));
        assert!(!check_permission(mode, 1, 1, 2, 1, ACCESS_READ | ACCESS_WRITE));
        assert!(!check_permission(mode, 1, 1, 2, 2, ACCESS_READ));
    }
}
