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

//! Error kinds surfaced by filesystem operations.

use std::fmt::Formatter;
use std::{error, fmt, io};

/// An error occurring during a filesystem operation.
#[derive(Debug)]
pub enum Error {
    /// An I/O fault from the underlying image file.
    Io(io::Error),
    /// A block access outside of the volume bounds.
    IoOutOfRange,
    /// The image does not carry a valid filesystem.
    BadFormat,
    /// No volume is mounted.
    NotMounted,
    /// A volume is already mounted.
    AlreadyMounted,
    /// The operation requires a logged-in user.
    NotAuthenticated,
    /// The mode bits deny the requested access.
    PermissionDenied,
    /// The path does not resolve to an existing file.
    NotFound,
    /// The name already exists in the directory.
    Exists,
    /// A directory operation was attempted on a non-directory.
    NotADirectory,
    /// A file operation was attempted on a directory.
    IsADirectory,
    /// The operation requires a regular file.
    NotARegularFile,
    /// The directory still contains entries.
    NotEmpty,
    /// The volume has no free block or inode left.
    NoSpace,
    /// Malformed argument (path, flags or size).
    InvalidArgument,
    /// The file descriptor does not match an open file, or its access mode
    /// does not allow the operation.
    BadFd,
    /// The logical block index is beyond single-indirect reach.
    RangeError,
}

/// The result of a filesystem operation.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "input/output error: {e}"),
            Self::IoOutOfRange => write!(f, "block number out of range"),
            Self::BadFormat => write!(f, "invalid or corrupted filesystem image"),
            Self::NotMounted => write!(f, "no mounted volume"),
            Self::AlreadyMounted => write!(f, "a volume is already mounted"),
            Self::NotAuthenticated => write!(f, "not logged in"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::NotFound => write!(f, "no such file or directory"),
            Self::Exists => write!(f, "file exists"),
            Self::NotADirectory => write!(f, "not a directory"),
            Self::IsADirectory => write!(f, "is a directory"),
            Self::NotARegularFile => write!(f, "not a regular file"),
            Self::NotEmpty => write!(f, "directory not empty"),
            Self::NoSpace => write!(f, "no space left on volume"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::BadFd => write!(f, "bad file descriptor"),
            Self::RangeError => write!(f, "block index out of reach"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
