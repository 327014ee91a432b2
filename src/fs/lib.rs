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

//! Core of an ext2-style filesystem simulator operating on a fixed-size disk
//! image file.
//!
//! The image is divided into fixed-size blocks:
//! - Block 0: superblock
//! - Block 1: block usage bitmap
//! - Block 2: inode usage bitmap
//! - Blocks 3..19: inode table
//! - Blocks 19..1024: file content
//!
//! A [`volume::Volume`] ties together the image file, the cached superblock
//! and bitmaps, the open-file table and the logged-in user. Every mutation is
//! written through to the image before the operation returns.

pub mod device;
pub mod dir;
pub mod dirent;
pub mod error;
pub mod file;
pub mod inode;
pub mod mapping;
pub mod open_file;
pub mod path;
pub mod perm;
pub mod prompt;
pub mod session;
pub mod superblock;
pub mod users;
pub mod util;
pub mod volume;

pub use error::{Error, Result};
pub use volume::Volume;

/// The size of a block in bytes, the unit of all image I/O.
pub const BLOCK_SIZE: usize = 1024;
/// The total number of blocks on a volume.
pub const BLOCK_COUNT: u32 = 1024;
/// The total number of inode records on a volume.
pub const INODE_COUNT: u32 = 128;
/// The size of an on-disk inode record in bytes.
pub const INODE_SIZE: usize = 128;

/// The filesystem's signature.
pub const EXT2_SIGNATURE: u16 = 0xef53;

/// The inode of the root directory.
pub const ROOT_INODE: u32 = 2;

/// The block holding the block usage bitmap.
pub const BLOCK_BITMAP_BLOCK: u32 = 1;
/// The block holding the inode usage bitmap.
pub const INODE_BITMAP_BLOCK: u32 = 2;
/// The first block of the inode table.
pub const INODE_TABLE_BLOCK: u32 = 3;
/// The number of blocks spanned by the inode table.
pub const INODE_TABLE_BLOCKS: u32 =
    ((INODE_COUNT as usize * INODE_SIZE + BLOCK_SIZE - 1) / BLOCK_SIZE) as u32;
/// The first block available for file content.
pub const FIRST_DATA_BLOCK: u32 = INODE_TABLE_BLOCK + INODE_TABLE_BLOCKS;
