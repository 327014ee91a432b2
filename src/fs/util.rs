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

//! Utility functions shared across the filesystem core.

use std::mem::size_of;
use std::slice;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current timestamp since the Unix epoch.
pub fn get_timestamp() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System clock panic!")
}

/// Returns the current timestamp in seconds, truncated to the on-disk width.
pub fn timestamp_secs() -> u32 {
    get_timestamp().as_secs() as u32
}

/// Computes the ceiling of the division of `a` by `b`.
pub fn ceil_division(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

/// Rounds `n` up to the next multiple of 4.
pub fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Reinterprets the given object as a byte slice.
pub fn reinterpret<T>(obj: &T) -> &[u8] {
    unsafe { slice::from_raw_parts(obj as *const _ as *const u8, size_of::<T>()) }
}

/// Reads an object of the given type from the beginning of `buf`.
///
/// # Safety
///
/// Every bit pattern of `buf` must be a valid value of `T`.
pub unsafe fn read_struct<T>(buf: &[u8]) -> T {
    debug_assert!(buf.len() >= size_of::<T>());
    unsafe { (buf.as_ptr() as *const T).read_unaligned() }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn align() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(9), 12);
        assert_eq!(align4(12), 12);
    }

    #[test]
    fn ceil() {
        assert_eq!(ceil_division(0, 1024), 0);
        assert_eq!(ceil_division(1, 1024), 1);
        assert_eq!(ceil_division(1024, 1024), 1);
        assert_eq!(ceil_division(1025, 1024), 2);
    }
}
