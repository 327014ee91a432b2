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

//! Terminal prompting for the interactive shell.

use libc::{ECHO, ECHOE, ICANON, STDIN_FILENO, TCSANOW, VMIN, tcgetattr, tcsetattr, termios};
use std::io::BufRead;
use std::io::Write;
use std::mem::MaybeUninit;
use std::{fmt, io};

/// Restores the saved terminal state when dropped.
struct TermiosGuard(termios);

impl TermiosGuard {
    /// Disables input echo, returning a guard restoring the previous state.
    fn hide_input() -> Self {
        let saved = unsafe {
            let mut t: termios = MaybeUninit::zeroed().assume_init();
            tcgetattr(STDIN_FILENO, &mut t);
            t
        };
        let mut hidden = saved;
        hidden.c_lflag &= !(ICANON | ECHO | ECHOE);
        hidden.c_cc[VMIN] = 1;
        unsafe {
            tcsetattr(STDIN_FILENO, TCSANOW, &hidden);
        }
        Self(saved)
    }
}

impl Drop for TermiosGuard {
    fn drop(&mut self) {
        unsafe {
            tcsetattr(STDIN_FILENO, TCSANOW, &self.0);
        }
    }
}

// TODO Add line edition
/// Shows a prompt and reads one line from the standard input.
///
/// Arguments:
/// - `prompt` is the prompt's text.
/// - `hidden` tells whether the input is hidden (for passwords).
///
/// Returns `None` when the input is closed.
pub fn prompt<P: fmt::Display>(prompt: P, hidden: bool) -> Option<String> {
    let guard = hidden.then(TermiosGuard::hide_input);
    print!("{prompt}");
    let _ = io::stdout().flush();
    let input = io::stdin().lock().lines().next()?.unwrap_or_default();
    if guard.is_some() {
        println!();
    }
    Some(input)
}
