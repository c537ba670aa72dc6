// coati is a version control tool for data science projects
// Copyright (C) 2025  The coati authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::Result;
use dialoguer::{Confirm, Input};

#[macro_export]
macro_rules! log {
    () => {
        if !$crate::global::quiet() {
            println!();
        }
    };
    ($($arg:tt)*) => {
        if !$crate::global::quiet() {
            println!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {
        if $crate::global::verbose() && !$crate::global::quiet() {
            println!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => {
        if !$crate::global::quiet() {
            eprintln!("{} {}", ::colored::Colorize::bold(::colored::Colorize::yellow("warning:")), format_args!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        eprintln!("{} {}", ::colored::Colorize::bold(::colored::Colorize::red("error:")), format_args!($($arg)*));
    };
}

pub use error;
pub use log;
pub use verbose;
pub use warning;

/// Ask for a yes/no confirmation. Returns `default` without prompting in
/// batch mode.
pub(crate) fn confirm(prompt: &str, default: bool) -> Result<bool> {
    if crate::global::batch() {
        return Ok(default);
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?)
}

/// Ask for a line of input with a default value. Returns the default
/// without prompting in batch mode.
pub(crate) fn input_with_default(prompt: &str, default: String) -> Result<String> {
    if crate::global::batch() {
        return Ok(default);
    }
    Ok(Input::new()
        .with_prompt(prompt)
        .default(default)
        .interact_text()?)
}
