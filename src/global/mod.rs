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

pub mod defaults;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::commands::GlobalArgs;

static QUIET: AtomicBool = AtomicBool::new(false);
static VERBOSE: AtomicBool = AtomicBool::new(false);
static BATCH: AtomicBool = AtomicBool::new(false);

/// Install the process-wide output options from the parsed CLI arguments.
/// These only steer console output and prompting; everything else is
/// threaded through the workspace handle.
pub fn set_global_opts_with_args(args: &GlobalArgs) {
    QUIET.store(args.quiet, Ordering::Relaxed);
    VERBOSE.store(args.verbose, Ordering::Relaxed);
    BATCH.store(args.batch, Ordering::Relaxed);
}

pub fn quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// In batch mode no prompt is ever issued. Operations that would have asked
/// for confirmation refuse instead.
pub fn batch() -> bool {
    BATCH.load(Ordering::Relaxed)
}
