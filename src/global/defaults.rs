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

use std::time::Duration;

// -- Display --
/// Display length for a snapshot hash prefix.
pub const SHORT_HASH_LEN: usize = 8;

// -- Sync --
/// Retry attempts for transient push/pull failures.
pub(crate) const SYNC_RETRY_ATTEMPTS: u32 = 3;
/// Base delay for the exponential backoff between retries.
pub(crate) const SYNC_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

// -- Results rotation --
/// File names kept in place when rotating a results resource.
pub(crate) const RESULTS_ROTATION_KEEP: &[&str] = &["README", "README.md", "README.txt"];

/// Subtree of a results resource that holds rotated per-snapshot results.
pub const RESULTS_SNAPSHOT_SUBDIR: &str = "snapshots";

// -- External tools --
pub(crate) const GIT_PROGRAM: &str = "git";
pub(crate) const RCLONE_PROGRAM: &str = "rclone";
pub(crate) const S3_PROGRAM: &str = "aws";
