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

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::WorkspaceError;

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    hostname: String,
    acquired: DateTime<Utc>,
}

/// Advisory per-workspace lock. The metadata directory is not safe for
/// concurrent invocations against the same workspace; the lock is acquired
/// at operation start and released on drop. An existing lock is reported
/// with its holder but never broken automatically.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
}

impl WorkspaceLock {
    pub fn acquire(path: PathBuf, hostname: &str) -> Result<Self> {
        let mut open_options = std::fs::OpenOptions::new();
        open_options.write(true).create_new(true);

        match open_options.open(&path) {
            Ok(mut file) => {
                let info = LockInfo {
                    pid: std::process::id(),
                    hostname: hostname.to_string(),
                    acquired: Utc::now(),
                };
                file.write_all(serde_json::to_string_pretty(&info)?.as_bytes())
                    .with_context(|| format!("Could not write '{}'", path.display()))?;
                Ok(Self { path })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = std::fs::read(&path)
                    .ok()
                    .and_then(|data| serde_json::from_slice::<LockInfo>(&data).ok());
                let message = match holder {
                    Some(info) => format!(
                        "workspace is locked by pid {} on '{}' since {}",
                        info.pid,
                        info.hostname,
                        info.acquired.format("%Y-%m-%d %H:%M:%S UTC")
                    ),
                    None => "workspace is locked by another invocation".to_string(),
                };
                Err(WorkspaceError::precondition_with_remedy(
                    message,
                    format!(
                        "if that process is gone, remove '{}' and retry",
                        path.display()
                    ),
                ))
            }
            Err(err) => Err(err)
                .with_context(|| format!("Could not create lock '{}'", path.display())),
        }
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
