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

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, bail};

use crate::{
    errors::{SubprocessFailure, WorkspaceError},
    global::defaults::RCLONE_PROGRAM,
    hashing::{self, ExcludeSet},
    resource::{Resource, ResourceState, RestoreCheck, file_index::FileIndex, tree_excludes},
    ui,
    workspace::config::{ResourceConfig, Role, SyncDirection, SyncMode},
};

/// Narrow adaptor over the external sync tool. The tool's home-directory
/// configuration applies unless the catalogue pins a config file.
#[derive(Debug, Clone)]
pub struct RcloneRunner {
    config_path: Option<PathBuf>,
}

impl RcloneRunner {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    pub fn available(&self) -> bool {
        Command::new(RCLONE_PROGRAM)
            .arg("version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Copy or mirror `from` into `to`. Either side may be a local path or
    /// a remote spec.
    pub fn transfer(&self, mode: SyncMode, from: &str, to: &str) -> Result<()> {
        let verb = match mode {
            SyncMode::Copy => "copy",
            SyncMode::Sync => "sync",
        };
        let mut command = Command::new(RCLONE_PROGRAM);
        if let Some(config) = &self.config_path {
            command.arg("--config").arg(config);
        }
        let output = command
            .args([verb, from, to])
            .output()
            .with_context(|| format!("Could not run '{RCLONE_PROGRAM}'. Is it installed?"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let lowered = stderr.to_lowercase();
            let transient = ["connection", "timeout", "temporar", "retry"]
                .iter()
                .any(|needle| lowered.contains(needle));
            bail!(anyhow::Error::new(SubprocessFailure {
                program: RCLONE_PROGRAM.to_string(),
                status: output
                    .status
                    .code()
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                detail: stderr,
                transient,
            })
            .context(format!("{RCLONE_PROGRAM} {verb} {from} {to}")));
        }
        Ok(())
    }
}

/// A directory mirrored to a remote store by the external sync tool. The
/// configured direction decides which side holds the truth: when the
/// remote is master, restore re-syncs from it; when the local copy is
/// master, restores come from the blob index like a plain local resource.
pub struct RcloneResource {
    name: String,
    role: Role,
    read_only: bool,
    path: PathBuf,
    remote: String,
    mode: SyncMode,
    direction: SyncDirection,
    runner: RcloneRunner,
    index: FileIndex,
    excludes: ExcludeSet,
}

impl RcloneResource {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &ResourceConfig,
        path: PathBuf,
        index_dir: PathBuf,
        remote: String,
        mode: SyncMode,
        direction: SyncDirection,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            role: config.role,
            read_only: config.read_only,
            path,
            remote,
            mode,
            direction,
            runner: RcloneRunner::new(config_path),
            index: FileIndex::new(index_dir),
            excludes: tree_excludes(config),
        }
    }

    fn local_spec(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

impl Resource for RcloneResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Role {
        self.role
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn kind(&self) -> &'static str {
        "rclone"
    }

    fn local_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn state_fingerprint(&self) -> Result<String> {
        self.current_hash()
    }

    fn current_hash(&self) -> Result<String> {
        hashing::hash_tree(&self.path, &self.excludes)
    }

    fn is_dirty(&self) -> Result<bool> {
        match self.direction {
            // The local copy is only a mirror; its drift is resolved by the
            // next sync, not counted as uncaptured work.
            SyncDirection::RemoteIsMaster => Ok(false),
            SyncDirection::LocalIsMaster => match self.index.last_recorded_hash() {
                Some(recorded) => Ok(self.current_hash()? != recorded),
                None => {
                    let (_, files) =
                        hashing::hash_tree_with_files(&self.path, &self.excludes)?;
                    Ok(!files.is_empty())
                }
            },
        }
    }

    fn precheck_snapshot(&self) -> Result<()> {
        if !self.path.is_dir() {
            bail!(WorkspaceError::precondition(format!(
                "resource '{}' is missing its directory '{}'",
                self.name,
                self.path.display()
            )));
        }
        if !self.runner.available() {
            bail!(WorkspaceError::precondition_with_remedy(
                format!(
                    "resource '{}' needs '{RCLONE_PROGRAM}', which was not found",
                    self.name
                ),
                format!("install '{RCLONE_PROGRAM}' and make sure it is on PATH"),
            ));
        }
        Ok(())
    }

    fn snapshot(&mut self, _message: &str) -> Result<ResourceState> {
        if self.read_only {
            return Ok(ResourceState::new(self.current_hash()?));
        }
        match self.direction {
            SyncDirection::RemoteIsMaster => {
                self.runner
                    .transfer(self.mode, &self.remote, &self.local_spec())?;
                Ok(ResourceState::new(self.current_hash()?))
            }
            SyncDirection::LocalIsMaster => {
                let hash = self.index.record(&self.path, &self.excludes)?;
                Ok(ResourceState::new(hash))
            }
        }
    }

    fn precheck_restore(&self, state: &ResourceState) -> Result<RestoreCheck> {
        match self.direction {
            SyncDirection::RemoteIsMaster => {
                if !self.runner.available() {
                    bail!(WorkspaceError::precondition(format!(
                        "restoring resource '{}' needs '{RCLONE_PROGRAM}'",
                        self.name
                    )));
                }
                Ok(RestoreCheck {
                    already_at_target: self.current_hash()? == state.hash,
                    would_lose_work: false,
                    detail: None,
                })
            }
            SyncDirection::LocalIsMaster => {
                if !self.index.has_catalogue(&state.hash) {
                    bail!(WorkspaceError::precondition(format!(
                        "no file catalogue for state {} of resource '{}' exists on this clone",
                        hashing::short(&state.hash),
                        self.name
                    )));
                }
                self.index
                    .verify(&state.hash)
                    .map_err(|err| WorkspaceError::inconsistency(format!("{err:#}")))?;
                let current = self.current_hash()?;
                let dirty = self.is_dirty()?;
                Ok(RestoreCheck {
                    already_at_target: current == state.hash,
                    would_lose_work: dirty && current != state.hash,
                    detail: dirty.then(|| {
                        format!("'{}' has uncaptured local changes", self.name)
                    }),
                })
            }
        }
    }

    fn restore(&mut self, state: &ResourceState) -> Result<()> {
        match self.direction {
            SyncDirection::RemoteIsMaster => {
                self.runner
                    .transfer(SyncMode::Sync, &self.remote, &self.local_spec())?;
                let current = self.current_hash()?;
                if current != state.hash {
                    ui::cli::warning!(
                        "resource '{}' re-synced from its remote, but the remote has moved on \
                         (got {}, snapshot was {})",
                        self.name,
                        hashing::short(&current),
                        hashing::short(&state.hash)
                    );
                }
                Ok(())
            }
            SyncDirection::LocalIsMaster => {
                self.index.restore(&self.path, &state.hash, &self.excludes)
            }
        }
    }

    fn diff(&self, from: &ResourceState, to: &ResourceState) -> Result<Option<BTreeSet<String>>> {
        match self.direction {
            SyncDirection::LocalIsMaster => Ok(Some(self.index.diff(&from.hash, &to.hash)?)),
            SyncDirection::RemoteIsMaster => Ok(None),
        }
    }

    fn push(&mut self) -> Result<()> {
        if self.read_only || self.direction == SyncDirection::RemoteIsMaster {
            return Ok(());
        }
        self.runner
            .transfer(self.mode, &self.local_spec(), &self.remote)
    }

    fn pull(&mut self) -> Result<()> {
        if self.direction == SyncDirection::LocalIsMaster {
            return Ok(());
        }
        self.runner
            .transfer(self.mode, &self.remote, &self.local_spec())
    }

    fn clone_to(&self, target: &Path) -> Result<()> {
        std::fs::create_dir_all(target)
            .with_context(|| format!("Could not create '{}'", target.display()))?;
        self.runner.transfer(
            SyncMode::Copy,
            &self.remote,
            &target.to_string_lossy(),
        )
    }
}
