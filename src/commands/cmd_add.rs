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

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};

use crate::{
    errors::WorkspaceError,
    ui,
    vcs::GitRepo,
    workspace::{
        config::{BackendConfig, ResourceConfig, Role, SyncDirection, SyncMode},
        store::META_DIR,
    },
};

use super::{GlobalArgs, open_workspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Git,
    GitSubdir,
    LocalFiles,
    Rclone,
    Bucket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Master {
    Local,
    Remote,
}

impl std::fmt::Display for Master {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Master::Local => write!(f, "local"),
            Master::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Args, Debug)]
#[clap(about = "Add a resource to the workspace catalogue")]
pub struct CmdArgs {
    /// Storage backend of the resource
    #[clap(value_enum)]
    pub backend: BackendKind,

    /// On-disk path; not used by the bucket backend
    #[clap(value_parser)]
    pub path: Option<PathBuf>,

    /// Role of the resource
    #[clap(long, value_enum)]
    pub role: Role,

    /// Resource name; defaults to the last path component
    #[clap(long, value_parser)]
    pub name: Option<String>,

    /// Never write to this resource
    #[clap(long, default_value_t = false)]
    pub read_only: bool,

    /// Remote URL (git) or remote spec (rclone)
    #[clap(long, value_parser)]
    pub remote: Option<String>,

    /// Branch to track (git)
    #[clap(long, value_parser)]
    pub branch: Option<String>,

    /// Transfer mode for the external sync tool
    #[clap(long, value_enum, default_value_t = SyncMode::Copy)]
    pub mode: SyncMode,

    /// Which side of an externally synced resource holds the truth
    #[clap(long, value_enum, default_value_t = Master::Remote)]
    pub master: Master,

    /// Per-resource config file for the external sync tool
    #[clap(long, value_parser)]
    pub sync_config: Option<PathBuf>,

    /// Bucket name (bucket backend)
    #[clap(long, value_parser)]
    pub bucket: Option<String>,

    /// Key prefix inside the bucket
    #[clap(long, value_parser, default_value = "")]
    pub prefix: String,

    /// Bucket region
    #[clap(long, value_parser)]
    pub region: Option<String>,
}

pub fn run(global_args: &GlobalArgs, args: &CmdArgs) -> Result<()> {
    let mut workspace = open_workspace(global_args)?;
    let _lock = workspace.lock()?;

    let (backend, local_path, default_name) = match args.backend {
        BackendKind::Git => {
            let path = required_path(args)?;
            if !path.join(".git").exists() {
                match (&args.remote, path.exists()) {
                    (Some(remote), false) => {
                        GitRepo::clone_from(remote, &path)?;
                    }
                    (None, _) => bail!(WorkspaceError::precondition(format!(
                        "'{}' is not a Git repository and no --remote was given",
                        path.display()
                    ))),
                    (Some(_), true) => bail!(WorkspaceError::precondition(format!(
                        "'{}' exists but is not a Git repository",
                        path.display()
                    ))),
                }
            }
            (
                BackendConfig::Git {
                    remote: args.remote.clone(),
                    branch: args.branch.clone(),
                },
                path.clone(),
                name_from_path(&path),
            )
        }
        BackendKind::GitSubdir => {
            let path = required_path(args)?;
            let subpath = path
                .strip_prefix(workspace.root())
                .map(Path::to_path_buf)
                .or_else(|_| {
                    // A relative path is taken relative to the root.
                    if path.is_relative() {
                        Ok(path.clone())
                    } else {
                        Err(WorkspaceError::usage(format!(
                            "'{}' is not inside the workspace root",
                            path.display()
                        )))
                    }
                })?;
            std::fs::create_dir_all(workspace.root().join(&subpath))?;
            (
                BackendConfig::GitSubdir {
                    subpath: subpath.clone(),
                },
                subpath.clone(),
                name_from_path(&subpath),
            )
        }
        BackendKind::LocalFiles => {
            let path = required_path(args)?;
            std::fs::create_dir_all(&path)?;
            (BackendConfig::LocalFiles {}, path.clone(), name_from_path(&path))
        }
        BackendKind::Rclone => {
            let path = required_path(args)?;
            let remote = args.remote.clone().ok_or_else(|| {
                WorkspaceError::usage("the rclone backend needs --remote <remote:path>")
            })?;
            std::fs::create_dir_all(&path)?;
            (
                BackendConfig::Rclone {
                    remote,
                    mode: args.mode,
                    direction: match args.master {
                        Master::Local => SyncDirection::LocalIsMaster,
                        Master::Remote => SyncDirection::RemoteIsMaster,
                    },
                    config_path: args.sync_config.clone(),
                },
                path.clone(),
                name_from_path(&path),
            )
        }
        BackendKind::Bucket => {
            let bucket = args.bucket.clone().ok_or_else(|| {
                WorkspaceError::usage("the bucket backend needs --bucket <name>")
            })?;
            if args.role == Role::Results {
                bail!(WorkspaceError::usage(
                    "a bucket resource has no local files to rotate and cannot hold results",
                ));
            }
            let default_name = bucket.clone();
            let name = args.name.clone().unwrap_or_else(|| default_name.clone());
            let scratch = Path::new(META_DIR).join("scratch").join(&name);
            (
                BackendConfig::Bucket {
                    bucket,
                    prefix: args.prefix.clone(),
                    region: args.region.clone(),
                },
                scratch,
                default_name,
            )
        }
    };

    let name = args.name.clone().unwrap_or(default_name);
    let config = ResourceConfig {
        name: name.clone(),
        role: args.role,
        read_only: args.read_only,
        backend,
    };
    workspace.add_resource(config, local_path)?;
    workspace.commit_metadata(&format!("Add resource '{name}'"))?;

    ui::cli::log!("Added {} resource '{}'", args.role, name);
    Ok(())
}

fn required_path(args: &CmdArgs) -> Result<PathBuf> {
    args.path
        .clone()
        .ok_or_else(|| WorkspaceError::usage("this backend needs a path argument"))
}

fn name_from_path(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "resource".to_string())
}
