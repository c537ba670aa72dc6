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

pub mod bucket;
pub mod file_index;
pub mod git;
pub mod git_subdir;
pub mod local;
pub mod rclone;

use std::{collections::BTreeSet, path::Path};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{
    global::defaults::RESULTS_SNAPSHOT_SUBDIR,
    hashing::ExcludeSet,
    workspace::{
        Workspace,
        config::{BackendConfig, ResourceConfig, Role},
    },
};

/// The captured state of one resource: its content hash plus whatever the
/// backend needs later to reproduce that exact state. The token is opaque
/// to the engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<serde_json::Value>,
}

impl ResourceState {
    pub fn new(hash: String) -> Self {
        Self { hash, token: None }
    }

    pub fn with_token(hash: String, token: serde_json::Value) -> Self {
        Self {
            hash,
            token: Some(token),
        }
    }
}

/// Result of a restore precheck.
#[derive(Debug, Clone, Default)]
pub struct RestoreCheck {
    /// The resource already matches the target state; restore is a no-op.
    pub already_at_target: bool,
    /// Restoring would discard local content that is not captured anywhere.
    pub would_lose_work: bool,
    pub detail: Option<String>,
}

/// Read-only view over a backend without local materialisation, pinned to
/// a selectable snapshot context. Queried by feature test; most backends
/// have real files on disk instead.
pub trait FilesystemView {
    /// Pin the view to a snapshot hash, or back to the live state.
    fn set_snapshot(&mut self, hash: Option<&str>) -> Result<()>;
    fn ls(&self, prefix: &str) -> Result<Vec<String>>;
    fn open(&self, key: &str) -> Result<Vec<u8>>;
}

/// Uniform operations over one resource, dispatched polymorphically by the
/// engines. Backends without a remote inherit the no-op push/pull; optional
/// capabilities are feature-tested, never "not supported" errors.
pub trait Resource {
    fn name(&self) -> &str;
    fn role(&self) -> Role;
    fn read_only(&self) -> bool;
    fn kind(&self) -> &'static str;

    /// The local directory holding this resource's files, when the backend
    /// materialises them.
    fn local_path(&self) -> Option<&Path>;

    /// Cheap fingerprint of the live state. The engines read it once at
    /// precheck and again before mutating; a mismatch means an external
    /// writer interfered and the operation is aborted.
    fn state_fingerprint(&self) -> Result<String>;

    fn current_hash(&self) -> Result<String>;

    /// True when local content differs from the last captured state.
    fn is_dirty(&self) -> Result<bool>;

    /// Verify a snapshot can succeed. Must not mutate user state.
    fn precheck_snapshot(&self) -> Result<()>;

    /// Capture the current state, performing any backend-specific commit
    /// work, and return its stable identifier.
    fn snapshot(&mut self, message: &str) -> Result<ResourceState>;

    /// Verify the state behind `state` is reachable locally without data
    /// loss. Must not mutate user state.
    fn precheck_restore(&self, state: &ResourceState) -> Result<RestoreCheck>;

    /// Move local state to match `state`.
    fn restore(&mut self, state: &ResourceState) -> Result<()>;

    /// Paths that changed between two captured states, when the backend can
    /// tell. `None` means the comparison is not supported.
    fn diff(&self, _from: &ResourceState, _to: &ResourceState) -> Result<Option<BTreeSet<String>>> {
        Ok(None)
    }

    /// Verify a push can succeed without forced overwrites. Must not
    /// mutate user state. No-op for backends without a remote.
    fn precheck_push(&self) -> Result<()> {
        Ok(())
    }

    /// Synchronise with the resource's own remote. No-op without one.
    fn push(&mut self) -> Result<()> {
        Ok(())
    }

    /// Must not be called on a resource that has no remote; the default is
    /// a no-op so such backends need no boilerplate.
    fn pull(&mut self) -> Result<()> {
        Ok(())
    }

    /// Re-materialise this resource at `target` on a fresh clone.
    fn clone_to(&self, target: &Path) -> Result<()>;

    fn filesystem_view(&self) -> Option<Box<dyn FilesystemView + '_>> {
        None
    }
}

/// Exclude set applied whenever this resource's tree is walked: VCS
/// internals always, plus the rotated results subtree for a results
/// resource, which keeps the content address stable as results accumulate.
pub fn tree_excludes(config: &ResourceConfig) -> ExcludeSet {
    let mut excludes = ExcludeSet::new([".git"]);
    if config.role == Role::Results {
        excludes.insert(RESULTS_SNAPSHOT_SUBDIR);
    }
    excludes
}

/// Build the adaptor for one catalogue entry.
pub fn build(workspace: &Workspace, config: &ResourceConfig) -> Result<Box<dyn Resource>> {
    let adaptor: Box<dyn Resource> = match &config.backend {
        BackendConfig::Git { remote, branch } => Box::new(git::GitResource::new(
            config,
            workspace.resource_path(&config.name)?,
            remote.clone(),
            branch.clone(),
        )),
        BackendConfig::GitSubdir { subpath } => Box::new(git_subdir::GitSubdirResource::new(
            config,
            workspace.repo().clone(),
            subpath.clone(),
        )),
        BackendConfig::LocalFiles {} => Box::new(local::LocalFilesResource::new(
            config,
            workspace.resource_path(&config.name)?,
            workspace.store().file_index_dir(&config.name),
        )),
        BackendConfig::Rclone {
            remote,
            mode,
            direction,
            config_path,
        } => Box::new(rclone::RcloneResource::new(
            config,
            workspace.resource_path(&config.name)?,
            workspace.store().file_index_dir(&config.name),
            remote.clone(),
            *mode,
            *direction,
            config_path.clone(),
        )),
        BackendConfig::Bucket {
            bucket,
            prefix,
            region,
        } => Box::new(bucket::BucketResource::new(
            config,
            Box::new(bucket::CliObjectStore::new(
                bucket.clone(),
                prefix.clone(),
                region.clone(),
            )),
            workspace.store().scratch_dir(&config.name),
        )),
    };
    Ok(adaptor)
}

/// Build every adaptor in catalogue order.
pub fn build_all(workspace: &Workspace) -> Result<Vec<Box<dyn Resource>>> {
    workspace
        .catalogue()
        .iter()
        .map(|config| build(workspace, config))
        .collect()
}
