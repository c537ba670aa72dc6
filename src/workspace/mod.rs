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

pub mod config;
pub mod lock;
pub mod store;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use chrono::Utc;

use crate::{
    errors::WorkspaceError,
    vcs::GitRepo,
    workspace::{
        config::{
            LocalParams, ResourceConfig, ResourceLocalParams, SCHEMA_VERSION, WorkspaceConfig,
        },
        lock::WorkspaceLock,
        store::{META_DIR, Store},
    },
};

/// Entries under the metadata directory that belong to this clone only and
/// must never reach the backing repository.
const META_GITIGNORE: &str = "\
local_params.json
resource_local_params.json
current_lineage/
file/
scratch/
lock
*.tmp
";

/// Handle on an opened workspace: the root directory, the parsed shared and
/// local documents, and the backing repository. Process-wide inputs such as
/// the hostname are read once at load time and live here.
pub struct Workspace {
    root: PathBuf,
    store: Store,
    repo: GitRepo,
    config: WorkspaceConfig,
    catalogue: Vec<ResourceConfig>,
    local: LocalParams,
    resource_local: BTreeMap<String, ResourceLocalParams>,
}

impl Workspace {
    /// Create a new workspace rooted at `root`. Initialises the backing
    /// repository when `root` is not already one.
    pub fn init(root: &Path, name: &str, hostname: &str) -> Result<Self> {
        let store = Store::new(root);
        if store.exists() {
            bail!(WorkspaceError::precondition(format!(
                "'{}' already contains a workspace",
                root.display()
            )));
        }

        let repo = GitRepo::new(root);
        if !repo.is_repo() {
            repo.init()?;
        }

        std::fs::create_dir_all(store.meta_dir())
            .with_context(|| format!("Could not create '{}'", store.meta_dir().display()))?;
        std::fs::write(store.meta_dir().join(".gitignore"), META_GITIGNORE)?;

        let config = WorkspaceConfig {
            schema_version: SCHEMA_VERSION,
            name: name.to_string(),
            created: Utc::now(),
            results_subdir_template: None,
            params: BTreeMap::new(),
        };
        let local = LocalParams {
            schema_version: SCHEMA_VERSION,
            hostname: hostname.to_string(),
        };

        store.write_json(&store.config_path(), &config)?;
        store.write_json(&store.resources_path(), &Vec::<ResourceConfig>::new())?;
        store.write_json(&store.local_params_path(), &local)?;
        store.write_json(
            &store.resource_local_params_path(),
            &BTreeMap::<String, ResourceLocalParams>::new(),
        )?;

        let workspace = Self {
            root: root.to_path_buf(),
            store,
            repo,
            config,
            catalogue: Vec::new(),
            local,
            resource_local: BTreeMap::new(),
        };
        workspace.commit_metadata(&format!("Initialize workspace '{name}'"))?;
        Ok(workspace)
    }

    /// Open the workspace containing `start_dir`, searching upward.
    pub fn open(start_dir: &Path) -> Result<Self> {
        let root = Self::find_root(start_dir).ok_or_else(|| {
            WorkspaceError::precondition_with_remedy(
                format!("no workspace found at or above '{}'", start_dir.display()),
                "run 'coati init' to create one",
            )
        })?;
        Self::open_root(&root)
    }

    /// Open a workspace whose root directory is known.
    pub fn open_root(root: &Path) -> Result<Self> {
        let store = Store::new(root);
        if !store.exists() {
            bail!(WorkspaceError::precondition(format!(
                "'{}' is not a workspace root",
                root.display()
            )));
        }

        let config: WorkspaceConfig = store.read_json(&store.config_path())?;
        store.check_schema_version(config.schema_version, "config.json")?;

        let local: LocalParams = store.read_json(&store.local_params_path()).map_err(|_| {
            WorkspaceError::precondition_with_remedy(
                "this clone has no local parameters",
                "run 'coati clone' to set up a clone, or re-run 'coati init'",
            )
        })?;
        store.check_schema_version(local.schema_version, "local_params.json")?;

        let catalogue = store.read_catalogue()?;
        let resource_local: BTreeMap<String, ResourceLocalParams> =
            store.read_json_or(&store.resource_local_params_path(), BTreeMap::new())?;

        Ok(Self {
            root: root.to_path_buf(),
            store,
            repo: GitRepo::new(root),
            config,
            catalogue,
            local,
            resource_local,
        })
    }

    pub fn find_root(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);
        while let Some(dir) = current {
            if dir.join(META_DIR).is_dir() {
                return Some(dir.to_path_buf());
            }
            current = dir.parent();
        }
        None
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn repo(&self) -> &GitRepo {
        &self.repo
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn hostname(&self) -> &str {
        &self.local.hostname
    }

    /// Shared resource configs in catalogue order, which is also the
    /// processing order of every engine.
    pub fn catalogue(&self) -> &[ResourceConfig] {
        &self.catalogue
    }

    pub fn resource(&self, name: &str) -> Result<&ResourceConfig> {
        self.catalogue
            .iter()
            .find(|resource| resource.name == name)
            .ok_or_else(|| WorkspaceError::usage(format!("unknown resource '{name}'")))
    }

    /// Absolute on-disk path of a resource on this clone. Every catalogue
    /// entry must have one; a missing entry means the clone is incomplete.
    pub fn resource_path(&self, name: &str) -> Result<PathBuf> {
        let params = self.resource_local.get(name).ok_or_else(|| {
            WorkspaceError::precondition_with_remedy(
                format!("resource '{name}' has no local path on this clone"),
                "run 'coati clone' again or add the path to resource_local_params.json",
            )
        })?;
        if params.path.is_absolute() {
            Ok(params.path.clone())
        } else {
            Ok(self.root.join(&params.path))
        }
    }

    pub fn set_resource_path(&mut self, name: &str, path: PathBuf) -> Result<()> {
        self.resource_local
            .insert(name.to_string(), ResourceLocalParams { path });
        self.store.write_json(
            &self.store.resource_local_params_path(),
            &self.resource_local,
        )
    }

    /// Add a resource to the catalogue, enforcing name uniqueness and the
    /// no-overlap rule for on-disk paths.
    pub fn add_resource(&mut self, resource: ResourceConfig, local_path: PathBuf) -> Result<()> {
        if self.catalogue.iter().any(|r| r.name == resource.name) {
            bail!(WorkspaceError::usage(format!(
                "a resource named '{}' already exists",
                resource.name
            )));
        }

        if resource.backend.has_local_files() {
            let new_path = normalise(&self.root, &local_path);
            for existing in &self.catalogue {
                if !existing.backend.has_local_files() {
                    continue;
                }
                let existing_path = normalise(&self.root, &self.resource_path(&existing.name)?);
                if new_path == existing_path
                    || new_path.starts_with(&existing_path)
                    || existing_path.starts_with(&new_path)
                {
                    bail!(WorkspaceError::usage(format!(
                        "path '{}' overlaps resource '{}' at '{}'",
                        new_path.display(),
                        existing.name,
                        existing_path.display()
                    )));
                }
            }
        }

        let name = resource.name.clone();
        self.catalogue = self.store.update_catalogue(|catalogue| {
            catalogue.push(resource);
            Ok(())
        })?;
        self.set_resource_path(&name, local_path)?;
        Ok(())
    }

    /// Re-read the shared documents after they changed underneath us, as
    /// after a pull.
    pub fn reload_shared(&mut self) -> Result<()> {
        self.config = self.store.read_json(&self.store.config_path())?;
        self.store
            .check_schema_version(self.config.schema_version, "config.json")?;
        self.catalogue = self.store.read_catalogue()?;
        Ok(())
    }

    pub fn lock(&self) -> Result<WorkspaceLock> {
        WorkspaceLock::acquire(self.store.lock_path(), self.hostname())
    }

    /// Commit the shared metadata documents to the backing repository.
    /// Returns false when nothing changed.
    pub fn commit_metadata(&self, message: &str) -> Result<bool> {
        self.repo.add(Path::new(META_DIR))?;
        self.repo.commit(message)
    }
}

fn normalise(root: &Path, path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    absolute.components().collect()
}

#[cfg(test)]
mod tests {
    use crate::workspace::config::{BackendConfig, Role};

    use super::*;

    fn test_workspace(dir: &Path) -> Result<Workspace> {
        let repo = GitRepo::new(dir);
        repo.init()?;
        repo.run(&["config", "user.email", "test@example.com"])?;
        repo.run(&["config", "user.name", "test"])?;
        Workspace::init(dir, "demo", "testhost")
    }

    fn local_resource(name: &str) -> ResourceConfig {
        ResourceConfig {
            name: name.to_string(),
            role: Role::SourceData,
            read_only: false,
            backend: BackendConfig::LocalFiles {},
        }
    }

    #[test]
    fn test_init_and_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let workspace = test_workspace(dir.path())?;
        assert_eq!(workspace.name(), "demo");
        assert_eq!(workspace.hostname(), "testhost");

        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested)?;
        let reopened = Workspace::open(&nested)?;
        assert_eq!(reopened.name(), "demo");
        Ok(())
    }

    #[test]
    fn test_add_resource_rejects_overlapping_paths() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut workspace = test_workspace(dir.path())?;

        std::fs::create_dir_all(dir.path().join("data/raw"))?;
        workspace.add_resource(local_resource("data"), dir.path().join("data"))?;

        // Same path, containment in either direction, and duplicate names
        // are all refused.
        let same = workspace.add_resource(local_resource("other"), dir.path().join("data"));
        assert!(same.is_err());
        let nested = workspace.add_resource(local_resource("raw"), dir.path().join("data/raw"));
        assert!(nested.is_err());
        let duplicate = workspace.add_resource(local_resource("data"), dir.path().join("elsewhere"));
        assert!(duplicate.is_err());
        Ok(())
    }

    #[test]
    fn test_local_params_stay_out_of_vcs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let workspace = test_workspace(dir.path())?;

        // The initial commit exists and leaves the clone clean; the ignored
        // local documents do not show up as untracked.
        assert!(workspace.repo().has_commits());
        assert!(!workspace.repo().is_dirty(None)?);
        assert!(workspace.store().local_params_path().exists());
        Ok(())
    }
}
