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
};

use anyhow::{Result, bail};

use crate::{
    errors::WorkspaceError,
    hashing::{self, ExcludeSet},
    resource::{Resource, ResourceState, RestoreCheck, tree_excludes},
    vcs::GitRepo,
    workspace::config::{ResourceConfig, Role},
};

/// A resource stored as a subdirectory of the workspace's own repository.
/// The snapshot identity is the tree digest of the subdirectory; the
/// restore token is the workspace commit that captured it. Push and pull
/// piggy-back on the workspace repository, so both are no-ops here.
pub struct GitSubdirResource {
    name: String,
    role: Role,
    read_only: bool,
    repo: GitRepo,
    subpath: PathBuf,
    abs_path: PathBuf,
    excludes: ExcludeSet,
}

impl GitSubdirResource {
    pub fn new(config: &ResourceConfig, repo: GitRepo, subpath: PathBuf) -> Self {
        let abs_path = repo.workdir().join(&subpath);
        Self {
            name: config.name.clone(),
            role: config.role,
            read_only: config.read_only,
            repo,
            subpath,
            abs_path,
            excludes: tree_excludes(config),
        }
    }

    fn target_commit(&self, state: &ResourceState) -> Result<String> {
        state
            .token
            .as_ref()
            .and_then(|token| token.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                WorkspaceError::inconsistency(format!(
                    "snapshot of resource '{}' carries no commit token",
                    self.name
                ))
            })
    }

    /// Files currently on disk below the subdirectory, relative to the
    /// repository root.
    fn files_on_disk(&self) -> Result<BTreeSet<PathBuf>> {
        let mut files = BTreeSet::new();
        let (_, catalogue) = hashing::hash_tree_with_files(&self.abs_path, &self.excludes)?;
        for relative in catalogue.keys() {
            files.insert(self.subpath.join(relative));
        }
        Ok(files)
    }
}

impl Resource for GitSubdirResource {
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
        "git-subdir"
    }

    fn local_path(&self) -> Option<&Path> {
        Some(&self.abs_path)
    }

    fn state_fingerprint(&self) -> Result<String> {
        self.current_hash()
    }

    fn current_hash(&self) -> Result<String> {
        hashing::hash_tree(&self.abs_path, &self.excludes)
    }

    fn is_dirty(&self) -> Result<bool> {
        self.repo.is_dirty(Some(&self.subpath))
    }

    fn precheck_snapshot(&self) -> Result<()> {
        if !self.abs_path.is_dir() {
            bail!(WorkspaceError::precondition(format!(
                "resource '{}' is missing its directory '{}'",
                self.name,
                self.abs_path.display()
            )));
        }
        if self.repo.in_progress_operation() {
            bail!(WorkspaceError::precondition(
                "the workspace repository has a merge or rebase in progress",
            ));
        }
        Ok(())
    }

    fn snapshot(&mut self, message: &str) -> Result<ResourceState> {
        if !self.read_only && self.repo.is_dirty(Some(&self.subpath))? {
            self.repo.add(&self.subpath)?;
            self.repo.commit(message)?;
        }
        let hash = self.current_hash()?;
        let head = self.repo.head()?;
        Ok(ResourceState::with_token(
            hash,
            serde_json::Value::String(head),
        ))
    }

    fn precheck_restore(&self, state: &ResourceState) -> Result<RestoreCheck> {
        let commit = self.target_commit(state)?;
        if !self.repo.has_commit(&commit) {
            bail!(WorkspaceError::precondition_with_remedy(
                format!(
                    "the workspace repository does not have commit {} locally",
                    hashing::short(&commit)
                ),
                "run 'coati pull' to fetch it",
            ));
        }
        let dirty = self.is_dirty()?;
        Ok(RestoreCheck {
            already_at_target: !dirty && self.current_hash()? == state.hash,
            would_lose_work: dirty,
            detail: dirty.then(|| {
                format!("'{}' has uncommitted changes under '{}'", self.name, self.subpath.display())
            }),
        })
    }

    fn restore(&mut self, state: &ResourceState) -> Result<()> {
        let commit = self.target_commit(state)?;

        // Files recorded at the target commit, then everything currently on
        // disk that the target does not know about gets pruned.
        let recorded: BTreeSet<PathBuf> =
            self.repo.ls_tree(&commit, &self.subpath)?.into_iter().collect();

        self.repo.checkout_paths(&commit, &self.subpath)?;

        for on_disk in self.files_on_disk()? {
            if !recorded.contains(&on_disk) {
                std::fs::remove_file(self.repo.workdir().join(&on_disk))?;
            }
        }
        Ok(())
    }

    fn diff(&self, from: &ResourceState, to: &ResourceState) -> Result<Option<BTreeSet<String>>> {
        let from_commit = self.target_commit(from)?;
        let to_commit = self.target_commit(to)?;
        let changed =
            self.repo
                .diff_name_only(&from_commit, &to_commit, Some(&self.subpath))?;
        Ok(Some(changed.into_iter().collect()))
    }

    fn clone_to(&self, _target: &Path) -> Result<()> {
        // The subdirectory arrives with the workspace repository itself.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_workspace_repo(dir: &Path) -> Result<GitRepo> {
        let repo = GitRepo::new(dir);
        repo.init()?;
        repo.run(&["config", "user.email", "test@example.com"])?;
        repo.run(&["config", "user.name", "test"])?;
        std::fs::write(dir.join("README"), "workspace")?;
        repo.add_all()?;
        repo.commit("init")?;
        Ok(repo)
    }

    fn subdir_resource(repo: GitRepo) -> GitSubdirResource {
        GitSubdirResource::new(
            &ResourceConfig {
                name: "intermediate".to_string(),
                role: Role::IntermediateData,
                read_only: false,
                backend: crate::workspace::config::BackendConfig::GitSubdir {
                    subpath: PathBuf::from("mid"),
                },
            },
            repo,
            PathBuf::from("mid"),
        )
    }

    #[test]
    fn test_snapshot_and_restore_prunes_new_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = init_workspace_repo(dir.path())?;
        std::fs::create_dir(dir.path().join("mid"))?;
        std::fs::write(dir.path().join("mid/part.csv"), "1,2,3")?;

        let mut resource = subdir_resource(repo);
        resource.precheck_snapshot()?;
        let v1 = resource.snapshot("v1")?;

        std::fs::write(dir.path().join("mid/part.csv"), "4,5,6")?;
        std::fs::write(dir.path().join("mid/extra.csv"), "7")?;
        let v2 = resource.snapshot("v2")?;
        assert_ne!(v1.hash, v2.hash);

        resource.restore(&v1)?;
        assert_eq!(
            std::fs::read_to_string(dir.path().join("mid/part.csv"))?,
            "1,2,3"
        );
        assert!(!dir.path().join("mid/extra.csv").exists());
        assert_eq!(resource.current_hash()?, v1.hash);
        Ok(())
    }

    #[test]
    fn test_dirty_tracks_only_the_subdirectory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = init_workspace_repo(dir.path())?;
        std::fs::create_dir(dir.path().join("mid"))?;
        std::fs::write(dir.path().join("mid/part.csv"), "1")?;

        let mut resource = subdir_resource(repo);
        resource.snapshot("v1")?;
        assert!(!resource.is_dirty()?);

        // A change elsewhere in the workspace repo is not this resource's
        // dirt.
        std::fs::write(dir.path().join("README"), "changed")?;
        assert!(!resource.is_dirty()?);

        std::fs::write(dir.path().join("mid/part.csv"), "2")?;
        assert!(resource.is_dirty()?);
        Ok(())
    }
}
