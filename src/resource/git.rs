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
    hashing,
    resource::{Resource, ResourceState, RestoreCheck},
    vcs::GitRepo,
    workspace::config::{ResourceConfig, Role},
};

/// A resource that is a Git repository of its own. The snapshot identity is
/// the HEAD commit hash after pending changes are auto-committed, and the
/// commit is also the restore token.
pub struct GitResource {
    name: String,
    role: Role,
    read_only: bool,
    path: PathBuf,
    repo: GitRepo,
    remote: Option<String>,
    branch: Option<String>,
}

impl GitResource {
    pub fn new(
        config: &ResourceConfig,
        path: PathBuf,
        remote: Option<String>,
        branch: Option<String>,
    ) -> Self {
        let repo = GitRepo::new(&path);
        Self {
            name: config.name.clone(),
            role: config.role,
            read_only: config.read_only,
            path,
            repo,
            remote,
            branch,
        }
    }

    fn target_commit(state: &ResourceState) -> String {
        state
            .token
            .as_ref()
            .and_then(|token| token.as_str())
            .unwrap_or(&state.hash)
            .to_string()
    }

    fn branch(&self) -> Result<String> {
        match &self.branch {
            Some(branch) => Ok(branch.clone()),
            None => self.repo.current_branch(),
        }
    }

    fn remote_name(&self) -> Option<&'static str> {
        // The catalogue carries a URL; the local clone always names it
        // 'origin'.
        self.remote.as_ref().map(|_| "origin")
    }
}

impl Resource for GitResource {
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
        "git"
    }

    fn local_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn state_fingerprint(&self) -> Result<String> {
        let head = if self.repo.has_commits() {
            self.repo.head()?
        } else {
            "unborn".to_string()
        };
        let status = self.repo.status_porcelain(None)?.join("\n");
        Ok(hashing::hash_bytes(format!("{head}\n{status}").as_bytes()))
    }

    fn current_hash(&self) -> Result<String> {
        if !self.repo.has_commits() {
            bail!("repository at '{}' has no commits yet", self.path.display());
        }
        self.repo.head()
    }

    fn is_dirty(&self) -> Result<bool> {
        self.repo.is_dirty(None)
    }

    fn precheck_snapshot(&self) -> Result<()> {
        if !self.repo.is_repo() {
            bail!(WorkspaceError::precondition(format!(
                "resource '{}' is not a Git repository at '{}'",
                self.name,
                self.path.display()
            )));
        }
        if self.repo.in_progress_operation() {
            bail!(WorkspaceError::precondition(format!(
                "resource '{}' has a merge or rebase in progress",
                self.name
            )));
        }
        if !self.read_only && !self.repo.has_commits() && !self.repo.is_dirty(None)? {
            bail!(WorkspaceError::precondition(format!(
                "resource '{}' has no content to snapshot",
                self.name
            )));
        }
        Ok(())
    }

    fn snapshot(&mut self, message: &str) -> Result<ResourceState> {
        if !self.read_only && self.repo.is_dirty(None)? {
            self.repo.add_all()?;
            self.repo.commit(message)?;
        }
        let head = self.current_hash()?;
        Ok(ResourceState::with_token(
            head.clone(),
            serde_json::Value::String(head),
        ))
    }

    fn precheck_restore(&self, state: &ResourceState) -> Result<RestoreCheck> {
        let commit = Self::target_commit(state);
        if !self.repo.has_commit(&commit) {
            bail!(WorkspaceError::precondition_with_remedy(
                format!(
                    "resource '{}' does not have commit {} locally",
                    self.name,
                    hashing::short(&commit)
                ),
                "run 'coati pull' to fetch it",
            ));
        }
        let dirty = self.is_dirty()?;
        Ok(RestoreCheck {
            already_at_target: !dirty && self.repo.head()? == commit,
            would_lose_work: dirty,
            detail: dirty.then(|| format!("'{}' has uncommitted changes", self.name)),
        })
    }

    fn restore(&mut self, state: &ResourceState) -> Result<()> {
        // Destructive of the working copy; the precheck guards it.
        self.repo.reset_hard(&Self::target_commit(state))
    }

    fn diff(&self, from: &ResourceState, to: &ResourceState) -> Result<Option<BTreeSet<String>>> {
        let changed = self.repo.diff_name_only(
            &Self::target_commit(from),
            &Self::target_commit(to),
            None,
        )?;
        Ok(Some(changed.into_iter().collect()))
    }

    fn precheck_push(&self) -> Result<()> {
        let Some(remote) = self.remote_name() else {
            return Ok(());
        };
        let branch = self.branch()?;
        self.repo.fetch(remote)?;
        if self.repo.commits_behind_remote(remote, &branch)? > 0 {
            bail!(WorkspaceError::precondition_with_remedy(
                format!(
                    "remote of resource '{}' has commits this clone does not",
                    self.name
                ),
                "run 'coati pull' first",
            ));
        }
        Ok(())
    }

    fn push(&mut self) -> Result<()> {
        let Some(remote) = self.remote_name() else {
            return Ok(());
        };
        let branch = self.branch()?;
        self.repo.push(remote, &branch)
    }

    fn pull(&mut self) -> Result<()> {
        let Some(remote) = self.remote_name() else {
            return Ok(());
        };
        let branch = self.branch()?;
        self.repo
            .run(&["pull", "--quiet", "--ff-only", remote, &branch])?;
        Ok(())
    }

    fn clone_to(&self, target: &Path) -> Result<()> {
        let Some(url) = &self.remote else {
            bail!(WorkspaceError::precondition(format!(
                "resource '{}' has no remote to clone from",
                self.name
            )));
        };
        let clone = GitRepo::clone_from(url, target)?;
        if let Some(branch) = &self.branch {
            clone.run(&["checkout", "--quiet", branch])?;
        }
        Ok(())
    }
}
