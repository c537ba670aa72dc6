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

use anyhow::{Context, Result, bail};

use crate::{
    errors::WorkspaceError,
    hashing::{self, ExcludeSet},
    resource::{Resource, ResourceState, RestoreCheck, file_index::FileIndex, tree_excludes},
    workspace::config::{ResourceConfig, Role},
};

/// A locally managed directory with no remote. The snapshot identity is the
/// tree digest; restore re-materialises files from the per-resource blob
/// index kept under the metadata directory.
pub struct LocalFilesResource {
    name: String,
    role: Role,
    read_only: bool,
    path: PathBuf,
    index: FileIndex,
    excludes: ExcludeSet,
}

impl LocalFilesResource {
    pub fn new(config: &ResourceConfig, path: PathBuf, index_dir: PathBuf) -> Self {
        Self {
            name: config.name.clone(),
            role: config.role,
            read_only: config.read_only,
            path,
            index: FileIndex::new(index_dir),
            excludes: tree_excludes(config),
        }
    }
}

impl Resource for LocalFilesResource {
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
        "local-files"
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
        match self.index.last_recorded_hash() {
            Some(recorded) => Ok(self.current_hash()? != recorded),
            // Nothing captured yet: any content counts as uncaptured work.
            None => {
                let (_, files) = hashing::hash_tree_with_files(&self.path, &self.excludes)?;
                Ok(!files.is_empty())
            }
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
        Ok(())
    }

    fn snapshot(&mut self, _message: &str) -> Result<ResourceState> {
        if self.read_only {
            return Ok(ResourceState::new(self.current_hash()?));
        }
        let hash = self
            .index
            .record(&self.path, &self.excludes)
            .with_context(|| format!("Could not index resource '{}'", self.name))?;
        Ok(ResourceState::new(hash))
    }

    fn precheck_restore(&self, state: &ResourceState) -> Result<RestoreCheck> {
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
            detail: dirty.then(|| format!("'{}' has uncaptured local changes", self.name)),
        })
    }

    fn restore(&mut self, state: &ResourceState) -> Result<()> {
        self.index.restore(&self.path, &state.hash, &self.excludes)
    }

    fn diff(&self, from: &ResourceState, to: &ResourceState) -> Result<Option<BTreeSet<String>>> {
        Ok(Some(self.index.diff(&from.hash, &to.hash)?))
    }

    fn clone_to(&self, target: &Path) -> Result<()> {
        // No remote holds this data; a fresh clone starts with an empty
        // directory until files are copied in by hand.
        std::fs::create_dir_all(target)
            .with_context(|| format!("Could not create '{}'", target.display()))?;
        crate::ui::cli::warning!(
            "resource '{}' has no remote; populate '{}' manually",
            self.name,
            target.display()
        );
        Ok(())
    }
}
