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

use anyhow::{Context, Result, bail};
use serde::{Serialize, de::DeserializeOwned};

use crate::{errors::WorkspaceError, workspace::config::ResourceConfig};

pub const META_DIR: &str = ".dataworkspace";

pub(crate) const CONFIG_FILE: &str = "config.json";
pub(crate) const RESOURCES_FILE: &str = "resources.json";
pub(crate) const LOCAL_PARAMS_FILE: &str = "local_params.json";
pub(crate) const RESOURCE_LOCAL_PARAMS_FILE: &str = "resource_local_params.json";
pub(crate) const SNAPSHOTS_DIR: &str = "snapshots";
pub(crate) const HISTORY_FILE: &str = "snapshot_history.json";
pub(crate) const SNAPSHOT_LINEAGE_DIR: &str = "snapshot_lineage";
pub(crate) const CURRENT_LINEAGE_DIR: &str = "current_lineage";
pub(crate) const FILE_INDEX_DIR: &str = "file";
pub(crate) const SCRATCH_DIR: &str = "scratch";
pub(crate) const LOCK_FILE: &str = "lock";

/// Accessor for the JSON documents under the hidden metadata directory.
/// Every read validates the schema version where one is present; every
/// write goes to a temp file first and is renamed into place.
#[derive(Debug, Clone)]
pub struct Store {
    meta_dir: PathBuf,
}

impl Store {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            meta_dir: workspace_root.join(META_DIR),
        }
    }

    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    pub fn exists(&self) -> bool {
        self.meta_dir.is_dir()
    }

    pub fn config_path(&self) -> PathBuf {
        self.meta_dir.join(CONFIG_FILE)
    }

    pub fn resources_path(&self) -> PathBuf {
        self.meta_dir.join(RESOURCES_FILE)
    }

    pub fn local_params_path(&self) -> PathBuf {
        self.meta_dir.join(LOCAL_PARAMS_FILE)
    }

    pub fn resource_local_params_path(&self) -> PathBuf {
        self.meta_dir.join(RESOURCE_LOCAL_PARAMS_FILE)
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.meta_dir.join(SNAPSHOTS_DIR)
    }

    pub fn manifest_path(&self, hash: &str) -> PathBuf {
        self.snapshots_dir().join(format!("snapshot-{hash}.json"))
    }

    pub fn history_path(&self) -> PathBuf {
        self.snapshots_dir().join(HISTORY_FILE)
    }

    pub fn snapshot_lineage_root(&self) -> PathBuf {
        self.meta_dir.join(SNAPSHOT_LINEAGE_DIR)
    }

    pub fn snapshot_lineage_dir(&self, hash: &str) -> PathBuf {
        self.snapshot_lineage_root().join(hash)
    }

    pub fn current_lineage_dir(&self) -> PathBuf {
        self.meta_dir.join(CURRENT_LINEAGE_DIR)
    }

    pub fn file_index_dir(&self, resource: &str) -> PathBuf {
        self.meta_dir.join(FILE_INDEX_DIR).join(resource)
    }

    pub fn scratch_dir(&self, resource: &str) -> PathBuf {
        self.meta_dir.join(SCRATCH_DIR).join(resource)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.meta_dir.join(LOCK_FILE)
    }

    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let data = std::fs::read(path)
            .with_context(|| format!("Could not read '{}'", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("Could not parse '{}'", path.display()))
    }

    pub fn read_json_or<T: DeserializeOwned>(&self, path: &Path, fallback: T) -> Result<T> {
        if !path.exists() {
            return Ok(fallback);
        }
        self.read_json(path)
    }

    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let data = serde_json::to_vec_pretty(value)?;
        self.write_bytes(path, &data)
    }

    /// Atomic write: the temp file lands in the same directory so the
    /// rename never crosses a filesystem boundary.
    pub fn write_bytes(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create '{}'", parent.display()))?;
        }
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, data)
            .with_context(|| format!("Could not write '{}'", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("Could not move '{}' into place", tmp_path.display()))?;
        Ok(())
    }

    pub fn read_catalogue(&self) -> Result<Vec<ResourceConfig>> {
        let catalogue: Vec<ResourceConfig> =
            self.read_json_or(&self.resources_path(), Vec::new())?;
        let mut seen = std::collections::BTreeSet::new();
        for resource in &catalogue {
            if !seen.insert(resource.name.as_str()) {
                return Err(WorkspaceError::inconsistency(format!(
                    "catalogue lists resource '{}' twice",
                    resource.name
                )));
            }
        }
        Ok(catalogue)
    }

    /// Mutate the catalogue as one transactional batch: the update closure
    /// works on a copy, and the file is rewritten once on success.
    pub fn update_catalogue(
        &self,
        update: impl FnOnce(&mut Vec<ResourceConfig>) -> Result<()>,
    ) -> Result<Vec<ResourceConfig>> {
        let mut catalogue = self.read_catalogue()?;
        update(&mut catalogue)?;
        self.write_json(&self.resources_path(), &catalogue)?;
        Ok(catalogue)
    }

    /// Validate a document's schema version against what this build writes.
    pub fn check_schema_version(&self, found: u32, document: &str) -> Result<()> {
        if found != crate::workspace::config::SCHEMA_VERSION {
            bail!(WorkspaceError::inconsistency(format!(
                "{document} has schema version {found}, this build expects {}",
                crate::workspace::config::SCHEMA_VERSION
            )));
        }
        Ok(())
    }
}
