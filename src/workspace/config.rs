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

use std::{collections::BTreeMap, fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

/// `config.json`: workspace-global shared state, versioned by the backing
/// repository together with the catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub schema_version: u32,
    pub name: String,
    pub created: DateTime<Utc>,
    /// Template for the per-snapshot results subtree, rendered below
    /// `snapshots/`. Placeholders: {DAY}, {DATE_TIME}, {USER}, {TAG},
    /// {HOSTNAME}.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_subdir_template: Option<String>,
    /// Free-form workspace parameters captured into every snapshot
    /// manifest.
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// `local_params.json`: per-clone state, never versioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalParams {
    pub schema_version: u32,
    pub hostname: String,
}

/// One entry of `resource_local_params.json`: where a resource lives on
/// this clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLocalParams {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    SourceData,
    IntermediateData,
    Code,
    Results,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::SourceData => "source-data",
            Role::IntermediateData => "intermediate-data",
            Role::Code => "code",
            Role::Results => "results",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    Copy,
    Sync,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Copy => write!(f, "copy"),
            SyncMode::Sync => write!(f, "sync"),
        }
    }
}

/// Which side of an externally synchronised resource holds the truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    RemoteIsMaster,
    LocalIsMaster,
}

/// Backend-specific shared parameters, tagged by backend kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum BackendConfig {
    /// A Git repository of its own, managed by this tool.
    Git {
        #[serde(skip_serializing_if = "Option::is_none")]
        remote: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
    /// A subdirectory of the workspace's own repository.
    GitSubdir { subpath: PathBuf },
    /// A locally managed directory with no remote of its own.
    LocalFiles {},
    /// A directory mirrored to a remote store by an external sync tool.
    Rclone {
        remote: String,
        mode: SyncMode,
        direction: SyncDirection,
        #[serde(skip_serializing_if = "Option::is_none")]
        config_path: Option<PathBuf>,
    },
    /// An object-store bucket with server-side versioning.
    Bucket {
        bucket: String,
        #[serde(default)]
        prefix: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Git { .. } => "git",
            BackendConfig::GitSubdir { .. } => "git-subdir",
            BackendConfig::LocalFiles {} => "local-files",
            BackendConfig::Rclone { .. } => "rclone",
            BackendConfig::Bucket { .. } => "bucket",
        }
    }

    /// Whether this backend materialises its files in a local directory.
    pub fn has_local_files(&self) -> bool {
        !matches!(self, BackendConfig::Bucket { .. })
    }
}

/// One entry of the shared catalogue (`resources.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub read_only: bool,
    #[serde(flatten)]
    pub backend: BackendConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_config_tagged_roundtrip() {
        let config = ResourceConfig {
            name: "raw".to_string(),
            role: Role::SourceData,
            read_only: true,
            backend: BackendConfig::Rclone {
                remote: "backup:raw".to_string(),
                mode: SyncMode::Sync,
                direction: SyncDirection::RemoteIsMaster,
                config_path: None,
            },
        };

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"backend\":\"rclone\""));
        assert!(json.contains("\"role\":\"source-data\""));

        let parsed: ResourceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.name, "raw");
        assert!(matches!(
            parsed.backend,
            BackendConfig::Rclone {
                direction: SyncDirection::RemoteIsMaster,
                ..
            }
        ));
    }

    #[test]
    fn test_read_only_defaults_to_false() {
        let json = r#"{"name":"code","role":"code","backend":"git-subdir","subpath":"src"}"#;
        let parsed: ResourceConfig = serde_json::from_str(json).unwrap();
        assert!(!parsed.read_only);
        assert_eq!(parsed.backend.kind(), "git-subdir");
    }
}
