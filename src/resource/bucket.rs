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
    collections::{BTreeMap, BTreeSet},
    io::{Read, Write},
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, bail};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde::Deserialize;

use crate::{
    errors::{SubprocessFailure, WorkspaceError},
    global::defaults::S3_PROGRAM,
    hashing,
    resource::{FilesystemView, Resource, ResourceState, RestoreCheck},
    workspace::config::{ResourceConfig, Role},
};

const MANIFESTS_PREFIX: &str = ".snapshots/";
const MARKER_FILE: &str = "current_snapshot";

/// Narrow interface onto a versioned object store. Keys are relative to
/// the resource's configured prefix.
pub trait ObjectStore {
    /// Latest version id per live key.
    fn list_versions(&self) -> Result<BTreeMap<String, String>>;
    fn get(&self, key: &str, version: Option<&str>) -> Result<Vec<u8>>;
    fn put(&self, key: &str, data: &[u8]) -> Result<()>;
}

/// Object store driven through the vendor CLI as an opaque subprocess.
pub struct CliObjectStore {
    bucket: String,
    prefix: String,
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListedVersion {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "VersionId")]
    version_id: String,
    #[serde(rename = "IsLatest")]
    is_latest: bool,
}

#[derive(Debug, Deserialize)]
struct ListVersionsDoc {
    #[serde(rename = "Versions", default)]
    versions: Vec<ListedVersion>,
}

impl CliObjectStore {
    pub fn new(bucket: String, prefix: String, region: Option<String>) -> Self {
        Self {
            bucket,
            prefix,
            region,
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let mut command = Command::new(S3_PROGRAM);
        command.args(["s3api"]).args(args);
        if let Some(region) = &self.region {
            command.args(["--region", region]);
        }
        let output = command
            .output()
            .with_context(|| format!("Could not run '{S3_PROGRAM}'. Is it installed?"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let lowered = stderr.to_lowercase();
            let transient = ["connection", "timeout", "throttl", "temporar"]
                .iter()
                .any(|needle| lowered.contains(needle));
            bail!(anyhow::Error::new(SubprocessFailure {
                program: S3_PROGRAM.to_string(),
                status: output
                    .status
                    .code()
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                detail: stderr,
                transient,
            })
            .context(format!("{S3_PROGRAM} s3api {}", args.first().unwrap_or(&""))));
        }
        Ok(output.stdout)
    }

    fn temp_file(&self, label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("coati-{}-{label}", std::process::id()))
    }
}

impl ObjectStore for CliObjectStore {
    fn list_versions(&self) -> Result<BTreeMap<String, String>> {
        let stdout = self.run(&[
            "list-object-versions",
            "--bucket",
            &self.bucket,
            "--prefix",
            &self.prefix,
            "--output",
            "json",
        ])?;
        let doc: ListVersionsDoc = serde_json::from_slice(&stdout)
            .with_context(|| "Could not parse the object-version listing")?;

        let mut latest = BTreeMap::new();
        for version in doc.versions {
            if !version.is_latest {
                continue;
            }
            if let Some(relative) = version.key.strip_prefix(&self.prefix) {
                latest.insert(relative.to_string(), version.version_id);
            }
        }
        Ok(latest)
    }

    fn get(&self, key: &str, version: Option<&str>) -> Result<Vec<u8>> {
        let out_path = self.temp_file("get");
        let full_key = self.full_key(key);
        let out_str = out_path.to_string_lossy().into_owned();
        let mut args = vec![
            "get-object",
            "--bucket",
            &self.bucket,
            "--key",
            &full_key,
        ];
        if let Some(version) = version {
            args.push("--version-id");
            args.push(version);
        }
        args.push(&out_str);
        self.run(&args)?;

        let data = std::fs::read(&out_path)?;
        let _ = std::fs::remove_file(&out_path);
        Ok(data)
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let body_path = self.temp_file("put");
        std::fs::write(&body_path, data)?;
        let full_key = self.full_key(key);
        let body_arg = format!("fileb://{}", body_path.display());
        let result = self.run(&[
            "put-object",
            "--bucket",
            &self.bucket,
            "--key",
            &full_key,
            "--body",
            &body_arg,
        ]);
        let _ = std::fs::remove_file(&body_path);
        result.map(|_| ())
    }
}

/// An object-store bucket with server-side versioning. The snapshot
/// identity digests the `{key -> version-id}` manifest; the manifest is
/// written back into the bucket gzipped and cached locally. Restore only
/// moves a local marker, which the filesystem view honours; the server
/// retains every version, so push and pull have nothing to transfer.
pub struct BucketResource {
    name: String,
    role: Role,
    read_only: bool,
    store: Box<dyn ObjectStore>,
    cache_dir: PathBuf,
}

impl BucketResource {
    pub fn new(config: &ResourceConfig, store: Box<dyn ObjectStore>, cache_dir: PathBuf) -> Self {
        Self {
            name: config.name.clone(),
            role: config.role,
            read_only: config.read_only,
            store,
            cache_dir,
        }
    }

    fn marker_path(&self) -> PathBuf {
        self.cache_dir.join(MARKER_FILE)
    }

    fn cached_manifest_path(&self, hash: &str) -> PathBuf {
        self.cache_dir.join("manifests").join(format!("{hash}.json"))
    }

    fn manifest_key(hash: &str) -> String {
        format!("{MANIFESTS_PREFIX}{hash}.json.gz")
    }

    /// The live content manifest, with the manifest objects themselves
    /// filtered out.
    fn live_manifest(&self) -> Result<BTreeMap<String, String>> {
        let mut manifest = self.store.list_versions()?;
        manifest.retain(|key, _| !key.starts_with(MANIFESTS_PREFIX));
        Ok(manifest)
    }

    fn manifest_hash(manifest: &BTreeMap<String, String>) -> Result<String> {
        Ok(hashing::hash_bytes(&serde_json::to_vec(manifest)?))
    }

    fn cache_manifest(&self, hash: &str, manifest: &BTreeMap<String, String>) -> Result<()> {
        let path = self.cached_manifest_path(hash);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_vec_pretty(manifest)?)?;
        Ok(())
    }

    fn load_manifest(&self, hash: &str) -> Result<BTreeMap<String, String>> {
        let cached = self.cached_manifest_path(hash);
        if cached.exists() {
            let data = std::fs::read(&cached)?;
            return Ok(serde_json::from_slice(&data)?);
        }

        let compressed = self
            .store
            .get(&Self::manifest_key(hash), None)
            .with_context(|| {
                format!(
                    "no manifest for state {} of resource '{}' in the bucket",
                    hashing::short(hash),
                    self.name
                )
            })?;
        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw)?;
        let manifest = serde_json::from_slice(&raw)?;
        self.cache_manifest(hash, &manifest)?;
        Ok(manifest)
    }
}

impl Resource for BucketResource {
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
        "bucket"
    }

    fn local_path(&self) -> Option<&Path> {
        None
    }

    fn state_fingerprint(&self) -> Result<String> {
        self.current_hash()
    }

    fn current_hash(&self) -> Result<String> {
        Self::manifest_hash(&self.live_manifest()?)
    }

    fn is_dirty(&self) -> Result<bool> {
        // The server keeps every version; there is no uncaptured local work.
        Ok(false)
    }

    fn precheck_snapshot(&self) -> Result<()> {
        self.live_manifest().map(|_| ()).map_err(|err| {
            WorkspaceError::precondition(format!(
                "bucket of resource '{}' is not reachable: {err:#}",
                self.name
            ))
        })
    }

    fn snapshot(&mut self, _message: &str) -> Result<ResourceState> {
        let manifest = self.live_manifest()?;
        let hash = Self::manifest_hash(&manifest)?;

        self.cache_manifest(&hash, &manifest)?;
        if !self.read_only {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&serde_json::to_vec(&manifest)?)?;
            self.store.put(&Self::manifest_key(&hash), &encoder.finish()?)?;
        }

        Ok(ResourceState::new(hash))
    }

    fn precheck_restore(&self, state: &ResourceState) -> Result<RestoreCheck> {
        self.load_manifest(&state.hash)
            .map_err(|err| WorkspaceError::precondition(format!("{err:#}")))?;
        let active = std::fs::read_to_string(self.marker_path()).ok();
        Ok(RestoreCheck {
            already_at_target: active.as_deref() == Some(state.hash.as_str()),
            would_lose_work: false,
            detail: None,
        })
    }

    fn restore(&mut self, state: &ResourceState) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        std::fs::write(self.marker_path(), &state.hash)
            .with_context(|| format!("Could not activate snapshot for '{}'", self.name))?;
        Ok(())
    }

    fn diff(&self, from: &ResourceState, to: &ResourceState) -> Result<Option<BTreeSet<String>>> {
        let from_manifest = self.load_manifest(&from.hash)?;
        let to_manifest = self.load_manifest(&to.hash)?;

        let mut changed = BTreeSet::new();
        for (key, version) in &from_manifest {
            if to_manifest.get(key) != Some(version) {
                changed.insert(key.clone());
            }
        }
        for key in to_manifest.keys() {
            if !from_manifest.contains_key(key) {
                changed.insert(key.clone());
            }
        }
        Ok(Some(changed))
    }

    fn pull(&mut self) -> Result<()> {
        // Refresh the local manifest cache; the data itself lives on the
        // server.
        for key in self.store.list_versions()?.keys() {
            if let Some(rest) = key.strip_prefix(MANIFESTS_PREFIX) {
                if let Some(hash) = rest.strip_suffix(".json.gz") {
                    if !self.cached_manifest_path(hash).exists() {
                        let _ = self.load_manifest(hash);
                    }
                }
            }
        }
        Ok(())
    }

    fn clone_to(&self, _target: &Path) -> Result<()> {
        // Nothing is materialised locally; the filesystem view reads
        // straight from the bucket.
        Ok(())
    }

    fn filesystem_view(&self) -> Option<Box<dyn FilesystemView + '_>> {
        let pinned = std::fs::read_to_string(self.marker_path())
            .ok()
            .and_then(|hash| self.load_manifest(hash.trim()).ok());
        Some(Box::new(BucketView {
            resource: self,
            pinned,
        }))
    }
}

/// `ls`/`open` over a bucket resource. Honours the local current-snapshot
/// marker by default; `set_snapshot` re-pins it explicitly.
struct BucketView<'a> {
    resource: &'a BucketResource,
    pinned: Option<BTreeMap<String, String>>,
}

impl FilesystemView for BucketView<'_> {
    fn set_snapshot(&mut self, hash: Option<&str>) -> Result<()> {
        self.pinned = match hash {
            Some(hash) => Some(self.resource.load_manifest(hash)?),
            None => None,
        };
        Ok(())
    }

    fn ls(&self, prefix: &str) -> Result<Vec<String>> {
        let keys: Vec<String> = match &self.pinned {
            Some(manifest) => manifest.keys().cloned().collect(),
            None => self.resource.live_manifest()?.keys().cloned().collect(),
        };
        Ok(keys
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    fn open(&self, key: &str) -> Result<Vec<u8>> {
        match &self.pinned {
            Some(manifest) => {
                let version = manifest.get(key).ok_or_else(|| {
                    WorkspaceError::usage(format!(
                        "'{key}' does not exist in the selected snapshot"
                    ))
                })?;
                self.resource.store.get(key, Some(version))
            }
            None => self.resource.store.get(key, None),
        }
    }
}
