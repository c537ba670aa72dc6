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
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::WorkspaceError,
    hashing,
    lineage::store::LineageStore,
    plan::{Action, Plan},
    resource::{self, ResourceState},
    results,
    ui,
    workspace::{Workspace, config::Role, store::Store},
};

/// One resource's line in a snapshot manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestResource {
    pub name: String,
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<serde_json::Value>,
}

/// The canonical manifest. Keys serialise in declaration order and the
/// snapshot identity is the SHA-1 of exactly the serialised bytes, so the
/// same workspace state always produces the same 40-hex identity.
/// `lineage_dir` names the relative directory family holding frozen
/// lineage; the concrete subdirectory is always the snapshot hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub workspace: String,
    pub params: BTreeMap<String, serde_json::Value>,
    pub resources: Vec<ManifestResource>,
    pub lineage_dir: String,
}

impl SnapshotManifest {
    pub fn serialise(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn identity(&self) -> Result<String> {
        Ok(hashing::hash_bytes(&self.serialise()?))
    }

    pub fn resource(&self, name: &str) -> Option<&ManifestResource> {
        self.resources.iter().find(|entry| entry.name == name)
    }

    pub fn state_of(&self, name: &str) -> Option<ResourceState> {
        self.resource(name).map(|entry| ResourceState {
            hash: entry.hash.clone(),
            token: entry.token.clone(),
        })
    }
}

/// One line of `snapshot_history.json`, ordered oldest-first in the file
/// and reversed for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub hash: String,
    pub tags: Vec<String>,
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

pub fn read_history(store: &Store) -> Result<Vec<HistoryEntry>> {
    store.read_json_or(&store.history_path(), Vec::new())
}

pub fn write_history(store: &Store, history: &[HistoryEntry]) -> Result<()> {
    store.write_json(&store.history_path(), &history)
}

pub fn append_history(store: &Store, entry: HistoryEntry) -> Result<()> {
    let mut history = read_history(store)?;
    history.push(entry);
    write_history(store, &history)
}

pub fn load_manifest(store: &Store, hash: &str) -> Result<SnapshotManifest> {
    store
        .read_json(&store.manifest_path(hash))
        .with_context(|| format!("no manifest for snapshot {}", hashing::short(hash)))
}

#[derive(Debug, Default)]
pub struct SnapshotOptions {
    pub tag: Option<String>,
    pub message: String,
    pub skip: BTreeSet<String>,
    pub force_tag: bool,
}

#[derive(Debug)]
pub struct SnapshotOutcome {
    pub hash: String,
    /// The state was identical to the latest snapshot; a history entry was
    /// appended but no snapshot files were rewritten.
    pub reused: bool,
}

/// Take a snapshot of every non-skipped resource, in catalogue order:
/// prechecks, results rotation, lineage freeze, content capture, commit.
pub fn snapshot(workspace: &Workspace, options: &SnapshotOptions) -> Result<SnapshotOutcome> {
    for name in &options.skip {
        workspace.resource(name)?;
    }
    validate_tag(workspace, options)?;

    let history = read_history(workspace.store())?;
    let previous_manifest = history
        .last()
        .and_then(|entry| load_manifest(workspace.store(), &entry.hash).ok());

    let adaptors = Rc::new(RefCell::new(resource::build_all(workspace)?));
    let lineage = LineageStore::new(workspace.store().clone());
    let now = Utc::now();

    // Metrics come from the results JSON files while they are still at the
    // resource root, before rotation moves them.
    let mut metrics = BTreeMap::new();
    for config in workspace.catalogue() {
        if config.role == Role::Results && !options.skip.contains(&config.name) {
            if let Ok(path) = workspace.resource_path(&config.name) {
                metrics.extend(results::extract_metrics(&path));
            }
        }
    }

    let captured: Rc<RefCell<BTreeMap<String, ResourceState>>> =
        Rc::new(RefCell::new(BTreeMap::new()));
    let fingerprints: Rc<RefCell<BTreeMap<String, String>>> =
        Rc::new(RefCell::new(BTreeMap::new()));
    let placeholder: Rc<RefCell<Option<std::path::PathBuf>>> = Rc::new(RefCell::new(None));
    let outcome: Rc<RefCell<Option<SnapshotOutcome>>> = Rc::new(RefCell::new(None));

    let mut plan = Plan::new("snapshot");

    // Results rotation, with a compensator that moves everything back if a
    // later phase fails.
    for config in workspace.catalogue() {
        if config.role != Role::Results || options.skip.contains(&config.name) {
            continue;
        }
        if !config.backend.has_local_files() {
            bail!(WorkspaceError::usage(format!(
                "results resource '{}' has no local files to rotate",
                config.name
            )));
        }
        let root = workspace.resource_path(&config.name)?;
        let subpath = results::snapshot_subpath(
            workspace.config().results_subdir_template.as_deref(),
            workspace.hostname(),
            options.tag.as_deref(),
            now,
        );
        let excludes = resource::tree_excludes(config);
        let report = Rc::new(RefCell::new(None));

        let report_exec = report.clone();
        let root_exec = root.clone();
        let subpath_exec = subpath.clone();
        plan.add(
            Action::new(
                format!(
                    "rotate results of '{}' into '{}'",
                    config.name,
                    subpath.display()
                ),
                move || {
                    let rotated = results::rotate(&root_exec, &subpath_exec, &excludes)?;
                    *report_exec.borrow_mut() = Some(rotated);
                    Ok(())
                },
            )
            .with_compensator(move || {
                if let Some(rotated) = report.borrow().as_ref() {
                    results::undo_rotation(&root, rotated);
                }
            }),
        );
    }

    // Lineage freeze into a placeholder; the hash-keyed rename happens in
    // the commit action.
    {
        let lineage_freeze = lineage.clone();
        let lineage_discard = lineage.clone();
        let placeholder_exec = placeholder.clone();
        let placeholder_comp = placeholder.clone();
        plan.add(
            Action::new("freeze the lineage working set", move || {
                let graph = lineage_freeze.load_working()?;
                *placeholder_exec.borrow_mut() =
                    Some(lineage_freeze.freeze_to_placeholder(&graph)?);
                Ok(())
            })
            .with_compensator(move || {
                if let Some(dir) = placeholder_comp.borrow().as_ref() {
                    lineage_discard.discard_placeholder(dir);
                }
            }),
        );
    }

    // Content capture per resource. The fingerprint taken at precheck is
    // re-read before the mutating call; results resources are exempt since
    // rotation legitimately moved their files in between.
    for (index, config) in workspace.catalogue().iter().enumerate() {
        if options.skip.contains(&config.name) {
            continue;
        }
        let name = config.name.clone();
        let guard_fingerprint = config.role != Role::Results && !config.read_only;

        let adaptors_pre = adaptors.clone();
        let fingerprints_pre = fingerprints.clone();
        let name_pre = name.clone();

        let adaptors_exec = adaptors.clone();
        let fingerprints_exec = fingerprints.clone();
        let captured_exec = captured.clone();
        let message = options.message.clone();

        plan.add(
            Action::new(format!("capture resource '{name}'"), move || {
                let mut adaptors = adaptors_exec.borrow_mut();
                let adaptor = &mut adaptors[index];

                if guard_fingerprint {
                    let live = adaptor.state_fingerprint().map_err(|err| {
                        WorkspaceError::backend(adaptor.name(), "snapshot", err)
                    })?;
                    let at_precheck = fingerprints_exec.borrow().get(adaptor.name()).cloned();
                    if at_precheck.as_deref() != Some(live.as_str()) {
                        bail!(WorkspaceError::inconsistency(format!(
                            "resource '{}' changed while the snapshot was running",
                            adaptor.name()
                        )));
                    }
                }

                let commit_message = format!("coati snapshot: {message}");
                let state = adaptor
                    .snapshot(&commit_message)
                    .map_err(|err| WorkspaceError::backend(adaptor.name(), "snapshot", err))?;
                captured_exec
                    .borrow_mut()
                    .insert(adaptor.name().to_string(), state);
                Ok(())
            })
            .with_precheck(move || {
                let adaptors = adaptors_pre.borrow();
                let adaptor = &adaptors[index];
                adaptor.precheck_snapshot()?;
                let fingerprint = adaptor.state_fingerprint().map_err(|err| {
                    WorkspaceError::backend(&name_pre, "precheck-snapshot", err)
                })?;
                fingerprints_pre
                    .borrow_mut()
                    .insert(name_pre.clone(), fingerprint);
                Ok(())
            }),
        );
    }

    // Commit: assemble the manifest, derive the identity, write the
    // snapshot files and the history entry, and commit the metadata to the
    // backing repository. A failed backing commit rolls the files back.
    {
        let captured_commit = captured.clone();
        let placeholder_commit = placeholder.clone();
        let outcome_commit = outcome.clone();
        let lineage_commit = lineage.clone();
        let history_before = history;
        plan.add(Action::new("commit the snapshot", move || {
            let captured = captured_commit.borrow();
            let mut manifest_resources = Vec::new();
            for config in workspace.catalogue() {
                if let Some(state) = captured.get(&config.name) {
                    manifest_resources.push(ManifestResource {
                        name: config.name.clone(),
                        hash: state.hash.clone(),
                        token: state.token.clone(),
                    });
                } else if let Some(previous) = previous_manifest
                    .as_ref()
                    .and_then(|manifest| manifest.resource(&config.name))
                {
                    manifest_resources.push(previous.clone());
                } else {
                    ui::cli::warning!(
                        "resource '{}' was skipped and has no previously captured state",
                        config.name
                    );
                }
            }

            let manifest = SnapshotManifest {
                workspace: workspace.name().to_string(),
                params: workspace.config().params.clone(),
                resources: manifest_resources,
                lineage_dir: crate::workspace::store::SNAPSHOT_LINEAGE_DIR.to_string(),
            };
            let bytes = manifest.serialise()?;
            let hash = hashing::hash_bytes(&bytes);

            let placeholder_dir = placeholder_commit
                .borrow_mut()
                .take()
                .expect("lineage was frozen earlier in the plan");

            let reused = history_before
                .last()
                .is_some_and(|entry| entry.hash == hash);

            let entry = HistoryEntry {
                hash: hash.clone(),
                tags: options.tag.iter().cloned().collect(),
                hostname: workspace.hostname().to_string(),
                timestamp: now,
                message: options.message.clone(),
                metrics: metrics.clone(),
            };

            if reused {
                // Identical state: record the new tag and message, but do
                // not duplicate snapshot files.
                lineage_commit.discard_placeholder(&placeholder_dir);
                append_history(workspace.store(), entry)?;
            } else {
                workspace
                    .store()
                    .write_bytes(&workspace.store().manifest_path(&hash), &bytes)?;
                lineage_commit.commit_frozen(&placeholder_dir, &hash)?;
                append_history(workspace.store(), entry)?;
            }

            let commit_message = match &options.tag {
                Some(tag) => format!("Snapshot {} ({tag})", hashing::short(&hash)),
                None => format!("Snapshot {}", hashing::short(&hash)),
            };
            if let Err(err) = workspace.commit_metadata(&commit_message) {
                // Roll the written files back and re-instate the prior
                // history before surfacing the failure.
                if !reused {
                    let _ = std::fs::remove_file(workspace.store().manifest_path(&hash));
                    lineage_commit.discard_frozen(&hash);
                }
                write_history(workspace.store(), &history_before)?;
                return Err(WorkspaceError::backend("workspace", "commit", err));
            }

            *outcome_commit.borrow_mut() = Some(SnapshotOutcome { hash, reused });
            Ok(())
        }));
    }

    plan.run()?;

    let outcome = outcome
        .borrow_mut()
        .take()
        .expect("the commit action always sets the outcome");
    Ok(outcome)
}

fn validate_tag(workspace: &Workspace, options: &SnapshotOptions) -> Result<()> {
    let Some(tag) = &options.tag else {
        return Ok(());
    };
    if tag.is_empty() || tag.contains('/') || tag.contains(char::is_whitespace) {
        bail!(WorkspaceError::usage(format!(
            "'{tag}' is not a valid tag name"
        )));
    }
    if hashing::is_hex_prefix(tag) {
        bail!(WorkspaceError::usage(format!(
            "tag '{tag}' would be ambiguous with snapshot hashes"
        )));
    }
    if !options.force_tag {
        let history = read_history(workspace.store())?;
        let clash = history.iter().any(|entry| {
            entry.hostname == workspace.hostname() && entry.tags.iter().any(|t| t == tag)
        });
        if clash {
            bail!(WorkspaceError::usage(format!(
                "tag '{tag}' already exists on this host; use --force-tag to move it"
            )));
        }
    }
    Ok(())
}
