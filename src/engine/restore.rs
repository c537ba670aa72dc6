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

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, bail};

use crate::{
    engine::{
        resolve_ref,
        snapshot::{self, SnapshotOptions, load_manifest},
    },
    errors::WorkspaceError,
    hashing,
    lineage::store::LineageStore,
    plan::{Action, Plan},
    resource::{self, ResourceState},
    ui,
    workspace::{Workspace, config::Role},
};

#[derive(Debug, Default)]
pub struct RestoreOptions {
    /// A tag or a unique hash prefix.
    pub reference: String,
    pub only: BTreeSet<String>,
    pub leave: BTreeSet<String>,
    /// Refuse instead of preserving uncaptured work with an automatic
    /// snapshot.
    pub no_new_snapshot: bool,
}

#[derive(Debug)]
pub struct RestoreOutcome {
    pub hash: String,
    pub restored: Vec<String>,
    pub left: Vec<String>,
    /// Hash of the preservation snapshot taken before restoring, if one
    /// was needed.
    pub auto_snapshot: Option<String>,
}

/// Restore the workspace to a prior snapshot. Results resources are never
/// reverted; read-only resources are never written. Uncaptured work is
/// preserved with an automatic snapshot first, unless refused.
pub fn restore(workspace: &Workspace, options: &RestoreOptions) -> Result<RestoreOutcome> {
    if !options.only.is_empty() && !options.leave.is_empty() {
        bail!(WorkspaceError::usage(
            "--only and --leave cannot be combined",
        ));
    }
    for name in options.only.iter().chain(options.leave.iter()) {
        let config = workspace.resource(name)?;
        if options.only.contains(name) {
            if config.role == Role::Results {
                bail!(WorkspaceError::usage(format!(
                    "results resource '{name}' cannot be restored"
                )));
            }
            if config.read_only {
                bail!(WorkspaceError::usage(format!(
                    "read-only resource '{name}' cannot be restored"
                )));
            }
        }
    }

    let entry = resolve_ref(workspace.store(), &options.reference)?;
    let manifest = load_manifest(workspace.store(), &entry.hash)?;

    // Selection in catalogue order.
    let mut selected: Vec<(usize, String, ResourceState)> = Vec::new();
    let mut left: Vec<String> = Vec::new();
    for (index, config) in workspace.catalogue().iter().enumerate() {
        let implicitly_left = config.role == Role::Results || config.read_only;
        let chosen = if options.only.is_empty() {
            !options.leave.contains(&config.name) && !implicitly_left
        } else {
            options.only.contains(&config.name)
        };
        if !chosen {
            left.push(config.name.clone());
            continue;
        }
        match manifest.state_of(&config.name) {
            Some(state) => selected.push((index, config.name.clone(), state)),
            None => {
                ui::cli::warning!(
                    "snapshot {} does not record resource '{}'; leaving it as is",
                    hashing::short(&entry.hash),
                    config.name
                );
                left.push(config.name.clone());
            }
        }
    }

    let mut adaptors = resource::build_all(workspace)?;

    // Precheck pass: reachability and dirtiness.
    let mut auto_snapshot = None;
    let would_lose = run_prechecks(&adaptors, &selected)?;
    if !would_lose.is_empty() {
        let details = would_lose.join("; ");
        if options.no_new_snapshot {
            bail!(WorkspaceError::precondition_with_remedy(
                format!("restore would discard uncaptured work: {details}"),
                "take a snapshot first, or drop --no-new-snapshot",
            ));
        }

        // Preserve the current state before touching anything.
        ui::cli::log!("Preserving uncaptured work in a snapshot first");
        let preserved = snapshot::snapshot(
            workspace,
            &SnapshotOptions {
                tag: Some(format!("pre-restore-{}", hashing::short(&entry.hash))),
                message: format!("before restore to {}", options.reference),
                skip: BTreeSet::new(),
                force_tag: true,
            },
        )?;
        auto_snapshot = Some(preserved.hash);

        // The preservation snapshot may have committed states; rebuild and
        // re-check.
        adaptors = resource::build_all(workspace)?;
        let still_dirty = run_prechecks(&adaptors, &selected)?;
        if !still_dirty.is_empty() {
            let message = format!(
                "work would still be discarded after the preservation snapshot: {}",
                still_dirty.join("; ")
            );
            if crate::global::batch() || !ui::cli::confirm(&format!("{message}. Continue?"), false)?
            {
                bail!(WorkspaceError::precondition(message));
            }
        }
    }

    // Fingerprints recorded between precheck and execute guard against
    // external writers.
    let mut fingerprints: BTreeMap<String, String> = BTreeMap::new();
    for (index, name, _) in &selected {
        let fingerprint = adaptors[*index]
            .state_fingerprint()
            .map_err(|err| WorkspaceError::backend(name.clone(), "precheck-restore", err))?;
        fingerprints.insert(name.clone(), fingerprint);
    }

    // Execute in catalogue order. Rolling back across heterogeneous
    // backends is not generally possible, so a failure surfaces what was
    // already restored instead of undoing it.
    let adaptors = std::cell::RefCell::new(adaptors);
    let mut plan = Plan::new("restore");
    for (index, name, state) in &selected {
        let adaptors = &adaptors;
        let index = *index;
        let expected = fingerprints
            .get(name)
            .cloned()
            .expect("fingerprint recorded above");
        plan.add(Action::new(format!("restore resource '{name}'"), move || {
            let mut adaptors = adaptors.borrow_mut();
            let adaptor = &mut adaptors[index];
            let live = adaptor
                .state_fingerprint()
                .map_err(|err| WorkspaceError::backend(name.clone(), "restore", err))?;
            if live != expected {
                bail!(WorkspaceError::inconsistency(format!(
                    "resource '{name}' changed while the restore was running"
                )));
            }
            adaptor
                .restore(state)
                .map_err(|err| WorkspaceError::backend(name.clone(), "restore", err))
        }));
    }

    let partial = plan.run_accept_partial()?;
    if let Some((failed, err)) = partial.failure {
        if !partial.completed.is_empty() {
            ui::cli::error!(
                "partially restored before the failure: {}",
                partial.completed.join(", ")
            );
        }
        return Err(err.context(format!(
            "{failed} failed; {} of {} resources were already restored",
            partial.completed.len(),
            selected.len()
        )));
    }

    // The frozen lineage of the target snapshot replaces the working set.
    LineageStore::new(workspace.store().clone()).restore_into_working(&entry.hash)?;

    Ok(RestoreOutcome {
        hash: entry.hash,
        restored: selected.into_iter().map(|(_, name, _)| name).collect(),
        left,
        auto_snapshot,
    })
}

fn run_prechecks(
    adaptors: &[Box<dyn resource::Resource>],
    selected: &[(usize, String, ResourceState)],
) -> Result<Vec<String>> {
    let mut would_lose = Vec::new();
    for (index, name, state) in selected {
        let check = adaptors[*index].precheck_restore(state)?;
        if check.would_lose_work && !check.already_at_target {
            would_lose.push(
                check
                    .detail
                    .unwrap_or_else(|| format!("'{name}' has uncaptured changes")),
            );
        }
    }
    Ok(would_lose)
}
