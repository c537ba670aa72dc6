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

use std::{cell::RefCell, collections::BTreeSet, path::Path};

use anyhow::{Result, bail};

use crate::{
    errors::{self, WorkspaceError},
    global::defaults::{SYNC_RETRY_ATTEMPTS, SYNC_RETRY_BASE_DELAY},
    lineage::store::LineageStore,
    plan::{Action, Plan},
    resource,
    ui,
    vcs::GitRepo,
    workspace::{
        Workspace,
        config::{BackendConfig, LocalParams, ResourceLocalParams, SCHEMA_VERSION},
        store::{META_DIR, Store},
    },
};

/// Retry `operation` with exponential backoff, but only for failures the
/// adaptor edge classified as transient network trouble.
fn with_retry(description: &str, mut operation: impl FnMut() -> Result<()>) -> Result<()> {
    let mut attempt: u32 = 0;
    loop {
        match operation() {
            Ok(()) => return Ok(()),
            Err(err) if errors::is_transient(&err) && attempt + 1 < SYNC_RETRY_ATTEMPTS => {
                attempt += 1;
                let delay = SYNC_RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                ui::cli::warning!(
                    "{description} hit a transient failure, retrying in {delay:?} ({attempt}/{})",
                    SYNC_RETRY_ATTEMPTS - 1
                );
                std::thread::sleep(delay);
            }
            Err(err) => return Err(err),
        }
    }
}

fn require_origin(workspace: &Workspace) -> Result<String> {
    workspace.repo().remote_url("origin").ok_or_else(|| {
        WorkspaceError::precondition_with_remedy(
            "this workspace has no remote",
            "run 'coati publish <url>' first",
        )
    })
}

/// Push the workspace catalogue, then every resource, in catalogue order.
/// Any diverged remote tip refuses the whole operation before a byte is
/// pushed.
pub fn push(workspace: &Workspace, skip: &BTreeSet<String>) -> Result<()> {
    for name in skip {
        workspace.resource(name)?;
    }
    require_origin(workspace)?;

    let adaptors = RefCell::new(resource::build_all(workspace)?);
    let adaptors = &adaptors;
    let mut plan = Plan::new("push");

    plan.add(
        Action::new("push the workspace catalogue", move || {
            let spinner = ui::phase_spinner("Pushing workspace catalogue".to_string());
            let branch = workspace.repo().current_branch()?;
            let result = with_retry("workspace push", || {
                workspace.repo().push("origin", &branch)
            });
            spinner.finish_and_clear();
            result.map_err(|err| WorkspaceError::backend("workspace", "push", err))
        })
        .with_precheck(move || {
            let branch = workspace.repo().current_branch()?;
            workspace.repo().fetch("origin")?;
            if workspace.repo().commits_behind_remote("origin", &branch)? > 0 {
                bail!(WorkspaceError::precondition_with_remedy(
                    "the workspace remote has commits this clone does not",
                    "run 'coati pull' first",
                ));
            }
            Ok(())
        }),
    );

    for (index, config) in workspace.catalogue().iter().enumerate() {
        if skip.contains(&config.name) {
            continue;
        }
        let name = config.name.clone();
        plan.add(
            Action::new(format!("push resource '{name}'"), move || {
                let spinner = ui::phase_spinner(format!("Pushing '{name}'"));
                let result = with_retry(&format!("push of '{name}'"), || {
                    adaptors.borrow_mut()[index].push()
                });
                spinner.finish_and_clear();
                result.map_err(|err| WorkspaceError::backend(name.clone(), "push", err))
            })
            .with_precheck(move || adaptors.borrow()[index].precheck_push()),
        );
    }

    plan.run()
}

/// Pull every resource, then the workspace catalogue last so newly added
/// resources are visible on the next invocation. Incoming snapshots make
/// the current lineage ambiguous, so the working set is cleared.
pub fn pull(workspace: &mut Workspace) -> Result<()> {
    require_origin(workspace)?;

    {
        let mut adaptors = resource::build_all(workspace)?;
        for adaptor in adaptors.iter_mut() {
            let spinner = ui::phase_spinner(format!("Pulling '{}'", adaptor.name()));
            let result = with_retry(&format!("pull of '{}'", adaptor.name()), || adaptor.pull());
            spinner.finish_and_clear();
            result.map_err(|err| WorkspaceError::backend(adaptor.name(), "pull", err))?;
        }
    }

    let spinner = ui::phase_spinner("Pulling workspace catalogue".to_string());
    let branch = workspace.repo().current_branch()?;
    let result = with_retry("workspace pull", || {
        workspace.repo().pull_rebase("origin", &branch)
    });
    spinner.finish_and_clear();
    result.map_err(|err| WorkspaceError::backend("workspace", "pull", err))?;

    workspace.reload_shared()?;
    LineageStore::new(workspace.store().clone()).clear_working()?;
    Ok(())
}

/// Record the workspace origin and perform the initial push.
pub fn publish(workspace: &Workspace, url: &str) -> Result<()> {
    workspace.repo().set_remote("origin", url)?;
    let branch = workspace.repo().current_branch()?;
    let spinner = ui::phase_spinner(format!("Publishing to {url}"));
    let result = with_retry("publish", || {
        workspace.repo().push_upstream("origin", &branch)
    });
    spinner.finish_and_clear();
    result.map_err(|err| WorkspaceError::backend("workspace", "push", err))
}

/// Clone a workspace: clone the backing repository, set up this clone's
/// local parameters (prompting where allowed), and re-materialise every
/// catalogue resource.
pub fn clone(url: &str, target: &Path, hostname: Option<String>) -> Result<Workspace> {
    if target.exists() && target.read_dir().map(|mut d| d.next().is_some()).unwrap_or(true) {
        bail!(WorkspaceError::usage(format!(
            "target '{}' exists and is not empty",
            target.display()
        )));
    }

    let spinner = ui::phase_spinner(format!("Cloning {url}"));
    let result = GitRepo::clone_from(url, target);
    spinner.finish_and_clear();
    result.map_err(|err| WorkspaceError::backend("workspace", "clone", err))?;

    let store = Store::new(target);
    if !store.exists() {
        bail!(WorkspaceError::precondition(format!(
            "'{url}' is a repository but not a workspace"
        )));
    }

    let default_hostname = hostname.unwrap_or_else(|| {
        whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_string())
    });
    let hostname = ui::cli::input_with_default("Hostname for this clone", default_hostname)?;
    store.write_json(
        &store.local_params_path(),
        &LocalParams {
            schema_version: SCHEMA_VERSION,
            hostname,
        },
    )?;

    // Machine-local paths for every catalogue resource. Directory-backed
    // resources default to a directory named after the resource under the
    // workspace root.
    let catalogue = store.read_catalogue()?;
    let mut local_params = std::collections::BTreeMap::new();
    for config in &catalogue {
        let default_path = match &config.backend {
            BackendConfig::GitSubdir { subpath } => subpath.clone(),
            BackendConfig::Bucket { .. } => {
                Path::new(META_DIR).join("scratch").join(&config.name)
            }
            _ => Path::new(&config.name).to_path_buf(),
        };
        let path = match &config.backend {
            BackendConfig::Git { .. } | BackendConfig::LocalFiles {} | BackendConfig::Rclone { .. } => {
                let answer = ui::cli::input_with_default(
                    &format!("Local path for resource '{}'", config.name),
                    default_path.to_string_lossy().into_owned(),
                )?;
                Path::new(&answer).to_path_buf()
            }
            _ => default_path,
        };
        local_params.insert(config.name.clone(), ResourceLocalParams { path });
    }
    store.write_json(&store.resource_local_params_path(), &local_params)?;

    let workspace = Workspace::open_root(target)?;
    for config in workspace.catalogue() {
        let adaptor = resource::build(&workspace, config)?;
        let path = workspace.resource_path(&config.name)?;
        let spinner = ui::phase_spinner(format!("Materialising '{}'", config.name));
        let result = with_retry(&format!("clone of '{}'", config.name), || {
            adaptor.clone_to(&path)
        });
        spinner.finish_and_clear();
        result.map_err(|err| WorkspaceError::backend(config.name.clone(), "clone", err))?;
    }

    Ok(workspace)
}
