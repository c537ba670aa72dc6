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

pub mod test_cmd_restore;
pub mod test_cmd_snapshot;
pub mod test_lineage;
pub mod test_results_rotation;
pub mod test_sync;

use std::path::Path;

use anyhow::Result;
use coati::{
    commands::{GlobalArgs, cmd_add, cmd_init, cmd_snapshot},
    engine::snapshot::{HistoryEntry, read_history},
    global::set_global_opts_with_args,
    workspace::{config::Role, store::Store},
};

use crate::test_utils;

pub const TEST_HOSTNAME: &str = "testhost";

pub fn global_for(root: &Path) -> GlobalArgs {
    let global = GlobalArgs {
        batch: true,
        verbose: false,
        quiet: true,
        workspace: Some(root.to_path_buf()),
    };
    set_global_opts_with_args(&global);
    global
}

/// Create a workspace rooted at `root` with a test identity.
pub fn init_workspace(root: &Path) -> Result<GlobalArgs> {
    test_utils::init_git_repo(root)?;
    let global = global_for(root);
    cmd_init::run(
        &global,
        &cmd_init::CmdArgs {
            name: Some("demo".to_string()),
            hostname: Some(TEST_HOSTNAME.to_string()),
        },
    )?;
    Ok(global)
}

fn add_args(backend: cmd_add::BackendKind, path: &Path, role: Role) -> cmd_add::CmdArgs {
    cmd_add::CmdArgs {
        backend,
        path: Some(path.to_path_buf()),
        role,
        name: None,
        read_only: false,
        remote: None,
        branch: None,
        mode: coati::workspace::config::SyncMode::Copy,
        master: cmd_add::Master::Remote,
        sync_config: None,
        bucket: None,
        prefix: String::new(),
        region: None,
    }
}

/// Add a Git-backed resource holding one committed file.
pub fn add_git_resource(
    global: &GlobalArgs,
    root: &Path,
    name: &str,
    role: Role,
    file: &str,
    content: &str,
) -> Result<()> {
    let dir = root.join(name);
    let repo = test_utils::init_git_repo(&dir)?;
    test_utils::commit_file(&repo, file, content, "initial")?;
    cmd_add::run(global, &add_args(cmd_add::BackendKind::Git, &dir, role))
}

/// Add a local-files resource holding the given files.
pub fn add_local_resource(
    global: &GlobalArgs,
    root: &Path,
    name: &str,
    role: Role,
    files: &[(&str, &str)],
) -> Result<()> {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir)?;
    for (file, content) in files {
        std::fs::write(dir.join(file), content)?;
    }
    cmd_add::run(global, &add_args(cmd_add::BackendKind::LocalFiles, &dir, role))
}

pub fn take_snapshot(global: &GlobalArgs, tag: &str) -> Result<()> {
    cmd_snapshot::run(
        global,
        &cmd_snapshot::CmdArgs {
            tag: Some(tag.to_string()),
            message: format!("snapshot {tag}"),
            skip: Vec::new(),
            force_tag: false,
        },
    )
}

pub fn history_of(root: &Path) -> Result<Vec<HistoryEntry>> {
    read_history(&Store::new(root))
}

pub fn latest_hash(root: &Path) -> Result<String> {
    Ok(history_of(root)?
        .last()
        .expect("history should not be empty")
        .hash
        .clone())
}
