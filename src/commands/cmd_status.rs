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

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::{
    engine::snapshot::read_history,
    hashing, resource, ui,
    ui::table::{Alignment, Table},
    workspace::Workspace,
};

use super::{GlobalArgs, open_workspace};

#[derive(Args, Debug)]
#[clap(about = "Show the workspace, its resources and their dirtiness")]
pub struct CmdArgs {}

pub fn run(global_args: &GlobalArgs, _args: &CmdArgs) -> Result<()> {
    let workspace = open_workspace(global_args)?;
    show_status(&workspace)
}

pub(crate) fn show_status(workspace: &Workspace) -> Result<()> {
    ui::cli::log!(
        "Workspace '{}' at '{}' (hostname '{}')",
        workspace.name().bold(),
        workspace.root().display(),
        workspace.hostname()
    );

    let history = read_history(workspace.store())?;
    match history.last() {
        Some(entry) => ui::cli::log!(
            "Latest snapshot: {}{}",
            hashing::short(&entry.hash).bold(),
            if entry.tags.is_empty() {
                String::new()
            } else {
                format!(" ({})", entry.tags.join(", "))
            }
        ),
        None => ui::cli::log!("No snapshots yet"),
    }

    if workspace.store().lock_path().exists() {
        ui::cli::warning!(
            "a lock file exists at '{}'; another invocation may be running",
            workspace.store().lock_path().display()
        );
    }

    let mut table = Table::new_with_alignments(vec![
        Alignment::Left,
        Alignment::Left,
        Alignment::Left,
        Alignment::Left,
        Alignment::Left,
    ]);
    table.set_headers(vec![
        "resource".bold().to_string(),
        "role".bold().to_string(),
        "backend".bold().to_string(),
        "state".bold().to_string(),
        "status".bold().to_string(),
    ]);

    for config in workspace.catalogue() {
        let adaptor = resource::build(workspace, config)?;
        let state = adaptor
            .current_hash()
            .map(|hash| hashing::short(&hash).to_string())
            .unwrap_or_else(|_| "-".to_string());
        let status = match adaptor.is_dirty() {
            Ok(true) => "dirty".yellow().to_string(),
            Ok(false) => "clean".green().to_string(),
            Err(_) => "unavailable".red().to_string(),
        };
        table.add_row(vec![
            config.name.clone(),
            config.role.to_string(),
            format!(
                "{}{}",
                config.backend.kind(),
                if config.read_only { " (read-only)" } else { "" }
            ),
            state,
            status,
        ]);
    }

    ui::cli::log!();
    ui::cli::log!("{}", table.render());
    Ok(())
}
