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
    engine::{resolve_ref, snapshot::load_manifest},
    hashing, resource, ui,
};

use super::{GlobalArgs, open_workspace};

#[derive(Args, Debug)]
#[clap(about = "Show per-resource changes between two snapshots")]
pub struct CmdArgs {
    /// Older snapshot: tag or hash prefix
    #[clap(value_parser)]
    pub from: String,

    /// Newer snapshot: tag or hash prefix
    #[clap(value_parser)]
    pub to: String,
}

pub fn run(global_args: &GlobalArgs, args: &CmdArgs) -> Result<()> {
    let workspace = open_workspace(global_args)?;

    let from_entry = resolve_ref(workspace.store(), &args.from)?;
    let to_entry = resolve_ref(workspace.store(), &args.to)?;
    let from_manifest = load_manifest(workspace.store(), &from_entry.hash)?;
    let to_manifest = load_manifest(workspace.store(), &to_entry.hash)?;

    ui::cli::log!(
        "Differences from {} to {}",
        hashing::short(&from_entry.hash).bold(),
        hashing::short(&to_entry.hash).bold()
    );

    for config in workspace.catalogue() {
        let from_state = from_manifest.state_of(&config.name);
        let to_state = to_manifest.state_of(&config.name);

        match (from_state, to_state) {
            (None, None) => {}
            (None, Some(_)) => {
                ui::cli::log!("  {}: {}", config.name.bold(), "added".green());
            }
            (Some(_), None) => {
                ui::cli::log!("  {}: {}", config.name.bold(), "removed".red());
            }
            (Some(from), Some(to)) if from.hash == to.hash => {
                ui::cli::verbose!("  {}: unchanged", config.name);
            }
            (Some(from), Some(to)) => {
                let adaptor = resource::build(&workspace, config)?;
                match adaptor.diff(&from, &to) {
                    Ok(Some(changed)) => {
                        ui::cli::log!(
                            "  {}: {} changed",
                            config.name.bold(),
                            changed.len()
                        );
                        for path in changed {
                            ui::cli::log!("    {path}");
                        }
                    }
                    Ok(None) => {
                        ui::cli::log!(
                            "  {}: changed ({} -> {})",
                            config.name.bold(),
                            hashing::short(&from.hash),
                            hashing::short(&to.hash)
                        );
                    }
                    Err(err) => {
                        ui::cli::warning!(
                            "could not list changes of '{}': {err:#}",
                            config.name
                        );
                    }
                }
            }
        }
    }
    Ok(())
}
