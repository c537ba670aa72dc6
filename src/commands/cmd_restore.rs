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
    engine::restore::{RestoreOptions, restore},
    hashing, ui,
};

use super::{GlobalArgs, open_workspace};

#[derive(Args, Debug)]
#[clap(about = "Restore resources to a prior snapshot")]
pub struct CmdArgs {
    /// Tag or snapshot hash prefix
    #[clap(value_parser)]
    pub reference: String,

    /// Restore only this resource; can be used multiple times
    #[clap(long = "only", value_parser)]
    pub only: Vec<String>,

    /// Leave this resource untouched; can be used multiple times
    #[clap(long = "leave", value_parser)]
    pub leave: Vec<String>,

    /// Refuse instead of snapshotting uncaptured work first
    #[clap(long, default_value_t = false)]
    pub no_new_snapshot: bool,
}

pub fn run(global_args: &GlobalArgs, args: &CmdArgs) -> Result<()> {
    let workspace = open_workspace(global_args)?;
    let _lock = workspace.lock()?;

    let options = RestoreOptions {
        reference: args.reference.clone(),
        only: args.only.iter().cloned().collect(),
        leave: args.leave.iter().cloned().collect(),
        no_new_snapshot: args.no_new_snapshot,
    };
    let outcome = restore(&workspace, &options)?;

    if let Some(preserved) = &outcome.auto_snapshot {
        ui::cli::log!(
            "Uncaptured work was preserved in snapshot {}",
            hashing::short(preserved).bold()
        );
    }
    ui::cli::log!(
        "Restored {} to snapshot {}",
        match outcome.restored.len() {
            1 => format!("resource '{}'", outcome.restored[0]),
            n => format!("{n} resources"),
        },
        hashing::short(&outcome.hash).bold().green()
    );
    ui::cli::verbose!("left untouched: {}", outcome.left.join(", "));
    Ok(())
}
