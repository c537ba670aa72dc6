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

use std::collections::BTreeSet;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::{
    engine::snapshot::{SnapshotOptions, snapshot},
    hashing, ui,
};

use super::{GlobalArgs, open_workspace};

#[derive(Args, Debug)]
#[clap(about = "Snapshot the state of every resource under one identity")]
pub struct CmdArgs {
    /// Tag for this snapshot
    #[clap(value_parser)]
    pub tag: Option<String>,

    /// Snapshot message
    #[clap(short, long, value_parser, default_value = "")]
    pub message: String,

    /// Resource to skip; can be used multiple times
    #[clap(long = "skip", value_parser)]
    pub skip: Vec<String>,

    /// Move an existing tag to this snapshot
    #[clap(long, default_value_t = false)]
    pub force_tag: bool,
}

pub fn run(global_args: &GlobalArgs, args: &CmdArgs) -> Result<()> {
    let workspace = open_workspace(global_args)?;
    let _lock = workspace.lock()?;

    let options = SnapshotOptions {
        tag: args.tag.clone(),
        message: args.message.clone(),
        skip: args.skip.iter().cloned().collect::<BTreeSet<_>>(),
        force_tag: args.force_tag,
    };
    let outcome = snapshot(&workspace, &options)?;

    if outcome.reused {
        ui::cli::log!(
            "Nothing changed since snapshot {}; recorded a new history entry",
            hashing::short(&outcome.hash).bold()
        );
    } else {
        ui::cli::log!(
            "Created snapshot {}{}",
            hashing::short(&outcome.hash).bold().green(),
            match &args.tag {
                Some(tag) => format!(" ({tag})"),
                None => String::new(),
            }
        );
    }
    Ok(())
}
