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

use crate::{engine::sync, ui};

use super::{GlobalArgs, open_workspace};

#[derive(Args, Debug)]
#[clap(about = "Push the workspace and every resource to their remotes")]
pub struct CmdArgs {
    /// Resource to skip; can be used multiple times
    #[clap(long = "skip", value_parser)]
    pub skip: Vec<String>,
}

pub fn run(global_args: &GlobalArgs, args: &CmdArgs) -> Result<()> {
    let workspace = open_workspace(global_args)?;
    let _lock = workspace.lock()?;

    sync::push(&workspace, &args.skip.iter().cloned().collect())?;
    ui::cli::log!("Pushed workspace '{}'", workspace.name());
    Ok(())
}
