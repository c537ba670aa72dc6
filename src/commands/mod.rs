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

pub mod cmd_add;
pub mod cmd_clone;
pub mod cmd_diff;
pub mod cmd_init;
pub mod cmd_publish;
pub mod cmd_pull;
pub mod cmd_push;
pub mod cmd_report;
pub mod cmd_restore;
pub mod cmd_run;
pub mod cmd_snapshot;
pub mod cmd_status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::workspace::Workspace;

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Never prompt; operations that would need confirmation refuse instead
    #[clap(long, global = true, default_value_t = false)]
    pub batch: bool,

    /// Echo the operation plan before executing it
    #[clap(long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Suppress non-error output
    #[clap(long, global = true, default_value_t = false)]
    pub quiet: bool,

    /// Operate on the workspace at this directory instead of the current one
    #[clap(long, global = true, value_parser)]
    pub workspace: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn start_dir(&self) -> Result<PathBuf> {
        match &self.workspace {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().with_context(|| "Could not read the current directory"),
        }
    }
}

pub fn open_workspace(global_args: &GlobalArgs) -> Result<Workspace> {
    Workspace::open(&global_args.start_dir()?)
}
