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

use crate::{ui, workspace::Workspace};

use super::GlobalArgs;

#[derive(Args, Debug)]
#[clap(about = "Initialize a new workspace in the current directory")]
pub struct CmdArgs {
    /// Workspace name; defaults to the directory name
    #[clap(value_parser)]
    pub name: Option<String>,

    /// Hostname recorded for this clone; defaults to the machine hostname
    #[clap(long, value_parser)]
    pub hostname: Option<String>,
}

pub fn run(global_args: &GlobalArgs, args: &CmdArgs) -> Result<()> {
    let root = global_args.start_dir()?;
    let name = match &args.name {
        Some(name) => name.clone(),
        None => root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string()),
    };
    let hostname = match &args.hostname {
        Some(hostname) => hostname.clone(),
        None => whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_string()),
    };

    let workspace = Workspace::init(&root, &name, &hostname)?;
    ui::cli::log!(
        "Initialized workspace '{}' at '{}' (hostname '{}')",
        workspace.name(),
        workspace.root().display(),
        workspace.hostname()
    );
    Ok(())
}
