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

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::{engine::sync, ui};

use super::GlobalArgs;

#[derive(Args, Debug)]
#[clap(about = "Clone a workspace and re-materialise its resources")]
pub struct CmdArgs {
    /// Workspace repository URL
    #[clap(value_parser)]
    pub url: String,

    /// Target directory; defaults to the repository name
    #[clap(value_parser)]
    pub target: Option<PathBuf>,

    /// Hostname recorded for this clone; prompts otherwise
    #[clap(long, value_parser)]
    pub hostname: Option<String>,
}

pub fn run(_global_args: &GlobalArgs, args: &CmdArgs) -> Result<()> {
    let target = match &args.target {
        Some(target) => target.clone(),
        None => {
            let basename = args
                .url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or("workspace")
                .trim_end_matches(".git");
            PathBuf::from(basename)
        }
    };

    let workspace = sync::clone(&args.url, &target, args.hostname.clone())?;
    ui::cli::log!(
        "Cloned workspace '{}' into '{}'",
        workspace.name(),
        target.display()
    );
    Ok(())
}
