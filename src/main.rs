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

use clap::{Parser, Subcommand};

use coati::{
    commands::{
        self, GlobalArgs, cmd_add, cmd_clone, cmd_diff, cmd_init, cmd_publish, cmd_pull,
        cmd_push, cmd_report, cmd_restore, cmd_run, cmd_snapshot, cmd_status,
    },
    errors, global, ui,
};

#[derive(Parser, Debug)]
#[clap(
    name = "coati",
    version,
    about = "Version control for heterogeneous data science projects"
)]
struct Cli {
    #[clap(flatten)]
    global: GlobalArgs,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Init(cmd_init::CmdArgs),
    Add(cmd_add::CmdArgs),
    Clone(cmd_clone::CmdArgs),
    Snapshot(cmd_snapshot::CmdArgs),
    Restore(cmd_restore::CmdArgs),
    Push(cmd_push::CmdArgs),
    Pull(cmd_pull::CmdArgs),
    Publish(cmd_publish::CmdArgs),
    Status(cmd_status::CmdArgs),
    Report(cmd_report::CmdArgs),
    Run(cmd_run::CmdArgs),
    Diff(cmd_diff::CmdArgs),
}

fn main() {
    let cli = Cli::parse();
    global::set_global_opts_with_args(&cli.global);

    let result = match &cli.command {
        Command::Init(args) => commands::cmd_init::run(&cli.global, args),
        Command::Add(args) => commands::cmd_add::run(&cli.global, args),
        Command::Clone(args) => commands::cmd_clone::run(&cli.global, args),
        Command::Snapshot(args) => commands::cmd_snapshot::run(&cli.global, args),
        Command::Restore(args) => commands::cmd_restore::run(&cli.global, args),
        Command::Push(args) => commands::cmd_push::run(&cli.global, args),
        Command::Pull(args) => commands::cmd_pull::run(&cli.global, args),
        Command::Publish(args) => commands::cmd_publish::run(&cli.global, args),
        Command::Status(args) => commands::cmd_status::run(&cli.global, args),
        Command::Report(args) => commands::cmd_report::run(&cli.global, args),
        Command::Run(args) => commands::cmd_run::run(&cli.global, args),
        Command::Diff(args) => commands::cmd_diff::run(&cli.global, args),
    };

    if let Err(err) = result {
        ui::cli::error!("{err:#}");
        if let Some(remedy) = errors::remedy(&err) {
            eprintln!("  hint: {remedy}");
        }
        std::process::exit(errors::exit_code(&err));
    }
}
