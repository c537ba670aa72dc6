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
use chrono::Local;
use clap::{Args, Subcommand};
use colored::Colorize;

use crate::{
    engine::{resolve_ref, snapshot::read_history},
    hashing,
    lineage::store::LineageStore,
    ui,
    ui::table::{Alignment, Table},
    workspace::Workspace,
};

use super::{GlobalArgs, cmd_status, open_workspace};

#[derive(Args, Debug)]
#[clap(about = "Report on history, results and lineage")]
pub struct CmdArgs {
    #[clap(subcommand)]
    pub report: ReportCommand,
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    /// Same as the status command
    Status,
    /// Snapshot history, newest first
    History,
    /// Numeric metrics across snapshots
    Results,
    /// The frozen lineage graph of one snapshot
    Lineage {
        /// Tag or snapshot hash prefix
        #[clap(long, value_parser)]
        snapshot: String,
    },
}

pub fn run(global_args: &GlobalArgs, args: &CmdArgs) -> Result<()> {
    let workspace = open_workspace(global_args)?;
    match &args.report {
        ReportCommand::Status => cmd_status::show_status(&workspace),
        ReportCommand::History => show_history(&workspace),
        ReportCommand::Results => show_results(&workspace),
        ReportCommand::Lineage { snapshot } => show_lineage(&workspace, snapshot),
    }
}

fn show_history(workspace: &Workspace) -> Result<()> {
    let history = read_history(workspace.store())?;
    if history.is_empty() {
        ui::cli::log!("No snapshots yet");
        return Ok(());
    }

    let mut table = Table::new_with_alignments(vec![
        Alignment::Left,
        Alignment::Left,
        Alignment::Left,
        Alignment::Left,
        Alignment::Left,
    ]);
    table.set_headers(vec![
        "snapshot".bold().to_string(),
        "tags".bold().to_string(),
        "host".bold().to_string(),
        "taken".bold().to_string(),
        "message".bold().to_string(),
    ]);

    for entry in history.iter().rev() {
        table.add_row(vec![
            hashing::short(&entry.hash).to_string(),
            entry.tags.join(", "),
            entry.hostname.clone(),
            entry
                .timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            entry.message.clone(),
        ]);
    }
    ui::cli::log!("{}", table.render());
    Ok(())
}

fn show_results(workspace: &Workspace) -> Result<()> {
    let history = read_history(workspace.store())?;
    let with_metrics: Vec<_> = history
        .iter()
        .rev()
        .filter(|entry| !entry.metrics.is_empty())
        .collect();
    if with_metrics.is_empty() {
        ui::cli::log!("No snapshot recorded any metrics");
        return Ok(());
    }

    let mut table =
        Table::new_with_alignments(vec![Alignment::Left, Alignment::Left, Alignment::Left]);
    table.set_headers(vec![
        "snapshot".bold().to_string(),
        "tags".bold().to_string(),
        "metrics".bold().to_string(),
    ]);
    for entry in with_metrics {
        let metrics = entry
            .metrics
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            hashing::short(&entry.hash).to_string(),
            entry.tags.join(", "),
            metrics,
        ]);
    }
    ui::cli::log!("{}", table.render());
    Ok(())
}

fn show_lineage(workspace: &Workspace, reference: &str) -> Result<()> {
    let entry = resolve_ref(workspace.store(), reference)?;
    let graph = LineageStore::new(workspace.store().clone()).load_frozen(&entry.hash)?;

    ui::cli::log!(
        "Lineage frozen in snapshot {}",
        hashing::short(&entry.hash).bold()
    );
    if graph.is_empty() {
        ui::cli::log!("  (empty)");
        return Ok(());
    }

    for source in graph.sources() {
        ui::cli::log!(
            "  source {} @ {}",
            source.reference,
            hashing::short(&source.version_hash)
        );
    }
    for step in graph.steps() {
        ui::cli::log!(
            "  step {} (generation {}) ran {} for {:.1}s",
            step.name.bold(),
            step.generation,
            step.started
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            step.duration_secs
        );
        for input in &step.inputs {
            ui::cli::log!("    in  {} [{}]", input.reference, input.certificate);
        }
        for output in &step.outputs {
            ui::cli::log!("    out {output}");
        }
        if !step.parameters.is_empty() {
            let parameters = step
                .parameters
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(", ");
            ui::cli::log!("    with {parameters}");
        }
    }
    Ok(())
}
