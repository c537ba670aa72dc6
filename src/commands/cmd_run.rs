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

use std::{collections::BTreeMap, path::Path, process::Command};

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::{
    errors::{SubprocessFailure, WorkspaceError},
    hashing,
    lineage::{LineageRef, store::LineageStore},
    resource, ui,
    workspace::{Workspace, config::Role},
};

use super::{GlobalArgs, open_workspace};

#[derive(Args, Debug)]
#[clap(about = "Run a command and record it as a lineage step")]
pub struct CmdArgs {
    /// Step name; defaults to the script name
    #[clap(long, value_parser)]
    pub step: Option<String>,

    /// The command line to run
    #[clap(value_parser, required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub argv: Vec<String>,
}

/// What the argv tokens resolve to under the catalogue.
#[derive(Debug, Default)]
struct InferredRefs {
    inputs: Vec<LineageRef>,
    outputs: Vec<LineageRef>,
    code: Option<LineageRef>,
    parameters: BTreeMap<String, serde_json::Value>,
}

pub fn run(global_args: &GlobalArgs, args: &CmdArgs) -> Result<()> {
    let workspace = open_workspace(global_args)?;
    let _lock = workspace.lock()?;

    let inferred = infer_refs(&workspace, &args.argv)?;
    let step_name = match &args.step {
        Some(step) => step.clone(),
        None => inferred
            .code
            .as_ref()
            .and_then(|code| code.subpath.as_deref())
            .and_then(|subpath| Path::new(subpath).file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.argv[0].clone()),
    };

    let mut adaptors = resource::build_all(&workspace)?;
    let mut resolver = |resource_name: &str| -> Result<String> {
        let adaptor = adaptors
            .iter_mut()
            .find(|adaptor| adaptor.name() == resource_name)
            .ok_or_else(|| WorkspaceError::usage(format!("unknown resource '{resource_name}'")))?;
        adaptor.current_hash()
    };

    let lineage = LineageStore::new(workspace.store().clone());
    let mut graph = lineage.load_working()?;
    let token = graph.begin_step(
        &step_name,
        inferred.inputs.clone(),
        inferred.parameters.clone(),
        inferred.code.clone(),
        &mut resolver,
    )?;

    ui::cli::log!("Running step '{step_name}': {}", args.argv.join(" "));
    let status = Command::new(&args.argv[0])
        .args(&args.argv[1..])
        .status()
        .with_context(|| format!("Could not run '{}'", args.argv[0]))?;
    if !status.success() {
        bail!(anyhow::Error::new(SubprocessFailure {
            program: args.argv[0].clone(),
            status: status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            detail: "the step command failed; no lineage was recorded".to_string(),
            transient: false,
        }));
    }

    graph.end_step(token, inferred.outputs.clone(), None)?;
    lineage.save_working(&graph)?;

    ui::cli::log!(
        "Recorded step '{step_name}' ({} inputs, {} outputs)",
        inferred.inputs.len(),
        inferred.outputs.len()
    );
    Ok(())
}

/// Map argv tokens onto lineage references: a token that resolves to a
/// path under a catalogue resource becomes a reference; its role and
/// pre-run existence decide input versus output. `--key=value` tokens are
/// captured as step parameters.
fn infer_refs(workspace: &Workspace, argv: &[String]) -> Result<InferredRefs> {
    let mut inferred = InferredRefs::default();

    // Resolved once so containment checks do not re-stat per token.
    let mut roots: Vec<(String, Role, std::path::PathBuf)> = Vec::new();
    for config in workspace.catalogue() {
        if let Ok(path) = workspace.resource_path(&config.name) {
            roots.push((config.name.clone(), config.role, path));
        }
    }

    for (position, token) in argv.iter().enumerate() {
        if let Some(stripped) = token.strip_prefix("--") {
            if let Some((key, value)) = stripped.split_once('=') {
                let parsed = value
                    .parse::<f64>()
                    .map(|number| serde_json::json!(number))
                    .unwrap_or_else(|_| serde_json::json!(value));
                inferred.parameters.insert(key.to_string(), parsed);
                continue;
            }
        }

        let candidate = Path::new(token);
        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            workspace.root().join(candidate)
        };

        let Some((resource_name, role, root)) = roots
            .iter()
            .find(|(_, _, root)| absolute.starts_with(root))
        else {
            continue;
        };
        let subpath = absolute
            .strip_prefix(root)
            .ok()
            .filter(|rest| !rest.as_os_str().is_empty())
            .map(|rest| hashing::unix_path(rest));
        let reference = LineageRef::new(resource_name.clone(), subpath);

        match role {
            Role::Code => {
                if position > 0 || argv.len() == 1 {
                    inferred.code.get_or_insert(reference);
                }
            }
            Role::SourceData => inferred.inputs.push(reference),
            Role::IntermediateData | Role::Results => {
                if absolute.exists() {
                    inferred.inputs.push(reference);
                } else {
                    inferred.outputs.push(reference);
                }
            }
        }
    }

    Ok(inferred)
}

#[cfg(test)]
mod tests {
    use crate::{
        vcs::GitRepo,
        workspace::config::{BackendConfig, ResourceConfig},
    };

    use super::*;

    fn demo_workspace(dir: &Path) -> Result<Workspace> {
        let repo = GitRepo::new(dir);
        repo.init()?;
        repo.run(&["config", "user.email", "test@example.com"])?;
        repo.run(&["config", "user.name", "test"])?;
        let mut workspace = Workspace::init(dir, "demo", "testhost")?;

        for (name, role) in [
            ("raw", Role::SourceData),
            ("mid", Role::IntermediateData),
            ("scripts", Role::Code),
        ] {
            std::fs::create_dir_all(dir.join(name))?;
            workspace.add_resource(
                ResourceConfig {
                    name: name.to_string(),
                    role,
                    read_only: false,
                    backend: BackendConfig::LocalFiles {},
                },
                dir.join(name),
            )?;
        }
        Ok(workspace)
    }

    #[test]
    fn test_infer_classifies_by_role_and_existence() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let workspace = demo_workspace(dir.path())?;
        std::fs::write(dir.path().join("raw/data.csv"), "1")?;
        std::fs::write(dir.path().join("scripts/prep.py"), "pass")?;

        let argv = vec![
            "python".to_string(),
            dir.path().join("scripts/prep.py").to_string_lossy().into_owned(),
            dir.path().join("raw/data.csv").to_string_lossy().into_owned(),
            dir.path().join("mid/out.parquet").to_string_lossy().into_owned(),
            "--epochs=5".to_string(),
        ];
        let inferred = infer_refs(&workspace, &argv)?;

        assert_eq!(
            inferred.code,
            Some(LineageRef::new("scripts", Some("prep.py".to_string())))
        );
        assert_eq!(
            inferred.inputs,
            vec![LineageRef::new("raw", Some("data.csv".to_string()))]
        );
        assert_eq!(
            inferred.outputs,
            vec![LineageRef::new("mid", Some("out.parquet".to_string()))]
        );
        assert_eq!(inferred.parameters["epochs"], serde_json::json!(5.0));
        Ok(())
    }

    #[test]
    fn test_pre_existing_intermediate_is_an_input() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let workspace = demo_workspace(dir.path())?;
        std::fs::write(dir.path().join("mid/out.parquet"), "rows")?;

        let argv = vec![
            "python".to_string(),
            dir.path().join("mid/out.parquet").to_string_lossy().into_owned(),
        ];
        let inferred = infer_refs(&workspace, &argv)?;
        assert_eq!(
            inferred.inputs,
            vec![LineageRef::new("mid", Some("out.parquet".to_string()))]
        );
        assert!(inferred.outputs.is_empty());
        Ok(())
    }
}
