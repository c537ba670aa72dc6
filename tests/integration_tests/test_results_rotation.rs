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

mod tests {
    use anyhow::Result;
    use coati::{commands::cmd_restore, workspace::config::Role};
    use tempfile::tempdir;

    use crate::integration_tests::{
        add_git_resource, history_of, init_workspace, take_snapshot,
    };

    /// Pending result files move into the per-snapshot subtree at snapshot
    /// time and disappear from the resource root.
    #[test]
    fn test_results_rotation() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_git_resource(
            &global,
            root,
            "results",
            Role::Results,
            "results.csv",
            "accuracy,0.9",
        )?;

        take_snapshot(&global, "V1")?;

        let rotated = root.join("results/snapshots/testhost-V1/results.csv");
        assert!(rotated.exists());
        assert!(!root.join("results/results.csv").exists());
        assert_eq!(std::fs::read_to_string(rotated)?, "accuracy,0.9");
        Ok(())
    }

    /// The rotated subtree only grows: earlier snapshot results survive
    /// later snapshots and restores.
    #[test]
    fn test_results_are_monotonic() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_git_resource(
            &global,
            root,
            "results",
            Role::Results,
            "results.csv",
            "run,1",
        )?;

        take_snapshot(&global, "V1")?;
        std::fs::write(root.join("results/results.csv"), "run,2")?;
        take_snapshot(&global, "V2")?;

        assert!(root.join("results/snapshots/testhost-V1/results.csv").exists());
        assert!(root.join("results/snapshots/testhost-V2/results.csv").exists());

        // A restore never reverts a results resource.
        cmd_restore::run(
            &global,
            &cmd_restore::CmdArgs {
                reference: "V1".to_string(),
                only: Vec::new(),
                leave: Vec::new(),
                no_new_snapshot: false,
            },
        )?;
        assert!(root.join("results/snapshots/testhost-V1/results.csv").exists());
        assert!(root.join("results/snapshots/testhost-V2/results.csv").exists());
        Ok(())
    }

    /// Numeric fields of a top-level results JSON land in the history
    /// entry.
    #[test]
    fn test_metrics_extraction_into_history() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_git_resource(
            &global,
            root,
            "results",
            Role::Results,
            "results.json",
            r#"{"accuracy": 0.93, "loss": 0.12, "notes": "first run"}"#,
        )?;

        take_snapshot(&global, "V1")?;

        let history = history_of(root)?;
        assert_eq!(history[0].metrics.get("accuracy"), Some(&0.93));
        assert_eq!(history[0].metrics.get("loss"), Some(&0.12));
        assert!(!history[0].metrics.contains_key("notes"));
        Ok(())
    }
}
