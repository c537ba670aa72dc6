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
    use std::collections::BTreeMap;

    use anyhow::Result;
    use coati::{
        commands::{cmd_publish, cmd_pull, cmd_push},
        engine::sync,
        lineage::{LineageRef, store::LineageStore},
        workspace::{Workspace, config::Role, store::Store},
    };
    use tempfile::tempdir;

    use crate::{
        integration_tests::{add_local_resource, init_workspace, take_snapshot},
        test_utils,
    };

    #[test]
    fn test_publish_then_push_and_pull() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path().join("work");
        std::fs::create_dir(&root)?;
        let origin = tmp.path().join("origin.git");
        test_utils::init_bare_repo(&origin)?;

        let global = init_workspace(&root)?;
        add_local_resource(&global, &root, "data", Role::SourceData, &[("d.csv", "1")])?;
        take_snapshot(&global, "V1")?;

        cmd_publish::run(
            &global,
            &cmd_publish::CmdArgs {
                url: origin.to_string_lossy().into_owned(),
            },
        )?;
        cmd_push::run(&global, &cmd_push::CmdArgs { skip: Vec::new() })?;
        cmd_pull::run(&global, &cmd_pull::CmdArgs {})?;
        Ok(())
    }

    #[test]
    fn test_push_without_remote_is_refused() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;

        let err = cmd_push::run(&global, &cmd_push::CmdArgs { skip: Vec::new() }).unwrap_err();
        assert_eq!(coati::errors::exit_code(&err), 1);
        Ok(())
    }

    /// A successful pull clears the lineage working set.
    #[test]
    fn test_pull_invalidates_lineage() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path().join("work");
        std::fs::create_dir(&root)?;
        let origin = tmp.path().join("origin.git");
        test_utils::init_bare_repo(&origin)?;

        let global = init_workspace(&root)?;
        add_local_resource(&global, &root, "raw", Role::SourceData, &[("d.csv", "1")])?;
        cmd_publish::run(
            &global,
            &cmd_publish::CmdArgs {
                url: origin.to_string_lossy().into_owned(),
            },
        )?;

        let lineage = LineageStore::new(Store::new(&root));
        let mut graph = lineage.load_working()?;
        let token = graph.begin_step(
            "s1",
            vec![LineageRef::new("raw", None)],
            BTreeMap::new(),
            None,
            &mut |_| Ok("e".repeat(40)),
        )?;
        graph.end_step(token, vec![LineageRef::new("mid", None)], None)?;
        lineage.save_working(&graph)?;
        assert!(!lineage.load_working()?.is_empty());

        cmd_pull::run(&global, &cmd_pull::CmdArgs {})?;
        assert!(lineage.load_working()?.is_empty());
        Ok(())
    }

    /// Clone re-materialises the catalogue on a fresh machine: the shared
    /// documents arrive through the repository, local parameters are
    /// created for the new clone.
    #[test]
    fn test_clone_rebuilds_local_state() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path().join("work");
        std::fs::create_dir(&root)?;
        let origin = tmp.path().join("origin.git");
        test_utils::init_bare_repo(&origin)?;

        let global = init_workspace(&root)?;
        add_local_resource(&global, &root, "data", Role::SourceData, &[("d.csv", "1")])?;
        take_snapshot(&global, "V1")?;
        cmd_publish::run(
            &global,
            &cmd_publish::CmdArgs {
                url: origin.to_string_lossy().into_owned(),
            },
        )?;

        let clone_dir = tmp.path().join("clone");
        let cloned = sync::clone(
            &origin.to_string_lossy(),
            &clone_dir,
            Some("otherhost".to_string()),
        )?;
        assert_eq!(cloned.name(), "demo");
        assert_eq!(cloned.hostname(), "otherhost");
        assert_eq!(cloned.catalogue().len(), 1);
        // The local-files resource has no remote; its directory exists and
        // starts empty on the new clone.
        assert!(clone_dir.join("data").is_dir());

        // The clone sees the shared history.
        let history = coati::engine::snapshot::read_history(cloned.store())?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].tags, vec!["V1".to_string()]);

        let reopened = Workspace::open(&clone_dir)?;
        assert_eq!(reopened.hostname(), "otherhost");
        Ok(())
    }
}
