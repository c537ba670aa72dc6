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
    use coati::{
        commands::cmd_snapshot,
        engine::snapshot::load_manifest,
        vcs::GitRepo,
        workspace::{config::Role, store::Store},
    };
    use tempfile::tempdir;

    use crate::{
        integration_tests::{add_git_resource, history_of, init_workspace, take_snapshot},
        test_utils,
    };

    #[test]
    fn test_snapshot_records_manifest_and_history() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_git_resource(&global, root, "code", Role::Code, "t.py", "print('a')")?;

        take_snapshot(&global, "V1")?;

        let history = history_of(root)?;
        assert_eq!(history.len(), 1);
        let entry = &history[0];
        assert_eq!(entry.hash.len(), 40);
        assert_eq!(entry.tags, vec!["V1".to_string()]);
        assert_eq!(entry.hostname, "testhost");

        let manifest = load_manifest(&Store::new(root), &entry.hash)?;
        assert_eq!(manifest.workspace, "demo");
        let code = manifest.resource("code").expect("code resource captured");
        // A Git resource is identified by its commit hash.
        assert_eq!(code.hash, GitRepo::new(root.join("code")).head()?);
        Ok(())
    }

    /// Snapshotting an unchanged workspace yields the same identity and
    /// appends a history entry without duplicating snapshot files.
    #[test]
    fn test_snapshot_is_deterministic_and_idempotent() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_git_resource(&global, root, "code", Role::Code, "t.py", "print('a')")?;

        take_snapshot(&global, "V1")?;
        take_snapshot(&global, "V2")?;

        let history = history_of(root)?;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].hash, history[1].hash);
        Ok(())
    }

    #[test]
    fn test_tag_reuse_on_same_host_is_refused() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_git_resource(&global, root, "code", Role::Code, "t.py", "print('a')")?;

        take_snapshot(&global, "V1")?;
        let err = take_snapshot(&global, "V1").unwrap_err();
        assert_eq!(coati::errors::exit_code(&err), 1);

        // With --force-tag the tag moves to the new entry.
        test_utils::commit_file(
            &GitRepo::new(root.join("code")),
            "t.py",
            "print('b')",
            "change",
        )?;
        cmd_snapshot::run(
            &global,
            &cmd_snapshot::CmdArgs {
                tag: Some("V1".to_string()),
                message: "again".to_string(),
                skip: Vec::new(),
                force_tag: true,
            },
        )?;
        assert_eq!(history_of(root)?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_skipped_resource_keeps_previous_state() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_git_resource(&global, root, "code", Role::Code, "t.py", "print('a')")?;
        add_git_resource(&global, root, "data", Role::SourceData, "d.csv", "1,2")?;

        take_snapshot(&global, "V1")?;
        let store = Store::new(root);
        let first = load_manifest(&store, &history_of(root)?[0].hash)?;

        // Change both, snapshot with data skipped: data keeps its V1 state.
        test_utils::commit_file(&GitRepo::new(root.join("code")), "t.py", "print('b')", "c")?;
        test_utils::commit_file(&GitRepo::new(root.join("data")), "d.csv", "3,4", "d")?;
        cmd_snapshot::run(
            &global,
            &cmd_snapshot::CmdArgs {
                tag: Some("V2".to_string()),
                message: String::new(),
                skip: vec!["data".to_string()],
                force_tag: false,
            },
        )?;

        let history = history_of(root)?;
        let second = load_manifest(&store, &history[1].hash)?;
        assert_ne!(
            first.resource("code").unwrap().hash,
            second.resource("code").unwrap().hash
        );
        assert_eq!(
            first.resource("data").unwrap().hash,
            second.resource("data").unwrap().hash
        );
        Ok(())
    }
}
