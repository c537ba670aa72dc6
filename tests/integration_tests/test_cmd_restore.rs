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
    use coati::{commands::cmd_restore, vcs::GitRepo, workspace::config::Role};
    use tempfile::tempdir;

    use crate::{
        integration_tests::{
            add_git_resource, add_local_resource, history_of, init_workspace, take_snapshot,
        },
        test_utils,
    };

    fn restore_args(reference: &str) -> cmd_restore::CmdArgs {
        cmd_restore::CmdArgs {
            reference: reference.to_string(),
            only: Vec::new(),
            leave: Vec::new(),
            no_new_snapshot: false,
        }
    }

    /// Snapshot, change, snapshot, restore the first: the file returns to
    /// its first content.
    #[test]
    fn test_snapshot_restore_git() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_git_resource(&global, root, "code", Role::Code, "t.py", "print('a')")?;

        take_snapshot(&global, "V1")?;
        test_utils::commit_file(
            &GitRepo::new(root.join("code")),
            "t.py",
            "print('a')\n#x",
            "append",
        )?;
        take_snapshot(&global, "V2")?;

        cmd_restore::run(&global, &restore_args("V1"))?;
        assert_eq!(
            std::fs::read_to_string(root.join("code/t.py"))?,
            "print('a')"
        );
        Ok(())
    }

    /// Round trip: restoring the snapshot that matches the current state
    /// leaves every hash stable.
    #[test]
    fn test_restore_current_snapshot_is_a_noop() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_git_resource(&global, root, "code", Role::Code, "t.py", "print('a')")?;
        add_local_resource(&global, root, "data", Role::SourceData, &[("d.csv", "1,2")])?;

        take_snapshot(&global, "V1")?;
        let head_before = GitRepo::new(root.join("code")).head()?;

        cmd_restore::run(&global, &restore_args("V1"))?;
        assert_eq!(GitRepo::new(root.join("code")).head()?, head_before);
        assert_eq!(std::fs::read_to_string(root.join("data/d.csv"))?, "1,2");
        // No preservation snapshot was needed.
        assert_eq!(history_of(root)?.len(), 1);
        Ok(())
    }

    /// Selective restore only moves the named resource and appends no
    /// history.
    #[test]
    fn test_selective_restore() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_git_resource(&global, root, "code", Role::Code, "t.py", "print('a')")?;

        take_snapshot(&global, "V1")?;
        test_utils::commit_file(
            &GitRepo::new(root.join("code")),
            "t.py",
            "print('a')\n#x",
            "append",
        )?;
        take_snapshot(&global, "V2")?;
        cmd_restore::run(&global, &restore_args("V1"))?;
        let history_len = history_of(root)?.len();

        let mut args = restore_args("V2");
        args.only = vec!["code".to_string()];
        cmd_restore::run(&global, &args)?;

        assert!(std::fs::read_to_string(root.join("code/t.py"))?.ends_with("#x"));
        assert_eq!(history_of(root)?.len(), history_len);
        Ok(())
    }

    /// With --no-new-snapshot, uncaptured work refuses the restore and the
    /// filesystem is untouched.
    #[test]
    fn test_dirty_refusal() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_git_resource(&global, root, "code", Role::Code, "t.py", "print('a')")?;
        add_local_resource(
            &global,
            root,
            "data",
            Role::SourceData,
            &[("keep.csv", "1"), ("gone.csv", "2")],
        )?;

        take_snapshot(&global, "V1")?;
        test_utils::commit_file(
            &GitRepo::new(root.join("code")),
            "t.py",
            "print('a')\n#x",
            "append",
        )?;
        take_snapshot(&global, "V2")?;

        // Deleting a file leaves the data resource dirty.
        std::fs::remove_file(root.join("data/gone.csv"))?;

        let mut args = restore_args("V1");
        args.no_new_snapshot = true;
        let err = cmd_restore::run(&global, &args).unwrap_err();
        assert_eq!(coati::errors::exit_code(&err), 1);

        // Nothing changed beyond the manual deletion.
        assert!(std::fs::read_to_string(root.join("code/t.py"))?.ends_with("#x"));
        assert!(!root.join("data/gone.csv").exists());
        assert_eq!(std::fs::read_to_string(root.join("data/keep.csv"))?, "1");
        Ok(())
    }

    /// Without --no-new-snapshot, the dirty state is preserved in an
    /// automatic snapshot and the restore proceeds.
    #[test]
    fn test_dirty_restore_preserves_work_first() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_local_resource(&global, root, "data", Role::SourceData, &[("d.csv", "1,2")])?;

        take_snapshot(&global, "V1")?;
        std::fs::write(root.join("data/d.csv"), "3,4")?;

        cmd_restore::run(&global, &restore_args("V1"))?;
        assert_eq!(std::fs::read_to_string(root.join("data/d.csv"))?, "1,2");

        // The preservation snapshot is in the history with its generated
        // tag, and it captured the dirty content.
        let history = history_of(root)?;
        assert_eq!(history.len(), 2);
        assert!(
            history[1]
                .tags
                .iter()
                .any(|tag| tag.starts_with("pre-restore-"))
        );
        Ok(())
    }

    #[test]
    fn test_only_and_leave_cannot_be_combined() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_local_resource(&global, root, "data", Role::SourceData, &[("d.csv", "1")])?;
        take_snapshot(&global, "V1")?;

        let mut args = restore_args("V1");
        args.only = vec!["data".to_string()];
        args.leave = vec!["data".to_string()];
        let err = cmd_restore::run(&global, &args).unwrap_err();
        assert_eq!(coati::errors::exit_code(&err), 1);
        Ok(())
    }

    #[test]
    fn test_results_resource_in_only_is_an_error() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_git_resource(&global, root, "results", Role::Results, "r.csv", "0.9")?;
        take_snapshot(&global, "V1")?;

        let mut args = restore_args("V1");
        args.only = vec!["results".to_string()];
        let err = cmd_restore::run(&global, &args).unwrap_err();
        assert_eq!(coati::errors::exit_code(&err), 1);
        Ok(())
    }
}
