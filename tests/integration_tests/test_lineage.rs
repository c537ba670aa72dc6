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
        commands::cmd_restore,
        lineage::{Certificate, LineageRef, store::LineageStore},
        resource,
        workspace::{Workspace, config::Role, store::Store},
    };
    use tempfile::tempdir;

    use crate::integration_tests::{
        add_local_resource, init_workspace, latest_hash, take_snapshot,
    };

    fn lineage_for(root: &std::path::Path) -> LineageStore {
        LineageStore::new(Store::new(root))
    }

    /// Resolve a resource name to its live content hash through its
    /// adaptor, the way the run command does.
    fn version_of(workspace: &Workspace, name: &str) -> Result<String> {
        let config = workspace.resource(name)?.clone();
        resource::build(workspace, &config)?.current_hash()
    }

    /// Two chained steps: the frozen lineage of the snapshot holds both
    /// step records and the source-data record for the raw input.
    #[test]
    fn test_lineage_happy_path() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_local_resource(&global, root, "raw", Role::SourceData, &[("data.csv", "1,2")])?;
        add_local_resource(&global, root, "mid", Role::IntermediateData, &[])?;
        add_local_resource(&global, root, "final", Role::Results, &[])?;

        let workspace = Workspace::open(root)?;
        let lineage = lineage_for(root);
        let mut graph = lineage.load_working()?;

        let data = LineageRef::new("raw", Some("data.csv".to_string()));
        let mid = LineageRef::new("mid", Some("mid.parquet".to_string()));
        let final_out = LineageRef::new("final", Some("final.json".to_string()));

        let mut resolver = |name: &str| version_of(&workspace, name);
        let token = graph.begin_step("s1", vec![data.clone()], BTreeMap::new(), None, &mut resolver)?;
        graph.end_step(token, vec![mid.clone()], None)?;
        let token = graph.begin_step("s2", vec![mid.clone()], BTreeMap::new(), None, &mut resolver)?;
        graph.end_step(token, vec![final_out.clone()], None)?;
        lineage.save_working(&graph)?;

        take_snapshot(&global, "L1")?;

        let frozen = lineage.load_frozen(&latest_hash(root)?)?;
        assert_eq!(frozen.steps().len(), 2);
        assert_eq!(frozen.sources().count(), 1);
        let source = frozen.sources().next().unwrap();
        assert_eq!(source.reference, data);
        assert_eq!(source.version_hash.len(), 40);
        assert_eq!(
            frozen.certificate(&final_out),
            Some(&Certificate::Step {
                step: "s2".to_string(),
                generation: 0
            })
        );
        Ok(())
    }

    /// Restore replaces the working set with the snapshot's frozen graph.
    #[test]
    fn test_restore_reinstates_frozen_lineage() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path();
        let global = init_workspace(root)?;
        add_local_resource(&global, root, "raw", Role::SourceData, &[("data.csv", "1,2")])?;

        let workspace = Workspace::open(root)?;
        let lineage = lineage_for(root);
        let mut graph = lineage.load_working()?;
        let mut resolver = |name: &str| version_of(&workspace, name);
        let token = graph.begin_step(
            "s1",
            vec![LineageRef::new("raw", Some("data.csv".to_string()))],
            BTreeMap::new(),
            None,
            &mut resolver,
        )?;
        graph.end_step(token, vec![LineageRef::new("mid", None)], None)?;
        lineage.save_working(&graph)?;

        take_snapshot(&global, "L1")?;

        // More work lands in the working set after the snapshot.
        let mut graph = lineage.load_working()?;
        let token = graph.begin_step("s2", vec![], BTreeMap::new(), None, &mut resolver)?;
        graph.end_step(token, vec![LineageRef::new("final", None)], None)?;
        lineage.save_working(&graph)?;
        assert_eq!(lineage.load_working()?.steps().len(), 2);

        cmd_restore::run(
            &global,
            &cmd_restore::CmdArgs {
                reference: "L1".to_string(),
                only: Vec::new(),
                leave: Vec::new(),
                no_new_snapshot: false,
            },
        )?;

        // Back to the single frozen step.
        assert_eq!(lineage.load_working()?.steps().len(), 1);
        Ok(())
    }
}
