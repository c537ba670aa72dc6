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

use anyhow::{Context, Result};

use crate::{lineage::LineageGraph, workspace::store::Store};

const GRAPH_FILE: &str = "graph.json";

/// Persistence for the lineage working set and the frozen per-snapshot
/// graphs. The working set lives under `current_lineage/` and is excluded
/// from the backing repository; frozen graphs live under
/// `snapshot_lineage/<hash>/` and are versioned with the catalogue.
#[derive(Debug, Clone)]
pub struct LineageStore {
    store: Store,
}

impl LineageStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn working_graph_path(&self) -> PathBuf {
        self.store.current_lineage_dir().join(GRAPH_FILE)
    }

    pub fn load_working(&self) -> Result<LineageGraph> {
        let path = self.working_graph_path();
        if !path.exists() {
            return Ok(LineageGraph::new());
        }
        self.store.read_json(&path)
    }

    pub fn save_working(&self, graph: &LineageGraph) -> Result<()> {
        self.store.write_json(&self.working_graph_path(), graph)
    }

    /// Drop the working set. Run by any operation that makes the current
    /// lineage ambiguous (restore, pull).
    pub fn clear_working(&self) -> Result<()> {
        let dir = self.store.current_lineage_dir();
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Could not clear '{}'", dir.display()))?;
        }
        Ok(())
    }

    /// Copy the working set into a placeholder directory. The placeholder
    /// is renamed to its hash-keyed final name once the snapshot identity
    /// is known, or discarded on failure.
    pub fn freeze_to_placeholder(&self, graph: &LineageGraph) -> Result<PathBuf> {
        let placeholder = self
            .store
            .snapshot_lineage_root()
            .join(format!(".pending-{}", std::process::id()));
        if placeholder.exists() {
            std::fs::remove_dir_all(&placeholder)?;
        }
        self.store.write_json(&placeholder.join(GRAPH_FILE), graph)?;
        Ok(placeholder)
    }

    pub fn commit_frozen(&self, placeholder: &PathBuf, hash: &str) -> Result<()> {
        let final_dir = self.store.snapshot_lineage_dir(hash);
        if final_dir.exists() {
            // The same identity was snapshotted before; the frozen graph is
            // already in place.
            std::fs::remove_dir_all(placeholder)?;
            return Ok(());
        }
        std::fs::rename(placeholder, &final_dir).with_context(|| {
            format!("Could not move frozen lineage to '{}'", final_dir.display())
        })
    }

    pub fn discard_placeholder(&self, placeholder: &PathBuf) {
        let _ = std::fs::remove_dir_all(placeholder);
    }

    pub fn discard_frozen(&self, hash: &str) {
        let _ = std::fs::remove_dir_all(self.store.snapshot_lineage_dir(hash));
    }

    pub fn has_frozen(&self, hash: &str) -> bool {
        self.store
            .snapshot_lineage_dir(hash)
            .join(GRAPH_FILE)
            .exists()
    }

    pub fn load_frozen(&self, hash: &str) -> Result<LineageGraph> {
        let path = self.store.snapshot_lineage_dir(hash).join(GRAPH_FILE);
        if !path.exists() {
            return Ok(LineageGraph::new());
        }
        self.store.read_json(&path)
    }

    /// Replace the working set with the graph frozen for `hash`.
    pub fn restore_into_working(&self, hash: &str) -> Result<()> {
        let frozen = self.load_frozen(hash)?;
        self.clear_working()?;
        self.save_working(&frozen)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::lineage::LineageRef;

    use super::*;

    fn graph_with_one_step() -> Result<LineageGraph> {
        let mut graph = LineageGraph::new();
        let token = graph.begin_step(
            "prepare",
            vec![LineageRef::new("raw", None)],
            BTreeMap::new(),
            None,
            &mut |_| Ok("c".repeat(40)),
        )?;
        graph.end_step(token, vec![LineageRef::new("mid", None)], None)?;
        Ok(graph)
    }

    #[test]
    fn test_working_set_roundtrip_and_clear() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let lineage = LineageStore::new(Store::new(dir.path()));

        assert!(lineage.load_working()?.is_empty());

        lineage.save_working(&graph_with_one_step()?)?;
        assert_eq!(lineage.load_working()?.steps().len(), 1);

        lineage.clear_working()?;
        assert!(lineage.load_working()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_freeze_rename_and_restore() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let lineage = LineageStore::new(Store::new(dir.path()));
        let graph = graph_with_one_step()?;
        lineage.save_working(&graph)?;

        let placeholder = lineage.freeze_to_placeholder(&graph)?;
        assert!(placeholder.exists());
        lineage.commit_frozen(&placeholder, "abc123")?;
        assert!(!placeholder.exists());
        assert!(lineage.has_frozen("abc123"));

        lineage.clear_working()?;
        lineage.restore_into_working("abc123")?;
        assert_eq!(lineage.load_working()?.steps().len(), 1);
        Ok(())
    }

    #[test]
    fn test_commit_frozen_is_idempotent_per_hash() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let lineage = LineageStore::new(Store::new(dir.path()));
        let graph = graph_with_one_step()?;

        let first = lineage.freeze_to_placeholder(&graph)?;
        lineage.commit_frozen(&first, "abc123")?;

        let second = lineage.freeze_to_placeholder(&graph)?;
        lineage.commit_frozen(&second, "abc123")?;
        assert!(lineage.has_frozen("abc123"));
        assert!(!second.exists());
        Ok(())
    }
}
