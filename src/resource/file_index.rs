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

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use filetime::FileTime;
use serde::{Deserialize, Serialize};

use crate::hashing::{self, ExcludeSet, FileEntry};

const BLOBS_DIR: &str = "blobs";
const STATE_FILE: &str = "state.json";

/// The per-snapshot file catalogue of a directory-backed resource.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogueDoc {
    files: BTreeMap<String, FileEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDoc {
    last_hash: Option<String>,
}

/// Side index for backends that restore by re-materialising files: one
/// catalogue JSON per captured tree hash mapping relative paths to file
/// hashes, next to a content-addressed blob store holding the bytes.
/// Lives under the metadata directory and stays out of the backing
/// repository.
#[derive(Debug, Clone)]
pub struct FileIndex {
    dir: PathBuf,
}

impl FileIndex {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn catalogue_path(&self, tree_hash: &str) -> PathBuf {
        self.dir.join(format!("{tree_hash}.json"))
    }

    fn blob_path(&self, file_hash: &str) -> PathBuf {
        self.dir.join(BLOBS_DIR).join(file_hash)
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Tree hash recorded by the most recent capture, if any.
    pub fn last_recorded_hash(&self) -> Option<String> {
        let data = std::fs::read(self.state_path()).ok()?;
        serde_json::from_slice::<StateDoc>(&data).ok()?.last_hash
    }

    pub fn has_catalogue(&self, tree_hash: &str) -> bool {
        self.catalogue_path(tree_hash).exists()
    }

    /// Capture `root`: hash the tree, store any blobs not yet present, and
    /// write the catalogue for this tree hash. Returns the tree hash.
    pub fn record(&self, root: &Path, excludes: &ExcludeSet) -> Result<String> {
        let (tree_hash, files) = hashing::hash_tree_with_files(root, excludes)?;

        std::fs::create_dir_all(self.dir.join(BLOBS_DIR))
            .with_context(|| format!("Could not create '{}'", self.dir.display()))?;

        for (relative, entry) in &files {
            let blob = self.blob_path(&entry.hash);
            if !blob.exists() {
                std::fs::copy(root.join(relative), &blob).with_context(|| {
                    format!("Could not store blob for '{relative}'")
                })?;
            }
        }

        write_atomic(
            &self.catalogue_path(&tree_hash),
            &serde_json::to_vec_pretty(&CatalogueDoc { files })?,
        )?;
        write_atomic(
            &self.state_path(),
            &serde_json::to_vec_pretty(&StateDoc {
                last_hash: Some(tree_hash.clone()),
            })?,
        )?;

        Ok(tree_hash)
    }

    /// Verify the catalogue and every blob needed to materialise
    /// `tree_hash` are present.
    pub fn verify(&self, tree_hash: &str) -> Result<()> {
        let catalogue = self.load_catalogue(tree_hash)?;
        for (relative, entry) in &catalogue {
            if !self.blob_path(&entry.hash).exists() {
                bail!(
                    "blob for '{relative}' ({}) is missing from the file index",
                    hashing::short(&entry.hash)
                );
            }
        }
        Ok(())
    }

    /// Materialise `tree_hash` at `root`: rewrite files whose content
    /// differs, re-apply recorded modification times, and remove files not
    /// in the catalogue (outside the exclude set).
    pub fn restore(&self, root: &Path, tree_hash: &str, excludes: &ExcludeSet) -> Result<()> {
        let catalogue = self.load_catalogue(tree_hash)?;
        let (_, present) = hashing::hash_tree_with_files(root, excludes)?;

        for (relative, entry) in &catalogue {
            let target = root.join(relative);
            if present.get(relative).map(|p| p.hash.as_str()) != Some(entry.hash.as_str()) {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(self.blob_path(&entry.hash), &target)
                    .with_context(|| format!("Could not materialise '{relative}'"))?;
            }
            filetime::set_file_mtime(&target, FileTime::from_unix_time(entry.mtime, 0))
                .with_context(|| format!("Could not set mtime of '{relative}'"))?;
        }

        for relative in present.keys() {
            if !catalogue.contains_key(relative) {
                std::fs::remove_file(root.join(relative))
                    .with_context(|| format!("Could not remove extraneous '{relative}'"))?;
            }
        }

        write_atomic(
            &self.state_path(),
            &serde_json::to_vec_pretty(&StateDoc {
                last_hash: Some(tree_hash.to_string()),
            })?,
        )?;
        Ok(())
    }

    /// Paths present in only one catalogue or recorded with different
    /// content.
    pub fn diff(&self, from_hash: &str, to_hash: &str) -> Result<BTreeSet<String>> {
        let from = self.load_catalogue(from_hash)?;
        let to = self.load_catalogue(to_hash)?;

        let mut changed = BTreeSet::new();
        for (relative, entry) in &from {
            match to.get(relative) {
                Some(other) if other.hash == entry.hash => {}
                _ => {
                    changed.insert(relative.clone());
                }
            }
        }
        for relative in to.keys() {
            if !from.contains_key(relative) {
                changed.insert(relative.clone());
            }
        }
        Ok(changed)
    }

    fn load_catalogue(&self, tree_hash: &str) -> Result<BTreeMap<String, FileEntry>> {
        let path = self.catalogue_path(tree_hash);
        let data = std::fs::read(&path).with_context(|| {
            format!(
                "no file catalogue for tree {} under '{}'",
                hashing::short(tree_hash),
                self.dir.display()
            )
        })?;
        let doc: CatalogueDoc = serde_json::from_slice(&data)
            .with_context(|| format!("Could not parse '{}'", path.display()))?;
        Ok(doc.files)
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_restore_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().join("data");
        std::fs::create_dir_all(root.join("sub"))?;
        std::fs::write(root.join("a.txt"), "alpha")?;
        std::fs::write(root.join("sub/b.txt"), "beta")?;

        let index = FileIndex::new(dir.path().join("index"));
        let excludes = ExcludeSet::default();
        let captured = index.record(&root, &excludes)?;
        assert_eq!(index.last_recorded_hash().as_deref(), Some(captured.as_str()));

        // Mutate, delete, and add; then restore the captured state.
        std::fs::write(root.join("a.txt"), "changed")?;
        std::fs::remove_file(root.join("sub/b.txt"))?;
        std::fs::write(root.join("extra.txt"), "extra")?;

        index.verify(&captured)?;
        index.restore(&root, &captured, &excludes)?;

        assert_eq!(std::fs::read_to_string(root.join("a.txt"))?, "alpha");
        assert_eq!(std::fs::read_to_string(root.join("sub/b.txt"))?, "beta");
        assert!(!root.join("extra.txt").exists());
        assert_eq!(hashing::hash_tree(&root, &excludes)?, captured);
        Ok(())
    }

    #[test]
    fn test_diff_between_captures() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().join("data");
        std::fs::create_dir_all(&root)?;
        std::fs::write(root.join("keep.txt"), "same")?;
        std::fs::write(root.join("change.txt"), "one")?;

        let index = FileIndex::new(dir.path().join("index"));
        let excludes = ExcludeSet::default();
        let first = index.record(&root, &excludes)?;

        std::fs::write(root.join("change.txt"), "two")?;
        std::fs::write(root.join("new.txt"), "new")?;
        let second = index.record(&root, &excludes)?;

        let changed = index.diff(&first, &second)?;
        assert_eq!(
            changed,
            BTreeSet::from(["change.txt".to_string(), "new.txt".to_string()])
        );
        Ok(())
    }

    #[test]
    fn test_verify_reports_missing_blob() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().join("data");
        std::fs::create_dir_all(&root)?;
        std::fs::write(root.join("a.txt"), "alpha")?;

        let index = FileIndex::new(dir.path().join("index"));
        let captured = index.record(&root, &ExcludeSet::default())?;

        let blob = index.blob_path(&hashing::hash_bytes(b"alpha"));
        std::fs::remove_file(blob)?;
        assert!(index.verify(&captured).is_err());
        Ok(())
    }
}
