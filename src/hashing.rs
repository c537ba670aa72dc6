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

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::global::defaults::SHORT_HASH_LEN;

pub const HASH_HEX_LEN: usize = 40;

/// Calculate the SHA-1 hash of a stream of bytes as a 40-hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let hash = Sha1::digest(data);
    format!("{hash:x}")
}

pub fn hash_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path)
        .with_context(|| format!("Could not read '{}' for hashing", path.display()))?;
    Ok(hash_bytes(&data))
}

/// Display prefix of a snapshot or content hash.
pub fn short(hash: &str) -> &str {
    &hash[..SHORT_HASH_LEN.min(hash.len())]
}

pub fn is_hex_prefix(s: &str) -> bool {
    !s.is_empty() && s.len() <= HASH_HEX_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Relative paths excluded from a tree walk. A prefix excludes the whole
/// subtree below it. Matching is by path components, so `snapshots`
/// excludes `snapshots/run1/a.csv` but not `snapshots-old`.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    prefixes: BTreeSet<PathBuf>,
}

impl ExcludeSet {
    pub fn new<I, P>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn insert(&mut self, prefix: impl Into<PathBuf>) {
        self.prefixes.insert(prefix.into());
    }

    pub fn contains(&self, relative: &Path) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| relative.starts_with(prefix))
    }
}

/// One file captured by a tree walk, as persisted in the per-resource file
/// catalogues used by the local-files backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub hash: String,
    pub size: u64,
    /// Modification time in whole seconds since the epoch, re-applied on
    /// restore.
    pub mtime: i64,
}

/// Compute a stable digest over a directory tree.
///
/// The walk visits entries in sorted order and emits one canonical line
/// `<relpath> <sha1-of-bytes>` per file; the digest is the SHA-1 of the
/// line stream. Two machines holding the same bytes under the same exclude
/// set produce the same digest. Bytes are hashed exactly as stored, with no
/// line-ending normalisation.
pub fn hash_tree(root: &Path, excludes: &ExcludeSet) -> Result<String> {
    let mut hasher = Sha1::new();
    walk(root, Path::new(""), excludes, &mut |relative, file_hash, _| {
        hasher.update(line_for(relative, file_hash).as_bytes());
    })?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Like [`hash_tree`], additionally returning the per-file catalogue keyed
/// by slash-separated relative path.
pub fn hash_tree_with_files(
    root: &Path,
    excludes: &ExcludeSet,
) -> Result<(String, BTreeMap<String, FileEntry>)> {
    let mut hasher = Sha1::new();
    let mut files = BTreeMap::new();
    walk(root, Path::new(""), excludes, &mut |relative, file_hash, meta| {
        hasher.update(line_for(relative, file_hash).as_bytes());
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        files.insert(
            unix_path(relative),
            FileEntry {
                hash: file_hash.to_string(),
                size: meta.len(),
                mtime,
            },
        );
    })?;
    Ok((format!("{:x}", hasher.finalize()), files))
}

fn line_for(relative: &Path, file_hash: &str) -> String {
    format!("{} {}\n", unix_path(relative), file_hash)
}

/// Relative path with `/` separators, independent of the host platform.
pub fn unix_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn walk(
    root: &Path,
    relative: &Path,
    excludes: &ExcludeSet,
    visit: &mut impl FnMut(&Path, &str, &std::fs::Metadata),
) -> Result<()> {
    let dir = root.join(relative);
    let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)
        .with_context(|| format!("Could not list '{}'", dir.display()))?
        .map(|entry| Ok(entry?.path()))
        .collect::<Result<_>>()?;
    entries.sort();

    for entry in entries {
        let name = match entry.file_name() {
            Some(name) => name,
            None => continue,
        };
        let entry_relative = relative.join(name);
        if excludes.contains(&entry_relative) {
            continue;
        }

        if entry.is_dir() {
            walk(root, &entry_relative, excludes, visit)?;
        } else if entry.is_file() {
            let meta = entry
                .metadata()
                .with_context(|| format!("Could not stat '{}'", entry.display()))?;
            let file_hash = hash_file(&entry)?;
            visit(&entry_relative, &file_hash, &meta);
        }
        // Symlinks and special files are not part of the content address.
    }

    Ok(())
}
