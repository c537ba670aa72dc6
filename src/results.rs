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
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};

use crate::{
    errors::WorkspaceError,
    global::defaults::{RESULTS_ROTATION_KEEP, RESULTS_SNAPSHOT_SUBDIR},
    hashing::{self, ExcludeSet},
    ui,
};

/// Where one rotation moved the pending result files, with enough detail
/// to move them back if a later snapshot phase fails.
#[derive(Debug, Clone)]
pub struct RotationReport {
    pub target: PathBuf,
    /// Pairs of (path before, path after), both relative to the resource
    /// root.
    pub moved: Vec<(PathBuf, PathBuf)>,
}

/// Render the per-snapshot subtree for a results resource, always below
/// `snapshots/`. The default layout is `<hostname>-<tag>`; a configured
/// template may use the {DAY}, {DATE_TIME}, {USER}, {TAG} and {HOSTNAME}
/// placeholders.
pub fn snapshot_subpath(
    template: Option<&str>,
    hostname: &str,
    tag: Option<&str>,
    now: DateTime<Utc>,
) -> PathBuf {
    let fallback_tag = now.format("%Y%m%dT%H%M%S").to_string();
    let tag = tag.unwrap_or(fallback_tag.as_str());

    let rendered = match template {
        Some(template) => template
            .replace("{DAY}", &now.format("%Y-%m-%d").to_string())
            .replace("{DATE_TIME}", &now.format("%Y%m%dT%H%M%S").to_string())
            .replace("{USER}", &whoami::username())
            .replace("{HOSTNAME}", hostname)
            .replace("{TAG}", tag),
        None => format!("{hostname}-{tag}"),
    };

    Path::new(RESULTS_SNAPSHOT_SUBDIR).join(rendered)
}

/// Move every pending file in the resource root into `subpath`, preserving
/// relative paths. The rotated subtree itself, the keep-list (README and
/// friends) and dotfiles stay in place. An existing target directory is
/// merged into; a file collision is an error.
pub fn rotate(root: &Path, subpath: &Path, excludes: &ExcludeSet) -> Result<RotationReport> {
    let mut rotation_excludes = excludes.clone();
    rotation_excludes.insert(RESULTS_SNAPSHOT_SUBDIR);

    let (_, files) = hashing::hash_tree_with_files(root, &rotation_excludes)?;

    let mut report = RotationReport {
        target: subpath.to_path_buf(),
        moved: Vec::new(),
    };

    for relative in files.keys() {
        let relative = PathBuf::from(relative);
        if is_kept_in_place(&relative) {
            continue;
        }

        let destination = subpath.join(&relative);
        let destination_abs = root.join(&destination);
        if destination_abs.exists() {
            bail!(WorkspaceError::precondition(format!(
                "results rotation would overwrite '{}'",
                destination.display()
            )));
        }
        if let Some(parent) = destination_abs.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(root.join(&relative), &destination_abs)
            .with_context(|| format!("Could not rotate '{}'", relative.display()))?;
        report.moved.push((relative, destination));
    }

    prune_empty_dirs(root, excludes)?;
    Ok(report)
}

/// Compensator for [`rotate`]: move every rotated file back to its
/// original place.
pub fn undo_rotation(root: &Path, report: &RotationReport) {
    for (original, rotated) in report.moved.iter().rev() {
        if let Some(parent) = root.join(original).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(err) = std::fs::rename(root.join(rotated), root.join(original)) {
            ui::cli::warning!(
                "could not move '{}' back to '{}': {err}",
                rotated.display(),
                original.display()
            );
        }
    }
    let _ = std::fs::remove_dir_all(root.join(&report.target));
}

fn is_kept_in_place(relative: &Path) -> bool {
    let first = relative
        .components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_default();
    if first.starts_with('.') {
        return true;
    }
    relative.components().count() == 1 && RESULTS_ROTATION_KEEP.contains(&first.as_str())
}

fn prune_empty_dirs(root: &Path, excludes: &ExcludeSet) -> Result<()> {
    fn prune(root: &Path, relative: &Path, excludes: &ExcludeSet) -> Result<bool> {
        let dir = root.join(relative);
        let mut empty = true;
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let entry_relative = relative.join(entry.file_name());
            if excludes.contains(&entry_relative)
                || entry_relative.starts_with(RESULTS_SNAPSHOT_SUBDIR)
            {
                empty = false;
                continue;
            }
            if entry.path().is_dir() {
                if prune(root, &entry_relative, excludes)? {
                    std::fs::remove_dir(entry.path())?;
                } else {
                    empty = false;
                }
            } else {
                empty = false;
            }
        }
        Ok(empty)
    }

    prune(root, Path::new(""), excludes).map(|_| ())
}

/// Best-effort numeric metrics from top-level JSON files in a results
/// resource. Scans each top-level `*.json` for numeric fields and records
/// them; anything unreadable is skipped. Never fails the snapshot.
pub fn extract_metrics(root: &Path) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();

    let Ok(entries) = std::fs::read_dir(root) else {
        return metrics;
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().is_some_and(|ext| ext == "json")
        })
        .collect();
    paths.sort();

    for path in paths {
        let Ok(data) = std::fs::read(&path) else {
            continue;
        };
        let Ok(serde_json::Value::Object(fields)) =
            serde_json::from_slice::<serde_json::Value>(&data)
        else {
            continue;
        };
        for (key, value) in fields {
            if let Some(number) = value.as_f64() {
                metrics.insert(key, number);
            }
        }
    }

    metrics
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_snapshot_subpath_default_and_template() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap();
        assert_eq!(
            snapshot_subpath(None, "trixie", Some("V1"), now),
            PathBuf::from("snapshots/trixie-V1")
        );

        let templated = snapshot_subpath(Some("{DAY}/{DATE_TIME}-{TAG}"), "trixie", Some("V1"), now);
        assert_eq!(
            templated,
            PathBuf::from("snapshots/2025-06-01/20250601T123000-V1")
        );

        // Without a tag the timestamp stands in.
        let untagged = snapshot_subpath(None, "trixie", None, now);
        assert_eq!(untagged, PathBuf::from("snapshots/trixie-20250601T123000"));
    }

    #[test]
    fn test_rotate_moves_pending_files_and_keeps_readme() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("results.csv"), "score,0.9")?;
        std::fs::create_dir(dir.path().join("plots"))?;
        std::fs::write(dir.path().join("plots/roc.png"), "png")?;
        std::fs::write(dir.path().join("README.md"), "about")?;

        let subpath = Path::new("snapshots/trixie-V1");
        let report = rotate(dir.path(), subpath, &ExcludeSet::default())?;

        assert!(dir.path().join("snapshots/trixie-V1/results.csv").exists());
        assert!(dir.path().join("snapshots/trixie-V1/plots/roc.png").exists());
        assert!(!dir.path().join("results.csv").exists());
        assert!(!dir.path().join("plots").exists());
        assert!(dir.path().join("README.md").exists());
        assert_eq!(report.moved.len(), 2);
        Ok(())
    }

    #[test]
    fn test_rotate_merges_but_refuses_collisions() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let subpath = Path::new("snapshots/other-V1");
        std::fs::create_dir_all(dir.path().join(subpath))?;
        std::fs::write(dir.path().join(subpath).join("earlier.csv"), "old")?;

        // A disjoint file merges into the existing target.
        std::fs::write(dir.path().join("new.csv"), "new")?;
        rotate(dir.path(), subpath, &ExcludeSet::default())?;
        assert!(dir.path().join(subpath).join("earlier.csv").exists());
        assert!(dir.path().join(subpath).join("new.csv").exists());

        // A colliding file is an error.
        std::fs::write(dir.path().join("new.csv"), "again")?;
        assert!(rotate(dir.path(), subpath, &ExcludeSet::default()).is_err());
        Ok(())
    }

    #[test]
    fn test_undo_rotation_restores_layout() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir(dir.path().join("plots"))?;
        std::fs::write(dir.path().join("plots/roc.png"), "png")?;

        let report = rotate(dir.path(), Path::new("snapshots/h-V1"), &ExcludeSet::default())?;
        assert!(!dir.path().join("plots/roc.png").exists());

        undo_rotation(dir.path(), &report);
        assert!(dir.path().join("plots/roc.png").exists());
        assert!(!dir.path().join("snapshots/h-V1").exists());
        Ok(())
    }

    #[test]
    fn test_extract_metrics_is_best_effort() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("results.json"),
            r#"{"accuracy": 0.93, "loss": 0.12, "model": "cnn"}"#,
        )?;
        std::fs::write(dir.path().join("broken.json"), "{not json")?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let metrics = extract_metrics(dir.path());
        assert_eq!(metrics.get("accuracy"), Some(&0.93));
        assert_eq!(metrics.get("loss"), Some(&0.12));
        assert!(!metrics.contains_key("model"));
        Ok(())
    }
}
