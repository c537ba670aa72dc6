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
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, bail};

use crate::{errors::SubprocessFailure, global::defaults::GIT_PROGRAM};

/// Narrow adaptor over the `git` binary. Every engine interaction with a
/// Git store funnels through here; callers never parse git's stderr.
#[derive(Debug, Clone)]
pub struct GitRepo {
    workdir: PathBuf,
}

impl GitRepo {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn is_repo(&self) -> bool {
        self.workdir.join(".git").exists()
    }

    /// Clone `url` into `target` and return a handle on the clone.
    pub fn clone_from(url: &str, target: &Path) -> Result<Self> {
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        run_git_in(
            parent,
            &[
                "clone",
                "--quiet",
                url,
                &target.file_name().unwrap_or_default().to_string_lossy(),
            ],
        )?;
        Ok(Self::new(target))
    }

    pub fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.workdir)
            .with_context(|| format!("Could not create '{}'", self.workdir.display()))?;
        self.run(&["init", "--quiet"])?;
        Ok(())
    }

    pub fn run(&self, args: &[&str]) -> Result<String> {
        run_git_in(&self.workdir, args)
    }

    pub fn head(&self) -> Result<String> {
        self.run(&["rev-parse", "HEAD"])
    }

    pub fn has_commits(&self) -> bool {
        self.run(&["rev-parse", "--verify", "--quiet", "HEAD"]).is_ok()
    }

    pub fn has_commit(&self, commit: &str) -> bool {
        self.run(&["cat-file", "-e", &format!("{commit}^{{commit}}")])
            .is_ok()
    }

    pub fn current_branch(&self) -> Result<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// `git status --porcelain`, optionally limited to one pathspec.
    pub fn status_porcelain(&self, pathspec: Option<&Path>) -> Result<Vec<String>> {
        let mut args = vec!["status", "--porcelain"];
        let pathspec_str;
        if let Some(path) = pathspec {
            pathspec_str = path.to_string_lossy().into_owned();
            args.push("--");
            args.push(&pathspec_str);
        }
        let output = self.run(&args)?;
        Ok(output
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn is_dirty(&self, pathspec: Option<&Path>) -> Result<bool> {
        Ok(!self.status_porcelain(pathspec)?.is_empty())
    }

    /// True while a merge or rebase is half-finished in this repository.
    pub fn in_progress_operation(&self) -> bool {
        let git_dir = self.workdir.join(".git");
        git_dir.join("MERGE_HEAD").exists()
            || git_dir.join("rebase-merge").exists()
            || git_dir.join("rebase-apply").exists()
    }

    pub fn add(&self, pathspec: &Path) -> Result<()> {
        self.run(&["add", "--all", "--", &pathspec.to_string_lossy()])?;
        Ok(())
    }

    pub fn add_all(&self) -> Result<()> {
        self.run(&["add", "--all"])?;
        Ok(())
    }

    /// Commit staged changes. Returns false when there was nothing to commit.
    pub fn commit(&self, message: &str) -> Result<bool> {
        if self.run(&["diff", "--cached", "--quiet"]).is_ok() {
            return Ok(false);
        }
        self.run(&["commit", "--quiet", "-m", message])?;
        Ok(true)
    }

    pub fn reset_hard(&self, commit: &str) -> Result<()> {
        self.run(&["reset", "--hard", commit])?;
        Ok(())
    }

    /// Materialise `subpath` as it was at `commit`, leaving the rest of the
    /// working copy untouched.
    pub fn checkout_paths(&self, commit: &str, subpath: &Path) -> Result<()> {
        self.run(&["checkout", commit, "--", &subpath.to_string_lossy()])?;
        Ok(())
    }

    /// Files recorded under `subpath` at `commit`, relative to the repo root.
    pub fn ls_tree(&self, commit: &str, subpath: &Path) -> Result<Vec<PathBuf>> {
        let output = self.run(&[
            "ls-tree",
            "-r",
            "--name-only",
            commit,
            "--",
            &subpath.to_string_lossy(),
        ])?;
        Ok(output.lines().map(PathBuf::from).collect())
    }

    pub fn diff_name_only(
        &self,
        from: &str,
        to: &str,
        pathspec: Option<&Path>,
    ) -> Result<Vec<String>> {
        let mut args = vec!["diff", "--name-only", from, to];
        let pathspec_str;
        if let Some(path) = pathspec {
            pathspec_str = path.to_string_lossy().into_owned();
            args.push("--");
            args.push(&pathspec_str);
        }
        let output = self.run(&args)?;
        Ok(output
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn remote_url(&self, name: &str) -> Option<String> {
        self.run(&["remote", "get-url", name]).ok()
    }

    pub fn set_remote(&self, name: &str, url: &str) -> Result<()> {
        if self.remote_url(name).is_some() {
            self.run(&["remote", "set-url", name, url])?;
        } else {
            self.run(&["remote", "add", name, url])?;
        }
        Ok(())
    }

    pub fn fetch(&self, remote: &str) -> Result<()> {
        self.run(&["fetch", "--quiet", remote])?;
        Ok(())
    }

    pub fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.run(&["push", "--quiet", remote, branch])?;
        Ok(())
    }

    pub fn push_upstream(&self, remote: &str, branch: &str) -> Result<()> {
        self.run(&["push", "--quiet", "--set-upstream", remote, branch])?;
        Ok(())
    }

    /// Incorporate the remote branch, replaying local commits on top.
    pub fn pull_rebase(&self, remote: &str, branch: &str) -> Result<()> {
        self.run(&["pull", "--quiet", "--rebase", remote, branch])?;
        Ok(())
    }

    /// Number of commits on the remote branch that are not local. Non-zero
    /// means a plain push would be refused.
    pub fn commits_behind_remote(&self, remote: &str, branch: &str) -> Result<u64> {
        let range = format!("{branch}..{remote}/{branch}");
        let output = self.run(&["rev-list", "--count", &range])?;
        output
            .trim()
            .parse()
            .with_context(|| format!("Unexpected rev-list output '{output}'"))
    }
}

fn run_git_in(workdir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new(GIT_PROGRAM)
        .current_dir(workdir)
        .args(args)
        .output()
        .with_context(|| format!("Could not run '{GIT_PROGRAM}'. Is it installed?"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let failure = SubprocessFailure {
            program: GIT_PROGRAM.to_string(),
            status: output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            detail: stderr.clone(),
            transient: looks_transient(&stderr),
        };
        bail!(anyhow::Error::new(failure).context(format!("git {}", args.join(" "))));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Heuristic classification of network trouble worth retrying.
fn looks_transient(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    ["could not resolve", "connection", "timed out", "temporar", "unable to access"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_available() -> bool {
        Command::new(GIT_PROGRAM)
            .arg("--version")
            .output()
            .is_ok()
    }

    fn init_with_identity(dir: &Path) -> Result<GitRepo> {
        let repo = GitRepo::new(dir);
        repo.init()?;
        repo.run(&["config", "user.email", "test@example.com"])?;
        repo.run(&["config", "user.name", "test"])?;
        Ok(repo)
    }

    #[test]
    fn test_commit_and_status() -> Result<()> {
        if !git_available() {
            return Ok(());
        }
        let dir = tempfile::tempdir()?;
        let repo = init_with_identity(dir.path())?;

        assert!(!repo.has_commits());
        std::fs::write(dir.path().join("t.py"), "print('a')")?;
        assert!(repo.is_dirty(None)?);

        repo.add_all()?;
        assert!(repo.commit("first")?);
        assert!(!repo.is_dirty(None)?);
        assert!(!repo.commit("empty")?);

        let head = repo.head()?;
        assert_eq!(head.len(), 40);
        assert!(repo.has_commit(&head));
        assert!(!repo.has_commit("0000000000000000000000000000000000000000"));
        Ok(())
    }

    #[test]
    fn test_reset_hard_restores_content() -> Result<()> {
        if !git_available() {
            return Ok(());
        }
        let dir = tempfile::tempdir()?;
        let repo = init_with_identity(dir.path())?;

        std::fs::write(dir.path().join("t.py"), "print('a')")?;
        repo.add_all()?;
        repo.commit("v1")?;
        let first = repo.head()?;

        std::fs::write(dir.path().join("t.py"), "print('a')\n#x")?;
        repo.add_all()?;
        repo.commit("v2")?;

        repo.reset_hard(&first)?;
        assert_eq!(std::fs::read_to_string(dir.path().join("t.py"))?, "print('a')");
        Ok(())
    }

    #[test]
    fn test_transient_classification() {
        assert!(looks_transient("fatal: Could not resolve host: example.com"));
        assert!(looks_transient("ssh: connect to host: Connection refused"));
        assert!(!looks_transient("fatal: not a git repository"));
    }
}
