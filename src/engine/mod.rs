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

pub mod restore;
pub mod snapshot;
pub mod sync;

use anyhow::Result;

use crate::{
    engine::snapshot::{HistoryEntry, read_history},
    errors::WorkspaceError,
    hashing,
    workspace::store::Store,
};

/// Resolve a snapshot reference: a tag, or a unique hash prefix. Tags are
/// host-scoped for uniqueness but globally visible here; a tag used on
/// several hosts resolves to the newest entry carrying it.
pub fn resolve_ref(store: &Store, reference: &str) -> Result<HistoryEntry> {
    let history = read_history(store)?;

    // Newest entry wins for tag lookup; the file is ordered oldest-first.
    if let Some(entry) = history
        .iter()
        .rev()
        .find(|entry| entry.tags.iter().any(|tag| tag == reference))
    {
        return Ok(entry.clone());
    }

    if hashing::is_hex_prefix(reference) {
        let mut matches: Vec<&HistoryEntry> = Vec::new();
        for entry in history.iter().rev() {
            if entry.hash.starts_with(reference)
                && !matches.iter().any(|m| m.hash == entry.hash)
            {
                matches.push(entry);
            }
        }
        match matches.len() {
            0 => {}
            1 => return Ok(matches[0].clone()),
            _ => {
                return Err(WorkspaceError::usage(format!(
                    "'{reference}' is ambiguous: it prefixes {} snapshots",
                    matches.len()
                )));
            }
        }
    }

    Err(WorkspaceError::usage(format!(
        "'{reference}' is neither a known tag nor a snapshot hash prefix"
    )))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::engine::snapshot::append_history;

    use super::*;

    fn entry(hash: &str, tags: &[&str], hostname: &str) -> HistoryEntry {
        HistoryEntry {
            hash: hash.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            hostname: hostname.to_string(),
            timestamp: Utc::now(),
            message: String::new(),
            metrics: Default::default(),
        }
    }

    #[test]
    fn test_resolve_by_tag_and_prefix() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::new(dir.path());

        append_history(&store, entry(&"a".repeat(40), &["V1"], "h1"))?;
        append_history(&store, entry(&"b".repeat(40), &["V2"], "h1"))?;

        assert_eq!(resolve_ref(&store, "V1")?.hash, "a".repeat(40));
        assert_eq!(resolve_ref(&store, "bbbb")?.hash, "b".repeat(40));
        assert!(resolve_ref(&store, "nothere").is_err());
        Ok(())
    }

    #[test]
    fn test_ambiguous_prefix_is_usage_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::new(dir.path());

        append_history(&store, entry(&format!("a{}", "0".repeat(39)), &[], "h1"))?;
        append_history(&store, entry(&format!("a{}", "1".repeat(39)), &[], "h1"))?;

        let err = resolve_ref(&store, "a").unwrap_err();
        assert_eq!(crate::errors::exit_code(&err), 1);
        Ok(())
    }

    #[test]
    fn test_cross_host_tag_resolves_to_newest() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::new(dir.path());

        append_history(&store, entry(&"a".repeat(40), &["final"], "h1"))?;
        append_history(&store, entry(&"b".repeat(40), &["final"], "h2"))?;

        assert_eq!(resolve_ref(&store, "final")?.hash, "b".repeat(40));
        Ok(())
    }
}
