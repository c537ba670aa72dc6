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

use thiserror::Error;

pub const EXIT_OK: i32 = 0;
pub const EXIT_USER: i32 = 1;
pub const EXIT_SYSTEM: i32 = 2;
pub const EXIT_INCONSISTENT: i32 = 3;

/// Error classes surfaced at the engine boundary. Backend-specific failures
/// are translated into one of these at the adaptor edge; the engines never
/// inspect backend error strings.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Bad arguments, unknown resources, tag clashes. No side effects.
    #[error("{0}")]
    Usage(String),

    /// A precondition failed (dirty resource, remote ahead, missing tool).
    /// No side effects.
    #[error("{message}")]
    Precondition {
        message: String,
        remedy: Option<String>,
    },

    /// Data integrity problem: inconsistent lineage, schema drift, a hash
    /// that changed between the precheck and execute reads.
    #[error("{0}")]
    Inconsistency(String),

    /// A backend operation failed, annotated with resource and phase.
    #[error("resource '{resource}' failed during {phase}: {message}")]
    Backend {
        resource: String,
        phase: &'static str,
        message: String,
    },
}

impl WorkspaceError {
    pub fn usage(message: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self::Usage(message.into()))
    }

    pub fn precondition(message: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self::Precondition {
            message: message.into(),
            remedy: None,
        })
    }

    pub fn precondition_with_remedy(
        message: impl Into<String>,
        remedy: impl Into<String>,
    ) -> anyhow::Error {
        anyhow::Error::new(Self::Precondition {
            message: message.into(),
            remedy: Some(remedy.into()),
        })
    }

    pub fn inconsistency(message: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self::Inconsistency(message.into()))
    }

    pub fn backend(
        resource: impl Into<String>,
        phase: &'static str,
        source: anyhow::Error,
    ) -> anyhow::Error {
        anyhow::Error::new(Self::Backend {
            resource: resource.into(),
            phase,
            message: format!("{source:#}"),
        })
    }
}

/// A non-zero exit from an external tool. Kept as a typed error so the sync
/// engine can recognise transient network failures and retry them.
#[derive(Debug, Error)]
#[error("{program} exited with status {status}: {detail}")]
pub struct SubprocessFailure {
    pub program: String,
    pub status: String,
    pub detail: String,
    pub transient: bool,
}

/// True if the error chain contains a subprocess failure that looks like a
/// transient network problem.
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<SubprocessFailure>()
            .is_some_and(|f| f.transient)
    })
}

/// Map an error chain onto the documented exit codes.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(workspace_err) = cause.downcast_ref::<WorkspaceError>() {
            return match workspace_err {
                WorkspaceError::Usage(_) | WorkspaceError::Precondition { .. } => EXIT_USER,
                WorkspaceError::Inconsistency(_) => EXIT_INCONSISTENT,
                WorkspaceError::Backend { .. } => EXIT_SYSTEM,
            };
        }
    }
    EXIT_SYSTEM
}

/// The remediation hint attached to a precondition error, if any.
pub fn remedy(err: &anyhow::Error) -> Option<&str> {
    err.chain().find_map(|cause| {
        match cause.downcast_ref::<WorkspaceError>() {
            Some(WorkspaceError::Precondition {
                remedy: Some(remedy),
                ..
            }) => Some(remedy.as_str()),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&WorkspaceError::usage("bad args")), EXIT_USER);
        assert_eq!(
            exit_code(&WorkspaceError::precondition("dirty")),
            EXIT_USER
        );
        assert_eq!(
            exit_code(&WorkspaceError::inconsistency("lineage")),
            EXIT_INCONSISTENT
        );
        assert_eq!(
            exit_code(&WorkspaceError::backend(
                "data",
                "push",
                anyhow::anyhow!("boom")
            )),
            EXIT_SYSTEM
        );
        assert_eq!(exit_code(&anyhow::anyhow!("unclassified")), EXIT_SYSTEM);
    }

    #[test]
    fn test_exit_code_sees_through_context() {
        let err = WorkspaceError::usage("both --only and --leave given")
            .context("restore failed");
        assert_eq!(exit_code(&err), EXIT_USER);
    }

    #[test]
    fn test_transient_detection() {
        let failure = SubprocessFailure {
            program: "git".to_string(),
            status: "128".to_string(),
            detail: "could not resolve host".to_string(),
            transient: true,
        };
        let err = anyhow::Error::new(failure).context("push failed");
        assert!(is_transient(&err));
        assert!(!is_transient(&anyhow::anyhow!("plain")));
    }
}
