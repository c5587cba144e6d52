use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hostvenv_domain::TargetVersion;

/// Failures of a single external process invocation.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs_f32())]
    Timeout { program: String, timeout: Duration },
    #[error("{program} exited with code {code}{}", detail_suffix(.detail))]
    NonZeroExit {
        program: String,
        code: i32,
        detail: String,
    },
    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

/// Failures of the provisioning steps built on top of the runner.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("no standalone python {target} found (searched PATH, install roots and the py launcher)")]
    NotFound { target: TargetVersion },
    #[error("could not remove existing environment at {}: {source}", .path.display())]
    DeleteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("package installer not found at {}", .path.display())]
    MissingInstaller { path: PathBuf },
    #[error("site-packages directory not found: {}", .path.display())]
    SitePackagesMissing { path: PathBuf },
    #[error("failed to launch terminal session: {source}")]
    TerminalLaunch {
        #[source]
        source: io::Error,
    },
    #[error("could not determine the host interpreter version: {reason}")]
    HostVersion { reason: String },
    #[error("failed to write {}: {source}", .path.display())]
    SearchPathFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    LaunchFailure,
    Timeout,
    NonZeroExit,
    NotFound,
    DeleteFailure,
    MissingInstaller,
    SitePackagesMissing,
    HostVersion,
    Io,
}

impl ProcessError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Launch { .. } => FailureKind::LaunchFailure,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::NonZeroExit { .. } => FailureKind::NonZeroExit,
            Self::Wait { .. } => FailureKind::Io,
        }
    }
}

impl ProvisionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Process(err) => err.kind(),
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::DeleteFailure { .. } => FailureKind::DeleteFailure,
            Self::MissingInstaller { .. } => FailureKind::MissingInstaller,
            Self::SitePackagesMissing { .. } => FailureKind::SitePackagesMissing,
            Self::TerminalLaunch { .. } => FailureKind::LaunchFailure,
            Self::HostVersion { .. } => FailureKind::HostVersion,
            Self::SearchPathFile { .. } => FailureKind::Io,
        }
    }

    /// Failures caused by the operator's input rather than the machine.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::HostVersion { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_zero_exit_message_includes_detail() {
        let err = ProcessError::NonZeroExit {
            program: "pip".into(),
            code: 1,
            detail: "No matching distribution".into(),
        };
        assert_eq!(err.to_string(), "pip exited with code 1: No matching distribution");
        let bare = ProcessError::NonZeroExit {
            program: "pip".into(),
            code: 2,
            detail: String::new(),
        };
        assert_eq!(bare.to_string(), "pip exited with code 2");
    }

    #[test]
    fn provision_kinds_follow_process_kinds() {
        let err = ProvisionError::from(ProcessError::Timeout {
            program: "python".into(),
            timeout: Duration::from_secs(60),
        });
        assert_eq!(err.kind(), FailureKind::Timeout);
        let not_found = ProvisionError::NotFound {
            target: TargetVersion::parse("3.9").unwrap(),
        };
        assert_eq!(not_found.kind(), FailureKind::NotFound);
        assert!(!not_found.is_user_error());
    }
}
