use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::process::CommandSpec;

/// How a standalone interpreter is started.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Invocation {
    /// A concrete executable on disk.
    Path { path: PathBuf },
    /// A version-dispatching launcher, e.g. `py -3.9`.
    Launcher { program: String, args: Vec<String> },
}

impl Invocation {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path { path: path.into() }
    }

    pub fn launcher(program: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::Launcher {
            program: program.into(),
            args: vec![selector.into()],
        }
    }

    /// A command running this interpreter with `extra` appended.
    pub fn command<I, S>(&self, extra: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self {
            Self::Path { path } => CommandSpec::new(path.clone()).args(extra),
            Self::Launcher { program, args } => CommandSpec::new(program.clone())
                .args(args.iter().cloned())
                .args(extra),
        }
    }

    /// The location string host markers are matched against.
    pub fn location(&self) -> String {
        match self {
            Self::Path { path } => path.display().to_string(),
            Self::Launcher { program, .. } => program.clone(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path { path } => write!(f, "{}", path.display()),
            Self::Launcher { program, args } => {
                write!(f, "{program}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    SearchPath,
    InstallRoot,
    InstallRootAnyVersion,
    Launcher,
}

impl LocatorStrategy {
    pub fn label(self) -> &'static str {
        match self {
            Self::SearchPath => "search path",
            Self::InstallRoot => "install root",
            Self::InstallRootAnyVersion => "install root (any version)",
            Self::Launcher => "launcher",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    /// Found without confirming the target channel.
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterCandidate {
    pub invocation: Invocation,
    pub reported_version: Option<String>,
    pub strategy: LocatorStrategy,
    pub match_kind: MatchKind,
}

impl InterpreterCandidate {
    pub fn is_degraded(&self) -> bool {
        self.match_kind == MatchKind::Degraded
    }
}
