#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod config;
pub mod environment;
pub mod error;
pub mod host;
pub mod locator;
pub mod outcome;
pub mod process;
pub mod setup;
pub mod terminal;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::config::{LocatorConfig, SetupConfig, Timeouts, DEFAULT_HOST_MARKERS, DEFAULT_PACKAGE};
pub use crate::environment::{CreateOutcome, EnvStatus, EnvironmentManager, InstallOutcome, SearchPathUpdate};
pub use crate::error::{FailureKind, ProcessError, ProvisionError};
pub use crate::host::{EmbeddedHost, ModuleSearchPath, StaticHost};
pub use crate::locator::InterpreterLocator;
pub use crate::outcome::{CommandStatus, ExecutionOutcome};
pub use crate::process::{check, CommandRunner, SystemRunner};
pub use crate::setup::{setup, ImportCheck, SetupFailure, SetupReport, SetupRun, SetupStatus};
pub use crate::terminal::{ShellKind, TerminalSession};
