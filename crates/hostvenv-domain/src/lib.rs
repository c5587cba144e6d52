#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod interpreter;
pub mod layout;
pub mod package;
pub mod process;
pub mod version;

pub use interpreter::{InterpreterCandidate, Invocation, LocatorStrategy, MatchKind};
pub use layout::{EnvLayout, Platform, ENV_DIR_NAME};
pub use package::{parse_installed_version, requirement_for, PackageRequirement};
pub use process::{path_arg, split_lines, CommandSpec, ProcessResult};
pub use version::{channel_of, full_version_of, TargetVersion, VersionParseError};
