use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use hostvenv_core::{ShellKind, DEFAULT_PACKAGE};
use hostvenv_domain::TargetVersion;

pub const HOSTVENV_HELP_TEMPLATE: &str = "{before-help}\nUsage:\n    {usage}\n\nOptions:\n{options}\n";

pub const HOSTVENV_BEFORE_HELP: &str = concat!(
    "hostvenv ",
    env!("CARGO_PKG_VERSION"),
    " – standalone Python environments for embedded interpreters\n\n",
    "Finds a standalone python matching the host's major.minor version, creates\n",
    "<project>/venv with it, installs a package (numpy by default) and puts the\n",
    "environment's site-packages first on the host's module search path.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "hostvenv",
    author,
    version,
    before_help = HOSTVENV_BEFORE_HELP,
    help_template = HOSTVENV_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct HostvenvCli {
    #[arg(short, long, help = "Suppress human output (errors still print to stderr)")]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q")]
    pub trace: bool,
    #[arg(long, help = "Emit {status,message,details} JSON envelopes")]
    pub json: bool,
    #[arg(long, help = "Disable colored human output")]
    pub no_color: bool,
    #[arg(long, value_name = "DIR", help = "Project root; the environment lands in <DIR>/venv")]
    pub project: Option<PathBuf>,
    #[arg(
        long,
        value_name = "PATH",
        env = "HOSTVENV_HOST_PYTHON",
        help = "Interpreter embedded by the host (defaults to python3 on PATH)"
    )]
    pub host_python: Option<PathBuf>,
    #[arg(long, value_name = "X.Y", help = "Use this major.minor instead of asking the host interpreter")]
    pub target_version: Option<TargetVersion>,
    #[arg(long, value_name = "NAME", default_value = DEFAULT_PACKAGE, help = "Package to install")]
    pub package: String,
    #[arg(long, value_enum, help = "Shell for the terminal session")]
    pub shell: Option<ShellArg>,
    #[arg(
        long,
        overrides_with = "no_terminal",
        help = "Open a terminal session for the operator (default)"
    )]
    pub terminal: bool,
    #[arg(long, overrides_with = "terminal", help = "Do not open a terminal session")]
    pub no_terminal: bool,
    #[arg(long, help = "Delete and recreate the environment even if it is valid")]
    pub force_recreate: bool,
    #[arg(
        long = "exclude",
        value_name = "MARKER",
        help = "Extra path substring identifying the host install (repeatable)"
    )]
    pub exclude: Vec<String>,
    #[arg(long, value_name = "PATH", help = "Load and save the host module search path in this .pth file")]
    pub pth_file: Option<PathBuf>,
}

impl HostvenvCli {
    pub fn launch_terminal(&self) -> bool {
        !self.no_terminal
    }

    pub fn shell_kind(&self) -> ShellKind {
        self.shell.map_or_else(ShellKind::default, ShellKind::from)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShellArg {
    #[value(name = "powershell")]
    PowerShell,
    Cmd,
    Posix,
}

impl From<ShellArg> for ShellKind {
    fn from(value: ShellArg) -> Self {
        match value {
            ShellArg::PowerShell => ShellKind::PowerShell,
            ShellArg::Cmd => ShellKind::Cmd,
            ShellArg::Posix => ShellKind::Posix,
        }
    }
}
