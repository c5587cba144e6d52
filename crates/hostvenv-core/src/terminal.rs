//! Operator-visible shell that stays open while the environment is built.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::time;
use tracing::{debug, info, warn};

use hostvenv_domain::{CommandSpec, ProcessResult};

use crate::error::{ProcessError, ProvisionError};
use crate::process::CommandRunner;

#[cfg(windows)]
const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    PowerShell,
    Cmd,
    Posix,
}

impl Default for ShellKind {
    fn default() -> Self {
        if cfg!(windows) {
            Self::PowerShell
        } else {
            Self::Posix
        }
    }
}

impl ShellKind {
    pub const ALL: [ShellKind; 3] = [Self::PowerShell, Self::Cmd, Self::Posix];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PowerShell => "powershell",
            Self::Cmd => "cmd",
            Self::Posix => "posix",
        }
    }

    pub fn program(self) -> &'static str {
        match self {
            Self::PowerShell => "powershell.exe",
            Self::Cmd => "cmd.exe",
            Self::Posix => "sh",
        }
    }

    /// One-shot invocation of `line` through this shell.
    pub fn wrap(self, line: &str) -> CommandSpec {
        let spec = CommandSpec::new(self.program());
        match self {
            Self::PowerShell => spec.args(["-NoProfile", "-Command", line]),
            Self::Cmd => spec.args(["/C", line]),
            Self::Posix => spec.args(["-c", line]),
        }
    }

    /// A command line running `program` with `args`, quoted for this shell.
    pub fn invocation_line(self, program: &Path, args: &[&str]) -> String {
        let program = program.to_string_lossy();
        let mut line = match self {
            Self::PowerShell => format!("& {}", self.quote(&program)),
            Self::Cmd | Self::Posix => self.quote(&program),
        };
        for arg in args {
            line.push(' ');
            line.push_str(&self.quote(arg));
        }
        line
    }

    fn quote(self, value: &str) -> String {
        match self {
            Self::PowerShell | Self::Cmd => format!("\"{}\"", value.replace('"', "\"\"")),
            Self::Posix => format!("'{}'", value.replace('\'', "'\\''")),
        }
    }

    fn echo_line(self, message: &str) -> String {
        match self {
            Self::PowerShell => format!("Write-Host '{}'", message.replace('\'', "''")),
            Self::Cmd => {
                let mut escaped = String::with_capacity(message.len());
                for ch in message.chars() {
                    if matches!(ch, '^' | '&' | '|' | '<' | '>' | '%') {
                        escaped.push('^');
                    }
                    escaped.push(ch);
                }
                format!("echo {escaped}")
            }
            Self::Posix => format!("echo {}", self.quote(message)),
        }
    }

    fn session_args(self, cwd: &Path) -> Vec<String> {
        let cwd = cwd.to_string_lossy();
        match self {
            Self::PowerShell => vec![
                "-NoExit".into(),
                "-NoProfile".into(),
                "-Command".into(),
                format!("Set-Location -LiteralPath '{}'", cwd.replace('\'', "''")),
            ],
            Self::Cmd => vec!["/K".into(), format!("cd /d \"{cwd}\"")],
            Self::Posix => Vec::new(),
        }
    }
}

impl fmt::Display for ShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShellKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "powershell" | "pwsh" => Ok(Self::PowerShell),
            "cmd" => Ok(Self::Cmd),
            "posix" | "sh" => Ok(Self::Posix),
            other => Err(format!("unknown shell `{other}` (expected powershell, cmd or posix)")),
        }
    }
}

/// A persistent shell process rooted at the project directory.
#[derive(Debug)]
pub struct TerminalSession {
    shell: ShellKind,
    cwd: PathBuf,
    visible: bool,
    child: Child,
    stdin: Option<ChildStdin>,
    pid: Option<u32>,
}

impl TerminalSession {
    /// Spawns the shell. `visible` opens a new console window on Windows;
    /// elsewhere the shell's output goes to our stderr.
    pub fn launch(shell: ShellKind, cwd: &Path, visible: bool) -> Result<Self, ProvisionError> {
        let mut command = Command::new(shell.program());
        command.args(shell.session_args(cwd)).current_dir(cwd);
        configure_console(&mut command, shell, visible);

        let mut child = command
            .spawn()
            .map_err(|source| ProvisionError::TerminalLaunch { source })?;
        let stdin = child.stdin.take();
        let pid = child.id();
        info!(shell = shell.as_str(), pid, cwd = %cwd.display(), "terminal session started");
        Ok(Self {
            shell,
            cwd: cwd.to_path_buf(),
            visible,
            child,
            stdin,
            pid,
        })
    }

    pub fn shell(&self) -> ShellKind {
        self.shell
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Runs `line` through this session's shell and waits for it.
    pub async fn run_and_wait(
        &self,
        runner: &dyn CommandRunner,
        line: &str,
        timeout: Duration,
    ) -> Result<ProcessResult, ProcessError> {
        let spec = self.shell.wrap(line).current_dir(&self.cwd);
        debug!(shell = self.shell.as_str(), line, "running through terminal shell");
        runner.run(&spec, timeout).await
    }

    /// Shows a status line to the operator. Failures are only logged.
    pub async fn log(&mut self, message: &str) {
        let line = self.shell.echo_line(message);
        if let Some(stdin) = self.stdin.as_mut() {
            let mut payload = line.into_bytes();
            payload.push(b'\n');
            if let Err(err) = stdin.write_all(&payload).await {
                debug!(error = %err, "failed to write to terminal session");
            }
            return;
        }
        let mut command = Command::new(self.shell.program());
        command.args(self.shell.wrap(&line).args).current_dir(&self.cwd);
        configure_console(&mut command, self.shell, self.visible);
        command.stdin(Stdio::null());
        if let Err(err) = command.spawn() {
            debug!(error = %err, "failed to show terminal status line");
        }
    }

    /// Asks the shell to exit, then kills it once `grace` has passed.
    pub async fn close(&mut self, grace: Duration) -> io::Result<ExitStatus> {
        self.stdin.take();
        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }
        request_termination(&mut self.child)?;
        if let Ok(result) = time::timeout(grace, self.child.wait()).await {
            return result;
        }
        warn!(pid = self.pid, "terminal session ignored termination; killing it");
        self.child.kill().await?;
        self.child.wait().await
    }
}

fn configure_console(command: &mut Command, shell: ShellKind, visible: bool) {
    if shell == ShellKind::Posix {
        command.stdin(Stdio::piped());
        if visible {
            command.stdout(io::stderr());
        } else {
            command.stdout(Stdio::null());
            command.stderr(Stdio::null());
        }
        return;
    }
    #[cfg(windows)]
    command.creation_flags(if visible { CREATE_NEW_CONSOLE } else { CREATE_NO_WINDOW });
    #[cfg(not(windows))]
    let _ = visible;
}

#[cfg(unix)]
fn request_termination(child: &mut Child) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(io::Error::other)?;
    match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(io::Error::other(err)),
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}
