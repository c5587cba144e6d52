use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use hostvenv_domain::{split_lines, CommandSpec, ProcessResult};

use crate::error::ProcessError;

const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);
const TRUNCATION_MARKER: &str = "[...truncated...]";

/// Runs external programs to completion without blocking the executor.
///
/// A non-zero exit is still `Ok`; callers decide what it means via
/// [`ProcessResult::success`] or [`check`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<ProcessResult, ProcessError>;
}

/// Turns a non-zero exit into [`ProcessError::NonZeroExit`].
pub fn check(spec: &CommandSpec, result: ProcessResult) -> Result<ProcessResult, ProcessError> {
    if result.success() {
        return Ok(result);
    }
    Err(ProcessError::NonZeroExit {
        program: spec.program_name(),
        code: result.code,
        detail: result.stderr_tail(5),
    })
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Clone, Debug)]
pub struct SystemRunner {
    progress_interval: Option<Duration>,
    max_capture_bytes: usize,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self {
            progress_interval: Some(Duration::from_secs(5)),
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }
}

impl SystemRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interval of the "still running" log line; `None` disables it.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Option<Duration>) -> Self {
        self.progress_interval = interval.filter(|value| !value.is_zero());
        self
    }

    #[must_use]
    pub fn with_max_capture_bytes(mut self, limit: usize) -> Self {
        self.max_capture_bytes = limit;
        self
    }

    async fn wait_with_deadline(
        &self,
        child: &mut Child,
        program: &str,
        timeout: Duration,
    ) -> Result<ExitStatus, ProcessError> {
        let started = Instant::now();
        let deadline = time::sleep(timeout);
        tokio::pin!(deadline);

        // An interval far beyond the deadline behaves like "no heartbeat".
        let period = self.progress_interval.unwrap_or(timeout + Duration::from_secs(1));
        let mut heartbeat = time::interval_at(time::Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                status = child.wait() => {
                    return status.map_err(|source| ProcessError::Wait {
                        program: program.to_string(),
                        source,
                    });
                }
                () = &mut deadline => {
                    kill(child, program).await;
                    return Err(ProcessError::Timeout {
                        program: program.to_string(),
                        timeout,
                    });
                }
                _ = heartbeat.tick(), if self.progress_interval.is_some() => {
                    info!(
                        program,
                        elapsed_secs = started.elapsed().as_secs(),
                        "still running"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<ProcessResult, ProcessError> {
        let program = spec.program_name();
        debug!(command = %spec.display(), timeout_secs = timeout.as_secs(), "spawning");

        let mut command = configured_command(spec);
        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| ProcessError::Launch {
            program: program.clone(),
            source,
        })?;

        let limit = self.max_capture_bytes;
        let stdout = child.stdout.take().map(|pipe| spawn_capture(pipe, limit));
        let stderr = child.stderr.take().map(|pipe| spawn_capture(pipe, limit));

        let status = match self.wait_with_deadline(&mut child, &program, timeout).await {
            Ok(status) => status,
            Err(err) => {
                abort_capture(stdout);
                abort_capture(stderr);
                return Err(err);
            }
        };

        let stdout = join_capture(stdout).await;
        let stderr = join_capture(stderr).await;
        let code = status.code().unwrap_or(-1);
        debug!(program = program.as_str(), code, elapsed_ms = started.elapsed().as_millis() as u64, "finished");
        Ok(ProcessResult {
            code,
            stdout: split_lines(&stdout),
            stderr: split_lines(&stderr),
            elapsed: started.elapsed(),
        })
    }
}

fn configured_command(spec: &CommandSpec) -> Command {
    let mut command = Command::new(&spec.program);
    command.args(&spec.args);
    for (key, value) in &spec.envs {
        command.env(key, value);
    }
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.kill_on_drop(true);
    command
}

async fn kill(child: &mut Child, program: &str) {
    if let Err(err) = child.start_kill() {
        warn!(program, error = %err, "failed to kill timed out process");
        return;
    }
    match time::timeout(KILL_REAP_TIMEOUT, child.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => warn!(program, error = %err, "failed while reaping killed process"),
        Err(_) => warn!(program, "killed process did not exit in time"),
    }
}

fn spawn_capture<R>(reader: R, limit: usize) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(read_to_string_limited(reader, limit))
}

async fn join_capture(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

fn abort_capture(handle: Option<JoinHandle<String>>) {
    if let Some(handle) = handle {
        handle.abort();
    }
}

async fn read_to_string_limited<R>(mut reader: R, limit: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => truncated |= keep_tail(&mut buffer, &chunk[..read], limit),
        }
    }
    let mut text = String::from_utf8_lossy(&buffer).into_owned();
    if truncated {
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(TRUNCATION_MARKER);
    }
    text
}

/// Appends `chunk` and drops the oldest bytes beyond `limit`. Returns
/// whether anything was dropped.
fn keep_tail(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize) -> bool {
    buffer.extend_from_slice(chunk);
    let overflow = buffer.len().saturating_sub(limit);
    buffer.drain(..overflow);
    overflow > 0
}
