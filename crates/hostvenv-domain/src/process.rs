use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One external program invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Shell-like rendering for log lines; not meant to be re-parsed.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(quote_if_needed(&self.program_name()));
        parts.extend(self.args.iter().map(|arg| quote_if_needed(arg)));
        parts.join(" ")
    }
}

fn quote_if_needed(value: &str) -> String {
    if value.is_empty() || value.contains(char::is_whitespace) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

/// Exit code and captured output of a completed process.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// First non-empty line of stdout, falling back to stderr. Interpreters
    /// older than 3.4 print `--version` to stderr.
    pub fn first_line(&self) -> Option<&str> {
        self.stdout
            .iter()
            .chain(self.stderr.iter())
            .map(|line| line.trim())
            .find(|line| !line.is_empty())
    }

    pub fn all_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout
            .iter()
            .chain(self.stderr.iter())
            .map(String::as_str)
    }

    pub fn stderr_tail(&self, lines: usize) -> String {
        let start = self.stderr.len().saturating_sub(lines);
        self.stderr[start..].join("\n")
    }
}

/// Lines of captured text, without trailing carriage returns.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let spec = CommandSpec::new("C:/Program Files/Python39/python.exe")
            .args(["-m", "venv"])
            .arg("C:/My Project/venv");
        assert_eq!(
            spec.display(),
            "\"C:/Program Files/Python39/python.exe\" -m venv \"C:/My Project/venv\""
        );
    }

    #[test]
    fn first_line_falls_back_to_stderr() {
        let result = ProcessResult {
            code: 0,
            stdout: vec![String::new()],
            stderr: vec!["Python 2.7.18".into()],
            elapsed: Duration::ZERO,
        };
        assert_eq!(result.first_line(), Some("Python 2.7.18"));
    }

    #[test]
    fn split_lines_strips_carriage_returns() {
        assert_eq!(split_lines("a\r\nb\n"), vec!["a".to_string(), "b".to_string()]);
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let result = ProcessResult {
            code: 1,
            stdout: Vec::new(),
            stderr: vec!["one".into(), "two".into(), "three".into()],
            elapsed: Duration::ZERO,
        };
        assert_eq!(result.stderr_tail(2), "two\nthree");
        assert_eq!(result.stderr_tail(10), "one\ntwo\nthree");
    }
}
