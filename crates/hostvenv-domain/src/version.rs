use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("`{input}` is not a major.minor python version")]
pub struct VersionParseError {
    input: String,
}

/// The `major.minor` channel the embedded interpreter requires.
///
/// Equality is textual: `3.9` and `3.09` are different channels, and patch
/// levels never take part in a comparison.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetVersion {
    channel: String,
    split: usize,
}

impl TargetVersion {
    /// Parses the channel out of anything that carries one: `3.9`,
    /// `3.9.18`, `Python 3.9.18`, `3.9.18 (tags/v3.9.18:...)`.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let channel = channel_of(input).ok_or_else(|| VersionParseError {
            input: input.trim().to_string(),
        })?;
        let split = channel.find('.').unwrap_or(channel.len());
        Ok(Self {
            channel: channel.to_string(),
            split,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.channel
    }

    pub fn major(&self) -> &str {
        &self.channel[..self.split]
    }

    pub fn minor(&self) -> &str {
        &self.channel[self.split + 1..]
    }

    /// `39` for `3.9`, as used by Windows install directories (`Python39`).
    pub fn compact(&self) -> String {
        format!("{}{}", self.major(), self.minor())
    }

    /// Selector understood by the `py` launcher, e.g. `-3.9`.
    pub fn launcher_selector(&self) -> String {
        format!("-{}", self.channel)
    }

    /// Whether an interpreter's `--version` output reports this channel.
    pub fn matches_report(&self, reported: &str) -> bool {
        channel_of(reported) == Some(self.as_str())
    }
}

impl fmt::Display for TargetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.channel)
    }
}

impl FromStr for TargetVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TargetVersion {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TargetVersion> for String {
    fn from(value: TargetVersion) -> Self {
        value.channel
    }
}

/// Returns the first `digits.digits` run in `text`, verbatim.
pub fn channel_of(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        let starts_run = bytes[idx].is_ascii_digit() && (idx == 0 || !bytes[idx - 1].is_ascii_digit());
        if !starts_run {
            idx += 1;
            continue;
        }
        let major_end = scan_digits(bytes, idx);
        if major_end < bytes.len() && bytes[major_end] == b'.' {
            let minor_end = scan_digits(bytes, major_end + 1);
            if minor_end > major_end + 1 {
                return Some(&text[idx..minor_end]);
            }
        }
        idx = major_end;
    }
    None
}

/// Extracts `3.9.18` from `Python 3.9.18`.
pub fn full_version_of(text: &str) -> Option<&str> {
    text.split_whitespace()
        .find(|token| token.starts_with(|c: char| c.is_ascii_digit()) && token.contains('.'))
}

fn scan_digits(bytes: &[u8], from: usize) -> usize {
    let mut end = from;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_channel_from_common_reports() {
        for input in ["3.9", "3.9.18", "Python 3.9.18", "3.9.18 (tags/v3.9.18:abc, Jun 6 2023)"] {
            let version = TargetVersion::parse(input).expect("parse");
            assert_eq!(version.as_str(), "3.9", "input {input}");
        }
        let version = TargetVersion::parse("Python 3.11.4").expect("parse");
        assert_eq!(version.major(), "3");
        assert_eq!(version.minor(), "11");
        assert_eq!(version.compact(), "311");
        assert_eq!(version.launcher_selector(), "-3.11");
    }

    #[test]
    fn rejects_inputs_without_a_channel() {
        assert!(TargetVersion::parse("python").is_err());
        assert!(TargetVersion::parse("3").is_err());
        assert!(TargetVersion::parse("3.").is_err());
        assert!(TargetVersion::parse("").is_err());
    }

    #[test]
    fn matching_is_textual_and_ignores_patch() {
        let target = TargetVersion::parse("3.9").unwrap();
        assert!(target.matches_report("Python 3.9.0"));
        assert!(target.matches_report("Python 3.9.18"));
        assert!(!target.matches_report("Python 3.10.2"));
        assert!(!target.matches_report("Python 3.09.1"));
        assert!(!target.matches_report("Python"));

        let target = TargetVersion::parse("3.1").unwrap();
        assert!(!target.matches_report("Python 3.10.2"));
    }

    #[test]
    fn full_version_is_first_numeric_token() {
        assert_eq!(full_version_of("Python 3.9.18"), Some("3.9.18"));
        assert_eq!(full_version_of("Python 3.12.0rc1"), Some("3.12.0rc1"));
        assert_eq!(full_version_of("unknown"), None);
    }

    #[test]
    fn serializes_as_plain_string() {
        let target = TargetVersion::parse("3.9").unwrap();
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, "\"3.9\"");
        let back: TargetVersion = serde_json::from_str("\"Python 3.9.1\"").unwrap();
        assert_eq!(back, target);
    }
}
