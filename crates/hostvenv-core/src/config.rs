use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hostvenv_domain::{Platform, TargetVersion};

use crate::terminal::ShellKind;

/// Path substrings identifying the embedding host's own installation.
pub const DEFAULT_HOST_MARKERS: &[&str] = &[
    "TouchDesigner",
    "Derivative",
    "Program Files\\Derivative",
    "Program Files (x86)\\Derivative",
];

/// Channels tried after the target when scanning Windows install roots.
const FALLBACK_CHANNELS: &[&str] = &["39", "310", "311", "312"];

pub const DEFAULT_PACKAGE: &str = "numpy";

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
    home: Option<PathBuf>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
            home: dirs_next::home_dir(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub(crate) fn home(&self) -> Option<&PathBuf> {
        self.home.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)], home: Option<&str>) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self {
            vars,
            home: home.map(PathBuf::from),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(with = "secs")]
    pub probe: Duration,
    #[serde(with = "secs")]
    pub create: Duration,
    #[serde(with = "secs")]
    pub install: Duration,
    #[serde(with = "secs")]
    pub import_check: Duration,
    #[serde(with = "secs")]
    pub terminal_close: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(5),
            create: Duration::from_secs(60),
            install: Duration::from_secs(300),
            import_check: Duration::from_secs(30),
            terminal_close: Duration::from_secs(5),
        }
    }
}

/// Where and how the locator looks for a standalone interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorConfig {
    /// Names resolved through `where` / `which`.
    pub search_names: Vec<String>,
    /// Directories scanned by the install-root strategies, in order.
    pub install_dirs: Vec<PathBuf>,
    /// Executable names looked up inside each install directory.
    pub install_executables: Vec<String>,
    pub host_markers: Vec<String>,
    /// Version-dispatching launcher, `py` on Windows.
    pub launcher: Option<String>,
    pub platform: Platform,
    pub probe_timeout: Duration,
}

impl LocatorConfig {
    /// Conventional locations for the current machine.
    pub fn for_target(target: &TargetVersion) -> Self {
        Self::from_snapshot(target, &EnvSnapshot::capture(), Platform::current())
    }

    pub(crate) fn from_snapshot(target: &TargetVersion, snapshot: &EnvSnapshot, platform: Platform) -> Self {
        let host_markers = DEFAULT_HOST_MARKERS.iter().map(ToString::to_string).collect();
        match platform {
            Platform::Windows => Self {
                search_names: vec!["python.exe".into(), "python3.exe".into(), "python".into()],
                install_dirs: windows_install_dirs(target, snapshot),
                install_executables: vec!["python.exe".into(), "python3.exe".into()],
                host_markers,
                launcher: Some("py".into()),
                platform,
                probe_timeout: Timeouts::default().probe,
            },
            Platform::Posix => Self {
                search_names: vec![format!("python{target}"), "python3".into(), "python".into()],
                install_dirs: posix_install_dirs(target, snapshot),
                install_executables: vec![format!("python{target}"), "python3".into(), "python".into()],
                host_markers,
                launcher: None,
                platform,
                probe_timeout: Timeouts::default().probe,
            },
        }
    }

    #[must_use]
    pub fn with_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for marker in markers {
            let marker = marker.into();
            if !marker.is_empty() && !self.host_markers.contains(&marker) {
                self.host_markers.push(marker);
            }
        }
        self
    }
}

fn windows_install_dirs(target: &TargetVersion, snapshot: &EnvSnapshot) -> Vec<PathBuf> {
    let mut channels = vec![target.compact()];
    for fallback in FALLBACK_CHANNELS {
        if !channels.iter().any(|existing| existing == fallback) {
            channels.push((*fallback).to_string());
        }
    }

    let mut bases = Vec::new();
    if let Some(local) = snapshot.var("LOCALAPPDATA") {
        bases.push(PathBuf::from(local).join("Programs").join("Python"));
    }
    if let Some(program_files) = snapshot.var("PROGRAMFILES") {
        bases.push(PathBuf::from(program_files).join("Python"));
    }

    let mut dirs = Vec::new();
    for base in &bases {
        for channel in &channels {
            dirs.push(base.join(format!("Python{channel}")));
        }
    }
    for channel in &channels {
        dirs.push(PathBuf::from(format!("C:\\Python{channel}")));
    }
    dirs
}

fn posix_install_dirs(target: &TargetVersion, snapshot: &EnvSnapshot) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let pyenv_root = snapshot
        .var("PYENV_ROOT")
        .map(PathBuf::from)
        .or_else(|| snapshot.home().map(|home| home.join(".pyenv")));
    if let Some(root) = pyenv_root {
        dirs.extend(pyenv_version_dirs(&root.join("versions"), target));
    }
    for dir in ["/usr/local/bin", "/usr/bin", "/opt/homebrew/bin", "/opt/local/bin"] {
        dirs.push(PathBuf::from(dir));
    }
    dirs
}

/// `<versions>/<target>.*/bin`, sorted by directory name.
fn pyenv_version_dirs(versions: &Path, target: &TargetVersion) -> Vec<PathBuf> {
    let prefix = format!("{target}.");
    let Ok(entries) = std::fs::read_dir(versions) else {
        return Vec::new();
    };
    let mut matches: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| entry.path().join("bin"))
        .collect();
    matches.sort();
    matches
}

/// Inputs of one [`crate::setup`] run.
#[derive(Debug, Clone)]
pub struct SetupConfig {
    pub shell: ShellKind,
    pub launch_terminal: bool,
    pub terminal_visible: bool,
    /// Replaces the version reported by the host.
    pub target_version: Option<TargetVersion>,
    pub force_recreate: bool,
    pub package: String,
    pub timeouts: Timeouts,
    pub platform: Platform,
    /// Extra host markers on top of [`DEFAULT_HOST_MARKERS`].
    pub extra_markers: Vec<String>,
    /// Replaces the conventional locator settings when set.
    pub locator: Option<LocatorConfig>,
    /// Persist the module search path here after updating it.
    pub search_path_file: Option<PathBuf>,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            shell: ShellKind::default(),
            launch_terminal: true,
            terminal_visible: true,
            target_version: None,
            force_recreate: false,
            package: DEFAULT_PACKAGE.to_string(),
            timeouts: Timeouts::default(),
            platform: Platform::current(),
            extra_markers: Vec::new(),
            locator: None,
            search_path_file: None,
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        f64::deserialize(deserializer).map(Duration::from_secs_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(channel: &str) -> TargetVersion {
        TargetVersion::parse(channel).unwrap()
    }

    #[test]
    fn windows_dirs_try_target_channel_first() {
        let snapshot = EnvSnapshot::testing(
            &[
                ("LOCALAPPDATA", "C:\\Users\\op\\AppData\\Local"),
                ("PROGRAMFILES", "C:\\Program Files"),
            ],
            None,
        );
        let config = LocatorConfig::from_snapshot(&target("3.11"), &snapshot, Platform::Windows);
        let first = &config.install_dirs[0];
        assert!(first.ends_with("Python311"), "{first:?}");
        assert!(first.starts_with("C:\\Users\\op\\AppData\\Local"));
        // target once plus the three remaining fallbacks, per base, plus C:\PythonXY
        assert_eq!(config.install_dirs.len(), 4 * 3);
        assert_eq!(config.launcher.as_deref(), Some("py"));
        assert_eq!(config.search_names[0], "python.exe");
    }

    #[test]
    fn windows_dirs_skip_missing_env_roots() {
        let snapshot = EnvSnapshot::testing(&[("LOCALAPPDATA", "")], None);
        let config = LocatorConfig::from_snapshot(&target("3.9"), &snapshot, Platform::Windows);
        assert_eq!(config.install_dirs.len(), 4);
        assert_eq!(config.install_dirs[0], PathBuf::from("C:\\Python39"));
    }

    #[test]
    fn posix_dirs_include_matching_pyenv_versions() {
        let home = tempfile::tempdir().unwrap();
        let versions = home.path().join(".pyenv").join("versions");
        for name in ["3.9.18", "3.9.2", "3.10.4"] {
            std::fs::create_dir_all(versions.join(name)).unwrap();
        }
        let snapshot = EnvSnapshot::testing(&[], home.path().to_str());
        let config = LocatorConfig::from_snapshot(&target("3.9"), &snapshot, Platform::Posix);
        assert_eq!(config.install_dirs[0], versions.join("3.9.18").join("bin"));
        assert_eq!(config.install_dirs[1], versions.join("3.9.2").join("bin"));
        assert!(config.install_dirs.contains(&PathBuf::from("/usr/bin")));
        assert!(!config
            .install_dirs
            .iter()
            .any(|dir| dir.to_string_lossy().contains("3.10.4")));
        assert_eq!(config.search_names[0], "python3.9");
        assert!(config.launcher.is_none());
    }

    #[test]
    fn extra_markers_are_deduplicated() {
        let config = LocatorConfig::from_snapshot(&target("3.9"), &EnvSnapshot::testing(&[], None), Platform::Posix)
            .with_markers(["Derivative", "/opt/host", ""]);
        let count = config
            .host_markers
            .iter()
            .filter(|marker| *marker == "Derivative")
            .count();
        assert_eq!(count, 1);
        assert!(config.host_markers.contains(&"/opt/host".to_string()));
        assert_eq!(config.host_markers.len(), DEFAULT_HOST_MARKERS.len() + 1);
    }
}
