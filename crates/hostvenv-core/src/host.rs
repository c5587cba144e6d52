//! The application embedding the restricted interpreter.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use hostvenv_domain::{path_arg, CommandSpec};

use crate::config::DEFAULT_HOST_MARKERS;
use crate::error::ProvisionError;
use crate::process::CommandRunner;

#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_SEPARATOR: &str = ":";

/// Printed by the import check for modules without `__version__`.
pub(crate) const UNVERSIONED: &str = "unknown";

/// Ordered module search path of the embedded interpreter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleSearchPath {
    entries: Vec<PathBuf>,
}

impl ModuleSearchPath {
    pub fn new(entries: Vec<PathBuf>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|entry| entry == path)
    }

    /// Puts `path` first unless it is already present. Returns whether the
    /// path was added.
    pub fn prepend_unique(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.contains(&path) {
            return false;
        }
        self.entries.insert(0, path);
        true
    }

    /// Reads a `.pth`-style file; a missing file is an empty path.
    pub fn load(file: &Path) -> io::Result<Self> {
        let contents = match fs::read_to_string(file) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err),
        };
        let entries = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("import "))
            .map(PathBuf::from)
            .collect();
        Ok(Self { entries })
    }

    pub fn save(&self, file: &Path) -> io::Result<()> {
        if let Some(parent) = file.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut contents = String::new();
        for entry in &self.entries {
            contents.push_str(&path_arg(entry));
            contents.push('\n');
        }
        fs::write(file, contents)
    }

    /// The entries joined as a `PYTHONPATH` value.
    pub fn to_env_value(&self) -> String {
        self.entries
            .iter()
            .map(|entry| path_arg(entry))
            .collect::<Vec<_>>()
            .join(PATH_SEPARATOR)
    }
}

/// What provisioning needs from the embedding application.
pub trait EmbeddedHost: Send {
    /// Version text reported by the embedded interpreter, e.g. `3.9.18`.
    fn interpreter_version(&self) -> &str;

    fn executable(&self) -> &Path;

    fn project_root(&self) -> &Path;

    /// Path substrings identifying the host's own installation.
    fn install_markers(&self) -> Vec<String> {
        DEFAULT_HOST_MARKERS.iter().map(ToString::to_string).collect()
    }

    fn search_path(&self) -> &ModuleSearchPath;

    fn search_path_mut(&mut self) -> &mut ModuleSearchPath;

    /// Imports `module` inside the host interpreter with the current search
    /// path applied, printing its version and location.
    fn import_command(&self, module: &str) -> CommandSpec {
        let script = format!("import {module} as m; print(getattr(m, '__version__', '{UNVERSIONED}')); print(m.__file__)");
        CommandSpec::new(self.executable())
            .args(["-c", script.as_str()])
            .current_dir(self.project_root())
            .env("PYTHONPATH", self.search_path().to_env_value())
    }
}

/// A host described entirely by values, used by the CLI and in tests.
#[derive(Clone, Debug)]
pub struct StaticHost {
    version: String,
    executable: PathBuf,
    project_root: PathBuf,
    markers: Vec<String>,
    search_path: ModuleSearchPath,
}

impl StaticHost {
    pub fn new(version: impl Into<String>, executable: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            version: version.into(),
            executable: executable.into(),
            project_root: project_root.into(),
            markers: DEFAULT_HOST_MARKERS.iter().map(ToString::to_string).collect(),
            search_path: ModuleSearchPath::default(),
        }
    }

    /// Asks `executable --version` for the host version.
    ///
    /// # Errors
    /// [`ProvisionError::HostVersion`] when the interpreter cannot be run or
    /// prints nothing usable.
    pub async fn probe(
        executable: impl Into<PathBuf>,
        project_root: impl Into<PathBuf>,
        runner: &dyn CommandRunner,
        timeout: Duration,
    ) -> Result<Self, ProvisionError> {
        let executable = executable.into();
        let spec = CommandSpec::new(&executable).arg("--version");
        let result = runner
            .run(&spec, timeout)
            .await
            .map_err(|err| ProvisionError::HostVersion {
                reason: err.to_string(),
            })?;
        if !result.success() {
            return Err(ProvisionError::HostVersion {
                reason: format!("{} --version exited with code {}", executable.display(), result.code),
            });
        }
        let version = result
            .first_line()
            .map(|line| line.trim_start_matches("Python").trim().to_string())
            .ok_or_else(|| ProvisionError::HostVersion {
                reason: format!("{} --version printed nothing", executable.display()),
            })?;
        info!(host = %executable.display(), version = version.as_str(), "probed host interpreter");
        Ok(Self::new(version, executable, project_root))
    }

    #[must_use]
    pub fn with_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for marker in markers {
            let marker = marker.into();
            if !marker.is_empty() && !self.markers.contains(&marker) {
                self.markers.push(marker);
            }
        }
        self
    }

    #[must_use]
    pub fn with_search_path(mut self, search_path: ModuleSearchPath) -> Self {
        debug!(entries = search_path.entries().len(), "using existing module search path");
        self.search_path = search_path;
        self
    }
}

impl EmbeddedHost for StaticHost {
    fn interpreter_version(&self) -> &str {
        &self.version
    }

    fn executable(&self) -> &Path {
        &self.executable
    }

    fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn install_markers(&self) -> Vec<String> {
        self.markers.clone()
    }

    fn search_path(&self) -> &ModuleSearchPath {
        &self.search_path
    }

    fn search_path_mut(&mut self) -> &mut ModuleSearchPath {
        &mut self.search_path
    }
}
