//! Validation, (re)creation and population of the project environment.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use hostvenv_domain::{
    channel_of, parse_installed_version, path_arg, requirement_for, CommandSpec, EnvLayout, InterpreterCandidate,
    PackageRequirement, Platform, TargetVersion,
};

use crate::config::Timeouts;
use crate::error::ProvisionError;
use crate::host::ModuleSearchPath;
use crate::locator::InterpreterLocator;
use crate::process::{check, CommandRunner};
use crate::terminal::TerminalSession;

/// What the environment's interpreter says about itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EnvStatus {
    Missing,
    Matching { reported: String },
    Mismatch { found: Option<String>, reported: String },
    Unreadable { reason: String },
}

impl EnvStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Matching { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CreateOutcome {
    AlreadyValid {
        reported: String,
    },
    Created {
        interpreter: InterpreterCandidate,
        replaced: bool,
        /// Set when the new environment does not report the target channel.
        warning: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstallOutcome {
    pub requirement: PackageRequirement,
    pub installed_version: Option<String>,
    pub via_terminal: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchPathUpdate {
    pub path: PathBuf,
    pub added: bool,
}

pub struct EnvironmentManager<'a> {
    layout: EnvLayout,
    project_root: PathBuf,
    target: TargetVersion,
    runner: &'a dyn CommandRunner,
    timeouts: Timeouts,
}

impl<'a> EnvironmentManager<'a> {
    pub fn new(
        layout: EnvLayout,
        project_root: &Path,
        target: TargetVersion,
        runner: &'a dyn CommandRunner,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            layout,
            project_root: project_root.to_path_buf(),
            target,
            runner,
            timeouts,
        }
    }

    pub fn layout(&self) -> &EnvLayout {
        &self.layout
    }

    pub fn target(&self) -> &TargetVersion {
        &self.target
    }

    /// Probes the environment's interpreter. Never modifies anything.
    pub async fn validate(&self) -> EnvStatus {
        let interpreter = self.layout.interpreter();
        if !interpreter.exists() {
            debug!(path = %interpreter.display(), "no environment interpreter");
            return EnvStatus::Missing;
        }
        let spec = CommandSpec::new(&interpreter).arg("--version");
        let status = match self.runner.run(&spec, self.timeouts.probe).await {
            Err(err) => EnvStatus::Unreadable {
                reason: err.to_string(),
            },
            Ok(result) if !result.success() => EnvStatus::Unreadable {
                reason: format!("--version exited with code {}", result.code),
            },
            Ok(result) => match result.first_line() {
                None => EnvStatus::Unreadable {
                    reason: "--version printed nothing".to_string(),
                },
                Some(line) if self.target.matches_report(line) => EnvStatus::Matching {
                    reported: line.to_string(),
                },
                Some(line) => EnvStatus::Mismatch {
                    found: channel_of(line).map(ToString::to_string),
                    reported: line.to_string(),
                },
            },
        };
        match &status {
            EnvStatus::Matching { reported } => {
                info!(env = %self.layout.root().display(), reported = reported.as_str(), "environment is valid");
            }
            EnvStatus::Mismatch { reported, .. } => warn!(
                env = %self.layout.root().display(),
                reported = reported.as_str(),
                expected = %self.target,
                "environment python does not match the host"
            ),
            EnvStatus::Unreadable { reason } => {
                warn!(env = %self.layout.root().display(), reason = reason.as_str(), "environment python is unusable");
            }
            EnvStatus::Missing => {}
        }
        status
    }

    /// Makes sure a valid environment exists, recreating it when `force` is
    /// set or the current one does not validate.
    ///
    /// The interpreter is located before anything is deleted, so a failed
    /// search leaves an existing environment untouched.
    pub async fn create(
        &self,
        force: bool,
        locator: &InterpreterLocator<'_>,
    ) -> Result<CreateOutcome, ProvisionError> {
        if force {
            info!(env = %self.layout.root().display(), "forced recreation requested");
        } else if let EnvStatus::Matching { reported } = self.validate().await {
            return Ok(CreateOutcome::AlreadyValid { reported });
        }

        let interpreter = locator.locate(&self.target).await?;

        let root = self.layout.root();
        let replaced = root.exists();
        if replaced {
            info!(env = %root.display(), "removing existing environment");
            tokio::fs::remove_dir_all(root)
                .await
                .map_err(|source| ProvisionError::DeleteFailure {
                    path: root.to_path_buf(),
                    source,
                })?;
        }

        info!(env = %root.display(), interpreter = %interpreter.invocation, "creating environment");
        let spec = interpreter
            .invocation
            .command(["-m", "venv", path_arg(root).as_str()])
            .current_dir(&self.project_root);
        let result = self.runner.run(&spec, self.timeouts.create).await?;
        check(&spec, result)?;

        let warning = match self.validate().await {
            EnvStatus::Matching { .. } => None,
            EnvStatus::Mismatch { reported, .. } => Some(format!(
                "environment reports `{reported}` but the host needs python {}",
                self.target
            )),
            EnvStatus::Missing => Some(format!(
                "environment interpreter missing at {}",
                self.layout.interpreter().display()
            )),
            EnvStatus::Unreadable { reason } => Some(format!("could not verify the new environment: {reason}")),
        };
        Ok(CreateOutcome::Created {
            interpreter,
            replaced,
            warning,
        })
    }

    /// Installs `name` (with any channel constraint) into the environment,
    /// through `terminal` when one is open.
    pub async fn install_package(
        &self,
        name: &str,
        terminal: Option<&TerminalSession>,
    ) -> Result<InstallOutcome, ProvisionError> {
        let installer = self.layout.installer();
        if !installer.is_file() {
            return Err(ProvisionError::MissingInstaller { path: installer });
        }
        let requirement = requirement_for(name, &self.target);
        let requirement_arg = requirement.to_string();
        info!(requirement = requirement_arg.as_str(), "installing package");

        let direct = CommandSpec::new(&installer).args(["install", requirement_arg.as_str()]);
        let result = match terminal {
            Some(session) => {
                let line = session
                    .shell()
                    .invocation_line(&installer, &["install", requirement_arg.as_str()]);
                session
                    .run_and_wait(self.runner, &line, self.timeouts.install)
                    .await?
            }
            None => {
                self.runner
                    .run(&direct.clone().current_dir(&self.project_root), self.timeouts.install)
                    .await?
            }
        };
        let result = check(&direct, result)?;

        let installed_version = parse_installed_version(&requirement.name, result.all_lines());
        match installed_version.as_deref() {
            Some(version) => info!(package = name, version, "package installed"),
            None => debug!(package = name, "installer output did not name a version"),
        }
        Ok(InstallOutcome {
            requirement,
            installed_version,
            via_terminal: terminal.is_some(),
        })
    }

    /// Puts the environment's site-packages first on `search_path`.
    pub fn add_to_search_path(&self, search_path: &mut ModuleSearchPath) -> Result<SearchPathUpdate, ProvisionError> {
        let site_packages = self.site_packages().ok_or_else(|| ProvisionError::SitePackagesMissing {
            path: self.layout.site_packages(&self.target),
        })?;
        let added = search_path.prepend_unique(site_packages.clone());
        if added {
            info!(path = %site_packages.display(), "added site-packages to module search path");
        } else {
            debug!(path = %site_packages.display(), "site-packages already on module search path");
        }
        Ok(SearchPathUpdate {
            path: site_packages,
            added,
        })
    }

    /// The target channel's site-packages, or on POSIX the only
    /// `lib/python*/site-packages` present when a degraded interpreter
    /// built the environment.
    fn site_packages(&self) -> Option<PathBuf> {
        let expected = self.layout.site_packages(&self.target);
        if expected.is_dir() {
            return Some(expected);
        }
        if self.layout.platform() != Platform::Posix {
            return None;
        }
        let mut found: Vec<PathBuf> = std::fs::read_dir(self.layout.lib_dir())
            .ok()?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("python"))
            .map(|entry| entry.path().join("site-packages"))
            .filter(|path| path.is_dir())
            .collect();
        if found.len() == 1 {
            debug!(path = %found[0].display(), expected = %self.target, "using site-packages of another channel");
            found.pop()
        } else {
            None
        }
    }
}
