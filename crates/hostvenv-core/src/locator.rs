//! Discovery of a standalone interpreter that can create environments.
//!
//! Strategies run in a fixed order and the first hit wins:
//! PATH lookup, install directories (exact channel), install directories
//! (any channel, degraded), then the `py` launcher.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use hostvenv_domain::{
    full_version_of, CommandSpec, InterpreterCandidate, Invocation, LocatorStrategy, MatchKind, Platform,
    TargetVersion,
};

use crate::config::LocatorConfig;
use crate::error::ProvisionError;
use crate::process::CommandRunner;

pub struct InterpreterLocator<'a> {
    config: LocatorConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> InterpreterLocator<'a> {
    pub fn new(config: LocatorConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Finds an interpreter for `target`.
    ///
    /// # Errors
    /// Returns [`ProvisionError::NotFound`] when every strategy came up empty.
    pub async fn locate(&self, target: &TargetVersion) -> Result<InterpreterCandidate, ProvisionError> {
        info!(channel = %target, "looking for a standalone python");

        if let Some(found) = self.from_search_path(target).await {
            return Ok(found);
        }
        if let Some(found) = self.from_install_dirs(target).await {
            return Ok(found);
        }
        if let Some(found) = self.any_from_install_dirs(target).await {
            return Ok(found);
        }
        if let Some(found) = self.from_launcher(target).await {
            return Ok(found);
        }

        warn!(
            channel = %target,
            "no suitable standalone python found; install python {target} from python.org"
        );
        Err(ProvisionError::NotFound {
            target: target.clone(),
        })
    }

    /// Case-insensitive check against the host markers.
    pub fn is_host_path(&self, location: &str) -> bool {
        let lowered = location.to_lowercase();
        self.config
            .host_markers
            .iter()
            .any(|marker| lowered.contains(&marker.to_lowercase()))
    }

    async fn from_search_path(&self, target: &TargetVersion) -> Option<InterpreterCandidate> {
        let lookup = match self.config.platform {
            Platform::Windows => "where",
            Platform::Posix => "which",
        };
        for name in &self.config.search_names {
            let spec = CommandSpec::new(lookup).arg(name.as_str());
            let result = match self.runner.run(&spec, self.config.probe_timeout).await {
                Ok(result) if result.success() => result,
                Ok(_) => continue,
                Err(err) => {
                    debug!(name = name.as_str(), error = %err, "search path lookup failed");
                    continue;
                }
            };
            for line in &result.stdout {
                let path = line.trim();
                if path.is_empty() {
                    continue;
                }
                if self.is_host_path(path) {
                    debug!(path, "skipping host interpreter");
                    continue;
                }
                let invocation = Invocation::path(path);
                if let Some(reported) = self.probe_version(&invocation).await {
                    if target.matches_report(&reported) {
                        return Some(self.found(invocation, Some(reported), LocatorStrategy::SearchPath, MatchKind::Exact));
                    }
                    debug!(path, reported = reported.as_str(), "version does not match");
                }
            }
        }
        None
    }

    async fn from_install_dirs(&self, target: &TargetVersion) -> Option<InterpreterCandidate> {
        for path in self.install_candidates() {
            let invocation = Invocation::path(path);
            if let Some(reported) = self.probe_version(&invocation).await {
                if target.matches_report(&reported) {
                    return Some(self.found(invocation, Some(reported), LocatorStrategy::InstallRoot, MatchKind::Exact));
                }
            }
        }
        None
    }

    async fn any_from_install_dirs(&self, target: &TargetVersion) -> Option<InterpreterCandidate> {
        let path = self.install_candidates().into_iter().next()?;
        let invocation = Invocation::path(path);
        let reported = self.probe_version(&invocation).await;
        warn!(
            interpreter = %invocation,
            reported = reported.as_deref().unwrap_or("unknown"),
            channel = %target,
            "using a standalone python whose version may not match the host"
        );
        Some(self.found(invocation, reported, LocatorStrategy::InstallRootAnyVersion, MatchKind::Degraded))
    }

    async fn from_launcher(&self, target: &TargetVersion) -> Option<InterpreterCandidate> {
        let program = self.config.launcher.as_deref()?;
        if self.is_host_path(program) {
            return None;
        }
        if let Ok(resolved) = which::which(program) {
            if self.is_host_path(&resolved.to_string_lossy()) {
                debug!(path = %resolved.display(), "skipping launcher inside the host install");
                return None;
            }
        }
        info!(launcher = program, channel = %target, "trying version-dispatching launcher");
        let invocation = Invocation::launcher(program, target.launcher_selector());
        let reported = self.probe_version(&invocation).await?;
        Some(self.found(invocation, Some(reported), LocatorStrategy::Launcher, MatchKind::Exact))
    }

    /// Existing, non-host executables under the install directories.
    fn install_candidates(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for dir in &self.config.install_dirs {
            if !dir.is_dir() {
                continue;
            }
            for name in &self.config.install_executables {
                let path = dir.join(name);
                if !path.is_file() || found.contains(&path) {
                    continue;
                }
                if self.is_host_path(&path.to_string_lossy()) {
                    debug!(path = %path.display(), "skipping host interpreter");
                    continue;
                }
                found.push(path);
            }
        }
        found
    }

    /// `--version` output of a successful probe; `None` on any failure.
    async fn probe_version(&self, invocation: &Invocation) -> Option<String> {
        let spec = invocation.command(["--version"]);
        match self.runner.run(&spec, self.config.probe_timeout).await {
            Ok(result) if result.success() => result.first_line().map(ToString::to_string),
            Ok(result) => {
                debug!(interpreter = %invocation, code = result.code, "version probe failed");
                None
            }
            Err(err) => {
                debug!(interpreter = %invocation, error = %err, "version probe failed");
                None
            }
        }
    }

    fn found(
        &self,
        invocation: Invocation,
        reported: Option<String>,
        strategy: LocatorStrategy,
        match_kind: MatchKind,
    ) -> InterpreterCandidate {
        let version = reported
            .as_deref()
            .and_then(full_version_of)
            .map(ToString::to_string)
            .or(reported);
        info!(
            interpreter = %invocation,
            version = version.as_deref().unwrap_or("unknown"),
            strategy = strategy.label(),
            "found standalone python"
        );
        InterpreterCandidate {
            invocation,
            reported_version: version,
            strategy,
            match_kind,
        }
    }
}
