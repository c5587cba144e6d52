//! One end-to-end provisioning run.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info, warn};

use hostvenv_domain::{EnvLayout, TargetVersion};

use crate::config::{LocatorConfig, SetupConfig};
use crate::environment::{CreateOutcome, EnvironmentManager, InstallOutcome, SearchPathUpdate};
use crate::error::{FailureKind, ProvisionError};
use crate::host::{EmbeddedHost, UNVERSIONED};
use crate::locator::InterpreterLocator;
use crate::process::CommandRunner;
use crate::terminal::TerminalSession;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStatus {
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SetupFailure {
    pub kind: FailureKind,
    pub message: String,
    pub user_error: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImportCheck {
    pub module: String,
    pub ok: bool,
    pub version: Option<String>,
    pub location: Option<String>,
    pub detail: Option<String>,
}

/// Everything one [`setup`] run did, in order.
#[derive(Clone, Debug, Serialize)]
pub struct SetupReport {
    pub status: SetupStatus,
    pub host_executable: PathBuf,
    pub project_root: PathBuf,
    pub target_version: Option<TargetVersion>,
    pub environment_path: Option<PathBuf>,
    pub terminal_pid: Option<u32>,
    pub environment: Option<CreateOutcome>,
    pub install: Option<InstallOutcome>,
    pub search_path: Option<SearchPathUpdate>,
    pub import_check: Option<ImportCheck>,
    pub warnings: Vec<String>,
    pub failure: Option<SetupFailure>,
}

impl SetupReport {
    fn new(host: &dyn EmbeddedHost) -> Self {
        Self {
            status: SetupStatus::Succeeded,
            host_executable: host.executable().to_path_buf(),
            project_root: host.project_root().to_path_buf(),
            target_version: None,
            environment_path: None,
            terminal_pid: None,
            environment: None,
            install: None,
            search_path: None,
            import_check: None,
            warnings: Vec::new(),
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == SetupStatus::Succeeded
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }

    fn fail(&mut self, err: &ProvisionError) {
        error!(kind = ?err.kind(), "{err}");
        self.status = SetupStatus::Failed;
        self.failure = Some(SetupFailure {
            kind: err.kind(),
            message: err.to_string(),
            user_error: err.is_user_error(),
        });
    }
}

/// The report plus the terminal session, left open for inspection.
#[derive(Debug)]
pub struct SetupRun {
    pub report: SetupReport,
    pub terminal: Option<TerminalSession>,
}

/// Provisions the environment for `host` and makes it importable.
///
/// Failures are recorded in the report rather than returned; a failed
/// import check is recorded but does not fail the run.
pub async fn setup(config: &SetupConfig, host: &mut dyn EmbeddedHost, runner: &dyn CommandRunner) -> SetupRun {
    let mut report = SetupReport::new(host);
    let mut terminal = None;

    if let Err(err) = provision(config, host, runner, &mut report, &mut terminal).await {
        report.fail(&err);
    }

    if let Some(session) = terminal.as_mut() {
        let banner = match &report.failure {
            None => "setup completed".to_string(),
            Some(failure) => format!("setup failed: {}", failure.message),
        };
        session.log(&banner).await;
    }
    SetupRun { report, terminal }
}

async fn provision(
    config: &SetupConfig,
    host: &mut dyn EmbeddedHost,
    runner: &dyn CommandRunner,
    report: &mut SetupReport,
    terminal: &mut Option<TerminalSession>,
) -> Result<(), ProvisionError> {
    let target = match &config.target_version {
        Some(target) => target.clone(),
        None => TargetVersion::parse(host.interpreter_version()).map_err(|err| ProvisionError::HostVersion {
            reason: err.to_string(),
        })?,
    };
    info!(
        host = %host.executable().display(),
        project = %host.project_root().display(),
        channel = %target,
        "starting environment setup"
    );
    report.target_version = Some(target.clone());

    let layout = EnvLayout::in_project(host.project_root(), config.platform);
    report.environment_path = Some(layout.root().to_path_buf());

    if config.launch_terminal {
        let session = TerminalSession::launch(config.shell, host.project_root(), config.terminal_visible)?;
        report.terminal_pid = session.pid();
        *terminal = Some(session);
    }

    let locator_config = config
        .locator
        .clone()
        .unwrap_or_else(|| LocatorConfig::for_target(&target))
        .with_markers(host.install_markers())
        .with_markers(config.extra_markers.iter().cloned());
    let locator = InterpreterLocator::new(locator_config, runner);
    let manager = EnvironmentManager::new(layout, host.project_root(), target.clone(), runner, config.timeouts);

    status_line(terminal, "preparing virtual environment").await;
    let created = manager.create(config.force_recreate, &locator).await?;
    if let CreateOutcome::Created {
        interpreter, warning, ..
    } = &created
    {
        if interpreter.is_degraded() {
            report.warn(format!(
                "{} reports {} but the host runs python {target}",
                interpreter.invocation,
                interpreter.reported_version.as_deref().unwrap_or("an unknown version"),
            ));
        }
        if let Some(warning) = warning {
            report.warn(warning.clone());
        }
    }
    report.environment = Some(created);

    status_line(terminal, &format!("installing {}", config.package)).await;
    let installed = manager.install_package(&config.package, terminal.as_ref()).await?;
    report.install = Some(installed);

    let update = manager.add_to_search_path(host.search_path_mut())?;
    report.search_path = Some(update);
    if let Some(file) = &config.search_path_file {
        host.search_path()
            .save(file)
            .map_err(|source| ProvisionError::SearchPathFile {
                path: file.clone(),
                source,
            })?;
    }

    let check = import_check(config, host, runner).await;
    if !check.ok {
        report.warn(format!(
            "import check for `{}` failed: {}",
            check.module,
            check.detail.as_deref().unwrap_or("unknown error")
        ));
    }
    report.import_check = Some(check);
    Ok(())
}

async fn status_line(terminal: &mut Option<TerminalSession>, message: &str) {
    if let Some(session) = terminal.as_mut() {
        session.log(message).await;
    }
}

async fn import_check(config: &SetupConfig, host: &dyn EmbeddedHost, runner: &dyn CommandRunner) -> ImportCheck {
    let module = import_name(&config.package);
    let spec = host.import_command(&module);
    match runner.run(&spec, config.timeouts.import_check).await {
        Ok(result) if result.success() => {
            let version = result
                .stdout
                .first()
                .filter(|line| line.as_str() != UNVERSIONED)
                .cloned();
            let location = result.stdout.get(1).cloned();
            info!(
                module = module.as_str(),
                version = version.as_deref().unwrap_or("unknown"),
                "import check passed"
            );
            ImportCheck {
                module,
                ok: true,
                version,
                location,
                detail: None,
            }
        }
        Ok(result) => ImportCheck {
            module,
            ok: false,
            version: None,
            location: None,
            detail: Some(
                result
                    .stderr
                    .iter()
                    .rev()
                    .find(|line| !line.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("exit code {}", result.code)),
            ),
        },
        Err(err) => ImportCheck {
            module,
            ok: false,
            version: None,
            location: None,
            detail: Some(err.to_string()),
        },
    }
}

/// Module name of a distribution, e.g. `typing-extensions>=4` -> `typing_extensions`.
fn import_name(package: &str) -> String {
    let name = package
        .split(|c: char| matches!(c, '<' | '>' | '=' | '!' | '~' | ';' | '[' | ' '))
        .next()
        .unwrap_or(package);
    name.trim().to_ascii_lowercase().replace(['-', '.'], "_")
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::host::StaticHost;
    use crate::testing::{version_output, ScriptedRunner};
    use hostvenv_domain::{Platform, ProcessResult};

    fn config(install_dir: &Path) -> SetupConfig {
        SetupConfig {
            launch_terminal: false,
            platform: Platform::Posix,
            locator: Some(LocatorConfig {
                search_names: Vec::new(),
                install_dirs: vec![install_dir.to_path_buf()],
                install_executables: vec!["python3.9".into()],
                host_markers: Vec::new(),
                launcher: None,
                platform: Platform::Posix,
                probe_timeout: Duration::from_secs(5),
            }),
            ..SetupConfig::default()
        }
    }

    /// Plays system python, venv python, pip and the host in one closure.
    fn fake_toolchain(project: &Path) -> ScriptedRunner {
        let layout = EnvLayout::in_project(project, Platform::Posix);
        ScriptedRunner::new(move |spec| {
            let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
            match args.as_slice() {
                ["-m", "venv", _] => {
                    let target = TargetVersion::parse("3.9").unwrap();
                    fs::create_dir_all(layout.bin_dir()).unwrap();
                    fs::write(layout.interpreter(), b"").unwrap();
                    fs::write(layout.installer(), b"").unwrap();
                    fs::create_dir_all(layout.site_packages(&target)).unwrap();
                    Ok(ProcessResult::default())
                }
                ["install", _] => Ok(ProcessResult {
                    stdout: vec!["Successfully installed numpy-1.26.4".into()],
                    ..ProcessResult::default()
                }),
                ["-c", _] => Ok(ProcessResult {
                    stdout: vec!["1.26.4".into(), "/proj/venv/numpy/__init__.py".into()],
                    ..ProcessResult::default()
                }),
                _ => Ok(version_output("3.9.18")),
            }
        })
    }

    #[tokio::test]
    async fn full_run_reports_every_step() {
        let project = tempfile::tempdir().unwrap();
        let install = tempfile::tempdir().unwrap();
        fs::write(install.path().join("python3.9"), b"").unwrap();
        let pth = project.path().join("host.pth");
        let mut config = config(install.path());
        config.search_path_file = Some(pth.clone());

        let runner = fake_toolchain(project.path());
        let mut host = StaticHost::new("3.9.18", "/opt/host/python", project.path());
        let run = setup(&config, &mut host, &runner).await;

        let report = run.report;
        assert!(report.succeeded(), "{:?}", report.failure);
        assert!(run.terminal.is_none());
        assert_eq!(report.target_version, TargetVersion::parse("3.9").ok());
        assert!(matches!(
            report.environment,
            Some(CreateOutcome::Created { replaced: false, .. })
        ));
        let install = report.install.unwrap();
        assert_eq!(install.requirement.to_string(), "numpy<2.0");
        assert_eq!(install.installed_version.as_deref(), Some("1.26.4"));
        let site_packages = project.path().join("venv/lib/python3.9/site-packages");
        assert_eq!(host.search_path().entries()[0], site_packages);
        assert_eq!(
            crate::host::ModuleSearchPath::load(&pth).unwrap().entries(),
            &[site_packages]
        );
        let check = report.import_check.unwrap();
        assert!(check.ok);
        assert_eq!(check.version.as_deref(), Some("1.26.4"));
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[tokio::test]
    async fn second_run_reuses_environment() {
        let project = tempfile::tempdir().unwrap();
        let install = tempfile::tempdir().unwrap();
        fs::write(install.path().join("python3.9"), b"").unwrap();
        let config = config(install.path());
        let runner = fake_toolchain(project.path());
        let mut host = StaticHost::new("3.9.18", "/opt/host/python", project.path());

        assert!(setup(&config, &mut host, &runner).await.report.succeeded());
        let second = setup(&config, &mut host, &runner).await.report;
        assert!(second.succeeded());
        assert!(matches!(second.environment, Some(CreateOutcome::AlreadyValid { .. })));
        assert_eq!(second.search_path.map(|update| update.added), Some(false));
        assert_eq!(host.search_path().entries().len(), 1);
        let venv_runs = runner
            .calls()
            .iter()
            .filter(|spec| spec.args.first().map(String::as_str) == Some("-m"))
            .count();
        assert_eq!(venv_runs, 1);
    }

    #[tokio::test]
    async fn unparseable_host_version_is_a_user_error() {
        let project = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(|spec| panic!("unexpected {}", spec.display()));
        let mut host = StaticHost::new("unknown", "/opt/host/python", project.path());
        let report = setup(&config(project.path()), &mut host, &runner).await.report;
        assert!(!report.succeeded());
        let failure = report.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::HostVersion);
        assert!(failure.user_error);
    }

    #[tokio::test]
    async fn missing_interpreter_stops_before_creation() {
        let project = tempfile::tempdir().unwrap();
        let empty = tempfile::tempdir().unwrap();
        let runner = fake_toolchain(project.path());
        let mut host = StaticHost::new("3.9.18", "/opt/host/python", project.path());
        let report = setup(&config(empty.path()), &mut host, &runner).await.report;
        assert_eq!(report.failure.map(|failure| failure.kind), Some(FailureKind::NotFound));
        assert!(report.environment.is_none());
        assert!(!project.path().join("venv").exists());
    }

    #[tokio::test]
    async fn failed_import_is_only_a_warning() {
        let project = tempfile::tempdir().unwrap();
        let install = tempfile::tempdir().unwrap();
        fs::write(install.path().join("python3.9"), b"").unwrap();
        let inner = fake_toolchain(project.path());
        let runner = ScriptedRunner::new(move |spec| {
            if spec.args.first().map(String::as_str) == Some("-c") {
                return Ok(ProcessResult {
                    code: 1,
                    stderr: vec!["ModuleNotFoundError: No module named 'numpy'".into()],
                    ..ProcessResult::default()
                });
            }
            inner.respond(spec)
        });
        let mut host = StaticHost::new("3.9.18", "/opt/host/python", project.path());
        let report = setup(&config(install.path()), &mut host, &runner).await.report;
        assert!(report.succeeded());
        let check = report.import_check.unwrap();
        assert!(!check.ok);
        assert!(check.detail.unwrap().contains("ModuleNotFoundError"));
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn module_without_version_still_imports() {
        let project = tempfile::tempdir().unwrap();
        let install = tempfile::tempdir().unwrap();
        fs::write(install.path().join("python3.9"), b"").unwrap();
        let inner = fake_toolchain(project.path());
        let runner = ScriptedRunner::new(move |spec| {
            if spec.args.first().map(String::as_str) == Some("-c") {
                return Ok(ProcessResult {
                    stdout: vec!["unknown".into(), "/proj/venv/six.py".into()],
                    ..ProcessResult::default()
                });
            }
            inner.respond(spec)
        });
        let mut config = config(install.path());
        config.package = "six".into();
        let mut host = StaticHost::new("3.9.18", "/opt/host/python", project.path());
        let report = setup(&config, &mut host, &runner).await.report;
        assert!(report.succeeded(), "{:?}", report.failure);
        let check = report.import_check.unwrap();
        assert!(check.ok);
        assert_eq!(check.version, None);
        assert_eq!(check.location.as_deref(), Some("/proj/venv/six.py"));
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn import_names_strip_constraints() {
        assert_eq!(import_name("numpy"), "numpy");
        assert_eq!(import_name("numpy<2.0"), "numpy");
        assert_eq!(import_name("typing-extensions"), "typing_extensions");
        assert_eq!(import_name("SciPy>=1.10"), "scipy");
    }
}
