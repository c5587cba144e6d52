use std::env;
use std::path::PathBuf;

use anyhow::Context;
use atty::Stream;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use hostvenv_core::{setup, ExecutionOutcome, ModuleSearchPath, SetupConfig, StaticHost, SystemRunner, Timeouts};

mod cli;
mod output;
mod style;

use cli::HostvenvCli;
use style::Style;

const LOG_ENV: &str = "HOSTVENV_LOG";

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = match HostvenvCli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = i32::from(err.use_stderr());
            let _ = err.print();
            std::process::exit(code);
        }
    };
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(run(&cli)).map_err(|err| eyre!("{err:?}"))?;
    let code = emit_output(&cli, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format!("hostvenv={level},hostvenv_core={level}")));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn run(cli: &HostvenvCli) -> anyhow::Result<ExecutionOutcome> {
    let runner = SystemRunner::new();
    let timeouts = Timeouts::default();
    let project = match &cli.project {
        Some(project) => project.clone(),
        None => env::current_dir().context("cannot determine the current directory")?,
    };
    if !project.is_dir() {
        return Ok(ExecutionOutcome::user_error(
            format!("project directory {} does not exist", project.display()),
            json!({ "project_root": project, "hint": "pass an existing directory to --project" }),
        ));
    }

    let Some(host_python) = cli.host_python.clone().or_else(default_host_python) else {
        return Ok(ExecutionOutcome::user_error(
            "no host interpreter found",
            json!({ "hint": "pass the embedded interpreter with --host-python" }),
        ));
    };

    let host = match &cli.target_version {
        Some(target) => StaticHost::new(target.to_string(), host_python, &project),
        None => match StaticHost::probe(host_python, &project, &runner, timeouts.probe).await {
            Ok(host) => host,
            Err(err) => {
                return Ok(ExecutionOutcome::user_error(
                    err.to_string(),
                    json!({
                        "failure": { "kind": err.kind(), "message": err.to_string(), "user_error": true },
                        "hint": "pass --host-python or --target-version",
                    }),
                ));
            }
        },
    };
    let mut host = host.with_markers(cli.exclude.iter().cloned());
    if let Some(pth) = &cli.pth_file {
        let search_path =
            ModuleSearchPath::load(pth).with_context(|| format!("failed to read {}", pth.display()))?;
        host = host.with_search_path(search_path);
    }

    let config = SetupConfig {
        shell: cli.shell_kind(),
        launch_terminal: cli.launch_terminal(),
        target_version: cli.target_version.clone(),
        force_recreate: cli.force_recreate,
        package: cli.package.clone(),
        timeouts,
        search_path_file: cli.pth_file.clone(),
        ..SetupConfig::default()
    };
    let run = setup(&config, &mut host, &runner).await;
    Ok(ExecutionOutcome::from(&run.report))
}

fn default_host_python() -> Option<PathBuf> {
    which::which("python3").or_else(|_| which::which("python")).ok()
}

fn emit_output(cli: &HostvenvCli, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.exit_code();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else if !cli.quiet {
        let style = Style::new(cli.no_color, atty::is(Stream::Stdout));
        for line in output::render(&style, outcome) {
            println!("{line}");
        }
    } else if code != 0 {
        let style = Style::new(cli.no_color, atty::is(Stream::Stderr));
        eprintln!("{}", style.status(outcome.status, &outcome.message));
    }

    Ok(code)
}
