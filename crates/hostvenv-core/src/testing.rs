use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use hostvenv_domain::{CommandSpec, ProcessResult};

use crate::error::ProcessError;
use crate::process::CommandRunner;

type Responder = dyn Fn(&CommandSpec) -> Result<ProcessResult, ProcessError> + Send + Sync;

/// Answers every command from a closure and records what was asked.
pub(crate) struct ScriptedRunner {
    responder: Box<Responder>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<ProcessResult, ProcessError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// The scripted answer for `spec`, without recording the call.
    pub(crate) fn respond(&self, spec: &CommandSpec) -> Result<ProcessResult, ProcessError> {
        (self.responder)(spec)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec, _timeout: Duration) -> Result<ProcessResult, ProcessError> {
        self.calls.lock().expect("calls lock").push(spec.clone());
        self.respond(spec)
    }
}

pub(crate) fn version_output(version: &str) -> ProcessResult {
    ProcessResult {
        code: 0,
        stdout: vec![format!("Python {version}")],
        ..ProcessResult::default()
    }
}
