use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::setup::SetupReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            CommandStatus::Ok => 0,
            CommandStatus::UserError => 1,
            CommandStatus::Failure => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

impl From<&SetupReport> for ExecutionOutcome {
    fn from(report: &SetupReport) -> Self {
        let details = serde_json::to_value(report).unwrap_or_else(|err| json!({ "serialization_error": err.to_string() }));
        match &report.failure {
            None => {
                let message = match &report.target_version {
                    Some(target) => format!("environment ready for python {target}"),
                    None => "environment ready".to_string(),
                };
                Self::success(message, details)
            }
            Some(failure) if failure.user_error => Self::user_error(failure.message.clone(), details),
            Some(failure) => Self::failure(failure.message.clone(), details),
        }
    }
}
