pub mod config;
pub mod doctor;
pub mod migrate;
pub mod seed;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

/// One line of machine-readable output per invocation. `details` carries
/// command-specific structure (migration counts, seed totals) so callers do
/// not have to parse the message text.
#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::build(command, "ok", None, message.into(), None, 0)
    }

    pub fn success_with_details(
        command: &str,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self::build(command, "ok", None, message.into(), Some(details), 0)
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::build(command, "error", Some(error_class), message.into(), None, exit_code)
    }

    fn build(
        command: &str,
        status: &str,
        error_class: Option<&str>,
        message: String,
        details: Option<Value>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: status.to_string(),
            error_class: error_class.map(str::to_string),
            message,
            details,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
