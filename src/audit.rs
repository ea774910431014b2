use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::error;

use crate::command::RobotCommand;
use crate::error::ControllerError;
use crate::models::ExecOutput;

/// One dispatched command. Text payloads are recorded by size only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: String,
    pub container: String,
    pub action: String,
    pub argument_bytes: usize,
    pub exit_code: Option<i64>,
    pub execution_time_ms: Option<u64>,
    pub success: bool,
    pub error: Option<String>,
}

pub struct AuditLogger {
    log_file: Mutex<std::fs::File>,
}

impl AuditLogger {
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let log_path = log_path.as_ref();

        // Create parent directories if they don't exist
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            log_file: Mutex::new(file),
        })
    }

    pub async fn log_command(&self, container: &str, command: &RobotCommand, output: &ExecOutput) {
        let entry = AuditLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            container: container.to_string(),
            action: command.action().to_string(),
            argument_bytes: command.argument_bytes(),
            exit_code: Some(output.exit_code),
            execution_time_ms: Some(output.execution_time_ms),
            success: output.success(),
            error: if output.success() {
                None
            } else {
                Some(output.error_text())
            },
        };

        self.write_log_entry(entry).await;
    }

    pub async fn log_command_error(
        &self,
        container: &str,
        command: &RobotCommand,
        error: &ControllerError,
    ) {
        let entry = AuditLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            container: container.to_string(),
            action: command.action().to_string(),
            argument_bytes: command.argument_bytes(),
            exit_code: None,
            execution_time_ms: None,
            success: false,
            error: Some(error.to_string()),
        };

        self.write_log_entry(entry).await;
    }

    async fn write_log_entry(&self, entry: AuditLogEntry) {
        if let Ok(json) = serde_json::to_string(&entry) {
            let mut file = self.log_file.lock().await;
            if let Err(e) = writeln!(file, "{}", json) {
                error!("Failed to write audit log: {}", e);
            }
            if let Err(e) = file.flush() {
                error!("Failed to flush audit log: {}", e);
            }
        }
    }
}
