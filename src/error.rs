use thiserror::Error;

use crate::controller::LifecycleState;

#[derive(Error, Debug)]
pub enum ControllerError {
    // Caller errors
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Cannot {operation} while controller is {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    // Lifecycle errors
    #[error("Failed to start container: {0}")]
    Startup(String),

    #[error("Failed to stop container: {0}")]
    Shutdown(String),

    // Command errors
    #[error("Command `{command}` failed with exit code {exit_code}: {stderr}")]
    Command {
        command: String,
        exit_code: i64,
        stderr: String,
    },

    #[error("Command `{command}` returned malformed output: {reason}")]
    MalformedOutput { command: String, reason: String },

    #[error("Command `{command}` timed out after {seconds}s")]
    CommandTimeout { command: String, seconds: u64 },

    // System errors
    #[error("Container runtime error: {0}")]
    Runtime(String),

    #[error("Docker connection failed: {0}")]
    DockerConnectionFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ControllerError {
    /// True for errors raised before the container runtime was touched.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ControllerError::Validation(_)
                | ControllerError::InvalidState { .. }
                | ControllerError::Configuration(_)
        )
    }
}

impl From<bollard::errors::Error> for ControllerError {
    fn from(err: bollard::errors::Error) -> Self {
        ControllerError::Runtime(err.to_string())
    }
}

impl From<std::io::Error> for ControllerError {
    fn from(err: std::io::Error) -> Self {
        ControllerError::Runtime(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ControllerError {
    fn from(err: validator::ValidationErrors) -> Self {
        ControllerError::Configuration(err.to_string())
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_message() {
        let err = ControllerError::Command {
            command: "robotgo-cli screen size".to_string(),
            exit_code: 2,
            stderr: "no display".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command `robotgo-cli screen size` failed with exit code 2: no display"
        );
        assert!(!err.is_local());
    }

    #[test]
    fn test_state_error_message() {
        let err = ControllerError::InvalidState {
            operation: "mouse_move",
            state: LifecycleState::Stopped,
        };
        assert_eq!(
            err.to_string(),
            "Cannot mouse_move while controller is stopped"
        );
        assert!(err.is_local());
    }
}
