//! Domain methods: one per `robotgo-cli` subcommand.
//!
//! Arguments are validated before the lifecycle state is checked, so a bad
//! argument reports the same error whether or not the container is up.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::time::timeout;
use tracing::debug;

use super::{DesktopController, LifecycleState};
use crate::command::{
    parse_modifiers, MouseButton, Region, RobotCommand, ScrollDirection, ToggleState, WindowTarget,
};
use crate::container::{ContainerHandle, ContainerRuntime};
use crate::error::{ControllerError, ControllerResult};

impl<R: ContainerRuntime + 'static> DesktopController<R> {
    /// Run `command` inside the container and return its stdout with trailing
    /// line terminators removed.
    pub async fn dispatch(&mut self, command: RobotCommand) -> ControllerResult<String> {
        command.validate()?;
        let handle = self.ready_handle(command.action())?;

        let line = command.to_command_line(&self.settings.cli_path);
        debug!("Running in {}: {}", handle, line);

        let exec_timeout = self.settings.exec_timeout();
        let output = match timeout(exec_timeout, self.runtime.exec(&handle.id, line.to_argv())).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                if let Some(logger) = &self.audit_logger {
                    logger.log_command_error(&handle.name, &command, &e).await;
                }
                return Err(e);
            }
            Err(_) => {
                let e = ControllerError::CommandTimeout {
                    command: line.to_string(),
                    seconds: exec_timeout.as_secs(),
                };
                if let Some(logger) = &self.audit_logger {
                    logger.log_command_error(&handle.name, &command, &e).await;
                }
                return Err(e);
            }
        };

        if let Some(logger) = &self.audit_logger {
            logger.log_command(&handle.name, &command, &output).await;
        }

        if !output.success() {
            return Err(ControllerError::Command {
                command: line.to_string(),
                exit_code: output.exit_code,
                stderr: output.error_text(),
            });
        }

        debug!(
            "{} finished in {}ms",
            command.action(),
            output.execution_time_ms
        );
        Ok(output
            .stdout
            .trim_end_matches(|c| c == '\n' || c == '\r')
            .to_string())
    }

    fn ready_handle(&self, operation: &'static str) -> ControllerResult<ContainerHandle> {
        match (self.state, &self.handle) {
            (LifecycleState::Ready, Some(handle)) => Ok(handle.clone()),
            (state, _) => Err(ControllerError::InvalidState { operation, state }),
        }
    }

    pub async fn mouse_move(&mut self, coordinate: [f64; 2]) -> ControllerResult<String> {
        let [x, y] = coordinate;
        self.dispatch(RobotCommand::MouseMove { x, y }).await
    }

    pub async fn mouse_click(&mut self, button: &str, double: bool) -> ControllerResult<String> {
        let button: MouseButton = button.parse()?;
        self.dispatch(RobotCommand::MouseClick { button, double })
            .await
    }

    pub async fn mouse_scroll(&mut self, direction: &str, steps: i64) -> ControllerResult<String> {
        let direction: ScrollDirection = direction.parse()?;
        self.dispatch(RobotCommand::MouseScroll { direction, steps })
            .await
    }

    pub async fn mouse_toggle(&mut self, button: &str, state: &str) -> ControllerResult<String> {
        let button: MouseButton = button.parse()?;
        let state: ToggleState = state.parse()?;
        self.dispatch(RobotCommand::MouseToggle { button, state })
            .await
    }

    pub async fn keyboard_type(&mut self, text: &str) -> ControllerResult<String> {
        self.dispatch(RobotCommand::KeyboardType {
            text: text.to_string(),
        })
        .await
    }

    pub async fn keyboard_tap(&mut self, key: &str, mods: &[&str]) -> ControllerResult<String> {
        let mods = parse_modifiers(mods)?;
        self.dispatch(RobotCommand::KeyboardTap {
            key: key.to_string(),
            mods,
        })
        .await
    }

    pub async fn keyboard_toggle(&mut self, key: &str, state: &str) -> ControllerResult<String> {
        let state: ToggleState = state.parse()?;
        self.dispatch(RobotCommand::KeyboardToggle {
            key: key.to_string(),
            state,
        })
        .await
    }

    /// Base64-encoded PNG of `region`, or of the whole screen with `full`.
    pub async fn screen_capture(&mut self, region: Region, full: bool) -> ControllerResult<String> {
        self.dispatch(RobotCommand::ScreenCapture { region, full })
            .await
    }

    /// Like [`screen_capture`](Self::screen_capture), decoded to PNG bytes.
    pub async fn screen_capture_png(
        &mut self,
        region: Region,
        full: bool,
    ) -> ControllerResult<Vec<u8>> {
        let encoded = self.screen_capture(region, full).await?;
        STANDARD
            .decode(encoded.trim())
            .map_err(|e| ControllerError::MalformedOutput {
                command: "screen capture".to_string(),
                reason: format!("invalid base64: {}", e),
            })
    }

    pub async fn screen_getpixel(&mut self, x: i64, y: i64) -> ControllerResult<String> {
        self.dispatch(RobotCommand::ScreenGetPixel { x, y }).await
    }

    pub async fn screen_size(&mut self) -> ControllerResult<String> {
        self.dispatch(RobotCommand::ScreenSize).await
    }

    pub async fn window_activate(&mut self, target: WindowTarget) -> ControllerResult<String> {
        self.dispatch(RobotCommand::WindowActivate { target }).await
    }

    /// Exactly one of `name` or `pid`.
    pub async fn window_activate_by(
        &mut self,
        name: Option<&str>,
        pid: Option<i64>,
    ) -> ControllerResult<String> {
        let target = WindowTarget::from_parts(name, pid)?;
        self.window_activate(target).await
    }

    pub async fn window_kill(&mut self, pid: i64) -> ControllerResult<String> {
        self.dispatch(RobotCommand::WindowKill { pid }).await
    }

    pub async fn window_title(&mut self) -> ControllerResult<String> {
        self.dispatch(RobotCommand::WindowTitle).await
    }

    pub async fn clipboard_read(&mut self) -> ControllerResult<String> {
        self.dispatch(RobotCommand::ClipboardRead).await
    }

    pub async fn clipboard_write(&mut self, text: &str) -> ControllerResult<String> {
        self.dispatch(RobotCommand::ClipboardWrite {
            text: text.to_string(),
        })
        .await
    }

    pub async fn process_list(&mut self) -> ControllerResult<String> {
        self.dispatch(RobotCommand::ProcessList).await
    }

    pub async fn process_kill(&mut self, pid: i64) -> ControllerResult<String> {
        self.dispatch(RobotCommand::ProcessKill { pid }).await
    }
}
