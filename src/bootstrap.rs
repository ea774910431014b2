//! Installs `robotgo-cli` into a freshly started container.
//!
//! Detection is a `test -x` on the install path: an executable file there is
//! taken as an existing installation and the download is skipped.

use tracing::{debug, info};

use crate::command::CommandLine;
use crate::container::{ContainerHandle, ContainerRuntime};
use crate::error::{ControllerError, ControllerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    AlreadyInstalled,
    Installed,
    Skipped,
}

pub struct Bootstrapper<'a> {
    cli_path: &'a str,
    release_url: &'a str,
    skip: bool,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(cli_path: &'a str, release_url: &'a str) -> Self {
        Self {
            cli_path,
            release_url,
            skip: false,
        }
    }

    /// Trust the image to ship the binary and run nothing.
    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    fn check_command(&self) -> CommandLine {
        CommandLine::new("test", ["-x", self.cli_path])
    }

    fn download_command(&self) -> CommandLine {
        CommandLine::new("curl", ["-fsSL", "-o", self.cli_path, self.release_url])
    }

    fn chmod_command(&self) -> CommandLine {
        CommandLine::new("chmod", ["+x", self.cli_path])
    }

    pub async fn ensure_installed<R: ContainerRuntime + ?Sized>(
        &self,
        runtime: &R,
        handle: &ContainerHandle,
    ) -> ControllerResult<BootstrapOutcome> {
        if self.skip {
            debug!("Bootstrap disabled, assuming {} is present", self.cli_path);
            return Ok(BootstrapOutcome::Skipped);
        }

        let check = runtime
            .exec(&handle.id, self.check_command().to_argv())
            .await
            .map_err(|e| ControllerError::Startup(format!("Installation check failed: {}", e)))?;

        if check.success() {
            info!(
                "robotgo-cli already present in {} at {}, skipping download",
                handle, self.cli_path
            );
            return Ok(BootstrapOutcome::AlreadyInstalled);
        }

        info!("Downloading robotgo-cli into {}", handle);

        for step in [self.download_command(), self.chmod_command()] {
            debug!("Bootstrap step: {}", step);
            let output = runtime
                .exec(&handle.id, step.to_argv())
                .await
                .map_err(|e| ControllerError::Startup(format!("`{}` failed: {}", step, e)))?;

            if !output.success() {
                return Err(ControllerError::Startup(format!(
                    "`{}` exited with code {}: {}",
                    step,
                    output.exit_code,
                    output.error_text()
                )));
            }
        }

        info!("robotgo-cli installed in {}", handle);
        Ok(BootstrapOutcome::Installed)
    }
}
