//! Lifecycle of the desktop container.
//!
//! `Unstarted -> Starting -> Ready -> Stopping -> Stopped`, with
//! `Starting -> Stopped` when startup fails. Domain methods (see
//! [`dispatch`]) only run in `Ready`.

pub mod dispatch;

use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::audit::AuditLogger;
use crate::bootstrap::Bootstrapper;
use crate::config::Settings;
use crate::container::{ContainerHandle, ContainerRuntime, DockerRuntime};
use crate::error::{ControllerError, ControllerResult};
use crate::models::{ContainerConfig, ContainerStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unstarted,
    Starting,
    Ready,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            LifecycleState::Unstarted => "unstarted",
            LifecycleState::Starting => "starting",
            LifecycleState::Ready => "ready",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };
        write!(f, "{}", state)
    }
}

/// Owns one desktop container for its lifetime.
///
/// Dropping a controller that still holds a container schedules a background
/// stop on the current tokio runtime.
pub struct DesktopController<R: ContainerRuntime + 'static = DockerRuntime> {
    runtime: Arc<R>,
    config: ContainerConfig,
    settings: Settings,
    state: LifecycleState,
    handle: Option<ContainerHandle>,
    audit_logger: Option<AuditLogger>,
}

impl DesktopController<DockerRuntime> {
    /// Connect to Docker using `settings.docker_host`.
    pub async fn connect(config: ContainerConfig, settings: Settings) -> ControllerResult<Self> {
        let runtime = DockerRuntime::new(&settings).await?;
        Self::new(runtime, config, settings)
    }
}

impl<R: ContainerRuntime + 'static> DesktopController<R> {
    pub fn new(runtime: R, config: ContainerConfig, settings: Settings) -> ControllerResult<Self> {
        config.validate()?;
        settings.check()?;

        let audit_logger = if settings.enable_audit_log {
            match AuditLogger::new(&settings.audit_log_path) {
                Ok(logger) => Some(logger),
                Err(e) => {
                    error!("Failed to initialize audit logger: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            runtime: Arc::new(runtime),
            config,
            settings,
            state: LifecycleState::Unstarted,
            handle: None,
            audit_logger,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn handle(&self) -> Option<&ContainerHandle> {
        self.handle.as_ref()
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Create or attach to the container, wait for it to run, install the
    /// remote-control binary.
    ///
    /// On failure any container obtained along the way is stopped again and
    /// the controller ends up `Stopped`.
    pub async fn start(&mut self) -> ControllerResult<()> {
        match self.state {
            LifecycleState::Unstarted | LifecycleState::Stopped => {}
            state => {
                return Err(ControllerError::InvalidState {
                    operation: "start",
                    state,
                })
            }
        }

        self.state = LifecycleState::Starting;
        info!("Starting desktop container '{}'", self.config.container_name);

        // Pulling an image can take minutes; only readiness is time-bounded.
        let outcome = match self.acquire().await {
            Ok(handle) => {
                let start_timeout = self.settings.start_timeout();
                match timeout(start_timeout, self.bring_up(&handle)).await {
                    Ok(result) => result,
                    Err(_) => Err(ControllerError::Startup(format!(
                        "container {} was not ready after {}s",
                        handle,
                        start_timeout.as_secs()
                    ))),
                }
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                self.state = LifecycleState::Ready;
                if let Some(handle) = &self.handle {
                    info!("Desktop container {} is ready", handle);
                }
                Ok(())
            }
            Err(e) => {
                error!("Error during startup: {}", e);
                self.clean_up_failed_start().await;
                self.state = LifecycleState::Stopped;
                Err(match e {
                    ControllerError::Startup(_) => e,
                    other => ControllerError::Startup(other.to_string()),
                })
            }
        }
    }

    /// Attach to the named container or create it.
    async fn acquire(&mut self) -> ControllerResult<ContainerHandle> {
        let name = self.config.container_name.as_str();

        let handle = match self.runtime.find_container(name).await? {
            Some(handle) => {
                info!("Attached to existing container {}", handle);
                handle
            }
            None => {
                info!("Container '{}' not found. Creating a new one", name);
                self.runtime.create_container(&self.config).await?
            }
        };
        self.handle = Some(handle.clone());

        Ok(handle)
    }

    /// Start the container if needed, wait for it, install the binary.
    async fn bring_up(&self, handle: &ContainerHandle) -> ControllerResult<()> {
        let status = self.runtime.container_status(&handle.id).await?;
        if !status.is_running() {
            info!(
                "Container {} is not running (status: {}). Starting it",
                handle, status
            );
            self.runtime.start_container(&handle.id).await?;
            self.wait_until_running(handle).await?;
        }

        let outcome = Bootstrapper::new(&self.settings.cli_path, &self.settings.release_url)
            .skip(self.settings.skip_bootstrap)
            .ensure_installed(self.runtime.as_ref(), handle)
            .await?;
        debug!("Bootstrap of {}: {:?}", handle, outcome);

        Ok(())
    }

    async fn wait_until_running(&self, handle: &ContainerHandle) -> ControllerResult<()> {
        loop {
            match self.runtime.container_status(&handle.id).await? {
                ContainerStatus::Running => return Ok(()),
                status @ (ContainerStatus::Exited | ContainerStatus::Dead) => {
                    return Err(ControllerError::Startup(format!(
                        "container {} failed to start (status: {})",
                        handle, status
                    )))
                }
                status => {
                    debug!("Waiting for {} (status: {})", handle, status);
                    sleep(self.settings.start_poll_interval()).await;
                }
            }
        }
    }

    async fn clean_up_failed_start(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        if let Err(e) = self.runtime.stop_container(&handle.id).await {
            warn!("Failed to stop {} after startup error: {}", handle, e);
        }
        if self.settings.remove_on_stop {
            if let Err(e) = self.runtime.remove_container(&handle.id).await {
                warn!("Failed to remove {} after startup error: {}", handle, e);
            }
        }
    }

    /// Stop (and, with `remove_on_stop`, remove) the container.
    ///
    /// Calling it on a controller that holds no container is a no-op. When the
    /// runtime fails, the controller keeps its handle and `stop` may be retried.
    pub async fn stop(&mut self) -> ControllerResult<()> {
        let previous = self.state;
        if matches!(previous, LifecycleState::Unstarted | LifecycleState::Stopped) {
            debug!("No container to stop");
            return Ok(());
        }

        let Some(handle) = self.handle.clone() else {
            self.state = LifecycleState::Stopped;
            return Ok(());
        };

        self.state = LifecycleState::Stopping;

        match self.shut_down(&handle).await {
            Ok(()) => {
                self.handle = None;
                self.state = LifecycleState::Stopped;
                info!("Container {} has been stopped", handle);
                Ok(())
            }
            Err(e) => {
                error!("Error while stopping container {}: {}", handle, e);
                self.state = previous;
                Err(match e {
                    ControllerError::Shutdown(_) => e,
                    other => ControllerError::Shutdown(other.to_string()),
                })
            }
        }
    }

    async fn shut_down(&self, handle: &ContainerHandle) -> ControllerResult<()> {
        self.runtime.stop_container(&handle.id).await?;
        if self.settings.remove_on_stop {
            self.runtime.remove_container(&handle.id).await?;
        }
        Ok(())
    }

    /// Start, run `body`, stop.
    ///
    /// `stop` runs exactly once whatever `body` returns; if both fail the
    /// body's error is returned. Dropping the returned future part-way hands
    /// the container to the `Drop` cleanup.
    pub async fn session<T, F>(mut self, body: F) -> ControllerResult<T>
    where
        F: for<'c> FnOnce(&'c mut DesktopController<R>) -> BoxFuture<'c, ControllerResult<T>>,
    {
        self.start().await?;

        let result = body(&mut self).await;
        let stopped = self.stop().await;

        if stopped.is_err() {
            // Reported to the caller below; do not retry from Drop.
            self.handle = None;
            self.state = LifecycleState::Stopped;
        }

        match (result, stopped) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(stop_error)) => Err(stop_error),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(stop_error)) => {
                warn!("Stop failed after session error ({}): {}", e, stop_error);
                Err(e)
            }
        }
    }

    pub async fn runtime_info(&self) -> ControllerResult<String> {
        self.runtime.health_check().await
    }
}

impl<R: ContainerRuntime + 'static> Drop for DesktopController<R> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        let runtime = Arc::clone(&self.runtime);
        let remove = self.settings.remove_on_stop;

        match tokio::runtime::Handle::try_current() {
            Ok(tokio_handle) => {
                warn!(
                    "Controller dropped while {}; stopping {} in the background",
                    self.state, handle
                );
                tokio_handle.spawn(async move {
                    if let Err(e) = runtime.stop_container(&handle.id).await {
                        warn!("Background stop of {} failed: {}", handle, e);
                        return;
                    }
                    if remove {
                        if let Err(e) = runtime.remove_container(&handle.id).await {
                            warn!("Background removal of {} failed: {}", handle, e);
                        }
                    }
                });
            }
            Err(_) => warn!(
                "Controller dropped outside a tokio runtime; container {} left running",
                handle
            ),
        }
    }
}
