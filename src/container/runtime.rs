use crate::error::ControllerResult;
use crate::models::{ContainerConfig, ContainerStatus, ExecOutput};
/// Container runtime abstraction
/// The controller only talks to the engine through this trait, which keeps
/// Docker out of the lifecycle logic and lets tests swap in a fake engine.
use async_trait::async_trait;

use super::ContainerHandle;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Look a container up by name. `Ok(None)` when it does not exist.
    async fn find_container(&self, name: &str) -> ControllerResult<Option<ContainerHandle>>;
    async fn create_container(&self, config: &ContainerConfig) -> ControllerResult<ContainerHandle>;
    async fn start_container(&self, container_id: &str) -> ControllerResult<()>;
    async fn container_status(&self, container_id: &str) -> ControllerResult<ContainerStatus>;
    /// Run `argv` inside the container and wait for it to finish.
    async fn exec(&self, container_id: &str, argv: Vec<String>) -> ControllerResult<ExecOutput>;
    /// Stopping a container that is already stopped or gone succeeds.
    async fn stop_container(&self, container_id: &str) -> ControllerResult<()>;
    async fn remove_container(&self, container_id: &str) -> ControllerResult<()>;
    async fn health_check(&self) -> ControllerResult<String>;
}
