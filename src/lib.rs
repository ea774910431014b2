//! Lifecycle control for a desktop Docker container, plus typed wrappers for
//! the `robotgo-cli` commands run inside it.

pub mod audit;
pub mod bootstrap;
pub mod command;
pub mod config;
pub mod container;
pub mod controller;
pub mod error;
pub mod models;

pub use command::{Region, RobotCommand, WindowTarget};
pub use config::Settings;
pub use container::{ContainerHandle, ContainerRuntime, DockerRuntime};
pub use controller::{DesktopController, LifecycleState};
pub use error::{ControllerError, ControllerResult};
pub use models::{ContainerConfig, ContainerStatus, ExecOutput};
