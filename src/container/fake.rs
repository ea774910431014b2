//! In-memory container runtime that records every call.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{ContainerHandle, ContainerRuntime};
use crate::error::{ControllerError, ControllerResult};
use crate::models::{ContainerConfig, ContainerStatus, ExecOutput};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Find(String),
    Create(String),
    Start(String),
    Status(String),
    Exec(Vec<String>),
    Stop(String),
    Remove(String),
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    /// id -> (name, status)
    containers: HashMap<String, (String, ContainerStatus)>,
    next_id: u32,
    responses: Vec<(String, ExecOutput)>,
    create_error: Option<String>,
    start_error: Option<String>,
    stop_error: Option<String>,
    never_running: bool,
    status_after_start: Option<ContainerStatus>,
    create_delay: Option<Duration>,
    exec_delay: Option<Duration>,
    exec_error: Option<String>,
}

/// Cloning shares state, so a test can keep a copy while the controller owns another.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_existing(self, name: &str, status: ContainerStatus) -> Self {
        {
            let mut state = self.lock();
            let id = format!("existing-{}", name);
            state.containers.insert(id, (name.to_string(), status));
        }
        self
    }

    /// Exec calls whose space-joined argv contains `pattern` get `output`.
    /// Unmatched execs succeed with empty output.
    pub fn respond(self, pattern: &str, exit_code: i64, stdout: &str, stderr: &str) -> Self {
        self.lock().responses.push((
            pattern.to_string(),
            ExecOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                execution_time_ms: 1,
            },
        ));
        self
    }

    pub fn fail_create(self, message: &str) -> Self {
        self.lock().create_error = Some(message.to_string());
        self
    }

    pub fn fail_start(self, message: &str) -> Self {
        self.lock().start_error = Some(message.to_string());
        self
    }

    pub fn fail_stop(self, message: &str) -> Self {
        self.lock().stop_error = Some(message.to_string());
        self
    }

    pub fn clear_stop_failure(&self) {
        self.lock().stop_error = None;
    }

    /// Started containers stay in `created`.
    pub fn never_running(self) -> Self {
        self.lock().never_running = true;
        self
    }

    /// Started containers report `status`, e.g. `Exited` for one that crashes.
    pub fn status_after_start(self, status: ContainerStatus) -> Self {
        self.lock().status_after_start = Some(status);
        self
    }

    /// Creation takes `delay`, as a pull of a large image would.
    pub fn create_delay(self, delay: Duration) -> Self {
        self.lock().create_delay = Some(delay);
        self
    }

    pub fn fail_exec(self, message: &str) -> Self {
        self.lock().exec_error = Some(message.to_string());
        self
    }

    pub fn exec_delay(self, delay: Duration) -> Self {
        self.lock().exec_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn exec_calls(&self) -> Vec<Vec<String>> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Exec(argv) => Some(argv.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matcher: fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| matcher(call)).count()
    }

    pub fn running_containers(&self) -> usize {
        self.lock()
            .containers
            .values()
            .filter(|(_, status)| status.is_running())
            .count()
    }

    pub fn container_count(&self) -> usize {
        self.lock().containers.len()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn find_container(&self, name: &str) -> ControllerResult<Option<ContainerHandle>> {
        let mut state = self.lock();
        state.calls.push(Call::Find(name.to_string()));
        Ok(state
            .containers
            .iter()
            .find(|(_, (existing, _))| existing == name)
            .map(|(id, (existing, _))| ContainerHandle::new(id.clone(), existing.clone())))
    }

    async fn create_container(&self, config: &ContainerConfig) -> ControllerResult<ContainerHandle> {
        let delay = self.lock().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.calls.push(Call::Create(config.container_name.clone()));
        if let Some(message) = &state.create_error {
            return Err(ControllerError::Runtime(message.clone()));
        }
        state.next_id += 1;
        let id = format!("fake-{:04}", state.next_id);
        state.containers.insert(
            id.clone(),
            (config.container_name.clone(), ContainerStatus::Created),
        );
        Ok(ContainerHandle::new(id, config.container_name.clone()))
    }

    async fn start_container(&self, container_id: &str) -> ControllerResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::Start(container_id.to_string()));
        if let Some(message) = &state.start_error {
            return Err(ControllerError::Runtime(message.clone()));
        }
        let next_status = match (state.status_after_start, state.never_running) {
            (Some(status), _) => Some(status),
            (None, true) => None,
            (None, false) => Some(ContainerStatus::Running),
        };
        match state.containers.get_mut(container_id) {
            Some((_, status)) => {
                if let Some(next_status) = next_status {
                    *status = next_status;
                }
                Ok(())
            }
            None => Err(ControllerError::Runtime(format!(
                "No such container: {}",
                container_id
            ))),
        }
    }

    async fn container_status(&self, container_id: &str) -> ControllerResult<ContainerStatus> {
        let mut state = self.lock();
        state.calls.push(Call::Status(container_id.to_string()));
        state
            .containers
            .get(container_id)
            .map(|(_, status)| *status)
            .ok_or_else(|| ControllerError::Runtime(format!("No such container: {}", container_id)))
    }

    async fn exec(&self, _container_id: &str, argv: Vec<String>) -> ControllerResult<ExecOutput> {
        let (output, delay) = {
            let mut state = self.lock();
            let joined = argv.join(" ");
            state.calls.push(Call::Exec(argv));
            if let Some(message) = &state.exec_error {
                return Err(ControllerError::Runtime(message.clone()));
            }
            let output = state
                .responses
                .iter()
                .find(|(pattern, _)| joined.contains(pattern.as_str()))
                .map(|(_, output)| output.clone())
                .unwrap_or_default();
            (output, state.exec_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(output)
    }

    async fn stop_container(&self, container_id: &str) -> ControllerResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::Stop(container_id.to_string()));
        if let Some(message) = &state.stop_error {
            return Err(ControllerError::Shutdown(message.clone()));
        }
        if let Some((_, status)) = state.containers.get_mut(container_id) {
            *status = ContainerStatus::Exited;
        }
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> ControllerResult<()> {
        let mut state = self.lock();
        state.calls.push(Call::Remove(container_id.to_string()));
        state.containers.remove(container_id);
        Ok(())
    }

    async fn health_check(&self) -> ControllerResult<String> {
        Ok("Fake 1.0".to_string())
    }
}
