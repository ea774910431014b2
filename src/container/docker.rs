use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::ContainerStateStatusEnum;
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
    RemoveContainerOptionsBuilder, StartContainerOptions, StopContainerOptionsBuilder,
};
use bollard::service::ContainerCreateBody;
use bollard::Docker;
use futures::StreamExt;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::host_config::create_body;
use super::{ContainerHandle, ContainerRuntime};
use crate::config::Settings;
use crate::error::{ControllerError, ControllerResult};
use crate::models::{ContainerConfig, ContainerStatus, ExecOutput};

pub struct DockerRuntime {
    docker: Docker,
    stop_timeout_seconds: i32,
}

impl DockerRuntime {
    pub async fn new(settings: &Settings) -> ControllerResult<Self> {
        let stop_timeout_seconds = i32::try_from(settings.stop_timeout_seconds).map_err(|_| {
            ControllerError::Configuration(format!(
                "stop_timeout_seconds out of range: {}",
                settings.stop_timeout_seconds
            ))
        })?;

        let docker = if settings.docker_host.starts_with("unix://") {
            Docker::connect_with_unix(
                settings.docker_host.trim_start_matches("unix://"),
                120,
                bollard::API_DEFAULT_VERSION,
            )
        } else {
            Docker::connect_with_http(&settings.docker_host, 120, bollard::API_DEFAULT_VERSION)
        }
        .map_err(|e| ControllerError::DockerConnectionFailed(e.to_string()))?;

        // Verify Docker connection
        match docker.ping().await {
            Ok(_) => info!("Docker connection established ({})", settings.docker_host),
            Err(e) => {
                error!("Docker connection failed: {}", e);
                return Err(ControllerError::DockerConnectionFailed(e.to_string()));
            }
        }

        Ok(Self {
            docker,
            stop_timeout_seconds,
        })
    }

    async fn pull_image(&self, image: &str) -> ControllerResult<()> {
        info!("Pulling image {}", image);

        let (repository, tag) = split_image_reference(image);
        let options = CreateImageOptionsBuilder::new()
            .from_image(repository)
            .tag(tag)
            .build();
        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!("Pull progress: {}", status);
                    }
                }
                Err(e) => {
                    return Err(ControllerError::Runtime(format!(
                        "Failed to pull image {}: {}",
                        image, e
                    )));
                }
            }
        }

        info!("Image pulled: {}", image);
        Ok(())
    }

    async fn try_create(
        &self,
        name: &str,
        body: ContainerCreateBody,
    ) -> Result<String, DockerError> {
        let options = CreateContainerOptionsBuilder::new().name(name).build();

        let response = self.docker.create_container(Some(options), body).await?;

        for warning in response.warnings {
            warn!("Container creation warning: {}", warning);
        }

        Ok(response.id)
    }

    async fn collect_exec(&self, exec_id: &str) -> ControllerResult<(String, String)> {
        let start_result = self
            .docker
            .start_exec(exec_id, None::<StartExecOptions>)
            .await?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(msg) = output.next().await {
                match msg {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Err(e) => {
                        return Err(ControllerError::Runtime(format!(
                            "Error reading exec output: {}",
                            e
                        )));
                    }
                    _ => {}
                }
            }
        }

        Ok((stdout, stderr))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn find_container(&self, name: &str) -> ControllerResult<Option<ContainerHandle>> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => {
                let id = info.id.unwrap_or_else(|| name.to_string());
                debug!("Found existing container {} ({})", name, id);
                Ok(Some(ContainerHandle::new(id, name)))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_container(&self, config: &ContainerConfig) -> ControllerResult<ContainerHandle> {
        debug!("Creating container: {}", config.container_name);

        let body = create_body(config)?;
        let name = config.container_name.as_str();

        let id = match self.try_create(name, body.clone()).await {
            Ok(id) => id,
            // No such image: pull it and try once more
            Err(e) if is_not_found(&e) => {
                self.pull_image(&config.image).await?;
                self.try_create(name, body).await.map_err(|e| {
                    ControllerError::Runtime(format!("Failed to create container: {}", e))
                })?
            }
            Err(e) => {
                return Err(ControllerError::Runtime(format!(
                    "Failed to create container: {}",
                    e
                )))
            }
        };

        info!("Container created: {} ({})", config.container_name, id);
        Ok(ContainerHandle::new(id, config.container_name.clone()))
    }

    async fn start_container(&self, container_id: &str) -> ControllerResult<()> {
        debug!("Starting container: {}", container_id);

        match self
            .docker
            .start_container(container_id, None::<StartContainerOptions>)
            .await
        {
            Ok(()) => {}
            // Already started
            Err(DockerError::DockerResponseServerError {
                status_code: 304, ..
            }) => {}
            Err(e) => return Err(e.into()),
        }

        info!("Container started: {}", container_id);
        Ok(())
    }

    async fn container_status(&self, container_id: &str) -> ControllerResult<ContainerStatus> {
        let info = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await?;

        let status = info
            .state
            .and_then(|state| state.status)
            .map(|status| match status {
                ContainerStateStatusEnum::CREATED => ContainerStatus::Created,
                ContainerStateStatusEnum::RUNNING => ContainerStatus::Running,
                ContainerStateStatusEnum::PAUSED => ContainerStatus::Paused,
                ContainerStateStatusEnum::RESTARTING => ContainerStatus::Restarting,
                ContainerStateStatusEnum::EXITED => ContainerStatus::Exited,
                ContainerStateStatusEnum::DEAD => ContainerStatus::Dead,
                _ => ContainerStatus::Unknown,
            })
            .unwrap_or(ContainerStatus::Unknown);

        Ok(status)
    }

    async fn exec(&self, container_id: &str, argv: Vec<String>) -> ControllerResult<ExecOutput> {
        let start_time = Instant::now();

        let exec_config = CreateExecOptions {
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            cmd: Some(argv),
            ..Default::default()
        };

        let exec = self.docker.create_exec(container_id, exec_config).await?;

        let (stdout, stderr) = self.collect_exec(&exec.id).await?;

        let exit_code = self
            .docker
            .inspect_exec(&exec.id)
            .await?
            .exit_code
            .ok_or_else(|| {
                ControllerError::Runtime(format!("Exec {} reported no exit code", exec.id))
            })?;

        Ok(ExecOutput {
            exit_code,
            stdout,
            stderr,
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    async fn stop_container(&self, container_id: &str) -> ControllerResult<()> {
        debug!("Stopping container: {}", container_id);

        let options = StopContainerOptionsBuilder::new()
            .t(self.stop_timeout_seconds)
            .build();

        match self.docker.stop_container(container_id, Some(options)).await {
            Ok(()) => info!("Container stopped: {}", container_id),
            Err(DockerError::DockerResponseServerError {
                status_code: 304, ..
            }) => debug!("Container already stopped: {}", container_id),
            Err(e) if is_not_found(&e) => debug!("Container already gone: {}", container_id),
            Err(e) => {
                warn!("Failed to stop container {}: {}", container_id, e);
                return Err(ControllerError::Shutdown(e.to_string()));
            }
        }

        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> ControllerResult<()> {
        debug!("Removing container: {}", container_id);

        let options = RemoveContainerOptionsBuilder::new()
            .force(true)
            .v(false)
            .build();

        match self
            .docker
            .remove_container(container_id, Some(options))
            .await
        {
            Ok(()) => info!("Container removed: {}", container_id),
            Err(e) if is_not_found(&e) => debug!("Container already removed: {}", container_id),
            Err(e) => {
                warn!("Failed to remove container {}: {}", container_id, e);
                return Err(ControllerError::Shutdown(e.to_string()));
            }
        }

        Ok(())
    }

    async fn health_check(&self) -> ControllerResult<String> {
        match self.docker.version().await {
            Ok(version) => Ok(format!("Docker {}", version.version.unwrap_or_default())),
            Err(e) => Err(ControllerError::DockerConnectionFailed(e.to_string())),
        }
    }
}

fn is_not_found(error: &DockerError) -> bool {
    matches!(
        error,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Split an image reference into repository and tag (or digest).
///
/// An untagged reference pulls `latest`; without a tag the engine would pull
/// every tag of the repository.
fn split_image_reference(image: &str) -> (&str, &str) {
    if let Some((repository, digest)) = image.split_once('@') {
        return (repository, digest);
    }

    // A ':' before the last '/' belongs to a registry port
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => (&image[..name_start + i], &image[name_start + i + 1..]),
        None => (image, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_image_reference() {
        assert_eq!(split_image_reference("ubuntu"), ("ubuntu", "latest"));
        assert_eq!(split_image_reference("ubuntu:22.04"), ("ubuntu", "22.04"));
        assert_eq!(
            split_image_reference("lscr.io/linuxserver/webtop:ubuntu-xfce"),
            ("lscr.io/linuxserver/webtop", "ubuntu-xfce")
        );
        assert_eq!(
            split_image_reference("registry.local:5000/desktop"),
            ("registry.local:5000/desktop", "latest")
        );
        assert_eq!(
            split_image_reference("registry.local:5000/desktop:v2"),
            ("registry.local:5000/desktop", "v2")
        );
        assert_eq!(
            split_image_reference("ubuntu@sha256:0123abcd"),
            ("ubuntu", "sha256:0123abcd")
        );
    }
}
