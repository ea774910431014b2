use bollard::models::{
    DeviceMapping, HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::service::ContainerCreateBody;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{ControllerError, ControllerResult};
use crate::models::{port_map, ContainerConfig};

/// Engine-side settings derived from a [`ContainerConfig`].
pub struct DesktopHostConfig {
    pub port_bindings: HashMap<String, u16>,
    pub binds: Vec<String>,
    pub security_opt: Vec<String>,
    pub devices: Vec<DeviceMapping>,
    pub shm_size: Option<i64>,
    pub restart_policy: RestartPolicy,
}

impl DesktopHostConfig {
    pub fn from_config(config: &ContainerConfig) -> ControllerResult<Self> {
        let shm_size = config
            .shm_size_bytes()
            .map_err(ControllerError::Configuration)?;

        debug!(
            "Host config for {}: {} ports, {} binds, {} devices, shm {:?}",
            config.container_name,
            config.ports.len(),
            config.volumes.len(),
            config.devices.len(),
            shm_size
        );

        Ok(Self {
            port_bindings: port_map(&config.ports),
            binds: config.bind_list(),
            security_opt: config.security_opt.clone(),
            devices: config
                .devices
                .iter()
                .map(|device| DeviceMapping {
                    path_on_host: Some(device.path_on_host.clone()),
                    path_in_container: Some(device.path_in_container.clone()),
                    cgroup_permissions: Some(device.cgroup_permissions.clone()),
                })
                .collect(),
            shm_size,
            restart_policy: RestartPolicy {
                name: Some(restart_policy_name(&config.restart_policy.name)?),
                maximum_retry_count: config.restart_policy.maximum_retry_count,
            },
        })
    }

    pub fn to_host_config(&self) -> HostConfig {
        let mut host_config = HostConfig::default();

        // Ports
        if !self.port_bindings.is_empty() {
            let bindings = self
                .port_bindings
                .iter()
                .map(|(container_port, host_port)| {
                    (
                        container_port.clone(),
                        Some(vec![PortBinding {
                            host_ip: None,
                            host_port: Some(host_port.to_string()),
                        }]),
                    )
                })
                .collect();
            host_config.port_bindings = Some(bindings);
        }

        // Filesystem
        if !self.binds.is_empty() {
            host_config.binds = Some(self.binds.clone());
        }

        // Security options, e.g. seccomp:unconfined for desktop browsers
        if !self.security_opt.is_empty() {
            host_config.security_opt = Some(self.security_opt.clone());
        }

        // GPU / render nodes
        if !self.devices.is_empty() {
            host_config.devices = Some(self.devices.clone());
        }

        host_config.shm_size = self.shm_size;
        host_config.restart_policy = Some(self.restart_policy.clone());

        host_config
    }
}

/// Create body for the desktop container described by `config`.
pub fn create_body(config: &ContainerConfig) -> ControllerResult<ContainerCreateBody> {
    let desktop = DesktopHostConfig::from_config(config)?;
    let host_config = desktop.to_host_config();

    let mut body = ContainerCreateBody::default();
    body.image = Some(config.image.clone());
    body.hostname = Some(config.container_name.trim_start_matches('/').to_string());
    if !config.environment.is_empty() {
        body.env = Some(config.env_list());
    }
    // Published ports are exposed too, as `docker run -p` does
    if !desktop.port_bindings.is_empty() {
        body.exposed_ports = Some(
            desktop
                .port_bindings
                .keys()
                .map(|container_port| (container_port.clone(), Default::default()))
                .collect(),
        );
    }
    body.tty = Some(false);
    body.host_config = Some(host_config);

    Ok(body)
}

fn restart_policy_name(name: &str) -> ControllerResult<RestartPolicyNameEnum> {
    match name {
        "" => Ok(RestartPolicyNameEnum::EMPTY),
        "no" => Ok(RestartPolicyNameEnum::NO),
        "always" => Ok(RestartPolicyNameEnum::ALWAYS),
        "unless-stopped" => Ok(RestartPolicyNameEnum::UNLESS_STOPPED),
        "on-failure" => Ok(RestartPolicyNameEnum::ON_FAILURE),
        other => Err(ControllerError::Configuration(format!(
            "Invalid restart policy: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceMapping as DeviceSpec, RestartPolicy as RestartSpec};

    fn desktop() -> ContainerConfig {
        ContainerConfig::new("lscr.io/linuxserver/chromium:latest", "chromium")
            .port("3000/tcp", 3000)
            .port("3001/tcp", 3001)
            .env("PUID", "1000")
            .env("CHROME_CLI", "https://example.com/")
            .volume("/srv/config", "/config", "rw")
            .security_opt("seccomp:unconfined")
            .device(DeviceSpec::new("/dev/dri", "/dev/dri"))
            .shm_size("1gb")
    }

    #[test]
    fn test_host_config_from_desktop_profile() {
        let host_config = DesktopHostConfig::from_config(&desktop())
            .unwrap()
            .to_host_config();

        let bindings = host_config.port_bindings.unwrap();
        let first = bindings["3000/tcp"].as_ref().unwrap();
        assert_eq!(first[0].host_port.as_deref(), Some("3000"));
        assert_eq!(bindings.len(), 2);

        assert_eq!(host_config.binds.unwrap(), vec!["/srv/config:/config:rw"]);
        assert_eq!(host_config.security_opt.unwrap(), vec!["seccomp:unconfined"]);

        let devices = host_config.devices.unwrap();
        assert_eq!(devices[0].path_on_host.as_deref(), Some("/dev/dri"));
        assert_eq!(devices[0].cgroup_permissions.as_deref(), Some("rwm"));

        assert_eq!(host_config.shm_size, Some(1024 * 1024 * 1024));
        assert_eq!(
            host_config.restart_policy.unwrap().name,
            Some(RestartPolicyNameEnum::UNLESS_STOPPED)
        );
    }

    #[test]
    fn test_create_body_carries_image_and_env() {
        let body = create_body(&desktop()).unwrap();
        assert_eq!(
            body.image.as_deref(),
            Some("lscr.io/linuxserver/chromium:latest")
        );
        let env = body.env.unwrap();
        assert!(env.contains(&"PUID=1000".to_string()));
        assert!(env.contains(&"CHROME_CLI=https://example.com/".to_string()));
    }

    #[test]
    fn test_create_body_exposes_published_ports() {
        let config = ContainerConfig::new("img", "box")
            .port("3000", 3000)
            .port("3001/udp", 3001);
        let body = create_body(&config).unwrap();
        let exposed = body.exposed_ports.unwrap();
        assert_eq!(exposed.len(), 2);
        assert!(exposed.contains_key("3000/tcp"));
        assert!(exposed.contains_key("3001/udp"));

        let body = create_body(&ContainerConfig::new("img", "box")).unwrap();
        assert!(body.exposed_ports.is_none());
    }

    #[test]
    fn test_minimal_profile_leaves_optional_fields_unset() {
        let host_config = DesktopHostConfig::from_config(&ContainerConfig::new("img", "box"))
            .unwrap()
            .to_host_config();
        assert!(host_config.port_bindings.is_none());
        assert!(host_config.binds.is_none());
        assert!(host_config.devices.is_none());
        assert!(host_config.shm_size.is_none());
    }

    #[test]
    fn test_bad_restart_policy_and_shm_size() {
        let config = ContainerConfig::new("img", "box").restart_policy(RestartSpec {
            name: "sometimes".to_string(),
            maximum_retry_count: None,
        });
        assert!(matches!(
            DesktopHostConfig::from_config(&config),
            Err(ControllerError::Configuration(_))
        ));

        let config = ContainerConfig::new("img", "box").shm_size("huge");
        assert!(DesktopHostConfig::from_config(&config).is_err());
    }
}
