use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

static CONTAINER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/?[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("valid regex"));

/// Everything needed to create the desktop container. Read once, at start.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ContainerConfig {
    #[validate(length(min = 1))]
    pub image: String,

    #[validate(custom(function = "validate_container_name"))]
    pub container_name: String,

    /// Container port (`"3000/tcp"`) to host port.
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Host path to bind target.
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeBind>,

    #[serde(default)]
    pub security_opt: Vec<String>,

    #[serde(default)]
    pub devices: Vec<DeviceMapping>,

    /// Human form, e.g. `"1gb"` or `"512m"`.
    #[serde(default)]
    pub shm_size: Option<String>,

    #[serde(default)]
    pub restart_policy: RestartPolicy,
}

impl ContainerConfig {
    pub fn new(image: impl Into<String>, container_name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            container_name: container_name.into(),
            ports: BTreeMap::new(),
            environment: BTreeMap::new(),
            volumes: BTreeMap::new(),
            security_opt: Vec::new(),
            devices: Vec::new(),
            shm_size: None,
            restart_policy: RestartPolicy::default(),
        }
    }

    pub fn port(mut self, container_port: impl Into<String>, host_port: u16) -> Self {
        self.ports.insert(container_port.into(), host_port);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn volume(
        mut self,
        host_path: impl Into<String>,
        bind: impl Into<String>,
        mode: impl Into<String>,
    ) -> Self {
        self.volumes.insert(
            host_path.into(),
            VolumeBind {
                bind: bind.into(),
                mode: mode.into(),
            },
        );
        self
    }

    pub fn security_opt(mut self, opt: impl Into<String>) -> Self {
        self.security_opt.push(opt.into());
        self
    }

    pub fn device(mut self, device: DeviceMapping) -> Self {
        self.devices.push(device);
        self
    }

    pub fn shm_size(mut self, size: impl Into<String>) -> Self {
        self.shm_size = Some(size.into());
        self
    }

    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Environment in the engine's `KEY=value` form.
    pub fn env_list(&self) -> Vec<String> {
        self.environment
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }

    /// Volume binds in the engine's `host:container:mode` form.
    pub fn bind_list(&self) -> Vec<String> {
        self.volumes
            .iter()
            .map(|(host, volume)| format!("{}:{}:{}", host, volume.bind, volume.mode))
            .collect()
    }

    pub fn shm_size_bytes(&self) -> Result<Option<i64>, String> {
        self.shm_size.as_deref().map(parse_size).transpose()
    }
}

fn validate_container_name(name: &str) -> Result<(), ValidationError> {
    if CONTAINER_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new("container_name"))
    }
}

/// Parses docker-style sizes: `1gb`, `512m`, `64k`, `1024`.
pub fn parse_size(raw: &str) -> Result<i64, String> {
    let lowered = raw.trim().to_lowercase();
    let split = lowered
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(lowered.len());
    let (digits, unit) = lowered.split_at(split);

    let value: i64 = digits
        .parse()
        .map_err(|_| format!("Invalid size: {}", raw))?;

    let multiplier: i64 = match unit.trim() {
        "" | "b" => 1,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => 1024 * 1024 * 1024,
        other => return Err(format!("Invalid size unit '{}' in {}", other, raw)),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Size too large: {}", raw))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeBind {
    pub bind: String,
    #[serde(default = "default_volume_mode")]
    pub mode: String,
}

fn default_volume_mode() -> String {
    "rw".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceMapping {
    pub path_on_host: String,
    pub path_in_container: String,
    #[serde(default = "default_cgroup_permissions")]
    pub cgroup_permissions: String,
}

fn default_cgroup_permissions() -> String {
    "rwm".to_string()
}

impl DeviceMapping {
    pub fn new(path_on_host: impl Into<String>, path_in_container: impl Into<String>) -> Self {
        Self {
            path_on_host: path_on_host.into(),
            path_in_container: path_in_container.into(),
            cgroup_permissions: default_cgroup_permissions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestartPolicy {
    #[serde(default = "default_restart_name")]
    pub name: String,
    #[serde(default)]
    pub maximum_retry_count: Option<i64>,
}

fn default_restart_name() -> String {
    "unless-stopped".to_string()
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            name: default_restart_name(),
            maximum_retry_count: None,
        }
    }
}

/// Output of one exec inside the container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stderr, or stdout when the process wrote its error there.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Engine-reported state of a container, as far as the controller cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    Unknown,
}

impl ContainerStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
            ContainerStatus::Unknown => "unknown",
        };
        write!(f, "{}", status)
    }
}

/// Port bindings keyed the way the engine's `PortBindings` field expects.
pub fn port_map(ports: &BTreeMap<String, u16>) -> HashMap<String, u16> {
    ports
        .iter()
        .map(|(container_port, host_port)| {
            let key = if container_port.contains('/') {
                container_port.clone()
            } else {
                format!("{}/tcp", container_port)
            };
            (key, *host_port)
        })
        .collect()
}
