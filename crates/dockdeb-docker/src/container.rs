//! Container management

use std::collections::HashMap;
use std::path::PathBuf;

use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, LogsOptions,
    RemoveContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::models::HostConfig;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DockerError, Result};
use crate::service::{LogOutput, LogStream};

/// Container specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Docker image to use
    pub image: String,

    /// Container name
    pub name: Option<String>,

    /// Command to execute
    pub command: Vec<String>,

    /// Environment variables
    pub environment: HashMap<String, String>,

    /// Volume mounts
    pub volumes: Vec<VolumeMount>,

    /// Working directory
    pub working_dir: Option<String>,

    /// Platform to run the image as
    pub platform: Option<String>,

    /// Labels
    pub labels: HashMap<String, String>,
}

/// Volume mount specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Host path
    pub host_path: PathBuf,

    /// Container path
    pub container_path: String,

    /// Read-only mount
    pub read_only: bool,
}

impl ContainerSpec {
    /// Create a new container specification
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: None,
            command: Vec::new(),
            environment: HashMap::new(),
            volumes: Vec::new(),
            working_dir: None,
            platform: None,
            labels: HashMap::new(),
        }
    }

    /// Set the container name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the command
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Add environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Add volume mount
    pub fn with_volume(mut self, mount: VolumeMount) -> Self {
        self.volumes.push(mount);
        self
    }

    /// Set working directory
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set platform
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Bind strings in `host:container[:ro]` form
    pub fn binds(&self) -> Vec<String> {
        self.volumes
            .iter()
            .map(|v| {
                format!(
                    "{}:{}{}",
                    v.host_path.display(),
                    v.container_path,
                    if v.read_only { ":ro" } else { "" }
                )
            })
            .collect()
    }

    /// Convert to Bollard container config
    pub fn to_container_config(&self) -> Config<String> {
        let mut env: Vec<String> = self
            .environment
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        env.sort();

        let mut config = Config {
            image: Some(self.image.clone()),
            cmd: if self.command.is_empty() { None } else { Some(self.command.clone()) },
            env: Some(env),
            working_dir: self.working_dir.clone(),
            labels: if self.labels.is_empty() { None } else { Some(self.labels.clone()) },
            ..Default::default()
        };

        if !self.volumes.is_empty() {
            config.host_config = Some(HostConfig { binds: Some(self.binds()), ..Default::default() });
        }

        config
    }
}

/// Container manager for executing operations
pub struct ContainerManager<'a> {
    client: &'a bollard::Docker,
}

impl<'a> ContainerManager<'a> {
    /// Create a new container manager
    pub fn new(client: &'a bollard::Docker) -> Self {
        Self { client }
    }

    /// Create and start a container
    ///
    /// A container that was created but failed to start is removed before
    /// the error is returned.
    pub async fn run(&self, spec: &ContainerSpec) -> Result<String> {
        let config = spec.to_container_config();
        let options = CreateContainerOptions {
            name: spec.name.clone().unwrap_or_default(),
            platform: spec.platform.clone(),
        };

        let container = self
            .client
            .create_container(Some(options), config)
            .await
            .map_err(DockerError::Client)?;

        for warning in &container.warnings {
            warn!("Container {}: {}", container.id, warning);
        }

        if let Err(e) = self.client.start_container::<String>(&container.id, None).await {
            if let Err(remove_err) = self.remove(&container.id, true).await {
                warn!("Failed to remove unstarted container {}: {}", container.id, remove_err);
            }
            return Err(DockerError::Client(e));
        }

        debug!("Started container {}", container.id);
        Ok(container.id)
    }

    /// Follow container logs
    pub fn logs(&self, container_id: &str) -> LogStream {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            ..Default::default()
        };

        let stream = self
            .client
            .logs(container_id, Some(options))
            .filter_map(|result| async move {
                match result {
                    Ok(bollard::container::LogOutput::StdOut { message })
                    | Ok(bollard::container::LogOutput::Console { message }) => {
                        Some(Ok(LogOutput::Stdout(String::from_utf8_lossy(&message).to_string())))
                    }
                    Ok(bollard::container::LogOutput::StdErr { message }) => {
                        Some(Ok(LogOutput::Stderr(String::from_utf8_lossy(&message).to_string())))
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(DockerError::Client(e))),
                }
            });

        Box::pin(stream)
    }

    /// Wait for the container to stop and return its exit code
    pub async fn wait(&self, container_id: &str) -> Result<i64> {
        let options = WaitContainerOptions { condition: "not-running" };
        let mut stream = self.client.wait_container(container_id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a nonzero exit status as an error
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(DockerError::Client(e)),
            None => Err(DockerError::ExecutionFailed {
                reason: "Container wait stream ended unexpectedly".to_string(),
            }),
        }
    }

    /// Stop a container with a 10 second grace period
    pub async fn stop(&self, container_id: &str) -> Result<()> {
        self.client
            .stop_container(container_id, Some(StopContainerOptions { t: 10 }))
            .await
            .map_err(DockerError::Client)
    }

    /// Download a path from the container as a tar archive
    pub async fn download(&self, container_id: &str, path: &str) -> Result<Vec<u8>> {
        let options = DownloadFromContainerOptions { path };
        let stream = self.client.download_from_container(container_id, Some(options));
        futures::pin_mut!(stream);

        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                    DockerError::PathNotFound {
                        container: container_id.to_string(),
                        path: path.to_string(),
                    }
                }
                other => DockerError::Client(other),
            })?;
            bytes.extend_from_slice(&chunk);
        }

        Ok(bytes)
    }

    /// Remove container
    pub async fn remove(&self, container_id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions { force, v: true, ..Default::default() };

        self.client
            .remove_container(container_id, Some(options))
            .await
            .map_err(DockerError::Client)
    }
}
