//! Docker client wrapper

use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use tracing::debug;

use crate::container::{ContainerManager, ContainerSpec};
use crate::error::{DockerError, Result};
use crate::image::ImageManager;
use crate::service::{DockerServiceTrait, LogStream};
use crate::types::ImageBuildSpec;

/// Docker service configuration
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Socket path (None for default)
    pub socket_path: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self { socket_path: None, timeout: Duration::from_secs(120) }
    }
}

/// bollard-backed Docker service
pub struct DockerService {
    client: Docker,
}

impl DockerService {
    /// Connect to the engine and check it answers
    pub async fn new(config: DockerConfig) -> Result<Self> {
        let client = match &config.socket_path {
            Some(path) => Docker::connect_with_socket(
                path,
                config.timeout.as_secs(),
                bollard::API_DEFAULT_VERSION,
            ),
            None => Docker::connect_with_local_defaults()
                .map(|docker| docker.with_timeout(config.timeout)),
        }
        .map_err(|e| DockerError::Unavailable { reason: e.to_string() })?;

        client
            .ping()
            .await
            .map_err(|e| DockerError::Unavailable { reason: e.to_string() })?;

        debug!("Connected to Docker engine");
        Ok(Self { client })
    }

    /// Get the underlying Docker client
    pub fn client(&self) -> &Docker {
        &self.client
    }
}

#[async_trait]
impl DockerServiceTrait for DockerService {
    async fn ping(&self) -> Result<()> {
        self.client
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| DockerError::Unavailable { reason: e.to_string() })
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        ImageManager::new(&self.client).exists(image).await
    }

    async fn build_image(
        &self,
        spec: &ImageBuildSpec,
        on_output: &(dyn for<'a> Fn(&'a str) + Send + Sync),
    ) -> Result<()> {
        ImageManager::new(&self.client).build(spec, on_output).await
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        ContainerManager::new(&self.client).run(spec).await
    }

    async fn container_logs(&self, container_id: &str) -> Result<LogStream> {
        Ok(ContainerManager::new(&self.client).logs(container_id))
    }

    async fn wait_container(&self, container_id: &str) -> Result<i64> {
        ContainerManager::new(&self.client).wait(container_id).await
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        ContainerManager::new(&self.client).stop(container_id).await
    }

    async fn copy_from_container(&self, container_id: &str, path: &str) -> Result<Vec<u8>> {
        ContainerManager::new(&self.client).download(container_id, path).await
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        ContainerManager::new(&self.client).remove(container_id, true).await
    }
}
