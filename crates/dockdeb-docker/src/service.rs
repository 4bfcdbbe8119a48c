//! Docker service trait

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::container::ContainerSpec;
use crate::error::Result;
use crate::types::ImageBuildSpec;

/// Log output from container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    /// Standard output chunk
    Stdout(String),
    /// Standard error chunk
    Stderr(String),
}

impl LogOutput {
    /// Text of the chunk regardless of stream
    pub fn text(&self) -> &str {
        match self {
            Self::Stdout(text) | Self::Stderr(text) => text,
        }
    }
}

/// Followed container log stream
pub type LogStream = Pin<Box<dyn Stream<Item = Result<LogOutput>> + Send>>;

/// Container engine capabilities used by the build pipeline
#[async_trait]
pub trait DockerServiceTrait: Send + Sync {
    /// Check the engine is reachable
    async fn ping(&self) -> Result<()>;

    /// Check if an image exists locally
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Build an image, passing each output line to `on_output`
    async fn build_image(
        &self,
        spec: &ImageBuildSpec,
        on_output: &(dyn for<'a> Fn(&'a str) + Send + Sync),
    ) -> Result<()>;

    /// Create and start a container, returning its ID
    async fn run_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Follow container logs until it exits
    async fn container_logs(&self, container_id: &str) -> Result<LogStream>;

    /// Wait for container to finish and return its exit code
    async fn wait_container(&self, container_id: &str) -> Result<i64>;

    /// Stop a running container
    async fn stop_container(&self, container_id: &str) -> Result<()>;

    /// Copy a path out of a container as a tar archive
    async fn copy_from_container(&self, container_id: &str, path: &str) -> Result<Vec<u8>>;

    /// Remove a container, forcing if still running
    async fn remove_container(&self, container_id: &str) -> Result<()>;
}
