//! Environment provisioning
//!
//! Ensures the image for a build environment exists locally, building it
//! from the resolved Dockerfile when missing or when a rebuild is forced.
//! Provisioning of one image is serialized through a per-image lock held in
//! [`ImageCache`]; different images never contend.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use dockdeb_core::BuildEnvironment;
use dockdeb_docker::{DockerServiceTrait, ImageBuildSpec};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::error::{BuildError, Result};
use crate::log::LogSink;

/// Label set on images and containers to identify their target
pub const TARGET_LABEL: &str = "dockdeb.target";

/// Outcome of [`EnvironmentProvisioner::ensure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// Image was built by this call
    Built,
    /// Existing image was reused
    Reused,
}

/// Images known to be ready, keyed by image reference
#[derive(Clone, Default)]
pub struct ImageCache {
    slots: Arc<Mutex<HashMap<String, Arc<AsyncMutex<bool>>>>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, image: &str) -> Arc<AsyncMutex<bool>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(image.to_string()).or_default())
    }

    /// Whether the image was provisioned earlier in this process
    pub async fn is_ready(&self, image: &str) -> bool {
        *self.slot(image).lock().await
    }
}

/// Environment provisioner
pub struct EnvironmentProvisioner {
    docker: Arc<dyn DockerServiceTrait>,
    cache: ImageCache,
    log_dir: PathBuf,
}

impl EnvironmentProvisioner {
    /// Create a provisioner writing image build logs under `log_dir`
    pub fn new(docker: Arc<dyn DockerServiceTrait>, cache: ImageCache, log_dir: PathBuf) -> Self {
        Self { docker, cache, log_dir }
    }

    /// Image build log for an environment
    pub fn log_path(&self, env: &BuildEnvironment) -> PathBuf {
        self.log_dir.join(format!("image-{}.log", env.target.label()))
    }

    /// Make sure the environment's image is present
    pub async fn ensure(&self, env: &BuildEnvironment, force: bool) -> Result<Provisioned> {
        let slot = self.cache.slot(&env.image);
        let mut ready = slot.lock().await;

        if *ready && !force {
            debug!("Image {} already provisioned", env.image);
            return Ok(Provisioned::Reused);
        }

        if !force {
            let exists = self.docker.image_exists(&env.image).await.map_err(|e| {
                if e.is_unavailable() {
                    BuildError::EngineUnavailable { reason: e.to_string() }
                } else {
                    BuildError::ImageBuildFailed {
                        image: env.image.clone(),
                        reason: e.to_string(),
                        log: self.log_path(env),
                    }
                }
            })?;
            if exists {
                info!("Reusing cached image {}", env.image);
                *ready = true;
                return Ok(Provisioned::Reused);
            }
        }

        self.build(env, force).await?;
        *ready = true;
        Ok(Provisioned::Built)
    }

    async fn build(&self, env: &BuildEnvironment, force: bool) -> Result<()> {
        if !env.dockerfile.is_file() {
            return Err(BuildError::DockerfileMissing { path: env.dockerfile.clone() });
        }

        let log_path = self.log_path(env);
        let sink = LogSink::create(&log_path, env.target.to_string())?;

        info!(
            "Building image {} from {}{}",
            env.image,
            env.dockerfile.display(),
            if force { " (forced, no cache)" } else { "" }
        );

        let spec = ImageBuildSpec::new(&env.image, env.dockerfile.clone(), env.context_dir.clone())
            .with_platform(env.platform())
            .with_build_arg("BUILD_ARCH", env.target.architecture.as_str())
            .with_build_arg("BUILD_DISTRIBUTION", env.target.distribution.as_str())
            .with_label(TARGET_LABEL, env.target.label())
            .fresh(force);

        let on_output = |line: &str| sink.write_line(line);
        let result = self.docker.build_image(&spec, &on_output).await;
        sink.flush();

        result.map_err(|e| {
            if e.is_unavailable() {
                BuildError::EngineUnavailable { reason: e.to_string() }
            } else {
                BuildError::ImageBuildFailed {
                    image: env.image.clone(),
                    reason: e.to_string(),
                    log: log_path.clone(),
                }
            }
        })
    }
}
