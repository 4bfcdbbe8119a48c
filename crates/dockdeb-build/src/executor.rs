//! Build executor for running builds in containers

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dockdeb_core::{BuildEnvironment, BuildTarget};
use dockdeb_docker::{
    check_emulation, ContainerSpec, DockerError, DockerServiceTrait, VolumeMount,
};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{BuildError, Result};
use crate::log::LogSink;
use crate::provisioner::TARGET_LABEL;
use crate::shutdown::ShutdownManager;

/// Source tree mount point inside the build container
pub const CONTAINER_SOURCE_DIR: &str = "/source";

/// Directory the build command writes packages to
pub const CONTAINER_OUTPUT_DIR: &str = "/build/output";

/// Time allowed for the log stream to drain after the container exits
const LOG_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Build executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Shell script run with `sh -c`
    pub build_command: String,
    /// Build time limit
    pub timeout: Option<Duration>,
    /// Exported as `BUILD_VERSION` when set
    pub build_version: Option<String>,
    /// Extra environment, overriding the defaults
    pub environment: BTreeMap<String, String>,
}

impl ExecutorConfig {
    pub fn new(build_command: impl Into<String>) -> Self {
        Self {
            build_command: build_command.into(),
            timeout: None,
            build_version: None,
            environment: BTreeMap::new(),
        }
    }
}

/// Owns a build container and removes it exactly once
///
/// [`release`](Self::release) removes the container; later calls are no-ops.
/// A guard dropped without release schedules removal on the current runtime.
pub struct ContainerGuard {
    docker: Arc<dyn DockerServiceTrait>,
    id: String,
    released: AtomicBool,
}

impl ContainerGuard {
    pub fn new(docker: Arc<dyn DockerServiceTrait>, id: String) -> Self {
        Self { docker, id, released: AtomicBool::new(false) }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Engine the container runs on
    pub fn docker(&self) -> &Arc<dyn DockerServiceTrait> {
        &self.docker
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Remove the container
    pub async fn release(&self) -> std::result::Result<(), DockerError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("Removing container {}", self.id);
        self.docker.remove_container(&self.id).await
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let docker = Arc::clone(&self.docker);
                let id = std::mem::take(&mut self.id);
                handle.spawn(async move {
                    if let Err(e) = docker.remove_container(&id).await {
                        warn!("Failed to remove container {}: {}", id, e);
                    }
                });
            }
            Err(_) => warn!("Container {} leaked: no runtime to remove it", self.id),
        }
    }
}

/// A finished build container awaiting collection
pub struct BuildRun {
    /// Exited container, still present for artifact collection
    pub container: ContainerGuard,
    /// Exit code of the build command
    pub exit_code: i64,
    /// Captured build log
    pub log_path: PathBuf,
}

enum WaitOutcome {
    Exited(i64),
    Failed(DockerError),
    TimedOut(Duration),
    Cancelled,
}

/// Runs the packaging command for one target in an ephemeral container
pub struct BuildExecutor {
    docker: Arc<dyn DockerServiceTrait>,
    config: ExecutorConfig,
    shutdown: Arc<ShutdownManager>,
    log_dir: PathBuf,
}

impl BuildExecutor {
    pub fn new(
        docker: Arc<dyn DockerServiceTrait>,
        config: ExecutorConfig,
        shutdown: Arc<ShutdownManager>,
        log_dir: PathBuf,
    ) -> Self {
        Self { docker, config, shutdown, log_dir }
    }

    /// Build log for a target
    pub fn log_path(&self, target: &BuildTarget) -> PathBuf {
        self.log_dir.join(format!("{}.log", target.label()))
    }

    /// Container specification for a build
    pub fn container_spec(&self, env: &BuildEnvironment, source_dir: &Path) -> ContainerSpec {
        let target = env.target;
        let mut spec = ContainerSpec::new(&env.image)
            .with_name(format!(
                "dockdeb-{}-{}-{}",
                target.label(),
                std::process::id(),
                chrono::Utc::now().timestamp_millis()
            ))
            .with_command(vec![
                "sh".to_string(),
                "-c".to_string(),
                self.config.build_command.clone(),
            ])
            .with_env("BUILD_ARCH", target.architecture.as_str())
            .with_env("BUILD_DISTRIBUTION", target.distribution.as_str())
            .with_env("SOURCE_DIR", CONTAINER_SOURCE_DIR)
            .with_env("OUTPUT_DIR", CONTAINER_OUTPUT_DIR)
            .with_env("DEB_BUILD_OPTIONS", "nocheck")
            .with_volume(VolumeMount {
                host_path: source_dir.to_path_buf(),
                container_path: CONTAINER_SOURCE_DIR.to_string(),
                read_only: true,
            })
            .with_working_dir("/build")
            .with_platform(env.platform())
            .with_label(TARGET_LABEL, target.label());

        if let Some(version) = &self.config.build_version {
            spec = spec.with_env("BUILD_VERSION", version);
        }
        for (key, value) in &self.config.environment {
            spec = spec.with_env(key, value);
        }

        spec
    }

    /// Run the build and wait for it to exit
    ///
    /// On success the container is handed back unreleased so artifacts can
    /// be collected from it. On every error path it has been released.
    pub async fn run(&self, env: &BuildEnvironment, source_dir: &Path) -> Result<BuildRun> {
        let target = env.target;

        let emulation = check_emulation(target.architecture);
        if let Some(warning) = emulation.warning(target.architecture) {
            warn!("{}", warning);
        }

        if self.shutdown.is_shutdown_requested() {
            return Err(BuildError::Cancelled);
        }

        let log_path = self.log_path(&target);
        let sink = Arc::new(LogSink::create(&log_path, target.to_string())?);

        let spec = self.container_spec(env, source_dir);
        info!("Starting build container for {} from {}", target, env.image);
        let id = self.docker.run_container(&spec).await.map_err(BuildError::container_start)?;
        let container = ContainerGuard::new(Arc::clone(&self.docker), id);

        let pump = match self.docker.container_logs(container.id()).await {
            Ok(mut stream) => {
                let sink = Arc::clone(&sink);
                Some(tokio::spawn(async move {
                    while let Some(chunk) = stream.next().await {
                        match chunk {
                            Ok(output) => sink.write_text(output.text()),
                            Err(e) => {
                                warn!("Error reading logs: {}", e);
                                break;
                            }
                        }
                    }
                }))
            }
            Err(e) => {
                warn!("Could not follow logs for {}: {}", target, e);
                None
            }
        };

        let outcome = self.wait(container.id()).await;

        if let Some(mut pump) = pump {
            match outcome {
                WaitOutcome::Exited(_) => {
                    if tokio::time::timeout(LOG_DRAIN_TIMEOUT, &mut pump).await.is_err() {
                        pump.abort();
                    }
                }
                _ => pump.abort(),
            }
        }
        sink.flush();

        let failure = match outcome {
            WaitOutcome::Exited(exit_code) => {
                info!("Build container for {} exited with code {}", target, exit_code);
                return Ok(BuildRun { container, exit_code, log_path });
            }
            WaitOutcome::Failed(e) => {
                if e.is_unavailable() {
                    BuildError::EngineUnavailable { reason: e.to_string() }
                } else {
                    BuildError::ContainerStartFailed { reason: e.to_string() }
                }
            }
            WaitOutcome::TimedOut(limit) => {
                warn!("Build for {} timed out after {:?}", target, limit);
                self.stop(&container).await;
                BuildError::TimedOut { duration_secs: limit.as_secs() }
            }
            WaitOutcome::Cancelled => {
                info!("Build for {} cancelled", target);
                self.stop(&container).await;
                BuildError::Cancelled
            }
        };

        if let Err(e) = container.release().await {
            warn!("Failed to remove container {}: {}", container.id(), e);
        }
        Err(failure)
    }

    async fn wait(&self, container_id: &str) -> WaitOutcome {
        let wait = async {
            match self.config.timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, self.docker.wait_container(container_id))
                        .await
                    {
                        Ok(result) => result.map_err(Some),
                        Err(_) => Err(None),
                    }
                }
                None => self.docker.wait_container(container_id).await.map_err(Some),
            }
        };

        tokio::select! {
            result = wait => match result {
                Ok(code) => WaitOutcome::Exited(code),
                Err(Some(e)) => WaitOutcome::Failed(e),
                Err(None) => WaitOutcome::TimedOut(self.config.timeout.unwrap_or_default()),
            },
            _ = self.shutdown.cancelled() => WaitOutcome::Cancelled,
        }
    }

    async fn stop(&self, container: &ContainerGuard) {
        if let Err(e) = self.docker.stop_container(container.id()).await {
            warn!("Failed to stop container {}: {}", container.id(), e);
        }
    }
}
