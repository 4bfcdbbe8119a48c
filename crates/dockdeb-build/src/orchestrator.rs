//! Build orchestration logic
//!
//! Drives every requested target through resolve → provision → build →
//! collect. Targets are independent: a failure is recorded in that target's
//! result and the run continues, except for run-fatal errors (missing
//! Dockerfile, unreachable engine), which cancel everything in flight.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use dockdeb_core::{
    BuildReport, BuildRequest, BuildResult, BuildTarget, FailureKind, TargetResolver, TargetState,
};
use dockdeb_docker::DockerServiceTrait;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::artifact::ArtifactCollector;
use crate::error::{BuildError, Result};
use crate::executor::{BuildExecutor, ExecutorConfig};
use crate::progress_ui::{NoOpProgressUI, ProgressEvent, ProgressUI};
use crate::provisioner::{EnvironmentProvisioner, ImageCache};
use crate::shutdown::ShutdownManager;

/// Name of the machine-readable report written to the output directory
pub const REPORT_FILE: &str = "build-report.json";

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maps targets to images and Dockerfiles
    pub resolver: TargetResolver,
    /// In-container build settings
    pub executor: ExecutorConfig,
    /// Maximum number of target pipelines running at once
    pub max_parallel: usize,
}

/// Per-target state tracking with progress reporting
struct TargetTracker<'a> {
    result: BuildResult,
    ui: &'a dyn ProgressUI,
}

impl<'a> TargetTracker<'a> {
    fn new(target: BuildTarget, ui: &'a dyn ProgressUI) -> Self {
        Self { result: BuildResult::new(target), ui }
    }

    fn target(&self) -> BuildTarget {
        self.result.target
    }

    fn advance(&mut self, state: TargetState) {
        if !self.result.state.can_advance_to(state) {
            debug!("Ignoring transition {} -> {} for {}", self.result.state, state, self.target());
            return;
        }
        self.result.state = state;
        self.ui.update(&ProgressEvent::StateChanged { target: self.target(), state });
    }

    fn finished(&self, message: Option<String>) {
        self.ui.update(&ProgressEvent::TargetFinished {
            target: self.target(),
            state: self.result.state,
            message,
        });
    }

    fn succeed(mut self, artifacts: dockdeb_core::ArtifactSet) -> BuildResult {
        self.result.succeed(artifacts);
        self.finished(None);
        self.result
    }

    fn fail(mut self, kind: FailureKind, message: String) -> BuildResult {
        self.result.fail(kind, message);
        self.finished(Some(kind.to_string()));
        self.result
    }

    fn cancel(mut self) -> BuildResult {
        self.result.cancel();
        self.finished(None);
        self.result
    }
}

/// Stages shared by every target pipeline of one run
struct RunContext<'a> {
    request: &'a BuildRequest,
    provisioner: EnvironmentProvisioner,
    executor: BuildExecutor,
    collector: ArtifactCollector,
    fatal: Mutex<Option<BuildError>>,
}

/// Main build orchestrator
pub struct BuildOrchestrator {
    docker: Arc<dyn DockerServiceTrait>,
    config: OrchestratorConfig,
    cache: ImageCache,
    shutdown: Arc<ShutdownManager>,
    ui: Arc<dyn ProgressUI>,
}

impl BuildOrchestrator {
    /// Create a new build orchestrator
    pub fn new(docker: Arc<dyn DockerServiceTrait>, config: OrchestratorConfig) -> Self {
        Self {
            docker,
            config,
            cache: ImageCache::new(),
            shutdown: Arc::new(ShutdownManager::new()),
            ui: Arc::new(NoOpProgressUI),
        }
    }

    /// Use an externally owned shutdown manager (e.g. one wired to signals)
    pub fn with_shutdown(mut self, shutdown: Arc<ShutdownManager>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_progress_ui(mut self, ui: Arc<dyn ProgressUI>) -> Self {
        self.ui = ui;
        self
    }

    pub fn shutdown_manager(&self) -> Arc<ShutdownManager> {
        Arc::clone(&self.shutdown)
    }

    /// Run every target of a request
    ///
    /// Returns the per-target report, or the run-fatal error that aborted
    /// the run. The report file is written in both cases once any target
    /// has been attempted.
    pub async fn run(&self, request: &BuildRequest) -> Result<BuildReport> {
        info!(
            "Building {} target(s) from {}",
            request.targets().len(),
            request.source_dir().display()
        );

        self.docker
            .ping()
            .await
            .map_err(|e| BuildError::EngineUnavailable { reason: e.to_string() })?;

        let log_dir = request.output_dir().join("logs");
        std::fs::create_dir_all(&log_dir).map_err(|e| BuildError::host_io(&log_dir, e))?;

        let ctx = RunContext {
            request,
            provisioner: EnvironmentProvisioner::new(
                Arc::clone(&self.docker),
                self.cache.clone(),
                log_dir.clone(),
            ),
            executor: BuildExecutor::new(
                Arc::clone(&self.docker),
                self.config.executor.clone(),
                Arc::clone(&self.shutdown),
                log_dir,
            ),
            collector: ArtifactCollector::new(request.output_dir().to_path_buf()),
            fatal: Mutex::new(None),
        };

        self.ui.update(&ProgressEvent::RunStarted { total: request.targets().len() });

        let results: Vec<BuildResult> = stream::iter(request.targets().iter().copied())
            .map(|target| self.run_target(&ctx, target))
            .buffer_unordered(self.config.max_parallel.max(1))
            .collect()
            .await;

        self.ui.finish();

        let mut report = BuildReport::new();
        for result in results {
            report.insert(result);
        }

        let report_path = request.output_dir().join(REPORT_FILE);
        if let Err(e) = write_report(&report, &report_path) {
            error!("Failed to write build report: {}", e);
        }

        for line in report.summary().lines() {
            info!("{}", line);
        }

        let fatal = ctx.fatal.lock().unwrap_or_else(PoisonError::into_inner).take();
        match fatal {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    async fn run_target(&self, ctx: &RunContext<'_>, target: BuildTarget) -> BuildResult {
        let mut tracker = TargetTracker::new(target, self.ui.as_ref());
        if self.shutdown.is_shutdown_requested() {
            return tracker.cancel();
        }
        tracker.result.start();

        tracker.advance(TargetState::Resolving);
        let env = self.config.resolver.resolve_target(&target);
        debug!("{} resolved to {} ({})", target, env.image, env.dockerfile.display());

        tracker.advance(TargetState::Provisioning);
        let provisioned = tokio::select! {
            result = ctx.provisioner.ensure(&env, ctx.request.force_rebuild()) => result,
            _ = self.shutdown.cancelled() => Err(BuildError::Cancelled),
        };
        if let Err(e) = provisioned {
            return self.settle(ctx, tracker, e);
        }

        tracker.advance(TargetState::Building);
        if let Err(e) = ctx.collector.clear(&target) {
            return self.settle(ctx, tracker, e);
        }
        tracker.result.log_path = Some(ctx.executor.log_path(&target));
        let run = match ctx.executor.run(&env, ctx.request.source_dir()).await {
            Ok(run) => run,
            Err(e) => return self.settle(ctx, tracker, e),
        };
        tracker.result.exit_code = Some(run.exit_code);

        let collected = if run.exit_code != 0 {
            Err(BuildError::BuildToolchainFailed {
                exit_code: run.exit_code,
                log: run.log_path.clone(),
            })
        } else {
            tracker.advance(TargetState::Collecting);
            ctx.collector.collect(&run.container, &target).await
        };

        if let Err(e) = run.container.release().await {
            warn!("Failed to remove container {}: {}", run.container.id(), e);
        }

        match collected {
            Ok(artifacts) => tracker.succeed(artifacts),
            Err(e) => self.settle(ctx, tracker, e),
        }
    }

    /// Record a pipeline error in the target's result
    fn settle(
        &self,
        ctx: &RunContext<'_>,
        mut tracker: TargetTracker<'_>,
        err: BuildError,
    ) -> BuildResult {
        // A failed or cancelled target leaves no packages behind
        if let Err(e) = ctx.collector.clear(&tracker.target()) {
            warn!("Failed to clear artifacts of {}: {}", tracker.target(), e);
        }

        let Some(kind) = err.kind() else {
            return tracker.cancel();
        };

        if let Some(log) = err.log_path() {
            tracker.result.log_path = Some(log.to_path_buf());
        }

        warn!("{} failed: {}", tracker.target(), err);

        let message = err.to_string();
        if err.is_fatal_to_run() {
            error!("Aborting run: {}", err);
            let mut fatal = ctx.fatal.lock().unwrap_or_else(PoisonError::into_inner);
            if fatal.is_none() {
                *fatal = Some(err);
            }
            drop(fatal);
            self.shutdown.request_shutdown(&message);
        }

        tracker.fail(kind, message)
    }
}

fn write_report(report: &BuildReport, path: &Path) -> Result<()> {
    let json = report.to_json().map_err(|e| {
        BuildError::host_io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    std::fs::write(path, json).map_err(|e| BuildError::host_io(path, e))?;
    debug!("Wrote {}", path.display());
    Ok(())
}
