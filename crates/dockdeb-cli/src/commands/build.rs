//! Build command implementation

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use dockdeb_build::{
    create_progress_ui, create_summary, setup_signal_handlers, BuildOrchestrator, DpkgDebExtractor,
    ExecutorConfig, OrchestratorConfig, PrebuiltPacker, ShutdownManager, REPORT_FILE,
};
use dockdeb_core::{BuildReport, BuildRequest, BuildTarget, RunOutcome};
use dockdeb_docker::{DockerConfig, DockerService, DockerServiceTrait};
use tracing::{info, warn};

use super::{load_config, TargetSelection};

/// Flags of the `build` subcommand
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub selection: TargetSelection,
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    pub force: bool,
    pub max_parallel: Option<usize>,
    pub timeout: Option<u64>,
    pub build_version: Option<String>,
    pub progress: bool,
    pub prebuilt: bool,
}

/// Build command implementation
pub struct BuildCommand {
    config_path: Option<PathBuf>,
    options: BuildOptions,
}

impl BuildCommand {
    pub fn new(config_path: Option<PathBuf>, options: BuildOptions) -> Self {
        Self { config_path, options }
    }

    /// Run the build and return the process exit code
    pub async fn execute(&self) -> Result<i32> {
        self.execute_with(|socket_path| async move {
            let docker = DockerService::new(DockerConfig { socket_path, ..Default::default() })
                .await
                .context("Docker is not available")?;
            Ok(Arc::new(docker) as Arc<dyn DockerServiceTrait>)
        })
        .await
    }

    /// Run the build against the engine returned by `connect`
    ///
    /// `connect` is only called once the configuration, target selection and
    /// source tree have been validated.
    pub async fn execute_with<F, Fut>(&self, connect: F) -> Result<i32>
    where
        F: FnOnce(Option<String>) -> Fut,
        Fut: Future<Output = Result<Arc<dyn DockerServiceTrait>>>,
    {
        let options = &self.options;

        let mut config = load_config(self.config_path.as_deref())?;
        if let Some(output) = &options.output {
            config.output_dir = output.clone();
        }
        if let Some(max_parallel) = options.max_parallel {
            config.max_parallel = max_parallel;
        }
        if let Some(timeout) = options.timeout {
            config.build_timeout_secs = Some(timeout);
        }
        if let Some(version) = &options.build_version {
            config.build_version = Some(version.clone());
        }
        config.validate().context("Invalid configuration")?;

        let targets = options.selection.resolve()?;
        let request =
            BuildRequest::new(&options.source, targets, &config.output_dir, options.force)
                .context("Invalid build request")?;

        println!("✓ Configuration loaded and validated");
        info!("Output directory: {}", request.output_dir().display());
        info!("Parallel targets: {}", config.max_parallel);

        let docker = connect(config.docker_socket.clone()).await?;

        let shutdown = Arc::new(ShutdownManager::new());
        setup_signal_handlers(Arc::clone(&shutdown));

        let mut executor = ExecutorConfig::new(config.build_command.clone());
        executor.timeout = config.build_timeout();
        executor.build_version = config.build_version.clone();

        let orchestrator = BuildOrchestrator::new(
            docker,
            OrchestratorConfig {
                resolver: config.resolver(),
                executor,
                max_parallel: config.max_parallel,
            },
        )
        .with_shutdown(shutdown)
        .with_progress_ui(create_progress_ui(options.progress));

        let report = match orchestrator.run(&request).await {
            Ok(report) => report,
            Err(e) if e.is_cancelled() => return Ok(RunOutcome::Cancelled.exit_code()),
            Err(e) => {
                if let Some(log) = e.log_path() {
                    warn!("See {}", log.display());
                }
                return Err(e).context("Build aborted");
            }
        };

        println!("\n{}", report.summary());
        for result in report.results().filter(|r| r.is_success()) {
            println!("\n{}:\n{}", result.target, create_summary(&result.artifacts).trim_end());
        }
        println!("Report written to {}", request.output_dir().join(REPORT_FILE).display());

        let mut code = report.exit_code();
        if options.prebuilt && report.outcome() != RunOutcome::Cancelled {
            if let Err(e) = pack_prebuilt(&report, request.output_dir()).await {
                warn!("Prebuilt packing failed: {:#}", e);
                code = code.max(1);
            }
        }

        if code == 0 {
            println!("\n✨ Build completed successfully!");
        }
        Ok(code)
    }
}

/// Pack a prebuilt tarball for every succeeded target
async fn pack_prebuilt(report: &BuildReport, output_dir: &Path) -> Result<()> {
    let succeeded: Vec<BuildTarget> =
        report.results().filter(|r| r.is_success()).map(|r| r.target).collect();

    for target in succeeded {
        let artifacts_dir = output_dir
            .join(target.distribution.as_str())
            .join(target.architecture.as_str());
        let output_root = output_dir.to_path_buf();

        let tarball = tokio::task::spawn_blocking(move || {
            PrebuiltPacker::new(DpkgDebExtractor).pack(
                &artifacts_dir,
                target.architecture,
                Some(target.distribution),
                Some(&output_root),
            )
        })
        .await
        .context("Prebuilt task panicked")?
        .with_context(|| format!("Failed to pack prebuilt tarball for {target}"))?;

        println!("✓ Prebuilt {}: {}", target, tarball.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};

    use color_eyre::eyre::eyre;
    use tempfile::TempDir;

    use super::*;

    fn options(source: &Path, output: &Path, targets: &[&str]) -> BuildOptions {
        BuildOptions {
            selection: TargetSelection {
                targets: targets.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            },
            source: source.to_path_buf(),
            output: Some(output.to_path_buf()),
            force: false,
            max_parallel: None,
            timeout: None,
            build_version: None,
            progress: false,
            prebuilt: false,
        }
    }

    fn source_tree(temp: &TempDir) -> PathBuf {
        let source = temp.path().join("hello");
        fs::create_dir_all(source.join("debian")).unwrap();
        fs::write(source.join("debian").join("control"), "Source: hello\n").unwrap();
        source
    }

    async fn run_without_engine(options: BuildOptions) -> (Result<i32>, bool) {
        let contacted = AtomicBool::new(false);
        let result = BuildCommand::new(None, options)
            .execute_with(|_| async {
                contacted.store(true, Ordering::SeqCst);
                Err(eyre!("engine must not be contacted"))
            })
            .await;
        (result, contacted.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_unsupported_target_fails_before_engine_contact() {
        let temp = TempDir::new().unwrap();
        let source = source_tree(&temp);
        let output = temp.path().join("out");

        let (result, contacted) =
            run_without_engine(options(&source, &output, &["riscv64:noble"])).await;

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("riscv64"));
        assert!(!contacted);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_missing_control_file_fails_before_engine_contact() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("empty");
        fs::create_dir_all(&source).unwrap();
        let output = temp.path().join("out");

        let (result, contacted) =
            run_without_engine(options(&source, &output, &["amd64:noble"])).await;

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("control"));
        assert!(!contacted);
    }

    #[tokio::test]
    async fn test_valid_request_reaches_engine() {
        let temp = TempDir::new().unwrap();
        let source = source_tree(&temp);
        let output = temp.path().join("out");

        let (result, contacted) =
            run_without_engine(options(&source, &output, &["amd64:noble"])).await;

        assert!(result.is_err());
        assert!(contacted);
    }
}
