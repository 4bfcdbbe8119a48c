//! Shared test fixtures: a scripted Docker double and scratch workspaces

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dockdeb_build::{BuildOrchestrator, ExecutorConfig, OrchestratorConfig};
use dockdeb_core::{BuildRequest, BuildTarget, TargetResolver};
use dockdeb_docker::{
    ContainerSpec, DockerError, DockerServiceTrait, ImageBuildSpec, LogOutput, LogStream,
};
use tempfile::TempDir;

pub const REPOSITORY: &str = "dockdeb-test";

#[derive(Default)]
struct MockState {
    operations: Vec<String>,
    images: HashSet<String>,
    failing_builds: HashSet<String>,
    exit_codes: HashMap<String, i64>,
    artifacts: HashMap<String, Vec<(String, Vec<u8>)>>,
    run_failure: Option<String>,
    unavailable: bool,
    wait_delay: Option<Duration>,
    build_delay: Option<Duration>,
    log_lines: Vec<String>,
    containers: HashMap<String, String>,
    next_id: usize,
    removed: Vec<String>,
    stopped: Vec<String>,
    build_specs: Vec<ImageBuildSpec>,
    run_specs: Vec<ContainerSpec>,
}

/// Mock Docker service that simulates the engine without requiring Docker
#[derive(Clone, Default)]
pub struct MockDockerService {
    state: Arc<Mutex<MockState>>,
}

impl MockDockerService {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.set_log_lines(&["dpkg-buildpackage: info: source package hello"]);
        mock
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    fn record(&self, operation: String) {
        self.with_state(|s| s.operations.push(operation));
    }

    fn check_available(&self) -> dockdeb_docker::Result<()> {
        if self.with_state(|s| s.unavailable) {
            Err(DockerError::Unavailable { reason: "mock engine is down".to_string() })
        } else {
            Ok(())
        }
    }

    pub fn add_image(&self, image: &str) {
        self.with_state(|s| s.images.insert(image.to_string()));
    }

    pub fn fail_image_build(&self, image: &str) {
        self.with_state(|s| s.failing_builds.insert(image.to_string()));
    }

    pub fn set_exit_code(&self, image: &str, code: i64) {
        self.with_state(|s| s.exit_codes.insert(image.to_string(), code));
    }

    /// Files served from `/build/output` of containers running `image`
    pub fn set_artifacts(&self, image: &str, files: &[&str]) {
        let files = files.iter().map(|f| (f.to_string(), f.as_bytes().to_vec())).collect();
        self.with_state(|s| s.artifacts.insert(image.to_string(), files));
    }

    pub fn fail_container_start(&self, reason: &str) {
        self.with_state(|s| s.run_failure = Some(reason.to_string()));
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.with_state(|s| s.unavailable = unavailable);
    }

    pub fn set_wait_delay(&self, delay: Duration) {
        self.with_state(|s| s.wait_delay = Some(delay));
    }

    pub fn set_build_delay(&self, delay: Duration) {
        self.with_state(|s| s.build_delay = Some(delay));
    }

    pub fn set_log_lines(&self, lines: &[&str]) {
        self.with_state(|s| s.log_lines = lines.iter().map(|l| l.to_string()).collect());
    }

    pub fn operations(&self) -> Vec<String> {
        self.with_state(|s| s.operations.clone())
    }

    pub fn build_count(&self) -> usize {
        self.with_state(|s| s.build_specs.len())
    }

    pub fn build_specs(&self) -> Vec<ImageBuildSpec> {
        self.with_state(|s| s.build_specs.clone())
    }

    pub fn run_specs(&self) -> Vec<ContainerSpec> {
        self.with_state(|s| s.run_specs.clone())
    }

    pub fn created(&self) -> Vec<String> {
        self.with_state(|s| {
            let mut ids: Vec<String> = s.containers.keys().cloned().collect();
            ids.sort();
            ids
        })
    }

    pub fn removed(&self) -> Vec<String> {
        self.with_state(|s| s.removed.clone())
    }

    pub fn stopped(&self) -> Vec<String> {
        self.with_state(|s| s.stopped.clone())
    }

    fn image_of(&self, container_id: &str) -> String {
        self.with_state(|s| s.containers.get(container_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl DockerServiceTrait for MockDockerService {
    async fn ping(&self) -> dockdeb_docker::Result<()> {
        self.record("ping".to_string());
        self.check_available()
    }

    async fn image_exists(&self, image: &str) -> dockdeb_docker::Result<bool> {
        self.record(format!("image_exists {image}"));
        self.check_available()?;
        Ok(self.with_state(|s| s.images.contains(image)))
    }

    async fn build_image(
        &self,
        spec: &ImageBuildSpec,
        on_output: &(dyn for<'a> Fn(&'a str) + Send + Sync),
    ) -> dockdeb_docker::Result<()> {
        self.record(format!("build_image {}", spec.tag));
        self.check_available()?;
        self.with_state(|s| s.build_specs.push(spec.clone()));

        on_output(&format!("Step 1/2 : FROM ubuntu ({})", spec.tag));
        if let Some(delay) = self.with_state(|s| s.build_delay) {
            tokio::time::sleep(delay).await;
        }

        if self.with_state(|s| s.failing_builds.contains(&spec.tag)) {
            on_output("E: Unable to locate package build-essential");
            return Err(DockerError::BuildFailed {
                reason: "The command '/bin/sh -c apt-get install' returned a non-zero code: 100"
                    .to_string(),
            });
        }

        on_output("Successfully built");
        self.add_image(&spec.tag);
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> dockdeb_docker::Result<String> {
        self.record(format!("run_container {}", spec.image));
        self.check_available()?;
        if let Some(reason) = self.with_state(|s| s.run_failure.clone()) {
            return Err(DockerError::ContainerCreate { reason });
        }

        Ok(self.with_state(|s| {
            s.run_specs.push(spec.clone());
            s.next_id += 1;
            let id = format!("container-{}", s.next_id);
            s.containers.insert(id.clone(), spec.image.clone());
            id
        }))
    }

    async fn container_logs(&self, container_id: &str) -> dockdeb_docker::Result<LogStream> {
        self.record(format!("container_logs {container_id}"));
        let lines = self.with_state(|s| s.log_lines.clone());
        Ok(Box::pin(futures::stream::iter(
            lines.into_iter().map(|line| Ok(LogOutput::Stdout(format!("{line}\n")))),
        )))
    }

    async fn wait_container(&self, container_id: &str) -> dockdeb_docker::Result<i64> {
        self.record(format!("wait_container {container_id}"));
        if let Some(delay) = self.with_state(|s| s.wait_delay) {
            tokio::time::sleep(delay).await;
        }
        let image = self.image_of(container_id);
        Ok(self.with_state(|s| s.exit_codes.get(&image).copied().unwrap_or(0)))
    }

    async fn stop_container(&self, container_id: &str) -> dockdeb_docker::Result<()> {
        self.record(format!("stop_container {container_id}"));
        self.with_state(|s| s.stopped.push(container_id.to_string()));
        Ok(())
    }

    async fn copy_from_container(
        &self,
        container_id: &str,
        path: &str,
    ) -> dockdeb_docker::Result<Vec<u8>> {
        self.record(format!("copy_from_container {container_id} {path}"));
        let image = self.image_of(container_id);
        let files = self.with_state(|s| s.artifacts.get(&image).cloned().unwrap_or_default());

        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("output/{name}"), content.as_slice())
                .map_err(|e| DockerError::ExecutionFailed { reason: e.to_string() })?;
        }
        builder.into_inner().map_err(|e| DockerError::ExecutionFailed { reason: e.to_string() })
    }

    async fn remove_container(&self, container_id: &str) -> dockdeb_docker::Result<()> {
        self.record(format!("remove_container {container_id}"));
        self.with_state(|s| s.removed.push(container_id.to_string()));
        Ok(())
    }
}

/// Scratch source tree, Dockerfile directory and output directory
pub struct Workspace {
    pub temp: TempDir,
    pub source: PathBuf,
    pub docker_dir: PathBuf,
    pub output: PathBuf,
}

impl Workspace {
    /// Source tree with packaging metadata and a Dockerfile for every target
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("hello");
        std::fs::create_dir_all(source.join("debian")).unwrap();
        std::fs::write(source.join("debian/control"), "Source: hello\n").unwrap();

        let docker_dir = temp.path().join("docker");
        std::fs::create_dir_all(&docker_dir).unwrap();
        for target in BuildTarget::all() {
            std::fs::write(
                docker_dir.join(format!(
                    "Dockerfile.{}.{}",
                    target.architecture, target.distribution
                )),
                format!("FROM ubuntu:{}\n", target.distribution),
            )
            .unwrap();
        }

        let output = temp.path().join("output");
        Self { temp, source, docker_dir, output }
    }

    pub fn resolver(&self) -> TargetResolver {
        TargetResolver::new(&self.docker_dir, REPOSITORY)
    }

    pub fn request(&self, targets: &[&str], force: bool) -> BuildRequest {
        let targets = targets.iter().map(|t| t.parse().unwrap()).collect();
        BuildRequest::new(&self.source, targets, &self.output, force).unwrap()
    }

    pub fn orchestrator(&self, mock: &MockDockerService, max_parallel: usize) -> BuildOrchestrator {
        self.orchestrator_with(mock, ExecutorConfig::new("dpkg-buildpackage -us -uc -b"), max_parallel)
    }

    pub fn orchestrator_with(
        &self,
        mock: &MockDockerService,
        executor: ExecutorConfig,
        max_parallel: usize,
    ) -> BuildOrchestrator {
        let config = OrchestratorConfig { resolver: self.resolver(), executor, max_parallel };
        BuildOrchestrator::new(Arc::new(mock.clone()), config)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.output.join("logs")
    }
}

/// Image reference for `ARCH:DISTRO`
pub fn image(target: &str) -> String {
    let target: BuildTarget = target.parse().unwrap();
    format!("{REPOSITORY}:{}", target.label())
}

/// File names in a directory, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
