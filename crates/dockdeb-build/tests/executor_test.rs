mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{image, MockDockerService, Workspace};
use dockdeb_build::{BuildError, BuildExecutor, ContainerGuard, ExecutorConfig, ShutdownManager};
use dockdeb_core::BuildEnvironment;

fn executor(ws: &Workspace, mock: &MockDockerService, config: ExecutorConfig) -> BuildExecutor {
    BuildExecutor::new(
        Arc::new(mock.clone()),
        config,
        Arc::new(ShutdownManager::new()),
        ws.log_dir(),
    )
}

fn environment(ws: &Workspace, target: &str) -> BuildEnvironment {
    ws.resolver().resolve_target(&target.parse().unwrap())
}

#[test]
fn test_container_spec_layout() {
    let ws = Workspace::new();
    let mock = MockDockerService::new();
    let executor = executor(&ws, &mock, ExecutorConfig::new("dpkg-buildpackage -b"));
    let env = environment(&ws, "arm64:questing");

    let spec = executor.container_spec(&env, &ws.source);

    assert_eq!(spec.image, image("arm64:questing"));
    assert_eq!(spec.command, vec!["sh", "-c", "dpkg-buildpackage -b"]);
    assert_eq!(spec.platform.as_deref(), Some("linux/arm64"));
    assert_eq!(spec.working_dir.as_deref(), Some("/build"));
    assert!(spec.name.as_deref().unwrap().starts_with("dockdeb-questing-arm64-"));

    let env_var = |key: &str| spec.environment.get(key).map(String::as_str);
    assert_eq!(env_var("BUILD_ARCH"), Some("arm64"));
    assert_eq!(env_var("BUILD_DISTRIBUTION"), Some("questing"));
    assert_eq!(env_var("SOURCE_DIR"), Some("/source"));
    assert_eq!(env_var("OUTPUT_DIR"), Some("/build/output"));
    assert_eq!(env_var("BUILD_VERSION"), None);

    assert_eq!(spec.volumes.len(), 1);
    assert_eq!(spec.volumes[0].host_path, ws.source);
    assert_eq!(spec.volumes[0].container_path, "/source");
    assert!(spec.volumes[0].read_only);

    assert_eq!(spec.labels.get("dockdeb.target").map(String::as_str), Some("questing-arm64"));
}

#[test]
fn test_container_spec_version_and_overrides() {
    let ws = Workspace::new();
    let mock = MockDockerService::new();
    let mut config = ExecutorConfig::new("true");
    config.build_version = Some("1.2.3-1".to_string());
    config.environment.insert("DEB_BUILD_OPTIONS".to_string(), "parallel=4".to_string());
    let executor = executor(&ws, &mock, config);

    let spec = executor.container_spec(&environment(&ws, "amd64:noble"), &ws.source);

    assert_eq!(spec.environment.get("BUILD_VERSION").map(String::as_str), Some("1.2.3-1"));
    assert_eq!(spec.environment.get("DEB_BUILD_OPTIONS").map(String::as_str), Some("parallel=4"));
}

#[tokio::test]
async fn test_run_captures_log_and_keeps_container() {
    let ws = Workspace::new();
    let mock = MockDockerService::new();
    mock.set_log_lines(&["dh binary", "dpkg-deb: building package 'hello'"]);
    let executor = executor(&ws, &mock, ExecutorConfig::new("dpkg-buildpackage -b"));
    let env = environment(&ws, "amd64:noble");

    let run = executor.run(&env, &ws.source).await.unwrap();

    assert_eq!(run.exit_code, 0);
    assert_eq!(run.log_path, ws.log_dir().join("noble-amd64.log"));
    let log = std::fs::read_to_string(&run.log_path).unwrap();
    assert_eq!(log, "dh binary\ndpkg-deb: building package 'hello'\n");

    // Collection still needs the container
    assert!(!run.container.is_released());
    assert!(mock.removed().is_empty());

    run.container.release().await.unwrap();
    assert_eq!(mock.removed(), vec![run.container.id().to_string()]);
}

#[tokio::test]
async fn test_run_reports_nonzero_exit_code() {
    let ws = Workspace::new();
    let mock = MockDockerService::new();
    mock.set_exit_code(&image("amd64:noble"), 2);
    let executor = executor(&ws, &mock, ExecutorConfig::new("false"));

    let run = executor.run(&environment(&ws, "amd64:noble"), &ws.source).await.unwrap();
    assert_eq!(run.exit_code, 2);
}

#[tokio::test]
async fn test_run_refuses_after_shutdown() {
    let ws = Workspace::new();
    let mock = MockDockerService::new();
    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.request_shutdown("test");
    let executor = BuildExecutor::new(
        Arc::new(mock.clone()),
        ExecutorConfig::new("true"),
        shutdown,
        ws.log_dir(),
    );

    let err = executor.run(&environment(&ws, "amd64:noble"), &ws.source).await.err().unwrap();
    assert!(err.is_cancelled());
    assert!(mock.created().is_empty());
}

#[tokio::test]
async fn test_start_failure_leaves_nothing_behind() {
    let ws = Workspace::new();
    let mock = MockDockerService::new();
    mock.fail_container_start("no such image");
    let executor = executor(&ws, &mock, ExecutorConfig::new("true"));

    let err = executor.run(&environment(&ws, "amd64:noble"), &ws.source).await.err().unwrap();
    assert!(matches!(err, BuildError::ContainerStartFailed { .. }));
    assert!(mock.removed().is_empty());
}

#[tokio::test]
async fn test_guard_release_is_idempotent() {
    let mock = MockDockerService::new();
    let guard = ContainerGuard::new(Arc::new(mock.clone()), "container-7".to_string());

    guard.release().await.unwrap();
    guard.release().await.unwrap();
    drop(guard);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(mock.removed(), vec!["container-7".to_string()]);
}

#[tokio::test]
async fn test_dropped_guard_removes_container() {
    let mock = MockDockerService::new();
    let guard = ContainerGuard::new(Arc::new(mock.clone()), "container-9".to_string());

    drop(guard);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(mock.removed(), vec!["container-9".to_string()]);
}
