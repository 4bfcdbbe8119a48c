//! Error types for the build pipeline

use std::path::{Path, PathBuf};

use dockdeb_core::FailureKind;
use dockdeb_docker::DockerError;
use thiserror::Error;

/// Build pipeline error
///
/// Every variant except [`BuildError::Cancelled`] maps onto one
/// [`FailureKind`].
#[derive(Error, Debug)]
pub enum BuildError {
    /// Resolved Dockerfile does not exist
    #[error("Dockerfile not found: {}", path.display())]
    DockerfileMissing { path: PathBuf },

    /// Container engine is unreachable
    #[error("Container engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    /// Image build failed
    #[error("Failed to build image {image}: {reason}")]
    ImageBuildFailed { image: String, reason: String, log: PathBuf },

    /// Build container could not be created or started
    #[error("Failed to start build container: {reason}")]
    ContainerStartFailed { reason: String },

    /// Source tree could not be mounted
    #[error("Failed to mount source tree: {reason}")]
    MountFailed { reason: String },

    /// In-container build exited nonzero
    #[error("Packaging toolchain exited with code {exit_code}")]
    BuildToolchainFailed { exit_code: i64, log: PathBuf },

    /// Build exceeded its time limit
    #[error("Build timed out after {duration_secs} seconds")]
    TimedOut { duration_secs: u64 },

    /// Build succeeded without producing package files
    #[error("No package files produced: {reason}")]
    NoArtifactsProduced { reason: String },

    /// Produced files could not be extracted
    #[error("Failed to collect artifacts: {reason}")]
    ArtifactCopyFailed { reason: String },

    /// Host filesystem error
    #[error("I/O error on {}: {source}", path.display())]
    HostIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Run was interrupted
    #[error("Build was cancelled")]
    Cancelled,
}

/// Result type alias for build operations
pub type Result<T> = std::result::Result<T, BuildError>;

impl BuildError {
    /// Create a host I/O error
    pub fn host_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::HostIo { path: path.into(), source }
    }

    /// Classify an engine error raised while starting a container
    pub fn container_start(err: DockerError) -> Self {
        if err.is_unavailable() {
            Self::EngineUnavailable { reason: err.to_string() }
        } else if err.is_mount_error() {
            Self::MountFailed { reason: err.to_string() }
        } else {
            Self::ContainerStartFailed { reason: err.to_string() }
        }
    }

    /// Failure category, `None` for cancellation
    pub fn kind(&self) -> Option<FailureKind> {
        let kind = match self {
            Self::DockerfileMissing { .. } => FailureKind::DockerfileMissing,
            Self::EngineUnavailable { .. } => FailureKind::EngineUnavailable,
            Self::ImageBuildFailed { .. } => FailureKind::ImageBuildFailed,
            Self::ContainerStartFailed { .. } => FailureKind::ContainerStartFailed,
            Self::MountFailed { .. } => FailureKind::MountFailed,
            Self::BuildToolchainFailed { .. } => FailureKind::BuildToolchainFailed,
            Self::TimedOut { .. } => FailureKind::TimedOut,
            Self::NoArtifactsProduced { .. } => FailureKind::NoArtifactsProduced,
            Self::ArtifactCopyFailed { .. } => FailureKind::ArtifactCopyFailed,
            Self::HostIo { .. } => FailureKind::HostIo,
            Self::Cancelled => return None,
        };
        Some(kind)
    }

    /// Whether this error aborts the whole run
    pub fn is_fatal_to_run(&self) -> bool {
        self.kind().is_some_and(|kind| kind.is_fatal_to_run())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Captured log for diagnosis, if the failing stage wrote one
    pub fn log_path(&self) -> Option<&Path> {
        match self {
            Self::ImageBuildFailed { log, .. } | Self::BuildToolchainFailed { log, .. } => {
                Some(log)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_scope() {
        let err = BuildError::DockerfileMissing { path: PathBuf::from("/d/Dockerfile.amd64.noble") };
        assert_eq!(err.kind(), Some(FailureKind::DockerfileMissing));
        assert!(err.is_fatal_to_run());

        let err = BuildError::BuildToolchainFailed { exit_code: 2, log: PathBuf::from("/o/x.log") };
        assert_eq!(err.kind(), Some(FailureKind::BuildToolchainFailed));
        assert!(!err.is_fatal_to_run());
        assert_eq!(err.log_path(), Some(Path::new("/o/x.log")));

        assert_eq!(BuildError::Cancelled.kind(), None);
        assert!(!BuildError::Cancelled.is_fatal_to_run());
    }

    #[test]
    fn test_container_start_classification() {
        let err = BuildError::container_start(DockerError::Unavailable { reason: "gone".into() });
        assert!(matches!(err, BuildError::EngineUnavailable { .. }));

        let err = BuildError::container_start(DockerError::ContainerCreate {
            reason: "invalid mount config for type \"bind\"".into(),
        });
        assert!(matches!(err, BuildError::MountFailed { .. }));

        let err = BuildError::container_start(DockerError::ContainerCreate {
            reason: "no such image".into(),
        });
        assert!(matches!(err, BuildError::ContainerStartFailed { .. }));
    }
}
