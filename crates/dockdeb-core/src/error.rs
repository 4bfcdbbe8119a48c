//! Error types for the core library

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A requested architecture or distribution outside the supported matrix
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Architecture not in the supported enumeration
    #[error("Unsupported architecture: {value} (supported: amd64, arm64)")]
    UnsupportedArchitecture { value: String },

    /// Distribution not in the supported enumeration
    #[error("Unsupported distribution: {value} (supported: noble, questing)")]
    UnsupportedDistribution { value: String },

    /// Target selection string could not be parsed
    #[error("Invalid target selection '{value}', expected ARCH:DISTRO or 'all'")]
    InvalidSelection { value: String },
}

/// Core error type for dockdeb operations
#[derive(Error, Debug)]
pub enum Error {
    /// Unsupported target requested
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Build request failed validation
    #[error("Invalid build request: {reason}")]
    InvalidRequest { reason: String },

    /// I/O operation failed on a request path
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid request error
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest { reason: reason.into() }
    }

    /// Failure category of this error
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Resolve(_) => FailureKind::UnsupportedTarget,
            Self::InvalidRequest { .. } | Self::Io { .. } => FailureKind::InvalidRequest,
        }
    }
}

/// Failure taxonomy shared by every pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Requested target is outside the supported matrix
    UnsupportedTarget,
    /// Build request failed validation
    InvalidRequest,
    /// Resolved Dockerfile does not exist
    DockerfileMissing,
    /// Container engine is unreachable
    EngineUnavailable,
    /// Image build returned an error
    ImageBuildFailed,
    /// Build container could not be created or started
    ContainerStartFailed,
    /// Source tree could not be mounted into the container
    MountFailed,
    /// Packaging toolchain exited nonzero
    BuildToolchainFailed,
    /// Build exceeded the configured time limit
    TimedOut,
    /// Build succeeded but produced no package files
    NoArtifactsProduced,
    /// Produced files could not be extracted to the output directory
    ArtifactCopyFailed,
    /// Host filesystem error outside artifact extraction (log files, reports)
    HostIo,
}

impl FailureKind {
    /// Whether this failure aborts the whole run instead of one target
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedTarget
                | Self::InvalidRequest
                | Self::DockerfileMissing
                | Self::EngineUnavailable
        )
    }

    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedTarget => "unsupported_target",
            Self::InvalidRequest => "invalid_request",
            Self::DockerfileMissing => "dockerfile_missing",
            Self::EngineUnavailable => "engine_unavailable",
            Self::ImageBuildFailed => "image_build_failed",
            Self::ContainerStartFailed => "container_start_failed",
            Self::MountFailed => "mount_failed",
            Self::BuildToolchainFailed => "build_toolchain_failed",
            Self::TimedOut => "timed_out",
            Self::NoArtifactsProduced => "no_artifacts_produced",
            Self::ArtifactCopyFailed => "artifact_copy_failed",
            Self::HostIo => "host_io",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(FailureKind::EngineUnavailable.is_fatal_to_run());
        assert!(FailureKind::DockerfileMissing.is_fatal_to_run());
        assert!(!FailureKind::BuildToolchainFailed.is_fatal_to_run());
        assert!(!FailureKind::NoArtifactsProduced.is_fatal_to_run());
        assert!(!FailureKind::ContainerStartFailed.is_fatal_to_run());
    }

    #[test]
    fn test_error_kind() {
        let err = Error::from(ResolveError::UnsupportedArchitecture { value: "riscv64".into() });
        assert_eq!(err.kind(), FailureKind::UnsupportedTarget);
        assert!(err.to_string().contains("riscv64"));
    }
}
