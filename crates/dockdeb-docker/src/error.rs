//! Docker-specific error types

use thiserror::Error;

/// Docker-specific error type
#[derive(Error, Debug)]
pub enum DockerError {
    /// Bollard client error
    #[error("Docker client error: {0}")]
    Client(#[from] bollard::errors::Error),

    /// Engine could not be reached
    #[error("Docker engine unavailable: {reason}")]
    Unavailable { reason: String },

    /// Image build failed
    #[error("Docker build failed: {reason}")]
    BuildFailed { reason: String },

    /// Build context could not be packed
    #[error("Failed to pack build context {path}: {reason}")]
    BuildContext { path: String, reason: String },

    /// Container creation or start failed
    #[error("Container creation failed: {reason}")]
    ContainerCreate { reason: String },

    /// Container execution failed
    #[error("Container execution failed: {reason}")]
    ExecutionFailed { reason: String },

    /// Path not present in a container
    #[error("Path {path} not found in container {container}")]
    PathNotFound { container: String, path: String },
}

/// Result type alias for Docker operations
pub type Result<T> = std::result::Result<T, DockerError>;

impl DockerError {
    /// Whether the engine itself is unreachable, as opposed to rejecting a request
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Client(err) => matches!(
                err,
                bollard::errors::Error::IOError { .. }
                    | bollard::errors::Error::SocketNotFoundError(_)
                    | bollard::errors::Error::RequestTimeoutError
            ),
            _ => false,
        }
    }

    /// Whether the engine rejected a bind mount
    pub fn is_mount_error(&self) -> bool {
        let message = match self {
            Self::Client(bollard::errors::Error::DockerResponseServerError { message, .. }) => {
                message
            }
            Self::ContainerCreate { reason } => reason,
            _ => return false,
        };
        let message = message.to_lowercase();
        message.contains("mount") || message.contains("bind source path")
    }

    /// Whether the engine answered 404
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::PathNotFound { .. } => true,
            Self::Client(bollard::errors::Error::DockerResponseServerError {
                status_code, ..
            }) => *status_code == 404,
            _ => false,
        }
    }
}
