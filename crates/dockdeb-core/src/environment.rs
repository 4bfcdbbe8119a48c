//! Target resolution
//!
//! Maps a [`BuildTarget`] to the container image and Dockerfile that build
//! it. Resolution is a pure naming function: it never touches the
//! filesystem, so a Dockerfile that does not exist is only discovered when
//! the image is provisioned.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::target::BuildTarget;

/// Concrete build environment for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEnvironment {
    /// Target this environment builds
    pub target: BuildTarget,
    /// Image reference (`repository:tag`)
    pub image: String,
    /// Dockerfile defining the image
    pub dockerfile: PathBuf,
    /// Directory sent to the engine as build context
    pub context_dir: PathBuf,
}

impl BuildEnvironment {
    /// OCI platform the image is built and run for
    pub fn platform(&self) -> String {
        self.target.architecture.platform()
    }
}

/// Resolver from targets to build environments
#[derive(Debug, Clone)]
pub struct TargetResolver {
    docker_dir: PathBuf,
    image_repository: String,
}

impl TargetResolver {
    /// Create a resolver rooted at the Dockerfile directory
    pub fn new(docker_dir: impl Into<PathBuf>, image_repository: impl Into<String>) -> Self {
        Self { docker_dir: docker_dir.into(), image_repository: image_repository.into() }
    }

    /// Directory holding the Dockerfiles
    pub fn docker_dir(&self) -> &Path {
        &self.docker_dir
    }

    /// Resolve raw architecture and distribution names
    pub fn resolve(
        &self,
        architecture: &str,
        distribution: &str,
    ) -> Result<BuildEnvironment, ResolveError> {
        let target = BuildTarget::parse(architecture, distribution)?;
        Ok(self.resolve_target(&target))
    }

    /// Resolve an already-validated target
    pub fn resolve_target(&self, target: &BuildTarget) -> BuildEnvironment {
        BuildEnvironment {
            target: *target,
            image: format!("{}:{}", self.image_repository, target.label()),
            dockerfile: self.docker_dir.join(format!(
                "Dockerfile.{}.{}",
                target.architecture, target.distribution
            )),
            context_dir: self.docker_dir.clone(),
        }
    }
}
