//! Docker-related types and structures

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Image build request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageBuildSpec {
    /// Tag applied to the built image
    pub tag: String,
    /// Dockerfile to build
    pub dockerfile: PathBuf,
    /// Directory sent as build context
    pub context_dir: PathBuf,
    /// Build arguments
    pub build_args: HashMap<String, String>,
    /// Labels to apply
    pub labels: HashMap<String, String>,
    /// Target platform (e.g. `linux/arm64`)
    pub platform: Option<String>,
    /// Ignore the layer cache
    pub no_cache: bool,
    /// Always pull newer base images
    pub pull: bool,
}

impl ImageBuildSpec {
    /// Create a build spec for a Dockerfile and its context
    pub fn new(tag: impl Into<String>, dockerfile: PathBuf, context_dir: PathBuf) -> Self {
        Self {
            tag: tag.into(),
            dockerfile,
            context_dir,
            build_args: HashMap::new(),
            labels: HashMap::new(),
            platform: None,
            no_cache: false,
            pull: false,
        }
    }

    /// Add a build argument
    pub fn with_build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set the target platform
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Rebuild from scratch: no layer cache, fresh base image
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.no_cache = fresh;
        self.pull = fresh;
        self
    }
}
