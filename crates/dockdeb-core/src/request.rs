//! Build request validation

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::target::BuildTarget;

/// A validated request to build one or more targets from a source tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    source_dir: PathBuf,
    targets: Vec<BuildTarget>,
    output_dir: PathBuf,
    force_rebuild: bool,
}

impl BuildRequest {
    /// Validate and create a build request
    ///
    /// The source tree must contain `debian/control`. Duplicate targets are
    /// collapsed, keeping first-seen order. The output directory is created
    /// when missing.
    pub fn new(
        source_dir: impl Into<PathBuf>,
        targets: Vec<BuildTarget>,
        output_dir: impl Into<PathBuf>,
        force_rebuild: bool,
    ) -> Result<Self> {
        let source_dir = source_dir.into();
        let output_dir = output_dir.into();

        if targets.is_empty() {
            return Err(Error::invalid_request("no build targets requested"));
        }

        let mut seen = HashSet::new();
        let targets: Vec<BuildTarget> = targets.into_iter().filter(|t| seen.insert(*t)).collect();

        if !source_dir.is_dir() {
            return Err(Error::invalid_request(format!(
                "source directory does not exist: {}",
                source_dir.display()
            )));
        }

        let control = source_dir.join("debian").join("control");
        if !control.is_file() {
            return Err(Error::invalid_request(format!(
                "source tree has no Debian packaging metadata: {} is missing",
                control.display()
            )));
        }

        std::fs::create_dir_all(&output_dir)
            .map_err(|source| Error::Io { path: output_dir.clone(), source })?;

        let source_dir = source_dir
            .canonicalize()
            .map_err(|source| Error::Io { path: source_dir.clone(), source })?;

        Ok(Self { source_dir, targets, output_dir, force_rebuild })
    }

    /// Source tree to package
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Requested targets, deduplicated
    pub fn targets(&self) -> &[BuildTarget] {
        &self.targets
    }

    /// Host directory receiving artifacts, logs and the report
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Whether images must be rebuilt even if cached
    pub fn force_rebuild(&self) -> bool {
        self.force_rebuild
    }
}
