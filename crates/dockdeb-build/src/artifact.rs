//! Build artifact collection and organization

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dockdeb_core::{ArtifactSet, BuildTarget};
use tar::Archive;
use tracing::{debug, info};

use crate::error::{BuildError, Result};
use crate::executor::{ContainerGuard, CONTAINER_OUTPUT_DIR};

/// File name suffixes kept as build artifacts
pub const ARTIFACT_EXTENSIONS: &[&str] = &["deb", "ddeb", "udeb", "changes", "buildinfo", "dsc"];

/// Whether a file name looks like a Debian build product
pub fn is_artifact_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ARTIFACT_EXTENSIONS.contains(&ext))
}

/// Build artifact information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    /// Package name
    pub package_name: String,
    /// Artifact file path
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Artifact type (e.g., "deb", "dbgsym", "changes")
    pub artifact_type: String,
    /// Architecture
    pub architecture: String,
    /// Version
    pub version: String,
}

impl BuildArtifact {
    /// Parse artifact information from a `package_version_arch.ext` file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let filename = path.file_name()?.to_str()?;
        let (stem, ext) = filename.rsplit_once('.')?;
        if !ARTIFACT_EXTENSIONS.contains(&ext) {
            return None;
        }

        let parts: Vec<&str> = stem.split('_').collect();
        let (package_name, version, architecture) = match parts.as_slice() {
            [package, version, arch, ..] => (*package, *version, *arch),
            [package, version] => (*package, *version, "source"),
            _ => return None,
        };

        let artifact_type = if package_name.ends_with("-dbgsym") || ext == "ddeb" {
            "dbgsym"
        } else {
            ext
        };

        let size = fs::metadata(path).ok()?.len();

        Some(BuildArtifact {
            package_name: package_name.to_string(),
            path: path.to_path_buf(),
            size,
            artifact_type: artifact_type.to_string(),
            architecture: architecture.to_string(),
            version: version.to_string(),
        })
    }

    /// Get the artifact filename
    pub fn filename(&self) -> Option<&str> {
        self.path.file_name()?.to_str()
    }
}

/// Copies package files out of finished build containers
pub struct ArtifactCollector {
    output_dir: PathBuf,
}

impl ArtifactCollector {
    /// Create a collector writing under `output_dir`
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// Host directory receiving a target's artifacts
    pub fn target_dir(&self, target: &BuildTarget) -> PathBuf {
        self.output_dir
            .join(target.distribution.as_str())
            .join(target.architecture.as_str())
    }

    /// Remove a target's artifact directory left by an earlier run
    pub fn clear(&self, target: &BuildTarget) -> Result<()> {
        let dir = self.target_dir(target);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("Cleared {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BuildError::host_io(dir, e)),
        }
    }

    /// Collect artifacts from a finished build container
    pub async fn collect(
        &self,
        container: &ContainerGuard,
        target: &BuildTarget,
    ) -> Result<ArtifactSet> {
        info!("Collecting build artifacts for {}", target);

        let tar_data = container
            .docker()
            .copy_from_container(container.id(), CONTAINER_OUTPUT_DIR)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    BuildError::NoArtifactsProduced {
                        reason: format!("{CONTAINER_OUTPUT_DIR} does not exist in the container"),
                    }
                } else if e.is_unavailable() {
                    BuildError::EngineUnavailable { reason: e.to_string() }
                } else {
                    BuildError::ArtifactCopyFailed { reason: e.to_string() }
                }
            })?;

        let artifacts = self.extract(&tar_data, &self.target_dir(target))?;
        if artifacts.is_empty() {
            return Err(BuildError::NoArtifactsProduced {
                reason: format!(
                    "no files matching *.{{{}}} in {CONTAINER_OUTPUT_DIR}",
                    ARTIFACT_EXTENSIONS.join(",")
                ),
            });
        }

        info!("Collected {} artifacts for {}", artifacts.len(), target);
        Ok(artifacts)
    }

    /// Extract package files from a tar archive into `dest`
    ///
    /// Files are flattened into `dest` by name; two package files sharing a
    /// name in different subdirectories are rejected.
    pub fn extract(&self, tar_data: &[u8], dest: &Path) -> Result<ArtifactSet> {
        let copy_err = |reason: String| BuildError::ArtifactCopyFailed { reason };

        let temp_dir = tempfile::tempdir()
            .map_err(|e| copy_err(format!("Failed to create temp dir: {e}")))?;

        Archive::new(io::Cursor::new(tar_data))
            .unpack(temp_dir.path())
            .map_err(|e| copy_err(format!("Failed to extract artifacts: {e}")))?;

        let mut found = Vec::new();
        let mut names = HashSet::new();
        for entry in walkdir::WalkDir::new(temp_dir.path()) {
            let entry = entry.map_err(|e| copy_err(format!("Failed to walk directory: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if is_artifact_name(name) {
                if !names.insert(name.to_string()) {
                    return Err(copy_err(format!(
                        "Duplicate artifact name {name} in {CONTAINER_OUTPUT_DIR}"
                    )));
                }
                found.push((name.to_string(), entry.path().to_path_buf()));
            }
        }

        if found.is_empty() {
            return Ok(ArtifactSet::default());
        }

        fs::create_dir_all(dest).map_err(|e| {
            copy_err(format!("Failed to create {}: {e}", dest.display()))
        })?;

        let mut paths = Vec::with_capacity(found.len());
        for (name, source) in found {
            let dest_path = dest.join(&name);
            fs::copy(&source, &dest_path)
                .map_err(|e| copy_err(format!("Failed to copy {name}: {e}")))?;
            debug!("Collected {}", dest_path.display());
            paths.push(dest_path);
        }

        Ok(ArtifactSet::new(paths))
    }
}

/// Human-readable listing of an artifact set, grouped by package
pub fn create_summary(artifacts: &ArtifactSet) -> String {
    let parsed: Vec<BuildArtifact> = artifacts.iter().filter_map(BuildArtifact::from_path).collect();

    let mut by_package: BTreeMap<&str, Vec<&BuildArtifact>> = BTreeMap::new();
    for artifact in &parsed {
        by_package.entry(artifact.package_name.as_str()).or_default().push(artifact);
    }

    let mut summary = String::new();
    for (package, artifacts) in by_package {
        summary.push_str(&format!("Package: {package}\n"));
        for artifact in artifacts {
            let size_mb = artifact.size as f64 / 1_048_576.0;
            summary.push_str(&format!(
                "  - {} ({:.2} MB) [{}]\n",
                artifact.filename().unwrap_or("unknown"),
                size_mb,
                artifact.artifact_type
            ));
        }
    }

    let total_size: u64 = parsed.iter().map(|a| a.size).sum();
    summary.push_str(&format!(
        "Total: {} artifacts, {:.2} MB\n",
        artifacts.len(),
        total_size as f64 / 1_048_576.0
    ));

    summary
}
