//! Docker image management

use std::collections::HashMap;
use std::path::Path;

use bollard::image::{BuildImageOptions, ListImagesOptions};
use futures::StreamExt;
use tar::Builder;
use tracing::{debug, info};

use crate::error::{DockerError, Result};
use crate::types::ImageBuildSpec;

/// Name the Dockerfile is stored under when it lives outside the context
const DETACHED_DOCKERFILE: &str = ".dockdeb.Dockerfile";

/// Docker image manager
pub struct ImageManager<'a> {
    client: &'a bollard::Docker,
}

impl<'a> ImageManager<'a> {
    /// Create a new image manager
    pub fn new(client: &'a bollard::Docker) -> Self {
        Self { client }
    }

    /// Check if image exists locally
    pub async fn exists(&self, image: &str) -> Result<bool> {
        let filters = HashMap::from([("reference", vec![image])]);
        let options = ListImagesOptions { all: false, filters, ..Default::default() };

        let images = self
            .client
            .list_images(Some(options))
            .await
            .map_err(DockerError::Client)?;

        Ok(!images.is_empty())
    }

    /// Build image from a Dockerfile and context directory
    pub async fn build(
        &self,
        spec: &ImageBuildSpec,
        on_output: &(dyn Fn(&str) + Send + Sync),
    ) -> Result<()> {
        info!("Building Docker image: {}", spec.tag);

        let (tar_data, dockerfile) = pack_build_context(&spec.dockerfile, &spec.context_dir)?;

        let buildargs: HashMap<&str, &str> = spec
            .build_args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let labels: HashMap<&str, &str> = spec
            .labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let options = BuildImageOptions {
            t: spec.tag.as_str(),
            dockerfile: dockerfile.as_str(),
            buildargs,
            labels,
            platform: spec.platform.as_deref().unwrap_or_default(),
            nocache: spec.no_cache,
            pull: spec.pull,
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self.client.build_image(options, None, Some(tar_data.into()));

        while let Some(info) = stream.next().await {
            match info {
                Ok(output) => {
                    if let Some(text) = output.stream {
                        for line in text.lines().filter(|l| !l.trim().is_empty()) {
                            on_output(line);
                        }
                    }
                    if let Some(status) = output.status {
                        on_output(&status);
                    }
                    if let Some(error) = output.error {
                        on_output(&error);
                        return Err(DockerError::BuildFailed { reason: error });
                    }
                }
                Err(e @ bollard::errors::Error::IOError { .. }) => {
                    return Err(DockerError::Client(e));
                }
                Err(e) => {
                    return Err(DockerError::BuildFailed { reason: e.to_string() });
                }
            }
        }

        info!("Successfully built image: {}", spec.tag);
        Ok(())
    }
}

/// Pack a build context directory as an uncompressed tar archive
///
/// Returns the archive and the Dockerfile's path inside it. A Dockerfile
/// outside the context directory is appended under a reserved name.
pub fn pack_build_context(dockerfile: &Path, context_dir: &Path) -> Result<(Vec<u8>, String)> {
    let context_err = |reason: String| DockerError::BuildContext {
        path: context_dir.display().to_string(),
        reason,
    };

    let mut tar_data = Vec::new();
    let dockerfile_name;
    {
        let mut builder = Builder::new(&mut tar_data);
        builder.follow_symlinks(true);

        builder
            .append_dir_all(".", context_dir)
            .map_err(|e| context_err(format!("Failed to archive context: {e}")))?;

        dockerfile_name = match dockerfile.strip_prefix(context_dir) {
            Ok(relative) => relative.to_string_lossy().replace('\\', "/"),
            Err(_) => {
                let mut file = std::fs::File::open(dockerfile)
                    .map_err(|e| context_err(format!("Failed to open Dockerfile: {e}")))?;
                builder
                    .append_file(DETACHED_DOCKERFILE, &mut file)
                    .map_err(|e| context_err(format!("Failed to add Dockerfile to tar: {e}")))?;
                DETACHED_DOCKERFILE.to_string()
            }
        };

        builder
            .finish()
            .map_err(|e| context_err(format!("Failed to finish tar archive: {e}")))?;
    }

    debug!("Packed build context: {} bytes", tar_data.len());
    Ok((tar_data, dockerfile_name))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tempfile::TempDir;

    use super::*;

    fn entry_names(tar_data: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(Cursor::new(tar_data));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_pack_context_with_inner_dockerfile() {
        let temp = TempDir::new().unwrap();
        let dockerfile = temp.path().join("Dockerfile.amd64.noble");
        std::fs::write(&dockerfile, "FROM ubuntu:noble\n").unwrap();
        std::fs::write(temp.path().join("setup.sh"), "#!/bin/sh\n").unwrap();

        let (tar_data, name) = pack_build_context(&dockerfile, temp.path()).unwrap();
        assert_eq!(name, "Dockerfile.amd64.noble");

        let names = entry_names(&tar_data);
        assert!(names.iter().any(|n| n.ends_with("Dockerfile.amd64.noble")));
        assert!(names.iter().any(|n| n.ends_with("setup.sh")));
    }

    #[test]
    fn test_pack_context_with_detached_dockerfile() {
        let context = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let dockerfile = other.path().join("Dockerfile");
        std::fs::write(&dockerfile, "FROM ubuntu:questing\n").unwrap();

        let (tar_data, name) = pack_build_context(&dockerfile, context.path()).unwrap();
        assert_eq!(name, DETACHED_DOCKERFILE);
        assert!(entry_names(&tar_data).iter().any(|n| n == DETACHED_DOCKERFILE));
    }

    #[test]
    fn test_pack_missing_context() {
        let err = pack_build_context(Path::new("/nope/Dockerfile"), Path::new("/nope")).unwrap_err();
        assert!(matches!(err, DockerError::BuildContext { .. }));
    }
}
