//! Configuration management for dockdeb
//!
//! This crate handles YAML configuration parsing, validation,
//! and environment variable substitution. Every key has a default, so a
//! missing configuration file is equivalent to an empty one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dockdeb_core::TargetResolver;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Name of the configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "dockdeb.yaml";

/// Script run inside the build container when no command is configured
pub const DEFAULT_BUILD_COMMAND: &str = r#"set -eu
mkdir -p /build/src "$OUTPUT_DIR"
cp -a "$SOURCE_DIR"/. /build/src/
cd /build/src
dpkg-buildpackage -us -uc -b
find /build -maxdepth 1 -type f \( -name '*.deb' -o -name '*.ddeb' -o -name '*.udeb' -o -name '*.changes' -o -name '*.buildinfo' \) -exec cp {} "$OUTPUT_DIR"/ \;
"#;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {name}")]
    MissingVariable { name: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `Dockerfile.<arch>.<distribution>` files
    pub docker_dir: PathBuf,

    /// Image repository; tags are `<distribution>-<arch>`
    pub image_repository: String,

    /// Output directory for artifacts, logs and the build report
    pub output_dir: PathBuf,

    /// Maximum number of targets built concurrently
    pub max_parallel: usize,

    /// Shell script run inside the build container
    pub build_command: String,

    /// Per-target build time limit in seconds
    pub build_timeout_secs: Option<u64>,

    /// Explicit Docker socket path
    pub docker_socket: Option<String>,

    /// Version metadata passed to the build as `BUILD_VERSION`
    pub build_version: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_dir: PathBuf::from("./docker"),
            image_repository: "dockdeb-builder".to_string(),
            output_dir: PathBuf::from("./output"),
            max_parallel: 1,
            build_command: DEFAULT_BUILD_COMMAND.to_string(),
            build_timeout_secs: None,
            docker_socket: None,
            build_version: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        Self::from_yaml(&content)
    }

    /// Parse, expand and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content)?
        };

        config.expand_env_vars()?;
        config.validate()?;

        Ok(config)
    }

    /// Load an explicit file, or `dockdeb.yaml` if present, or defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    debug!("Loading configuration from {}", default.display());
                    Self::from_file(default)
                } else {
                    debug!("No configuration file found, using defaults");
                    let config = Config::default();
                    config.validate()?;
                    Ok(config)
                }
            }
        }
    }

    /// Expand environment variables in paths
    fn expand_env_vars(&mut self) -> Result<()> {
        self.docker_dir = expand_path(&self.docker_dir)?;
        self.output_dir = expand_path(&self.output_dir)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            return Err(ConfigError::Invalid {
                message: "max_parallel must be at least 1".to_string(),
            });
        }

        let repository_re = Regex::new(r"^[a-z0-9]+([._/-][a-z0-9]+)*$").map_err(|e| {
            ConfigError::Invalid { message: format!("repository pattern: {e}") }
        })?;
        if !repository_re.is_match(&self.image_repository) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "image_repository '{}' is not a valid lowercase image name",
                    self.image_repository
                ),
            });
        }

        if self.build_command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "build_command cannot be empty".to_string(),
            });
        }

        if self.build_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                message: "build_timeout_secs must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Target resolver for this configuration
    pub fn resolver(&self) -> TargetResolver {
        TargetResolver::new(self.docker_dir.clone(), self.image_repository.clone())
    }

    /// Build time limit, if any
    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout_secs.map(Duration::from_secs)
    }
}

/// Expand environment variables in a path
fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    let env_var_re = Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .map_err(|e| ConfigError::Invalid { message: format!("variable pattern: {e}") })?;

    let mut result = path_str.to_string();
    for cap in env_var_re.captures_iter(&path_str) {
        let Some(name) = cap.get(1).or_else(|| cap.get(2)) else {
            continue;
        };
        let value = std::env::var(name.as_str())
            .map_err(|_| ConfigError::MissingVariable { name: name.as_str().to_string() })?;

        result = result.replace(&cap[0], &value);
    }

    Ok(PathBuf::from(result))
}

#[cfg(test)]
mod tests {
    use std::env;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_expand_path() {
        env::set_var("DOCKDEB_TEST_ROOT", "/test/path");

        let expanded = expand_path(Path::new("${DOCKDEB_TEST_ROOT}/docker")).unwrap();
        assert_eq!(expanded, PathBuf::from("/test/path/docker"));

        let expanded = expand_path(Path::new("$DOCKDEB_TEST_ROOT/out")).unwrap();
        assert_eq!(expanded, PathBuf::from("/test/path/out"));
    }

    #[test]
    fn test_missing_variable() {
        let err = expand_path(Path::new("${DOCKDEB_SURELY_UNSET_VAR}/x")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVariable { .. }));
    }

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_parallel, 1);
        assert!(config.build_command.contains("dpkg-buildpackage"));
    }

    #[test]
    fn test_partial_yaml() {
        let config = Config::from_yaml(
            "docker_dir: /srv/docker\nmax_parallel: 3\nbuild_timeout_secs: 600\n",
        )
        .unwrap();

        assert_eq!(config.docker_dir, PathBuf::from("/srv/docker"));
        assert_eq!(config.max_parallel, 3);
        assert_eq!(config.build_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.image_repository, "dockdeb-builder");
    }

    #[test]
    fn test_validation_failures() {
        assert!(Config::from_yaml("max_parallel: 0\n").is_err());
        assert!(Config::from_yaml("image_repository: Not Valid\n").is_err());
        assert!(Config::from_yaml("build_command: '  '\n").is_err());
        assert!(Config::from_yaml("build_timeout_secs: 0\n").is_err());
    }

    #[test]
    fn test_from_file_and_resolver() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dockdeb.yaml");
        std::fs::write(&path, "image_repository: registry.local/debs\ndocker_dir: /d\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        let env = config.resolver().resolve("arm64", "noble").unwrap();
        assert_eq!(env.image, "registry.local/debs:noble-arm64");
        assert_eq!(env.dockerfile, PathBuf::from("/d/Dockerfile.arm64.noble"));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/dockdeb.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
