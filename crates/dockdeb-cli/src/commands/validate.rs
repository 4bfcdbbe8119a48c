//! Validate command implementation

use std::path::PathBuf;

use color_eyre::eyre::{Context, Result};
use dockdeb_docker::{check_emulation, DockerConfig, DockerService};
use tracing::{error, info, warn};

use super::{load_config, TargetSelection, EXIT_CONFIG};

/// Validate command implementation
pub struct ValidateCommand {
    config_path: Option<PathBuf>,
    selection: TargetSelection,
}

impl ValidateCommand {
    pub fn new(config_path: Option<PathBuf>, selection: TargetSelection) -> Self {
        Self { config_path, selection }
    }

    /// Check the engine and every selected target's Dockerfile
    pub async fn execute(&self) -> Result<i32> {
        info!("Validating configuration and build environments");

        let config = load_config(self.config_path.as_deref())?;
        println!("✓ Configuration loaded successfully");

        let targets = self.selection.resolve()?;
        let resolver = config.resolver();
        let mut problems = 0;

        if !resolver.docker_dir().is_dir() {
            error!("Dockerfile directory does not exist: {}", resolver.docker_dir().display());
            problems += 1;
        }

        info!("Checking Docker availability");
        let docker = DockerService::new(DockerConfig {
            socket_path: config.docker_socket.clone(),
            ..Default::default()
        })
        .await
        .context("Docker availability check failed");
        match docker {
            Ok(_) => println!("✓ Docker is available"),
            Err(e) => {
                error!("{:#}", e);
                println!("✗ Docker is not available");
                problems += 1;
            }
        }

        for target in &targets {
            let env = resolver.resolve_target(target);
            if env.dockerfile.is_file() {
                println!("✓ {:<16} {}", target.to_string(), env.dockerfile.display());
            } else {
                println!("✗ {:<16} missing {}", target.to_string(), env.dockerfile.display());
                problems += 1;
            }

            if let Some(warning) = check_emulation(target.architecture).warning(target.architecture)
            {
                warn!("{}", warning);
            }
        }

        if problems > 0 {
            println!("\n✗ {} problem(s) found", problems);
            return Ok(EXIT_CONFIG);
        }

        println!("\n✓ All validation checks passed!");
        Ok(0)
    }
}
