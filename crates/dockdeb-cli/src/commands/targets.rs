//! Targets command implementation

use std::path::PathBuf;

use color_eyre::eyre::Result;
use dockdeb_core::BuildTarget;

use super::load_config;

/// Prints the supported target matrix
pub struct TargetsCommand {
    config_path: Option<PathBuf>,
}

impl TargetsCommand {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    pub fn execute(&self) -> Result<i32> {
        let config = load_config(self.config_path.as_deref())?;
        let resolver = config.resolver();

        println!("{:<16} {:<40} DOCKERFILE", "TARGET", "IMAGE");
        for target in BuildTarget::all() {
            let env = resolver.resolve_target(&target);
            let marker = if env.dockerfile.is_file() { "" } else { " (missing)" };
            println!(
                "{:<16} {:<40} {}{}",
                format!("{}:{}", target.architecture, target.distribution),
                env.image,
                env.dockerfile.display(),
                marker
            );
        }

        Ok(0)
    }
}
