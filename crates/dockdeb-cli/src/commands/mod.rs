//! CLI command implementations

use std::path::Path;

use color_eyre::eyre::{Context, Result};
use dockdeb_config::Config;
use dockdeb_core::{parse_selection, BuildTarget};

pub mod build;
pub mod prebuilt;
pub mod targets;
pub mod validate;

pub use build::{BuildCommand, BuildOptions};
pub use prebuilt::PrebuiltCommand;
pub use targets::TargetsCommand;
pub use validate::ValidateCommand;

/// Configuration, input-validation or environment error
pub const EXIT_CONFIG: i32 = 2;

/// Target selection flags shared by `build` and `validate`
#[derive(Debug, Clone, Default)]
pub struct TargetSelection {
    pub targets: Vec<String>,
    pub arch: Vec<String>,
    pub distro: Vec<String>,
}

impl TargetSelection {
    /// Expand the selection; nothing selected means the whole matrix
    pub fn resolve(&self) -> Result<Vec<BuildTarget>> {
        if self.targets.is_empty() && self.arch.is_empty() && self.distro.is_empty() {
            return Ok(BuildTarget::all());
        }
        parse_selection(&self.targets, &self.arch, &self.distro)
            .context("Invalid target selection")
    }
}

/// Load the configuration file, or defaults when none exists
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })
}
