//! Prebuilt command implementation

use std::path::PathBuf;

use color_eyre::eyre::{Context, Result};
use dockdeb_build::{DpkgDebExtractor, PrebuiltPacker};
use dockdeb_core::{Architecture, Distribution};
use tracing::info;

/// Packs a `.changes` file's packages into a data tarball
pub struct PrebuiltCommand {
    input: PathBuf,
    arch: String,
    distro: Option<String>,
    output: Option<PathBuf>,
}

impl PrebuiltCommand {
    pub fn new(
        input: PathBuf,
        arch: String,
        distro: Option<String>,
        output: Option<PathBuf>,
    ) -> Self {
        Self { input, arch, distro, output }
    }

    pub async fn execute(&self) -> Result<i32> {
        let arch: Architecture = self.arch.parse().context("Invalid --arch")?;
        let distro: Option<Distribution> = self
            .distro
            .as_deref()
            .map(str::parse)
            .transpose()
            .context("Invalid --distro")?;

        info!("Packing prebuilt tarball from {}", self.input.display());

        let input = self.input.clone();
        let output = self.output.clone();
        let tarball = tokio::task::spawn_blocking(move || {
            PrebuiltPacker::new(DpkgDebExtractor).pack(&input, arch, distro, output.as_deref())
        })
        .await
        .context("Prebuilt task panicked")?
        .context("Failed to pack prebuilt tarball")?;

        println!("✓ Created {}", tarball.display());
        Ok(0)
    }
}
