//! Main CLI entry point for dockdeb

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::EXIT_CONFIG;

/// dockdeb - Build Debian packages inside per-target Docker environments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    quiet: u8,

    /// Configuration file path (defaults to ./dockdeb.yaml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build packages for one or more targets
    Build {
        /// Target to build: ARCH:DISTRO or "all" (repeatable)
        #[arg(short, long = "target", value_name = "ARCH:DISTRO")]
        targets: Vec<String>,

        /// Architectures to build (crossed with --distro)
        #[arg(long, value_name = "ARCH", value_delimiter = ',')]
        arch: Vec<String>,

        /// Distributions to build (crossed with --arch)
        #[arg(long, value_name = "DISTRO", value_delimiter = ',')]
        distro: Vec<String>,

        /// Source tree containing debian/
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        source: PathBuf,

        /// Override output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Rebuild images from scratch even when cached
        #[arg(short, long)]
        force: bool,

        /// Number of targets built concurrently
        #[arg(short = 'j', long, value_name = "N")]
        max_parallel: Option<usize>,

        /// Per-target build time limit in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Version exported to the build as BUILD_VERSION
        #[arg(long, value_name = "VERSION")]
        build_version: Option<String>,

        /// Disable the interactive progress display
        #[arg(long)]
        no_progress: bool,

        /// Also pack a prebuilt data tarball for every succeeded target
        #[arg(long)]
        prebuilt: bool,
    },

    /// Check the container engine and the Dockerfiles of the selected targets
    Validate {
        /// Target to check: ARCH:DISTRO or "all" (repeatable)
        #[arg(short, long = "target", value_name = "ARCH:DISTRO")]
        targets: Vec<String>,

        #[arg(long, value_name = "ARCH", value_delimiter = ',')]
        arch: Vec<String>,

        #[arg(long, value_name = "DISTRO", value_delimiter = ',')]
        distro: Vec<String>,
    },

    /// List the supported target matrix
    Targets,

    /// Pack the packages listed in a .changes file into a data tarball
    Prebuilt {
        /// A .changes file, or a directory holding one
        #[arg(value_name = "PATH", default_value = ".")]
        input: PathBuf,

        /// Architecture subdirectory used inside the tarball
        #[arg(long, value_name = "ARCH", default_value = "arm64")]
        arch: String,

        /// Place the tarball under prebuilt_<DISTRO>/
        #[arg(long, value_name = "DISTRO")]
        distro: Option<String>,

        /// Output root (defaults to the .changes directory)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet)?;

    let result = match cli.command {
        Commands::Build {
            targets,
            arch,
            distro,
            source,
            output,
            force,
            max_parallel,
            timeout,
            build_version,
            no_progress,
            prebuilt,
        } => {
            let command = commands::BuildCommand::new(
                cli.config,
                commands::BuildOptions {
                    selection: commands::TargetSelection { targets, arch, distro },
                    source,
                    output,
                    force,
                    max_parallel,
                    timeout,
                    build_version,
                    progress: !no_progress,
                    prebuilt,
                },
            );
            command.execute().await
        }

        Commands::Validate { targets, arch, distro } => {
            let command = commands::ValidateCommand::new(
                cli.config,
                commands::TargetSelection { targets, arch, distro },
            );
            command.execute().await
        }

        Commands::Targets => commands::TargetsCommand::new(cli.config).execute(),

        Commands::Prebuilt { input, arch, distro, output } => {
            let command = commands::PrebuiltCommand::new(input, arch, distro, output);
            command.execute().await
        }
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Command failed: {:#}", e);
            EXIT_CONFIG
        }
    };

    std::process::exit(code)
}

fn setup_logging(verbose: u8, quiet: u8) -> Result<()> {
    let log_level = match (verbose, quiet) {
        (0, 0) => "info",
        (1, 0) => "debug",
        (_, 0) => "trace",
        (0, 1) => "warn",
        (0, 2) => "error",
        (0, _) => "off",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
