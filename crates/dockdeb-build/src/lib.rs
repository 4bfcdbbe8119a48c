//! Build orchestration for dockdeb
//!
//! This crate drives each requested target through provisioning, the
//! containerized build and artifact collection, and aggregates the results.

pub mod artifact;
pub mod error;
pub mod executor;
pub mod log;
pub mod orchestrator;
pub mod prebuilt;
pub mod progress_ui;
pub mod provisioner;
pub mod shutdown;

pub use artifact::{create_summary, ArtifactCollector, BuildArtifact};
pub use error::{BuildError, Result};
pub use executor::{BuildExecutor, BuildRun, ContainerGuard, ExecutorConfig};
pub use orchestrator::{BuildOrchestrator, OrchestratorConfig, REPORT_FILE};
pub use prebuilt::{DebExtractor, DpkgDebExtractor, PrebuiltError, PrebuiltPacker};
pub use progress_ui::{
    create_progress_ui, IndicatifProgressUI, NoOpProgressUI, ProgressEvent, ProgressUI,
};
pub use provisioner::{EnvironmentProvisioner, ImageCache, Provisioned};
pub use shutdown::{setup_signal_handlers, ShutdownManager};
