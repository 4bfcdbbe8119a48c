//! Core types and traits for dockdeb
//!
//! This crate provides the target matrix, the target resolver and the
//! result types shared by every other dockdeb crate.

pub mod build;
pub mod environment;
pub mod error;
pub mod request;
pub mod target;

pub use build::{ArtifactSet, BuildReport, BuildResult, RunOutcome, TargetFailure, TargetState};
pub use environment::{BuildEnvironment, TargetResolver};
pub use error::{Error, FailureKind, ResolveError, Result};
pub use request::BuildRequest;
pub use target::{parse_selection, Architecture, BuildTarget, Distribution};
