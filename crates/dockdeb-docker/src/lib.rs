//! Docker integration for dockdeb
//!
//! This crate provides the container-engine seam used by the build
//! pipeline: the [`DockerServiceTrait`] capability set and its
//! bollard-backed implementation.

pub mod arch;
pub mod client;
pub mod container;
pub mod error;
pub mod image;
pub mod service;
pub mod types;

pub use arch::{check_emulation, EmulationSupport};
pub use client::{DockerConfig, DockerService};
pub use container::{ContainerSpec, VolumeMount};
pub use error::{DockerError, Result};
pub use image::ImageManager;
pub use service::{DockerServiceTrait, LogOutput, LogStream};
pub use types::ImageBuildSpec;
