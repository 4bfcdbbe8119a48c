//! Host/target architecture compatibility
//!
//! Running a container for a foreign architecture needs user-mode
//! emulation registered with the kernel. This module reports whether that
//! is the case so callers can warn before a slow or failing build.

use std::path::Path;

use dockdeb_core::Architecture;
use serde::{Deserialize, Serialize};

/// Emulation status for running a target architecture on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmulationSupport {
    /// Host runs the target natively
    Native,
    /// Target needs emulation and a handler is registered
    Emulated,
    /// Target needs emulation and no handler was found
    Unavailable,
}

impl EmulationSupport {
    /// Whether the target runs under emulation
    pub fn needs_emulation(&self) -> bool {
        !matches!(self, Self::Native)
    }

    /// Warning for the user, if any
    pub fn warning(&self, target: Architecture) -> Option<String> {
        match self {
            Self::Native => None,
            Self::Emulated => Some(format!(
                "{target} containers will run under emulation, which may be significantly slower"
            )),
            Self::Unavailable => Some(format!(
                "{target} containers need emulation but no qemu-{} handler was found; \
                 install qemu-user-static and binfmt support",
                target.qemu_name()
            )),
        }
    }
}

/// Check how this host can run containers for `target`
pub fn check_emulation(target: Architecture) -> EmulationSupport {
    check_emulation_on(Architecture::host(), target, Path::new("/"))
}

fn check_emulation_on(
    host: Option<Architecture>,
    target: Architecture,
    root: &Path,
) -> EmulationSupport {
    if host == Some(target) {
        return EmulationSupport::Native;
    }

    let qemu = target.qemu_name();
    let binfmt = root.join(format!("proc/sys/fs/binfmt_misc/qemu-{qemu}"));
    let static_binary = root.join(format!("usr/bin/qemu-{qemu}-static"));

    if binfmt.exists() || static_binary.exists() {
        EmulationSupport::Emulated
    } else {
        EmulationSupport::Unavailable
    }
}
