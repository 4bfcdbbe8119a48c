//! Supported build targets
//!
//! A build target is one (architecture, distribution) pair. Both halves are
//! closed enumerations; string input is validated once here and never
//! matched on again downstream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

/// Target CPU architecture (Debian naming)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// 64-bit x86
    Amd64,
    /// 64-bit ARM
    Arm64,
}

impl Architecture {
    /// Every supported architecture
    pub const ALL: [Architecture; 2] = [Self::Amd64, Self::Arm64];

    /// Debian architecture name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }

    /// OCI platform string for this architecture
    pub fn platform(&self) -> String {
        format!("linux/{}", self.as_str())
    }

    /// Name used by QEMU user-mode emulators and binfmt handlers
    pub fn qemu_name(&self) -> &'static str {
        match self {
            Self::Amd64 => "x86_64",
            Self::Arm64 => "aarch64",
        }
    }

    /// Architecture of the running host, if it is a supported one
    pub fn host() -> Option<Self> {
        std::env::consts::ARCH.parse().ok()
    }
}

impl FromStr for Architecture {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "amd64" | "x86_64" => Ok(Self::Amd64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            _ => Err(ResolveError::UnsupportedArchitecture { value: s.to_string() }),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ubuntu base-image release
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    /// Ubuntu 24.04 LTS
    Noble,
    /// Ubuntu 25.10
    Questing,
}

impl Distribution {
    /// Every supported distribution
    pub const ALL: [Distribution; 2] = [Self::Noble, Self::Questing];

    /// Release codename
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Noble => "noble",
            Self::Questing => "questing",
        }
    }
}

impl FromStr for Distribution {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "noble" => Ok(Self::Noble),
            "questing" => Ok(Self::Questing),
            _ => Err(ResolveError::UnsupportedDistribution { value: s.to_string() }),
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (architecture, distribution) pair requested for a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildTarget {
    pub architecture: Architecture,
    pub distribution: Distribution,
}

impl BuildTarget {
    /// Create a target from already-validated parts
    pub fn new(architecture: Architecture, distribution: Distribution) -> Self {
        Self { architecture, distribution }
    }

    /// Validate a pair of raw strings
    pub fn parse(architecture: &str, distribution: &str) -> Result<Self, ResolveError> {
        Ok(Self::new(architecture.parse()?, distribution.parse()?))
    }

    /// The full supported matrix
    pub fn all() -> Vec<Self> {
        Architecture::ALL
            .iter()
            .flat_map(|&arch| Distribution::ALL.iter().map(move |&dist| Self::new(arch, dist)))
            .collect()
    }

    /// Canonical `<distribution>-<arch>` label used for tags, logs and names
    pub fn label(&self) -> String {
        format!("{}-{}", self.distribution, self.architecture)
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.architecture, self.distribution)
    }
}

impl FromStr for BuildTarget {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (arch, dist) = s
            .split_once(':')
            .or_else(|| s.split_once('/'))
            .ok_or_else(|| ResolveError::InvalidSelection { value: s.to_string() })?;
        Self::parse(arch, dist)
    }
}

/// Expand CLI target selections into a deduplicated target list
///
/// `selections` holds `ARCH:DISTRO` pairs or `all`; `architectures` and
/// `distributions` contribute their cross product when either is given
/// (a missing side means every supported value).
pub fn parse_selection(
    selections: &[String],
    architectures: &[String],
    distributions: &[String],
) -> Result<Vec<BuildTarget>, ResolveError> {
    let mut targets = Vec::new();

    for selection in selections {
        if selection.trim().eq_ignore_ascii_case("all") {
            targets.extend(BuildTarget::all());
        } else {
            targets.push(selection.parse()?);
        }
    }

    if !architectures.is_empty() || !distributions.is_empty() {
        let arches = if architectures.is_empty() {
            Architecture::ALL.to_vec()
        } else {
            architectures
                .iter()
                .map(|a| a.parse())
                .collect::<Result<Vec<Architecture>, _>>()?
        };
        let dists = if distributions.is_empty() {
            Distribution::ALL.to_vec()
        } else {
            distributions
                .iter()
                .map(|d| d.parse())
                .collect::<Result<Vec<Distribution>, _>>()?
        };
        for &arch in &arches {
            for &dist in &dists {
                targets.push(BuildTarget::new(arch, dist));
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    targets.retain(|t| seen.insert(*t));
    Ok(targets)
}
