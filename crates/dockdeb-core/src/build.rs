//! Build result tracking

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FailureKind;
use crate::target::BuildTarget;

/// Per-target pipeline state
///
/// States only move forward: `Pending → Resolving → Provisioning → Building
/// → Collecting → Succeeded`, with `Failed` and `Cancelled` reachable from
/// any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Pending,
    Resolving,
    Provisioning,
    Building,
    Collecting,
    Succeeded,
    Failed,
    Cancelled,
}

impl TargetState {
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Resolving => 1,
            Self::Provisioning => 2,
            Self::Building => 3,
            Self::Collecting => 4,
            Self::Succeeded | Self::Failed | Self::Cancelled => 5,
        }
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether `next` is a legal forward transition from this state
    pub fn can_advance_to(&self, next: TargetState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed | Self::Cancelled => true,
            Self::Succeeded => *self == Self::Collecting,
            _ => next.rank() == self.rank() + 1,
        }
    }

    /// Display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolving => "resolving",
            Self::Provisioning => "provisioning",
            Self::Building => "building",
            Self::Collecting => "collecting",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure detail recorded for a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFailure {
    /// Failure category
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
}

/// Ordered set of produced artifact paths for one target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactSet(Vec<PathBuf>);

impl ArtifactSet {
    /// Create a set, sorted by path
    pub fn new(mut paths: Vec<PathBuf>) -> Self {
        paths.sort();
        paths.dedup();
        Self(paths)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(PathBuf::as_path)
    }
}

/// Result of building one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    /// Target built
    pub target: BuildTarget,

    /// Terminal (or current) state
    pub state: TargetState,

    /// Exit code of the in-container build, if it ran
    pub exit_code: Option<i64>,

    /// Captured build log
    pub log_path: Option<PathBuf>,

    /// Produced artifacts
    pub artifacts: ArtifactSet,

    /// Failure detail if failed
    pub failure: Option<TargetFailure>,

    /// Start time
    pub start_time: DateTime<Utc>,

    /// End time
    pub end_time: DateTime<Utc>,

    /// Duration in seconds
    pub duration_secs: f64,
}

impl BuildResult {
    /// Create a new pending result
    pub fn new(target: BuildTarget) -> Self {
        let now = Utc::now();
        Self {
            target,
            state: TargetState::Pending,
            exit_code: None,
            log_path: None,
            artifacts: ArtifactSet::default(),
            failure: None,
            start_time: now,
            end_time: now,
            duration_secs: 0.0,
        }
    }

    /// Mark the pipeline as started
    pub fn start(&mut self) {
        self.start_time = Utc::now();
    }

    /// Mark the target as succeeded with its artifacts
    pub fn succeed(&mut self, artifacts: ArtifactSet) {
        self.state = TargetState::Succeeded;
        self.artifacts = artifacts;
        self.finish();
    }

    /// Mark the target as failed
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) {
        self.state = TargetState::Failed;
        self.failure = Some(TargetFailure { kind, message: message.into() });
        self.finish();
    }

    /// Mark the target as cancelled
    pub fn cancel(&mut self) {
        self.state = TargetState::Cancelled;
        self.finish();
    }

    fn finish(&mut self) {
        self.end_time = Utc::now();
        self.duration_secs = (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0;
    }

    /// Whether the target reached `Succeeded`
    pub fn is_success(&self) -> bool {
        self.state == TargetState::Succeeded
    }
}

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every target succeeded
    Success,
    /// Some targets succeeded, some failed
    PartialFailure,
    /// No target succeeded
    TotalFailure,
    /// The run was interrupted
    Cancelled,
}

impl RunOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::PartialFailure | Self::TotalFailure => 1,
            Self::Cancelled => 130,
        }
    }
}

/// Aggregated results of a run, keyed by target
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    results: BTreeMap<BuildTarget, BuildResult>,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    outcome: RunOutcome,
    succeeded: usize,
    failed: usize,
    cancelled: usize,
    targets: Vec<&'a BuildResult>,
}

impl BuildReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished target, replacing any previous entry for it
    pub fn insert(&mut self, result: BuildResult) {
        self.results.insert(result.target, result);
    }

    pub fn get(&self, target: &BuildTarget) -> Option<&BuildResult> {
        self.results.get(target)
    }

    /// Results in target order
    pub fn results(&self) -> impl Iterator<Item = &BuildResult> {
        self.results.values()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    fn count(&self, state: TargetState) -> usize {
        self.results.values().filter(|r| r.state == state).count()
    }

    /// Overall outcome
    pub fn outcome(&self) -> RunOutcome {
        let succeeded = self.count(TargetState::Succeeded);
        if self.count(TargetState::Cancelled) > 0 {
            RunOutcome::Cancelled
        } else if succeeded == self.results.len() && !self.results.is_empty() {
            RunOutcome::Success
        } else if succeeded == 0 {
            RunOutcome::TotalFailure
        } else {
            RunOutcome::PartialFailure
        }
    }

    /// Process exit code for this report
    pub fn exit_code(&self) -> i32 {
        self.outcome().exit_code()
    }

    /// Serialize the report as pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ReportDocument {
            outcome: self.outcome(),
            succeeded: self.count(TargetState::Succeeded),
            failed: self.count(TargetState::Failed),
            cancelled: self.count(TargetState::Cancelled),
            targets: self.results.values().collect(),
        })
    }

    /// Per-target breakdown as text
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        for result in self.results.values() {
            summary.push_str(&format!("{:<16} {:<10}", result.target.to_string(), result.state));
            match (&result.failure, result.state) {
                (Some(failure), _) => {
                    summary.push_str(&format!(" [{}] {}", failure.kind, failure.message));
                    if let Some(log) = &result.log_path {
                        summary.push_str(&format!(" (log: {})", log.display()));
                    }
                }
                (None, TargetState::Succeeded) => {
                    summary.push_str(&format!(" {} artifacts", result.artifacts.len()));
                }
                _ => {}
            }
            summary.push('\n');
        }
        summary.push_str(&format!(
            "{} succeeded, {} failed, {} cancelled",
            self.count(TargetState::Succeeded),
            self.count(TargetState::Failed),
            self.count(TargetState::Cancelled)
        ));
        summary
    }
}
