//! Progress UI components for build visualization
//!
//! The orchestrator reports each target's state transitions as
//! [`ProgressEvent`]s; a [`ProgressUI`] renders them.

use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dockdeb_core::{BuildTarget, TargetState};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

/// Events emitted during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A run over `total` targets started
    RunStarted { total: usize },
    /// A target entered a non-terminal state
    StateChanged { target: BuildTarget, state: TargetState },
    /// A target reached a terminal state
    TargetFinished { target: BuildTarget, state: TargetState, message: Option<String> },
}

/// Trait for progress UI implementations
pub trait ProgressUI: Send + Sync {
    /// Update the UI with a progress event
    fn update(&self, event: &ProgressEvent);

    /// Finish the progress display
    fn finish(&self);
}

/// Indicatif-based progress UI: one spinner per target under a main bar
pub struct IndicatifProgressUI {
    multi_progress: MultiProgress,
    main_bar: ProgressBar,
    target_bars: Mutex<HashMap<BuildTarget, ProgressBar>>,
    start_time: Instant,
}

impl Default for IndicatifProgressUI {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifProgressUI {
    pub fn new() -> Self {
        let multi_progress = MultiProgress::new();

        let main_bar = multi_progress.add(ProgressBar::new(0));
        let style = ProgressStyle::default_bar()
            .template(
                "{prefix:.bold.dim} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
            )
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        main_bar.set_style(style);
        main_bar.set_prefix("Building targets");

        Self {
            multi_progress,
            main_bar,
            target_bars: Mutex::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    fn target_bar(&self, target: &BuildTarget) -> ProgressBar {
        let mut bars = self.target_bars.lock().unwrap_or_else(PoisonError::into_inner);
        bars.entry(*target)
            .or_insert_with(|| {
                let pb = self.multi_progress.add(ProgressBar::new_spinner());
                let style = ProgressStyle::default_spinner()
                    .template("{prefix:.bold.dim} {spinner:.green} {wide_msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner());
                pb.set_style(style);
                pb.set_prefix(format!("  {:<16}", target.to_string()));
                pb.enable_steady_tick(Duration::from_millis(100));
                pb
            })
            .clone()
    }
}

impl ProgressUI for IndicatifProgressUI {
    fn update(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { total } => {
                self.main_bar.set_length(*total as u64);
                self.main_bar.set_position(0);
            }
            ProgressEvent::StateChanged { target, state } => {
                self.target_bar(target).set_message(format!("{state}..."));
            }
            ProgressEvent::TargetFinished { target, state, message } => {
                let pb = self.target_bar(target);
                let text = match (state, message) {
                    (TargetState::Succeeded, _) => "✓ succeeded".to_string(),
                    (_, Some(message)) => format!("✗ {state}: {message}"),
                    (_, None) => format!("✗ {state}"),
                };
                pb.finish_with_message(text);
                self.main_bar.inc(1);
            }
        }
    }

    fn finish(&self) {
        let bars = self.target_bars.lock().unwrap_or_else(PoisonError::into_inner);
        for pb in bars.values().filter(|pb| !pb.is_finished()) {
            pb.finish();
        }

        let elapsed = self.start_time.elapsed();
        self.main_bar
            .finish_with_message(format!("done in {:.1}s", elapsed.as_secs_f64()));
    }
}

/// Progress UI that only logs
pub struct NoOpProgressUI;

impl ProgressUI for NoOpProgressUI {
    fn update(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { total } => info!("Building {} target(s)", total),
            ProgressEvent::StateChanged { .. } => {}
            ProgressEvent::TargetFinished { target, state, message } => match state {
                TargetState::Succeeded => info!("{} succeeded", target),
                TargetState::Cancelled => warn!("{} cancelled", target),
                _ => error!("{} {}: {}", target, state, message.as_deref().unwrap_or("unknown error")),
            },
        }
    }

    fn finish(&self) {}
}

/// Interactive UI when stderr is a terminal and `interactive` is set
pub fn create_progress_ui(interactive: bool) -> Arc<dyn ProgressUI> {
    if interactive && std::io::stderr().is_terminal() {
        Arc::new(IndicatifProgressUI::new())
    } else {
        Arc::new(NoOpProgressUI)
    }
}
