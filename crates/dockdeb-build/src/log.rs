//! Per-target build log files

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::{BuildError, Result};

/// Line-oriented log file shared between a stage and its output callbacks
pub struct LogSink {
    path: PathBuf,
    label: String,
    inner: Mutex<SinkState>,
}

struct SinkState {
    writer: BufWriter<File>,
    /// Trailing text of the last chunk not yet ended by a newline
    pending: String,
}

impl LogSink {
    /// Create (truncate) the log file, creating parent directories
    pub fn create(path: impl Into<PathBuf>, label: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BuildError::host_io(parent, e))?;
        }
        let file = File::create(&path).map_err(|e| BuildError::host_io(&path, e))?;

        Ok(Self {
            path,
            label: label.into(),
            inner: Mutex::new(SinkState { writer: BufWriter::new(file), pending: String::new() }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a chunk of stream output
    ///
    /// Chunks may end mid-line; the remainder is held until a later chunk
    /// completes it or the sink is flushed.
    pub fn write_text(&self, text: &str) {
        let mut state = self.lock();
        state.pending.push_str(text);
        while let Some(pos) = state.pending.find('\n') {
            let line: String = state.pending.drain(..=pos).collect();
            self.emit(&mut state.writer, line.trim_end_matches(['\n', '\r']));
        }
    }

    /// Append one complete line
    pub fn write_line(&self, line: &str) {
        let mut state = self.lock();
        self.emit(&mut state.writer, line);
    }

    /// Write out any held partial line and flush the file
    pub fn flush(&self) {
        let mut state = self.lock();
        if !state.pending.is_empty() {
            let rest = std::mem::take(&mut state.pending);
            self.emit(&mut state.writer, &rest);
        }
        if let Err(e) = state.writer.flush() {
            warn!("Failed to flush {}: {}", self.path.display(), e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, writer: &mut BufWriter<File>, line: &str) {
        debug!(target: "dockdeb::build_output", "[{}] {}", self.label, line);
        if let Err(e) = writeln!(writer, "{line}") {
            warn!("Failed to write {}: {}", self.path.display(), e);
        }
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        self.flush();
    }
}
