//! Progress observers
//!
//! Download loops report through a [`ProgressObserver`] handed in by the
//! caller instead of owning any rendering themselves.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::utils::format_bytes;

/// Receives progress from fetch and download loops
pub trait ProgressObserver: Send + Sync {
    /// Bytes written so far and the expected total when known
    fn on_progress(&self, bytes_done: u64, bytes_total: Option<u64>);

    /// Segments finished so far out of the playlist total
    fn on_segment(&self, _completed: usize, _total: usize) {}

    /// A download step finished
    fn on_finish(&self) {}
}

/// Discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn on_progress(&self, _bytes_done: u64, _bytes_total: Option<u64>) {}
}

/// Emits rate-limited `tracing` lines
pub struct LoggingProgress {
    label: String,
    interval: Duration,
    last_emit: Mutex<Option<Instant>>,
}

impl LoggingProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_interval(label, Duration::from_secs(2))
    }

    pub fn with_interval(label: impl Into<String>, interval: Duration) -> Self {
        Self {
            label: label.into(),
            interval,
            last_emit: Mutex::new(None),
        }
    }

    /// True at most once per interval
    fn should_emit(&self) -> bool {
        let mut last = self.last_emit.lock();
        let now = Instant::now();
        match *last {
            Some(previous) if now.duration_since(previous) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl ProgressObserver for LoggingProgress {
    fn on_progress(&self, bytes_done: u64, bytes_total: Option<u64>) {
        if !self.should_emit() {
            return;
        }
        match bytes_total {
            Some(total) if total > 0 => tracing::info!(
                "{}: {} / {} ({:.1}%)",
                self.label,
                format_bytes(bytes_done),
                format_bytes(total),
                bytes_done as f64 * 100.0 / total as f64
            ),
            _ => tracing::info!("{}: {}", self.label, format_bytes(bytes_done)),
        }
    }

    fn on_segment(&self, completed: usize, total: usize) {
        if completed == total || self.should_emit() {
            tracing::info!("{}: segment {}/{}", self.label, completed, total);
        }
    }
}
