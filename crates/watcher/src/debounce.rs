//! Trigger debouncing
//!
//! The first event after a quiet window triggers immediately; everything
//! else inside the window is buffered by label and reported in one summary
//! when the next trigger fires.

use std::time::{Duration, Instant};

/// Result of observing one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Run now; `debounced` holds the labels buffered since the last trigger
    Trigger { debounced: Vec<String> },
    /// Inside the window, label buffered
    Buffered,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    interval: Duration,
    last_trigger: Option<Instant>,
    pending: Vec<String>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_trigger: None,
            pending: Vec::new(),
        }
    }

    /// Decide whether an event observed at `now` triggers a run
    ///
    /// `force` triggers regardless of the window.
    pub fn observe(&mut self, now: Instant, label: &str, force: bool) -> Decision {
        let window_closed = match self.last_trigger {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        };

        if window_closed || force {
            self.last_trigger = Some(now);
            Decision::Trigger {
                debounced: std::mem::take(&mut self.pending),
            }
        } else {
            self.pending.push(label.to_owned());
            Decision::Buffered
        }
    }

    /// Take whatever is still buffered
    pub fn flush(&mut self) -> Option<Vec<String>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn last_trigger(&self) -> Option<Instant> {
        self.last_trigger
    }
}
