//! Presence signal debouncing.
//!
//! Raw presence samples flicker when a visitor shifts at the edge of the
//! sensor's range. The debouncer confirms a change only after the new value
//! has held for the full debounce window, and reports clean edges.

use chrono::{DateTime, Duration, Utc};

/// A confirmed change in the debounced presence signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEdge {
    Appeared,
    Vanished,
}

/// Debounces a boolean presence signal.
///
/// Starts with presence confirmed absent. Not thread-safe by itself; the
/// session manager feeds it samples from a single task.
#[derive(Debug)]
pub struct PresenceDebouncer {
    window: Duration,
    confirmed: bool,
    candidate_since: Option<DateTime<Utc>>,
}

impl PresenceDebouncer {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            window: Duration::milliseconds(debounce_ms as i64),
            confirmed: false,
            candidate_since: None,
        }
    }

    /// The current confirmed presence value.
    pub fn present(&self) -> bool {
        self.confirmed
    }

    /// Feed one raw sample. Returns an edge when the opposite value has
    /// held for the full debounce window.
    pub fn sample(&mut self, present: bool, now: DateTime<Utc>) -> Option<PresenceEdge> {
        if present == self.confirmed {
            // Flicker back to the confirmed value resets the pending change.
            self.candidate_since = None;
            return None;
        }

        match self.candidate_since {
            None => {
                self.candidate_since = Some(now);
                None
            }
            Some(since) if now - since >= self.window => {
                self.confirmed = present;
                self.candidate_since = None;
                Some(if present {
                    PresenceEdge::Appeared
                } else {
                    PresenceEdge::Vanished
                })
            }
            Some(_) => None,
        }
    }
}
