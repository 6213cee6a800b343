use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::EndReason;

/// Lifecycle events emitted by the session manager and pipeline coordinator.
///
/// Events are published on a broadcast channel and consumed by:
/// - The structured log sink (one log line per event)
/// - The HTTP status surface (last-event reporting)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LifecycleEvent {
    /// The debounced presence signal rose.
    PresenceDetected { timestamp: DateTime<Utc> },

    /// The debounced presence signal fell.
    PresenceLost { timestamp: DateTime<Utc> },

    /// A session transitioned from idle to active.
    SessionStarted {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Activity was recorded against the active session.
    ActivityRecorded {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// The active session entered its closing grace period.
    SessionClosing {
        session_id: Uuid,
        reason: EndReason,
        timestamp: DateTime<Utc>,
    },

    /// A session ended and was archived.
    SessionEnded {
        session_id: Uuid,
        reason: EndReason,
        turn_count: usize,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },

    /// One interaction turn completed, successfully or with the fallback
    /// response.
    TurnCompleted {
        session_id: Uuid,
        error: bool,
        timestamp: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LifecycleEvent::PresenceDetected { timestamp }
            | LifecycleEvent::PresenceLost { timestamp }
            | LifecycleEvent::SessionStarted { timestamp, .. }
            | LifecycleEvent::ActivityRecorded { timestamp, .. }
            | LifecycleEvent::SessionClosing { timestamp, .. }
            | LifecycleEvent::SessionEnded { timestamp, .. }
            | LifecycleEvent::TurnCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a human-readable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            LifecycleEvent::PresenceDetected { .. } => "presence_detected",
            LifecycleEvent::PresenceLost { .. } => "presence_lost",
            LifecycleEvent::SessionStarted { .. } => "session_started",
            LifecycleEvent::ActivityRecorded { .. } => "activity_recorded",
            LifecycleEvent::SessionClosing { .. } => "session_closing",
            LifecycleEvent::SessionEnded { .. } => "session_ended",
            LifecycleEvent::TurnCompleted { .. } => "turn_completed",
        }
    }
}
