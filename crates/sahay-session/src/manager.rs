//! Session lifecycle management.
//!
//! Owns the single session slot. All lifecycle transitions go through the
//! state machine in [`crate::state`], and every transition is published as
//! a [`LifecycleEvent`] on a broadcast channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use sahay_core::events::LifecycleEvent;
use sahay_core::types::{EndReason, Session, SessionState, Turn};

use crate::error::SessionError;
use crate::presence::{PresenceDebouncer, PresenceEdge};
use crate::state::validate_transition;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Manages the kiosk's single session.
///
/// At most one session exists at a time. A new one can only start once the
/// previous one has fully ended.
pub struct SessionManager {
    slot: Mutex<Option<Session>>,
    debouncer: Mutex<PresenceDebouncer>,
    presence: AtomicBool,
    idle_timeout: Duration,
    events: broadcast::Sender<LifecycleEvent>,
}

impl SessionManager {
    pub fn new(idle_timeout_secs: u64, debounce_ms: u64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            slot: Mutex::new(None),
            debouncer: Mutex::new(PresenceDebouncer::new(debounce_ms)),
            presence: AtomicBool::new(false),
            idle_timeout: Duration::seconds(idle_timeout_secs as i64),
            events,
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Start a new session.
    ///
    /// Fails with [`SessionError::AlreadyActive`] if one exists, whether
    /// active or closing.
    pub fn start_session(&self, now: DateTime<Utc>) -> Result<Uuid, SessionError> {
        let mut slot = self.lock_slot()?;
        if slot.is_some() {
            return Err(SessionError::AlreadyActive);
        }

        validate_transition(SessionState::Idle, SessionState::Active)?;
        let session = Session::new(now);
        let id = session.id;
        *slot = Some(session);

        info!(session_id = %id, "Session started");
        self.emit(LifecycleEvent::SessionStarted {
            session_id: id,
            timestamp: now,
        });
        Ok(id)
    }

    /// End the current session and return it finalized.
    ///
    /// Manual exit goes straight to idle. Every other reason passes through
    /// the closing state, announced as a [`LifecycleEvent::SessionClosing`].
    pub fn end_session(
        &self,
        reason: EndReason,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionError> {
        let mut slot = self.lock_slot()?;
        let mut session = slot.take().ok_or(SessionError::NoActiveSession)?;

        if reason == EndReason::ManualExit {
            validate_transition(session.state, SessionState::Idle)?;
        } else {
            validate_transition(session.state, SessionState::Closing)?;
            session.state = SessionState::Closing;
            self.emit(LifecycleEvent::SessionClosing {
                session_id: session.id,
                reason,
                timestamp: now,
            });
            validate_transition(session.state, SessionState::Idle)?;
        }
        session.state = SessionState::Idle;

        info!(
            session_id = %session.id,
            reason = reason.as_str(),
            turns = session.turns.len(),
            "Session ended"
        );
        self.emit(LifecycleEvent::SessionEnded {
            session_id: session.id,
            reason,
            turn_count: session.turns.len(),
            duration_secs: session.duration_secs(now),
            timestamp: now,
        });
        Ok(session)
    }

    /// A clone of the current session, if any.
    pub fn current(&self) -> Result<Option<Session>, SessionError> {
        Ok(self.lock_slot()?.clone())
    }

    /// The current lifecycle state. Idle when no session exists.
    pub fn state(&self) -> SessionState {
        self.lock_slot()
            .ok()
            .and_then(|slot| slot.as_ref().map(|s| s.state))
            .unwrap_or(SessionState::Idle)
    }

    /// Record non-turn activity (touch input, presence near the screen).
    pub fn record_activity(&self, now: DateTime<Utc>) -> Result<(), SessionError> {
        let mut slot = self.lock_slot()?;
        let session = slot.as_mut().ok_or(SessionError::NoActiveSession)?;
        session.touch(now);
        let id = session.id;
        drop(slot);

        self.emit(LifecycleEvent::ActivityRecorded {
            session_id: id,
            timestamp: now,
        });
        Ok(())
    }

    /// Append a completed turn to the current session.
    ///
    /// Fails when no session exists or the session id no longer matches,
    /// so a turn is never attributed to the wrong session.
    pub fn record_turn(&self, session_id: Uuid, turn: Turn) -> Result<(), SessionError> {
        let mut slot = self.lock_slot()?;
        let session = slot.as_mut().ok_or(SessionError::NoActiveSession)?;
        if session.id != session_id {
            return Err(SessionError::NoActiveSession);
        }
        let error = turn.error;
        let timestamp = turn.timestamp;
        session.push_turn(turn);
        drop(slot);

        self.emit(LifecycleEvent::TurnCompleted {
            session_id,
            error,
            timestamp,
        });
        Ok(())
    }

    /// Feed one raw presence sample through the debouncer.
    ///
    /// A confirmed appearance starts a session when none exists. A confirmed
    /// vanish does not end the session by itself; the idle timeout does.
    pub fn presence_sample(
        &self,
        present: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<PresenceEdge>, SessionError> {
        let edge = {
            let mut debouncer = self
                .debouncer
                .lock()
                .map_err(|e| SessionError::LockPoisoned(e.to_string()))?;
            debouncer.sample(present, now)
        };

        match edge {
            Some(PresenceEdge::Appeared) => {
                self.presence.store(true, Ordering::SeqCst);
                self.emit(LifecycleEvent::PresenceDetected { timestamp: now });
                match self.start_session(now) {
                    Ok(_) => {}
                    // A visitor stepping back into range mid-session is activity.
                    Err(SessionError::AlreadyActive) => self.record_activity(now)?,
                    Err(e) => return Err(e),
                }
            }
            Some(PresenceEdge::Vanished) => {
                self.presence.store(false, Ordering::SeqCst);
                self.emit(LifecycleEvent::PresenceLost { timestamp: now });
            }
            None => {}
        }
        Ok(edge)
    }

    /// The debounced presence value.
    pub fn presence(&self) -> bool {
        self.presence.load(Ordering::SeqCst)
    }

    /// End the session if it has been idle past the timeout.
    ///
    /// The timeout only fires while presence is absent; a visitor standing
    /// silently in front of the kiosk keeps the session alive.
    pub fn check_idle_timeout(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, SessionError> {
        if self.presence() {
            return Ok(None);
        }

        let expired = {
            let slot = self.lock_slot()?;
            match slot.as_ref() {
                Some(session) => now - session.last_activity_at >= self.idle_timeout,
                None => false,
            }
        };

        if expired {
            Ok(Some(self.end_session(EndReason::IdleTimeout, now)?))
        } else {
            Ok(None)
        }
    }

    fn lock_slot(&self) -> Result<std::sync::MutexGuard<'_, Option<Session>>, SessionError> {
        self.slot
            .lock()
            .map_err(|e| SessionError::LockPoisoned(e.to_string()))
    }

    fn emit(&self, event: LifecycleEvent) {
        // Send fails only when no subscriber exists, which is fine.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("presence", &self.presence())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_turn(error: bool) -> Turn {
        Turn {
            user_text: "question".to_string(),
            response_text: "answer".to_string(),
            retrieved_doc_ids: vec![],
            timestamp: Utc::now(),
            error,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.event_name());
        }
        names
    }

    // ---- lifecycle ----

    #[test]
    fn test_start_session() {
        let manager = SessionManager::new(10, 500);
        let id = manager.start_session(Utc::now()).unwrap();

        assert_eq!(manager.state(), SessionState::Active);
        assert_eq!(manager.current().unwrap().unwrap().id, id);
    }

    #[test]
    fn test_double_start_rejected() {
        let manager = SessionManager::new(10, 500);
        manager.start_session(Utc::now()).unwrap();

        assert!(matches!(
            manager.start_session(Utc::now()),
            Err(SessionError::AlreadyActive)
        ));
    }

    #[test]
    fn test_end_without_session_rejected() {
        let manager = SessionManager::new(10, 500);
        assert!(matches!(
            manager.end_session(EndReason::ManualExit, Utc::now()),
            Err(SessionError::NoActiveSession)
        ));
    }

    #[test]
    fn test_end_session_returns_finalized() {
        let manager = SessionManager::new(10, 500);
        let now = Utc::now();
        let id = manager.start_session(now).unwrap();
        manager.record_turn(id, make_turn(false)).unwrap();

        let ended = manager
            .end_session(EndReason::ManualExit, now + Duration::seconds(5))
            .unwrap();
        assert_eq!(ended.id, id);
        assert_eq!(ended.state, SessionState::Idle);
        assert_eq!(ended.turns.len(), 1);
        assert_eq!(manager.state(), SessionState::Idle);
    }

    #[test]
    fn test_restart_after_end() {
        let manager = SessionManager::new(10, 500);
        let first = manager.start_session(Utc::now()).unwrap();
        manager
            .end_session(EndReason::ManualExit, Utc::now())
            .unwrap();

        let second = manager.start_session(Utc::now()).unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_manual_exit_skips_closing_event() {
        let manager = SessionManager::new(10, 500);
        let mut rx = manager.subscribe();

        manager.start_session(Utc::now()).unwrap();
        manager
            .end_session(EndReason::ManualExit, Utc::now())
            .unwrap();

        let names = drain(&mut rx);
        assert_eq!(names, vec!["session_started", "session_ended"]);
    }

    #[tokio::test]
    async fn test_idle_timeout_announces_closing() {
        let manager = SessionManager::new(10, 500);
        let mut rx = manager.subscribe();
        let now = Utc::now();

        manager.start_session(now).unwrap();
        let ended = manager
            .check_idle_timeout(now + Duration::seconds(10))
            .unwrap()
            .unwrap();
        assert_eq!(ended.state, SessionState::Idle);

        let names = drain(&mut rx);
        assert_eq!(
            names,
            vec!["session_started", "session_closing", "session_ended"]
        );
    }

    // ---- turns and activity ----

    #[test]
    fn test_record_turn_appends() {
        let manager = SessionManager::new(10, 500);
        let id = manager.start_session(Utc::now()).unwrap();

        manager.record_turn(id, make_turn(false)).unwrap();
        manager.record_turn(id, make_turn(true)).unwrap();

        let session = manager.current().unwrap().unwrap();
        assert_eq!(session.turns.len(), 2);
    }

    #[test]
    fn test_record_turn_rejects_stale_session_id() {
        let manager = SessionManager::new(10, 500);
        manager.start_session(Utc::now()).unwrap();

        assert!(matches!(
            manager.record_turn(Uuid::new_v4(), make_turn(false)),
            Err(SessionError::NoActiveSession)
        ));
    }

    #[test]
    fn test_record_activity_updates_last_activity() {
        let manager = SessionManager::new(10, 500);
        let now = Utc::now();
        manager.start_session(now).unwrap();

        let later = now + Duration::seconds(3);
        manager.record_activity(later).unwrap();
        assert_eq!(
            manager.current().unwrap().unwrap().last_activity_at,
            later
        );
    }

    // ---- idle timeout ----

    #[test]
    fn test_idle_timeout_not_yet_elapsed() {
        let manager = SessionManager::new(10, 500);
        let now = Utc::now();
        manager.start_session(now).unwrap();

        let result = manager
            .check_idle_timeout(now + Duration::seconds(9))
            .unwrap();
        assert!(result.is_none());
        assert_eq!(manager.state(), SessionState::Active);
    }

    #[test]
    fn test_idle_timeout_ends_session() {
        let manager = SessionManager::new(10, 500);
        let now = Utc::now();
        manager.start_session(now).unwrap();

        let ended = manager
            .check_idle_timeout(now + Duration::seconds(10))
            .unwrap();
        assert!(ended.is_some());
        assert_eq!(manager.state(), SessionState::Idle);
    }

    #[test]
    fn test_activity_defers_idle_timeout() {
        let manager = SessionManager::new(10, 500);
        let now = Utc::now();
        manager.start_session(now).unwrap();
        manager.record_activity(now + Duration::seconds(8)).unwrap();

        let result = manager
            .check_idle_timeout(now + Duration::seconds(12))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_presence_blocks_idle_timeout() {
        let manager = SessionManager::new(10, 0);
        let now = Utc::now();

        // Confirm presence through the debouncer (zero window: two samples).
        manager.presence_sample(true, now).unwrap();
        manager.presence_sample(true, now).unwrap();
        assert!(manager.presence());
        assert_eq!(manager.state(), SessionState::Active);

        // Idle well past the timeout, but the visitor is still there.
        let result = manager
            .check_idle_timeout(now + Duration::seconds(60))
            .unwrap();
        assert!(result.is_none());
        assert_eq!(manager.state(), SessionState::Active);
    }

    #[test]
    fn test_no_session_idle_check_is_noop() {
        let manager = SessionManager::new(10, 500);
        assert!(manager.check_idle_timeout(Utc::now()).unwrap().is_none());
    }

    // ---- presence ----

    #[tokio::test]
    async fn test_presence_appearance_starts_session() {
        let manager = SessionManager::new(10, 0);
        let mut rx = manager.subscribe();
        let now = Utc::now();

        assert_eq!(manager.presence_sample(true, now).unwrap(), None);
        assert_eq!(
            manager.presence_sample(true, now).unwrap(),
            Some(PresenceEdge::Appeared)
        );

        assert_eq!(manager.state(), SessionState::Active);
        let names = drain(&mut rx);
        assert_eq!(names, vec!["presence_detected", "session_started"]);
    }

    #[tokio::test]
    async fn test_presence_vanish_keeps_session() {
        let manager = SessionManager::new(10, 0);
        let now = Utc::now();

        manager.presence_sample(true, now).unwrap();
        manager.presence_sample(true, now).unwrap();
        manager
            .presence_sample(false, now + Duration::seconds(1))
            .unwrap();
        manager
            .presence_sample(false, now + Duration::seconds(1))
            .unwrap();

        assert!(!manager.presence());
        // The session survives until the idle timeout fires.
        assert_eq!(manager.state(), SessionState::Active);
    }

    #[test]
    fn test_reappearance_mid_session_records_activity() {
        let manager = SessionManager::new(10, 0);
        let now = Utc::now();

        manager.presence_sample(true, now).unwrap();
        manager.presence_sample(true, now).unwrap();

        // Vanish, then reappear much later while the session is still open.
        manager
            .presence_sample(false, now + Duration::seconds(2))
            .unwrap();
        manager
            .presence_sample(false, now + Duration::seconds(2))
            .unwrap();
        let later = now + Duration::seconds(8);
        manager.presence_sample(true, later).unwrap();
        manager.presence_sample(true, later).unwrap();

        assert_eq!(
            manager.current().unwrap().unwrap().last_activity_at,
            later
        );
    }
}
