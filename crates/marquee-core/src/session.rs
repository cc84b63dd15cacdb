//! In-process registry of launched sessions and per-game play statistics.
//!
//! The registry enforces that a session id is never reused while a session
//! with that id is active, and accumulates play time whenever a running
//! session ends by exiting or being stopped.

use crate::lifecycle::validate_transition;
use crate::CoreError;
use chrono::{DateTime, Utc};
use marquee_schema::{ExecutionVariant, LaunchRequest};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Running,
    Exited,
    Stopped,
    Failed,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    /// Game slug, id, or title, whichever is set first.
    pub game: String,
    pub variant: ExecutionVariant,
    pub state: SessionState,
    pub container_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i64>,
    pub error: Option<String>,
}

impl SessionRecord {
    /// Seconds between start and end, once the session has ended.
    pub fn play_time_secs(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_seconds().max(0))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayStats {
    pub sessions: u32,
    pub total_secs: i64,
    pub last_played: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    sessions: BTreeMap<String, SessionRecord>,
    stats: BTreeMap<String, PlayStats>,
    /// Running sessions with an engine stop in flight.
    stopping: BTreeSet<String>,
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

fn transition<'a>(
    sessions: &'a mut BTreeMap<String, SessionRecord>,
    session_id: &str,
    to: SessionState,
) -> Result<&'a mut SessionRecord, CoreError> {
    let record = sessions
        .get_mut(session_id)
        .ok_or_else(|| CoreError::SessionNotFound(session_id.to_owned()))?;
    validate_transition(record.state, to)?;
    record.state = to;
    Ok(record)
}

fn account(stats: &mut BTreeMap<String, PlayStats>, record: &mut SessionRecord) {
    let now = Utc::now();
    record.ended_at = Some(now);
    let entry = stats.entry(record.game.clone()).or_default();
    entry.sessions += 1;
    entry.total_secs += record.play_time_secs().unwrap_or_default();
    entry.last_played = Some(now);
    info!(
        "session {} of {} ended after {}s",
        record.session_id,
        record.game,
        record.play_time_secs().unwrap_or_default()
    );
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, CoreError> {
        self.inner
            .lock()
            .map_err(|e| CoreError::Lock(format!("session registry poisoned: {e}")))
    }

    /// Register a new session in `starting`. Fails while a session with the
    /// same id is still starting or running; finished records are replaced.
    pub fn begin(&self, request: &LaunchRequest) -> Result<SessionRecord, CoreError> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner.sessions.get(&request.session_id) {
            if existing.state.is_active() {
                return Err(CoreError::SessionActive(request.session_id.clone()));
            }
        }
        let game = &request.game;
        let record = SessionRecord {
            session_id: request.session_id.clone(),
            game: game.identifier().unwrap_or(&game.title).to_owned(),
            variant: request.variant(),
            state: SessionState::Starting,
            container_id: None,
            started_at: Utc::now(),
            ended_at: None,
            exit_code: None,
            error: None,
        };
        inner
            .sessions
            .insert(record.session_id.clone(), record.clone());
        debug!("session {} registered", record.session_id);
        Ok(record)
    }

    pub fn mark_running(&self, session_id: &str, container_id: &str) -> Result<(), CoreError> {
        let mut inner = self.lock()?;
        let record = transition(&mut inner.sessions, session_id, SessionState::Running)?;
        record.container_id = Some(container_id.to_owned());
        Ok(())
    }

    /// Failed sessions never count towards play statistics.
    pub fn mark_failed(&self, session_id: &str, reason: &str) -> Result<(), CoreError> {
        let mut inner = self.lock()?;
        let record = transition(&mut inner.sessions, session_id, SessionState::Failed)?;
        record.ended_at = Some(Utc::now());
        record.error = Some(reason.to_owned());
        Ok(())
    }

    /// Note that a stop of a running session was sent to the engine, so an
    /// exit reported meanwhile counts as a stop. Returns `false` when the
    /// session is unknown or not running.
    pub fn request_stop(&self, session_id: &str) -> Result<bool, CoreError> {
        let mut inner = self.lock()?;
        let running = inner
            .sessions
            .get(session_id)
            .is_some_and(|r| r.state == SessionState::Running);
        if running {
            inner.stopping.insert(session_id.to_owned());
        }
        Ok(running)
    }

    /// Forget a stop request the engine did not carry out.
    pub fn cancel_stop(&self, session_id: &str) -> Result<(), CoreError> {
        self.lock()?.stopping.remove(session_id);
        Ok(())
    }

    /// Record a completed user-requested stop. Returns `false` when the
    /// session is unknown or not running, which callers treat as already
    /// stopped.
    pub fn mark_stopped(&self, session_id: &str) -> Result<bool, CoreError> {
        let mut inner = self.lock()?;
        let Inner {
            sessions,
            stats,
            stopping,
        } = &mut *inner;
        stopping.remove(session_id);
        match sessions.get(session_id) {
            Some(record) if record.state == SessionState::Running => {}
            _ => return Ok(false),
        }
        let record = transition(sessions, session_id, SessionState::Stopped)?;
        account(stats, record);
        Ok(true)
    }

    /// Record the exit code reported by the exit monitor. A session that was
    /// stopped first keeps its state and only gains the code; one with a stop
    /// in flight ends as stopped.
    pub fn record_exit(&self, session_id: &str, code: i64) -> Result<(), CoreError> {
        let mut inner = self.lock()?;
        let Inner {
            sessions,
            stats,
            stopping,
        } = &mut *inner;
        let state = sessions
            .get(session_id)
            .map(|r| r.state)
            .ok_or_else(|| CoreError::SessionNotFound(session_id.to_owned()))?;
        if state == SessionState::Stopped {
            if let Some(record) = sessions.get_mut(session_id) {
                if record.exit_code.is_none() {
                    record.exit_code = Some(code);
                }
            }
            return Ok(());
        }
        let to = if stopping.remove(session_id) {
            SessionState::Stopped
        } else {
            SessionState::Exited
        };
        let record = transition(sessions, session_id, to)?;
        record.exit_code = Some(code);
        account(stats, record);
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, CoreError> {
        Ok(self.lock()?.sessions.get(session_id).cloned())
    }

    pub fn list(&self) -> Result<Vec<SessionRecord>, CoreError> {
        Ok(self.lock()?.sessions.values().cloned().collect())
    }

    pub fn active(&self) -> Result<Vec<SessionRecord>, CoreError> {
        Ok(self
            .lock()?
            .sessions
            .values()
            .filter(|r| r.state.is_active())
            .cloned()
            .collect())
    }

    pub fn stats(&self, game: &str) -> Result<Option<PlayStats>, CoreError> {
        Ok(self.lock()?.stats.get(game).cloned())
    }

    pub fn all_stats(&self) -> Result<BTreeMap<String, PlayStats>, CoreError> {
        Ok(self.lock()?.stats.clone())
    }
}
