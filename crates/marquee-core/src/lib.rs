//! Session orchestration for Marquee.
//!
//! The [`Orchestrator`] ties the runtime layer together: it validates launch
//! requests, runs first-time Wine prefix setup, serializes native launches
//! around the shared session volume, starts containers, and records each
//! session's lifecycle and play time in a [`SessionRegistry`].

pub mod concurrency;
pub mod lifecycle;
pub mod orchestrator;
pub mod prefix;
pub mod session;

pub use concurrency::{PrefixLock, PREFIX_LOCK_FILE};
pub use lifecycle::validate_transition;
pub use orchestrator::{DoctorReport, LaunchMode, LaunchOutcome, Orchestrator, SessionSummary};
pub use prefix::{prefix_shortcuts, PrefixSetupReport, ShortcutTarget, REGISTRY_MARKER};
pub use session::{PlayStats, SessionRecord, SessionRegistry, SessionState};

use marquee_runtime::RuntimeError;
use marquee_schema::{ConfigError, RequestError};
use marquee_setup::SetupError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("request error: {0}")]
    Request(#[from] RequestError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("setup error: {0}")]
    Setup(#[from] SetupError),
    #[error("invalid session state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("session '{0}' is already active")]
    SessionActive(String),
    #[error("no such session: {0}")]
    SessionNotFound(String),
    #[error("prefix setup failed: {0}")]
    SetupFailed(String),
    #[error("lock error: {0}")]
    Lock(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
