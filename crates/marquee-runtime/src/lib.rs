//! Container execution layer for Marquee sessions.
//!
//! This crate implements everything between a validated launch request and a
//! running container: the pluggable `ContainerEngine` trait with a bollard
//! backed Docker/Podman engine and an in-memory mock, host path translation for
//! nested container deployments, display/audio/GPU passthrough resolution, the
//! shared session volume, per-variant launch spec construction, lifecycle
//! control, log rendering, and detached exit monitoring.

pub mod docker;
pub mod engine;
pub mod host;
pub mod hostpath;
pub mod launch;
pub mod lifecycle;
pub mod logs;
pub mod mock;
pub mod monitor;
pub mod spec;
pub mod volume;

pub use engine::{
    select_engine, ContainerDetails, ContainerEngine, ContainerFilter, ContainerSummary,
    EngineError, LogChunk, LogStream, VolumeDetails, WaitCondition,
};
pub use host::{resolve_display, DisplayConfiguration, DisplayMode, HostProbe};
pub use hostpath::{HostPathTranslator, PathMapping};
pub use launch::{
    prefix_dir, windows_to_prefix_path, LaunchBuilder, LaunchContext, WINEPREFIX_TARGET,
};
pub use lifecycle::{short_id, ContainerInfo, DebugSession, Lifecycle};
pub use mock::MockEngine;
pub use monitor::{ExitMonitor, PendingExit, UNKNOWN_EXIT_CODE};
pub use spec::{ContainerSpec, DeviceSpec, IpcMode, MountSource, MountSpec};
pub use volume::{SessionVolume, VolumeBinding, BOUND_TO_LABEL};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("container engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("session volume '{volume}' is still in use: {reason}")]
    VolumeConflict { volume: String, reason: String },
    #[error("container engine '{0}' is not reachable")]
    EngineUnavailable(String),
    #[error("invalid launch request: {0}")]
    InvalidRequest(String),
}
