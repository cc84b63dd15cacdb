use crate::spec::ContainerSpec;
use crate::RuntimeError;
use async_trait::async_trait;
use marquee_schema::{EngineKind, EngineSection};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Engine failures, classified by the statuses this crate treats specially.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not modified: {0}")]
    NotModified(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("engine API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("engine transport error: {0}")]
    Transport(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountPointInfo {
    pub source: String,
    pub destination: String,
    pub volume: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub status: String,
    pub running: bool,
    pub created: Option<String>,
    pub exit_code: Option<i64>,
    pub mounts: Vec<MountPointInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub state: String,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeDetails {
    pub name: String,
    pub options: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl VolumeDetails {
    /// Host directory a bind-backed local volume points at.
    pub fn device(&self) -> Option<&str> {
        self.options.get("device").map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerFilter {
    /// Containers, running or stopped, that mount the named volume.
    Volume(String),
    /// Containers whose name starts with the prefix.
    NamePrefix(String),
}

/// What a wait blocks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// Return as soon as the container is not running.
    NotRunning,
    /// Return on the next exit, even for a container not started yet.
    NextExit,
}

impl WaitCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotRunning => "not-running",
            Self::NextExit => "next-exit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Unlabelled bytes, possibly still carrying multiplexing frame headers.
    Console,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    pub stream: LogStream,
    pub data: Vec<u8>,
}

impl LogChunk {
    pub fn new(stream: LogStream, data: impl Into<Vec<u8>>) -> Self {
        Self {
            stream,
            data: data.into(),
        }
    }
}

/// The container engine API surface Marquee consumes.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn ping(&self) -> Result<(), EngineError>;

    /// Create a container from `spec` and return its engine id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    async fn stop_container(&self, id: &str, grace_secs: i64) -> Result<(), EngineError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError>;

    /// Block until `condition` holds and return the container's exit code.
    async fn wait_container(&self, id: &str, condition: WaitCondition)
        -> Result<i64, EngineError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, EngineError>;

    async fn container_logs(&self, id: &str, tail: usize) -> Result<Vec<LogChunk>, EngineError>;

    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerSummary>, EngineError>;

    async fn inspect_volume(&self, name: &str) -> Result<VolumeDetails, EngineError>;

    /// Create a local volume bind-backed by `host_dir`.
    async fn create_volume(
        &self,
        name: &str,
        host_dir: &Path,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), EngineError>;

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError>;
}

pub fn select_engine(config: &EngineSection) -> Result<Arc<dyn ContainerEngine>, RuntimeError> {
    match config.kind {
        EngineKind::Docker => Ok(Arc::new(crate::docker::DockerEngine::connect(config)?)),
        EngineKind::Mock => Ok(Arc::new(crate::mock::MockEngine::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_mock_engine() {
        let config = EngineSection {
            kind: EngineKind::Mock,
            ..EngineSection::default()
        };
        let engine = select_engine(&config).unwrap();
        assert_eq!(engine.name(), "mock");
    }

    #[test]
    fn volume_device_lookup() {
        let details = VolumeDetails {
            name: "v".to_owned(),
            options: BTreeMap::from([("device".to_owned(), "/srv/a".to_owned())]),
            labels: BTreeMap::new(),
        };
        assert_eq!(details.device(), Some("/srv/a"));
    }

    #[test]
    fn summary_running_state() {
        let summary = ContainerSummary {
            id: "abc".to_owned(),
            names: vec![],
            state: "Running".to_owned(),
        };
        assert!(summary.is_running());
    }
}
