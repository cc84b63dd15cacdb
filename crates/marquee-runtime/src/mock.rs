use crate::engine::{
    ContainerDetails, ContainerEngine, ContainerFilter, ContainerSummary, EngineError, LogChunk,
    MountPointInfo, VolumeDetails, WaitCondition,
};
use crate::spec::{ContainerSpec, MountSource};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::watch;

/// Exit code reported for containers stopped through the engine (SIGTERM).
const STOPPED_EXIT_CODE: i64 = 143;
/// Exit code reported for running containers removed with force (SIGKILL).
const KILLED_EXIT_CODE: i64 = 137;

struct MockContainer {
    id: String,
    spec: ContainerSpec,
    running: bool,
    started: bool,
    exit_code: Option<i64>,
    created: String,
    logs: Vec<LogChunk>,
    exit_tx: watch::Sender<Option<i64>>,
}

impl MockContainer {
    fn state(&self) -> &'static str {
        match (self.running, self.started) {
            (true, _) => "running",
            (false, true) => "exited",
            (false, false) => "created",
        }
    }
}

struct MockVolume {
    device: PathBuf,
    labels: BTreeMap<String, String>,
}

#[derive(Default)]
struct MockState {
    containers: BTreeMap<String, MockContainer>,
    volumes: BTreeMap<String, MockVolume>,
    pinned_volumes: BTreeSet<String>,
    foreign: HashMap<String, ContainerDetails>,
    exit_on_start: Vec<(String, i64)>,
    history: Vec<ContainerSpec>,
    next_id: u64,
    inspections: usize,
    unreachable: bool,
    failing_stops: bool,
}

impl MockState {
    fn find_key(&self, key: &str) -> Option<String> {
        if self.containers.contains_key(key) {
            return Some(key.to_owned());
        }
        self.containers
            .values()
            .find(|c| c.spec.name == key || (!key.is_empty() && c.id.starts_with(key)))
            .map(|c| c.id.clone())
    }

    fn container_mut(&mut self, key: &str) -> Result<&mut MockContainer, EngineError> {
        let id = self
            .find_key(key)
            .ok_or_else(|| EngineError::NotFound(format!("no such container: {key}")))?;
        self.containers
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("no such container: {key}")))
    }

    /// Mark a container exited, notify waiters, and honour auto-remove.
    fn finish(&mut self, id: &str, code: i64) {
        let remove = match self.containers.get_mut(id) {
            Some(container) => {
                container.running = false;
                container.exit_code = Some(code);
                container.exit_tx.send_replace(Some(code));
                container.spec.auto_remove
            }
            None => false,
        };
        if remove {
            self.containers.remove(id);
        }
    }

    fn volume_users(&self, name: &str) -> Vec<String> {
        self.containers
            .values()
            .filter(|c| c.spec.mounts.iter().any(|m| m.uses_volume(name)))
            .map(|c| c.id.clone())
            .collect()
    }
}

/// In-memory engine used by tests and `engine.kind = "mock"`.
///
/// Containers never exit on their own unless their name matches a rule added
/// with [`MockEngine::exit_on_start`]; tests end them with [`MockEngine::exit`].
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> EngineError {
    EngineError::Transport(format!("mutex poisoned: {e}"))
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockState>, EngineError> {
        self.state.lock().map_err(poisoned)
    }

    /// Simulate the container process exiting with `code`.
    pub fn exit(&self, key: &str, code: i64) -> bool {
        let Ok(mut state) = self.lock() else {
            return false;
        };
        match state.find_key(key) {
            Some(id) => {
                state.finish(&id, code);
                true
            }
            None => false,
        }
    }

    /// Containers whose name starts with `name_prefix` exit with `code` as
    /// soon as they are started.
    pub fn exit_on_start(&self, name_prefix: &str, code: i64) {
        if let Ok(mut state) = self.lock() {
            state.exit_on_start.push((name_prefix.to_owned(), code));
        }
    }

    pub fn push_logs(&self, key: &str, chunks: Vec<LogChunk>) {
        if let Ok(mut state) = self.lock() {
            if let Ok(container) = state.container_mut(key) {
                container.logs.extend(chunks);
            }
        }
    }

    /// Register a container this engine did not create, e.g. the container the
    /// orchestrator itself runs in.
    pub fn add_foreign_container(&self, key: &str, mounts: Vec<MountPointInfo>) {
        if let Ok(mut state) = self.lock() {
            state.foreign.insert(
                key.to_owned(),
                ContainerDetails {
                    id: key.to_owned(),
                    name: key.to_owned(),
                    status: "running".to_owned(),
                    running: true,
                    created: None,
                    exit_code: None,
                    mounts,
                },
            );
        }
    }

    /// Make removal of the volume fail with a conflict no cleanup can clear.
    pub fn pin_volume(&self, name: &str) {
        if let Ok(mut state) = self.lock() {
            state.pinned_volumes.insert(name.to_owned());
        }
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        if let Ok(mut state) = self.lock() {
            state.unreachable = unreachable;
        }
    }

    /// Make every `stop_container` call fail with an engine API error.
    pub fn fail_stops(&self, failing: bool) {
        if let Ok(mut state) = self.lock() {
            state.failing_stops = failing;
        }
    }

    pub fn volume_device(&self, name: &str) -> Option<PathBuf> {
        self.lock()
            .ok()?
            .volumes
            .get(name)
            .map(|v| v.device.clone())
    }

    pub fn volume_names(&self) -> Vec<String> {
        self.lock()
            .map(|s| s.volumes.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.lock()
            .map(|s| s.containers.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn running_count(&self) -> usize {
        self.lock()
            .map(|s| s.containers.values().filter(|c| c.running).count())
            .unwrap_or_default()
    }

    /// Number of `inspect_container` calls served so far.
    pub fn inspection_count(&self) -> usize {
        self.lock().map(|s| s.inspections).unwrap_or_default()
    }

    pub fn spec_of(&self, key: &str) -> Option<ContainerSpec> {
        let state = self.lock().ok()?;
        let id = state.find_key(key)?;
        state.containers.get(&id).map(|c| c.spec.clone())
    }

    /// Every spec ever created, including containers since removed.
    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.lock().map(|s| s.history.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn ping(&self) -> Result<(), EngineError> {
        if self.lock()?.unreachable {
            return Err(EngineError::Transport("mock engine unreachable".to_owned()));
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let mut state = self.lock()?;
        if state.containers.values().any(|c| c.spec.name == spec.name) {
            return Err(EngineError::Conflict(format!(
                "container name '{}' is already in use",
                spec.name
            )));
        }
        state.next_id += 1;
        let id = format!("{:012x}{}", state.next_id, "0".repeat(52));
        let (exit_tx, _) = watch::channel(None);
        state.history.push(spec.clone());
        state.containers.insert(
            id.clone(),
            MockContainer {
                id: id.clone(),
                spec: spec.clone(),
                running: false,
                started: false,
                exit_code: None,
                created: chrono::Utc::now().to_rfc3339(),
                logs: Vec::new(),
                exit_tx,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        let container = state.container_mut(id)?;
        if container.running {
            return Err(EngineError::NotModified(format!("{id} already started")));
        }
        container.running = true;
        container.started = true;
        let (key, name) = (container.id.clone(), container.spec.name.clone());
        let scripted = state
            .exit_on_start
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix.as_str()))
            .map(|(_, code)| *code);
        if let Some(code) = scripted {
            state.finish(&key, code);
        }
        Ok(())
    }

    async fn stop_container(&self, id: &str, _grace_secs: i64) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        if state.failing_stops {
            return Err(EngineError::Api {
                status: 500,
                message: format!("cannot stop {id}: mock failure"),
            });
        }
        let container = state.container_mut(id)?;
        if !container.running {
            return Err(EngineError::NotModified(format!("{id} is not running")));
        }
        let key = container.id.clone();
        state.finish(&key, STOPPED_EXIT_CODE);
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        let container = state.container_mut(id)?;
        if container.running && !force {
            return Err(EngineError::Conflict(format!(
                "cannot remove running container {id}"
            )));
        }
        let key = container.id.clone();
        if container.running {
            container.running = false;
            container.exit_code = Some(KILLED_EXIT_CODE);
            container.exit_tx.send_replace(Some(KILLED_EXIT_CODE));
        }
        state.containers.remove(&key);
        Ok(())
    }

    async fn wait_container(
        &self,
        id: &str,
        condition: WaitCondition,
    ) -> Result<i64, EngineError> {
        let mut rx = {
            let mut state = self.lock()?;
            let container = state.container_mut(id)?;
            if condition == WaitCondition::NotRunning && !container.running {
                return Ok(container.exit_code.unwrap_or(0));
            }
            container.exit_tx.subscribe()
        };
        // the value at subscription counts as seen, so this waits for the next exit
        rx.changed()
            .await
            .map_err(|_| EngineError::Transport(format!("wait on {id} interrupted")))?;
        let code: Option<i64> = *rx.borrow();
        code.ok_or_else(|| EngineError::Transport(format!("no exit status for {id}")))
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, EngineError> {
        let mut state = self.lock()?;
        state.inspections += 1;
        if let Some(details) = state.foreign.get(id) {
            return Ok(details.clone());
        }
        let key = state
            .find_key(id)
            .ok_or_else(|| EngineError::NotFound(format!("no such container: {id}")))?;
        let container = &state.containers[&key];
        let mounts = container
            .spec
            .mounts
            .iter()
            .map(|m| match &m.source {
                MountSource::Bind(path) => MountPointInfo {
                    source: path.to_string_lossy().into_owned(),
                    destination: m.target.to_string_lossy().into_owned(),
                    volume: None,
                },
                MountSource::Volume(name) => MountPointInfo {
                    source: state
                        .volumes
                        .get(name)
                        .map(|v| v.device.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    destination: m.target.to_string_lossy().into_owned(),
                    volume: Some(name.clone()),
                },
            })
            .collect();
        Ok(ContainerDetails {
            id: container.id.clone(),
            name: container.spec.name.clone(),
            status: container.state().to_owned(),
            running: container.running,
            created: Some(container.created.clone()),
            exit_code: container.exit_code,
            mounts,
        })
    }

    async fn container_logs(&self, id: &str, tail: usize) -> Result<Vec<LogChunk>, EngineError> {
        let mut state = self.lock()?;
        let logs = &state.container_mut(id)?.logs;
        let skip = logs.len().saturating_sub(tail);
        Ok(logs[skip..].to_vec())
    }

    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerSummary>, EngineError> {
        let state = self.lock()?;
        Ok(state
            .containers
            .values()
            .filter(|c| match filter {
                ContainerFilter::Volume(name) => c.spec.mounts.iter().any(|m| m.uses_volume(name)),
                ContainerFilter::NamePrefix(prefix) => c.spec.name.starts_with(prefix.as_str()),
            })
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![c.spec.name.clone()],
                state: c.state().to_owned(),
            })
            .collect())
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeDetails, EngineError> {
        let state = self.lock()?;
        let volume = state
            .volumes
            .get(name)
            .ok_or_else(|| EngineError::NotFound(format!("no such volume: {name}")))?;
        Ok(VolumeDetails {
            name: name.to_owned(),
            options: BTreeMap::from([
                ("type".to_owned(), "none".to_owned()),
                ("o".to_owned(), "bind".to_owned()),
                (
                    "device".to_owned(),
                    volume.device.to_string_lossy().into_owned(),
                ),
            ]),
            labels: volume.labels.clone(),
        })
    }

    async fn create_volume(
        &self,
        name: &str,
        host_dir: &Path,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        if state.volumes.contains_key(name) {
            return Err(EngineError::Conflict(format!(
                "volume '{name}' already exists"
            )));
        }
        state.volumes.insert(
            name.to_owned(),
            MockVolume {
                device: host_dir.to_path_buf(),
                labels: labels.clone(),
            },
        );
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        if !state.volumes.contains_key(name) {
            return Err(EngineError::NotFound(format!("no such volume: {name}")));
        }
        if state.pinned_volumes.contains(name) {
            return Err(EngineError::Conflict(format!("volume '{name}' is pinned")));
        }
        let users = state.volume_users(name);
        if !users.is_empty() {
            return Err(EngineError::Conflict(format!(
                "volume '{name}' is in use by {}",
                users.join(", ")
            )));
        }
        state.volumes.remove(name);
        Ok(())
    }
}
