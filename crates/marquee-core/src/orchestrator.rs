use crate::concurrency::{PrefixLock, PREFIX_LOCK_FILE};
use crate::prefix::{
    discover_scripts, is_imported, regedit_spec, run_to_completion, transpile_scripts,
    write_marker, PrefixSetupReport,
};
use crate::session::{SessionRecord, SessionRegistry};
use crate::CoreError;
use marquee_runtime::{
    prefix_dir, resolve_display, select_engine, ContainerEngine, ContainerInfo, ContainerSpec,
    DebugSession, DisplayConfiguration, DisplayMode, EngineError, HostPathTranslator, HostProbe,
    LaunchBuilder, LaunchContext, Lifecycle, PathMapping, PendingExit, RuntimeError, SessionVolume,
    VolumeBinding,
};
use marquee_schema::{ExecutionVariant, LaunchRequest, MarqueeConfig, RequestError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LaunchMode {
    #[default]
    Normal,
    /// Start an idle container to attach a shell to instead of the game.
    Debug,
}

/// Result of a successful launch.
pub struct LaunchOutcome {
    pub session: SessionRecord,
    pub container: ContainerInfo,
    pub debug: Option<DebugSession>,
    pub prefix_setup: Option<PrefixSetupReport>,
    /// Completes once the exit has been recorded in the session registry.
    pub exit_watch: JoinHandle<()>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub container_id: String,
    pub state: String,
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoctorReport {
    pub engine: String,
    pub engine_reachable: bool,
    pub engine_error: Option<String>,
    pub display: DisplayMode,
    pub gpu: bool,
    pub containerized: bool,
    pub path_mapping: Option<PathMapping>,
    pub session_volume: Option<VolumeBinding>,
}

/// Central coordinator for game sessions.
///
/// Holds the engine handle, the cached host path mapping, and the session
/// registry, and is passed by reference wherever a launch or lifecycle
/// operation runs. Native launches share one session volume, so the
/// bind-create-start sequence for them runs behind a single async gate;
/// Wine launches do not take it.
pub struct Orchestrator {
    config: MarqueeConfig,
    engine: Arc<dyn ContainerEngine>,
    probe: HostProbe,
    translator: HostPathTranslator,
    lifecycle: Lifecycle,
    volume: SessionVolume,
    sessions: Arc<SessionRegistry>,
    native_gate: Mutex<()>,
}

impl Orchestrator {
    pub fn new(config: MarqueeConfig, engine: Arc<dyn ContainerEngine>, probe: HostProbe) -> Self {
        let translator = HostPathTranslator::new(Arc::clone(&engine), probe.clone(), &config.paths);
        let lifecycle = Lifecycle::new(Arc::clone(&engine), &config);
        let volume = SessionVolume::new(Arc::clone(&engine), &config.session);
        Self {
            config,
            engine,
            probe,
            translator,
            lifecycle,
            volume,
            sessions: Arc::new(SessionRegistry::new()),
            native_gate: Mutex::new(()),
        }
    }

    /// Validate `config`, connect to its engine, and probe the live process.
    pub fn from_config(config: MarqueeConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let engine = select_engine(&config.engine)?;
        debug!("using {} engine", engine.name());
        Ok(Self::new(config, engine, HostProbe::from_process()))
    }

    pub fn config(&self) -> &MarqueeConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn container_name(&self, session_id: &str) -> String {
        format!("{}{session_id}", self.config.session.container_prefix)
    }

    /// Display, audio, and GPU passthrough as the next launch would get it.
    pub fn display(&self) -> DisplayConfiguration {
        resolve_display(&self.probe, &self.config.audio)
    }

    /// Build the container spec for `request` without touching the engine
    /// beyond host path detection.
    pub async fn plan(&self, request: &LaunchRequest) -> Result<ContainerSpec, CoreError> {
        let paths = self.translator.mapping().await;
        let display = self.display();
        let ctx = LaunchContext {
            config: &self.config,
            paths,
            display: &display,
        };
        Ok(LaunchBuilder::new(ctx).build(request)?)
    }

    /// Launch a session and start watching for its exit.
    ///
    /// The session id is reserved for the duration of the call; failures
    /// leave a `failed` record behind and free the id again.
    pub async fn launch(
        &self,
        request: &LaunchRequest,
        mode: LaunchMode,
    ) -> Result<LaunchOutcome, CoreError> {
        request.validate()?;
        self.sessions.begin(request)?;
        info!(
            "launching session {} ({} {})",
            request.session_id,
            request.variant(),
            request.game.title
        );

        match self.start_session(request, mode).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(mark) = self.sessions.mark_failed(&request.session_id, &e.to_string()) {
                    warn!("could not record failure of {}: {mark}", request.session_id);
                }
                Err(e)
            }
        }
    }

    async fn start_session(
        &self,
        request: &LaunchRequest,
        mode: LaunchMode,
    ) -> Result<LaunchOutcome, CoreError> {
        let prefix_setup = match request.variant() {
            ExecutionVariant::Wine => Some(self.setup_prefix(request).await?),
            ExecutionVariant::Native => None,
        };
        let spec = self.plan(request).await?;

        let (container, debug, exit) = match spec.volume_source.clone() {
            Some(dir) => {
                let _gate = self.native_gate.lock().await;
                self.volume.bind_to(&self.translator, &dir).await?;
                self.start_container(spec, mode).await?
            }
            None => self.start_container(spec, mode).await?,
        };

        let session_id = request.session_id.clone();
        self.sessions.mark_running(&session_id, &container.id)?;
        let registry = Arc::clone(&self.sessions);
        let exit_watch = exit.watch(move |code| registry.record_exit(&session_id, code));

        let session = self
            .sessions
            .get(&request.session_id)?
            .ok_or_else(|| CoreError::SessionNotFound(request.session_id.clone()))?;
        Ok(LaunchOutcome {
            session,
            container,
            debug,
            prefix_setup,
            exit_watch,
        })
    }

    async fn start_container(
        &self,
        spec: ContainerSpec,
        mode: LaunchMode,
    ) -> Result<(ContainerInfo, Option<DebugSession>, PendingExit), CoreError> {
        match mode {
            LaunchMode::Normal => {
                let (info, exit) = self.lifecycle.start(spec).await?;
                Ok((info, None, exit))
            }
            LaunchMode::Debug => {
                let (session, exit) = self.lifecycle.start_debug(spec).await?;
                Ok((session.info.clone(), Some(session), exit))
            }
        }
    }

    /// Stop a session's container. Unknown and already stopped sessions
    /// succeed. The session stays running if the engine refuses the stop.
    pub async fn stop(&self, session_id: &str) -> Result<(), CoreError> {
        let tracked = self.sessions.request_stop(session_id)?;
        if let Err(e) = self.lifecycle.stop(&self.container_name(session_id)).await {
            if tracked {
                if let Err(cancel) = self.sessions.cancel_stop(session_id) {
                    warn!("could not clear stop request of {session_id}: {cancel}");
                }
            }
            return Err(e.into());
        }
        if self.sessions.mark_stopped(session_id)? {
            debug!("session {session_id} marked stopped");
        }
        Ok(())
    }

    pub async fn logs(&self, session_id: &str, tail: usize) -> Result<String, CoreError> {
        self.lifecycle
            .logs(&self.container_name(session_id), tail)
            .await
            .map_err(|e| not_found_as_session(e, session_id))
    }

    /// Fresh engine view of a session's container.
    pub async fn status(&self, session_id: &str) -> Result<ContainerInfo, CoreError> {
        self.lifecycle
            .status(&self.container_name(session_id))
            .await
            .map_err(|e| not_found_as_session(e, session_id))
    }

    /// Session containers the engine knows about, including ones started by
    /// other processes. Prefix setup containers are left out.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, CoreError> {
        let prefix = &self.config.session.container_prefix;
        let setup_prefix = format!("{prefix}regedit-");
        let containers = self.lifecycle.list(prefix).await?;
        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let name = c.names.iter().find(|n| n.starts_with(prefix.as_str()))?;
                if name.starts_with(&setup_prefix) {
                    return None;
                }
                Some(SessionSummary {
                    session_id: name[prefix.len()..].to_owned(),
                    running: c.is_running(),
                    container_id: c.id.clone(),
                    state: c.state.clone(),
                })
            })
            .collect())
    }

    /// Import a Wine game's registry scripts into its prefix, once.
    ///
    /// Creates the prefix if needed and holds a cross-process lock on it for
    /// the whole import. Nothing is recorded while the install directory is
    /// missing, so a later launch retries.
    pub async fn setup_prefix(&self, request: &LaunchRequest) -> Result<PrefixSetupReport, CoreError> {
        if request.variant() != ExecutionVariant::Wine {
            return Err(RuntimeError::InvalidRequest(format!(
                "prefix setup applies to wine games, '{}' is {}",
                request.game.title,
                request.variant()
            ))
            .into());
        }
        let identifier = request
            .game
            .identifier()
            .ok_or(RequestError::MissingIdentifier)?;
        let prefix = prefix_dir(&self.config.paths.install_root, identifier);
        std::fs::create_dir_all(&prefix)?;

        let lock_path = prefix.join(PREFIX_LOCK_FILE);
        let _lock = tokio::task::spawn_blocking(move || PrefixLock::acquire(&lock_path))
            .await
            .map_err(|e| CoreError::Lock(format!("prefix lock task failed: {e}")))??;

        let mut report = PrefixSetupReport {
            prefix: prefix.clone(),
            ..PrefixSetupReport::default()
        };
        if is_imported(&prefix) {
            debug!("registry already imported into {}", prefix.display());
            report.already_done = true;
            return Ok(report);
        }
        let Some(scripts) = discover_scripts(&prefix, &request.game, &self.config)? else {
            return Ok(report);
        };
        report.reg_files = transpile_scripts(&prefix, &scripts)?;
        report.scripts = scripts;

        if !report.reg_files.is_empty() {
            let host_prefix = self.translator.resolve(&prefix).await;
            for reg_file in &report.reg_files {
                let spec = regedit_spec(&self.config, request, identifier, &host_prefix, reg_file);
                let code = run_to_completion(self.engine.as_ref(), &spec).await?;
                if code != 0 {
                    return Err(CoreError::SetupFailed(format!(
                        "importing {} exited with code {code}",
                        reg_file.display()
                    )));
                }
            }
            report.imported = true;
            info!(
                "imported {} registry file(s) into {}",
                report.reg_files.len(),
                prefix.display()
            );
        }
        write_marker(&prefix)?;
        Ok(report)
    }

    /// Engine reachability, display detection, and path mapping in one
    /// report. Never fails; problems are reported in the fields.
    pub async fn doctor(&self) -> DoctorReport {
        let display = self.display();
        let mut report = DoctorReport {
            engine: self.engine.name().to_owned(),
            engine_reachable: false,
            engine_error: None,
            display: display.mode,
            gpu: !display.devices.is_empty(),
            containerized: self.probe.is_containerized(),
            path_mapping: None,
            session_volume: None,
        };
        if let Err(e) = self.engine.ping().await {
            report.engine_error = Some(e.to_string());
            return report;
        }
        report.engine_reachable = true;
        report.path_mapping = Some(self.translator.mapping().await.clone());
        match self.volume.current_binding().await {
            Ok(binding) => report.session_volume = binding,
            Err(e) => debug!("session volume inspection failed: {e}"),
        }
        report
    }
}

fn not_found_as_session(error: RuntimeError, session_id: &str) -> CoreError {
    match error {
        RuntimeError::Engine(EngineError::NotFound(_)) => {
            CoreError::SessionNotFound(session_id.to_owned())
        }
        other => other.into(),
    }
}
