use crate::engine::{ContainerDetails, ContainerEngine, ContainerFilter, ContainerSummary, EngineError};
use crate::logs;
use crate::monitor::{ExitMonitor, PendingExit};
use crate::spec::{ContainerSpec, DEBUG_LABEL};
use crate::RuntimeError;
use marquee_schema::MarqueeConfig;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub status: String,
    pub running: bool,
    pub created: Option<String>,
    pub exit_code: Option<i64>,
}

impl From<ContainerDetails> for ContainerInfo {
    fn from(details: ContainerDetails) -> Self {
        Self {
            id: details.id,
            name: details.name,
            status: details.status,
            running: details.running,
            created: details.created,
            exit_code: details.exit_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugSession {
    pub info: ContainerInfo,
    /// Command a user runs to get a shell in the container.
    pub exec_hint: String,
}

/// First 12 characters of an engine id, as engine CLIs print them.
pub fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Start, stop, and inspect session containers.
pub struct Lifecycle {
    engine: Arc<dyn ContainerEngine>,
    monitor: ExitMonitor,
    stop_grace_secs: i64,
    cli: String,
    shell: String,
}

impl Lifecycle {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: &MarqueeConfig) -> Self {
        Self {
            monitor: ExitMonitor::new(Arc::clone(&engine)),
            engine,
            stop_grace_secs: config.session.stop_grace_secs,
            cli: config.engine.cli.clone(),
            shell: config.debug.shell.clone(),
        }
    }

    /// Create and start a container that is removed once it exits. The
    /// returned wait was registered before the start.
    pub async fn start(
        &self,
        mut spec: ContainerSpec,
    ) -> Result<(ContainerInfo, PendingExit), RuntimeError> {
        spec.auto_remove = true;
        self.create_and_start(&spec).await
    }

    /// Start a container that idles instead of running the game, for
    /// attaching a shell. It is kept after exit.
    pub async fn start_debug(
        &self,
        mut spec: ContainerSpec,
    ) -> Result<(DebugSession, PendingExit), RuntimeError> {
        spec.entrypoint = Some(vec!["sleep".to_owned(), "infinity".to_owned()]);
        spec.command = Some(Vec::new());
        spec.auto_remove = false;
        spec.tty = true;
        spec.labels.insert(DEBUG_LABEL.to_owned(), "true".to_owned());

        let (info, exit) = self.create_and_start(&spec).await?;
        let exec_hint = format!(
            "{} exec -it {} {}",
            self.cli,
            short_id(&info.id),
            self.shell
        );
        info!("debug container {} ready: {exec_hint}", info.name);
        Ok((DebugSession { info, exec_hint }, exit))
    }

    async fn create_and_start(
        &self,
        spec: &ContainerSpec,
    ) -> Result<(ContainerInfo, PendingExit), RuntimeError> {
        let id = self.engine.create_container(spec).await?;
        debug!("created container {} ({})", spec.name, short_id(&id));
        let exit = self.monitor.arm(&id).await;
        if let Err(e) = self.engine.start_container(&id).await {
            warn!("starting {} failed, removing it: {e}", spec.name);
            exit.abort();
            if let Err(cleanup) = self.engine.remove_container(&id, true).await {
                debug!("cleanup of {} failed: {cleanup}", short_id(&id));
            }
            return Err(e.into());
        }
        info!("started container {} ({})", spec.name, short_id(&id));

        let info = match self.engine.inspect_container(&id).await {
            Ok(details) => details.into(),
            // already exited and auto-removed
            Err(e) if e.is_not_found() => ContainerInfo {
                id,
                name: spec.name.clone(),
                status: "exited".to_owned(),
                running: false,
                created: None,
                exit_code: None,
            },
            Err(e) => {
                exit.abort();
                return Err(e.into());
            }
        };
        Ok((info, exit))
    }

    /// Stop gracefully. Containers that are gone or already stopped count
    /// as stopped.
    pub async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        match self.engine.stop_container(id, self.stop_grace_secs).await {
            Ok(()) => {
                info!("stopped container {}", short_id(id));
                Ok(())
            }
            Err(EngineError::NotFound(_)) => {
                debug!("container {id} already gone");
                Ok(())
            }
            Err(EngineError::NotModified(_)) => {
                debug!("container {id} already stopped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Force-remove a container, ignoring ones that are already gone.
    pub async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        match self.engine.remove_container(id, true).await {
            Ok(()) | Err(EngineError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn logs(&self, id: &str, tail: usize) -> Result<String, RuntimeError> {
        let chunks = self.engine.container_logs(id, tail).await?;
        Ok(logs::render(&chunks))
    }

    pub async fn exists(&self, id: &str) -> Result<bool, RuntimeError> {
        match self.engine.inspect_container(id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Fresh engine view of a container.
    pub async fn status(&self, id: &str) -> Result<ContainerInfo, RuntimeError> {
        Ok(self.engine.inspect_container(id).await?.into())
    }

    /// Containers whose name starts with `prefix`.
    pub async fn list(&self, prefix: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
        Ok(self
            .engine
            .list_containers(&ContainerFilter::NamePrefix(prefix.to_owned()))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{LogChunk, LogStream};
    use crate::mock::MockEngine;

    fn lifecycle() -> (Arc<MockEngine>, Lifecycle) {
        let engine = Arc::new(MockEngine::new());
        let lifecycle = Lifecycle::new(engine.clone(), &MarqueeConfig::default());
        (engine, lifecycle)
    }

    #[test]
    fn short_ids() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }

    #[tokio::test]
    async fn start_then_status() {
        let (engine, lifecycle) = lifecycle();
        let (info, exit) = lifecycle
            .start(ContainerSpec::new("marquee-s1", "img"))
            .await
            .unwrap();
        assert!(info.running);
        assert_eq!(info.name, "marquee-s1");
        assert!(info.created.is_some());
        assert!(engine.spec_of(&info.id).unwrap().auto_remove);
        assert!(lifecycle.exists(&info.id).await.unwrap());

        engine.exit(&info.id, 0);
        assert!(!lifecycle.exists(&info.id).await.unwrap());
        assert_eq!(exit.code().await, 0);
    }

    #[tokio::test]
    async fn crash_on_start_keeps_exit_code() {
        let (engine, lifecycle) = lifecycle();
        engine.exit_on_start("marquee-crash", 3);
        let (info, exit) = lifecycle
            .start(ContainerSpec::new("marquee-crash", "img"))
            .await
            .unwrap();
        assert!(!info.running);
        assert_eq!(info.status, "exited");
        assert!(engine.container_ids().is_empty());
        assert_eq!(exit.code().await, 3);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (_engine, lifecycle) = lifecycle();
        lifecycle.stop("never-started").await.unwrap();
        lifecycle.stop("never-started").await.unwrap();

        let (info, _exit) = lifecycle
            .start(ContainerSpec::new("marquee-s2", "img"))
            .await
            .unwrap();
        lifecycle.stop(&info.id).await.unwrap();
        lifecycle.stop(&info.id).await.unwrap();
    }

    #[tokio::test]
    async fn stop_of_exited_kept_container_succeeds() {
        let (engine, lifecycle) = lifecycle();
        let (session, exit) = lifecycle
            .start_debug(ContainerSpec::new("marquee-d", "img"))
            .await
            .unwrap();
        engine.exit(&session.info.id, 0);
        assert_eq!(exit.code().await, 0);
        // the container still exists but is not running: not-modified
        lifecycle.stop(&session.info.id).await.unwrap();
        assert!(lifecycle.exists(&session.info.id).await.unwrap());
    }

    #[tokio::test]
    async fn debug_session_idles_and_is_kept() {
        let (engine, lifecycle) = lifecycle();
        let mut spec = ContainerSpec::new("marquee-dbg", "img");
        spec.command = Some(vec!["wine".to_owned(), "game.exe".to_owned()]);
        let (session, _exit) = lifecycle.start_debug(spec).await.unwrap();

        let created = engine.spec_of(&session.info.id).unwrap();
        assert_eq!(
            created.entrypoint,
            Some(vec!["sleep".to_owned(), "infinity".to_owned()])
        );
        assert_eq!(created.command, Some(Vec::new()));
        assert!(!created.auto_remove);
        assert_eq!(created.labels[DEBUG_LABEL], "true");
        assert_eq!(
            session.exec_hint,
            format!("docker exec -it {} /bin/bash", short_id(&session.info.id))
        );
    }

    #[tokio::test]
    async fn duplicate_session_name_is_rejected() {
        let (engine, lifecycle) = lifecycle();
        let spec = ContainerSpec::new("marquee-s3", "img");
        let (first, _exit) = lifecycle.start(spec.clone()).await.unwrap();
        // second create with the same name conflicts before anything starts
        assert!(lifecycle.start(spec).await.is_err());
        assert_eq!(engine.container_ids(), vec![first.id]);
    }

    #[tokio::test]
    async fn logs_render_deduplicated() {
        let (engine, lifecycle) = lifecycle();
        let (info, _exit) = lifecycle
            .start(ContainerSpec::new("marquee-l", "img"))
            .await
            .unwrap();
        engine.push_logs(
            &info.id,
            vec![
                LogChunk::new(LogStream::Stdout, "a\na\n"),
                LogChunk::new(LogStream::Stderr, "b\n"),
            ],
        );
        assert_eq!(lifecycle.logs(&info.id, 100).await.unwrap(), "a\nb");
    }

    #[tokio::test]
    async fn list_by_prefix() {
        let (_engine, lifecycle) = lifecycle();
        lifecycle
            .start(ContainerSpec::new("marquee-a", "img"))
            .await
            .unwrap();
        lifecycle
            .start(ContainerSpec::new("other-b", "img"))
            .await
            .unwrap();
        let listed = lifecycle.list("marquee-").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].names, vec!["marquee-a"]);
    }
}
