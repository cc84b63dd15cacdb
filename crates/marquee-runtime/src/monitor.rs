use crate::engine::{ContainerEngine, EngineError, WaitCondition};
use std::fmt::Display;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Exit code reported when the engine could not tell how a container ended.
pub const UNKNOWN_EXIT_CODE: i64 = -1;

/// An engine wait registered for a container's next exit.
///
/// Arm it before the container starts: an auto-removed container that exits
/// at once is gone before a wait issued afterwards reaches the engine.
pub struct PendingExit {
    id: String,
    wait: JoinHandle<Result<i64, EngineError>>,
}

impl PendingExit {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Drop the wait, e.g. when the container never started.
    pub fn abort(self) {
        self.wait.abort();
    }

    /// Wait in the background and call `on_exit` once with the exit code.
    /// Callback errors are logged.
    pub fn watch<F, E>(self, on_exit: F) -> JoinHandle<()>
    where
        F: FnOnce(i64) -> Result<(), E> + Send + 'static,
        E: Display,
    {
        tokio::spawn(async move {
            let id = self.id.clone();
            let code = self.code().await;
            debug!("container {id} exited with code {code}");
            if let Err(e) = on_exit(code) {
                warn!("exit handler for container {id} failed: {e}");
            }
        })
    }

    /// Resolve to the exit code, or [`UNKNOWN_EXIT_CODE`] if the wait failed.
    pub async fn code(self) -> i64 {
        match self.wait.await {
            Ok(Ok(code)) => code,
            Ok(Err(e)) => {
                warn!("waiting on container {} failed: {e}", self.id);
                UNKNOWN_EXIT_CODE
            }
            Err(e) => {
                warn!("wait task for container {} failed: {e}", self.id);
                UNKNOWN_EXIT_CODE
            }
        }
    }
}

/// Registers engine waits whose results feed detached exit watchers.
#[derive(Clone)]
pub struct ExitMonitor {
    engine: Arc<dyn ContainerEngine>,
}

impl ExitMonitor {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Register a wait for the next exit of the created container `id`.
    pub async fn arm(&self, id: &str) -> PendingExit {
        let engine = Arc::clone(&self.engine);
        let wait_id = id.to_owned();
        let wait = tokio::spawn(async move {
            engine
                .wait_container(&wait_id, WaitCondition::NextExit)
                .await
        });
        // let the wait task issue its request before the caller starts the container
        tokio::task::yield_now().await;
        PendingExit {
            id: id.to_owned(),
            wait,
        }
    }
}
