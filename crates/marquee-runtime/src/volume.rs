use crate::engine::{ContainerEngine, ContainerFilter, EngineError};
use crate::hostpath::HostPathTranslator;
use crate::RuntimeError;
use marquee_schema::SessionSection;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Label recording which host directory the session volume was created for.
pub const BOUND_TO_LABEL: &str = "marquee.bound-to";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeBinding {
    pub volume: String,
    pub host_dir: PathBuf,
}

/// The single named volume native sessions mount their game through.
///
/// Every bind deletes and recreates the volume, so a binding is only valid
/// for the session that requested it. Callers serialize native launches.
pub struct SessionVolume {
    engine: Arc<dyn ContainerEngine>,
    name: String,
    cleanup_grace_secs: i64,
}

impl SessionVolume {
    pub fn new(engine: Arc<dyn ContainerEngine>, session: &SessionSection) -> Self {
        Self {
            engine,
            name: session.volume_name.clone(),
            cleanup_grace_secs: session.cleanup_grace_secs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Re-point the volume at `dir`, a path as seen by this process.
    pub async fn bind_to(
        &self,
        translator: &HostPathTranslator,
        dir: &Path,
    ) -> Result<VolumeBinding, RuntimeError> {
        let host_dir = translator.resolve(dir).await;
        self.remove_existing().await?;

        let labels = BTreeMap::from([(
            BOUND_TO_LABEL.to_owned(),
            host_dir.to_string_lossy().into_owned(),
        )]);
        self.engine
            .create_volume(&self.name, &host_dir, &labels)
            .await?;
        info!("session volume {} bound to {}", self.name, host_dir.display());
        Ok(VolumeBinding {
            volume: self.name.clone(),
            host_dir,
        })
    }

    /// Where the volume currently points, if it exists.
    pub async fn current_binding(&self) -> Result<Option<VolumeBinding>, RuntimeError> {
        match self.engine.inspect_volume(&self.name).await {
            Ok(details) => Ok(details.device().map(|device| VolumeBinding {
                volume: self.name.clone(),
                host_dir: PathBuf::from(device),
            })),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_existing(&self) -> Result<(), RuntimeError> {
        match self.engine.inspect_volume(&self.name).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                debug!("session volume {} does not exist yet", self.name);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        match self.engine.remove_volume(&self.name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(EngineError::Conflict(reason)) => {
                warn!(
                    "session volume {} is in use ({reason}), clearing its containers",
                    self.name
                );
                self.evict_users().await?;
                match self.engine.remove_volume(&self.name).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_not_found() => Ok(()),
                    Err(e) => Err(RuntimeError::VolumeConflict {
                        volume: self.name.clone(),
                        reason: e.to_string(),
                    }),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stop and force-remove every container, running or not, that mounts
    /// the volume.
    async fn evict_users(&self) -> Result<(), RuntimeError> {
        let users = self
            .engine
            .list_containers(&ContainerFilter::Volume(self.name.clone()))
            .await?;
        for container in users {
            if container.is_running() {
                debug!("stopping {} off the session volume", container.id);
                match self
                    .engine
                    .stop_container(&container.id, self.cleanup_grace_secs)
                    .await
                {
                    Ok(()) | Err(EngineError::NotFound(_) | EngineError::NotModified(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            match self.engine.remove_container(&container.id, true).await {
                Ok(()) | Err(EngineError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
