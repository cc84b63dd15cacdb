use crate::engine::ContainerEngine;
use crate::host::HostProbe;
use marquee_schema::PathsSection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// How paths seen by this process map onto the engine host's filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum PathMapping {
    /// Process paths are host paths.
    Identity,
    /// Paths under `container` live under `host` on the engine host.
    Prefix { container: PathBuf, host: PathBuf },
}

impl PathMapping {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match self {
            Self::Identity => path.to_path_buf(),
            Self::Prefix { container, host } => match path.strip_prefix(container) {
                Ok(rest) if rest.as_os_str().is_empty() => host.clone(),
                Ok(rest) => host.join(rest),
                Err(_) => path.to_path_buf(),
            },
        }
    }
}

/// Translates this process's paths to engine-host paths.
///
/// Detection runs at most once per translator; every failure degrades to
/// [`PathMapping::Identity`] with a warning.
pub struct HostPathTranslator {
    engine: Arc<dyn ContainerEngine>,
    probe: HostProbe,
    mount_point: PathBuf,
    host_override: Option<PathBuf>,
    mapping: OnceCell<PathMapping>,
}

impl HostPathTranslator {
    pub fn new(engine: Arc<dyn ContainerEngine>, probe: HostProbe, paths: &PathsSection) -> Self {
        Self {
            engine,
            probe,
            mount_point: paths.self_mount_point.clone(),
            host_override: paths.host_path_override.clone(),
            mapping: OnceCell::new(),
        }
    }

    pub async fn mapping(&self) -> &PathMapping {
        self.mapping.get_or_init(|| self.detect()).await
    }

    pub async fn resolve(&self, path: &Path) -> PathBuf {
        self.mapping().await.resolve(path)
    }

    async fn detect(&self) -> PathMapping {
        if let Some(host) = &self.host_override {
            debug!(
                "host path override: {} -> {}",
                self.mount_point.display(),
                host.display()
            );
            return PathMapping::Prefix {
                container: self.mount_point.clone(),
                host: host.clone(),
            };
        }
        if !self.probe.is_containerized() {
            debug!("not running in a container, host paths are process paths");
            return PathMapping::Identity;
        }
        let Some(identity) = self.probe.container_identity() else {
            warn!("running in a container but its identity is unknown; using paths as-is");
            return PathMapping::Identity;
        };

        let details = match self.engine.inspect_container(&identity).await {
            Ok(details) => details,
            Err(e) => {
                warn!("cannot inspect own container '{identity}': {e}; using paths as-is");
                return PathMapping::Identity;
            }
        };
        let wanted = self.mount_point.to_string_lossy();
        match details
            .mounts
            .into_iter()
            .find(|m| m.destination.trim_end_matches('/') == wanted.trim_end_matches('/'))
        {
            Some(mount) => {
                debug!(
                    "{} is mounted from host path {}",
                    self.mount_point.display(),
                    mount.source
                );
                PathMapping::Prefix {
                    container: self.mount_point.clone(),
                    host: PathBuf::from(mount.source),
                }
            }
            None => {
                warn!(
                    "own container has no mount at {}; using paths as-is",
                    self.mount_point.display()
                );
                PathMapping::Identity
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MountPointInfo;
    use crate::mock::MockEngine;

    fn paths() -> PathsSection {
        PathsSection::default()
    }

    fn containerized_probe(root: &tempfile::TempDir) -> HostProbe {
        std::fs::write(root.path().join(".dockerenv"), b"").unwrap();
        HostProbe::new(root.path()).with_var("HOSTNAME", "self")
    }

    #[test]
    fn prefix_mapping_rewrites_paths_under_mount() {
        let mapping = PathMapping::Prefix {
            container: PathBuf::from("/data"),
            host: PathBuf::from("/mnt/storage"),
        };
        assert_eq!(
            mapping.resolve(Path::new("/data/library/foo")),
            PathBuf::from("/mnt/storage/library/foo")
        );
        assert_eq!(
            mapping.resolve(Path::new("/data")),
            PathBuf::from("/mnt/storage")
        );
        // prefix match is per component
        assert_eq!(
            mapping.resolve(Path::new("/database/x")),
            PathBuf::from("/database/x")
        );
    }

    #[tokio::test]
    async fn identity_outside_containers() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new());
        let translator = HostPathTranslator::new(engine.clone(), HostProbe::new(root.path()), &paths());
        assert_eq!(
            translator.resolve(Path::new("/data/library/x")).await,
            PathBuf::from("/data/library/x")
        );
        assert_eq!(engine.inspection_count(), 0);
    }

    #[tokio::test]
    async fn detects_own_mount_once() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new());
        engine.add_foreign_container(
            "self",
            vec![MountPointInfo {
                source: "/srv/marquee".to_owned(),
                destination: "/data".to_owned(),
                volume: None,
            }],
        );
        let translator =
            HostPathTranslator::new(engine.clone(), containerized_probe(&root), &paths());

        let a = translator.resolve(Path::new("/data/library/a")).await;
        let b = translator.resolve(Path::new("/data/installs/b")).await;
        assert_eq!(a, PathBuf::from("/srv/marquee/library/a"));
        assert_eq!(b, PathBuf::from("/srv/marquee/installs/b"));
        assert_eq!(engine.inspection_count(), 1);
    }

    #[tokio::test]
    async fn inspection_failure_falls_back_to_identity() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new());
        let translator =
            HostPathTranslator::new(engine.clone(), containerized_probe(&root), &paths());
        assert_eq!(translator.mapping().await, &PathMapping::Identity);
        // the failed detection is not retried
        translator.resolve(Path::new("/data/x")).await;
        assert_eq!(engine.inspection_count(), 1);
    }

    #[tokio::test]
    async fn override_skips_detection() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new());
        let paths = PathsSection {
            host_path_override: Some(PathBuf::from("/mnt/games")),
            ..PathsSection::default()
        };
        let translator = HostPathTranslator::new(engine.clone(), containerized_probe(&root), &paths);
        assert_eq!(
            translator.resolve(Path::new("/data/library/x")).await,
            PathBuf::from("/mnt/games/library/x")
        );
        assert_eq!(engine.inspection_count(), 0);
    }
}
