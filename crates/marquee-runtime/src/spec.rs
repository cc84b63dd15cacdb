use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SESSION_LABEL: &str = "marquee.session";
pub const GAME_LABEL: &str = "marquee.game";
pub const VARIANT_LABEL: &str = "marquee.variant";
pub const DEBUG_LABEL: &str = "marquee.debug";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "source")]
pub enum MountSource {
    Bind(PathBuf),
    Volume(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountSpec {
    pub source: MountSource,
    pub target: PathBuf,
    pub read_only: bool,
}

impl MountSpec {
    pub fn bind(source: impl Into<PathBuf>, target: impl Into<PathBuf>, read_only: bool) -> Self {
        Self {
            source: MountSource::Bind(source.into()),
            target: target.into(),
            read_only,
        }
    }

    pub fn volume(name: &str, target: impl Into<PathBuf>, read_only: bool) -> Self {
        Self {
            source: MountSource::Volume(name.to_owned()),
            target: target.into(),
            read_only,
        }
    }

    pub fn uses_volume(&self, name: &str) -> bool {
        matches!(&self.source, MountSource::Volume(v) if v == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSpec {
    pub host: PathBuf,
    pub container: PathBuf,
    pub permissions: String,
}

impl DeviceSpec {
    pub fn passthrough(path: impl AsRef<Path>) -> Self {
        Self {
            host: path.as_ref().to_path_buf(),
            container: path.as_ref().to_path_buf(),
            permissions: "rwm".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IpcMode {
    Host,
    Private,
}

impl IpcMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Private => "private",
        }
    }
}

/// Everything the engine needs to create one session container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub entrypoint: Option<Vec<String>>,
    pub command: Option<Vec<String>>,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<MountSpec>,
    pub devices: Vec<DeviceSpec>,
    pub working_dir: Option<String>,
    pub ipc_mode: Option<IpcMode>,
    pub security_opts: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub auto_remove: bool,
    pub tty: bool,
    /// Directory the session volume must point at before this spec is started.
    pub volume_source: Option<PathBuf>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            entrypoint: None,
            command: None,
            env: Vec::new(),
            mounts: Vec::new(),
            devices: Vec::new(),
            working_dir: None,
            ipc_mode: None,
            security_opts: Vec::new(),
            labels: BTreeMap::new(),
            auto_remove: true,
            tty: false,
            volume_source: None,
        }
    }

    /// Set an environment variable, replacing an earlier assignment in place.
    pub fn set_env(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.env.iter_mut().find(|(k, _)| k == key) {
            value.clone_into(&mut entry.1);
        } else {
            self.env.push((key.to_owned(), value.to_owned()));
        }
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn uses_session_volume(&self) -> bool {
        self.volume_source.is_some()
    }

    pub fn env_strings(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}
