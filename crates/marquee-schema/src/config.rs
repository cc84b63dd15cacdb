use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MarqueeConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub audio: AudioSection,
    #[serde(default)]
    pub debug: DebugSection,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Docker,
    Mock,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default)]
    pub kind: EngineKind,
    /// Engine API socket, e.g. `unix:///run/user/1000/podman/podman.sock`.
    /// Local defaults (`DOCKER_HOST` or `/var/run/docker.sock`) when unset.
    #[serde(default)]
    pub socket: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Executable named in attach hints handed back to callers.
    #[serde(default = "default_cli")]
    pub cli: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            socket: None,
            timeout_secs: default_timeout_secs(),
            cli: default_cli(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PathsSection {
    /// Root of the game library as seen by this process.
    #[serde(default = "default_library_root")]
    pub library_root: PathBuf,
    /// Root under which per-game Wine prefixes live.
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,
    /// Mount point inspected when this process itself runs in a container.
    #[serde(default = "default_self_mount_point")]
    pub self_mount_point: PathBuf,
    /// Host-side path of `self_mount_point`. Skips engine detection when set.
    #[serde(default)]
    pub host_path_override: Option<PathBuf>,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            library_root: default_library_root(),
            install_root: default_install_root(),
            self_mount_point: default_self_mount_point(),
            host_path_override: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    #[serde(default = "default_volume_name")]
    pub volume_name: String,
    /// Where game files appear inside session containers.
    #[serde(default = "default_mount_target")]
    pub mount_target: String,
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: i64,
    /// Grace period used when force-clearing containers off the session volume.
    #[serde(default = "default_cleanup_grace")]
    pub cleanup_grace_secs: i64,
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            volume_name: default_volume_name(),
            mount_target: default_mount_target(),
            stop_grace_secs: default_stop_grace(),
            cleanup_grace_secs: default_cleanup_grace(),
            container_prefix: default_container_prefix(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AudioSection {
    /// PulseAudio sink passed through as `PULSE_SINK`.
    #[serde(default)]
    pub default_sink: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DebugSection {
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for DebugSection {
    fn default() -> Self {
        Self {
            shell: default_shell(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_cli() -> String {
    "docker".to_owned()
}

fn default_library_root() -> PathBuf {
    PathBuf::from("/data/library")
}

fn default_install_root() -> PathBuf {
    PathBuf::from("/data/installs")
}

fn default_self_mount_point() -> PathBuf {
    PathBuf::from("/data")
}

fn default_volume_name() -> String {
    "marquee-session".to_owned()
}

fn default_mount_target() -> String {
    "/game".to_owned()
}

fn default_stop_grace() -> i64 {
    10
}

fn default_cleanup_grace() -> i64 {
    2
}

fn default_container_prefix() -> String {
    "marquee-".to_owned()
}

fn default_shell() -> String {
    "/bin/bash".to_owned()
}

impl MarqueeConfig {
    /// Load the configuration: explicit path, then `MARQUEE_CONFIG`, then
    /// `~/.config/marquee/marquee.toml`, then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return parse_config_file(path);
        }
        if let Ok(path) = std::env::var("MARQUEE_CONFIG") {
            return parse_config_file(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => parse_config_file(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.volume_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "session.volume_name must not be empty".to_owned(),
            ));
        }
        if !self.session.mount_target.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "session.mount_target must be absolute, got '{}'",
                self.session.mount_target
            )));
        }
        for (key, path) in [
            ("paths.library_root", &self.paths.library_root),
            ("paths.install_root", &self.paths.install_root),
            ("paths.self_mount_point", &self.paths.self_mount_point),
        ] {
            if !path.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be absolute, got '{}'",
                    path.display()
                )));
            }
        }
        if self.session.stop_grace_secs < 0 || self.session.cleanup_grace_secs < 0 {
            return Err(ConfigError::Invalid(
                "grace periods must not be negative".to_owned(),
            ));
        }
        Ok(())
    }
}

pub fn parse_config_str(input: &str) -> Result<MarqueeConfig, ConfigError> {
    let config: MarqueeConfig = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<MarqueeConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}

pub fn default_config_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config/marquee/marquee.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let input = r#"
[engine]
kind = "docker"
socket = "unix:///run/user/1000/podman/podman.sock"
timeout_secs = 30
cli = "podman"

[paths]
library_root = "/srv/library"
install_root = "/srv/installs"
self_mount_point = "/srv"
host_path_override = "/mnt/storage"

[session]
volume_name = "games"
mount_target = "/mnt/game"
stop_grace_secs = 5
cleanup_grace_secs = 1

[audio]
default_sink = "alsa_output.usb"

[debug]
shell = "/bin/sh"
"#;
        let config = parse_config_str(input).expect("should parse");
        assert_eq!(config.engine.cli, "podman");
        assert_eq!(config.engine.timeout_secs, 30);
        assert_eq!(
            config.paths.host_path_override.as_deref(),
            Some(Path::new("/mnt/storage"))
        );
        assert_eq!(config.session.volume_name, "games");
        assert_eq!(config.session.container_prefix, "marquee-");
        assert_eq!(config.audio.default_sink.as_deref(), Some("alsa_output.usb"));
        assert_eq!(config.debug.shell, "/bin/sh");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config_str("").unwrap();
        assert_eq!(config, MarqueeConfig::default());
        assert_eq!(config.engine.kind, EngineKind::Docker);
        assert_eq!(config.session.mount_target, "/game");
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(parse_config_str("[engine]\nbogus = 1\n").is_err());
    }

    #[test]
    fn rejects_relative_mount_target() {
        let err = parse_config_str("[session]\nmount_target = \"game\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_relative_paths() {
        assert!(parse_config_str("[paths]\nlibrary_root = \"library\"\n").is_err());
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marquee.toml");
        std::fs::write(&path, "[engine]\nkind = \"mock\"\n").unwrap();
        let config = MarqueeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.engine.kind, EngineKind::Mock);
    }
}
