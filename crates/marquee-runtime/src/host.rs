use crate::spec::{ContainerSpec, DeviceSpec, IpcMode, MountSpec};
use marquee_schema::AudioSection;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const X11_SOCKET_DIR: &str = "/tmp/.X11-unix";
const XAUTHORITY_TARGET: &str = "/tmp/.Xauthority";
const PULSE_TARGET: &str = "/run/pulse";
const PULSE_COOKIE_TARGET: &str = "/tmp/pulse_cookie";
const WAYLAND_RUNTIME_TARGET: &str = "/run/marquee";
const RENDER_NODE: &str = "/dev/dri/renderD128";
const DRI_DIR: &str = "/dev/dri";

/// Snapshot of the host environment the resolver reads from.
///
/// Existence probes are made relative to `root`, which is `/` for the live
/// process and a scratch directory in tests. Paths handed to the engine are
/// always the unprefixed host paths.
#[derive(Debug, Clone)]
pub struct HostProbe {
    vars: HashMap<String, String>,
    root: PathBuf,
}

impl HostProbe {
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
            root: PathBuf::from("/"),
        }
    }

    /// Empty environment probing under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            vars: HashMap::new(),
            root: root.into(),
        }
    }

    #[must_use]
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Non-empty value of an environment variable.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn rooted(&self, path: &Path) -> PathBuf {
        self.root
            .join(path.strip_prefix("/").unwrap_or(path))
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.rooted(path.as_ref()).exists()
    }

    pub fn read_to_string(&self, path: impl AsRef<Path>) -> std::io::Result<String> {
        fs::read_to_string(self.rooted(path.as_ref()))
    }

    /// Whether this process runs inside a Docker or Podman container.
    pub fn is_containerized(&self) -> bool {
        self.exists("/.dockerenv") || self.exists("/run/.containerenv")
    }

    /// The engine-side name of the container this process runs in.
    pub fn container_identity(&self) -> Option<String> {
        if let Some(hostname) = self.var("HOSTNAME") {
            return Some(hostname.to_owned());
        }
        self.read_to_string("/etc/hostname")
            .ok()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
    }

    pub fn home(&self) -> Option<PathBuf> {
        self.var("HOME").map(PathBuf::from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    X11,
    Wayland,
    None,
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X11 => f.write_str("x11"),
            Self::Wayland => f.write_str("wayland"),
            Self::None => f.write_str("none"),
        }
    }
}

/// Display, audio, and GPU passthrough for one launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayConfiguration {
    pub mode: DisplayMode,
    pub env_vars: Vec<(String, String)>,
    pub mounts: Vec<MountSpec>,
    pub devices: Vec<DeviceSpec>,
    pub ipc_mode: Option<IpcMode>,
    pub security_opts: Vec<String>,
}

impl DisplayConfiguration {
    pub fn headless() -> Self {
        Self {
            mode: DisplayMode::None,
            env_vars: Vec::new(),
            mounts: Vec::new(),
            devices: Vec::new(),
            ipc_mode: None,
            security_opts: Vec::new(),
        }
    }

    fn push_env(&mut self, key: &str, value: &str) {
        self.env_vars.push((key.to_owned(), value.to_owned()));
    }

    pub fn apply_to(&self, spec: &mut ContainerSpec) {
        for (key, value) in &self.env_vars {
            spec.set_env(key, value);
        }
        spec.mounts.extend(self.mounts.iter().cloned());
        spec.devices.extend(self.devices.iter().cloned());
        if self.ipc_mode.is_some() {
            spec.ipc_mode = self.ipc_mode;
        }
        spec.security_opts
            .extend(self.security_opts.iter().cloned());
    }
}

/// Pick exactly one of X11, Wayland, or headless for the current host.
pub fn resolve_display(probe: &HostProbe, audio: &AudioSection) -> DisplayConfiguration {
    if let Some(display) = probe.var("DISPLAY") {
        return resolve_x11(probe, audio, display);
    }
    if let (Some(wayland), Some(runtime)) = (probe.var("WAYLAND_DISPLAY"), probe.var("XDG_RUNTIME_DIR"))
    {
        return resolve_wayland(probe, wayland, runtime);
    }
    warn!("no DISPLAY or WAYLAND_DISPLAY set; graphical output will not be visible");
    DisplayConfiguration::headless()
}

fn resolve_x11(probe: &HostProbe, audio: &AudioSection, display: &str) -> DisplayConfiguration {
    let mut config = DisplayConfiguration::headless();
    config.mode = DisplayMode::X11;
    config.push_env("DISPLAY", display);
    config
        .mounts
        .push(MountSpec::bind(X11_SOCKET_DIR, X11_SOCKET_DIR, false));

    let xauthority = probe
        .var("XAUTHORITY")
        .map(PathBuf::from)
        .or_else(|| probe.home().map(|h| h.join(".Xauthority")));
    match xauthority {
        Some(path) if probe.exists(&path) => {
            config
                .mounts
                .push(MountSpec::bind(path, XAUTHORITY_TARGET, true));
            config.push_env("XAUTHORITY", XAUTHORITY_TARGET);
        }
        Some(path) => debug!("X authority file {} not found", path.display()),
        None => debug!("no X authority file candidate"),
    }

    config.ipc_mode = Some(IpcMode::Host);
    config.security_opts.push("seccomp=unconfined".to_owned());
    probe_gpu(probe, &mut config);
    probe_audio(probe, audio, &mut config);
    config
}

fn resolve_wayland(probe: &HostProbe, wayland: &str, runtime: &str) -> DisplayConfiguration {
    let mut config = DisplayConfiguration::headless();
    config.mode = DisplayMode::Wayland;

    let socket = Path::new(runtime).join(wayland);
    let target = Path::new(WAYLAND_RUNTIME_TARGET).join(wayland);
    config.mounts.push(MountSpec::bind(socket, target, false));
    config.push_env("WAYLAND_DISPLAY", wayland);
    config.push_env("XDG_RUNTIME_DIR", WAYLAND_RUNTIME_TARGET);
    for key in [
        "GDK_BACKEND",
        "QT_QPA_PLATFORM",
        "SDL_VIDEODRIVER",
        "CLUTTER_BACKEND",
    ] {
        config.push_env(key, "wayland");
    }
    probe_gpu(probe, &mut config);
    config
}

fn probe_gpu(probe: &HostProbe, config: &mut DisplayConfiguration) {
    if probe.exists(RENDER_NODE) {
        debug!("GPU render node found, passing through {DRI_DIR}");
        config.devices.push(DeviceSpec::passthrough(DRI_DIR));
    } else {
        debug!("no GPU render node, container will use software rendering");
    }
}

fn probe_audio(probe: &HostProbe, audio: &AudioSection, config: &mut DisplayConfiguration) {
    let Some(runtime) = probe.var("XDG_RUNTIME_DIR") else {
        debug!("XDG_RUNTIME_DIR unset, skipping audio passthrough");
        return;
    };
    let pulse_dir = Path::new(runtime).join("pulse");
    if !probe.exists(&pulse_dir) {
        debug!("no PulseAudio directory at {}", pulse_dir.display());
        return;
    }
    config
        .mounts
        .push(MountSpec::bind(pulse_dir, PULSE_TARGET, false));
    config.push_env("PULSE_SERVER", &format!("unix:{PULSE_TARGET}/native"));

    if let Some(cookie) = probe.home().map(|h| h.join(".config/pulse/cookie")) {
        if probe.exists(&cookie) {
            config
                .mounts
                .push(MountSpec::bind(cookie, PULSE_COOKIE_TARGET, true));
            config.push_env("PULSE_COOKIE", PULSE_COOKIE_TARGET);
        }
    }
    if let Some(sink) = audio.default_sink.as_deref() {
        config.push_env("PULSE_SINK", sink);
    }
}
