use crate::host::DisplayConfiguration;
use crate::hostpath::PathMapping;
use crate::spec::{ContainerSpec, MountSpec, GAME_LABEL, SESSION_LABEL, VARIANT_LABEL};
use crate::RuntimeError;
use marquee_schema::{ExecutionVariant, GameDescriptor, LaunchRequest, MarqueeConfig};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a game's Wine prefix is mounted inside compat containers.
pub const WINEPREFIX_TARGET: &str = "/wineprefix";
const WINE_DESKTOP_NAME: &str = "marquee";

/// Persistent Wine prefix for a game.
pub fn prefix_dir(install_root: &Path, identifier: &str) -> PathBuf {
    install_root.join(format!(".prefix-{identifier}"))
}

/// Map a Windows path onto a prefix's drive layout.
///
/// `C:` lives under `drive_c`, every other drive letter under `dosdevices`.
/// Returns `None` when `win` does not start with a drive letter.
pub fn windows_to_prefix_path(prefix_root: &str, win: &str) -> Option<String> {
    let drive = drive_letter(win)?;
    let rest: Vec<&str> = win[2..]
        .split(['\\', '/'])
        .filter(|part| !part.is_empty())
        .collect();
    let root = prefix_root.trim_end_matches('/');
    let base = if drive == 'c' {
        format!("{root}/drive_c")
    } else {
        format!("{root}/dosdevices/{drive}:")
    };
    if rest.is_empty() {
        Some(base)
    } else {
        Some(format!("{base}/{}", rest.join("/")))
    }
}

fn drive_letter(path: &str) -> Option<char> {
    let mut chars = path.chars();
    let letter = chars.next().filter(char::is_ascii_alphabetic)?;
    (chars.next() == Some(':')).then(|| letter.to_ascii_lowercase())
}

/// Strip NUL bytes and drop tokens left empty.
pub fn sanitize_args(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|arg| arg.replace('\0', ""))
        .filter(|arg| !arg.trim().is_empty())
        .collect()
}

fn join_container_path(base: &str, relative: &str) -> String {
    let relative = relative
        .trim_start_matches("./")
        .trim_start_matches(['/', '\\'])
        .replace('\\', "/");
    let base = base.trim_end_matches('/');
    if relative.is_empty() {
        base.to_owned()
    } else {
        format!("{base}/{relative}")
    }
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".to_owned(),
        Some((parent, _)) => parent.to_owned(),
    }
}

/// Everything the builder reads besides the request itself.
#[derive(Clone, Copy)]
pub struct LaunchContext<'a> {
    pub config: &'a MarqueeConfig,
    pub paths: &'a PathMapping,
    pub display: &'a DisplayConfiguration,
}

impl LaunchContext<'_> {
    fn mount_target(&self) -> &str {
        &self.config.session.mount_target
    }

    /// Library directory of the game as seen by this process.
    fn library_dir(&self, location: &str) -> PathBuf {
        let location = Path::new(location);
        if location.is_absolute() {
            location.to_path_buf()
        } else {
            self.config.paths.library_root.join(location)
        }
    }
}

/// Per-variant part of a container spec.
pub trait VariantLaunch {
    fn configure(
        &self,
        game: &GameDescriptor,
        ctx: &LaunchContext<'_>,
        spec: &mut ContainerSpec,
    ) -> Result<(), RuntimeError>;
}

/// Native Linux executables, exposed through the session volume.
pub struct NativeLaunch;

impl VariantLaunch for NativeLaunch {
    fn configure(
        &self,
        game: &GameDescriptor,
        ctx: &LaunchContext<'_>,
        spec: &mut ContainerSpec,
    ) -> Result<(), RuntimeError> {
        let location = game.location.as_deref().ok_or_else(|| {
            RuntimeError::InvalidRequest(format!("native game '{}' has no location", game.title))
        })?;
        let target = ctx.mount_target();

        if Path::new(location).is_absolute() {
            // outside the library: bind the host directory directly
            let host = ctx.paths.resolve(Path::new(location));
            spec.mounts.push(MountSpec::bind(host, target, true));
        } else {
            spec.mounts
                .push(MountSpec::volume(&ctx.config.session.volume_name, target, true));
            spec.volume_source = Some(ctx.library_dir(location));
        }

        let executable = join_container_path(target, &game.launch_command);
        spec.working_dir = Some(match game.working_dir.as_deref() {
            Some(dir) => join_container_path(target, dir),
            None => parent_of(&executable),
        });
        spec.set_env("GAME_EXECUTABLE", &executable);
        spec.set_env("GAME_ARGS", &sanitize_args(&game.args).join(" "));
        Ok(())
    }
}

/// Windows executables under Wine, with a persistent per-game prefix.
pub struct WineLaunch;

impl WineLaunch {
    /// Directory relative launch commands are resolved against.
    fn base_dir(game: &GameDescriptor, ctx: &LaunchContext<'_>) -> String {
        if let Some(installed) = game.installed_path.as_deref() {
            if let Some(path) = windows_to_prefix_path(WINEPREFIX_TARGET, installed) {
                return path;
            }
            return join_container_path(WINEPREFIX_TARGET, installed);
        }
        if game.location.is_some() {
            return ctx.mount_target().to_owned();
        }
        format!("{WINEPREFIX_TARGET}/drive_c")
    }

    fn resolve_target(game: &GameDescriptor, ctx: &LaunchContext<'_>) -> String {
        let command = game.launch_command.trim();
        windows_to_prefix_path(WINEPREFIX_TARGET, command)
            .unwrap_or_else(|| join_container_path(&Self::base_dir(game, ctx), command))
    }
}

impl VariantLaunch for WineLaunch {
    fn configure(
        &self,
        game: &GameDescriptor,
        ctx: &LaunchContext<'_>,
        spec: &mut ContainerSpec,
    ) -> Result<(), RuntimeError> {
        let identifier = game.identifier().ok_or_else(|| {
            RuntimeError::InvalidRequest(format!(
                "wine game '{}' needs a slug or id for its prefix",
                game.title
            ))
        })?;

        let prefix = ctx
            .paths
            .resolve(&prefix_dir(&ctx.config.paths.install_root, identifier));
        spec.mounts
            .push(MountSpec::bind(prefix, WINEPREFIX_TARGET, false));
        if let Some(location) = game.location.as_deref() {
            let host = ctx.paths.resolve(&ctx.library_dir(location));
            spec.mounts
                .push(MountSpec::bind(host, ctx.mount_target(), true));
        }

        let target = Self::resolve_target(game, ctx);
        let mut command = vec!["wine".to_owned()];
        match (game.fullscreen, game.resolution) {
            (true, Some(resolution)) => {
                command.push("explorer".to_owned());
                command.push(format!("/desktop={WINE_DESKTOP_NAME},{resolution}"));
            }
            (true, None) => debug!("fullscreen requested without a resolution, skipping virtual desktop"),
            (false, _) => {}
        }
        command.push(target.clone());
        command.extend(sanitize_args(&game.args));
        spec.command = Some(command);

        spec.working_dir = Some(match game.working_dir.as_deref() {
            Some(dir) => windows_to_prefix_path(WINEPREFIX_TARGET, dir)
                .unwrap_or_else(|| join_container_path(&Self::base_dir(game, ctx), dir)),
            None => parent_of(&target),
        });
        spec.set_env("WINEPREFIX", WINEPREFIX_TARGET);
        spec.set_env("WINEARCH", game.wine_arch.as_str());
        spec.set_env("WINEDEBUG", &game.debug.winedebug());
        Ok(())
    }
}

/// Turns launch requests into container specs. Never talks to the engine.
pub struct LaunchBuilder<'a> {
    ctx: LaunchContext<'a>,
}

impl<'a> LaunchBuilder<'a> {
    pub fn new(ctx: LaunchContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn container_name(&self, session_id: &str) -> String {
        format!("{}{session_id}", self.ctx.config.session.container_prefix)
    }

    pub fn build(&self, request: &LaunchRequest) -> Result<ContainerSpec, RuntimeError> {
        request
            .validate()
            .map_err(|e| RuntimeError::InvalidRequest(e.to_string()))?;

        let game = &request.game;
        let mut spec = ContainerSpec::new(
            self.container_name(&request.session_id),
            request.platform.image.trim(),
        );
        spec.labels
            .insert(SESSION_LABEL.to_owned(), request.session_id.clone());
        spec.labels.insert(
            GAME_LABEL.to_owned(),
            game.identifier().unwrap_or(&game.title).to_owned(),
        );
        spec.labels
            .insert(VARIANT_LABEL.to_owned(), request.variant().to_string());

        let handler: &dyn VariantLaunch = match request.variant() {
            ExecutionVariant::Native => &NativeLaunch,
            ExecutionVariant::Wine => &WineLaunch,
        };
        handler.configure(game, &self.ctx, &mut spec)?;

        self.ctx.display.apply_to(&mut spec);
        for (key, value) in &game.env {
            spec.set_env(key, value);
        }
        debug!(
            "built {} spec {} with {} mounts",
            request.variant(),
            spec.name,
            spec.mounts.len()
        );
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{IpcMode, MountSource};
    use marquee_schema::{parse_request_str, DebugChannels};

    const NATIVE: &str = r#"
session_id = "n1"

[game]
slug = "tux"
title = "Tux Racer"
location = "tux-racer"
launch_command = "bin/tuxracer"
args = ["--fast", "", "level"]

[game.env]
SDL_AUDIODRIVER = "pulse"

[platform]
variant = "native"
image = "marquee-native:latest"
"#;

    const WINE: &str = r#"
session_id = "w1"

[game]
slug = "foo"
title = "Foo"
installed_path = 'C:\Games\Foo'
launch_command = 'C:\Games\Foo\foo.exe'
args = ["-windowed"]
wine_arch = "win32"

[platform]
variant = "wine"
image = "marquee-wine:latest"
"#;

    fn build(input: &str, mapping: &PathMapping, display: &DisplayConfiguration) -> ContainerSpec {
        let config = MarqueeConfig::default();
        let ctx = LaunchContext {
            config: &config,
            paths: mapping,
            display,
        };
        LaunchBuilder::new(ctx)
            .build(&parse_request_str(input).unwrap())
            .unwrap()
    }

    fn x11() -> DisplayConfiguration {
        let mut display = DisplayConfiguration::headless();
        display.mode = crate::host::DisplayMode::X11;
        display.env_vars.push(("DISPLAY".to_owned(), ":0".to_owned()));
        display
            .mounts
            .push(MountSpec::bind("/tmp/.X11-unix", "/tmp/.X11-unix", false));
        display.ipc_mode = Some(IpcMode::Host);
        display
    }

    #[test]
    fn windows_paths_map_into_prefix() {
        assert_eq!(
            windows_to_prefix_path("/prefix", r"C:\Games\Foo\foo.exe").as_deref(),
            Some("/prefix/drive_c/Games/Foo/foo.exe")
        );
        assert_eq!(
            windows_to_prefix_path("/prefix/", r"d:\setup.exe").as_deref(),
            Some("/prefix/dosdevices/d:/setup.exe")
        );
        assert_eq!(
            windows_to_prefix_path("/prefix", "C:").as_deref(),
            Some("/prefix/drive_c")
        );
        assert_eq!(windows_to_prefix_path("/prefix", "foo.exe"), None);
    }

    #[test]
    fn args_are_sanitized() {
        let args = vec!["a".to_owned(), String::new(), "b\0c".to_owned(), " ".to_owned()];
        assert_eq!(sanitize_args(&args), vec!["a", "bc"]);
    }

    #[test]
    fn native_spec_uses_session_volume() {
        let spec = build(NATIVE, &PathMapping::Identity, &x11());
        assert_eq!(spec.name, "marquee-n1");
        assert_eq!(spec.image, "marquee-native:latest");
        assert_eq!(spec.command, None);
        assert_eq!(spec.env_value("GAME_EXECUTABLE"), Some("/game/bin/tuxracer"));
        assert_eq!(spec.env_value("GAME_ARGS"), Some("--fast level"));
        assert_eq!(spec.env_value("DISPLAY"), Some(":0"));
        assert_eq!(spec.env_value("SDL_AUDIODRIVER"), Some("pulse"));
        assert_eq!(spec.working_dir.as_deref(), Some("/game/bin"));
        assert_eq!(
            spec.mounts[0],
            MountSpec::volume("marquee-session", "/game", true)
        );
        assert_eq!(
            spec.volume_source,
            Some(PathBuf::from("/data/library/tux-racer"))
        );
        assert_eq!(spec.labels[SESSION_LABEL], "n1");
        assert_eq!(spec.labels[GAME_LABEL], "tux");
        assert_eq!(spec.ipc_mode, Some(IpcMode::Host));
    }

    #[test]
    fn native_absolute_location_binds_translated_path() {
        let input = NATIVE.replace(r#"location = "tux-racer""#, r#"location = "/data/extra/tux""#);
        let mapping = PathMapping::Prefix {
            container: PathBuf::from("/data"),
            host: PathBuf::from("/srv"),
        };
        let spec = build(&input, &mapping, &DisplayConfiguration::headless());
        assert_eq!(spec.mounts, vec![MountSpec::bind("/srv/extra/tux", "/game", true)]);
        assert!(!spec.uses_session_volume());
    }

    #[test]
    fn wine_spec_targets_prefix() {
        let spec = build(WINE, &PathMapping::Identity, &DisplayConfiguration::headless());
        assert_eq!(
            spec.command,
            Some(vec![
                "wine".to_owned(),
                "/wineprefix/drive_c/Games/Foo/foo.exe".to_owned(),
                "-windowed".to_owned()
            ])
        );
        assert_eq!(
            spec.mounts,
            vec![MountSpec::bind(
                "/data/installs/.prefix-foo",
                WINEPREFIX_TARGET,
                false
            )]
        );
        assert_eq!(spec.env_value("WINEPREFIX"), Some("/wineprefix"));
        assert_eq!(spec.env_value("WINEARCH"), Some("win32"));
        assert_eq!(spec.env_value("WINEDEBUG"), Some("-all"));
        assert_eq!(
            spec.working_dir.as_deref(),
            Some("/wineprefix/drive_c/Games/Foo")
        );
        assert!(!spec.uses_session_volume());
        assert!(!spec
            .mounts
            .iter()
            .any(|m| matches!(m.source, MountSource::Volume(_))));
    }

    #[test]
    fn wine_fullscreen_uses_virtual_desktop() {
        let input = WINE.replace("wine_arch = \"win32\"", "fullscreen = true\nresolution = \"1920x1080\"");
        let spec = build(&input, &PathMapping::Identity, &DisplayConfiguration::headless());
        let command = spec.command.unwrap();
        assert_eq!(&command[..3], ["wine", "explorer", "/desktop=marquee,1920x1080"]);
        assert_eq!(command[3], "/wineprefix/drive_c/Games/Foo/foo.exe");
    }

    #[test]
    fn wine_fullscreen_without_resolution_runs_directly() {
        let input = WINE.replace("wine_arch = \"win32\"", "fullscreen = true");
        let spec = build(&input, &PathMapping::Identity, &DisplayConfiguration::headless());
        assert_eq!(spec.command.unwrap()[1], "/wineprefix/drive_c/Games/Foo/foo.exe");
    }

    #[test]
    fn wine_relative_command_joins_installed_path() {
        let input = WINE.replace(r"launch_command = 'C:\Games\Foo\foo.exe'", r"launch_command = 'bin\foo.exe'");
        let spec = build(&input, &PathMapping::Identity, &DisplayConfiguration::headless());
        assert_eq!(
            spec.command.unwrap()[1],
            "/wineprefix/drive_c/Games/Foo/bin/foo.exe"
        );
    }

    #[test]
    fn wine_portable_game_binds_library_dir() {
        let input = WINE
            .replace(r"installed_path = 'C:\Games\Foo'", r#"location = "foo-portable""#)
            .replace(r"launch_command = 'C:\Games\Foo\foo.exe'", r#"launch_command = "foo.exe""#);
        let spec = build(&input, &PathMapping::Identity, &DisplayConfiguration::headless());
        assert_eq!(spec.command.unwrap()[1], "/game/foo.exe");
        assert!(spec
            .mounts
            .contains(&MountSpec::bind("/data/library/foo-portable", "/game", true)));
    }

    #[test]
    fn wine_debug_channels_and_overrides() {
        let mut request = parse_request_str(WINE).unwrap();
        request.game.debug = DebugChannels {
            relay: true,
            seh: true,
            ..DebugChannels::default()
        };
        request
            .game
            .env
            .insert("WINEDEBUG".to_owned(), "+heap".to_owned());
        let config = MarqueeConfig::default();
        let display = DisplayConfiguration::headless();
        let ctx = LaunchContext {
            config: &config,
            paths: &PathMapping::Identity,
            display: &display,
        };
        let spec = LaunchBuilder::new(ctx).build(&request).unwrap();
        // game overrides apply last
        assert_eq!(spec.env_value("WINEDEBUG"), Some("+heap"));

        request.game.env.clear();
        let spec = LaunchBuilder::new(ctx).build(&request).unwrap();
        assert_eq!(spec.env_value("WINEDEBUG"), Some("+relay,+seh"));
    }

    #[test]
    fn native_without_location_is_rejected() {
        let input = NATIVE.replace(r#"location = "tux-racer""#, "");
        let config = MarqueeConfig::default();
        let display = DisplayConfiguration::headless();
        let ctx = LaunchContext {
            config: &config,
            paths: &PathMapping::Identity,
            display: &display,
        };
        let err = LaunchBuilder::new(ctx)
            .build(&parse_request_str(&input).unwrap())
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidRequest(_)));
    }
}
