//! First-run configuration of Wine prefixes.
//!
//! Installers leave registry setup as `REG ADD` batch scripts next to the
//! game. They are transpiled into `.reg` files under
//! `drive_c/marquee-setup/`, imported with `wine regedit /S` in a one-shot
//! container, and a marker file keeps the import from running twice.

use crate::CoreError;
use chrono::Utc;
use marquee_runtime::spec::GAME_LABEL;
use marquee_runtime::{
    short_id, windows_to_prefix_path, ContainerEngine, ContainerSpec, EngineError, MountSpec,
    RuntimeError, WaitCondition, WINEPREFIX_TARGET,
};
use marquee_schema::{GameDescriptor, LaunchRequest, MarqueeConfig};
use marquee_setup::{convert, find_registry_scripts, resolve_shortcuts, ShortcutRecord};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const REGISTRY_MARKER: &str = ".marquee-registry-imported";
/// Directory under `drive_c` that receives transpiled `.reg` files.
pub const SETUP_SUBDIR: &str = "marquee-setup";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrefixSetupReport {
    pub prefix: PathBuf,
    pub scripts: Vec<PathBuf>,
    pub reg_files: Vec<PathBuf>,
    pub imported: bool,
    /// The marker was already present, nothing ran.
    pub already_done: bool,
}

pub fn is_imported(prefix: &Path) -> bool {
    prefix.join(REGISTRY_MARKER).is_file()
}

pub fn write_marker(prefix: &Path) -> Result<(), CoreError> {
    fs::write(prefix.join(REGISTRY_MARKER), format!("{}\n", Utc::now().to_rfc3339()))?;
    Ok(())
}

/// Directory the game was installed to, as seen by this process.
///
/// Windows paths map through the prefix's drive layout; anything else is
/// taken relative to the prefix. Portable games without an installed path
/// use their library directory.
pub fn installed_dir(prefix: &Path, game: &GameDescriptor, config: &MarqueeConfig) -> Option<PathBuf> {
    if let Some(installed) = game.installed_path.as_deref() {
        let root = prefix.to_string_lossy();
        return Some(match windows_to_prefix_path(&root, installed) {
            Some(path) => PathBuf::from(path),
            None => prefix.join(installed.trim_start_matches(['/', '\\']).replace('\\', "/")),
        });
    }
    game.location.as_deref().map(|location| {
        let location = Path::new(location);
        if location.is_absolute() {
            location.to_path_buf()
        } else {
            config.paths.library_root.join(location)
        }
    })
}

/// Registry scripts for `game`. `None` when the install directory does not
/// exist yet, so the import is retried on a later launch.
pub fn discover_scripts(
    prefix: &Path,
    game: &GameDescriptor,
    config: &MarqueeConfig,
) -> Result<Option<Vec<PathBuf>>, CoreError> {
    match installed_dir(prefix, game, config) {
        Some(dir) if dir.is_dir() => Ok(Some(find_registry_scripts(&dir)?)),
        Some(dir) => {
            debug!("install directory {} does not exist yet", dir.display());
            Ok(None)
        }
        None => Ok(Some(Vec::new())),
    }
}

/// A shortcut found in a prefix and the path its target has inside a
/// session container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortcutTarget {
    pub path: PathBuf,
    pub shortcut: ShortcutRecord,
    pub container_path: Option<String>,
}

/// Every parseable `.lnk` under the prefix's `drive_c`.
pub fn prefix_shortcuts(prefix: &Path) -> Vec<ShortcutTarget> {
    resolve_shortcuts(&prefix.join("drive_c"))
        .into_iter()
        .map(|(path, shortcut)| ShortcutTarget {
            container_path: windows_to_prefix_path(WINEPREFIX_TARGET, &shortcut.target),
            path,
            shortcut,
        })
        .collect()
}

/// Transpile `scripts` into numbered `.reg` files inside the prefix.
/// Returns the written files in import order.
pub fn transpile_scripts(prefix: &Path, scripts: &[PathBuf]) -> Result<Vec<PathBuf>, CoreError> {
    let out_dir = prefix.join("drive_c").join(SETUP_SUBDIR);
    fs::create_dir_all(&out_dir)?;
    let mut written = Vec::with_capacity(scripts.len());
    for (index, script) in scripts.iter().enumerate() {
        // installer scripts are often in a legacy code page
        let text = String::from_utf8_lossy(&fs::read(script)?).into_owned();
        let stem = script
            .file_stem()
            .map_or_else(|| "setup".to_owned(), |s| s.to_string_lossy().into_owned());
        let target = out_dir.join(format!("{:02}-{stem}.reg", index + 1));
        fs::write(&target, convert(&text))?;
        debug!("transpiled {} -> {}", script.display(), target.display());
        written.push(target);
    }
    Ok(written)
}

/// One-shot container importing `reg_file` into the prefix mounted from
/// `host_prefix`.
pub fn regedit_spec(
    config: &MarqueeConfig,
    request: &LaunchRequest,
    identifier: &str,
    host_prefix: &Path,
    reg_file: &Path,
) -> ContainerSpec {
    let file_name = reg_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut spec = ContainerSpec::new(
        format!("{}regedit-{identifier}", config.session.container_prefix),
        request.platform.image.trim(),
    );
    spec.mounts
        .push(MountSpec::bind(host_prefix, WINEPREFIX_TARGET, false));
    spec.command = Some(vec![
        "wine".to_owned(),
        "regedit".to_owned(),
        "/S".to_owned(),
        format!("C:\\{SETUP_SUBDIR}\\{file_name}"),
    ]);
    spec.set_env("WINEPREFIX", WINEPREFIX_TARGET);
    spec.set_env("WINEARCH", request.game.wine_arch.as_str());
    spec.set_env("WINEDEBUG", "-all");
    spec.labels
        .insert(GAME_LABEL.to_owned(), identifier.to_owned());
    spec.auto_remove = false;
    spec
}

/// Run `spec` to completion and remove it, returning its exit code.
pub async fn run_to_completion(
    engine: &dyn ContainerEngine,
    spec: &ContainerSpec,
) -> Result<i64, CoreError> {
    let id = engine.create_container(spec).await.map_err(RuntimeError::from)?;
    let outcome = async {
        engine.start_container(&id).await?;
        // the container is kept until removed below, so a late wait still sees it
        engine.wait_container(&id, WaitCondition::NotRunning).await
    }
    .await;
    match engine.remove_container(&id, true).await {
        Ok(()) | Err(EngineError::NotFound(_)) => {}
        Err(e) => debug!("removing {} failed: {e}", short_id(&id)),
    }
    let code = outcome.map_err(RuntimeError::from)?;
    info!("{} finished with exit code {code}", spec.name);
    Ok(code)
}
