use crate::shortcut::{parse_shortcut, ShortcutRecord};
use crate::SetupError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| wanted.iter().any(|w| e.eq_ignore_ascii_case(w)))
}

/// Batch scripts in `installed_dir` that look like registry setup:
/// `.cmd`/`.bat` files whose name mentions `reg` or `setup`. Sorted by path.
pub fn find_registry_scripts(installed_dir: &Path) -> Result<Vec<PathBuf>, SetupError> {
    let mut scripts = Vec::new();
    for entry in fs::read_dir(installed_dir)? {
        let path = entry?.path();
        if !path.is_file() || !has_extension(&path, &["cmd", "bat"]) {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.contains("reg") || name.contains("setup") {
            scripts.push(path);
        }
    }
    scripts.sort();
    Ok(scripts)
}

/// Every `.lnk` file below `root`, sorted by path.
pub fn find_shortcuts(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), &["lnk"]))
        .map(walkdir::DirEntry::into_path)
        .collect();
    found.sort();
    found
}

pub fn read_shortcut(path: &Path) -> Result<ShortcutRecord, SetupError> {
    let data = fs::read(path)?;
    parse_shortcut(&data).ok_or_else(|| SetupError::InvalidShortcut(path.to_path_buf()))
}

/// Parse every shortcut below `root`, skipping files that do not parse.
pub fn resolve_shortcuts(root: &Path) -> Vec<(PathBuf, ShortcutRecord)> {
    find_shortcuts(root)
        .into_iter()
        .filter_map(|path| match read_shortcut(&path) {
            Ok(record) => Some((path, record)),
            Err(e) => {
                debug!("ignoring {}: {e}", path.display());
                None
            }
        })
        .collect()
}
