//! Install-time helpers for Wine game prefixes.
//!
//! Pure parsers for Windows shell links and `REG ADD` batch scripts, plus the
//! filesystem discovery that feeds them during first-run prefix setup.

pub mod discovery;
pub mod regscript;
pub mod shortcut;

pub use discovery::{find_registry_scripts, find_shortcuts, read_shortcut, resolve_shortcuts};
pub use regscript::{convert, REGEDIT_HEADER};
pub use shortcut::{parse_shortcut, ShortcutRecord};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("setup I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a valid shell link: {}", .0.display())]
    InvalidShortcut(PathBuf),
}
