use super::{json_pretty, EXIT_SUCCESS};
use marquee_core::{prefix_shortcuts, ShortcutTarget};
use marquee_runtime::{windows_to_prefix_path, WINEPREFIX_TARGET};
use marquee_setup::read_shortcut;
use std::path::Path;

/// Resolve one `.lnk` file, or every shortcut inside a Wine prefix directory.
pub fn run(path: &Path, json: bool) -> Result<u8, String> {
    let targets = if path.is_dir() {
        prefix_shortcuts(path)
    } else {
        let shortcut = read_shortcut(path).map_err(|e| e.to_string())?;
        vec![ShortcutTarget {
            path: path.to_path_buf(),
            container_path: windows_to_prefix_path(WINEPREFIX_TARGET, &shortcut.target),
            shortcut,
        }]
    };

    if json {
        println!("{}", json_pretty(&targets)?);
    } else if targets.is_empty() {
        println!("no shortcuts found");
    } else {
        for target in &targets {
            println!("{}", target.path.display());
            println!("  target:      {}", target.shortcut.target);
            if let Some(args) = &target.shortcut.arguments {
                println!("  arguments:   {args}");
            }
            if let Some(dir) = &target.shortcut.working_dir {
                println!("  working dir: {dir}");
            }
            if let Some(description) = &target.shortcut.description {
                println!("  description: {description}");
            }
            if let Some(container) = &target.container_path {
                println!("  in session:  {container}");
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
