use super::EXIT_SUCCESS;
use marquee_setup::convert;
use std::path::Path;

pub fn run(script: &Path, output: Option<&Path>) -> Result<u8, String> {
    let bytes = std::fs::read(script)
        .map_err(|e| format!("failed to read {}: {e}", script.display()))?;
    let reg = convert(&String::from_utf8_lossy(&bytes));
    match output {
        Some(path) => {
            std::fs::write(path, reg)
                .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            println!("wrote {}", path.display());
        }
        None => print!("{reg}"),
    }
    Ok(EXIT_SUCCESS)
}
