pub mod completions;
pub mod convert_reg;
pub mod display;
pub mod doctor;
pub mod launch;
pub mod logs;
pub mod sessions;
pub mod setup_prefix;
pub mod shortcut;
pub mod status;
pub mod stop;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_REQUEST_ERROR: u8 = 2;
pub const EXIT_ENGINE_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Colour a session or container state for terminal output.
pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "running" => Style::new().cyan().bold().apply_to(state).to_string(),
        "starting" | "created" => Style::new().yellow().apply_to(state).to_string(),
        "exited" | "stopped" => Style::new().dim().apply_to(state).to_string(),
        "failed" | "dead" => Style::new().red().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

/// Process exit code for an error message.
pub fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("config error:")
        || msg.starts_with("request error:")
        || msg.starts_with("invalid launch request:")
    {
        EXIT_REQUEST_ERROR
    } else if msg.starts_with("container engine") {
        EXIT_ENGINE_ERROR
    } else {
        EXIT_FAILURE
    }
}
