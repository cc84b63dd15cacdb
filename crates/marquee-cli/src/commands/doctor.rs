use super::{EXIT_FAILURE, EXIT_SUCCESS};
use marquee_core::{DoctorReport, Orchestrator};
use marquee_runtime::{DisplayMode, PathMapping};
use std::path::Path;

pub async fn run(orchestrator: &Orchestrator, json_output: bool) -> Result<u8, String> {
    let report = orchestrator.doctor().await;
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_engine(&report, &mut checks, &mut all_pass);
    check_display(&report, &mut checks);
    check_paths(&report, &mut checks);
    let install_root = &orchestrator.config().paths.install_root;
    if install_root.exists() {
        check_disk_space(install_root, &mut checks);
    } else {
        checks.push(Check::info(
            "install_root",
            &format!(
                "Install root {} does not exist yet (created on first Wine launch)",
                install_root.display()
            ),
        ));
    }

    print_results(&checks, all_pass, json_output)
}

fn check_engine(report: &DoctorReport, checks: &mut Vec<Check>, all_pass: &mut bool) {
    match &report.engine_error {
        None => checks.push(Check::pass(
            "engine",
            &format!("Container engine '{}' is reachable", report.engine),
        )),
        Some(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "engine",
                &format!("Container engine '{}' is not reachable: {e}", report.engine),
            ));
        }
    }
}

fn check_display(report: &DoctorReport, checks: &mut Vec<Check>) {
    match report.display {
        DisplayMode::None => checks.push(Check::warn(
            "display",
            "No display server detected; sessions will run headless",
        )),
        mode => checks.push(Check::pass(
            "display",
            &format!("Display server: {mode}"),
        )),
    }
    if report.gpu {
        checks.push(Check::pass("gpu", "GPU render node available"));
    } else {
        checks.push(Check::info("gpu", "No GPU render node; software rendering only"));
    }
}

fn check_paths(report: &DoctorReport, checks: &mut Vec<Check>) {
    let mapping = match &report.path_mapping {
        Some(PathMapping::Prefix { container, host }) => format!(
            "Running in a container: {} maps to host {}",
            container.display(),
            host.display()
        ),
        Some(PathMapping::Identity) if report.containerized => {
            "Running in a container, paths are passed through unchanged".to_owned()
        }
        Some(PathMapping::Identity) => "Running on the host".to_owned(),
        None => return,
    };
    checks.push(Check::info("path_mapping", &mapping));

    match &report.session_volume {
        Some(binding) => checks.push(Check::info(
            "session_volume",
            &format!(
                "Session volume {} points at {}",
                binding.volume,
                binding.host_dir.display()
            ),
        )),
        None => checks.push(Check::info(
            "session_volume",
            "Session volume not created yet",
        )),
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Marquee Doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: String,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &str, status: &'static str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}

/// Games and prefixes are large; warn below 10 GB and fail below 1 GB.
fn check_disk_space(install_root: &Path, checks: &mut Vec<Check>) {
    let Ok(c_path) = std::ffi::CString::new(install_root.to_string_lossy().as_bytes()) else {
        return;
    };

    // SAFETY: an all-zero statvfs is a valid value for the plain C struct.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: the path is NUL-terminated and outlives the call; `stat` is a
    // live stack value and is only read when the call returns 0.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &raw mut stat) };
    if ret != 0 {
        return;
    }

    #[allow(clippy::useless_conversion)]
    let avail_gb = u64::from(stat.f_bavail) * u64::from(stat.f_frsize) / (1024 * 1024 * 1024);
    if avail_gb < 1 {
        checks.push(Check::fail(
            "disk_space",
            "Less than 1 GB free under the install root",
        ));
    } else if avail_gb < 10 {
        checks.push(Check::warn(
            "disk_space",
            &format!("{avail_gb} GB free under the install root (games may not fit)"),
        ));
    } else {
        checks.push(Check::pass(
            "disk_space",
            &format!("{avail_gb} GB free under the install root"),
        ));
    }
}
