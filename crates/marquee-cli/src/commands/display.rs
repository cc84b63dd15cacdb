use super::{json_pretty, EXIT_SUCCESS};
use marquee_core::Orchestrator;
use marquee_runtime::MountSource;

pub fn run(orchestrator: &Orchestrator, json: bool) -> Result<u8, String> {
    let display = orchestrator.display();
    if json {
        println!("{}", json_pretty(&display)?);
        return Ok(EXIT_SUCCESS);
    }
    println!("mode:        {}", display.mode);
    if let Some(ipc) = display.ipc_mode {
        println!("ipc:         {}", ipc.as_str());
    }
    for opt in &display.security_opts {
        println!("security:    {opt}");
    }
    for (key, value) in &display.env_vars {
        println!("env:         {key}={value}");
    }
    for mount in &display.mounts {
        if let MountSource::Bind(path) = &mount.source {
            println!("mount:       {} -> {}", path.display(), mount.target.display());
        }
    }
    for device in &display.devices {
        println!("device:      {}", device.host.display());
    }
    Ok(EXIT_SUCCESS)
}
