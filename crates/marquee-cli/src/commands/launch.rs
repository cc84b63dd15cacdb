use super::{colorize_state, json_pretty, spin_fail, spin_ok, spinner, EXIT_FAILURE, EXIT_SUCCESS};
use marquee_core::{LaunchMode, LaunchOutcome, Orchestrator, SessionState};
use marquee_runtime::{short_id, ContainerSpec, MountSource};
use marquee_schema::parse_request_file;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchOptions {
    pub wait: bool,
    pub debug: bool,
    pub dry_run: bool,
}

pub async fn run(
    orchestrator: &Orchestrator,
    request_path: &Path,
    options: LaunchOptions,
    json: bool,
) -> Result<u8, String> {
    let request = parse_request_file(request_path).map_err(|e| format!("request error: {e}"))?;

    if options.dry_run {
        let spec = orchestrator.plan(&request).await.map_err(|e| e.to_string())?;
        if json {
            println!("{}", json_pretty(&spec)?);
        } else {
            print_spec(&spec);
        }
        return Ok(EXIT_SUCCESS);
    }

    let mode = if options.debug {
        LaunchMode::Debug
    } else {
        LaunchMode::Normal
    };
    let pb = (!json).then(|| spinner(&format!("launching {}", request.game.title)));
    let outcome = match orchestrator.launch(&request, mode).await {
        Ok(outcome) => {
            if let Some(pb) = &pb {
                spin_ok(
                    pb,
                    &format!(
                        "session {} started ({})",
                        request.session_id,
                        short_id(&outcome.container.id)
                    ),
                );
            }
            outcome
        }
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, &format!("session {} failed to start", request.session_id));
            }
            return Err(e.to_string());
        }
    };

    print_outcome(&outcome, json)?;
    if !options.wait || options.debug {
        return Ok(EXIT_SUCCESS);
    }
    wait_for_exit(orchestrator, &request.session_id, outcome, json).await
}

fn print_outcome(outcome: &LaunchOutcome, json: bool) -> Result<(), String> {
    if json {
        let value = serde_json::json!({
            "session": outcome.session,
            "container": outcome.container,
            "exec_hint": outcome.debug.as_ref().map(|d| d.exec_hint.clone()),
            "prefix_setup": outcome.prefix_setup,
        });
        println!("{}", json_pretty(&value)?);
        return Ok(());
    }
    if let Some(setup) = &outcome.prefix_setup {
        if setup.imported {
            println!("imported {} registry file(s) into the prefix", setup.reg_files.len());
        }
    }
    println!("container:   {}", outcome.container.name);
    println!("status:      {}", colorize_state(&outcome.container.status));
    if let Some(debug) = &outcome.debug {
        println!("attach with: {}", debug.exec_hint);
    }
    Ok(())
}

/// Block until the session ends. Ctrl-C stops the session first.
async fn wait_for_exit(
    orchestrator: &Orchestrator,
    session_id: &str,
    outcome: LaunchOutcome,
    json: bool,
) -> Result<u8, String> {
    let mut exit_watch = outcome.exit_watch;
    tokio::select! {
        joined = &mut exit_watch => {
            joined.map_err(|e| format!("exit monitor failed: {e}"))?;
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted, stopping session {session_id}");
            orchestrator.stop(session_id).await.map_err(|e| e.to_string())?;
            exit_watch
                .await
                .map_err(|e| format!("exit monitor failed: {e}"))?;
        }
    }

    let record = orchestrator
        .sessions()
        .get(session_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no such session: {session_id}"))?;
    let stats = orchestrator
        .sessions()
        .stats(&record.game)
        .map_err(|e| e.to_string())?;
    if json {
        let value = serde_json::json!({ "session": record, "stats": stats });
        println!("{}", json_pretty(&value)?);
    } else {
        println!(
            "session {} {} with code {} after {}s",
            record.session_id,
            colorize_state(&record.state.to_string()),
            record
                .exit_code
                .map_or_else(|| "unknown".to_owned(), |c| c.to_string()),
            record.play_time_secs().unwrap_or_default()
        );
    }

    let clean = record.state == SessionState::Stopped || record.exit_code == Some(0);
    Ok(if clean { EXIT_SUCCESS } else { EXIT_FAILURE })
}

fn print_spec(spec: &ContainerSpec) {
    println!("name:        {}", spec.name);
    println!("image:       {}", spec.image);
    if let Some(command) = &spec.command {
        println!("command:     {}", command.join(" "));
    }
    if let Some(dir) = &spec.working_dir {
        println!("working dir: {dir}");
    }
    for mount in &spec.mounts {
        let source = match &mount.source {
            MountSource::Bind(path) => path.display().to_string(),
            MountSource::Volume(name) => format!("volume:{name}"),
        };
        let mode = if mount.read_only { "ro" } else { "rw" };
        println!("mount:       {source} -> {} ({mode})", mount.target.display());
    }
    for device in &spec.devices {
        println!("device:      {}", device.host.display());
    }
    for (key, value) in &spec.env {
        println!("env:         {key}={value}");
    }
    if let Some(dir) = &spec.volume_source {
        println!("volume from: {}", dir.display());
    }
}
