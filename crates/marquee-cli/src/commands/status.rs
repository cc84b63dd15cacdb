use super::{colorize_state, json_pretty, EXIT_SUCCESS};
use marquee_core::Orchestrator;
use marquee_runtime::short_id;

pub async fn run(orchestrator: &Orchestrator, session_id: &str, json: bool) -> Result<u8, String> {
    let info = orchestrator
        .status(session_id)
        .await
        .map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&info)?);
    } else {
        println!("session:     {session_id}");
        println!("container:   {} ({})", info.name, short_id(&info.id));
        println!("status:      {}", colorize_state(&info.status));
        println!("created:     {}", info.created.as_deref().unwrap_or("(unknown)"));
        if let Some(code) = info.exit_code {
            println!("exit code:   {code}");
        }
    }
    Ok(EXIT_SUCCESS)
}
