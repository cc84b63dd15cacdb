use super::{colorize_state, json_pretty, EXIT_SUCCESS};
use marquee_core::Orchestrator;
use marquee_runtime::short_id;

pub async fn run(orchestrator: &Orchestrator, json: bool) -> Result<u8, String> {
    let sessions = orchestrator
        .list_sessions()
        .await
        .map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&sessions)?);
    } else if sessions.is_empty() {
        println!("no sessions found");
    } else {
        println!("{:<24} {:<10} CONTAINER", "SESSION", "STATE");
        for session in &sessions {
            println!(
                "{:<24} {:<10} {}",
                session.session_id,
                colorize_state(&session.state),
                short_id(&session.container_id)
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
