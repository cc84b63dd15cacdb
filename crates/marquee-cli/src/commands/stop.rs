use super::EXIT_SUCCESS;
use marquee_core::Orchestrator;

pub async fn run(orchestrator: &Orchestrator, session_id: &str) -> Result<u8, String> {
    orchestrator
        .stop(session_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("stopped session {session_id}");
    Ok(EXIT_SUCCESS)
}
