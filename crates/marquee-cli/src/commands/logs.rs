use super::{json_pretty, EXIT_SUCCESS};
use marquee_core::Orchestrator;

pub async fn run(
    orchestrator: &Orchestrator,
    session_id: &str,
    tail: usize,
    json: bool,
) -> Result<u8, String> {
    let logs = orchestrator
        .logs(session_id, tail)
        .await
        .map_err(|e| e.to_string())?;
    if json {
        let lines: Vec<&str> = logs.lines().collect();
        println!(
            "{}",
            json_pretty(&serde_json::json!({ "session_id": session_id, "lines": lines }))?
        );
    } else if !logs.is_empty() {
        println!("{logs}");
    }
    Ok(EXIT_SUCCESS)
}
