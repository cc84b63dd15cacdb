use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use marquee_core::Orchestrator;
use marquee_schema::parse_request_file;
use std::path::Path;

pub async fn run(orchestrator: &Orchestrator, request_path: &Path, json: bool) -> Result<u8, String> {
    let request = parse_request_file(request_path).map_err(|e| format!("request error: {e}"))?;
    let pb = (!json).then(|| spinner("configuring prefix"));
    let report = match orchestrator.setup_prefix(&request).await {
        Ok(report) => report,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "prefix setup failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        println!("{}", json_pretty(&report)?);
        return Ok(EXIT_SUCCESS);
    }
    let summary = if report.already_done {
        "registry already imported".to_owned()
    } else if report.imported {
        format!("imported {} registry file(s)", report.reg_files.len())
    } else if report.scripts.is_empty() {
        "no registry scripts to import".to_owned()
    } else {
        "nothing imported".to_owned()
    };
    if let Some(pb) = &pb {
        spin_ok(pb, &summary);
    }
    println!("prefix:      {}", report.prefix.display());
    for script in &report.scripts {
        println!("script:      {}", script.display());
    }
    Ok(EXIT_SUCCESS)
}
