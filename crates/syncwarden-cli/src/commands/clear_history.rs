use anyhow::{Context, Result};
use std::sync::Arc;
use syncwarden_core::config::Config;
use syncwarden_http::protocol::ClearResponse;
use syncwarden_supervisor::{ClearOutcome, JobManager};

pub fn run(config: Config) -> Result<()> {
    let manager = JobManager::open(Arc::new(config)).context("Failed to open job store")?;
    let outcome = manager.clear_history()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&ClearResponse::from_outcome(&outcome))?
    );
    if let ClearOutcome::Ignored { job_id } = outcome {
        anyhow::bail!("job {} is still running; history was not cleared", job_id);
    }
    Ok(())
}
