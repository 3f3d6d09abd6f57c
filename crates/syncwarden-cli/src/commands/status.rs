use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use syncwarden_core::config::Config;
use syncwarden_http::protocol::IdleResponse;
use syncwarden_supervisor::{JobManager, StatusView};

pub fn run(config: Config, history: bool) -> Result<()> {
    let manager = JobManager::open(Arc::new(config)).context("Failed to open job store")?;
    let view = manager.status(history)?;
    println!("{}", serde_json::to_string_pretty(&render(view)?)?);
    Ok(())
}

/// Same JSON shape `GET /status` returns.
pub fn render(view: StatusView) -> Result<Value> {
    Ok(match view {
        StatusView::Idle => serde_json::to_value(IdleResponse::default())?,
        StatusView::Latest(job) => serde_json::to_value(job)?,
        StatusView::History(jobs) => serde_json::to_value(jobs)?,
    })
}
