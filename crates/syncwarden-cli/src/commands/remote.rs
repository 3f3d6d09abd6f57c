use anyhow::{Context, Result};
use clap::Subcommand;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::time::Duration;
use syncwarden_core::config::Config;
use syncwarden_core::constants::API_KEY_HEADER;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum RemoteAction {
    /// POST /sync
    Trigger {
        /// Per-invocation credential forwarded to the executor
        #[arg(long)]
        token: Option<String>,
    },
    /// POST /cancel
    Cancel,
    /// GET /status
    Status {
        #[arg(long)]
        history: bool,
    },
    /// DELETE /history
    Clear,
}

pub fn run(
    config: &Config,
    action: RemoteAction,
    url: Option<&str>,
    secret: Option<&str>,
) -> Result<()> {
    let base = base_url(config, url);
    let secret = secret
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| config.api_secret());

    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;
    let request = build_request(&client, &base, &action);
    let request = match secret {
        Some(secret) => request.header(API_KEY_HEADER, secret),
        None => request,
    };

    let response = request
        .send()
        .with_context(|| format!("Request to {} failed", base))?;
    let status = response.status();
    let body: Value = response
        .json()
        .with_context(|| format!("Invalid JSON response (HTTP {})", status))?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() {
        anyhow::bail!("control API returned HTTP {}", status);
    }
    Ok(())
}

fn build_request(client: &Client, base: &str, action: &RemoteAction) -> RequestBuilder {
    match action {
        RemoteAction::Trigger { token } => {
            let request = client.post(format!("{base}/sync"));
            match token {
                Some(token) => request.json(&json!({ "token": token })),
                None => request,
            }
        }
        RemoteAction::Cancel => client.post(format!("{base}/cancel")),
        RemoteAction::Status { history } => {
            let request = client.get(format!("{base}/status"));
            if *history {
                request.query(&[("history", "true")])
            } else {
                request
            }
        }
        RemoteAction::Clear => client.delete(format!("{base}/history")),
    }
}

/// Explicit `--url`, else the configured listener address.
fn base_url(config: &Config, url: Option<&str>) -> String {
    match url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => {
            let host = match config.server.bind.as_str() {
                "0.0.0.0" | "" => "127.0.0.1",
                "::" => "[::1]",
                other => other,
            };
            format!("http://{}:{}", host, config.server.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_prefers_explicit_and_strips_slash() {
        let config = Config::default();
        assert_eq!(
            base_url(&config, Some("http://sync.local:9000/")),
            "http://sync.local:9000"
        );
        assert_eq!(base_url(&config, None), "http://127.0.0.1:8000");
    }

    #[test]
    fn wildcard_bind_maps_to_loopback() {
        let mut config = Config::default();
        config.server.bind = "0.0.0.0".into();
        config.server.port = 8123;
        assert_eq!(base_url(&config, Some("  ")), "http://127.0.0.1:8123");
    }

    #[test]
    fn requests_target_control_routes() {
        let client = Client::new();
        let base = "http://127.0.0.1:8000";

        let status = build_request(&client, base, &RemoteAction::Status { history: true })
            .build()
            .unwrap();
        assert_eq!(status.method(), reqwest::Method::GET);
        assert_eq!(status.url().as_str(), "http://127.0.0.1:8000/status?history=true");

        let clear = build_request(&client, base, &RemoteAction::Clear)
            .build()
            .unwrap();
        assert_eq!(clear.method(), reqwest::Method::DELETE);
        assert_eq!(clear.url().path(), "/history");

        let trigger = build_request(
            &client,
            base,
            &RemoteAction::Trigger {
                token: Some("tok".into()),
            },
        )
        .build()
        .unwrap();
        assert_eq!(trigger.method(), reqwest::Method::POST);
        let body = trigger.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(body).unwrap(),
            json!({"token": "tok"})
        );
    }
}
