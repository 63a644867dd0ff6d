// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `threadline status` command implementation.
//!
//! Calls the gateway health endpoint to display server state, uptime, and
//! registered channels. Falls back gracefully when the server is not running.

use std::io::IsTerminal;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use threadline_config::ThreadlineConfig;
use threadline_core::ThreadlineError;

/// Health endpoint response from the gateway.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    uptime_secs: u64,
    #[serde(default)]
    channels: Vec<String>,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub status: String,
    pub uptime_secs: Option<u64>,
    pub uptime_human: Option<String>,
    pub channels: Vec<String>,
    pub gateway_host: String,
    pub gateway_port: u16,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Run the `threadline status` command.
pub async fn run_status(
    config: &ThreadlineConfig,
    json: bool,
    plain: bool,
) -> Result<(), ThreadlineError> {
    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    let url = format!("http://{host}:{port}/health");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| ThreadlineError::Internal(format!("failed to create HTTP client: {e}")))?;

    let health = match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => Some(resp.json::<HealthResponse>().await.map_err(
            |e| ThreadlineError::Internal(format!("failed to parse health response: {e}")),
        )?),
        _ => None,
    };

    let report = match health {
        Some(health) => StatusResponse {
            running: true,
            status: health.status,
            uptime_secs: Some(health.uptime_secs),
            uptime_human: Some(format_uptime(health.uptime_secs)),
            channels: health.channels,
            gateway_host: host,
            gateway_port: port,
        },
        None => StatusResponse {
            running: false,
            status: "not running".to_string(),
            uptime_secs: None,
            uptime_human: None,
            channels: Vec::new(),
            gateway_host: host,
            gateway_port: port,
        },
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_status(&report, use_color);
    }
    Ok(())
}

fn print_status(report: &StatusResponse, use_color: bool) {
    use colored::Colorize;

    println!();
    println!("  threadline status");
    println!("  {}", "-".repeat(35));

    match (&report.uptime_human, use_color) {
        (Some(uptime), true) => println!(
            "    State:    {} {} (uptime: {})",
            "✓".green(),
            report.status.green(),
            uptime
        ),
        (Some(uptime), false) => {
            println!("    State:    [OK] {} (uptime: {uptime})", report.status)
        }
        (None, true) => println!("    State:    {} {}", "✗".red(), "not running".red()),
        (None, false) => println!("    State:    [FAIL] not running"),
    }

    if report.running {
        let channels = if report.channels.is_empty() {
            "(none)".to_string()
        } else {
            report.channels.join(", ")
        };
        println!("    Channels: {channels}");
    } else {
        println!(
            "    Endpoint: http://{}:{}/health",
            report.gateway_host, report.gateway_port
        );
        println!();
        println!("  Start with: threadline serve");
    }
    println!();
}
