// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parlor check` command implementation.
//!
//! Runs the same host gate the job guard applies before a scheduled pass,
//! plus configuration, database, and connectivity checks, so operators can
//! see why jobs are being skipped. Exits non-zero on failure, so cron
//! wrappers can gate on it.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use parlor_config::ParlorConfig;
use parlor_core::ParlorError;
use parlor_guard::{evaluate, probe, ResourceThresholds, ResourceVerdict};

/// Outcome class of one diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// Degraded but not blocking.
    Warn,
    Fail,
}

/// One line of `parlor check` output.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn finish(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `parlor check` command.
///
/// Returns `false` when any check failed. With `--plain`, disables colored
/// output.
pub async fn run_check(config: &ParlorConfig, plain: bool) -> Result<bool, ParlorError> {
    let use_color = !plain && std::io::stdout().is_terminal();

    let results = [
        check_config().await,
        check_resources_headroom(config),
        check_database(&config.storage.database_path).await,
        check_crm_reachable(config).await,
        check_directory(config),
    ];

    println!();
    println!("  parlor check");
    println!("  {}", "-".repeat(50));

    let mut fail_count = 0;
    let mut warn_count = 0;

    for result in &results {
        match result.status {
            CheckStatus::Pass => {}
            CheckStatus::Warn => warn_count += 1,
            CheckStatus::Fail => fail_count += 1,
        }
        println!(
            "    {} {:<20} {} ({}ms)",
            status_tag(&result.status, use_color),
            result.name,
            painted_message(result, use_color),
            result.duration.as_millis()
        );
    }

    println!();

    if fail_count > 0 {
        println!("  Host is not fit to run jobs.");
    } else if warn_count > 0 {
        let warn_word = if warn_count == 1 { "warning" } else { "warnings" };
        println!("  {warn_count} {warn_word}.");
    } else {
        println!("  All checks passed.");
    }

    println!();

    Ok(fail_count == 0)
}

fn status_tag(status: &CheckStatus, use_color: bool) -> String {
    use colored::Colorize;
    match (status, use_color) {
        (CheckStatus::Pass, true) => "✓".green().to_string(),
        (CheckStatus::Warn, true) => "!".yellow().to_string(),
        (CheckStatus::Fail, true) => "✗".red().to_string(),
        (CheckStatus::Pass, false) => "[OK]  ".to_string(),
        (CheckStatus::Warn, false) => "[WARN]".to_string(),
        (CheckStatus::Fail, false) => "[FAIL]".to_string(),
    }
}

fn painted_message(result: &CheckResult, use_color: bool) -> String {
    use colored::Colorize;
    if !use_color {
        return result.message.clone();
    }
    match result.status {
        CheckStatus::Pass => result.message.clone(),
        CheckStatus::Warn => result.message.yellow().to_string(),
        CheckStatus::Fail => result.message.red().to_string(),
    }
}

/// Reload configuration from scratch and report the error count.
async fn check_config() -> CheckResult {
    let start = Instant::now();
    match parlor_config::load_and_validate() {
        Ok(_) => CheckResult::finish("Configuration", CheckStatus::Pass, "valid", start),
        Err(errors) => CheckResult::finish(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s)", errors.len()),
            start,
        ),
    }
}

/// Probe the host against the same thresholds the job guard uses.
fn check_resources_headroom(config: &ParlorConfig) -> CheckResult {
    let start = Instant::now();
    let thresholds = ResourceThresholds {
        min_free_mb: config.guard.min_free_memory_mb,
        max_load: config.guard.max_load_average,
    };
    let snapshot = probe();

    match evaluate(&snapshot, &thresholds) {
        ResourceVerdict::Ok => CheckResult::finish(
            "Resources",
            CheckStatus::Pass,
            format!("{}MB free, load {:.2}", snapshot.free_mb, snapshot.load_one),
            start,
        ),
        ResourceVerdict::Rejected { reason } => {
            CheckResult::finish("Resources", CheckStatus::Fail, reason, start)
        }
    }
}

/// Open the database file and run a trivial statement against it.
async fn check_database(db_path: &str) -> CheckResult {
    let start = Instant::now();

    if !std::path::Path::new(db_path).exists() {
        return CheckResult::finish(
            "Database",
            CheckStatus::Warn,
            format!("not found: {db_path} (will be created on first run)"),
            start,
        );
    }

    match open_and_ping(db_path).await {
        Ok(()) => CheckResult::finish("Database", CheckStatus::Pass, "connected", start),
        Err(message) => CheckResult::finish("Database", CheckStatus::Fail, message, start),
    }
}

async fn open_and_ping(db_path: &str) -> Result<(), String> {
    let conn = tokio_rusqlite::Connection::open(db_path)
        .await
        .map_err(|e| format!("open failed: {e}"))?;
    conn.call(|conn| -> Result<(), tokio_rusqlite::rusqlite::Error> {
        conn.execute_batch("SELECT 1")?;
        Ok(())
    })
    .await
    .map_err(|e| format!("query failed: {e}"))
}

/// HEAD the partner-CRM base URL.
///
/// An unreachable CRM is a warning, not a failure: the batch jobs do not
/// talk to it, and the delivery queue retries on its own.
async fn check_crm_reachable(config: &ParlorConfig) -> CheckResult {
    let start = Instant::now();

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            return CheckResult::finish(
                "CRM API",
                CheckStatus::Fail,
                format!("HTTP client error: {e}"),
                start,
            );
        }
    };

    match client.head(&config.crm.base_url).send().await {
        Ok(_) => CheckResult::finish("CRM API", CheckStatus::Pass, "reachable", start),
        Err(e) => CheckResult::finish("CRM API", CheckStatus::Warn, describe_send_error(&e), start),
    }
}

fn describe_send_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timeout (5s)".to_string()
    } else if e.is_connect() {
        "connection refused".to_string()
    } else {
        format!("error: {e}")
    }
}

/// Report whether the chat-provider address directory is configured.
fn check_directory(config: &ParlorConfig) -> CheckResult {
    let start = Instant::now();
    if config.directory.is_configured() {
        CheckResult::finish("Directory", CheckStatus::Pass, "configured", start)
    } else {
        CheckResult::finish(
            "Directory",
            CheckStatus::Warn,
            "not configured (pseudo-identifier resolution disabled)",
            start,
        )
    }
}
