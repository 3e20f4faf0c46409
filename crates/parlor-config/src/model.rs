// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parlor reconciliation core.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Parlor configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParlorConfig {
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outbound sync queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Summary repair settings.
    #[serde(default)]
    pub repair: RepairConfig,

    /// Trash retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Job scheduler guard settings.
    #[serde(default)]
    pub guard: GuardConfig,

    /// Deferred pseudo-identifier resolution settings.
    #[serde(default)]
    pub alias: AliasConfig,

    /// Cron schedules for the periodic jobs run by `parlor serve`.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Partner-CRM client settings.
    #[serde(default)]
    pub crm: CrmConfig,

    /// Chat-provider address directory settings.
    #[serde(default)]
    pub directory: DirectoryConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Default log level (trace, debug, info, warn, error). Overridden by
    /// `PARLOR_LOG` or `RUST_LOG` when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { database_path: default_database_path() }
    }
}

fn default_database_path() -> String {
    "parlor.db".to_string()
}

/// Outbound sync queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Number of deliveries processed concurrently.
    #[serde(default = "default_queue_concurrency")]
    pub concurrency: u32,

    /// Maximum deliveries started per second, respecting the partner CRM's
    /// throughput limits.
    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit_per_sec: u32,

    /// Total attempts per job before it is recorded as terminally failed.
    #[serde(default = "default_queue_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay; doubles on each subsequent attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// How long a claimed job stays locked before it can be reclaimed after
    /// a crash.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Idle sleep between polls when the queue is empty.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_queue_concurrency(),
            rate_limit_per_sec: default_rate_limit_per_sec(),
            max_attempts: default_queue_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            lock_timeout_secs: default_lock_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_queue_concurrency() -> u32 {
    1
}

fn default_rate_limit_per_sec() -> u32 {
    5
}

fn default_queue_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_lock_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// Summary repair configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RepairConfig {
    /// Maximum drift between a conversation summary timestamp and its newest
    /// message before the summary is rewritten.
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: u64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self { tolerance_ms: default_tolerance_ms() }
    }
}

fn default_tolerance_ms() -> u64 {
    2000
}

/// Trash retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Days a soft-deleted conversation stays recoverable before the purge
    /// removes it permanently.
    #[serde(default = "default_trash_days")]
    pub trash_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { trash_days: default_trash_days() }
    }
}

fn default_trash_days() -> u32 {
    30
}

/// Job scheduler guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    /// Minimum free host memory required to start a guarded job.
    #[serde(default = "default_min_free_memory_mb")]
    pub min_free_memory_mb: u64,

    /// Maximum 1-minute load average allowed to start a guarded job.
    #[serde(default = "default_max_load_average")]
    pub max_load_average: f64,

    /// Age after which an unreleased lease is presumed abandoned and
    /// reclaimed.
    #[serde(default = "default_lease_timeout_secs")]
    pub lease_timeout_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_free_memory_mb: default_min_free_memory_mb(),
            max_load_average: default_max_load_average(),
            lease_timeout_secs: default_lease_timeout_secs(),
        }
    }
}

fn default_min_free_memory_mb() -> u64 {
    500
}

fn default_max_load_average() -> f64 {
    4.0
}

fn default_lease_timeout_secs() -> u64 {
    3600
}

/// Deferred pseudo-identifier resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AliasConfig {
    /// Delay between resolution attempts for one alias.
    #[serde(default = "default_alias_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Attempts before an alias is marked exhausted and kept as a standalone
    /// identity.
    #[serde(default = "default_alias_max_attempts")]
    pub max_attempts: u32,
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_alias_retry_delay_secs(),
            max_attempts: default_alias_max_attempts(),
        }
    }
}

fn default_alias_retry_delay_secs() -> u64 {
    30
}

fn default_alias_max_attempts() -> u32 {
    240
}

/// Cron schedules for the periodic jobs, in standard five-field cron
/// syntax.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Duplicate-conversation merge pass.
    #[serde(default = "default_merge_schedule")]
    pub merge: String,

    /// Summary repair pass.
    #[serde(default = "default_repair_schedule")]
    pub repair: String,

    /// Trash retention purge.
    #[serde(default = "default_purge_schedule")]
    pub purge: String,

    /// Deferred pseudo-identifier resolution pass.
    #[serde(default = "default_aliases_schedule")]
    pub aliases: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            merge: default_merge_schedule(),
            repair: default_repair_schedule(),
            purge: default_purge_schedule(),
            aliases: default_aliases_schedule(),
        }
    }
}

fn default_merge_schedule() -> String {
    // Every 30 minutes.
    "*/30 * * * *".to_string()
}

fn default_repair_schedule() -> String {
    // Hourly, offset from the merge pass.
    "15 * * * *".to_string()
}

fn default_purge_schedule() -> String {
    // Daily at 03:00.
    "0 3 * * *".to_string()
}

fn default_aliases_schedule() -> String {
    // Every minute; per-alias pacing comes from alias.retry_delay_secs.
    "* * * * *".to_string()
}

/// Partner-CRM client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CrmConfig {
    /// Base URL of the partner CRM's REST API.
    #[serde(default = "default_crm_base_url")]
    pub base_url: String,

    /// Per-request timeout for CRM calls. Expiry surfaces as a retryable
    /// delivery error.
    #[serde(default = "default_crm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: default_crm_base_url(),
            timeout_secs: default_crm_timeout_secs(),
        }
    }
}

fn default_crm_base_url() -> String {
    "https://services.leadconnectorhq.com".to_string()
}

fn default_crm_timeout_secs() -> u64 {
    30
}

/// Chat-provider address directory configuration, used to resolve channel
/// pseudo-identifiers to real phone numbers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryConfig {
    /// Base URL of the chat provider's API.
    #[serde(default = "default_directory_base_url")]
    pub base_url: String,

    /// API key for the provider. Pseudo-identifier resolution stays disabled
    /// while this is empty.
    #[serde(default)]
    pub api_key: String,

    /// Provider instance name. Empty means each lookup uses the tenant id as
    /// the instance.
    #[serde(default)]
    pub instance: String,

    /// Per-request timeout for directory lookups.
    #[serde(default = "default_directory_timeout_secs")]
    pub timeout_secs: u64,
}

impl DirectoryConfig {
    /// Whether resolution passes can run at all.
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_directory_base_url(),
            api_key: String::new(),
            instance: String::new(),
            timeout_secs: default_directory_timeout_secs(),
        }
    }
}

fn default_directory_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_directory_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ParlorConfig::default();
        assert_eq!(config.queue.concurrency, 1);
        assert_eq!(config.queue.rate_limit_per_sec, 5);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.backoff_base_ms, 1000);
        assert_eq!(config.repair.tolerance_ms, 2000);
        assert_eq!(config.retention.trash_days, 30);
        assert_eq!(config.guard.min_free_memory_mb, 500);
        assert_eq!(config.guard.max_load_average, 4.0);
        assert_eq!(config.guard.lease_timeout_secs, 3600);
        assert_eq!(config.alias.retry_delay_secs, 30);
        assert_eq!(config.alias.max_attempts, 240);
        assert!(!config.directory.is_configured());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let toml_str = r#"
[queue]
concurrency = 4
"#;
        let config: ParlorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.queue.concurrency, 4);
        assert_eq!(config.queue.rate_limit_per_sec, 5);
        assert_eq!(config.storage.database_path, "parlor.db");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml_str = r#"
[guard]
min_free_memory_mb = 256
max_lood_average = 2.0
"#;
        let result = toml::from_str::<ParlorConfig>(toml_str);
        assert!(result.is_err());
    }
}
