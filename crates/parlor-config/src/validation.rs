// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.
//!
//! Rates and timeouts have floors, cron schedules must parse, and base URLs
//! must carry a scheme. Every violation is collected before reporting.

use croner::Cron;

use crate::diagnostic::ConfigError;
use crate::model::ParlorConfig;

/// Check a deserialized configuration for values that would break at runtime.
///
/// Collects every violation rather than stopping at the first, so one edit
/// cycle fixes the whole file.
pub fn validate_config(config: &ParlorConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    require_min(&mut errors, "queue.concurrency", config.queue.concurrency.into());
    require_min(
        &mut errors,
        "queue.rate_limit_per_sec",
        config.queue.rate_limit_per_sec.into(),
    );
    require_min(&mut errors, "queue.max_attempts", config.queue.max_attempts.into());
    require_min(&mut errors, "queue.backoff_base_ms", config.queue.backoff_base_ms);
    require_min(&mut errors, "queue.lock_timeout_secs", config.queue.lock_timeout_secs);
    require_min(&mut errors, "queue.poll_interval_ms", config.queue.poll_interval_ms);
    require_min(&mut errors, "retention.trash_days", config.retention.trash_days.into());
    require_min(&mut errors, "guard.lease_timeout_secs", config.guard.lease_timeout_secs);
    require_min(&mut errors, "alias.retry_delay_secs", config.alias.retry_delay_secs);
    require_min(&mut errors, "alias.max_attempts", config.alias.max_attempts.into());
    require_min(&mut errors, "crm.timeout_secs", config.crm.timeout_secs);

    if config.guard.max_load_average <= 0.0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "guard.max_load_average must be positive, got {}",
                config.guard.max_load_average
            ),
        });
    }

    validate_schedule(&mut errors, "merge", &config.schedule.merge);
    validate_schedule(&mut errors, "repair", &config.schedule.repair);
    validate_schedule(&mut errors, "purge", &config.schedule.purge);
    validate_schedule(&mut errors, "aliases", &config.schedule.aliases);

    require_http_url(&mut errors, "crm.base_url", &config.crm.base_url);

    // Directory checks only bind once a key is present; the section is
    // inert otherwise.
    if config.directory.is_configured() {
        require_http_url(&mut errors, "directory.base_url", &config.directory.base_url);
        require_min(
            &mut errors,
            "directory.timeout_secs",
            config.directory.timeout_secs,
        );
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn require_min(errors: &mut Vec<ConfigError>, key: &str, value: u64) {
    if value < 1 {
        errors.push(ConfigError::Validation {
            message: format!("{key} must be at least 1"),
        });
    }
}

fn require_http_url(errors: &mut Vec<ConfigError>, key: &str, raw: &str) {
    let url = raw.trim();
    if !url.starts_with("https://") && !url.starts_with("http://") {
        errors.push(ConfigError::Validation {
            message: format!("{key} must start with http:// or https://, got `{url}`"),
        });
    }
}

fn validate_schedule(errors: &mut Vec<ConfigError>, name: &str, expr: &str) {
    if let Err(e) = expr.parse::<Cron>() {
        errors.push(ConfigError::Validation {
            message: format!("schedule.{name} `{expr}` is not a valid cron expression: {e}"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = ParlorConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = ParlorConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))));
    }

    #[test]
    fn zero_concurrency_fails_validation() {
        let mut config = ParlorConfig::default();
        config.queue.concurrency = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("concurrency"))));
    }

    #[test]
    fn bad_cron_schedule_fails_validation() {
        let mut config = ParlorConfig::default();
        config.schedule.merge = "whenever".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("schedule.merge"))));
    }

    #[test]
    fn bad_crm_url_fails_validation() {
        let mut config = ParlorConfig::default();
        config.crm.base_url = "services.leadconnectorhq.com".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("crm.base_url"))));
    }

    #[test]
    fn directory_url_is_only_checked_once_configured() {
        let mut config = ParlorConfig::default();
        config.directory.base_url = "not-a-url".to_string();
        assert!(validate_config(&config).is_ok());

        config.directory.api_key = "secret".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("directory.base_url"))));
    }

    #[test]
    fn multiple_errors_are_all_collected() {
        let mut config = ParlorConfig::default();
        config.queue.concurrency = 0;
        config.queue.max_attempts = 0;
        config.retention.trash_days = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 3, "expected all errors collected, got {}", errors.len());
    }

    #[test]
    fn valid_custom_config_passes() {
        let mut config = ParlorConfig::default();
        config.storage.database_path = "/tmp/test.db".to_string();
        config.queue.concurrency = 4;
        config.schedule.merge = "*/5 * * * *".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
