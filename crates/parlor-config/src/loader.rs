// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading on figment.
//!
//! TOML files from the usual locations merge over compiled defaults, and
//! `PARLOR_*` environment variables override everything.

#![allow(clippy::result_large_err)] // figment::Error is external; loading runs once at startup

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ParlorConfig;

/// Section names recognized when mapping `PARLOR_*` variables to key paths.
const SECTIONS: [&str; 10] = [
    "log",
    "storage",
    "queue",
    "repair",
    "retention",
    "guard",
    "alias",
    "schedule",
    "crm",
    "directory",
];

/// Load configuration from the standard locations.
///
/// Later layers win:
/// 1. compiled defaults
/// 2. `/etc/parlor/parlor.toml`
/// 3. `~/.config/parlor/parlor.toml`
/// 4. `./parlor.toml`
/// 5. `PARLOR_*` environment variables
pub fn load_config() -> Result<ParlorConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParlorConfig::default()))
        .merge(Toml::file("/etc/parlor/parlor.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("parlor/parlor.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("parlor.toml"))
        .merge(env_provider())
        .extract()
}

/// Load from a TOML string alone, skipping files and the environment.
pub fn load_config_from_str(toml_content: &str) -> Result<ParlorConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParlorConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load one explicit file plus environment overrides.
pub fn load_config_from_path(path: &Path) -> Result<ParlorConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParlorConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Environment provider mapping `PARLOR_QUEUE_MAX_ATTEMPTS` to
/// `queue.max_attempts`.
///
/// The first underscore after a known section name becomes the dot;
/// `Env::split("_")` would instead shatter `max_attempts` into
/// `max.attempts`.
fn env_provider() -> Env {
    Env::prefixed("PARLOR_").map(|key| {
        let lower = key.as_str().to_ascii_lowercase();
        for section in SECTIONS {
            if let Some(rest) = lower.strip_prefix(section) {
                if let Some(field) = rest.strip_prefix('_') {
                    return format!("{section}.{field}").into();
                }
            }
        }
        lower.into()
    })
}
