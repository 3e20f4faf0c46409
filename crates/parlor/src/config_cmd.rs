// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parlor config` subcommands.

use parlor_config::ParlorConfig;
use parlor_core::ParlorError;

/// Run `parlor config validate`.
///
/// Loading and validation happen at startup for every command; reaching
/// this point means the files and environment overrides are usable.
pub fn run_validate(config: &ParlorConfig) -> Result<(), ParlorError> {
    println!("Configuration valid.");
    println!("  Database:  {}", config.storage.database_path);
    println!(
        "  Directory: {}",
        if config.directory.is_configured() {
            "configured"
        } else {
            "not configured"
        }
    );
    Ok(())
}

/// Run `parlor config show`: print the effective configuration as TOML,
/// with secrets redacted.
pub fn run_show(config: &ParlorConfig) -> Result<(), ParlorError> {
    let rendered = toml::to_string_pretty(&redacted(config))
        .map_err(|e| ParlorError::Internal(format!("failed to render configuration: {e}")))?;
    print!("{rendered}");
    Ok(())
}

fn redacted(config: &ParlorConfig) -> ParlorConfig {
    let mut effective = config.clone();
    if !effective.directory.api_key.is_empty() {
        effective.directory.api_key = "[redacted]".to_string();
    }
    effective
}
