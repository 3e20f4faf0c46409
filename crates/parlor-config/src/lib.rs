// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Parlor reconciliation core.
//!
//! TOML files merge over compiled defaults with `PARLOR_*` environment
//! overrides on top. Unknown keys are rejected (`deny_unknown_fields`) and
//! surface as miette diagnostics with typo suggestions, so a misspelled key
//! points at its own line instead of silently falling back to a default.
//!
//! ```no_run
//! let config = parlor_config::load_and_validate().expect("config errors");
//! println!("database: {}", config.storage.database_path);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::ParlorConfig;

/// Load from the standard locations, then validate.
///
/// Loader failures come back with source spans attached where the offending
/// file could be re-read; semantic failures come back as the complete
/// collected list. Either way the caller hands the errors to
/// [`render_errors`].
pub fn load_and_validate() -> Result<ParlorConfig, Vec<ConfigError>> {
    let config = loader::load_config()
        .map_err(|err| diagnostic::figment_to_config_errors(err, &collect_toml_sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// Load from a TOML string, then validate. No files or env are consulted.
///
/// String sources carry no file metadata, so these errors render without
/// spans.
pub fn load_and_validate_str(toml_content: &str) -> Result<ParlorConfig, Vec<ConfigError>> {
    let config = loader::load_config_from_str(toml_content)
        .map_err(|err| diagnostic::figment_to_config_errors(err, &[]))?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// Re-read whichever config files exist so diagnostics can carry spans.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![std::path::PathBuf::from("/etc/parlor/parlor.toml")];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("parlor/parlor.toml"));
    }
    candidates.push(
        std::env::current_dir()
            .map(|d| d.join("parlor.toml"))
            .unwrap_or_else(|_| std::path::PathBuf::from("parlor.toml")),
    );

    candidates
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            // Canonicalized on both sides so the figment metadata path and
            // this entry agree regardless of how the file was referenced.
            let name = std::fs::canonicalize(&path)
                .unwrap_or(path)
                .display()
                .to_string();
            Some((name, content))
        })
        .collect()
}
