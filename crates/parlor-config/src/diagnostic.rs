// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Translates figment failures into miette reports.
//!
//! A bad `parlor.toml` surfaces as a list of [`ConfigError`]s, each carrying
//! the source span of the offending key where it can be located and a
//! "did you mean?" suggestion picked by Jaro-Winkler similarity.

#![allow(unused_assignments)] // the Diagnostic derive trips this lint

use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler score before a key is offered as a correction.
/// 0.75 catches `concurency` -> `concurrency` and `trash_dais` ->
/// `trash_days` without suggesting unrelated keys.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// One problem found while loading or validating configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key that no section of `parlor.toml` defines.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(parlor::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        /// The key as written.
        key: String,
        /// Closest valid key, when one is close enough.
        suggestion: Option<String>,
        /// Comma-separated keys the section accepts.
        valid_keys: String,
        #[label("not a recognized key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value that deserialized to the wrong type.
    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(parlor::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        /// Dotted path of the key, e.g. `queue.concurrency`.
        key: String,
        /// What figment found versus what the model wants.
        detail: String,
        expected: String,
        #[label("unexpected type here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value that parsed but fails a semantic check.
    #[error("validation error: {message}")]
    #[diagnostic(code(parlor::config::validation))]
    Validation { message: String },

    /// A key the model requires but no layer provided.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(parlor::config::missing_key),
        help("add `{key} = <value>` to your parlor.toml")
    )]
    MissingKey { key: String },

    /// Anything figment reports that does not fit the cases above.
    #[error("configuration error: {0}")]
    #[diagnostic(code(parlor::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Expand a `figment::Error` into one [`ConfigError`] per underlying problem.
///
/// Figment reports every failure it found in one error value; each becomes
/// its own diagnostic so an operator sees the whole list at once.
/// `toml_sources` pairs file paths with their raw content for span lookup.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter().map(|e| classify(e, toml_sources)).collect()
}

fn classify(error: figment::error::Error, toml_sources: &[(String, String)]) -> ConfigError {
    use figment::error::Kind;

    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let known: Vec<&str> = expected.to_vec();
            let (span, src) = span_in_sources(&error, field, toml_sources).unzip();
            ConfigError::UnknownKey {
                key: field.clone(),
                suggestion: suggest_key(field, &known),
                valid_keys: known.join(", "),
                span,
                src,
            }
        }
        Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
            key: dotted_path(&error),
            detail: format!("found {actual}, expected {expected}"),
            expected: expected.to_string(),
            span: None,
            src: None,
        },
        Kind::MissingField(field) => ConfigError::MissingKey {
            key: field.clone().into_owned(),
        },
        _ => ConfigError::Other(error.to_string()),
    }
}

fn dotted_path(error: &figment::error::Error) -> String {
    error
        .path
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Locate `field` in the TOML file the error came from.
///
/// Returns the span plus the file content miette needs to render it. `None`
/// when the error has no file source (env layer, defaults) or the key cannot
/// be found in the text.
fn span_in_sources(
    error: &figment::error::Error,
    field: &str,
    toml_sources: &[(String, String)],
) -> Option<(SourceSpan, NamedSource<String>)> {
    let path = match error.metadata.as_ref()?.source.as_ref()? {
        figment::Source::File(p) => std::fs::canonicalize(p)
            .unwrap_or_else(|_| p.clone())
            .display()
            .to_string(),
        _ => return None,
    };
    let (name, content) = toml_sources.iter().find(|(p, _)| *p == path)?;
    let section: Vec<String> = error.path.iter().map(|s| s.to_string()).collect();
    let offset = find_key_offset(content, &section, field)?;
    Some((
        SourceSpan::new(offset.into(), field.len()),
        NamedSource::new(name, content.clone()),
    ))
}

/// Byte offset of `field` within its section of raw TOML text.
///
/// With `path = ["queue"]` and `field = "concurency"` this finds the
/// `[queue]` header and scans line starts after it. An empty path scans from
/// the top of the file.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let start = match path.first() {
        None => 0,
        Some(section) => {
            let header = format!("[{section}]");
            content.find(&header)? + header.len()
        }
    };

    let mut at = start;
    for line in content[start..].split_inclusive('\n') {
        let key = line.trim_start();
        if let Some(rest) = key.strip_prefix(field) {
            // Reject prefixes of longer keys: the next byte must close the key.
            if rest.starts_with(['=', ' ', '\t']) {
                return Some(at + (line.len() - key.len()));
            }
        }
        at += line.len();
    }

    None
}

/// Closest valid key by Jaro-Winkler similarity, above the threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print every error to stderr through miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}
