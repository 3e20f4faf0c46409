// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parlor reconciliation core.

use thiserror::Error;

/// The primary error type used across all Parlor crates.
#[derive(Debug, Error)]
pub enum ParlorError {
    /// Input rejected before any record was written (absent or malformed identity,
    /// empty tenant, unparseable address).
    #[error("validation error: {0}")]
    Validation(String),

    /// Storage backend errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Outbound delivery errors. `retryable` decides whether the sync queue
    /// backs off and retries or records a terminal failure.
    #[error("delivery error: {message}")]
    Delivery {
        message: String,
        retryable: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration values that passed loading but are unusable at runtime.
    #[error("configuration error: {0}")]
    Config(String),

    /// Payload snapshot encode/decode failures.
    #[error("serialization error: {source}")]
    Serialization {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors that indicate a bug, not bad input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParlorError {
    /// True when the sync queue should schedule another attempt for this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ParlorError::Delivery { retryable, .. } => *retryable,
            ParlorError::Storage { .. } => true,
            _ => false,
        }
    }
}
