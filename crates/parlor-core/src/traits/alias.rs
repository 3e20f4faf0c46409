// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pseudo-identifier resolution trait.

use async_trait::async_trait;

use crate::error::ParlorError;

/// Resolves a channel pseudo-identifier to the real raw phone address.
///
/// Backed by the chat provider's address directory in production. A lookup
/// miss is `Ok(None)`, not an error; ingestion never blocks on resolution
/// and retries happen asynchronously.
#[async_trait]
pub trait AliasResolver: Send + Sync {
    async fn resolve(&self, tenant_id: &str, alias: &str) -> Result<Option<String>, ParlorError>;
}
