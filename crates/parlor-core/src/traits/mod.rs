// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! External systems (the partner CRM, the chat provider's address directory)
//! are consumed through these narrow contracts with `#[async_trait]` for
//! dynamic dispatch.

pub mod alias;
pub mod crm;

pub use alias::AliasResolver;
pub use crm::CrmClient;
