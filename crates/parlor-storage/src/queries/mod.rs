// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.

pub mod aliases;
pub mod contacts;
pub mod conversations;
pub mod leases;
pub mod messages;
pub mod outbox;
