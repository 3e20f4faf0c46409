// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity normalization: pure functions mapping raw channel addresses to
//! canonical matching keys.
//!
//! Every channel addresses the same human differently (phone in assorted
//! formats, mailbox address, or an opaque pseudo-identifier). These functions
//! produce the canonical keys contacts are matched on. No I/O happens here;
//! pseudo-identifier resolution goes through [`crate::traits::AliasResolver`].

use crate::error::ParlorError;

/// Suffix some chat providers use for "linked id" addresses that substitute
/// an opaque numeric id for the real phone number.
pub const LINKED_ID_SUFFIX: &str = "@lid";

/// Normalize a raw phone number to its canonical matching form.
///
/// Keeps digits, `+`, `*` (mask wildcard), and `#` (extension separator);
/// drops everything else. A leading `00` international prefix becomes `+`.
/// Returns `None` when nothing phone-like remains. Idempotent: applying it
/// twice yields the same output as once.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '0'..='9' | '+' | '*' | '#' => out.push(c),
            _ => {}
        }
    }
    if let Some(rest) = out.strip_prefix("00") {
        out = format!("+{rest}");
    }
    if out.is_empty() { None } else { Some(out) }
}

/// Normalize a raw mailbox address: trim and lowercase.
///
/// Returns `None` unless the result has exactly one `@` with non-empty
/// local and domain parts.
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let (local, domain) = trimmed.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Canonical matching keys derived from one raw channel address.
///
/// Exactly one of the three fields is populated. An `alias` means the
/// address was a pseudo-identifier that could not be classified as a real
/// phone or mailbox address; it becomes the contact's matching key for that
/// channel until deferred resolution recovers the real number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalIdentity {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub alias: Option<String>,
}

impl CanonicalIdentity {
    pub fn from_phone(phone: impl Into<String>) -> Self {
        CanonicalIdentity { phone: Some(phone.into()), email: None, alias: None }
    }

    pub fn from_email(email: impl Into<String>) -> Self {
        CanonicalIdentity { phone: None, email: Some(email.into()), alias: None }
    }

    pub fn from_alias(alias: impl Into<String>) -> Self {
        CanonicalIdentity { phone: None, email: None, alias: Some(alias.into()) }
    }

    /// Classify and normalize a raw channel address.
    ///
    /// Chat providers hand over addresses like `35799123456@s.whatsapp.net`
    /// (phone with a server suffix) or `204713986851234@lid` (pseudo-id).
    /// Mailbox adapters hand over plain addresses. The rules, in order:
    /// a `@lid` suffix is a pseudo-identifier; an `@` with letters in the
    /// local part is a mailbox address; anything else is treated as a phone
    /// number, keeping only the part before any `@`.
    pub fn from_raw(raw: &str) -> Result<CanonicalIdentity, ParlorError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ParlorError::Validation("empty address".into()));
        }
        if trimmed.ends_with(LINKED_ID_SUFFIX) {
            return Ok(CanonicalIdentity::from_alias(trimmed));
        }
        if let Some((local, _domain)) = trimmed.split_once('@') {
            if local.chars().any(|c| c.is_ascii_alphabetic()) {
                return match normalize_email(trimmed) {
                    Some(email) => Ok(CanonicalIdentity::from_email(email)),
                    None => Err(ParlorError::Validation(format!(
                        "unparseable mailbox address: {trimmed}"
                    ))),
                };
            }
            return match normalize_phone(local) {
                Some(phone) => Ok(CanonicalIdentity::from_phone(phone)),
                None => Err(ParlorError::Validation(format!(
                    "no phone digits in address: {trimmed}"
                ))),
            };
        }
        match normalize_phone(trimmed) {
            Some(phone) => Ok(CanonicalIdentity::from_phone(phone)),
            None => Err(ParlorError::Validation(format!(
                "unclassifiable address: {trimmed}"
            ))),
        }
    }
}
