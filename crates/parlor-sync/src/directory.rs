// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-provider address directory lookups.
//!
//! Channel pseudo-identifiers (opaque `@lid`-style ids) can only be mapped
//! to phone numbers by the provider that minted them. [`HttpAliasResolver`]
//! asks the provider's contact directory; a directory that does not know
//! the number yet is a miss, not an error, and the resolution queue retries
//! later.

use std::time::Duration;

use async_trait::async_trait;
use parlor_core::{AliasResolver, ParlorError};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Suffix the provider puts on phone-bearing addresses.
const PHONE_JID_SUFFIX: &str = "@s.whatsapp.net";

#[derive(Debug, Serialize)]
struct FindContactsRequest<'a> {
    r#where: FindContactsWhere<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FindContactsWhere<'a> {
    remote_jid: &'a str,
}

/// The directory answers with an array of records, or a single record when
/// exactly one matches.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FindContactsResponse {
    Many(Vec<DirectoryRecord>),
    One(DirectoryRecord),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryRecord {
    #[serde(default)]
    remote_jid: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

impl DirectoryRecord {
    /// The phone number this record carries, if any of its addresses is a
    /// phone-bearing jid.
    fn phone(&self) -> Option<String> {
        [self.remote_jid.as_deref(), self.id.as_deref()]
            .into_iter()
            .flatten()
            .find_map(jid_to_phone)
    }
}

fn jid_to_phone(jid: &str) -> Option<String> {
    let raw = jid.strip_suffix(PHONE_JID_SUFFIX)?;
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    Some(format!("+{digits}"))
}

/// Directory-backed [`AliasResolver`] over the chat provider's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpAliasResolver {
    client: reqwest::Client,
    base_url: String,
    /// Fixed instance name; empty means the tenant id names the instance.
    instance: String,
}

impl HttpAliasResolver {
    pub fn new(
        base_url: impl Into<String>,
        api_key: &str,
        instance: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ParlorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key).map_err(|e| {
                ParlorError::Config(format!("invalid directory API key header value: {e}"))
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ParlorError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            instance: instance.into(),
        })
    }

    fn instance_for(&self, tenant_id: &str) -> String {
        if self.instance.is_empty() {
            tenant_id.to_string()
        } else {
            self.instance.clone()
        }
    }
}

#[async_trait]
impl AliasResolver for HttpAliasResolver {
    async fn resolve(&self, tenant_id: &str, alias: &str) -> Result<Option<String>, ParlorError> {
        let instance = self.instance_for(tenant_id);
        let request = FindContactsRequest {
            r#where: FindContactsWhere { remote_jid: alias },
        };

        let response = self
            .client
            .post(format!("{}/chat/findContacts/{instance}", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ParlorError::Delivery {
                message: format!("directory lookup failed: {e}"),
                retryable: true,
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParlorError::Delivery {
                message: format!("directory returned {status}: {body}"),
                retryable: true,
                source: None,
            });
        }

        let body = response.text().await.unwrap_or_default();
        let records = match serde_json::from_str::<FindContactsResponse>(&body) {
            Ok(FindContactsResponse::Many(records)) => records,
            Ok(FindContactsResponse::One(record)) => vec![record],
            // An answer we cannot read is a miss; the queue retries later.
            Err(_) => Vec::new(),
        };

        let phone = records.iter().find_map(DirectoryRecord::phone);
        debug!(alias, found = phone.is_some(), "directory lookup finished");
        Ok(phone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(base_url: &str, instance: &str) -> HttpAliasResolver {
        HttpAliasResolver::new(base_url, "dir-key", instance, 5).unwrap()
    }

    #[test]
    fn jid_to_phone_only_accepts_phone_bearing_jids() {
        assert_eq!(
            jid_to_phone("35799123456@s.whatsapp.net").as_deref(),
            Some("+35799123456")
        );
        assert_eq!(jid_to_phone("155731873509555@lid"), None);
        assert_eq!(jid_to_phone("@s.whatsapp.net"), None);
    }

    #[tokio::test]
    async fn resolves_alias_to_phone() {
        let server = MockServer::start().await;

        let body = serde_json::json!([
            {"remoteJid": "35799123456@s.whatsapp.net", "pushName": "Ada"}
        ]);

        Mock::given(method("POST"))
            .and(path("/chat/findContacts/inst-1"))
            .and(header("apikey", "dir-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let resolver = resolver(&server.uri(), "inst-1");
        let phone = resolver
            .resolve("t1", "155731873509555@lid")
            .await
            .unwrap();
        assert_eq!(phone.as_deref(), Some("+35799123456"));
    }

    #[tokio::test]
    async fn empty_instance_falls_back_to_tenant_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/findContacts/t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&serde_json::json!([])))
            .mount(&server)
            .await;

        let resolver = resolver(&server.uri(), "");
        let phone = resolver
            .resolve("t1", "155731873509555@lid")
            .await
            .unwrap();
        assert_eq!(phone, None);
    }

    #[tokio::test]
    async fn record_without_phone_jid_is_a_miss() {
        let server = MockServer::start().await;

        // Directory only knows the pseudo-identifier itself.
        let body = serde_json::json!([
            {"remoteJid": "155731873509555@lid"}
        ]);

        Mock::given(method("POST"))
            .and(path("/chat/findContacts/inst-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let resolver = resolver(&server.uri(), "inst-1");
        let phone = resolver
            .resolve("t1", "155731873509555@lid")
            .await
            .unwrap();
        assert_eq!(phone, None);
    }

    #[tokio::test]
    async fn single_object_response_is_accepted() {
        let server = MockServer::start().await;

        let body = serde_json::json!(
            {"id": "35799000001@s.whatsapp.net"}
        );

        Mock::given(method("POST"))
            .and(path("/chat/findContacts/inst-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let resolver = resolver(&server.uri(), "inst-1");
        let phone = resolver
            .resolve("t1", "155731873509555@lid")
            .await
            .unwrap();
        assert_eq!(phone.as_deref(), Some("+35799000001"));
    }

    #[tokio::test]
    async fn server_error_is_reported_not_swallowed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/findContacts/inst-1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let resolver = resolver(&server.uri(), "inst-1");
        let err = resolver
            .resolve("t1", "155731873509555@lid")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
