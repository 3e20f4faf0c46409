// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP implementation of the partner-CRM client.
//!
//! Provides [`HttpCrmClient`], which handles request construction,
//! per-tenant bearer authentication, and mapping of HTTP outcomes onto
//! retryable versus terminal delivery errors. Each call makes exactly one
//! attempt; retry policy lives in the outbox, not here.

use std::time::Duration;

use async_trait::async_trait;
use parlor_core::{CrmClient, CrmCredentials, DeliveryPayload, ParlorError};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// API version header value the partner CRM requires on every call.
const API_VERSION: &str = "2021-07-28";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    #[serde(rename = "type")]
    message_type: &'a str,
    contact_id: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageResponse {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateContactRequest<'a> {
    location_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchContactsResponse {
    #[serde(default)]
    contacts: Vec<ContactBody>,
}

#[derive(Debug, Deserialize)]
struct ContactEnvelope {
    contact: ContactBody,
}

#[derive(Debug, Deserialize)]
struct ContactBody {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the partner CRM.
///
/// Credentials are per-tenant and travel inside each [`DeliveryPayload`], so
/// only the version header is part of the shared client; the bearer token is
/// attached per request.
#[derive(Debug, Clone)]
pub struct HttpCrmClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCrmClient {
    /// Creates a new partner-CRM client against `base_url` with the given
    /// request timeout.
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, ParlorError> {
        let mut headers = HeaderMap::new();
        headers.insert("Version", HeaderValue::from_static(API_VERSION));
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ParlorError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Search the CRM's contact directory, returning the best match's id.
    ///
    /// An unparseable success body counts as no match so the caller falls
    /// through to creation.
    async fn search_contact(
        &self,
        credentials: &CrmCredentials,
        query: &str,
    ) -> Result<Option<String>, ParlorError> {
        if query.is_empty() {
            return Ok(None);
        }

        let response = self
            .client
            .get(format!("{}/contacts/", self.base_url))
            .query(&[
                ("locationId", credentials.location_id.as_str()),
                ("query", query),
            ])
            .bearer_auth(&credentials.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            let body = response.text().await.map_err(transport_error)?;
            let parsed: SearchContactsResponse = serde_json::from_str(&body).unwrap_or_default();
            return Ok(parsed.contacts.into_iter().next().map(|c| c.id));
        }

        let body = response.text().await.unwrap_or_default();
        Err(delivery_error(status, &body))
    }
}

#[async_trait]
impl CrmClient for HttpCrmClient {
    async fn send_message(&self, payload: &DeliveryPayload) -> Result<String, ParlorError> {
        let Some(contact_id) = payload.external_contact_id.as_deref() else {
            return Err(ParlorError::Delivery {
                message: "delivery snapshot carries no partner contact id".into(),
                retryable: false,
                source: None,
            });
        };

        let request = SendMessageRequest {
            message_type: &payload.message_type,
            contact_id,
            message: &payload.body,
            conversation_id: payload.provider_conversation_id.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/conversations/messages", self.base_url))
            .bearer_auth(&payload.credentials.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        debug!(status = %status, message_id = %payload.message_id, "send response received");

        if status.is_success() {
            // A malformed success body is still a delivery; failing here
            // would re-send the message.
            let body = response.text().await.unwrap_or_default();
            let parsed: SendMessageResponse = serde_json::from_str(&body).unwrap_or_default();
            if parsed.message_id.is_none() {
                warn!(message_id = %payload.message_id, "CRM accepted message without returning an id");
            }
            return Ok(parsed
                .message_id
                .or(parsed.conversation_id)
                .unwrap_or_default());
        }

        let body = response.text().await.unwrap_or_default();
        Err(delivery_error(status, &body))
    }

    async fn ensure_contact(&self, payload: &DeliveryPayload) -> Result<String, ParlorError> {
        // The CRM matches phone queries on digits only.
        if let Some(phone) = payload.contact_phone.as_deref() {
            let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
            if let Some(id) = self.search_contact(&payload.credentials, &digits).await? {
                debug!(contact_id = %payload.contact_id, external_id = %id, "matched existing CRM contact by phone");
                return Ok(id);
            }
        }

        if let Some(email) = payload.contact_email.as_deref() {
            if let Some(id) = self.search_contact(&payload.credentials, email).await? {
                debug!(contact_id = %payload.contact_id, external_id = %id, "matched existing CRM contact by email");
                return Ok(id);
            }
        }

        let request = CreateContactRequest {
            location_id: &payload.credentials.location_id,
            phone: payload.contact_phone.as_deref(),
            email: payload.contact_email.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/contacts/", self.base_url))
            .bearer_auth(&payload.credentials.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        debug!(status = %status, contact_id = %payload.contact_id, "contact create response received");

        if status.is_success() {
            let body = response.text().await.map_err(transport_error)?;
            let envelope: ContactEnvelope =
                serde_json::from_str(&body).map_err(|e| ParlorError::Delivery {
                    message: format!("could not read contact id from CRM response: {e}"),
                    retryable: false,
                    source: Some(Box::new(e)),
                })?;
            return Ok(envelope.contact.id);
        }

        let body = response.text().await.unwrap_or_default();
        Err(delivery_error(status, &body))
    }
}

/// Network-level failures (connect, timeout, TLS) are always worth retrying.
fn transport_error(e: reqwest::Error) -> ParlorError {
    ParlorError::Delivery {
        message: format!("HTTP request failed: {e}"),
        retryable: true,
        source: Some(Box::new(e)),
    }
}

fn delivery_error(status: reqwest::StatusCode, body: &str) -> ParlorError {
    let message = if let Ok(api_err) = serde_json::from_str::<ApiErrorBody>(body) {
        match api_err.message {
            Some(m) => format!("partner CRM returned {status}: {m}"),
            None => format!("partner CRM returned {status}"),
        }
    } else {
        format!("partner CRM returned {status}: {body}")
    };
    ParlorError::Delivery {
        message,
        retryable: is_retryable_status(status),
        source: None,
    }
}

/// Returns true for HTTP status codes where a later attempt can succeed.
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 408 || status.as_u16() == 429 || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> HttpCrmClient {
        HttpCrmClient::new(base_url, 5).unwrap()
    }

    fn test_payload(external_contact_id: Option<&str>) -> DeliveryPayload {
        DeliveryPayload {
            tenant_id: "t1".into(),
            contact_id: "c1".into(),
            external_contact_id: external_contact_id.map(Into::into),
            provider_conversation_id: None,
            message_id: "m1".into(),
            message_type: "SMS".into(),
            body: "See you at the showing tomorrow".into(),
            contact_phone: Some("+15550001111".into()),
            contact_email: None,
            credentials: CrmCredentials {
                api_key: "test-api-key".into(),
                location_id: "loc-1".into(),
            },
        }
    }

    #[tokio::test]
    async fn send_message_success() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "conversationId": "conv-9",
            "messageId": "msg-9"
        });

        Mock::given(method("POST"))
            .and(path("/conversations/messages"))
            .and(header("Authorization", "Bearer test-api-key"))
            .and(header("Version", "2021-07-28"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let id = client
            .send_message(&test_payload(Some("crm-contact-1")))
            .await
            .unwrap();
        assert_eq!(id, "msg-9");
    }

    #[tokio::test]
    async fn send_message_maps_429_to_retryable() {
        let server = MockServer::start().await;

        let error_body = serde_json::json!({"message": "Rate limited"});

        Mock::given(method("POST"))
            .and(path("/conversations/messages"))
            .respond_with(ResponseTemplate::new(429).set_body_json(&error_body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .send_message(&test_payload(Some("crm-contact-1")))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Rate limited"), "got: {err}");
    }

    #[tokio::test]
    async fn send_message_maps_400_to_terminal() {
        let server = MockServer::start().await;

        let error_body = serde_json::json!({"message": "Invalid message type"});

        Mock::given(method("POST"))
            .and(path("/conversations/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(&error_body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .send_message(&test_payload(Some("crm-contact-1")))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Invalid message type"), "got: {err}");
    }

    #[tokio::test]
    async fn send_without_contact_id_is_terminal() {
        // No server: the call must fail before any request goes out.
        let client = HttpCrmClient::new("http://127.0.0.1:1", 5).unwrap();
        let err = client.send_message(&test_payload(None)).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn send_survives_unparseable_success_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/conversations/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_string("accepted"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let id = client
            .send_message(&test_payload(Some("crm-contact-1")))
            .await
            .unwrap();
        assert_eq!(id, "");
    }

    #[tokio::test]
    async fn ensure_contact_prefers_existing_remote_match() {
        let server = MockServer::start().await;

        // Phone search matches on digits only; no create call should follow.
        let search_body = serde_json::json!({
            "contacts": [{"id": "crm-contact-55"}]
        });

        Mock::given(method("GET"))
            .and(path("/contacts/"))
            .and(query_param("locationId", "loc-1"))
            .and(query_param("query", "15550001111"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&search_body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let id = client.ensure_contact(&test_payload(None)).await.unwrap();
        assert_eq!(id, "crm-contact-55");
    }

    #[tokio::test]
    async fn ensure_contact_creates_when_search_misses() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/contacts/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(&serde_json::json!({"contacts": []})),
            )
            .mount(&server)
            .await;

        let create_body = serde_json::json!({
            "contact": {"id": "crm-contact-7"}
        });

        Mock::given(method("POST"))
            .and(path("/contacts/"))
            .and(header("Authorization", "Bearer test-api-key"))
            .respond_with(ResponseTemplate::new(201).set_body_json(&create_body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let id = client.ensure_contact(&test_payload(None)).await.unwrap();
        assert_eq!(id, "crm-contact-7");
    }

    #[tokio::test]
    async fn ensure_contact_falls_back_to_email_search() {
        let server = MockServer::start().await;

        let mut payload = test_payload(None);
        payload.contact_phone = None;
        payload.contact_email = Some("ada@example.com".into());

        let search_body = serde_json::json!({
            "contacts": [{"id": "crm-contact-9"}]
        });

        Mock::given(method("GET"))
            .and(path("/contacts/"))
            .and(query_param("query", "ada@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&search_body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let id = client.ensure_contact(&payload).await.unwrap();
        assert_eq!(id, "crm-contact-9");
    }

    #[tokio::test]
    async fn ensure_contact_maps_503_to_retryable() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/contacts/"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.ensure_contact(&test_payload(None)).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
