//! Remote OData client — GET/POST/PATCH/DELETE with error classification
//! and retry (§4.2).

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::shaper::encode_query_param;
use crate::types::TenantCredentials;

const METADATA_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { initial_delay: Duration::from_secs(1), max_retries: 3 }
    }
}

pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    host: String,
    username: String,
    password: String,
    retry: RetryPolicy,
}

impl RemoteClient {
    pub fn new(tenant: &TenantCredentials) -> Result<Self, BridgeError> {
        Self::with_retry(tenant, RetryPolicy::default())
    }

    pub fn with_retry(tenant: &TenantCredentials, retry: RetryPolicy) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!tenant.verify_tls)
            .timeout(Duration::from_secs(tenant.timeout_secs))
            .build()
            .map_err(|e| BridgeError::Unexpected { kind: "client_build".into(), message: e.to_string() })?;

        Ok(Self {
            http,
            base_url: format!("https://{}/fmi/odata/v4/{}", tenant.host, tenant.database),
            host: tenant.host.clone(),
            username: tenant.username.clone(),
            password: tenant.password.clone(),
            retry,
        })
    }

    #[cfg(test)]
    pub(crate) fn for_test(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            host: "test-host".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
            retry: RetryPolicy { initial_delay: Duration::from_millis(1), max_retries: 1 },
        }
    }

    fn url_for(&self, path: &str) -> String {
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn encode_params(params: &[(&str, &str)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{k}={}", encode_query_param(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, BridgeError> {
        let query = Self::encode_params(params);
        let url = if query.is_empty() { self.url_for(path) } else { format!("{}?{}", self.url_for(path), query) };
        self.run_with_retry(|| async {
            let resp = self
                .http
                .get(&url)
                .basic_auth(&self.username, Some(&self.password))
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|e| transport_error(&self.host, &e))?;
            parse_response(resp).await
        })
        .await
    }

    /// Fetch `/$metadata` as XML with the extended 120s timeout (§4.2).
    pub async fn get_metadata_xml(&self) -> Result<String, BridgeError> {
        let resp = self
            .http
            .get(format!("{}/$metadata", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/xml")
            .timeout(Duration::from_secs(METADATA_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| transport_error(&self.host, &e))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_status(status.as_u16(), &body))
        }
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, BridgeError> {
        self.run_with_retry(|| async {
            let resp = self
                .http
                .post(self.url_for(path))
                .basic_auth(&self.username, Some(&self.password))
                .header("Accept", "application/json")
                .json(body)
                .send()
                .await
                .map_err(|e| transport_error(&self.host, &e))?;
            parse_response(resp).await
        })
        .await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, BridgeError> {
        self.run_with_retry(|| async {
            let resp = self
                .http
                .patch(self.url_for(path))
                .basic_auth(&self.username, Some(&self.password))
                .header("Accept", "application/json")
                .json(body)
                .send()
                .await
                .map_err(|e| transport_error(&self.host, &e))?;
            parse_response(resp).await
        })
        .await
    }

    pub async fn delete(&self, path: &str) -> Result<(), BridgeError> {
        self.run_with_retry(|| async {
            let resp = self
                .http
                .delete(self.url_for(path))
                .basic_auth(&self.username, Some(&self.password))
                .send()
                .await
                .map_err(|e| transport_error(&self.host, &e))?;
            let status = resp.status();
            if status.is_success() {
                Ok(())
            } else {
                let body = resp.text().await.unwrap_or_default();
                Err(classify_status(status.as_u16(), &body))
            }
        })
        .await
    }

    /// Exponential backoff for retryable (connection) failures only;
    /// authentication/not-found/query errors never retry (§4.2, §9).
    async fn run_with_retry<F, Fut, T>(&self, mut f: F) -> Result<T, BridgeError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, BridgeError>>,
    {
        let mut delay = self.retry.initial_delay;
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    warn!(attempt, error = %e, "retrying after connection failure");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn transport_error(host: &str, e: &reqwest::Error) -> BridgeError {
    debug!(error = %e, "transport error");
    BridgeError::Connection { host: host.to_string(), reason: e.to_string() }
}

async fn parse_response(resp: reqwest::Response) -> Result<Value, BridgeError> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if status.is_success() {
        serde_json::from_str(&body)
            .map_err(|e| BridgeError::Unexpected { kind: "invalid_json".into(), message: e.to_string() })
    } else {
        Err(classify_status(status.as_u16(), &body))
    }
}

/// Map an HTTP status and body to the three-kind error taxonomy (§4.2).
fn classify_status(status: u16, body: &str) -> BridgeError {
    match status {
        401 => BridgeError::Authentication { reason: extract_message(body) },
        404 => BridgeError::NotFound { what: extract_message(body) },
        _ => {
            let message = extract_message(body);
            let field_hint = field_hint_from_message(&message);
            BridgeError::Query { message, field_hint }
        }
    }
}

fn extract_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = parsed.get("error").and_then(|e| e.get("message")).and_then(|m| m.as_str()) {
            return msg.to_string();
        }
    }
    body.chars().take(500).collect()
}

/// If the server's error text names a field (property/field/column), extract
/// the quoted name as a hint to call get_schema (§4.2). FileMaker's OData
/// errors quote the offending property, e.g. "Could not find property
/// 'Customer Name' on type ...".
fn field_hint_from_message(message: &str) -> Option<String> {
    const KEYWORDS: [&str; 3] = ["property", "field", "column"];
    let lower = message.to_lowercase();
    if !KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return None;
    }
    let start = message.find(['\'', '"'])? + 1;
    let quote = message.as_bytes()[start - 1] as char;
    let end = message[start..].find(quote)?;
    Some(message[start..start + end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_401_is_auth() {
        assert!(matches!(classify_status(401, "{}"), BridgeError::Authentication { .. }));
    }

    #[test]
    fn classify_404_is_not_found() {
        assert!(matches!(classify_status(404, "{}"), BridgeError::NotFound { .. }));
    }

    #[test]
    fn classify_500_is_query_error_not_retried() {
        let e = classify_status(500, "{}");
        assert!(matches!(e, BridgeError::Query { .. }));
        assert!(!e.is_retryable());
    }

    #[test]
    fn classify_500_extracts_field_hint_from_property_error() {
        let body = r#"{"error":{"message":"Could not find property 'Zone' on type Invoices"}}"#;
        let e = classify_status(500, body);
        assert!(matches!(e, BridgeError::Query { field_hint: Some(ref f), .. } if f == "Zone"));
    }

    #[test]
    fn classify_500_leaves_field_hint_none_without_keyword() {
        let body = r#"{"error":{"message":"internal server error"}}"#;
        let e = classify_status(500, body);
        assert!(matches!(e, BridgeError::Query { field_hint: None, .. }));
    }

    #[test]
    fn extract_message_prefers_error_message() {
        let body = r#"{"error":{"message":"field not found"}}"#;
        assert_eq!(extract_message(body), "field not found");
    }

    #[test]
    fn extract_message_falls_back_to_truncated_body() {
        let long_body = "x".repeat(600);
        assert_eq!(extract_message(&long_body).len(), 500);
    }

    #[tokio::test]
    async fn get_returns_parsed_json_on_success() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/Invoices").query_param("$top", "1");
            then.status(200).header("content-type", "application/json").json_body(serde_json::json!({"value": [{"PrimaryKey": 1}]}));
        });

        let client = RemoteClient::for_test(server.base_url());
        let body = client.get("Invoices", &[("$top", "1")]).await.unwrap();
        mock.assert();
        assert_eq!(body["value"][0]["PrimaryKey"], 1);
    }

    #[tokio::test]
    async fn get_classifies_404_as_not_found() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/Ghost");
            then.status(404).json_body(serde_json::json!({"error": {"message": "table not found"}}));
        });

        let client = RemoteClient::for_test(server.base_url());
        let err = client.get("Ghost", &[]).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn get_exhausts_retries_on_unreachable_host() {
        // Port 0 never accepts connections, so every attempt hits the
        // connection-error branch and the retry loop runs to exhaustion.
        let client = RemoteClient::for_test("http://127.0.0.1:0".to_string());
        let err = client.get("Invoices", &[]).await.unwrap_err();
        assert!(matches!(err, BridgeError::Connection { .. }));
    }
}
