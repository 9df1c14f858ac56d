// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! OAuth 2.0 token endpoints share a few conventions: the request is a flat
//! set of parameters, errors are reported using the `error` and
//! `error_description` fields from [RFC 6749 Section 5.2], and successful
//! responses carry an `access_token` and its lifetime in `expires_in`.
//!
//! [RFC 6749 Section 5.2]: https://datatracker.ietf.org/doc/html/rfc6749#section-5.2

use crate::Result;
use crate::errors::{self, CredentialsError, is_retryable};
use crate::transport::{ClientCertificate, Transport, TransportRequest};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

// OAuth error codes that indicate a problem on the server side.
const RETRYABLE_ERROR_CODES: [&str; 3] =
    ["internal_failure", "server_error", "temporarily_unavailable"];

/// How the request parameters are encoded in the request body.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum BodyEncoding {
    /// `application/x-www-form-urlencoded`, the encoding defined by RFC 6749.
    #[default]
    Form,
    /// `application/json`.
    Json,
}

/// A request to an OAuth 2.0 token endpoint.
///
/// # Example
/// ```
/// # use google_cloud_gdch_auth::oauth2::{BodyEncoding, TokenEndpointRequest};
/// # use http::StatusCode;
/// let request = TokenEndpointRequest::new("https://example.com/token", serde_json::Map::new())
///     .with_encoding(BodyEncoding::Json)
///     .with_expected_status(StatusCode::CREATED);
/// ```
#[derive(Clone)]
pub struct TokenEndpointRequest {
    url: String,
    body: Map<String, Value>,
    headers: HeaderMap,
    encoding: BodyEncoding,
    client_certificate: Option<ClientCertificate>,
    ca_cert_path: Option<PathBuf>,
    expected_status: StatusCode,
}

impl TokenEndpointRequest {
    /// Creates a request to `url` with the given parameters.
    ///
    /// By default the parameters are form encoded and the endpoint is
    /// expected to return `200 OK`.
    pub fn new<S: Into<String>>(url: S, body: Map<String, Value>) -> Self {
        Self {
            url: url.into(),
            body,
            headers: HeaderMap::new(),
            encoding: BodyEncoding::default(),
            client_certificate: None,
            ca_cert_path: None,
            expected_status: StatusCode::OK,
        }
    }

    /// Adds headers to the request. The `content-type` header is always set
    /// from the [BodyEncoding].
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_encoding(mut self, encoding: BodyEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Authenticates the client with a certificate, using mutual TLS.
    pub fn with_client_certificate(mut self, certificate: ClientCertificate) -> Self {
        self.client_certificate = Some(certificate);
        self
    }

    /// Verifies the server certificate using the CA in `path`.
    pub fn with_ca_cert_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Overrides the status code expected on success.
    pub fn with_expected_status(mut self, status: StatusCode) -> Self {
        self.expected_status = status;
        self
    }

    fn into_transport_request(self) -> Result<TransportRequest> {
        let (content_type, body) = match self.encoding {
            BodyEncoding::Json => (
                JSON_CONTENT_TYPE,
                serde_json::to_vec(&self.body).map_err(errors::non_retryable)?,
            ),
            BodyEncoding::Form => (FORM_CONTENT_TYPE, form_encode(&self.body).into_bytes()),
        };
        let mut headers = self.headers;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Ok(TransportRequest {
            method: Method::POST,
            url: self.url,
            headers,
            body: Bytes::from(body),
            client_certificate: self.client_certificate,
            ca_cert_path: self.ca_cert_path,
        })
    }
}

impl std::fmt::Debug for TokenEndpointRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEndpointRequest")
            .field("url", &self.url)
            .field("body", &"[censored]")
            .field("headers", &self.headers)
            .field("encoding", &self.encoding)
            .field("client_certificate", &self.client_certificate)
            .field("ca_cert_path", &self.ca_cert_path)
            .field("expected_status", &self.expected_status)
            .finish()
    }
}

fn form_encode(body: &Map<String, Value>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in body {
        match value {
            Value::String(s) => serializer.append_pair(key, s),
            other => serializer.append_pair(key, &other.to_string()),
        };
    }
    serializer.finish()
}

/// Sends a request to a token endpoint and returns the JSON object in the
/// response.
///
/// # Errors
///
/// Returns a [CredentialsError] if the request cannot be sent, if the
/// response status is not the expected one, or if the response is not a JSON
/// object. When the endpoint returned a response, the error carries the raw
/// response body in its [payload][CredentialsError::payload].
pub async fn token_endpoint_request(
    transport: &dyn Transport,
    request: TokenEndpointRequest,
) -> Result<Map<String, Value>> {
    let expected_status = request.expected_status;
    let response = transport.execute(request.into_transport_request()?).await?;
    if response.status != expected_status {
        return Err(error_response(response.status, &response.body));
    }
    serde_json::from_slice::<Map<String, Value>>(&response.body).map_err(|e| {
        CredentialsError::new(false, "cannot parse token endpoint response", e)
            .with_payload(String::from_utf8_lossy(&response.body))
    })
}

#[derive(serde::Deserialize)]
struct ErrorResponse {
    error: String,
    error_description: Option<String>,
    error_uri: Option<String>,
}

fn error_response(status: StatusCode, body: &Bytes) -> CredentialsError {
    let payload = String::from_utf8_lossy(body).into_owned();
    let details = serde_json::from_slice::<ErrorResponse>(body).ok();
    let transient = is_retryable(status)
        || details
            .as_ref()
            .is_some_and(|d| RETRYABLE_ERROR_CODES.contains(&d.error.as_str()));
    let message = match details {
        None => format!("token endpoint returned {status}"),
        Some(d) => {
            let mut message = format!("token endpoint returned {status}: {}", d.error);
            if let Some(description) = d.error_description {
                message.push_str(&format!(": {description}"));
            }
            if let Some(uri) = d.error_uri {
                message.push_str(&format!(" ({uri})"));
            }
            message
        }
    };
    CredentialsError::from_msg(transient, message).with_payload(payload)
}

/// The fields extracted from a successful token response.
#[derive(Clone, PartialEq)]
pub struct RefreshGrant {
    pub access_token: String,
    /// The refresh token in the response, or the one provided by the caller
    /// if the response did not include one.
    pub refresh_token: Option<String>,
    /// Computed from `expires_in`, if present.
    pub expires_at: Option<Instant>,
    /// The full response.
    pub extra: Map<String, Value>,
}

impl std::fmt::Debug for RefreshGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGrant")
            .field("access_token", &"[censored]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[censored]"))
            .field("expires_at", &self.expires_at)
            .field("extra", &"[censored]")
            .finish()
    }
}

/// Extracts the access token, refresh token, and expiration from a standard
/// token response.
///
/// # Errors
///
/// Returns a non-transient [CredentialsError] if the response has no
/// `access_token`, or if `expires_in` is not a number of seconds.
pub fn handle_refresh_grant_response(
    response: Map<String, Value>,
    refresh_token: Option<String>,
) -> Result<RefreshGrant> {
    let Some(access_token) = response.get("access_token").and_then(Value::as_str) else {
        return Err(errors::non_retryable_from_str("no access token in response")
            .with_payload(Value::Object(response).to_string()));
    };
    let access_token = access_token.to_string();
    let refresh_token = response
        .get("refresh_token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or(refresh_token);
    let expires_at = match parse_expires_in(&response)? {
        None => None,
        Some(seconds) => Some(
            Instant::now()
                .checked_add(Duration::from_secs(seconds))
                .ok_or_else(|| invalid_expires_in(&response))?,
        ),
    };
    Ok(RefreshGrant {
        access_token,
        refresh_token,
        expires_at,
        extra: response,
    })
}

fn invalid_expires_in(response: &Map<String, Value>) -> CredentialsError {
    errors::non_retryable_from_str("invalid expires_in in token response")
        .with_payload(Value::Object(response.clone()).to_string())
}

// Some token endpoints send `expires_in` as a string, or as a float.
// Fractional seconds are truncated.
fn parse_expires_in(response: &Map<String, Value>) -> Result<Option<u64>> {
    let seconds = |v: f64| (v.is_finite() && v >= 0.0).then(|| v.trunc() as u64);
    let parsed = match response.get("expires_in") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().and_then(seconds)),
        Some(Value::String(s)) => s
            .parse::<u64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().and_then(seconds)),
        Some(_) => None,
    };
    parsed.map(Some).ok_or_else(|| invalid_expires_in(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportResponse;
    use crate::transport::tests::{MockTransport, json_response};
    use serde_json::json;
    use std::path::Path;
    use test_case::test_case;

    type TestResult = anyhow::Result<()>;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test params must be a JSON object"),
        }
    }

    #[tokio::test]
    async fn json_request() -> TestResult {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .withf(|r| {
                let body = serde_json::from_slice::<Value>(&r.body).unwrap();
                r.method == Method::POST
                    && r.url == "https://example.com/token"
                    && r.headers.get(CONTENT_TYPE).unwrap() == JSON_CONTENT_TYPE
                    && r.headers.get("x-test-only").unwrap() == "value"
                    && body == json!({"a": "b", "n": 42})
                    && r.client_certificate == Some(ClientCertificate::new("c.pem", "k.pem"))
                    && r.ca_cert_path.as_deref() == Some(Path::new("ca.pem"))
            })
            .return_once(|_| Ok(json_response(StatusCode::CREATED, json!({"ok": true}))));

        let mut headers = HeaderMap::new();
        headers.insert("x-test-only", HeaderValue::from_static("value"));
        let request =
            TokenEndpointRequest::new("https://example.com/token", params(json!({"a": "b", "n": 42})))
                .with_headers(headers)
                .with_encoding(BodyEncoding::Json)
                .with_client_certificate(ClientCertificate::new("c.pem", "k.pem"))
                .with_ca_cert_path("ca.pem")
                .with_expected_status(StatusCode::CREATED);
        let response = token_endpoint_request(&transport, request).await?;
        assert_eq!(Value::Object(response), json!({"ok": true}));
        Ok(())
    }

    #[tokio::test]
    async fn form_request() -> TestResult {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .withf(|r| {
                let body = std::str::from_utf8(&r.body).unwrap();
                r.headers.get(CONTENT_TYPE).unwrap() == FORM_CONTENT_TYPE
                    && body.contains("grant_type=refresh_token")
                    && body.contains("scope=a+b")
                    && r.client_certificate.is_none()
                    && r.ca_cert_path.is_none()
            })
            .return_once(|_| Ok(json_response(StatusCode::OK, json!({"ok": true}))));

        let request = TokenEndpointRequest::new(
            "https://example.com/token",
            params(json!({"grant_type": "refresh_token", "scope": "a b"})),
        );
        let response = token_endpoint_request(&transport, request).await?;
        assert_eq!(response.get("ok"), Some(&json!(true)));
        Ok(())
    }

    #[tokio::test]
    async fn unexpected_status() -> TestResult {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .return_once(|_| Ok(json_response(StatusCode::OK, json!({"status": {}}))));

        let request = TokenEndpointRequest::new("https://example.com/token", Map::new())
            .with_expected_status(StatusCode::CREATED);
        let err = token_endpoint_request(&transport, request)
            .await
            .unwrap_err();
        assert!(!err.is_transient(), "{err:?}");
        assert_eq!(err.payload(), Some(r#"{"status":{}}"#));
        assert!(err.to_string().contains("200 OK"), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn oauth_error_details() -> TestResult {
        let mut transport = MockTransport::new();
        transport.expect_execute().times(1).return_once(|_| {
            Ok(json_response(
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "invalid_grant",
                    "error_description": "subject token expired",
                    "error_uri": "https://example.com/help",
                }),
            ))
        });

        let request = TokenEndpointRequest::new("https://example.com/token", Map::new());
        let err = token_endpoint_request(&transport, request)
            .await
            .unwrap_err();
        assert!(!err.is_transient(), "{err:?}");
        let fmt = err.to_string();
        assert!(fmt.contains("400 Bad Request"), "{fmt}");
        assert!(fmt.contains("invalid_grant: subject token expired"), "{fmt}");
        assert!(fmt.contains("https://example.com/help"), "{fmt}");
        assert!(err.payload().unwrap().contains("invalid_grant"), "{err:?}");
        Ok(())
    }

    #[test_case(StatusCode::SERVICE_UNAVAILABLE, json!({}), true)]
    #[test_case(StatusCode::TOO_MANY_REQUESTS, json!("busy"), true)]
    #[test_case(StatusCode::BAD_REQUEST, json!({"error": "temporarily_unavailable"}), true)]
    #[test_case(StatusCode::BAD_REQUEST, json!({"error": "server_error"}), true)]
    #[test_case(StatusCode::BAD_REQUEST, json!({"error": "internal_failure"}), true)]
    #[test_case(StatusCode::BAD_REQUEST, json!({"error": "invalid_request"}), false)]
    #[test_case(StatusCode::UNAUTHORIZED, json!({}), false)]
    #[tokio::test]
    async fn error_classification(status: StatusCode, body: Value, transient: bool) -> TestResult {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .return_once(move |_| Ok(json_response(status, body)));

        let request = TokenEndpointRequest::new("https://example.com/token", Map::new());
        let err = token_endpoint_request(&transport, request)
            .await
            .unwrap_err();
        assert_eq!(err.is_transient(), transient, "{err:?}");
        assert!(err.payload().is_some(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn malformed_response() -> TestResult {
        let mut transport = MockTransport::new();
        transport.expect_execute().times(1).return_once(|_| {
            Ok(TransportResponse {
                status: StatusCode::OK,
                body: Bytes::from_static(b"not json"),
            })
        });

        let request = TokenEndpointRequest::new("https://example.com/token", Map::new());
        let err = token_endpoint_request(&transport, request)
            .await
            .unwrap_err();
        assert!(!err.is_transient(), "{err:?}");
        assert_eq!(err.payload(), Some("not json"));
        Ok(())
    }

    #[tokio::test]
    async fn transport_error_is_unchanged() -> TestResult {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .return_once(|_| Err(CredentialsError::from_msg(true, "test-only-network")));

        let request = TokenEndpointRequest::new("https://example.com/token", Map::new());
        let err = token_endpoint_request(&transport, request)
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err:?}");
        assert!(err.to_string().contains("test-only-network"), "{err}");
        assert!(err.payload().is_none(), "{err:?}");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_grant() -> TestResult {
        let response = params(json!({
            "access_token": "test-only-access-token",
            "expires_in": 3599,
            "issued_token_type": "urn:ietf:params:oauth:token-type:access_token",
            "token_type": "Bearer",
        }));
        let grant = handle_refresh_grant_response(response.clone(), None)?;
        assert_eq!(grant.access_token, "test-only-access-token");
        assert_eq!(grant.refresh_token, None);
        assert_eq!(
            grant.expires_at,
            Some(Instant::now() + Duration::from_secs(3599))
        );
        assert_eq!(grant.extra, response);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_grant_string_expires_in() -> TestResult {
        let response = params(json!({"access_token": "a", "expires_in": "60"}));
        let grant = handle_refresh_grant_response(response, None)?;
        assert_eq!(grant.expires_at, Some(Instant::now() + Duration::from_secs(60)));
        Ok(())
    }

    #[test_case(json!(3599.0))]
    #[test_case(json!(3599.9))]
    #[test_case(json!("3599.5"))]
    #[tokio::test(start_paused = true)]
    async fn refresh_grant_fractional_expires_in(expires_in: Value) -> TestResult {
        let response = params(json!({"access_token": "a", "expires_in": expires_in}));
        let grant = handle_refresh_grant_response(response, None)?;
        assert_eq!(
            grant.expires_at,
            Some(Instant::now() + Duration::from_secs(3599))
        );
        Ok(())
    }

    #[test]
    fn refresh_grant_no_expiration() -> TestResult {
        let response = params(json!({"access_token": "a"}));
        let grant = handle_refresh_grant_response(response, None)?;
        assert_eq!(grant.expires_at, None);
        Ok(())
    }

    #[test_case(json!("soon"))]
    #[test_case(json!(-5))]
    #[test_case(json!(-0.5))]
    #[test_case(json!("NaN"))]
    #[test_case(json!([3600]))]
    #[test_case(json!(u64::MAX))]
    #[test_case(json!(1e300))]
    fn refresh_grant_invalid_expires_in(expires_in: Value) {
        let response = params(json!({"access_token": "a", "expires_in": expires_in}));
        let err = handle_refresh_grant_response(response, None).unwrap_err();
        assert!(!err.is_transient(), "{err:?}");
        assert!(err.to_string().contains("expires_in"), "{err}");
    }

    #[test]
    fn refresh_grant_refresh_token() -> TestResult {
        let response = params(json!({"access_token": "a"}));
        let grant = handle_refresh_grant_response(response, Some("old".to_string()))?;
        assert_eq!(grant.refresh_token.as_deref(), Some("old"));

        let response = params(json!({"access_token": "a", "refresh_token": "new"}));
        let grant = handle_refresh_grant_response(response, Some("old".to_string()))?;
        assert_eq!(grant.refresh_token.as_deref(), Some("new"));
        Ok(())
    }

    #[test]
    fn refresh_grant_missing_access_token() {
        let response = params(json!({"expires_in": 3600, "token_type": "Bearer"}));
        let err = handle_refresh_grant_response(response, None).unwrap_err();
        assert!(!err.is_transient(), "{err:?}");
        assert!(err.to_string().contains("no access token in response"), "{err}");
        assert!(err.payload().unwrap().contains("expires_in"), "{err:?}");
    }

    #[test]
    fn debug_refresh_grant() -> TestResult {
        let response = params(json!({
            "access_token": "test-only-access",
            "refresh_token": "test-only-refresh",
        }));
        let grant = handle_refresh_grant_response(response, None)?;
        let fmt = format!("{grant:?}");
        assert!(!fmt.contains("test-only-access"), "{fmt}");
        assert!(!fmt.contains("test-only-refresh"), "{fmt}");
        Ok(())
    }
}
