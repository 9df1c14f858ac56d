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

//! The bootstrap endpoint requires mutual TLS, while the exchange endpoint
//! only requires the server to present a certificate signed by a custom CA.
//! The TLS configuration therefore travels with each [TransportRequest], and
//! a [Transport] implementation is expected to honor it.
//!
//! Most applications use [ReqwestTransport]. Applications with a different
//! HTTP stack, or tests, can provide their own implementation.

use crate::Result;
use crate::errors::{self, CredentialsError};
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A client certificate and its private key, both in PEM format.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientCertificate {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl ClientCertificate {
    /// Creates a new client certificate from the paths to the certificate
    /// and key files.
    pub fn new<C, K>(cert_path: C, key_path: K) -> Self
    where
        C: Into<PathBuf>,
        K: Into<PathBuf>,
    {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// The path to the PEM-encoded certificate.
    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    /// The path to the PEM-encoded private key.
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }
}

/// A request to a token endpoint, including the TLS configuration needed to
/// reach it.
#[derive(Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// If set, the client authenticates using this certificate (mutual TLS).
    pub client_certificate: Option<ClientCertificate>,
    /// If set, the server certificate must be signed by this CA.
    pub ca_cert_path: Option<PathBuf>,
}

impl std::fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Request bodies carry subject tokens.
        f.debug_struct("TransportRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body", &"[censored]")
            .field("client_certificate", &self.client_certificate)
            .field("ca_cert_path", &self.ca_cert_path)
            .finish()
    }
}

/// The status and body returned by a token endpoint.
#[derive(Clone, PartialEq)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("body", &format_args!("[{} bytes]", self.body.len()))
            .finish()
    }
}

/// Sends requests to token endpoints.
///
/// Implementations must not retry, and should return a transient
/// [CredentialsError] when the request could not be sent or the response
/// could not be read. HTTP error statuses are not errors at this level, they
/// are returned in the [TransportResponse].
#[async_trait::async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// A [Transport] based on [reqwest] with [rustls].
///
/// Each request builds a new client configured with the TLS material named
/// in the request. The certificate files are read on every request, so
/// rotated certificates are picked up without rebuilding the credentials.
///
/// # Example
/// ```
/// # use google_cloud_gdch_auth::transport::ReqwestTransport;
/// # use std::time::Duration;
/// let transport = ReqwestTransport::new().with_timeout(Duration::from_secs(30));
/// ```
///
/// [reqwest]: https://docs.rs/reqwest
/// [rustls]: https://docs.rs/rustls
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// Creates a transport without a timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a timeout applied to each request, from connecting until the
    /// response body is received.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn client(&self, request: &TransportRequest) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(certificate) = &request.client_certificate {
            let mut pem = read_pem(certificate.cert_path()).await?;
            if !pem.ends_with(b"\n") {
                pem.push(b'\n');
            }
            pem.extend(read_pem(certificate.key_path()).await?);
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                CredentialsError::new(false, "invalid client certificate or key", e)
            })?;
            builder = builder.identity(identity);
        }
        if let Some(path) = &request.ca_cert_path {
            let pem = read_pem(path).await?;
            let ca = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| CredentialsError::new(false, "invalid CA certificate", e))?;
            builder = builder.add_root_certificate(ca);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().map_err(errors::non_retryable)
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        let client = self.client(&request).await?;
        let response = client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(errors::retryable)?;
        let status = response.status();
        let body = response.bytes().await.map_err(errors::retryable)?;
        Ok(TransportResponse { status, body })
    }
}

async fn read_pem(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        CredentialsError::new(
            false,
            format!("cannot read PEM file {}", path.display()),
            e,
        )
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use std::error::Error as _;

    type TestResult = anyhow::Result<()>;

    // Used by tests in other modules.
    mockall::mock! {
        #[derive(Debug)]
        pub Transport { }

        #[async_trait::async_trait]
        impl Transport for Transport {
            async fn execute(&self, request: TransportRequest) -> Result<TransportResponse>;
        }
    }

    pub(crate) fn json_response(status: StatusCode, body: serde_json::Value) -> TransportResponse {
        TransportResponse {
            status,
            body: Bytes::from(body.to_string()),
        }
    }

    fn plain_request(url: String) -> TransportRequest {
        TransportRequest {
            method: Method::POST,
            url,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"{}"),
            client_certificate: None,
            ca_cert_path: None,
        }
    }

    #[test]
    fn client_certificate() {
        let cert = ClientCertificate::new("cert.pem", "key.pem");
        assert_eq!(cert.cert_path(), Path::new("cert.pem"));
        assert_eq!(cert.key_path(), Path::new("key.pem"));
    }

    #[test]
    fn debug_request() {
        let mut request = plain_request("https://example.com/token".to_string());
        request.body = Bytes::from_static(b"test-only-subject-token");
        let fmt = format!("{request:?}");
        assert!(!fmt.contains("test-only-subject-token"), "{fmt}");
        assert!(fmt.contains("https://example.com/token"), "{fmt}");
    }

    #[test]
    fn debug_response() {
        let response = TransportResponse {
            status: StatusCode::OK,
            body: Bytes::from_static(b"test-only-access-token"),
        };
        let fmt = format!("{response:?}");
        assert!(!fmt.contains("test-only-access-token"), "{fmt}");
        assert!(fmt.contains("22 bytes"), "{fmt}");
    }

    #[tokio::test]
    async fn execute_success() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/token"),
                request::headers(contains(("content-type", "application/json"))),
                request::body(json_decoded(eq(serde_json::json!({})))),
            ])
            .respond_with(status_code(201).body(r#"{"status":{"token":"test-only"}}"#)),
        );

        let mut request = plain_request(server.url("/token").to_string());
        request.headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        let response = ReqwestTransport::new()
            .with_timeout(Duration::from_secs(5))
            .execute(request)
            .await?;
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(
            response.body,
            Bytes::from_static(br#"{"status":{"token":"test-only"}}"#)
        );
        Ok(())
    }

    #[tokio::test]
    async fn execute_error_status_is_not_an_error() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/token"))
                .respond_with(status_code(503).body("try again")),
        );

        let request = plain_request(server.url("/token").to_string());
        let response = ReqwestTransport::new().execute(request).await?;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body, Bytes::from_static(b"try again"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_client_certificate() -> TestResult {
        let dir = tempfile::tempdir()?;
        let cert_path = dir.path().join("missing-cert.pem");
        let mut request = plain_request("https://127.0.0.1/token".to_string());
        request.client_certificate = Some(ClientCertificate::new(
            cert_path.clone(),
            dir.path().join("missing-key.pem"),
        ));

        let err = ReqwestTransport::new().execute(request).await.unwrap_err();
        assert!(!err.is_transient(), "{err:?}");
        assert!(
            err.to_string().contains(&cert_path.display().to_string()),
            "{err}"
        );
        let source = err
            .source()
            .and_then(|e| e.downcast_ref::<std::io::Error>());
        assert!(source.is_some(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn missing_ca_certificate() -> TestResult {
        let dir = tempfile::tempdir()?;
        let mut request = plain_request("https://127.0.0.1/token".to_string());
        request.ca_cert_path = Some(dir.path().join("missing-ca.pem"));

        let err = ReqwestTransport::new().execute(request).await.unwrap_err();
        assert!(!err.is_transient(), "{err:?}");
        assert!(err.to_string().contains("missing-ca.pem"), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn invalid_client_certificate() -> TestResult {
        let dir = tempfile::tempdir()?;
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, "not a certificate")?;
        std::fs::write(&key_path, "not a key")?;
        let mut request = plain_request("https://127.0.0.1/token".to_string());
        request.client_certificate = Some(ClientCertificate::new(cert_path, key_path));

        let err = ReqwestTransport::new().execute(request).await.unwrap_err();
        assert!(!err.is_transient(), "{err:?}");
        Ok(())
    }
}
