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

//! [Google Distributed Cloud Hosted] (GDC-H) workload credentials.
//!
//! Workloads running in GDC-H prove their identity to a local token endpoint
//! using mutual TLS. That endpoint returns a short-lived *bootstrap token*,
//! which the credentials then trade for an access token using [OAuth 2.0
//! Token Exchange] against a second endpoint. The access token is scoped to
//! a single audience.
//!
//! The credentials are usually loaded from a JSON file:
//!
//! ```json
//! {
//!   "type": "gdch_workload_identity",
//!   "bootstrap_ca_cert_path": "/var/run/secrets/gdch/ca.pem",
//!   "bootstrap_cert_path": "/var/run/secrets/gdch/cert.pem",
//!   "bootstrap_key_path": "/var/run/secrets/gdch/key.pem",
//!   "bootstrap_token_endpoint": "https://identity.local/v1/token",
//!   "exchange_ca_cert_path": "/var/run/secrets/gdch/sts-ca.pem",
//!   "exchange_token_endpoint": "https://sts.example.com/v1/token",
//!   "audience": "https://my-service.example.com",
//!   "quota_project_id": "my-project"
//! }
//! ```
//!
//! # Example
//! ```no_run
//! # use google_cloud_gdch_auth::credentials::RefreshableCredentials;
//! # use google_cloud_gdch_auth::credentials::gdch::Builder;
//! # use google_cloud_gdch_auth::transport::ReqwestTransport;
//! # tokio_test::block_on(async {
//! let json = serde_json::json!({
//!     "type": "gdch_workload_identity",
//!     "bootstrap_ca_cert_path": "ca.pem",
//!     "bootstrap_cert_path": "cert.pem",
//!     "bootstrap_key_path": "key.pem",
//!     "bootstrap_token_endpoint": "https://identity.local/v1/token",
//!     "exchange_ca_cert_path": "sts-ca.pem",
//!     "exchange_token_endpoint": "https://sts.example.com/v1/token",
//! });
//! let mut credentials = Builder::new(json)
//!     .with_audience("https://my-service.example.com")
//!     .build()?;
//! credentials.refresh(&ReqwestTransport::new()).await?;
//! let headers = credentials.headers()?;
//! # Ok::<(), anyhow::Error>(())
//! # });
//! ```
//!
//! [Google Distributed Cloud Hosted]: https://cloud.google.com/distributed-cloud/hosted/docs
//! [OAuth 2.0 Token Exchange]: https://datatracker.ietf.org/doc/html/rfc8693

use crate::build_errors::Error as BuilderError;
use crate::constants::{ACCESS_TOKEN_TYPE, SERVICE_ACCOUNT_TOKEN_TYPE, TOKEN_EXCHANGE_GRANT_TYPE};
use crate::credentials::RefreshableCredentials;
use crate::errors;
use crate::headers_util::{ACCESS_TOKEN_REQUEST_TYPE, X_GOOG_API_CLIENT, metrics_header_value};
use crate::oauth2::{
    BodyEncoding, TokenEndpointRequest, handle_refresh_grant_response, token_endpoint_request,
};
use crate::token::Token;
use crate::transport::{ClientCertificate, Transport};
use crate::{BuildResult, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::Instrument;

pub(crate) const GDCH_CREDENTIALS_TYPE: &str = "gdch_workload_identity";

const CRED_TYPE: &str = "gdch";
const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// The trust material and endpoints. Never changes after [Builder::build].
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
struct Config {
    #[serde(default)]
    bootstrap_ca_cert_path: String,
    #[serde(default)]
    bootstrap_cert_path: String,
    #[serde(default)]
    bootstrap_key_path: String,
    #[serde(default)]
    bootstrap_token_endpoint: String,
    #[serde(default)]
    exchange_ca_cert_path: String,
    #[serde(default)]
    exchange_token_endpoint: String,
    #[serde(default)]
    audience: String,
    quota_project_id: Option<String>,
}

impl Config {
    fn validate(&self) -> BuildResult<()> {
        let required = [
            ("bootstrap_ca_cert_path", &self.bootstrap_ca_cert_path),
            ("bootstrap_cert_path", &self.bootstrap_cert_path),
            ("bootstrap_key_path", &self.bootstrap_key_path),
            ("bootstrap_token_endpoint", &self.bootstrap_token_endpoint),
            ("exchange_ca_cert_path", &self.exchange_ca_cert_path),
            ("exchange_token_endpoint", &self.exchange_token_endpoint),
        ];
        match required.into_iter().find(|(_, value)| value.is_empty()) {
            Some((name, _)) => Err(BuilderError::missing_field(name)),
            None => Ok(()),
        }
    }
}

/// A builder for GDC-H [Credentials].
///
/// Values set with the `with_*` functions override the values in the JSON
/// document passed to [Builder::new].
#[derive(Debug, Default)]
pub struct Builder {
    json: Option<Value>,
    bootstrap_ca_cert_path: Option<String>,
    bootstrap_cert_path: Option<String>,
    bootstrap_key_path: Option<String>,
    bootstrap_token_endpoint: Option<String>,
    exchange_ca_cert_path: Option<String>,
    exchange_token_endpoint: Option<String>,
    audience: Option<String>,
    quota_project_id: Option<String>,
}

impl Builder {
    /// Creates a builder from a GDC-H credentials JSON document.
    ///
    /// The document is only parsed by [build][Builder::build].
    pub fn new(json: Value) -> Self {
        Self {
            json: Some(json),
            ..Default::default()
        }
    }

    /// The CA certificate that signed the bootstrap endpoint's certificate.
    pub fn with_bootstrap_ca_cert_path<S: Into<String>>(mut self, v: S) -> Self {
        self.bootstrap_ca_cert_path = Some(v.into());
        self
    }

    /// The client certificate presented to the bootstrap endpoint.
    pub fn with_bootstrap_cert_path<S: Into<String>>(mut self, v: S) -> Self {
        self.bootstrap_cert_path = Some(v.into());
        self
    }

    /// The private key for the client certificate.
    pub fn with_bootstrap_key_path<S: Into<String>>(mut self, v: S) -> Self {
        self.bootstrap_key_path = Some(v.into());
        self
    }

    pub fn with_bootstrap_token_endpoint<S: Into<String>>(mut self, v: S) -> Self {
        self.bootstrap_token_endpoint = Some(v.into());
        self
    }

    /// The CA certificate that signed the exchange endpoint's certificate.
    pub fn with_exchange_ca_cert_path<S: Into<String>>(mut self, v: S) -> Self {
        self.exchange_ca_cert_path = Some(v.into());
        self
    }

    pub fn with_exchange_token_endpoint<S: Into<String>>(mut self, v: S) -> Self {
        self.exchange_token_endpoint = Some(v.into());
        self
    }

    /// The audience for the access tokens.
    pub fn with_audience<S: Into<String>>(mut self, v: S) -> Self {
        self.audience = Some(v.into());
        self
    }

    /// Sets the [quota project] for these credentials.
    ///
    /// [quota project]: https://cloud.google.com/docs/quotas/quota-project
    pub fn with_quota_project_id<S: Into<String>>(mut self, v: S) -> Self {
        self.quota_project_id = Some(v.into());
        self
    }

    /// Returns [Credentials] without a token.
    ///
    /// # Errors
    ///
    /// Returns a [BuilderError] if the JSON document is not a GDC-H
    /// credentials document, or if any of the certificate paths or endpoints
    /// is missing or empty.
    pub fn build(self) -> BuildResult<Credentials> {
        let mut config = match self.json {
            None => Config::default(),
            Some(json) => parse_config(json)?,
        };
        let overrides = [
            (&mut config.bootstrap_ca_cert_path, self.bootstrap_ca_cert_path),
            (&mut config.bootstrap_cert_path, self.bootstrap_cert_path),
            (&mut config.bootstrap_key_path, self.bootstrap_key_path),
            (&mut config.bootstrap_token_endpoint, self.bootstrap_token_endpoint),
            (&mut config.exchange_ca_cert_path, self.exchange_ca_cert_path),
            (&mut config.exchange_token_endpoint, self.exchange_token_endpoint),
            (&mut config.audience, self.audience),
        ];
        for (field, value) in overrides {
            if let Some(v) = value {
                *field = v;
            }
        }
        if self.quota_project_id.is_some() {
            config.quota_project_id = self.quota_project_id;
        }
        config.validate()?;
        Ok(Credentials {
            config,
            token: None,
        })
    }
}

fn parse_config(json: Value) -> BuildResult<Config> {
    let cred_type = json
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(BuilderError::missing_type)?;
    if cred_type != GDCH_CREDENTIALS_TYPE {
        return Err(BuilderError::unknown_type(cred_type));
    }
    serde_json::from_value(json).map_err(BuilderError::parsing)
}

/// GDC-H workload credentials.
///
/// Created with a [Builder], or loaded with
/// [load_from_file][crate::credentials::load_from_file]. The credentials have
/// no token until [refresh][RefreshableCredentials::refresh] succeeds.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    config: Config,
    token: Option<Token>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GdchCredentials")
            .field("config", &self.config)
            .field("token", &self.token)
            .finish()
    }
}

impl Credentials {
    /// Returns new credentials for `audience`.
    ///
    /// The new credentials share the trust material and endpoints, but not
    /// the token, which is only valid for the original audience.
    pub fn with_audience<S: Into<String>>(&self, audience: S) -> Self {
        let mut config = self.config.clone();
        config.audience = audience.into();
        Self {
            config,
            token: None,
        }
    }

    /// Returns new credentials using `quota_project_id`. The new credentials
    /// have no token.
    pub fn with_quota_project<S: Into<String>>(&self, quota_project_id: S) -> Self {
        let mut config = self.config.clone();
        config.quota_project_id = Some(quota_project_id.into());
        Self {
            config,
            token: None,
        }
    }

    pub fn audience(&self) -> &str {
        &self.config.audience
    }

    pub fn bootstrap_token_endpoint(&self) -> &str {
        &self.config.bootstrap_token_endpoint
    }

    pub fn exchange_token_endpoint(&self) -> &str {
        &self.config.exchange_token_endpoint
    }

    /// The expiration of the current token, if any.
    pub fn expiry(&self) -> Option<Instant> {
        self.token.as_ref().and_then(|t| t.expires_at)
    }

    async fn fetch_bootstrap_token(&self, transport: &dyn Transport) -> Result<BootstrapToken> {
        let request = TokenEndpointRequest::new(&self.config.bootstrap_token_endpoint, Map::new())
            .with_encoding(BodyEncoding::Json)
            .with_client_certificate(ClientCertificate::new(
                &self.config.bootstrap_cert_path,
                &self.config.bootstrap_key_path,
            ))
            .with_ca_cert_path(&self.config.bootstrap_ca_cert_path)
            .with_expected_status(StatusCode::CREATED);
        let response = token_endpoint_request(transport, request).await?;
        BootstrapToken::from_response(response)
    }

    async fn exchange(&self, transport: &dyn Transport, bootstrap: BootstrapToken) -> Result<Token> {
        let mut body = Map::new();
        body.insert("grant_type".into(), TOKEN_EXCHANGE_GRANT_TYPE.into());
        body.insert("audience".into(), self.config.audience.clone().into());
        body.insert("requested_token_type".into(), ACCESS_TOKEN_TYPE.into());
        body.insert("subject_token".into(), bootstrap.encode().into());
        body.insert("subject_token_type".into(), SERVICE_ACCOUNT_TOKEN_TYPE.into());

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(X_GOOG_API_CLIENT),
            HeaderValue::from_str(&metrics_header_value(ACCESS_TOKEN_REQUEST_TYPE, CRED_TYPE))
                .map_err(errors::non_retryable)?,
        );

        let request = TokenEndpointRequest::new(&self.config.exchange_token_endpoint, body)
            .with_headers(headers)
            .with_encoding(BodyEncoding::Json)
            .with_ca_cert_path(&self.config.exchange_ca_cert_path);
        let response = token_endpoint_request(transport, request).await?;
        let token_type = response
            .get("token_type")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TOKEN_TYPE)
            .to_string();
        let grant = handle_refresh_grant_response(response, None)?;
        Ok(Token {
            token: grant.access_token,
            token_type,
            expires_at: grant.expires_at,
        })
    }
}

#[async_trait::async_trait]
impl RefreshableCredentials for Credentials {
    async fn refresh(&mut self, transport: &dyn Transport) -> Result<()> {
        let span = tracing::info_span!(
            "gdch.refresh",
            audience = %self.config.audience,
            bootstrap_endpoint = %self.config.bootstrap_token_endpoint,
            exchange_endpoint = %self.config.exchange_token_endpoint,
        );
        let token = async {
            let bootstrap = self
                .fetch_bootstrap_token(transport)
                .await
                .inspect_err(|e| tracing::warn!("cannot get bootstrap token: {e}"))?;
            tracing::debug!("bootstrap token received");
            let token = self
                .exchange(transport, bootstrap)
                .await
                .inspect_err(|e| tracing::warn!("cannot exchange bootstrap token: {e}"))?;
            let expires_in = token
                .expires_at
                .map(|e| e.saturating_duration_since(Instant::now()).as_secs());
            tracing::debug!(?expires_in, "access token received");
            Ok::<Token, errors::CredentialsError>(token)
        }
        .instrument(span)
        .await?;
        self.token = Some(token);
        Ok(())
    }

    fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    fn quota_project_id(&self) -> Option<&str> {
        self.config.quota_project_id.as_deref()
    }
}

/// The token returned by the bootstrap endpoint.
///
/// It only lives until it is exchanged.
struct BootstrapToken(String);

impl BootstrapToken {
    // The bootstrap endpoint returns `{"status": {"token": "..."}}`.
    fn from_response(response: Map<String, Value>) -> Result<Self> {
        match response
            .get("status")
            .and_then(|s| s.get("token"))
            .and_then(Value::as_str)
        {
            Some(token) => Ok(Self(token.to_string())),
            None => Err(
                errors::non_retryable_from_str("no access token in bootstrap response")
                    .with_payload(Value::Object(response).to_string()),
            ),
        }
    }

    fn encode(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

impl std::fmt::Debug for BootstrapToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BootstrapToken").field(&"[censored]").finish()
    }
}
