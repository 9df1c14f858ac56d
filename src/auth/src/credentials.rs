// Copyright 2024 Google LLC
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

pub mod gdch;

use crate::build_errors::Error as BuilderError;
use crate::constants::{GOOGLE_APPLICATION_CREDENTIALS_VAR, GOOGLE_CLOUD_QUOTA_PROJECT_VAR};
use crate::headers_util::build_bearer_headers;
use crate::token::Token;
use crate::transport::Transport;
use crate::{BuildResult, Result, errors};
use http::HeaderMap;
use std::path::Path;

/// Credentials that obtain their access token with an explicit refresh.
///
/// Authorized HTTP clients use this capability to attach an access token
/// (and, if configured, a quota project) to each outgoing request. The
/// credentials never refresh in the background. Call [refresh], or
/// [before_request] which refreshes only when needed.
///
/// Implementations hold their token exclusively, `refresh` requires a mutable
/// borrow. Applications that share credentials across tasks should wrap them,
/// for example in a `tokio::sync::Mutex`, which also guarantees a single
/// refresh at a time.
///
/// [refresh]: RefreshableCredentials::refresh
/// [before_request]: RefreshableCredentials::before_request
#[async_trait::async_trait]
pub trait RefreshableCredentials: std::fmt::Debug + Send + Sync {
    /// Fetches a new access token, replacing the current one.
    ///
    /// On error the current token, if any, is left unchanged and may still be
    /// used until it expires.
    async fn refresh(&mut self, transport: &dyn Transport) -> Result<()>;

    /// The current access token, `None` until the first successful refresh.
    fn token(&self) -> Option<&Token>;

    /// The [quota project] attached to requests, if any.
    ///
    /// [quota project]: https://cloud.google.com/docs/quotas/quota-project
    fn quota_project_id(&self) -> Option<&str>;

    /// Returns `true` if there is a token and it expires soon.
    fn is_expired(&self) -> bool {
        self.token().is_some_and(Token::is_expired)
    }

    /// Returns `true` if there is a token and it is not expired.
    fn is_valid(&self) -> bool {
        self.token().is_some_and(|t| !t.is_expired())
    }

    /// The headers that authorize a request using the current token.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials have never been refreshed, or if
    /// the token or quota project cannot be used as a header value.
    fn headers(&self) -> Result<HeaderMap> {
        let token = self.token().ok_or_else(|| {
            errors::non_retryable_from_str("the credentials have not been refreshed")
        })?;
        build_bearer_headers(token, &self.quota_project_id().map(str::to_string))
    }

    /// Refreshes the credentials if the token is missing or expired, then
    /// adds the authorization headers to `headers`.
    async fn before_request(
        &mut self,
        transport: &dyn Transport,
        headers: &mut HeaderMap,
    ) -> Result<()> {
        if !self.is_valid() {
            self.refresh(transport).await?;
        }
        headers.extend(self.headers()?);
        Ok(())
    }
}

/// Loads GDC-H credentials from a JSON file.
///
/// See [gdch] for the format of the file.
///
/// # Example
/// ```no_run
/// # use google_cloud_gdch_auth::credentials::load_from_file;
/// let credentials = load_from_file("/var/run/secrets/gdch.json")?
///     .with_audience("https://my-service.example.com");
/// # Ok::<(), google_cloud_gdch_auth::build_errors::Error>(())
/// ```
pub fn load_from_file<P: AsRef<Path>>(path: P) -> BuildResult<gdch::Credentials> {
    let path = path.as_ref();
    let contents =
        std::fs::read_to_string(path).map_err(|e| BuilderError::loading(path, e))?;
    let json = serde_json::from_str(&contents).map_err(BuilderError::parsing)?;
    gdch::Builder::new(json).build()
}

/// Loads GDC-H credentials from the file named by the
/// `GOOGLE_APPLICATION_CREDENTIALS` environment variable.
///
/// If `GOOGLE_CLOUD_QUOTA_PROJECT` is set, it overrides the quota project
/// found in the file.
pub fn load_from_env() -> BuildResult<gdch::Credentials> {
    let path =
        std::env::var(GOOGLE_APPLICATION_CREDENTIALS_VAR).map_err(BuilderError::not_configured)?;
    let credentials = load_from_file(path)?;
    match std::env::var(GOOGLE_CLOUD_QUOTA_PROJECT_VAR) {
        Ok(project) if !project.is_empty() => Ok(credentials.with_quota_project(project)),
        _ => Ok(credentials),
    }
}
