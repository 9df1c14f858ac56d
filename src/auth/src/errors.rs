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

//! Errors created while refreshing or using credentials.

use http::StatusCode;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result};
use std::sync::Arc;

/// Represents an error refreshing or using [Credentials].
///
/// Refreshing GDC-H credentials involves two requests: one to the bootstrap
/// endpoint (over mutual TLS) and one to the token exchange endpoint. Either
/// may fail. When the failure was caused by a response from one of these
/// endpoints, the raw response body is preserved in [payload] to help with
/// troubleshooting.
///
/// # Example
/// ```
/// # use google_cloud_gdch_auth::errors::CredentialsError;
/// let err = CredentialsError::from_msg(
///     true, "simulated retryable error while trying to refresh credentials");
/// assert!(err.is_transient());
/// assert!(format!("{err}").contains("simulated retryable error"));
/// ```
///
/// [Credentials]: crate::credentials::gdch::Credentials
/// [payload]: CredentialsError::payload
#[derive(Clone, Debug)]
pub struct CredentialsError {
    /// A boolean value indicating whether the error is transient.
    ///
    /// If `true`, the operation that resulted in this error might succeed upon
    /// retry. This crate never retries, applications decide if and when to
    /// try again.
    is_transient: bool,

    /// A message describing the failure, if any.
    message: Option<String>,

    /// The raw response body that caused the failure, if any.
    payload: Option<String>,

    /// The underlying source of the error.
    source: Option<Arc<dyn Error + Send + Sync>>,
}

impl CredentialsError {
    /// Creates a new `CredentialsError` with a message and a source.
    ///
    /// # Arguments
    /// * `is_transient` - A boolean indicating whether the error is transient.
    /// * `message` - A message describing the failure.
    /// * `source` - The underlying error that caused the failure.
    pub fn new<M, T>(is_transient: bool, message: M, source: T) -> Self
    where
        M: Into<String>,
        T: Error + Send + Sync + 'static,
    {
        CredentialsError {
            is_transient,
            message: Some(message.into()),
            payload: None,
            source: Some(Arc::new(source)),
        }
    }

    /// Creates a new `CredentialsError` from a message.
    ///
    /// # Arguments
    /// * `is_transient` - A boolean indicating whether the error is transient.
    /// * `message` - A message describing the failure.
    pub fn from_msg<M: Into<String>>(is_transient: bool, message: M) -> Self {
        CredentialsError {
            is_transient,
            message: Some(message.into()),
            payload: None,
            source: None,
        }
    }

    /// Creates a new `CredentialsError` from a source error.
    ///
    /// # Arguments
    /// * `is_transient` - A boolean indicating whether the error is transient.
    /// * `source` - The underlying error that caused the failure.
    pub fn from_source<T: Error + Send + Sync + 'static>(is_transient: bool, source: T) -> Self {
        CredentialsError {
            is_transient,
            message: None,
            payload: None,
            source: Some(Arc::new(source)),
        }
    }

    /// Attaches the raw response body that caused this error.
    pub(crate) fn with_payload<P: Into<String>>(mut self, payload: P) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Returns `true` if the error is transient and may succeed in future
    /// attempts.
    pub fn is_transient(&self) -> bool {
        self.is_transient
    }

    /// The raw response body received from the token endpoint, if the error
    /// was caused by such a response.
    ///
    /// The payload is kept verbatim. It may contain sensitive information, do
    /// not log it without review.
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }
}

impl std::error::Error for CredentialsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|arc| arc.as_ref() as &(dyn std::error::Error + 'static))
    }
}

const TRANSIENT_MSG: &str = "but future attempts may succeed";
const PERMANENT_MSG: &str = "and future attempts will not succeed";

impl Display for CredentialsError {
    /// Formats the error message to include retryability and source.
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let msg = if self.is_transient {
            TRANSIENT_MSG
        } else {
            PERMANENT_MSG
        };
        match (&self.message, &self.source) {
            (Some(message), Some(source)) => write!(
                f,
                "cannot refresh access token, {msg}: {message}, source: {source}"
            ),
            (Some(message), None) => write!(f, "cannot refresh access token, {msg}: {message}"),
            (None, Some(source)) => {
                write!(f, "cannot refresh access token, {msg}, source: {source}")
            }
            (None, None) => write!(f, "cannot refresh access token, {msg}"),
        }
    }
}

/// A helper to create a retryable error.
pub(crate) fn retryable<T: Error + Send + Sync + 'static>(source: T) -> CredentialsError {
    CredentialsError::from_source(true, source)
}

/// A helper to create a non-retryable error.
pub(crate) fn non_retryable<T: Error + Send + Sync + 'static>(source: T) -> CredentialsError {
    CredentialsError::from_source(false, source)
}

pub(crate) fn non_retryable_from_str<T: Into<String>>(message: T) -> CredentialsError {
    CredentialsError::from_msg(false, message)
}

pub(crate) fn is_retryable(c: StatusCode) -> bool {
    match c {
        // Internal server errors do not indicate that there is anything wrong
        // with our request, so we retry them.
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => true,
        _ => false,
    }
}
