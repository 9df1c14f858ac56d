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

//! Google Cloud Client Libraries for Rust - Google Distributed Cloud Hosted
//! workload credentials
//!
//! **WARNING:** this crate is under active development. We expect multiple
//! breaking changes in the upcoming releases. Testing is also incomplete, we do
//! **not** recommend that you use this crate in production. We welcome feedback
//! about the APIs, documentation, missing features, bugs, etc.
//!
//! Workloads running in a [Google Distributed Cloud Hosted] (GDC-H) cluster
//! prove their identity to a local token endpoint using mutual TLS. The token
//! returned by that endpoint is short-lived and only meaningful inside the
//! cluster. To call other services the workload exchanges it, using the
//! [OAuth 2.0 Token Exchange] grant, for an access token scoped to a specific
//! audience.
//!
//! This crate implements that two step flow in
//! [credentials::gdch::Credentials]. The credentials hold the trust material
//! (certificate, key and CA paths), the two endpoints, the audience and an
//! optional [quota project]. Each call to
//! [refresh][credentials::RefreshableCredentials::refresh] performs both
//! requests and, only if both succeed, replaces the current access token and
//! its expiration.
//!
//! The crate does not cache tokens, retry failed requests, or serialize
//! concurrent refreshes. Those policies belong to the application.
//!
//! [Google Distributed Cloud Hosted]: https://cloud.google.com/distributed-cloud/hosted/docs
//! [OAuth 2.0 Token Exchange]: https://datatracker.ietf.org/doc/html/rfc8693
//! [quota project]: https://cloud.google.com/docs/quotas/quota-project

pub mod errors;

/// Errors created while constructing credentials.
pub mod build_errors;

/// Types and functions to work with GDC-H workload [Credentials].
///
/// [Credentials]: https://cloud.google.com/docs/authentication#credentials
pub mod credentials;

/// Types and functions to work with auth [Tokens].
///
/// [Tokens]: https://cloud.google.com/docs/authentication#token
pub mod token;

/// The HTTP transport used to reach the token endpoints.
pub mod transport;

/// Requests to OAuth 2.0 token endpoints and parsing of their responses.
pub mod oauth2;

pub(crate) mod constants;

/// Headers utility functions to work with Google Cloud authentication [Credentials].
///
/// [Credentials]: https://cloud.google.com/docs/authentication#credentials
pub(crate) mod headers_util;

/// A `Result` alias where the `Err` case is
/// `google_cloud_gdch_auth::errors::CredentialsError`.
pub(crate) type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;

/// A `Result` alias where the `Err` case is
/// `google_cloud_gdch_auth::build_errors::Error`.
pub(crate) type BuildResult<T> = std::result::Result<T, crate::build_errors::Error>;
