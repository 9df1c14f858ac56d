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

use std::time::Duration;

/// The `grant_type` sent to GDC-H exchange endpoints.
///
/// These endpoints expect the `token-type` URN, not the
/// `grant-type:token-exchange` URN from RFC 8693.
pub(crate) const TOKEN_EXCHANGE_GRANT_TYPE: &str =
    "urn:ietf:params:oauth:token-type:token-exchange";
/// Access Token OAuth Token Type
pub(crate) const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
/// Kubernetes service account token type, used for the bootstrap token.
pub(crate) const SERVICE_ACCOUNT_TOKEN_TYPE: &str =
    "urn:k8s:params:oauth:token-type:serviceaccount";

pub(crate) const GOOGLE_APPLICATION_CREDENTIALS_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub(crate) const GOOGLE_CLOUD_QUOTA_PROJECT_VAR: &str = "GOOGLE_CLOUD_QUOTA_PROJECT";

/// The header used to attribute quota and billing.
pub(crate) const QUOTA_PROJECT_KEY: &str = "x-goog-user-project";

/// Tokens expiring within this window are treated as expired, this absorbs
/// clock skew between the workload and the token issuer.
pub(crate) const REFRESH_THRESHOLD: Duration = Duration::from_secs(3 * 60 + 45);
