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

use std::path::{Path, PathBuf};

/// The error type for [Builder] and the credential loaders.
///
/// Only the shape of the credentials document is checked. The certificate
/// files are read, and the endpoints contacted, when the credentials are
/// refreshed.
///
/// # Example
/// ```
/// # use google_cloud_gdch_auth::credentials::gdch::Builder;
/// let err = Builder::default().build().unwrap_err();
/// assert!(err.is_missing_field());
/// assert_eq!(err.field(), Some("bootstrap_ca_cert_path"));
/// ```
///
/// [Builder]: crate::credentials::gdch::Builder
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// The credentials file could not be read, or no file was configured.
    pub fn is_loading(&self) -> bool {
        matches!(
            self.0,
            ErrorKind::Loading { .. } | ErrorKind::NotConfigured(_)
        )
    }

    /// The credentials document is not valid JSON, has no `type`, or has
    /// fields of the wrong type.
    pub fn is_parsing(&self) -> bool {
        matches!(self.0, ErrorKind::Parsing(_) | ErrorKind::MissingType)
    }

    /// The document describes some other kind of credentials.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self.0, ErrorKind::UnknownType(_))
    }

    /// A certificate path or endpoint is missing or empty.
    pub fn is_missing_field(&self) -> bool {
        matches!(self.0, ErrorKind::MissingField(_))
    }

    /// The credentials file that could not be read.
    pub fn path(&self) -> Option<&Path> {
        match &self.0 {
            ErrorKind::Loading { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The name of the missing field, as it appears in the JSON document.
    pub fn field(&self) -> Option<&str> {
        match &self.0 {
            ErrorKind::MissingField(field) => Some(field),
            _ => None,
        }
    }

    pub(crate) fn loading<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Error {
        Error(ErrorKind::Loading {
            path: path.into(),
            source,
        })
    }

    pub(crate) fn not_configured(source: std::env::VarError) -> Error {
        Error(ErrorKind::NotConfigured(source))
    }

    pub(crate) fn parsing(source: serde_json::Error) -> Error {
        Error(ErrorKind::Parsing(source))
    }

    pub(crate) fn missing_type() -> Error {
        Error(ErrorKind::MissingType)
    }

    pub(crate) fn unknown_type<S: Into<String>>(found: S) -> Error {
        Error(ErrorKind::UnknownType(found.into()))
    }

    pub(crate) fn missing_field(field: &'static str) -> Error {
        Error(ErrorKind::MissingField(field))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("cannot read the credentials file {}", .path.display())]
    Loading {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("GOOGLE_APPLICATION_CREDENTIALS does not name a credentials file")]
    NotConfigured(#[source] std::env::VarError),
    #[error("cannot parse the credentials document: {0}")]
    Parsing(#[source] serde_json::Error),
    #[error("the credentials document has no `type` string")]
    MissingType,
    #[error("expected credentials of type `gdch_workload_identity`, found `{0}`")]
    UnknownType(String),
    #[error("missing or empty required field `{0}`")]
    MissingField(&'static str),
}
