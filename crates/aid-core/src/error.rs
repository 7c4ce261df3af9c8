//! Error taxonomy for the discovery pipeline.
//!
//! Every failure that can terminate a resolution is an [`AidError`]. Each
//! variant maps to a stable [`ErrorCode`] which is what fixtures, reports and
//! outer layers match on; the variant fields carry human-oriented detail.
//!
//! Field-level schema violations are not errors: they are collected into a
//! [`ValidationResult`](crate::validation::ValidationResult).

use serde::{Deserialize, Serialize};

use crate::record::ArtifactKind;

/// Stable, wire-visible error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DnsNotFound,
    DnsTimeout,
    DnsServfail,
    InvalidRecordFormat,
    FetchTimeout,
    FetchHttpError,
    RedirectLoop,
    UnsupportedScheme,
    PayloadTooLarge,
    MalformedPayload,
    UnsupportedVersion,
}

impl ErrorCode {
    /// The code as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DnsNotFound => "DNS_NOT_FOUND",
            ErrorCode::DnsTimeout => "DNS_TIMEOUT",
            ErrorCode::DnsServfail => "DNS_SERVFAIL",
            ErrorCode::InvalidRecordFormat => "INVALID_RECORD_FORMAT",
            ErrorCode::FetchTimeout => "FETCH_TIMEOUT",
            ErrorCode::FetchHttpError => "FETCH_HTTP_ERROR",
            ErrorCode::RedirectLoop => "REDIRECT_LOOP",
            ErrorCode::UnsupportedScheme => "UNSUPPORTED_SCHEME",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::MalformedPayload => "MALFORMED_PAYLOAD",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failures of the discovery pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AidError {
    #[error("no TXT record found at {name}")]
    DnsNotFound { name: String },

    #[error("DNS query for {name} timed out")]
    DnsTimeout { name: String },

    #[error("DNS server failure for {name}: {detail}")]
    DnsServfail { name: String, detail: String },

    #[error("invalid discovery record: {detail}")]
    InvalidRecordFormat { detail: String },

    #[error("fetch of {uri} timed out")]
    FetchTimeout { uri: String },

    #[error("fetch of {uri} failed: {detail}")]
    FetchHttpError {
        uri: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("too many redirects fetching {uri} (limit {limit})")]
    RedirectLoop { uri: String, limit: usize },

    #[error("unsupported URI scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("payload from {uri} exceeds {limit} bytes")]
    PayloadTooLarge { uri: String, limit: usize },

    #[error("malformed {kind} payload: {detail}")]
    MalformedPayload { kind: ArtifactKind, detail: String },

    #[error("unsupported {kind} version: {version}")]
    UnsupportedVersion { kind: ArtifactKind, version: String },
}

impl AidError {
    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            AidError::DnsNotFound { .. } => ErrorCode::DnsNotFound,
            AidError::DnsTimeout { .. } => ErrorCode::DnsTimeout,
            AidError::DnsServfail { .. } => ErrorCode::DnsServfail,
            AidError::InvalidRecordFormat { .. } => ErrorCode::InvalidRecordFormat,
            AidError::FetchTimeout { .. } => ErrorCode::FetchTimeout,
            AidError::FetchHttpError { .. } => ErrorCode::FetchHttpError,
            AidError::RedirectLoop { .. } => ErrorCode::RedirectLoop,
            AidError::UnsupportedScheme { .. } => ErrorCode::UnsupportedScheme,
            AidError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AidError::MalformedPayload { .. } => ErrorCode::MalformedPayload,
            AidError::UnsupportedVersion { .. } => ErrorCode::UnsupportedVersion,
        }
    }

    /// Whether a DNS failure is worth one more attempt.
    pub fn is_transient_dns(&self) -> bool {
        matches!(
            self,
            AidError::DnsTimeout { .. } | AidError::DnsServfail { .. }
        )
    }

    pub(crate) fn invalid_record(detail: impl Into<String>) -> Self {
        AidError::InvalidRecordFormat {
            detail: detail.into(),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, AidError>;
