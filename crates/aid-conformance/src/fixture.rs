//! Conformance fixture format.
//!
//! A fixture file is one JSON object mapping fixture names to scripted
//! inputs and the outcome the resolver must produce for them:
//!
//! ```json
//! {
//!   "manifest-ok": {
//!     "dnsAnswers": ["v=1;k=manifest;u=https://example.com/agent.json"],
//!     "artifactPayload": { "name": "demo", "version": "1", "capabilities": [] },
//!     "expected": { "ok": true }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use aid_core::{select_record, ErrorCode, FieldErrorKind, Stage};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixtures shipped with this crate.
pub const BUILTIN_FIXTURES: &str = include_str!("../fixtures/conformance.json");

pub const DEFAULT_DOMAIN: &str = "example.com";

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("fixture file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("fixture {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Fixtures keyed by name. Iteration is in sorted name order.
pub type FixtureSet = BTreeMap<String, Fixture>;

/// One scripted resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Fixture {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_domain")]
    pub domain: String,

    /// TXT answers, in the order the DNS layer returns them.
    #[serde(default)]
    pub dns_answers: Vec<String>,

    /// Failures returned by the first queries, one per query.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_failures: Vec<ErrorCode>,

    /// Body served for the artifact. A JSON string is served as its text;
    /// any other JSON value is served serialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_payload: Option<Value>,

    /// HTTP status for the artifact response (default 200).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_status: Option<u16>,

    /// Where the artifact is served. Defaults to the `u` of the first
    /// parseable record in `dnsAnswers`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_uri: Option<String>,

    /// Pad the served body with trailing spaces to exactly this many bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_body_bytes: Option<usize>,

    /// Delay before every HTTP response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,

    /// Overall resolution deadline (`ResolveOptions` timeout).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirects: Vec<Redirect>,

    #[serde(default)]
    pub allow_insecure_http: bool,

    pub expected: Expectation,
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

/// A `302` from one URL to another (possibly relative) location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Redirect {
    pub from: String,
    pub to: String,
}

/// What a fixture must produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expectation {
    /// The resolution fails with this error.
    Error(ExpectedError),
    /// The resolution completes and validation reports this outcome.
    Outcome(ExpectedOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExpectedError {
    pub error_kind: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// DNS queries issued, retries included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExpectedOutcome {
    pub ok: bool,
    /// Serialized typed value; compared exactly when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Field errors in order; compared exactly when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ExpectedFieldError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedFieldError {
    pub path: String,
    pub kind: FieldErrorKind,
    /// Only compared when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Fixture {
    /// The artifact payload as given, before any padding.
    pub fn payload_bytes(&self) -> Option<Vec<u8>> {
        self.artifact_payload.as_ref().map(|payload| match payload {
            Value::String(text) => text.clone().into_bytes(),
            other => other.to_string().into_bytes(),
        })
    }

    /// Bytes the scripted HTTP server answers with.
    pub fn served_body(&self) -> Option<Vec<u8>> {
        let body = self.payload_bytes();
        match self.artifact_body_bytes {
            Some(size) => {
                let mut body = body.unwrap_or_default();
                body.resize(size.max(body.len()), b' ');
                Some(body)
            }
            None => body,
        }
    }

    /// URL the artifact payload is served from.
    pub fn payload_uri(&self) -> Option<String> {
        self.artifact_uri.clone().or_else(|| {
            select_record(&self.dns_answers)
                .ok()
                .and_then(|record| record.uri)
        })
    }

    fn check(&self, name: &str) -> Result<(), FixtureError> {
        let invalid = |reason: &str| FixtureError::Invalid {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if name.trim().is_empty() {
            return Err(invalid("fixture name is empty"));
        }
        let serves_artifact = self.artifact_payload.is_some()
            || self.artifact_status.is_some()
            || self.artifact_body_bytes.is_some();
        if serves_artifact && self.payload_uri().is_none()
        {
            return Err(invalid(
                "artifact given but no artifactUri and no record with u= to serve it at",
            ));
        }
        if let Some(status) = self.artifact_status {
            if !(100..=599).contains(&status) {
                return Err(invalid("artifactStatus is not an HTTP status"));
            }
        }
        if let (Some(size), Some(payload)) = (self.artifact_body_bytes, self.payload_bytes()) {
            if payload.len() > size {
                return Err(invalid("artifactBodyBytes is smaller than artifactPayload"));
            }
        }
        Ok(())
    }
}

/// Parse and check a fixture document.
pub fn parse_fixtures(text: &str) -> Result<FixtureSet, FixtureError> {
    let fixtures: FixtureSet = serde_json::from_str(text)?;
    for (name, fixture) in &fixtures {
        fixture.check(name)?;
    }
    Ok(fixtures)
}

/// Load a fixture file from disk.
pub fn load_fixtures(path: &Path) -> anyhow::Result<FixtureSet> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture file: {:?}", path))?;
    parse_fixtures(&text).with_context(|| format!("Invalid fixture file: {:?}", path))
}

/// The fixtures bundled with this crate.
pub fn builtin_fixtures() -> Result<FixtureSet, FixtureError> {
    parse_fixtures(BUILTIN_FIXTURES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_fixtures_parse() {
        let fixtures = builtin_fixtures().unwrap();
        assert!(fixtures.len() >= 10);
        let names: Vec<&String> = fixtures.keys().collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_expectation_shapes() {
        let fixtures = parse_fixtures(
            r#"{
                "a": { "dnsAnswers": [], "expected": { "errorKind": "DNS_NOT_FOUND", "stage": "DNS_LOOKUP" } },
                "b": { "dnsAnswers": ["v=1;k=txt;a=b"], "expected": { "ok": true, "attempts": 1 } }
            }"#,
        )
        .unwrap();

        match &fixtures["a"].expected {
            Expectation::Error(e) => {
                assert_eq!(e.error_kind, ErrorCode::DnsNotFound);
                assert_eq!(e.stage, Some(Stage::DnsLookup));
            }
            other => panic!("expected error expectation, got {other:?}"),
        }
        match &fixtures["b"].expected {
            Expectation::Outcome(o) => {
                assert!(o.ok);
                assert_eq!(o.attempts, Some(1));
            }
            other => panic!("expected outcome expectation, got {other:?}"),
        }
        assert_eq!(fixtures["b"].domain, DEFAULT_DOMAIN);
    }

    #[test]
    fn test_payload_defaults_to_record_uri() {
        let fixtures = parse_fixtures(
            r#"{ "m": {
                "dnsAnswers": ["junk", "v=1;k=manifest;u=https://example.com/a.json"],
                "artifactPayload": { "name": "x" },
                "expected": { "ok": false }
            } }"#,
        )
        .unwrap();
        let fixture = &fixtures["m"];
        assert_eq!(fixture.payload_uri().as_deref(), Some("https://example.com/a.json"));
        assert_eq!(fixture.payload_bytes().unwrap(), br#"{"name":"x"}"#.to_vec());
    }

    #[test]
    fn test_string_payload_served_verbatim() {
        let fixture: Fixture = serde_json::from_str(
            r#"{ "artifactUri": "https://example.com/x", "artifactPayload": "not json", "expected": { "ok": false } }"#,
        )
        .unwrap();
        assert_eq!(fixture.payload_bytes().unwrap(), b"not json".to_vec());
    }

    #[test]
    fn test_payload_without_uri_is_rejected() {
        let err = parse_fixtures(
            r#"{ "orphan": { "dnsAnswers": ["v=1;k=txt"], "artifactPayload": {}, "expected": { "ok": true } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, FixtureError::Invalid { ref name, .. } if name == "orphan"));
    }

    #[test]
    fn test_body_padded_to_requested_size() {
        let fixtures = parse_fixtures(
            r#"{ "big": {
                "dnsAnswers": ["v=1;k=manifest;u=https://example.com/a.json"],
                "artifactPayload": { "name": "x" },
                "artifactBodyBytes": 32,
                "delayMs": 5,
                "timeoutMs": 1000,
                "expected": { "errorKind": "PAYLOAD_TOO_LARGE" }
            } }"#,
        )
        .unwrap();
        let fixture = &fixtures["big"];
        let body = fixture.served_body().unwrap();
        assert_eq!(body.len(), 32);
        assert!(body.starts_with(br#"{"name":"x"}"#));
        assert!(body[12..].iter().all(|b| *b == b' '));
        assert_eq!(fixture.delay_ms, Some(5));
        assert_eq!(fixture.timeout_ms, Some(1000));
    }

    #[test]
    fn test_body_size_below_payload_is_rejected() {
        let err = parse_fixtures(
            r#"{ "short": {
                "dnsAnswers": ["v=1;k=manifest;u=https://example.com/a.json"],
                "artifactPayload": { "name": "x" },
                "artifactBodyBytes": 4,
                "expected": { "ok": true }
            } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, FixtureError::Invalid { ref name, .. } if name == "short"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = parse_fixtures(r#"{ "x": { "dnsAnswer": [], "expected": { "ok": true } } }"#)
            .unwrap_err();
        assert!(matches!(err, FixtureError::Parse(_)));
    }
}
