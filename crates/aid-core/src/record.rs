//! Discovery record parsing.
//!
//! A discovery record is the `;`-separated `key=value` payload of the TXT
//! record published at `_agent.<domain>`:
//!
//! ```text
//! v=1;k=manifest;u=https://example.com/.well-known/agent.json
//! ```
//!
//! Recognised keys are `v` (protocol version), `k` (artifact kind), `u`
//! (pointer URI) and `p` (pairing key). Unknown keys are ignored. When a key
//! repeats, the first occurrence wins.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AidError, Result};

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("valid version pattern"));

static QUOTED_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("valid quoted-string pattern"));

/// The closed set of artifact kinds a record can point to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// JSON manifest fetched over HTTPS.
    Manifest,
    /// JSON configuration document fetched over HTTPS.
    Config,
    /// Self-contained TXT payload.
    Txt,
    /// Self-contained pairing / key-exchange record.
    Pair,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Manifest,
        ArtifactKind::Config,
        ArtifactKind::Txt,
        ArtifactKind::Pair,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Manifest => "manifest",
            ArtifactKind::Config => "config",
            ArtifactKind::Txt => "txt",
            ArtifactKind::Pair => "pair",
        }
    }

    /// Kinds whose payload lives in the DNS answer itself.
    pub fn is_inline(&self) -> bool {
        matches!(self, ArtifactKind::Txt | ArtifactKind::Pair)
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = AidError;

    fn from_str(s: &str) -> Result<Self> {
        ArtifactKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AidError::invalid_record(format!("unknown artifact kind {s:?}")))
    }
}

/// Parsed form of a discovery TXT record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRecord {
    /// Protocol version (`^\d+$` or `^\d+\.\d+$`).
    pub version: String,
    pub kind: ArtifactKind,
    /// Absolute pointer URI. Always present for manifest/config records.
    pub uri: Option<String>,
    pub pairing_key: Option<String>,
    /// The TXT payload exactly as received.
    pub raw: String,
}

impl DiscoveryRecord {
    /// Parse a single TXT payload.
    ///
    /// # Errors
    ///
    /// `INVALID_RECORD_FORMAT` when `v` or `k` is missing, `k` is outside the
    /// closed kind set, `v` is not a numeric version, a segment lacks `=`,
    /// or the pointer URI is missing (manifest/config) or not absolute.
    pub fn parse(raw: &str) -> Result<Self> {
        let pairs = split_pairs(raw)?;
        let lookup = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        };

        let version = lookup("v").ok_or_else(|| AidError::invalid_record("missing required key v"))?;
        let kind_value =
            lookup("k").ok_or_else(|| AidError::invalid_record("missing required key k"))?;

        if !VERSION_PATTERN.is_match(&version) {
            return Err(AidError::invalid_record(format!(
                "version {version:?} is not numeric"
            )));
        }
        let kind: ArtifactKind = kind_value.parse()?;

        let uri = lookup("u");
        match &uri {
            Some(u) => {
                url::Url::parse(u).map_err(|e| {
                    AidError::invalid_record(format!("pointer URI {u:?} is not absolute: {e}"))
                })?;
            }
            None if !kind.is_inline() => {
                return Err(AidError::invalid_record(format!(
                    "{kind} record requires key u"
                )));
            }
            None => {}
        }

        Ok(DiscoveryRecord {
            version,
            kind,
            uri,
            pairing_key: lookup("p"),
            raw: raw.to_string(),
        })
    }

    /// Canonical `v=..;k=..` rendering of the recognised keys.
    pub fn to_txt(&self) -> String {
        let mut parts = vec![format!("v={}", self.version), format!("k={}", self.kind)];
        if let Some(uri) = &self.uri {
            parts.push(format!("u={uri}"));
        }
        if let Some(key) = &self.pairing_key {
            parts.push(format!("p={key}"));
        }
        parts.join(";")
    }
}

impl std::str::FromStr for DiscoveryRecord {
    type Err = AidError;

    fn from_str(s: &str) -> Result<Self> {
        DiscoveryRecord::parse(s)
    }
}

/// Apply the first-parseable-record rule to a set of DNS answers.
///
/// Answers are tried in the order the DNS layer returned them; records that
/// fail to parse are skipped. If none parses, the first failure is reported.
pub fn select_record(answers: &[String]) -> Result<DiscoveryRecord> {
    let mut first_error = None;
    for answer in answers {
        match DiscoveryRecord::parse(answer) {
            Ok(record) => return Ok(record),
            Err(e) => {
                tracing::debug!(answer = %answer, error = %e, "skipping unparseable TXT answer");
                first_error.get_or_insert(e);
            }
        }
    }

    Err(match first_error {
        Some(AidError::InvalidRecordFormat { detail }) => AidError::invalid_record(format!(
            "none of {} TXT answers is a discovery record; first: {detail}",
            answers.len()
        )),
        Some(other) => other,
        None => AidError::invalid_record("no TXT answers to parse"),
    })
}

/// Extract the TXT content from a zone-file line.
///
/// Accepts either a bare payload (returned trimmed) or a line such as
/// `_agent.example.com. 3600 IN TXT ( "v=1;k=manifest" ";u=https://..." )`,
/// whose quoted character-strings are concatenated.
pub fn extract_zone_txt(line: &str) -> String {
    let segments: Vec<String> = QUOTED_SEGMENT
        .captures_iter(line)
        .filter_map(|c| c.get(1))
        .map(|m| unescape(m.as_str()))
        .collect();

    if segments.is_empty() {
        line.trim().to_string()
    } else {
        segments.concat()
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split a payload into trimmed `(key, value)` pairs, preserving order.
fn split_pairs(raw: &str) -> Result<Vec<(&str, &str)>> {
    raw.split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| AidError::invalid_record(format!("segment {segment:?} has no '='")))
        })
        .collect()
}
