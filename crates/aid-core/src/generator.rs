//! Publishing helpers: turn a config document into the manifest and the
//! DNS record that points at it, and check a published manifest against
//! its config.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{AidError, Result};
use crate::model::{AidConfig, AidManifest};
use crate::record::ArtifactKind;
use crate::validation::{FieldError, FieldErrorKind, ValidationResult};

pub const DEFAULT_MANIFEST_PATH: &str = "/.well-known/agent.json";
pub const DEFAULT_TTL: u32 = 3600;

/// How strictly a published manifest must match the generated one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairMode {
    /// Every top-level key must match.
    #[default]
    Strict,
    /// `description` and `metadata` may differ.
    Lenient,
}

const LENIENT_KEYS: [&str; 2] = ["description", "metadata"];

/// The manifest described by `config`.
pub fn build_manifest(config: &AidConfig) -> AidManifest {
    AidManifest {
        name: config.service_name.clone(),
        description: config.description.clone(),
        version: config.version.clone(),
        capabilities: config.capabilities.clone(),
        metadata: config.metadata.clone(),
    }
}

/// `config.domain` without scheme, trailing slash or trailing dot.
pub fn bare_domain(config: &AidConfig) -> &str {
    let domain = config.domain.trim();
    let domain = domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or(domain);
    domain.trim_end_matches('/').trim_end_matches('.')
}

/// Where the manifest will be served.
pub fn manifest_uri(config: &AidConfig, manifest_path: &str) -> String {
    let path = manifest_path.trim();
    if path.starts_with('/') {
        format!("https://{}{path}", bare_domain(config))
    } else {
        format!("https://{}/{path}", bare_domain(config))
    }
}

/// Zone-file line publishing the discovery record:
/// `_agent.<domain>. <ttl> IN TXT "v=1;k=manifest;u=https://<domain><path>"`.
pub fn build_txt_record(config: &AidConfig, manifest_path: &str, ttl: u32) -> String {
    format!(
        "_agent.{}. {ttl} IN TXT \"v=1;k=manifest;u={}\"",
        bare_domain(config),
        manifest_uri(config, manifest_path)
    )
}

/// Compare a published manifest with the one `config` generates.
///
/// Each differing top-level key is an `INVALID_VALUE` error, in key order.
/// Fails with `MALFORMED_PAYLOAD` if either manifest does not serialize to
/// a JSON object.
pub fn check_manifest_against_config(
    config: &AidConfig,
    manifest: &AidManifest,
    mode: PairMode,
) -> Result<ValidationResult<AidManifest>> {
    let expected = top_level(&build_manifest(config))?;
    let actual = top_level(manifest)?;

    let mut keys: Vec<&String> = expected.keys().chain(actual.keys()).collect();
    keys.sort();
    keys.dedup();

    let errors = keys
        .into_iter()
        .filter(|key| !(mode == PairMode::Lenient && LENIENT_KEYS.contains(&key.as_str())))
        .filter(|key| expected.get(*key) != actual.get(*key))
        .map(|key| {
            FieldError::new(
                key.as_str(),
                FieldErrorKind::InvalidValue,
                format!("published {key} differs from the value generated from config"),
            )
        })
        .collect();

    Ok(ValidationResult::from_parts(|| manifest.clone(), errors))
}

fn top_level<T: Serialize>(doc: &T) -> Result<BTreeMap<String, Value>> {
    let malformed = |detail: String| AidError::MalformedPayload {
        kind: ArtifactKind::Manifest,
        detail,
    };
    match serde_json::to_value(doc).map_err(|e| malformed(e.to_string()))? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(malformed(format!("expected an object, got {other}"))),
    }
}
