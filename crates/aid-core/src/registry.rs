//! Schema registry: the explicit `(kind, version) -> validator` table.
//!
//! The registry is built once per process ([`SchemaRegistry::shared`]) and
//! never mutated afterwards, so concurrent resolutions read it without
//! locking. Custom registries can be assembled with
//! [`SchemaRegistry::from_entries`] for tooling and tests.

use std::sync::{Arc, LazyLock};

use serde_json::Value;

use crate::error::{AidError, Result};
use crate::inline::{validate_pair, validate_txt};
use crate::model::{AidConfig, AidManifest, Artifact};
use crate::record::ArtifactKind;
use crate::schema::{self, v1, DocumentSchema};
use crate::validation::ValidationResult;

static SHARED: LazyLock<Arc<SchemaRegistry>> = LazyLock::new(|| Arc::new(SchemaRegistry::builtin()));

/// How one registry entry validates its payload.
#[derive(Debug, Clone)]
pub enum EntryValidator {
    /// A JSON document checked against a schema tree, then projected into
    /// a typed artifact.
    Document {
        schema: DocumentSchema,
        into_artifact: fn(Value) -> serde_json::Result<Artifact>,
    },
    /// The `txt` rules applied to the raw string.
    InlineTxt,
    /// The `pair` rules applied to the raw string.
    InlinePair,
}

#[derive(Debug, Clone)]
pub struct SchemaEntry {
    pub kind: ArtifactKind,
    pub version: &'static str,
    pub validator: EntryValidator,
}

impl SchemaEntry {
    /// The published JSON Schema, for document entries.
    pub fn document(&self) -> Option<&DocumentSchema> {
        match &self.validator {
            EntryValidator::Document { schema, .. } => Some(schema),
            _ => None,
        }
    }

    /// File name of the published schema: `<kind>.v<version>.schema.json`.
    pub fn file_name(&self) -> String {
        format!("{}.v{}.schema.json", self.kind, self.version)
    }

    fn validate(&self, payload: &[u8]) -> Result<ValidationResult<Artifact>> {
        match &self.validator {
            EntryValidator::Document {
                schema,
                into_artifact,
            } => {
                let value: Value =
                    serde_json::from_slice(payload).map_err(|e| AidError::MalformedPayload {
                        kind: self.kind,
                        detail: e.to_string(),
                    })?;

                let errors = schema::validate_document(&schema.root, &value);
                if !errors.is_empty() {
                    return Ok(ValidationResult::invalid(errors));
                }

                // The tree accepted the document, so this projection only
                // fails if the typed model and the tree disagree.
                let artifact = into_artifact(value).map_err(|e| AidError::MalformedPayload {
                    kind: self.kind,
                    detail: format!("document does not match typed model: {e}"),
                })?;
                Ok(ValidationResult::valid(artifact))
            }
            EntryValidator::InlineTxt => {
                Ok(validate_txt(self.utf8(payload)?).map(Artifact::Txt))
            }
            EntryValidator::InlinePair => {
                Ok(validate_pair(self.utf8(payload)?).map(Artifact::Pair))
            }
        }
    }

    fn utf8<'a>(&self, payload: &'a [u8]) -> Result<&'a str> {
        std::str::from_utf8(payload).map_err(|e| AidError::MalformedPayload {
            kind: self.kind,
            detail: e.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entries: Vec<SchemaEntry>,
}

impl SchemaRegistry {
    /// The process-wide registry of built-in schemas.
    pub fn shared() -> Arc<SchemaRegistry> {
        Arc::clone(&SHARED)
    }

    /// Every schema version this release understands.
    pub fn builtin() -> Self {
        Self::from_entries(vec![
            SchemaEntry {
                kind: ArtifactKind::Manifest,
                version: v1::VERSION,
                validator: EntryValidator::Document {
                    schema: v1::manifest_v1(),
                    into_artifact: |value| {
                        serde_json::from_value::<AidManifest>(value).map(Artifact::Manifest)
                    },
                },
            },
            SchemaEntry {
                kind: ArtifactKind::Config,
                version: v1::VERSION,
                validator: EntryValidator::Document {
                    schema: v1::config_v1(),
                    into_artifact: |value| {
                        serde_json::from_value::<AidConfig>(value).map(Artifact::Config)
                    },
                },
            },
            SchemaEntry {
                kind: ArtifactKind::Txt,
                version: v1::VERSION,
                validator: EntryValidator::InlineTxt,
            },
            SchemaEntry {
                kind: ArtifactKind::Pair,
                version: v1::VERSION,
                validator: EntryValidator::InlinePair,
            },
        ])
    }

    pub fn from_entries(entries: Vec<SchemaEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    /// Exact `(kind, version)` lookup; versions are never coerced.
    pub fn lookup(&self, kind: ArtifactKind, version: &str) -> Option<&SchemaEntry> {
        self.entries
            .iter()
            .find(|e| e.kind == kind && e.version == version)
    }

    pub fn supports(&self, kind: ArtifactKind, version: &str) -> bool {
        self.lookup(kind, version).is_some()
    }

    /// Fail with `UNSUPPORTED_VERSION` unless `(kind, version)` is registered.
    pub fn require(&self, kind: ArtifactKind, version: &str) -> Result<&SchemaEntry> {
        self.lookup(kind, version)
            .ok_or_else(|| AidError::UnsupportedVersion {
                kind,
                version: version.to_string(),
            })
    }

    /// Validate `payload` against the `(kind, version)` entry.
    ///
    /// Field-level violations come back as an invalid [`ValidationResult`];
    /// only an unknown version or an unparseable payload is an error.
    pub fn validate(
        &self,
        kind: ArtifactKind,
        version: &str,
        payload: &[u8],
    ) -> Result<ValidationResult<Artifact>> {
        self.require(kind, version)?.validate(payload)
    }

    /// Entries that publish a JSON Schema document.
    pub fn documents(&self) -> impl Iterator<Item = (&SchemaEntry, &DocumentSchema)> {
        self.entries
            .iter()
            .filter_map(|e| e.document().map(|d| (e, d)))
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::validation::FieldErrorKind;

    #[test]
    fn test_demo_manifest_validates() {
        let registry = SchemaRegistry::shared();
        let result = registry
            .validate(
                ArtifactKind::Manifest,
                "1",
                br#"{"name":"demo","version":"1","capabilities":[]}"#,
            )
            .unwrap();
        assert!(result.ok);
        assert_eq!(result.value.unwrap().as_manifest().unwrap().name, "demo");
    }

    #[test]
    fn test_missing_name_is_field_error() {
        let result = SchemaRegistry::shared()
            .validate(ArtifactKind::Manifest, "1", br#"{"version":"1"}"#)
            .unwrap();
        assert!(!result.ok);
        assert!(result.value.is_none());
        assert!(result.has_error("name", FieldErrorKind::MissingRequired));
    }

    #[test]
    fn test_unknown_version_is_never_coerced() {
        let registry = SchemaRegistry::shared();
        for version in ["99", "1.0", "2"] {
            let err = registry
                .validate(ArtifactKind::Manifest, version, b"{}")
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::UnsupportedVersion);
        }
    }

    #[test]
    fn test_malformed_payloads() {
        let registry = SchemaRegistry::shared();
        let err = registry
            .validate(ArtifactKind::Config, "1", b"{not json")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedPayload);

        let err = registry
            .validate(ArtifactKind::Txt, "1", &[0x76, 0x3d, 0xff])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedPayload);
    }

    #[test]
    fn test_valid_typed_value_revalidates() {
        let registry = SchemaRegistry::shared();
        let payload = br#"{
            "name": "demo",
            "version": "1",
            "x-internal": 1,
            "capabilities": [{
                "type": "local",
                "name": "cli",
                "protocol": "mcp",
                "package": { "manager": "npx", "identifier": "@demo/agent" },
                "execution": { "command": "npx", "args": ["-y", "@demo/agent"] }
            }]
        }"#;
        let first = registry.validate(ArtifactKind::Manifest, "1", payload).unwrap();
        assert!(first.ok, "{:?}", first.errors);

        let reserialized = serde_json::to_vec(first.value.as_ref().unwrap()).unwrap();
        let second = registry
            .validate(ArtifactKind::Manifest, "1", &reserialized)
            .unwrap();
        assert!(second.ok, "{:?}", second.errors);
        assert_eq!(first.value, second.value);
    }

    #[test]
    fn test_documents_cover_json_kinds() {
        let registry = SchemaRegistry::builtin();
        let files: Vec<String> = registry.documents().map(|(e, _)| e.file_name()).collect();
        assert_eq!(files, vec!["manifest.v1.schema.json", "config.v1.schema.json"]);
        assert!(registry.supports(ArtifactKind::Pair, "1"));
        assert!(!registry.supports(ArtifactKind::Pair, "2"));
    }
}
