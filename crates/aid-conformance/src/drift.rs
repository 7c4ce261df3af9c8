//! Schema drift detection.
//!
//! The registry renders each JSON schema it validates against; the rendered
//! text must match the checked-in copy byte-for-byte. Anything else (an
//! edited file, a missing file, or a stray `*.schema.json` nothing
//! generates) is drift.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use aid_core::schema::render_schema_document;
use aid_core::{ArtifactKind, SchemaRegistry};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SCHEMA_SUFFIX: &str = ".schema.json";

/// A schema file as the registry renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSchema {
    pub kind: ArtifactKind,
    pub version: String,
    pub file_name: String,
    pub contents: String,
}

/// Render every schema document the registry publishes.
pub fn render_schemas(registry: &SchemaRegistry) -> Vec<RenderedSchema> {
    registry
        .documents()
        .map(|(entry, document)| RenderedSchema {
            kind: entry.kind,
            version: entry.version.to_string(),
            file_name: entry.file_name(),
            contents: render_schema_document(document),
        })
        .collect()
}

/// Write the rendered schemas into `dir`, creating it if needed.
pub fn write_schemas(registry: &SchemaRegistry, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
    render_schemas(registry)
        .into_iter()
        .map(|schema| {
            let path = dir.join(&schema.file_name);
            std::fs::write(&path, schema.contents.as_bytes())
                .with_context(|| format!("write {:?}", path))?;
            tracing::info!(event = "schema.written", path = %path.display());
            Ok(path)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DriftStatus {
    InSync,
    #[serde(rename_all = "camelCase")]
    Drifted {
        /// 1-based line of the first difference.
        first_difference_line: usize,
        checked_in_sha256: String,
        generated_sha256: String,
    },
    /// The registry generates this file but the directory lacks it.
    Missing,
    /// The directory has this file but nothing generates it.
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftEntry {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ArtifactKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub status: DriftStatus,
}

impl DriftEntry {
    pub fn in_sync(&self) -> bool {
        self.status == DriftStatus::InSync
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub dir: String,
    pub entries: Vec<DriftEntry>,
}

impl DriftReport {
    /// No entry drifted, went missing or appeared unexpectedly.
    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(DriftEntry::in_sync)
    }

    pub fn problems(&self) -> impl Iterator<Item = &DriftEntry> {
        self.entries.iter().filter(|e| !e.in_sync())
    }
}

/// Compare the registry's rendered schemas with the files in `dir`.
///
/// A missing directory reports every schema as missing.
pub fn check_schemas(registry: &SchemaRegistry, dir: &Path) -> anyhow::Result<DriftReport> {
    let rendered = render_schemas(registry);
    let mut entries = Vec::with_capacity(rendered.len());

    for schema in &rendered {
        let path = dir.join(&schema.file_name);
        let status = match std::fs::read(&path) {
            Ok(checked_in) => compare(&checked_in, schema.contents.as_bytes()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DriftStatus::Missing,
            Err(e) => return Err(e).with_context(|| format!("read {:?}", path)),
        };
        entries.push(DriftEntry {
            file: schema.file_name.clone(),
            kind: Some(schema.kind),
            version: Some(schema.version.clone()),
            status,
        });
    }

    let generated: BTreeSet<&str> = rendered.iter().map(|s| s.file_name.as_str()).collect();
    for file in schema_files(dir)? {
        if !generated.contains(file.as_str()) {
            entries.push(DriftEntry {
                file,
                kind: None,
                version: None,
                status: DriftStatus::Unexpected,
            });
        }
    }

    let report = DriftReport {
        dir: dir.display().to_string(),
        entries,
    };
    for problem in report.problems() {
        tracing::warn!(
            event = "schema.drift",
            file = %problem.file,
            status = ?problem.status,
        );
    }
    Ok(report)
}

/// `*.schema.json` file names in `dir`, sorted.
fn schema_files(dir: &Path) -> anyhow::Result<BTreeSet<String>> {
    let listing = match std::fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(e).with_context(|| format!("list {:?}", dir)),
    };

    let mut files = BTreeSet::new();
    for entry in listing {
        let entry = entry.with_context(|| format!("list {:?}", dir))?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(SCHEMA_SUFFIX) {
                files.insert(name.to_string());
            }
        }
    }
    Ok(files)
}

fn compare(checked_in: &[u8], generated: &[u8]) -> DriftStatus {
    if checked_in == generated {
        return DriftStatus::InSync;
    }
    DriftStatus::Drifted {
        first_difference_line: first_difference_line(checked_in, generated),
        checked_in_sha256: sha256_hex(checked_in),
        generated_sha256: sha256_hex(generated),
    }
}

fn first_difference_line(a: &[u8], b: &[u8]) -> usize {
    let mut left = a.split(|&c| c == b'\n');
    let mut right = b.split(|&c| c == b'\n');
    let mut line = 1;
    loop {
        match (left.next(), right.next()) {
            (Some(x), Some(y)) if x == y => line += 1,
            _ => return line,
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_difference_line() {
        assert_eq!(first_difference_line(b"a\nb\nc\n", b"a\nB\nc\n"), 2);
        assert_eq!(first_difference_line(b"a\nb\n", b"a\nb\nc\n"), 3);
        assert_eq!(first_difference_line(b"x", b"y"), 1);
    }

    #[test]
    fn test_compare_reports_digests() {
        assert_eq!(compare(b"same", b"same"), DriftStatus::InSync);
        match compare(b"old\n", b"new\n") {
            DriftStatus::Drifted {
                first_difference_line,
                checked_in_sha256,
                generated_sha256,
            } => {
                assert_eq!(first_difference_line, 1);
                assert_eq!(checked_in_sha256.len(), 64);
                assert_ne!(checked_in_sha256, generated_sha256);
            }
            other => panic!("expected drift, got {other:?}"),
        }
    }

    #[test]
    fn test_rendered_file_names() {
        let names: Vec<String> = render_schemas(&SchemaRegistry::builtin())
            .into_iter()
            .map(|s| s.file_name)
            .collect();
        assert_eq!(
            names,
            vec!["manifest.v1.schema.json", "config.v1.schema.json"]
        );
    }

    #[test]
    fn test_drift_status_serialization() {
        let entry = DriftEntry {
            file: "manifest.v1.schema.json".to_string(),
            kind: Some(ArtifactKind::Manifest),
            version: Some("1".to_string()),
            status: DriftStatus::Drifted {
                first_difference_line: 4,
                checked_in_sha256: "aa".to_string(),
                generated_sha256: "bb".to_string(),
            },
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "drifted");
        assert_eq!(json["firstDifferenceLine"], 4);
        assert_eq!(json["kind"], "manifest");
    }
}
