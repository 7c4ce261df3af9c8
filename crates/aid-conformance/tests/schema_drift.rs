//! Checked-in schema documents match what the registry renders.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use aid_conformance::{check_schemas, render_schemas, write_schemas, DriftStatus, Harness};
use aid_core::registry::EntryValidator;
use aid_core::schema::{optional, string};
use aid_core::{ArtifactKind, SchemaRegistry};

fn checked_in_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../schemas")
}

fn status_of<'a>(report: &'a aid_conformance::DriftReport, file: &str) -> &'a DriftStatus {
    &report
        .entries
        .iter()
        .find(|e| e.file == file)
        .unwrap_or_else(|| panic!("no entry for {file}"))
        .status
}

/// The builtin registry with an extra optional `supportContact` on the manifest.
fn mutated_registry() -> SchemaRegistry {
    let mut entries = SchemaRegistry::builtin().entries().to_vec();
    for entry in &mut entries {
        if entry.kind == ArtifactKind::Manifest {
            if let EntryValidator::Document { schema, .. } = &mut entry.validator {
                schema
                    .root
                    .fields
                    .push(optional("supportContact", string()));
            }
        }
    }
    SchemaRegistry::from_entries(entries)
}

#[test]
fn test_checked_in_schemas_are_in_sync() {
    let report = check_schemas(&SchemaRegistry::builtin(), &checked_in_dir()).unwrap();
    let problems: Vec<String> = report
        .problems()
        .map(|e| format!("{}: {:?}", e.file, e.status))
        .collect();
    assert!(
        problems.is_empty(),
        "schema drift; regenerate with `aid schema generate --out schemas`:\n{}",
        problems.join("\n")
    );
    assert_eq!(report.entries.len(), 2);
}

#[test]
fn test_rendering_is_byte_stable() {
    let registry = SchemaRegistry::builtin();
    assert_eq!(render_schemas(&registry), render_schemas(&registry));
    for schema in render_schemas(&registry) {
        assert!(schema.contents.ends_with("}\n"));
    }
}

#[test]
fn test_generated_directory_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SchemaRegistry::builtin();
    let written = write_schemas(&registry, dir.path()).unwrap();
    assert_eq!(written.len(), 2);
    assert!(check_schemas(&registry, dir.path()).unwrap().is_clean());
}

#[test]
fn test_definition_change_is_drift() {
    let report = check_schemas(&mutated_registry(), &checked_in_dir()).unwrap();
    assert!(!report.is_clean());
    assert_eq!(status_of(&report, "config.v1.schema.json"), &DriftStatus::InSync);
    match status_of(&report, "manifest.v1.schema.json") {
        DriftStatus::Drifted {
            first_difference_line,
            checked_in_sha256,
            generated_sha256,
        } => {
            assert!(*first_difference_line > 1);
            assert_ne!(checked_in_sha256, generated_sha256);
        }
        other => panic!("expected drift, got {other:?}"),
    }
}

#[test]
fn test_edited_missing_and_unexpected_files() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SchemaRegistry::builtin();
    write_schemas(&registry, dir.path()).unwrap();

    let manifest = dir.path().join("manifest.v1.schema.json");
    let text = std::fs::read_to_string(&manifest).unwrap();
    std::fs::write(&manifest, text.replacen("AID Manifest v1", "AID Manifest", 1)).unwrap();
    std::fs::remove_file(dir.path().join("config.v1.schema.json")).unwrap();
    std::fs::write(dir.path().join("widget.v9.schema.json"), "{}\n").unwrap();
    std::fs::write(dir.path().join("README.md"), "not a schema\n").unwrap();

    let report = check_schemas(&registry, dir.path()).unwrap();
    assert!(matches!(
        status_of(&report, "manifest.v1.schema.json"),
        DriftStatus::Drifted { .. }
    ));
    assert_eq!(status_of(&report, "config.v1.schema.json"), &DriftStatus::Missing);
    assert_eq!(status_of(&report, "widget.v9.schema.json"), &DriftStatus::Unexpected);
    assert_eq!(report.entries.len(), 3);
}

#[test]
fn test_missing_directory_reports_everything_missing() {
    let dir = tempfile::tempdir().unwrap();
    let report = check_schemas(&SchemaRegistry::builtin(), &dir.path().join("nope")).unwrap();
    assert!(report
        .entries
        .iter()
        .all(|e| e.status == DriftStatus::Missing));
}

#[tokio::test]
async fn test_drift_and_fixture_failures_are_separate() {
    let fixtures = aid_conformance::builtin_fixtures().unwrap();
    let registry = Arc::new(mutated_registry());
    let report = Harness::new()
        .with_registry(Arc::clone(&registry))
        .run(&fixtures)
        .await
        .with_drift(check_schemas(&registry, &checked_in_dir()).unwrap());

    assert!(!report.has_fixture_failures());
    assert!(report.has_drift());
    assert!(!report.passed());
}
