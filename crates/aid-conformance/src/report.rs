//! Conformance report: fixture outcomes plus, optionally, the schema drift
//! check. Fixture mismatches and drift are reported as separate failure
//! classes.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::drift::{DriftReport, DriftStatus};
use crate::harness::FixtureOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConformanceSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConformanceReport {
    pub generated_at: DateTime<Utc>,
    pub aid_version: String,
    pub summary: ConformanceSummary,
    pub fixtures: Vec<FixtureOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftReport>,
}

impl ConformanceReport {
    pub fn from_outcomes(fixtures: Vec<FixtureOutcome>) -> Self {
        let passed = fixtures.iter().filter(|f| f.passed).count();
        Self {
            generated_at: Utc::now(),
            aid_version: aid_core::VERSION.to_string(),
            summary: ConformanceSummary {
                total: fixtures.len(),
                passed,
                failed: fixtures.len() - passed,
            },
            fixtures,
            drift: None,
        }
    }

    pub fn with_drift(mut self, drift: DriftReport) -> Self {
        self.drift = Some(drift);
        self
    }

    pub fn has_fixture_failures(&self) -> bool {
        self.summary.failed > 0
    }

    pub fn has_drift(&self) -> bool {
        self.drift.as_ref().is_some_and(|d| !d.is_clean())
    }

    /// Every fixture passed and no drift was found.
    pub fn passed(&self) -> bool {
        !self.has_fixture_failures() && !self.has_drift()
    }

    pub fn failed_fixtures(&self) -> impl Iterator<Item = &FixtureOutcome> {
        self.fixtures.iter().filter(|f| !f.passed)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("serialize conformance report")
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let content = self.to_json()?;
        std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
        Ok(())
    }
}

/// Markdown summary for CI logs and PR comments.
pub fn render_markdown(report: &ConformanceReport) -> String {
    let mut out = String::new();
    out.push_str("# AID Conformance\n\n");
    out.push_str(&format!(
        "- version: {}\n- generated: {}\n- fixtures: {}/{} passed\n",
        report.aid_version,
        report.generated_at.to_rfc3339(),
        report.summary.passed,
        report.summary.total
    ));
    if let Some(drift) = &report.drift {
        out.push_str(&format!(
            "- schema drift: {}\n",
            if drift.is_clean() { "none" } else { "DETECTED" }
        ));
    }
    out.push('\n');

    out.push_str("## Fixtures\n\n");
    out.push_str("| fixture | result | actual |\n|---|---|---|\n");
    for fixture in &report.fixtures {
        out.push_str(&format!(
            "| `{}` | {} | {} |\n",
            fixture.name,
            if fixture.passed { "pass" } else { "FAIL" },
            fixture.actual
        ));
    }

    let failed: Vec<&FixtureOutcome> = report.failed_fixtures().collect();
    if !failed.is_empty() {
        out.push_str("\n### Mismatches\n");
        for fixture in failed {
            out.push_str(&format!("\n`{}`\n", fixture.name));
            for mismatch in &fixture.mismatches {
                out.push_str(&format!("- {}\n", mismatch));
            }
        }
    }

    if let Some(drift) = &report.drift {
        out.push_str(&format!("\n## Schema drift (`{}`)\n\n", drift.dir));
        out.push_str("| file | status |\n|---|---|\n");
        for entry in &drift.entries {
            let status = match &entry.status {
                DriftStatus::InSync => "in sync".to_string(),
                DriftStatus::Drifted {
                    first_difference_line,
                    ..
                } => format!("DRIFTED (line {first_difference_line})"),
                DriftStatus::Missing => "MISSING".to_string(),
                DriftStatus::Unexpected => "UNEXPECTED".to_string(),
            };
            out.push_str(&format!("| `{}` | {} |\n", entry.file, status));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::DriftEntry;
    use crate::harness::Mismatch;

    fn outcome(name: &str, passed: bool) -> FixtureOutcome {
        FixtureOutcome {
            name: name.to_string(),
            passed,
            actual: "done (valid)".to_string(),
            attempts: 1,
            mismatches: if passed {
                vec![]
            } else {
                vec![Mismatch {
                    field: "ok".to_string(),
                    expected: "false".to_string(),
                    actual: "true".to_string(),
                }]
            },
        }
    }

    fn missing_schema() -> DriftReport {
        DriftReport {
            dir: "schemas".to_string(),
            entries: vec![DriftEntry {
                file: "manifest.v1.schema.json".to_string(),
                kind: None,
                version: None,
                status: DriftStatus::Missing,
            }],
        }
    }

    #[test]
    fn test_summary_counts() {
        let report = ConformanceReport::from_outcomes(vec![outcome("a", true), outcome("b", false)]);
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.failed, 1);
        assert!(report.has_fixture_failures());
        assert!(!report.has_drift());
        assert!(!report.passed());
    }

    #[test]
    fn test_drift_is_a_separate_failure_class() {
        let report = ConformanceReport::from_outcomes(vec![outcome("a", true)]).with_drift(missing_schema());
        assert!(!report.has_fixture_failures());
        assert!(report.has_drift());
        assert!(!report.passed());
    }

    #[test]
    fn test_markdown_lists_mismatches_and_drift() {
        let report = ConformanceReport::from_outcomes(vec![outcome("a", true), outcome("b", false)])
            .with_drift(missing_schema());
        let md = render_markdown(&report);
        assert!(md.contains("fixtures: 1/2 passed"));
        assert!(md.contains("| `b` | FAIL |"));
        assert!(md.contains("- ok: expected false, got true"));
        assert!(md.contains("| `manifest.v1.schema.json` | MISSING |"));
    }

    #[test]
    fn test_json_uses_camel_case() {
        let report = ConformanceReport::from_outcomes(vec![outcome("a", true)]);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["summary"]["passed"], 1);
        assert!(json["generatedAt"].is_string());
        assert_eq!(json["aidVersion"], aid_core::VERSION);
    }
}
