//! Fixture-driven conformance runs.
//!
//! Every fixture gets a fresh [`AidResolver`] over scripted DNS and HTTP
//! backends. The parser, registry and orchestrator are the real ones, so a
//! fixture pins end-to-end behaviour without touching the network.

use std::sync::Arc;
use std::time::Duration;

use aid_core::fakes::{ScriptedTxtResolver, StaticTransport};
use aid_core::{
    AidResolver, FieldError, ResolutionResult, ResolutionStatus, ResolveOptions, ResolverConfig,
    SchemaRegistry,
};
use serde::{Deserialize, Serialize};

use crate::fixture::{
    ExpectedError, ExpectedFieldError, ExpectedOutcome, Expectation, Fixture, FixtureSet,
};
use crate::report::ConformanceReport;

/// One difference between what a fixture expected and what happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

impl Mismatch {
    fn new(field: &str, expected: impl ToString, actual: impl ToString) -> Self {
        Self {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: expected {}, got {}",
            self.field, self.expected, self.actual
        )
    }
}

/// Result of running one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureOutcome {
    pub name: String,
    pub passed: bool,
    /// `done` or the `STAGE/CODE` the resolution failed with.
    pub actual: String,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<Mismatch>,
}

/// Runs fixtures against the real pipeline.
#[derive(Debug, Clone)]
pub struct Harness {
    config: ResolverConfig,
    registry: Arc<SchemaRegistry>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self {
            config: ResolverConfig::default(),
            registry: SchemaRegistry::shared(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: Arc<SchemaRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Run every fixture, in name order.
    pub async fn run(&self, fixtures: &FixtureSet) -> ConformanceReport {
        let mut outcomes = Vec::with_capacity(fixtures.len());
        for (name, fixture) in fixtures {
            outcomes.push(self.run_fixture(name, fixture).await);
        }
        ConformanceReport::from_outcomes(outcomes)
    }

    pub async fn run_fixture(&self, name: &str, fixture: &Fixture) -> FixtureOutcome {
        let resolver = AidResolver::with_backends(
            Arc::new(scripted_dns(fixture)),
            Arc::new(scripted_http(fixture)),
            self.config.clone(),
        )
        .with_registry(Arc::clone(&self.registry));
        let mut options = ResolveOptions::default().allow_insecure_http(fixture.allow_insecure_http);
        if let Some(ms) = fixture.timeout_ms {
            options = options.with_timeout(Duration::from_millis(ms));
        }

        let result = resolver.resolve(&fixture.domain, &options).await;
        let mismatches = compare(&fixture.expected, &result);
        let outcome = FixtureOutcome {
            name: name.to_string(),
            passed: mismatches.is_empty(),
            actual: describe(&result),
            attempts: result.attempts,
            mismatches,
        };

        if outcome.passed {
            tracing::debug!(event = "conformance.fixture_passed", fixture = %name);
        } else {
            tracing::warn!(
                event = "conformance.fixture_failed",
                fixture = %name,
                mismatches = outcome.mismatches.len(),
                actual = %outcome.actual,
            );
        }
        outcome
    }
}

/// Run `fixtures` with the default harness.
pub async fn run_fixtures(fixtures: &FixtureSet) -> ConformanceReport {
    Harness::new().run(fixtures).await
}

fn scripted_dns(fixture: &Fixture) -> ScriptedTxtResolver {
    ScriptedTxtResolver::new()
        .answer_any(fixture.dns_answers.clone())
        .fail_with(fixture.dns_failures.iter().copied())
}

fn scripted_http(fixture: &Fixture) -> StaticTransport {
    let mut http = StaticTransport::new();
    if let Some(uri) = fixture.payload_uri() {
        let status = fixture.artifact_status.unwrap_or(200);
        let body = fixture.served_body().unwrap_or_default();
        http = http.respond(&uri, status, body);
    }
    if let Some(ms) = fixture.delay_ms {
        http = http.with_delay(Duration::from_millis(ms));
    }
    // Redirects win over a payload registered at the same URL.
    for redirect in &fixture.redirects {
        http = http.redirect(&redirect.from, &redirect.to);
    }
    http
}

fn describe(result: &ResolutionResult) -> String {
    match &result.status {
        ResolutionStatus::Done => match &result.artifact {
            Some(artifact) if artifact.ok => "done (valid)".to_string(),
            Some(artifact) => format!("done ({} field errors)", artifact.errors.len()),
            None => "done".to_string(),
        },
        ResolutionStatus::Failed { stage, error } => format!("{stage}/{}", error.code()),
    }
}

fn compare(expected: &Expectation, result: &ResolutionResult) -> Vec<Mismatch> {
    match expected {
        Expectation::Error(expected) => compare_error(expected, result),
        Expectation::Outcome(expected) => compare_outcome(expected, result),
    }
}

fn compare_error(expected: &ExpectedError, result: &ResolutionResult) -> Vec<Mismatch> {
    let ResolutionStatus::Failed { stage, error } = &result.status else {
        return vec![Mismatch::new(
            "errorKind",
            expected.error_kind,
            describe(result),
        )];
    };

    let mut mismatches = Vec::new();
    if error.code() != expected.error_kind {
        mismatches.push(Mismatch::new("errorKind", expected.error_kind, error.code()));
    }
    if let Some(want) = expected.stage {
        if want != *stage {
            mismatches.push(Mismatch::new("stage", want, stage));
        }
    }
    mismatches.extend(compare_attempts(expected.attempts, result));
    mismatches
}

fn compare_outcome(expected: &ExpectedOutcome, result: &ResolutionResult) -> Vec<Mismatch> {
    let Some(artifact) = result
        .artifact
        .as_ref()
        .filter(|_| result.status == ResolutionStatus::Done)
    else {
        return vec![Mismatch::new("state", "done", describe(result))];
    };

    let mut mismatches = Vec::new();
    if artifact.ok != expected.ok {
        mismatches.push(Mismatch::new("ok", expected.ok, artifact.ok));
    }

    if let Some(want) = &expected.value {
        let got = serde_json::to_value(&artifact.value).unwrap_or_default();
        if *want != got {
            mismatches.push(Mismatch::new("value", want, got));
        }
    }

    if let Some(want) = &expected.errors {
        mismatches.extend(compare_field_errors(want, &artifact.errors));
    }

    mismatches.extend(compare_attempts(expected.attempts, result));
    mismatches
}

fn compare_attempts(expected: Option<u32>, result: &ResolutionResult) -> Option<Mismatch> {
    expected
        .filter(|want| *want != result.attempts)
        .map(|want| Mismatch::new("attempts", want, result.attempts))
}

fn compare_field_errors(expected: &[ExpectedFieldError], actual: &[FieldError]) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    if expected.len() != actual.len() {
        mismatches.push(Mismatch::new(
            "errors.len",
            expected.len(),
            actual.len(),
        ));
    }

    for (i, (want, got)) in expected.iter().zip(actual).enumerate() {
        if want.path != got.path || want.kind != got.kind {
            mismatches.push(Mismatch::new(
                &format!("errors[{i}]"),
                format!("{} at {:?}", want.kind, want.path),
                format!("{} at {:?}", got.kind, got.path),
            ));
        }
        if let Some(message) = &want.message {
            if *message != got.message {
                mismatches.push(Mismatch::new(
                    &format!("errors[{i}].message"),
                    message,
                    &got.message,
                ));
            }
        }
    }
    mismatches
}
