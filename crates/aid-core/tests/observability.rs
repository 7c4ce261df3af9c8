//! Structured tracing emitted by the resolution lifecycle.

use std::sync::Arc;

use aid_core::fakes::{ScriptedTxtResolver, StaticTransport};
use aid_core::obs::{emit_dns_retry, emit_resolution_failed, resolution_span};
use aid_core::{AidError, AidResolver, ResolveOptions, ResolverConfig};
use tracing::Instrument;
use tracing_test::traced_test;

#[traced_test]
#[tokio::test]
async fn test_failed_resolution_logs_stage_and_code() {
    let r = AidResolver::with_backends(
        Arc::new(ScriptedTxtResolver::new()),
        Arc::new(StaticTransport::new()),
        ResolverConfig::default(),
    );
    r.resolve("example.com", &ResolveOptions::default()).await;

    assert!(logs_contain("resolve.started"));
    assert!(logs_contain("resolve.failed"));
    assert!(logs_contain("DNS_NOT_FOUND"));
    assert!(logs_contain("resolution_id"));
}

#[traced_test]
#[tokio::test]
async fn test_successful_resolution_logs_each_stage() {
    let r = AidResolver::with_backends(
        Arc::new(ScriptedTxtResolver::new().answer_any(vec!["v=1;k=txt;proto=mcp".to_string()])),
        Arc::new(StaticTransport::new()),
        ResolverConfig::default(),
    );
    let result = r.resolve("example.com", &ResolveOptions::default()).await;
    assert!(result.is_ok());

    for event in ["dns.answered", "record.parsed", "artifact.validated", "resolve.finished"] {
        assert!(logs_contain(event), "missing {event}");
    }
}

#[traced_test]
#[tokio::test]
async fn test_span_carries_domain() {
    async {
        emit_dns_retry(
            "_agent.example.org.",
            &AidError::DnsTimeout {
                name: "_agent.example.org.".to_string(),
            },
        );
        emit_resolution_failed(
            "example.org",
            "FETCHING",
            &AidError::FetchTimeout {
                uri: "https://example.org/.well-known/agent.json".to_string(),
            },
        );
    }
    .instrument(resolution_span("example.org"))
    .await;

    assert!(logs_contain("dns.retry"));
    assert!(logs_contain("example.org"));
    assert!(logs_contain("FETCH_TIMEOUT"));
}
