//! Structured events for the resolution lifecycle.
//!
//! Every resolution runs inside a [`resolution_span`] carrying a fresh
//! `resolution_id`; the `emit_*` functions below log the milestones within
//! it. All events carry an `event` field so they can be filtered in JSON
//! output.

use tracing::{info, warn, Span};

use crate::error::AidError;

/// Span covering one resolution of `domain`.
///
/// Attach it with `tracing::Instrument::instrument` rather than entering it,
/// since the resolution future suspends.
pub fn resolution_span(domain: &str) -> Span {
    let resolution_id = uuid::Uuid::new_v4();
    tracing::info_span!("aid.resolve", resolution_id = %resolution_id, domain = %domain)
}

pub fn emit_resolution_started(domain: &str, query_name: &str) {
    info!(event = "resolve.started", domain = %domain, query_name = %query_name);
}

pub fn emit_dns_answered(query_name: &str, answers: usize, attempts: u32) {
    info!(
        event = "dns.answered",
        query_name = %query_name,
        answers = answers,
        attempts = attempts,
    );
}

pub fn emit_dns_retry(query_name: &str, error: &AidError) {
    warn!(event = "dns.retry", query_name = %query_name, code = %error.code(), error = %error);
}

pub fn emit_record_parsed(kind: &str, version: &str) {
    info!(event = "record.parsed", kind = %kind, version = %version);
}

pub fn emit_fetch_completed(uri: &str, bytes: usize, redirects: usize) {
    info!(
        event = "fetch.completed",
        uri = %uri,
        bytes = bytes,
        redirects = redirects,
    );
}

pub fn emit_validated(kind: &str, ok: bool, errors: usize) {
    info!(event = "artifact.validated", kind = %kind, ok = ok, errors = errors);
}

pub fn emit_resolution_finished(domain: &str, timing_ms: u64, attempts: u32) {
    info!(
        event = "resolve.finished",
        domain = %domain,
        timing_ms = timing_ms,
        attempts = attempts,
    );
}

pub fn emit_resolution_failed(domain: &str, stage: &str, error: &AidError) {
    warn!(
        event = "resolve.failed",
        domain = %domain,
        stage = %stage,
        code = %error.code(),
        error = %error,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_and_events_do_not_panic() {
        let span = resolution_span("example.com");
        let _guard = span.enter();
        emit_resolution_started("example.com", "_agent.example.com.");
        emit_dns_answered("_agent.example.com.", 1, 1);
        emit_resolution_failed(
            "example.com",
            "DNS_LOOKUP",
            &AidError::DnsTimeout {
                name: "_agent.example.com.".to_string(),
            },
        );
    }
}
