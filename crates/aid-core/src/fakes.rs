//! In-memory backends for the DNS and HTTP seams.
//!
//! [`ScriptedTxtResolver`] and [`StaticTransport`] replay canned answers so
//! the real parser, validator and orchestrator can be exercised without
//! network access. Each instance is independent; nothing here touches
//! process-wide state.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::dns::TxtResolver;
use crate::error::{AidError, ErrorCode, Result};
use crate::fetch::{HttpResponse, HttpTransport};

// ---------------------------------------------------------------------------
// ScriptedTxtResolver
// ---------------------------------------------------------------------------

/// TXT resolver answering from a fixed table.
///
/// Queued failures are returned first, one per query. Names without an
/// answer are `DNS_NOT_FOUND`.
#[derive(Debug, Default)]
pub struct ScriptedTxtResolver {
    answers: HashMap<String, Vec<String>>,
    fallback: Option<Vec<String>>,
    failures: Mutex<VecDeque<ErrorCode>>,
    delay: Option<Duration>,
    queries: AtomicUsize,
}

impl ScriptedTxtResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer queries for `name` (fully qualified, trailing dot).
    pub fn answer(mut self, name: &str, answers: Vec<String>) -> Self {
        self.answers.insert(name.to_string(), answers);
        self
    }

    /// Answer every query without a specific entry.
    pub fn answer_any(mut self, answers: Vec<String>) -> Self {
        self.fallback = Some(answers);
        self
    }

    /// Fail the next `count` queries with `code`.
    pub fn fail_first(self, code: ErrorCode, count: usize) -> Self {
        self.fail_with(std::iter::repeat(code).take(count))
    }

    /// Fail the next queries with `codes`, in order.
    pub fn fail_with(self, codes: impl IntoIterator<Item = ErrorCode>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .extend(codes);
        self
    }

    /// Sleep before answering each query.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of queries received.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxtResolver for ScriptedTxtResolver {
    async fn query_txt(&self, name: &str) -> Result<Vec<String>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().pop_front();
        if let Some(code) = failure {
            return Err(scripted_dns_error(code, name));
        }

        self.answers
            .get(name)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| AidError::DnsNotFound {
                name: name.to_string(),
            })
    }
}

fn scripted_dns_error(code: ErrorCode, name: &str) -> AidError {
    let name = name.to_string();
    match code {
        ErrorCode::DnsNotFound => AidError::DnsNotFound { name },
        ErrorCode::DnsTimeout => AidError::DnsTimeout { name },
        other => AidError::DnsServfail {
            name,
            detail: format!("scripted {other}"),
        },
    }
}

// ---------------------------------------------------------------------------
// StaticTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Route {
    Body(u16, Vec<u8>),
    Redirect(u16, String),
}

/// HTTP transport serving fixed responses by exact URL.
///
/// Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct StaticTransport {
    routes: HashMap<String, Route>,
    delay: Option<Duration>,
    requests: AtomicUsize,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200.
    pub fn ok(self, url: &str, body: Vec<u8>) -> Self {
        self.respond(url, 200, body)
    }

    /// Serve `body` with an arbitrary status.
    pub fn respond(mut self, url: &str, status: u16, body: Vec<u8>) -> Self {
        self.routes.insert(normalize(url), Route::Body(status, body));
        self
    }

    /// Serve an empty body with `status`.
    pub fn status(self, url: &str, status: u16) -> Self {
        self.respond(url, status, Vec::new())
    }

    /// Answer `302 Found` pointing at `location` (may be relative).
    pub fn redirect(mut self, url: &str, location: &str) -> Self {
        self.routes
            .insert(normalize(url), Route::Redirect(302, location.to_string()));
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of requests received.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

#[async_trait]
impl HttpTransport for StaticTransport {
    async fn get(&self, url: &Url, max_body_bytes: usize) -> Result<HttpResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.routes.get(url.as_str()) {
            Some(Route::Body(status, body)) => {
                if (200..300).contains(status) && body.len() > max_body_bytes {
                    return Err(AidError::PayloadTooLarge {
                        uri: url.to_string(),
                        limit: max_body_bytes,
                    });
                }
                Ok(HttpResponse {
                    status: *status,
                    location: None,
                    body: body.clone(),
                })
            }
            Some(Route::Redirect(status, location)) => Ok(HttpResponse {
                status: *status,
                location: Some(location.clone()),
                body: Vec::new(),
            }),
            None => Ok(HttpResponse {
                status: 404,
                location: None,
                body: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_resolver_order() {
        let resolver = ScriptedTxtResolver::new()
            .fail_with([ErrorCode::DnsServfail])
            .answer("_agent.a.example.", vec!["v=1;k=txt".to_string()]);

        let first = resolver.query_txt("_agent.a.example.").await.unwrap_err();
        assert_eq!(first.code(), ErrorCode::DnsServfail);
        assert!(resolver.query_txt("_agent.a.example.").await.is_ok());
        let missing = resolver.query_txt("_agent.b.example.").await.unwrap_err();
        assert_eq!(missing.code(), ErrorCode::DnsNotFound);
        assert_eq!(resolver.queries(), 3);
    }

    #[tokio::test]
    async fn test_fallback_answer() {
        let resolver = ScriptedTxtResolver::new().answer_any(vec!["v=1;k=txt".to_string()]);
        assert_eq!(resolver.query_txt("anything.").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_static_transport_routes() {
        let transport = StaticTransport::new()
            .ok("https://example.com/a", b"A".to_vec())
            .redirect("https://example.com/b", "/a");

        let a = Url::parse("https://example.com/a").unwrap();
        let b = Url::parse("https://example.com/b").unwrap();
        let c = Url::parse("https://example.com/c").unwrap();
        assert_eq!(transport.get(&a, 1024).await.unwrap().body, b"A");
        assert_eq!(
            transport.get(&b, 1024).await.unwrap().location.as_deref(),
            Some("/a")
        );
        assert_eq!(transport.get(&c, 1024).await.unwrap().status, 404);
        assert_eq!(transport.requests(), 3);
    }
}
