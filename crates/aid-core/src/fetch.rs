//! Artifact retrieval.
//!
//! [`HttpTransport`] performs a single GET without following redirects;
//! [`fetch_artifact`] layers the policy on top: scheme restriction, the
//! redirect cap with loop detection, status mapping, the body ceiling and
//! the per-request timeout. Inline kinds never reach the transport.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, LOCATION};
use url::Url;

use crate::config::FetchConfig;
use crate::error::{AidError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::record::DiscoveryRecord;

/// One HTTP response, before any redirect handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// `Location` header, if any.
    pub location: Option<String>,
    /// Body of a 2xx response; transports may leave it empty otherwise.
    pub body: Vec<u8>,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET for `url`. Must not follow redirects. Should stop reading
    /// with `PAYLOAD_TOO_LARGE` once the body exceeds `max_body_bytes`.
    async fn get(&self, url: &Url, max_body_bytes: usize) -> Result<HttpResponse>;
}

/// Raw artifact bytes and where they finally came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub payload: Vec<u8>,
    /// Final URI after redirects; `None` for inline payloads.
    pub source: Option<String>,
    pub redirects: usize,
}

/// Retrieve the artifact a record describes.
///
/// `txt` and `pair` records carry their payload in `raw`. `manifest` and
/// `config` records are fetched from `uri`.
pub async fn fetch_artifact(
    transport: &dyn HttpTransport,
    record: &DiscoveryRecord,
    config: &FetchConfig,
    allow_insecure_http: bool,
) -> Result<FetchedArtifact> {
    if record.kind.is_inline() {
        return Ok(FetchedArtifact {
            payload: record.raw.clone().into_bytes(),
            source: None,
            redirects: 0,
        });
    }

    let uri = record
        .uri
        .as_deref()
        .ok_or_else(|| AidError::invalid_record(format!("{} record requires key u", record.kind)))?;
    let start = Url::parse(uri)
        .map_err(|e| AidError::invalid_record(format!("pointer URI {uri:?} is not absolute: {e}")))?;

    fetch_url(transport, start, config, allow_insecure_http).await
}

/// GET `start`, following at most `config.max_redirects` redirects.
pub async fn fetch_url(
    transport: &dyn HttpTransport,
    start: Url,
    config: &FetchConfig,
    allow_insecure_http: bool,
) -> Result<FetchedArtifact> {
    check_scheme(&start, allow_insecure_http)?;

    let mut visited = vec![start.clone()];
    let mut current = start;

    loop {
        METRICS.inc_fetches();
        let response = get_with_timeout(transport, &current, config).await?;

        match response.status {
            200..=299 => {
                if response.body.len() > config.max_body_bytes {
                    return Err(AidError::PayloadTooLarge {
                        uri: current.to_string(),
                        limit: config.max_body_bytes,
                    });
                }
                let redirects = visited.len() - 1;
                obs::emit_fetch_completed(current.as_str(), response.body.len(), redirects);
                return Ok(FetchedArtifact {
                    payload: response.body,
                    source: Some(current.to_string()),
                    redirects,
                });
            }
            300..=399 => {
                let location = response.location.ok_or_else(|| AidError::FetchHttpError {
                    uri: current.to_string(),
                    status: Some(response.status),
                    detail: "redirect without Location header".to_string(),
                })?;
                let next = current.join(&location).map_err(|e| AidError::FetchHttpError {
                    uri: current.to_string(),
                    status: Some(response.status),
                    detail: format!("invalid redirect target {location:?}: {e}"),
                })?;
                check_scheme(&next, allow_insecure_http)?;

                if visited.len() > config.max_redirects || visited.contains(&next) {
                    return Err(AidError::RedirectLoop {
                        uri: next.to_string(),
                        limit: config.max_redirects,
                    });
                }
                tracing::debug!(from = %current, to = %next, "following redirect");
                visited.push(next.clone());
                current = next;
            }
            status => {
                return Err(AidError::FetchHttpError {
                    uri: current.to_string(),
                    status: Some(status),
                    detail: format!("unexpected HTTP status {status}"),
                });
            }
        }
    }
}

async fn get_with_timeout(
    transport: &dyn HttpTransport,
    url: &Url,
    config: &FetchConfig,
) -> Result<HttpResponse> {
    tokio::time::timeout(config.timeout, transport.get(url, config.max_body_bytes))
        .await
        .unwrap_or_else(|_| {
            Err(AidError::FetchTimeout {
                uri: url.to_string(),
            })
        })
}

fn check_scheme(url: &Url, allow_insecure_http: bool) -> Result<()> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_insecure_http => Ok(()),
        other => Err(AidError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

/// [`HttpTransport`] backed by `reqwest` with automatic redirects disabled.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .user_agent(config.user_agent.as_str())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url, max_body_bytes: usize) -> Result<HttpResponse> {
        let mut response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json, text/plain;q=0.9")
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Only successful bodies are read; dropping the response closes the
        // connection for everything else.
        if !response.status().is_success() {
            return Ok(HttpResponse {
                status,
                location,
                body: Vec::new(),
            });
        }

        let too_large = || AidError::PayloadTooLarge {
            uri: url.to_string(),
            limit: max_body_bytes,
        };
        if response
            .content_length()
            .is_some_and(|len| len > max_body_bytes as u64)
        {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| map_reqwest_error(url, e))?
        {
            if body.len() + chunk.len() > max_body_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        Ok(HttpResponse {
            status,
            location,
            body,
        })
    }
}

fn map_reqwest_error(url: &Url, error: reqwest::Error) -> AidError {
    if error.is_timeout() {
        AidError::FetchTimeout {
            uri: url.to_string(),
        }
    } else {
        AidError::FetchHttpError {
            uri: url.to_string(),
            status: error.status().map(|s| s.as_u16()),
            detail: error.to_string(),
        }
    }
}
