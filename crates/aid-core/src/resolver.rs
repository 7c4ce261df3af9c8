//! Resolution orchestrator.
//!
//! One [`AidResolver::resolve`] call walks
//! `START -> DNS_LOOKUP -> RECORD_PARSED -> FETCHING -> VALIDATING -> DONE`
//! and stops at the first terminal failure. The only suspension points are
//! the DNS query and the HTTP fetch; both are bounded by the per-call
//! deadline and abandoned as soon as the caller's cancel signal fires.
//! Either way the resolution fails with the timeout code of the stage in
//! flight (`DNS_TIMEOUT` or `FETCH_TIMEOUT`).
//!
//! A resolver holds no per-call state, so one instance can serve many
//! concurrent resolutions.

use std::future::Future;
use std::pin::{pin, Pin};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::{ResolveOptions, ResolverConfig};
use crate::dns::{self, HickoryTxtResolver, TxtResolver};
use crate::error::{AidError, Result};
use crate::fetch::{self, HttpTransport, ReqwestTransport};
use crate::metrics::METRICS;
use crate::model::{AidManifest, Artifact};
use crate::obs;
use crate::record::{self, DiscoveryRecord};
use crate::registry::SchemaRegistry;
use crate::validation::ValidationResult;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Start,
    DnsLookup,
    RecordParsed,
    Fetching,
    Validating,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "START",
            Stage::DnsLookup => "DNS_LOOKUP",
            Stage::RecordParsed => "RECORD_PARSED",
            Stage::Fetching => "FETCHING",
            Stage::Validating => "VALIDATING",
            Stage::Done => "DONE",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ResolutionStatus {
    Done,
    Failed { stage: Stage, error: AidError },
}

/// Milliseconds spent in each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTimings {
    pub dns_ms: u64,
    pub parse_ms: u64,
    pub fetch_ms: u64,
    pub validate_ms: u64,
}

/// Everything one resolution produced. Owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub domain: String,
    /// Fully qualified TXT query name; empty when the domain was rejected.
    pub query_name: String,
    pub record: Option<DiscoveryRecord>,
    /// Present once validation ran, valid or not.
    pub artifact: Option<ValidationResult<Artifact>>,
    pub status: ResolutionStatus,
    pub timing_ms: u64,
    pub stage_timings: StageTimings,
    /// DNS queries issued, retries included.
    pub attempts: u32,
}

impl ResolutionResult {
    /// Completed and the artifact is valid.
    pub fn is_ok(&self) -> bool {
        matches!(self.status, ResolutionStatus::Done)
            && self.artifact.as_ref().is_some_and(|a| a.ok)
    }

    pub fn error(&self) -> Option<&AidError> {
        match &self.status {
            ResolutionStatus::Failed { error, .. } => Some(error),
            ResolutionStatus::Done => None,
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.status {
            ResolutionStatus::Failed { stage, .. } => Some(*stage),
            ResolutionStatus::Done => None,
        }
    }

    /// The validated artifact value, if any.
    pub fn value(&self) -> Option<&Artifact> {
        self.artifact.as_ref().and_then(|a| a.value.as_ref())
    }

    pub fn manifest(&self) -> Option<&AidManifest> {
        self.value().and_then(Artifact::as_manifest)
    }
}

/// Composes DNS lookup, record parsing, fetch and validation.
#[derive(Clone)]
pub struct AidResolver {
    dns: Arc<dyn TxtResolver>,
    transport: Arc<dyn HttpTransport>,
    registry: Arc<SchemaRegistry>,
    config: ResolverConfig,
}

impl std::fmt::Debug for AidResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AidResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AidResolver {
    /// Resolver over the system DNS configuration and a real HTTP client.
    pub fn new() -> anyhow::Result<Self> {
        Self::from_config(ResolverConfig::default())
    }

    pub fn from_config(config: ResolverConfig) -> anyhow::Result<Self> {
        let dns = Arc::new(HickoryTxtResolver::new(&config.dns));
        let transport = Arc::new(ReqwestTransport::new(&config.fetch)?);
        Ok(Self::with_backends(dns, transport, config))
    }

    /// Resolver over caller-supplied backends and the shared registry.
    pub fn with_backends(
        dns: Arc<dyn TxtResolver>,
        transport: Arc<dyn HttpTransport>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            dns,
            transport,
            registry: SchemaRegistry::shared(),
            config,
        }
    }

    pub fn with_registry(mut self, registry: Arc<SchemaRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Resolve `domain` to a validated artifact.
    pub async fn resolve(&self, domain: &str, options: &ResolveOptions) -> ResolutionResult {
        self.resolve_with_cancel(domain, options, std::future::pending::<()>())
            .await
    }

    /// As [`resolve`](Self::resolve), aborting at the next suspension point
    /// once `cancel` completes. The failure carries the timeout code of the
    /// stage in flight.
    pub async fn resolve_with_cancel<C>(
        &self,
        domain: &str,
        options: &ResolveOptions,
        cancel: C,
    ) -> ResolutionResult
    where
        C: Future<Output = ()> + Send,
    {
        self.run(domain, options, cancel)
            .instrument(obs::resolution_span(domain))
            .await
    }

    async fn run<C>(&self, domain: &str, options: &ResolveOptions, cancel: C) -> ResolutionResult
    where
        C: Future<Output = ()> + Send,
    {
        METRICS.inc_resolutions_started();
        let mut cancel = pin!(cancel);
        let mut trace = Trace::new(domain);

        let outcome = self
            .pipeline(domain, options, cancel.as_mut(), &mut trace)
            .await;

        let timing_ms = millis_since(trace.started);
        let (artifact, status) = match outcome {
            Ok(artifact) => {
                obs::emit_resolution_finished(domain, timing_ms, trace.attempts);
                (Some(artifact), ResolutionStatus::Done)
            }
            Err((stage, error)) => {
                METRICS.inc_resolutions_failed();
                obs::emit_resolution_failed(domain, stage.as_str(), &error);
                (None, ResolutionStatus::Failed { stage, error })
            }
        };

        ResolutionResult {
            domain: domain.to_string(),
            query_name: trace.query_name,
            record: trace.record,
            artifact,
            status,
            timing_ms,
            stage_timings: trace.timings,
            attempts: trace.attempts,
        }
    }

    async fn pipeline<C>(
        &self,
        domain: &str,
        options: &ResolveOptions,
        mut cancel: Pin<&mut C>,
        trace: &mut Trace,
    ) -> std::result::Result<ValidationResult<Artifact>, (Stage, AidError)>
    where
        C: Future<Output = ()> + Send,
    {
        let deadline = Instant::now() + options.timeout;

        // DNS_LOOKUP
        let started = Instant::now();
        let query_name = dns::query_name(domain, &options.dns_subdomain_prefix)
            .map_err(|e| (Stage::DnsLookup, e))?;
        trace.query_name = query_name.clone();
        obs::emit_resolution_started(domain, &query_name);

        let answers = bounded(
            dns::query_txt_with_retry(
                self.dns.as_ref(),
                &query_name,
                &self.config.dns,
                &mut trace.attempts,
            ),
            deadline,
            cancel.as_mut(),
            || AidError::DnsTimeout {
                name: query_name.clone(),
            },
        )
        .await;
        trace.timings.dns_ms = millis_since(started);
        let answers = answers.map_err(|e| (Stage::DnsLookup, e))?;
        obs::emit_dns_answered(&query_name, answers.len(), trace.attempts);

        // RECORD_PARSED
        let started = Instant::now();
        let parsed = record::select_record(&answers).and_then(|record| {
            self.registry
                .require(record.kind, &record.version)
                .map(|_| record)
        });
        trace.timings.parse_ms = millis_since(started);
        let record = parsed.map_err(|e| (Stage::RecordParsed, e))?;
        obs::emit_record_parsed(record.kind.as_str(), &record.version);
        trace.record = Some(record.clone());

        // FETCHING
        let started = Instant::now();
        let fetched = bounded(
            fetch::fetch_artifact(
                self.transport.as_ref(),
                &record,
                &self.config.fetch,
                options.allow_insecure_http,
            ),
            deadline,
            cancel.as_mut(),
            || AidError::FetchTimeout {
                uri: record.uri.clone().unwrap_or_default(),
            },
        )
        .await;
        trace.timings.fetch_ms = millis_since(started);
        let fetched = fetched.map_err(|e| (Stage::Fetching, e))?;

        // VALIDATING
        let started = Instant::now();
        let validated = self
            .registry
            .validate(record.kind, &record.version, &fetched.payload);
        trace.timings.validate_ms = millis_since(started);
        let validated = validated.map_err(|e| (Stage::Validating, e))?;
        obs::emit_validated(record.kind.as_str(), validated.ok, validated.errors.len());

        Ok(validated)
    }
}

/// Per-call bookkeeping that survives a failure part-way through.
struct Trace {
    started: Instant,
    query_name: String,
    record: Option<DiscoveryRecord>,
    attempts: u32,
    timings: StageTimings,
}

impl Trace {
    fn new(domain: &str) -> Self {
        tracing::debug!(domain = %domain, "resolution starting");
        Self {
            started: Instant::now(),
            query_name: String::new(),
            record: None,
            attempts: 0,
            timings: StageTimings::default(),
        }
    }
}

/// Run `work` until it finishes, the deadline passes or `cancel` fires.
/// Deadline and cancellation both fail with `timed_out()`. Losing futures
/// are dropped, which closes any connection they hold.
async fn bounded<T, C>(
    work: impl Future<Output = Result<T>>,
    deadline: Instant,
    cancel: Pin<&mut C>,
    timed_out: impl FnOnce() -> AidError,
) -> Result<T>
where
    C: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = cancel => Err(timed_out()),
        outcome = tokio::time::timeout_at(deadline, work) => {
            outcome.unwrap_or_else(|_| Err(timed_out()))
        }
    }
}

fn millis_since(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
