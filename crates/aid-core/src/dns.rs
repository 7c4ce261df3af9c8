//! TXT discovery over DNS.
//!
//! [`TxtResolver`] is the seam between the orchestrator and the network:
//! [`HickoryTxtResolver`] talks to real nameservers, while
//! [`ScriptedTxtResolver`](crate::fakes::ScriptedTxtResolver) replays canned
//! answers. Retry policy lives in [`query_txt_with_retry`] so every backend
//! gets the same behaviour.

use async_trait::async_trait;
use hickory_resolver::config::{
    NameServerConfigGroup, ResolverConfig as HickoryConfig, ResolverOpts,
};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use tracing::debug;

use crate::config::DnsConfig;
use crate::error::{AidError, Result};
use crate::metrics::METRICS;
use crate::obs;

/// Source of raw TXT answers.
#[async_trait]
pub trait TxtResolver: Send + Sync {
    /// Every TXT string at `name`, in answer order, multi-string records
    /// already concatenated.
    ///
    /// Fails with `DNS_NOT_FOUND` (including an empty answer),
    /// `DNS_TIMEOUT` or `DNS_SERVFAIL`.
    async fn query_txt(&self, name: &str) -> Result<Vec<String>>;
}

/// Longest presentation-form name, without the root dot.
pub const MAX_NAME_BYTES: usize = 253;
pub const MAX_LABEL_BYTES: usize = 63;

/// Build the fully qualified query name `<prefix>.<domain>.`.
///
/// A trailing dot on `domain` is tolerated. Every label of the result must
/// be 1 to 63 bytes of `[A-Za-z0-9_-]` and the whole name at most 253 bytes.
/// Anything else is `DNS_NOT_FOUND` without any query being issued.
pub fn query_name(domain: &str, prefix: &str) -> Result<String> {
    let domain = domain.trim().trim_end_matches('.');
    let prefix = prefix.trim().trim_matches('.');
    let name = if prefix.is_empty() {
        domain.to_string()
    } else {
        format!("{prefix}.{domain}")
    };

    if domain.is_empty() || name.len() > MAX_NAME_BYTES || !name.split('.').all(is_label) {
        return Err(AidError::DnsNotFound {
            name: domain.to_string(),
        });
    }
    Ok(format!("{name}."))
}

fn is_label(label: &str) -> bool {
    (1..=MAX_LABEL_BYTES).contains(&label.len())
        && label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Query `name`, retrying a transient failure at most `config.retries()`
/// times. Each attempt is bounded by `config.timeout`. `DNS_NOT_FOUND` is
/// final.
///
/// `attempts` is bumped before each query, so it stays accurate when the
/// caller abandons the future part-way.
pub async fn query_txt_with_retry(
    resolver: &dyn TxtResolver,
    name: &str,
    config: &DnsConfig,
    attempts: &mut u32,
) -> Result<Vec<String>> {
    let mut tries = 0;
    loop {
        tries += 1;
        *attempts += 1;
        let result = match tokio::time::timeout(config.timeout, resolver.query_txt(name)).await {
            Ok(Ok(answers)) if answers.is_empty() => Err(AidError::DnsNotFound {
                name: name.to_string(),
            }),
            Ok(result) => result,
            Err(_) => Err(AidError::DnsTimeout {
                name: name.to_string(),
            }),
        };

        match result {
            Err(e) if e.is_transient_dns() && tries <= config.retries() => {
                obs::emit_dns_retry(name, &e);
                METRICS.inc_dns_retries();
            }
            result => return result,
        }
    }
}

/// [`TxtResolver`] backed by `hickory-resolver`.
pub struct HickoryTxtResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryTxtResolver {
    /// Resolver using `config.nameserver` when set, else the system
    /// configuration (falling back to hickory's defaults when that cannot
    /// be read).
    pub fn new(config: &DnsConfig) -> Self {
        let (upstream, mut opts) = match config.nameserver {
            Some(addr) => {
                let group = NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);
                (
                    HickoryConfig::from_parts(None, vec![], group),
                    ResolverOpts::default(),
                )
            }
            None => hickory_resolver::system_conf::read_system_conf().unwrap_or_else(|e| {
                debug!(error = %e, "system resolver config unavailable, using defaults");
                (HickoryConfig::default(), ResolverOpts::default())
            }),
        };

        // Retries and caching are handled above this layer.
        opts.timeout = config.timeout;
        opts.attempts = 1;
        opts.cache_size = 0;

        Self {
            resolver: TokioAsyncResolver::tokio(upstream, opts),
        }
    }
}

#[async_trait]
impl TxtResolver for HickoryTxtResolver {
    async fn query_txt(&self, name: &str) -> Result<Vec<String>> {
        let lookup = self
            .resolver
            .txt_lookup(name)
            .await
            .map_err(|e| map_resolve_error(name, &e))?;

        let answers: Vec<String> = lookup
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|chunk| String::from_utf8_lossy(chunk))
                    .collect::<String>()
            })
            .collect();

        debug!(query_name = %name, answers = answers.len(), "TXT lookup answered");
        Ok(answers)
    }
}

fn map_resolve_error(name: &str, error: &ResolveError) -> AidError {
    let name = name.to_string();
    match error.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => match *response_code {
            ResponseCode::NXDomain | ResponseCode::NoError => AidError::DnsNotFound { name },
            code => AidError::DnsServfail {
                name,
                detail: code.to_string(),
            },
        },
        ResolveErrorKind::Timeout => AidError::DnsTimeout { name },
        _ => AidError::DnsServfail {
            name,
            detail: error.to_string(),
        },
    }
}
