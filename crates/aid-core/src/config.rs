//! Resolver configuration.
//!
//! [`ResolverConfig`] is fixed when an [`AidResolver`](crate::AidResolver)
//! is built; [`ResolveOptions`] is supplied per call. Neither is ever read
//! from ambient state inside the core: [`ResolverConfig::from_env`] exists
//! for binaries to call explicitly.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retries allowed on a transient DNS failure.
pub const MAX_DNS_RETRIES: u32 = 1;

/// Default well-known subdomain label.
pub const DEFAULT_SUBDOMAIN_PREFIX: &str = "_agent";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub dns: DnsConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Query this server instead of the system resolvers.
    pub nameserver: Option<SocketAddr>,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries on DNS_TIMEOUT / DNS_SERVFAIL; clamped to [`MAX_DNS_RETRIES`].
    pub max_retries: u32,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            nameserver: None,
            timeout: Duration::from_secs(3),
            max_retries: MAX_DNS_RETRIES,
        }
    }
}

impl DnsConfig {
    pub fn retries(&self) -> u32 {
        self.max_retries.min(MAX_DNS_RETRIES)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    pub max_redirects: usize,
    /// Response bodies larger than this fail with PAYLOAD_TOO_LARGE.
    pub max_body_bytes: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_redirects: 3,
            max_body_bytes: 256 * 1024,
            user_agent: format!("aid-rs/{}", crate::VERSION),
        }
    }
}

impl ResolverConfig {
    /// Defaults overridden by `AID_DNS_SERVER`, `AID_DNS_TIMEOUT_MS`,
    /// `AID_FETCH_TIMEOUT_MS` and `AID_FETCH_MAX_BYTES`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(server) = parsed::<SocketAddr>(&lookup, "AID_DNS_SERVER") {
            config.dns.nameserver = Some(server);
        }
        if let Some(ms) = parsed::<u64>(&lookup, "AID_DNS_TIMEOUT_MS") {
            config.dns.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed::<u64>(&lookup, "AID_FETCH_TIMEOUT_MS") {
            config.fetch.timeout = Duration::from_millis(ms);
        }
        if let Some(bytes) = parsed::<usize>(&lookup, "AID_FETCH_MAX_BYTES") {
            config.fetch.max_body_bytes = bytes;
        }
        config
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(env = key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

/// Per-call options of [`AidResolver::resolve`](crate::AidResolver::resolve).
///
/// On the wire: `{"timeoutMs": 10000, "allowInsecureHttp": false,
/// "dnsSubdomainPrefix": "_agent"}`. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveOptions {
    /// Overall deadline shared by the DNS and fetch stages.
    #[serde(rename = "timeoutMs", with = "duration_ms")]
    pub timeout: Duration,
    /// Permit `http` pointer URIs and redirects.
    pub allow_insecure_http: bool,
    pub dns_subdomain_prefix: String,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            allow_insecure_http: false,
            dns_subdomain_prefix: DEFAULT_SUBDOMAIN_PREFIX.to_string(),
        }
    }
}

impl ResolveOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn allow_insecure_http(mut self, allow: bool) -> Self {
        self.allow_insecure_http = allow;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.dns_subdomain_prefix = prefix.into();
        self
    }
}

/// Serde for a [`Duration`] carried as whole milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.dns.timeout, Duration::from_secs(3));
        assert_eq!(config.dns.retries(), 1);
        assert_eq!(config.fetch.max_redirects, 3);
        assert_eq!(config.fetch.max_body_bytes, 262_144);
        assert!(config.fetch.user_agent.starts_with("aid-rs/"));

        let options = ResolveOptions::default();
        assert_eq!(options.dns_subdomain_prefix, "_agent");
        assert!(!options.allow_insecure_http);
    }

    #[test]
    fn test_env_overrides() {
        let config = ResolverConfig::from_lookup(lookup(&[
            ("AID_DNS_SERVER", "127.0.0.1:5353"),
            ("AID_DNS_TIMEOUT_MS", "250"),
            ("AID_FETCH_TIMEOUT_MS", "1500"),
            ("AID_FETCH_MAX_BYTES", "1024"),
        ]));
        assert_eq!(config.dns.nameserver, Some("127.0.0.1:5353".parse().unwrap()));
        assert_eq!(config.dns.timeout, Duration::from_millis(250));
        assert_eq!(config.fetch.timeout, Duration::from_millis(1500));
        assert_eq!(config.fetch.max_body_bytes, 1024);
    }

    #[test]
    fn test_bad_env_values_are_ignored() {
        let config = ResolverConfig::from_lookup(lookup(&[
            ("AID_DNS_SERVER", "not-an-address"),
            ("AID_FETCH_TIMEOUT_MS", "soon"),
        ]));
        assert_eq!(config, ResolverConfig::default());
    }

    #[test]
    fn test_options_wire_shape() {
        let wire = serde_json::json!({
            "timeoutMs": 2500,
            "allowInsecureHttp": true,
            "dnsSubdomainPrefix": "_aid"
        });
        let options: ResolveOptions = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(
            options,
            ResolveOptions::default()
                .with_timeout(Duration::from_millis(2500))
                .allow_insecure_http(true)
                .with_prefix("_aid")
        );
        assert_eq!(serde_json::to_value(&options).unwrap(), wire);
    }

    #[test]
    fn test_options_missing_keys_take_defaults() {
        let options: ResolveOptions = serde_json::from_str(r#"{"timeoutMs":500}"#).unwrap();
        assert_eq!(options.timeout, Duration::from_millis(500));
        assert_eq!(options.dns_subdomain_prefix, DEFAULT_SUBDOMAIN_PREFIX);
        assert!(!options.allow_insecure_http);

        let default = serde_json::to_value(ResolveOptions::default()).unwrap();
        assert_eq!(default["timeoutMs"], 10_000);
        assert!(default.get("timeout").is_none());
    }

    #[test]
    fn test_retries_are_capped() {
        let dns = DnsConfig {
            max_retries: 5,
            ..DnsConfig::default()
        };
        assert_eq!(dns.retries(), MAX_DNS_RETRIES);
    }
}
