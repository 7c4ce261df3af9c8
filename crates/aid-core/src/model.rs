//! Typed artifact values.
//!
//! These are the serde projections of documents the schema tree already
//! accepted; they are never deserialized from unvalidated input. Vendor `x-`
//! keys accepted by the schema are dropped here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::ArtifactKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AidManifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
    pub capabilities: Vec<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Generator input: a service, where it is published and what it offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AidConfig {
    pub version: String,
    pub service_name: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(
        rename = "revocationURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub revocation_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    pub name: String,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CapabilityStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Vec<ConfigurationItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_paths: Option<Vec<RequiredPath>>,
    #[serde(flatten)]
    pub target: CapabilityTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityStatus {
    Active,
    Deprecated,
}

/// Where a capability runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CapabilityTarget {
    Remote {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        certificate: Option<Certificate>,
    },
    Local {
        package: Package,
        execution: Execution,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub source: CertificateSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateSource {
    File,
    Enrollment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub manager: String,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub command: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_overrides: Option<BTreeMap<String, ExecutionOverride>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOverride {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationItem {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub value_type: ConfigValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigValueType {
    String,
    Boolean,
    Integer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredPath {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub path_type: Option<PathType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    File,
    Directory,
}

/// How a client authenticates against a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme")]
pub enum Authentication {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "pat")]
    Pat(TokenAuth),
    #[serde(rename = "apikey")]
    Apikey(TokenAuth),
    #[serde(rename = "basic")]
    Basic(BasicAuth),
    #[serde(rename = "oauth2_device")]
    Oauth2Device(OAuthAuth),
    #[serde(rename = "oauth2_code")]
    Oauth2Code(OAuthAuth),
    #[serde(rename = "oauth2_service")]
    Oauth2Service(OAuthAuth),
    #[serde(rename = "mtls")]
    Mtls { description: String },
    #[serde(rename = "custom")]
    Custom { description: String },
}

impl Authentication {
    pub fn scheme(&self) -> &'static str {
        match self {
            Authentication::None => "none",
            Authentication::Pat(_) => "pat",
            Authentication::Apikey(_) => "apikey",
            Authentication::Basic(_) => "basic",
            Authentication::Oauth2Device(_) => "oauth2_device",
            Authentication::Oauth2Code(_) => "oauth2_code",
            Authentication::Oauth2Service(_) => "oauth2_service",
            Authentication::Mtls { .. } => "mtls",
            Authentication::Custom { .. } => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAuth {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Vec<Credential>>,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Vec<Credential>>,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthAuth {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Vec<Credential>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
    pub oauth: OAuthEndpoints,
}

/// Union of the endpoint sets of the OAuth flows; which members are present
/// depends on the scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthEndpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_authorization_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub key: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(rename = "in")]
    pub location: PlacementLocation,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementLocation {
    Header,
    Query,
    CliArg,
}

/// One `key=value` entry of an inline TXT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxtEntry {
    pub key: String,
    pub value: String,
}

/// Validated `txt` payload: its entries in record order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineProfile {
    pub entries: Vec<TxtEntry>,
}

impl InlineProfile {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }
}

/// Validated `pair` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingRecord {
    /// Lowercase hex of the 32-byte key.
    pub pairing_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// A validated artifact of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Artifact {
    Manifest(AidManifest),
    Config(AidConfig),
    Txt(InlineProfile),
    Pair(PairingRecord),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Manifest(_) => ArtifactKind::Manifest,
            Artifact::Config(_) => ArtifactKind::Config,
            Artifact::Txt(_) => ArtifactKind::Txt,
            Artifact::Pair(_) => ArtifactKind::Pair,
        }
    }

    pub fn as_manifest(&self) -> Option<&AidManifest> {
        match self {
            Artifact::Manifest(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&AidConfig> {
        match self {
            Artifact::Config(c) => Some(c),
            _ => None,
        }
    }
}
