//! Agent Interface Discovery core library.
//!
//! Given a domain, discover the `_agent` TXT record, parse it, retrieve the
//! artifact it describes and validate that artifact against the versioned
//! schema registry:
//!
//! ```ignore
//! let resolver = AidResolver::new()?;
//! let result = resolver.resolve("example.com", &ResolveOptions::default()).await;
//! if let Some(manifest) = result.manifest() {
//!     println!("{}", manifest.name);
//! }
//! ```

pub mod config;
pub mod dns;
pub mod error;
pub mod fakes;
pub mod fetch;
pub mod generator;
pub mod inline;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod telemetry;
pub mod validation;

/// Crate version, also used in the default user agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::{DnsConfig, FetchConfig, ResolveOptions, ResolverConfig};
pub use dns::{HickoryTxtResolver, TxtResolver};
pub use error::{AidError, ErrorCode, Result};
pub use fetch::{HttpResponse, HttpTransport, ReqwestTransport};
pub use generator::{build_manifest, build_txt_record, check_manifest_against_config, PairMode};
pub use model::{AidConfig, AidManifest, Artifact, Capability, InlineProfile, PairingRecord};
pub use record::{extract_zone_txt, select_record, ArtifactKind, DiscoveryRecord};
pub use registry::{SchemaEntry, SchemaRegistry};
pub use resolver::{AidResolver, ResolutionResult, ResolutionStatus, Stage, StageTimings};
pub use validation::{FieldError, FieldErrorKind, ValidationResult};
