//! Conformance tooling for Agent Interface Discovery.
//!
//! - [`fixture`]: the fixture file format and loader.
//! - [`harness`]: runs fixtures through the real resolver over scripted
//!   DNS/HTTP backends.
//! - [`drift`]: compares rendered schema documents with checked-in copies.
//! - [`report`]: JSON and Markdown reports over both.

pub mod drift;
pub mod fixture;
pub mod harness;
pub mod report;

pub use drift::{check_schemas, render_schemas, write_schemas, DriftEntry, DriftReport, DriftStatus};
pub use fixture::{builtin_fixtures, load_fixtures, parse_fixtures, Fixture, FixtureError, FixtureSet};
pub use harness::{run_fixtures, FixtureOutcome, Harness, Mismatch};
pub use report::{render_markdown, ConformanceReport, ConformanceSummary};
