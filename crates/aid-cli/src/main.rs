//! AID - Agent Interface Discovery CLI
//!
//! The `aid` command discovers, validates and publishes agent interface
//! records.
//!
//! ## Commands
//!
//! - `resolve`: Discover and validate the artifact published for a domain
//! - `record`: Parse a TXT payload or zone-file line
//! - `validate`: Validate a local artifact against a schema version
//! - `generate`: Build a manifest and its DNS record from a config document
//! - `conformance`: Run the conformance fixtures (and optionally the drift check)
//! - `schema`: Generate or check the published JSON Schema documents

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};

use aid_conformance::{
    builtin_fixtures, check_schemas, load_fixtures, render_markdown, run_fixtures, write_schemas,
    DriftReport, DriftStatus,
};
use aid_core::generator::{manifest_uri, DEFAULT_MANIFEST_PATH, DEFAULT_TTL};
use aid_core::metrics::METRICS;
use aid_core::telemetry::init_tracing;
use aid_core::{
    build_manifest, build_txt_record, check_manifest_against_config, extract_zone_txt, AidConfig,
    AidManifest, AidResolver, Artifact, ArtifactKind, DiscoveryRecord, PairMode,
    ResolutionResult, ResolutionStatus, ResolveOptions, ResolverConfig, SchemaRegistry,
    ValidationResult,
};

#[derive(Parser)]
#[command(name = "aid")]
#[command(author = "Agent Community")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Agent Interface Discovery (AID)", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, fetch and validate the artifact a domain publishes
    Resolve {
        /// Domain to resolve (e.g. example.com)
        domain: String,

        /// Overall deadline for DNS and fetch, in milliseconds
        #[arg(long, default_value = "10000")]
        timeout_ms: u64,

        /// Permit http:// pointer URIs and redirects
        #[arg(long)]
        allow_insecure_http: bool,

        /// DNS label prepended to the domain
        #[arg(long, default_value = "_agent")]
        prefix: String,

        /// Result format
        #[arg(short, long, value_enum, default_value = "text")]
        output: Output,
    },

    /// Parse a discovery TXT payload or a full zone-file line
    Record {
        /// `v=1;k=...` payload or `_agent.example.com. 3600 IN TXT "..."`
        input: String,
    },

    /// Validate a local artifact file
    Validate {
        /// Artifact kind (manifest, config, txt, pair)
        #[arg(short, long)]
        kind: ArtifactKind,

        /// Schema version to validate against
        #[arg(long, default_value = "1")]
        version: String,

        /// Artifact file
        file: PathBuf,

        /// Result format
        #[arg(short, long, value_enum, default_value = "text")]
        output: Output,
    },

    /// Build a manifest and its TXT record from a config document
    Generate {
        /// Config document (aid.config.json)
        #[arg(short, long)]
        config: PathBuf,

        /// Path the manifest is served from
        #[arg(long, default_value = DEFAULT_MANIFEST_PATH)]
        manifest_path: String,

        /// TTL of the generated TXT record
        #[arg(long, default_value_t = DEFAULT_TTL)]
        ttl: u32,

        /// Write the manifest here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,

        /// Compare a published manifest with the generated one
        #[arg(long)]
        check: Option<PathBuf>,

        /// Ignore description and metadata differences in --check
        #[arg(long, requires = "check")]
        lenient: bool,
    },

    /// Run the conformance fixtures
    Conformance {
        /// Fixture file (default: the bundled fixtures)
        #[arg(short, long)]
        fixtures: Option<PathBuf>,

        /// Write the report here (.md for Markdown, JSON otherwise)
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Also check the schema documents in this directory for drift
        #[arg(long)]
        schemas: Option<PathBuf>,
    },

    /// Published JSON Schema documents
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },
}

#[derive(Subcommand)]
enum SchemaAction {
    /// Render every registered schema into a directory
    Generate {
        /// Output directory
        #[arg(short, long, default_value = "schemas")]
        out: PathBuf,
    },

    /// Fail if checked-in schemas differ from the rendered ones
    Check {
        /// Directory holding the checked-in schemas
        #[arg(short, long, default_value = "schemas")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Resolve {
            domain,
            timeout_ms,
            allow_insecure_http,
            prefix,
            output,
        } => {
            let options = ResolveOptions::default()
                .with_timeout(Duration::from_millis(timeout_ms))
                .allow_insecure_http(allow_insecure_http)
                .with_prefix(prefix);
            cmd_resolve(&domain, &options, output).await
        }
        Commands::Record { input } => cmd_record(&input),
        Commands::Validate {
            kind,
            version,
            file,
            output,
        } => cmd_validate(kind, &version, &file, output),
        Commands::Generate {
            config,
            manifest_path,
            ttl,
            out,
            check,
            lenient,
        } => {
            let mode = if lenient {
                PairMode::Lenient
            } else {
                PairMode::Strict
            };
            cmd_generate(
                &config,
                &manifest_path,
                ttl,
                out.as_deref(),
                check.as_deref().map(|path| (path, mode)),
            )
        }
        Commands::Conformance {
            fixtures,
            report,
            schemas,
        } => cmd_conformance(fixtures.as_deref(), report.as_deref(), schemas.as_deref()).await,
        Commands::Schema { action } => match action {
            SchemaAction::Generate { out } => cmd_schema_generate(&out),
            SchemaAction::Check { dir } => cmd_schema_check(&dir),
        },
    }
}

// ---------------------------------------------------------------------------
// resolve
// ---------------------------------------------------------------------------

async fn cmd_resolve(domain: &str, options: &ResolveOptions, output: Output) -> Result<()> {
    let resolver =
        AidResolver::from_config(ResolverConfig::from_env()).context("Failed to build resolver")?;
    let result = resolver.resolve(domain, options).await;
    METRICS.flush();

    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Output::Text => println!("{}", render_resolution_text(&result)),
    }

    match &result.status {
        ResolutionStatus::Failed { stage, error } => {
            anyhow::bail!("Resolution failed at {}: {} ({})", stage, error.code(), error)
        }
        ResolutionStatus::Done if !result.is_ok() => {
            anyhow::bail!("Artifact published for {} failed validation", domain)
        }
        ResolutionStatus::Done => Ok(()),
    }
}

fn render_resolution_text(result: &ResolutionResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("Domain:   {}\n", result.domain));
    out.push_str(&format!("Query:    {}\n", result.query_name));
    if let Some(record) = &result.record {
        out.push_str(&format!("Record:   {}\n", record.raw));
    }
    match &result.status {
        ResolutionStatus::Done => out.push_str("Status:   ✓ DONE\n"),
        ResolutionStatus::Failed { stage, error } => out.push_str(&format!(
            "Status:   ✗ FAILED at {} ({}: {})\n",
            stage,
            error.code(),
            error
        )),
    }
    out.push_str(&format!("Attempts: {}\n", result.attempts));
    let t = &result.stage_timings;
    out.push_str(&format!(
        "Timing:   {}ms (dns {}ms, parse {}ms, fetch {}ms, validate {}ms)\n",
        result.timing_ms, t.dns_ms, t.parse_ms, t.fetch_ms, t.validate_ms
    ));
    if let Some(artifact) = &result.artifact {
        out.push('\n');
        out.push_str(&render_validation_text(artifact));
    }
    out.trim_end().to_string()
}

// ---------------------------------------------------------------------------
// record / validate
// ---------------------------------------------------------------------------

fn cmd_record(input: &str) -> Result<()> {
    let payload = extract_zone_txt(input);
    let record = DiscoveryRecord::parse(&payload)
        .with_context(|| format!("Invalid discovery record: {:?}", payload))?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    if !SchemaRegistry::shared().supports(record.kind, &record.version) {
        anyhow::bail!(
            "Record parses, but {} version {} is not supported",
            record.kind,
            record.version
        );
    }
    Ok(())
}

fn cmd_validate(kind: ArtifactKind, version: &str, file: &Path, output: Output) -> Result<()> {
    let payload = std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
    let result = SchemaRegistry::shared()
        .validate(kind, version, &payload)
        .with_context(|| format!("Failed to validate {:?}", file))?;

    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Output::Text => println!("{}", render_validation_text(&result).trim_end()),
    }

    if result.ok {
        Ok(())
    } else {
        anyhow::bail!("{:?} is not a valid {} v{}", file, kind, version)
    }
}

fn render_validation_text(result: &ValidationResult<Artifact>) -> String {
    let mut out = String::new();
    match &result.value {
        Some(artifact) if result.ok => {
            out.push_str(&format!("✓ valid {}", artifact.kind()));
            match artifact {
                Artifact::Manifest(m) => out.push_str(&format!(
                    ": {} ({} capabilities)",
                    m.name,
                    m.capabilities.len()
                )),
                Artifact::Config(c) => out.push_str(&format!(
                    ": {} on {} ({} capabilities)",
                    c.service_name,
                    c.domain,
                    c.capabilities.len()
                )),
                Artifact::Txt(t) => out.push_str(&format!(": {} entries", t.entries.len())),
                Artifact::Pair(p) => out.push_str(&format!(": key {}", p.pairing_key)),
            }
            out.push('\n');
        }
        _ => {
            out.push_str(&format!("✗ {} validation errors\n", result.errors.len()));
            for error in &result.errors {
                out.push_str(&format!("  - {}\n", error));
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

fn cmd_generate(
    config_path: &Path,
    manifest_path: &str,
    ttl: u32,
    out: Option<&Path>,
    check: Option<(&Path, PairMode)>,
) -> Result<()> {
    let config: AidConfig = read_artifact(config_path, ArtifactKind::Config, |a| {
        a.as_config().cloned()
    })?;

    let manifest = build_manifest(&config);
    let manifest_json = serde_json::to_string_pretty(&manifest)?;
    let record = build_txt_record(&config, manifest_path, ttl);

    match out {
        Some(path) => {
            std::fs::write(path, format!("{manifest_json}\n"))
                .with_context(|| format!("Failed to write {:?}", path))?;
            info!(
                event = "manifest.written",
                path = %path.display(),
                uri = %manifest_uri(&config, manifest_path)
            );
        }
        None => println!("{manifest_json}\n"),
    }
    println!("{record}");

    if let Some((published_path, mode)) = check {
        let published: AidManifest =
            read_artifact(published_path, ArtifactKind::Manifest, |a| {
                a.as_manifest().cloned()
            })?;
        let pair = check_manifest_against_config(&config, &published, mode)?;
        if !pair.ok {
            eprintln!("{}", render_validation_text(&pair.map(Artifact::Manifest)).trim_end());
            anyhow::bail!(
                "Published manifest {:?} does not match {:?}",
                published_path,
                config_path
            );
        }
        println!("✓ published manifest matches config");
    }
    Ok(())
}

/// Read and validate a v1 JSON artifact, failing with the field errors.
fn read_artifact<T>(
    path: &Path,
    kind: ArtifactKind,
    project: impl FnOnce(&Artifact) -> Option<T>,
) -> Result<T> {
    let payload = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let result = SchemaRegistry::shared()
        .validate(kind, aid_core::schema::v1::VERSION, &payload)
        .with_context(|| format!("Failed to validate {:?}", path))?;

    if !result.ok {
        eprintln!("{}", render_validation_text(&result).trim_end());
        anyhow::bail!("{:?} is not a valid {} document", path, kind);
    }
    result
        .value
        .as_ref()
        .and_then(project)
        .with_context(|| format!("{:?} did not produce a {} value", path, kind))
}

// ---------------------------------------------------------------------------
// conformance / schema
// ---------------------------------------------------------------------------

async fn cmd_conformance(
    fixtures_path: Option<&Path>,
    report_path: Option<&Path>,
    schemas_dir: Option<&Path>,
) -> Result<()> {
    let fixtures = match fixtures_path {
        Some(path) => load_fixtures(path)?,
        None => builtin_fixtures().context("Bundled fixtures are invalid")?,
    };
    info!(event = "conformance.started", fixtures = fixtures.len());

    let mut report = run_fixtures(&fixtures).await;
    if let Some(dir) = schemas_dir {
        report = report.with_drift(check_schemas(&SchemaRegistry::shared(), dir)?);
    }

    let markdown = render_markdown(&report);
    println!("{}", markdown.trim_end());

    if let Some(path) = report_path {
        if path.extension().is_some_and(|ext| ext == "md") {
            std::fs::write(path, &markdown).with_context(|| format!("write {:?}", path))?;
        } else {
            report.write_json(path)?;
        }
        info!(event = "conformance.report_written", path = %path.display());
    }

    match (report.has_fixture_failures(), report.has_drift()) {
        (false, false) => Ok(()),
        (true, false) => anyhow::bail!(
            "{} of {} conformance fixtures failed",
            report.summary.failed,
            report.summary.total
        ),
        (false, true) => anyhow::bail!("Schema drift detected"),
        (true, true) => anyhow::bail!(
            "{} of {} conformance fixtures failed and schema drift detected",
            report.summary.failed,
            report.summary.total
        ),
    }
}

fn cmd_schema_generate(out: &Path) -> Result<()> {
    let written = write_schemas(&SchemaRegistry::shared(), out)?;
    for path in &written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn cmd_schema_check(dir: &Path) -> Result<()> {
    let report = check_schemas(&SchemaRegistry::shared(), dir)?;
    println!("{}", render_drift_text(&report));
    if report.is_clean() {
        Ok(())
    } else {
        anyhow::bail!(
            "Schema drift in {:?}; run `aid schema generate --out {}`",
            dir,
            dir.display()
        )
    }
}

fn render_drift_text(report: &DriftReport) -> String {
    report
        .entries
        .iter()
        .map(|entry| match &entry.status {
            DriftStatus::InSync => format!("✓ {}", entry.file),
            DriftStatus::Drifted {
                first_difference_line,
                checked_in_sha256,
                generated_sha256,
            } => format!(
                "✗ {} drifted at line {} (checked in {}, generated {})",
                entry.file,
                first_difference_line,
                short_digest(checked_in_sha256),
                short_digest(generated_sha256)
            ),
            DriftStatus::Missing => format!("✗ {} missing", entry.file),
            DriftStatus::Unexpected => format!("✗ {} not generated by any schema", entry.file),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn short_digest(digest: &str) -> &str {
    &digest[..digest.len().min(12)]
}
