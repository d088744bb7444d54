//! # kindex-cli — Command-Line Interface
//!
//! Provides the `kindex` binary over the engine crates.
//!
//! ## Subcommands
//!
//! - `kindex catalog`: Summarize the loaded catalog and its fingerprint.
//! - `kindex validate`: Validate payload files as one kind.
//! - `kindex resolve`: Build a snapshot from payload files and resolve its references.
//! - `kindex collect`: Fetch a paginated collection from a snapshot directory.
//!
//! ```bash
//! kindex --catalog catalog/lb.catalog.yaml validate --kind Pool pool.json
//! kindex --edition essentials resolve Pool=pools.json VirtualService=vs.json --order
//! kindex collect --kind Pool --dir snapshots/2024-06-01
//! ```
//!
//! ## Crate Policy
//!
//! - Handlers delegate to the engine crates; no validation logic lives here.
//! - Every handler returns the process exit code: 0 when everything is
//!   valid and resolved, 1 when the input has problems. Operational errors
//!   (unreadable files, bad configuration) surface as `Err`.
//! - Sensitive field values never reach the output.

pub mod catalog;
pub mod collect;
pub mod resolve;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use kindex_core::EngineConfig;
use kindex_schema::{EditionContext, InstanceValidator, SchemaCatalog, SourceFormat};

/// Engine options shared by every subcommand. Each one overrides the
/// matching `KINDEX_*` environment variable.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Catalog source file (KINDEX_CATALOG).
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Active editions, comma separated (KINDEX_EDITIONS).
    #[arg(long, global = true)]
    pub edition: Option<String>,

    /// API version of the edition context (KINDEX_API_VERSION).
    #[arg(long, global = true)]
    pub api_version: Option<String>,

    /// Page limit for collection fetches (KINDEX_MAX_PAGES).
    #[arg(long, global = true)]
    pub max_pages: Option<usize>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
}

/// A loaded catalog plus the edition context every command runs under.
#[derive(Debug, Clone)]
pub struct Engine {
    pub config: EngineConfig,
    pub catalog: Arc<SchemaCatalog>,
    pub context: EditionContext,
}

impl Engine {
    /// Load configuration from the process environment, overridden by `args`.
    pub fn from_env(args: &EngineArgs) -> Result<Self> {
        Self::load(args, |var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup`, overridden by `args`.
    pub fn load<F>(args: &EngineArgs, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = EngineConfig::from_lookup(|var| {
            let flag = match var {
                "KINDEX_CATALOG" => args.catalog.as_ref().map(|p| p.display().to_string()),
                "KINDEX_EDITIONS" => args.edition.clone(),
                "KINDEX_API_VERSION" => args.api_version.clone(),
                "KINDEX_MAX_PAGES" => args.max_pages.map(|n| n.to_string()),
                _ => None,
            };
            flag.or_else(|| lookup(var))
        })
        .context("invalid engine configuration")?;

        let catalog = SchemaCatalog::load_path(&config.catalog_path)
            .with_context(|| format!("failed to load catalog {}", config.catalog_path.display()))?;
        let context = EditionContext::from_config(&config);
        tracing::info!(
            catalog = %config.catalog_path.display(),
            kinds = catalog.len(),
            fingerprint = %catalog.fingerprint(),
            context = %context,
            "engine ready"
        );

        Ok(Self {
            config,
            catalog: Arc::new(catalog),
            context,
        })
    }

    pub fn validator(&self) -> InstanceValidator {
        InstanceValidator::new(Arc::clone(&self.catalog))
    }
}

/// Read a JSON or YAML document. The format follows the file extension.
pub fn read_document(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value = match SourceFormat::from_path(path) {
        SourceFormat::Yaml => serde_yaml::from_str(&text)
            .with_context(|| format!("{} is not valid YAML", path.display()))?,
        SourceFormat::Json => serde_json::from_str(&text)
            .with_context(|| format!("{} is not valid JSON", path.display()))?,
    };
    Ok(value)
}

/// Print a JSON value on stdout.
pub fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
