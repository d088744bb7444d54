//! Engine configuration.
//!
//! Read from environment variables at process start. Every value except the
//! catalog path has a default so a bare deployment only needs to point at
//! its catalog.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::version::ApiVersion;

const DEFAULT_EDITIONS: &str = "enterprise";
const DEFAULT_API_VERSION: ApiVersion = ApiVersion::new(22, 1, 1);
const DEFAULT_MAX_PAGES: usize = 10_000;

/// Process-wide engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Path of the declarative catalog source.
    pub catalog_path: PathBuf,
    /// Active edition identifiers, lowercase, in declaration order.
    pub editions: Vec<String>,
    /// API version of the edition context.
    pub api_version: ApiVersion,
    /// Upper bound on the number of pages one collection fetch may consume.
    pub max_pages: usize,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `KINDEX_CATALOG` (required)
    /// - `KINDEX_EDITIONS` (default: `enterprise`), comma separated
    /// - `KINDEX_API_VERSION` (default: `22.1.1`)
    /// - `KINDEX_MAX_PAGES` (default: 10000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let catalog_path = lookup("KINDEX_CATALOG")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("KINDEX_CATALOG"))?;

        let editions =
            parse_editions(&lookup("KINDEX_EDITIONS").unwrap_or_else(|| DEFAULT_EDITIONS.into()));
        if editions.is_empty() {
            return Err(ConfigError::Invalid {
                var: "KINDEX_EDITIONS",
                reason: "at least one edition is required".to_string(),
            });
        }

        let api_version = match lookup("KINDEX_API_VERSION") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                var: "KINDEX_API_VERSION",
                reason: format!("{e}"),
            })?,
            None => DEFAULT_API_VERSION,
        };

        let max_pages = match lookup("KINDEX_MAX_PAGES") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "KINDEX_MAX_PAGES",
                        reason: format!("expected a positive integer, got '{raw}'"),
                    })
                }
            },
            None => DEFAULT_MAX_PAGES,
        };

        Ok(Self {
            catalog_path,
            editions,
            api_version,
            max_pages,
        })
    }
}

/// Split a comma-separated edition list, lowercasing and dropping blanks
/// and duplicates.
pub fn parse_editions(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for edition in raw.split(',').map(|e| e.trim().to_ascii_lowercase()) {
        if !edition.is_empty() && !out.contains(&edition) {
            out.push(edition);
        }
    }
    out
}
