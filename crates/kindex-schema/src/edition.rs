//! # Edition Gate
//!
//! Product editions (enterprise, essentials, basic, ...) and API versions
//! decide which kinds, fields and enum values a deployment may use.
//!
//! A kind or field carries an optional set of [`EditionTag`]s. The set is a
//! disjunction: the element is available when at least one tag matches the
//! active [`EditionContext`]. A tag matches when its edition is active and
//! the context's API version lies in `[since, until)`.
//!
//! An element with no tag set is available in every edition. An element
//! whose tag set is present but empty is available in none.

use std::collections::BTreeSet;
use std::fmt;

use kindex_core::{ApiVersion, EngineConfig};
use thiserror::Error;

/// The editions and API version a validation runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditionContext {
    editions: BTreeSet<String>,
    api_version: ApiVersion,
}

impl EditionContext {
    /// Build a context from edition names (case-insensitive) and a version.
    pub fn new<I, S>(editions: I, api_version: ApiVersion) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            editions: editions
                .into_iter()
                .map(|e| e.as_ref().trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            api_version,
        }
    }

    /// The context described by the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.editions, config.api_version)
    }

    /// Whether an edition is active.
    pub fn has_edition(&self, edition: &str) -> bool {
        self.editions.contains(edition)
    }

    /// Active editions, sorted.
    pub fn editions(&self) -> impl Iterator<Item = &str> {
        self.editions.iter().map(String::as_str)
    }

    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }
}

impl fmt::Display for EditionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let editions: Vec<&str> = self.editions().collect();
        write!(f, "[{}]@{}", editions.join(","), self.api_version)
    }
}

/// One availability condition: an edition, optionally bounded to an API
/// version window `[since, until)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditionTag {
    edition: String,
    since: Option<ApiVersion>,
    until: Option<ApiVersion>,
}

/// A tag string that does not follow `edition[>=since][<until]`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TagParseError(pub String);

impl EditionTag {
    /// Build a tag, rejecting an empty window.
    pub fn new(
        edition: &str,
        since: Option<ApiVersion>,
        until: Option<ApiVersion>,
    ) -> Result<Self, TagParseError> {
        let edition = edition.trim().to_ascii_lowercase();
        if edition.is_empty() {
            return Err(TagParseError("edition name is empty".into()));
        }
        if edition.contains(['<', '>', '=']) {
            return Err(TagParseError(format!(
                "edition name '{edition}' contains a comparison operator"
            )));
        }
        if let (Some(s), Some(u)) = (since, until) {
            if s >= u {
                return Err(TagParseError(format!(
                    "version window [{s}, {u}) is empty"
                )));
            }
        }
        Ok(Self {
            edition,
            since,
            until,
        })
    }

    /// Parse the short form: `enterprise`, `enterprise>=18.2.1`,
    /// `enterprise<22.1.1` or `enterprise>=18.2.1<22.1.1`.
    pub fn parse(raw: &str) -> Result<Self, TagParseError> {
        let split = raw.find(['<', '>']).unwrap_or(raw.len());
        let (edition, mut rest) = raw.split_at(split);
        let mut since = None;
        let mut until = None;

        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix(">=") {
                let (version, tail) = take_version(tail);
                if since.replace(parse_version(version)?).is_some() {
                    return Err(TagParseError("'>=' given twice".into()));
                }
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix('<') {
                let (version, tail) = take_version(tail);
                if until.replace(parse_version(version)?).is_some() {
                    return Err(TagParseError("'<' given twice".into()));
                }
                rest = tail;
            } else {
                return Err(TagParseError(format!(
                    "expected '>=' or '<' at '{rest}'"
                )));
            }
        }

        Self::new(edition, since, until)
    }

    pub fn edition(&self) -> &str {
        &self.edition
    }

    pub fn since(&self) -> Option<ApiVersion> {
        self.since
    }

    pub fn until(&self) -> Option<ApiVersion> {
        self.until
    }

    /// Whether this tag matches the context.
    pub fn matches(&self, context: &EditionContext) -> bool {
        let version = context.api_version();
        context.has_edition(&self.edition)
            && self.since.map_or(true, |s| version >= s)
            && self.until.map_or(true, |u| version < u)
    }
}

impl fmt::Display for EditionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.edition)?;
        if let Some(s) = self.since {
            write!(f, ">={s}")?;
        }
        if let Some(u) = self.until {
            write!(f, "<{u}")?;
        }
        Ok(())
    }
}

fn take_version(s: &str) -> (&str, &str) {
    let end = s.find(['<', '>']).unwrap_or(s.len());
    s.split_at(end)
}

fn parse_version(raw: &str) -> Result<ApiVersion, TagParseError> {
    raw.trim()
        .parse()
        .map_err(|e| TagParseError(format!("bad version '{raw}': {e}")))
}

/// Whether an element with the given tag set is available in the context.
///
/// An empty tag set never matches.
pub fn is_allowed(context: &EditionContext, tags: &[EditionTag]) -> bool {
    tags.iter().any(|t| t.matches(context))
}

/// Gate for an optional tag set: `None` means ungated.
pub(crate) fn gate_allows(context: &EditionContext, tags: Option<&[EditionTag]>) -> bool {
    tags.map_or(true, |t| is_allowed(context, t))
}

/// Render a tag set for diagnostics: `enterprise>=18.2.1 or essentials`.
pub(crate) fn describe_tags(tags: &[EditionTag]) -> String {
    if tags.is_empty() {
        return "no edition".to_string();
    }
    tags.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" or ")
}
