//! # Reference Strings
//!
//! Reference fields carry the identifier of another instance. Controllers
//! emit them in several shapes and all of them must resolve to the same
//! target:
//!
//! | form            | example                                       |
//! |-----------------|-----------------------------------------------|
//! | bare identifier | `pool-7a1c`                                   |
//! | API path        | `/api/pool/pool-7a1c`                         |
//! | absolute URL    | `https://ctrl.example/api/pool/pool-7a1c#web` |
//! | by-name query   | `/api/pool?name=web`, `/api/pool/?name=web`   |
//!
//! The `#fragment` some controllers append (the display name of the target)
//! is informational and ignored. Query values are form-decoded, so
//! `?name=web+pool` and `?name=web%20pool` both name `web pool`.
//!
//! Paths and URLs are parsed with [`url::Url`]; relative forms are joined
//! onto a placeholder base first.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::identity::ObjectId;

const RELATIVE_BASE: &str = "http://reference.invalid/";

/// What a reference string points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefTarget {
    /// Target addressed by identifier.
    Id(ObjectId),
    /// Target addressed by display name.
    Name(String),
}

impl RefTarget {
    /// Parse a reference string. Returns `None` when the string does not
    /// name anything (empty, or a path with no segments).
    pub fn parse(raw: &str) -> Option<Self> {
        Reference::parse(raw).map(|r| r.target)
    }
}

impl std::fmt::Display for RefTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "name={name}"),
        }
    }
}

/// A parsed reference string: its target, plus the kind segment of the
/// API path when there is one (`pool` in `/api/pool/pool-7a1c`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub target: RefTarget,
    pub kind_segment: Option<String>,
}

impl Reference {
    pub fn parse(raw: &str) -> Option<Self> {
        // Bare identifiers are taken literally.
        if !raw.is_empty() && !raw.contains(['/', '?', '#']) {
            return Some(Self {
                target: RefTarget::Id(ObjectId::new(raw)),
                kind_segment: None,
            });
        }

        let url = Url::parse(raw).or_else(|_| {
            Url::parse(RELATIVE_BASE).and_then(|base| Url::options().base_url(Some(&base)).parse(raw))
        });
        let url = url.ok()?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let after_api = segments
            .iter()
            .position(|seg| *seg == "api")
            .map(|i| i + 1);

        let name = url
            .query_pairs()
            .find(|(k, _)| k == "name")
            .map(|(_, v)| v.into_owned())
            .filter(|n| !n.is_empty());
        if let Some(name) = name {
            return Some(Self {
                target: RefTarget::Name(name),
                kind_segment: after_api
                    .and_then(|i| segments.get(i))
                    .map(|s| s.to_string()),
            });
        }

        let last = segments.len().checked_sub(1)?;
        Some(Self {
            target: RefTarget::Id(ObjectId::new(segments[last])),
            kind_segment: after_api
                .filter(|i| *i < last)
                .and_then(|i| segments.get(i))
                .map(|s| s.to_string()),
        })
    }

    /// True when the path's kind segment names `kind`. API paths spell
    /// kinds in lower case (`virtualservice` for `VirtualService`).
    pub fn names_kind(&self, kind: &str) -> bool {
        self.kind_segment
            .as_deref()
            .is_some_and(|segment| segment.eq_ignore_ascii_case(kind))
    }
}
