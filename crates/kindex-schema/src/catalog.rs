//! # Schema Catalog
//!
//! The in-memory model of every resource kind the engine knows about.
//!
//! ## Load pipeline
//!
//! 1. Parse the YAML/JSON source into a JSON value tree.
//! 2. Check the tree against the embedded catalog meta-schema.
//! 3. Map it onto the declarative source model and build [`ResourceKind`]s,
//!    rejecting duplicate kinds and fields, empty or duplicate enum values,
//!    inverted bounds, malformed edition tags and invalid defaults.
//! 4. Reject reference and nested-object fields whose target kind is not
//!    declared.
//! 5. Reject required chains that can never be satisfied (a required
//!    reference to a kind whose own required references lead back to it
//!    with no alternative).
//! 6. Fingerprint the parsed source: SHA-256 over its JCS canonical form.
//!
//! ## Invariant
//!
//! A constructed catalog is closed: every kind named by a field domain is a
//! key of the catalog. The validator and the resolver rely on this and
//! treat a failed lookup of a target kind as unreachable.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde_json::{Map, Value};

use kindex_core::{sha256_digest, CanonicalBytes, ContentDigest, Instance, KindName};

use crate::edition::{EditionContext, EditionTag};
use crate::error::{SchemaLoadError, UnknownKindError};
use crate::source::{self, DomainSource, FieldSource, KindSource, SourceFormat, TagSource};

/// Identifier field used when a kind does not name one.
pub const DEFAULT_ID_FIELD: &str = "uuid";
/// Display-name field used when a kind does not name one.
pub const DEFAULT_NAME_FIELD: &str = "name";

/// Replacement written over sensitive values by [`SchemaCatalog::redact`].
pub const REDACTED: &str = "<sensitive>";

/// Optional inclusive bounds of a numeric domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    /// Whether `v` lies within the bounds.
    pub fn contains(&self, v: T) -> bool {
        self.min.map_or(true, |m| v >= m) && self.max.map_or(true, |m| v <= m)
    }
}

impl<T: fmt::Display> fmt::Display for Bounds<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (Some(lo), Some(hi)) => write!(f, "[{lo},{hi}]"),
            (Some(lo), None) => write!(f, "[{lo},)"),
            (None, Some(hi)) => write!(f, "(,{hi}]"),
            (None, None) => f.write_str("(,)"),
        }
    }
}

/// Ordered set of allowed enum values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDomain {
    values: Vec<String>,
}

impl EnumDomain {
    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    /// Allowed values, in declaration order.
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// Element domain and cardinality of a list field.
#[derive(Debug, Clone, PartialEq)]
pub struct ListDomain {
    pub item: Box<FieldDomain>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

/// The value domain of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDomain {
    String,
    Integer(Bounds<i64>),
    Number(Bounds<f64>),
    Boolean,
    Enum(EnumDomain),
    /// An embedded value of another kind.
    Object(KindName),
    List(ListDomain),
    /// An identifier of an instance of one of the permitted kinds.
    Reference(Vec<KindName>),
}

impl FieldDomain {
    /// Short description used in type-mismatch diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::String => "string".into(),
            Self::Integer(_) => "integer".into(),
            Self::Number(_) => "number".into(),
            Self::Boolean => "boolean".into(),
            Self::Enum(_) => "enum string".into(),
            Self::Object(kind) => format!("{kind} object"),
            Self::List(list) => format!("list of {}", list.item.describe()),
            Self::Reference(_) => "reference".into(),
        }
    }

    /// Kinds named by this domain, through lists.
    pub fn target_kinds(&self) -> Vec<&KindName> {
        match self {
            Self::Object(kind) => vec![kind],
            Self::Reference(targets) => targets.iter().collect(),
            Self::List(list) => list.item.target_kinds(),
            _ => Vec::new(),
        }
    }

    /// Kinds one of which must exist for a required field of this domain to
    /// be satisfiable. `None` when a value can be written without any other
    /// instance.
    fn required_targets(&self) -> Option<Vec<&KindName>> {
        match self {
            Self::Object(kind) => Some(vec![kind]),
            Self::Reference(targets) => Some(targets.iter().collect()),
            Self::List(list) if list.min_items.unwrap_or(0) > 0 => list.item.required_targets(),
            _ => None,
        }
    }

    /// Scalar conformance, used to check declared defaults at load time.
    fn accepts_scalar(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, Value::String(_)) => true,
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Integer(b), v) => v.as_i64().is_some_and(|i| b.contains(i)),
            (Self::Number(b), v) => v.as_f64().is_some_and(|n| b.contains(n)),
            (Self::Enum(e), Value::String(s)) => e.contains(s),
            (Self::List(list), Value::Array(items)) => {
                list.min_items.map_or(true, |m| items.len() >= m)
                    && list.max_items.map_or(true, |m| items.len() <= m)
                    && items.iter().all(|i| list.item.accepts_scalar(i))
            }
            _ => false,
        }
    }
}

/// One declared field of a kind.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub domain: FieldDomain,
    pub required: bool,
    /// Redacted from diagnostic output.
    pub sensitive: bool,
    /// `None` when the field is available in every edition.
    pub editions: Option<Vec<EditionTag>>,
    /// Per-edition restriction of the allowed values. Editions absent from
    /// the map are unrestricted.
    pub edition_values: BTreeMap<String, Vec<Value>>,
    pub default: Option<Value>,
    pub description: Option<String>,
}

impl FieldSpec {
    /// Whether `value` passes the per-edition value restrictions: some
    /// active edition is either unrestricted or lists the value.
    pub fn edition_allows(&self, context: &EditionContext, value: &Value) -> bool {
        if self.edition_values.is_empty() {
            return true;
        }
        context
            .editions()
            .any(|edition| match self.edition_values.get(edition) {
                None => true,
                Some(allowed) => allowed.contains(value),
            })
    }
}

/// A named schema for one category of configuration object.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceKind {
    pub name: KindName,
    pub id_field: String,
    pub name_field: String,
    pub editions: Option<Vec<EditionTag>>,
    pub fields: Vec<FieldSpec>,
    pub description: Option<String>,
}

impl ResourceKind {
    /// Field declaration by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Immutable mapping from kind name to resource kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaCatalog {
    kinds: BTreeMap<KindName, ResourceKind>,
    fingerprint: ContentDigest,
}

impl SchemaCatalog {
    /// Load a catalog from a file, picking the format from its extension.
    pub fn load_path(path: impl AsRef<Path>) -> Result<Self, SchemaLoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SchemaLoadError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::load_str(&text, SourceFormat::from_path(path))
    }

    /// Load a catalog from source text.
    pub fn load_str(text: &str, format: SourceFormat) -> Result<Self, SchemaLoadError> {
        let document = source::parse_document(text, format)?;
        source::check_shape(&document)?;
        let fingerprint = sha256_digest(&CanonicalBytes::new(&document)?);
        let parsed = source::decode_source(document)?;

        let mut kinds = BTreeMap::new();
        for kind_source in &parsed.kinds {
            let kind = build_kind(kind_source)?;
            if kinds.contains_key(&kind.name) {
                return Err(SchemaLoadError::DuplicateKind {
                    kind: kind.name.to_string(),
                });
            }
            kinds.insert(kind.name.clone(), kind);
        }

        check_targets(&kinds)?;
        check_satisfiable(&kinds)?;

        tracing::debug!(
            kinds = kinds.len(),
            fingerprint = %fingerprint,
            "schema catalog loaded"
        );
        Ok(Self { kinds, fingerprint })
    }

    /// Look up a kind by name.
    pub fn lookup(&self, kind: &str) -> Result<&ResourceKind, UnknownKindError> {
        self.kinds.get(kind).ok_or_else(|| UnknownKindError {
            kind: kind.to_string(),
        })
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// All kinds, sorted by name.
    pub fn kinds(&self) -> impl Iterator<Item = &ResourceKind> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Digest of the source this catalog was built from.
    pub fn fingerprint(&self) -> &ContentDigest {
        &self.fingerprint
    }

    /// The instance's wire form with every sensitive field, including those
    /// of nested objects, replaced by [`REDACTED`].
    pub fn redact(&self, instance: &Instance) -> Value {
        match self.kinds.get(instance.kind()) {
            Some(kind) => Value::Object(self.redact_fields(kind, instance.fields())),
            None => instance.to_wire(),
        }
    }

    fn redact_fields(&self, kind: &ResourceKind, fields: &Map<String, Value>) -> Map<String, Value> {
        fields
            .iter()
            .map(|(name, value)| {
                let redacted = match kind.field(name) {
                    Some(spec) if spec.sensitive && !value.is_null() => Value::from(REDACTED),
                    Some(spec) => self.redact_value(&spec.domain, value),
                    None => value.clone(),
                };
                (name.clone(), redacted)
            })
            .collect()
    }

    fn redact_value(&self, domain: &FieldDomain, value: &Value) -> Value {
        match (domain, value) {
            (FieldDomain::Object(kind), Value::Object(map)) => match self.kinds.get(kind) {
                Some(nested) => Value::Object(self.redact_fields(nested, map)),
                None => value.clone(),
            },
            (FieldDomain::List(list), Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .map(|item| self.redact_value(&list.item, item))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }
}

fn build_kind(source: &KindSource) -> Result<ResourceKind, SchemaLoadError> {
    let name = KindName::new(source.name.as_str());
    let editions = build_tags(source.editions.as_deref(), &source.name)?;

    let mut fields: Vec<FieldSpec> = Vec::with_capacity(source.fields.len());
    for field_source in &source.fields {
        if fields.iter().any(|f| f.name == field_source.name) {
            return Err(SchemaLoadError::DuplicateField {
                kind: source.name.clone(),
                field: field_source.name.clone(),
            });
        }
        fields.push(build_field(&source.name, field_source)?);
    }

    let id_field = source
        .id_field
        .clone()
        .unwrap_or_else(|| DEFAULT_ID_FIELD.to_string());
    let name_field = source
        .name_field
        .clone()
        .unwrap_or_else(|| DEFAULT_NAME_FIELD.to_string());
    for (role, field_name, explicit) in [
        ("id_field", &id_field, source.id_field.is_some()),
        ("name_field", &name_field, source.name_field.is_some()),
    ] {
        let reason = match fields.iter().find(|f| &f.name == field_name) {
            Some(f) if f.domain != FieldDomain::String => {
                format!("{role} '{field_name}' must be a string field")
            }
            None if explicit => format!("{role} '{field_name}' is not a declared field"),
            _ => continue,
        };
        return Err(SchemaLoadError::InvalidKind {
            kind: source.name.clone(),
            reason,
        });
    }

    Ok(ResourceKind {
        name,
        id_field,
        name_field,
        editions,
        fields,
        description: source.description.clone(),
    })
}

fn build_field(kind: &str, source: &FieldSource) -> Result<FieldSpec, SchemaLoadError> {
    let invalid = |reason: String| SchemaLoadError::InvalidField {
        kind: kind.to_string(),
        field: source.name.clone(),
        reason,
    };

    let domain = build_domain(&source.domain, true).map_err(invalid)?;
    let owner = format!("{kind}.{}", source.name);
    let editions = build_tags(source.editions.as_deref(), &owner)?;

    let mut edition_values = BTreeMap::new();
    for (edition, values) in &source.edition_values {
        for value in values {
            if !domain.accepts_scalar(value) {
                return Err(invalid(format!(
                    "edition_values for '{edition}' contains {value}, outside the field domain"
                )));
            }
        }
        edition_values.insert(edition.trim().to_ascii_lowercase(), values.clone());
    }

    if let Some(default) = &source.default {
        if source.required {
            return Err(invalid("a required field cannot declare a default".into()));
        }
        if !domain.accepts_scalar(default) {
            return Err(invalid(format!(
                "default {default} does not conform to {}",
                domain.describe()
            )));
        }
    }

    Ok(FieldSpec {
        name: source.name.clone(),
        domain,
        required: source.required,
        sensitive: source.sensitive,
        editions,
        edition_values,
        default: source.default.clone(),
        description: source.description.clone(),
    })
}

fn build_domain(source: &DomainSource, top_level: bool) -> Result<FieldDomain, String> {
    Ok(match source {
        DomainSource::String => FieldDomain::String,
        DomainSource::Boolean => FieldDomain::Boolean,
        DomainSource::Integer { minimum, maximum } => {
            let bounds = Bounds {
                min: *minimum,
                max: *maximum,
            };
            check_bounds(&bounds)?;
            FieldDomain::Integer(bounds)
        }
        DomainSource::Number { minimum, maximum } => {
            let bounds = Bounds {
                min: *minimum,
                max: *maximum,
            };
            check_bounds(&bounds)?;
            FieldDomain::Number(bounds)
        }
        DomainSource::Enum { values } => {
            if values.is_empty() {
                return Err("enum declares no values".into());
            }
            let unique: BTreeSet<&String> = values.iter().collect();
            if unique.len() != values.len() {
                return Err("enum declares a value twice".into());
            }
            FieldDomain::Enum(EnumDomain {
                values: values.clone(),
            })
        }
        DomainSource::Object { kind } => FieldDomain::Object(KindName::new(kind.as_str())),
        DomainSource::Ref { targets } => {
            if targets.is_empty() {
                return Err("reference declares no target kinds".into());
            }
            let mut kinds: Vec<KindName> = Vec::with_capacity(targets.len());
            for target in targets {
                let target = KindName::new(target.as_str());
                if !kinds.contains(&target) {
                    kinds.push(target);
                }
            }
            FieldDomain::Reference(kinds)
        }
        DomainSource::List {
            items,
            min_items,
            max_items,
        } => {
            if !top_level {
                return Err("lists of lists are not supported".into());
            }
            let min_items = min_items.map(|n| n as usize);
            let max_items = max_items.map(|n| n as usize);
            if let (Some(lo), Some(hi)) = (min_items, max_items) {
                if lo > hi {
                    return Err(format!("min_items {lo} exceeds max_items {hi}"));
                }
            }
            FieldDomain::List(ListDomain {
                item: Box::new(build_domain(items, false)?),
                min_items,
                max_items,
            })
        }
    })
}

fn check_bounds<T: PartialOrd + fmt::Display>(bounds: &Bounds<T>) -> Result<(), String> {
    match (&bounds.min, &bounds.max) {
        (Some(lo), Some(hi)) if lo > hi => Err(format!("minimum {lo} exceeds maximum {hi}")),
        _ => Ok(()),
    }
}

fn build_tags(
    source: Option<&[TagSource]>,
    owner: &str,
) -> Result<Option<Vec<EditionTag>>, SchemaLoadError> {
    let Some(source) = source else {
        return Ok(None);
    };
    source
        .iter()
        .map(|tag| {
            let (raw, parsed) = match tag {
                TagSource::Short(raw) => (raw.clone(), EditionTag::parse(raw)),
                TagSource::Full {
                    edition,
                    since,
                    until,
                } => {
                    let raw = format!(
                        "{edition}{}{}",
                        since.as_deref().map(|s| format!(">={s}")).unwrap_or_default(),
                        until.as_deref().map(|u| format!("<{u}")).unwrap_or_default()
                    );
                    let parsed = parse_optional_version(since.as_deref())
                        .and_then(|s| Ok((s, parse_optional_version(until.as_deref())?)))
                        .and_then(|(s, u)| EditionTag::new(edition, s, u));
                    (raw, parsed)
                }
            };
            parsed.map_err(|e| SchemaLoadError::InvalidEditionTag {
                owner: owner.to_string(),
                tag: raw,
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn parse_optional_version(
    raw: Option<&str>,
) -> Result<Option<kindex_core::ApiVersion>, crate::edition::TagParseError> {
    raw.map(|v| {
        v.parse()
            .map_err(|e| crate::edition::TagParseError(format!("bad version '{v}': {e}")))
    })
    .transpose()
}

fn check_targets(kinds: &BTreeMap<KindName, ResourceKind>) -> Result<(), SchemaLoadError> {
    for kind in kinds.values() {
        for field in &kind.fields {
            if let Some(target) = field
                .domain
                .target_kinds()
                .into_iter()
                .find(|t| !kinds.contains_key(*t))
            {
                return Err(SchemaLoadError::UndeclaredTarget {
                    kind: kind.name.to_string(),
                    field: field.name.clone(),
                    target: target.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Least fixpoint of "can be instantiated": a kind is satisfiable once every
/// required relational field has at least one satisfiable target. Whatever
/// remains outside the fixpoint can never be built by a finite
/// configuration.
fn check_satisfiable(kinds: &BTreeMap<KindName, ResourceKind>) -> Result<(), SchemaLoadError> {
    let mut satisfiable: BTreeSet<&KindName> = BTreeSet::new();
    loop {
        let mut changed = false;
        for kind in kinds.values() {
            if satisfiable.contains(&kind.name) {
                continue;
            }
            let ok = kind
                .fields
                .iter()
                .filter(|f| f.required)
                .all(|f| match f.domain.required_targets() {
                    None => true,
                    Some(targets) => targets.iter().any(|t| satisfiable.contains(t)),
                });
            if ok {
                satisfiable.insert(&kind.name);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    if satisfiable.len() == kinds.len() {
        return Ok(());
    }
    let stuck: Vec<String> = kinds
        .keys()
        .filter(|k| !satisfiable.contains(k))
        .map(ToString::to_string)
        .collect();
    Err(SchemaLoadError::UnsatisfiableRequiredChain { kinds: stuck })
}
