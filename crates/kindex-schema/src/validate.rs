//! # Instance Validation
//!
//! Validates one raw payload against the catalog entry of its kind and the
//! active edition context.
//!
//! ## Contract
//!
//! - Validation never fails. Every problem becomes a [`Violation`] with a
//!   JSON-pointer path into the payload; unknown fields become [`Note`]s.
//! - Violations are reported in field declaration order, nested objects and
//!   list elements depth-first. One validation call reports every problem
//!   it can find, not only the first.
//! - Whenever the kind is known and the payload is an object, the report
//!   carries a normalized [`Instance`]: invalid values are dropped, unknown
//!   fields kept verbatim, declared defaults applied to absent optional
//!   fields that the edition allows. An explicit `null` on an optional
//!   field is preserved.
//! - Validating the same payload twice yields equal reports.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use kindex_core::{Instance, KindName};

use crate::catalog::{FieldDomain, FieldSpec, ResourceKind, SchemaCatalog};
use crate::edition::{describe_tags, gate_allows, EditionContext};

/// Category of a validation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The kind is not in the catalog.
    UnknownKind,
    /// The payload (or a nested value) is not a JSON object.
    NotAnObject,
    /// A required field is absent.
    MissingRequired,
    /// A value does not have the shape its domain requires.
    TypeMismatch,
    /// A numeric value lies outside its declared bounds.
    OutOfRange,
    /// A string is not one of its enum's values.
    EnumMismatch,
    /// A list has too few or too many elements.
    Cardinality,
    /// A kind or field is not available under the active editions.
    EditionGated,
    /// A value is excluded by a per-edition value restriction.
    EditionValueRestricted,
    /// The normalized fields could not be turned into an instance.
    Unencodable,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnknownKind => "unknown kind",
            Self::NotAnObject => "not an object",
            Self::MissingRequired => "missing required",
            Self::TypeMismatch => "type mismatch",
            Self::OutOfRange => "out of range",
            Self::EnumMismatch => "enum mismatch",
            Self::Cardinality => "cardinality",
            Self::EditionGated => "edition gated",
            Self::EditionValueRestricted => "edition value restricted",
            Self::Unencodable => "unencodable",
        };
        f.write_str(s)
    }
}

/// A single validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// JSON pointer into the payload; empty for the root.
    pub path: String,
    pub kind: ViolationKind,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}: {}", self.kind, self.detail)
        } else {
            write!(f, "{}: {}: {}", self.path, self.kind, self.detail)
        }
    }
}

/// Category of an informational note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    /// A field not declared by the kind; preserved verbatim.
    UnknownField,
}

/// Something worth telling the caller that does not make the payload
/// invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub path: String,
    pub kind: NoteKind,
}

/// Outcome of validating one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    kind: KindName,
    instance: Option<Instance>,
    violations: Vec<Violation>,
    notes: Vec<Note>,
}

impl ValidationReport {
    /// The kind the payload was validated as.
    pub fn kind(&self) -> &KindName {
        &self.kind
    }

    /// The normalized instance, present whenever the kind is known and the
    /// payload is an object.
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    pub fn into_instance(self) -> Option<Instance> {
        self.instance
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// True when there are no violations. Notes do not count.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violations whose path equals `path`.
    pub fn violations_at<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Violation> {
        self.violations.iter().filter(move |v| v.path == path)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return write!(f, "{}: valid", self.kind);
        }
        write!(f, "{}: {} violation(s)", self.kind, self.violations.len())?;
        for v in &self.violations {
            write!(f, "\n  {v}")?;
        }
        Ok(())
    }
}

/// Validates payloads against a shared, immutable catalog.
///
/// Cheap to clone; safe to use from many threads at once.
#[derive(Debug, Clone)]
pub struct InstanceValidator {
    catalog: Arc<SchemaCatalog>,
}

impl InstanceValidator {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Shared handle to the catalog.
    pub fn catalog_arc(&self) -> Arc<SchemaCatalog> {
        Arc::clone(&self.catalog)
    }

    /// Validate a raw payload as an instance of `kind`.
    pub fn validate(&self, kind: &str, payload: &Value, context: &EditionContext) -> ValidationReport {
        let kind_name = KindName::new(kind);
        let mut walk = Walk {
            catalog: &self.catalog,
            context,
            violations: Vec::new(),
            notes: Vec::new(),
        };

        let resource = match self.catalog.lookup(kind) {
            Ok(resource) => resource,
            Err(e) => {
                walk.violate("", ViolationKind::UnknownKind, e.to_string());
                return walk.finish(kind_name, None);
            }
        };

        let Some(map) = payload.as_object() else {
            walk.violate(
                "",
                ViolationKind::NotAnObject,
                format!("expected an object, found {}", json_type(payload)),
            );
            return walk.finish(kind_name, None);
        };

        if !gate_allows(context, resource.editions.as_deref()) {
            walk.violate(
                "",
                ViolationKind::EditionGated,
                format!(
                    "kind '{}' requires {} (active: {context})",
                    resource.name,
                    describe_tags(resource.editions.as_deref().unwrap_or_default())
                ),
            );
        }

        let fields = walk.object(resource, map, "");
        let instance = match Instance::from_fields(
            kind_name.clone(),
            fields,
            &resource.id_field,
            &resource.name_field,
        ) {
            Ok(instance) => Some(instance),
            Err(e) => {
                walk.violate("", ViolationKind::Unencodable, e.to_string());
                None
            }
        };

        let report = walk.finish(kind_name, instance);
        if !report.is_valid() {
            tracing::debug!(
                kind = %report.kind,
                violations = report.violations.len(),
                "instance failed validation"
            );
        }
        report
    }

    /// Re-validate an existing instance under a (possibly different)
    /// edition context.
    pub fn revalidate(&self, instance: &Instance, context: &EditionContext) -> ValidationReport {
        self.validate(instance.kind().as_str(), &instance.to_wire(), context)
    }
}

struct Walk<'a> {
    catalog: &'a SchemaCatalog,
    context: &'a EditionContext,
    violations: Vec<Violation>,
    notes: Vec<Note>,
}

impl<'a> Walk<'a> {
    fn violate(&mut self, path: &str, kind: ViolationKind, detail: String) {
        self.violations.push(Violation {
            path: path.to_string(),
            kind,
            detail,
        });
    }

    fn finish(self, kind: KindName, instance: Option<Instance>) -> ValidationReport {
        ValidationReport {
            kind,
            instance,
            violations: self.violations,
            notes: self.notes,
        }
    }

    /// Validate an object of `kind`, returning its normalized field map.
    fn object(&mut self, kind: &ResourceKind, map: &Map<String, Value>, path: &str) -> Map<String, Value> {
        let mut accepted: HashMap<&str, Value> = HashMap::new();
        let mut defaults: Vec<(&str, Value)> = Vec::new();

        for spec in &kind.fields {
            let field_path = child_path(path, &spec.name);
            let allowed = gate_allows(self.context, spec.editions.as_deref());
            match map.get(&spec.name) {
                None => {
                    if !allowed {
                        continue;
                    }
                    if spec.required {
                        self.violate(
                            &field_path,
                            ViolationKind::MissingRequired,
                            format!("missing required field '{}'", spec.name),
                        );
                    } else if let Some(default) = &spec.default {
                        // A default the active edition forbids is left out.
                        if spec.edition_allows(self.context, default) {
                            defaults.push((spec.name.as_str(), default.clone()));
                        } else {
                            tracing::trace!(field = %spec.name, "default not permitted under {}", self.context);
                        }
                    }
                }
                Some(_) if !allowed => {
                    self.violate(
                        &field_path,
                        ViolationKind::EditionGated,
                        format!(
                            "field '{}' requires {} (active: {})",
                            spec.name,
                            describe_tags(spec.editions.as_deref().unwrap_or_default()),
                            self.context
                        ),
                    );
                }
                Some(Value::Null) if spec.required => {
                    self.violate(
                        &field_path,
                        ViolationKind::TypeMismatch,
                        format!("expected {}, found null", spec.domain.describe()),
                    );
                }
                Some(Value::Null) => {
                    accepted.insert(&spec.name, Value::Null);
                }
                Some(value) => {
                    if let Some(normalized) = self.field(spec, value, &field_path) {
                        accepted.insert(&spec.name, normalized);
                    }
                }
            }
        }

        let mut out = Map::new();
        for (key, value) in map {
            if kind.field(key).is_some() {
                if let Some(normalized) = accepted.remove(key.as_str()) {
                    out.insert(key.clone(), normalized);
                }
            } else {
                self.notes.push(Note {
                    path: child_path(path, key),
                    kind: NoteKind::UnknownField,
                });
                out.insert(key.clone(), value.clone());
            }
        }
        for (name, default) in defaults {
            out.insert(name.to_string(), default);
        }
        out
    }

    /// Domain check plus per-edition value restriction for one field.
    fn field(&mut self, spec: &FieldSpec, value: &Value, path: &str) -> Option<Value> {
        let context = self.context;
        let normalized = self.value(&spec.domain, value, path, &spec.name)?;
        let restricted: Vec<&Value> = match &normalized {
            Value::Array(items) => items
                .iter()
                .filter(|v| !spec.edition_allows(context, v))
                .collect(),
            v if !spec.edition_allows(context, v) => vec![v],
            _ => Vec::new(),
        };
        if restricted.is_empty() {
            return Some(normalized);
        }
        let editions: Vec<&str> = context.editions().collect();
        for v in restricted {
            self.violate(
                path,
                ViolationKind::EditionValueRestricted,
                format!(
                    "{v} is not allowed for '{}' under editions [{}]",
                    spec.name,
                    editions.join(", ")
                ),
            );
        }
        None
    }

    /// Check `value` against `domain`. Returns the normalized value, or
    /// `None` after recording a violation.
    fn value(&mut self, domain: &FieldDomain, value: &Value, path: &str, label: &str) -> Option<Value> {
        let mismatch = |walk: &mut Self| -> Option<Value> {
            walk.violate(
                path,
                ViolationKind::TypeMismatch,
                format!("expected {}, found {}", domain.describe(), json_type(value)),
            );
            None
        };

        match domain {
            FieldDomain::String => match value {
                Value::String(_) => Some(value.clone()),
                _ => mismatch(self),
            },
            FieldDomain::Boolean => match value {
                Value::Bool(_) => Some(value.clone()),
                _ => mismatch(self),
            },
            FieldDomain::Integer(bounds) => {
                let Some(n) = as_integer(value) else {
                    if !is_integral(value) {
                        return mismatch(self);
                    }
                    self.violate(
                        path,
                        ViolationKind::OutOfRange,
                        format!("{label} out of range {bounds}"),
                    );
                    return None;
                };
                if bounds.contains(n) {
                    Some(Value::from(n))
                } else {
                    self.violate(
                        path,
                        ViolationKind::OutOfRange,
                        format!("{label} out of range {bounds}"),
                    );
                    None
                }
            }
            FieldDomain::Number(bounds) => {
                let Some(n) = value.as_f64() else {
                    return mismatch(self);
                };
                if bounds.contains(n) {
                    Some(value.clone())
                } else {
                    self.violate(
                        path,
                        ViolationKind::OutOfRange,
                        format!("{label} out of range {bounds}"),
                    );
                    None
                }
            }
            FieldDomain::Enum(values) => match value {
                Value::String(s) if values.contains(s) => Some(value.clone()),
                Value::String(s) => {
                    self.violate(
                        path,
                        ViolationKind::EnumMismatch,
                        format!("'{s}' is not one of [{}]", values.values().join(", ")),
                    );
                    None
                }
                _ => mismatch(self),
            },
            FieldDomain::Reference(_) => match value {
                Value::String(s) if !s.is_empty() => Some(value.clone()),
                _ => mismatch(self),
            },
            FieldDomain::Object(kind_name) => {
                let Some(map) = value.as_object() else {
                    self.violate(
                        path,
                        ViolationKind::NotAnObject,
                        format!("expected {kind_name} object, found {}", json_type(value)),
                    );
                    return None;
                };
                // Catalog loading guarantees nested kinds exist.
                let catalog = self.catalog;
                let nested = catalog.lookup(kind_name.as_str()).ok()?;
                if !gate_allows(self.context, nested.editions.as_deref()) {
                    self.violate(
                        path,
                        ViolationKind::EditionGated,
                        format!(
                            "kind '{kind_name}' requires {} (active: {})",
                            describe_tags(nested.editions.as_deref().unwrap_or_default()),
                            self.context
                        ),
                    );
                    return None;
                }
                Some(Value::Object(self.object(nested, map, path)))
            }
            FieldDomain::List(list) => {
                let Some(items) = value.as_array() else {
                    return mismatch(self);
                };
                let too_few = list.min_items.is_some_and(|m| items.len() < m);
                let too_many = list.max_items.is_some_and(|m| items.len() > m);
                if too_few || too_many {
                    let expected = match (list.min_items, list.max_items) {
                        (Some(lo), Some(hi)) => format!("between {lo} and {hi}"),
                        (Some(lo), None) => format!("at least {lo}"),
                        (None, Some(hi)) => format!("at most {hi}"),
                        (None, None) => "any number".to_string(),
                    };
                    self.violate(
                        path,
                        ViolationKind::Cardinality,
                        format!("{label} has {} item(s), expected {expected}", items.len()),
                    );
                }
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let item_path = child_path(path, &i.to_string());
                    let item_label = format!("{label}[{i}]");
                    if let Some(normalized) = self.value(&list.item, item, &item_path, &item_label) {
                        out.push(normalized);
                    }
                }
                if too_few || too_many {
                    None
                } else {
                    Some(Value::Array(out))
                }
            }
        }
    }
}

/// Integer value of a JSON number, accepting floats with no fractional part.
fn as_integer(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    if value.is_f64() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// True for whole numbers, including those outside the `i64` range.
fn is_integral(value: &Value) -> bool {
    value.is_u64() || (value.is_f64() && value.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Append one JSON-pointer segment, escaping `~` and `/`.
fn child_path(parent: &str, segment: &str) -> String {
    let escaped = segment.replace('~', "~0").replace('/', "~1");
    format!("{parent}/{escaped}")
}
