//! # Declarative Catalog Source
//!
//! The on-disk catalog format. A source document is a YAML or JSON object
//! with a `kinds` list; every kind lists its fields, every field names its
//! domain through `type`:
//!
//! ```yaml
//! kinds:
//!   - name: Pool
//!     id_field: uuid
//!     fields:
//!       - { name: name, type: string, required: true }
//!       - { name: ratio, type: integer, minimum: 0, maximum: 100 }
//!       - { name: lb_algorithm, type: enum, values: [ROUND_ROBIN, LEAST_CONNECTIONS] }
//!       - { name: servers, type: list, items: { type: object, kind: Server } }
//!       - { name: cloud_ref, type: ref, targets: [Cloud] }
//!       - name: connection_ramp_duration
//!         type: integer
//!         editions: ["enterprise>=18.2.1"]
//! ```
//!
//! Documents are checked against [`META_SCHEMA`] with `jsonschema` before
//! they are mapped onto the serde model below, so shape errors point at a
//! JSON path in the source rather than at a serde message.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::SchemaLoadError;

/// Encoding of a catalog source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// YAML 1.2.
    Yaml,
    /// JSON.
    Json,
}

impl SourceFormat {
    /// Pick the format from a file extension. Anything other than `.json`
    /// is read as YAML, which is a superset of JSON.
    pub fn from_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// JSON Schema (Draft 2020-12) describing a valid catalog source document.
pub const META_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "type": "object",
  "required": ["kinds"],
  "additionalProperties": false,
  "properties": {
    "version": { "type": ["string", "number"] },
    "description": { "type": "string" },
    "kinds": { "type": "array", "items": { "$ref": "#/$defs/kind" } }
  },
  "$defs": {
    "tag": {
      "oneOf": [
        { "type": "string", "minLength": 1 },
        {
          "type": "object",
          "required": ["edition"],
          "additionalProperties": false,
          "properties": {
            "edition": { "type": "string", "minLength": 1 },
            "since": { "type": "string", "minLength": 1 },
            "until": { "type": "string", "minLength": 1 }
          }
        }
      ]
    },
    "tags": { "type": "array", "items": { "$ref": "#/$defs/tag" } },
    "kind": {
      "type": "object",
      "required": ["name"],
      "additionalProperties": false,
      "properties": {
        "name": { "type": "string", "pattern": "^[A-Za-z][A-Za-z0-9_]*$" },
        "description": { "type": "string" },
        "id_field": { "type": "string", "minLength": 1 },
        "name_field": { "type": "string", "minLength": 1 },
        "editions": { "$ref": "#/$defs/tags" },
        "fields": { "type": "array", "items": { "$ref": "#/$defs/field" } }
      }
    },
    "domain": {
      "type": "object",
      "required": ["type"],
      "properties": {
        "type": {
          "enum": ["string", "integer", "number", "boolean", "enum", "object", "list", "ref"]
        },
        "minimum": { "type": "number" },
        "maximum": { "type": "number" },
        "values": { "type": "array", "items": { "type": "string" } },
        "kind": { "type": "string", "minLength": 1 },
        "targets": { "type": "array", "items": { "type": "string", "minLength": 1 } },
        "items": { "$ref": "#/$defs/item" },
        "min_items": { "type": "integer", "minimum": 0 },
        "max_items": { "type": "integer", "minimum": 0 }
      }
    },
    "item": {
      "$ref": "#/$defs/domain",
      "unevaluatedProperties": false
    },
    "field": {
      "$ref": "#/$defs/domain",
      "required": ["name"],
      "properties": {
        "name": { "type": "string", "minLength": 1 },
        "description": { "type": "string" },
        "required": { "type": "boolean" },
        "sensitive": { "type": "boolean" },
        "editions": { "$ref": "#/$defs/tags" },
        "edition_values": {
          "type": "object",
          "additionalProperties": { "type": "array" }
        },
        "default": true
      },
      "unevaluatedProperties": false
    }
  }
}"##;

/// Root of a catalog source document.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSource {
    /// Kind declarations, in source order.
    pub kinds: Vec<KindSource>,
}

/// One kind declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct KindSource {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub id_field: Option<String>,
    #[serde(default)]
    pub name_field: Option<String>,
    /// `None` when the key is absent: the kind is available everywhere.
    #[serde(default)]
    pub editions: Option<Vec<TagSource>>,
    #[serde(default)]
    pub fields: Vec<FieldSource>,
}

/// One field declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSource {
    pub name: String,
    #[serde(flatten)]
    pub domain: DomainSource,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub editions: Option<Vec<TagSource>>,
    #[serde(default)]
    pub edition_values: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    pub default: Option<Value>,
}

/// Value domain of a field or list element, selected by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainSource {
    String,
    Integer {
        #[serde(default)]
        minimum: Option<i64>,
        #[serde(default)]
        maximum: Option<i64>,
    },
    Number {
        #[serde(default)]
        minimum: Option<f64>,
        #[serde(default)]
        maximum: Option<f64>,
    },
    Boolean,
    Enum {
        values: Vec<String>,
    },
    Object {
        kind: String,
    },
    List {
        items: Box<DomainSource>,
        #[serde(default)]
        min_items: Option<u64>,
        #[serde(default)]
        max_items: Option<u64>,
    },
    Ref {
        targets: Vec<String>,
    },
}

/// An edition tag as written: either the short string form
/// (`enterprise>=18.2.1<22.1.1`) or the explicit map form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagSource {
    Short(String),
    Full {
        edition: String,
        #[serde(default)]
        since: Option<String>,
        #[serde(default)]
        until: Option<String>,
    },
}

/// Parse source text into a JSON value tree.
pub(crate) fn parse_document(text: &str, format: SourceFormat) -> Result<Value, SchemaLoadError> {
    let parsed = match format {
        SourceFormat::Json => serde_json::from_str::<Value>(text).map_err(|e| e.to_string()),
        SourceFormat::Yaml => serde_yaml::from_str::<Value>(text).map_err(|e| e.to_string()),
    };
    parsed.map_err(|reason| SchemaLoadError::Malformed { reason })
}

/// Check a parsed document against [`META_SCHEMA`].
pub(crate) fn check_shape(document: &Value) -> Result<(), SchemaLoadError> {
    let schema: Value =
        serde_json::from_str(META_SCHEMA).map_err(|e| SchemaLoadError::MetaSchema {
            reason: e.to_string(),
        })?;
    let mut opts = jsonschema::options();
    opts.with_draft(jsonschema::Draft::Draft202012);
    let validator = opts
        .build(&schema)
        .map_err(|e| SchemaLoadError::MetaSchema {
            reason: e.to_string(),
        })?;

    let violations: Vec<String> = validator
        .iter_errors(document)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                format!("  (root): {e}")
            } else {
                format!("  {path}: {e}")
            }
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaLoadError::Shape { violations })
    }
}

/// Map a shape-checked document onto the serde model.
pub(crate) fn decode_source(document: Value) -> Result<CatalogSource, SchemaLoadError> {
    serde_json::from_value(document).map_err(|e| SchemaLoadError::Malformed {
        reason: e.to_string(),
    })
}
