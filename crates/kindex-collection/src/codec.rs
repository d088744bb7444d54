//! # Collection Page Codec
//!
//! ## Envelope
//!
//! | key       | shape                          | required |
//! |-----------|--------------------------------|----------|
//! | `count`   | non-negative integer, total across all pages | yes |
//! | `results` | array of instance payloads     | yes      |
//! | `next`    | continuation cursor string     | no; `null` or `""` mean "last page" |
//!
//! Unknown envelope keys are ignored. Every element of `results` is
//! validated as the page's kind; elements that are not objects still
//! occupy their slot so element positions line up with the wire.
//!
//! ## Round trip
//!
//! Encoding writes each element's normalized instance (or its raw payload
//! when there is no instance), so decoding an encoded page of valid
//! elements gives back an equal page.

use serde_json::{Map, Value};

use kindex_core::{Cursor, Instance, KindName};
use kindex_schema::{EditionContext, InstanceValidator, ValidationReport};

use crate::error::{DecodeError, EncodeError};

/// One element of a decoded page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageElement {
    report: ValidationReport,
    raw: Option<Value>,
}

impl PageElement {
    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.report.instance()
    }

    /// The original payload, kept only for elements that produced no
    /// instance.
    pub fn raw(&self) -> Option<&Value> {
        self.raw.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.report.is_valid()
    }

    pub fn into_report(self) -> ValidationReport {
        self.report
    }

    /// Wire form of this element.
    fn to_wire(&self) -> Value {
        match (self.report.instance(), &self.raw) {
            (Some(instance), _) => instance.to_wire(),
            (None, Some(raw)) => raw.clone(),
            (None, None) => Value::Null,
        }
    }
}

/// One decoded page of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPage {
    kind: KindName,
    count: u64,
    next: Option<Cursor>,
    elements: Vec<PageElement>,
}

impl CollectionPage {
    pub fn kind(&self) -> &KindName {
        &self.kind
    }

    /// Total number of objects in the collection, across all pages.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn next(&self) -> Option<&Cursor> {
        self.next.as_ref()
    }

    pub fn elements(&self) -> &[PageElement] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<PageElement> {
        self.elements
    }

    /// Normalized instances of the page, in wire order.
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.elements.iter().filter_map(PageElement::instance)
    }
}

/// Decodes and encodes collection pages for one edition context.
#[derive(Debug, Clone)]
pub struct CollectionCodec {
    validator: InstanceValidator,
    context: EditionContext,
}

impl CollectionCodec {
    pub fn new(validator: InstanceValidator, context: EditionContext) -> Self {
        Self { validator, context }
    }

    pub fn validator(&self) -> &InstanceValidator {
        &self.validator
    }

    pub fn context(&self) -> &EditionContext {
        &self.context
    }

    /// Decode a page of `kind` from raw bytes.
    pub fn decode(&self, kind: &str, bytes: &[u8]) -> Result<CollectionPage, DecodeError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed {
            reason: e.to_string(),
        })?;
        self.decode_value(kind, &value)
    }

    /// Decode a page of `kind` from an already parsed envelope.
    pub fn decode_value(&self, kind: &str, envelope: &Value) -> Result<CollectionPage, DecodeError> {
        let Some(map) = envelope.as_object() else {
            return Err(DecodeError::NotAnObject {
                found: json_type(envelope),
            });
        };

        let count = match map.get("count") {
            None => return Err(DecodeError::MissingField { field: "count" }),
            Some(v) => v.as_u64().ok_or_else(|| DecodeError::InvalidField {
                field: "count",
                reason: format!("expected a non-negative integer, found {v}"),
            })?,
        };

        let results = match map.get("results") {
            None => return Err(DecodeError::MissingField { field: "results" }),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(DecodeError::InvalidField {
                    field: "results",
                    reason: format!("expected an array, found {}", json_type(other)),
                })
            }
        };

        let next = match map.get("next") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(Cursor::new(s.as_str())),
            Some(other) => {
                return Err(DecodeError::InvalidField {
                    field: "next",
                    reason: format!("expected a string, found {}", json_type(other)),
                })
            }
        };

        let elements: Vec<PageElement> = results
            .iter()
            .map(|payload| {
                let report = self.validator.validate(kind, payload, &self.context);
                let raw = report.instance().is_none().then(|| payload.clone());
                PageElement { report, raw }
            })
            .collect();

        let invalid = elements.iter().filter(|e| !e.is_valid()).count();
        if invalid > 0 {
            tracing::debug!(kind, elements = elements.len(), invalid, "decoded page with invalid elements");
        }

        Ok(CollectionPage {
            kind: KindName::new(kind),
            count,
            next,
            elements,
        })
    }

    /// Encode a decoded page back into envelope bytes.
    pub fn encode(&self, page: &CollectionPage) -> Result<Vec<u8>, EncodeError> {
        for (index, element) in page.elements.iter().enumerate() {
            if element.report.kind() != &page.kind {
                return Err(EncodeError::KindMismatch {
                    index,
                    expected: page.kind.clone(),
                    found: element.report.kind().clone(),
                });
            }
        }
        let results: Vec<Value> = page.elements.iter().map(PageElement::to_wire).collect();
        envelope_bytes(page.count, page.next.as_ref(), results)
    }

    /// Encode instances of `kind` as one page.
    pub fn encode_instances<'a, I>(
        &self,
        kind: &KindName,
        count: u64,
        next: Option<&Cursor>,
        instances: I,
    ) -> Result<Vec<u8>, EncodeError>
    where
        I: IntoIterator<Item = &'a Instance>,
    {
        let mut results = Vec::new();
        for (index, instance) in instances.into_iter().enumerate() {
            if instance.kind() != kind {
                return Err(EncodeError::KindMismatch {
                    index,
                    expected: kind.clone(),
                    found: instance.kind().clone(),
                });
            }
            results.push(instance.to_wire());
        }
        envelope_bytes(count, next, results)
    }
}

fn envelope_bytes(count: u64, next: Option<&Cursor>, results: Vec<Value>) -> Result<Vec<u8>, EncodeError> {
    let mut envelope = Map::new();
    envelope.insert("count".into(), Value::from(count));
    envelope.insert("results".into(), Value::Array(results));
    if let Some(cursor) = next {
        envelope.insert("next".into(), Value::from(cursor.as_str()));
    }
    serde_json::to_vec(&Value::Object(envelope)).map_err(|e| EncodeError::Serialization(e.to_string()))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
