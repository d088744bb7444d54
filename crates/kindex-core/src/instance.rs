//! # Instances
//!
//! An [`Instance`] is one concrete configuration object: its kind, its
//! identifier, an optional display name and the ordered map of fields that
//! are set. Absent keys mean "not set" and are never materialized as zero
//! values.
//!
//! Instances are immutable. Application code that wants a changed object
//! builds a new instance and replaces the old one in the next graph
//! snapshot.
//!
//! ## Identifiers
//!
//! The identifier comes from the kind's identifier field when that field
//! holds a non-empty string. Objects that have not been created yet carry no
//! identifier; they receive a synthetic key derived from the canonical
//! digest of their fields, `<kind-lowercase>-<16 hex digits>`. The key is a
//! pure function of content, so decoding the same bytes twice yields the
//! same key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canonical::CanonicalBytes;
use crate::digest::sha256_hex;
use crate::error::CanonicalizationError;
use crate::identity::{InstanceKey, KindName, ObjectId};

/// Number of hex digits of the field digest used in synthetic keys.
const SYNTHETIC_KEY_HEX_LEN: usize = 16;

/// A concrete value of a resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    kind: KindName,
    id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    fields: Map<String, Value>,
}

impl Instance {
    /// Build an instance from its field map, taking the identifier and the
    /// display name from the named fields.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError` if a synthetic key must be derived
    /// and the fields cannot be canonicalized.
    pub fn from_fields(
        kind: KindName,
        fields: Map<String, Value>,
        id_field: &str,
        name_field: &str,
    ) -> Result<Self, CanonicalizationError> {
        let id = match fields.get(id_field).and_then(Value::as_str) {
            Some(id) if !id.is_empty() => ObjectId::new(id),
            _ => synthetic_id(&kind, &fields)?,
        };
        let name = fields
            .get(name_field)
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            kind,
            id,
            name,
            fields,
        })
    }

    /// Build an instance with an explicit identifier.
    pub fn with_id(
        kind: KindName,
        id: ObjectId,
        name: Option<String>,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            kind,
            id,
            name,
            fields,
        }
    }

    /// Kind of this instance.
    pub fn kind(&self) -> &KindName {
        &self.kind
    }

    /// Identifier of this instance.
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Display name, if the instance has one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Graph key of this instance.
    pub fn key(&self) -> InstanceKey {
        InstanceKey::new(self.kind.clone(), self.id.clone())
    }

    /// The value of a field, if it is set.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Whether a field is set. An explicit `null` counts as set.
    pub fn is_set(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// All set fields, in wire order.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consume the instance, returning its field map.
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// The wire representation: a flat JSON object of the set fields.
    pub fn to_wire(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Content digest of the field map.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError` if the fields cannot be canonicalized.
    pub fn digest(&self) -> Result<crate::ContentDigest, CanonicalizationError> {
        Ok(crate::sha256_digest(&CanonicalBytes::new(&self.fields)?))
    }
}

fn synthetic_id(
    kind: &KindName,
    fields: &Map<String, Value>,
) -> Result<ObjectId, CanonicalizationError> {
    let hex = sha256_hex(&CanonicalBytes::new(fields)?);
    Ok(ObjectId::new(format!(
        "{}-{}",
        kind.as_str().to_ascii_lowercase(),
        &hex[..SYNTHETIC_KEY_HEX_LEN]
    )))
}
