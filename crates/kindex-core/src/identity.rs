//! # Identifier Newtypes
//!
//! Newtype wrappers for the identifiers the engine passes around. These
//! prevent accidental confusion: a page cursor cannot be used as an object
//! identifier, and a kind name cannot be used as either.
//!
//! `KindName` and `ObjectId` implement `Borrow<str>` so that maps keyed by
//! them can be queried with a plain `&str`.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a resource kind (`Pool`, `VirtualService`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindName(String);

/// Identifier of one instance, unique within its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

/// Opaque continuation cursor of a paginated collection.
///
/// The engine never interprets a cursor; it is presented back to the
/// transport verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

/// Fully qualified key of an instance inside a configuration graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    /// Kind of the instance.
    pub kind: KindName,
    /// Identifier of the instance within its kind.
    pub id: ObjectId,
}

impl KindName {
    /// Wrap a kind name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The kind name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ObjectId {
    /// Wrap an object identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Cursor {
    /// Wrap a cursor string exactly as the server returned it.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The cursor as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl InstanceKey {
    /// Build a key from a kind and an identifier.
    pub fn new(kind: KindName, id: ObjectId) -> Self {
        Self { kind, id }
    }
}

impl Borrow<str> for KindName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for KindName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Cursor {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for KindName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}
