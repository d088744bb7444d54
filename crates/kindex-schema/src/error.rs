//! Catalog errors.
//!
//! Loading errors are fatal at startup and carry the kind, field and
//! offending value so a catalog author can fix the source without a
//! debugger. Lookup errors are per call and recoverable.

use kindex_core::CanonicalizationError;
use thiserror::Error;

/// The declarative catalog source could not be turned into a catalog.
#[derive(Error, Debug)]
pub enum SchemaLoadError {
    /// The source file could not be read.
    #[error("cannot read catalog source '{path}': {reason}")]
    Read {
        /// Path of the source file.
        path: String,
        /// Reason the read failed.
        reason: String,
    },

    /// The source text is not valid YAML/JSON, or does not map onto the
    /// catalog model.
    #[error("malformed catalog source: {reason}")]
    Malformed {
        /// Parser message.
        reason: String,
    },

    /// The source document does not match the catalog meta-schema.
    #[error("catalog source does not match the catalog format:\n{}", .violations.join("\n"))]
    Shape {
        /// One line per meta-schema violation, `path: message`.
        violations: Vec<String>,
    },

    /// The same kind name is declared twice.
    #[error("duplicate kind '{kind}'")]
    DuplicateKind {
        /// The repeated kind name.
        kind: String,
    },

    /// The same field name is declared twice within one kind.
    #[error("duplicate field '{field}' in kind '{kind}'")]
    DuplicateField {
        /// Kind declaring the field.
        kind: String,
        /// The repeated field name.
        field: String,
    },

    /// A field declaration is internally inconsistent.
    #[error("invalid field '{kind}.{field}': {reason}")]
    InvalidField {
        /// Kind declaring the field.
        kind: String,
        /// The offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A kind declaration is internally inconsistent.
    #[error("invalid kind '{kind}': {reason}")]
    InvalidKind {
        /// The offending kind.
        kind: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An edition tag could not be parsed.
    #[error("invalid edition tag '{tag}' on '{owner}': {reason}")]
    InvalidEditionTag {
        /// `Kind` or `Kind.field` carrying the tag.
        owner: String,
        /// The raw tag.
        tag: String,
        /// Parse failure.
        reason: String,
    },

    /// A reference or nested-object field names a kind that is not declared.
    #[error("field '{kind}.{field}' targets undeclared kind '{target}'")]
    UndeclaredTarget {
        /// Kind declaring the field.
        kind: String,
        /// The referencing field.
        field: String,
        /// The missing target kind.
        target: String,
    },

    /// Required references or nested objects form a chain that no finite
    /// configuration can satisfy.
    #[error("unsatisfiable required reference chain through kinds: {}", .kinds.join(", "))]
    UnsatisfiableRequiredChain {
        /// Every kind that can never be instantiated, sorted.
        kinds: Vec<String>,
    },

    /// The embedded meta-schema failed to compile.
    #[error("catalog meta-schema error: {reason}")]
    MetaSchema {
        /// Compiler message.
        reason: String,
    },

    /// Fingerprint computation failed.
    #[error("catalog fingerprint: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

/// A kind name is not present in the catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown kind '{kind}'")]
pub struct UnknownKindError {
    /// The kind that was looked up.
    pub kind: String,
}
