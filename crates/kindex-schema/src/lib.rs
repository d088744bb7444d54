//! # kindex-schema — Catalog, Edition Gate & Instance Validation
//!
//! Resource kinds are data, not Rust types. A [`SchemaCatalog`] maps kind
//! names to [`ResourceKind`] records loaded from a declarative YAML or JSON
//! source; the [`InstanceValidator`] interprets those records to validate
//! arbitrary payloads. Adding a kind, a field or an enum value is a catalog
//! change, never an engine change.
//!
//! ## Modules
//!
//! - [`source`]: the declarative catalog format and its embedded
//!   meta-schema.
//! - [`catalog`]: loading, structural checks (undeclared targets,
//!   unsatisfiable required chains) and lookups.
//! - [`edition`]: edition contexts, edition tags and the gate predicate.
//! - [`validate`]: per-instance validation producing a
//!   [`ValidationReport`].
//!
//! ## Crate Policy
//!
//! - Depends only on `kindex-core` internally.
//! - Catalog loading is the only fallible, I/O-performing operation. After
//!   load the catalog is immutable and `Send + Sync`.
//! - Validation never fails: malformed input is described by violations.

pub mod catalog;
pub mod edition;
pub mod error;
pub mod source;
pub mod validate;

pub use catalog::{
    Bounds, EnumDomain, FieldDomain, FieldSpec, ListDomain, ResourceKind, SchemaCatalog,
};
pub use edition::{is_allowed, EditionContext, EditionTag};
pub use error::{SchemaLoadError, UnknownKindError};
pub use source::SourceFormat;
pub use validate::{InstanceValidator, Note, NoteKind, ValidationReport, Violation, ViolationKind};
