//! # kindex-core — Foundational Types for the kindex Engine
//!
//! Every other crate in the workspace depends on `kindex-core`; it depends on
//! nothing internal. It carries the primitives that the schema catalog, the
//! configuration graph and the collection codec all agree on.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `KindName`, `ObjectId`, `Cursor`
//!    and `InstanceKey` are distinct types. A cursor can never be passed where
//!    an object identifier is expected.
//!
//! 2. **Instances are immutable values.** An [`Instance`] is built once from a
//!    field map and never edited in place. Replacing a field means building a
//!    new instance, which keeps graph snapshots shareable across threads.
//!
//! 3. **`CanonicalBytes` for every digest.** Catalog fingerprints, synthetic
//!    instance keys and snapshot digests all hash JCS-canonical bytes, so the
//!    same logical content always yields the same digest.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `kindex-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod config;
pub mod digest;
pub mod error;
pub mod identity;
pub mod instance;
pub mod reference;
pub mod version;

pub use canonical::CanonicalBytes;
pub use config::EngineConfig;
pub use digest::{sha256_digest, sha256_hex, ContentDigest};
pub use error::{CanonicalizationError, ConfigError, VersionParseError};
pub use identity::{Cursor, InstanceKey, KindName, ObjectId};
pub use instance::Instance;
pub use reference::{RefTarget, Reference};
pub use version::ApiVersion;
