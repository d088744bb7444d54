//! # kindex-graph — Configuration Graph & Reference Resolution
//!
//! A [`ConfigGraph`] is an immutable snapshot of instances keyed by
//! `(kind, id)`. Snapshots are cheap to clone and safe to share; a new
//! configuration state is a new snapshot built through
//! [`ConfigGraphBuilder`].
//!
//! The [`ReferenceResolver`] walks every reference field of every instance
//! in a snapshot, including references inside nested objects and lists,
//! and classifies each one as an edge or a [`ReferenceViolation`].
//!
//! ## Design
//!
//! Edges are identities, never owning pointers. Cycles in the reference
//! graph are legal configuration and are tolerated everywhere; only
//! [`apply_order`] reports them, as the set of instances it could not
//! order.

pub mod graph;
pub mod order;
pub mod resolve;

pub use graph::{ConfigGraph, ConfigGraphBuilder};
pub use order::{apply_order, ApplyOrder};
pub use resolve::{ReferenceEdge, ReferenceResolver, ReferenceViolation, Resolution};
