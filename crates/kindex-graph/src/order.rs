//! Dependency apply order.
//!
//! An edge `A -> B` means A refers to B, so B must exist before A is
//! created and must outlive A on deletion. [`apply_order`] runs Kahn's
//! algorithm over the resolved edges, always releasing the smallest ready
//! key first so the order is deterministic. Instances on or behind a cycle
//! never become ready; they are returned separately in key order.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use kindex_core::InstanceKey;

use crate::graph::ConfigGraph;
use crate::resolve::Resolution;

/// Creation order for a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOrder {
    /// Instances in an order where every instance follows everything it
    /// refers to.
    pub order: Vec<InstanceKey>,
    /// Instances that could not be ordered because of a reference cycle.
    pub cyclic: Vec<InstanceKey>,
}

impl ApplyOrder {
    pub fn is_acyclic(&self) -> bool {
        self.cyclic.is_empty()
    }

    /// Deletion order: the reverse of creation order.
    pub fn deletion_order(&self) -> impl Iterator<Item = &InstanceKey> {
        self.order.iter().rev()
    }
}

/// Order the instances of `graph` so that references point backwards.
pub fn apply_order(graph: &ConfigGraph, resolution: &Resolution) -> ApplyOrder {
    // dependencies[a] = what a refers to; dependents[b] = who refers to b.
    let mut dependencies: BTreeMap<&InstanceKey, BTreeSet<&InstanceKey>> =
        graph.keys().map(|k| (k, BTreeSet::new())).collect();
    let mut dependents: BTreeMap<&InstanceKey, BTreeSet<&InstanceKey>> = BTreeMap::new();
    for edge in resolution.edges() {
        if let Some(deps) = dependencies.get_mut(&edge.from) {
            deps.insert(&edge.to);
            dependents.entry(&edge.to).or_default().insert(&edge.from);
        }
    }

    let mut ready: BTreeSet<&InstanceKey> = dependencies
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(k, _)| *k)
        .collect();
    let mut order = Vec::with_capacity(dependencies.len());

    while let Some(next) = ready.pop_first() {
        order.push(next.clone());
        dependencies.remove(next);
        if let Some(waiting) = dependents.get(next) {
            for dependent in waiting {
                if let Some(deps) = dependencies.get_mut(dependent) {
                    deps.remove(next);
                    if deps.is_empty() {
                        ready.insert(*dependent);
                    }
                }
            }
        }
    }

    let cyclic: Vec<InstanceKey> = dependencies.keys().map(|k| (*k).clone()).collect();
    if !cyclic.is_empty() {
        tracing::warn!(
            cyclic = cyclic.len(),
            "reference cycle prevents a complete apply order"
        );
    }
    ApplyOrder { order, cyclic }
}
