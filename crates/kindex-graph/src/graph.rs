//! # Configuration Graph Snapshots
//!
//! `ConfigGraphBuilder` is the only mutable stage. `build()` freezes the
//! instances and derives the by-id and by-name indexes; the resulting
//! `ConfigGraph` is never modified again. Edits go through `to_builder()`,
//! which shares every unchanged instance with the old snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use kindex_core::{
    sha256_digest, CanonicalBytes, CanonicalizationError, ContentDigest, Instance, InstanceKey,
    KindName, ObjectId,
};

/// Mutable staging area for a graph snapshot.
#[derive(Debug, Clone, Default)]
pub struct ConfigGraphBuilder {
    instances: BTreeMap<InstanceKey, Arc<Instance>>,
}

impl ConfigGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an instance, replacing any instance with the same key.
    /// Returns the replaced instance.
    pub fn insert(&mut self, instance: Instance) -> Option<Arc<Instance>> {
        self.insert_shared(Arc::new(instance))
    }

    /// Insert an already shared instance.
    pub fn insert_shared(&mut self, instance: Arc<Instance>) -> Option<Arc<Instance>> {
        self.instances.insert(instance.key(), instance)
    }

    pub fn remove(&mut self, key: &InstanceKey) -> Option<Arc<Instance>> {
        self.instances.remove(key)
    }

    pub fn contains(&self, key: &InstanceKey) -> bool {
        self.instances.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Freeze into an immutable snapshot.
    pub fn build(self) -> ConfigGraph {
        let mut by_id: BTreeMap<ObjectId, Vec<InstanceKey>> = BTreeMap::new();
        let mut by_name: BTreeMap<String, Vec<InstanceKey>> = BTreeMap::new();
        for (key, instance) in &self.instances {
            by_id.entry(key.id.clone()).or_default().push(key.clone());
            if let Some(name) = instance.name() {
                by_name.entry(name.to_string()).or_default().push(key.clone());
            }
        }
        ConfigGraph {
            inner: Arc::new(GraphInner {
                instances: self.instances,
                by_id,
                by_name,
            }),
        }
    }
}

impl Extend<Instance> for ConfigGraphBuilder {
    fn extend<T: IntoIterator<Item = Instance>>(&mut self, iter: T) {
        for instance in iter {
            self.insert(instance);
        }
    }
}

impl FromIterator<Instance> for ConfigGraphBuilder {
    fn from_iter<T: IntoIterator<Item = Instance>>(iter: T) -> Self {
        let mut builder = Self::new();
        builder.extend(iter);
        builder
    }
}

#[derive(Debug)]
struct GraphInner {
    instances: BTreeMap<InstanceKey, Arc<Instance>>,
    // Keys within each bucket are in key order, inherited from `instances`.
    by_id: BTreeMap<ObjectId, Vec<InstanceKey>>,
    by_name: BTreeMap<String, Vec<InstanceKey>>,
}

/// An immutable snapshot of configuration instances.
#[derive(Debug, Clone)]
pub struct ConfigGraph {
    inner: Arc<GraphInner>,
}

impl Default for ConfigGraph {
    fn default() -> Self {
        ConfigGraphBuilder::new().build()
    }
}

impl ConfigGraph {
    pub fn get(&self, key: &InstanceKey) -> Option<&Arc<Instance>> {
        self.inner.instances.get(key)
    }

    /// Instance of `kind` with identifier `id`.
    pub fn get_by(&self, kind: &KindName, id: &ObjectId) -> Option<&Arc<Instance>> {
        self.get(&InstanceKey::new(kind.clone(), id.clone()))
    }

    /// All instances, in key order.
    pub fn instances(&self) -> impl Iterator<Item = &Arc<Instance>> {
        self.inner.instances.values()
    }

    /// All instances of one kind, in identifier order.
    pub fn instances_of<'a>(&'a self, kind: &'a KindName) -> impl Iterator<Item = &'a Arc<Instance>> {
        self.inner
            .instances
            .range(InstanceKey::new(kind.clone(), ObjectId::new(""))..)
            .take_while(move |(key, _)| &key.kind == kind)
            .map(|(_, instance)| instance)
    }

    /// Instances of any kind carrying identifier `id`.
    pub fn find_by_id(&self, id: &ObjectId) -> impl Iterator<Item = &Arc<Instance>> {
        self.lookup_index(self.inner.by_id.get(id))
    }

    /// Instances of any kind whose display name is `name`.
    pub fn find_by_name(&self, name: &str) -> impl Iterator<Item = &Arc<Instance>> {
        self.lookup_index(self.inner.by_name.get(name))
    }

    fn lookup_index<'a>(
        &'a self,
        keys: Option<&'a Vec<InstanceKey>>,
    ) -> impl Iterator<Item = &'a Arc<Instance>> {
        keys.into_iter()
            .flatten()
            .filter_map(move |key| self.inner.instances.get(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &InstanceKey> {
        self.inner.instances.keys()
    }

    pub fn len(&self) -> usize {
        self.inner.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.instances.is_empty()
    }

    /// A builder seeded with this snapshot's instances.
    pub fn to_builder(&self) -> ConfigGraphBuilder {
        ConfigGraphBuilder {
            instances: self.inner.instances.clone(),
        }
    }

    /// Digest of the whole snapshot: SHA-256 over the canonical form of
    /// every instance's kind, identifier and fields.
    pub fn digest(&self) -> Result<ContentDigest, CanonicalizationError> {
        #[derive(Serialize)]
        struct Entry<'a> {
            kind: &'a KindName,
            id: &'a ObjectId,
            fields: &'a serde_json::Map<String, serde_json::Value>,
        }
        let entries: Vec<Entry<'_>> = self
            .instances()
            .map(|i| Entry {
                kind: i.kind(),
                id: i.id(),
                fields: i.fields(),
            })
            .collect();
        Ok(sha256_digest(&CanonicalBytes::new(&entries)?))
    }

    /// Whether two snapshots share storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
