//! # Reference Resolution
//!
//! Walks every reference-typed value of every instance in a snapshot and
//! produces the set of resolved edges plus a list of violations.
//!
//! ## Reference forms
//!
//! A reference value is parsed with [`RefTarget::parse`]: a bare
//! identifier, an API path or URL whose last segment is the identifier,
//! or a by-name form (`...?name=web`). Identifiers are looked up among the
//! field's permitted kinds; names are matched against display names. When
//! an API path names a kind (`/api/poolgroup/x`), candidates of that kind
//! win over same-named instances of other kinds.
//!
//! ## Outcomes per reference
//!
//! | Found in permitted kinds | Found elsewhere | Result        |
//! |--------------------------|-----------------|---------------|
//! | exactly one              | any             | edge          |
//! | more than one            | any             | `Ambiguous`   |
//! | none                     | yes             | `KindMismatch`|
//! | none                     | no              | `Dangling`    |
//!
//! Resolution is a pure function of the snapshot and the catalog: the same
//! inputs always give the same edges and the same violations in the same
//! order (instance key order, then field declaration order).

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use kindex_core::{Instance, InstanceKey, KindName, RefTarget, Reference};
use kindex_schema::{FieldDomain, ResourceKind, SchemaCatalog};

use crate::graph::ConfigGraph;

/// A resolved reference: `from` refers to `to` through the value at
/// `field_path` (a JSON pointer into `from`'s fields).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ReferenceEdge {
    pub from: InstanceKey,
    pub field_path: String,
    pub to: InstanceKey,
}

/// A reference that could not be turned into an edge.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceViolation {
    /// No instance anywhere in the snapshot matches the reference.
    #[error("{from}{field_path}: dangling reference '{target}'")]
    Dangling {
        from: InstanceKey,
        field_path: String,
        target: String,
        expected: Vec<KindName>,
    },

    /// The target exists, but only under kinds the field does not permit.
    #[error("{from}{field_path}: '{target}' is a {found:?}, expected one of {expected:?}")]
    KindMismatch {
        from: InstanceKey,
        field_path: String,
        target: String,
        found: Vec<KindName>,
        expected: Vec<KindName>,
    },

    /// A by-name reference matches more than one permitted instance.
    #[error("{from}{field_path}: '{target}' is ambiguous between {candidates:?}")]
    Ambiguous {
        from: InstanceKey,
        field_path: String,
        target: String,
        candidates: Vec<InstanceKey>,
    },

    /// The instance's kind is not in the catalog, so its references cannot
    /// be found.
    #[error("{key}: kind is not in the catalog")]
    UncataloguedKind { key: InstanceKey },
}

impl ReferenceViolation {
    /// Instance the violation belongs to.
    pub fn instance(&self) -> &InstanceKey {
        match self {
            Self::Dangling { from, .. }
            | Self::KindMismatch { from, .. }
            | Self::Ambiguous { from, .. } => from,
            Self::UncataloguedKind { key } => key,
        }
    }
}

/// Edges and violations of one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    edges: BTreeSet<ReferenceEdge>,
    violations: Vec<ReferenceViolation>,
}

impl Resolution {
    pub fn edges(&self) -> &BTreeSet<ReferenceEdge> {
        &self.edges
    }

    pub fn violations(&self) -> &[ReferenceViolation] {
        &self.violations
    }

    /// True when every reference resolved.
    pub fn is_complete(&self) -> bool {
        self.violations.is_empty()
    }

    /// Edges pointing at `key`: everything that would break if it were
    /// removed.
    pub fn referrers_of<'a>(&'a self, key: &'a InstanceKey) -> impl Iterator<Item = &'a ReferenceEdge> {
        self.edges.iter().filter(move |e| &e.to == key)
    }

    /// Edges leaving `key`.
    pub fn references_from<'a>(
        &'a self,
        key: &'a InstanceKey,
    ) -> impl Iterator<Item = &'a ReferenceEdge> {
        self.edges.iter().filter(move |e| &e.from == key)
    }
}

/// Resolves references against a shared catalog.
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    catalog: Arc<SchemaCatalog>,
}

impl ReferenceResolver {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }

    /// Resolve every reference in the snapshot.
    pub fn resolve(&self, graph: &ConfigGraph) -> Resolution {
        let mut pass = Pass {
            catalog: &self.catalog,
            graph,
            resolution: Resolution::default(),
        };
        for instance in graph.instances() {
            pass.instance(instance);
        }
        let resolution = pass.resolution;
        tracing::debug!(
            instances = graph.len(),
            edges = resolution.edges.len(),
            violations = resolution.violations.len(),
            "resolved configuration references"
        );
        resolution
    }
}

struct Pass<'a> {
    catalog: &'a SchemaCatalog,
    graph: &'a ConfigGraph,
    resolution: Resolution,
}

impl<'a> Pass<'a> {
    fn instance(&mut self, instance: &Instance) {
        let key = instance.key();
        let catalog = self.catalog;
        let Ok(kind) = catalog.lookup(instance.kind().as_str()) else {
            self.resolution
                .violations
                .push(ReferenceViolation::UncataloguedKind { key });
            return;
        };
        self.object(&key, kind, instance.fields(), "");
    }

    fn object(&mut self, from: &InstanceKey, kind: &ResourceKind, fields: &Map<String, Value>, path: &str) {
        for spec in &kind.fields {
            if let Some(value) = fields.get(&spec.name) {
                let field_path = format!("{path}/{}", escape(&spec.name));
                self.value(from, &spec.domain, value, &field_path);
            }
        }
    }

    fn value(&mut self, from: &InstanceKey, domain: &FieldDomain, value: &Value, path: &str) {
        match (domain, value) {
            (FieldDomain::Reference(targets), Value::String(raw)) if !raw.is_empty() => {
                self.reference(from, targets, raw, path);
            }
            (FieldDomain::List(list), Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    self.value(from, &list.item, item, &format!("{path}/{i}"));
                }
            }
            (FieldDomain::Object(kind), Value::Object(map)) => {
                let catalog = self.catalog;
                if let Ok(nested) = catalog.lookup(kind.as_str()) {
                    self.object(from, nested, map, path);
                }
            }
            _ => {}
        }
    }

    fn reference(&mut self, from: &InstanceKey, targets: &[KindName], raw: &str, path: &str) {
        let graph = self.graph;
        let classify = |candidates: Vec<&Arc<Instance>>| -> Result<InstanceKey, ReferenceViolation> {
            let (permitted, elsewhere): (Vec<_>, Vec<_>) = candidates
                .into_iter()
                .partition(|i| targets.contains(i.kind()));
            match permitted.as_slice() {
                [only] => Ok(only.key()),
                [] if elsewhere.is_empty() => Err(ReferenceViolation::Dangling {
                    from: from.clone(),
                    field_path: path.to_string(),
                    target: raw.to_string(),
                    expected: targets.to_vec(),
                }),
                [] => {
                    let found: BTreeSet<KindName> =
                        elsewhere.iter().map(|i| i.kind().clone()).collect();
                    Err(ReferenceViolation::KindMismatch {
                        from: from.clone(),
                        field_path: path.to_string(),
                        target: raw.to_string(),
                        found: found.into_iter().collect(),
                        expected: targets.to_vec(),
                    })
                }
                many => Err(ReferenceViolation::Ambiguous {
                    from: from.clone(),
                    field_path: path.to_string(),
                    target: raw.to_string(),
                    candidates: many.iter().map(|i| i.key()).collect(),
                }),
            }
        };

        let outcome = match Reference::parse(raw) {
            Some(reference) => {
                let candidates: Vec<&Arc<Instance>> = match &reference.target {
                    RefTarget::Id(id) => graph.find_by_id(id).collect(),
                    RefTarget::Name(name) => graph.find_by_name(name).collect(),
                };
                classify(narrow_by_kind(&reference, candidates))
            }
            None => classify(Vec::new()),
        };

        match outcome {
            Ok(to) => {
                self.resolution.edges.insert(ReferenceEdge {
                    from: from.clone(),
                    field_path: path.to_string(),
                    to,
                });
            }
            Err(v) => self.resolution.violations.push(v),
        }
    }
}

/// Keep only the candidates of the kind the path names, unless none are.
fn narrow_by_kind<'g>(reference: &Reference, candidates: Vec<&'g Arc<Instance>>) -> Vec<&'g Arc<Instance>> {
    if candidates.iter().any(|i| reference.names_kind(i.kind().as_str())) {
        candidates
            .into_iter()
            .filter(|i| reference.names_kind(i.kind().as_str()))
            .collect()
    } else {
        candidates
    }
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ConfigGraphBuilder;
    use kindex_schema::SourceFormat;
    use serde_json::json;

    const CATALOG: &str = r#"
kinds:
  - name: Cloud
    fields:
      - { name: uuid, type: string }
      - { name: name, type: string }
  - name: Pool
    fields:
      - { name: uuid, type: string }
      - { name: name, type: string }
      - { name: cloud_ref, type: ref, targets: [Cloud] }
  - name: PoolGroup
    fields:
      - { name: uuid, type: string }
      - { name: name, type: string }
      - { name: members, type: list, items: { type: object, kind: Member } }
  - name: Member
    fields:
      - { name: pool_ref, type: ref, targets: [Pool] }
  - name: VirtualService
    fields:
      - { name: uuid, type: string }
      - { name: name, type: string }
      - { name: pool_ref, type: ref, targets: [Pool, PoolGroup] }
"#;

    fn resolver() -> ReferenceResolver {
        ReferenceResolver::new(Arc::new(
            SchemaCatalog::load_str(CATALOG, SourceFormat::Yaml).unwrap(),
        ))
    }

    fn inst(kind: &str, fields: Value) -> Instance {
        let Value::Object(map) = fields else {
            panic!("fields must be an object")
        };
        Instance::from_fields(kind.into(), map, "uuid", "name").unwrap()
    }

    fn key(kind: &str, id: &str) -> InstanceKey {
        InstanceKey::new(kind.into(), id.into())
    }

    fn graph(instances: Vec<Instance>) -> ConfigGraph {
        instances.into_iter().collect::<ConfigGraphBuilder>().build()
    }

    #[test]
    fn resolves_id_url_and_name_forms() {
        let g = graph(vec![
            inst("Cloud", json!({"uuid": "cloud-1", "name": "default"})),
            inst("Pool", json!({"uuid": "p1", "name": "web", "cloud_ref": "cloud-1"})),
            inst("Pool", json!({"uuid": "p2", "name": "api", "cloud_ref": "https://ctl/api/cloud/cloud-1#default"})),
            inst("VirtualService", json!({"uuid": "vs1", "pool_ref": "/api/pool?name=web"})),
        ]);
        let res = resolver().resolve(&g);
        assert!(res.is_complete(), "{:?}", res.violations());
        let edges: Vec<(String, String)> = res
            .edges()
            .iter()
            .map(|e| (format!("{}{}", e.from, e.field_path), e.to.to_string()))
            .collect();
        assert_eq!(
            edges,
            vec![
                ("Pool/p1/cloud_ref".to_string(), "Cloud/cloud-1".to_string()),
                ("Pool/p2/cloud_ref".to_string(), "Cloud/cloud-1".to_string()),
                ("VirtualService/vs1/pool_ref".to_string(), "Pool/p1".to_string()),
            ]
        );
    }

    #[test]
    fn dangling_reported_once_with_path() {
        let g = graph(vec![inst("Pool", json!({"uuid": "p1", "cloud_ref": "cloud-9"}))]);
        let res = resolver().resolve(&g);
        assert!(res.edges().is_empty());
        assert_eq!(
            res.violations(),
            &[ReferenceViolation::Dangling {
                from: key("Pool", "p1"),
                field_path: "/cloud_ref".into(),
                target: "cloud-9".into(),
                expected: vec![KindName::new("Cloud")],
            }]
        );
    }

    #[test]
    fn kind_mismatch_when_target_has_wrong_kind() {
        let g = graph(vec![
            inst("Cloud", json!({"uuid": "c1"})),
            inst("VirtualService", json!({"uuid": "vs1", "pool_ref": "c1"})),
        ]);
        let res = resolver().resolve(&g);
        match res.violations() {
            [ReferenceViolation::KindMismatch { found, expected, .. }] => {
                assert_eq!(found, &vec![KindName::new("Cloud")]);
                assert_eq!(expected, &vec![KindName::new("Pool"), KindName::new("PoolGroup")]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn union_target_resolves_to_either_kind() {
        let g = graph(vec![
            inst("PoolGroup", json!({"uuid": "pg1"})),
            inst("VirtualService", json!({"uuid": "vs1", "pool_ref": "pg1"})),
        ]);
        let res = resolver().resolve(&g);
        assert!(res.is_complete());
        assert_eq!(res.edges().iter().next().unwrap().to, key("PoolGroup", "pg1"));
    }

    #[test]
    fn ambiguous_name_across_permitted_kinds() {
        let g = graph(vec![
            inst("Pool", json!({"uuid": "p1", "name": "web"})),
            inst("PoolGroup", json!({"uuid": "pg1", "name": "web"})),
            inst("VirtualService", json!({"uuid": "vs1", "pool_ref": "?name=web"})),
        ]);
        let res = resolver().resolve(&g);
        assert!(matches!(
            res.violations(),
            [ReferenceViolation::Ambiguous { candidates, .. }] if candidates.len() == 2
        ));
    }

    #[test]
    fn encoded_names_resolve() {
        let g = graph(vec![
            inst("Pool", json!({"uuid": "p1", "name": "web pool"})),
            inst("VirtualService", json!({"uuid": "vs1", "pool_ref": "/api/pool?name=web+pool"})),
            inst("VirtualService", json!({"uuid": "vs2", "pool_ref": "/api/pool?name=web%20pool"})),
        ]);
        let res = resolver().resolve(&g);
        assert!(res.is_complete(), "{:?}", res.violations());
        assert_eq!(res.referrers_of(&key("Pool", "p1")).count(), 2);
    }

    #[test]
    fn api_path_kind_picks_between_same_identifiers() {
        let g = graph(vec![
            inst("Pool", json!({"uuid": "x", "name": "web"})),
            inst("PoolGroup", json!({"uuid": "x", "name": "web"})),
            inst("VirtualService", json!({"uuid": "vs1", "pool_ref": "/api/poolgroup/x"})),
            inst("VirtualService", json!({"uuid": "vs2", "pool_ref": "https://ctl/api/pool?name=web"})),
            inst("VirtualService", json!({"uuid": "vs3", "pool_ref": "x"})),
        ]);
        let res = resolver().resolve(&g);
        let to: Vec<(String, String)> = res
            .edges()
            .iter()
            .map(|e| (e.from.id.to_string(), e.to.to_string()))
            .collect();
        assert_eq!(
            to,
            vec![
                ("vs1".to_string(), "PoolGroup/x".to_string()),
                ("vs2".to_string(), "Pool/x".to_string()),
            ]
        );
        // A bare identifier carries no kind, so it stays ambiguous.
        assert!(matches!(
            res.violations(),
            [ReferenceViolation::Ambiguous { from, .. }] if from.id.as_str() == "vs3"
        ));
    }

    #[test]
    fn path_kind_outside_the_candidates_is_ignored() {
        let g = graph(vec![
            inst("Cloud", json!({"uuid": "c1"})),
            inst("VirtualService", json!({"uuid": "vs1", "pool_ref": "/api/pool/c1"})),
        ]);
        let res = resolver().resolve(&g);
        assert!(matches!(
            res.violations(),
            [ReferenceViolation::KindMismatch { found, .. }] if found == &vec![KindName::new("Cloud")]
        ));
    }

    #[test]
    fn nested_list_references_are_resolved() {
        let g = graph(vec![
            inst("Pool", json!({"uuid": "p1"})),
            inst("PoolGroup", json!({"uuid": "pg1", "members": [{"pool_ref": "p1"}, {"pool_ref": "p2"}]})),
        ]);
        let res = resolver().resolve(&g);
        assert_eq!(res.edges().len(), 1);
        assert_eq!(res.edges().iter().next().unwrap().field_path, "/members/0/pool_ref");
        assert!(matches!(
            res.violations(),
            [ReferenceViolation::Dangling { field_path, .. }] if field_path == "/members/1/pool_ref"
        ));
    }

    #[test]
    fn uncatalogued_kind_is_reported() {
        let g = graph(vec![inst("Gadget", json!({"uuid": "g1"}))]);
        let res = resolver().resolve(&g);
        assert_eq!(
            res.violations(),
            &[ReferenceViolation::UncataloguedKind { key: key("Gadget", "g1") }]
        );
    }

    #[test]
    fn referrers_of_lists_incoming_edges() {
        let g = graph(vec![
            inst("Cloud", json!({"uuid": "c1"})),
            inst("Pool", json!({"uuid": "p1", "cloud_ref": "c1"})),
            inst("Pool", json!({"uuid": "p2", "cloud_ref": "c1"})),
        ]);
        let res = resolver().resolve(&g);
        let cloud = key("Cloud", "c1");
        let from: Vec<String> = res.referrers_of(&cloud).map(|e| e.from.to_string()).collect();
        assert_eq!(from, vec!["Pool/p1", "Pool/p2"]);
        assert_eq!(res.references_from(&key("Pool", "p1")).count(), 1);
    }

    #[test]
    fn violation_display_names_the_path() {
        let v = ReferenceViolation::Dangling {
            from: key("Pool", "p1"),
            field_path: "/cloud_ref".into(),
            target: "cloud-9".into(),
            expected: vec![KindName::new("Cloud")],
        };
        assert_eq!(v.to_string(), "Pool/p1/cloud_ref: dangling reference 'cloud-9'");
    }
}
