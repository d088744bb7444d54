//! Integration test: resolve references of graphs built from validated
//! payloads against the repository catalog.

use std::path::PathBuf;
use std::sync::Arc;

use kindex_core::{ApiVersion, Instance, InstanceKey};
use kindex_graph::{apply_order, ConfigGraph, ConfigGraphBuilder, ReferenceResolver, ReferenceViolation};
use kindex_schema::{EditionContext, InstanceValidator, SchemaCatalog};
use proptest::prelude::*;
use serde_json::{json, Value};

fn repo_root() -> PathBuf {
    let mut dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    dir.pop(); // crates/
    dir.pop(); // repo root
    dir
}

fn catalog() -> Arc<SchemaCatalog> {
    Arc::new(SchemaCatalog::load_path(repo_root().join("catalog/lb.catalog.yaml")).unwrap())
}

fn validated(validator: &InstanceValidator, kind: &str, payload: Value) -> Instance {
    let ctx = EditionContext::new(["enterprise"], ApiVersion::new(22, 1, 1));
    let report = validator.validate(kind, &payload, &ctx);
    assert!(report.is_valid(), "{report}");
    report.into_instance().unwrap()
}

fn sample_graph(catalog: &Arc<SchemaCatalog>) -> ConfigGraph {
    let v = InstanceValidator::new(Arc::clone(catalog));
    let mut builder = ConfigGraphBuilder::new();
    builder.extend([
        validated(&v, "Tenant", json!({"uuid": "tenant-admin", "name": "admin"})),
        validated(&v, "Cloud", json!({"uuid": "cloud-default", "name": "Default-Cloud",
            "tenant_ref": "https://ctl/api/tenant/tenant-admin#admin"})),
        validated(&v, "HealthMonitor", json!({"uuid": "hm-tcp", "name": "tcp", "type": "HEALTH_MONITOR_TCP"})),
        validated(&v, "Pool", json!({"uuid": "pool-web", "name": "web",
            "cloud_ref": "/api/cloud/cloud-default",
            "health_monitor_refs": ["hm-tcp"],
            "servers": [{"ip": {"addr": "10.0.0.1", "type": "V4"}, "port": 80}]})),
        validated(&v, "VsVip", json!({"uuid": "vsvip-web", "name": "web-vip",
            "vip": [{"vip_id": "0", "ip_address": {"addr": "10.1.0.1", "type": "V4"}}]})),
        validated(&v, "VirtualService", json!({"uuid": "vs-web", "name": "web",
            "vsvip_ref": "vsvip-web", "pool_ref": "/api/pool?name=web",
            "services": [{"port": 80}]})),
    ]);
    builder.build()
}

#[test]
fn sample_configuration_resolves_completely() {
    let catalog = catalog();
    let graph = sample_graph(&catalog);
    let res = ReferenceResolver::new(Arc::clone(&catalog)).resolve(&graph);
    assert!(res.is_complete(), "{:?}", res.violations());
    assert_eq!(res.edges().len(), 5);

    let order = apply_order(&graph, &res);
    assert!(order.is_acyclic());
    let pos = |kind: &str, id: &str| {
        let key = InstanceKey::new(kind.into(), id.into());
        order.order.iter().position(|k| k == &key).unwrap()
    };
    assert!(pos("Tenant", "tenant-admin") < pos("Cloud", "cloud-default"));
    assert!(pos("Cloud", "cloud-default") < pos("Pool", "pool-web"));
    assert!(pos("Pool", "pool-web") < pos("VirtualService", "vs-web"));
    assert!(pos("VsVip", "vsvip-web") < pos("VirtualService", "vs-web"));
}

#[test]
fn removing_a_target_leaves_one_dangling_reference() {
    let catalog = catalog();
    let graph = sample_graph(&catalog);
    let resolver = ReferenceResolver::new(Arc::clone(&catalog));
    let cloud = InstanceKey::new("Cloud".into(), "cloud-default".into());

    let before = resolver.resolve(&graph);
    let referrers: Vec<String> = before.referrers_of(&cloud).map(|e| e.from.to_string()).collect();
    assert_eq!(referrers, vec!["Pool/pool-web"]);

    let mut builder = graph.to_builder();
    builder.remove(&cloud);
    let after = resolver.resolve(&builder.build());
    assert_eq!(after.violations().len(), 1);
    assert!(matches!(
        &after.violations()[0],
        ReferenceViolation::Dangling { from, field_path, .. }
            if from.to_string() == "Pool/pool-web" && field_path == "/cloud_ref"
    ));
    // The original snapshot is untouched.
    assert!(resolver.resolve(&graph).is_complete());
}

#[test]
fn resolution_is_idempotent() {
    let catalog = catalog();
    let graph = sample_graph(&catalog);
    let resolver = ReferenceResolver::new(catalog);
    assert_eq!(resolver.resolve(&graph), resolver.resolve(&graph));
}

proptest! {
    /// A pool group whose members point at pools: every member
    /// reference with a present pool becomes an edge, every absent one is
    /// reported exactly once.
    #[test]
    fn every_reference_is_edge_or_violation(
        present in prop::collection::btree_set(0u8..20, 0..10),
        wanted in prop::collection::vec(0u8..20, 0..15),
    ) {
        let catalog = catalog();
        let mut builder = ConfigGraphBuilder::new();
        let v = InstanceValidator::new(Arc::clone(&catalog));
        for p in &present {
            builder.insert(validated(&v, "Pool", json!({"uuid": format!("pool-{p}"), "name": format!("p{p}")})));
        }
        let members: Vec<Value> = wanted
            .iter()
            .map(|w| json!({"pool_ref": format!("pool-{w}")}))
            .collect();
        builder.insert(validated(&v, "PoolGroup", json!({"uuid": "pg", "name": "pg", "members": members})));
        let graph = builder.build();

        let res = ReferenceResolver::new(catalog).resolve(&graph);
        let expected_edges = wanted.iter().filter(|w| present.contains(*w)).count();
        prop_assert_eq!(res.edges().len(), expected_edges);
        prop_assert_eq!(res.violations().len(), wanted.len() - expected_edges);
        for violation in res.violations() {
            let is_dangling = matches!(violation, ReferenceViolation::Dangling { .. });
            prop_assert!(is_dangling);
        }
    }
}
