//! Integration test: multi-page fetches of repository-catalog kinds through
//! a file transport and a scripted transport.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kindex_collection::{
    drive, fetch_all, CollectionCodec, CollectionFetch, FetchError, FetchState, FileTransport,
    PageRequest, PageTransport, RetryPolicy, RetryingTransport, TransportError,
};
use kindex_core::{ApiVersion, KindName};
use kindex_graph::{ConfigGraphBuilder, ReferenceResolver};
use kindex_schema::{EditionContext, FieldDomain, InstanceValidator, SchemaCatalog};
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

fn ctx(edition: &str) -> EditionContext {
    EditionContext::new([edition], ApiVersion::new(22, 1, 1))
}

fn codec_for(edition: &str) -> CollectionCodec {
    CollectionCodec::new(InstanceValidator::new(catalog()), ctx(edition))
}

fn codec() -> CollectionCodec {
    codec_for("enterprise")
}

/// Values of the Pool enum `field` that `edition` permits.
fn permitted(field: &str, edition: &str) -> Vec<String> {
    let catalog = catalog();
    let spec = catalog.lookup("Pool").unwrap().field(field).unwrap();
    let FieldDomain::Enum(domain) = &spec.domain else {
        panic!("{field} is not an enum");
    };
    domain
        .values()
        .iter()
        .filter(|v| spec.edition_allows(&ctx(edition), &json!(v)))
        .cloned()
        .collect()
}

/// A page of Pools using only the enum values `edition` permits, some with
/// a vendor field the catalog does not declare.
fn pool_page(edition: &'static str) -> impl Strategy<Value = Value> {
    let element = (
        "[a-z][a-z0-9-]{0,12}",
        proptest::option::of(prop::sample::select(permitted("lb_algorithm", edition))),
        proptest::option::of(prop::sample::select(permitted("append_port", edition))),
        proptest::option::of("[a-z]{1,8}"),
    )
        .prop_map(|(name, algorithm, append_port, vendor)| {
            let mut pool = json!({"name": name});
            if let Some(a) = algorithm {
                pool["lb_algorithm"] = json!(a);
            }
            if let Some(p) = append_port {
                pool["append_port"] = json!(p);
            }
            if let Some(v) = vendor {
                pool["x_vendor_tag"] = json!(v);
            }
            pool
        });
    (
        prop::collection::vec(element, 0..5),
        0u64..100,
        proptest::option::of("c[0-9]{1,3}"),
    )
        .prop_map(|(results, more, next)| {
            let mut envelope = json!({"count": results.len() as u64 + more, "results": results});
            if let Some(cursor) = next {
                envelope["next"] = json!(cursor);
            }
            envelope
        })
}

fn pools(range: std::ops::Range<usize>) -> Vec<Value> {
    range
        .map(|i| json!({"uuid": format!("pool-{i}"), "name": format!("p{i}")}))
        .collect()
}

fn write_page(dir: &Path, file: &str, envelope: Value) {
    std::fs::write(dir.join(file), serde_json::to_vec(&envelope).unwrap()).unwrap();
}

/// Serves canned responses in order, regardless of the request.
struct Scripted {
    responses: VecDeque<Result<Value, TransportError>>,
    requests: Vec<PageRequest>,
}

impl Scripted {
    fn new(responses: Vec<Result<Value, TransportError>>) -> Self {
        Self {
            responses: responses.into(),
            requests: Vec::new(),
        }
    }
}

impl PageTransport for Scripted {
    fn fetch(&mut self, _kind: &KindName, request: &PageRequest) -> Result<Vec<u8>, TransportError> {
        self.requests.push(request.clone());
        match self.responses.pop_front() {
            Some(Ok(v)) => Ok(serde_json::to_vec(&v).unwrap()),
            Some(Err(e)) => Err(e),
            None => Err(TransportError::Fatal("script exhausted".into())),
        }
    }
}

#[test]
fn fifty_pools_over_two_pages() {
    let dir = tempfile::tempdir().unwrap();
    write_page(dir.path(), "Pool.json", json!({
        "count": 50, "results": pools(0..25), "next": "https://ctl/api/Pool.2.json"
    }));
    write_page(dir.path(), "Pool.2.json", json!({"count": 50, "results": pools(25..50)}));

    let codec = codec();
    let mut transport = FileTransport::new(dir.path());
    let collection = fetch_all(&mut transport, &codec, &"Pool".into(), 10).unwrap();

    assert_eq!(collection.count(), 50);
    assert_eq!(collection.elements().len(), 50);
    assert_eq!(collection.invalid().count(), 0);
    let ids: Vec<String> = collection.instances().map(|i| i.id().to_string()).collect();
    assert_eq!(ids.first().map(String::as_str), Some("pool-0"));
    assert_eq!(ids.last().map(String::as_str), Some("pool-49"));

    // Same snapshot, same result.
    let again = fetch_all(&mut transport, &codec, &"Pool".into(), 10).unwrap();
    assert_eq!(again, collection);
}

#[test]
fn transient_failure_is_retried_without_duplicates() {
    let scripted = Scripted::new(vec![
        Ok(json!({"count": 4, "results": pools(0..2), "next": "c2"})),
        Err(TransportError::Transient("connection reset".into())),
        Ok(json!({"count": 4, "results": pools(2..4)})),
    ]);
    let mut transport = RetryingTransport::new(scripted, RetryPolicy::immediate(2));
    let collection = fetch_all(&mut transport, &codec(), &"Pool".into(), 10).unwrap();
    assert_eq!(collection.elements().len(), 4);
    assert_eq!(
        transport.inner().requests,
        vec![
            PageRequest::First,
            PageRequest::Next("c2".into()),
            PageRequest::Next("c2".into()),
        ]
    );
}

#[test]
fn exhausted_retries_fail_the_fetch() {
    let scripted = Scripted::new(vec![
        Err(TransportError::Transient("timeout".into())),
        Err(TransportError::Transient("timeout".into())),
    ]);
    let mut transport = RetryingTransport::new(scripted, RetryPolicy::immediate(1));
    let err = fetch_all(&mut transport, &codec(), &"Pool".into(), 10).unwrap_err();
    assert!(matches!(err, FetchError::Transport { page: 1, .. }));
    assert!(err.is_resumable());
    assert_eq!(transport.inner().requests.len(), 2);
}

#[test]
fn fatal_failure_is_not_retried() {
    let scripted = Scripted::new(vec![Err(TransportError::Fatal("404".into()))]);
    let mut transport = RetryingTransport::new(scripted, RetryPolicy::immediate(3));
    let err = fetch_all(&mut transport, &codec(), &"Pool".into(), 10).unwrap_err();
    assert!(matches!(err, FetchError::Transport { source: TransportError::Fatal(_), .. }));
    assert!(!err.is_resumable());
    assert_eq!(transport.inner().requests.len(), 1);
}

#[test]
fn interrupted_fetch_resumes_at_the_last_cursor() {
    let pages = vec![
        Ok(json!({"count": 4, "results": pools(0..2), "next": "c2"})),
        Ok(json!({"count": 4, "results": pools(2..4)})),
    ];
    let codec = codec();
    let uninterrupted = fetch_all(&mut Scripted::new(pages.clone()), &codec, &"Pool".into(), 10).unwrap();

    let mut transport = Scripted::new(vec![
        pages[0].clone(),
        Err(TransportError::Transient("connection reset".into())),
        pages[1].clone(),
    ]);
    let mut fetch = CollectionFetch::new("Pool".into(), 10);
    let err = drive(&mut fetch, &mut transport, &codec).unwrap_err();
    assert!(matches!(err, FetchError::Transport { page: 2, .. }));
    assert_eq!(fetch.state(), &FetchState::Failed);

    fetch.resume().unwrap();
    assert_eq!(fetch.next_request(), Some(PageRequest::Next("c2".into())));
    drive(&mut fetch, &mut transport, &codec).unwrap();
    assert_eq!(fetch.finish().unwrap(), uninterrupted);
}

#[test]
fn undecodable_page_can_be_refetched() {
    let mut transport = Scripted::new(vec![
        Ok(json!({"results": []})),
        Ok(json!({"count": 1, "results": pools(0..1)})),
    ]);
    let codec = codec();
    let mut fetch = CollectionFetch::new("Pool".into(), 10);
    let err = drive(&mut fetch, &mut transport, &codec).unwrap_err();
    assert!(matches!(err, FetchError::Decode { page: 1, .. }));
    fetch.resume().unwrap();
    assert_eq!(fetch.next_request(), Some(PageRequest::First));
    drive(&mut fetch, &mut transport, &codec).unwrap();
    assert_eq!(fetch.finish().unwrap().elements().len(), 1);
}

#[test]
fn pagination_invariants_end_the_fetch() {
    let mut changed = Scripted::new(vec![
        Ok(json!({"count": 4, "results": pools(0..2), "next": "c2"})),
        Ok(json!({"count": 5, "results": pools(2..4)})),
    ]);
    let err = fetch_all(&mut changed, &codec(), &"Pool".into(), 10).unwrap_err();
    assert_eq!(err, FetchError::CountChanged { first: 4, now: 5, page: 2 });

    let mut looping = Scripted::new(vec![
        Ok(json!({"count": 9, "results": pools(0..1), "next": "c2"})),
        Ok(json!({"count": 9, "results": pools(1..2), "next": "c2"})),
    ]);
    let err = fetch_all(&mut looping, &codec(), &"Pool".into(), 10).unwrap_err();
    assert!(matches!(err, FetchError::CursorLoop { page: 2, .. }));

    let mut endless = Scripted::new(vec![
        Ok(json!({"count": 9, "results": pools(0..1), "next": "c2"})),
        Ok(json!({"count": 9, "results": pools(1..2), "next": "c3"})),
    ]);
    let err = fetch_all(&mut endless, &codec(), &"Pool".into(), 2).unwrap_err();
    assert_eq!(err, FetchError::PageLimit { limit: 2 });
}

#[test]
fn invalid_elements_are_kept_and_reported() {
    let mut transport = Scripted::new(vec![Ok(json!({
        "count": 3,
        "results": [
            {"uuid": "pool-ok", "name": "ok"},
            {"uuid": "pool-bad", "name": "bad", "ratio": 150},
            "not-an-object"
        ]
    }))]);
    let collection = fetch_all(&mut transport, &codec(), &"Pool".into(), 10).unwrap();
    assert_eq!(collection.elements().len(), 3);
    assert_eq!(collection.invalid().count(), 2);
    assert_eq!(collection.instances().count(), 2);
    assert_eq!(collection.elements()[2].raw(), Some(&json!("not-an-object")));
}

#[test]
fn fetched_collections_feed_the_graph() {
    let mut transport = Scripted::new(vec![Ok(json!({
        "count": 2,
        "results": [
            {"uuid": "hm-tcp", "name": "tcp", "type": "HEALTH_MONITOR_TCP"},
            {"uuid": "hm-http", "name": "http", "type": "HEALTH_MONITOR_HTTP"}
        ]
    }))]);
    let codec = codec();
    let monitors = fetch_all(&mut transport, &codec, &"HealthMonitor".into(), 10).unwrap();
    assert_eq!(monitors.invalid().count(), 0, "{:?}", monitors.elements());

    let mut transport = Scripted::new(vec![Ok(json!({
        "count": 1,
        "results": [{"uuid": "pool-web", "name": "web", "health_monitor_refs": ["hm-tcp", "hm-gone"]}]
    }))]);
    let pools = fetch_all(&mut transport, &codec, &"Pool".into(), 10).unwrap();

    let mut builder = ConfigGraphBuilder::new();
    assert_eq!(monitors.into_graph(&mut builder), 2);
    assert_eq!(pools.into_graph(&mut builder), 1);
    let graph = builder.build();
    assert_eq!(graph.len(), 3);

    let resolution = ReferenceResolver::new(catalog()).resolve(&graph);
    assert_eq!(resolution.edges().len(), 1);
    assert_eq!(resolution.violations().len(), 1);
}

proptest! {
    /// However a collection is split into pages, fetching it yields every
    /// element once, in order, and fetching twice gives the same result.
    #[test]
    fn any_page_split_yields_every_element_in_order(
        total in 0usize..40,
        page_size in 1usize..10,
    ) {
        let starts: Vec<usize> = (0..total).step_by(page_size).collect();
        let mut responses = Vec::new();
        for (n, start) in starts.iter().enumerate() {
            let mut envelope = json!({
                "count": total,
                "results": pools(*start..(start + page_size).min(total)),
            });
            if n + 1 < starts.len() {
                envelope["next"] = json!(format!("c{}", n + 2));
            }
            responses.push(Ok(envelope));
        }
        if responses.is_empty() {
            responses.push(Ok(json!({"count": 0, "results": []})));
        }

        let codec = codec();
        let mut first = Scripted::new(responses.clone());
        let mut second = Scripted::new(responses);
        let a = fetch_all(&mut first, &codec, &"Pool".into(), 100).unwrap();
        let b = fetch_all(&mut second, &codec, &"Pool".into(), 100).unwrap();

        let ids: Vec<String> = a.instances().map(|i| i.id().to_string()).collect();
        let expected: Vec<String> = (0..total).map(|i| format!("pool-{i}")).collect();
        prop_assert_eq!(ids, expected);
        prop_assert_eq!(a.count(), total as u64);
        prop_assert_eq!(a, b);
    }

    /// Encoding a decoded page and decoding it again gives the same page
    /// under every edition, defaults and unknown fields included, and every
    /// instance still validates under the edition that produced it.
    #[test]
    fn decode_encode_round_trip_per_edition(
        (edition, envelope) in prop::sample::select(vec!["enterprise", "essentials", "basic"])
            .prop_flat_map(|e| (Just(e), pool_page(e)))
    ) {
        let codec = codec_for(edition);
        let page = codec.decode_value("Pool", &envelope).unwrap();
        prop_assert!(page.elements().iter().all(|e| e.is_valid()), "{:?}", page.elements());
        for instance in page.instances() {
            let again = codec.validator().revalidate(instance, codec.context());
            prop_assert!(again.is_valid(), "{}", again);
        }

        let bytes = codec.encode(&page).unwrap();
        prop_assert_eq!(codec.decode("Pool", &bytes).unwrap(), page);
    }
}
