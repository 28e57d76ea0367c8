use super::handler::ValueService;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::Value as Json;
use shardpool::{
    Kind, MemoryRegistry, MemoryStore, PartitionRefiller, PoolAllocator, ScriptedSource,
    UniquenessRegistry, Value, ValueSpace, ValueStore,
};
use tower::ServiceExt;

/// One integer partition holding `keys` and one empty float partition.
/// Refills only draw a value that is already taken.
fn app(keys: &[u64]) -> (Router, ValueService<MemoryRegistry, ScriptedSource>) {
    let space = ValueSpace::default();
    let registry = MemoryRegistry::in_memory(&space);
    let ints = MemoryStore::in_memory(0, Kind::Int, &space);
    let values: Vec<_> = keys.iter().copied().map(Value::Int).collect();
    for value in &values {
        registry.reserve(value).unwrap();
    }
    ints.bulk_insert(&values).unwrap();
    registry.reserve(&Value::Int(u64::MAX)).unwrap();

    let refiller = PartitionRefiller::new(registry, ScriptedSource::new([Value::Int(u64::MAX)]));
    let pool = PoolAllocator::builder(refiller)
        .partition(ints)
        .partition(MemoryStore::in_memory(1, Kind::Float, &space))
        .build()
        .unwrap();
    let service = ValueService::new(pool);
    (service.clone().router(), service)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Option<String>, Json) {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, retry_after, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn random_serves_each_value_once() {
    let (router, service) = app(&[7, 42, 99]);

    let mut served = Vec::new();
    for _ in 0..3 {
        let (status, _, body) = get(&router, "/random?type=int").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["partition"], 0);
        assert_eq!(body["kind"], "int");
        served.push(body["value"].as_u64().unwrap());
    }
    served.sort_unstable();
    assert_eq!(served, vec![7, 42, 99]);

    let (status, retry_after, body) = get(&router, "/random?type=int").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(retry_after.as_deref(), Some("1"));
    assert_eq!(body["retryable"], true);
    assert_eq!(
        body["detail"],
        "Partition 0 is empty. Refilling, try again later."
    );
    service.pool().wait_for_refills().await;
}

#[tokio::test]
async fn empty_float_partition_is_unavailable() {
    let (router, service) = app(&[1]);
    let (status, _, body) = get(&router, "/random?type=float").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["detail"].as_str().unwrap().contains("Partition 1"));
    service.pool().wait_for_refills().await;

    // Still empty: the scripted source has nothing fresh to offer.
    let (status, _, _) = get(&router, "/random?type=float").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    service.pool().wait_for_refills().await;
}

#[tokio::test]
async fn unknown_type_is_a_bad_request() {
    let (router, _) = app(&[1]);
    let (status, retry_after, body) = get(&router, "/random?type=double").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(retry_after, None);
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn type_is_optional() {
    let (router, _) = app(&[5]);
    let (status, _, body) = get(&router, "/random").await;
    // Either the lone integer or the empty float partition answers.
    match status {
        StatusCode::OK => assert_eq!(body["value"], 5),
        StatusCode::SERVICE_UNAVAILABLE => assert_eq!(body["retryable"], true),
        other => panic!("unexpected status {other}"),
    }
}

#[tokio::test]
async fn stats_and_health_report_the_pool() {
    let (router, _) = app(&[1, 2]);
    let (status, _, _) = get(&router, "/random?type=int").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = get(&router, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["partitions"][0]["state"], "active");
    assert_eq!(body["partitions"][0]["unconsumed"], 1);
    assert_eq!(body["partitions"][0]["total"], 2);
    assert_eq!(body["partitions"][1]["kind"], "float");
    assert_eq!(body["registry"][0]["kind"], "int");
    assert_eq!(body["registry"][0]["reserved"], 3);

    let (status, _, body) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_partitions"], 2);
}
