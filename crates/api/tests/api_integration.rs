//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Address, Money};
use inventory::NewProduct;
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{NewOrder, OrderItem};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn setup() -> Arc<AppState> {
    api::create_state(&Config::default(), get_metrics_handle())
        .await
        .unwrap()
}

async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = api::create_app(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_health_reports_listening_handlers() {
    let state = setup().await;

    let (status, body) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(
        json["subscriptions"],
        state.services.subscriptions().len() as u64
    );
    assert!(json["subscriptions"].as_u64().unwrap() > 0);
    assert_eq!(json["pending_outbox"], 0);
}

#[tokio::test]
async fn test_health_degrades_when_bus_closes() {
    let state = setup().await;
    state.bus.close().await;

    let (status, body) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "degraded");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_metrics_endpoint_exposes_saga_counters() {
    let state = setup().await;
    state
        .services
        .inventory()
        .create_product(NewProduct::new("SKU-100", "Lamp", Money::from_cents(1500), 3))
        .await
        .unwrap();

    let address = Address {
        street: "9 Elm St".into(),
        city: "Portland".into(),
        state: "OR".into(),
        zip_code: "97201".into(),
        country: "US".into(),
    };
    state
        .services
        .orders()
        .create_order(
            NewOrder::new("user-7", address)
                .with_item(OrderItem::new("SKU-100", "Lamp", Money::from_cents(1500), 1)),
        )
        .await
        .unwrap();

    let (status, body) = get(&state, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("orders_created_total"), "metrics output: {text}");
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let state = setup().await;

    let (status, _) = get(&state, "/orders").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
