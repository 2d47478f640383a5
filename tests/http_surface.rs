use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use gpudash::config::{AuthConfig, Config};
use gpudash::server::{AppState, router};

fn test_router() -> (Arc<AppState>, Router) {
    let state = Arc::new(AppState::new(Config::default()));
    let app = router(state.clone());
    (state, app)
}

async fn get_json(app: Router, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().uri(uri);
    if let Some(token) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let response = app
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn index_lists_routes_matching_detected_devices() {
    let (state, app) = test_router();
    let (status, index) = get_json(app, "/index.json", None).await;
    assert_eq!(status, StatusCode::OK);

    let index = index.as_object().unwrap();
    assert_eq!(index["/cpu_resource"], "Machine Resources");

    if state.gpu.is_none() {
        assert!(
            !index.keys().any(|k| k.contains("gpu") || k.contains("pci") || k.contains("nvlink")),
            "GPU routes must be absent without a device registry"
        );
    } else {
        assert!(index.contains_key("/gpu_utilization"));
        assert!(index.contains_key("/gpu_usage"));
        assert!(index.contains_key("/gpu_resource"));
    }
}

#[tokio::test]
async fn cpu_resource_get_returns_one_full_tick() {
    let (_state, app) = test_router();
    let (status, tick) = get_json(app, "/cpu_resource", None).await;
    assert_eq!(status, StatusCode::OK);

    for key in [
        "time",
        "cpu_utilization",
        "memory_usage",
        "disk_read",
        "disk_write",
        "network_read",
        "network_write",
    ] {
        assert!(tick.get(key).is_some(), "missing key {key}");
    }
    assert!(tick["time"].as_f64().unwrap() > 0.0);
    assert!(tick["disk_read"].as_f64().unwrap() >= 0.0);
    assert!(tick["network_write"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn single_get_reports_counter_rates_as_zero() {
    let (_state, app) = test_router();
    let (status, tick) = get_json(app, "/cpu_resource", None).await;
    assert_eq!(status, StatusCode::OK);

    // A one-shot read has no counter baseline to diff against.
    for key in ["disk_read", "disk_write", "network_read", "network_write"] {
        assert_eq!(tick[key], 0.0, "{key} must have no baseline on a single GET");
    }
    assert!(tick["time"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (_state, app) = test_router();
    let (status, _) = get_json(app, "/temperature", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn undetected_gpu_endpoints_are_404_not_errors() {
    let (state, app) = test_router();
    if state.gpu.is_some() {
        return; // exercised on machines without a GPU
    }
    for route in ["/gpu_utilization", "/gpu_resource", "/pci_stats", "/nvlink_throughput"] {
        let (status, _) = get_json(app.clone(), route, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{route}");
    }
}

#[tokio::test]
async fn history_starts_empty_and_serves_an_array() {
    let (_state, app) = test_router();
    let (status, points) = get_json(app, "/cpu_resource/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(points.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn configured_token_gates_every_route() {
    let config = Config {
        auth: AuthConfig {
            token: Some("s3cret".to_string()),
        },
        ..Config::default()
    };
    let state = Arc::new(AppState::new(config));
    let app = router(state);

    let (status, body) = get_json(app.clone(), "/index.json", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized access");

    let (status, _) = get_json(app.clone(), "/cpu_resource", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get_json(app.clone(), "/index.json", Some("s3cret")).await;
    assert_eq!(status, StatusCode::OK);

    // Token in the query string works for browser WebSocket clients.
    let (status, _) = get_json(app, "/cpu_resource?token=s3cret", None).await;
    assert_eq!(status, StatusCode::OK);
}
