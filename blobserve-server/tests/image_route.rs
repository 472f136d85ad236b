//! Router-level tests against the in-memory store

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use tower::ServiceExt;

use blobserve_server::{MemoryLobStore, ShutdownReason};
use common::{app, body_bytes, capture_logs, get, jpeg_bytes, settle};

#[tokio::test]
async fn serves_payload_as_jpeg() {
    let payload = jpeg_bytes(10_000);
    let store = Arc::new(MemoryLobStore::new().with_row(2, Some(payload.clone())));
    let (app, trigger) = app(store.clone(), 1024);

    let response = get(&app, "/getimage").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "10000");
    assert_eq!(body_bytes(response).await.to_vec(), payload);

    assert_eq!(store.stats().acquired, 1);
    assert_eq!(store.stats().released, 1);
    assert!(trigger.reason().is_none());
}

#[tokio::test]
async fn serves_empty_payload() {
    let store = Arc::new(MemoryLobStore::new().with_row(2, Some(Vec::new())));
    let (app, _) = app(store.clone(), 1024);

    let response = get(&app, "/getimage").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.is_empty());
    assert_eq!(store.stats().outstanding(), 0);
}

#[tokio::test]
async fn missing_row_is_404_and_releases() {
    let store = Arc::new(MemoryLobStore::new());
    let (app, _) = app(store.clone(), 1024);
    let (logs, _guard) = capture_logs();

    let response = get(&app, "/getimage").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(logs.contents().contains("No data selected from table."));
    let stats = store.stats();
    assert_eq!(stats.acquired, 1);
    assert_eq!(stats.released, 1);
}

#[tokio::test]
async fn null_payload_is_404_and_releases() {
    let store = Arc::new(MemoryLobStore::new().with_row(2, None));
    let (app, _) = app(store.clone(), 1024);
    let (logs, _guard) = capture_logs();

    let response = get(&app, "/getimage").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let logs = logs.contents();
    assert!(logs.contains("BLOB was NULL"));
    assert!(!logs.contains("No data selected from table."));
    let stats = store.stats();
    assert_eq!(stats.acquired, 1);
    assert_eq!(stats.released, 1);
}

#[tokio::test]
async fn lookup_failure_is_500_and_releases() {
    let store = Arc::new(MemoryLobStore::new().with_row(2, Some(vec![1])).fail_lookups());
    let (app, trigger) = app(store.clone(), 1024);

    let response = get(&app, "/getimage").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(store.stats().released, 1);
    assert!(trigger.reason().is_none());
}

#[tokio::test]
async fn release_failure_does_not_mask_missing_row() {
    let store = Arc::new(MemoryLobStore::new().fail_release());
    let (app, _) = app(store.clone(), 1024);

    let response = get(&app, "/getimage").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(store.stats().released, 1);
}

#[tokio::test]
async fn mid_stream_error_aborts_body_and_triggers_shutdown() {
    let store = Arc::new(
        MemoryLobStore::new()
            .with_row(2, Some(jpeg_bytes(4096)))
            .fail_reads_from(2048),
    );
    let (app, trigger) = app(store.clone(), 1024);

    let response = get(&app, "/getimage").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());

    assert_eq!(store.stats().released, 1);
    assert!(matches!(
        trigger.reason(),
        Some(ShutdownReason::StreamError(_))
    ));
}

#[tokio::test]
async fn mid_stream_error_can_leave_server_running() {
    let store = Arc::new(
        MemoryLobStore::new()
            .with_row(2, Some(jpeg_bytes(4096)))
            .fail_reads_from(0),
    );
    let trigger = blobserve_server::ShutdownTrigger::new();
    let payload = blobserve_server::PayloadConfig::new(Default::default(), 1024).unwrap();
    let mut state =
        blobserve_server::http::AppState::new(store.clone(), payload, common::PORT, trigger.clone());
    state.abort_on_stream_error = false;
    let app = blobserve_server::http::build_router(state);

    let response = get(&app, "/getimage").await;
    assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());

    assert_eq!(store.stats().released, 1);
    assert!(trigger.reason().is_none());
}

#[tokio::test]
async fn dropped_response_releases_session() {
    let store = Arc::new(MemoryLobStore::new().with_row(2, Some(jpeg_bytes(4096))));
    let (app, trigger) = app(store.clone(), 1024);

    let response = get(&app, "/getimage").await;
    drop(response);
    settle().await;

    let stats = store.stats();
    assert_eq!(stats.acquired, 1);
    assert_eq!(stats.released, 1);
    assert!(trigger.reason().is_none());
}

#[tokio::test]
async fn every_request_releases_its_session() {
    let store = Arc::new(MemoryLobStore::new().with_row(2, Some(jpeg_bytes(3000))));
    let (app, _) = app(store.clone(), 512);

    for _ in 0..5 {
        let response = get(&app, "/getimage").await;
        body_bytes(response).await;
    }
    store.put(2, None);
    get(&app, "/getimage").await;
    settle().await;

    let stats = store.stats();
    assert_eq!(stats.acquired, 6);
    assert_eq!(stats.acquired, stats.released);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_pool_is_503() {
    let store = Arc::new(
        MemoryLobStore::with_capacity(1)
            .acquire_timeout(std::time::Duration::from_millis(100))
            .with_row(2, Some(jpeg_bytes(100))),
    );
    let (app, _) = app(store.clone(), 1024);

    // Hold the only session with an unread body.
    let first = get(&app, "/getimage").await;
    let second = get(&app, "/getimage").await;

    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_bytes(first).await.len(), 100);
    assert_eq!(store.stats().outstanding(), 0);
}

#[tokio::test]
async fn other_paths_get_plain_text_hint() {
    let store = Arc::new(MemoryLobStore::new());
    let (app, _) = app(store.clone(), 1024);

    for uri in ["/", "/favicon.ico", "/getimage/extra", "/nope?x=1"] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let body = body_bytes(response).await;
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("7000"));
        assert!(text.contains("/getimage"));
    }

    assert_eq!(store.stats().acquired, 0);
}

#[tokio::test]
async fn hint_is_byte_identical_across_requests() {
    let (app, _) = app(Arc::new(MemoryLobStore::new()), 1024);

    let first = body_bytes(get(&app, "/").await).await;
    for _ in 0..3 {
        assert_eq!(body_bytes(get(&app, "/anything").await).await, first);
    }
}

#[tokio::test]
async fn other_methods_on_image_path_get_hint() {
    let store = Arc::new(MemoryLobStore::new().with_row(2, Some(vec![1, 2, 3])));
    let (app, _) = app(store.clone(), 1024);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/getimage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(store.stats().acquired, 0);
}
