//! Push relay and history table clients against a local HTTP stub.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::json;

use hookwatch::config::{HistoryConfig, PushConfig};
use hookwatch::error::Error;
use hookwatch::history::{HistoryStore, MemoryHistoryStore, RestHistoryStore};
use hookwatch::notify::{AlertContext, Delivery, Notification, PushRelay};
use hookwatch::service::Services;
use hookwatch::store::MemoryStore;
use hookwatch::types::{AlertRecord, EpochClock};

use common::recording_server;

const ROWS: &str = r#"[
    {"device_id":"harness-1","title":"Harness unhooked","body":"b2","status":"unhooked","created_at":"2023-11-14T22:13:25.000+00:00"},
    {"device_id":"harness-1","title":"Harness unhooked","body":"b1","status":"unhooked","created_at":"2023-11-14T22:13:20.250Z"}
]"#;

fn relay(base_url: &str) -> PushRelay {
    PushRelay::new(
        reqwest::Client::new(),
        PushConfig {
            url: format!("{base_url}/push"),
            token: "device-token-1".into(),
        },
    )
}

fn history(base_url: &str) -> RestHistoryStore {
    RestHistoryStore::new(
        reqwest::Client::new(),
        HistoryConfig {
            base_url: base_url.to_owned(),
            api_key: "anon-key".into(),
            table: "alert_history".into(),
        },
    )
}

fn notification() -> Notification {
    Notification {
        title: "Harness unhooked".into(),
        body: "Both hooks on harness-1 have been detached for 5s.".into(),
        data: AlertContext::new("harness-1", "unhooked").with("reading_ts", 1_700_000_000_000u64),
    }
}

fn record() -> AlertRecord {
    AlertRecord {
        device_id: "harness-1".into(),
        status: "unhooked".into(),
        title: "Harness unhooked".into(),
        body: "b1".into(),
        delivered_at_ms: 1_700_000_000_250,
    }
}

fn is_status(err: &Error, service: &str, status: StatusCode) -> bool {
    matches!(err, Error::Status { service: s, status: st } if *s == service && *st == status)
}

#[tokio::test]
async fn push_posts_token_title_body_and_data() {
    let server = recording_server(StatusCode::OK, "").await;

    relay(&server.base_url).send(&notification()).await.unwrap();

    let requests = server.requests.lock();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.uri.path(), "/push");
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(
        request.json(),
        json!({
            "token": "device-token-1",
            "title": "Harness unhooked",
            "body": "Both hooks on harness-1 have been detached for 5s.",
            "data": {
                "device_id": "harness-1",
                "status": "unhooked",
                "reading_ts": 1_700_000_000_000u64,
            },
        })
    );
}

#[tokio::test]
async fn push_rejection_is_a_status_error() {
    let server = recording_server(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;

    let err = relay(&server.base_url).send(&notification()).await.unwrap_err();
    assert!(
        is_status(&err, "push relay", StatusCode::INTERNAL_SERVER_ERROR),
        "{err:?}"
    );
}

#[tokio::test]
async fn failed_push_is_counted_not_retried() {
    let server = recording_server(StatusCode::INTERNAL_SERVER_ERROR, "").await;
    let services = Services::from_parts(
        Arc::new(MemoryStore::new()),
        None,
        Some(relay(&server.base_url)),
        Arc::new(MemoryHistoryStore::new()),
        Duration::from_secs(10),
        EpochClock::new(),
    );

    let delivery = services
        .notifications()
        .notify("Harness unhooked", "body", AlertContext::new("harness-1", "unhooked"))
        .await;

    assert_eq!(
        delivery,
        Delivery::Attempted {
            delivered: 0,
            failed: 1
        }
    );
    assert_eq!(server.requests.lock().len(), 1);
}

#[tokio::test]
async fn history_insert_posts_authorized_row() {
    let server = recording_server(StatusCode::CREATED, "").await;

    history(&server.base_url).insert(&record()).await.unwrap();

    let requests = server.requests.lock();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.uri.path(), "/rest/v1/alert_history");
    assert_eq!(request.header("apikey"), Some("anon-key"));
    assert_eq!(request.header("authorization"), Some("Bearer anon-key"));
    assert_eq!(request.header("prefer"), Some("return=minimal"));

    let row = request.json();
    assert_eq!(row["device_id"], "harness-1");
    assert_eq!(row["status"], "unhooked");
    assert_eq!(row["title"], "Harness unhooked");
    assert_eq!(row["body"], "b1");
    let created_at = row["created_at"].as_str().unwrap();
    assert!(created_at.starts_with("2023-11-14T22:13:20.25"), "{created_at}");
}

#[tokio::test]
async fn history_query_is_newest_first_and_limited() {
    let server = recording_server(StatusCode::OK, ROWS).await;

    let records = history(&server.base_url).recent(2).await.unwrap();

    let requests = server.requests.lock();
    let request = &requests[0];
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.uri.path(), "/rest/v1/alert_history");
    assert_eq!(request.header("apikey"), Some("anon-key"));
    assert_eq!(request.header("authorization"), Some("Bearer anon-key"));
    let query = request.uri.query().unwrap();
    assert!(query.contains("order=created_at.desc"), "{query}");
    assert!(query.contains("limit=2"), "{query}");

    let bodies: Vec<_> = records.iter().map(|r| r.body.as_str()).collect();
    assert_eq!(bodies, ["b2", "b1"]);
    assert_eq!(records[1], record());
}

#[tokio::test]
async fn history_rejection_is_a_status_error() {
    let server = recording_server(StatusCode::INTERNAL_SERVER_ERROR, "").await;
    let store = history(&server.base_url);

    let err = store.insert(&record()).await.unwrap_err();
    assert!(
        is_status(&err, "history store", StatusCode::INTERNAL_SERVER_ERROR),
        "{err:?}"
    );

    let err = store.recent(5).await.unwrap_err();
    assert!(
        is_status(&err, "history store", StatusCode::INTERNAL_SERVER_ERROR),
        "{err:?}"
    );
}
