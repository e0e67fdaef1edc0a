//! HTTP-level tests for the registration API.

use std::net::{IpAddr, Ipv4Addr};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use tower::ServiceExt;

use warden_policy::OverrideTable;
use warden_server::registration::routes;
use warden_server::{ProcessedResponse, Registration};

async fn send(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn batch_is_installed() {
    let overrides = OverrideTable::new();
    let app = routes(overrides.clone());

    let (status, body) = send(
        app,
        "POST",
        "/",
        r#"[{"addr":"db.lan","ip":"10.0.0.5"},{"addr":"cache.lan","ip":"10.0.0.6"}]"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let response: ProcessedResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(response, ProcessedResponse { processed: 2 });
    assert_eq!(
        overrides.get("db.lan"),
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)))
    );
    assert_eq!(
        overrides.get("cache.lan"),
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 6)))
    );
}

#[tokio::test]
async fn existing_binding_is_overwritten() {
    let overrides = OverrideTable::new();
    overrides.insert("db.lan", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));

    let (status, _) = send(
        routes(overrides.clone()),
        "POST",
        "/",
        r#"[{"addr":"db.lan","ip":"10.0.0.9"}]"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        overrides.get("db.lan"),
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)))
    );
}

#[tokio::test]
async fn empty_batch_processes_nothing() {
    let (status, body) = send(routes(OverrideTable::new()), "POST", "/", "[]").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"processed":0}"#);
}

#[tokio::test]
async fn invalid_entry_rejects_whole_batch() {
    let overrides = OverrideTable::new();

    let (status, body) = send(
        routes(overrides.clone()),
        "POST",
        "/",
        r#"[{"addr":"a","ip":"1.1.1.1"},{"addr":"","ip":"2.2.2.2"}]"#,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "missing host address on index 2 of input");
    assert!(overrides.is_empty());
}

#[tokio::test]
async fn missing_fields_are_reported() {
    let overrides = OverrideTable::new();

    let (status, body) = send(
        routes(overrides.clone()),
        "POST",
        "/",
        r#"[{"addr":"a.lan"}]"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "missing IP address on index 1 of input");

    let (status, body) = send(
        routes(overrides.clone()),
        "POST",
        "/",
        r#"[{"addr":"a.lan","ip":"1.1.1.1"},{"addr":"b.lan","ip":"256.1.1.1"}]"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("index 2"));
    assert!(overrides.is_empty());
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let (status, body) = send(routes(OverrideTable::new()), "POST", "/", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with("unable to parse request:"));
}

#[tokio::test]
async fn other_methods_are_rejected() {
    let (status, body) = send(routes(OverrideTable::new()), "PUT", "/", "[]").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "PUT method not supported");
}

#[tokio::test]
async fn list_reflects_live_table() {
    let overrides = OverrideTable::new();
    let app = routes(overrides.clone());

    let (_, body) = send(app.clone(), "GET", "/list", "").await;
    let listed: Vec<Registration> = serde_json::from_str(&body).unwrap();
    assert!(listed.is_empty());

    send(
        app.clone(),
        "POST",
        "/",
        r#"[{"addr":"b.lan","ip":"10.0.0.2"},{"addr":"a.lan","ip":"::1"}]"#,
    )
    .await;

    let (status, body) = send(app, "GET", "/list", "").await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<Registration> = serde_json::from_str(&body).unwrap();
    assert_eq!(
        listed,
        vec![
            Registration {
                addr: "a.lan".to_string(),
                ip: "::1".to_string(),
            },
            Registration {
                addr: "b.lan".to_string(),
                ip: "10.0.0.2".to_string(),
            },
        ]
    );
}
