//! Upload API integration tests.
//!
//! Run with: `cargo test -p intake-api --test uploads_test`

mod helpers;

use bytes::Bytes;
use helpers::{api_path, setup_test_app, wait_for_completion};

#[tokio::test]
async fn test_upload_then_status_completes() {
    let app = setup_test_app().await;
    let client = app.client();
    let payload = vec![b'a'; 1024];

    let create_res = client
        .post(&api_path("/uploads"))
        .add_header("X-Upload-Size", "1024")
        .bytes(Bytes::from(payload))
        .await;
    assert_eq!(create_res.status_code(), 201, "create upload");
    let created: serde_json::Value = create_res.json();
    let id = created["id"].as_str().expect("id in response").to_string();
    let hash = created["hash"].as_str().expect("hash in response").to_string();
    assert!(hash.starts_with("Qm"));

    let status = wait_for_completion(client, &id).await;
    let state = &status["state"];
    assert_eq!(state["id"].as_str(), Some(id.as_str()));
    assert_eq!(state["size"].as_u64(), Some(1024));
    assert_eq!(state["uploaded"].as_u64(), Some(1024));
    assert_eq!(state["hash"].as_str(), Some(hash.as_str()));
    assert!(state["started"].as_str().is_some());

    let workflow_res = client
        .get(&api_path(&format!("/uploads/{}/workflow", id)))
        .await;
    assert_eq!(workflow_res.status_code(), 200, "workflow status");
    let workflow: serde_json::Value = workflow_res.json();
    assert_eq!(workflow["overall"].as_str(), Some("succeeded"));
    let steps = workflow["steps"].as_array().expect("steps array");
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0]["name"].as_str(), Some("intake.store"));
    assert_eq!(steps[1]["name"].as_str(), Some("intake.scan"));
    assert!(steps.iter().all(|s| s["status"].as_str() == Some("succeeded")));
}

#[tokio::test]
async fn test_identical_content_has_identical_hash() {
    let app = setup_test_app().await;
    let client = app.client();

    let mut hashes = Vec::new();
    for _ in 0..2 {
        let res = client
            .post(&api_path("/uploads"))
            .add_header("X-Upload-Size", "5")
            .bytes(Bytes::from_static(b"hello"))
            .await;
        assert_eq!(res.status_code(), 201);
        let body: serde_json::Value = res.json();
        wait_for_completion(client, body["id"].as_str().unwrap()).await;
        hashes.push(body["hash"].as_str().unwrap().to_string());
    }
    assert_eq!(hashes[0], hashes[1]);
}

#[tokio::test]
async fn test_unknown_upload_returns_404() {
    let app = setup_test_app().await;
    let res = app
        .client()
        .get(&api_path(&format!("/uploads/{}/status", uuid::Uuid::new_v4())))
        .await;
    assert_eq!(res.status_code(), 404);
    let body: serde_json::Value = res.json();
    assert!(body.get("code").and_then(|v| v.as_str()).is_some());
    assert_eq!(body.get("recoverable").and_then(|v| v.as_bool()), Some(false));
}

#[tokio::test]
async fn test_malformed_upload_id_returns_400() {
    let app = setup_test_app().await;
    let res = app
        .client()
        .get(&api_path("/uploads/not-a-uuid/status"))
        .await;
    assert_eq!(res.status_code(), 400);
}

#[tokio::test]
async fn test_zero_declared_size_rejected() {
    let app = setup_test_app().await;
    let res = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("X-Upload-Size", "0")
        .bytes(Bytes::from_static(b"data"))
        .await;
    assert_eq!(res.status_code(), 400);
}

#[tokio::test]
async fn test_size_mismatch_rejected_and_not_tracked() {
    let app = setup_test_app().await;
    let res = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("X-Upload-Size", "100")
        .bytes(Bytes::from_static(b"only ten b"))
        .await;
    assert_eq!(res.status_code(), 400);
    assert!(app.state.protocol.tracker().is_empty());
}

#[tokio::test]
async fn test_health_check() {
    let app = setup_test_app().await;
    let res = app.client().get("/health").await;
    assert_eq!(res.status_code(), 200);
    let body: serde_json::Value = res.json();
    assert_eq!(body["status"].as_str(), Some("healthy"));
    assert_eq!(body["database"].as_str(), Some("healthy"));
}
