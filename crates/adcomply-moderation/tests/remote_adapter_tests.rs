//! Remote inference adapter against a mock model server

use adcomply_core::{CampaignArtifact, Error, ModerationCategory};
use adcomply_moderation::{ModerationAdapter, RemoteModelAdapter};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> RemoteModelAdapter {
    RemoteModelAdapter::new(
        ModerationCategory::Toxicity,
        format!("{}/v1/score", server.uri()),
        Duration::from_secs(2),
    )
    .unwrap()
}

#[tokio::test]
async fn test_remote_score() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/score"))
        .and(body_partial_json(serde_json::json!({"category": "toxicity"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "scores": [0.83],
            "model_version": "tox-2024-06"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let score = adapter(&server)
        .score(&CampaignArtifact::new("a", "facebook", "copy"))
        .await
        .unwrap();
    assert!((score - 0.83).abs() < 1e-6);
}

#[tokio::test]
async fn test_remote_batch_preserves_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/score"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"scores": [0.1, 0.9]})))
        .mount(&server)
        .await;

    let a = CampaignArtifact::new("a", "facebook", "first");
    let b = CampaignArtifact::new("b", "facebook", "second");
    let scores = adapter(&server).score_batch(&[&a, &b]).await.unwrap();
    assert_eq!(scores, vec![0.1, 0.9]);
}

#[tokio::test]
async fn test_remote_server_error_is_model_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .score(&CampaignArtifact::new("a", "facebook", "copy"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ModelUnavailable { .. }));
}

#[tokio::test]
async fn test_remote_score_count_mismatch_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"scores": []})))
        .mount(&server)
        .await;

    let result = adapter(&server)
        .score(&CampaignArtifact::new("a", "facebook", "copy"))
        .await;
    assert!(result.is_err());
}
