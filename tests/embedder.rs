use std::time::Duration;

use masters_advisor::embedder::{OpenAiEmbedderConfig, DEFAULT_EMBED_MODEL};
use masters_advisor::retry::RetryPolicy;
use masters_advisor::{EmbedError, Embedder, OpenAiEmbedder};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn embedder(server: &MockServer, batch_size: usize) -> OpenAiEmbedder {
    OpenAiEmbedder::new(OpenAiEmbedderConfig {
        api_key: "sk-test".into(),
        base_url: format!("{}/v1", server.uri()),
        model: DEFAULT_EMBED_MODEL.into(),
        dimensions: None,
        timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        },
        batch_size,
    })
    .unwrap()
}

fn inputs(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[tokio::test]
async fn restores_input_order_from_indexes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": DEFAULT_EMBED_MODEL,
            "input": ["первый", "второй"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let vectors = embedder(&server, 16)
        .embed(&inputs(&["первый", "второй"]))
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn splits_inputs_into_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"input": ["a", "b"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0]}, {"index": 1, "embedding": [2.0]}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"input": ["c"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [3.0]}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let vectors = embedder(&server, 2)
        .embed(&inputs(&["a", "b", "c"]))
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0]]);
}

#[tokio::test]
async fn retries_rate_limits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [0.5, 0.5]}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let vector = embedder(&server, 8).embed_query("вопрос").await.unwrap();
    assert_eq!(vector, vec![0.5, 0.5]);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let err = embedder(&server, 8)
        .embed(&inputs(&["x"]))
        .await
        .unwrap_err();
    match err {
        EmbedError::Status { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad key");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn short_responses_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0]}]
        })))
        .mount(&server)
        .await;

    let err = embedder(&server, 8)
        .embed(&inputs(&["x", "y"]))
        .await
        .unwrap_err();
    match err {
        EmbedError::CountMismatch { expected, got } => assert_eq!((expected, got), (2, 1)),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn duplicate_indexes_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 0, "embedding": [1.0]},
                {"index": 0, "embedding": [2.0]},
                {"index": 2, "embedding": [3.0]}
            ]
        })))
        .mount(&server)
        .await;

    let err = embedder(&server, 8)
        .embed(&inputs(&["x", "y", "z"]))
        .await
        .unwrap_err();
    match err {
        EmbedError::IndexMismatch { expected, got } => assert_eq!((expected, got), (1, 0)),
        other => panic!("unexpected error: {other}"),
    }
}
