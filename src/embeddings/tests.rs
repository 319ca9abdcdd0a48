use super::*;
use crate::config::{API_KEY_ENV, EmbeddingConfig};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn test_config(base_url: &str) -> EmbeddingConfig {
    EmbeddingConfig {
        base_url: base_url.to_string(),
        model: "test-embed".to_string(),
        batch_size: 2,
        cooldown_ms: 0,
        api_key: Some("test-key".to_string()),
    }
}

fn item(index: usize, embedding: Vec<f32>) -> EmbeddingItem {
    EmbeddingItem { index, embedding }
}

#[test]
fn restore_order_from_permuted_batch() {
    // Service answered [C, A, B] for submitted [A, B, C].
    let items = vec![
        item(2, vec![3.0]),
        item(0, vec![1.0]),
        item(1, vec![2.0]),
    ];
    let ordered = restore_batch_order(items, 3).expect("should reorder");
    assert_eq!(ordered, vec![vec![1.0], vec![2.0], vec![3.0]]);
}

#[test]
fn reject_wrong_count() {
    let items = vec![item(0, vec![1.0])];
    assert!(restore_batch_order(items, 2).is_err());
}

#[test]
fn reject_out_of_range_index() {
    let items = vec![item(0, vec![1.0]), item(5, vec![2.0])];
    assert!(restore_batch_order(items, 2).is_err());
}

#[test]
fn reject_duplicate_index() {
    let items = vec![item(0, vec![1.0]), item(0, vec![2.0])];
    assert!(restore_batch_order(items, 2).is_err());
}

#[test]
fn missing_credentials_fail_before_any_request() {
    if std::env::var(API_KEY_ENV).is_ok() {
        return;
    }

    let config = EmbeddingConfig {
        api_key: None,
        ..test_config("http://localhost:9")
    };
    assert!(EmbeddingClient::new(&config).is_err());
}

/// Answers each batch with deterministic vectors derived from the input
/// texts, deliberately permuted to exercise order restoration over the wire.
struct PermutedEmbeddings;

impl Respond for PermutedEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).expect("valid request body");
        let inputs = body["input"].as_array().expect("input array");

        let mut data: Vec<serde_json::Value> = inputs
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let len = text.as_str().expect("string input").len() as f32;
                serde_json::json!({ "index": index, "embedding": [len, 1.0] })
            })
            .collect();
        data.reverse();

        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": data }))
    }
}

#[tokio::test]
async fn embeds_texts_in_submission_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EMBEDDINGS_PATH))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(PermutedEmbeddings)
        .expect(2) // 3 texts at batch size 2
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&test_config(&server.uri())).expect("client");
    let texts: Vec<String> = ["a", "bb", "ccc"].iter().map(ToString::to_string).collect();

    let vectors = tokio::task::spawn_blocking(move || client.embed_texts(&texts))
        .await
        .expect("task")
        .expect("embedding should succeed");

    assert_eq!(vectors, vec![vec![1.0, 1.0], vec![2.0, 1.0], vec![3.0, 1.0]]);
}

#[tokio::test]
async fn empty_input_issues_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EMBEDDINGS_PATH))
        .respond_with(PermutedEmbeddings)
        .expect(0)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&test_config(&server.uri())).expect("client");
    let vectors = tokio::task::spawn_blocking(move || client.embed_texts(&[]))
        .await
        .expect("task")
        .expect("empty input is fine");
    assert!(vectors.is_empty());
}

#[tokio::test]
async fn failed_batch_aborts_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EMBEDDINGS_PATH))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&test_config(&server.uri())).expect("client");
    let texts: Vec<String> = ["a", "bb", "ccc"].iter().map(ToString::to_string).collect();

    let err = tokio::task::spawn_blocking(move || client.embed_texts(&texts))
        .await
        .expect("task")
        .expect_err("non-success response must be fatal");

    // The error identifies which batch failed.
    assert!(format!("{err:#}").contains("batch 1/2"));
}

#[tokio::test]
async fn query_embedding_uses_same_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EMBEDDINGS_PATH))
        .respond_with(PermutedEmbeddings)
        .expect(1)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&test_config(&server.uri())).expect("client");
    let vector = tokio::task::spawn_blocking(move || client.embed_query("taper length"))
        .await
        .expect("task")
        .expect("query embedding should succeed");
    assert_eq!(vector, vec![12.0, 1.0]);
}
