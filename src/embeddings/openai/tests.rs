use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_DIMENSION: usize = 64;

fn test_provider(base_url: &str) -> ProviderConfig {
    ProviderConfig {
        base_url: base_url.to_string(),
        model: "text-embedding-3-small".to_string(),
        embedding_dimension: TEST_DIMENSION as u32,
        api_key_env: "OPENAI_API_KEY".to_string(),
        timeout_seconds: 5,
    }
}

fn test_client(server: &MockServer) -> EmbeddingClient {
    EmbeddingClient::new(&test_provider(&format!("{}/v1", server.uri())), "sk-test".to_string())
        .expect("Failed to create client")
}

fn vector(seed: f32) -> Vec<f32> {
    let mut embedding = vec![0.25; TEST_DIMENSION];
    embedding[0] = seed;
    embedding
}

#[test]
fn client_configuration() {
    let client = EmbeddingClient::new(
        &test_provider("https://api.example.com/v1"),
        "sk-test".to_string(),
    )
    .expect("Failed to create client");

    assert_eq!(client.model(), "text-embedding-3-small");
    assert_eq!(client.dimension(), TEST_DIMENSION);
    assert_eq!(
        client.endpoint().as_str(),
        "https://api.example.com/v1/embeddings"
    );
    assert_eq!(client.max_tokens, DEFAULT_MAX_TOKENS);
    assert_eq!(client.with_max_tokens(100).max_tokens, 100);
}

#[test]
fn client_rejects_invalid_provider() {
    let mut provider = test_provider("https://api.example.com/v1");
    provider.model = String::new();
    assert!(EmbeddingClient::new(&provider, "sk-test".to_string()).is_err());
}

#[test]
fn debug_output_hides_api_key() {
    let client = EmbeddingClient::new(
        &test_provider("https://api.example.com/v1"),
        "sk-secret-value".to_string(),
    )
    .expect("Failed to create client");

    let rendered = format!("{:?}", client);
    assert!(rendered.contains("text-embedding-3-small"));
    assert!(!rendered.contains("sk-secret-value"));
}

#[test]
fn error_message_extraction() {
    assert_eq!(
        provider_message(
            401,
            r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#
        ),
        "HTTP 401: Incorrect API key provided"
    );
    assert_eq!(provider_message(502, "<html>bad gateway</html>"), "HTTP 502");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn embed_one_sends_normalized_single_input() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": "Hello world",
            "encoding_format": "float"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": vector(0.9)}],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 2, "total_tokens": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let embedding = tokio::task::spawn_blocking(move || client.embed_one("  Hello\n\nworld \n"))
        .await
        .expect("blocking task completes")
        .expect("embedding succeeds");

    assert_eq!(embedding, vector(0.9));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn embed_batch_preserves_input_order() {
    let server = MockServer::start().await;

    // items come back out of order; each vector encodes its input index
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"input": ["a", "b", "c"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 2, "embedding": vector(2.0)},
                {"index": 0, "embedding": vector(0.0)},
                {"index": 1, "embedding": vector(1.0)}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let embeddings = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("blocking task completes")
        .expect("batch succeeds");

    assert_eq!(embeddings.len(), 3);
    for (i, embedding) in embeddings.iter().enumerate() {
        assert_eq!(embedding[0], i as f32);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_input_never_reaches_provider() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let (single, batch, empty_batch) = tokio::task::spawn_blocking(move || {
        (
            client.embed_one(" \n\n "),
            client.embed_batch(&["ok".to_string(), "\n".to_string()]),
            client.embed_batch(&[]),
        )
    })
    .await
    .expect("blocking task completes");

    assert_eq!(single, Err(EmbeddingError::EmptyInput));
    assert_eq!(batch, Err(EmbeddingError::EmptyInput));
    assert_eq!(empty_batch, Ok(Vec::new()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn provider_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit reached", "type": "requests"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = tokio::task::spawn_blocking(move || client.embed_one("retry me?"))
        .await
        .expect("blocking task completes");

    assert_eq!(
        result,
        Err(EmbeddingError::Provider(
            "HTTP 429: Rate limit reached".to_string()
        ))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_responses_are_provider_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"input": "short vector"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [0.1, 0.2, 0.3]}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"input": ["one", "two"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": vector(0.0)}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"input": "not json"})))
        .respond_with(ResponseTemplate::new(200).set_body_string("definitely not json"))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let (wrong_dimension, wrong_count, garbage) = tokio::task::spawn_blocking(move || {
        (
            client.embed_one("short vector"),
            client.embed_batch(&["one".to_string(), "two".to_string()]),
            client.embed_one("not json"),
        )
    })
    .await
    .expect("blocking task completes");

    assert!(matches!(wrong_dimension, Err(EmbeddingError::Provider(msg)) if msg.contains("dimension")));
    assert!(matches!(wrong_count, Err(EmbeddingError::Provider(msg)) if msg.contains("Mismatch")));
    assert!(matches!(garbage, Err(EmbeddingError::Provider(msg)) if msg.contains("parse")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn out_of_range_components_are_provider_errors() {
    let server = MockServer::start().await;

    // 1e39 does not fit in an f32 and decodes as infinity
    let mut components = vec!["0.25".to_string(); TEST_DIMENSION];
    components[3] = "1e39".to_string();
    let body = format!(
        r#"{{"data": [{{"index": 0, "embedding": [{}]}}]}}"#,
        components.join(", ")
    );

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = tokio::task::spawn_blocking(move || client.embed_one("overflowing vector"))
        .await
        .expect("blocking task completes");

    assert!(matches!(result, Err(EmbeddingError::Provider(msg)) if msg.contains("infinite")));
}

#[test]
fn non_finite_components_are_rejected() {
    let client = EmbeddingClient::new(
        &test_provider("http://localhost:1/v1"),
        "sk-test".to_string(),
    )
    .expect("Failed to create client");

    for poison in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
        let mut tainted = vector(0.5);
        tainted[TEST_DIMENSION - 1] = poison;
        let data = vec![
            EmbeddingData {
                index: 1,
                embedding: tainted,
            },
            EmbeddingData {
                index: 0,
                embedding: vector(0.1),
            },
        ];

        let result = client.ordered_vectors(data, 2);
        assert!(
            matches!(&result, Err(EmbeddingError::Provider(msg)) if msg.starts_with("Embedding 1 ")),
            "{poison} should be rejected, got {result:?}"
        );
    }

    let clean = vec![EmbeddingData {
        index: 0,
        embedding: vector(0.1),
    }];
    assert_eq!(
        client.ordered_vectors(clean, 1).expect("finite vector"),
        vec![vector(0.1)]
    );
}

#[test]
fn transport_failure_is_a_provider_error() {
    // nothing listens on port 9 of localhost
    let client = EmbeddingClient::new(
        &test_provider("http://127.0.0.1:9/v1"),
        "sk-test".to_string(),
    )
    .expect("Failed to create client");

    assert!(matches!(
        client.embed_one("unreachable"),
        Err(EmbeddingError::Provider(_))
    ));
}
