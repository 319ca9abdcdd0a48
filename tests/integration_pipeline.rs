//! End-to-end pipeline test: corpus files on disk, a mock embedding
//! service, a full ingestion run, then queries and the coverage gate
//! against the persisted index.

use plan_grounding::chunker::ChunkingConfig;
use plan_grounding::config::{Config, CorpusConfig, EmbeddingConfig};
use plan_grounding::coverage::{MIN_RELEVANCE_SCORE, assess_coverage};
use plan_grounding::embeddings::{EMBEDDINGS_PATH, EmbeddingClient};
use plan_grounding::ingest::{Ingestor, PlainTextExtractor};
use plan_grounding::retriever::{LoadedIndex, run_query};
use plan_grounding::store::IndexStore;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};
use wiremock::matchers::{method, path};

/// Deterministic stand-in for the embedding model: one dimension per marker
/// term, counting occurrences. Texts sharing vocabulary get high cosine
/// similarity, disjoint texts get zero. Batches are returned permuted to
/// make sure order restoration is exercised end to end.
const MARKERS: [&str; 6] = ["taper", "sign", "spacing", "cone", "flagger", "arrow"];

struct KeywordEmbeddings;

impl Respond for KeywordEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).expect("valid request body");
        let inputs = body["input"].as_array().expect("input array");

        let mut data: Vec<serde_json::Value> = inputs
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let lower = text.as_str().expect("string input").to_lowercase();
                let vector: Vec<f32> = MARKERS
                    .iter()
                    .map(|marker| lower.matches(marker).count() as f32)
                    .collect();
                serde_json::json!({ "index": index, "embedding": vector })
            })
            .collect();
        data.reverse();

        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": data }))
    }
}

fn test_config(base: &Path, server_uri: &str) -> Config {
    Config {
        embedding: EmbeddingConfig {
            base_url: server_uri.to_string(),
            model: "test-embed".to_string(),
            batch_size: 3,
            cooldown_ms: 0,
            api_key: Some("test-key".to_string()),
        },
        chunking: ChunkingConfig::default(),
        corpus: CorpusConfig {
            handbook_dir: base.join("corpus/handbooks"),
            example_dir: base.join("corpus/examples"),
            index_dir: base.join("index"),
        },
        base_dir: base.to_path_buf(),
    }
}

/// A ~2600 character document: two chunks under the default 2000-char
/// window with 400-char overlap.
fn two_chunk_document(sentence: &str) -> String {
    let mut text = String::new();
    while text.len() < 2600 {
        text.push_str(sentence);
    }
    text
}

fn write_corpus(base: &Path) {
    let handbook = two_chunk_document(
        "The merging taper length shall be computed from speed, and advance \
         warning sign spacing follows Table 6C-2 of this handbook chapter. ",
    );
    let example = two_chunk_document(
        "Crews placed each cone along the shoulder while the flagger held \
         traffic behind the arrow board during the night operation window. ",
    );

    fs::create_dir_all(base.join("corpus/handbooks")).expect("handbook dir");
    fs::create_dir_all(base.join("corpus/examples")).expect("example dir");
    fs::write(base.join("corpus/handbooks/mutcd-part6.txt"), handbook).expect("handbook doc");
    fs::write(base.join("corpus/examples/route-9-closure.txt"), example).expect("example doc");
}

#[tokio::test]
async fn ingest_then_query_then_gate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EMBEDDINGS_PATH))
        .respond_with(KeywordEmbeddings)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let base = dir.path().to_path_buf();
    write_corpus(&base);
    let config = test_config(&base, &server.uri());

    tokio::task::spawn_blocking(move || {
        let client = EmbeddingClient::new(&config.embedding).expect("client");
        let ingestor = Ingestor::new(&config, PlainTextExtractor, client);
        let stats = ingestor.run().expect("ingestion");

        assert_eq!(stats.documents_processed, 2);
        assert_eq!(stats.documents_skipped, 0);
        assert_eq!(stats.chunks_created, 4);
        assert_eq!(stats.embeddings_generated, 4);

        let store = IndexStore::new(&config.corpus.index_dir);
        let index = LoadedIndex::load(&store).expect("load index");

        let index_stats = index.stats();
        assert_eq!(index_stats.total_chunks, 4);
        assert_eq!(index_stats.handbook_chunks, 2);
        assert_eq!(index_stats.example_chunks, 2);
        assert_eq!(index_stats.unique_docs, 2);

        let client = EmbeddingClient::new(&config.embedding).expect("client");

        // A query close to the handbook content must rank handbook evidence
        // above example evidence.
        let response =
            run_query(&index, &client, "taper length and sign spacing", 1).expect("query");
        assert_eq!(response.handbooks.len(), 1);
        assert_eq!(response.examples.len(), 1);
        assert!(response.handbooks[0].score > response.examples[0].score);
        assert!(response.handbooks[0].id.starts_with("handbook-mutcd-part6-"));
        assert!(response.examples.iter().all(|r| r.id.starts_with("example-")));

        // Provenance survived ingestion and the round trip through the store.
        assert_eq!(
            response.handbooks[0].section_or_figure.as_deref(),
            Some("Table 6C-2")
        );

        // The gate passes: strong top score and both topics supported.
        let topics = vec!["taper".to_string(), "sign spacing".to_string()];
        let verdict = assess_coverage(&response.handbooks, &topics);
        assert!(verdict.sufficient, "verdict was {verdict:?}");
        assert!(verdict.missing.is_empty());
        assert!(verdict.detail.top_score.expect("top score") > MIN_RELEVANCE_SCORE);

        // A query about material the corpus does not cover embeds to a
        // zero vector under the keyword model, scores the minimum, and the
        // gate refuses with the unsupported topics listed.
        let response =
            run_query(&index, &client, "pavement marking removal", 3).expect("query");
        let topics = vec!["pavement marking".to_string()];
        let verdict = assess_coverage(&response.handbooks, &topics);
        assert!(!verdict.sufficient);
        assert_eq!(verdict.missing, topics);
    })
    .await
    .expect("pipeline task");
}
