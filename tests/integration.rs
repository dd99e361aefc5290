//! End-to-end tests over the library API: schema creation, batch ingest,
//! hybrid retrieval, the RAG short-circuit guard, and the upload adapter.
//! Exercises the public crate surface directly against a tempfile-backed
//! SQLite store rather than shelling out to the CLI binary.

use aconex_rag::config::Config;
use aconex_rag::embedder::Embedder;
use aconex_rag::ingest;
use aconex_rag::migrate;
use aconex_rag::rag::{self, HistoryTurn};
use aconex_rag::retrieve;
use aconex_rag::sqlite_store::SqliteStore;
use aconex_rag::upload;
use tempfile::TempDir;

fn test_config(tmp: &TempDir) -> Config {
    let mut config = Config::default();
    config.store.url = format!("sqlite://{}", tmp.path().join("test.db").display());
    config
}

async fn fresh_store(config: &Config) -> SqliteStore {
    migrate::run_migrations(config).await.unwrap();
    let pool = aconex_rag::db::connect(config).await.unwrap();
    SqliteStore::new(pool)
}

#[tokio::test]
async fn init_creates_expected_tables() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    migrate::run_migrations(&config).await.unwrap();

    let pool = aconex_rag::db::connect(&config).await.unwrap();
    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(&pool)
            .await
            .unwrap();

    for expected in ["documents", "document_chunks", "chat_feedback"] {
        assert!(
            tables.iter().any(|t| t == expected),
            "expected table {} in {:?}",
            expected,
            tables
        );
    }
}

#[tokio::test]
async fn ingest_then_search_finds_lexical_match() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = fresh_store(&config).await;
    let embedder = Embedder::new(config.embedding.clone());

    let input = r#"[
        {"document_id": "doc-1", "project_id": "p1", "title": "Electrical Panel Schedule",
         "number": "E-100", "full_text": "Main switchboard rated for 400 amps, located in room 12."},
        {"document_id": "doc-2", "project_id": "p1", "title": "Plumbing Riser Diagram",
         "number": "P-200", "full_text": "Domestic cold water supply routed through the mechanical shaft."}
    ]"#;

    let records = ingest::parse_records(input).unwrap();
    let report = ingest::run_ingest(&store, &embedder, &config, records, "p1", 10)
        .await
        .unwrap();
    assert_eq!(report.documents.len(), 2);
    assert!(report.chunks_written > 0);

    let outcome = retrieve::retrieve(&store, &embedder, &config, "switchboard amps", Some("p1"), 5, config.retrieval.ann_probes)
        .await
        .unwrap();

    assert!(!outcome.rows.is_empty());
    assert_eq!(outcome.rows[0].document_id, "doc-1");
}

#[tokio::test]
async fn reingesting_the_same_record_does_not_duplicate_chunks() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = fresh_store(&config).await;
    let embedder = Embedder::new(config.embedding.clone());

    let input = r#"{"document_id": "doc-1", "project_id": "p1", "title": "Spec A", "full_text": "reinforced concrete footing detail"}"#;

    let first = ingest::run_ingest(&store, &embedder, &config, ingest::parse_records(input).unwrap(), "p1", 10)
        .await
        .unwrap();
    let second = ingest::run_ingest(&store, &embedder, &config, ingest::parse_records(input).unwrap(), "p1", 10)
        .await
        .unwrap();

    assert_eq!(first.chunks_written, second.chunks_written);

    let outcome = retrieve::retrieve(&store, &embedder, &config, "reinforced concrete footing", Some("p1"), 10, config.retrieval.ann_probes)
        .await
        .unwrap();
    let matches = outcome.rows.iter().filter(|r| r.document_id == "doc-1").count();
    assert_eq!(matches, 1, "one document should appear once regardless of re-ingestion");
}

#[tokio::test]
async fn chat_short_circuits_when_nothing_is_relevant() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = fresh_store(&config).await;
    let embedder = Embedder::new(config.embedding.clone());

    let answer = rag::answer(&store, &embedder, &config, "what is the weather today", &[] as &[HistoryTurn], 5, None)
        .await
        .unwrap();

    assert!(answer.sources.is_empty());
    assert!(answer.context_used.is_empty());
}

#[tokio::test]
async fn upload_txt_file_is_retrievable() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = fresh_store(&config).await;
    let embedder = Embedder::new(config.embedding.clone());

    let bytes = b"Fire suppression system inspected and certified on site visit.".to_vec();
    let result = upload::upload(&store, &embedder, &config, bytes, "inspection-notes.txt", None, "p1")
        .await
        .unwrap();

    assert!(result.chunks_created > 0);
    assert_eq!(result.project_id, "p1");

    let outcome = retrieve::retrieve(&store, &embedder, &config, "fire suppression certified", Some("p1"), 5, config.retrieval.ann_probes)
        .await
        .unwrap();
    assert!(outcome.rows.iter().any(|r| r.document_id == result.document_id));
}

#[test]
fn config_loads_defaults_when_file_is_absent() {
    let config = aconex_rag::config::load_config(std::path::Path::new("/nonexistent/path.toml")).unwrap();
    assert_eq!(config.chunking.chunk_size, 500);
    assert_eq!(config.retrieval.vector_weight, 0.6);
}
