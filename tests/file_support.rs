//! Tests for the upload adapter's multi-format support (PDF, DOCX, TXT, JSON)
//! and its rejection paths (§4.9).

use aconex_rag::config::Config;
use aconex_rag::embedder::Embedder;
use aconex_rag::error::AppError;
use aconex_rag::migrate;
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

fn minimal_docx_with_text(phrase: &str) -> Vec<u8> {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
            phrase
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

#[tokio::test]
async fn docx_upload_is_extracted_and_retrievable() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = fresh_store(&config).await;
    let embedder = Embedder::new(config.embedding.clone());

    let bytes = minimal_docx_with_text("office compliance certificate phrase");
    let result = upload::upload(&store, &embedder, &config, bytes, "spec.docx", None, "p1")
        .await
        .unwrap();

    assert!(result.chunks_created > 0);
    assert_eq!(result.project_id, "p1");

    let outcome = retrieve::retrieve(
        &store,
        &embedder,
        &config,
        "office compliance certificate",
        Some("p1"),
        5,
        config.retrieval.ann_probes,
    )
    .await
    .unwrap();
    assert!(outcome.rows.iter().any(|r| r.document_id == result.document_id));
}

#[tokio::test]
async fn corrupt_pdf_upload_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = fresh_store(&config).await;
    let embedder = Embedder::new(config.embedding.clone());

    let err = upload::upload(&store, &embedder, &config, b"not a real pdf".to_vec(), "bad.pdf", None, "p1")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ValidationFailure(_)));
}

#[tokio::test]
async fn invalid_docx_zip_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = fresh_store(&config).await;
    let embedder = Embedder::new(config.embedding.clone());

    let err = upload::upload(&store, &embedder, &config, b"not a zip".to_vec(), "bad.docx", None, "p1")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ValidationFailure(_)));
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = fresh_store(&config).await;
    let embedder = Embedder::new(config.embedding.clone());

    let err = upload::upload(&store, &embedder, &config, b"irrelevant".to_vec(), "sheet.xlsx", None, "p1")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::UnsupportedFormat(_)));
}

#[tokio::test]
async fn json_upload_is_pretty_printed_and_retrievable() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = fresh_store(&config).await;
    let embedder = Embedder::new(config.embedding.clone());

    let bytes = br#"{"note": "hydraulic pressure test passed at 150 psi"}"#.to_vec();
    let result = upload::upload(&store, &embedder, &config, bytes, "notes.json", None, "p1")
        .await
        .unwrap();
    assert!(result.chunks_created > 0);

    let outcome = retrieve::retrieve(&store, &embedder, &config, "hydraulic pressure test", Some("p1"), 5, config.retrieval.ann_probes)
        .await
        .unwrap();
    assert!(outcome.rows.iter().any(|r| r.document_id == result.document_id));
}

#[tokio::test]
async fn upload_and_query_answers_from_the_uploaded_document() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    let store = fresh_store(&config).await;
    let embedder = Embedder::new(config.embedding.clone());

    let bytes = minimal_docx_with_text("annual fire alarm inspection completed successfully");
    let (upload_result, answer) = upload::upload_and_query(
        &store,
        &embedder,
        &config,
        bytes,
        "fire-alarm-report.docx",
        "when was the fire alarm inspected",
        None,
        "p1",
    )
    .await
    .unwrap();

    assert!(upload_result.chunks_created > 0);
    assert!(!answer.sources.is_empty());
}
