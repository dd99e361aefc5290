//! Ingestor (C5): orchestrates normalize → chunk → embed → store in
//! batches, idempotently (§4.5).

use std::collections::HashMap;

use crate::chunk::{split_text, stable_chunk_id};
use crate::config::Config;
use crate::embedder::Embedder;
use crate::models::{Chunk, Document, RawRecord};
use crate::normalize;
use crate::store::Store;

/// One record plus, for uploads, the original bytes to persist alongside
/// its normalized document (§4.9 step 5). Batch-file ingestion never sets
/// `file_content`; the upload adapter always does.
pub struct RawBatchItem {
    pub raw: RawRecord,
    pub file_content: Option<Vec<u8>>,
}

impl From<RawRecord> for RawBatchItem {
    fn from(raw: RawRecord) -> Self {
        Self {
            raw,
            file_content: None,
        }
    }
}

#[derive(Default)]
pub struct BatchReport {
    pub documents: Vec<Document>,
    pub chunks_written: usize,
    pub embeddings_written: usize,
    pub skipped: Vec<String>,
}

/// Runs one pass of §4.5's batch algorithm: normalize, dedupe by
/// `document_id` keeping the last occurrence, chunk, upsert documents in
/// one transaction, embed every chunk text in a single batched call, then
/// insert chunks with conflict-ignore. An embedder failure for the whole
/// batch leaves every chunk lexical-only rather than failing the batch —
/// documents persist either way (§4.5 step 7, §7).
pub async fn ingest_batch(
    store: &dyn Store,
    embedder: &Embedder,
    config: &Config,
    items: Vec<RawBatchItem>,
    default_project_id: &str,
) -> anyhow::Result<BatchReport> {
    let mut report = BatchReport::default();

    let mut doc_batch: HashMap<String, Document> = HashMap::new();
    let mut bodies: HashMap<String, String> = HashMap::new();

    for item in items {
        match normalize::normalize(item.raw, default_project_id) {
            Ok(mut normalized) => {
                if let Some(bytes) = item.file_content {
                    normalized.document.file_content = Some(bytes);
                }
                bodies.insert(normalized.document.document_id.clone(), normalized.body_text);
                doc_batch.insert(normalized.document.document_id.clone(), normalized.document);
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping record that failed normalization");
                report.skipped.push(e.to_string());
            }
        }
    }

    if doc_batch.is_empty() {
        return Ok(report);
    }

    let documents: Vec<Document> = doc_batch.into_values().collect();

    let mut pending_chunks: Vec<Chunk> = Vec::new();
    for doc in &documents {
        let body = bodies.get(&doc.document_id).cloned().unwrap_or_default();
        for piece in split_text(&body, config.chunking.chunk_size, config.chunking.chunk_overlap) {
            let chunk_id = stable_chunk_id(&doc.document_id, &piece);
            pending_chunks.push(Chunk {
                chunk_id,
                document_id: doc.document_id.clone(),
                project_id: doc.project_id.clone(),
                title: doc.title.clone(),
                date_modified: doc.date_modified,
                content: piece,
                embedding: None,
            });
        }
    }

    store.upsert_documents(&documents).await?;
    report.documents = documents;

    if pending_chunks.is_empty() {
        return Ok(report);
    }

    if embedder.is_enabled() {
        let texts: Vec<String> = pending_chunks.iter().map(|c| c.content.clone()).collect();
        match embedder.encode(&texts).await {
            Ok(vectors) => {
                for (chunk, vector) in pending_chunks.iter_mut().zip(vectors) {
                    chunk.embedding = Some(vector);
                }
                report.embeddings_written = pending_chunks.len();
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "embedder unavailable for this batch, inserting lexical-only chunks"
                );
            }
        }
    }

    store.insert_chunks(&pending_chunks).await?;
    report.chunks_written = pending_chunks.len();

    Ok(report)
}

/// Parses an ingestion payload per §6.4: a JSON array, a single JSON
/// object, or newline-delimited JSON, detected by attempting full-document
/// parse first and falling back to line-by-line.
pub fn parse_records(input: &str) -> anyhow::Result<Vec<RawRecord>> {
    if let Ok(records) = serde_json::from_str::<Vec<RawRecord>>(input) {
        return Ok(records);
    }
    if let Ok(record) = serde_json::from_str::<RawRecord>(input) {
        return Ok(vec![record]);
    }

    let mut records = Vec::new();
    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        records.push(serde_json::from_str::<RawRecord>(line)?);
    }
    Ok(records)
}

/// Runs the full batch-oriented sync used by the CLI `ingest` command:
/// split records into fixed-size batches and run [`ingest_batch`] on each,
/// continuing past a failed batch rather than aborting the whole stream
/// (§4.5 step 7: "report the failure; continue with the next batch").
pub async fn run_ingest(
    store: &dyn Store,
    embedder: &Embedder,
    config: &Config,
    records: Vec<RawRecord>,
    default_project_id: &str,
    batch_size: usize,
) -> anyhow::Result<BatchReport> {
    let mut total = BatchReport::default();

    for batch in records.chunks(batch_size.max(1)) {
        let items: Vec<RawBatchItem> = batch.iter().cloned().map(RawBatchItem::from).collect();
        match ingest_batch(store, embedder, config, items, default_project_id).await {
            Ok(report) => {
                total.documents.extend(report.documents);
                total.chunks_written += report.chunks_written;
                total.embeddings_written += report.embeddings_written;
                total.skipped.extend(report.skipped);
            }
            Err(e) => {
                tracing::error!(error = %e, "batch ingest failed, continuing with next batch");
            }
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_records_detects_json_array() {
        let input = r#"[{"document_id": "a"}, {"document_id": "b"}]"#;
        let records = parse_records(input).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn parse_records_detects_single_object() {
        let input = r#"{"document_id": "a"}"#;
        let records = parse_records(input).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn parse_records_detects_ndjson() {
        let input = "{\"document_id\": \"a\"}\n{\"document_id\": \"b\"}\n";
        let records = parse_records(input).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn parse_records_ignores_blank_lines_in_ndjson() {
        let input = "{\"document_id\": \"a\"}\n\n{\"document_id\": \"b\"}\n";
        let records = parse_records(input).unwrap();
        assert_eq!(records.len(), 2);
    }
}
