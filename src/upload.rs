//! Upload adapter (C9): accept file bytes, extract text, chunk + embed +
//! persist via the Ingestor, and (for upload-and-query) immediately serve
//! retrieval scoped first to the freshly-inserted document (§4.9).

use std::collections::HashMap;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::AppError;
use crate::extract::{self, ExtractError};
use crate::ingest::{self, RawBatchItem};
use crate::models::RawRecord;
use crate::rag::{self, HistoryTurn, RagAnswer};
use crate::retrieve;
use crate::store::Store;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "docx", "json"];

pub struct UploadResult {
    pub document_id: String,
    pub chunks_created: usize,
    pub text_length: usize,
    pub project_id: String,
    pub title: String,
}

fn extension_of(filename: &str) -> Option<String> {
    let ext = filename.rsplit('.').next()?;
    if ext == filename {
        None
    } else {
        Some(ext.to_lowercase())
    }
}

fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "pdf" => extract::MIME_PDF,
        "docx" => extract::MIME_DOCX,
        _ => "",
    }
}

/// Extracts plain text from uploaded bytes by dispatching on the filename
/// extension (§4.9 step 2). TXT passes through verbatim; JSON is
/// pretty-printed as text; PDF/DOCX go through [`extract::extract_text`].
fn extract_text(bytes: &[u8], ext: &str) -> Result<String, AppError> {
    match ext {
        "txt" => String::from_utf8(bytes.to_vec())
            .map_err(|e| AppError::ValidationFailure(format!("invalid UTF-8: {}", e))),
        "json" => {
            let value: serde_json::Value = serde_json::from_slice(bytes)
                .map_err(|e| AppError::ValidationFailure(format!("invalid JSON: {}", e)))?;
            serde_json::to_string_pretty(&value).map_err(|e| AppError::ValidationFailure(e.to_string()))
        }
        "pdf" | "docx" => extract::extract_text(bytes, mime_for_extension(ext)).map_err(|e| match e {
            ExtractError::UnsupportedContentType(ct) => AppError::UnsupportedFormat(ct),
            ExtractError::Pdf(m) | ExtractError::Ooxml(m) => AppError::ValidationFailure(m),
        }),
        other => Err(AppError::UnsupportedFormat(other.to_string())),
    }
}

/// Deterministic document id for an upload: `(filename, first 100 chars of
/// text, current instant)` (§4.9 step 4) — hashed rather than concatenated
/// raw so it's a safe document_id regardless of filename contents.
fn upload_document_id(filename: &str, text: &str) -> String {
    let prefix: String = text.chars().take(100).collect();
    let now = Utc::now().to_rfc3339();
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update(prefix.as_bytes());
    hasher.update(now.as_bytes());
    format!("upload-{:x}", hasher.finalize())
}

pub async fn upload(
    store: &dyn Store,
    embedder: &Embedder,
    config: &Config,
    bytes: Vec<u8>,
    filename: &str,
    metadata: Option<serde_json::Value>,
    default_project_id: &str,
) -> Result<UploadResult, AppError> {
    let ext =
        extension_of(filename).ok_or_else(|| AppError::UnsupportedFormat("no file extension".to_string()))?;
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(AppError::UnsupportedFormat(ext));
    }

    let text = extract_text(&bytes, &ext)?;
    if text.trim().chars().count() < 10 {
        return Err(AppError::EmptyDocument);
    }

    let document_id = upload_document_id(filename, &text);

    let mut fields: HashMap<String, serde_json::Value> = metadata
        .and_then(|v| v.as_object().cloned())
        .map(|m| m.into_iter().collect())
        .unwrap_or_default();
    fields
        .entry("title".to_string())
        .or_insert_with(|| serde_json::Value::String(filename.to_string()));
    fields.insert("document_id".to_string(), serde_json::Value::String(document_id));
    fields.insert("filename".to_string(), serde_json::Value::String(filename.to_string()));
    fields.insert("file_type".to_string(), serde_json::Value::String(ext));
    fields.insert("full_text".to_string(), serde_json::Value::String(text.clone()));

    let raw = RawRecord::RawKeyValue(fields);

    let report = ingest::ingest_batch(
        store,
        embedder,
        config,
        vec![RawBatchItem {
            raw,
            file_content: Some(bytes),
        }],
        default_project_id,
    )
    .await
    .map_err(|e| AppError::StoreWriteError(e.to_string()))?;

    let doc = report
        .documents
        .first()
        .ok_or_else(|| AppError::Internal("ingest produced no document".into()))?;

    Ok(UploadResult {
        document_id: doc.document_id.clone(),
        chunks_created: report.chunks_written,
        text_length: text.chars().count(),
        project_id: doc.project_id.clone(),
        title: doc.title.clone(),
    })
}

/// Upload-and-query: chains an immediate retrieval scoped first to the
/// freshly-inserted document, falling back to global retrieval when
/// nothing from that document ranks highly enough (§4.9).
pub async fn upload_and_query(
    store: &dyn Store,
    embedder: &Embedder,
    config: &Config,
    bytes: Vec<u8>,
    filename: &str,
    question: &str,
    metadata: Option<serde_json::Value>,
    default_project_id: &str,
) -> Result<(UploadResult, RagAnswer), AppError> {
    let upload_result = upload(store, embedder, config, bytes, filename, metadata, default_project_id).await?;

    let scoped = retrieve::retrieve_scoped(
        store,
        embedder,
        config,
        question,
        Some(upload_result.project_id.as_str()),
        Some(upload_result.document_id.as_str()),
        5,
        config.retrieval.ann_probes,
    )
    .await
    .map_err(|e| AppError::StoreReadError(e.to_string()))?;

    let new_doc_ranks = !scoped.rows.is_empty();

    let rag_answer = if new_doc_ranks {
        rag::answer_within_document(
            store,
            embedder,
            config,
            question,
            &[] as &[HistoryTurn],
            5,
            Some(upload_result.project_id.as_str()),
            Some(upload_result.document_id.as_str()),
        )
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
    } else {
        rag::answer(store, embedder, config, question, &[] as &[HistoryTurn], 5, None)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
    };

    Ok((upload_result, rag_answer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_of_lowercases_and_requires_a_dot() {
        assert_eq!(extension_of("Report.PDF"), Some("pdf".to_string()));
        assert_eq!(extension_of("noextension"), None);
    }

    #[test]
    fn txt_extraction_passes_through() {
        let text = extract_text(b"hello world", "txt").unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        assert!(extract_text(b"data", "exe").is_err());
    }

    #[test]
    fn document_ids_for_the_same_content_are_distinguishable_by_time() {
        let a = upload_document_id("a.txt", "hello");
        let b = upload_document_id("a.txt", "hello");
        // both valid ids; collision only matters within the same instant,
        // which this smoke test can't force deterministically.
        assert!(a.starts_with("upload-"));
        assert!(b.starts_with("upload-"));
    }
}
