//! Core data models used throughout the retrieval service.
//!
//! These types represent the documents, chunks, and search results that flow
//! through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};

/// A raw record as it arrives from an ingestion batch, before normalization.
///
/// Real source systems emit a handful of recognizably different shapes. Rather
/// than forcing every producer into one rigid schema, the Normalizer dispatches
/// on a shape the record itself reveals, falling back to a free-form key/value
/// map for anything that doesn't match a known shape.
#[derive(Debug, Clone)]
pub enum RawRecord {
    /// A document-management-system record (title/number/category/status style
    /// metadata, the dominant shape in the corpus).
    AconexDocument(RawAconexDocument),
    /// A record carrying LLM- or tool-generated prose instead of a scanned body
    /// (`synthetic_content` supersedes `body_text` when present).
    SyntheticContent(RawSyntheticContent),
    /// An email thread represented as a document.
    EmailDocument(RawEmailDocument),
    /// Anything else: a free-form key/value map, normalized best-effort.
    RawKeyValue(std::collections::HashMap<String, serde_json::Value>),
}

impl<'de> Deserialize<'de> for RawRecord {
    /// Shapes aren't distinguished by an explicit discriminator field (real
    /// producers don't emit one); instead this inspects which recognizable
    /// keys are present, in order of specificity, and falls back to the
    /// free-form key/value variant for anything else. `synthetic_content` and
    /// `body`+`subject`/`sender` are exclusive enough to check first; anything
    /// carrying `document_id` is treated as the dominant Aconex-style shape.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let obj = match value.as_object() {
            Some(o) => o.clone(),
            None => return Err(DeError::custom("raw record must be a JSON object")),
        };

        if obj.contains_key("synthetic_content") {
            let r: RawSyntheticContent =
                serde_json::from_value(value).map_err(DeError::custom)?;
            return Ok(RawRecord::SyntheticContent(r));
        }

        if obj.contains_key("body") && (obj.contains_key("subject") || obj.contains_key("sender"))
        {
            let r: RawEmailDocument = serde_json::from_value(value).map_err(DeError::custom)?;
            return Ok(RawRecord::EmailDocument(r));
        }

        if obj.contains_key("document_id") {
            let r: RawAconexDocument = serde_json::from_value(value).map_err(DeError::custom)?;
            return Ok(RawRecord::AconexDocument(r));
        }

        Ok(RawRecord::RawKeyValue(obj.into_iter().collect()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAconexDocument {
    pub document_id: String,
    pub project_id: Option<String>,
    pub title: Option<String>,
    pub number: Option<String>,
    pub category: Option<String>,
    pub doc_type: Option<String>,
    pub status: Option<String>,
    pub review_status: Option<String>,
    pub revision: Option<String>,
    pub filename: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub date_modified: Option<String>,
    pub full_text: Option<String>,
    #[serde(flatten)]
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSyntheticContent {
    pub document_id: String,
    pub project_id: Option<String>,
    pub title: Option<String>,
    pub synthetic_content: String,
    pub date_modified: Option<String>,
    #[serde(flatten)]
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEmailDocument {
    pub document_id: String,
    pub project_id: Option<String>,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub sent_at: Option<String>,
    pub body: String,
    #[serde(flatten)]
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

/// A normalized document, the unit the Store persists and the Chunker consumes.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub document_id: String,
    pub project_id: String,
    pub title: String,
    pub number: String,
    pub category: String,
    pub doc_type: String,
    pub status: String,
    pub review_status: String,
    pub revision: String,
    pub filename: String,
    pub file_type: String,
    pub file_size: Option<i64>,
    pub date_modified: Option<DateTime<Utc>>,
    /// Opaque JSON blob of the original record, kept for traceability.
    pub raw: String,
    /// Original file bytes, when the document originated from an upload.
    pub file_content: Option<Vec<u8>>,
}

impl Document {
    /// Schema-defined maxima for truncatable string fields (4.3: "all string
    /// fields are truncated to their schema-defined maxima").
    pub const TITLE_MAX: usize = 500;
    pub const SHORT_FIELD_MAX: usize = 200;
    pub const FILENAME_MAX: usize = 500;

    /// The text block the Chunker consumes in the absence of richer content:
    /// `"Title: <title>"`, `"DocumentId: <id>"`, then each present metadata
    /// field in a fixed preferred order, one per line.
    pub fn body_text(&self) -> String {
        let mut lines = Vec::with_capacity(8);
        lines.push(format!("Title: {}", self.title));
        lines.push(format!("DocumentId: {}", self.document_id));
        if !self.number.is_empty() {
            lines.push(format!("Number: {}", self.number));
        }
        if !self.category.is_empty() {
            lines.push(format!("Category: {}", self.category));
        }
        if !self.doc_type.is_empty() {
            lines.push(format!("DocType: {}", self.doc_type));
        }
        if !self.status.is_empty() {
            lines.push(format!("Status: {}", self.status));
        }
        if !self.review_status.is_empty() {
            lines.push(format!("ReviewStatus: {}", self.review_status));
        }
        if !self.revision.is_empty() {
            lines.push(format!("Revision: {}", self.revision));
        }
        lines.join("\n")
    }
}

/// A contiguous slice of a document's text plus its embedding.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    /// Deterministic from `(document_id, content)`; see [`crate::chunk::stable_chunk_id`].
    pub chunk_id: String,
    pub document_id: String,
    /// Denormalized from the owning document, for efficient filtered ANN.
    pub project_id: String,
    pub title: String,
    pub date_modified: Option<DateTime<Utc>>,
    pub content: String,
    /// Unit-normalized (L2 norm 1.00 ± 0.01). `None` means lexical-only.
    pub embedding: Option<Vec<f32>>,
}

/// One row of a search response: a document with its best-scoring chunk
/// attached, per §6.1 and §4.7 ("one per document").
#[derive(Debug, Clone, Serialize)]
pub struct SearchRow {
    pub document_id: String,
    pub project_id: String,
    pub title: String,
    pub number: String,
    pub category: String,
    pub doc_type: String,
    pub revision: String,
    pub filename: String,
    pub file_type: String,
    pub date_modified: Option<DateTime<Utc>>,
    pub snippet: String,
    pub vector_score: f64,
    pub text_score: f64,
    pub score: f64,
}
