//! Normalizer (C3): maps a [`RawRecord`] of any recognized shape to a
//! canonical [`Document`] plus the text block the Chunker consumes when the
//! record carries no richer content (§4.3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::AppError;
use crate::models::{Document, RawAconexDocument, RawEmailDocument, RawRecord, RawSyntheticContent};

/// Metadata slots checked, in order, for a project id when the record
/// itself carries none (§4.3: "project_id resolution order: explicit field
/// on the record → a designated metadata slot → a caller-supplied
/// default").
const PROJECT_ID_METADATA_KEYS: &[&str] = &["project_id", "projectId", "project", "proj_id"];

pub struct Normalized {
    pub document: Document,
    /// The text the Chunker splits. Supersedes `Document::body_text()` for
    /// synthetic-content records, extends it (appended) for everything
    /// else that carries a free-text field.
    pub body_text: String,
}

pub fn normalize(raw: RawRecord, default_project_id: &str) -> Result<Normalized, AppError> {
    match raw {
        RawRecord::AconexDocument(r) => normalize_aconex(r, default_project_id),
        RawRecord::SyntheticContent(r) => normalize_synthetic(r, default_project_id),
        RawRecord::EmailDocument(r) => normalize_email(r, default_project_id),
        RawRecord::RawKeyValue(map) => normalize_raw_map(map, default_project_id),
    }
}

fn resolve_project_id(
    explicit: Option<&str>,
    metadata: &HashMap<String, Value>,
    default_project_id: &str,
) -> String {
    if let Some(p) = explicit {
        if !p.is_empty() {
            return p.to_string();
        }
    }
    for key in PROJECT_ID_METADATA_KEYS {
        if let Some(v) = metadata.get(*key).and_then(|v| v.as_str()) {
            if !v.is_empty() {
                return v.to_string();
            }
        }
    }
    default_project_id.to_string()
}

/// Unparseable or absent dates become `None` rather than an error — §4.3
/// treats date parsing as best-effort, not a validation gate.
fn parse_date(s: Option<&str>) -> Option<DateTime<Utc>> {
    let s = s?;
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

fn metadata_str(metadata: &HashMap<String, Value>, key: &str) -> String {
    metadata
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn require_document_id(id: &str) -> Result<(), AppError> {
    if id.trim().is_empty() {
        Err(AppError::NormalizationError("document_id is required".into()))
    } else {
        Ok(())
    }
}

fn normalize_aconex(r: RawAconexDocument, default_project_id: &str) -> Result<Normalized, AppError> {
    require_document_id(&r.document_id)?;
    let project_id = resolve_project_id(r.project_id.as_deref(), &r.metadata, default_project_id);
    let raw_json = serde_json::to_string(&r.metadata).unwrap_or_else(|_| "{}".to_string());

    let document = Document {
        document_id: r.document_id,
        project_id,
        title: truncate(r.title.as_deref().unwrap_or(""), Document::TITLE_MAX),
        number: truncate(r.number.as_deref().unwrap_or(""), Document::SHORT_FIELD_MAX),
        category: truncate(r.category.as_deref().unwrap_or(""), Document::SHORT_FIELD_MAX),
        doc_type: truncate(r.doc_type.as_deref().unwrap_or(""), Document::SHORT_FIELD_MAX),
        status: truncate(r.status.as_deref().unwrap_or(""), Document::SHORT_FIELD_MAX),
        review_status: truncate(r.review_status.as_deref().unwrap_or(""), Document::SHORT_FIELD_MAX),
        revision: truncate(r.revision.as_deref().unwrap_or(""), Document::SHORT_FIELD_MAX),
        filename: truncate(r.filename.as_deref().unwrap_or(""), Document::FILENAME_MAX),
        file_type: truncate(r.file_type.as_deref().unwrap_or(""), Document::SHORT_FIELD_MAX),
        file_size: r.file_size,
        date_modified: parse_date(r.date_modified.as_deref()),
        raw: raw_json,
        file_content: None,
    };

    let mut body_text = document.body_text();
    if let Some(full_text) = r.full_text.as_deref().filter(|t| !t.trim().is_empty()) {
        body_text.push_str("\n\n");
        body_text.push_str(full_text);
    }

    Ok(Normalized { document, body_text })
}

fn normalize_synthetic(
    r: RawSyntheticContent,
    default_project_id: &str,
) -> Result<Normalized, AppError> {
    require_document_id(&r.document_id)?;
    let project_id = resolve_project_id(r.project_id.as_deref(), &r.metadata, default_project_id);
    let raw_json = serde_json::to_string(&r.metadata).unwrap_or_else(|_| "{}".to_string());

    let document = Document {
        document_id: r.document_id,
        project_id,
        title: truncate(r.title.as_deref().unwrap_or(""), Document::TITLE_MAX),
        number: String::new(),
        category: truncate(&metadata_str(&r.metadata, "category"), Document::SHORT_FIELD_MAX),
        doc_type: truncate(&metadata_str(&r.metadata, "doc_type"), Document::SHORT_FIELD_MAX),
        status: String::new(),
        review_status: String::new(),
        revision: String::new(),
        filename: String::new(),
        file_type: String::new(),
        file_size: None,
        date_modified: parse_date(r.date_modified.as_deref()),
        raw: raw_json,
        file_content: None,
    };

    // synthetic_content supersedes body_text: it's prose generated to carry
    // the document's identifying context already, not a bare title line.
    let body_text = r.synthetic_content;

    Ok(Normalized { document, body_text })
}

fn normalize_email(r: RawEmailDocument, default_project_id: &str) -> Result<Normalized, AppError> {
    require_document_id(&r.document_id)?;
    let project_id = resolve_project_id(r.project_id.as_deref(), &r.metadata, default_project_id);
    let raw_json = serde_json::to_string(&r.metadata).unwrap_or_else(|_| "{}".to_string());

    let document = Document {
        document_id: r.document_id,
        project_id,
        title: truncate(r.subject.as_deref().unwrap_or(""), Document::TITLE_MAX),
        number: String::new(),
        category: "email".to_string(),
        doc_type: "email".to_string(),
        status: String::new(),
        review_status: String::new(),
        revision: String::new(),
        filename: String::new(),
        file_type: String::new(),
        file_size: None,
        date_modified: parse_date(r.sent_at.as_deref()),
        raw: raw_json,
        file_content: None,
    };

    let mut body_text = document.body_text();
    if let Some(sender) = r.sender.as_deref().filter(|s| !s.is_empty()) {
        body_text.push_str(&format!("\nFrom: {}", sender));
    }
    body_text.push_str("\n\n");
    body_text.push_str(&r.body);

    Ok(Normalized { document, body_text })
}

fn normalize_raw_map(
    map: HashMap<String, Value>,
    default_project_id: &str,
) -> Result<Normalized, AppError> {
    let document_id = map
        .get("document_id")
        .or_else(|| map.get("id"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::NormalizationError("document_id is required".into()))?
        .to_string();

    let project_id = resolve_project_id(
        map.get("project_id").and_then(|v| v.as_str()),
        &map,
        default_project_id,
    );

    let get = |key: &str| metadata_str(&map, key);
    let raw_json = serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string());

    let document = Document {
        document_id,
        project_id,
        title: truncate(&get("title"), Document::TITLE_MAX),
        number: truncate(&get("number"), Document::SHORT_FIELD_MAX),
        category: truncate(&get("category"), Document::SHORT_FIELD_MAX),
        doc_type: truncate(&get("doc_type"), Document::SHORT_FIELD_MAX),
        status: truncate(&get("status"), Document::SHORT_FIELD_MAX),
        review_status: truncate(&get("review_status"), Document::SHORT_FIELD_MAX),
        revision: truncate(&get("revision"), Document::SHORT_FIELD_MAX),
        filename: truncate(&get("filename"), Document::FILENAME_MAX),
        file_type: truncate(&get("file_type"), Document::SHORT_FIELD_MAX),
        file_size: map.get("file_size").and_then(|v| v.as_i64()),
        date_modified: parse_date(map.get("date_modified").and_then(|v| v.as_str())),
        raw: raw_json,
        file_content: None,
    };

    let mut body_text = document.body_text();
    if let Some(full_text) = map
        .get("full_text")
        .and_then(|v| v.as_str())
        .filter(|t| !t.trim().is_empty())
    {
        body_text.push_str("\n\n");
        body_text.push_str(full_text);
    } else if let Some(synthetic) = map.get("synthetic_content").and_then(|v| v.as_str()) {
        body_text = synthetic.to_string();
    }

    Ok(Normalized { document, body_text })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aconex_record_requires_document_id() {
        let raw = RawRecord::AconexDocument(RawAconexDocument {
            document_id: "".to_string(),
            project_id: None,
            title: Some("Foo".to_string()),
            number: None,
            category: None,
            doc_type: None,
            status: None,
            review_status: None,
            revision: None,
            filename: None,
            file_type: None,
            file_size: None,
            date_modified: None,
            full_text: None,
            metadata: HashMap::new(),
        });
        assert!(normalize(raw, "default").is_err());
    }

    #[test]
    fn project_id_falls_back_to_metadata_then_default() {
        let mut metadata = HashMap::new();
        metadata.insert("project".to_string(), Value::String("proj-42".to_string()));
        let raw = RawRecord::AconexDocument(RawAconexDocument {
            document_id: "doc-1".to_string(),
            project_id: None,
            title: Some("Foo".to_string()),
            number: None,
            category: None,
            doc_type: None,
            status: None,
            review_status: None,
            revision: None,
            filename: None,
            file_type: None,
            file_size: None,
            date_modified: None,
            full_text: None,
            metadata,
        });
        let normalized = normalize(raw, "fallback").unwrap();
        assert_eq!(normalized.document.project_id, "proj-42");
    }

    #[test]
    fn synthetic_content_supersedes_body_text() {
        let raw = RawRecord::SyntheticContent(RawSyntheticContent {
            document_id: "doc-2".to_string(),
            project_id: Some("p1".to_string()),
            title: Some("Summary".to_string()),
            synthetic_content: "Generated prose about the project.".to_string(),
            date_modified: None,
            metadata: HashMap::new(),
        });
        let normalized = normalize(raw, "default").unwrap();
        assert_eq!(normalized.body_text, "Generated prose about the project.");
    }

    #[test]
    fn email_body_is_appended_after_body_text() {
        let raw = RawRecord::EmailDocument(RawEmailDocument {
            document_id: "doc-3".to_string(),
            project_id: None,
            subject: Some("RFI response".to_string()),
            sender: Some("alice@example.com".to_string()),
            sent_at: Some("2025-01-02T03:04:05Z".to_string()),
            body: "Please see the attached drawing.".to_string(),
            metadata: HashMap::new(),
        });
        let normalized = normalize(raw, "default").unwrap();
        assert!(normalized.body_text.contains("Title: RFI response"));
        assert!(normalized.body_text.contains("From: alice@example.com"));
        assert!(normalized.body_text.contains("Please see the attached drawing."));
        assert!(normalized.document.date_modified.is_some());
    }

    #[test]
    fn unparseable_date_becomes_none() {
        assert_eq!(parse_date(Some("not-a-date")), None);
        assert_eq!(parse_date(None), None);
    }

    #[test]
    fn string_fields_are_truncated_to_schema_maxima() {
        let long_title = "x".repeat(600);
        let raw = RawRecord::AconexDocument(RawAconexDocument {
            document_id: "doc-4".to_string(),
            project_id: None,
            title: Some(long_title),
            number: None,
            category: None,
            doc_type: None,
            status: None,
            review_status: None,
            revision: None,
            filename: None,
            file_type: None,
            file_size: None,
            date_modified: None,
            full_text: None,
            metadata: HashMap::new(),
        });
        let normalized = normalize(raw, "default").unwrap();
        assert_eq!(normalized.document.title.chars().count(), Document::TITLE_MAX);
    }
}
