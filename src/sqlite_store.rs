//! SQLite implementation of the [`Store`] trait (C1): a transactional
//! relational store with an FTS5 lexical index and a brute-force cosine
//! vector scan standing in for a native ANN index.
//!
//! §4.1 describes `probes` as an `ivfflat`-style tuning knob; this backend
//! has no vector extension loaded (see DESIGN.md), so `probes` is accepted
//! for interface fidelity and otherwise unused — every vector search scans
//! every embedded chunk in scope.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, Document, SearchRow};
use crate::store::{HybridSearchParams, LexicalCandidate, Store, VectorCandidate};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// FTS5 tokenization splits on non-alphanumerics, which would otherwise
/// make `3.2-100` and `3 2 100` equivalent queries but not match a stored
/// `3_2_100` filename fragment. Replacing `.`, `_`, `-` with spaces at both
/// insert and query time keeps identifier-like strings matching.
fn normalize_for_fts(s: &str) -> String {
    s.chars()
        .map(|c| if matches!(c, '.' | '_' | '-') { ' ' } else { c })
        .collect()
}

fn fts_match_query(text: &str) -> String {
    normalize_for_fts(text)
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    Document {
        document_id: row.get("document_id"),
        project_id: row.get("project_id"),
        title: row.get("title"),
        number: row.get("number"),
        category: row.get("category"),
        doc_type: row.get("doc_type"),
        status: row.get("status"),
        review_status: row.get("review_status"),
        revision: row.get("revision"),
        filename: row.get("filename"),
        file_type: row.get("file_type"),
        file_size: row.get("file_size"),
        date_modified: row
            .get::<Option<String>, _>("date_modified")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
        raw: row.get("raw"),
        file_content: row.get("file_content"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_documents(&self, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for doc in documents {
            sqlx::query(
                r#"
                INSERT INTO documents
                    (document_id, project_id, title, number, category, doc_type, status,
                     review_status, revision, filename, file_type, file_size, date_modified,
                     raw, file_content)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(document_id) DO UPDATE SET
                    project_id = excluded.project_id,
                    title = excluded.title,
                    number = excluded.number,
                    category = excluded.category,
                    doc_type = excluded.doc_type,
                    status = excluded.status,
                    review_status = excluded.review_status,
                    revision = excluded.revision,
                    filename = excluded.filename,
                    file_type = excluded.file_type,
                    file_size = excluded.file_size,
                    date_modified = excluded.date_modified,
                    raw = excluded.raw,
                    file_content = COALESCE(excluded.file_content, documents.file_content)
                "#,
            )
            .bind(&doc.document_id)
            .bind(&doc.project_id)
            .bind(&doc.title)
            .bind(&doc.number)
            .bind(&doc.category)
            .bind(&doc.doc_type)
            .bind(&doc.status)
            .bind(&doc.review_status)
            .bind(&doc.revision)
            .bind(&doc.filename)
            .bind(&doc.file_type)
            .bind(doc.file_size)
            .bind(doc.date_modified.map(|d| d.to_rfc3339()))
            .bind(&doc.raw)
            .bind(&doc.file_content)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        // `number` isn't on Chunk (§3's field set); pull it from the owning
        // document once per distinct document_id in this batch so the FTS
        // row can carry it for bm25 column weighting.
        let mut doc_ids = Vec::new();
        let mut seen = HashSet::new();
        for chunk in chunks {
            if seen.insert(chunk.document_id.clone()) {
                doc_ids.push(chunk.document_id.clone());
            }
        }

        let mut numbers: HashMap<String, String> = HashMap::new();
        for doc_id in &doc_ids {
            if let Some(n) =
                sqlx::query_scalar::<_, String>("SELECT number FROM documents WHERE document_id = ?")
                    .bind(doc_id)
                    .fetch_optional(&self.pool)
                    .await?
            {
                numbers.insert(doc_id.clone(), n);
            }
        }

        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            let exists: bool =
                sqlx::query_scalar("SELECT COUNT(*) > 0 FROM document_chunks WHERE chunk_id = ?")
                    .bind(&chunk.chunk_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if exists {
                // Content-addressed id collision means identical content is
                // already stored — nothing to report (§4.1).
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO document_chunks
                    (chunk_id, document_id, project_id, title, date_modified, content, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.document_id)
            .bind(&chunk.project_id)
            .bind(&chunk.title)
            .bind(chunk.date_modified.map(|d| d.to_rfc3339()))
            .bind(&chunk.content)
            .bind(chunk.embedding.as_ref().map(|e| vec_to_blob(e)))
            .execute(&mut *tx)
            .await?;

            let number = numbers.get(&chunk.document_id).cloned().unwrap_or_default();
            sqlx::query(
                r#"
                INSERT INTO document_chunks_fts
                    (chunk_id, document_id, project_id, title, number, content)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.document_id)
            .bind(&chunk.project_id)
            .bind(normalize_for_fts(&chunk.title))
            .bind(normalize_for_fts(&number))
            .bind(normalize_for_fts(&chunk.content))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM document_chunks_fts WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE document_id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn vector_search(
        &self,
        query_embedding: &[f32],
        project_id: Option<&str>,
        candidate_k: i64,
        _probes: i64,
    ) -> Result<Vec<VectorCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_id, document_id, content, embedding
            FROM document_chunks
            WHERE embedding IS NOT NULL
              AND (? IS NULL OR project_id = ?)
            "#,
        )
        .bind(project_id)
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<VectorCandidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let embedding = blob_to_vec(&blob);
                let similarity = cosine_similarity(query_embedding, &embedding) as f64;
                VectorCandidate {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    similarity,
                    snippet: row.get("content"),
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(candidate_k.max(0) as usize);
        Ok(candidates)
    }

    async fn lexical_rank(
        &self,
        query_text: &str,
        project_id: Option<&str>,
        candidate_k: i64,
    ) -> Result<Vec<LexicalCandidate>> {
        let match_query = fts_match_query(query_text);
        if match_query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT
                chunk_id,
                document_id,
                -bm25(document_chunks_fts, 1.0, 1.0, 1.0, 2.0, 1.0, 1.0) AS rnk,
                snippet(document_chunks_fts, 5, '', '', '...', 20) AS snip
            FROM document_chunks_fts
            WHERE document_chunks_fts MATCH ?
              AND (? IS NULL OR project_id = ?)
            ORDER BY rnk DESC
            LIMIT ?
            "#,
        )
        .bind(&match_query)
        .bind(project_id)
        .bind(project_id)
        .bind(candidate_k)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| LexicalCandidate {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                rank: row.get("rnk"),
                snippet: row.get("snip"),
            })
            .collect())
    }

    async fn hybrid_search(&self, params: HybridSearchParams<'_>) -> Result<Vec<SearchRow>> {
        let lexical = self
            .lexical_rank(params.query_text, params.project_id, params.candidate_k)
            .await?;
        let max_rank = lexical.iter().map(|c| c.rank).fold(0.0_f64, f64::max);

        // chunk_id -> (vector_score, text_score, document_id, snippet)
        let mut by_chunk: HashMap<String, (f64, f64, String, String)> = HashMap::new();

        for c in &lexical {
            if params.document_id.is_some_and(|d| d != c.document_id) {
                continue;
            }
            let text_score = if max_rank > 0.0 {
                (c.rank / max_rank).clamp(0.0, 1.0)
            } else {
                0.0
            };
            by_chunk.insert(
                c.chunk_id.clone(),
                (0.0, text_score, c.document_id.clone(), c.snippet.clone()),
            );
        }

        if let Some(query_embedding) = params.query_embedding {
            let vector = self
                .vector_search(query_embedding, params.project_id, params.candidate_k, params.probes)
                .await?;
            for v in vector {
                if params.document_id.is_some_and(|d| d != v.document_id) {
                    continue;
                }
                let vector_score = v.similarity.clamp(0.0, 1.0);
                by_chunk
                    .entry(v.chunk_id)
                    .and_modify(|e| e.0 = vector_score)
                    .or_insert((vector_score, 0.0, v.document_id, v.snippet));
            }
        }

        let doc_ids: HashSet<String> = by_chunk.values().map(|(_, _, doc_id, _)| doc_id.clone()).collect();
        let mut docs: HashMap<String, Document> = HashMap::new();
        for doc_id in doc_ids {
            if let Some(doc) = self.get_document(&doc_id).await? {
                docs.insert(doc_id, doc);
            }
        }

        let mut rows: Vec<SearchRow> = Vec::new();
        for (vector_score, text_score, document_id, snippet) in by_chunk.into_values() {
            let Some(doc) = docs.get(&document_id) else {
                continue;
            };
            let score = params.vector_weight * vector_score + params.text_weight * text_score;
            rows.push(SearchRow {
                document_id,
                project_id: doc.project_id.clone(),
                title: doc.title.clone(),
                number: doc.number.clone(),
                category: doc.category.clone(),
                doc_type: doc.doc_type.clone(),
                revision: doc.revision.clone(),
                filename: doc.filename.clone(),
                file_type: doc.file_type.clone(),
                date_modified: doc.date_modified,
                snippet,
                vector_score,
                text_score,
                score,
            });
        }

        // §4.7's tiebreak: score desc, vector_score desc, date_modified
        // desc, document_id asc.
        rows.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.vector_score.partial_cmp(&a.vector_score).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| b.date_modified.cmp(&a.date_modified))
                .then_with(|| a.document_id.cmp(&b.document_id))
        });

        // One row per document: keep the first occurrence (highest score,
        // per the sort above) and drop the rest.
        let mut seen_docs = HashSet::new();
        rows.retain(|r| seen_docs.insert(r.document_id.clone()));

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_match_query_quotes_each_token() {
        assert_eq!(fts_match_query("plan maestro"), "\"plan\" \"maestro\"");
    }

    #[test]
    fn fts_match_query_normalizes_separators() {
        assert_eq!(fts_match_query("dwg-3.2_rev1"), "\"dwg\" \"3\" \"2\" \"rev1\"");
    }

    #[test]
    fn fts_match_query_empty_for_blank_input() {
        assert_eq!(fts_match_query("   "), "");
    }
}
