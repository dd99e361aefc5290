//! The `Store` trait (C1): the single seam through which every other
//! component touches persistence. Narrow operations mirror §4.1's contract
//! directly; `hybrid_search` composes them the way `search.rs`'s
//! `search_documents` composed `fetch_keyword_candidates` and
//! `fetch_vector_candidates` — fetch both candidate sets, merge in memory,
//! since SQLite has no single query that fuses FTS5 with a vector scan.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Document, SearchRow};

/// A chunk surfaced by the lexical side of retrieval, before merge.
#[derive(Debug, Clone)]
pub struct LexicalCandidate {
    pub chunk_id: String,
    pub document_id: String,
    /// FTS5 `bm25()` score, already negated so higher is better.
    pub rank: f64,
    pub snippet: String,
}

/// A chunk surfaced by the vector side of retrieval, before merge.
#[derive(Debug, Clone)]
pub struct VectorCandidate {
    pub chunk_id: String,
    pub document_id: String,
    /// Cosine similarity against the query embedding, in `[-1.0, 1.0]`.
    pub similarity: f64,
    pub snippet: String,
}

/// Parameters for a single hybrid retrieval pass (§4.7).
pub struct HybridSearchParams<'a> {
    pub query_text: &'a str,
    /// `None` when the embedder is unavailable; the retriever then falls
    /// back to lexical-only scoring (vector_score forced to 0.0 for every
    /// row instead of the query being rejected).
    pub query_embedding: Option<&'a [f32]>,
    pub project_id: Option<&'a str>,
    /// Restricts candidates to one document, e.g. upload-and-query's initial
    /// pass that gives the freshly-inserted document priority (§4.9).
    pub document_id: Option<&'a str>,
    /// How many rows of each candidate set to fetch before merging. Not the
    /// final row count — adaptive thresholding and `top_k` truncate after.
    pub candidate_k: i64,
    /// Accepted for interface fidelity with the `ivfflat.probes` knob the
    /// original store exposed; the SQLite backend always scans exhaustively
    /// (see DESIGN.md).
    pub probes: i64,
    pub vector_weight: f64,
    pub text_weight: f64,
}

/// Persistence seam for documents, chunks, and the two retrieval primitives
/// they're built for. Implementations own their own connection pooling;
/// callers pass a `&Config` at construction, nothing else.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace each document by `document_id` (§4.1, §8: "re-ingesting
    /// the same `document_id` ... with different content replaces the prior
    /// content"). Runs in a single transaction across the whole batch.
    async fn upsert_documents(&self, documents: &[Document]) -> Result<()>;

    /// Insert chunks, ignoring rows whose `chunk_id` already exists (the
    /// content-addressed id makes a collision mean "identical content was
    /// already stored" — never a conflict to report).
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// Remove a document and every chunk that references it (§4.1's
    /// cascading delete invariant).
    async fn delete_document(&self, document_id: &str) -> Result<()>;

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>>;

    /// Raw candidates ranked by cosine similarity against `query_embedding`,
    /// highest first, truncated to `candidate_k`.
    async fn vector_search(
        &self,
        query_embedding: &[f32],
        project_id: Option<&str>,
        candidate_k: i64,
        probes: i64,
    ) -> Result<Vec<VectorCandidate>>;

    /// Raw candidates ranked by the FTS5 weighted `bm25()` score, highest
    /// first, truncated to `candidate_k`. Empty query text yields an empty
    /// result, not an error.
    async fn lexical_rank(
        &self,
        query_text: &str,
        project_id: Option<&str>,
        candidate_k: i64,
    ) -> Result<Vec<LexicalCandidate>>;

    /// Fetches both candidate sets, merges them by `chunk_id`, computes
    /// `score = vector_weight * vector_score + text_weight * text_score`,
    /// collapses to one row per document (keeping that document's
    /// best-scoring chunk), and returns rows sorted by the §4.7 tiebreak:
    /// score desc, vector_score desc, date_modified desc, document_id asc.
    ///
    /// Returns every candidate row unfiltered by any relevance threshold —
    /// callers apply `threshold::apply_tier` afterward. This is what lets
    /// C8's tiered fallback work over one fetch instead of one query per
    /// tier: tightening the cutoff can only drop rows from this same sorted
    /// list, never reorder or add to it.
    async fn hybrid_search(&self, params: HybridSearchParams<'_>) -> Result<Vec<SearchRow>>;
}
