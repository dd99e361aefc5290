//! Hybrid retriever (C7): the single entry point every read-path caller
//! (the `/search` handler, the RAG orchestrator, upload-and-query) goes
//! through. Composes the query preprocessor (C6), a single fused fetch
//! from the `Store`, and the adaptive threshold controller (C8).

use crate::config::Config;
use crate::embedder::Embedder;
use crate::models::SearchRow;
use crate::query_clean::clean_query;
use crate::store::{HybridSearchParams, Store};
use crate::threshold::{apply_tiers, Tier};

pub struct RetrievalOutcome {
    pub rows: Vec<SearchRow>,
    pub tier: Tier,
    pub best_score: f64,
}

/// Runs C6 → C7 → C8 for one request.
///
/// The query is cleaned once, embedded once (falling back to lexical-only
/// scoring if the embedder errors or is disabled, per §4.1/§7 rather than
/// rejecting the request), and a single `candidate_k`-sized candidate set
/// is fetched and tiered. `candidate_k` is fetched generously larger than
/// `top_k` so tier tightening never starves a tier of candidates it would
/// otherwise have satisfied.
pub async fn retrieve(
    store: &dyn Store,
    embedder: &Embedder,
    config: &Config,
    query: &str,
    project_id: Option<&str>,
    top_k: i64,
    probes: i64,
) -> anyhow::Result<RetrievalOutcome> {
    retrieve_scoped(store, embedder, config, query, project_id, None, top_k, probes).await
}

/// Like [`retrieve`] but additionally restricted to one document, used by
/// upload-and-query's initial priority pass (§4.9).
#[allow(clippy::too_many_arguments)]
pub async fn retrieve_scoped(
    store: &dyn Store,
    embedder: &Embedder,
    config: &Config,
    query: &str,
    project_id: Option<&str>,
    document_id: Option<&str>,
    top_k: i64,
    probes: i64,
) -> anyhow::Result<RetrievalOutcome> {
    let cleaned = clean_query(query);

    let query_embedding = if embedder.is_enabled() {
        match embedder.encode_one(&cleaned).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %e, "embedder unavailable, falling back to lexical-only retrieval");
                None
            }
        }
    } else {
        None
    };

    let candidate_k = (top_k.max(1) * 4).max(40);

    let rows = store
        .hybrid_search(HybridSearchParams {
            query_text: &cleaned,
            query_embedding: query_embedding.as_deref(),
            project_id,
            document_id,
            candidate_k,
            probes,
            vector_weight: config.retrieval.vector_weight,
            text_weight: config.retrieval.text_weight,
        })
        .await?;

    let tiered = apply_tiers(rows);
    let mut rows = tiered.rows;
    rows.truncate(top_k.max(0) as usize);

    Ok(RetrievalOutcome {
        rows,
        tier: tiered.tier,
        best_score: tiered.best_score,
    })
}
