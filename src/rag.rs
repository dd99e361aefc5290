//! RAG answer orchestrator (C10): retrieves context under a relevance
//! floor, calls the external LLM under a grounded-answer contract, and
//! falls back to a templated extractive answer when the LLM is disabled,
//! errors, or times out (§4.10).

use uuid::Uuid;

use crate::config::Config;
use crate::embedder::Embedder;
use crate::llm::{self, ChatMessage};
use crate::models::SearchRow;
use crate::retrieve;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

pub struct RagAnswer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SearchRow>,
    pub context_used: String,
    pub session_id: String,
}

/// Relevance floor below which a row doesn't count toward "relevant"
/// context (§4.10 step 2).
const RELEVANT_SCORE_FLOOR: f64 = 0.20;
/// Best-score floor below which the whole request short-circuits without
/// calling the LLM at all (§4.10 step 2, §8).
const SHORT_CIRCUIT_BEST_SCORE_FLOOR: f64 = 0.25;
/// Bounded conversation history window (§4.10).
const MAX_HISTORY_TURNS: usize = 6;

const NO_RELEVANT_INFO_MESSAGE: &str =
    "No encontré información relevante en los documentos disponibles para responder a esta pregunta.";

pub async fn answer(
    store: &dyn Store,
    embedder: &Embedder,
    config: &Config,
    question: &str,
    history: &[HistoryTurn],
    max_context_docs: i64,
    project_id: Option<&str>,
) -> anyhow::Result<RagAnswer> {
    answer_within_document(store, embedder, config, question, history, max_context_docs, project_id, None).await
}

/// Like [`answer`] but additionally restricted to one document — the
/// priority pass upload-and-query uses when the freshly-inserted document
/// itself ranks for the question (§4.9).
#[allow(clippy::too_many_arguments)]
pub async fn answer_within_document(
    store: &dyn Store,
    embedder: &Embedder,
    config: &Config,
    question: &str,
    history: &[HistoryTurn],
    max_context_docs: i64,
    project_id: Option<&str>,
    document_id: Option<&str>,
) -> anyhow::Result<RagAnswer> {
    let outcome = retrieve::retrieve_scoped(
        store,
        embedder,
        config,
        question,
        project_id,
        document_id,
        max_context_docs,
        config.retrieval.ann_probes,
    )
    .await?;

    let relevant: Vec<SearchRow> = outcome
        .rows
        .into_iter()
        .filter(|r| r.score > RELEVANT_SCORE_FLOOR)
        .collect();

    if relevant.is_empty() || outcome.best_score < SHORT_CIRCUIT_BEST_SCORE_FLOOR {
        return Ok(RagAnswer {
            question: question.to_string(),
            answer: NO_RELEVANT_INFO_MESSAGE.to_string(),
            sources: Vec::new(),
            context_used: String::new(),
            session_id: Uuid::new_v4().to_string(),
        });
    }

    let context_used = render_context(&relevant);

    let answer_text = if config.llm.is_enabled() {
        let messages = build_messages(&context_used, question, history);
        match llm::chat_completion(
            &config.llm,
            &messages,
            config.llm.chat_max_tokens,
            Some(config.llm.top_p),
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "LLM call failed, falling back to extractive answer");
                extractive_fallback(&relevant)
            }
        }
    } else {
        extractive_fallback(&relevant)
    };

    Ok(RagAnswer {
        question: question.to_string(),
        answer: answer_text,
        sources: relevant,
        context_used,
        session_id: Uuid::new_v4().to_string(),
    })
}

/// Builds the context block handed to the LLM: a document header
/// (title/number/category/relevance%) over each excerpt, separated by a
/// visually distinct delimiter so the model can tell documents apart when
/// citing (§4.10 step 3).
fn render_context(rows: &[SearchRow]) -> String {
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n---\n\n");
        }
        out.push_str(&format!(
            "[Documento {}] {} (Número: {}, Categoría: {}, Relevancia: {:.0}%)\n{}",
            i + 1,
            row.title,
            if row.number.is_empty() { "N/A" } else { &row.number },
            if row.category.is_empty() { "N/A" } else { &row.category },
            row.score * 100.0,
            row.snippet,
        ));
    }
    out
}

fn system_prompt() -> ChatMessage {
    ChatMessage {
        role: "system".to_string(),
        content: "Eres un asistente que responde preguntas sobre documentos de construcción. \
Responde únicamente con información contenida en los documentos proporcionados; si la evidencia \
no alcanza para responder, dilo explícitamente en lugar de inventar una respuesta. Responde en \
español, estructurando la respuesta en una respuesta directa, detalles de apoyo y un bloque de \
referencias que liste los documentos citados."
            .to_string(),
    }
}

fn build_messages(context: &str, question: &str, history: &[HistoryTurn]) -> Vec<ChatMessage> {
    let mut messages = vec![system_prompt()];
    let start = history.len().saturating_sub(MAX_HISTORY_TURNS);
    for turn in &history[start..] {
        messages.push(ChatMessage {
            role: turn.role.clone(),
            content: turn.content.clone(),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: format!("Contexto:\n{}\n\nPregunta: {}", context, question),
    });
    messages
}

/// Templated extractive answer from the top 3 results, used when the LLM
/// path is disabled, errors, or times out (§4.10 step 5, §7).
fn extractive_fallback(rows: &[SearchRow]) -> String {
    let mut out = String::from(
        "No fue posible generar una respuesta con el modelo de lenguaje; a continuación se \
muestran los fragmentos más relevantes encontrados:\n\n",
    );
    for row in rows.iter().take(3) {
        out.push_str(&format!("- {} ({}): {}\n", row.title, row.number, row.snippet));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(score: f64) -> SearchRow {
        SearchRow {
            document_id: "doc-1".to_string(),
            project_id: "p1".to_string(),
            title: "Plano eléctrico".to_string(),
            number: "E-100".to_string(),
            category: "planos".to_string(),
            doc_type: "drawing".to_string(),
            revision: "A".to_string(),
            filename: "e-100.pdf".to_string(),
            file_type: "pdf".to_string(),
            date_modified: Some(Utc::now()),
            snippet: "Especificaciones del tablero principal.".to_string(),
            vector_score: score,
            text_score: score,
            score,
        }
    }

    #[test]
    fn render_context_includes_relevance_percent() {
        let context = render_context(&[row(0.82)]);
        assert!(context.contains("Relevancia: 82%"));
        assert!(context.contains("Plano eléctrico"));
    }

    #[test]
    fn extractive_fallback_caps_at_three_rows() {
        let rows = vec![row(0.9), row(0.8), row(0.7), row(0.6)];
        let fallback = extractive_fallback(&rows);
        assert_eq!(fallback.matches("Plano eléctrico").count(), 3);
    }

    #[test]
    fn history_window_is_bounded() {
        let history: Vec<HistoryTurn> = (0..10)
            .map(|i| HistoryTurn {
                role: "user".to_string(),
                content: format!("turn {}", i),
            })
            .collect();
        let messages = build_messages("ctx", "question", &history);
        // system + 6 history + 1 user = 8
        assert_eq!(messages.len(), 8);
    }
}
