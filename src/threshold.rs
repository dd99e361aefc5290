//! Adaptive threshold controller (C8): a four-tier relevance cutoff with
//! automatic fallback over one already-fetched, already-sorted candidate
//! list (§4.8), plus the `/search` endpoint's secondary tightening.

use crate::models::SearchRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Strict,
    Medium,
    Broad,
    Unfiltered,
}

impl Tier {
    fn min_score(self) -> f64 {
        match self {
            Tier::Strict => 0.65,
            Tier::Medium => 0.50,
            Tier::Broad => 0.15,
            Tier::Unfiltered => 0.0,
        }
    }

    fn min_results_desired(self) -> usize {
        match self {
            Tier::Strict => 3,
            Tier::Medium => 5,
            Tier::Broad => 1,
            Tier::Unfiltered => 0,
        }
    }

    fn next(self) -> Option<Tier> {
        match self {
            Tier::Strict => Some(Tier::Medium),
            Tier::Medium => Some(Tier::Broad),
            Tier::Broad => Some(Tier::Unfiltered),
            Tier::Unfiltered => None,
        }
    }
}

pub struct TieredResult {
    pub rows: Vec<SearchRow>,
    pub tier: Tier,
    /// Best score seen across the whole candidate set, independent of
    /// which tier ultimately satisfied — used for the audit log entry when
    /// even the unfiltered tier yields nothing, and by the RAG orchestrator
    /// to decide whether to short-circuit before calling the LLM.
    pub best_score: f64,
}

/// Descends the tier ladder (strict → medium → broad → unfiltered) over a
/// single sorted `rows` list, returning the first tier whose surviving
/// count meets its "min results desired", or the unfiltered tier's
/// (possibly empty) result if none do. Never re-queries the store — only
/// ever narrows or widens the same in-memory list.
pub fn apply_tiers(rows: Vec<SearchRow>) -> TieredResult {
    let best_score = rows.first().map(|r| r.score).unwrap_or(0.0);
    if rows.is_empty() {
        tracing::info!(best_score, "unfiltered tier still yielded no candidates");
        return TieredResult {
            rows,
            tier: Tier::Unfiltered,
            best_score,
        };
    }

    let mut tier = Tier::Strict;
    loop {
        let survivors: Vec<SearchRow> = rows
            .iter()
            .filter(|r| r.score >= tier.min_score())
            .cloned()
            .collect();

        if survivors.len() >= tier.min_results_desired() || tier == Tier::Unfiltered {
            if tier == Tier::Unfiltered && survivors.is_empty() {
                tracing::info!(best_score, "unfiltered tier still yielded no candidates");
            }
            return TieredResult {
                rows: survivors,
                tier,
                best_score,
            };
        }

        tier = tier
            .next()
            .expect("Unfiltered's min_results_desired() of 0 always satisfies the loop above");
    }
}

/// The `/search` endpoint's secondary adaptive cutoff (§4.8), applied on
/// top of the tiered fallback to keep the broad tier's low-score tail out
/// of a response that otherwise reads as high-precision results.
pub fn search_endpoint_cutoff(rows: &[SearchRow]) -> f64 {
    let best = rows.first().map(|r| r.score).unwrap_or(0.0);
    if best >= 0.5 {
        0.45
    } else if best >= 0.4 {
        0.35
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(score: f64, document_id: &str) -> SearchRow {
        SearchRow {
            document_id: document_id.to_string(),
            project_id: "p1".to_string(),
            title: "t".to_string(),
            number: "n".to_string(),
            category: "c".to_string(),
            doc_type: "d".to_string(),
            revision: "r".to_string(),
            filename: "f".to_string(),
            file_type: "pdf".to_string(),
            date_modified: Some(Utc::now()),
            snippet: "s".to_string(),
            vector_score: score,
            text_score: score,
            score,
        }
    }

    #[test]
    fn strict_tier_satisfied_stays_strict() {
        let rows = vec![row(0.9, "a"), row(0.8, "b"), row(0.7, "c")];
        let result = apply_tiers(rows);
        assert_eq!(result.tier, Tier::Strict);
        assert_eq!(result.rows.len(), 3);
    }

    #[test]
    fn falls_through_to_broad_when_scores_are_low() {
        let rows = vec![row(0.20, "a")];
        let result = apply_tiers(rows);
        assert_eq!(result.tier, Tier::Broad);
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn empty_input_returns_unfiltered_empty() {
        let result = apply_tiers(vec![]);
        assert_eq!(result.tier, Tier::Unfiltered);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn search_cutoff_tightens_with_best_score() {
        assert_eq!(search_endpoint_cutoff(&[row(0.6, "a")]), 0.45);
        assert_eq!(search_endpoint_cutoff(&[row(0.42, "a")]), 0.35);
        assert!(search_endpoint_cutoff(&[row(0.1, "a")]).is_infinite());
    }
}
