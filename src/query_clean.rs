//! Query preprocessor (C6): strips conversational framing when the query
//! looks like a request sentence rather than a keyword phrase (§4.6).
//! Stopwords and trigger tokens are data at the top of the file, not buried
//! in control flow, so they're easy to tune without touching the retriever.

/// Tokens whose presence signals a conversational request worth cleaning,
/// rather than a keyword query that should pass through untouched.
const TRIGGER_TOKENS: &[&str] = &[
    "dame", "dime", "busca", "buscar", "encuentra", "encontrar", "necesito",
    "quiero", "muestrame", "quisiera", "podrias", "puedes", "give", "find",
    "show", "please",
];

/// Spanish stopwords dropped during cleaning (the corpus is
/// Spanish-dominant), plus a handful of English equivalents for mixed
/// queries.
const STOPWORDS: &[&str] = &[
    "el", "la", "los", "las", "un", "una", "unos", "unas", "de", "del", "al",
    "a", "en", "que", "y", "o", "para", "por", "con", "sin", "sobre", "es",
    "son", "me", "los", "las", "este", "esta", "estos", "estas", "the", "of",
    "for", "and", "or", "about", "on", "in", "me", "please",
];

/// Queries of two tokens or fewer pass through unchanged (§4.6: already
/// keyword-shaped, nothing conversational to strip). Longer queries are
/// cleaned only when a trigger token is present; cleaning that would empty
/// the string reverts to the original rather than sending an empty query
/// downstream.
pub fn clean_query(query: &str) -> String {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.len() <= 2 {
        return query.to_string();
    }

    let lowered = query.to_lowercase();
    let has_trigger = lowered
        .split_whitespace()
        .any(|t| TRIGGER_TOKENS.contains(&t.trim_matches(|c: char| !c.is_alphanumeric())));
    if !has_trigger {
        return query.to_string();
    }

    let cleaned = strip_filler(&lowered);
    if cleaned.trim().is_empty() {
        query.to_string()
    } else {
        cleaned
    }
}

fn strip_filler(lowered: &str) -> String {
    let normalized: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() || c == '-' { c } else { ' ' })
        .collect();

    normalized
        .split_whitespace()
        .filter(|t| t.chars().count() > 2 && !STOPWORDS.contains(t) && !TRIGGER_TOKENS.contains(t))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_queries_pass_through_unchanged() {
        assert_eq!(clean_query("plano electrico"), "plano electrico");
    }

    #[test]
    fn conversational_query_is_cleaned() {
        let cleaned = clean_query("dame los planos electricos del edificio principal");
        assert!(!cleaned.contains("dame"));
        assert!(cleaned.contains("planos"));
        assert!(cleaned.contains("electricos"));
    }

    #[test]
    fn query_without_trigger_is_untouched() {
        let q = "planos electricos edificio principal torre norte";
        assert_eq!(clean_query(q), q);
    }

    #[test]
    fn cleaning_that_empties_the_query_reverts_to_original() {
        let q = "dame el de la y";
        assert_eq!(clean_query(q), q);
    }
}
