//! Character-oriented sliding-window chunker with overlap and whitespace
//! boundary correction, plus the deterministic chunk id derivation shared by
//! the batch ingestor and the upload adapter.

use uuid::Uuid;

/// Fixed namespace for chunk id derivation. Arbitrary but stable across
/// processes and releases — changing it would silently break idempotent
/// re-ingest for every existing chunk.
const CHUNK_ID_NAMESPACE: Uuid = Uuid::from_u128(0x9f6c_9b9a_6e0a_4a7d_9c3e_1a2b_3c4d_5e6f);

/// `chunk_id = stable_hash(document_id, chunk_content)` (4.5 step 6, 4.1,
/// unified per §9's open question: both the batch ingestor and the upload
/// adapter must derive chunk ids this same way for `(document_id, content)`
/// to uniquely determine `chunk_id`).
pub fn stable_chunk_id(document_id: &str, content: &str) -> String {
    let mut name = String::with_capacity(document_id.len() + content.len() + 1);
    name.push_str(document_id);
    name.push('\u{0}');
    name.push_str(content);
    Uuid::new_v5(&CHUNK_ID_NAMESPACE, name.as_bytes()).to_string()
}

/// Splits `text` into a finite, ordered sequence of non-empty chunks.
///
/// `chunk_size` and `overlap` are characters, not bytes or tokens; `overlap`
/// must be strictly less than `chunk_size` (the caller's `Config` validates
/// this once at process start, so it is a precondition here, not re-checked).
///
/// Empty or whitespace-only input yields an empty sequence. The boundary-
/// correction scan-back distance is the configured `overlap`, since that is
/// the only other "character distance" the design exposes as tunable.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let n = chars.len();
    if n <= chunk_size {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < n {
        let mut end = (start + chunk_size).min(n);

        if end < n {
            let scan_limit = overlap.min(end - start);
            let mut cut = None;
            for i in (end - scan_limit..end).rev() {
                if chars[i].is_whitespace() {
                    cut = Some(i);
                    break;
                }
            }
            if let Some(ws) = cut {
                end = ws;
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim().to_string();
        if !piece.is_empty() {
            chunks.push(piece);
        }

        if end >= n {
            break;
        }
        // Guarantee forward progress even if the boundary scan found
        // whitespace immediately after `start` (pathological input).
        start = end.saturating_sub(overlap).max(start + 1);
    }

    if chunks.len() >= 2 {
        let half = chunk_size / 2;
        let last_len = chunks.last().map(|c| c.chars().count()).unwrap_or(0);
        if last_len < half {
            let last = chunks.pop().unwrap();
            let prev = chunks.last_mut().expect("checked len >= 2 above");
            prev.push(' ');
            prev.push_str(&last);
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("", 500, 50).is_empty());
        assert!(split_text("   \n\t  ", 500, 50).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let text = "El vaciado de zapatas está programado para el 25 de abril.";
        let chunks = split_text(text, 500, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn long_text_is_split_with_overlap() {
        let text = "palabra ".repeat(200); // 1600 chars
        let chunks = split_text(&text, 500, 50);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 500 + 50, "chunk exceeds size+slack: {}", c.len());
        }
    }

    #[test]
    fn concatenated_length_is_at_least_input_length() {
        let text = "palabra ".repeat(200);
        let chunks = split_text(&text, 500, 50);
        let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert!(total >= text.trim().chars().count());
    }

    #[test]
    fn boundary_correction_prefers_whitespace_cut() {
        let text = format!("{} palabrafinaldeltextoquenoquepacomo", "x".repeat(490));
        let chunks = split_text(&text, 500, 50);
        // the forced cut at 500 would land mid-word; the corrected cut should
        // not split "palabrafinal..." in half.
        assert!(!chunks[0].ends_with("palabrafinaldeltex"));
    }

    #[test]
    fn last_chunk_below_half_target_is_merged() {
        // 520 chars: first window takes ~500, leaving a ~20-char remainder
        // well under half of 500, which must be merged rather than emitted
        // as its own chunk.
        let text = "a".repeat(520);
        let chunks = split_text(&text, 500, 50);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn deterministic_for_same_input_and_params() {
        let text = "repetible ".repeat(100);
        let a = split_text(&text, 500, 50);
        let b = split_text(&text, 500, 50);
        assert_eq!(a, b);
    }

    #[test]
    fn stable_chunk_id_is_deterministic() {
        let a = stable_chunk_id("doc-1", "hello world");
        let b = stable_chunk_id("doc-1", "hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn stable_chunk_id_differs_by_document_or_content() {
        let a = stable_chunk_id("doc-1", "hello world");
        let b = stable_chunk_id("doc-2", "hello world");
        let c = stable_chunk_id("doc-1", "goodbye world");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
