//! Term-proximity scoring.
//!
//! Finds the narrowest token window that contains every query term the
//! document contains at all, and scores it higher the tighter it is:
//!
//! ```text
//! m = distinct query terms present in the document
//! w = last_pos − first_pos of the narrowest covering window   (w ≥ m − 1)
//!
//! m = 0  → 0.0
//! m = 1  → NEUTRAL
//! m ≥ 2  → NEUTRAL + (1 − NEUTRAL) · (m − 1) / w
//! ```
//!
//! Adjacent terms score `1.0`. Single-term matches sit at [`NEUTRAL`] so a
//! one-word query is not penalised relative to multi-word ones.

use std::collections::HashMap;

/// Score for a document that matches exactly one distinct query term.
pub const NEUTRAL: f64 = 0.5;

/// Proximity score in `[0, 1]` for `doc_tokens` against distinct `terms`.
pub fn proximity_score(doc_tokens: &[String], terms: &[String]) -> f64 {
    let index: HashMap<&str, usize> = terms
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let hits: Vec<(usize, usize)> = doc_tokens
        .iter()
        .enumerate()
        .filter_map(|(pos, tok)| index.get(tok.as_str()).map(|&term| (pos, term)))
        .collect();

    let mut present = vec![false; terms.len()];
    for &(_, term) in &hits {
        present[term] = true;
    }
    let wanted = present.iter().filter(|p| **p).count();

    match wanted {
        0 => 0.0,
        1 => NEUTRAL,
        _ => {
            let width = narrowest_window(&hits, terms.len(), wanted);
            NEUTRAL + (1.0 - NEUTRAL) * (wanted - 1) as f64 / width.max(1) as f64
        }
    }
}

/// Two-pointer sweep over term hits (ordered by position) for the smallest
/// span covering `wanted` distinct terms.
fn narrowest_window(hits: &[(usize, usize)], term_count: usize, wanted: usize) -> usize {
    let mut counts = vec![0usize; term_count];
    let mut covered = 0usize;
    let mut best = usize::MAX;
    let mut left = 0usize;

    for right in 0..hits.len() {
        let (_, term) = hits[right];
        if counts[term] == 0 {
            covered += 1;
        }
        counts[term] += 1;

        while covered == wanted {
            let span = hits[right].0 - hits[left].0;
            best = best.min(span);
            let (_, drop) = hits[left];
            counts[drop] -= 1;
            if counts[drop] == 0 {
                covered -= 1;
            }
            left += 1;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::lexical::{query_terms, tokenize};

    fn score(doc: &str, query: &str) -> f64 {
        proximity_score(&tokenize(doc), &query_terms(query))
    }

    #[test]
    fn test_no_terms_scores_zero() {
        assert_eq!(score("nothing relevant here", "rust async"), 0.0);
    }

    #[test]
    fn test_single_term_is_neutral() {
        assert_eq!(score("rust is nice", "rust"), NEUTRAL);
        assert_eq!(score("rust is nice", "rust async"), NEUTRAL);
    }

    #[test]
    fn test_adjacent_terms_score_one() {
        assert!((score("learning async rust today", "rust async") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_closer_terms_score_higher() {
        let near = score("rust and async", "rust async");
        let far = score(
            "rust one two three four five six seven eight async",
            "rust async",
        );
        assert!(near > far);
        assert!(far > NEUTRAL);
        assert!(near <= 1.0);
    }

    #[test]
    fn test_picks_narrowest_of_several_windows() {
        // the tight pair at the end wins over the wide one at the start
        let s = score("rust a b c d e f async x rust async", "rust async");
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_three_terms_partial_match() {
        // only two of three terms present: window over those two
        let s = score("tokio runtime for rust", "rust tokio borrow");
        let expected = NEUTRAL + (1.0 - NEUTRAL) * 1.0 / 3.0;
        assert!((s - expected).abs() < 1e-9);
    }
}
