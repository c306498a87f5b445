//! Word-set similarity used by the cache and discussion convergence.
//!
//! Plain Jaccard over lowercase word sets. Deliberately simple: the same
//! metric is part of the cache-hit contract and the convergence score, so
//! both stay explainable.

use std::collections::HashSet;

/// Split text into a lowercase word set, dropping punctuation-only tokens.
fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Jaccard similarity between the word sets of two texts.
///
/// Returns a value in [0, 1]. Two empty texts are considered identical.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let set_a = word_set(a);
    let set_b = word_set(b);

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Fraction of `part`'s words that also appear in `whole`.
///
/// Asymmetric by design: used to decide whether a short statement is already
/// covered by a larger body of text. Empty `part` counts as fully contained.
pub fn containment(part: &str, whole: &str) -> f64 {
    let part_words = word_set(part);
    if part_words.is_empty() {
        return 1.0;
    }
    let whole_words = word_set(whole);
    let covered = part_words.iter().filter(|w| whole_words.contains(*w)).count();
    covered as f64 / part_words.len() as f64
}

/// Jaccard similarity between two pre-tokenized string collections.
pub fn jaccard_sets(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<&str> = a.iter().map(|s| s.as_str()).collect();
    let set_b: HashSet<&str> = b.iter().map(|s| s.as_str()).collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts() {
        assert_eq!(jaccard("flood damage at site", "flood damage at site"), 1.0);
    }

    #[test]
    fn test_disjoint_texts() {
        assert_eq!(jaccard("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let a = "assess flood damage in the kitchen";
        let b = "kitchen flood needs urgent assessment";
        assert_eq!(jaccard(a, b), jaccard(b, a));
    }

    #[test]
    fn test_bounded() {
        let s = jaccard("partial overlap here", "partial overlap there");
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        assert_eq!(jaccard("Flood, Damage!", "flood damage"), 1.0);
    }

    #[test]
    fn test_empty_texts() {
        assert_eq!(jaccard("", ""), 1.0);
        assert_eq!(jaccard("something", ""), 0.0);
    }

    #[test]
    fn test_containment_is_asymmetric() {
        let summary = "tarp the roof and document all water damage for the insurer";
        assert_eq!(containment("tarp the roof", summary), 1.0);
        assert!(containment(summary, "tarp the roof") < 1.0);
        assert!(containment("engage a structural engineer", summary) < 0.5);
        assert_eq!(containment("", summary), 1.0);
    }

    #[test]
    fn test_jaccard_sets() {
        let a = vec!["water".to_string(), "fire".to_string()];
        let b = vec!["water".to_string(), "storm".to_string()];
        let s = jaccard_sets(&a, &b);
        assert!((s - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(jaccard_sets(&[], &[]), 1.0);
    }
}
