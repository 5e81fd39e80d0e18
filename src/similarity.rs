//! Cosine similarity over embeddings and the word tokenizer shared by the
//! lexical heuristics.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::Item;

static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("Invalid word regex"));

/// Cosine similarity in \[-1, 1\]. Returns 0.0 when either vector is zero or
/// the dimensions differ.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    dot / denom
}

/// Similarity of two items, if both carry an embedding.
pub fn item_similarity(a: &Item, b: &Item) -> Option<f64> {
    Some(cosine_similarity(a.embedding()?, b.embedding()?))
}

/// Lowercase word tokens (letters and digits, accents kept).
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Title, summary and concept names: the text an item is judged by.
pub fn item_text(item: &Item) -> String {
    let mut text = String::with_capacity(item.title.len() + item.summary.len() + 64);
    text.push_str(&item.title);
    text.push('\n');
    text.push_str(&item.summary);
    for concept in &item.concepts {
        text.push('\n');
        text.push_str(&concept.name);
    }
    text
}

/// Whether `token` matches one keyword word.
///
/// Words of four or more characters also match as a token prefix, so
/// `oppose` matches `opposes`; shorter words must match exactly.
fn word_matches(token: &str, word: &str) -> bool {
    if word.chars().count() >= 4 {
        token.starts_with(word)
    } else {
        token == word
    }
}

/// Number of `words` that occur in `tokens`.
pub fn keyword_hits(tokens: &HashSet<String>, words: &[String]) -> usize {
    words
        .iter()
        .filter(|word| tokens.iter().any(|t| word_matches(t, word)))
        .count()
}

/// True if any keyword occurs in the token sequence.
///
/// Single words match whole tokens (prefix rule of [`keyword_hits`]), never
/// the inside of a longer word. Multi-word phrases match a run of
/// consecutive tokens.
pub fn mentions_any(tokens: &[String], keywords: &[String]) -> bool {
    keywords.iter().any(|keyword| {
        let phrase = tokenize(keyword);
        !phrase.is_empty()
            && tokens.windows(phrase.len()).any(|window| {
                window
                    .iter()
                    .zip(&phrase)
                    .all(|(token, word)| word_matches(token, word))
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let s = cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]);
        assert!((s - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn tokenizer_keeps_accents_and_lowercases() {
        assert_eq!(
            tokenize("Éthique, IA & société!"),
            vec!["éthique", "ia", "société"]
        );
    }

    #[test]
    fn keyword_hits_match_prefixes_for_long_words_only() {
        let tokens: HashSet<String> = tokenize("it opposes no view").into_iter().collect();
        let words = vec!["oppose".to_string(), "no".to_string(), "vie".to_string()];
        assert_eq!(keyword_hits(&tokens, &words), 2);
    }

    #[test]
    fn mentions_match_whole_words_and_phrases() {
        let keywords = vec!["cite".to_string(), "mise en oeuvre".to_string()];
        let tokens = |text: &str| tokenize(text);

        assert!(!mentions_any(&tokens("capacite et specificite"), &keywords));
        assert!(mentions_any(&tokens("il cite ce travail"), &keywords));
        assert!(mentions_any(&tokens("articles cited here"), &keywords));
        assert!(mentions_any(&tokens("une mise en oeuvre rapide"), &keywords));
        assert!(!mentions_any(&tokens("mise a jour en oeuvre"), &keywords));
    }
}
