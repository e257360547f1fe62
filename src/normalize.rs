//! Query normalization: tokenization, stop-word removal, light stemming,
//! and theme detection.
//!
//! The same token pipeline is used for queries, taxonomy patterns, and verse
//! keyword precomputation, so lexical and thematic matching stay consistent
//! across all three.

use crate::error::EngineError;
use crate::models::Query;
use crate::themes::ThemeTaxonomy;

/// Common English words carrying no retrieval signal.
const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "am", "an", "and", "any", "are", "as", "at", "be", "because",
    "been", "before", "being", "but", "by", "can", "could", "did", "do", "does", "for", "from",
    "had", "has", "have", "he", "her", "here", "him", "his", "how", "i", "if", "im", "in", "into",
    "is", "it", "its", "ive", "just", "me", "my", "no", "not", "of", "on", "or", "our", "out",
    "over", "really", "she", "so", "some", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "to", "too", "up", "very", "was", "we", "were", "what",
    "when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Light suffix stemming. Not a full Porter stemmer; just enough to fold
/// common inflections ("worrying", "worried", "worries" -> "worry") so the
/// taxonomy and verse keywords match across surface forms.
pub fn stem(token: &str) -> String {
    let mut t = token.to_string();

    if t.len() > 4 && (t.ends_with("ies") || t.ends_with("ied")) {
        t.truncate(t.len() - 3);
        t.push('y');
    } else if t.len() > 5 && t.ends_with("ing") {
        t.truncate(t.len() - 3);
    } else if t.len() > 4 && t.ends_with("ed") {
        t.truncate(t.len() - 2);
    } else if t.len() > 4 && t.ends_with("es") {
        t.truncate(t.len() - 2);
    } else if t.len() > 3 && t.ends_with('s') && !t.ends_with("ss") {
        t.truncate(t.len() - 1);
    }

    if t.len() > 4 && t.ends_with('e') {
        t.truncate(t.len() - 1);
    }

    t
}

/// Lowercase, strip punctuation, split on whitespace. No stemming and no
/// stop-word removal.
fn clean_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.replace('\'', ""))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Tokenization for taxonomy patterns: cleaned and stemmed, stop words kept.
pub fn pattern_tokens(text: &str) -> Vec<String> {
    clean_tokens(text).iter().map(|w| stem(w)).collect()
}

/// Full query/verse tokenization: cleaned, stop words removed (checked on
/// the raw surface form, before stemming), then stemmed.
///
/// If stop-word removal would leave nothing, the unfiltered tokens are kept
/// instead, so a non-blank input always yields a non-empty token list.
pub fn tokenize(text: &str) -> Vec<String> {
    let all = clean_tokens(text);
    let filtered: Vec<String> = all
        .iter()
        .filter(|t| !is_stop_word(t))
        .map(|w| stem(w))
        .collect();
    if filtered.is_empty() {
        all.iter().map(|w| stem(w)).collect()
    } else {
        filtered
    }
}

/// Turns raw user text plus optional bullet points into a canonical
/// [`Query`]. The query embedding, if any, is attached later by the engine.
#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    taxonomy: ThemeTaxonomy,
}

impl QueryNormalizer {
    pub fn new(taxonomy: ThemeTaxonomy) -> Self {
        Self { taxonomy }
    }

    /// Normalize a raw prompt and its bullet points.
    ///
    /// Bullet points are normalized identically to the main prompt and their
    /// tokens are unioned in, but their themes are tracked separately so the
    /// ranker can weight main-prompt themes higher.
    pub fn normalize(
        &self,
        raw_text: &str,
        bullet_points: &[String],
    ) -> Result<Query, EngineError> {
        let bullets: Vec<String> = bullet_points
            .iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();

        if raw_text.trim().is_empty() && bullets.is_empty() {
            return Err(EngineError::EmptyQuery);
        }

        let mut tokens = tokenize(raw_text);
        let main_themes = self.taxonomy.detect(&tokens);

        let mut bullet_themes = std::collections::BTreeSet::new();
        for bullet in &bullets {
            let bullet_tokens = tokenize(bullet);
            bullet_themes.extend(self.taxonomy.detect(&bullet_tokens));
            for token in bullet_tokens {
                if !tokens.contains(&token) {
                    tokens.push(token);
                }
            }
        }
        // Main-prompt themes win the provenance split when both detect them.
        for theme in &main_themes {
            bullet_themes.remove(theme);
        }

        tracing::debug!(
            tokens = tokens.len(),
            main_themes = main_themes.len(),
            bullet_themes = bullet_themes.len(),
            "normalized query"
        );

        Ok(Query {
            raw_text: raw_text.to_string(),
            normalized_tokens: tokens,
            main_themes,
            bullet_themes,
            bullet_points: bullets,
            embedding: None,
        })
    }

    /// The text an embedding provider should encode for this query: the
    /// prompt and bullet points concatenated.
    pub fn embedding_text(query: &Query) -> String {
        let mut text = query.raw_text.trim().to_string();
        for bullet in &query.bullet_points {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(bullet);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> QueryNormalizer {
        QueryNormalizer::new(ThemeTaxonomy::builtin())
    }

    #[test]
    fn stop_words_are_sorted_for_binary_search() {
        let mut sorted = STOP_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOP_WORDS);
    }

    #[test]
    fn tokenize_lowercases_and_strips_punctuation() {
        let tokens = tokenize("I'm feeling anxious about the future!");
        assert!(tokens.contains(&"anxiou".to_string()) || tokens.contains(&"anxious".to_string()));
        assert!(!tokens.iter().any(|t| t == "the" || t == "about" || t == "im"));
    }

    #[test]
    fn stemming_folds_inflections() {
        assert_eq!(stem("worrying"), "worry");
        assert_eq!(stem("worried"), "worry");
        assert_eq!(stem("worries"), "worry");
        assert_eq!(stem("stressed"), "stress");
        assert_eq!(stem("loved"), "lov");
        assert_eq!(stem("love"), "lov");
        assert_eq!(stem("peace"), "peac");
    }

    #[test]
    fn non_blank_input_yields_tokens_even_when_all_stop_words() {
        let tokens = tokenize("it was the and of");
        assert!(!tokens.is_empty());
    }

    #[test]
    fn blank_query_without_bullets_is_rejected() {
        let err = normalizer().normalize("   ", &[]).unwrap_err();
        assert!(matches!(err, EngineError::EmptyQuery));
    }

    #[test]
    fn blank_query_with_bullets_is_accepted() {
        let q = normalizer()
            .normalize("", &["worried about money".to_string()])
            .unwrap();
        assert!(!q.normalized_tokens.is_empty());
        assert!(q.bullet_themes.contains("worry"));
        assert!(q.main_themes.is_empty());
    }

    #[test]
    fn main_prompt_themes_take_precedence_over_bullet_provenance() {
        let q = normalizer()
            .normalize(
                "I'm so anxious",
                &["anxious about my job".to_string(), "can't sleep".to_string()],
            )
            .unwrap();
        assert!(q.main_themes.contains("anxiety"));
        assert!(!q.bullet_themes.contains("anxiety"));
    }

    #[test]
    fn bullet_tokens_are_unioned_without_duplicates() {
        let q = normalizer()
            .normalize("worried", &["worried about tomorrow".to_string()])
            .unwrap();
        let worry_count = q
            .normalized_tokens
            .iter()
            .filter(|t| *t == "worry")
            .count();
        assert_eq!(worry_count, 1);
        assert!(q.normalized_tokens.contains(&"tomorrow".to_string()));
    }

    #[test]
    fn embedding_text_concatenates_prompt_and_bullets() {
        let q = normalizer()
            .normalize("feeling low", &["no energy".to_string()])
            .unwrap();
        assert_eq!(QueryNormalizer::embedding_text(&q), "feeling low no energy");
    }
}
