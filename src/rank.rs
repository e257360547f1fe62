//! Relevance ranking: scores every corpus verse against a normalized query.
//!
//! Three signals are combined into a final score in `[0, 1]`:
//!
//! 1. Lexical — Jaccard overlap between query tokens and verse keywords.
//! 2. Thematic — weighted fraction of query themes present on the verse,
//!    with main-prompt themes counting 2x bullet-point themes.
//! 3. Semantic — cosine similarity of query and verse embeddings.
//!
//! The weighted sum is renormalized over the signals actually available for
//! the pair, so a corpus without embeddings is not penalized. Ties are broken
//! by thematic score, then corpus load order, which makes the output a total
//! order reproducible across identical calls.

use std::collections::HashSet;

use crate::corpus::VerseCorpus;
use crate::embedding::cosine_similarity;
use crate::error::EngineError;
use crate::models::{Query, RankedResult, ScoreBreakdown};

/// Weight of a main-prompt theme relative to a bullet-point theme.
const MAIN_THEME_WEIGHT: f64 = 2.0;
const BULLET_THEME_WEIGHT: f64 = 1.0;

pub const MIN_TOP_K: usize = 1;
pub const MAX_TOP_K: usize = 10;

/// Signal weights before renormalization.
#[derive(Debug, Clone, Copy)]
pub struct RankWeights {
    pub lexical: f64,
    pub thematic: f64,
    pub semantic: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            lexical: 0.3,
            thematic: 0.4,
            semantic: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelevanceRanker {
    weights: RankWeights,
    /// Results must score strictly above this floor to be returned.
    relevance_floor: f64,
}

impl RelevanceRanker {
    pub fn new(weights: RankWeights, relevance_floor: f64) -> Self {
        Self {
            weights,
            relevance_floor,
        }
    }

    /// Rank the corpus against a query and return at most `top_k` results,
    /// sorted by relevance descending.
    ///
    /// Returns an empty sequence when nothing clears the relevance floor;
    /// callers must handle "no match" explicitly rather than receiving
    /// forced low-quality results.
    pub fn rank(
        &self,
        query: &Query,
        corpus: &VerseCorpus,
        top_k: usize,
    ) -> Result<Vec<RankedResult>, EngineError> {
        if !(MIN_TOP_K..=MAX_TOP_K).contains(&top_k) {
            return Err(EngineError::InvalidArgument(format!(
                "top_k must be between {} and {}, got {}",
                MIN_TOP_K, MAX_TOP_K, top_k
            )));
        }

        let query_tokens: HashSet<&str> =
            query.normalized_tokens.iter().map(|t| t.as_str()).collect();
        let has_themes = !query.main_themes.is_empty() || !query.bullet_themes.is_empty();

        struct Candidate {
            index: usize,
            result: RankedResult,
        }

        let mut candidates: Vec<Candidate> = Vec::new();

        for (index, verse) in corpus.all().iter().enumerate() {
            let lexical = jaccard(&query_tokens, &verse.keywords);

            let thematic = if has_themes {
                Some(self.thematic_score(query, &verse.themes))
            } else {
                None
            };

            let semantic = match (&query.embedding, &verse.embedding) {
                (Some(q), Some(v)) => Some(cosine_similarity(q, v).clamp(0.0, 1.0) as f64),
                _ => None,
            };

            let mut weighted = self.weights.lexical * lexical;
            let mut total_weight = self.weights.lexical;
            if let Some(t) = thematic {
                weighted += self.weights.thematic * t;
                total_weight += self.weights.thematic;
            }
            if let Some(s) = semantic {
                weighted += self.weights.semantic * s;
                total_weight += self.weights.semantic;
            }
            let score = if total_weight > 0.0 {
                (weighted / total_weight).clamp(0.0, 1.0)
            } else {
                0.0
            };

            if score <= self.relevance_floor {
                continue;
            }

            let matched_themes: Vec<String> = query
                .detected_themes()
                .into_iter()
                .filter(|t| verse.themes.contains(t))
                .collect();

            candidates.push(Candidate {
                index,
                result: RankedResult {
                    verse: verse.clone(),
                    relevance_score: score,
                    matched_themes,
                    breakdown: ScoreBreakdown {
                        lexical,
                        thematic: thematic.unwrap_or(0.0),
                        semantic: semantic.unwrap_or(0.0),
                    },
                },
            });
        }

        // Score desc, thematic desc, load order asc: a deterministic total
        // order for reproducible output.
        candidates.sort_by(|a, b| {
            b.result
                .relevance_score
                .partial_cmp(&a.result.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.result
                        .breakdown
                        .thematic
                        .partial_cmp(&a.result.breakdown.thematic)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.index.cmp(&b.index))
        });

        candidates.truncate(top_k);

        tracing::debug!(
            results = candidates.len(),
            top_k,
            "ranked corpus against query"
        );

        Ok(candidates.into_iter().map(|c| c.result).collect())
    }

    /// Weighted fraction of detected query themes present on the verse.
    fn thematic_score(&self, query: &Query, verse_themes: &[String]) -> f64 {
        let mut matched = 0.0;
        let mut total = 0.0;
        for theme in &query.main_themes {
            total += MAIN_THEME_WEIGHT;
            if verse_themes.contains(theme) {
                matched += MAIN_THEME_WEIGHT;
            }
        }
        for theme in &query.bullet_themes {
            total += BULLET_THEME_WEIGHT;
            if verse_themes.contains(theme) {
                matched += BULLET_THEME_WEIGHT;
            }
        }
        if total > 0.0 {
            matched / total
        } else {
            0.0
        }
    }
}

/// Jaccard overlap between the query token set and a verse keyword set.
fn jaccard(query_tokens: &HashSet<&str>, keywords: &HashSet<String>) -> f64 {
    if query_tokens.is_empty() || keywords.is_empty() {
        return 0.0;
    }
    let intersection = query_tokens
        .iter()
        .filter(|t| keywords.contains(**t))
        .count();
    let union = query_tokens.len() + keywords.len() - intersection;
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{VerseCorpus, VerseRecord};
    use crate::normalize::QueryNormalizer;
    use crate::themes::ThemeTaxonomy;

    fn record(reference: &str, text: &str, themes: &[&str]) -> VerseRecord {
        VerseRecord {
            reference: reference.to_string(),
            text: text.to_string(),
            translation: "NIV".to_string(),
            themes: themes.iter().map(|t| t.to_string()).collect(),
            context_previous: None,
            context_next: None,
            related_verses: Vec::new(),
        }
    }

    fn test_corpus() -> VerseCorpus {
        VerseCorpus::from_records(vec![
            record(
                "Philippians 4:6-7",
                "Do not be anxious about anything, but in every situation, by prayer \
                 and petition, with thanksgiving, present your requests to God.",
                &["peace", "anxiety"],
            ),
            record(
                "Matthew 6:34",
                "Therefore do not worry about tomorrow, for tomorrow will worry about itself.",
                &["worry"],
            ),
            record(
                "Matthew 1:2",
                "Abraham was the father of Isaac, Isaac the father of Jacob.",
                &[],
            ),
        ])
        .unwrap()
    }

    fn query(text: &str) -> Query {
        QueryNormalizer::new(ThemeTaxonomy::builtin())
            .normalize(text, &[])
            .unwrap()
    }

    fn ranker() -> RelevanceRanker {
        RelevanceRanker::new(RankWeights::default(), 0.0)
    }

    #[test]
    fn rejects_out_of_range_top_k() {
        let corpus = test_corpus();
        let q = query("anxious");
        assert!(matches!(
            ranker().rank(&q, &corpus, 0),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(matches!(
            ranker().rank(&q, &corpus, 11),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn themed_verses_outrank_genealogy() {
        let corpus = test_corpus();
        let q = query("I'm feeling anxious about the future");
        let results = ranker().rank(&q, &corpus, 3).unwrap();

        assert!(results.len() >= 2);
        let refs: Vec<String> = results
            .iter()
            .map(|r| r.verse.reference.to_string())
            .collect();
        let genealogy_pos = refs.iter().position(|r| r == "Matthew 1:2");
        let phil_pos = refs.iter().position(|r| r == "Philippians 4:6-7").unwrap();
        let matt_pos = refs.iter().position(|r| r == "Matthew 6:34").unwrap();
        if let Some(g) = genealogy_pos {
            assert!(phil_pos < g && matt_pos < g);
        }
    }

    #[test]
    fn output_is_sorted_descending_and_within_top_k() {
        let corpus = test_corpus();
        let q = query("worried and anxious about tomorrow");
        let results = ranker().rank(&q, &corpus, 2).unwrap();
        assert!(results.len() <= 2);
        for pair in results.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }

    #[test]
    fn no_duplicate_verses_in_output() {
        let corpus = test_corpus();
        let q = query("anxious worry tomorrow prayer");
        let results = ranker().rank(&q, &corpus, 10).unwrap();
        let mut seen = HashSet::new();
        for r in &results {
            assert!(seen.insert(r.verse.reference.lookup_key()));
        }
    }

    #[test]
    fn unmatched_query_returns_empty() {
        let corpus = test_corpus();
        let q = query("zebra xylophone quantum");
        let results = ranker().rank(&q, &corpus, 3).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let corpus = test_corpus();
        let q = query("do not be anxious about anything prayer petition thanksgiving");
        for r in ranker().rank(&q, &corpus, 10).unwrap() {
            assert!((0.0..=1.0).contains(&r.relevance_score));
        }
    }

    #[test]
    fn repeated_calls_are_identical() {
        let corpus = test_corpus();
        let q = query("anxious about the future");
        let a = ranker().rank(&q, &corpus, 3).unwrap();
        let b = ranker().rank(&q, &corpus, 3).unwrap();
        let refs_a: Vec<String> = a.iter().map(|r| r.verse.reference.to_string()).collect();
        let refs_b: Vec<String> = b.iter().map(|r| r.verse.reference.to_string()).collect();
        assert_eq!(refs_a, refs_b);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.relevance_score, y.relevance_score);
        }
    }

    #[test]
    fn tie_break_prefers_load_order() {
        // Two verses with identical text and themes score identically; the
        // first-loaded must come first.
        let corpus = VerseCorpus::from_records(vec![
            record("Psalm 1:1", "Trust in the Lord always", &["trust"]),
            record("Psalm 2:1", "Trust in the Lord always", &["trust"]),
        ])
        .unwrap();
        let q = query("I need to trust");
        let results = ranker().rank(&q, &corpus, 2).unwrap();
        assert_eq!(results[0].verse.reference.to_string(), "Psalm 1:1");
        assert_eq!(results[1].verse.reference.to_string(), "Psalm 2:1");
    }

    #[test]
    fn main_prompt_themes_weigh_double() {
        let corpus = VerseCorpus::from_records(vec![record(
            "Matthew 6:34",
            "Do not worry about tomorrow",
            &["worry"],
        )])
        .unwrap();
        let normalizer = QueryNormalizer::new(ThemeTaxonomy::builtin());

        // "worry" from the main prompt vs. from a bullet point, with an
        // unmatched theme on the other channel in both cases.
        let q_main = normalizer
            .normalize("worried", &["so thankful".to_string()])
            .unwrap();
        let q_bullet = normalizer
            .normalize("so thankful", &["worried".to_string()])
            .unwrap();

        let main_score = ranker().rank(&q_main, &corpus, 1).unwrap()[0]
            .breakdown
            .thematic;
        let bullet_score = ranker().rank(&q_bullet, &corpus, 1).unwrap()[0]
            .breakdown
            .thematic;
        assert!(main_score > bullet_score);
    }

    #[test]
    fn relevance_floor_filters_weak_matches() {
        let corpus = test_corpus();
        let q = query("anxious");
        let strict = RelevanceRanker::new(RankWeights::default(), 0.99);
        assert!(strict.rank(&q, &corpus, 3).unwrap().is_empty());
    }

    #[test]
    fn semantic_signal_is_used_when_both_embeddings_exist() {
        let corpus = VerseCorpus::from_records(vec![
            record("Psalm 23:1", "The Lord is my shepherd", &[]),
            record("Psalm 24:1", "The earth belongs to Him", &[]),
        ])
        .unwrap()
        .with_embeddings(vec![vec![1.0, 0.0], vec![0.0, 1.0]])
        .unwrap();

        let mut q = query("shepherd");
        q.embedding = Some(vec![0.9, 0.1]);

        let results = ranker().rank(&q, &corpus, 2).unwrap();
        assert_eq!(results[0].verse.reference.to_string(), "Psalm 23:1");
        assert!(results[0].breakdown.semantic > results[1].breakdown.semantic);

        // Without a query embedding the semantic component is absent, not
        // penalized: the breakdown reports 0.0.
        let q_plain = query("shepherd");
        let plain = ranker().rank(&q_plain, &corpus, 2).unwrap();
        assert_eq!(plain[0].breakdown.semantic, 0.0);
    }

    #[test]
    fn lexical_only_pair_scores_exactly_its_lexical_component() {
        // With no detected themes and no embeddings, the weighted sum divides
        // 0.3 * lexical by a total weight of 0.3: the final score must equal
        // the lexical signal, not a fraction of it.
        let corpus = VerseCorpus::from_records(vec![record(
            "Psalm 23:1",
            "The Lord is my shepherd",
            &[],
        )])
        .unwrap();
        let q = Query {
            raw_text: "shepherd".to_string(),
            normalized_tokens: vec!["shepherd".to_string()],
            main_themes: Default::default(),
            bullet_themes: Default::default(),
            bullet_points: Vec::new(),
            embedding: None,
        };

        let results = ranker().rank(&q, &corpus, 1).unwrap();
        let r = &results[0];
        assert!(r.breakdown.lexical > 0.0);
        assert!((r.relevance_score - r.breakdown.lexical).abs() < 1e-9);
    }

    #[test]
    fn absent_signals_renormalize_instead_of_penalizing() {
        let make_corpus = || {
            VerseCorpus::from_records(vec![record(
                "Matthew 6:34",
                "Do not worry about tomorrow",
                &["worry"],
            )])
            .unwrap()
        };

        // No embeddings: score is the weighted sum over lexical and thematic
        // only, divided by their combined weight.
        let q = query("worried");
        let base_results = ranker().rank(&q, &make_corpus(), 1).unwrap();
        let base = &base_results[0];
        let expected =
            (0.3 * base.breakdown.lexical + 0.4 * base.breakdown.thematic) / 0.7;
        assert!((base.relevance_score - expected).abs() < 1e-9);

        // A perfectly matching embedding joins the sum; it must not lower
        // the score relative to the embedding-free pair.
        let with_embeddings = make_corpus()
            .with_embeddings(vec![vec![1.0, 0.0]])
            .unwrap();
        let mut q_embedded = query("worried");
        q_embedded.embedding = Some(vec![1.0, 0.0]);
        let semantic_results = ranker().rank(&q_embedded, &with_embeddings, 1).unwrap();
        assert!(semantic_results[0].relevance_score > base.relevance_score);
    }
}
