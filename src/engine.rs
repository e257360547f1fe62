//! Engine facade: orchestrates normalize -> rank -> synthesize.
//!
//! Requests share one read-only corpus snapshot and are freely
//! parallelizable; the only shared mutable structure is the advisory query
//! cache. The cache never changes correctness, only latency: a miss or
//! expiry recomputes, and a racing insert at worst duplicates work.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use crate::config::Config;
use crate::corpus::{CorpusHandle, VerseCorpus};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::EngineError;
use crate::models::{Query, RankedResult, Reflection, ScoreBreakdown, Verse};
use crate::normalize::QueryNormalizer;
use crate::rank::{RankWeights, RelevanceRanker};
use crate::synthesize::{ReflectionSynthesizer, RemoteBackend};
use crate::themes::{ThemeLibrary, ThemeTaxonomy};

/// Per-request options. Anything unset falls back to configured defaults.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
}

/// The combined result of one search: ranked verses plus, when at least one
/// verse matched, a reflection. Never a partial object.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub verses: Vec<RankedResult>,
    pub reflection: Option<Reflection>,
}

pub struct Engine {
    corpus: CorpusHandle,
    corpus_path: PathBuf,
    normalizer: QueryNormalizer,
    ranker: RelevanceRanker,
    synthesizer: ReflectionSynthesizer,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: Option<Cache<String, Arc<SearchOutcome>>>,
    default_top_k: usize,
    rank_timeout: Duration,
    synthesis_timeout: Duration,
    synthesis_fallback: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("corpus_path", &self.corpus_path)
            .field("default_top_k", &self.default_top_k)
            .field("rank_timeout", &self.rank_timeout)
            .field("synthesis_timeout", &self.synthesis_timeout)
            .field("synthesis_fallback", &self.synthesis_fallback)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build the engine from configuration. Corpus load failures are fatal:
    /// the engine must not serve traffic with a malformed or empty corpus.
    pub async fn from_config(config: &Config) -> Result<Self, EngineError> {
        let taxonomy = match &config.corpus.taxonomy_path {
            Some(path) => ThemeTaxonomy::from_file(path)?,
            None => ThemeTaxonomy::builtin(),
        };

        let embedder = create_provider(&config.embedding)?;
        let corpus = VerseCorpus::load(&config.corpus.path, embedder.as_ref()).await?;

        let weights = RankWeights {
            lexical: config.retrieval.weight_lexical,
            thematic: config.retrieval.weight_thematic,
            semantic: config.retrieval.weight_semantic,
        };

        let library = ThemeLibrary::builtin();
        let synthesizer = if config.generation.is_remote() {
            ReflectionSynthesizer::with_backend(
                library,
                Box::new(RemoteBackend::new(&config.generation)?),
                config.generation.fallback_to_template,
            )
        } else {
            ReflectionSynthesizer::template(library)
        };

        let cache = if config.cache.enabled {
            Some(
                Cache::builder()
                    .max_capacity(config.cache.max_entries)
                    .time_to_live(Duration::from_secs(config.cache.ttl_secs))
                    .build(),
            )
        } else {
            None
        };

        Ok(Self {
            corpus: CorpusHandle::new(corpus),
            corpus_path: config.corpus.path.clone(),
            normalizer: QueryNormalizer::new(taxonomy),
            ranker: RelevanceRanker::new(weights, config.retrieval.relevance_floor),
            synthesizer,
            embedder,
            cache,
            default_top_k: config.retrieval.top_k,
            rank_timeout: Duration::from_millis(config.timeouts.rank_ms),
            synthesis_timeout: Duration::from_millis(config.timeouts.synthesis_ms),
            synthesis_fallback: config.generation.fallback_to_template,
        })
    }

    /// Run the full pipeline for a raw query.
    ///
    /// Normalization and ranking errors abort immediately. Synthesis is only
    /// invoked when ranking produced results; its failures are recovered via
    /// the template path where allowed.
    pub async fn search(
        &self,
        raw_text: &str,
        bullet_points: &[String],
        options: SearchOptions,
    ) -> Result<SearchOutcome, EngineError> {
        let top_k = options.top_k.unwrap_or(self.default_top_k);
        let mut query = self.normalizer.normalize(raw_text, bullet_points)?;

        let cache_key = Self::cache_key(&query, top_k);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&cache_key) {
                tracing::debug!(key = %cache_key, "query cache hit");
                return Ok((*hit).clone());
            }
        }

        let corpus = self.corpus.snapshot();

        let verses = tokio::time::timeout(self.rank_timeout, async {
            if self.embedder.is_enabled() {
                let text = QueryNormalizer::embedding_text(&query);
                match self.embedder.embed(&[text]).await {
                    Ok(mut vectors) => match vectors.pop() {
                        Some(v) if v.len() == self.embedder.dims() => {
                            query.embedding = Some(v)
                        }
                        Some(v) => tracing::warn!(
                            got = v.len(),
                            expected = self.embedder.dims(),
                            "discarding query embedding with wrong dimensionality"
                        ),
                        None => {}
                    },
                    // Semantic scoring is an optional signal; its absence is
                    // not penalized, so a failed provider degrades rather
                    // than failing the search.
                    Err(e) => tracing::warn!(error = %e, "query embedding failed"),
                }
            }
            self.ranker.rank(&query, &corpus, top_k)
        })
        .await
        .map_err(|_| EngineError::Timeout {
            stage: "ranking",
            budget_ms: self.rank_timeout.as_millis() as u64,
        })??;

        let reflection = if verses.is_empty() {
            None
        } else {
            Some(self.synthesize_with_timeout(&query, &verses).await?)
        };

        let outcome = SearchOutcome { verses, reflection };
        if let Some(cache) = &self.cache {
            cache.insert(cache_key, Arc::new(outcome.clone()));
        }
        Ok(outcome)
    }

    /// Full verse detail for a reference, matched with normalization.
    pub fn verse_detail(&self, reference: &str) -> Result<Verse, EngineError> {
        self.corpus.snapshot().get(reference).cloned()
    }

    /// All verses tagged with a theme, in load order.
    pub fn verses_by_theme(&self, theme: &str) -> Vec<Verse> {
        self.corpus
            .snapshot()
            .by_theme(theme)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Standalone reflection synthesis for a caller-chosen verse set.
    ///
    /// References are resolved against the current snapshot; an unknown
    /// reference is a `NotFoundError` rather than being silently skipped.
    pub async fn reflect(
        &self,
        references: &[String],
        user_prompt: &str,
    ) -> Result<Reflection, EngineError> {
        if references.is_empty() {
            return Err(EngineError::InsufficientInput);
        }

        let query = match self.normalizer.normalize(user_prompt, &[]) {
            Ok(q) => q,
            Err(EngineError::EmptyQuery) => Query {
                raw_text: user_prompt.to_string(),
                normalized_tokens: Vec::new(),
                main_themes: Default::default(),
                bullet_themes: Default::default(),
                bullet_points: Vec::new(),
                embedding: None,
            },
            Err(e) => return Err(e),
        };

        let corpus = self.corpus.snapshot();
        let detected = query.detected_themes();
        let ranked: Vec<RankedResult> = references
            .iter()
            .map(|reference| {
                let verse = corpus.get(reference)?.clone();
                let matched_themes: Vec<String> = detected
                    .iter()
                    .filter(|t| verse.themes.contains(*t))
                    .cloned()
                    .collect();
                Ok(RankedResult {
                    verse,
                    relevance_score: 1.0,
                    matched_themes,
                    breakdown: ScoreBreakdown {
                        lexical: 0.0,
                        thematic: 0.0,
                        semantic: 0.0,
                    },
                })
            })
            .collect::<Result<_, EngineError>>()?;

        self.synthesize_with_timeout(&query, &ranked).await
    }

    /// Rebuild the corpus from the configured source and swap it in.
    /// In-flight requests keep the snapshot they started with.
    pub async fn reload_corpus(&self) -> Result<usize, EngineError> {
        let corpus = VerseCorpus::load(&self.corpus_path, self.embedder.as_ref()).await?;
        let count = corpus.len();
        self.corpus.swap(corpus);
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
        tracing::info!(verses = count, "corpus reloaded");
        Ok(count)
    }

    async fn synthesize_with_timeout(
        &self,
        query: &Query,
        ranked: &[RankedResult],
    ) -> Result<Reflection, EngineError> {
        match tokio::time::timeout(
            self.synthesis_timeout,
            self.synthesizer.synthesize(query, ranked),
        )
        .await
        {
            Ok(result) => result,
            Err(_) if self.synthesis_fallback && !ranked.is_empty() => {
                tracing::warn!("synthesis timed out, using template path");
                Ok(self.synthesizer.template_reflection(ranked))
            }
            Err(_) => Err(EngineError::Timeout {
                stage: "synthesis",
                budget_ms: self.synthesis_timeout.as_millis() as u64,
            }),
        }
    }

    /// Cache key over the normalized query representation, not the raw text,
    /// so trivially different inputs that normalize identically share an
    /// entry. Main and bullet themes are keyed separately because the ranker
    /// weights them differently: queries with the same theme union but
    /// different provenance score differently and must not share an entry.
    fn cache_key(query: &Query, top_k: usize) -> String {
        let main: Vec<&str> = query.main_themes.iter().map(|t| t.as_str()).collect();
        let bullet: Vec<&str> = query.bullet_themes.iter().map(|t| t.as_str()).collect();
        format!(
            "{}|{}|{}|{}",
            query.normalized_tokens.join(","),
            main.join(","),
            bullet.join(","),
            top_k
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Query;

    fn query_with_tokens(tokens: &[&str]) -> Query {
        Query {
            raw_text: "raw".to_string(),
            normalized_tokens: tokens.iter().map(|t| t.to_string()).collect(),
            main_themes: ["peace".to_string()].into_iter().collect(),
            bullet_themes: Default::default(),
            bullet_points: Vec::new(),
            embedding: None,
        }
    }

    #[test]
    fn cache_key_covers_tokens_themes_and_top_k() {
        let a = Engine::cache_key(&query_with_tokens(&["anxiou", "futur"]), 3);
        let b = Engine::cache_key(&query_with_tokens(&["anxiou", "futur"]), 3);
        assert_eq!(a, b);

        let different_k = Engine::cache_key(&query_with_tokens(&["anxiou", "futur"]), 5);
        assert_ne!(a, different_k);

        let different_tokens = Engine::cache_key(&query_with_tokens(&["anxiou"]), 3);
        assert_ne!(a, different_tokens);
    }

    #[test]
    fn cache_key_separates_main_and_bullet_themes() {
        let main = query_with_tokens(&["worry", "thankful"]);

        let mut bullet = query_with_tokens(&["worry", "thankful"]);
        bullet.bullet_themes = std::mem::take(&mut bullet.main_themes);

        assert_eq!(main.detected_themes(), bullet.detected_themes());
        assert_ne!(Engine::cache_key(&main, 3), Engine::cache_key(&bullet, 3));
    }
}
