//! Verse corpus: load-once, immutable, shared read-only across requests.
//!
//! A load produces a complete snapshot with all searchable features
//! precomputed (keyword sets, optional embeddings), so ranking never touches
//! verse text at query time. Reload builds a fresh snapshot and swaps it
//! atomically behind [`CorpusHandle`]; in-flight requests keep whichever
//! snapshot they started with.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use crate::embedding::EmbeddingProvider;
use crate::error::EngineError;
use crate::models::{RelatedVerse, Verse, VerseRef};
use crate::normalize::tokenize;

/// One verse record in the JSON corpus file. Field names match the frontend
/// wire contract.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerseRecord {
    pub reference: String,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_translation")]
    pub translation: String,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub context_previous: Option<String>,
    #[serde(default)]
    pub context_next: Option<String>,
    #[serde(default)]
    pub related_verses: Vec<RelatedVerse>,
}

fn default_translation() -> String {
    "NIV".to_string()
}

/// Immutable collection of verses with precomputed search features.
#[derive(Debug)]
pub struct VerseCorpus {
    verses: Vec<Verse>,
    by_key: HashMap<String, usize>,
}

impl VerseCorpus {
    /// Load and validate a corpus from a JSON file (an array of
    /// [`VerseRecord`]). When the embedding provider is enabled, verse
    /// embeddings are computed here in one batch, never per query.
    pub async fn load(
        path: &Path,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::CorpusLoad(format!("failed to read {}: {}", path.display(), e))
        })?;
        let records: Vec<VerseRecord> = serde_json::from_str(&content).map_err(|e| {
            EngineError::CorpusLoad(format!("failed to parse {}: {}", path.display(), e))
        })?;

        let mut corpus = Self::from_records(records)?;

        if provider.is_enabled() {
            let texts: Vec<String> = corpus.verses.iter().map(|v| v.text.clone()).collect();
            let vectors = provider.embed(&texts).await?;
            if vectors.len() != corpus.verses.len() {
                return Err(EngineError::CorpusLoad(format!(
                    "expected {} embedding vectors, got {}",
                    corpus.verses.len(),
                    vectors.len()
                )));
            }
            let dims = provider.dims();
            for (verse, vector) in corpus.verses.iter_mut().zip(vectors) {
                if vector.len() != dims {
                    return Err(EngineError::CorpusLoad(format!(
                        "embedding for {} has {} dimensions, expected {}",
                        verse.reference,
                        vector.len(),
                        dims
                    )));
                }
                verse.embedding = Some(vector);
            }
            tracing::info!(
                model = provider.model_name(),
                verses = corpus.verses.len(),
                "precomputed verse embeddings"
            );
        }

        tracing::info!(
            path = %path.display(),
            verses = corpus.verses.len(),
            "corpus loaded"
        );

        Ok(corpus)
    }

    /// Build a corpus from already-parsed records. Fails on an empty source,
    /// duplicate references, unparseable references, or missing text.
    pub fn from_records(records: Vec<VerseRecord>) -> Result<Self, EngineError> {
        if records.is_empty() {
            return Err(EngineError::CorpusLoad("corpus source is empty".to_string()));
        }

        let mut verses = Vec::with_capacity(records.len());
        let mut by_key = HashMap::with_capacity(records.len());

        for record in records {
            let reference = VerseRef::parse(&record.reference)?;
            if record.text.trim().is_empty() {
                return Err(EngineError::CorpusLoad(format!(
                    "verse {} has no text",
                    reference
                )));
            }

            let key = reference.lookup_key();
            let index = verses.len();
            if by_key.insert(key, index).is_some() {
                return Err(EngineError::CorpusLoad(format!(
                    "duplicate reference: {}",
                    reference
                )));
            }

            let keywords = tokenize(&record.text).into_iter().collect();

            verses.push(Verse {
                reference,
                text: record.text,
                translation: record.translation,
                themes: record
                    .themes
                    .into_iter()
                    .map(|t| t.trim().to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect(),
                keywords,
                embedding: None,
                context_previous: record.context_previous,
                context_next: record.context_next,
                related: record.related_verses,
            });
        }

        Ok(Self { verses, by_key })
    }

    /// Attach precomputed embedding vectors, one per verse in load order.
    /// Used when vectors come from somewhere other than the configured
    /// provider (precomputed files, tests).
    pub fn with_embeddings(mut self, vectors: Vec<Vec<f32>>) -> Result<Self, EngineError> {
        if vectors.len() != self.verses.len() {
            return Err(EngineError::CorpusLoad(format!(
                "expected {} embedding vectors, got {}",
                self.verses.len(),
                vectors.len()
            )));
        }
        for (verse, vector) in self.verses.iter_mut().zip(vectors) {
            verse.embedding = Some(vector);
        }
        Ok(self)
    }

    /// Look up a verse by reference string. Matching is case-insensitive and
    /// whitespace-collapsed, but numbers must match exactly.
    pub fn get(&self, reference: &str) -> Result<&Verse, EngineError> {
        let parsed =
            VerseRef::parse(reference).map_err(|_| not_found(reference))?;
        self.by_key
            .get(&parsed.lookup_key())
            .map(|&i| &self.verses[i])
            .ok_or_else(|| not_found(reference))
    }

    /// All verses in load order. Load order is the ranker's final tie-break.
    pub fn all(&self) -> &[Verse] {
        &self.verses
    }

    /// Verses tagged with a theme, in load order.
    pub fn by_theme(&self, theme: &str) -> Vec<&Verse> {
        let wanted = theme.trim().to_lowercase();
        self.verses
            .iter()
            .filter(|v| v.themes.iter().any(|t| *t == wanted))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.verses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }
}

fn not_found(reference: &str) -> EngineError {
    EngineError::NotFound(reference.trim().to_string())
}

/// Shared pointer to the current corpus snapshot.
///
/// Readers clone the `Arc` and work against a consistent snapshot for the
/// whole request; `swap` replaces the pointer without touching live
/// snapshots.
#[derive(Debug)]
pub struct CorpusHandle {
    current: RwLock<Arc<VerseCorpus>>,
}

impl CorpusHandle {
    pub fn new(corpus: VerseCorpus) -> Self {
        Self {
            current: RwLock::new(Arc::new(corpus)),
        }
    }

    /// The current snapshot. Lock is held only for the pointer clone.
    pub fn snapshot(&self) -> Arc<VerseCorpus> {
        self.current.read().expect("corpus lock poisoned").clone()
    }

    /// Atomically replace the snapshot.
    pub fn swap(&self, corpus: VerseCorpus) {
        *self.current.write().expect("corpus lock poisoned") = Arc::new(corpus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn empty_source_is_rejected() {
        let err = VerseCorpus::from_records(Vec::new()).unwrap_err();
        assert!(matches!(err, EngineError::CorpusLoad(_)));
    }

    #[test]
    fn duplicate_reference_is_rejected() {
        let err = VerseCorpus::from_records(vec![
            record("John 3:16", "For God so loved the world", &[]),
            record("john  3:16", "duplicate under normalization", &[]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn missing_text_is_rejected() {
        let err = VerseCorpus::from_records(vec![record("John 3:16", "  ", &[])]).unwrap_err();
        assert!(err.to_string().contains("no text"));
    }

    #[test]
    fn unparseable_reference_is_rejected() {
        let err =
            VerseCorpus::from_records(vec![record("Not A Reference", "text", &[])]).unwrap_err();
        assert!(matches!(err, EngineError::CorpusLoad(_)));
    }

    #[test]
    fn get_normalizes_case_and_whitespace() {
        let corpus = VerseCorpus::from_records(vec![record(
            "John 3:16",
            "For God so loved the world",
            &["love"],
        )])
        .unwrap();

        let verse = corpus.get("  john   3:16 ").unwrap();
        assert_eq!(verse.reference.to_string(), "John 3:16");

        assert!(matches!(
            corpus.get("John 3:17"),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            corpus.get("gibberish"),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn keywords_are_precomputed_and_stemmed() {
        let corpus = VerseCorpus::from_records(vec![record(
            "Philippians 4:6",
            "Do not be anxious about anything",
            &["peace"],
        )])
        .unwrap();
        let verse = corpus.get("Philippians 4:6").unwrap();
        assert!(verse.keywords.contains("anxiou"));
        assert!(!verse.keywords.contains("about"));
    }

    #[test]
    fn all_preserves_load_order() {
        let corpus = VerseCorpus::from_records(vec![
            record("Matthew 6:34", "Do not worry about tomorrow", &["worry"]),
            record("John 3:16", "For God so loved the world", &["love"]),
        ])
        .unwrap();
        let refs: Vec<String> = corpus.all().iter().map(|v| v.reference.to_string()).collect();
        assert_eq!(refs, vec!["Matthew 6:34", "John 3:16"]);
    }

    #[test]
    fn by_theme_filters_case_insensitively() {
        let corpus = VerseCorpus::from_records(vec![
            record("Matthew 6:34", "Do not worry about tomorrow", &["worry"]),
            record("John 3:16", "For God so loved the world", &["love"]),
        ])
        .unwrap();
        let matches = corpus.by_theme("  Worry ");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].reference.to_string(), "Matthew 6:34");
    }

    struct ShortVectorProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for ShortVectorProvider {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn load_rejects_embeddings_with_wrong_dimensionality() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verses.json");
        std::fs::write(
            &path,
            r#"[{ "reference": "John 3:16", "text": "For God so loved the world", "themes": [] }]"#,
        )
        .unwrap();

        let err = VerseCorpus::load(&path, &ShortVectorProvider)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CorpusLoad(_)));
        assert!(err.to_string().contains("dimensions"));
    }

    #[test]
    fn handle_swap_leaves_old_snapshot_intact() {
        let handle = CorpusHandle::new(
            VerseCorpus::from_records(vec![record("John 3:16", "old text", &[])]).unwrap(),
        );
        let before = handle.snapshot();

        handle.swap(
            VerseCorpus::from_records(vec![
                record("John 3:16", "new text", &[]),
                record("Romans 5:8", "God demonstrates his own love", &["love"]),
            ])
            .unwrap(),
        );

        // The pre-swap snapshot still sees the old corpus in full.
        assert_eq!(before.len(), 1);
        assert_eq!(before.get("John 3:16").unwrap().text, "old text");

        let after = handle.snapshot();
        assert_eq!(after.len(), 2);
        assert_eq!(after.get("John 3:16").unwrap().text, "new text");
    }
}
