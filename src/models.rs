//! Core data types that flow through the retrieval and synthesis pipeline.
//!
//! `Verse` and `VerseRef` are corpus-owned and immutable after load; `Query`,
//! `RankedResult`, and `Reflection` are request-scoped. Wire field names stay
//! camelCase to match the frontend contract.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A scripture locator: book, chapter, and a verse or verse range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VerseRef {
    pub book: String,
    pub chapter: u16,
    pub verse_start: u16,
    pub verse_end: Option<u16>,
}

impl VerseRef {
    /// Parse a reference string like `"John 3:16"` or `"Philippians 4:6-7"`.
    ///
    /// The book name may contain spaces and a leading ordinal (`"1 John 4:9"`).
    /// Chapter and verse numbers must be exact; no fuzzy numeric matching.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let collapsed = collapse_whitespace(raw);
        let (book, locator) = collapsed
            .rsplit_once(' ')
            .ok_or_else(|| bad_ref(raw, "missing chapter:verse"))?;

        let (chapter_str, verse_str) = locator
            .split_once(':')
            .ok_or_else(|| bad_ref(raw, "missing ':' separator"))?;

        let chapter: u16 = chapter_str
            .parse()
            .map_err(|_| bad_ref(raw, "chapter is not a number"))?;

        let (start_str, end_str) = match verse_str.split_once('-') {
            Some((s, e)) => (s, Some(e)),
            None => (verse_str, None),
        };

        let verse_start: u16 = start_str
            .parse()
            .map_err(|_| bad_ref(raw, "verse is not a number"))?;

        let verse_end = match end_str {
            Some(e) => {
                let end: u16 = e
                    .parse()
                    .map_err(|_| bad_ref(raw, "range end is not a number"))?;
                if end <= verse_start {
                    return Err(bad_ref(raw, "range end must be greater than start"));
                }
                Some(end)
            }
            None => None,
        };

        if book.is_empty() || chapter == 0 || verse_start == 0 {
            return Err(bad_ref(raw, "book, chapter, and verse are required"));
        }

        Ok(Self {
            book: book.to_string(),
            chapter,
            verse_start,
            verse_end,
        })
    }

    /// Normalized lookup key: lowercased book, collapsed whitespace, exact
    /// numbers. `"  john  3:16 "` and `"John 3:16"` produce the same key.
    pub fn lookup_key(&self) -> String {
        match self.verse_end {
            Some(end) => format!(
                "{} {}:{}-{}",
                self.book.to_lowercase(),
                self.chapter,
                self.verse_start,
                end
            ),
            None => format!(
                "{} {}:{}",
                self.book.to_lowercase(),
                self.chapter,
                self.verse_start
            ),
        }
    }
}

impl fmt::Display for VerseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.book, self.chapter, self.verse_start)?;
        if let Some(end) = self.verse_end {
            write!(f, "-{}", end)?;
        }
        Ok(())
    }
}

impl Serialize for VerseRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn bad_ref(raw: &str, why: &str) -> EngineError {
    EngineError::CorpusLoad(format!("unparseable reference '{}': {}", raw.trim(), why))
}

/// A related passage shown on the verse detail view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedVerse {
    pub reference: String,
    pub preview: String,
}

/// An immutable corpus verse with its precomputed search features.
///
/// `keywords` is derived from `text` at load time so ranking never tokenizes
/// verse text per query. Verses with an empty `themes` list are lexical-only
/// candidates.
#[derive(Debug, Clone)]
pub struct Verse {
    pub reference: VerseRef,
    pub text: String,
    pub translation: String,
    pub themes: Vec<String>,
    pub keywords: HashSet<String>,
    pub embedding: Option<Vec<f32>>,
    pub context_previous: Option<String>,
    pub context_next: Option<String>,
    pub related: Vec<RelatedVerse>,
}

/// A user query after normalization.
///
/// Main-prompt themes and bullet-point themes are tracked separately because
/// the ranker weights the main prompt 2x. Created per request, never stored.
#[derive(Debug, Clone)]
pub struct Query {
    pub raw_text: String,
    pub normalized_tokens: Vec<String>,
    pub main_themes: BTreeSet<String>,
    pub bullet_themes: BTreeSet<String>,
    pub bullet_points: Vec<String>,
    pub embedding: Option<Vec<f32>>,
}

impl Query {
    /// Union of main-prompt and bullet-point themes, deterministic order.
    pub fn detected_themes(&self) -> BTreeSet<String> {
        self.main_themes
            .union(&self.bullet_themes)
            .cloned()
            .collect()
    }
}

/// Named scoring components, kept on every result for explainability.
///
/// A component that was unavailable for the pair (no query themes, no
/// embeddings) is reported as `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub lexical: f64,
    pub thematic: f64,
    pub semantic: f64,
}

/// One ranked verse with its relevance score in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub verse: Verse,
    pub relevance_score: f64,
    pub matched_themes: Vec<String>,
    pub breakdown: ScoreBreakdown,
}

/// A structured reflection grounded in a set of ranked verses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reflection {
    pub title: String,
    pub content: String,
    pub action_points: Vec<String>,
    pub encouragement: String,
}
