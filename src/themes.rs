//! Theme taxonomy and per-theme reflection libraries.
//!
//! The taxonomy maps normalized query tokens (and multi-word phrases) to
//! theme tags. The library holds the title, action-point, and encouragement
//! material the synthesizer draws from. Both are immutable after
//! construction so detection and synthesis stay deterministic.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::error::EngineError;
use crate::normalize::pattern_tokens;

/// Keyword/phrase-to-theme lookup table.
///
/// Patterns are stored as normalized token sequences, so `"Panic attack!"`
/// in a query matches the `panic attack` pattern after normalization.
#[derive(Debug, Clone)]
pub struct ThemeTaxonomy {
    by_pattern: HashMap<Vec<String>, Vec<String>>,
    max_pattern_len: usize,
}

#[derive(Debug, Deserialize)]
struct TaxonomyFileEntry {
    #[serde(rename = "match")]
    pattern: String,
    themes: Vec<String>,
}

impl ThemeTaxonomy {
    /// The built-in taxonomy. Each pattern may activate multiple themes.
    pub fn builtin() -> Self {
        let table: &[(&str, &[&str])] = &[
            ("anxious", &["anxiety", "peace"]),
            ("anxiety", &["anxiety", "peace"]),
            ("worry", &["worry", "peace"]),
            ("worried", &["worry", "peace"]),
            ("nervous", &["anxiety"]),
            ("stress", &["anxiety", "peace"]),
            ("stressed", &["anxiety", "peace"]),
            ("overwhelmed", &["anxiety", "rest"]),
            ("panic attack", &["anxiety", "peace"]),
            ("afraid", &["fear", "courage"]),
            ("fear", &["fear", "courage"]),
            ("scared", &["fear", "courage"]),
            ("terrified", &["fear"]),
            ("future", &["worry"]),
            ("tomorrow", &["worry"]),
            ("uncertain", &["worry", "trust"]),
            ("uncertainty", &["worry", "trust"]),
            ("alone", &["comfort"]),
            ("lonely", &["comfort"]),
            ("abandoned", &["comfort"]),
            ("sad", &["comfort", "hope"]),
            ("grief", &["comfort", "hope"]),
            ("grieving", &["comfort", "hope"]),
            ("loss", &["comfort"]),
            ("mourn", &["comfort"]),
            ("broken heart", &["comfort", "hope"]),
            ("angry", &["forgiveness", "peace"]),
            ("anger", &["forgiveness", "peace"]),
            ("resentment", &["forgiveness"]),
            ("guilt", &["forgiveness", "grace"]),
            ("guilty", &["forgiveness", "grace"]),
            ("shame", &["forgiveness", "grace"]),
            ("forgive", &["forgiveness"]),
            ("tired", &["rest", "strength"]),
            ("weary", &["rest", "strength"]),
            ("exhausted", &["rest", "strength"]),
            ("weak", &["strength"]),
            ("struggling", &["strength", "hope"]),
            ("decision", &["guidance", "wisdom"]),
            ("direction", &["guidance"]),
            ("confused", &["guidance", "wisdom"]),
            ("path", &["guidance"]),
            ("let go", &["trust"]),
            ("trust", &["trust"]),
            ("doubt", &["trust", "faith"]),
            ("believe", &["faith"]),
            ("faith", &["faith"]),
            ("hope", &["hope"]),
            ("hopeless", &["hope", "comfort"]),
            ("despair", &["hope", "comfort"]),
            ("love", &["love"]),
            ("unloved", &["love", "comfort"]),
            ("thankful", &["gratitude"]),
            ("grateful", &["gratitude"]),
            ("blessed", &["gratitude"]),
            ("saved", &["salvation"]),
            ("salvation", &["salvation"]),
            ("eternal", &["salvation", "hope"]),
        ];

        let mut by_pattern = HashMap::new();
        let mut max_pattern_len = 1;
        for (pattern, themes) in table {
            let tokens = pattern_tokens(pattern);
            max_pattern_len = max_pattern_len.max(tokens.len());
            by_pattern.insert(tokens, themes.iter().map(|t| t.to_string()).collect());
        }

        Self {
            by_pattern,
            max_pattern_len,
        }
    }

    /// Load a taxonomy override from a JSON file:
    /// `[{ "match": "panic attack", "themes": ["anxiety", "peace"] }, ...]`.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::CorpusLoad(format!("failed to read taxonomy {}: {}", path.display(), e))
        })?;
        let entries: Vec<TaxonomyFileEntry> = serde_json::from_str(&content).map_err(|e| {
            EngineError::CorpusLoad(format!("failed to parse taxonomy {}: {}", path.display(), e))
        })?;
        if entries.is_empty() {
            return Err(EngineError::CorpusLoad("taxonomy file is empty".to_string()));
        }

        let mut by_pattern = HashMap::new();
        let mut max_pattern_len = 1;
        for entry in entries {
            let tokens = pattern_tokens(&entry.pattern);
            if tokens.is_empty() {
                return Err(EngineError::CorpusLoad(format!(
                    "taxonomy pattern '{}' normalizes to nothing",
                    entry.pattern
                )));
            }
            max_pattern_len = max_pattern_len.max(tokens.len());
            by_pattern.insert(tokens, entry.themes);
        }

        Ok(Self {
            by_pattern,
            max_pattern_len,
        })
    }

    /// Detect themes in a normalized token sequence.
    ///
    /// Longer phrases are tried before single tokens; a token may activate
    /// zero, one, or multiple themes.
    pub fn detect(&self, tokens: &[String]) -> BTreeSet<String> {
        let mut themes = BTreeSet::new();
        for window_len in (1..=self.max_pattern_len.min(tokens.len())).rev() {
            for window in tokens.windows(window_len) {
                if let Some(matched) = self.by_pattern.get(window) {
                    themes.extend(matched.iter().cloned());
                }
            }
        }
        themes
    }
}

/// Per-theme synthesis material: a title, candidate action points, and a
/// closing encouragement.
#[derive(Debug, Clone)]
pub struct ThemeEntry {
    pub title: String,
    pub actions: Vec<String>,
    pub encouragement: String,
}

/// The library the template synthesizer draws from, keyed by theme tag.
#[derive(Debug, Clone)]
pub struct ThemeLibrary {
    entries: HashMap<String, ThemeEntry>,
    fallback: ThemeEntry,
}

impl ThemeLibrary {
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();

        let mut add = |theme: &str, title: &str, actions: &[&str], encouragement: &str| {
            entries.insert(
                theme.to_string(),
                ThemeEntry {
                    title: title.to_string(),
                    actions: actions.iter().map(|a| a.to_string()).collect(),
                    encouragement: encouragement.to_string(),
                },
            );
        };

        add(
            "anxiety",
            "Finding Peace in Anxious Times",
            &[
                "Take time each day to present your concerns to God in prayer",
                "Write down the worries you are carrying and release them one by one",
            ],
            "Remember, God cares deeply about your concerns and invites you to bring them to Him.",
        );
        add(
            "peace",
            "Resting in the Peace of God",
            &[
                "Set aside a quiet moment today to be still before God",
                "Replace one anxious thought with a promise from His word",
            ],
            "The peace that surpasses understanding is offered to you today.",
        );
        add(
            "worry",
            "Trusting God with Tomorrow",
            &[
                "Focus on today rather than worrying about tomorrow",
                "Name one thing you can entrust to God this week",
            ],
            "Tomorrow is in God's hands; you are invited to live in today.",
        );
        add(
            "fear",
            "Courage in the Face of Fear",
            &[
                "Speak your fear aloud in prayer instead of carrying it silently",
                "Recall a past moment when God carried you through",
            ],
            "You do not face what frightens you alone.",
        );
        add(
            "courage",
            "Standing Strong with God",
            &[
                "Take one small step today toward the thing you have been avoiding",
            ],
            "Be strong and courageous; God goes with you.",
        );
        add(
            "trust",
            "Learning to Lean on God",
            &[
                "Trust that God is guiding your path, even when you can't see the way forward",
                "Surrender one decision to God this week",
            ],
            "God is faithful, and His timing can be trusted.",
        );
        add(
            "comfort",
            "Comfort for the Hurting Heart",
            &[
                "Allow yourself to grieve honestly before God",
                "Reach out to one person who can walk alongside you",
            ],
            "The Lord is close to the brokenhearted.",
        );
        add(
            "hope",
            "Holding On to Hope",
            &[
                "Read one promise of God each morning this week",
                "Write down a reason for hope you can return to",
            ],
            "Hope in God is never wasted.",
        );
        add(
            "forgiveness",
            "The Freedom of Forgiveness",
            &[
                "Bring what weighs on your conscience honestly to God",
                "Take one step toward reconciliation where it is safe to do so",
            ],
            "Grace is greater than every failure you carry.",
        );
        add(
            "grace",
            "Living Under Grace",
            &["Receive God's forgiveness instead of rehearsing your failures"],
            "You are accepted not because of your record but because of His love.",
        );
        add(
            "strength",
            "Strength for the Weary",
            &[
                "Ask God for strength for just the next step, not the whole road",
                "Build a small rhythm of rest into your week",
            ],
            "When you are weak, His strength is made perfect.",
        );
        add(
            "rest",
            "Finding Rest for Your Soul",
            &[
                "Lay down one burden you were never meant to carry alone",
                "Guard a sabbath moment in your week",
            ],
            "Come to Him, and He will give you rest.",
        );
        add(
            "guidance",
            "Seeking God's Direction",
            &[
                "Bring the decision before God in prayer before acting",
                "Seek counsel from someone whose faith you respect",
            ],
            "He makes straight the paths of those who acknowledge Him.",
        );
        add(
            "wisdom",
            "Walking in Wisdom",
            &["Ask God for wisdom, who gives generously without reproach"],
            "Wisdom begins with trusting the Lord more than your own understanding.",
        );
        add(
            "love",
            "Rooted in God's Love",
            &["Reflect on one concrete way God has shown His love for you"],
            "Nothing can separate you from the love of God.",
        );
        add(
            "gratitude",
            "A Heart of Gratitude",
            &["List three things you are thankful for before the day ends"],
            "Gratitude turns what you have into enough.",
        );
        add(
            "faith",
            "Growing in Faith",
            &["Act on one promise of God this week as if it were certain"],
            "Faith grows by taking God at His word.",
        );
        add(
            "salvation",
            "The Gift of Salvation",
            &["Thank God for the gift that was given before you asked"],
            "Whoever believes in Him shall not perish but have eternal life.",
        );

        let fallback = ThemeEntry {
            title: "Encouragement from God's Word".to_string(),
            actions: vec![
                "Spend a few minutes with these verses in quiet reflection".to_string(),
                "Return to the verse that spoke most directly to you".to_string(),
            ],
            encouragement: "God's word meets you exactly where you are today.".to_string(),
        };

        Self { entries, fallback }
    }

    /// Library entry for a theme, or the generic fallback entry.
    pub fn entry(&self, theme: &str) -> &ThemeEntry {
        self.entries.get(theme).unwrap_or(&self.fallback)
    }

    /// The fallback entry used when no theme matched at all.
    pub fn fallback(&self) -> &ThemeEntry {
        &self.fallback
    }
}
