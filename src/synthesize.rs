//! Reflection synthesis: turns ranked verses into a structured reflection.
//!
//! The default path is template-driven and fully deterministic: identical
//! (dominant theme, ordered references) inputs produce byte-identical output.
//! A generative backend can be plugged in; when it fails, synthesis falls
//! back to the template path unless fallback is disabled.

use std::collections::BTreeMap;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::EngineError;
use crate::models::{Query, RankedResult, Reflection};
use crate::themes::ThemeLibrary;

const MAX_ACTION_POINTS: usize = 3;
const MAX_REFERENCES_IN_CONTENT: usize = 2;

/// Capability interface for generative text backends.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a reflection for the given prompt. The response must be a
    /// JSON object with `title`, `content`, `actionPoints`, and
    /// `encouragement` fields.
    async fn generate(&self, prompt: &str) -> Result<Reflection, EngineError>;
}

/// Generative backend calling a remote HTTP service.
pub struct RemoteBackend {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteBackend {
    pub fn new(config: &GenerationConfig) -> Result<Self, EngineError> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            EngineError::InvalidArgument(
                "generation.endpoint required for remote backend".to_string(),
            )
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::BackendUnavailable(e.to_string()))?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl GenerativeBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    async fn generate(&self, prompt: &str) -> Result<Reflection, EngineError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|e| EngineError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::BackendUnavailable(format!(
                "generation endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<Reflection>()
            .await
            .map_err(|e| EngineError::BackendUnavailable(format!("malformed reflection: {}", e)))
    }
}

/// Produces a [`Reflection`] from a query and its ranked verses.
pub struct ReflectionSynthesizer {
    library: ThemeLibrary,
    backend: Option<Box<dyn GenerativeBackend>>,
    fallback_to_template: bool,
}

impl ReflectionSynthesizer {
    /// Template-only synthesizer, the deterministic default.
    pub fn template(library: ThemeLibrary) -> Self {
        Self {
            library,
            backend: None,
            fallback_to_template: true,
        }
    }

    /// Synthesizer that prefers a generative backend.
    pub fn with_backend(
        library: ThemeLibrary,
        backend: Box<dyn GenerativeBackend>,
        fallback_to_template: bool,
    ) -> Self {
        Self {
            library,
            backend: Some(backend),
            fallback_to_template,
        }
    }

    /// Synthesize a reflection. Fails with `InsufficientInput` when there
    /// are no ranked results; callers decide whether to show a "no verses
    /// found" message instead of invoking this.
    pub async fn synthesize(
        &self,
        query: &Query,
        ranked: &[RankedResult],
    ) -> Result<Reflection, EngineError> {
        if ranked.is_empty() {
            return Err(EngineError::InsufficientInput);
        }

        if let Some(backend) = &self.backend {
            match backend.generate(&self.build_prompt(query, ranked)).await {
                Ok(reflection) => return Ok(reflection),
                Err(e) if self.fallback_to_template => {
                    tracing::warn!(
                        backend = backend.name(),
                        error = %e,
                        "generative backend failed, using template path"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(self.template_reflection(ranked))
    }

    /// The deterministic template path: a pure function of the dominant
    /// theme and the ordered references.
    pub fn template_reflection(&self, ranked: &[RankedResult]) -> Reflection {
        let theme_order = themes_by_prevalence(ranked);
        let dominant = theme_order.first().cloned();

        let entry = match &dominant {
            Some(theme) => self.library.entry(theme),
            None => self.library.fallback(),
        };

        let references: Vec<String> = ranked
            .iter()
            .take(MAX_REFERENCES_IN_CONTENT)
            .map(|r| r.verse.reference.to_string())
            .collect();

        let content = match &dominant {
            Some(theme) => format!(
                "God's word speaks into seasons of {}. {} that we are not alone in \
                 our struggles, and that through prayer and trust in Him we can \
                 find the peace that surpasses understanding.",
                theme,
                reference_clause(&references)
            ),
            None => format!(
                "God's word offers comfort and guidance for what you are carrying. \
                 {} that we are not alone in our struggles, and that through \
                 prayer and trust in Him we can find the peace that surpasses \
                 understanding.",
                reference_clause(&references)
            ),
        };

        let mut action_points = Vec::new();
        for theme in &theme_order {
            for action in &self.library.entry(theme).actions {
                if action_points.len() >= MAX_ACTION_POINTS {
                    break;
                }
                if !action_points.contains(action) {
                    action_points.push(action.clone());
                }
            }
        }
        if action_points.is_empty() {
            action_points.extend(
                self.library
                    .fallback()
                    .actions
                    .iter()
                    .take(MAX_ACTION_POINTS)
                    .cloned(),
            );
        }

        Reflection {
            title: entry.title.clone(),
            content,
            action_points,
            encouragement: entry.encouragement.clone(),
        }
    }

    fn build_prompt(&self, query: &Query, ranked: &[RankedResult]) -> String {
        let verses: Vec<String> = ranked
            .iter()
            .map(|r| format!("{} — {}", r.verse.reference, r.verse.text))
            .collect();
        format!(
            "The user shared: \"{}\". Write a short reflection grounded in these \
             verses:\n{}\nRespond as JSON with title, content, actionPoints, and \
             encouragement fields.",
            query.raw_text.trim(),
            verses.join("\n")
        )
    }
}

fn reference_clause(references: &[String]) -> String {
    match references {
        [] => "These verses remind us".to_string(),
        [one] => format!("A passage like {} reminds us", one),
        [a, b, ..] => format!("Passages like {} and {} remind us", a, b),
    }
}

/// Matched themes ordered by prevalence across the results.
///
/// Count descending; ties resolved toward the top-ranked result's matched
/// themes (in their order), then alphabetically. The first element is the
/// dominant theme.
fn themes_by_prevalence(ranked: &[RankedResult]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for result in ranked {
        for theme in &result.matched_themes {
            *counts.entry(theme).or_insert(0) += 1;
        }
    }
    if counts.is_empty() {
        return Vec::new();
    }

    // Rank within the top result's theme list for tie-breaking.
    let top_order: Vec<&str> = ranked[0]
        .matched_themes
        .iter()
        .map(|t| t.as_str())
        .collect();
    let top_rank = |theme: &str| {
        top_order
            .iter()
            .position(|t| *t == theme)
            .unwrap_or(usize::MAX)
    };

    let mut themes: Vec<(&str, usize)> = counts.into_iter().collect();
    themes.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then(top_rank(a.0).cmp(&top_rank(b.0)))
            .then(a.0.cmp(b.0))
    });

    themes.into_iter().map(|(t, _)| t.to_string()).collect()
}
