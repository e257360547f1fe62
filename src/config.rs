use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file. There is no CLI surface;
/// everything is driven from the config file and environment.
pub const CONFIG_ENV: &str = "VERSE_ENGINE_CONFIG";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub path: PathBuf,
    /// Optional keyword-to-theme taxonomy override file (JSON). When absent,
    /// the built-in taxonomy is used.
    #[serde(default)]
    pub taxonomy_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f64,
    #[serde(default = "default_weight_lexical")]
    pub weight_lexical: f64,
    #[serde(default = "default_weight_thematic")]
    pub weight_thematic: f64,
    #[serde(default = "default_weight_semantic")]
    pub weight_semantic: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            relevance_floor: default_relevance_floor(),
            weight_lexical: default_weight_lexical(),
            weight_thematic: default_weight_thematic(),
            weight_semantic: default_weight_semantic(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_relevance_floor() -> f64 {
    0.0
}
fn default_weight_lexical() -> f64 {
    0.3
}
fn default_weight_thematic() -> f64 {
    0.4
}
fn default_weight_semantic() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_entries: default_cache_max_entries(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}
fn default_cache_max_entries() -> u64 {
    1024
}
fn default_cache_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutConfig {
    /// Budget for normalization plus ranking. The in-memory pipeline is
    /// expected to be sub-millisecond; this bounds pathological inputs.
    #[serde(default = "default_rank_timeout_ms")]
    pub rank_ms: u64,
    /// Budget for reflection synthesis. The generative backend may be slow,
    /// so it gets its own, longer budget.
    #[serde(default = "default_synthesis_timeout_ms")]
    pub synthesis_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            rank_ms: default_rank_timeout_ms(),
            synthesis_ms: default_synthesis_timeout_ms(),
        }
    }
}

fn default_rank_timeout_ms() -> u64 {
    250
}
fn default_synthesis_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `"template"` for the deterministic path, `"remote"` for a generative
    /// HTTP backend.
    #[serde(default = "default_template")]
    pub backend: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    /// When the remote backend fails, fall back to the template path instead
    /// of failing the request.
    #[serde(default = "default_fallback")]
    pub fallback_to_template: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: default_template(),
            endpoint: None,
            timeout_secs: default_generation_timeout_secs(),
            fallback_to_template: default_fallback(),
        }
    }
}

impl GenerationConfig {
    pub fn is_remote(&self) -> bool {
        self.backend == "remote"
    }
}

fn default_template() -> String {
    "template".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    30
}
fn default_fallback() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Resolve the config file path from the environment, defaulting to
/// `./config/engine.toml`.
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./config/engine.toml"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if !(1..=10).contains(&config.retrieval.top_k) {
        anyhow::bail!("retrieval.top_k must be between 1 and 10");
    }

    if !(0.0..1.0).contains(&config.retrieval.relevance_floor) {
        anyhow::bail!("retrieval.relevance_floor must be in [0.0, 1.0)");
    }

    let weights = [
        config.retrieval.weight_lexical,
        config.retrieval.weight_thematic,
        config.retrieval.weight_semantic,
    ];
    if weights.iter().any(|w| *w < 0.0) {
        anyhow::bail!("retrieval weights must be non-negative");
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        anyhow::bail!("at least one retrieval weight must be positive");
    }

    if config.cache.enabled && (config.cache.max_entries == 0 || config.cache.ttl_secs == 0) {
        anyhow::bail!("cache.max_entries and cache.ttl_secs must be > 0 when cache is enabled");
    }

    if config.timeouts.rank_ms == 0 || config.timeouts.synthesis_ms == 0 {
        anyhow::bail!("timeouts must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.generation.backend.as_str() {
        "template" | "remote" => {}
        other => anyhow::bail!(
            "Unknown generation backend: '{}'. Must be template or remote.",
            other
        ),
    }
    if config.generation.is_remote() && config.generation.endpoint.is_none() {
        anyhow::bail!("generation.endpoint must be specified when backend is 'remote'");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let f = write_config("[corpus]\npath = \"data/verses.json\"\n");
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.relevance_floor, 0.0);
        assert!((config.retrieval.weight_thematic - 0.4).abs() < 1e-12);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 300);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.generation.backend, "template");
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn rejects_out_of_range_top_k() {
        let f = write_config(
            "[corpus]\npath = \"data/verses.json\"\n[retrieval]\ntop_k = 11\n",
        );
        assert!(load_config(f.path()).is_err());

        let f = write_config(
            "[corpus]\npath = \"data/verses.json\"\n[retrieval]\ntop_k = 0\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn rejects_enabled_embedding_without_model() {
        let f = write_config(
            "[corpus]\npath = \"data/verses.json\"\n[embedding]\nprovider = \"openai\"\ndims = 1536\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn rejects_unknown_provider_and_backend() {
        let f = write_config(
            "[corpus]\npath = \"data/verses.json\"\n[embedding]\nprovider = \"carrier-pigeon\"\n",
        );
        assert!(load_config(f.path()).is_err());

        let f = write_config(
            "[corpus]\npath = \"data/verses.json\"\n[generation]\nbackend = \"oracle\"\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn remote_generation_requires_endpoint() {
        let f = write_config(
            "[corpus]\npath = \"data/verses.json\"\n[generation]\nbackend = \"remote\"\n",
        );
        assert!(load_config(f.path()).is_err());

        let f = write_config(
            "[corpus]\npath = \"data/verses.json\"\n[generation]\nbackend = \"remote\"\nendpoint = \"http://localhost:9090/generate\"\n",
        );
        assert!(load_config(f.path()).is_ok());
    }
}
