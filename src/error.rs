//! Typed error taxonomy for the engine.
//!
//! Every failure mode that crosses a module boundary is a variant here, so
//! the HTTP layer can map errors to status codes without string matching.
//! Corpus load failures are fatal at startup; everything else is
//! request-scoped.

use thiserror::Error;

/// All errors produced by the engine pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The corpus source was malformed or empty. Fatal at startup.
    #[error("corpus load failed: {0}")]
    CorpusLoad(String),

    /// The query text was blank and no bullet points were supplied.
    #[error("query must not be empty")]
    EmptyQuery,

    /// A caller-supplied argument was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No verse exists with the requested reference.
    #[error("verse not found: {0}")]
    NotFound(String),

    /// Reflection synthesis was invoked with no ranked verses.
    #[error("reflection synthesis requires at least one verse")]
    InsufficientInput,

    /// A pipeline stage exceeded its time budget.
    #[error("{stage} stage timed out after {budget_ms}ms")]
    Timeout { stage: &'static str, budget_ms: u64 },

    /// A remote capability (embeddings or generation) failed.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_includes_stage_and_budget() {
        let err = EngineError::Timeout {
            stage: "ranking",
            budget_ms: 50,
        };
        assert_eq!(err.to_string(), "ranking stage timed out after 50ms");
    }

    #[test]
    fn not_found_carries_reference() {
        let err = EngineError::NotFound("Obadiah 2:1".to_string());
        assert!(err.to_string().contains("Obadiah 2:1"));
    }
}
