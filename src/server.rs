//! HTTP surface for the engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/verses/search` | Rank verses for a prompt and synthesize a reflection |
//! | `GET`  | `/verses/theme/{theme}` | List verses tagged with a theme |
//! | `GET`  | `/verses/{reference}` | Full verse detail with context and related passages |
//! | `POST` | `/reflection/generate` | Synthesize a reflection for a chosen verse set |
//! | `POST` | `/corpus/reload` | Swap in a freshly loaded corpus snapshot |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Every error response carries `success: false` and a message; engine
//! errors map to 400/404/408/503 through their typed variants, never by
//! message inspection.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser frontend
//! can call the engine directly.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::engine::{Engine, SearchOptions};
use crate::error::EngineError;
use crate::models::{RankedResult, Reflection, ScoreBreakdown, Verse};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

/// Starts the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config, engine: Arc<Engine>) -> anyhow::Result<()> {
    let state = AppState { engine };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/verses/search", post(handle_search))
        .route("/verses/theme/{theme}", get(handle_verses_by_theme))
        .route("/verses/{reference}", get(handle_verse_detail))
        .route("/reflection/generate", post(handle_generate_reflection))
        .route("/corpus/reload", post(handle_reload))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(bind = %config.server.bind, "engine listening");

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let status = match err {
            EngineError::EmptyQuery
            | EngineError::InvalidArgument(_)
            | EngineError::InsufficientInput => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            EngineError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::CorpusLoad(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

// ============ Wire shapes ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody {
    main_prompt: String,
    #[serde(default)]
    bullet_points: Vec<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RankedResultDto {
    reference: String,
    text: String,
    translation: String,
    relevance_score: f64,
    matched_themes: Vec<String>,
    score_breakdown: ScoreBreakdown,
}

impl From<RankedResult> for RankedResultDto {
    fn from(result: RankedResult) -> Self {
        Self {
            reference: result.verse.reference.to_string(),
            text: result.verse.text,
            translation: result.verse.translation,
            relevance_score: result.relevance_score,
            matched_themes: result.matched_themes,
            score_breakdown: result.breakdown,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    success: bool,
    verses: Vec<RankedResultDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reflection: Option<Reflection>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerseContextDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_verses: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_verses: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerseDetailDto {
    reference: String,
    text: String,
    book: String,
    chapter: u16,
    verse: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    verse_end: Option<u16>,
    translation: String,
    themes: Vec<String>,
    context: VerseContextDto,
    related_verses: Vec<crate::models::RelatedVerse>,
}

impl From<Verse> for VerseDetailDto {
    fn from(verse: Verse) -> Self {
        Self {
            reference: verse.reference.to_string(),
            text: verse.text,
            book: verse.reference.book,
            chapter: verse.reference.chapter,
            verse: verse.reference.verse_start,
            verse_end: verse.reference.verse_end,
            translation: verse.translation,
            themes: verse.themes,
            context: VerseContextDto {
                previous_verses: verse.context_previous,
                next_verses: verse.context_next,
            },
            related_verses: verse.related,
        }
    }
}

#[derive(Serialize)]
struct VerseDetailResponse {
    success: bool,
    verse: VerseDetailDto,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThemeVerseDto {
    reference: String,
    text: String,
    relevance_score: f64,
}

#[derive(Serialize)]
struct ThemeResponse {
    success: bool,
    theme: String,
    verses: Vec<ThemeVerseDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReflectionBody {
    /// Verse references to ground the reflection in.
    verses: Vec<String>,
    #[serde(default)]
    user_prompt: String,
}

#[derive(Serialize)]
struct ReflectionResponse {
    success: bool,
    reflection: Reflection,
}

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    verses: usize,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

// ============ Handlers ============

async fn handle_search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, AppError> {
    let outcome = state
        .engine
        .search(
            &body.main_prompt,
            &body.bullet_points,
            SearchOptions { top_k: body.top_k },
        )
        .await?;

    Ok(Json(SearchResponse {
        success: true,
        verses: outcome.verses.into_iter().map(Into::into).collect(),
        reflection: outcome.reflection,
    }))
}

async fn handle_verse_detail(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<VerseDetailResponse>, AppError> {
    let verse = state.engine.verse_detail(&reference)?;
    Ok(Json(VerseDetailResponse {
        success: true,
        verse: verse.into(),
    }))
}

async fn handle_verses_by_theme(
    State(state): State<AppState>,
    Path(theme): Path<String>,
) -> Result<Json<ThemeResponse>, AppError> {
    let verses = state
        .engine
        .verses_by_theme(&theme)
        .into_iter()
        .map(|v| ThemeVerseDto {
            reference: v.reference.to_string(),
            text: v.text,
            relevance_score: 1.0,
        })
        .collect();

    Ok(Json(ThemeResponse {
        success: true,
        theme: theme.trim().to_lowercase(),
        verses,
    }))
}

async fn handle_generate_reflection(
    State(state): State<AppState>,
    Json(body): Json<ReflectionBody>,
) -> Result<Json<ReflectionResponse>, AppError> {
    let reflection = state.engine.reflect(&body.verses, &body.user_prompt).await?;
    Ok(Json(ReflectionResponse {
        success: true,
        reflection,
    }))
}

async fn handle_reload(
    State(state): State<AppState>,
) -> Result<Json<ReloadResponse>, AppError> {
    let verses = state.engine.reload_corpus().await?;
    Ok(Json(ReloadResponse {
        success: true,
        verses,
    }))
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
