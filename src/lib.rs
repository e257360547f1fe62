//! # Verse Engine
//!
//! Relevance retrieval and reflection synthesis for a scripture verse
//! finder: a free-text emotional or spiritual concern goes in, ranked
//! verses and a structured reflection come out.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Normalizer │──▶│    Ranker    │──▶│ Synthesizer │
//! │ tokens +   │   │ lexical +    │   │ template /  │
//! │ themes     │   │ thematic +   │   │ generative  │
//! └────────────┘   │ semantic     │   └──────┬──────┘
//!                  └──────┬───────┘          │
//!                         │    ┌─────────────┘
//!                         ▼    ▼
//!                   ┌───────────────┐
//!                   │ Engine facade │──▶ HTTP (axum)
//!                   │ cache+timeout │
//!                   └───────────────┘
//! ```
//!
//! The corpus is an immutable snapshot shared read-only by all requests;
//! reload swaps the whole snapshot atomically.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed error taxonomy |
//! | [`corpus`] | Corpus load, lookup, hot-swap |
//! | [`themes`] | Theme taxonomy and reflection libraries |
//! | [`normalize`] | Query normalization and theme detection |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`rank`] | Relevance ranking |
//! | [`synthesize`] | Reflection synthesis |
//! | [`engine`] | Facade: pipeline, cache, timeouts |
//! | [`server`] | HTTP API |

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod models;
pub mod normalize;
pub mod rank;
pub mod server;
pub mod synthesize;
pub mod themes;
