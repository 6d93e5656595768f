//! Group taste profiling and music recommendation retrieval.
//!
//! Several contributors submit tracks or playlists to one listening session.
//! The engine turns every track into a representation vector, clusters the
//! session's vectors into taste segments, retrieves nearest catalog neighbours
//! per segment, filters them by the session's settings and curates a
//! deduplicated list whose segment shares follow the segment weights.
//!
//! Core modules:
//! - [`session`] - The [`session::RecommendationEngine`] API
//! - [`track_pool`] - Per-contributor submissions and frequency merging
//! - [`vectorizer`] - Min-max scaling and genre/artist embeddings
//! - [`profile`] - t-SNE projection, DBSCAN segmentation, centroids
//! - [`retriever`] - Cosine nearest-neighbour index
//! - [`filter`] - High/mid/low feature bands and genre rules
//! - [`curator`] - Same-song consolidation and per-segment quotas
//!
//! ### Supporting Modules
//!
//! - [`models`] - Tracks, artists, segments and recommendations
//! - [`dto`] - Catalog records as they arrive from the upstream catalog
//! - [`repository`] - Store and catalog traits, caching and retry
//! - [`db`] - SQLite store
//! - [`ingest`] - Catalog import and vector precomputation
//! - [`links`] - Share-link and URI parsing
//! - [`tsne`] - Exact t-SNE
//! - [`config`] - Data directory and engine tuning
//! - [`error`] - Engine and catalog error types
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use musicos::config::EngineConfig;
//! use musicos::db::SqliteStore;
//! use musicos::filter::SessionSettings;
//! use musicos::repository::{RetryingProvider, StoreCatalog};
//! use musicos::session::RecommendationEngine;
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStore::open(&musicos::config::get_db_path()?)?);
//! let config = EngineConfig::default();
//! let provider = RetryingProvider::new(StoreCatalog::new(store.clone())?, &config.retry);
//! let engine = RecommendationEngine::new(&*store, provider, config)?;
//!
//! engine.add_to_session("spotify:playlist:37i9dQZF1DX4dyzvuaRJ0n", "alice")?;
//! engine.add_to_session("https://open.spotify.com/track/2aJDlirz6v2a4HREki98cP", "bob")?;
//!
//! for (artist, title) in engine.generate_recommendations(&SessionSettings::default())? {
//!     println!("{artist} - {title}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Library operations return [`error::EngineResult`]. Command-line plumbing
//! (paths, database setup) returns `anyhow::Result` with context.
//!
//! ## Logging
//!
//! Everything logs through the `log` facade; the binary installs
//! `env_logger`, so `RUST_LOG=musicos=debug` shows the pipeline in detail.

pub mod cli;
pub mod completion;
pub mod config;
pub mod curator;
pub mod db;
pub mod dto;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod links;
pub mod models;
pub mod profile;
pub mod repository;
pub mod retriever;
pub mod session;
pub mod track_pool;
pub mod tsne;
pub mod vectorizer;
