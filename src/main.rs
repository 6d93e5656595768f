//! # MusicOs
//!
//! Command-line front end for the recommendation engine. Each invocation is
//! one listening session: `--add` submissions populate the pool, then the
//! command asks for recommendations, statistics or the taste map.
//!
//! ## Usage
//!
//! ```bash
//! # Load a catalog and precompute vectors
//! musicos init-db
//! musicos import catalog.json
//! musicos build-vectors
//!
//! # Recommend for two contributors
//! musicos recommend --add alice=spotify:playlist:mix --add bob=glue --tempo high
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::{CommandFactory, Parser};
use log::info;
use std::fs;
use std::sync::Arc;

use musicos::cli::{self, SessionArgs};
use musicos::completion;
use musicos::config::RuntimeConfig;
use musicos::db::SqliteStore;
use musicos::filter::SessionSettings;
use musicos::ingest::{self, CatalogDocument};
use musicos::repository::{RetryingProvider, StoreCatalog};
use musicos::session::RecommendationEngine;

type Engine = RecommendationEngine<RetryingProvider<StoreCatalog>>;

/// Open the catalog and build an engine over it.
fn open_engine(runtime: RuntimeConfig) -> Result<Engine> {
    let store = Arc::new(SqliteStore::open(&runtime.db_path)?);
    let provider = RetryingProvider::new(StoreCatalog::new(store.clone())?, &runtime.engine.retry);
    let engine = RecommendationEngine::new(&*store, provider, runtime.engine)
        .context("Failed to load the catalog; run `musicos import` and `musicos build-vectors` first")?;
    info!("Engine ready with {} indexed tracks", engine.indexed_tracks());
    Ok(engine)
}

/// Feed every `--add` submission into the session. Unresolvable references
/// are logged and skipped.
fn populate(engine: &Engine, session: &SessionArgs) -> Result<()> {
    let added = engine.add_all_to_session(
        session
            .submissions
            .iter()
            .map(|submission| (submission.reference.as_str(), submission.contributor.as_str())),
    )?;
    info!("Session holds {added} submitted tracks from {} references", session.submissions.len());
    Ok(())
}

/// Main entry point.
///
/// Logging is controlled via `RUST_LOG`:
/// - `RUST_LOG=info musicos recommend ...` - pipeline summary
/// - `RUST_LOG=musicos::profile=debug musicos recommend ...` - clustering detail
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();
    let runtime = RuntimeConfig::resolve(args.db, args.config)?;

    match args.command {
        cli::Command::InitDb { force } => {
            info!("Initializing catalog database at {}", runtime.db_path.display());
            SqliteStore::init(&runtime.db_path, force)?;
            println!("Created {}", runtime.db_path.display());
        }
        cli::Command::Import { path } => {
            let raw = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            let document: CatalogDocument =
                serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))?;

            let store = SqliteStore::open(&runtime.db_path)?;
            let summary = ingest::import_catalog(&store, document, Local::now().date_naive())?;
            println!(
                "Imported {} artists, {} tracks, {} playlists, {} genre tokens, {} artist embeddings",
                summary.artists, summary.tracks, summary.playlists, summary.genre_tokens, summary.artist_embeddings
            );
        }
        cli::Command::BuildVectors => {
            let store = SqliteStore::open(&runtime.db_path)?;
            let (stored, skipped) = ingest::build_vectors(&store, runtime.engine.vector)?;
            println!("Stored {stored} representation vectors ({skipped} tracks skipped)");
        }
        cli::Command::Recommend { session, settings, count, json } => {
            let mut runtime = runtime;
            if let Some(count) = count {
                runtime.engine.curation.total_count = count;
            }
            let engine = open_engine(runtime)?;
            populate(&engine, &session)?;

            let settings = SessionSettings::from(settings);
            if json {
                let recommendations = engine.recommend(&settings)?;
                println!("{}", serde_json::to_string_pretty(&recommendations)?);
            } else {
                let recommendations = engine.generate_recommendations(&settings)?;
                if recommendations.is_empty() {
                    println!("No recommendations for this session.");
                }
                for (artist, title) in recommendations {
                    println!("{artist} - {title}");
                }
            }
        }
        cli::Command::Stats { session } => {
            let engine = open_engine(runtime)?;
            populate(&engine, &session)?;

            let stats = engine.session_statistics()?;
            println!("Tracks submitted: {}", stats.track_count);
            for (feature, mean) in &stats.means {
                println!("  {feature:<18} {mean:>8.3}");
            }
            if !stats.top_genres.is_empty() {
                println!("Top genres:");
                for (genre, n) in &stats.top_genres {
                    println!("  {genre:<24} {n:>4}");
                }
            }
        }
        cli::Command::Projection { session } => {
            let engine = open_engine(runtime)?;
            populate(&engine, &session)?;
            println!("{}", serde_json::to_string_pretty(&engine.cluster_projection()?)?);
        }
        cli::Command::Status => {
            let store = SqliteStore::open(&runtime.db_path)?;
            let counts = store.counts()?;
            println!("Database:          {}", runtime.db_path.display());
            println!("Tracks:            {}", counts.tracks);
            println!("Artists:           {}", counts.artists);
            println!("Vectors:           {}", counts.vectors);
            println!("Genre tokens:      {}", counts.genre_tokens);
            println!("Artist embeddings: {}", counts.artist_embeddings);
            println!("Playlists:         {}", counts.playlists);
        }
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(&shell), &mut cmd);
        }
        cli::Command::CompleteGenres => {
            completion::print_genre_completions(&runtime.db_path)?;
        }
    }

    Ok(())
}
