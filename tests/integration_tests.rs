//! # Integration Tests for MusicOs
//!
//! End-to-end sessions over a real SQLite catalog: import a catalog document,
//! precompute vectors, build the engine and ask for recommendations.

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use musicos::config::EngineConfig;
use musicos::db::SqliteStore;
use musicos::error::{CatalogError, EngineError};
use musicos::filter::{Mode, SessionSettings};
use musicos::ingest::{self, CatalogDocument};
use musicos::repository::{RetryingProvider, StoreCatalog};
use musicos::session::RecommendationEngine;

type Engine = RecommendationEngine<RetryingProvider<StoreCatalog>>;

fn track(id: &str, name: &str, artist: (&str, &str), danceability: f64, release: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "album": {"id": format!("{id}-album"), "name": name, "release_date": release},
        "artists": [{"id": artist.0, "name": artist.1}],
        "audio_features": {
            "danceability": danceability, "energy": 0.7, "valence": 0.4, "tempo": 124.0,
            "loudness": -8.0, "speechiness": 0.05, "acousticness": 0.1,
            "instrumentalness": 0.7, "liveness": 0.1
        }
    })
}

/// Bicep: six tracks with danceability around the high/mid boundary plus
/// three editions of "Glue". Nils: six low-danceability classical tracks.
fn catalog_document() -> CatalogDocument {
    let bicep = ("bicep", "Bicep");
    let nils = ("nils", "Nils Frahm");

    let mut tracks: Vec<Value> = [0.5, 0.6, 0.64, 0.65, 0.8, 0.9]
        .iter()
        .enumerate()
        .map(|(i, d)| track(&format!("b{i}"), &format!("Bicep Track {i}"), bicep, *d, &format!("201{i}-06-01")))
        .collect();
    tracks.push(track("glue", "Glue", bicep, 0.7, "2017-09-01"));
    tracks.push(track("glue-remaster", "Glue - 2020 Remaster", bicep, 0.7, "2020-01-10"));
    tracks.push(track("glue-remix", "Glue - Hammer Remix", bicep, 0.7, "2021-03-05"));
    tracks.extend((0..6).map(|i| track(&format!("n{i}"), &format!("Nils Piece {i}"), nils, 0.2, "2015")));

    serde_json::from_value(json!({
        "artists": [
            {"id": "bicep", "name": "Bicep", "popularity": 62, "genres": ["electronica"]},
            {"id": "nils", "name": "Nils Frahm", "popularity": 55, "genres": ["modern classical"]}
        ],
        "tracks": tracks,
        "playlists": [{"id": "warmup", "track_ids": ["b0", "b1"]}],
        "genre_embeddings": {
            "electronica": [1.0, 0.0],
            "modern": [0.0, 1.0],
            "classical": [0.0, 1.0]
        },
        "artist_embeddings": {"bicep": [1.0, 0.0], "nils": [0.0, 1.0]}
    }))
    .expect("catalog document should deserialize")
}

/// Create, import and vectorize a catalog in a temporary directory.
fn create_test_catalog() -> Result<(TempDir, PathBuf)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("catalog.db");

    let store = SqliteStore::init(&db_path, false)?;
    let today = NaiveDate::from_ymd_opt(2024, 10, 1).expect("valid date");
    ingest::import_catalog(&store, catalog_document(), today)?;
    ingest::build_vectors(&store, EngineConfig::default().vector)?;

    Ok((temp_dir, db_path))
}

fn open_engine(db_path: &std::path::Path) -> Result<Engine> {
    let store = Arc::new(SqliteStore::open(db_path)?);
    let config = EngineConfig::default();
    let provider = RetryingProvider::new(StoreCatalog::new(store.clone())?, &config.retry);
    Ok(RecommendationEngine::new(&*store, provider, config)?)
}

fn ids(engine: &Engine, settings: &SessionSettings) -> Vec<String> {
    engine
        .recommend(settings)
        .expect("recommend should not fail")
        .into_iter()
        .map(|recommendation| recommendation.track.id)
        .collect()
}

#[test]
fn test_import_persists_across_connections() -> Result<()> {
    let (_temp_dir, db_path) = create_test_catalog()?;

    let counts = SqliteStore::open(&db_path)?.counts()?;
    assert_eq!(counts.tracks, 15);
    assert_eq!(counts.artists, 2);
    assert_eq!(counts.vectors, 15, "every track has a genre token and an artist embedding");
    assert_eq!(counts.playlists, 1);

    let engine = open_engine(&db_path)?;
    assert_eq!(engine.indexed_tracks(), 15);
    Ok(())
}

#[test]
fn test_empty_session_recommends_nothing() -> Result<()> {
    let (_temp_dir, db_path) = create_test_catalog()?;
    let engine = open_engine(&db_path)?;

    assert!(engine.generate_recommendations(&SessionSettings::default())?.is_empty());
    assert!(engine.cluster_projection()?.is_empty());
    Ok(())
}

#[test]
fn test_single_track_session() -> Result<()> {
    let (_temp_dir, db_path) = create_test_catalog()?;
    let engine = open_engine(&db_path)?;

    engine.add_to_session("spotify:track:b0", "alice")?;
    let recommendations = engine.generate_recommendations(&SessionSettings::default())?;

    assert!(!recommendations.is_empty());
    assert_eq!(recommendations[0].0, "Bicep", "nearest neighbours share the artist");
    assert!(recommendations.iter().all(|(_, title)| title != "Bicep Track 0"));

    let projection = engine.cluster_projection()?;
    assert_eq!(projection.len(), 1);
    assert_eq!(projection[0].segment, Some(0));
    Ok(())
}

#[test]
fn test_same_song_editions_collapse_but_remix_survives() -> Result<()> {
    let (_temp_dir, db_path) = create_test_catalog()?;
    let engine = open_engine(&db_path)?;

    engine.add_to_session("warmup", "alice")?;
    let recommended = ids(&engine, &SessionSettings::default());

    let plain_editions = recommended
        .iter()
        .filter(|id| *id == "glue" || *id == "glue-remaster")
        .count();
    assert_eq!(plain_editions, 1, "Glue and its remaster are one song: {recommended:?}");
    assert!(recommended.contains(&"glue-remix".to_string()));
    assert!(!recommended.contains(&"b0".to_string()) && !recommended.contains(&"b1".to_string()));
    Ok(())
}

#[test]
fn test_feature_band_boundaries_are_inclusive() -> Result<()> {
    let (_temp_dir, db_path) = create_test_catalog()?;
    let engine = open_engine(&db_path)?;
    engine.add_to_session("b0", "alice")?;

    let settings = SessionSettings {
        danceability: Mode::High,
        ..SessionSettings::default()
    };
    let recommended = ids(&engine, &settings);

    assert!(recommended.contains(&"b3".to_string()), "0.65 is inside the high band");
    assert!(!recommended.contains(&"b2".to_string()), "0.64 is below the high band");
    assert!(recommended.iter().all(|id| !id.starts_with('n')));
    Ok(())
}

#[test]
fn test_genre_rules() -> Result<()> {
    let (_temp_dir, db_path) = create_test_catalog()?;
    let engine = open_engine(&db_path)?;
    engine.add_to_session("b0", "alice")?;
    engine.add_to_session("n0", "bob")?;

    let classical_only = SessionSettings {
        include_genres: vec!["Classical".to_string()],
        ..SessionSettings::default()
    };
    let recommended = ids(&engine, &classical_only);
    assert!(!recommended.is_empty());
    assert!(recommended.iter().all(|id| id.starts_with('n')), "{recommended:?}");

    let contradictory = SessionSettings {
        include_genres: vec!["electronica".to_string()],
        exclude_genres: vec!["electronica".to_string()],
        ..SessionSettings::default()
    };
    assert!(ids(&engine, &contradictory).is_empty(), "exclusion wins over inclusion");
    Ok(())
}

#[test]
fn test_unknown_reference_leaves_session_untouched() -> Result<()> {
    let (_temp_dir, db_path) = create_test_catalog()?;
    let engine = open_engine(&db_path)?;
    engine.add_to_session("b0", "alice")?;

    let result = engine.add_to_session("https://open.spotify.com/track/missing", "bob");
    assert!(matches!(result, Err(EngineError::Catalog(CatalogError::NotFound(_)))));
    assert_eq!(engine.session_statistics()?.track_count, 1);

    let unsupported = engine.add_to_session("https://open.spotify.com/album/abc", "bob");
    assert!(unsupported.is_err());
    Ok(())
}

#[test]
fn test_session_statistics_over_contributors() -> Result<()> {
    let (_temp_dir, db_path) = create_test_catalog()?;
    let engine = open_engine(&db_path)?;
    engine.add_to_session("warmup", "alice")?;
    engine.add_to_session("n0", "bob")?;
    engine.add_to_session("b0", "bob")?;

    let stats = engine.session_statistics()?;
    assert_eq!(stats.track_count, 4, "duplicates across contributors are counted");
    assert!((stats.means["danceability"] - (0.5 + 0.6 + 0.2 + 0.5) / 4.0).abs() < 1e-9);
    assert_eq!(stats.top_genres[0], ("electronica".to_string(), 3));

    engine.reset_session()?;
    assert_eq!(engine.session_statistics()?.track_count, 0);
    Ok(())
}

#[test]
fn test_engine_needs_vectors() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("empty.db");
    SqliteStore::init(&db_path, false)?;

    let result = open_engine(&db_path);
    assert!(result.is_err(), "an empty catalog cannot serve recommendations");
    Ok(())
}

#[test]
fn test_init_refuses_to_overwrite_without_force() -> Result<()> {
    let (_temp_dir, db_path) = create_test_catalog()?;

    assert!(SqliteStore::init(&db_path, false).is_err());
    let store = SqliteStore::init(&db_path, true)?;
    assert_eq!(store.counts()?.tracks, 0);
    Ok(())
}
