//! Offline catalog loading: import a catalog document into the store and
//! precompute representation vectors for every stored track.
//!
//! ## Catalog document
//!
//! ```json
//! {
//!   "artists":   [{"id": "...", "name": "...", "popularity": 61, "genres": ["house"]}],
//!   "tracks":    [{"id": "...", "name": "...", "album": {...}, "artists": [...], "audio_features": {...}}],
//!   "playlists": [{"id": "...", "track_ids": ["..."]}],
//!   "genre_embeddings":  {"house": [0.1, 0.2]},
//!   "artist_embeddings": {"<artist id>": [0.3, 0.4]}
//! }
//! ```
//!
//! Every section is optional.

use chrono::NaiveDate;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::VectorWeights;
use crate::dto::{ArtistDto, TrackDto};
use crate::error::EngineResult;
use crate::models::{Artist, RepresentationVector, Track};
use crate::repository::Store;
use crate::vectorizer::{EmbeddingTable, MinMaxNormalizer, VectorBuilder};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistDto {
    pub id: String,
    pub track_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogDocument {
    pub artists: Vec<ArtistDto>,
    pub tracks: Vec<TrackDto>,
    pub playlists: Vec<PlaylistDto>,
    pub genre_embeddings: HashMap<String, Vec<f64>>,
    pub artist_embeddings: HashMap<String, Vec<f64>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub artists: usize,
    pub tracks: usize,
    pub playlists: usize,
    pub genre_tokens: usize,
    pub artist_embeddings: usize,
}

/// Convert and upsert `document`. Track conversion sees both the imported
/// artists and those already stored, so catalogs can be imported in parts.
///
/// # Errors
///
/// Propagates store failures.
pub fn import_catalog(store: &dyn Store, document: CatalogDocument, today: NaiveDate) -> EngineResult<ImportSummary> {
    let imported: Vec<Artist> = document.artists.into_iter().map(Artist::from).collect();

    let mut known = store.load_all_artists()?;
    known.extend(imported.iter().map(|artist| (artist.id.clone(), artist.clone())));

    let tracks: Vec<Track> = document
        .tracks
        .iter()
        .map(|dto| {
            let credited: Vec<Artist> = dto
                .artists
                .iter()
                .filter_map(|credit| {
                    let artist = known.get(&credit.id).cloned();
                    if artist.is_none() {
                        warn!("Track `{}' credits unknown artist `{}'", dto.id, credit.id);
                    }
                    artist
                })
                .collect();
            Track::from_dto(dto, &credited, today)
        })
        .collect();

    let summary = ImportSummary {
        artists: store.upsert_artists(&imported)?,
        tracks: store.upsert_tracks(&tracks)?,
        playlists: document
            .playlists
            .iter()
            .map(|playlist| store.upsert_playlist(&playlist.id, &playlist.track_ids).map(|_| 1))
            .sum::<EngineResult<usize>>()?,
        genre_tokens: store.upsert_genre_embeddings(&document.genre_embeddings)?,
        artist_embeddings: store.upsert_artist_embeddings(&document.artist_embeddings)?,
    };

    info!(
        "Imported {} artists, {} tracks, {} playlists, {} genre tokens, {} artist embeddings",
        summary.artists, summary.tracks, summary.playlists, summary.genre_tokens, summary.artist_embeddings
    );
    Ok(summary)
}

/// Build and store a representation vector for every stored track. Returns
/// `(stored, unvectorizable)`.
///
/// # Errors
///
/// Propagates store failures.
pub fn build_vectors(store: &dyn Store, weights: VectorWeights) -> EngineResult<(usize, usize)> {
    let tracks: Vec<Track> = store.load_all_tracks()?.into_values().collect();
    let builder = VectorBuilder::new(
        MinMaxNormalizer::fit(&tracks),
        EmbeddingTable::new(store.load_genre_embeddings()?, store.load_artist_embeddings()?),
        weights,
    );

    let vectors: Vec<(String, RepresentationVector)> = tracks
        .par_iter()
        .filter_map(|track| builder.build(track).map(|vector| (track.id.clone(), vector)))
        .collect();
    let skipped = tracks.len() - vectors.len();

    let stored = store.upsert_representation_vectors(&vectors)?;
    if skipped > 0 {
        warn!("{skipped} of {} tracks have no usable representation vector", tracks.len());
    }
    Ok((stored, skipped))
}
