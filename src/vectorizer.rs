//! # Representation Vector Builder
//!
//! Turns a [`Track`] into a fixed-length [`RepresentationVector`]:
//!
//! ```text
//! [ audio_weight  * minmax(audio features, popularity, age) |
//!   genre_weight  * mean(genre token embeddings)            |
//!   artist_weight * embedding(primary artist)               ]
//! ```
//!
//! The normalizer is fit once over the whole catalog and the embedding tables
//! are loaded once at startup; both are read-only afterwards. Built vectors
//! are cached per track id.

use log::{debug, trace, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::config::VectorWeights;
use crate::models::{RepresentationVector, Track, SCALED_FEATURE_COUNT};

/// Per-column min-max scaler over the catalog's scalar track features.
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxNormalizer {
    mins: [f64; SCALED_FEATURE_COUNT],
    maxs: [f64; SCALED_FEATURE_COUNT],
}

impl MinMaxNormalizer {
    /// Fit column ranges over `tracks`, ignoring NaN cells.
    pub fn fit<'a>(tracks: impl IntoIterator<Item = &'a Track>) -> Self {
        let mut mins = [f64::INFINITY; SCALED_FEATURE_COUNT];
        let mut maxs = [f64::NEG_INFINITY; SCALED_FEATURE_COUNT];

        for track in tracks {
            for (column, value) in track.scaled_values().into_iter().enumerate() {
                if value.is_nan() {
                    continue;
                }
                mins[column] = mins[column].min(value);
                maxs[column] = maxs[column].max(value);
            }
        }

        Self { mins, maxs }
    }

    /// Scale each column into the fitted range. Constant or empty columns map
    /// to 0.0; NaN cells stay NaN.
    #[must_use]
    pub fn transform(&self, track: &Track) -> [f64; SCALED_FEATURE_COUNT] {
        let mut scaled = track.scaled_values();
        for (column, value) in scaled.iter_mut().enumerate() {
            if value.is_nan() {
                continue;
            }
            let range = self.maxs[column] - self.mins[column];
            *value = if range > 0.0 {
                (*value - self.mins[column]) / range
            } else {
                0.0
            };
        }
        scaled
    }
}

/// Lower-case a genre tag, collapse whitespace, and fold the multi-word
/// spellings the genre vocabulary stores as single tokens.
#[must_use]
pub fn clean_genre(tag: &str) -> String {
    let collapsed = tag
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed.replace("hip hop", "hiphop").replace("r&b", "rb")
}

/// Genre-token and artist-identity embeddings.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingTable {
    genres: HashMap<String, Vec<f64>>,
    artists: HashMap<String, Vec<f64>>,
    genre_dim: usize,
    artist_dim: usize,
}

impl EmbeddingTable {
    /// Build the table. The dimension of each family is taken from its first
    /// entry in key order; entries of any other length are dropped.
    pub fn new(genres: HashMap<String, Vec<f64>>, artists: HashMap<String, Vec<f64>>) -> Self {
        let (genres, genre_dim) = Self::uniform(genres, "genre");
        let (artists, artist_dim) = Self::uniform(artists, "artist");
        debug!(
            "Embedding table: {} genre tokens ({genre_dim}d), {} artists ({artist_dim}d)",
            genres.len(),
            artists.len()
        );
        Self {
            genres,
            artists,
            genre_dim,
            artist_dim,
        }
    }

    fn uniform(entries: HashMap<String, Vec<f64>>, family: &str) -> (HashMap<String, Vec<f64>>, usize) {
        let sorted: BTreeMap<String, Vec<f64>> = entries.into_iter().collect();
        let dim = sorted.values().next().map_or(0, Vec::len);
        let kept = sorted
            .into_iter()
            .filter(|(key, vector)| {
                let keep = vector.len() == dim;
                if !keep {
                    warn!("Dropping {family} embedding `{key}': expected {dim} dims, got {}", vector.len());
                }
                keep
            })
            .collect();
        (kept, dim)
    }

    #[must_use]
    pub const fn genre_dim(&self) -> usize {
        self.genre_dim
    }

    #[must_use]
    pub const fn artist_dim(&self) -> usize {
        self.artist_dim
    }

    /// Mean embedding of every known token across the cleaned genre tags.
    /// `None` when no token resolves.
    #[must_use]
    pub fn genre_embedding(&self, tags: &[String]) -> Option<Vec<f64>> {
        let mut sum = vec![0.0_f64; self.genre_dim];
        let mut found = 0usize;

        for tag in tags {
            let cleaned = clean_genre(tag);
            for token in cleaned.split_whitespace() {
                if let Some(vector) = self.genres.get(token) {
                    for (acc, value) in sum.iter_mut().zip(vector) {
                        *acc += value;
                    }
                    found += 1;
                }
            }
        }

        if found == 0 {
            return None;
        }
        let count = found as f64;
        Some(sum.into_iter().map(|value| value / count).collect())
    }

    #[must_use]
    pub fn artist_embedding(&self, artist_id: &str) -> Option<&[f64]> {
        self.artists.get(artist_id.trim()).map(Vec::as_slice)
    }
}

/// Builds and caches representation vectors.
#[derive(Debug)]
pub struct VectorBuilder {
    normalizer: MinMaxNormalizer,
    embeddings: EmbeddingTable,
    weights: VectorWeights,
    cache: RwLock<HashMap<String, RepresentationVector>>,
}

impl VectorBuilder {
    #[must_use]
    pub fn new(normalizer: MinMaxNormalizer, embeddings: EmbeddingTable, weights: VectorWeights) -> Self {
        Self {
            normalizer,
            embeddings,
            weights,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Length of every vector this builder produces.
    #[must_use]
    pub const fn vector_len(&self) -> usize {
        SCALED_FEATURE_COUNT + self.embeddings.genre_dim() + self.embeddings.artist_dim()
    }

    /// Pre-populate the cache with vectors computed earlier by an identical
    /// builder. Vectors of the wrong length are ignored.
    pub fn seed_cache(&self, vectors: impl IntoIterator<Item = (String, RepresentationVector)>) {
        let expected = self.vector_len();
        let mut cache = self.cache.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        for (id, vector) in vectors {
            if vector.len() == expected && !vector.iter().any(|value| value.is_nan()) {
                cache.insert(id, vector);
            }
        }
    }

    /// Representation vector for `track`, or `None` when the track has no
    /// resolvable genre tokens, no primary-artist embedding, or any NaN
    /// component.
    pub fn build(&self, track: &Track) -> Option<RepresentationVector> {
        if let Some(vector) = self
            .cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&track.id)
        {
            return Some(vector.clone());
        }

        let vector = self.compute(track)?;

        // Concurrent misses may both compute; last writer wins.
        self.cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(track.id.clone(), vector.clone());
        Some(vector)
    }

    fn compute(&self, track: &Track) -> Option<RepresentationVector> {
        if track.genres.is_empty() {
            trace!("Track `{}' has no genre tags", track.id);
            return None;
        }
        let genre = self.embeddings.genre_embedding(&track.genres).or_else(|| {
            trace!("Track `{}' has no known genre tokens", track.id);
            None
        })?;
        let artist = track
            .primary_artist()
            .and_then(|credit| self.embeddings.artist_embedding(&credit.id))
            .or_else(|| {
                trace!("Track `{}' has no primary artist embedding", track.id);
                None
            })?;

        let mut vector = Vec::with_capacity(self.vector_len());
        vector.extend(self.normalizer.transform(track).iter().map(|v| v * self.weights.audio));
        vector.extend(genre.iter().map(|v| v * self.weights.genre));
        vector.extend(artist.iter().map(|v| v * self.weights.artist));

        if vector.iter().any(|value| value.is_nan()) {
            debug!("Rejecting vector with NaN component for track `{}'", track.id);
            return None;
        }
        Some(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::track;

    fn table() -> EmbeddingTable {
        let genres = HashMap::from([
            ("indie".to_string(), vec![1.0, 0.0]),
            ("rock".to_string(), vec![0.0, 1.0]),
            ("hiphop".to_string(), vec![0.5, 0.5]),
        ]);
        let artists = HashMap::from([("artist-bicep".to_string(), vec![0.25, 0.75, 1.0])]);
        EmbeddingTable::new(genres, artists)
    }

    fn builder() -> VectorBuilder {
        let mut low = track("low", "Bicep", "Low");
        low.audio.danceability = 0.0;
        low.audio.tempo = 60.0;
        let mut high = track("high", "Bicep", "High");
        high.audio.danceability = 1.0;
        high.audio.tempo = 180.0;
        let normalizer = MinMaxNormalizer::fit([&low, &high]);
        VectorBuilder::new(normalizer, table(), VectorWeights::default())
    }

    #[test]
    fn test_clean_genre() {
        assert_eq!(clean_genre("  Hip   Hop "), "hiphop");
        assert_eq!(clean_genre("R&B"), "rb");
        assert_eq!(clean_genre("Indie Rock"), "indie rock");
    }

    #[test]
    fn test_normalizer_scales_into_fitted_range() {
        let mut low = track("a", "X", "A");
        low.audio.tempo = 100.0;
        let mut high = track("b", "X", "B");
        high.audio.tempo = 200.0;
        let normalizer = MinMaxNormalizer::fit([&low, &high]);

        let mut mid = track("c", "X", "C");
        mid.audio.tempo = 150.0;
        let scaled = normalizer.transform(&mid);
        assert!((scaled[3] - 0.5).abs() < 1e-12);
        // Constant column (danceability 0.5 everywhere) collapses to zero.
        assert_eq!(scaled[0], 0.0);
    }

    #[test]
    fn test_genre_embedding_averages_tokens() {
        let embedding = table().genre_embedding(&["Indie Rock".to_string()]).unwrap();
        assert_eq!(embedding, vec![0.5, 0.5]);
        assert!(table().genre_embedding(&["polka".to_string()]).is_none());
    }

    #[test]
    fn test_build_concatenates_weighted_blocks() {
        let builder = builder();
        let vector = builder.build(&track("t1", "Bicep", "Glue")).unwrap();

        assert_eq!(vector.len(), builder.vector_len());
        assert_eq!(vector.len(), SCALED_FEATURE_COUNT + 2 + 3);
        assert_eq!(&vector[SCALED_FEATURE_COUNT..SCALED_FEATURE_COUNT + 2], &[0.5, 0.5]);
        assert_eq!(&vector[SCALED_FEATURE_COUNT + 2..], &[0.25, 0.75, 1.0]);
    }

    #[test]
    fn test_build_applies_block_weights() {
        let normalizer = MinMaxNormalizer::fit([&track("t1", "Bicep", "Glue")]);
        let weights = VectorWeights {
            audio: 1.0,
            genre: 2.0,
            artist: 0.0,
        };
        let builder = VectorBuilder::new(normalizer, table(), weights);
        let vector = builder.build(&track("t1", "Bicep", "Glue")).unwrap();

        assert_eq!(&vector[SCALED_FEATURE_COUNT..SCALED_FEATURE_COUNT + 2], &[1.0, 1.0]);
        assert!(vector[SCALED_FEATURE_COUNT + 2..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_unvectorizable_tracks() {
        let builder = builder();

        let mut no_genres = track("t1", "Bicep", "Glue");
        no_genres.genres.clear();
        assert!(builder.build(&no_genres).is_none());

        let unknown_artist = track("t2", "Nobody", "Silence");
        assert!(builder.build(&unknown_artist).is_none());

        let mut nan_popularity = track("t3", "Bicep", "Atlas");
        nan_popularity.popularity.mean = f64::NAN;
        assert!(builder.build(&nan_popularity).is_none(), "NaN components are rejected");
    }

    #[test]
    fn test_seeded_cache_wins_over_computation() {
        let builder = builder();
        let cached = vec![9.0; builder.vector_len()];
        builder.seed_cache([("t1".to_string(), cached.clone())]);
        assert_eq!(builder.build(&track("t1", "Bicep", "Glue")), Some(cached));

        builder.seed_cache([("t2".to_string(), vec![1.0])]);
        assert!(builder.build(&track("t2", "Nobody", "Silence")).is_none());
    }
}
