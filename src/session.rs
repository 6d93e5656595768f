//! # Listening Session & Recommendation Engine
//!
//! The API the front end talks to. One [`RecommendationEngine`] owns a single
//! listening session: contributors add tracks or playlists, ask for
//! statistics or the cluster projection, and request recommendations.
//!
//! ## Startup
//!
//! [`RecommendationEngine::new`] loads the catalog from the store, fits the
//! min-max normalizer over every track, loads the embedding tables and builds
//! the cosine index over every vectorizable track. All of these are read-only
//! afterwards. An empty index is fatal.
//!
//! ## Request pipeline
//!
//! ```text
//! pool ─ aggregate ─▶ vectors ─ profile ─▶ segments ─ retrieve ─▶ candidates
//!      ─ settings filter ─▶ curate ─▶ recommendations
//! ```
//!
//! An empty pool, no vectorizable tracks, all-noise clustering or an empty
//! candidate set all produce an empty list, never an error.

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::EngineConfig;
use crate::curator;
use crate::error::{CatalogError, EngineError, EngineResult};
use crate::filter::{SessionSettings, SettingsFilter};
use crate::links::{self, CatalogRef};
use crate::models::{AudioFeature, RecommendedTrack, RepresentationVector, TasteSegment, Track, TrackPoolItem};
use crate::profile::ProfileCreator;
use crate::repository::{CatalogProvider, CatalogRepository, Store};
use crate::retriever::NearestNeighborIndex;
use crate::track_pool::TrackPool;
use crate::vectorizer::{EmbeddingTable, MinMaxNormalizer, VectorBuilder};

/// Features averaged in [`SessionStatistics::means`].
const STATISTIC_FEATURES: [AudioFeature; 5] = [
    AudioFeature::Danceability,
    AudioFeature::Energy,
    AudioFeature::Valence,
    AudioFeature::Instrumentalness,
    AudioFeature::Tempo,
];

const TOP_GENRES: usize = 10;

/// Summary of everything submitted to the session, duplicates included.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStatistics {
    /// Mean per audio feature, keyed by feature name. Empty for an empty pool.
    pub means: BTreeMap<String, f64>,
    pub track_count: usize,
    /// Most frequent genre tags with their counts, most frequent first.
    pub top_genres: Vec<(String, usize)>,
}

/// One pool track placed in the 2-D taste map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedPoint {
    pub track_id: String,
    pub track_name: String,
    pub coordinate: [f64; 2],
    /// `None` for outliers.
    pub segment: Option<usize>,
}

pub struct RecommendationEngine<P> {
    config: EngineConfig,
    catalog: CatalogRepository<P>,
    vectors: VectorBuilder,
    index: NearestNeighborIndex,
    profiler: ProfileCreator,
    pool: TrackPool,
}

impl<P> std::fmt::Debug for RecommendationEngine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecommendationEngine")
            .field("config", &self.config)
            .field("indexed", &self.index.len())
            .finish_non_exhaustive()
    }
}

impl<P: CatalogProvider> RecommendationEngine<P> {
    /// Load models and build the index.
    ///
    /// # Errors
    ///
    /// [`EngineError::Store`] when the store cannot be read, and
    /// [`EngineError::IndexUnavailable`] when no catalog track is vectorizable.
    pub fn new(store: &dyn Store, provider: P, config: EngineConfig) -> EngineResult<Self> {
        let catalog = CatalogRepository::seeded(provider, store)?;
        let tracks = catalog.cached_tracks();

        let normalizer = MinMaxNormalizer::fit(&tracks);
        let embeddings = EmbeddingTable::new(store.load_genre_embeddings()?, store.load_artist_embeddings()?);
        let vectors = VectorBuilder::new(normalizer, embeddings, config.vector);
        vectors.seed_cache(store.load_all_representation_vectors()?);

        let indexed: Vec<(String, RepresentationVector)> = tracks
            .par_iter()
            .filter_map(|track| vectors.build(track).map(|vector| (track.id.clone(), vector)))
            .collect();
        info!("Indexing {} of {} catalog tracks", indexed.len(), tracks.len());
        let index = NearestNeighborIndex::build(indexed, &config.retriever)?;

        Ok(Self {
            profiler: ProfileCreator::new(config.profile.clone()),
            config,
            catalog,
            vectors,
            index,
            pool: TrackPool::new(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of tracks in the similarity index.
    #[must_use]
    pub fn indexed_tracks(&self) -> usize {
        self.index.len()
    }

    fn resolve(&self, reference: &CatalogRef) -> Result<Vec<Track>, CatalogError> {
        match reference {
            CatalogRef::Track(id) => Ok(vec![self.catalog.track(id)?]),
            CatalogRef::Playlist(id) => self.catalog.playlist_tracks(id),
            CatalogRef::Unknown(id) => match self.catalog.track(id) {
                Ok(track) => Ok(vec![track]),
                Err(CatalogError::NotFound(_)) => self.catalog.playlist_tracks(id),
                Err(err) => Err(err),
            },
        }
    }

    /// Add a track or a playlist (id, URI or share link) to `contributor`'s
    /// submissions. Returns the number of tracks added.
    ///
    /// # Errors
    ///
    /// [`EngineError::Catalog`] when the reference cannot be resolved; the
    /// pool is left untouched. [`EngineError::PoolUnavailable`] on a poisoned
    /// pool.
    pub fn add_to_session(&self, reference: &str, contributor: &str) -> EngineResult<usize> {
        let parsed = links::parse(reference).ok_or_else(|| CatalogError::NotFound(reference.to_string()))?;
        let tracks = self.resolve(&parsed).map_err(|err| {
            warn!("Could not resolve `{reference}' for {contributor}: {err}");
            EngineError::from(err)
        })?;

        let added = self.pool.add(contributor, tracks)?;
        info!("{contributor} added {added} tracks from `{}'", parsed.id());
        Ok(added)
    }

    /// Add several `(reference, contributor)` submissions. A reference that
    /// cannot be resolved is logged and skipped; the rest still land in the
    /// pool. Returns the number of tracks added.
    ///
    /// # Errors
    ///
    /// [`EngineError::PoolUnavailable`] on a poisoned pool.
    pub fn add_all_to_session<'a>(
        &self,
        submissions: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> EngineResult<usize> {
        let mut added = 0;
        for (reference, contributor) in submissions {
            match self.add_to_session(reference, contributor) {
                Ok(n) => added += n,
                Err(EngineError::Catalog(err)) => warn!("Skipping `{reference}' from {contributor}: {err}"),
                Err(err) => return Err(err),
            }
        }
        Ok(added)
    }

    /// Forget every submission.
    ///
    /// # Errors
    ///
    /// [`EngineError::PoolUnavailable`] on a poisoned pool.
    pub fn reset_session(&self) -> EngineResult<()> {
        self.pool.reset()?;
        info!("Session reset");
        Ok(())
    }

    /// # Errors
    ///
    /// [`EngineError::PoolUnavailable`] on a poisoned pool.
    pub fn session_statistics(&self) -> EngineResult<SessionStatistics> {
        let submissions = self.pool.all_submissions()?;
        if submissions.is_empty() {
            return Ok(SessionStatistics::default());
        }

        let count = submissions.len() as f64;
        let means = STATISTIC_FEATURES
            .iter()
            .map(|feature| {
                let sum: f64 = submissions.iter().map(|track| feature.value(&track.audio)).sum();
                (feature.name().to_string(), sum / count)
            })
            .collect();

        let mut genre_counts: HashMap<&str, usize> = HashMap::new();
        for genre in submissions.iter().flat_map(|track| track.genres.iter()) {
            *genre_counts.entry(genre.as_str()).or_default() += 1;
        }
        let mut top_genres: Vec<(String, usize)> = genre_counts
            .into_iter()
            .map(|(genre, n)| (genre.to_string(), n))
            .collect();
        top_genres.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_genres.truncate(TOP_GENRES);

        Ok(SessionStatistics {
            means,
            track_count: submissions.len(),
            top_genres,
        })
    }

    /// Vectors and pool weights of every vectorizable pool track.
    fn vectorize(
        &self,
        pool: &BTreeMap<String, TrackPoolItem>,
    ) -> (BTreeMap<String, RepresentationVector>, BTreeMap<String, f64>) {
        let mut vectors = BTreeMap::new();
        let mut weights = BTreeMap::new();
        for (id, item) in pool {
            match self.vectors.build(&item.track) {
                Some(vector) => {
                    vectors.insert(id.clone(), vector);
                    weights.insert(id.clone(), item.frequency);
                }
                None => debug!("Pool track `{}' is not vectorizable, leaving it out of the profile", item.track.name),
            }
        }
        (vectors, weights)
    }

    /// 2-D layout of the vectorizable pool tracks with their segments.
    ///
    /// # Errors
    ///
    /// [`EngineError::PoolUnavailable`] on a poisoned pool and
    /// [`EngineError::Clustering`] when clustering fails.
    pub fn cluster_projection(&self) -> EngineResult<Vec<ProjectedPoint>> {
        let pool = self.pool.aggregate()?;
        let (vectors, _) = self.vectorize(&pool);

        Ok(self
            .profiler
            .project(&vectors)?
            .into_iter()
            .map(|placement| ProjectedPoint {
                track_name: pool
                    .get(&placement.track_id)
                    .map(|item| item.track.name.clone())
                    .unwrap_or_default(),
                track_id: placement.track_id,
                coordinate: placement.coordinate,
                segment: placement.segment,
            })
            .collect())
    }

    fn taste_segments(&self, pool: &BTreeMap<String, TrackPoolItem>) -> Vec<TasteSegment> {
        let (vectors, weights) = self.vectorize(pool);
        if vectors.is_empty() {
            info!("No vectorizable tracks in a pool of {}", pool.len());
            return Vec::new();
        }
        match self.profiler.profile(&vectors, &weights) {
            Ok(segments) => segments,
            Err(err) => {
                warn!("Profiling failed, nothing to recommend: {err}");
                Vec::new()
            }
        }
    }

    /// Curated recommendations for the current pool.
    ///
    /// # Errors
    ///
    /// Only [`EngineError::PoolUnavailable`]; every other failure yields an
    /// empty list.
    pub fn recommend(&self, settings: &SessionSettings) -> EngineResult<Vec<RecommendedTrack>> {
        let pool = self.pool.aggregate()?;
        if pool.is_empty() {
            info!("Empty session, nothing to recommend");
            return Ok(Vec::new());
        }

        let segments = self.taste_segments(&pool);
        if segments.is_empty() {
            info!("No usable taste signal in the session");
            return Ok(Vec::new());
        }

        let excluded: HashSet<&str> = if self.config.curation.exclude_pool_tracks {
            pool.keys().map(String::as_str).collect()
        } else {
            HashSet::new()
        };
        let candidates: Vec<RecommendedTrack> = segments
            .iter()
            .enumerate()
            .flat_map(|(segment, taste)| {
                self.index
                    .retrieve(segment, &taste.centroid, |id| self.catalog.cached_track(id))
            })
            .filter(|candidate| !excluded.contains(candidate.track.id.as_str()))
            .collect();

        let filtered = SettingsFilter::new(settings).filter(candidates);
        let weights: BTreeMap<usize, f64> = segments
            .iter()
            .enumerate()
            .map(|(segment, taste)| (segment, taste.weight))
            .collect();
        let curated = curator::curate(filtered, &weights, self.config.curation.total_count);

        info!(
            "Recommending {} tracks from {} segments over {} pool tracks",
            curated.len(),
            segments.len(),
            pool.len()
        );
        Ok(curated)
    }

    /// `(artist name, track name)` pairs for the current pool.
    ///
    /// # Errors
    ///
    /// Same as [`Self::recommend`].
    pub fn generate_recommendations(&self, settings: &SessionSettings) -> EngineResult<Vec<(String, String)>> {
        Ok(self
            .recommend(settings)?
            .into_iter()
            .map(|recommendation| {
                (
                    recommendation.track.primary_artist_name().to_string(),
                    recommendation.track.name,
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Mode;
    use crate::models::fixtures::track;
    use crate::repository::memory::MemoryStore;
    use crate::repository::StoreCatalog;
    use std::sync::Arc;

    /// Three artists with six tracks each; danceability rises with the index.
    fn catalog() -> Arc<MemoryStore> {
        let store = MemoryStore::default();
        let mut tracks = Vec::new();
        for (artist, genre) in [("Bicep", "electronica"), ("Nils", "modern classical"), ("Kendrick", "hip hop")] {
            for i in 0..6 {
                let id = format!("{}-{i}", artist.to_lowercase());
                let mut t = track(&id, artist, &format!("{artist} Song {i}"));
                t.genres = vec![genre.to_string()];
                t.audio.danceability = 0.3 + 0.1 * f64::from(i);
                tracks.push(t);
            }
        }
        store.upsert_tracks(&tracks).unwrap();
        store
            .upsert_genre_embeddings(&HashMap::from([
                ("electronica".to_string(), vec![1.0, 0.0, 0.0]),
                ("modern".to_string(), vec![0.0, 1.0, 0.0]),
                ("classical".to_string(), vec![0.0, 1.0, 0.0]),
                ("hiphop".to_string(), vec![0.0, 0.0, 1.0]),
            ]))
            .unwrap();
        store
            .upsert_artist_embeddings(&HashMap::from([
                ("artist-bicep".to_string(), vec![1.0, 0.0]),
                ("artist-nils".to_string(), vec![0.0, 1.0]),
            ]))
            .unwrap();
        store
            .upsert_playlist("warmup", &["bicep-0".to_string(), "bicep-1".to_string()])
            .unwrap();
        Arc::new(store)
    }

    fn engine_with(config: EngineConfig) -> RecommendationEngine<StoreCatalog> {
        let store = catalog();
        let provider = StoreCatalog::new(store.clone()).unwrap();
        RecommendationEngine::new(store.as_ref(), provider, config).unwrap()
    }

    fn engine() -> RecommendationEngine<StoreCatalog> {
        engine_with(EngineConfig::default())
    }

    #[test]
    fn test_index_skips_unvectorizable_tracks() {
        // Kendrick has no artist embedding.
        assert_eq!(engine().indexed_tracks(), 12);
    }

    #[test]
    fn test_empty_catalog_is_fatal() {
        let store = Arc::new(MemoryStore::default());
        let provider = StoreCatalog::new(store.clone()).unwrap();
        let result = RecommendationEngine::new(store.as_ref(), provider, EngineConfig::default());
        assert!(matches!(result, Err(EngineError::IndexUnavailable(_))));
    }

    #[test]
    fn test_empty_session_recommends_nothing() {
        let engine = engine();
        assert!(engine.generate_recommendations(&SessionSettings::default()).unwrap().is_empty());
        assert_eq!(engine.session_statistics().unwrap(), SessionStatistics::default());
    }

    #[test]
    fn test_add_track_playlist_and_link() {
        let engine = engine();
        assert_eq!(engine.add_to_session("warmup", "alice").unwrap(), 2);
        assert_eq!(engine.add_to_session("spotify:track:nils-0", "bob").unwrap(), 1);
        assert_eq!(
            engine
                .add_to_session("https://open.spotify.com/track/bicep-2?si=x", "bob")
                .unwrap(),
            1
        );
        assert_eq!(engine.session_statistics().unwrap().track_count, 4);

        let missing = engine.add_to_session("no-such-thing", "alice");
        assert!(matches!(missing, Err(EngineError::Catalog(CatalogError::NotFound(_)))));
        assert_eq!(engine.session_statistics().unwrap().track_count, 4, "failed adds leave the pool alone");

        engine.reset_session().unwrap();
        assert_eq!(engine.session_statistics().unwrap().track_count, 0);
    }

    #[test]
    fn test_session_statistics() {
        let engine = engine();
        engine.add_to_session("bicep-0", "alice").unwrap();
        engine.add_to_session("bicep-2", "alice").unwrap();
        engine.add_to_session("nils-0", "bob").unwrap();

        let stats = engine.session_statistics().unwrap();
        assert_eq!(stats.track_count, 3);
        assert!((stats.means["danceability"] - (0.3 + 0.5 + 0.3) / 3.0).abs() < 1e-9);
        assert_eq!(stats.means["tempo"], 110.0);
        assert_eq!(stats.top_genres[0], ("electronica".to_string(), 2));
        assert_eq!(stats.means.len(), 5);
    }

    #[test]
    fn test_recommendations_follow_the_pool() {
        let engine = engine();
        engine.add_to_session("bicep-0", "alice").unwrap();
        engine.add_to_session("bicep-1", "alice").unwrap();

        let recommendations = engine.recommend(&SessionSettings::default()).unwrap();
        assert!(!recommendations.is_empty());
        assert_eq!(recommendations[0].track.primary_artist_name(), "Bicep");
        assert!(
            recommendations.iter().all(|r| r.track.id != "bicep-0" && r.track.id != "bicep-1"),
            "pool tracks are not recommended back"
        );
        assert!(recommendations.len() <= engine.config().curation.total_count);
        assert!(recommendations.windows(2).all(|w| w[0].score <= w[1].score));
    }

    #[test]
    fn test_settings_narrow_recommendations() {
        let engine = engine();
        engine.add_to_session("bicep-0", "alice").unwrap();

        let settings = SessionSettings {
            danceability: Mode::High,
            exclude_genres: vec!["classical".to_string()],
            ..SessionSettings::default()
        };
        let pairs = engine.generate_recommendations(&settings).unwrap();
        assert!(!pairs.is_empty());
        assert!(pairs.iter().all(|(artist, _)| artist == "Bicep"));

        let recommendations = engine.recommend(&settings).unwrap();
        assert!(recommendations.iter().all(|r| r.track.audio.danceability >= 0.65));
    }

    #[test]
    fn test_unvectorizable_pool_recommends_nothing() {
        let engine = engine();
        engine.add_to_session("kendrick-0", "alice").unwrap();
        assert!(engine.recommend(&SessionSettings::default()).unwrap().is_empty());
    }

    #[test]
    fn test_projection_names_points() {
        let engine = engine();
        engine.add_to_session("warmup", "alice").unwrap();
        engine.add_to_session("kendrick-1", "bob").unwrap();

        let points = engine.cluster_projection().unwrap();
        assert_eq!(points.len(), 2, "unvectorizable tracks are not projected");
        assert_eq!(points[0].track_id, "bicep-0");
        assert_eq!(points[0].track_name, "Bicep Song 0");
        assert!(points.iter().all(|p| p.segment == Some(0)));
    }

    #[test]
    fn test_unresolvable_submission_is_skipped() {
        let engine = engine();
        let added = engine
            .add_all_to_session([
                ("bicep-0", "alice"),
                ("https://open.spotify.com/track/missing", "bob"),
                ("https://open.spotify.com/album/abc", "bob"),
                ("nils-0", "bob"),
            ])
            .unwrap();

        assert_eq!(added, 2, "only the resolvable submissions are added");
        assert_eq!(engine.session_statistics().unwrap().track_count, 2);
        assert!(!engine.recommend(&SessionSettings::default()).unwrap().is_empty());
    }

    #[test]
    fn test_all_noise_session_recommends_nothing() {
        let mut config = EngineConfig::default();
        config.profile.min_cluster_size = 50;
        config.profile.iterations = 300;
        let engine = engine_with(config);

        for i in 0..6 {
            engine.add_to_session(&format!("bicep-{i}"), "alice").unwrap();
            engine.add_to_session(&format!("nils-{i}"), "bob").unwrap();
        }
        assert!(
            engine.recommend(&SessionSettings::default()).unwrap().is_empty(),
            "twelve points cannot form a 50-point cluster"
        );
        assert!(engine.cluster_projection().unwrap().iter().all(|p| p.segment.is_none()));
    }
}
