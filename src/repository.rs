//! # Catalog Repository
//!
//! Seams between the engine and its data sources:
//!
//! - [`Store`]: persistent tracks, artists, vectors, embeddings and playlists.
//! - [`CatalogProvider`]: on-demand track/artist/playlist lookup.
//! - [`RetryingProvider`]: exponential backoff around any provider.
//! - [`StoreCatalog`]: a provider answering from the store alone.
//! - [`CatalogRepository`]: read-through caches in front of a provider.
//!
//! The caches are read-mostly. Two threads missing on the same id may both
//! hit the provider; the last insert wins, which is harmless because catalog
//! records never change.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{CatalogError, EngineResult};
use crate::models::{Artist, RepresentationVector, Track};

/// Persistent catalog storage.
pub trait Store: Send + Sync {
    fn load_all_tracks(&self) -> EngineResult<HashMap<String, Track>>;
    fn load_all_artists(&self) -> EngineResult<HashMap<String, Artist>>;
    fn load_all_representation_vectors(&self) -> EngineResult<HashMap<String, RepresentationVector>>;
    fn load_genre_embeddings(&self) -> EngineResult<HashMap<String, Vec<f64>>>;
    fn load_artist_embeddings(&self) -> EngineResult<HashMap<String, Vec<f64>>>;
    /// Track ids of a stored playlist in order, `None` if unknown.
    fn playlist_track_ids(&self, playlist_id: &str) -> EngineResult<Option<Vec<String>>>;

    fn upsert_tracks(&self, tracks: &[Track]) -> EngineResult<usize>;
    fn upsert_artists(&self, artists: &[Artist]) -> EngineResult<usize>;
    fn upsert_representation_vectors(&self, vectors: &[(String, RepresentationVector)]) -> EngineResult<usize>;
    fn upsert_genre_embeddings(&self, embeddings: &HashMap<String, Vec<f64>>) -> EngineResult<usize>;
    fn upsert_artist_embeddings(&self, embeddings: &HashMap<String, Vec<f64>>) -> EngineResult<usize>;
    fn upsert_playlist(&self, playlist_id: &str, track_ids: &[String]) -> EngineResult<usize>;
}

/// On-demand catalog lookups. Implementations distinguish a missing item
/// from a transient failure.
pub trait CatalogProvider: Send + Sync {
    fn fetch_track(&self, id: &str) -> Result<Track, CatalogError>;
    fn fetch_artist(&self, id: &str) -> Result<Artist, CatalogError>;
    fn fetch_playlist_tracks(&self, id: &str) -> Result<Vec<Track>, CatalogError>;
}

/// Exponential backoff: `initial * multiplier^attempt`, capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    #[must_use]
    pub const fn should_retry(&self, error: &CatalogError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_retries
    }
}

/// Retries transient failures of the wrapped provider, sleeping between
/// attempts. `NotFound` is returned immediately.
#[derive(Debug)]
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: CatalogProvider> RetryingProvider<P> {
    pub fn new(inner: P, config: &RetryConfig) -> Self {
        Self {
            inner,
            policy: RetryPolicy::from(config),
        }
    }

    fn with_retry<T>(&self, what: &str, call: impl Fn() -> Result<T, CatalogError>) -> Result<T, CatalogError> {
        let mut attempt = 0;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if self.policy.should_retry(&err, attempt) => {
                    let delay = self.policy.backoff(attempt);
                    warn!("Fetching {what} failed ({err}), retry {} in {delay:?}", attempt + 1);
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<P: CatalogProvider> CatalogProvider for RetryingProvider<P> {
    fn fetch_track(&self, id: &str) -> Result<Track, CatalogError> {
        self.with_retry(&format!("track `{id}'"), || self.inner.fetch_track(id))
    }

    fn fetch_artist(&self, id: &str) -> Result<Artist, CatalogError> {
        self.with_retry(&format!("artist `{id}'"), || self.inner.fetch_artist(id))
    }

    fn fetch_playlist_tracks(&self, id: &str) -> Result<Vec<Track>, CatalogError> {
        self.with_retry(&format!("playlist `{id}'"), || self.inner.fetch_playlist_tracks(id))
    }
}

/// Offline provider backed by a [`Store`]. Tracks and artists are snapshotted
/// at construction; playlists are read from the store on demand.
pub struct StoreCatalog {
    store: Arc<dyn Store>,
    tracks: HashMap<String, Track>,
    artists: HashMap<String, Artist>,
}

impl std::fmt::Debug for StoreCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCatalog")
            .field("tracks", &self.tracks.len())
            .field("artists", &self.artists.len())
            .finish_non_exhaustive()
    }
}

impl StoreCatalog {
    /// # Errors
    ///
    /// Propagates store failures while taking the snapshot.
    pub fn new(store: Arc<dyn Store>) -> EngineResult<Self> {
        let tracks = store.load_all_tracks()?;
        let artists = store.load_all_artists()?;
        Ok(Self { store, tracks, artists })
    }
}

impl CatalogProvider for StoreCatalog {
    fn fetch_track(&self, id: &str) -> Result<Track, CatalogError> {
        self.tracks
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    fn fetch_artist(&self, id: &str) -> Result<Artist, CatalogError> {
        self.artists
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    fn fetch_playlist_tracks(&self, id: &str) -> Result<Vec<Track>, CatalogError> {
        let track_ids = self
            .store
            .playlist_track_ids(id)
            .map_err(|err| CatalogError::Transient(err.to_string()))?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;

        Ok(track_ids
            .iter()
            .filter_map(|track_id| match self.tracks.get(track_id) {
                Some(track) => Some(track.clone()),
                None => {
                    warn!("Playlist `{id}' references unknown track `{track_id}', skipping");
                    None
                }
            })
            .collect())
    }
}

/// Read-through track and artist caches in front of a provider.
#[derive(Debug)]
pub struct CatalogRepository<P> {
    provider: P,
    tracks: RwLock<HashMap<String, Track>>,
    artists: RwLock<HashMap<String, Artist>>,
}

impl<P: CatalogProvider> CatalogRepository<P> {
    /// Repository with empty caches.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            tracks: RwLock::new(HashMap::new()),
            artists: RwLock::new(HashMap::new()),
        }
    }

    /// Repository whose caches start with everything in `store`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn seeded(provider: P, store: &dyn Store) -> EngineResult<Self> {
        let tracks = store.load_all_tracks()?;
        let artists = store.load_all_artists()?;
        debug!("Seeded catalog caches with {} tracks and {} artists", tracks.len(), artists.len());
        Ok(Self {
            provider,
            tracks: RwLock::new(tracks),
            artists: RwLock::new(artists),
        })
    }

    /// Cached track, without consulting the provider.
    pub fn cached_track(&self, id: &str) -> Option<Track> {
        self.tracks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Every cached track.
    pub fn cached_tracks(&self) -> Vec<Track> {
        self.tracks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn remember_track(&self, track: &Track) {
        self.tracks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(track.id.clone(), track.clone());
    }

    /// # Errors
    ///
    /// The provider's error when the track is not cached and cannot be fetched.
    pub fn track(&self, id: &str) -> Result<Track, CatalogError> {
        if let Some(track) = self.cached_track(id) {
            return Ok(track);
        }
        let track = self.provider.fetch_track(id)?;
        self.remember_track(&track);
        Ok(track)
    }

    /// # Errors
    ///
    /// The provider's error when the artist is not cached and cannot be fetched.
    pub fn artist(&self, id: &str) -> Result<Artist, CatalogError> {
        if let Some(artist) = self
            .artists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            return Ok(artist.clone());
        }
        let artist = self.provider.fetch_artist(id)?;
        self.artists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(artist.id.clone(), artist.clone());
        Ok(artist)
    }

    /// Playlist contents, always fetched fresh. Returned tracks are cached.
    ///
    /// # Errors
    ///
    /// The provider's error when the playlist cannot be fetched.
    pub fn playlist_tracks(&self, id: &str) -> Result<Vec<Track>, CatalogError> {
        let tracks = self.provider.fetch_playlist_tracks(id)?;
        for track in &tracks {
            self.remember_track(track);
        }
        Ok(tracks)
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use crate::models::fixtures::track;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with `error` for the first `failures` calls, then succeeds.
    struct FlakyProvider {
        failures: u32,
        error: CatalogError,
        calls: AtomicU32,
    }

    impl FlakyProvider {
        fn new(failures: u32, error: CatalogError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
            }
        }

        fn attempt(&self) -> Result<(), CatalogError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    impl CatalogProvider for FlakyProvider {
        fn fetch_track(&self, id: &str) -> Result<Track, CatalogError> {
            self.attempt().map(|()| track(id, "Bicep", "Glue"))
        }

        fn fetch_artist(&self, id: &str) -> Result<Artist, CatalogError> {
            self.attempt().map(|()| Artist {
                id: id.to_string(),
                name: "Bicep".to_string(),
                popularity: 60.0,
                genres: vec!["electronica".to_string()],
            })
        }

        fn fetch_playlist_tracks(&self, _id: &str) -> Result<Vec<Track>, CatalogError> {
            self.attempt().map(|()| vec![track("p1", "Bicep", "Atlas")])
        }
    }

    fn instant_retries(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 0,
            ..RetryConfig::default()
        }
    }

    fn store_with_playlist() -> Arc<MemoryStore> {
        let store = MemoryStore::default();
        store
            .upsert_tracks(&[track("a", "Bicep", "Glue"), track("b", "Bicep", "Atlas")])
            .unwrap();
        store
            .upsert_playlist("mix", &["a".to_string(), "ghost".to_string(), "b".to_string()])
            .unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::from(&RetryConfig::default());
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff(10), Duration::from_millis(10_000), "capped at max backoff");
    }

    #[test]
    fn test_should_retry_only_transient() {
        let policy = RetryPolicy::from(&RetryConfig::default());
        assert!(policy.should_retry(&CatalogError::Transient("503".into()), 0));
        assert!(!policy.should_retry(&CatalogError::Transient("503".into()), 3));
        assert!(!policy.should_retry(&CatalogError::NotFound("x".into()), 0));
    }

    #[test]
    fn test_retrying_provider_recovers_from_transient_failures() {
        let provider = RetryingProvider::new(
            FlakyProvider::new(2, CatalogError::Transient("timeout".into())),
            &instant_retries(3),
        );
        assert_eq!(provider.fetch_track("a").unwrap().id, "a");
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retrying_provider_gives_up() {
        let provider = RetryingProvider::new(
            FlakyProvider::new(10, CatalogError::Transient("timeout".into())),
            &instant_retries(2),
        );
        assert!(matches!(provider.fetch_artist("x"), Err(CatalogError::Transient(_))));
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 3, "one call plus two retries");
    }

    #[test]
    fn test_not_found_is_never_retried() {
        let provider = RetryingProvider::new(
            FlakyProvider::new(10, CatalogError::NotFound("x".into())),
            &instant_retries(5),
        );
        assert!(matches!(provider.fetch_playlist_tracks("x"), Err(CatalogError::NotFound(_))));
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_store_catalog_resolves_and_skips_missing() {
        let catalog = StoreCatalog::new(store_with_playlist()).unwrap();

        assert_eq!(catalog.fetch_track("a").unwrap().name, "Glue");
        assert!(matches!(catalog.fetch_track("zzz"), Err(CatalogError::NotFound(_))));

        let ids: Vec<String> = catalog
            .fetch_playlist_tracks("mix")
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"], "unknown playlist entries are skipped");
        assert!(matches!(catalog.fetch_playlist_tracks("nope"), Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn test_repository_reads_through_once() {
        let repository = CatalogRepository::new(FlakyProvider::new(0, CatalogError::NotFound(String::new())));

        assert!(repository.cached_track("a").is_none());
        repository.track("a").unwrap();
        repository.track("a").unwrap();
        assert_eq!(repository.provider.calls.load(Ordering::SeqCst), 1, "second lookup is cached");

        repository.artist("artist-bicep").unwrap();
        repository.artist("artist-bicep").unwrap();
        assert_eq!(repository.provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_repository_caches_playlist_tracks() {
        let store = store_with_playlist();
        let repository = CatalogRepository::new(StoreCatalog::new(store).unwrap());

        assert_eq!(repository.playlist_tracks("mix").unwrap().len(), 2);
        assert!(repository.cached_track("b").is_some());
        assert_eq!(repository.cached_tracks().len(), 2);
    }

    #[test]
    fn test_seeded_repository_starts_warm() {
        let store = store_with_playlist();
        let repository = CatalogRepository::seeded(
            FlakyProvider::new(0, CatalogError::NotFound(String::new())),
            store.as_ref(),
        )
        .unwrap();

        assert!(repository.cached_track("a").is_some());
        assert_eq!(repository.provider.calls.load(Ordering::SeqCst), 0);
    }
}
