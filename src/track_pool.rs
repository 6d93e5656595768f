//! # Track Pool
//!
//! Session-scoped, multi-contributor pool of submitted tracks.
//!
//! Each contributor owns an ordered list behind its own lock, so concurrent
//! appends by different contributors never contend on a shared list. The outer
//! map is only write-locked to register a new contributor or to reset.
//!
//! Aggregation turns the pool into a weighted multiset: a track's frequency is
//! its occurrence count in a contributor's list divided by that contributor's
//! list length, summed across contributors.

use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{EngineError, EngineResult};
use crate::models::{Track, TrackPoolItem};

type ContributorList = Arc<Mutex<Vec<Track>>>;

fn poisoned<T>(_: T) -> EngineError {
    EngineError::PoolUnavailable("track pool lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct TrackPool {
    contributors: RwLock<HashMap<String, ContributorList>>,
}

impl TrackPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn list_for(&self, contributor: &str) -> EngineResult<ContributorList> {
        if let Some(list) = self.contributors.read().map_err(poisoned)?.get(contributor) {
            return Ok(Arc::clone(list));
        }
        let mut contributors = self.contributors.write().map_err(poisoned)?;
        Ok(Arc::clone(contributors.entry(contributor.to_string()).or_default()))
    }

    /// Append `tracks` to `contributor`'s submissions, in order.
    ///
    /// # Errors
    ///
    /// [`EngineError::PoolUnavailable`] when a pool lock is poisoned.
    pub fn add(&self, contributor: &str, tracks: impl IntoIterator<Item = Track>) -> EngineResult<usize> {
        let list = self.list_for(contributor)?;
        let mut list = list.lock().map_err(poisoned)?;
        let before = list.len();
        list.extend(tracks);
        Ok(list.len() - before)
    }

    /// Drop every contributor's submissions.
    ///
    /// # Errors
    ///
    /// [`EngineError::PoolUnavailable`] when the pool lock is poisoned.
    pub fn reset(&self) -> EngineResult<()> {
        self.contributors.write().map_err(poisoned)?.clear();
        Ok(())
    }

    /// Copy of every contributor's submissions, keyed by contributor.
    ///
    /// # Errors
    ///
    /// [`EngineError::PoolUnavailable`] when a pool lock is poisoned.
    pub fn snapshot(&self) -> EngineResult<BTreeMap<String, Vec<Track>>> {
        let lists: Vec<(String, ContributorList)> = self
            .contributors
            .read()
            .map_err(poisoned)?
            .iter()
            .map(|(contributor, list)| (contributor.clone(), Arc::clone(list)))
            .collect();

        lists
            .into_iter()
            .map(|(contributor, list)| -> EngineResult<(String, Vec<Track>)> {
                let tracks = list.lock().map_err(poisoned)?.clone();
                Ok((contributor, tracks))
            })
            .collect()
    }

    /// Every submission from every contributor, duplicates included.
    ///
    /// # Errors
    ///
    /// [`EngineError::PoolUnavailable`] when a pool lock is poisoned.
    pub fn all_submissions(&self) -> EngineResult<Vec<Track>> {
        Ok(self.snapshot()?.into_values().flatten().collect())
    }

    /// Aggregate the current pool. See [`merge`].
    ///
    /// # Errors
    ///
    /// [`EngineError::PoolUnavailable`] when a pool lock is poisoned.
    pub fn aggregate(&self) -> EngineResult<BTreeMap<String, TrackPoolItem>> {
        Ok(merge(&self.snapshot()?))
    }
}

/// Per-contributor probability mass of each distinct track in `tracks`.
#[must_use]
pub fn contributor_frequencies(tracks: &[Track]) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for track in tracks {
        *counts.entry(track.id.clone()).or_default() += 1;
    }
    let total = tracks.len() as f64;
    counts
        .into_iter()
        .map(|(id, count)| (id, count as f64 / total))
        .collect()
}

/// Merge contributor submissions into one weighted pool keyed by track id.
/// Frequencies of a track shared by several contributors accumulate.
#[must_use]
pub fn merge(tracks_per_contributor: &BTreeMap<String, Vec<Track>>) -> BTreeMap<String, TrackPoolItem> {
    let mut pool: BTreeMap<String, TrackPoolItem> = BTreeMap::new();

    for tracks in tracks_per_contributor.values() {
        if tracks.is_empty() {
            continue;
        }
        for (id, frequency) in contributor_frequencies(tracks) {
            match pool.get_mut(&id) {
                Some(item) => item.frequency += frequency,
                None => {
                    // The id came from this list, so a matching track exists.
                    if let Some(track) = tracks.iter().find(|track| track.id == id) {
                        pool.insert(
                            id,
                            TrackPoolItem {
                                track: track.clone(),
                                frequency,
                            },
                        );
                    }
                }
            }
        }
    }

    debug!(
        "Merged {} contributors into {} distinct tracks",
        tracks_per_contributor.len(),
        pool.len()
    );
    pool
}
