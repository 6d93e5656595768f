//! # Nearest-Neighbor Retriever
//!
//! Brute-force cosine index over every catalog representation vector. The
//! index is built once at startup and only read afterwards, so queries take
//! `&self` and can run from any number of threads. Scoring is spread over the
//! rayon pool; catalogs of a few hundred thousand tracks stay well under a
//! frame per query.

use log::{debug, warn};
use rayon::prelude::*;
use std::cmp::Ordering;

use crate::config::RetrieverConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{RecommendedTrack, RepresentationVector, Track};

/// `1 - cos(a, b)`. A zero vector is maximally dissimilar to everything.
#[must_use]
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[derive(Debug)]
pub struct NearestNeighborIndex {
    ids: Vec<String>,
    vectors: Vec<RepresentationVector>,
    dim: usize,
    candidates: usize,
}

impl NearestNeighborIndex {
    /// Index `vectors`. NaN coordinates are replaced by the configured
    /// sentinel; vectors whose length differs from the first one (in id
    /// order) are skipped.
    ///
    /// # Errors
    ///
    /// [`EngineError::IndexUnavailable`] when nothing can be indexed.
    pub fn build(
        vectors: impl IntoIterator<Item = (String, RepresentationVector)>,
        config: &RetrieverConfig,
    ) -> EngineResult<Self> {
        let mut entries: Vec<(String, RepresentationVector)> = vectors.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let dim = entries
            .first()
            .map(|(_, vector)| vector.len())
            .filter(|dim| *dim > 0)
            .ok_or_else(|| EngineError::IndexUnavailable("no representation vectors to index".to_string()))?;

        let mut ids = Vec::with_capacity(entries.len());
        let mut indexed = Vec::with_capacity(entries.len());
        for (id, mut vector) in entries {
            if vector.len() != dim {
                warn!("Not indexing `{id}': expected {dim} dims, got {}", vector.len());
                continue;
            }
            for value in vector.iter_mut().filter(|value| value.is_nan()) {
                *value = config.nan_sentinel;
            }
            ids.push(id);
            indexed.push(vector);
        }

        debug!("Built cosine index over {} vectors ({dim}d)", ids.len());
        Ok(Self {
            ids,
            vectors: indexed,
            dim,
            candidates: config.candidates_per_segment,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// The `k` indexed ids closest to `query`, closest first. Equal distances
    /// are ordered by id.
    #[must_use]
    pub fn nearest(&self, query: &[f64], k: usize) -> Vec<(&str, f64)> {
        if query.len() != self.dim {
            warn!("Query has {} dims, index has {}", query.len(), self.dim);
            return Vec::new();
        }

        let mut scored: Vec<(&str, f64)> = self
            .ids
            .par_iter()
            .zip(self.vectors.par_iter())
            .map(|(id, vector)| (id.as_str(), cosine_distance(query, vector)))
            .collect();

        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        scored.truncate(k);
        scored
    }

    /// Candidates for one taste segment, most similar first, each tagged with
    /// `segment`. Ids that `lookup` cannot resolve are skipped.
    pub fn retrieve<F>(&self, segment: usize, centroid: &[f64], lookup: F) -> Vec<RecommendedTrack>
    where
        F: Fn(&str) -> Option<Track>,
    {
        self.nearest(centroid, self.candidates)
            .into_iter()
            .filter_map(|(id, score)| match lookup(id) {
                Some(track) => Some(RecommendedTrack { track, score, segment }),
                None => {
                    debug!("Indexed track `{id}' is missing from the catalog");
                    None
                }
            })
            .collect()
    }
}
