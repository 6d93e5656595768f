//! # Profile Creator
//!
//! Segments a weighted set of representation vectors into taste segments.
//!
//! ## Algorithm
//!
//! 1. Fewer than `min_samples` vectors: one segment, the frequency-weighted
//!    mean of everything, weight 1.0.
//! 2. Otherwise reduce to 2-D with seeded t-SNE ([`crate::tsne`]).
//! 3. Radius = 95th percentile of every point's distance to its 4th nearest
//!    neighbor in the reduced space, inflated by 20%.
//! 4. DBSCAN over the reduced points with that radius and a minimum cluster
//!    size of 4; noise points are dropped.
//! 5. Each cluster's centroid is the frequency-weighted mean of its members'
//!    original vectors; its weight is its share of the non-noise frequency.
//!
//! An empty result means every point was noise: there is no usable taste
//! signal and callers must treat it that way.

use linfa::traits::Transformer;
use linfa_clustering::Dbscan;
use log::debug;
use ndarray::Array2;
use std::collections::BTreeMap;

use crate::config::ProfileConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{RepresentationVector, TasteSegment};
use crate::tsne::{self, TsneParams};

/// One input track placed in the 2-D projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub track_id: String,
    pub coordinate: [f64; 2],
    /// `None` for noise points.
    pub segment: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileCreator {
    config: ProfileConfig,
}

/// Linear-interpolated percentile of `values` (`percentile` in `[0, 100]`).
#[must_use]
pub fn percentile(values: &[f64], percentile: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (percentile.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    Some(sorted[low] + (sorted[high] - sorted[low]) * (rank - low as f64))
}

/// Data-driven DBSCAN radius: the `percentile` of each point's distance to
/// its `rank`-th nearest other point, multiplied by `inflation`.
#[must_use]
pub fn neighborhood_radius(layout: &[[f64; 2]], rank: usize, pct: f64, inflation: f64) -> Option<f64> {
    if layout.len() < 2 || rank == 0 {
        return None;
    }
    let rank = rank.min(layout.len() - 1);

    let kth_distances: Vec<f64> = layout
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let mut distances: Vec<f64> = layout
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, b)| ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt())
                .collect();
            distances.sort_by(f64::total_cmp);
            distances[rank - 1]
        })
        .collect();

    percentile(&kth_distances, pct).map(|radius| radius * inflation)
}

/// Weighted mean of `members`. Falls back to the plain mean when every
/// weight is zero.
#[must_use]
pub fn weighted_average(members: &[(&[f64], f64)]) -> Option<RepresentationVector> {
    let dim = members.first()?.0.len();
    let total: f64 = members.iter().map(|(_, weight)| weight).sum();
    let uniform = total <= 0.0;

    let mut centroid = vec![0.0_f64; dim];
    for (vector, weight) in members {
        let weight = if uniform { 1.0 } else { *weight };
        for (acc, value) in centroid.iter_mut().zip(vector.iter()) {
            *acc += value * weight;
        }
    }
    let divisor = if uniform { members.len() as f64 } else { total };
    Some(centroid.into_iter().map(|value| value / divisor).collect())
}

impl ProfileCreator {
    #[must_use]
    pub const fn new(config: ProfileConfig) -> Self {
        Self { config }
    }

    fn tsne_params(&self) -> TsneParams {
        TsneParams {
            perplexity: self.config.perplexity,
            iterations: self.config.iterations,
            seed: self.config.seed,
        }
    }

    /// Reduce and cluster. Labels are dense (`0..k`) in order of first appearance.
    fn cluster(&self, vectors: &[Vec<f64>]) -> EngineResult<(Vec<[f64; 2]>, Vec<Option<usize>>)> {
        let layout = tsne::embed(vectors, &self.tsne_params());
        let radius = neighborhood_radius(
            &layout,
            self.config.neighbor_rank,
            self.config.radius_percentile,
            self.config.radius_inflation,
        )
        .unwrap_or(0.0)
        .max(f64::EPSILON);
        debug!("Clustering {} points with radius {radius:.4}", layout.len());

        let observations = Array2::from_shape_vec(
            (layout.len(), 2),
            layout.iter().flat_map(|point| point.iter().copied()).collect(),
        )
        .map_err(|err| EngineError::Clustering(err.to_string()))?;

        let raw_labels = Dbscan::params(self.config.min_cluster_size)
            .tolerance(radius)
            .transform(&observations)
            .map_err(|err| EngineError::Clustering(err.to_string()))?;

        let mut dense: BTreeMap<usize, usize> = BTreeMap::new();
        let labels = raw_labels
            .iter()
            .map(|label| {
                label.map(|raw| {
                    let next = dense.len();
                    *dense.entry(raw).or_insert(next)
                })
            })
            .collect();

        debug!("Found {} clusters", dense.len());
        Ok((layout, labels))
    }

    /// Segment `vectors`, weighting each by its pool frequency in `weights`
    /// (missing ids weigh 0). Returned weights sum to 1.0; the result is empty
    /// when there is no input or every point is noise.
    ///
    /// # Errors
    ///
    /// [`EngineError::Clustering`] when the clustering parameters are rejected.
    pub fn profile(
        &self,
        vectors: &BTreeMap<String, RepresentationVector>,
        weights: &BTreeMap<String, f64>,
    ) -> EngineResult<Vec<TasteSegment>> {
        let weight_of = |id: &str| weights.get(id).copied().unwrap_or(0.0);

        if vectors.len() < self.config.min_samples {
            debug!("{} vectors is below the clustering minimum, using one segment", vectors.len());
            let members: Vec<(&[f64], f64)> = vectors
                .iter()
                .map(|(id, vector)| (vector.as_slice(), weight_of(id)))
                .collect();
            return Ok(weighted_average(&members)
                .map(|centroid| TasteSegment { centroid, weight: 1.0 })
                .into_iter()
                .collect());
        }

        let ids: Vec<&String> = vectors.keys().collect();
        let points: Vec<Vec<f64>> = vectors.values().cloned().collect();
        let (_, labels) = self.cluster(&points)?;

        let mut clusters: BTreeMap<usize, Vec<(&[f64], f64)>> = BTreeMap::new();
        for ((id, vector), label) in ids.iter().zip(&points).zip(&labels) {
            if let Some(label) = label {
                clusters
                    .entry(*label)
                    .or_default()
                    .push((vector.as_slice(), weight_of(id)));
            }
        }

        let total: f64 = clusters.values().flatten().map(|(_, weight)| weight).sum();
        let segments: Vec<TasteSegment> = clusters
            .values()
            .filter_map(|members| {
                let centroid = weighted_average(members)?;
                let mass: f64 = members.iter().map(|(_, weight)| weight).sum();
                let weight = if total > 0.0 {
                    mass / total
                } else {
                    members.len() as f64 / labels.iter().flatten().count() as f64
                };
                Some(TasteSegment { centroid, weight })
            })
            .collect();

        debug!(
            "Profiled {} vectors into {} segments ({} noise)",
            points.len(),
            segments.len(),
            labels.iter().filter(|label| label.is_none()).count()
        );
        Ok(segments)
    }

    /// 2-D placement and segment of every input vector, for visualization.
    /// Below the clustering minimum every point belongs to segment 0.
    ///
    /// # Errors
    ///
    /// [`EngineError::Clustering`] when the clustering parameters are rejected.
    pub fn project(&self, vectors: &BTreeMap<String, RepresentationVector>) -> EngineResult<Vec<Placement>> {
        let points: Vec<Vec<f64>> = vectors.values().cloned().collect();
        let (layout, labels) = if points.len() < self.config.min_samples {
            (tsne::embed(&points, &self.tsne_params()), vec![Some(0); points.len()])
        } else {
            self.cluster(&points)?
        };

        Ok(vectors
            .keys()
            .zip(layout)
            .zip(labels)
            .map(|((id, coordinate), segment)| Placement {
                track_id: id.clone(),
                coordinate,
                segment,
            })
            .collect())
    }
}
