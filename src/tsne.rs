//! Exact t-SNE reduction to two dimensions.
//!
//! Pools are small (tens to a few hundred tracks), so the O(n²) exact
//! gradient is used rather than a Barnes-Hut approximation. The layout is
//! fully determined by the seed: initialization uses a seeded [`StdRng`] and
//! every reduction is summed in a fixed order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

const MIN_LEARNING_RATE: f64 = 50.0;
const EARLY_EXAGGERATION: f64 = 12.0;
const EXAGGERATION_ITERATIONS: usize = 250;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const MIN_GAIN: f64 = 0.01;
const ENTROPY_TOLERANCE: f64 = 1e-5;
const BINARY_SEARCH_STEPS: usize = 64;
const FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TsneParams {
    pub perplexity: f64,
    pub iterations: usize,
    pub seed: u64,
}

/// Step size scaled to the number of points, floored for small pools.
fn learning_rate(n: usize) -> f64 {
    (n as f64 / EARLY_EXAGGERATION / 4.0).max(MIN_LEARNING_RATE)
}

fn squared_distances(points: &[Vec<f64>]) -> Vec<f64> {
    let n = points.len();
    let mut distances = vec![0.0; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d: f64 = points[i]
                .iter()
                .zip(&points[j])
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            distances[i * n + j] = d;
            distances[j * n + i] = d;
        }
    }
    distances
}

/// Row `i` of the conditional affinity matrix, calibrated so its entropy
/// matches `ln(perplexity)`.
fn conditional_row(distances: &[f64], n: usize, i: usize, perplexity: f64) -> Vec<f64> {
    let target = perplexity.ln();
    let row = &distances[i * n..(i + 1) * n];
    // Shifting by the nearest distance keeps exp() away from underflow.
    let nearest = row
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != i)
        .map(|(_, d)| *d)
        .fold(f64::INFINITY, f64::min);

    let mut beta = 1.0_f64;
    let mut beta_min = f64::NEG_INFINITY;
    let mut beta_max = f64::INFINITY;
    let mut probabilities = vec![0.0; n];

    for _ in 0..BINARY_SEARCH_STEPS {
        let mut sum = 0.0_f64;
        let mut weighted = 0.0_f64;
        for (j, p) in probabilities.iter_mut().enumerate() {
            if j == i {
                *p = 0.0;
                continue;
            }
            let shifted = row[j] - nearest;
            *p = (-beta * shifted).exp();
            sum += *p;
            weighted += shifted * *p;
        }
        let entropy = sum.ln() + beta * weighted / sum;
        for p in &mut probabilities {
            *p /= sum;
        }

        let diff = entropy - target;
        if diff.abs() < ENTROPY_TOLERANCE {
            break;
        }
        if diff > 0.0 {
            beta_min = beta;
            beta = if beta_max.is_infinite() { beta * 2.0 } else { (beta + beta_max) / 2.0 };
        } else {
            beta_max = beta;
            beta = if beta_min.is_infinite() { beta / 2.0 } else { (beta + beta_min) / 2.0 };
        }
    }

    probabilities
}

fn joint_probabilities(points: &[Vec<f64>], perplexity: f64) -> Vec<f64> {
    let n = points.len();
    let distances = squared_distances(points);
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| conditional_row(&distances, n, i, perplexity))
        .collect();

    let scale = 2.0 * n as f64;
    let mut joint = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                joint[i * n + j] = ((rows[i][j] + rows[j][i]) / scale).max(FLOOR);
            }
        }
    }
    joint
}

/// Reduce `points` to 2-D coordinates, one per input point in input order.
#[must_use]
pub fn embed(points: &[Vec<f64>], params: &TsneParams) -> Vec<[f64; 2]> {
    let n = points.len();
    if n < 2 {
        return vec![[0.0, 0.0]; n];
    }

    // Perplexity must stay well below the number of available neighbors.
    let perplexity = params.perplexity.min((n - 1) as f64 / 3.0).max(1.0);
    let joint = joint_probabilities(points, perplexity);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut layout: Vec<[f64; 2]> = (0..n)
        .map(|_| [rng.gen_range(-1e-4..1e-4), rng.gen_range(-1e-4..1e-4)])
        .collect();
    let rate = learning_rate(n);
    let mut updates = vec![[0.0_f64; 2]; n];
    let mut gains = vec![[1.0_f64; 2]; n];

    for iteration in 0..params.iterations {
        let exaggeration = if iteration < EXAGGERATION_ITERATIONS { EARLY_EXAGGERATION } else { 1.0 };
        let momentum = if iteration < EXAGGERATION_ITERATIONS { INITIAL_MOMENTUM } else { FINAL_MOMENTUM };

        // Student-t kernel between every pair of embedded points.
        let kernel: Vec<f64> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                let layout = &layout;
                (0..n).map(move |j| {
                    if i == j {
                        0.0
                    } else {
                        let dx = layout[i][0] - layout[j][0];
                        let dy = layout[i][1] - layout[j][1];
                        1.0 / (1.0 + dx * dx + dy * dy)
                    }
                })
            })
            .collect();
        let kernel_sum: f64 = kernel.iter().sum();

        let gradients: Vec<[f64; 2]> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut gradient = [0.0; 2];
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let k = kernel[i * n + j];
                    let q = (k / kernel_sum).max(FLOOR);
                    let force = 4.0 * (exaggeration * joint[i * n + j] - q) * k;
                    gradient[0] += force * (layout[i][0] - layout[j][0]);
                    gradient[1] += force * (layout[i][1] - layout[j][1]);
                }
                gradient
            })
            .collect();

        for i in 0..n {
            for axis in 0..2 {
                let gradient = gradients[i][axis];
                let gain = &mut gains[i][axis];
                *gain = if (gradient > 0.0) == (updates[i][axis] > 0.0) {
                    (*gain * 0.8).max(MIN_GAIN)
                } else {
                    *gain + 0.2
                };
                updates[i][axis] = momentum * updates[i][axis] - rate * *gain * gradient;
                layout[i][axis] += updates[i][axis];
            }
        }

        let mean_x = layout.iter().map(|p| p[0]).sum::<f64>() / n as f64;
        let mean_y = layout.iter().map(|p| p[1]).sum::<f64>() / n as f64;
        for point in &mut layout {
            point[0] -= mean_x;
            point[1] -= mean_y;
        }
    }

    layout
}
