//! Representative set reducer
//!
//! Shrinks an oversized point set to `k` representatives with k-means over
//! `(score_x, score_y)`. Every random choice comes from a ChaCha8 generator
//! seeded with a fixed value, so identical input always yields identical
//! output.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::domain::errors::ReductionError;
use crate::domain::models::{Point, PointSet};

type Coord = [f64; 2];

/// Deterministic k-means reducer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepresentativeReducer {
    seed: u64,
    max_iterations: usize,
    tolerance: f64,
}

impl Default for RepresentativeReducer {
    fn default() -> Self {
        Self {
            seed: 42,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

impl RepresentativeReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce `points` to exactly `k` representatives
    ///
    /// Returns the input unchanged when it already has at most `k` points.
    /// Otherwise returns one point per cluster, in cluster-index order; the
    /// chosen point is the member closest to its centroid, ties broken by
    /// the smallest original index.
    pub fn reduce(&self, points: &[Point], k: usize) -> Result<PointSet, ReductionError> {
        if k == 0 {
            return Err(ReductionError::InvalidK(k));
        }
        if points.is_empty() {
            return Err(ReductionError::EmptyInput);
        }
        if points.len() <= k {
            return Ok(points.to_vec());
        }

        let coords: Vec<Coord> = points.iter().map(Point::coordinate).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut centers = init_plus_plus(&coords, k, &mut rng);
        let mut assignment = vec![0usize; coords.len()];

        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;
            assign(&coords, &centers, &mut assignment);
            repair_empty(&coords, &mut centers, &mut assignment, k);

            let updated = centroids(&coords, &assignment, k);
            let shift = centers
                .iter()
                .zip(&updated)
                .map(|(old, new)| distance_sq(*old, *new))
                .fold(0.0_f64, f64::max);
            centers = updated;

            if shift <= self.tolerance * self.tolerance {
                break;
            }
        }

        assign(&coords, &centers, &mut assignment);
        repair_empty(&coords, &mut centers, &mut assignment, k);
        let centers = centroids(&coords, &assignment, k);

        debug!(points = points.len(), k, iterations, "k-means converged");

        let mut reduced = Vec::with_capacity(k);
        for (cluster, center) in centers.iter().enumerate() {
            let representative = assignment
                .iter()
                .enumerate()
                .filter(|(_, assigned)| **assigned == cluster)
                .map(|(index, _)| (index, distance_sq(coords[index], *center)))
                .fold(None, |best: Option<(usize, f64)>, candidate| match best {
                    Some(current) if current.1 <= candidate.1 => Some(current),
                    _ => Some(candidate),
                });

            if let Some((index, _)) = representative {
                reduced.push(points[index].clone());
            }
        }

        Ok(reduced)
    }
}

/// Reduce with the default seed and iteration limits
pub fn reduce(points: &[Point], k: usize) -> Result<PointSet, ReductionError> {
    RepresentativeReducer::default().reduce(points, k)
}

fn distance_sq(a: Coord, b: Coord) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

/// k-means++ seeding: first center uniform, later centers D²-weighted.
fn init_plus_plus(coords: &[Coord], k: usize, rng: &mut ChaCha8Rng) -> Vec<Coord> {
    let n = coords.len();
    let mut chosen = vec![false; n];
    let mut centers = Vec::with_capacity(k);

    let first = rng.random_range(0..n);
    chosen[first] = true;
    centers.push(coords[first]);

    let mut nearest: Vec<f64> = coords.iter().map(|c| distance_sq(*c, coords[first])).collect();

    while centers.len() < k {
        let total: f64 = nearest
            .iter()
            .zip(&chosen)
            .filter(|(_, taken)| !**taken)
            .map(|(d, _)| *d)
            .sum();

        let next = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            let mut pick = None;
            let mut last_positive = None;
            for index in 0..n {
                if chosen[index] || nearest[index] <= 0.0 {
                    continue;
                }
                last_positive = Some(index);
                cumulative += nearest[index];
                if cumulative > target {
                    pick = Some(index);
                    break;
                }
            }
            pick.or(last_positive)
        } else {
            None
        };

        // Every remaining point coincides with a center
        let next = next.or_else(|| chosen.iter().position(|taken| !taken));
        let Some(next) = next else {
            break;
        };

        chosen[next] = true;
        centers.push(coords[next]);
        for (index, coord) in coords.iter().enumerate() {
            nearest[index] = nearest[index].min(distance_sq(*coord, coords[next]));
        }
    }

    centers
}

/// Nearest-center assignment, ties to the lowest cluster index
fn assign(coords: &[Coord], centers: &[Coord], assignment: &mut [usize]) {
    for (index, coord) in coords.iter().enumerate() {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (cluster, center) in centers.iter().enumerate() {
            let distance = distance_sq(*coord, *center);
            if distance < best_distance {
                best = cluster;
                best_distance = distance;
            }
        }
        assignment[index] = best;
    }
}

/// Give every empty cluster the point farthest from its own centroid,
/// taken from a cluster that keeps at least one member.
fn repair_empty(coords: &[Coord], centers: &mut [Coord], assignment: &mut [usize], k: usize) {
    let mut sizes = vec![0usize; k];
    for cluster in assignment.iter() {
        sizes[*cluster] += 1;
    }

    for empty in 0..k {
        if sizes[empty] > 0 {
            continue;
        }

        let mut donor: Option<(usize, f64)> = None;
        for (index, cluster) in assignment.iter().enumerate() {
            if sizes[*cluster] <= 1 {
                continue;
            }
            let distance = distance_sq(coords[index], centers[*cluster]);
            if donor.is_none_or(|(_, best)| distance > best) {
                donor = Some((index, distance));
            }
        }

        let Some((index, _)) = donor else {
            return;
        };
        sizes[assignment[index]] -= 1;
        assignment[index] = empty;
        sizes[empty] = 1;
        centers[empty] = coords[index];
    }
}

fn centroids(coords: &[Coord], assignment: &[usize], k: usize) -> Vec<Coord> {
    let mut sums = vec![[0.0_f64; 2]; k];
    let mut counts = vec![0usize; k];
    for (coord, cluster) in coords.iter().zip(assignment) {
        sums[*cluster][0] += coord[0];
        sums[*cluster][1] += coord[1];
        counts[*cluster] += 1;
    }

    sums.into_iter()
        .zip(counts)
        .map(|(sum, count)| {
            #[allow(clippy::cast_precision_loss)]
            let count = count.max(1) as f64;
            [sum[0] / count, sum[1] / count]
        })
        .collect()
}
