//! k-medoids clustering with the "alternate" (Voronoi iteration) method.
//!
//! Medoids are always members of the input set. Initialization is k-medoids++:
//! the first medoid is drawn uniformly, every further one is the best of a few
//! candidates drawn with probability proportional to the squared distance to the
//! closest medoid so far. Iterations alternate between assigning points to their
//! closest medoid and moving each medoid to the member of its cluster with the
//! smallest summed distance to the other members.

use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::debug;

use crate::matching::distance::cdist;
use crate::matching::{MatchingError, MatchingResult};

#[derive(Debug, Clone)]
pub struct KMedoids {
    pub n_clusters: usize,
    pub max_iterations: usize,
    pub seed: u64,
}

/// Result of [`KMedoids::fit`].
#[derive(Debug, Clone)]
pub struct KMedoidsFit {
    /// Indices into the input of the medoids, one per cluster
    pub medoid_indices: Vec<usize>,
    /// Cluster of every input point
    pub labels: Vec<usize>,
    /// Sum of the distances of all points to their medoid
    pub inertia: f64,
    pub iterations: usize,
}

impl KMedoids {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iterations: 300,
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Cluster `points` (Euclidean distance). Deterministic for a given seed.
    pub fn fit(&self, points: &[DVector<f64>]) -> MatchingResult<KMedoidsFit> {
        let (k, n) = (self.n_clusters, points.len());
        if k == 0 || k > n {
            return Err(MatchingError::InvalidClusterCount { k, n }.log());
        }

        let dist = cdist(points, points);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut medoids = kpp_init(&dist, k, &mut rng);
        let mut labels = assign(&dist, &medoids);

        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;
            let mut changed = false;
            for (c, medoid) in medoids.iter_mut().enumerate() {
                let members: Vec<usize> = (0..n).filter(|&i| labels[i] == c).collect();
                // an empty cluster keeps its medoid
                let Some(best) = members
                    .iter()
                    .map(|&i| (i, members.iter().map(|&j| dist[(i, j)]).sum::<f64>()))
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(i, _)| i)
                else {
                    continue;
                };
                let current: f64 = members.iter().map(|&j| dist[(*medoid, j)]).sum();
                let candidate: f64 = members.iter().map(|&j| dist[(best, j)]).sum();
                if candidate < current {
                    *medoid = best;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            labels = assign(&dist, &medoids);
        }

        let inertia = (0..n).map(|i| dist[(i, medoids[labels[i]])]).sum();
        debug!(
            "k-medoids: {} clusters of {} points, {} iterations, inertia {:.3e}",
            k, n, iterations, inertia
        );
        Ok(KMedoidsFit {
            medoid_indices: medoids,
            labels,
            inertia,
            iterations,
        })
    }
}

/// Closest medoid of every point (first one on ties).
fn assign(dist: &DMatrix<f64>, medoids: &[usize]) -> Vec<usize> {
    (0..dist.nrows())
        .map(|i| {
            medoids
                .iter()
                .enumerate()
                .min_by(|a, b| dist[(i, *a.1)].total_cmp(&dist[(i, *b.1)]))
                .map_or(0, |(c, _)| c)
        })
        .collect()
}

/// First index whose cumulative weight exceeds `target`; never one of zero weight.
fn sample_index(weights: &[f64], target: f64) -> Option<usize> {
    let mut cum = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cum += w;
        if *w > 0.0 && cum > target {
            return Some(i);
        }
    }
    weights.iter().rposition(|w| *w > 0.0)
}

fn kpp_init(dist: &DMatrix<f64>, k: usize, rng: &mut StdRng) -> Vec<usize> {
    let n = dist.nrows();
    let n_trials = 2 + (k as f64).ln() as usize;

    let first = rng.random_range(0..n);
    let mut medoids = vec![first];
    let mut closest: Vec<f64> = (0..n).map(|j| dist[(first, j)].powi(2)).collect();

    while medoids.len() < k {
        let potential: f64 = closest.iter().sum();
        let mut best: Option<(usize, f64, Vec<f64>)> = None;

        if potential > 0.0 {
            for _ in 0..n_trials {
                let target = rng.random::<f64>() * potential;
                let Some(candidate) = sample_index(&closest, target) else {
                    continue;
                };
                let updated: Vec<f64> = (0..n)
                    .map(|j| closest[j].min(dist[(candidate, j)].powi(2)))
                    .collect();
                let pot: f64 = updated.iter().sum();
                if best.as_ref().is_none_or(|(_, b, _)| pot < *b) {
                    best = Some((candidate, pot, updated));
                }
            }
        }

        match best {
            Some((candidate, _, updated)) => {
                medoids.push(candidate);
                closest = updated;
            }
            None => {
                // every point coincides with a medoid; take any unused index
                let Some(unused) = (0..n).find(|i| !medoids.contains(i)) else {
                    break;
                };
                closest = (0..n)
                    .map(|j| closest[j].min(dist[(unused, j)].powi(2)))
                    .collect();
                medoids.push(unused);
            }
        }
    }
    medoids
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn two_blobs() -> Vec<DVector<f64>> {
        vec![
            dvector![0.0, 0.0],
            dvector![0.1, 0.0],
            dvector![0.0, 0.1],
            dvector![5.0, 5.0],
            dvector![5.1, 5.0],
            dvector![5.0, 5.1],
        ]
    }

    #[test]
    fn test_separates_two_blobs() -> TestResult {
        let fit = KMedoids::new(2).fit(&two_blobs())?;
        assert_eq!(fit.medoid_indices.len(), 2);
        assert_eq!(fit.labels[0], fit.labels[1]);
        assert_eq!(fit.labels[0], fit.labels[2]);
        assert_eq!(fit.labels[3], fit.labels[4]);
        assert_ne!(fit.labels[0], fit.labels[3]);
        // the corner point of each blob minimizes the summed distance
        let mut medoids = fit.medoid_indices.clone();
        medoids.sort_unstable();
        assert_eq!(medoids, vec![0, 3]);
        Ok(())
    }

    #[test]
    fn test_is_deterministic() -> TestResult {
        let points: Vec<DVector<f64>> = (0..20)
            .map(|i| dvector![(i as f64 * 0.7).sin(), (i as f64 * 1.3).cos()])
            .collect();
        let a = KMedoids::new(4).fit(&points)?;
        let b = KMedoids::new(4).fit(&points)?;
        assert_eq!(a.medoid_indices, b.medoid_indices);
        assert_eq!(a.labels, b.labels);
        Ok(())
    }

    #[test]
    fn test_k_equal_to_n_selects_every_point() -> TestResult {
        let points = two_blobs();
        let fit = KMedoids::new(points.len()).fit(&points)?;
        let mut medoids = fit.medoid_indices.clone();
        medoids.sort_unstable();
        assert_eq!(medoids, (0..points.len()).collect::<Vec<_>>());
        assert_eq!(fit.inertia, 0.0);
        Ok(())
    }

    #[test]
    fn test_duplicate_points_still_give_distinct_medoids() -> TestResult {
        let points = vec![dvector![1.0], dvector![1.0], dvector![1.0]];
        let fit = KMedoids::new(3).fit(&points)?;
        let mut medoids = fit.medoid_indices.clone();
        medoids.sort_unstable();
        medoids.dedup();
        assert_eq!(medoids.len(), 3);
        Ok(())
    }

    #[test]
    fn test_rejects_too_many_clusters() {
        let result = KMedoids::new(7).fit(&two_blobs());
        assert!(matches!(
            result,
            Err(MatchingError::InvalidClusterCount { k: 7, n: 6 })
        ));
        assert!(KMedoids::new(0).fit(&two_blobs()).is_err());
    }
}
