//! Reference set with persistent one-to-one medoid matching.
//!
//! A reference set consists of one or more disjoint components. Matching an
//! approximation set `Y` against it works in three stages:
//!
//! 1. Partition `Y`, one partition per component: all of `Y` for a single
//!    component, otherwise an explicit partition or, failing that, assignment of
//!    every point to the component holding its nearest reference point.
//! 2. Pair components with non-empty partitions by a minimum-cost assignment on
//!    the directed Hausdorff distance from component to partition.
//! 3. Per pair, cluster the component into `|partition|` medoids (k-medoids) and
//!    assign medoids to partition points one-to-one by Euclidean cost.
//!
//! Medoids and the matching are cached and reused until re-matching is requested
//! again or the size of `Y` changes.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::indicator::{IndicatorError, IndicatorResult, check_dim};
use crate::matching::{KMedoids, cdist, directed_hausdorff, min_cost_assignment, nearest};

#[derive(Debug, Clone)]
pub struct ReferenceSet {
    components: Vec<Vec<DVector<f64>>>,
    /// All components concatenated in order
    points: Vec<DVector<f64>>,
    p: f64,
    dim: usize,
    /// Approximation-set indices per component
    partition: Option<Vec<Vec<usize>>>,
    /// Per-component medoids, ordered like the partition they were matched to
    medoids: Vec<Option<Vec<DVector<f64>>>>,
    /// Matched medoid of every approximation point
    matched: Option<Vec<DVector<f64>>>,
    /// (component, medoid slot) of every approximation point
    slots: Vec<(usize, usize)>,
    re_match: bool,
}

impl ReferenceSet {
    /// Build from components; each must be non-empty and all points must share
    /// one dimension.
    pub fn new(components: Vec<Vec<DVector<f64>>>, p: f64) -> IndicatorResult<Self> {
        if components.is_empty() || components.iter().any(|c| c.is_empty()) {
            return Err(IndicatorError::EmptyReferenceSet.log());
        }
        let dim = components[0][0].len();
        for component in &components {
            check_dim(component, dim)?;
        }

        let points: Vec<DVector<f64>> = components.iter().flatten().cloned().collect();
        let n_components = components.len();
        debug!(
            "Reference set: {} points in {} components, dimension {}",
            points.len(),
            n_components,
            dim
        );
        Ok(Self {
            components,
            points,
            p,
            dim,
            partition: None,
            medoids: vec![None; n_components],
            matched: None,
            slots: Vec::new(),
            re_match: true,
        })
    }

    /// A reference set with a single component.
    pub fn single(points: Vec<DVector<f64>>, p: f64) -> IndicatorResult<Self> {
        Self::new(vec![points], p)
    }

    /// Use an explicit partition of the approximation set, one index list per
    /// component.
    pub fn with_partition(mut self, partition: Vec<Vec<usize>>) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Total number of reference points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn p(&self) -> f64 {
        self.p
    }

    /// All components concatenated.
    pub fn reference_set(&self) -> &[DVector<f64>] {
        &self.points
    }

    pub fn component(&self, k: usize) -> Option<&[DVector<f64>]> {
        self.components.get(k).map(Vec::as_slice)
    }

    /// Matched medoid of every approximation point, after a match.
    pub fn medoids(&self) -> Option<&[DVector<f64>]> {
        self.matched.as_deref()
    }

    /// Cached medoids of component `k`.
    pub fn component_medoids(&self, k: usize) -> Option<&[DVector<f64>]> {
        self.medoids.get(k).and_then(|m| m.as_deref())
    }

    /// (component, medoid slot) matched to approximation point `i`.
    pub fn slot(&self, i: usize) -> Option<(usize, usize)> {
        self.slots.get(i).copied()
    }

    pub fn re_match(&self) -> bool {
        self.re_match
    }

    /// With `false`, later matches return the cached result while the size of the
    /// approximation set is unchanged.
    pub fn set_re_match(&mut self, re_match: bool) {
        self.re_match = re_match;
    }

    pub fn partition(&self) -> Option<&[Vec<usize>]> {
        self.partition.as_deref()
    }

    pub fn set_partition(&mut self, partition: Vec<Vec<usize>>) {
        self.partition = Some(partition);
    }

    /// Forget the partition so the next match derives a new one.
    pub fn clear_partition(&mut self) {
        self.partition = None;
    }

    /// Match the approximation set `y` and return one target per point.
    pub fn match_points(&mut self, y: &[DVector<f64>]) -> IndicatorResult<&[DVector<f64>]> {
        check_dim(y, self.dim)?;
        let reuse = !self.re_match
            && self.matched.as_ref().is_some_and(|m| m.len() == y.len());
        if !reuse {
            self.rematch(y)?;
        }
        self.matched
            .as_deref()
            .ok_or_else(|| IndicatorError::NotMatched { index: 0 }.log())
    }

    /// Overwrite the medoid matched to approximation point `k`, both in the
    /// component cache and in the matched targets.
    pub fn set_medoid(&mut self, medoid: DVector<f64>, k: usize) -> IndicatorResult<()> {
        if medoid.len() != self.dim {
            return Err(IndicatorError::DimensionMismatch(format!(
                "medoid has dimension {}, reference set has {}",
                medoid.len(),
                self.dim
            ))
            .log());
        }
        let (component, slot) = self
            .slot(k)
            .ok_or_else(|| IndicatorError::NotMatched { index: k }.log())?;

        if let Some(m) = self.medoids[component].as_mut().and_then(|m| m.get_mut(slot)) {
            *m = medoid.clone();
        }
        if let Some(m) = self.matched.as_mut().and_then(|m| m.get_mut(k)) {
            *m = medoid;
        }
        Ok(())
    }

    fn rematch(&mut self, y: &[DVector<f64>]) -> IndicatorResult<()> {
        let partition = self.partition_points(y)?;
        let non_empty: Vec<&Vec<usize>> = partition.iter().filter(|p| !p.is_empty()).collect();
        let subsets: Vec<Vec<DVector<f64>>> = non_empty
            .iter()
            .map(|idx| idx.iter().map(|&i| y[i].clone()).collect())
            .collect();

        let (n, m) = (self.n_components(), non_empty.len());
        let pairs: Vec<(usize, usize)> = if n == 1 && m == 1 {
            vec![(0, 0)]
        } else {
            if n < m {
                return Err(IndicatorError::ComponentMismatch {
                    components: n,
                    partitions: m,
                }
                .log());
            }
            let cost = DMatrix::from_fn(n, m, |i, j| {
                directed_hausdorff(&self.components[i], &subsets[j])
            });
            min_cost_assignment(&cost)
        };

        let mut matched = vec![DVector::zeros(self.dim); y.len()];
        let mut slots = vec![(0, 0); y.len()];
        for (component, part) in pairs {
            let targets = &subsets[part];
            let size = self.components[component].len();
            if size < targets.len() {
                return Err(IndicatorError::ComponentTooSmall {
                    component,
                    size,
                    required: targets.len(),
                }
                .log());
            }

            let medoids = match self.medoids[component].take() {
                Some(cached) if cached.len() == targets.len() => cached,
                _ => self.cluster(component, targets.len())?,
            };
            let ordered = assign_medoids(medoids, targets);

            for (slot, &i) in non_empty[part].iter().enumerate() {
                matched[i] = ordered[slot].clone();
                slots[i] = (component, slot);
            }
            self.medoids[component] = Some(ordered);
        }

        self.partition = Some(partition);
        self.matched = Some(matched);
        self.slots = slots;
        Ok(())
    }

    fn cluster(&self, component: usize, k: usize) -> IndicatorResult<Vec<DVector<f64>>> {
        let points = &self.components[component];
        let fit = KMedoids::new(k).fit(points)?;
        Ok(fit
            .medoid_indices
            .iter()
            .map(|&i| points[i].clone())
            .collect())
    }

    /// The partition of `y`, validated against its size.
    fn partition_points(&self, y: &[DVector<f64>]) -> IndicatorResult<Vec<Vec<usize>>> {
        let n = y.len();
        if self.n_components() == 1 {
            return Ok(vec![(0..n).collect()]);
        }

        let partition = match &self.partition {
            Some(partition) => partition.clone(),
            None => {
                let mut partition = vec![Vec::new(); self.n_components()];
                for (i, point) in y.iter().enumerate() {
                    let closest = self
                        .components
                        .iter()
                        .enumerate()
                        .filter_map(|(k, c)| nearest(point, c).map(|(_, d)| (k, d)))
                        .min_by(|a, b| a.1.total_cmp(&b.1))
                        .map_or(0, |(k, _)| k);
                    partition[closest].push(i);
                }
                partition
            }
        };

        let mut seen = vec![false; n];
        for &i in partition.iter().flatten() {
            if i >= n || seen[i] {
                return Err(IndicatorError::InvalidPartition(format!(
                    "index {i} is out of range or repeated for {n} points"
                ))
                .log());
            }
            seen[i] = true;
        }
        if let Some(i) = seen.iter().position(|s| !s) {
            return Err(
                IndicatorError::InvalidPartition(format!("point {i} is in no partition")).log(),
            );
        }
        Ok(partition)
    }
}

/// Reorder `medoids` so that entry `r` is the medoid assigned to `targets[r]`.
fn assign_medoids(medoids: Vec<DVector<f64>>, targets: &[DVector<f64>]) -> Vec<DVector<f64>> {
    let cost = cdist(targets, &medoids);
    min_cost_assignment(&cost)
        .into_iter()
        .map(|(_, c)| medoids[c].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn line(n: usize, offset: f64) -> Vec<DVector<f64>> {
        (0..n)
            .map(|i| {
                let t = i as f64 / (n - 1).max(1) as f64;
                dvector![offset + t, offset + 1.0 - t]
            })
            .collect()
    }

    fn sorted(points: &[DVector<f64>]) -> Vec<Vec<f64>> {
        let mut rows: Vec<Vec<f64>> = points.iter().map(|p| p.iter().copied().collect()).collect();
        rows.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
        rows
    }

    #[test]
    fn test_reference_set_concatenates_components() -> TestResult {
        let reference = ReferenceSet::new(vec![line(3, 0.0), line(2, 5.0)], 2.0)?;
        assert_eq!(reference.n_components(), 2);
        assert_eq!(reference.len(), 5);
        assert_eq!(reference.reference_set()[3], dvector![5.0, 6.0]);
        Ok(())
    }

    #[test]
    fn test_empty_component_is_rejected() {
        let result = ReferenceSet::new(vec![line(3, 0.0), Vec::new()], 2.0);
        assert!(matches!(result, Err(IndicatorError::EmptyReferenceSet)));
    }

    #[test]
    fn test_single_component_matching_is_a_cached_bijection() -> TestResult {
        let refs = line(5, 0.0);
        let mut reference = ReferenceSet::single(refs.clone(), 2.0)?;
        let y: Vec<DVector<f64>> = refs.iter().rev().map(|p| p + dvector![0.05, 0.05]).collect();

        let first = reference.match_points(&y)?.to_vec();
        assert_eq!(sorted(&first), sorted(&refs));
        // every target is the reference point the approximation point was shifted from
        for (target, point) in first.iter().zip(&y) {
            assert!((target - point).norm() < 0.1);
        }

        reference.set_re_match(false);
        let second = reference.match_points(&y)?.to_vec();
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_cached_matching_ignores_moved_points() -> TestResult {
        let mut reference = ReferenceSet::single(line(4, 0.0), 2.0)?;
        let y = line(4, 0.1);
        let first = reference.match_points(&y)?.to_vec();

        reference.set_re_match(false);
        let moved: Vec<DVector<f64>> = y.iter().rev().cloned().collect();
        assert_eq!(reference.match_points(&moved)?, first.as_slice());

        // a size change forces a new matching
        let grown = line(3, 0.1);
        assert_eq!(reference.match_points(&grown)?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_components_are_matched_to_nearest_partitions() -> TestResult {
        let mut reference = ReferenceSet::new(vec![line(6, 0.0), line(6, 10.0)], 2.0)?;
        let y = vec![
            dvector![10.2, 10.9],
            dvector![0.1, 0.8],
            dvector![10.8, 10.3],
            dvector![0.9, 0.2],
        ];
        let targets = reference.match_points(&y)?.to_vec();

        assert_eq!(reference.partition(), Some(&[vec![1, 3], vec![0, 2]][..]));
        for (t, p) in targets.iter().zip(&y) {
            assert!((t - p).norm() < 1.0);
        }
        assert_eq!(reference.slot(0).map(|s| s.0), Some(1));
        assert_eq!(reference.slot(1).map(|s| s.0), Some(0));
        assert_eq!(reference.component_medoids(0).map(<[_]>::len), Some(2));
        Ok(())
    }

    #[test]
    fn test_fewer_components_than_partitions_is_an_error() -> TestResult {
        let mut reference = ReferenceSet::new(vec![line(3, 0.0), line(3, 5.0)], 2.0)?
            .with_partition(vec![vec![0], vec![1], vec![2]]);
        let y = line(3, 0.0);
        let result = reference.match_points(&y);
        assert!(matches!(
            result,
            Err(IndicatorError::ComponentMismatch {
                components: 2,
                partitions: 3
            })
        ));
        Ok(())
    }

    #[test]
    fn test_small_component_is_an_error() -> TestResult {
        let mut reference = ReferenceSet::single(line(2, 0.0), 2.0)?;
        let result = reference.match_points(&line(3, 0.0));
        assert!(matches!(
            result,
            Err(IndicatorError::ComponentTooSmall {
                component: 0,
                size: 2,
                required: 3
            })
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_partition_is_rejected() -> TestResult {
        let mut reference = ReferenceSet::new(vec![line(3, 0.0), line(3, 5.0)], 2.0)?
            .with_partition(vec![vec![0, 1], vec![1]]);
        let result = reference.match_points(&line(3, 0.0));
        assert!(matches!(result, Err(IndicatorError::InvalidPartition(_))));

        reference.clear_partition();
        assert!(reference.match_points(&line(3, 0.0)).is_ok());
        Ok(())
    }

    #[test]
    fn test_set_medoid_updates_cache_and_targets() -> TestResult {
        let mut reference = ReferenceSet::single(line(4, 0.0), 2.0)?;
        let y = line(4, 0.0);
        reference.match_points(&y)?;

        let (component, slot) = reference.slot(2).ok_or("point 2 not matched")?;
        reference.set_medoid(dvector![7.0, 7.0], 2)?;

        assert_eq!(reference.medoids().map(|m| m[2].clone()), Some(dvector![7.0, 7.0]));
        assert_eq!(
            reference.component_medoids(component).map(|m| m[slot].clone()),
            Some(dvector![7.0, 7.0])
        );
        assert!(matches!(
            reference.set_medoid(dvector![0.0, 0.0], 9),
            Err(IndicatorError::NotMatched { index: 9 })
        ));
        Ok(())
    }
}
