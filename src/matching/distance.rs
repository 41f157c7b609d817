use nalgebra::{DMatrix, DVector};

#[inline]
pub fn euclidean(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    (a - b).norm()
}

/// Pairwise Euclidean distances, `a.len() x b.len()`.
pub fn cdist(a: &[DVector<f64>], b: &[DVector<f64>]) -> DMatrix<f64> {
    DMatrix::from_fn(a.len(), b.len(), |i, j| euclidean(&a[i], &b[j]))
}

/// Index of and distance to the point of `set` closest to `point`; the first one on
/// ties. `None` for an empty set.
pub fn nearest(point: &DVector<f64>, set: &[DVector<f64>]) -> Option<(usize, f64)> {
    set.iter()
        .enumerate()
        .map(|(i, q)| (i, euclidean(point, q)))
        .fold(None, |best, (i, d)| match best {
            Some((_, bd)) if bd <= d => best,
            _ => Some((i, d)),
        })
}

/// Directed Hausdorff distance `max_{a in A} min_{b in B} ||a - b||`.
///
/// Infinite when `b` is empty and `a` is not, zero when `a` is empty.
pub fn directed_hausdorff(a: &[DVector<f64>], b: &[DVector<f64>]) -> f64 {
    a.iter()
        .map(|p| nearest(p, b).map_or(f64::INFINITY, |(_, d)| d))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    #[test]
    fn test_cdist_shape_and_values() {
        let a = vec![dvector![0.0, 0.0], dvector![3.0, 4.0]];
        let b = vec![dvector![0.0, 0.0], dvector![0.0, 1.0], dvector![3.0, 0.0]];
        let d = cdist(&a, &b);
        assert_eq!(d.shape(), (2, 3));
        assert_eq!(d[(0, 0)], 0.0);
        assert_eq!(d[(1, 0)], 5.0);
        assert_eq!(d[(1, 2)], 4.0);
    }

    #[test]
    fn test_nearest_prefers_first_on_ties() {
        let set = vec![dvector![1.0, 0.0], dvector![-1.0, 0.0], dvector![0.0, 0.5]];
        assert_eq!(nearest(&dvector![0.0, 0.0], &set), Some((2, 0.5)));
        assert_eq!(nearest(&dvector![0.0, 5.0], &set[..2]), Some((0, 26f64.sqrt())));
        assert_eq!(nearest(&dvector![0.0, 0.0], &[]), None);
    }

    #[test]
    fn test_directed_hausdorff_is_asymmetric() {
        let a = vec![dvector![0.0], dvector![1.0]];
        let b = vec![dvector![0.0], dvector![1.0], dvector![5.0]];
        assert_eq!(directed_hausdorff(&a, &b), 0.0);
        assert_eq!(directed_hausdorff(&b, &a), 4.0);
        assert!(directed_hausdorff(&a, &[]).is_infinite());
    }
}
