//! Pareto dominance and non-dominated sorting of objective vectors.
//!
//! Front 0 is the non-dominated subset; front `k` is non-dominated once fronts
//! `0..k` are removed. Every front is returned in ascending index order.

use nalgebra::DVector;

/// Returns `true` if `a` Pareto-dominates `b`: no worse in every objective and
/// strictly better in at least one.
pub fn dominates(a: &DVector<f64>, b: &DVector<f64>, minimization: bool) -> bool {
    debug_assert_eq!(a.len(), b.len());

    let mut strictly_better = false;
    for (&av, &bv) in a.iter().zip(b.iter()) {
        let (better, worse) = if minimization {
            (av < bv, av > bv)
        } else {
            (av > bv, av < bv)
        };
        if worse {
            return false;
        }
        strictly_better |= better;
    }
    strictly_better
}

/// Fast non-dominated sorting (Deb et al., 2002), `O(M N^2)`.
pub fn non_dominated_sort(values: &[DVector<f64>], minimization: bool) -> Vec<Vec<usize>> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }

    // solutions dominated by each point, and how many points dominate it
    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count: Vec<usize> = vec![0; n];

    for i in 0..n {
        for j in (i + 1)..n {
            if dominates(&values[i], &values[j], minimization) {
                dominated_by[i].push(j);
                domination_count[j] += 1;
            } else if dominates(&values[j], &values[i], minimization) {
                dominated_by[j].push(i);
                domination_count[i] += 1;
            }
        }
    }

    let mut fronts: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();

    while !current.is_empty() {
        let mut next: Vec<usize> = Vec::new();
        for &p in &current {
            for &q in &dominated_by[p] {
                domination_count[q] -= 1;
                if domination_count[q] == 0 {
                    next.push(q);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }

    fronts
}

/// Indices of the non-dominated points (front 0).
pub fn non_dominated_indices(values: &[DVector<f64>], minimization: bool) -> Vec<usize> {
    non_dominated_sort(values, minimization)
        .into_iter()
        .next()
        .unwrap_or_default()
}
