//! Minimum-cost bipartite assignment (Hungarian method with potentials).
//!
//! For an `n x m` cost matrix every row is assigned to a distinct column when
//! `n <= m`, otherwise every column to a distinct row. The total cost of the
//! assigned pairs is minimal. `O(min(n, m)^2 max(n, m))`.

use nalgebra::DMatrix;

/// Solve the rectangular assignment problem.
///
/// Returns `(row, col)` pairs sorted by row. Non-finite costs are treated as a
/// very large finite cost, so they are only used when unavoidable.
pub fn min_cost_assignment(cost: &DMatrix<f64>) -> Vec<(usize, usize)> {
    let (n, m) = cost.shape();
    if n == 0 || m == 0 {
        return Vec::new();
    }

    let big = f64::MAX.sqrt();
    let sanitized = cost.map(|c| if c.is_finite() { c } else { big });

    let mut pairs = if n <= m {
        hungarian(&sanitized)
    } else {
        hungarian(&sanitized.transpose())
            .into_iter()
            .map(|(c, r)| (r, c))
            .collect()
    };
    pairs.sort_unstable();
    pairs
}

/// Shortest augmenting paths with row/column potentials; requires `rows <= cols`.
fn hungarian(a: &DMatrix<f64>) -> Vec<(usize, usize)> {
    let (n, m) = a.shape();
    debug_assert!(n <= m);

    // 1-based; index 0 is the virtual root
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; m + 1];
    let mut p = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let cur = a[(i0 - 1, j - 1)] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    (1..=m)
        .filter(|&j| p[j] != 0)
        .map(|j| (p[j] - 1, j - 1))
        .collect()
}
