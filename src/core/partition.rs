//! Per-iteration partition of the population into Newton sub-problems.
//!
//! Feasible points are grouped by their dominance front among the feasible points.
//! Partition 0 is redefined as front 0 of the feasible points together with every
//! infeasible point, so it always exists. Other feasible fronts stand alone.
//!
//! Invariant: partitions are pairwise disjoint, each index list is sorted
//! ascending, and together they cover `0..len`.

use nalgebra::DVector;

use crate::core::pareto;

/// A set of population indices solved as one Newton system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Front rank among feasible points (0 also holds every infeasible point)
    pub key: usize,
    pub indices: Vec<usize>,
}

/// All partitions of one iteration plus the masks they were derived from.
#[derive(Debug, Clone, Default)]
pub struct Partitioning {
    pub partitions: Vec<Partition>,
    /// Front 0 of the whole population, feasible or not
    pub nondominated: Vec<usize>,
    /// Points neither in front 0 nor feasible; they get the constraint-violation
    /// line search
    pub dominated_infeasible: Vec<usize>,
    pub feasible: Vec<bool>,
}

impl Partitioning {
    /// Build the partitions from objective values and a feasibility mask.
    pub fn build(objectives: &[DVector<f64>], feasible: &[bool], minimization: bool) -> Self {
        debug_assert_eq!(objectives.len(), feasible.len());
        let n = objectives.len();

        let nondominated = pareto::non_dominated_indices(objectives, minimization);
        let mut in_front0 = vec![false; n];
        for &i in &nondominated {
            in_front0[i] = true;
        }
        let dominated_infeasible: Vec<usize> =
            (0..n).filter(|&i| !in_front0[i] && !feasible[i]).collect();

        let feasible_idx: Vec<usize> = (0..n).filter(|&i| feasible[i]).collect();
        let partitions = if feasible_idx.is_empty() {
            vec![Partition {
                key: 0,
                indices: (0..n).collect(),
            }]
        } else {
            let feasible_objectives: Vec<DVector<f64>> =
                feasible_idx.iter().map(|&i| objectives[i].clone()).collect();
            let fronts = pareto::non_dominated_sort(&feasible_objectives, minimization);

            fronts
                .into_iter()
                .enumerate()
                .map(|(key, front)| {
                    let mut indices: Vec<usize> =
                        front.into_iter().map(|k| feasible_idx[k]).collect();
                    if key == 0 {
                        indices.extend((0..n).filter(|&i| !feasible[i]));
                    }
                    indices.sort_unstable();
                    Partition { key, indices }
                })
                .collect()
        };

        Self {
            partitions,
            nondominated,
            dominated_infeasible,
            feasible: feasible.to_vec(),
        }
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter()
    }
}
