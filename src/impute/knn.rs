//! KNN-based imputation

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Candidate donor ordered by distance, then row index. Kept in a max-heap so
/// the farthest of the current k sits on top.
#[derive(Debug, Clone, Copy)]
struct DistanceIdx(f64, usize);

impl PartialEq for DistanceIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DistanceIdx {}

impl PartialOrd for DistanceIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistanceIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

fn push_bounded(heap: &mut BinaryHeap<DistanceIdx>, item: DistanceIdx, k: usize) {
    if heap.len() < k {
        heap.push(item);
    } else if heap.peek().is_some_and(|top| item < *top) {
        heap.pop();
        heap.push(item);
    }
}

/// Fills missing cells from the nearest rows that observe the same column.
///
/// Distances ignore coordinates missing on either side and are scaled up by
/// `total / present` so rows with fewer shared coordinates are not favoured.
/// Donor values always come from the original data, never from cells filled
/// earlier in the same pass.
#[derive(Debug, Clone)]
pub struct KnnImputer {
    n_neighbors: usize,
}

impl Default for KnnImputer {
    fn default() -> Self {
        Self::new(5)
    }
}

impl KnnImputer {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
        }
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    /// Imputes a rows x features matrix in place, NaN marking missing
    /// cells. Columns with no observed value are left untouched.
    pub fn fill(&self, data: &mut Array2<f64>) {
        let original = data.clone();
        let fallback: Vec<Option<f64>> = original.columns().into_iter().map(observed_mean).collect();

        let filled: Vec<(usize, Vec<(usize, f64)>)> = (0..original.nrows())
            .into_par_iter()
            .filter(|&r| original.row(r).iter().any(|v| v.is_nan()))
            .map(|r| (r, self.impute_row(r, &original, &fallback)))
            .collect();

        for (r, cells) in filled {
            for (c, value) in cells {
                data[[r, c]] = value;
            }
        }
    }

    fn impute_row(&self, r: usize, data: &Array2<f64>, fallback: &[Option<f64>]) -> Vec<(usize, f64)> {
        let row = data.row(r);
        let missing: Vec<usize> = row
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_nan())
            .map(|(c, _)| c)
            .collect();
        let mut heaps: Vec<BinaryHeap<DistanceIdx>> = missing
            .iter()
            .map(|_| BinaryHeap::with_capacity(self.n_neighbors + 1))
            .collect();

        for (i, other) in data.rows().into_iter().enumerate() {
            if i == r {
                continue;
            }
            let Some(dist) = nan_euclidean(row, other) else {
                continue;
            };
            for (heap, &c) in heaps.iter_mut().zip(&missing) {
                if !other[c].is_nan() {
                    push_bounded(heap, DistanceIdx(dist, i), self.n_neighbors);
                }
            }
        }

        missing
            .iter()
            .zip(heaps)
            .filter_map(|(&c, heap)| {
                let donors: Vec<f64> = heap.into_iter().map(|DistanceIdx(_, i)| data[[i, c]]).collect();
                let value = if donors.is_empty() {
                    fallback[c]
                } else {
                    Some(donors.iter().sum::<f64>() / donors.len() as f64)
                };
                value.map(|v| (c, v))
            })
            .collect()
    }
}

fn observed_mean(column: ArrayView1<f64>) -> Option<f64> {
    let (sum, n) = column
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Euclidean distance over jointly observed coordinates, scaled by the
/// fraction observed. `None` when the rows share no coordinate.
pub fn nan_euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Option<f64> {
    let mut present = 0usize;
    let mut accum = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        if !x.is_nan() && !y.is_nan() {
            present += 1;
            accum += (x - y).powi(2);
        }
    }

    if present == 0 {
        return None;
    }
    Some((accum * a.len() as f64 / present as f64).sqrt())
}
