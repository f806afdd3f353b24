//! k-means++ seeding followed by a few Lloyd iterations.

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::Rng;

const LLOYD_ITERATIONS: usize = 10;

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the nearest centre for every row; ties go to the lower index.
pub fn nearest_centers(data: &Array2<f64>, centers: &Array2<f64>) -> Vec<usize> {
    data.rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (j, center) in centers.rows().into_iter().enumerate() {
                let dist = squared_distance(row, center);
                if dist < best_dist {
                    best_dist = dist;
                    best = j;
                }
            }
            best
        })
        .collect()
}

/// Pick `k` initial centres with D^2 weighting.
pub fn kmeans_plus_plus(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let (n, d) = data.dim();
    let mut centers = Array2::zeros((k, d));
    if n == 0 || k == 0 {
        return centers;
    }

    let first = rng.gen_range(0..n);
    centers.row_mut(0).assign(&data.row(first));
    let mut min_dist: Vec<f64> = data
        .rows()
        .into_iter()
        .map(|row| squared_distance(row, data.row(first)))
        .collect();

    for c in 1..k {
        let total: f64 = min_dist.iter().sum();
        let chosen = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            let mut pick = None;
            for (i, dist) in min_dist.iter().enumerate() {
                cumulative += dist;
                if cumulative > target && *dist > 0.0 {
                    pick = Some(i);
                    break;
                }
            }
            // Rounding can leave target just past the last positive weight
            pick.or_else(|| min_dist.iter().rposition(|d| *d > 0.0))
                .unwrap_or(0)
        } else {
            rng.gen_range(0..n)
        };

        centers.row_mut(c).assign(&data.row(chosen));
        for (i, row) in data.rows().into_iter().enumerate() {
            let dist = squared_distance(row, data.row(chosen));
            if dist < min_dist[i] {
                min_dist[i] = dist;
            }
        }
    }

    centers
}

/// Seed, refine with Lloyd iterations, and return the hard assignment.
///
/// A centre that loses all its points keeps its previous position.
pub fn kmeans(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Vec<usize> {
    let d = data.ncols();
    let mut centers = kmeans_plus_plus(data, k, rng);
    let mut assignment = nearest_centers(data, &centers);

    for _ in 0..LLOYD_ITERATIONS {
        let mut sums = Array2::<f64>::zeros((k, d));
        let mut counts = vec![0usize; k];
        for (row, &label) in data.rows().into_iter().zip(assignment.iter()) {
            sums.row_mut(label).scaled_add(1.0, &row);
            counts[label] += 1;
        }
        for j in 0..k {
            if counts[j] > 0 {
                let mean = sums.row(j).mapv(|v| v / counts[j] as f64);
                centers.row_mut(j).assign(&mean);
            }
        }

        let next = nearest_centers(data, &centers);
        if next == assignment {
            break;
        }
        assignment = next;
    }

    assignment
}
