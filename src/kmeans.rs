//! Multithreaded Lloyd k-means with k-means++ seeding.
//!
//! The assignment step is routed through the work-distribution pool
//! (`workpool::run`), and a single seeded `StdRng` is threaded through
//! every stage — seeding and assignment alike are a pure function of the
//! input data and the seed, not of wall-clock time.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{IvfadcError, Result};
use crate::vecmath::dist_l2_sq;
use crate::workpool;

/// Result of a k-means run: flattened `k x d` centers and the final cost
/// (sum of squared assignment distances for the winning attempt).
pub struct KMeansResult {
    pub centers: Vec<f32>,
    pub cost: f32,
}

/// Runs k-means clustering.
///
/// `data` is `n x d` row-major. `attempts` independent runs are tried
/// (each with its own k-means++ seeding); the attempt with lowest final
/// cost wins. `nthreads` controls the assignment step's parallelism via
/// [`workpool::run`].
///
/// Errors with `ShapeError` if `n < k` (can't form `k` non-empty seed
/// points) or `k == 0`.
pub fn kmeans(
    data: &[f32],
    n: usize,
    d: usize,
    k: usize,
    iters: usize,
    attempts: usize,
    nthreads: usize,
    seed: u64,
) -> Result<KMeansResult> {
    if k == 0 {
        return Err(IvfadcError::Shape("k-means: k must be > 0".into()));
    }
    if n < k {
        return Err(IvfadcError::Shape(format!(
            "k-means: n ({n}) must be >= k ({k})"
        )));
    }
    assert_eq!(data.len(), n * d);

    let mut best_cost = f32::INFINITY;
    let mut best_centers = vec![0.0f32; k * d];

    for attempt in 0..attempts.max(1) {
        let attempt_seed = seed ^ (0x9E3779B97F4A7C15u64.wrapping_mul(attempt as u64 + 1));
        let mut rng = StdRng::seed_from_u64(attempt_seed);
        let (centers, cost) = kmeans_once(data, n, d, k, iters, nthreads, &mut rng)?;
        log::info!("k-means attempt {attempt}/{attempts}: cost={cost:.6}");
        if cost < best_cost {
            best_cost = cost;
            best_centers = centers;
        }
    }

    Ok(KMeansResult {
        centers: best_centers,
        cost: best_cost,
    })
}

fn kmeans_once(
    data: &[f32],
    n: usize,
    d: usize,
    k: usize,
    iters: usize,
    nthreads: usize,
    rng: &mut StdRng,
) -> Result<(Vec<f32>, f32)> {
    let seed_idx = init_kpp(data, n, d, k, rng);
    let mut centers = vec![0.0f32; k * d];
    for (c, &idx) in seed_idx.iter().enumerate() {
        centers[c * d..(c + 1) * d].copy_from_slice(&data[idx * d..(idx + 1) * d]);
    }

    let mut assignment = vec![0usize; n];
    let mut cost_per_point = vec![0.0f32; n];
    let mut final_cost = 0.0f32;

    for iteration in 0..iters.max(1) {
        // Assignment step, parallel over points.
        assign(data, n, d, &centers, k, nthreads, &mut assignment, &mut cost_per_point)?;
        let cost: f32 = cost_per_point.iter().sum();
        final_cost = cost;
        log::debug!("k-means iter {iteration}: cost={cost:.6}");

        // Update step, serial: mean of members per cell. Empty cells keep
        // their previous centroid rather than re-seeding from the
        // farthest point.
        let mut sums = vec![0.0f32; k * d];
        let mut counts = vec![0usize; k];
        for j in 0..n {
            let c = assignment[j];
            counts[c] += 1;
            let row = &data[j * d..(j + 1) * d];
            let acc = &mut sums[c * d..(c + 1) * d];
            for x in 0..d {
                acc[x] += row[x];
            }
        }
        for c in 0..k {
            if counts[c] == 0 {
                continue; // keep previous centroid
            }
            let inv = 1.0 / counts[c] as f32;
            let dst = &mut centers[c * d..(c + 1) * d];
            let src = &sums[c * d..(c + 1) * d];
            for x in 0..d {
                dst[x] = src[x] * inv;
            }
        }
    }

    if centers.iter().any(|v| !v.is_finite()) {
        return Err(IvfadcError::Training(
            "k-means produced a non-finite centroid".into(),
        ));
    }

    Ok((centers, final_cost))
}

/// Parallel nearest-center assignment. Tie-break: lowest center index
/// (strict `<` comparator).
fn assign(
    data: &[f32],
    n: usize,
    d: usize,
    centers: &[f32],
    k: usize,
    nthreads: usize,
    assignment: &mut [usize],
    cost_per_point: &mut [f32],
) -> Result<()> {
    // SAFETY note: each task index `i` writes only `assignment[i]` and
    // `cost_per_point[i]` — disjoint slots, so sharing the buffers across
    // worker threads via raw pointers is sound without per-task locking.
    let assignment_ptr = assignment.as_mut_ptr() as usize;
    let cost_ptr = cost_per_point.as_mut_ptr() as usize;

    workpool::run(n, nthreads, move |_worker_id, i, _lock: &Mutex<()>| {
        let point = &data[i * d..(i + 1) * d];
        let mut best_dist = f32::INFINITY;
        let mut best_m = 0usize;
        for m in 0..k {
            let center = &centers[m * d..(m + 1) * d];
            let dist = dist_l2_sq(center, point);
            if dist < best_dist {
                best_dist = dist;
                best_m = m;
            }
        }
        unsafe {
            *(assignment_ptr as *mut usize).add(i) = best_m;
            *(cost_ptr as *mut f32).add(i) = best_dist;
        }
    })
}

/// k-means++ seeding: pick the first center uniformly, then each
/// subsequent center with probability proportional to its squared
/// distance to the nearest already-selected center (cumulative-
/// distribution inversion over a uniform draw).
fn init_kpp(data: &[f32], n: usize, d: usize, k: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut selected = Vec::with_capacity(k);
    let mut nearest_sq = vec![f32::INFINITY; n];

    selected.push(rng.gen_range(0..n));

    while selected.len() < k {
        let last = *selected.last().unwrap();
        let last_point = &data[last * d..(last + 1) * d];
        for j in 0..n {
            let dj = dist_l2_sq(&data[j * d..(j + 1) * d], last_point);
            if dj < nearest_sq[j] {
                nearest_sq[j] = dj;
            }
        }

        let total: f32 = nearest_sq.iter().sum();
        let next = if total <= 0.0 {
            // All remaining points coincide with an existing center;
            // fall back to uniform choice among unselected indices.
            (0..n).find(|idx| !selected.contains(idx)).unwrap_or(0)
        } else {
            let draw: f32 = rng.gen_range(0.0..1.0) * total;
            let mut acc = 0.0f32;
            let mut chosen = n - 1;
            for (j, &dj) in nearest_sq.iter().enumerate() {
                acc += dj;
                if draw < acc {
                    chosen = j;
                    break;
                }
            }
            chosen
        };
        selected.push(next);
    }

    selected
}
