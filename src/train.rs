//! Trainer: sampling → coarse training → residual computation → PQ
//! training → persistence.

use std::fs;
use std::path::Path;

use parking_lot::Mutex;

use crate::coarse::CoarseQuantizer;
use crate::codebooks;
use crate::config::RunConfig;
use crate::error::{IvfadcError, Result};
use crate::pq::PqCodebook;
use crate::vecmath::normalize;
use crate::workpool;
use crate::descio;

/// Fixed seed root for all randomness in a training run (k-means++
/// seeding, residual PQ training). Exposed so callers needing exact,
/// thread-count-independent reproducibility can override it.
const DEFAULT_SEED: u64 = 0xC0FFEE_u64;

pub fn train(cfg: &RunConfig) -> Result<()> {
    train_with_seed(cfg, DEFAULT_SEED)
}

pub fn train_with_seed(cfg: &RunConfig, seed: u64) -> Result<()> {
    let working_dir = cfg.working_dir();
    fs::create_dir_all(&working_dir).map_err(|e| IvfadcError::io(&working_dir, e))?;

    log::info!("loading training descriptors from {:?}", cfg.train_desc);
    let descriptors = descio::load_dir(Path::new(&cfg.train_desc), cfg.dim, None)?;
    let n = descriptors.n;
    let d = descriptors.d;

    if n < cfg.coarsek {
        return Err(IvfadcError::Training(format!(
            "insufficient training data: n={n} < coarsek={}",
            cfg.coarsek
        )));
    }
    let ks = 1usize << cfg.nsqbits;
    if n < ks {
        return Err(IvfadcError::Training(format!(
            "insufficient training data: n={n} < ks={ks}"
        )));
    }

    let mut data = descriptors.data;
    for v in data.chunks_mut(d) {
        normalize(v);
    }

    log::info!("training coarse codebook: k={} n={n} d={d}", cfg.coarsek);
    let coarse_result = crate::kmeans::kmeans(
        &data,
        n,
        d,
        cfg.coarsek,
        cfg.iter,
        cfg.attempts,
        cfg.nt,
        seed,
    )?;
    let coarse = CoarseQuantizer::new(coarse_result.centers, cfg.coarsek, d);

    log::info!("computing residuals against coarse assignment");
    let residuals = compute_residuals(&data, n, d, &coarse, cfg.nt)?;

    log::info!(
        "training PQ codebook: nsq={} nsqbits={} n={n} d={d}",
        cfg.nsq, cfg.nsqbits
    );
    let pq = PqCodebook::train(
        &residuals,
        n,
        d,
        cfg.nsq,
        cfg.nsqbits,
        cfg.iter,
        cfg.attempts,
        cfg.nt,
        seed ^ 0xD1A6_u64,
    )?;

    codebooks::save_coarse(&working_dir, &coarse)?;
    codebooks::save_pq(&working_dir, &pq)?;
    log::info!("training complete, codebooks written to {:?}", working_dir);

    Ok(())
}

/// Assigns each training vector to its nearest coarse centroid and
/// emits `r_j = x_j - CC[assign(j)]`, in parallel over the work pool.
fn compute_residuals(
    data: &[f32],
    n: usize,
    d: usize,
    coarse: &CoarseQuantizer,
    nthreads: usize,
) -> Result<Vec<f32>> {
    let mut residuals = vec![0.0f32; n * d];
    let residuals_ptr = residuals.as_mut_ptr() as usize;

    workpool::run(n, nthreads, move |_worker_id, i, _lock: &Mutex<()>| {
        let point = &data[i * d..(i + 1) * d];
        let c = coarse.quantize(point);
        let centroid = coarse.centroid(c);
        // SAFETY: task index `i` owns the disjoint slice `[i*d, (i+1)*d)`.
        let out = unsafe {
            std::slice::from_raw_parts_mut((residuals_ptr as *mut f32).add(i * d), d)
        };
        for x in 0..d {
            out[x] = point[x] - centroid[x];
        }
    })?;

    Ok(residuals)
}
