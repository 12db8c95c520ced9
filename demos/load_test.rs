//! ```bash
//! RUSTFLAGS="-C target-cpu=native" cargo run --release --bin load_test
//! ```
//!
//! End-to-end pipeline exerciser: generates a synthetic descriptor
//! corpus, runs train → index → query, and verifies that reloading the
//! persisted index reproduces identical search results — the same
//! round-trip check `tests/` exercises, but timed and printed.

use ivfadc::config::RunConfig;
use ivfadc::descio::write_descriptor;
use ivfadc::query::QueryEngine;
use ivfadc::{index, train};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{fs, path::PathBuf, time::Instant};

/// Pooled descriptor dimension.
const DIM: usize = 128;
/// Number of reference images to generate.
const N_VECS: usize = 4_000;
/// Number of held-out query vectors.
const N_QUERIES: usize = 50;
/// Coarse codebook size.
const COARSE_K: usize = 64;
/// Deterministic seed for reproducibility.
const SEED: u64 = 42;

fn random_vector(rng: &mut StdRng, dim: usize) -> Vec<f32> {
    (0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect()
}

fn divider() {
    println!("{}", "─".repeat(60));
}

fn main() -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║           ivfadc Load Test & Round-Trip Verifier          ║");
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let root = PathBuf::from("/tmp/ivfadc_load_test");
    let desc_dir = root.join("descriptors");
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(&desc_dir)?;

    divider();
    println!("Phase 1 — Generating {N_VECS} synthetic {DIM}-dim descriptors");
    let t0 = Instant::now();
    let mut rng = StdRng::seed_from_u64(SEED);
    for i in 0..N_VECS {
        let v = random_vector(&mut rng, DIM);
        write_descriptor(&desc_dir.join(format!("img{i:06}.feat")), &v)?;
    }
    println!("  Generated in {:?}", t0.elapsed());

    let cfg = RunConfig {
        data_id: root.join("run").to_string_lossy().into_owned(),
        nt: 8,
        train_desc: desc_dir.to_string_lossy().into_owned(),
        index_desc: desc_dir.to_string_lossy().into_owned(),
        query_desc: desc_dir.to_string_lossy().into_owned(),
        dim: DIM,
        coarsek: COARSE_K,
        nsq: 8,
        nsqbits: 8,
        iter: 10,
        attempts: 2,
        num_ret: 10,
        w: 8,
    };

    divider();
    println!("Phase 2 — Training coarse + PQ codebooks (nt={})", cfg.nt);
    let t0 = Instant::now();
    train::train(&cfg)?;
    println!("  Trained in {:?}", t0.elapsed());

    divider();
    println!("Phase 3 — Building inverted file over {N_VECS} reference images");
    let t0 = Instant::now();
    index::build(&cfg)?;
    println!("  Indexed in {:?}", t0.elapsed());

    divider();
    println!("Phase 4 — Loading index and running {N_QUERIES} baseline searches");
    let mut query_rng = StdRng::seed_from_u64(SEED + 1);
    let queries: Vec<Vec<f32>> = (0..N_QUERIES).map(|_| random_vector(&mut query_rng, DIM)).collect();

    let t0 = Instant::now();
    let engine = QueryEngine::load_from_config(&cfg)?;
    let baseline: Vec<_> = queries
        .iter()
        .map(|q| engine.search(q, cfg.num_ret, cfg.w))
        .collect::<Result<_, _>>()?;
    let search_duration = t0.elapsed();
    println!("  Completed in {search_duration:?}");
    println!(
        "  Average per query: {:.2} µs",
        search_duration.as_micros() as f64 / N_QUERIES as f64
    );

    divider();
    println!("Phase 5 — Reloading index from disk and re-running the same queries");
    let t0 = Instant::now();
    let reloaded = QueryEngine::load_from_config(&cfg)?;
    let reload_duration = t0.elapsed();
    let verified: Vec<_> = queries
        .iter()
        .map(|q| reloaded.search(q, cfg.num_ret, cfg.w))
        .collect::<Result<_, _>>()?;
    println!("  Reloaded in {reload_duration:?}");

    let mismatches = baseline
        .iter()
        .zip(verified.iter())
        .filter(|(a, b)| a != b)
        .count();

    divider();
    if mismatches == 0 {
        println!("✅ Round-trip integrity: PASSED ({N_QUERIES} queries, identical after reload)");
    } else {
        println!("❌ Round-trip integrity: FAILED ({mismatches}/{N_QUERIES} queries differ)");
    }

    let _ = fs::remove_dir_all(&root);
    Ok(())
}
