//! Indexer: quantizes a directory of reference vectors against
//! already-trained codebooks and persists the inverted file.
//!
//! Pass A streams every vector's `(image_id, cell_id, code)` to a spill
//! file in whatever order the work pool's workers finish, guarded by
//! the shared mutex so appends don't interleave. Pass B reads the spill
//! back, buckets entries by `cell_id`, and writes the final posting
//! file plus its `cell_sizes` sidecar — the layout [`crate::query`]
//! expects. Both passes are written to a temp path and renamed into
//! place only on success: a crash mid-index must not leave a
//! half-written index behind.

use std::fs;
use std::path::Path;

use parking_lot::Mutex;

use crate::codebooks;
use crate::config::RunConfig;
use crate::error::{IvfadcError, Result};
use crate::format::{self, PostingEntry, SpillWriter};
use crate::layout;
use crate::vecmath::normalize;
use crate::workpool;
use crate::{coarse::CoarseQuantizer, descio, pq::PqCodebook};

pub fn build(cfg: &RunConfig) -> Result<()> {
    let working_dir = cfg.working_dir();
    fs::create_dir_all(&working_dir).map_err(|e| IvfadcError::io(&working_dir, e))?;

    log::info!("loading codebooks from {:?}", working_dir);
    let coarse = codebooks::load_coarse(&working_dir)?;
    let pq = codebooks::load_pq(&working_dir)?;
    if coarse.d() != pq.d() {
        return Err(IvfadcError::Shape(format!(
            "coarse dim {} does not match pq dim {}",
            coarse.d(),
            pq.d()
        )));
    }

    log::info!("loading reference descriptors from {:?}", cfg.index_desc);
    let descriptors = descio::load_dir(Path::new(&cfg.index_desc), cfg.dim, None)?;
    let n = descriptors.n;
    let d = descriptors.d;
    if d != coarse.d() {
        return Err(IvfadcError::Shape(format!(
            "descriptor dim {d} does not match codebook dim {}",
            coarse.d()
        )));
    }

    let mut data = descriptors.data;
    for v in data.chunks_mut(d) {
        normalize(v);
    }

    let spill_tmp = layout::spill_file_path(&working_dir);
    run_pass_a(&data, n, d, &coarse, &pq, cfg.nt, &spill_tmp)?;

    log::info!("bucketizing spill file into final posting file");
    let cells = run_pass_b(&spill_tmp, n, coarse.k(), pq.m())?;
    let _ = fs::remove_file(&spill_tmp);

    let posting_tmp = working_dir.join("index.post.new");
    let cell_sizes_tmp = working_dir.join("cell_sizes.bin.new");
    format::write_posting_file(&posting_tmp, n, pq.m(), &cells)?;
    let sizes: Vec<i32> = cells.iter().map(|c| c.len() as i32).collect();
    format::write_i32_matrix(&cell_sizes_tmp, sizes.len(), 1, &sizes)?;

    let names_tmp = working_dir.join("names.txt.new");
    format::write_name_list(&names_tmp, &descriptors.names)?;

    fs::rename(&posting_tmp, layout::posting_file_path(&working_dir))
        .map_err(|e| IvfadcError::io(&posting_tmp, e))?;
    fs::rename(&cell_sizes_tmp, layout::cell_sizes_path(&working_dir))
        .map_err(|e| IvfadcError::io(&cell_sizes_tmp, e))?;
    fs::rename(&names_tmp, layout::name_list_path(&working_dir))
        .map_err(|e| IvfadcError::io(&names_tmp, e))?;

    log::info!(
        "indexing complete: {n} images across {} cells",
        coarse.k()
    );
    Ok(())
}

/// Quantizes every vector in parallel and appends `(image_id, cell_id,
/// code)` to the spill file. All workers share one [`SpillWriter`]
/// behind the work pool's mutex, so writes never interleave but appear
/// in whatever order workers finish — no ordering is promised across
/// tasks.
fn run_pass_a(
    data: &[f32],
    n: usize,
    d: usize,
    coarse: &CoarseQuantizer,
    pq: &PqCodebook,
    nthreads: usize,
    spill_path: &Path,
) -> Result<()> {
    let mut writer = SpillWriter::create(spill_path, n, pq.m())?;
    // SAFETY: every write goes through `lock`, the pool's shared mutex —
    // exactly the "caller-defined critical section" `workpool::run`
    // documents the lock for, so only one worker ever touches `writer`
    // at a time despite the `&mut` being shared across threads.
    let writer_ptr = &mut writer as *mut SpillWriter as usize;
    let write_err: Mutex<Option<IvfadcError>> = Mutex::new(None);

    let result = workpool::run(n, nthreads, |_worker_id, i, lock| {
        let v = &data[i * d..(i + 1) * d];
        let c = coarse.quantize(v);
        let centroid = coarse.centroid(c);
        let mut residual = vec![0.0f32; d];
        for x in 0..d {
            residual[x] = v[x] - centroid[x];
        }
        let code = pq.encode(&residual);

        let _guard = lock.lock();
        if write_err.lock().is_some() {
            // A previous task already failed; stop touching the spill
            // file and let the error surface once the pool drains.
            return;
        }
        let w = unsafe { &mut *(writer_ptr as *mut SpillWriter) };
        if let Err(e) = w.write_record(i as u32, c as u32, &code) {
            *write_err.lock() = Some(e);
        }
    });

    writer.finish()?;
    result?;
    if let Some(e) = write_err.into_inner() {
        return Err(e);
    }
    Ok(())
}

/// Reads the spill file back and groups entries by `cell_id` into
/// `k` posting lists, each sorted by `image_id` for deterministic output
/// regardless of the arrival order Pass A produced.
fn run_pass_b(spill_path: &Path, n: usize, k: usize, m: usize) -> Result<Vec<Vec<PostingEntry>>> {
    let records = format::read_spill(spill_path, m)?;
    if records.len() != n {
        return Err(IvfadcError::Format {
            path: spill_path.to_path_buf(),
            reason: format!("spill file has {} records, expected {n}", records.len()),
        });
    }

    let mut cells: Vec<Vec<PostingEntry>> = vec![Vec::new(); k];
    for record in records {
        let cell = record.cell_id as usize;
        if cell >= k {
            return Err(IvfadcError::Format {
                path: spill_path.to_path_buf(),
                reason: format!("cell id {cell} out of range for k={k}"),
            });
        }
        cells[cell].push(PostingEntry {
            image_id: record.image_id,
            code: record.code,
        });
    }
    for cell in &mut cells {
        cell.sort_by_key(|e| e.image_id);
    }
    Ok(cells)
}
