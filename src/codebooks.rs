//! Save/load glue between [`CoarseQuantizer`]/[`PqCodebook`] and the
//! binary matrix format, used by the trainer to persist and the
//! query engine to reload. `load(save(c)) == c` bit-for-bit.

use std::path::Path;

use crate::coarse::CoarseQuantizer;
use crate::error::{IvfadcError, Result};
use crate::format;
use crate::layout;
use crate::pq::PqCodebook;

pub fn save_coarse(dir: &Path, cq: &CoarseQuantizer) -> Result<()> {
    format::write_matrix(&layout::coarse_codebook_path(dir), cq.k(), cq.d(), cq.centers())
}

pub fn load_coarse(dir: &Path) -> Result<CoarseQuantizer> {
    let path = layout::coarse_codebook_path(dir);
    let (rows, cols, data) = format::read_matrix(&path)?;
    Ok(CoarseQuantizer::new(data, rows, cols))
}

pub fn save_pq(dir: &Path, pq: &PqCodebook) -> Result<()> {
    format::write_i32_matrix(
        &layout::pq_meta_path(dir),
        1,
        3,
        &[pq.m() as i32, pq.ks().trailing_zeros() as i32, pq.d() as i32],
    )?;
    for sub_idx in 0..pq.m() {
        format::write_matrix(
            &layout::pq_sub_codebook_path(dir, sub_idx),
            pq.ks(),
            pq.ds(),
            pq.sub_codebook(sub_idx),
        )?;
    }
    Ok(())
}

pub fn load_pq(dir: &Path) -> Result<PqCodebook> {
    let meta_path = layout::pq_meta_path(dir);
    let (rows, cols, meta) = format::read_i32_matrix(&meta_path)?;
    if rows != 1 || cols != 3 {
        return Err(IvfadcError::format(&meta_path, "malformed pq metadata"));
    }
    let m = meta[0] as usize;
    let b = meta[1] as u32;
    let d = meta[2] as u32 as usize;
    let ks = 1usize << b;
    let ds = d / m.max(1);

    let mut sub = vec![0.0f32; m * ks * ds];
    for sub_idx in 0..m {
        let path = layout::pq_sub_codebook_path(dir, sub_idx);
        let (rows, cols, data) = format::read_matrix(&path)?;
        if rows != ks || cols != ds {
            return Err(IvfadcError::format(
                &path,
                format!("expected {ks}x{ds} sub-codebook, got {rows}x{cols}"),
            ));
        }
        sub[sub_idx * ks * ds..(sub_idx + 1) * ks * ds].copy_from_slice(&data);
    }

    Ok(PqCodebook::from_parts(sub, m, ks, ds, d))
}
