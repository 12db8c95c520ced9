//! On-disk file naming conventions shared by the trainer, indexer, and
//! query engine, all rooted at `RunConfig::working_dir()` (`<dataId>.out/`).

use std::path::{Path, PathBuf};

pub fn coarse_codebook_path(dir: &Path) -> PathBuf {
    dir.join("coarse.cbk")
}

pub fn pq_sub_codebook_path(dir: &Path, sub_idx: usize) -> PathBuf {
    dir.join(format!("pq.sub{sub_idx}.cbk"))
}

/// `m`, `nsqbits`, `d` as an `i32` row — the header carries `B` so a
/// reader knows the fixed `u32`-per-subcode layout without guessing.
pub fn pq_meta_path(dir: &Path) -> PathBuf {
    dir.join("pq.meta")
}

pub fn name_list_path(dir: &Path) -> PathBuf {
    dir.join("names.txt")
}

pub fn posting_file_path(dir: &Path) -> PathBuf {
    dir.join("index.post")
}

pub fn cell_sizes_path(dir: &Path) -> PathBuf {
    dir.join("cell_sizes.bin")
}

pub fn spill_file_path(dir: &Path) -> PathBuf {
    dir.join("spill.tmp.new")
}
