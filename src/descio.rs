//! Descriptor file I/O.
//!
//! Descriptor extraction from raw images is out of scope for this crate;
//! it consumes whatever already-pooled descriptor vectors a directory
//! holds. This module implements the simplest on-disk format consistent
//! with the rest of the binary layout: one little-endian file per image,
//! shaped exactly like the codebook matrix layout (`i32 rows`, `i32 cols`,
//! `f32[rows*cols]` row-major), with `rows == 1` (one pooled descriptor
//! per image). The image name is the file's stem.
//!
//! Directory listing is sorted by file name before assigning image ids,
//! so `image_id` is a pure function of the directory contents — this is
//! what makes training/indexing output independent of how many worker
//! threads ran it.

use std::fs;
use std::path::Path;

use crate::error::{IvfadcError, Result};
use crate::format;

/// A loaded descriptor set: `n * d` row-major vectors and `n` names,
/// `names[i]` is the file stem for `data[i*d..(i+1)*d]`.
pub struct Descriptors {
    pub data: Vec<f32>,
    pub names: Vec<String>,
    pub n: usize,
    pub d: usize,
}

/// Loads every descriptor file directly under `dir`, validating each
/// against `expected_dim`. `sample_cap`, if `Some`, truncates the
/// (sorted) file list before loading — used by the trainer to cap how
/// much of the corpus it pulls into memory for a single training run.
pub fn load_dir(dir: &Path, expected_dim: usize, sample_cap: Option<usize>) -> Result<Descriptors> {
    let mut paths: Vec<_> = fs::read_dir(dir)
        .map_err(|e| IvfadcError::io(dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    if let Some(cap) = sample_cap {
        paths.truncate(cap);
    }

    let n = paths.len();
    let mut data = Vec::with_capacity(n * expected_dim);
    let mut names = Vec::with_capacity(n);

    for path in &paths {
        let (rows, cols, vec_data) = format::read_matrix(path)?;
        if rows != 1 || cols != expected_dim {
            return Err(IvfadcError::format(
                path,
                format!(
                    "expected a single {expected_dim}-dim descriptor, got {rows}x{cols}"
                ),
            ));
        }
        data.extend_from_slice(&vec_data);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        names.push(stem);
    }

    Ok(Descriptors {
        data,
        names,
        n,
        d: expected_dim,
    })
}

/// Writes a single descriptor file in the same format `load_dir` reads —
/// used by tests and by anything generating synthetic descriptor
/// directories.
pub fn write_descriptor(path: &Path, vector: &[f32]) -> Result<()> {
    format::write_matrix(path, 1, vector.len(), vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_sorted_by_filename_for_deterministic_image_ids() {
        let dir = tempdir().unwrap();
        write_descriptor(&dir.path().join("b.feat"), &[2.0, 2.0]).unwrap();
        write_descriptor(&dir.path().join("a.feat"), &[1.0, 1.0]).unwrap();

        let loaded = load_dir(dir.path(), 2, None).unwrap();
        assert_eq!(loaded.names, vec!["a", "b"]);
        assert_eq!(loaded.data, vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let dir = tempdir().unwrap();
        write_descriptor(&dir.path().join("x.feat"), &[1.0, 2.0, 3.0]).unwrap();
        let err = load_dir(dir.path(), 4, None).unwrap_err();
        assert!(matches!(err, IvfadcError::Format { .. }));
    }

    #[test]
    fn sample_cap_truncates_sorted_list() {
        let dir = tempdir().unwrap();
        for name in ["a", "b", "c", "d"] {
            write_descriptor(&dir.path().join(format!("{name}.feat")), &[1.0]).unwrap();
        }
        let loaded = load_dir(dir.path(), 1, Some(2)).unwrap();
        assert_eq!(loaded.names, vec!["a", "b"]);
    }
}
