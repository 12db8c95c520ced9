//! Persistence format: binary codebooks, the name list, the indexer's
//! spill file, the final bucketized posting file, and the cell-size
//! sidecar. All binary files are little-endian; floats are `f32`,
//! counts are `i32` unless noted.
//!
//! There are two distinct posting layouts here, and it matters which one
//! a reader expects: the indexer's *spill* file (Pass A) is per-image,
//! written in arrival order with an explicit `cell_id` per record; the
//! *final* bucketized index instead groups entries by cell, with offsets
//! given by the cell-size sidecar, and stores `{image_id, code}` per
//! entry. `image_id` and `cell_id` are always two explicit fields, never
//! one field overloaded by lifecycle phase.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{IvfadcError, Result};

fn io_err(path: &Path, e: std::io::Error) -> IvfadcError {
    IvfadcError::io(path, e)
}

fn read_i32<R: Read>(r: &mut R, path: &Path) -> Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| io_err(path, e))?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R, path: &Path) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| io_err(path, e))?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32<R: Read>(r: &mut R, path: &Path) -> Result<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| io_err(path, e))?;
    Ok(f32::from_le_bytes(buf))
}

// ─── Codebook / generic float matrix ────────────────────────────────────

pub fn write_matrix(path: &Path, rows: usize, cols: usize, data: &[f32]) -> Result<()> {
    assert_eq!(data.len(), rows * cols);
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let mut w = BufWriter::new(file);
    w.write_all(&(rows as i32).to_le_bytes())
        .map_err(|e| io_err(path, e))?;
    w.write_all(&(cols as i32).to_le_bytes())
        .map_err(|e| io_err(path, e))?;
    for &x in data {
        w.write_all(&x.to_le_bytes()).map_err(|e| io_err(path, e))?;
    }
    w.flush().map_err(|e| io_err(path, e))
}

pub fn read_matrix(path: &Path) -> Result<(usize, usize, Vec<f32>)> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut r = BufReader::new(file);
    let rows = read_i32(&mut r, path)?;
    let cols = read_i32(&mut r, path)?;
    if rows < 0 || cols < 0 {
        return Err(IvfadcError::format(path, "negative matrix dimensions"));
    }
    let (rows, cols) = (rows as usize, cols as usize);
    let mut data = vec![0.0f32; rows * cols];
    for slot in data.iter_mut() {
        *slot = read_f32(&mut r, path)?;
    }
    Ok((rows, cols, data))
}

/// Integer-valued sibling of [`write_matrix`], used for the cell-size
/// sidecar — the header layout is identical (`rows`, `cols` as `i32`) but
/// the payload is `i32` counts rather than `f32`, since cell sizes are
/// exact counts and round-tripping them through floats would be lossy.
pub fn write_i32_matrix(path: &Path, rows: usize, cols: usize, data: &[i32]) -> Result<()> {
    assert_eq!(data.len(), rows * cols);
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let mut w = BufWriter::new(file);
    w.write_all(&(rows as i32).to_le_bytes())
        .map_err(|e| io_err(path, e))?;
    w.write_all(&(cols as i32).to_le_bytes())
        .map_err(|e| io_err(path, e))?;
    for &x in data {
        w.write_all(&x.to_le_bytes()).map_err(|e| io_err(path, e))?;
    }
    w.flush().map_err(|e| io_err(path, e))
}

pub fn read_i32_matrix(path: &Path) -> Result<(usize, usize, Vec<i32>)> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut r = BufReader::new(file);
    let rows = read_i32(&mut r, path)?;
    let cols = read_i32(&mut r, path)?;
    if rows < 0 || cols < 0 {
        return Err(IvfadcError::format(path, "negative matrix dimensions"));
    }
    let (rows, cols) = (rows as usize, cols as usize);
    let mut data = vec![0i32; rows * cols];
    for slot in data.iter_mut() {
        *slot = read_i32(&mut r, path)?;
    }
    Ok((rows, cols, data))
}

// ─── Name list ──────────────────────────────────────────────────────────

pub fn write_name_list(path: &Path, names: &[String]) -> Result<()> {
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let mut w = BufWriter::new(file);
    writeln!(w, "{}", names.len()).map_err(|e| io_err(path, e))?;
    for name in names {
        writeln!(w, "{name}").map_err(|e| io_err(path, e))?;
    }
    w.flush().map_err(|e| io_err(path, e))
}

pub fn read_name_list(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut r = BufReader::new(file);
    let mut first = String::new();
    r.read_line(&mut first).map_err(|e| io_err(path, e))?;
    let n: usize = first
        .trim()
        .parse()
        .map_err(|_| IvfadcError::format(path, "name list header is not an integer"))?;
    let mut names = Vec::with_capacity(n);
    for _ in 0..n {
        let mut line = String::new();
        let read = r.read_line(&mut line).map_err(|e| io_err(path, e))?;
        if read == 0 {
            return Err(IvfadcError::format(path, "name list truncated"));
        }
        names.push(line.trim_end_matches(['\n', '\r']).to_string());
    }
    Ok(names)
}

// ─── Indexer spill file: per-vector (image_id, cell_id, code) ──────────
//
// Workers finish quantizing vectors in unspecified order, so the spill
// file cannot rely on record position to recover `image_id` — each
// record carries it explicitly instead. `num_entries` is always 1 in
// this PQ design but is still written, keeping the record framing
// consistent with the final posting file's per-image grouping.

pub struct SpillWriter {
    writer: BufWriter<File>,
    m: usize,
    path: std::path::PathBuf,
}

impl SpillWriter {
    /// `total_images` must be known up front (the indexer counts input
    /// files before starting), so the header is written truthfully
    /// rather than patched after the fact.
    pub fn create(path: &Path, total_images: usize, m: usize) -> Result<Self> {
        let file = File::create(path).map_err(|e| io_err(path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&(total_images as i32).to_le_bytes())
            .map_err(|e| io_err(path, e))?;
        Ok(SpillWriter {
            writer,
            m,
            path: path.to_path_buf(),
        })
    }

    /// Appends one record in arrival order: `num_entries = 1`, the
    /// explicit `image_id` this record belongs to, `cell_id`, then the
    /// `m`-tuple of sub-codes.
    pub fn write_record(&mut self, image_id: u32, cell_id: u32, code: &[u32]) -> Result<()> {
        debug_assert_eq!(code.len(), self.m);
        let path = self.path.clone();
        self.writer
            .write_all(&1i32.to_le_bytes())
            .map_err(|e| io_err(&path, e))?;
        self.writer
            .write_all(&image_id.to_le_bytes())
            .map_err(|e| io_err(&path, e))?;
        self.writer
            .write_all(&cell_id.to_le_bytes())
            .map_err(|e| io_err(&path, e))?;
        for &c in code {
            self.writer
                .write_all(&c.to_le_bytes())
                .map_err(|e| io_err(&path, e))?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush().map_err(|e| io_err(&self.path, e))
    }
}

pub struct SpillRecord {
    pub image_id: u32,
    pub cell_id: u32,
    pub code: Vec<u32>,
}

/// Reads every record from a spill file, in whatever order Pass A wrote
/// them (arrival order, not necessarily `image_id` order).
pub fn read_spill(path: &Path, m: usize) -> Result<Vec<SpillRecord>> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut r = BufReader::new(file);
    let total = read_i32(&mut r, path)?;
    if total < 0 {
        return Err(IvfadcError::format(path, "negative image count"));
    }
    let mut records = Vec::with_capacity(total as usize);
    for _ in 0..total {
        let num_entries = read_i32(&mut r, path)?;
        if num_entries != 1 {
            return Err(IvfadcError::format(
                path,
                format!("expected num_entries=1, got {num_entries}"),
            ));
        }
        let image_id = read_u32(&mut r, path)?;
        let cell_id = read_u32(&mut r, path)?;
        let mut code = Vec::with_capacity(m);
        for _ in 0..m {
            code.push(read_u32(&mut r, path)?);
        }
        records.push(SpillRecord { image_id, cell_id, code });
    }
    Ok(records)
}

// ─── Final bucketized posting file + cell_sizes sidecar ────────────────

/// One entry in a cell's posting list: `{image_id, code}`, explicit
/// fields rather than an overloaded position-as-id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostingEntry {
    pub image_id: u32,
    pub code: Vec<u32>,
}

/// Writes the final posting file: an `i32` sanity count of total images,
/// then every cell's entries concatenated in cell-id order (cell `c`'s
/// entries occupy `cell_sizes[c]` consecutive fixed-size records of
/// `4 + 4*m` bytes — `image_id` then `m` `u32` codes). The matching
/// `cell_sizes` sidecar is written separately via [`write_i32_matrix`].
pub fn write_posting_file(
    path: &Path,
    total_images: usize,
    m: usize,
    cells: &[Vec<PostingEntry>],
) -> Result<()> {
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let mut w = BufWriter::new(file);
    w.write_all(&(total_images as i32).to_le_bytes())
        .map_err(|e| io_err(path, e))?;
    for cell in cells {
        for entry in cell {
            debug_assert_eq!(entry.code.len(), m);
            w.write_all(&entry.image_id.to_le_bytes())
                .map_err(|e| io_err(path, e))?;
            for &c in &entry.code {
                w.write_all(&c.to_le_bytes()).map_err(|e| io_err(path, e))?;
            }
        }
    }
    w.flush().map_err(|e| io_err(path, e))
}

/// Entry byte size for a posting file with `m` sub-codes per entry.
pub fn entry_bytes(m: usize) -> usize {
    4 + 4 * m
}

/// Loads the whole posting file into memory, split back into per-cell
/// posting lists using `cell_sizes` to locate each cell's byte range.
pub fn read_posting_file(path: &Path, m: usize, cell_sizes: &[i32]) -> Result<Vec<Vec<PostingEntry>>> {
    let mut bytes = Vec::new();
    File::open(path)
        .map_err(|e| io_err(path, e))?
        .read_to_end(&mut bytes)
        .map_err(|e| io_err(path, e))?;
    if bytes.len() < 4 {
        return Err(IvfadcError::format(path, "posting file truncated header"));
    }
    let total_images = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let expected_total: i32 = cell_sizes.iter().sum();
    if total_images != expected_total {
        return Err(IvfadcError::format(
            path,
            format!(
                "posting file header says {total_images} images, cell_sizes sum to {expected_total}"
            ),
        ));
    }

    let rec = entry_bytes(m);
    let mut offset = 4usize;
    let mut cells = Vec::with_capacity(cell_sizes.len());
    for &size in cell_sizes {
        let size = size as usize;
        let mut entries = Vec::with_capacity(size);
        for _ in 0..size {
            if offset + rec > bytes.len() {
                return Err(IvfadcError::format(path, "posting file truncated body"));
            }
            let image_id = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
            let mut code = Vec::with_capacity(m);
            let mut pos = offset + 4;
            for _ in 0..m {
                code.push(u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()));
                pos += 4;
            }
            entries.push(PostingEntry { image_id, code });
            offset += rec;
        }
        cells.push(entries);
    }
    Ok(cells)
}
