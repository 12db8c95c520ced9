//! Query engine: `Uninitialized → Loaded → Serving` lifecycle over
//! a trained, indexed IVFADC store, structured as an explicit state
//! machine so a caller can't issue a search before `load()` has
//! populated the codebooks and posting lists.
//!
//! Search probes the `w` coarse cells nearest the query (multi-probe),
//! builds one asymmetric distance table per probed cell, and scores
//! every candidate in those cells by table lookup — no distance is ever
//! computed against a reconstructed vector at query time. The query
//! residual is *not* renormalized before the table is built, matching
//! how PQ was trained on raw residuals, so indexing and querying apply
//! the same convention symmetrically.

use std::path::Path;

use crate::coarse::CoarseQuantizer;
use crate::codebooks;
use crate::config::RunConfig;
use crate::error::{IvfadcError, Result};
use crate::format::{self, PostingEntry};
use crate::layout;
use crate::pq::PqCodebook;
use crate::vecmath::normalize;
use crate::workpool;

/// One scored result: the candidate's image id, its name, and its
/// asymmetric distance to the query (lower is closer).
#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    pub image_id: u32,
    pub name: String,
    pub distance: f32,
}

enum State {
    Uninitialized,
    Loaded {
        coarse: CoarseQuantizer,
        pq: PqCodebook,
        names: Vec<String>,
        cells: Vec<Vec<PostingEntry>>,
        nthreads: usize,
    },
}

/// The query engine. `new()` starts `Uninitialized`; [`QueryEngine::load`]
/// transitions to `Loaded`, after which [`QueryEngine::search`] and
/// [`QueryEngine::search_batch`] ("Serving") are available. Calling
/// search before load is a programmer error, not a recoverable one — it
/// panics rather than silently returning an empty result set.
pub struct QueryEngine {
    state: State,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryEngine {
    pub fn new() -> Self {
        QueryEngine {
            state: State::Uninitialized,
        }
    }

    pub fn load(dir: &Path, nthreads: usize) -> Result<Self> {
        log::info!("loading index from {:?}", dir);
        let coarse = codebooks::load_coarse(dir)?;
        let pq = codebooks::load_pq(dir)?;
        let names = format::read_name_list(&layout::name_list_path(dir))?;
        let (rows, _cols, cell_sizes) = format::read_i32_matrix(&layout::cell_sizes_path(dir))?;
        if rows != coarse.k() {
            return Err(IvfadcError::format(
                layout::cell_sizes_path(dir),
                format!("cell_sizes has {rows} rows, expected coarsek={}", coarse.k()),
            ));
        }
        let cells =
            format::read_posting_file(&layout::posting_file_path(dir), pq.m(), &cell_sizes)?;

        Ok(QueryEngine {
            state: State::Loaded {
                coarse,
                pq,
                names,
                cells,
                nthreads: nthreads.max(1),
            },
        })
    }

    pub fn load_from_config(cfg: &RunConfig) -> Result<Self> {
        Self::load(&cfg.working_dir(), cfg.nt)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, State::Loaded { .. })
    }

    /// Searches for the `top_k` closest indexed images to `query`
    /// (length `d`), probing the `w` nearest coarse cells.
    ///
    /// Once `Loaded`, a search never fails except for a malformed query:
    /// `query.len() != d` is rejected with `ShapeError`, leaving the
    /// engine's state untouched.
    pub fn search(&self, query: &[f32], top_k: usize, w: usize) -> Result<Vec<Hit>> {
        let State::Loaded {
            coarse,
            pq,
            names,
            cells,
            ..
        } = &self.state
        else {
            panic!("search called before load");
        };

        if query.len() != coarse.d() {
            return Err(IvfadcError::Shape(format!(
                "query has {} dims, expected {}",
                query.len(),
                coarse.d()
            )));
        }

        let mut q = query.to_vec();
        normalize(&mut q);
        let probes = coarse.quantize_w(&q, w);

        let mut candidates: Vec<Hit> = Vec::new();
        for cell_id in probes {
            let centroid = coarse.centroid(cell_id);
            let mut residual = vec![0.0f32; q.len()];
            for x in 0..q.len() {
                residual[x] = q[x] - centroid[x];
            }
            let adt = pq.build_adt(&residual);
            for entry in &cells[cell_id] {
                let distance = pq.asym_distance(&adt, &entry.code);
                candidates.push(Hit {
                    image_id: entry.image_id,
                    name: names[entry.image_id as usize].clone(),
                    distance,
                });
            }
        }

        // Merge by minimum score across probed cells, top-k first, ties
        // broken by lower image_id for deterministic output.
        candidates.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap()
                .then(a.image_id.cmp(&b.image_id))
        });
        candidates.truncate(top_k);
        Ok(candidates)
    }

    /// Runs many independent queries across the shared work pool,
    /// reusing the same loaded codebooks/postings for every query.
    pub fn search_batch(
        &self,
        queries: &[Vec<f32>],
        top_k: usize,
        w: usize,
    ) -> Result<Vec<Vec<Hit>>> {
        let State::Loaded { nthreads, .. } = &self.state else {
            panic!("search_batch called before load");
        };
        let nthreads = *nthreads;

        let mut results: Vec<Result<Vec<Hit>>> =
            (0..queries.len()).map(|_| Ok(Vec::new())).collect();
        let results_ptr = results.as_mut_ptr() as usize;

        workpool::run(queries.len(), nthreads, move |_worker_id, i, _lock| {
            let hits = self.search(&queries[i], top_k, w);
            // SAFETY: task index `i` owns the disjoint slot `results[i]`.
            unsafe {
                std::ptr::write((results_ptr as *mut Result<Vec<Hit>>).add(i), hits);
            }
        })
        .expect("search task panicked");

        results.into_iter().collect()
    }
}
