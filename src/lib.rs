//! # ivfadc — Multithreaded Inverted-File Product-Quantization Image Search
//!
//! An IVFADC (inverted file + asymmetric distance computation)
//! approximate nearest-neighbor engine over pooled image descriptors:
//!
//! - [`coarse`] partitions descriptor space into `K_c` Voronoi cells via
//!   [`kmeans`], giving the inverted file its buckets.
//! - [`pq`] product-quantizes each cell's residuals into `M` compact
//!   sub-codes, so a candidate's approximate distance to a query is a
//!   handful of table lookups ([`PqCodebook::build_adt`] /
//!   [`PqCodebook::asym_distance`]) rather than a full dot product.
//! - [`train`] fits both codebooks from a sample of descriptors;
//!   [`index`] quantizes the full reference set against them into an
//!   on-disk inverted file ([`format`]); [`query`] loads that file and
//!   serves nearest-neighbor search.
//! - [`workpool`] is the one parallelism primitive all of the above
//!   share — no async runtime, no work-stealing, just a flat
//!   claim-and-go counter with stable per-worker ids.
//!
//! ## Determinism
//!
//! Every stage threads a caller-supplied seed through [`rand`]'s
//! `StdRng` rather than reading from the OS clock, and [`descio`] sorts
//! directory listings before assigning image ids — together these make
//! `train`/`index` output a pure function of (input files, config,
//! seed), independent of how many threads ran it.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod coarse;
pub mod codebooks;
pub mod config;
pub mod descio;
pub mod error;
pub mod format;
pub mod index;
pub mod kmeans;
pub mod layout;
pub mod pq;
pub mod query;
pub mod train;
pub mod vecmath;
pub mod workpool;

pub use error::{IvfadcError, Result};
