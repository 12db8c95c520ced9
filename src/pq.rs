//! Product-quantization codebook: `M` sub-codebooks of `K_s`
//! centroids each, over disjoint `D/M`-dimensional slices of the residual
//! space.

use crate::error::{IvfadcError, Result};
use crate::kmeans;
use crate::vecmath::dist_l2_sq;

#[derive(Clone, Debug, PartialEq)]
pub struct PqCodebook {
    /// `m` sub-codebooks, each `ks x ds` row-major, concatenated: slot `i`
    /// occupies `sub[i*ks*ds .. (i+1)*ks*ds]`.
    sub: Vec<f32>,
    m: usize,
    ks: usize,
    ds: usize,
    d: usize,
}

impl PqCodebook {
    /// Reassembles a codebook from its parts (used when reloading from
    /// disk, where each sub-codebook is stored in its own file).
    pub fn from_parts(sub: Vec<f32>, m: usize, ks: usize, ds: usize, d: usize) -> Self {
        assert_eq!(sub.len(), m * ks * ds);
        PqCodebook { sub, m, ks, ds, d }
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn ks(&self) -> usize {
        self.ks
    }

    pub fn ds(&self) -> usize {
        self.ds
    }

    pub fn d(&self) -> usize {
        self.d
    }

    pub fn sub_codebook(&self, i: usize) -> &[f32] {
        &self.sub[i * self.ks * self.ds..(i + 1) * self.ks * self.ds]
    }

    fn centroid(&self, sub_idx: usize, code: u32) -> &[f32] {
        let base = sub_idx * self.ks * self.ds + code as usize * self.ds;
        &self.sub[base..base + self.ds]
    }

    /// Builds `m` sub-codebooks from the residual matrix `residuals`
    /// (`n x d` row-major). `ks = 2^b`; `d` must be a multiple of `m`.
    #[allow(clippy::too_many_arguments)]
    pub fn train(
        residuals: &[f32],
        n: usize,
        d: usize,
        m: usize,
        b: u32,
        iters: usize,
        attempts: usize,
        nthreads: usize,
        seed: u64,
    ) -> Result<Self> {
        if m == 0 || d % m != 0 {
            return Err(IvfadcError::Shape(format!(
                "pq: dim {d} is not a multiple of nsq {m}"
            )));
        }
        let ds = d / m;
        let ks = 1usize << b;
        if n < ks {
            return Err(IvfadcError::Shape(format!(
                "pq: n ({n}) must be >= ks ({ks})"
            )));
        }

        let mut sub = vec![0.0f32; m * ks * ds];
        for sub_idx in 0..m {
            let mut slice = vec![0.0f32; n * ds];
            for row in 0..n {
                let src = &residuals[row * d + sub_idx * ds..row * d + (sub_idx + 1) * ds];
                slice[row * ds..(row + 1) * ds].copy_from_slice(src);
            }
            let sub_seed = seed ^ (0xA24BAED4963EE407u64.wrapping_mul(sub_idx as u64 + 1));
            let result = kmeans::kmeans(&slice, n, ds, ks, iters, attempts, nthreads, sub_seed)?;
            log::info!("pq sub-codebook {sub_idx}/{m}: cost={:.6}", result.cost);
            sub[sub_idx * ks * ds..(sub_idx + 1) * ks * ds].copy_from_slice(&result.centers);
        }

        Ok(PqCodebook { sub, m, ks, ds, d })
    }

    /// Encodes `v` (length `d`) into `m` sub-codes, each in `[0, ks)`.
    /// Pure function of `v` and the codebook — repeated calls on the
    /// same input return identical codes.
    pub fn encode(&self, v: &[f32]) -> Vec<u32> {
        debug_assert_eq!(v.len(), self.d);
        (0..self.m)
            .map(|sub_idx| {
                let slice = &v[sub_idx * self.ds..(sub_idx + 1) * self.ds];
                let sub_codebook = self.sub_codebook(sub_idx);
                let mut best = 0u32;
                let mut best_dist = f32::INFINITY;
                for j in 0..self.ks {
                    let centroid = &sub_codebook[j * self.ds..(j + 1) * self.ds];
                    let dist = dist_l2_sq(slice, centroid);
                    if dist < best_dist {
                        best_dist = dist;
                        best = j as u32;
                    }
                }
                best
            })
            .collect()
    }

    /// Reconstructs an approximate vector (length `d`) from its PQ codes
    /// by concatenating each sub-codebook's selected centroid.
    pub fn reconstruct(&self, codes: &[u32]) -> Vec<f32> {
        debug_assert_eq!(codes.len(), self.m);
        let mut out = vec![0.0f32; self.d];
        for (sub_idx, &code) in codes.iter().enumerate() {
            out[sub_idx * self.ds..(sub_idx + 1) * self.ds]
                .copy_from_slice(self.centroid(sub_idx, code));
        }
        out
    }

    /// Builds the `M x K_s` asymmetric distance table for query residual
    /// `q` (length `d`): `adt[sub_idx * ks + j] = dist_l2_sq(q_sub, PC_sub[j])`.
    pub fn build_adt(&self, q: &[f32]) -> Vec<f32> {
        debug_assert_eq!(q.len(), self.d);
        let mut adt = vec![0.0f32; self.m * self.ks];
        for sub_idx in 0..self.m {
            let slice = &q[sub_idx * self.ds..(sub_idx + 1) * self.ds];
            let sub_codebook = self.sub_codebook(sub_idx);
            for j in 0..self.ks {
                let centroid = &sub_codebook[j * self.ds..(j + 1) * self.ds];
                adt[sub_idx * self.ks + j] = dist_l2_sq(slice, centroid);
            }
        }
        adt
    }

    /// Asymmetric distance between the vector the table was built from
    /// and an encoded vector's `codes`, via table lookup: `sum_m adt[m][code_m]`.
    pub fn asym_distance(&self, adt: &[f32], codes: &[u32]) -> f32 {
        debug_assert_eq!(codes.len(), self.m);
        codes
            .iter()
            .enumerate()
            .map(|(sub_idx, &code)| adt[sub_idx * self.ks + code as usize])
            .sum()
    }
}
