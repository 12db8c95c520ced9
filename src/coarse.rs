//! Coarse quantizer: one flat `K_c x D` codebook, nearest-cell lookup.

use crate::vecmath::dist_l2_sq;

#[derive(Clone, Debug, PartialEq)]
pub struct CoarseQuantizer {
    /// `k x d` row-major centroids.
    centers: Vec<f32>,
    k: usize,
    d: usize,
}

impl CoarseQuantizer {
    pub fn new(centers: Vec<f32>, k: usize, d: usize) -> Self {
        assert_eq!(centers.len(), k * d);
        CoarseQuantizer { centers, k, d }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn d(&self) -> usize {
        self.d
    }

    pub fn centroid(&self, c: usize) -> &[f32] {
        &self.centers[c * self.d..(c + 1) * self.d]
    }

    pub fn centers(&self) -> &[f32] {
        &self.centers
    }

    /// Nearest cell to `v` by squared L2. Tie-break: lowest cell id.
    pub fn quantize(&self, v: &[f32]) -> usize {
        debug_assert_eq!(v.len(), self.d);
        let mut best = 0usize;
        let mut best_dist = f32::INFINITY;
        for c in 0..self.k {
            let dist = dist_l2_sq(self.centroid(c), v);
            if dist < best_dist {
                best_dist = dist;
                best = c;
            }
        }
        best
    }

    /// The `w` nearest cells to `v`, nearest first (multi-probe).
    /// `w` is clamped to `k`.
    pub fn quantize_w(&self, v: &[f32], w: usize) -> Vec<usize> {
        debug_assert_eq!(v.len(), self.d);
        let w = w.min(self.k).max(1);
        let mut dists: Vec<(f32, usize)> = (0..self.k)
            .map(|c| (dist_l2_sq(self.centroid(c), v), c))
            .collect();
        dists.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));
        dists.into_iter().take(w).map(|(_, c)| c).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cq() -> CoarseQuantizer {
        CoarseQuantizer::new(vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0], 2, 4)
    }

    #[test]
    fn quantize_picks_nearest_cell() {
        let q = cq();
        assert_eq!(q.quantize(&[0.9, 0.1, 0.0, 0.0]), 0);
        assert_eq!(q.quantize(&[0.0, 0.9, 0.1, 0.0]), 1);
    }

    #[test]
    fn quantize_w_returns_all_cells_sorted_when_w_equals_k() {
        let q = cq();
        let probes = q.quantize_w(&[1.0, 0.0, 0.0, 0.0], 2);
        assert_eq!(probes, vec![0, 1]);
    }

    #[test]
    fn single_cell_quantizer_always_returns_cell_zero() {
        let q = CoarseQuantizer::new(vec![5.0, 5.0], 1, 2);
        assert_eq!(q.quantize(&[100.0, -100.0]), 0);
        assert_eq!(q.quantize_w(&[100.0, -100.0], 4), vec![0]);
    }
}
