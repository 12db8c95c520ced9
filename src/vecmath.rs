//! Vector primitives: squared L2 distance, norm, normalization, a
//! dense GEMV projection hook, and the permutation/RNG helper used by
//! k-means++ seeding.
//!
//! Randomness is threaded through explicitly via a seeded
//! `rand::rngs::StdRng` rather than reseeding from the OS clock on every
//! call, so every caller here is reproducible given a fixed seed.

use rand::rngs::StdRng;
use rand::Rng;

/// Squared Euclidean distance between two equal-length slices.
#[inline]
pub fn dist_l2_sq(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// L2 norm of a slice.
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Zero-vector policy: if `norm(v) <= eps`, leave `v` unchanged rather
/// than dividing by (near) zero.
const NORM_EPS: f32 = 1e-10;

/// Normalize `v` in place to unit L2 norm. No-op on (near) zero vectors.
pub fn normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm <= NORM_EPS {
        return;
    }
    let inv = 1.0 / norm;
    for x in v.iter_mut() {
        *x *= inv;
    }
}

/// Dense matrix-vector product `y = P * x`, `P` is `rows x cols`
/// row-major, `x` has `cols` elements, `y` has `rows` elements. A
/// general-purpose linear projection primitive; no pipeline stage wires
/// it up yet, but it's the natural building block for future
/// dimensionality-reduction preprocessing ahead of coarse quantization.
pub fn project(p: &[f32], rows: usize, cols: usize, x: &[f32], y: &mut [f32]) {
    assert_eq!(p.len(), rows * cols);
    assert_eq!(x.len(), cols);
    assert_eq!(y.len(), rows);
    for r in 0..rows {
        let row = &p[r * cols..(r + 1) * cols];
        y[r] = row.iter().zip(x.iter()).map(|(a, b)| a * b).sum();
    }
}

/// Fisher-Yates shuffle of `0..n`, using the supplied seeded RNG.
pub fn rand_perm(n: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        perm.swap(i, j);
    }
    perm
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn dist_l2_sq_matches_naive() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [0.0, 2.0, 5.0, 4.0];
        assert_eq!(dist_l2_sq(&a, &b), 1.0 + 0.0 + 4.0 + 0.0);
    }

    #[test]
    fn normalize_unit_vector_is_idempotent() {
        let mut v = [3.0f32, 4.0, 0.0];
        normalize(&mut v);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
        let copy = v;
        normalize(&mut v);
        assert_eq!(v, copy);
    }

    #[test]
    fn normalize_zero_vector_is_left_unchanged() {
        let mut v = [0.0f32, 0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn project_identity_matrix_is_passthrough() {
        let p = [1.0, 0.0, 0.0, 1.0];
        let x = [5.0, 7.0];
        let mut y = [0.0; 2];
        project(&p, 2, 2, &x, &mut y);
        assert_eq!(y, [5.0, 7.0]);
    }

    #[test]
    fn rand_perm_is_a_bijection() {
        let mut rng = StdRng::seed_from_u64(7);
        let perm = rand_perm(50, &mut rng);
        let mut sorted = perm.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn rand_perm_is_deterministic_given_a_seed() {
        let mut rng_a = StdRng::seed_from_u64(123);
        let mut rng_b = StdRng::seed_from_u64(123);
        assert_eq!(rand_perm(30, &mut rng_a), rand_perm(30, &mut rng_b));
    }
}
