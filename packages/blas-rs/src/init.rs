//! Deterministic test inputs.
//!
//! Values are small integers so that sums of moderate length are exact in
//! every element type, which lets correctness checks compare bit for bit.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::buffer::HostBatch;
use crate::config;
use crate::element::{Element, StandardElement};
use crate::layout::Fill;

/// Generator seeded from `NUMRS_BLAS_TEST_SEED`.
pub fn seeded_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(config::test_seed())
}

/// Random integer in `1..=10`, with an integer imaginary part for complex types.
pub fn random_integer<T: Element, R: Rng + ?Sized>(rng: &mut R) -> T {
    let re = rng.gen_range(1..=10);
    let im = rng.gen_range(1..=10);
    T::from_parts(f64::from(re), f64::from(im))
}

/// Random integer in `-10..=10` for scalars such as `alpha`.
pub fn random_scalar<T: Element, R: Rng + ?Sized>(rng: &mut R) -> T {
    let re = rng.gen_range(-10..=10);
    let im = rng.gen_range(-10..=10);
    T::from_parts(f64::from(re), f64::from(im))
}

/// Fills every element of the batch, gaps included.
pub fn fill_random<T: Element, R: Rng + ?Sized>(rng: &mut R, host: &mut HostBatch<T>) {
    host.fill_with(|| random_integer(rng));
}

/// Fills `host` with well-conditioned triangular matrices for inversion.
///
/// The diagonal holds random integers; entries of the `uplo` triangle off
/// the diagonal are scaled by `0.01` with alternating sign, which keeps
/// inverse entries bounded for large `n`. The opposite triangle is filled
/// with NaN, so any read of it shows up in the result.
pub fn init_trtri<T: StandardElement, R: Rng + ?Sized>(
    rng: &mut R,
    uplo: Fill,
    n: usize,
    lda: usize,
    host: &mut HostBatch<T>,
) {
    let hundredth = T::from_parts(0.01, 0.0);
    for b in 0..host.batch_count() {
        let a = host.batch_mut(b);
        for col in 0..n {
            for row in 0..n {
                let stored = match uplo {
                    Fill::Upper => row <= col,
                    Fill::Lower => row >= col,
                    Fill::Full => true,
                };
                a[row + col * lda] = if row == col {
                    random_integer(rng)
                } else if stored {
                    let value: T = random_integer::<T, _>(rng) * hundredth;
                    if (row + col) % 2 == 0 {
                        value
                    } else {
                        -value
                    }
                } else {
                    T::from_parts(f64::NAN, f64::NAN)
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex32;

    #[test]
    fn same_seed_same_values() {
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        let xs: Vec<f64> = (0..16).map(|_| random_integer(&mut a)).collect();
        let ys: Vec<f64> = (0..16).map(|_| random_integer(&mut b)).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().all(|v| (1.0..=10.0).contains(v) && v.fract() == 0.0));
    }

    #[test]
    fn complex_values_get_imaginary_parts() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let z: Complex32 = random_integer(&mut rng);
        assert!(z.im >= 1.0);
    }

    #[test]
    fn trtri_inputs_poison_the_unused_triangle() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut host = HostBatch::<f64>::new(9, 9, 2);
        init_trtri(&mut rng, Fill::Lower, 3, 3, &mut host);
        for b in 0..2 {
            let a = host.batch(b);
            assert!(a[3].is_nan(), "upper entry must be poisoned");
            assert!(a[1].abs() <= 0.1 && a[1] != 0.0);
            assert!(a[0] >= 1.0);
        }
    }
}
