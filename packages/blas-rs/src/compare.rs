//! Result comparison against the oracle.
//!
//! Operands are batches of column-major `rows x cols` matrices with leading
//! dimension `ld`, batch `b` starting at `b * stride`. Vectors are compared
//! as `1 x n` matrices with `ld = |inc|`.

use ndarray::Array2;
use num_complex::Complex64;
use thiserror::Error;

use crate::element::Element;

/// First element that failed a check.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckFailure {
    #[error("batch {batch} ({row}, {col}): expected {expected}, got {actual} ({ulps} ulps apart)")]
    Unit {
        batch: usize,
        row: usize,
        col: usize,
        expected: Complex64,
        actual: Complex64,
        ulps: u64,
    },
    #[error("batch {batch} ({row}, {col}): expected {expected}, got {actual}, off by {error:e} > {tolerance:e}")]
    Near {
        batch: usize,
        row: usize,
        col: usize,
        expected: Complex64,
        actual: Complex64,
        error: f64,
        tolerance: f64,
    },
    #[error("{norm:?}-norm relative error {error:e} exceeds {tolerance:e}")]
    Norm {
        norm: NormType,
        error: f64,
        tolerance: f64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormType {
    /// Largest column sum of magnitudes.
    One,
    /// Largest row sum of magnitudes.
    Infinity,
    Frobenius,
    /// Largest magnitude.
    Max,
}

impl NormType {
    pub const fn letter(self) -> char {
        match self {
            NormType::One => 'O',
            NormType::Infinity => 'I',
            NormType::Frobenius => 'F',
            NormType::Max => 'M',
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Layout {
    rows: usize,
    cols: usize,
    ld: usize,
    stride: usize,
    batch_count: usize,
}

impl Layout {
    fn for_each<F: FnMut(usize, usize, usize, usize)>(&self, mut visit: F) {
        for batch in 0..self.batch_count {
            for col in 0..self.cols {
                for row in 0..self.rows {
                    visit(batch, row, col, batch * self.stride + row + col * self.ld);
                }
            }
        }
    }

    fn matrix<T: Element>(&self, data: &[T], batch: usize) -> Array2<Complex64> {
        let base = batch * self.stride;
        Array2::from_shape_fn((self.rows, self.cols), |(row, col)| {
            data[base + row + col * self.ld].to_c64()
        })
    }
}

/// Exact comparison up to `T::UNIT_ULPS` per component; NaN matches NaN.
pub fn unit_check_general<T: Element>(
    rows: usize,
    cols: usize,
    ld: usize,
    stride: usize,
    expected: &[T],
    actual: &[T],
    batch_count: usize,
) -> Result<(), CheckFailure> {
    let layout = Layout { rows, cols, ld, stride, batch_count };
    let mut failure = None;
    layout.for_each(|batch, row, col, index| {
        if failure.is_some() {
            return;
        }
        let ulps = expected[index].ulps_from(actual[index]);
        if ulps > T::UNIT_ULPS {
            failure = Some(CheckFailure::Unit {
                batch,
                row,
                col,
                expected: expected[index].to_c64(),
                actual: actual[index].to_c64(),
                ulps,
            });
        }
    });
    failure.map_or(Ok(()), Err)
}

/// `|expected - actual| <= tolerance` per element.
#[allow(clippy::too_many_arguments)]
pub fn near_check_general<T: Element>(
    rows: usize,
    cols: usize,
    ld: usize,
    stride: usize,
    expected: &[T],
    actual: &[T],
    batch_count: usize,
    tolerance: f64,
) -> Result<(), CheckFailure> {
    let layout = Layout { rows, cols, ld, stride, batch_count };
    let mut failure = None;
    layout.for_each(|batch, row, col, index| {
        if failure.is_some() {
            return;
        }
        let (e, a) = (expected[index].to_c64(), actual[index].to_c64());
        let error = (e - a).norm();
        if (error.is_nan() || error > tolerance) && !(e.is_nan() && a.is_nan()) {
            failure = Some(CheckFailure::Near {
                batch,
                row,
                col,
                expected: e,
                actual: a,
                error,
                tolerance,
            });
        }
    });
    failure.map_or(Ok(()), Err)
}

/// `f64::max` that keeps a NaN instead of discarding it.
fn nan_max(acc: f64, value: f64) -> f64 {
    if acc.is_nan() || value.is_nan() {
        f64::NAN
    } else {
        acc.max(value)
    }
}

fn matrix_norm(norm: NormType, m: &Array2<Complex64>) -> f64 {
    let magnitudes = m.mapv(|v| v.norm());
    match norm {
        NormType::One => magnitudes.columns().into_iter().map(|c| c.sum()).fold(0.0, nan_max),
        NormType::Infinity => magnitudes.rows().into_iter().map(|r| r.sum()).fold(0.0, nan_max),
        NormType::Frobenius => magnitudes.iter().map(|v| v * v).sum::<f64>().sqrt(),
        NormType::Max => magnitudes.iter().copied().fold(0.0, nan_max),
    }
}

/// Largest per-batch `||expected - actual|| / ||expected||`. A batch whose
/// expected norm is zero contributes its absolute error norm. Any NaN in
/// either operand makes the result NaN.
#[allow(clippy::too_many_arguments)]
pub fn norm_check_general<T: Element>(
    norm: NormType,
    rows: usize,
    cols: usize,
    ld: usize,
    stride: usize,
    expected: &[T],
    actual: &[T],
    batch_count: usize,
) -> f64 {
    let layout = Layout { rows, cols, ld, stride, batch_count };
    (0..batch_count)
        .map(|batch| {
            let e = layout.matrix(expected, batch);
            let a = layout.matrix(actual, batch);
            let reference = matrix_norm(norm, &e);
            let error = matrix_norm(norm, &(&e - &a));
            if reference == 0.0 {
                error
            } else {
                error / reference
            }
        })
        .fold(0.0, nan_max)
}

/// `|expected - actual| / |expected|`, or the absolute error when
/// `expected` is zero.
pub fn relative_error<T: Element>(expected: T, actual: T) -> f64 {
    let (e, a) = (expected.to_c64(), actual.to_c64());
    let error = (e - a).norm();
    let scale = e.norm();
    if scale == 0.0 {
        error
    } else {
        error / scale
    }
}

/// Acceptance class for a correctness check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tolerance {
    Unit,
    Near(f64),
}

impl Tolerance {
    /// Reductions over `n` terms: half-precision types get an allowance
    /// growing with `n` once sums get long; everything else must match.
    pub fn reduction<T: Element>(n: usize) -> Self {
        if T::DTYPE.is_reduced_precision() && n > 10_000 {
            Tolerance::Near(n as f64 * T::SUM_ERROR_TOLERANCE)
        } else {
            Tolerance::Unit
        }
    }

    /// For results of a square root, which keep about half the digits.
    pub fn sqrt_precision<T: Element>(reference: f64) -> Self {
        let digits = f64::from(T::DIGITS10) / 2.0;
        Tolerance::Near(2.0 * 10f64.powf(-digits) * reference.abs())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn check<T: Element>(
        self,
        rows: usize,
        cols: usize,
        ld: usize,
        stride: usize,
        expected: &[T],
        actual: &[T],
        batch_count: usize,
    ) -> Result<(), CheckFailure> {
        match self {
            Tolerance::Unit => unit_check_general(rows, cols, ld, stride, expected, actual, batch_count),
            Tolerance::Near(tolerance) => {
                near_check_general(rows, cols, ld, stride, expected, actual, batch_count, tolerance)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    #[test]
    fn unit_check_allows_a_few_ulps() {
        let expected = [1.0f32, f32::NAN];
        let nudged = [f32::from_bits(1.0f32.to_bits() + 3), f32::NAN];
        assert!(unit_check_general(1, 2, 1, 2, &expected, &nudged, 1).is_ok());
        let off = [f32::from_bits(1.0f32.to_bits() + 5), f32::NAN];
        let failure = unit_check_general(1, 2, 1, 2, &expected, &off, 1).expect_err("5 ulps");
        assert!(matches!(failure, CheckFailure::Unit { col: 0, ulps: 5, .. }));
    }

    #[test]
    fn half_unit_check_is_exact() {
        let expected = [f16::from_f32(1.0)];
        let actual = [f16::from_bits(expected[0].to_bits() + 1)];
        assert!(unit_check_general(1, 1, 1, 1, &expected, &actual, 1).is_err());
    }

    #[test]
    fn checks_skip_padding_rows() {
        // 2x2 matrices, ld 3, two batches; padding holds garbage.
        let expected = [1.0f64, 2.0, 0.0, 3.0, 4.0, 0.0, 5.0, 6.0, 0.0, 7.0, 8.0, 0.0];
        let mut actual = expected;
        actual[2] = 99.0;
        actual[8] = -1.0;
        assert!(unit_check_general(2, 2, 3, 6, &expected, &actual, 2).is_ok());
        actual[7] = 6.5;
        let failure = near_check_general(2, 2, 3, 6, &expected, &actual, 2, 0.25).expect_err("off");
        assert!(matches!(failure, CheckFailure::Near { batch: 1, row: 1, col: 0, .. }));
    }

    #[test]
    fn norm_check_falls_back_to_absolute_error() {
        let zeros = [0.0f64; 4];
        let small = [0.0f64, 1e-3, 0.0, 0.0];
        assert_eq!(norm_check_general(NormType::Max, 2, 2, 2, 4, &zeros, &small, 1), 1e-3);
        let expected = [2.0f64, 0.0, 0.0, 2.0];
        let actual = [2.0f64, 0.0, 0.0, 1.0];
        assert_eq!(norm_check_general(NormType::One, 2, 2, 2, 4, &expected, &actual, 1), 0.5);
        let frob = norm_check_general(NormType::Frobenius, 2, 2, 2, 4, &expected, &actual, 1);
        assert!((frob - 1.0 / 8f64.sqrt()).abs() < 1e-15);
    }

    #[test]
    fn norm_check_reports_nan_results() {
        let expected = [1.0f64, 2.0, 3.0, 4.0];
        let actual = [f64::NAN, 2.0, 3.0, 4.0];
        for norm in [NormType::One, NormType::Infinity, NormType::Frobenius, NormType::Max] {
            assert!(norm_check_general(norm, 2, 2, 2, 4, &expected, &actual, 1).is_nan(), "{norm:?}");
            assert!(norm_check_general(norm, 2, 2, 2, 4, &expected, &[f64::NAN; 4], 1).is_nan(), "{norm:?}");
        }
        // Only the second batch is poisoned.
        let expected = [1.0f32, 2.0, 1.0, 2.0];
        let actual = [1.0f32, 2.0, 1.0, f32::NAN];
        assert!(norm_check_general(NormType::Max, 2, 1, 2, 2, &expected, &actual, 2).is_nan());
        assert_eq!(norm_check_general(NormType::Max, 2, 1, 2, 2, &expected, &actual, 1), 0.0);
    }

    #[test]
    fn relative_error_of_zero_reference_is_absolute() {
        assert_eq!(relative_error(0.0f64, 0.5), 0.5);
        assert_eq!(relative_error(4.0f64, 5.0), 0.25);
    }

    #[test]
    fn reduction_tolerance_scales_only_long_half_sums() {
        assert_eq!(Tolerance::reduction::<f16>(100), Tolerance::Unit);
        assert_eq!(Tolerance::reduction::<f64>(1 << 20), Tolerance::Unit);
        match Tolerance::reduction::<f16>(20_000) {
            Tolerance::Near(tol) => assert!((tol - 20_000.0 / 900.0).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }
}
