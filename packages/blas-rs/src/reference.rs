//! Host oracle for every routine.
//!
//! Plain single-threaded loops over one problem instance. Reductions
//! accumulate in `T::Reference`, so half and bfloat16 inputs are summed in
//! `f64`. Callers loop over batches themselves.
//!
//! The fill argument selects the stored triangle; `Fill::Full` is read as
//! upper.

use ndarray::Array2;
use num_complex::Complex64;
use num_traits::{Float, One, Zero};

use crate::element::{norm_from_reference, ComplexElement, Element, RealElement, Scalar, StandardElement};
use crate::layout::{packed_index, vector_index, Diagonal, Fill, Operation, Triangle};

fn triangle(uplo: Fill) -> Triangle {
    match uplo {
        Fill::Lower => Triangle::Lower,
        Fill::Upper | Fill::Full => Triangle::Upper,
    }
}

fn gather<T: Copy>(n: usize, x: &[T], inc: i64) -> Vec<T> {
    (0..n).map(|i| x[vector_index(i, n, inc)]).collect()
}

fn scatter<T: Copy>(values: &[T], x: &mut [T], inc: i64) {
    let n = values.len();
    for (i, value) in values.iter().enumerate() {
        x[vector_index(i, n, inc)] = *value;
    }
}

/// `sum x_i * y_i`, or `sum conj(x_i) * y_i` when `conjugate` is set.
pub fn dot<T: Element>(n: usize, x: &[T], incx: i64, y: &[T], incy: i64, conjugate: bool) -> T {
    let mut sum = T::Reference::zero();
    for i in 0..n {
        let xi = x[vector_index(i, n, incx)].to_reference();
        let yi = y[vector_index(i, n, incy)].to_reference();
        let xi = if conjugate { xi.conj() } else { xi };
        sum += xi * yi;
    }
    T::from_reference(sum)
}

/// Euclidean norm; zero for `n == 0` or a non-positive increment.
pub fn nrm2<T: Element>(n: usize, x: &[T], incx: i64) -> T::Norm {
    let mut sum = <T::Reference as Scalar>::Real::zero();
    if incx > 0 {
        for i in 0..n {
            sum += x[vector_index(i, n, incx)].to_reference().abs_sq();
        }
    }
    norm_from_reference::<T>(sum.sqrt())
}

/// Dense column-major copy of a Hermitian matrix given by its stored
/// triangle. The diagonal's imaginary part is dropped.
fn hermitian_dense<T, F>(tri: Triangle, n: usize, stored: F) -> Vec<T>
where
    T: StandardElement,
    F: Fn(usize, usize) -> T,
{
    let mut dense = vec![T::zero(); n * n];
    for j in 0..n {
        for i in 0..n {
            dense[i + j * n] = if i == j {
                T::from_real(stored(i, i).re())
            } else if tri.contains(i, j) {
                stored(i, j)
            } else {
                stored(j, i).conj()
            };
        }
    }
    dense
}

#[allow(clippy::too_many_arguments)]
fn gemv_dense<T: StandardElement>(
    n: usize,
    dense: &[T],
    alpha: T,
    x: &[T],
    incx: i64,
    beta: T,
    y: &mut [T],
    incy: i64,
) {
    let xs = gather(n, x, incx);
    let mut ys = gather(n, y, incy);
    for (i, yi) in ys.iter_mut().enumerate() {
        let mut sum = T::zero();
        for (j, xj) in xs.iter().enumerate() {
            sum += dense[i + j * n] * *xj;
        }
        *yi = if beta.is_zero() { alpha * sum } else { alpha * sum + beta * *yi };
    }
    scatter(&ys, y, incy);
}

/// `y = alpha * A * x + beta * y`, `A` Hermitian packed.
#[allow(clippy::too_many_arguments)]
pub fn hpmv<T: ComplexElement>(
    uplo: Fill,
    n: usize,
    alpha: T,
    ap: &[T],
    x: &[T],
    incx: i64,
    beta: T,
    y: &mut [T],
    incy: i64,
) {
    let tri = triangle(uplo);
    let dense = hermitian_dense(tri, n, |i, j| ap[packed_index(tri, n, i, j)]);
    gemv_dense(n, &dense, alpha, x, incx, beta, y, incy);
}

/// `y = alpha * A * x + beta * y`, `A` Hermitian banded with `k` off-diagonals.
#[allow(clippy::too_many_arguments)]
pub fn hbmv<T: ComplexElement>(
    uplo: Fill,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    x: &[T],
    incx: i64,
    beta: T,
    y: &mut [T],
    incy: i64,
) {
    let tri = triangle(uplo);
    let stored = |i: usize, j: usize| {
        let distance = i.abs_diff(j);
        if distance > k {
            return T::zero();
        }
        match tri {
            Triangle::Upper => a[k + i - j + j * lda],
            Triangle::Lower => a[i - j + j * lda],
        }
    };
    let dense = hermitian_dense(tri, n, stored);
    gemv_dense(n, &dense, alpha, x, incx, beta, y, incy);
}

/// `A = alpha x y^H + conj(alpha) y x^H + A` on the stored triangle.
#[allow(clippy::too_many_arguments)]
pub fn her2<T: ComplexElement>(
    uplo: Fill,
    n: usize,
    alpha: T,
    x: &[T],
    incx: i64,
    y: &[T],
    incy: i64,
    a: &mut [T],
    lda: usize,
) {
    let tri = triangle(uplo);
    let (xs, ys) = (gather(n, x, incx), gather(n, y, incy));
    for j in 0..n {
        for i in (0..n).filter(|&i| tri.contains(i, j)) {
            let update = alpha * xs[i] * ys[j].conj() + alpha.conj() * ys[i] * xs[j].conj();
            let slot = &mut a[i + j * lda];
            *slot = if i == j {
                T::from_real(slot.re() + update.re())
            } else {
                *slot + update
            };
        }
    }
}

/// `AP = alpha (x y^T + y x^T) + AP` on the packed triangle.
#[allow(clippy::too_many_arguments)]
pub fn spr2<T: RealElement>(
    uplo: Fill,
    n: usize,
    alpha: T,
    x: &[T],
    incx: i64,
    y: &[T],
    incy: i64,
    ap: &mut [T],
) {
    let tri = triangle(uplo);
    let (xs, ys) = (gather(n, x, incx), gather(n, y, incy));
    for j in 0..n {
        for i in (0..n).filter(|&i| tri.contains(i, j)) {
            ap[packed_index(tri, n, i, j)] += alpha * (xs[i] * ys[j] + ys[i] * xs[j]);
        }
    }
}

/// Solves `op(A) * x = b` in place, `A` triangular packed.
#[allow(clippy::too_many_arguments)]
pub fn tpsv<T: StandardElement>(
    uplo: Fill,
    trans: Operation,
    diag: Diagonal,
    n: usize,
    ap: &[T],
    x: &mut [T],
    incx: i64,
) {
    let tri = triangle(uplo);
    let stored = |i: usize, j: usize| {
        if i == j && diag.is_unit() {
            T::one()
        } else if tri.contains(i, j) {
            ap[packed_index(tri, n, i, j)]
        } else {
            T::zero()
        }
    };
    let m = |i: usize, j: usize| match trans {
        Operation::None => stored(i, j),
        Operation::Transpose => stored(j, i),
        Operation::ConjugateTranspose => stored(j, i).conj(),
    };
    let lower = (tri == Triangle::Lower) == (trans == Operation::None);
    let mut xs = gather(n, x, incx);
    let rows: Box<dyn Iterator<Item = usize>> = if lower { Box::new(0..n) } else { Box::new((0..n).rev()) };
    for i in rows {
        let mut sum = xs[i];
        for j in 0..n {
            if (lower && j < i) || (!lower && j > i) {
                sum -= m(i, j) * xs[j];
            }
        }
        xs[i] = sum / m(i, i);
    }
    scatter(&xs, x, incx);
}

/// Writes `inv(A)` into `inv`, zeroing the opposite triangle. Column `j` of
/// the inverse is found by substitution on `A z = e_j`.
pub fn trtri<T: StandardElement>(
    uplo: Fill,
    diag: Diagonal,
    n: usize,
    a: &[T],
    lda: usize,
    inv: &mut [T],
    ldinv: usize,
) {
    let tri = triangle(uplo);
    let at = |i: usize, j: usize| {
        if i == j && diag.is_unit() {
            T::one()
        } else {
            a[i + j * lda]
        }
    };
    for j in 0..n {
        let mut z = vec![T::zero(); n];
        z[j] = T::one() / at(j, j);
        match tri {
            Triangle::Upper => {
                for i in (0..j).rev() {
                    let mut sum = T::zero();
                    for k in i + 1..=j {
                        sum += at(i, k) * z[k];
                    }
                    z[i] = -sum / at(i, i);
                }
            }
            Triangle::Lower => {
                for i in j + 1..n {
                    let mut sum = T::zero();
                    for k in j..i {
                        sum += at(i, k) * z[k];
                    }
                    z[i] = -sum / at(i, i);
                }
            }
        }
        inv[j * ldinv..j * ldinv + n].copy_from_slice(&z);
    }
}

/// Packs the `uplo` triangle of a column-major matrix.
pub fn regular_to_packed<T: Copy + Zero>(uplo: Fill, n: usize, a: &[T], lda: usize) -> Vec<T> {
    let tri = triangle(uplo);
    let mut packed = vec![T::zero(); crate::layout::packed_len(n)];
    for j in 0..n {
        for i in (0..n).filter(|&i| tri.contains(i, j)) {
            packed[packed_index(tri, n, i, j)] = a[i + j * lda];
        }
    }
    packed
}

fn triangular_matrix<T: Element>(tri: Triangle, unit: bool, n: usize, a: &[T], lda: usize) -> Array2<Complex64> {
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j && unit {
            Complex64::one()
        } else if tri.contains(i, j) {
            a[i + j * lda].to_c64()
        } else {
            Complex64::zero()
        }
    })
}

/// `||A * invA - I||_F` over the `uplo` triangles of both operands.
pub fn triangular_identity_residual<T: Element>(
    uplo: Fill,
    diag: Diagonal,
    n: usize,
    a: &[T],
    lda: usize,
    inv: &[T],
    ldinv: usize,
) -> f64 {
    let tri = triangle(uplo);
    let a = triangular_matrix(tri, diag.is_unit(), n, a, lda);
    let inv = triangular_matrix(tri, false, n, inv, ldinv);
    let residual = a.dot(&inv) - Array2::<Complex64>::eye(n);
    residual.iter().map(|e| e.norm_sqr()).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;
    use num_complex::Complex32;

    #[test]
    fn dot_reads_negative_increments_backwards() {
        let x = [1.0f64, 2.0, 3.0];
        let y = [4.0f64, 5.0, 6.0];
        assert_eq!(dot(3, &x, 1, &y, -1, false), 1.0 * 6.0 + 2.0 * 5.0 + 3.0 * 4.0);
    }

    #[test]
    fn dotc_conjugates_x() {
        let x = [Complex32::new(0.0, 1.0)];
        let y = [Complex32::new(0.0, 1.0)];
        assert_eq!(dot(1, &x, 1, &y, 1, true), Complex32::new(1.0, 0.0));
        assert_eq!(dot(1, &x, 1, &y, 1, false), Complex32::new(-1.0, 0.0));
    }

    #[test]
    fn half_sums_accumulate_wide() {
        let x = vec![f16::from_f32(1.0); 4096];
        let sum = dot(4096, &x, 1, &x, 1, false);
        assert_eq!(sum, f16::from_f32(4096.0));
    }

    #[test]
    fn nrm2_of_non_positive_increment_is_zero() {
        assert_eq!(nrm2(2, &[3.0f32, 4.0], 1), 5.0);
        assert_eq!(nrm2(2, &[3.0f32, 4.0], 0), 0.0);
    }

    #[test]
    fn trtri_residual_vanishes() {
        let a = [2.0f64, 0.0, 0.0, 1.0, 4.0, 0.0, 3.0, 5.0, 8.0];
        let mut inv = [f64::NAN; 9];
        trtri(Fill::Upper, Diagonal::NonUnit, 3, &a, 3, &mut inv, 3);
        assert_eq!(inv[1], 0.0);
        let residual = triangular_identity_residual(Fill::Upper, Diagonal::NonUnit, 3, &a, 3, &inv, 3);
        assert!(residual < 1e-14, "residual {residual}");
    }

    #[test]
    fn tpsv_undoes_a_packed_product() {
        // lower [[2, 0], [1, 4]] packed column-wise
        let ap = [2.0f64, 1.0, 4.0];
        let mut x = [2.0, 9.0];
        tpsv(Fill::Lower, Operation::None, Diagonal::NonUnit, 2, &ap, &mut x, 1);
        assert_eq!(x, [1.0, 2.0]);
        let mut xt = [4.0, 8.0];
        tpsv(Fill::Lower, Operation::Transpose, Diagonal::NonUnit, 2, &ap, &mut xt, 1);
        assert_eq!(xt, [1.0, 2.0]);
    }

    #[test]
    fn packs_lower_triangle_by_columns() {
        let a = [1, 2, 3, 0, 4, 5, 0, 0, 6];
        assert_eq!(regular_to_packed(Fill::Lower, 3, &a, 3), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(regular_to_packed(Fill::Upper, 3, &a, 3), vec![1, 0, 4, 0, 0, 6]);
    }
}
