//! Level-2 routines on packed, banded and full Hermitian/symmetric/triangular
//! storage. Each batch is handled by one block, which loads its operands,
//! computes in the element type and stores the updated operand.

mod hbmv;
mod her2;
mod hpmv;
mod spr2;
mod tpsv;

pub use hbmv::hbmv;
pub use her2::her2;
pub use hpmv::hpmv;
pub use spr2::spr2;
pub use tpsv::tpsv;

use crate::batch::{BatchAddress, BatchMode, ScalarArg, ScalarPtr};
use crate::device::{BlockCtx, DeviceError, DevicePtr};
use crate::element::{Element, Scalar};
use crate::error::{BlasError, BlasResult};
use crate::handle::Handle;
use crate::layout::{negative_inc_shift, Triangle};

/// Threads per block for level-2 kernels.
pub(crate) const LEVEL2_THREADS: u32 = 256;

pub(crate) fn require(name: &'static str, is_null: bool) -> BlasResult<()> {
    if is_null {
        Err(BlasError::InvalidPointer(name))
    } else {
        Ok(())
    }
}

pub(crate) fn check_sizes(mode: BatchMode, n: i64, incs: &[(&str, i64)], batch_count: i64) -> BlasResult<()> {
    if n < 0 {
        return Err(BlasError::invalid_size(format!("n = {n}")));
    }
    if let Some((name, _)) = incs.iter().find(|(_, inc)| *inc == 0) {
        return Err(BlasError::invalid_size(format!("{name} = 0")));
    }
    mode.check_batch_count(batch_count)
}

/// Resolves a required scalar; a null scalar is an invalid pointer.
pub(crate) fn required_scalar<T: Copy>(
    handle: &Handle,
    name: &'static str,
    scalar: ScalarPtr<'_, T>,
) -> BlasResult<ScalarArg<T>> {
    handle
        .scalar(name, scalar)?
        .ok_or(BlasError::InvalidPointer(name))
}

/// Loads logical elements `0..n` of a strided vector of batch `batch`.
/// Returns the address of logical element 0 for the matching store.
pub(crate) fn load_vector<T, B>(
    ctx: &BlockCtx<'_>,
    v: &B,
    batch: i64,
    n: usize,
    inc: i64,
) -> Result<(DevicePtr<T>, Vec<T>), DeviceError>
where
    T: Element,
    B: BatchAddress<T>,
{
    let base = v.resolve(ctx, batch, negative_inc_shift(n as i64, inc))?;
    Ok((base, ctx.load_strided(base, n, inc)?))
}

/// `y = alpha * A * x + beta * y` for a Hermitian `A` given through
/// `stored(i, j)` on the referenced triangle. The imaginary part of the
/// diagonal is taken as zero. `beta == 0` overwrites `y` without reading it.
pub(crate) fn hermitian_mv<T, F>(triangle: Triangle, stored: F, x: &[T], y: &mut [T], alpha: T, beta: T)
where
    T: Scalar,
    F: Fn(usize, usize) -> T,
{
    for (i, yi) in y.iter_mut().enumerate() {
        let mut sum = T::zero();
        for (j, &xj) in x.iter().enumerate() {
            let a = if i == j {
                T::from_real(stored(i, i).re())
            } else if triangle.contains(i, j) {
                stored(i, j)
            } else {
                stored(j, i).conj()
            };
            sum += a * xj;
        }
        *yi = if beta == T::zero() {
            alpha * sum
        } else {
            alpha * sum + beta * *yi
        };
    }
}

/// Scales `y` by `beta` in place; `beta == 0` zeroes it.
pub(crate) fn scale_in_place<T: Scalar>(y: &mut [T], beta: T) {
    if beta == T::zero() {
        y.fill(T::zero());
    } else {
        y.iter_mut().for_each(|v| *v *= beta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn hermitian_mv_mirrors_the_stored_triangle() {
        // A = [[2, 1+i], [1-i, 3]], upper stored
        let upper = |i: usize, j: usize| match (i, j) {
            (0, 0) => Complex64::new(2.0, 5.0),
            (0, 1) => Complex64::new(1.0, 1.0),
            (1, 1) => Complex64::new(3.0, 0.0),
            _ => Complex64::new(f64::NAN, f64::NAN),
        };
        let x = [Complex64::new(1.0, 0.0), Complex64::new(0.0, 1.0)];
        let mut y = [Complex64::new(0.0, 0.0); 2];
        hermitian_mv(Triangle::Upper, upper, &x, &mut y, Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0));
        assert_eq!(y[0], Complex64::new(1.0, 1.0));
        assert_eq!(y[1], Complex64::new(1.0, 2.0));
    }

    #[test]
    fn zero_increments_are_rejected() {
        assert!(check_sizes(BatchMode::Strided, 4, &[("incx", 1), ("incy", 0)], 1).is_err());
        assert!(check_sizes(BatchMode::Strided, -1, &[], 1).is_err());
        assert!(check_sizes(BatchMode::Strided, 0, &[("incx", -3)], 0).is_ok());
    }

    #[test]
    fn non_batched_calls_take_at_most_one_problem() {
        assert!(check_sizes(BatchMode::Single, 4, &[("incx", 1)], 1).is_ok());
        assert!(check_sizes(BatchMode::Single, 4, &[("incx", 1)], 0).is_ok());
        assert!(matches!(
            check_sizes(BatchMode::Single, 4, &[("incx", 1)], 2),
            Err(BlasError::InvalidSize(_))
        ));
        assert!(check_sizes(BatchMode::PointerArray, 4, &[("incx", 1)], 2).is_ok());
        assert!(check_sizes(BatchMode::Strided, 4, &[("incx", 1)], -1).is_err());
    }
}
