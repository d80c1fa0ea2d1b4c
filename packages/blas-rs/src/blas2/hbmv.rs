use super::{check_sizes, hermitian_mv, load_vector, require, required_scalar, scale_in_place, LEVEL2_THREADS};
use crate::batch::{ApiInt, BatchAddress, ScalarPtr};
use crate::device::LaunchConfig;
use crate::element::ComplexElement;
use crate::error::{api_boundary, BlasError, BlasResult, Status};
use crate::handle::{Handle, Routine};
use crate::int64::launch_by_width;
use crate::layout::{Fill, Triangle};

/// Offset of `(row, col)` of the referenced triangle inside a band tile with
/// `k + 1` rows, or `None` outside the band.
pub(crate) fn band_offset(triangle: Triangle, k: usize, row: usize, col: usize) -> Option<usize> {
    let distance = match triangle {
        Triangle::Upper => col.checked_sub(row)?,
        Triangle::Lower => row.checked_sub(col)?,
    };
    if distance > k {
        return None;
    }
    let band_row = match triangle {
        Triangle::Upper => k - distance,
        Triangle::Lower => distance,
    };
    Some(band_row + col * (k + 1))
}

#[allow(clippy::too_many_arguments)]
fn hbmv_checked<T, I, B>(
    handle: &Handle,
    uplo: Fill,
    n: I,
    k: I,
    alpha: ScalarPtr<'_, T>,
    a: B,
    lda: I,
    x: B,
    incx: I,
    beta: ScalarPtr<'_, T>,
    y: B,
    incy: I,
    batch_count: I,
) -> BlasResult<()>
where
    T: ComplexElement,
    I: ApiInt,
    B: BatchAddress<T>,
{
    handle.log_call(
        &Routine {
            base: "hbmv",
            dtype: T::DTYPE,
            mode: B::MODE,
            wide: I::WIDE,
        },
        format_args!(
            "uplo={},n={n:?},k={k:?},lda={lda:?},incx={incx:?},incy={incy:?},batch_count={batch_count:?}",
            uplo.letter()
        ),
    );
    let triangle = uplo.require_triangle()?;
    let (n, k, lda) = (n.get(), k.get(), lda.get());
    let (incx, incy, batch_count) = (incx.get(), incy.get(), batch_count.get());
    check_sizes(B::MODE, n, &[("incx", incx), ("incy", incy)], batch_count)?;
    if k < 0 || lda < k + 1 {
        return Err(BlasError::invalid_size(format!("k = {k}, lda = {lda}")));
    }
    if n == 0 || batch_count == 0 {
        return Ok(());
    }
    let alpha = required_scalar(handle, "alpha", alpha)?;
    let beta = required_scalar(handle, "beta", beta)?;
    match (alpha.host_value(), beta.host_value()) {
        (Some(av), Some(bv)) => {
            if av.is_zero() && bv.is_one() {
                return Ok(());
            }
            require("y", y.is_null())?;
            if !av.is_zero() {
                require("A", a.is_null())?;
                require("x", x.is_null())?;
            }
        }
        _ => {
            require("A", a.is_null())?;
            require("x", x.is_null())?;
            require("y", y.is_null())?;
        }
    }

    let stream = handle.stream();
    let band = k as usize;
    launch_by_width::<I, _>(n, batch_count, |n32, base, count| {
        let (a, x, y) = (a.advance(base), x.advance(base), y.advance(base));
        let n = n32 as usize;
        let batches = count as i64;
        stream.launch("hbmv", LaunchConfig::batched(1, LEVEL2_THREADS, count), move |ctx| {
            for batch in ctx.batches(batches) {
                let alpha = alpha.load(ctx)?;
                let beta = beta.load(ctx)?;
                if alpha.is_zero() && beta.is_one() {
                    continue;
                }
                let (start, mut ys) = load_vector(ctx, &y, batch, n, incy)?;
                if alpha.is_zero() {
                    scale_in_place(&mut ys, beta);
                } else {
                    let tile = ctx.load_tile(a.resolve(ctx, batch, 0)?, band + 1, n, lda)?;
                    let (_, xs) = load_vector(ctx, &x, batch, n, incx)?;
                    let stored = |i: usize, j: usize| {
                        band_offset(triangle, band, i, j).map_or_else(T::zero, |offset| tile[offset])
                    };
                    hermitian_mv(triangle, stored, &xs, &mut ys, alpha, beta);
                }
                ctx.store_strided(start, incy, &ys);
            }
            Ok(())
        })?;
        Ok(())
    })
}

/// Batched `y = alpha * A * x + beta * y` with `A` Hermitian and banded with
/// `k` super/sub-diagonals, stored in `k + 1` rows of a matrix with leading
/// dimension `lda`. Upper storage puts `A[i][j]` at row `k + i - j` of column
/// `j`; lower storage at row `i - j`.
#[allow(clippy::too_many_arguments)]
pub fn hbmv<T, I, B>(
    handle: Option<&Handle>,
    uplo: Fill,
    n: I,
    k: I,
    alpha: ScalarPtr<'_, T>,
    a: B,
    lda: I,
    x: B,
    incx: I,
    beta: ScalarPtr<'_, T>,
    y: B,
    incy: I,
    batch_count: I,
) -> Status
where
    T: ComplexElement,
    I: ApiInt,
    B: BatchAddress<T>,
{
    api_boundary(handle, "hbmv", |handle| {
        hbmv_checked::<T, I, B>(handle, uplo, n, k, alpha, a, lda, x, incx, beta, y, incy, batch_count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Single;
    use crate::device::{Device, DevicePtr};
    use num_complex::Complex64;

    #[test]
    fn band_offsets_follow_storage_convention() {
        // k = 1, upper: diagonal in row 1, superdiagonal in row 0.
        assert_eq!(band_offset(Triangle::Upper, 1, 2, 2), Some(1 + 2 * 2));
        assert_eq!(band_offset(Triangle::Upper, 1, 1, 2), Some(2 * 2));
        assert_eq!(band_offset(Triangle::Upper, 1, 0, 2), None);
        // lower: diagonal in row 0, subdiagonal in row 1.
        assert_eq!(band_offset(Triangle::Lower, 1, 2, 2), Some(2 * 2));
        assert_eq!(band_offset(Triangle::Lower, 1, 3, 2), Some(1 + 2 * 2));
        assert_eq!(band_offset(Triangle::Lower, 1, 4, 2), None);
    }

    #[test]
    fn short_leading_dimension_is_invalid_size() {
        let handle = Handle::with_device(Device::with_memory(1 << 16));
        let one = Complex64::new(1.0, 0.0);
        let null = Single::<Complex64>::new(DevicePtr::null());
        let status = hbmv::<Complex64, i32, _>(
            Some(&handle),
            Fill::Upper,
            4,
            2,
            ScalarPtr::Host(&one),
            null,
            2,
            null,
            1,
            ScalarPtr::Host(&one),
            null,
            1,
            1,
        );
        assert_eq!(status, Status::InvalidSize);
    }
}
