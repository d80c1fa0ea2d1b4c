use super::{check_sizes, load_vector, require, required_scalar, LEVEL2_THREADS};
use crate::batch::{ApiInt, BatchAddress, ScalarPtr};
use crate::device::LaunchConfig;
use crate::element::{ComplexElement, Scalar};
use crate::error::{api_boundary, BlasError, BlasResult, Status};
use crate::handle::{Handle, Routine};
use crate::int64::launch_by_width;
use crate::layout::{Fill, Triangle};

/// Rows of column `col` inside the referenced triangle of an `n x n` matrix.
pub(crate) fn triangle_rows(triangle: Triangle, n: usize, col: usize) -> std::ops::Range<usize> {
    match triangle {
        Triangle::Upper => 0..col + 1,
        Triangle::Lower => col..n,
    }
}

/// `A += alpha x y^H + conj(alpha) y x^H` on column `col` of the triangle,
/// keeping the diagonal real.
pub(crate) fn her2_column<T: Scalar>(
    triangle: Triangle,
    col: usize,
    column: &mut [T],
    x: &[T],
    y: &[T],
    alpha: T,
) {
    let rows = triangle_rows(triangle, x.len(), col);
    let (xj, yj) = (x[col].conj(), y[col].conj());
    for (slot, row) in column.iter_mut().zip(rows) {
        let update = alpha * x[row] * yj + alpha.conj() * y[row] * xj;
        *slot = if row == col {
            T::from_real(slot.re() + update.re())
        } else {
            *slot + update
        };
    }
}

#[allow(clippy::too_many_arguments)]
fn her2_checked<T, I, B>(
    handle: &Handle,
    uplo: Fill,
    n: I,
    alpha: ScalarPtr<'_, T>,
    x: B,
    incx: I,
    y: B,
    incy: I,
    a: B,
    lda: I,
    batch_count: I,
) -> BlasResult<()>
where
    T: ComplexElement,
    I: ApiInt,
    B: BatchAddress<T>,
{
    handle.log_call(
        &Routine {
            base: "her2",
            dtype: T::DTYPE,
            mode: B::MODE,
            wide: I::WIDE,
        },
        format_args!(
            "uplo={},n={n:?},incx={incx:?},incy={incy:?},lda={lda:?},batch_count={batch_count:?}",
            uplo.letter()
        ),
    );
    let triangle = uplo.require_triangle()?;
    let (n, incx, incy, lda, batch_count) = (n.get(), incx.get(), incy.get(), lda.get(), batch_count.get());
    check_sizes(B::MODE, n, &[("incx", incx), ("incy", incy)], batch_count)?;
    if lda < n.max(1) {
        return Err(BlasError::invalid_size(format!("lda = {lda} < n = {n}")));
    }
    if n == 0 || batch_count == 0 {
        return Ok(());
    }
    let alpha = required_scalar(handle, "alpha", alpha)?;
    if let Some(value) = alpha.host_value() {
        if value.is_zero() {
            return Ok(());
        }
        require("x", x.is_null())?;
        require("y", y.is_null())?;
        require("A", a.is_null())?;
    }

    let stream = handle.stream();
    launch_by_width::<I, _>(n, batch_count, |n32, base, count| {
        let (x, y, a) = (x.advance(base), y.advance(base), a.advance(base));
        let n = n32 as usize;
        let batches = count as i64;
        stream.launch("her2", LaunchConfig::batched(1, LEVEL2_THREADS, count), move |ctx| {
            for batch in ctx.batches(batches) {
                let alpha = alpha.load(ctx)?;
                if alpha.is_zero() {
                    continue;
                }
                let (_, xs) = load_vector(ctx, &x, batch, n, incx)?;
                let (_, ys) = load_vector(ctx, &y, batch, n, incy)?;
                let origin = a.resolve(ctx, batch, 0)?;
                for col in 0..n {
                    let rows = triangle_rows(triangle, n, col);
                    let top = origin.offset(col as i64 * lda + rows.start as i64);
                    let mut column = ctx.load(top, rows.len())?;
                    her2_column(triangle, col, &mut column, &xs, &ys, alpha);
                    ctx.store(top, &column);
                }
            }
            Ok(())
        })?;
        Ok(())
    })
}

/// Batched Hermitian rank-2 update `A = alpha x y^H + conj(alpha) y x^H + A`
/// on the `uplo` triangle of `A`. The diagonal's imaginary part is zeroed.
///
/// With a host `alpha == 0` the call returns before checking operands. With a
/// device `alpha` the operands are not inspected and the kernel skips batches
/// whose `*alpha` is zero.
#[allow(clippy::too_many_arguments)]
pub fn her2<T, I, B>(
    handle: Option<&Handle>,
    uplo: Fill,
    n: I,
    alpha: ScalarPtr<'_, T>,
    x: B,
    incx: I,
    y: B,
    incy: I,
    a: B,
    lda: I,
    batch_count: I,
) -> Status
where
    T: ComplexElement,
    I: ApiInt,
    B: BatchAddress<T>,
{
    api_boundary(handle, "her2", |handle| {
        her2_checked::<T, I, B>(handle, uplo, n, alpha, x, incx, y, incy, a, lda, batch_count)
    })
}
