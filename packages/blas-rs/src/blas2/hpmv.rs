use super::{check_sizes, hermitian_mv, load_vector, require, required_scalar, scale_in_place, LEVEL2_THREADS};
use crate::batch::{ApiInt, BatchAddress, ScalarPtr};
use crate::device::LaunchConfig;
use crate::element::ComplexElement;
use crate::error::{api_boundary, BlasResult, Status};
use crate::handle::{Handle, Routine};
use crate::int64::launch_by_width;
use crate::layout::{packed_index, packed_len, Fill};

#[allow(clippy::too_many_arguments)]
fn hpmv_checked<T, I, B>(
    handle: &Handle,
    uplo: Fill,
    n: I,
    alpha: ScalarPtr<'_, T>,
    ap: B,
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
            base: "hpmv",
            dtype: T::DTYPE,
            mode: B::MODE,
            wide: I::WIDE,
        },
        format_args!(
            "uplo={},n={n:?},incx={incx:?},incy={incy:?},batch_count={batch_count:?}",
            uplo.letter()
        ),
    );
    let triangle = uplo.require_triangle()?;
    let (n, incx, incy, batch_count) = (n.get(), incx.get(), incy.get(), batch_count.get());
    check_sizes(B::MODE, n, &[("incx", incx), ("incy", incy)], batch_count)?;
    if n == 0 || batch_count == 0 {
        return Ok(());
    }
    let alpha = required_scalar(handle, "alpha", alpha)?;
    let beta = required_scalar(handle, "beta", beta)?;
    match (alpha.host_value(), beta.host_value()) {
        (Some(a), Some(b)) => {
            if a.is_zero() && b.is_one() {
                return Ok(());
            }
            require("y", y.is_null())?;
            if !a.is_zero() {
                require("AP", ap.is_null())?;
                require("x", x.is_null())?;
            }
        }
        _ => {
            require("AP", ap.is_null())?;
            require("x", x.is_null())?;
            require("y", y.is_null())?;
        }
    }

    let stream = handle.stream();
    launch_by_width::<I, _>(n, batch_count, |n32, base, count| {
        let (ap, x, y) = (ap.advance(base), x.advance(base), y.advance(base));
        let n = n32 as usize;
        let batches = count as i64;
        stream.launch("hpmv", LaunchConfig::batched(1, LEVEL2_THREADS, count), move |ctx| {
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
                    let a = ctx.load(ap.resolve(ctx, batch, 0)?, packed_len(n))?;
                    let (_, xs) = load_vector(ctx, &x, batch, n, incx)?;
                    let stored = |i: usize, j: usize| a[packed_index(triangle, n, i, j)];
                    hermitian_mv(triangle, stored, &xs, &mut ys, alpha, beta);
                }
                ctx.store_strided(start, incy, &ys);
            }
            Ok(())
        })?;
        Ok(())
    })
}

/// Batched `y = alpha * A * x + beta * y` with `A` Hermitian in packed storage.
///
/// With host scalars, `alpha == 0 && beta == 1` returns without touching any
/// operand, and `alpha == 0` does not require `AP` or `x`.
#[allow(clippy::too_many_arguments)]
pub fn hpmv<T, I, B>(
    handle: Option<&Handle>,
    uplo: Fill,
    n: I,
    alpha: ScalarPtr<'_, T>,
    ap: B,
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
    api_boundary(handle, "hpmv", |handle| {
        hpmv_checked::<T, I, B>(handle, uplo, n, alpha, ap, x, incx, beta, y, incy, batch_count)
    })
}
