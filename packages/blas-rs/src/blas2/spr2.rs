use super::her2::triangle_rows;
use super::{check_sizes, load_vector, require, required_scalar, LEVEL2_THREADS};
use crate::batch::{ApiInt, BatchAddress, ScalarPtr};
use crate::device::LaunchConfig;
use crate::element::RealElement;
use crate::error::{api_boundary, BlasResult, Status};
use crate::handle::{Handle, Routine};
use crate::int64::launch_by_width;
use crate::layout::{packed_index, packed_len, Fill, Triangle};

/// `AP += alpha (x y^T + y x^T)` over the packed triangle.
pub(crate) fn spr2_update<T: RealElement>(triangle: Triangle, ap: &mut [T], x: &[T], y: &[T], alpha: T) {
    let n = x.len();
    for col in 0..n {
        let (xj, yj) = (alpha * x[col], alpha * y[col]);
        for row in triangle_rows(triangle, n, col) {
            ap[packed_index(triangle, n, row, col)] += x[row] * yj + y[row] * xj;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spr2_checked<T, I, B>(
    handle: &Handle,
    uplo: Fill,
    n: I,
    alpha: ScalarPtr<'_, T>,
    x: B,
    incx: I,
    y: B,
    incy: I,
    ap: B,
    batch_count: I,
) -> BlasResult<()>
where
    T: RealElement,
    I: ApiInt,
    B: BatchAddress<T>,
{
    handle.log_call(
        &Routine {
            base: "spr2",
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
    if let Some(value) = alpha.host_value() {
        if value.is_zero() {
            return Ok(());
        }
        require("x", x.is_null())?;
        require("y", y.is_null())?;
        require("AP", ap.is_null())?;
    }

    let stream = handle.stream();
    launch_by_width::<I, _>(n, batch_count, |n32, base, count| {
        let (x, y, ap) = (x.advance(base), y.advance(base), ap.advance(base));
        let n = n32 as usize;
        let batches = count as i64;
        stream.launch("spr2", LaunchConfig::batched(1, LEVEL2_THREADS, count), move |ctx| {
            for batch in ctx.batches(batches) {
                let alpha = alpha.load(ctx)?;
                if alpha.is_zero() {
                    continue;
                }
                let (_, xs) = load_vector(ctx, &x, batch, n, incx)?;
                let (_, ys) = load_vector(ctx, &y, batch, n, incy)?;
                let origin = ap.resolve(ctx, batch, 0)?;
                let mut packed = ctx.load(origin, packed_len(n))?;
                spr2_update(triangle, &mut packed, &xs, &ys, alpha);
                ctx.store(origin, &packed);
            }
            Ok(())
        })?;
        Ok(())
    })
}

/// Batched symmetric packed rank-2 update `AP = alpha (x y^T + y x^T) + AP`.
///
/// Null-operand rules match `her2`: a host `alpha == 0` returns early, and a
/// device `alpha` is read by the kernel, which skips zero batches.
#[allow(clippy::too_many_arguments)]
pub fn spr2<T, I, B>(
    handle: Option<&Handle>,
    uplo: Fill,
    n: I,
    alpha: ScalarPtr<'_, T>,
    x: B,
    incx: I,
    y: B,
    incy: I,
    ap: B,
    batch_count: I,
) -> Status
where
    T: RealElement,
    I: ApiInt,
    B: BatchAddress<T>,
{
    api_boundary(handle, "spr2", |handle| {
        spr2_checked::<T, I, B>(handle, uplo, n, alpha, x, incx, y, incy, ap, batch_count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Strided;
    use crate::device::{Device, DevicePtr};

    #[test]
    fn lower_update_is_symmetric_rank_two() {
        let mut ap = [0.0f64; 3];
        spr2_update(Triangle::Lower, &mut ap, &[1.0, 2.0], &[3.0, 4.0], 1.0);
        // [2*1*3, 1*4 + 2*3, 2*2*4]
        assert_eq!(ap, [6.0, 10.0, 16.0]);
    }

    #[test]
    fn zero_alpha_allows_null_operands() {
        let handle = Handle::with_device(Device::with_memory(1 << 16));
        let null = Strided::<f32>::new(DevicePtr::null(), 10);
        let status = spr2::<f32, i32, _>(Some(&handle), Fill::Upper, 4, ScalarPtr::Host(&0.0), null, 1, null, 1, null, 2);
        assert_eq!(status, Status::Success);
    }
}
