use std::marker::PhantomData;

use super::reduction::{self, Reduction};
use crate::batch::{ApiInt, BatchAddress, ResultPtr};
use crate::device::{BlockCtx, DeviceError};
use crate::element::{ComplexElement, Element, Scalar};
use crate::error::{api_boundary, BlasError, BlasResult, Status};
use crate::handle::{Handle, Routine, WorkspaceSize};
use crate::int64::batches_per_launch;
use crate::layout::negative_inc_shift;

#[derive(Clone, Copy)]
struct DotTerms<T, B> {
    x: B,
    incx: i64,
    shiftx: i64,
    y: B,
    incy: i64,
    shifty: i64,
    conjugate: bool,
    _element: PhantomData<fn() -> T>,
}

impl<T, B> Reduction for DotTerms<T, B>
where
    T: Element,
    B: BatchAddress<T>,
{
    type Acc = T::Compute;
    type Output = T;

    fn partial(&self, ctx: &BlockCtx<'_>, batch: i64, start: i64, len: usize) -> Result<T::Compute, DeviceError> {
        let x = self.x.resolve(ctx, batch, self.shiftx + start * self.incx)?;
        let y = self.y.resolve(ctx, batch, self.shifty + start * self.incy)?;
        let xs = ctx.load_strided(x, len, self.incx)?;
        let ys = ctx.load_strided(y, len, self.incy)?;
        let terms: Vec<T::Compute> = xs
            .into_iter()
            .zip(ys)
            .map(|(x, y)| {
                let x = x.to_compute();
                let x = if self.conjugate { x.conj() } else { x };
                x * y.to_compute()
            })
            .collect();
        Ok(reduction::tree_sum(&terms))
    }

    fn finalize(&self, acc: T::Compute) -> T {
        T::from_compute(acc)
    }
}

#[allow(clippy::too_many_arguments)]
fn dot_checked<T, I, B>(
    handle: &Handle,
    base: &'static str,
    conjugate: bool,
    n: I,
    x: B,
    incx: I,
    y: B,
    incy: I,
    batch_count: I,
    result: ResultPtr<'_, T>,
) -> BlasResult<()>
where
    T: Element,
    I: ApiInt,
    B: BatchAddress<T>,
{
    handle.log_call(
        &Routine {
            base,
            dtype: T::DTYPE,
            mode: B::MODE,
            wide: I::WIDE,
        },
        format_args!("n={n:?},incx={incx:?},incy={incy:?},batch_count={batch_count:?}"),
    );
    let (n, incx, incy, batch_count) = (n.get(), incx.get(), incy.get(), batch_count.get());
    B::MODE.check_batch_count(batch_count)?;
    if batch_count == 0 {
        return Ok(());
    }
    reduction::check_result_mode(handle, &result)?;
    if n <= 0 {
        return reduction::zero_results(handle, result, batch_count);
    }
    if x.is_null() {
        return Err(BlasError::InvalidPointer("x"));
    }
    if y.is_null() {
        return Err(BlasError::InvalidPointer("y"));
    }

    let (shiftx, shifty) = (negative_inc_shift(n, incx), negative_inc_shift(n, incy));
    reduction::execute::<I, _, _>(handle, base, n, batch_count, result, |first| DotTerms {
        x: x.advance(first),
        incx,
        shiftx,
        y: y.advance(first),
        incy,
        shifty,
        conjugate,
        _element: PhantomData::<fn() -> T>,
    })
}

/// Batched `result[b] = sum_i x_b[i] * y_b[i]`.
///
/// `n <= 0` writes zero to every result. Increments may be zero or negative.
/// In host pointer mode the call returns after the results are copied back;
/// in device pointer mode the results stay on the device.
#[allow(clippy::too_many_arguments)]
pub fn dot<T, I, B>(
    handle: Option<&Handle>,
    n: I,
    x: B,
    incx: I,
    y: B,
    incy: I,
    batch_count: I,
    result: ResultPtr<'_, T>,
) -> Status
where
    T: Element,
    I: ApiInt,
    B: BatchAddress<T>,
{
    api_boundary(handle, "dot", |handle| {
        dot_checked(handle, "dot", false, n, x, incx, y, incy, batch_count, result)
    })
}

/// Batched `result[b] = sum_i conj(x_b[i]) * y_b[i]`.
#[allow(clippy::too_many_arguments)]
pub fn dotc<T, I, B>(
    handle: Option<&Handle>,
    n: I,
    x: B,
    incx: I,
    y: B,
    incy: I,
    batch_count: I,
    result: ResultPtr<'_, T>,
) -> Status
where
    T: ComplexElement,
    I: ApiInt,
    B: BatchAddress<T>,
{
    api_boundary(handle, "dotc", |handle| {
        dot_checked(handle, "dotc", true, n, x, incx, y, incy, batch_count, result)
    })
}

/// Workspace a `dot`/`dotc` call of this shape takes from the handle.
pub fn dot_workspace_size<T, I>(handle: Option<&Handle>, n: I, batch_count: I) -> Result<WorkspaceSize, Status>
where
    T: Element,
    I: ApiInt,
{
    if handle.is_none() {
        return Err(Status::InvalidHandle);
    }
    let (n, batch_count) = (n.get(), batch_count.get());
    if batch_count < 0 {
        return Err(Status::InvalidSize);
    }
    let batches = batches_per_launch::<I>(batch_count);
    Ok(WorkspaceSize::from_bytes(reduction::workspace_bytes::<T::Compute>(n, batches)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Strided;
    use crate::device::{Device, DevicePtr};

    #[test]
    fn null_handle_is_rejected() {
        let status = dot::<f32, i32, _>(
            None,
            4,
            Strided::new(DevicePtr::null(), 4),
            1,
            Strided::new(DevicePtr::null(), 4),
            1,
            1,
            ResultPtr::Null,
        );
        assert_eq!(status, Status::InvalidHandle);
    }

    #[test]
    fn empty_vectors_zero_every_result() {
        let handle = Handle::with_device(Device::with_memory(1 << 16));
        let mut out = [7.0f64; 3];
        let status = dot::<f64, i64, _>(
            Some(&handle),
            0,
            Strided::new(DevicePtr::null(), 0),
            1,
            Strided::new(DevicePtr::null(), 0),
            1,
            3,
            ResultPtr::Host(&mut out),
        );
        assert_eq!(status, Status::Success);
        assert_eq!(out, [0.0; 3]);
    }

    #[test]
    fn workspace_query_covers_partials_and_staging() {
        let handle = Handle::with_device(Device::with_memory(1 << 16));
        let size = dot_workspace_size::<f32, i32>(Some(&handle), 4096, 2).expect("size");
        assert_eq!(size, WorkspaceSize::Bytes((4 + 1) * 2 * 4));
        assert_eq!(
            dot_workspace_size::<f32, i32>(Some(&handle), 0, 2),
            Ok(WorkspaceSize::Unchanged)
        );
        assert_eq!(dot_workspace_size::<f32, i32>(None, 8, 1), Err(Status::InvalidHandle));
    }
}
