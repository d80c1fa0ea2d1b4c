use std::marker::PhantomData;

use num_traits::Float;

use super::reduction::{self, Reduction};
use crate::batch::{ApiInt, BatchAddress, ResultPtr};
use crate::device::{BlockCtx, DeviceError};
use crate::element::{norm_from_compute, Element, Scalar};
use crate::error::{api_boundary, BlasError, BlasResult, Status};
use crate::handle::{Handle, Routine, WorkspaceSize};
use crate::int64::batches_per_launch;

type Real<T> = <<T as Element>::Compute as Scalar>::Real;

#[derive(Clone, Copy)]
struct SquaredTerms<T, B> {
    x: B,
    incx: i64,
    _element: PhantomData<fn() -> T>,
}

impl<T, B> Reduction for SquaredTerms<T, B>
where
    T: Element,
    B: BatchAddress<T>,
{
    type Acc = Real<T>;
    type Output = T::Norm;

    fn partial(&self, ctx: &BlockCtx<'_>, batch: i64, start: i64, len: usize) -> Result<Real<T>, DeviceError> {
        let x = self.x.resolve(ctx, batch, start * self.incx)?;
        let terms: Vec<Real<T>> = ctx
            .load_strided(x, len, self.incx)?
            .into_iter()
            .map(|value| value.to_compute().abs_sq())
            .collect();
        Ok(reduction::tree_sum(&terms))
    }

    fn finalize(&self, acc: Real<T>) -> T::Norm {
        norm_from_compute::<T>(Float::sqrt(acc))
    }
}

fn nrm2_checked<T, I, B>(
    handle: &Handle,
    n: I,
    x: B,
    incx: I,
    batch_count: I,
    result: ResultPtr<'_, T::Norm>,
) -> BlasResult<()>
where
    T: Element,
    I: ApiInt,
    B: BatchAddress<T>,
{
    handle.log_call(
        &Routine {
            base: "nrm2",
            dtype: T::DTYPE,
            mode: B::MODE,
            wide: I::WIDE,
        },
        format_args!("n={n:?},incx={incx:?},batch_count={batch_count:?}"),
    );
    let (n, incx, batch_count) = (n.get(), incx.get(), batch_count.get());
    B::MODE.check_batch_count(batch_count)?;
    if batch_count == 0 {
        return Ok(());
    }
    reduction::check_result_mode(handle, &result)?;
    if n <= 0 || incx <= 0 {
        return reduction::zero_results(handle, result, batch_count);
    }
    if x.is_null() {
        return Err(BlasError::InvalidPointer("x"));
    }

    reduction::execute::<I, _, _>(handle, "nrm2", n, batch_count, result, |first| SquaredTerms {
        x: x.advance(first),
        incx,
        _element: PhantomData::<fn() -> T>,
    })
}

/// Batched Euclidean norm, `result[b] = sqrt(sum_i |x_b[i]|^2)`, accumulated
/// in the compute type. Complex inputs yield real norms.
///
/// `n <= 0` or `incx <= 0` writes zero to every result.
pub fn nrm2<T, I, B>(
    handle: Option<&Handle>,
    n: I,
    x: B,
    incx: I,
    batch_count: I,
    result: ResultPtr<'_, T::Norm>,
) -> Status
where
    T: Element,
    I: ApiInt,
    B: BatchAddress<T>,
{
    api_boundary(handle, "nrm2", |handle| {
        nrm2_checked::<T, I, B>(handle, n, x, incx, batch_count, result)
    })
}

pub fn nrm2_workspace_size<T, I>(handle: Option<&Handle>, n: I, incx: I, batch_count: I) -> Result<WorkspaceSize, Status>
where
    T: Element,
    I: ApiInt,
{
    if handle.is_none() {
        return Err(Status::InvalidHandle);
    }
    let (n, incx, batch_count) = (n.get(), incx.get(), batch_count.get());
    if batch_count < 0 {
        return Err(Status::InvalidSize);
    }
    if incx <= 0 {
        return Ok(WorkspaceSize::Unchanged);
    }
    let batches = batches_per_launch::<I>(batch_count);
    Ok(WorkspaceSize::from_bytes(reduction::workspace_bytes::<Real<T>>(n, batches)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Single;
    use crate::device::{Device, DevicePtr};
    use num_complex::Complex64;

    #[test]
    fn non_positive_increment_yields_zero() {
        let handle = Handle::with_device(Device::with_memory(1 << 16));
        let mut out = [3.0f32];
        let status = nrm2::<f32, i32, _>(
            Some(&handle),
            10,
            Single::new(DevicePtr::null()),
            -1,
            1,
            ResultPtr::Host(&mut out),
        );
        assert_eq!(status, Status::Success);
        assert_eq!(out, [0.0]);
    }

    #[test]
    fn complex_norm_is_real() {
        let device = Device::with_memory(1 << 16);
        let handle = Handle::with_device(device.clone());
        let block = device.malloc(2 * 16).expect("malloc");
        let x: DevicePtr<Complex64> = block.ptr();
        device
            .memcpy_htod(x, &[Complex64::new(3.0, 4.0), Complex64::new(0.0, 0.0)])
            .expect("upload");
        let mut out = [0.0f64];
        let status = nrm2::<Complex64, i32, _>(Some(&handle), 2, Single::new(x), 1, 1, ResultPtr::Host(&mut out));
        assert_eq!(status, Status::Success);
        assert_eq!(out, [5.0]);
    }

    #[test]
    fn missing_result_is_invalid_pointer() {
        let handle = Handle::with_device(Device::with_memory(1 << 16));
        let status = nrm2::<f64, i32, _>(Some(&handle), 4, Single::new(DevicePtr::null()), 1, 1, ResultPtr::Null);
        assert_eq!(status, Status::InvalidPointer);
    }
}
