//! Two-stage batched reductions shared by `dot`, `dotc` and `nrm2`.
//!
//! Short vectors are reduced by one block per batch. Longer vectors use one
//! block per [`REDUCTION_BLOCK`] elements writing partial sums into the
//! workspace, followed by a finishing kernel that folds the partials of
//! each batch and writes the result.

use crate::batch::{ApiInt, ResultPtr};
use crate::device::{BlockCtx, DeviceError, DevicePtr, LaunchConfig, Stream};
use crate::element::{Element, Scalar};
use crate::error::{BlasError, BlasResult};
use crate::handle::{Handle, PointerMode};
use crate::int64::{batches_per_launch, launch_by_width};

/// Elements reduced by one block.
pub const REDUCTION_BLOCK: i64 = 1024;

/// A reduction over the logical elements of one vector per batch.
pub(crate) trait Reduction: Copy + Send + Sync + 'static {
    type Acc: Scalar;
    type Output: Element;

    /// Sum of the terms for logical elements `start..start + len` of `batch`.
    fn partial(&self, ctx: &BlockCtx<'_>, batch: i64, start: i64, len: usize) -> Result<Self::Acc, DeviceError>;

    fn finalize(&self, acc: Self::Acc) -> Self::Output;
}

/// Pairwise sum; keeps the error growth logarithmic in the number of terms.
pub(crate) fn tree_sum<A: Scalar>(terms: &[A]) -> A {
    match terms.len() {
        0 => A::zero(),
        1 => terms[0],
        len => {
            let (left, right) = terms.split_at(len / 2);
            tree_sum(left) + tree_sum(right)
        }
    }
}

/// Partial-sum blocks per batch; 0 selects the single-kernel path.
pub(crate) fn reduction_blocks(n: i64) -> i64 {
    if n <= REDUCTION_BLOCK {
        0
    } else {
        (n - 1) / REDUCTION_BLOCK + 1
    }
}

/// Partial sums plus one result slot per batch used to stage host-mode results.
pub(crate) fn workspace_bytes<A: Scalar>(n: i64, batches: i64) -> usize {
    if n <= 0 || batches <= 0 {
        return 0;
    }
    ((reduction_blocks(n) + 1) * batches) as usize * std::mem::size_of::<A>()
}

/// Queues the reduction of `batch_count` batches; batch `b` lands in `out[b]`.
pub(crate) fn launch<R: Reduction>(
    stream: &Stream,
    name: &'static str,
    reduction: R,
    n: i32,
    batch_count: i32,
    partials: DevicePtr<R::Acc>,
    out: DevicePtr<R::Output>,
) -> Result<(), DeviceError> {
    let n = n as i64;
    let batches = batch_count as i64;
    let blocks = reduction_blocks(n);
    if blocks == 0 {
        return stream.launch(
            name,
            LaunchConfig::batched(1, REDUCTION_BLOCK as u32, batch_count),
            move |ctx| {
                for batch in ctx.batches(batches) {
                    let acc = reduction.partial(ctx, batch, 0, n as usize)?;
                    ctx.store_one(out.offset(batch), reduction.finalize(acc));
                }
                Ok(())
            },
        );
    }

    stream.launch(
        name,
        LaunchConfig::batched(blocks as u32, REDUCTION_BLOCK as u32, batch_count),
        move |ctx| {
            let start = ctx.block.x as i64 * REDUCTION_BLOCK;
            let len = (n - start).min(REDUCTION_BLOCK) as usize;
            for batch in ctx.batches(batches) {
                let acc = reduction.partial(ctx, batch, start, len)?;
                ctx.store_one(partials.offset(batch * blocks + ctx.block.x as i64), acc);
            }
            Ok(())
        },
    )?;
    stream.launch(
        "reduction_finalize",
        LaunchConfig::batched(1, REDUCTION_BLOCK as u32, batch_count),
        move |ctx| {
            for batch in ctx.batches(batches) {
                let terms = ctx.load(partials.offset(batch * blocks), blocks as usize)?;
                ctx.store_one(out.offset(batch), reduction.finalize(tree_sum(&terms)));
            }
            Ok(())
        },
    )
}

fn host_window<T>(values: &mut [T], batch_count: i64) -> BlasResult<&mut [T]> {
    let len = values.len();
    values.get_mut(..batch_count as usize).ok_or_else(|| {
        BlasError::invalid_size(format!(
            "result holds {len} elements for {batch_count} batches"
        ))
    })
}

/// Result pointers follow the handle's pointer mode like scalars do.
pub(crate) fn check_result_mode<T>(handle: &Handle, result: &ResultPtr<'_, T>) -> BlasResult<()> {
    if result.is_null() {
        return Err(BlasError::InvalidPointer("result"));
    }
    match (handle.pointer_mode(), result) {
        (PointerMode::Host, ResultPtr::Host(_)) | (PointerMode::Device, ResultPtr::Device(_)) => Ok(()),
        _ => Err(BlasError::InvalidPointer("result")),
    }
}

/// Writes zero to every batch's result.
pub(crate) fn zero_results<T: Element>(
    handle: &Handle,
    result: ResultPtr<'_, T>,
    batch_count: i64,
) -> BlasResult<()> {
    let zero = <T as bytemuck::Zeroable>::zeroed();
    match result {
        ResultPtr::Null => Err(BlasError::InvalidPointer("result")),
        ResultPtr::Host(values) => {
            host_window(values, batch_count)?.fill(zero);
            Ok(())
        }
        ResultPtr::Device(ptr) => {
            handle
                .stream()
                .memcpy_htod_async(ptr, vec![zero; batch_count as usize])?;
            Ok(())
        }
    }
}

/// Runs a validated reduction through the width adapter. `reduction_at(base)`
/// builds the reduction with every operand rebased to batch `base`.
pub(crate) fn execute<I, R, F>(
    handle: &Handle,
    name: &'static str,
    n: i64,
    batch_count: i64,
    result: ResultPtr<'_, R::Output>,
    reduction_at: F,
) -> BlasResult<()>
where
    I: ApiInt,
    R: Reduction,
    F: Fn(i64) -> R,
{
    let per_launch = batches_per_launch::<I>(batch_count);
    let lease = handle.workspace(workspace_bytes::<R::Acc>(n, per_launch))?;
    let partials: DevicePtr<R::Acc> = lease.ptr();
    let staging: DevicePtr<R::Output> = partials
        .offset(reduction_blocks(n) * per_launch)
        .cast();
    let stream = handle.stream();
    match result {
        ResultPtr::Null => Err(BlasError::InvalidPointer("result")),
        ResultPtr::Device(out) => launch_by_width::<I, _>(n, batch_count, |n32, base, count| {
            launch(stream, name, reduction_at(base), n32, count, partials, out.offset(base))?;
            Ok(())
        }),
        ResultPtr::Host(values) => {
            let values = host_window(values, batch_count)?;
            launch_by_width::<I, _>(n, batch_count, |n32, base, count| {
                launch(stream, name, reduction_at(base), n32, count, partials, staging)?;
                stream.synchronize()?;
                let window = &mut values[base as usize..base as usize + count as usize];
                handle.device().memcpy_dtoh(window, staging)?;
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_sum_matches_exact_sum() {
        let terms: Vec<f64> = (1..=1000).map(|v| v as f64).collect();
        assert_eq!(tree_sum(&terms), 500_500.0);
        assert_eq!(tree_sum::<f32>(&[]), 0.0);
    }

    #[test]
    fn block_count_switches_at_threshold() {
        assert_eq!(reduction_blocks(1), 0);
        assert_eq!(reduction_blocks(REDUCTION_BLOCK), 0);
        assert_eq!(reduction_blocks(REDUCTION_BLOCK + 1), 2);
        assert_eq!(reduction_blocks(10 * REDUCTION_BLOCK), 10);
    }
}
