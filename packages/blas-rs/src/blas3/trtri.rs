//! Batched triangular inversion.
//!
//! Matrices with `n <= TRTRI_NB` are inverted directly by one block per
//! batch. Larger matrices invert their `TRTRI_NB`-sized diagonal blocks
//! first, then merge neighbouring inverted blocks level by level, doubling
//! the block size each time:
//!
//! ```text
//! upper: inv([[A11, A12], [0, A22]])  has  inv12 = -inv11 * (A12 * inv22)
//! lower: inv([[A11, 0], [A21, A22]])  has  inv21 = -inv22 * (A21 * inv11)
//! ```
//!
//! The bracketed products go through the handle's workspace.

use crate::batch::{ApiInt, BatchAddress};
use crate::device::{DevicePtr, LaunchConfig, Stream};
use crate::element::StandardElement;
use crate::error::{api_boundary, BlasError, BlasResult, Status};
use crate::handle::{Handle, Routine, WorkspaceSize};
use crate::int64::{batches_per_launch, launch_by_width, narrow};
use crate::layout::{Diagonal, Fill, Triangle};

/// Size of the diagonal blocks inverted directly.
pub const TRTRI_NB: i64 = 16;

const THREADS: u32 = (TRTRI_NB * TRTRI_NB) as u32;

/// Inverts the `triangle` part of the column-major `n x n` tile `a`
/// (leading dimension `n`). The other triangle of the result is zero; with a
/// unit diagonal the stored diagonal is ignored and the result's is one.
pub(crate) fn invert_triangle<T: StandardElement>(triangle: Triangle, unit: bool, a: &[T], n: usize) -> Vec<T> {
    let mut inv = vec![T::zero(); n * n];
    let at = |i: usize, j: usize| a[i + j * n];
    let diagonal = |j: usize| if unit { T::one() } else { T::one() / at(j, j) };
    match triangle {
        Triangle::Upper => {
            for j in 0..n {
                let djj = diagonal(j);
                inv[j + j * n] = djj;
                for i in 0..j {
                    let mut sum = T::zero();
                    for k in i..j {
                        sum += inv[i + k * n] * at(k, j);
                    }
                    inv[i + j * n] = -sum * djj;
                }
            }
        }
        Triangle::Lower => {
            for j in (0..n).rev() {
                let djj = diagonal(j);
                inv[j + j * n] = djj;
                for i in j + 1..n {
                    let mut sum = T::zero();
                    for k in j + 1..=i {
                        sum += inv[i + k * n] * at(k, j);
                    }
                    inv[i + j * n] = -sum * djj;
                }
            }
        }
    }
    inv
}

/// Column-major `(m x k) * (k x n)`.
fn matmul<T: StandardElement>(a: &[T], b: &[T], m: usize, k: usize, n: usize) -> Vec<T> {
    let mut c = vec![T::zero(); m * n];
    for j in 0..n {
        for p in 0..k {
            let bpj = b[p + j * k];
            for i in 0..m {
                c[i + j * m] += a[i + p * m] * bpj;
            }
        }
    }
    c
}

/// Merge levels of the blocked path: `(block size, pairs)` for each level.
fn merge_levels(n: i64) -> impl Iterator<Item = (i64, i64)> {
    std::iter::successors(Some(TRTRI_NB), |s| Some(s * 2))
        .take_while(move |&s| s < n)
        .map(move |s| (s, (n + s - 1) / (2 * s)))
        .filter(|&(_, pairs)| pairs > 0)
}

/// Workspace elements one batch needs for the blocked path.
fn workspace_elements_per_batch(n: i64) -> i64 {
    if n <= TRTRI_NB {
        return 0;
    }
    merge_levels(n).map(|(s, pairs)| pairs * s * s).max().unwrap_or(0)
}

fn workspace_bytes<T>(per_batch: i64, batches: i64) -> usize {
    (per_batch.saturating_mul(batches) as usize).saturating_mul(std::mem::size_of::<T>())
}

#[derive(Clone, Copy)]
struct Operands<B> {
    a: B,
    lda: i64,
    inv: B,
    ldinv: i64,
}

fn launch_small<T, B>(stream: &Stream, ops: Operands<B>, triangle: Triangle, unit: bool, n: usize, count: i32) -> BlasResult<()>
where
    T: StandardElement,
    B: BatchAddress<T>,
{
    let batches = count as i64;
    stream.launch("trtri_small", LaunchConfig::batched(1, THREADS, count), move |ctx| {
        for batch in ctx.batches(batches) {
            let tile = ctx.load_tile(ops.a.resolve(ctx, batch, 0)?, n, n, ops.lda)?;
            let inv = invert_triangle(triangle, unit, &tile, n);
            ctx.store_tile(ops.inv.resolve(ctx, batch, 0)?, n, ops.ldinv, &inv);
        }
        Ok(())
    })?;
    Ok(())
}

/// Inverts every diagonal block and zeroes the opposite triangle of its columns.
fn launch_diagonal<T, B>(stream: &Stream, ops: Operands<B>, triangle: Triangle, unit: bool, n: i64, count: i32) -> BlasResult<()>
where
    T: StandardElement,
    B: BatchAddress<T>,
{
    let blocks = (n + TRTRI_NB - 1) / TRTRI_NB;
    let batches = count as i64;
    stream.launch(
        "trtri_diagonal",
        LaunchConfig::batched(blocks as u32, THREADS, count),
        move |ctx| {
            let first = ctx.block.x as i64 * TRTRI_NB;
            let nb = TRTRI_NB.min(n - first) as usize;
            for batch in ctx.batches(batches) {
                let a = ops.a.resolve(ctx, batch, first + first * ops.lda)?;
                let tile = ctx.load_tile(a, nb, nb, ops.lda)?;
                let inv = invert_triangle(triangle, unit, &tile, nb);
                let origin: DevicePtr<T> = ops.inv.resolve(ctx, batch, 0)?;
                ctx.store_tile(origin.offset(first + first * ops.ldinv), nb, ops.ldinv, &inv);
                let (zero_from, zero_len) = match triangle {
                    Triangle::Upper => (first + nb as i64, n - first - nb as i64),
                    Triangle::Lower => (0, first),
                };
                if zero_len > 0 {
                    let zeros = vec![T::zero(); zero_len as usize];
                    for col in first..first + nb as i64 {
                        ctx.store(origin.offset(zero_from + col * ops.ldinv), &zeros);
                    }
                }
            }
            Ok(())
        },
    )?;
    Ok(())
}

/// One merge level: `tmp = A12 * inv22` (upper) or `tmp = A21 * inv11`
/// (lower) into the workspace, then the off-diagonal block of the inverse.
#[allow(clippy::too_many_arguments)]
fn launch_merge<T, B>(
    stream: &Stream,
    ops: Operands<B>,
    triangle: Triangle,
    n: i64,
    s: i64,
    pairs: i64,
    workspace: DevicePtr<T>,
    per_batch: i64,
    count: i32,
) -> BlasResult<()>
where
    T: StandardElement,
    B: BatchAddress<T>,
{
    let batches = count as i64;
    let config = LaunchConfig::batched(pairs as u32, THREADS, count);
    let su = s as usize;
    stream.launch("trtri_merge_product", config, move |ctx| {
        let r0 = ctx.block.x as i64 * 2 * s;
        let r1 = r0 + s;
        let s2 = s.min(n - r1) as usize;
        for batch in ctx.batches(batches) {
            let tmp_ptr = workspace.offset(batch * per_batch + ctx.block.x as i64 * s * s);
            let a: DevicePtr<T> = ops.a.resolve(ctx, batch, 0)?;
            let inv: DevicePtr<T> = ops.inv.resolve(ctx, batch, 0)?;
            let tmp = match triangle {
                Triangle::Upper => {
                    let a12 = ctx.load_tile(a.offset(r0 + r1 * ops.lda), su, s2, ops.lda)?;
                    let inv22 = ctx.load_tile(inv.offset(r1 + r1 * ops.ldinv), s2, s2, ops.ldinv)?;
                    matmul(&a12, &inv22, su, s2, s2)
                }
                Triangle::Lower => {
                    let a21 = ctx.load_tile(a.offset(r1 + r0 * ops.lda), s2, su, ops.lda)?;
                    let inv11 = ctx.load_tile(inv.offset(r0 + r0 * ops.ldinv), su, su, ops.ldinv)?;
                    matmul(&a21, &inv11, s2, su, su)
                }
            };
            ctx.store(tmp_ptr, &tmp);
        }
        Ok(())
    })?;
    stream.launch("trtri_merge_apply", config, move |ctx| {
        let r0 = ctx.block.x as i64 * 2 * s;
        let r1 = r0 + s;
        let s2 = s.min(n - r1) as usize;
        for batch in ctx.batches(batches) {
            let tmp_ptr = workspace.offset(batch * per_batch + ctx.block.x as i64 * s * s);
            let tmp = ctx.load(tmp_ptr, su * s2)?;
            let inv: DevicePtr<T> = ops.inv.resolve(ctx, batch, 0)?;
            match triangle {
                Triangle::Upper => {
                    let inv11 = ctx.load_tile(inv.offset(r0 + r0 * ops.ldinv), su, su, ops.ldinv)?;
                    let block: Vec<T> = matmul(&inv11, &tmp, su, su, s2).into_iter().map(|v| -v).collect();
                    ctx.store_tile(inv.offset(r0 + r1 * ops.ldinv), su, ops.ldinv, &block);
                }
                Triangle::Lower => {
                    let inv22 = ctx.load_tile(inv.offset(r1 + r1 * ops.ldinv), s2, s2, ops.ldinv)?;
                    let block: Vec<T> = matmul(&inv22, &tmp, s2, s2, su).into_iter().map(|v| -v).collect();
                    ctx.store_tile(inv.offset(r1 + r0 * ops.ldinv), s2, ops.ldinv, &block);
                }
            }
        }
        Ok(())
    })?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn trtri_checked<T, I, B>(
    handle: &Handle,
    uplo: Fill,
    diag: Diagonal,
    n: I,
    a: B,
    lda: I,
    inv_a: B,
    ldinv: I,
    batch_count: I,
) -> BlasResult<()>
where
    T: StandardElement,
    I: ApiInt,
    B: BatchAddress<T>,
{
    handle.log_call(
        &Routine {
            base: "trtri",
            dtype: T::DTYPE,
            mode: B::MODE,
            wide: I::WIDE,
        },
        format_args!(
            "uplo={},diag={},n={n:?},lda={lda:?},ldinvA={ldinv:?},batch_count={batch_count:?}",
            uplo.letter(),
            diag.letter()
        ),
    );
    let triangle = uplo.require_triangle()?;
    let (n, lda, ldinv, batch_count) = (n.get(), lda.get(), ldinv.get(), batch_count.get());
    if n < 0 || lda < n || ldinv < n {
        return Err(BlasError::invalid_size(format!("n = {n}, lda = {lda}, ldinvA = {ldinv}")));
    }
    B::MODE.check_batch_count(batch_count)?;
    if n == 0 || batch_count == 0 {
        return Ok(());
    }
    if a.is_null() {
        return Err(BlasError::InvalidPointer("A"));
    }
    if inv_a.is_null() {
        return Err(BlasError::InvalidPointer("invA"));
    }

    let unit = diag.is_unit();
    let stream = handle.stream();
    let ops = Operands { a, lda, inv: inv_a, ldinv };
    if n <= TRTRI_NB {
        return launch_by_width::<I, _>(n, batch_count, |n32, base, count| {
            let ops = Operands { a: a.advance(base), inv: inv_a.advance(base), ..ops };
            launch_small(stream, ops, triangle, unit, n32 as usize, count)
        });
    }

    narrow("n", n)?;
    let per_batch = workspace_elements_per_batch(n);
    let lease = handle.workspace(workspace_bytes::<T>(per_batch, batches_per_launch::<I>(batch_count)))?;
    let workspace: DevicePtr<T> = lease.ptr();
    launch_by_width::<I, _>(n, batch_count, |n32, base, count| {
        let n = n32 as i64;
        let ops = Operands { a: a.advance(base), inv: inv_a.advance(base), ..ops };
        launch_diagonal(stream, ops, triangle, unit, n, count)?;
        for (s, pairs) in merge_levels(n) {
            launch_merge(stream, ops, triangle, n, s, pairs, workspace, per_batch, count)?;
        }
        Ok(())
    })
}

/// Batched inverse of a triangular matrix: `invA = inv(A)`.
///
/// Only the `uplo` triangle of `A` is read; the opposite triangle of `invA`
/// is set to zero. No singularity test is performed. Matrices larger than
/// [`TRTRI_NB`] use workspace sized by [`trtri_workspace_size`].
#[allow(clippy::too_many_arguments)]
pub fn trtri<T, I, B>(
    handle: Option<&Handle>,
    uplo: Fill,
    diag: Diagonal,
    n: I,
    a: B,
    lda: I,
    inv_a: B,
    ldinv: I,
    batch_count: I,
) -> Status
where
    T: StandardElement,
    I: ApiInt,
    B: BatchAddress<T>,
{
    api_boundary(handle, "trtri", |handle| {
        trtri_checked::<T, I, B>(handle, uplo, diag, n, a, lda, inv_a, ldinv, batch_count)
    })
}

/// Workspace a `trtri` call of this shape takes from the handle.
/// The direct path (`n <= TRTRI_NB`) needs none.
pub fn trtri_workspace_size<T, I>(handle: Option<&Handle>, n: I, batch_count: I) -> Result<WorkspaceSize, Status>
where
    T: StandardElement,
    I: ApiInt,
{
    if handle.is_none() {
        return Err(Status::InvalidHandle);
    }
    let (n, batch_count) = (n.get(), batch_count.get());
    if n < 0 || batch_count < 0 {
        return Err(Status::InvalidSize);
    }
    if n <= TRTRI_NB || batch_count == 0 {
        return Ok(WorkspaceSize::Unchanged);
    }
    let per_batch = workspace_elements_per_batch(n);
    Ok(WorkspaceSize::from_bytes(workspace_bytes::<T>(per_batch, batches_per_launch::<I>(batch_count))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_product(a: &[f64], b: &[f64], n: usize) -> Vec<f64> {
        matmul(a, b, n, n, n)
    }

    fn assert_identity(m: &[f64], n: usize) {
        for j in 0..n {
            for i in 0..n {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((m[i + j * n] - expected).abs() < 1e-12, "({i}, {j}) = {}", m[i + j * n]);
            }
        }
    }

    #[test]
    fn direct_inverse_of_upper() {
        // [[2, 1], [0, 4]]
        let a = [2.0, 0.0, 1.0, 4.0];
        let inv = invert_triangle(Triangle::Upper, false, &a, 2);
        assert_eq!(inv, vec![0.5, 0.0, -0.125, 0.25]);
    }

    #[test]
    fn direct_inverse_of_unit_lower_ignores_diagonal() {
        // [[7, 0, 0], [2, 7, 0], [1, 3, 7]] with unit diagonal
        let a = [7.0, 2.0, 1.0, 0.0, 7.0, 3.0, 0.0, 0.0, 7.0];
        let inv = invert_triangle(Triangle::Lower, true, &a, 3);
        let unit = [1.0, 2.0, 1.0, 0.0, 1.0, 3.0, 0.0, 0.0, 1.0];
        assert_identity(&dense_product(&unit, &inv, 3), 3);
    }

    #[test]
    fn levels_cover_ragged_sizes() {
        assert_eq!(merge_levels(16).count(), 0);
        assert_eq!(merge_levels(40).collect::<Vec<_>>(), vec![(16, 1), (32, 1)]);
        assert_eq!(
            merge_levels(100).collect::<Vec<_>>(),
            vec![(16, 3), (32, 2), (64, 1)]
        );
        assert_eq!(workspace_elements_per_batch(100), 64 * 64);
    }

    #[test]
    fn workspace_query_distinguishes_paths() {
        let handle = Handle::with_device(crate::device::Device::with_memory(1 << 16));
        assert_eq!(
            trtri_workspace_size::<f64, i32>(Some(&handle), TRTRI_NB as i32, 4),
            Ok(WorkspaceSize::Unchanged)
        );
        assert_eq!(
            trtri_workspace_size::<f64, i32>(Some(&handle), 40, 3),
            Ok(WorkspaceSize::Bytes(3 * 32 * 32 * 8))
        );
        assert_eq!(
            trtri_workspace_size::<f64, i32>(Some(&handle), -1, 3),
            Err(Status::InvalidSize)
        );
    }
}
