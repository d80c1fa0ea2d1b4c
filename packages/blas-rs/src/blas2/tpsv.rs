use super::{check_sizes, load_vector, require, LEVEL2_THREADS};
use crate::batch::{ApiInt, BatchAddress};
use crate::device::LaunchConfig;
use crate::element::StandardElement;
use crate::error::{api_boundary, BlasResult, Status};
use crate::handle::{Handle, Routine};
use crate::int64::{launch_by_width, narrow};
use crate::layout::{packed_index, packed_len, Diagonal, Fill, Operation, Triangle};
use crate::numerics;

/// Solves `op(A) x = b` in place for a packed triangular `A`.
pub(crate) fn solve_packed<T: StandardElement>(
    triangle: Triangle,
    op: Operation,
    unit: bool,
    ap: &[T],
    x: &mut [T],
) {
    let n = x.len();
    let at = |i: usize, j: usize| ap[packed_index(triangle, n, i, j)];
    let conjugate = op == Operation::ConjugateTranspose;
    let op_at = |i: usize, j: usize| {
        let a = at(i, j);
        if conjugate {
            a.conj()
        } else {
            a
        }
    };
    match (op, triangle) {
        (Operation::None, Triangle::Upper) => {
            for j in (0..n).rev() {
                if !unit {
                    x[j] /= at(j, j);
                }
                let xj = x[j];
                for i in 0..j {
                    x[i] -= xj * at(i, j);
                }
            }
        }
        (Operation::None, Triangle::Lower) => {
            for j in 0..n {
                if !unit {
                    x[j] /= at(j, j);
                }
                let xj = x[j];
                for i in j + 1..n {
                    x[i] -= xj * at(i, j);
                }
            }
        }
        (_, Triangle::Upper) => {
            for i in 0..n {
                let mut value = x[i];
                for k in 0..i {
                    value -= op_at(k, i) * x[k];
                }
                if !unit {
                    value /= op_at(i, i);
                }
                x[i] = value;
            }
        }
        (_, Triangle::Lower) => {
            for i in (0..n).rev() {
                let mut value = x[i];
                for k in i + 1..n {
                    value -= op_at(k, i) * x[k];
                }
                if !unit {
                    value /= op_at(i, i);
                }
                x[i] = value;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn tpsv_checked<T, I, B>(
    handle: &Handle,
    uplo: Fill,
    trans: Operation,
    diag: Diagonal,
    n: I,
    ap: B,
    x: B,
    incx: I,
    batch_count: I,
) -> BlasResult<()>
where
    T: StandardElement,
    I: ApiInt,
    B: BatchAddress<T>,
{
    handle.log_call(
        &Routine {
            base: "tpsv",
            dtype: T::DTYPE,
            mode: B::MODE,
            wide: I::WIDE,
        },
        format_args!(
            "uplo={},transA={},diag={},n={n:?},incx={incx:?},batch_count={batch_count:?}",
            uplo.letter(),
            trans.letter(),
            diag.letter()
        ),
    );
    let triangle = uplo.require_triangle()?;
    let (n, incx, batch_count) = (n.get(), incx.get(), batch_count.get());
    check_sizes(B::MODE, n, &[("incx", incx)], batch_count)?;
    if n == 0 || batch_count == 0 {
        return Ok(());
    }
    require("AP", ap.is_null())?;
    require("x", x.is_null())?;

    narrow("n", n)?;
    let unit = diag.is_unit();
    numerics::check_vector::<T, I, B>(handle, "tpsv", "AP", packed_len(n as usize) as i64, ap, 1, batch_count, true)?;
    numerics::check_vector::<T, I, B>(handle, "tpsv", "x", n, x, incx, batch_count, true)?;

    let stream = handle.stream();
    launch_by_width::<I, _>(n, batch_count, |n32, base, count| {
        let (ap, x) = (ap.advance(base), x.advance(base));
        let n = n32 as usize;
        let batches = count as i64;
        stream.launch("tpsv", LaunchConfig::batched(1, LEVEL2_THREADS, count), move |ctx| {
            for batch in ctx.batches(batches) {
                let a = ctx.load(ap.resolve(ctx, batch, 0)?, packed_len(n))?;
                let (start, mut values) = load_vector(ctx, &x, batch, n, incx)?;
                solve_packed(triangle, trans, unit, &a, &mut values);
                ctx.store_strided(start, incx, &values);
            }
            Ok(())
        })?;
        Ok(())
    })?;

    numerics::check_vector::<T, I, B>(handle, "tpsv", "x", n, x, incx, batch_count, false)
}

/// Solves `op(A) x = b` for packed triangular `A`, overwriting `x` with the
/// solution, for every batch.
///
/// No singularity test is performed. With numerics checking enabled the
/// packed matrix and `x` are scanned before the solve and `x` after it.
#[allow(clippy::too_many_arguments)]
pub fn tpsv<T, I, B>(
    handle: Option<&Handle>,
    uplo: Fill,
    trans: Operation,
    diag: Diagonal,
    n: I,
    ap: B,
    x: B,
    incx: I,
    batch_count: I,
) -> Status
where
    T: StandardElement,
    I: ApiInt,
    B: BatchAddress<T>,
{
    api_boundary(handle, "tpsv", |handle| {
        tpsv_checked::<T, I, B>(handle, uplo, trans, diag, n, ap, x, incx, batch_count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Single;
    use crate::device::DevicePtr;
    use num_complex::Complex64;

    // Upper packed [[2, 1, 4], [0, 3, 5], [0, 0, 6]] in column order.
    const UPPER: [f64; 6] = [2.0, 1.0, 3.0, 4.0, 5.0, 6.0];

    fn upper_times(x: &[f64; 3]) -> [f64; 3] {
        [
            2.0 * x[0] + 1.0 * x[1] + 4.0 * x[2],
            3.0 * x[1] + 5.0 * x[2],
            6.0 * x[2],
        ]
    }

    fn upper_transposed_times(x: &[f64; 3]) -> [f64; 3] {
        [
            2.0 * x[0],
            1.0 * x[0] + 3.0 * x[1],
            4.0 * x[0] + 5.0 * x[1] + 6.0 * x[2],
        ]
    }

    #[test]
    fn upper_solves_match_products() {
        let solution = [1.0, -2.0, 0.5];
        let mut x = upper_times(&solution);
        solve_packed(Triangle::Upper, Operation::None, false, &UPPER, &mut x);
        assert_eq!(x, solution);
        let mut x = upper_transposed_times(&solution);
        solve_packed(Triangle::Upper, Operation::Transpose, false, &UPPER, &mut x);
        assert_eq!(x, solution);
    }

    #[test]
    fn lower_unit_solve_ignores_stored_diagonal() {
        // Lower packed [[9, 0], [2, 9]] with unit diagonal: L = [[1, 0], [2, 1]].
        let ap = [9.0f64, 2.0, 9.0];
        let mut x = [1.0, 5.0];
        solve_packed(Triangle::Lower, Operation::None, true, &ap, &mut x);
        assert_eq!(x, [1.0, 3.0]);
    }

    #[test]
    fn conjugate_transpose_conjugates_entries() {
        // Upper [[1, i], [0, 1]], A^H = [[1, 0], [-i, 1]].
        let ap = [
            Complex64::new(1.0, 0.0),
            Complex64::new(0.0, 1.0),
            Complex64::new(1.0, 0.0),
        ];
        let mut x = [Complex64::new(1.0, 0.0), Complex64::new(0.0, -1.0)];
        solve_packed(Triangle::Upper, Operation::ConjugateTranspose, false, &ap, &mut x);
        assert_eq!(x, [Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)]);
    }

    #[test]
    fn full_fill_is_invalid_value() {
        let handle = Handle::with_device(crate::device::Device::with_memory(1 << 16));
        let status = tpsv::<f32, i32, _>(
            Some(&handle),
            Fill::Full,
            Operation::None,
            Diagonal::NonUnit,
            4,
            Single::new(DevicePtr::null()),
            Single::new(DevicePtr::null()),
            1,
            1,
        );
        assert_eq!(status, Status::InvalidValue);
    }
}
