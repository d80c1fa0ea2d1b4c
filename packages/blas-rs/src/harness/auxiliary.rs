use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::phases::BadArgs;
use super::{expect_status, new_handle, time_calls, to_usize, verify, Arguments, HarnessError, ScenarioReport};
use crate::buffer::{DeviceBatch, HostBatch, Shape};
use crate::compare::Tolerance;
use crate::device::{DevicePtr, PinnedBuffer};
use crate::element::Element;
use crate::error::Status;
use crate::init::fill_random;
use crate::transfer::{get_matrix, get_matrix_async, get_vector, set_matrix, set_matrix_async, set_vector};

/// Round trips an `m x n` matrix and an `n`-vector through device memory,
/// blocking and on a stream, and checks the copies bit for bit.
pub(super) fn set_get_matrix_scenario<T: Element>(args: &Arguments) -> Result<ScenarioReport, HarnessError> {
    let mut report = ScenarioReport::new(args);
    let handle = new_handle();
    let device = Arc::clone(handle.device());
    let (rows, cols) = (to_usize("m", args.m)?, to_usize("n", args.n)?);
    let (lda, ldb) = (args.lda_or(args.m), args.ldb_or(args.m));
    let (lda_u, ldb_u) = (to_usize("lda", lda)?, to_usize("ldb", ldb)?);
    let (incx, incy) = (args.incx.abs().max(1), args.incy.abs().max(1));
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    let a_span = Shape::Matrix { rows, cols, ld: lda_u }.span();
    let mut ha = HostBatch::<T>::new(a_span, a_span, 1);
    fill_random(&mut rng, &mut ha);
    let b_span = Shape::Matrix { rows, cols, ld: ldb_u }.span();
    let mut db = DeviceBatch::<T>::new(&device, b_span, b_span, 1)?;
    let dev: DevicePtr<T> = db.ptr();

    let x_span = Shape::Vector { n: cols, inc: incx }.span();
    let mut hx = HostBatch::<T>::new(x_span, x_span, 1);
    fill_random(&mut rng, &mut hx);
    let y_span = Shape::Vector { n: cols, inc: incy }.span();
    let dy = DeviceBatch::<T>::new(&device, y_span, y_span, 1)?;
    let dev_y: DevicePtr<T> = dy.ptr();

    let a = ha.as_slice();
    let (m, n) = (args.m, args.n);
    let null = DevicePtr::<T>::null();
    let mut scratch = vec![T::from_parts(0.0, 0.0); a_span.max(1)];
    let mut bad = BadArgs::new("set_get_matrix");
    let status = set_matrix(&device, -1, n, a, lda, dev, ldb);
    bad.expect("set_matrix with rows < 0", status, Status::InvalidSize)?;
    let status = set_matrix(&device, m, -1, a, lda, dev, ldb);
    bad.expect("set_matrix with cols < 0", status, Status::InvalidSize)?;
    let status = set_matrix(&device, m, n, a, 0, dev, ldb);
    bad.expect("set_matrix with lda = 0", status, Status::InvalidSize)?;
    let status = get_matrix(&device, m, n, dev, lda, &mut scratch, 0);
    bad.expect("get_matrix with ldb = 0", status, Status::InvalidSize)?;
    let status = set_vector(&device, n, hx.as_slice(), 0, dev_y, incy);
    bad.expect("set_vector with incx = 0", status, Status::InvalidSize)?;
    let status = get_vector(&device, n, dev_y, incy, &mut scratch, 0);
    bad.expect("get_vector with incy = 0", status, Status::InvalidSize)?;
    let status = set_matrix(&device, m, 0, a, lda, null, ldb);
    bad.expect("set_matrix with cols = 0", status, Status::Success)?;
    let status = set_vector(&device, 0, hx.as_slice(), incx, null, incy);
    bad.expect("set_vector with n = 0", status, Status::Success)?;
    if rows > 0 {
        let short: i64 = m - 1;
        let status = set_matrix(&device, m, n, a, short, dev, ldb);
        bad.expect("set_matrix with lda < rows", status, Status::InvalidSize)?;
        let status = get_matrix(&device, m, n, dev, lda, &mut scratch, short);
        bad.expect("get_matrix with ldb < rows", status, Status::InvalidSize)?;
    }
    if rows > 0 && cols > 0 {
        let status = set_matrix(&device, m, n, a, lda, null, ldb);
        bad.expect("set_matrix with null device matrix", status, Status::InvalidPointer)?;
        let status = get_matrix(&device, m, n, null, ldb, &mut scratch, lda);
        bad.expect("get_matrix with null device matrix", status, Status::InvalidPointer)?;
        let status = set_vector(&device, n, hx.as_slice(), incx, null, incy);
        bad.expect("set_vector with null device vector", status, Status::InvalidPointer)?;
        let status = set_matrix(&device, m, n, &a[..a_span - 1], lda, dev, ldb);
        bad.expect("set_matrix with a short host matrix", status, Status::InvalidSize)?;
        let pinned = PinnedBuffer::<T>::zeroed(a_span - 1);
        let status = get_matrix_async(m, n, dev, ldb, &pinned, lda, handle.stream());
        bad.expect("get_matrix_async into a short pinned buffer", status, Status::InvalidSize)?;
    }
    report.bad_arg_checks = bad.checks;

    let layout = (rows, cols, lda_u, a_span);
    let expected = ha.as_slice();

    expect_status("set_matrix", set_matrix(&device, m, n, a, lda, dev, ldb), Status::Success)?;
    let mut back = vec![T::from_parts(0.0, 0.0); a_span];
    expect_status("get_matrix", get_matrix(&device, m, n, dev, ldb, &mut back, lda), Status::Success)?;
    let error = verify(args, "blocking matrix copy", Tolerance::Unit, layout, expected, &back, 1, &mut report)?;
    report.host_error = error;

    let stream = handle.stream();
    db.transfer_from(&HostBatch::new(b_span, b_span, 1))?;
    expect_status("set_matrix_async", set_matrix_async(m, n, a, lda, dev, ldb, stream), Status::Success)?;
    let pinned = PinnedBuffer::<T>::zeroed(a_span);
    expect_status("get_matrix_async", get_matrix_async(m, n, dev, ldb, &pinned, lda, stream), Status::Success)?;
    stream.synchronize()?;
    let staged = pinned.to_vec();
    let error = verify(args, "stream matrix copy", Tolerance::Unit, layout, expected, &staged, 1, &mut report)?;
    report.device_error = error;
    db.memcheck()?;

    expect_status("set_vector", set_vector(&device, n, hx.as_slice(), incx, dev_y, incy), Status::Success)?;
    let mut hy = vec![T::from_parts(0.0, 0.0); x_span];
    expect_status("get_vector", get_vector(&device, n, dev_y, incy, &mut hy, incx), Status::Success)?;
    let vector_layout = (1, cols, incx as usize, x_span);
    verify(args, "vector copy", Tolerance::Unit, vector_layout, hx.as_slice(), &hy, 1, &mut report)?;
    dy.memcheck()?;

    if args.timing {
        let timing = time_calls(&handle, args, 0.0, || {
            let status = set_matrix(&device, m, n, a, lda, dev, ldb);
            if status.is_success() {
                get_matrix(&device, m, n, dev, ldb, &mut back, lda)
            } else {
                status
            }
        })?;
        report.timing = Some(timing);
    }
    Ok(report)
}
