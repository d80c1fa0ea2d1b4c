use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::{
    device_scalar_slots, expect_status, flops, int, new_handle, same_bits, time_calls, to_usize, verify, Arguments,
    HarnessError, ScenarioReport,
};
use crate::batch::{ApiInt, ResultPtr};
use crate::blas1::{dot, dotc, nrm2};
use crate::buffer::{BindBatch, DeviceBatch, HostBatch, Shape};
use crate::compare::Tolerance;
use crate::element::{ComplexElement, Element};
use crate::error::Status;
use crate::handle::{Handle, PointerMode};
use crate::init::fill_random;
use crate::reference;

type DotFn<T, I, B> = for<'h, 'r> fn(Option<&'h Handle>, I, B, I, B, I, I, ResultPtr<'r, T>) -> Status;

/// Result pointer matching `mode`: the host slice or the device buffer.
fn result_ptr<'a, T: Element>(mode: PointerMode, host: &'a mut [T], device: &DeviceBatch<T>) -> ResultPtr<'a, T> {
    match mode {
        PointerMode::Host => ResultPtr::Host(host),
        PointerMode::Device => ResultPtr::Device(device.ptr()),
    }
}

fn opposite(mode: PointerMode) -> PointerMode {
    match mode {
        PointerMode::Host => PointerMode::Device,
        PointerMode::Device => PointerMode::Host,
    }
}

fn random_vectors<T: Element>(
    args: &Arguments,
    rng: &mut ChaCha8Rng,
    n: usize,
    inc: i64,
    batch_count: usize,
) -> HostBatch<T> {
    let span = Shape::Vector { n, inc }.span();
    let mut host = HostBatch::new(span, args.stride(span), batch_count);
    fill_random(rng, &mut host);
    host
}

pub(super) fn dot_scenario<T, I, B>(args: &Arguments) -> Result<ScenarioReport, HarnessError>
where
    T: Element,
    I: ApiInt + TryFrom<i64>,
    B: BindBatch<T>,
{
    dot_common::<T, I, B>(args, false, dot::<T, I, B>)
}

pub(super) fn dotc_scenario<T, I, B>(args: &Arguments) -> Result<ScenarioReport, HarnessError>
where
    T: ComplexElement,
    I: ApiInt + TryFrom<i64>,
    B: BindBatch<T>,
{
    dot_common::<T, I, B>(args, true, dotc::<T, I, B>)
}

#[allow(clippy::too_many_arguments)]
fn dot_bad_args<T, I, B>(
    handle: &mut Handle,
    call: DotFn<T, I, B>,
    n: I,
    x: B,
    incx: I,
    y: B,
    incy: I,
    batch_count: I,
    batches: usize,
) -> Result<usize, HarnessError>
where
    T: Element,
    I: ApiInt + TryFrom<i64>,
    B: BindBatch<T>,
{
    let device = Arc::clone(handle.device());
    let slots = device_scalar_slots::<T>(&device, batches)?;
    let mut host = vec![T::from_parts(7.0, 0.0); batches.max(1)];
    let (zero, negative): (I, I) = (int("zero", 0)?, int("negative", -1)?);
    let mut checks = 0;
    for mode in [PointerMode::Host, PointerMode::Device] {
        handle.set_pointer_mode(mode);
        let h = Some(&*handle);
        let status = call(None, n, x, incx, y, incy, batch_count, result_ptr(mode, &mut host, &slots));
        expect_status("dot without handle", status, Status::InvalidHandle)?;
        let status = call(h, n, x, incx, y, incy, negative, result_ptr(mode, &mut host, &slots));
        expect_status("dot with negative batch_count", status, Status::InvalidSize)?;
        let status = call(h, n, B::null(), incx, B::null(), incy, zero, ResultPtr::Null);
        expect_status("dot with batch_count 0", status, Status::Success)?;
        let status = call(h, n, x, incx, y, incy, batch_count, result_ptr(opposite(mode), &mut host, &slots));
        expect_status("dot with result in the wrong memory space", status, Status::InvalidPointer)?;
        checks += 4;
        if n.get() > 0 && batches > 0 {
            let status = call(h, n, B::null(), incx, y, incy, batch_count, result_ptr(mode, &mut host, &slots));
            expect_status("dot with null x", status, Status::InvalidPointer)?;
            let status = call(h, n, x, incx, B::null(), incy, batch_count, result_ptr(mode, &mut host, &slots));
            expect_status("dot with null y", status, Status::InvalidPointer)?;
            let status = call(h, n, x, incx, y, incy, batch_count, ResultPtr::Null);
            expect_status("dot with null result", status, Status::InvalidPointer)?;
            let status = call(h, zero, B::null(), incx, B::null(), incy, batch_count, ResultPtr::Null);
            expect_status("dot with n = 0 and null result", status, Status::InvalidPointer)?;
            let status = call(h, zero, B::null(), incx, B::null(), incy, batch_count, result_ptr(mode, &mut host, &slots));
            expect_status("dot with n = 0", status, Status::Success)?;
            if mode == PointerMode::Host && !host[..batches].iter().all(|v| v.eq_zero()) {
                return Err(HarnessError::Unexpected {
                    call: "dot with n = 0",
                    detail: "host results were not zeroed".to_owned(),
                });
            }
            checks += 5;
        }
    }
    handle.set_pointer_mode(PointerMode::Host);
    Ok(checks)
}

fn dot_common<T, I, B>(args: &Arguments, conjugate: bool, call: DotFn<T, I, B>) -> Result<ScenarioReport, HarnessError>
where
    T: Element,
    I: ApiInt + TryFrom<i64>,
    B: BindBatch<T>,
{
    let mut report = ScenarioReport::new(args);
    let mut handle = new_handle();
    let device = Arc::clone(handle.device());
    let n = to_usize("n", args.n)?;
    let batches = to_usize("batch_count", args.batches())?;
    let (n_i, incx, incy, batch_count): (I, I, I, I) = (
        int("n", args.n)?,
        int("incx", args.incx)?,
        int("incy", args.incy)?,
        int("batch_count", args.batches())?,
    );

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let hx = random_vectors::<T>(args, &mut rng, n, args.incx, batches);
    let hy = random_vectors::<T>(args, &mut rng, n, args.incy, batches);
    let dx = DeviceBatch::from_host(&device, &hx)?;
    let dy = DeviceBatch::from_host(&device, &hy)?;
    let (x, y): (B, B) = (dx.address(), dy.address());

    report.bad_arg_checks = dot_bad_args(&mut handle, call, n_i, x, incx, y, incy, batch_count, batches)?;

    let expected: Vec<T> = (0..batches)
        .map(|b| reference::dot(n, hx.batch(b), args.incx, hy.batch(b), args.incy, conjugate))
        .collect();
    let tolerance = Tolerance::reduction::<T>(n);
    let layout = (1, 1, 1, 1);

    if args.pointer_mode_host {
        handle.set_pointer_mode(PointerMode::Host);
        let mut results = vec![T::from_parts(0.0, 0.0); batches];
        let status = call(Some(&handle), n_i, x, incx, y, incy, batch_count, ResultPtr::Host(&mut results));
        expect_status("dot (host pointer mode)", status, Status::Success)?;
        let error = verify(args, "host pointer mode", tolerance, layout, &expected, &results, batches, &mut report)?;
        report.host_error = error;
    }

    if args.pointer_mode_device || args.repeatability > 0 {
        handle.set_pointer_mode(PointerMode::Device);
        let dresult = DeviceBatch::<T>::new(&device, 1, 1, batches)?;
        let run = || -> Result<Vec<T>, HarnessError> {
            let status = call(Some(&handle), n_i, x, incx, y, incy, batch_count, ResultPtr::Device(dresult.ptr()));
            expect_status("dot (device pointer mode)", status, Status::Success)?;
            handle.synchronize()?;
            Ok(dresult.to_host()?.as_slice().to_vec())
        };
        let first = run()?;
        if args.pointer_mode_device {
            let error = verify(args, "device pointer mode", tolerance, layout, &expected, &first, batches, &mut report)?;
            report.device_error = error;
        }
        for repeat in 1..=args.repeatability {
            if !same_bits(&first, &run()?) {
                return Err(HarnessError::NotRepeatable { run: repeat });
            }
        }
        report.repeat_runs = args.repeatability;
        dresult.memcheck()?;
    }
    dx.memcheck()?;
    dy.memcheck()?;

    if args.timing {
        handle.set_pointer_mode(PointerMode::Host);
        let mut results = vec![T::from_parts(0.0, 0.0); batches];
        let work = flops::dot(T::DTYPE, n) * batches as f64;
        let timing = time_calls(&handle, args, work, || {
            call(Some(&handle), n_i, x, incx, y, incy, batch_count, ResultPtr::Host(&mut results))
        })?;
        report.timing = Some(timing);
    }
    Ok(report)
}

pub(super) fn nrm2_scenario<T, I, B>(args: &Arguments) -> Result<ScenarioReport, HarnessError>
where
    T: Element,
    I: ApiInt + TryFrom<i64>,
    B: BindBatch<T>,
{
    let mut report = ScenarioReport::new(args);
    let mut handle = new_handle();
    let device = Arc::clone(handle.device());
    let n = to_usize("n", args.n)?;
    let batches = to_usize("batch_count", args.batches())?;
    let (n_i, incx, batch_count): (I, I, I) = (
        int("n", args.n)?,
        int("incx", args.incx)?,
        int("batch_count", args.batches())?,
    );

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let hx = random_vectors::<T>(args, &mut rng, n, args.incx, batches);
    let dx = DeviceBatch::from_host(&device, &hx)?;
    let x: B = dx.address();

    // Bad arguments, both pointer modes.
    let slots = device_scalar_slots::<T::Norm>(&device, batches)?;
    let mut host = vec![<T::Norm as Element>::from_parts(7.0, 0.0); batches.max(1)];
    let (zero, negative): (I, I) = (int("zero", 0)?, int("negative", -1)?);
    for mode in [PointerMode::Host, PointerMode::Device] {
        handle.set_pointer_mode(mode);
        let h = Some(&handle);
        let status = nrm2::<T, I, B>(None, n_i, x, incx, batch_count, result_ptr(mode, &mut host, &slots));
        expect_status("nrm2 without handle", status, Status::InvalidHandle)?;
        let status = nrm2::<T, I, B>(h, n_i, x, incx, negative, result_ptr(mode, &mut host, &slots));
        expect_status("nrm2 with negative batch_count", status, Status::InvalidSize)?;
        let status = nrm2::<T, I, B>(h, n_i, B::null(), incx, zero, ResultPtr::Null);
        expect_status("nrm2 with batch_count 0", status, Status::Success)?;
        let status = nrm2::<T, I, B>(h, zero, B::null(), incx, batch_count, result_ptr(mode, &mut host, &slots));
        expect_status("nrm2 with n = 0", status, Status::Success)?;
        let status = nrm2::<T, I, B>(h, n_i, B::null(), negative, batch_count, result_ptr(mode, &mut host, &slots));
        expect_status("nrm2 with incx < 0", status, Status::Success)?;
        report.bad_arg_checks += 5;
        if n > 0 && batches > 0 && args.incx > 0 {
            let status = nrm2::<T, I, B>(h, n_i, B::null(), incx, batch_count, result_ptr(mode, &mut host, &slots));
            expect_status("nrm2 with null x", status, Status::InvalidPointer)?;
            let status = nrm2::<T, I, B>(h, n_i, x, incx, batch_count, ResultPtr::Null);
            expect_status("nrm2 with null result", status, Status::InvalidPointer)?;
            let status = nrm2::<T, I, B>(h, zero, B::null(), incx, batch_count, ResultPtr::Null);
            expect_status("nrm2 with n = 0 and null result", status, Status::InvalidPointer)?;
            report.bad_arg_checks += 3;
        }
    }

    let expected: Vec<T::Norm> = (0..batches).map(|b| reference::nrm2(n, hx.batch(b), args.incx)).collect();
    let largest = expected.iter().map(|v| v.to_c64().norm()).fold(0.0, f64::max);
    let tolerance = Tolerance::sqrt_precision::<T>(largest);
    let layout = (1, 1, 1, 1);

    if args.pointer_mode_host {
        handle.set_pointer_mode(PointerMode::Host);
        let mut results = vec![<T::Norm as Element>::from_parts(0.0, 0.0); batches];
        let status = nrm2::<T, I, B>(Some(&handle), n_i, x, incx, batch_count, ResultPtr::Host(&mut results));
        expect_status("nrm2 (host pointer mode)", status, Status::Success)?;
        let error = verify(args, "host pointer mode", tolerance, layout, &expected, &results, batches, &mut report)?;
        report.host_error = error;
    }

    if args.pointer_mode_device || args.repeatability > 0 {
        handle.set_pointer_mode(PointerMode::Device);
        let dresult = DeviceBatch::<T::Norm>::new(&device, 1, 1, batches)?;
        let run = || -> Result<Vec<T::Norm>, HarnessError> {
            let status = nrm2::<T, I, B>(Some(&handle), n_i, x, incx, batch_count, ResultPtr::Device(dresult.ptr()));
            expect_status("nrm2 (device pointer mode)", status, Status::Success)?;
            handle.synchronize()?;
            Ok(dresult.to_host()?.as_slice().to_vec())
        };
        let first = run()?;
        if args.pointer_mode_device {
            let error = verify(args, "device pointer mode", tolerance, layout, &expected, &first, batches, &mut report)?;
            report.device_error = error;
        }
        for repeat in 1..=args.repeatability {
            if !same_bits(&first, &run()?) {
                return Err(HarnessError::NotRepeatable { run: repeat });
            }
        }
        report.repeat_runs = args.repeatability;
    }
    dx.memcheck()?;

    if args.timing {
        handle.set_pointer_mode(PointerMode::Host);
        let mut results = vec![<T::Norm as Element>::from_parts(0.0, 0.0); batches];
        let work = flops::nrm2(T::DTYPE, n) * batches as f64;
        let timing = time_calls(&handle, args, work, || {
            nrm2::<T, I, B>(Some(&handle), n_i, x, incx, batch_count, ResultPtr::Host(&mut results))
        })?;
        report.timing = Some(timing);
    }
    Ok(report)
}
