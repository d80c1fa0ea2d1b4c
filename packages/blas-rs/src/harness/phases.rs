//! Building blocks shared by the level-2, level-3 and transfer scenarios.

use std::sync::Arc;

use rand::Rng;

use super::{expect_status, same_bits, time_calls, verify, Arguments, HarnessError, ScenarioReport};
use crate::batch::ScalarPtr;
use crate::buffer::{DeviceBatch, HostBatch};
use crate::compare::Tolerance;
use crate::device::Device;
use crate::element::Element;
use crate::error::Status;
use crate::handle::{Handle, PointerMode};
use crate::init::fill_random;

/// A batched operand with its host copy, which stays the pristine input.
pub(crate) struct Operand<T> {
    pub host: HostBatch<T>,
    pub device: DeviceBatch<T>,
}

impl<T: Element> Operand<T> {
    pub fn upload(device: &Arc<Device>, host: HostBatch<T>) -> Result<Self, HarnessError> {
        let buffer = DeviceBatch::from_host(device, &host)?;
        Ok(Self { host, device: buffer })
    }

    /// Random operand of `span` elements per batch, `stride` apart.
    pub fn random<R: Rng + ?Sized>(
        device: &Arc<Device>,
        rng: &mut R,
        span: usize,
        stride: usize,
        batch_count: usize,
    ) -> Result<Self, HarnessError> {
        let mut host = HostBatch::new(span, stride, batch_count);
        fill_random(rng, &mut host);
        Self::upload(device, host)
    }

    /// Restores the device copy from the host input.
    pub fn reset(&mut self) -> Result<(), HarnessError> {
        Ok(self.device.transfer_from(&self.host)?)
    }
}

/// `alpha` and `beta` in both memory spaces.
pub(crate) struct Scalars<T> {
    alpha: T,
    beta: T,
    device: DeviceBatch<T>,
}

impl<T: Element> Scalars<T> {
    pub fn new(device: &Arc<Device>, alpha: T, beta: T) -> Result<Self, HarnessError> {
        let host = HostBatch::from_vec(vec![alpha, beta], 2, 2, 1)?;
        Ok(Self {
            alpha,
            beta,
            device: DeviceBatch::from_host(device, &host)?,
        })
    }

    pub fn from_args(device: &Arc<Device>, args: &Arguments) -> Result<Self, HarnessError> {
        Self::new(
            device,
            T::from_parts(args.alpha.0, args.alpha.1),
            T::from_parts(args.beta.0, args.beta.1),
        )
    }

    pub fn alpha_value(&self) -> T {
        self.alpha
    }

    pub fn beta_value(&self) -> T {
        self.beta
    }

    pub fn alpha(&self, mode: PointerMode) -> ScalarPtr<'_, T> {
        match mode {
            PointerMode::Host => ScalarPtr::Host(&self.alpha),
            PointerMode::Device => ScalarPtr::Device(self.device.ptr()),
        }
    }

    pub fn beta(&self, mode: PointerMode) -> ScalarPtr<'_, T> {
        match mode {
            PointerMode::Host => ScalarPtr::Host(&self.beta),
            PointerMode::Device => ScalarPtr::Device(self.device.ptr().offset(1)),
        }
    }

    /// `alpha` in the memory space the handle does not expect.
    pub fn misplaced_alpha(&self, mode: PointerMode) -> ScalarPtr<'_, T> {
        match mode {
            PointerMode::Host => self.alpha(PointerMode::Device),
            PointerMode::Device => self.alpha(PointerMode::Host),
        }
    }
}

/// Counts bad-argument calls and reports the first unexpected status.
pub(crate) struct BadArgs {
    routine: &'static str,
    pub checks: usize,
}

impl BadArgs {
    pub fn new(routine: &'static str) -> Self {
        Self { routine, checks: 0 }
    }

    pub fn expect(&mut self, case: &str, actual: Status, expected: Status) -> Result<(), HarnessError> {
        expect_status(&format!("{} {case}", self.routine), actual, expected)?;
        self.checks += 1;
        Ok(())
    }
}

/// Tolerance for results of a substitution or product whose summation
/// order differs from the oracle's.
pub(crate) fn solve_tolerance<T: Element>(n: usize, expected: &[T]) -> Tolerance {
    let scale = expected
        .iter()
        .map(|v| v.to_c64().norm())
        .filter(|v| v.is_finite())
        .fold(1.0, f64::max);
    Tolerance::Near(10f64.powi(1 - T::DIGITS10) * n.max(1) as f64 * scale)
}

fn phase_name(mode: PointerMode) -> &'static str {
    match mode {
        PointerMode::Host => "host pointer mode",
        PointerMode::Device => "device pointer mode",
    }
}

/// Correctness in each enabled pointer mode, then bitwise repeatability in
/// device pointer mode. `output` is restored from its host copy before every
/// call; `call` receives the handle and the pointer mode to use for scalars.
#[allow(clippy::too_many_arguments)]
pub(crate) fn check_modes<T, F>(
    args: &Arguments,
    handle: &mut Handle,
    output: &mut Operand<T>,
    expected: &HostBatch<T>,
    tolerance: Tolerance,
    layout: (usize, usize, usize, usize),
    report: &mut ScenarioReport,
    mut call: F,
) -> Result<(), HarnessError>
where
    T: Element,
    F: FnMut(&Handle, PointerMode) -> Status,
{
    let batches = expected.batch_count();
    let modes = [
        (PointerMode::Host, args.pointer_mode_host),
        (PointerMode::Device, args.pointer_mode_device),
    ];
    for (mode, enabled) in modes {
        if !enabled {
            continue;
        }
        handle.set_pointer_mode(mode);
        output.reset()?;
        expect_status(phase_name(mode), call(handle, mode), Status::Success)?;
        handle.synchronize()?;
        let actual = output.device.to_host()?;
        let error = verify(
            args,
            phase_name(mode),
            tolerance,
            layout,
            expected.as_slice(),
            actual.as_slice(),
            batches,
            report,
        )?;
        match mode {
            PointerMode::Host => report.host_error = error,
            PointerMode::Device => report.device_error = error,
        }
    }

    if args.repeatability > 0 {
        handle.set_pointer_mode(PointerMode::Device);
        let mut first: Option<HostBatch<T>> = None;
        for run in 0..=args.repeatability {
            output.reset()?;
            expect_status("repeatability", call(handle, PointerMode::Device), Status::Success)?;
            handle.synchronize()?;
            let result = output.device.to_host()?;
            match &first {
                None => first = Some(result),
                Some(first) if !same_bits(first.as_slice(), result.as_slice()) => {
                    return Err(HarnessError::NotRepeatable { run });
                }
                Some(_) => {}
            }
        }
        report.repeat_runs = args.repeatability;
    }
    output.device.memcheck()?;
    Ok(())
}

/// Timing phase in host pointer mode, when enabled.
pub(crate) fn timing_phase<F>(
    args: &Arguments,
    handle: &mut Handle,
    flops: f64,
    report: &mut ScenarioReport,
    mut call: F,
) -> Result<(), HarnessError>
where
    F: FnMut(&Handle, PointerMode) -> Status,
{
    if !args.timing {
        return Ok(());
    }
    handle.set_pointer_mode(PointerMode::Host);
    let handle = &*handle;
    report.timing = Some(time_calls(handle, args, flops, || call(handle, PointerMode::Host))?);
    Ok(())
}
