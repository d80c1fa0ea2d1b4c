//! Scenario runner used by the integration tests and benches.
//!
//! [`run`] resolves `(function, dtype, mode, width)` to one generic scenario
//! and drives it through four phases: bad-argument checks, correctness in
//! host and device pointer mode against [`crate::reference`], bitwise
//! repeatability, and timing.

mod auxiliary;
mod flops;
mod level1;
mod level2;
mod level3;
mod phases;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::batch::{BatchMode, PointerArray, Single, Strided};
use crate::buffer::DeviceBatch;
use crate::compare::{norm_check_general, CheckFailure, NormType, Tolerance};
use crate::config;
use crate::device::{Device, DeviceError};
use crate::dtype::DType;
use crate::element::Element;
use crate::error::{BlasError, Status};
use crate::handle::Handle;
use crate::layout::{Diagonal, Fill, Operation};

use auxiliary::set_get_matrix_scenario;
use level1::{dot_scenario, dotc_scenario, nrm2_scenario};
use level2::{hbmv_scenario, her2_scenario, hpmv_scenario, spr2_scenario, tpsv_scenario};
use level3::trtri_scenario;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    Dot,
    Dotc,
    Nrm2,
    Tpsv,
    Hpmv,
    Her2,
    Hbmv,
    Spr2,
    Trtri,
    SetGetMatrix,
}

impl Function {
    pub const ALL: [Function; 10] = [
        Function::Dot,
        Function::Dotc,
        Function::Nrm2,
        Function::Tpsv,
        Function::Hpmv,
        Function::Her2,
        Function::Hbmv,
        Function::Spr2,
        Function::Trtri,
        Function::SetGetMatrix,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Function::Dot => "dot",
            Function::Dotc => "dotc",
            Function::Nrm2 => "nrm2",
            Function::Tpsv => "tpsv",
            Function::Hpmv => "hpmv",
            Function::Her2 => "her2",
            Function::Hbmv => "hbmv",
            Function::Spr2 => "spr2",
            Function::Trtri => "trtri",
            Function::SetGetMatrix => "set_get_matrix",
        }
    }
}

impl FromStr for Function {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Function::ALL
            .into_iter()
            .find(|f| f.as_str() == value)
            .ok_or_else(|| format!("unknown function '{value}'"))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One test configuration.
///
/// Leading dimensions of `0` mean "tight" (`n`, or `k + 1` for band
/// storage). Batch strides are the operand's span times `stride_scale`; a
/// `stride_scale` of 0 broadcasts the input operands.
#[derive(Clone, Debug)]
pub struct Arguments {
    pub function: Function,
    pub dtype: DType,
    pub mode: BatchMode,
    /// Use the 64-bit integer API.
    pub wide: bool,
    /// Rows for the matrix transfer scenario.
    pub m: i64,
    pub n: i64,
    /// Band width for `hbmv`.
    pub k: i64,
    pub lda: i64,
    pub ldb: i64,
    pub incx: i64,
    pub incy: i64,
    pub stride_scale: usize,
    pub alpha: (f64, f64),
    pub beta: (f64, f64),
    pub uplo: Fill,
    pub trans: Operation,
    pub diag: Diagonal,
    pub batch_count: i64,
    pub unit_check: bool,
    pub norm_check: bool,
    pub pointer_mode_host: bool,
    pub pointer_mode_device: bool,
    /// Extra device-mode runs that must reproduce the first bit for bit.
    pub repeatability: usize,
    pub timing: bool,
    pub cold_iters: usize,
    pub iters: usize,
    pub seed: u64,
}

impl Arguments {
    pub fn new(function: Function, dtype: DType) -> Self {
        Self {
            function,
            dtype,
            mode: BatchMode::Single,
            wide: false,
            m: 64,
            n: 64,
            k: 2,
            lda: 0,
            ldb: 0,
            incx: 1,
            incy: 1,
            stride_scale: 1,
            alpha: (1.0, 0.0),
            beta: (0.0, 0.0),
            uplo: Fill::Upper,
            trans: Operation::None,
            diag: Diagonal::NonUnit,
            batch_count: 1,
            unit_check: true,
            norm_check: false,
            pointer_mode_host: true,
            pointer_mode_device: true,
            repeatability: 0,
            timing: false,
            cold_iters: 2,
            iters: 10,
            seed: config::test_seed(),
        }
    }

    /// Batch count the scenario runs; single-problem calls always use 1.
    pub fn batches(&self) -> i64 {
        match self.mode {
            BatchMode::Single => 1,
            BatchMode::Strided | BatchMode::PointerArray => self.batch_count,
        }
    }

    pub(crate) fn lda_or(&self, tight: i64) -> i64 {
        if self.lda > 0 {
            self.lda
        } else {
            tight.max(1)
        }
    }

    pub(crate) fn ldb_or(&self, tight: i64) -> i64 {
        if self.ldb > 0 {
            self.ldb
        } else {
            tight.max(1)
        }
    }

    pub(crate) fn stride(&self, span: usize) -> usize {
        span * self.stride_scale
    }

    /// Outputs never share storage between batches.
    pub(crate) fn output_stride(&self, span: usize) -> usize {
        span * self.stride_scale.max(1)
    }

    /// Log-style routine name, e.g. `ztrtri_strided_batched_64`.
    pub fn name(&self) -> String {
        format!(
            "{}{}{}{}",
            self.dtype.blas_prefix(),
            self.function,
            self.mode.suffix(),
            if self.wide { "_64" } else { "" }
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timing {
    pub cold_iters: usize,
    pub hot_iters: usize,
    pub seconds_per_call: f64,
    pub gflops: f64,
}

/// Outcome of a passing scenario.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioReport {
    pub name: String,
    pub bad_arg_checks: usize,
    /// Whether the unit (or scaled near) check ran.
    pub unit_checked: bool,
    /// Norm-check error in host pointer mode.
    pub host_error: Option<f64>,
    /// Norm-check error in device pointer mode.
    pub device_error: Option<f64>,
    pub repeat_runs: usize,
    pub timing: Option<Timing>,
}

impl ScenarioReport {
    fn new(args: &Arguments) -> Self {
        Self {
            name: args.name(),
            bad_arg_checks: 0,
            unit_checked: false,
            host_error: None,
            device_error: None,
            repeat_runs: 0,
            timing: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("{call} returned {actual}, expected {expected}")]
    Status {
        call: String,
        expected: Status,
        actual: Status,
    },
    #[error("{phase}: {failure}")]
    Check {
        phase: &'static str,
        failure: CheckFailure,
    },
    #[error("{call}: {detail}")]
    Unexpected { call: &'static str, detail: String },
    #[error("repeat run {run} differs from the first device result")]
    NotRepeatable { run: usize },
    #[error("{function} does not support {dtype}")]
    Unsupported { function: Function, dtype: DType },
    #[error("argument {name} = {value} does not fit the API integer")]
    Argument { name: &'static str, value: i64 },
    #[error(transparent)]
    Blas(#[from] BlasError),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Picks the addressing mode and integer width of a scenario.
macro_rules! by_shape {
    ($args:expr, $T:ty, $scenario:ident) => {
        match ($args.mode, $args.wide) {
            (BatchMode::Single, false) => $scenario::<$T, i32, Single<$T>>($args),
            (BatchMode::Single, true) => $scenario::<$T, i64, Single<$T>>($args),
            (BatchMode::Strided, false) => $scenario::<$T, i32, Strided<$T>>($args),
            (BatchMode::Strided, true) => $scenario::<$T, i64, Strided<$T>>($args),
            (BatchMode::PointerArray, false) => $scenario::<$T, i32, PointerArray<$T>>($args),
            (BatchMode::PointerArray, true) => $scenario::<$T, i64, PointerArray<$T>>($args),
        }
    };
}

/// Runs the scenario `args` describes.
pub fn run(args: &Arguments) -> Result<ScenarioReport, HarnessError> {
    let unsupported = || HarnessError::Unsupported {
        function: args.function,
        dtype: args.dtype,
    };
    tracing::debug!(target: "num_rs_blas::harness", name = %args.name(), n = args.n, batch_count = args.batch_count, "running scenario");
    match args.function {
        Function::Dot => crate::match_blas_dtype!(args.dtype, T, { by_shape!(args, T, dot_scenario) }),
        Function::Dotc => crate::match_complex_dtype!(
            args.dtype,
            T,
            { by_shape!(args, T, dotc_scenario) },
            fallback Err(unsupported())
        ),
        Function::Nrm2 => crate::match_blas_dtype!(args.dtype, T, { by_shape!(args, T, nrm2_scenario) }),
        Function::Tpsv => crate::match_standard_dtype!(
            args.dtype,
            T,
            { by_shape!(args, T, tpsv_scenario) },
            fallback Err(unsupported())
        ),
        Function::Hpmv => crate::match_complex_dtype!(
            args.dtype,
            T,
            { by_shape!(args, T, hpmv_scenario) },
            fallback Err(unsupported())
        ),
        Function::Her2 => crate::match_complex_dtype!(
            args.dtype,
            T,
            { by_shape!(args, T, her2_scenario) },
            fallback Err(unsupported())
        ),
        Function::Hbmv => crate::match_complex_dtype!(
            args.dtype,
            T,
            { by_shape!(args, T, hbmv_scenario) },
            fallback Err(unsupported())
        ),
        Function::Spr2 => crate::match_real_dtype!(
            args.dtype,
            T,
            { by_shape!(args, T, spr2_scenario) },
            fallback Err(unsupported())
        ),
        Function::Trtri => crate::match_standard_dtype!(
            args.dtype,
            T,
            { by_shape!(args, T, trtri_scenario) },
            fallback Err(unsupported())
        ),
        Function::SetGetMatrix => crate::match_blas_dtype!(args.dtype, T, { set_get_matrix_scenario::<T>(args) }),
    }
}

pub(crate) fn expect_status(call: &str, actual: Status, expected: Status) -> Result<(), HarnessError> {
    if actual == expected {
        Ok(())
    } else {
        Err(HarnessError::Status {
            call: call.to_owned(),
            expected,
            actual,
        })
    }
}

/// Converts a harness dimension to the API integer type.
pub(crate) fn int<I: TryFrom<i64>>(name: &'static str, value: i64) -> Result<I, HarnessError> {
    I::try_from(value).map_err(|_| HarnessError::Argument { name, value })
}

pub(crate) fn to_usize(name: &'static str, value: i64) -> Result<usize, HarnessError> {
    usize::try_from(value).map_err(|_| HarnessError::Argument { name, value })
}

pub(crate) fn new_handle() -> Handle {
    Handle::with_device(Device::default_device())
}

/// Device storage for one result or scalar per batch.
pub(crate) fn device_scalar_slots<T: Element>(device: &Arc<Device>, batches: usize) -> Result<DeviceBatch<T>, HarnessError> {
    Ok(DeviceBatch::new(device, 1, 1, batches.max(1))?)
}

/// Acceptable relative error for a norm check.
pub(crate) fn norm_tolerance<T: Element>() -> f64 {
    10f64.powi(-(T::DIGITS10 / 2))
}

/// Runs the enabled checks of `actual` against `expected`, both laid out as
/// `batch_count` column-major `rows x cols` matrices.
#[allow(clippy::too_many_arguments)]
pub(crate) fn verify<T: Element>(
    args: &Arguments,
    phase: &'static str,
    tolerance: Tolerance,
    (rows, cols, ld, stride): (usize, usize, usize, usize),
    expected: &[T],
    actual: &[T],
    batch_count: usize,
    report: &mut ScenarioReport,
) -> Result<Option<f64>, HarnessError> {
    if args.unit_check {
        tolerance
            .check(rows, cols, ld, stride, expected, actual, batch_count)
            .map_err(|failure| HarnessError::Check { phase, failure })?;
        report.unit_checked = true;
    }
    if !args.norm_check {
        return Ok(None);
    }
    let error = norm_check_general(NormType::One, rows, cols, ld, stride, expected, actual, batch_count);
    let limit = norm_tolerance::<T>();
    if error.is_nan() || error > limit {
        return Err(HarnessError::Check {
            phase,
            failure: CheckFailure::Norm {
                norm: NormType::One,
                error,
                tolerance: limit,
            },
        });
    }
    Ok(Some(error))
}

/// Bitwise equality, so NaN payloads compare too.
pub(crate) fn same_bits<T: Element>(a: &[T], b: &[T]) -> bool {
    bytemuck::cast_slice::<T, u8>(a) == bytemuck::cast_slice::<T, u8>(b)
}

/// Cold then hot calls, each group closed by a stream synchronization.
pub(crate) fn time_calls<F>(handle: &Handle, args: &Arguments, flops: f64, mut call: F) -> Result<Timing, HarnessError>
where
    F: FnMut() -> Status,
{
    for _ in 0..args.cold_iters {
        expect_status("cold call", call(), Status::Success)?;
    }
    handle.synchronize()?;
    let start = Instant::now();
    for _ in 0..args.iters {
        expect_status("hot call", call(), Status::Success)?;
    }
    handle.synchronize()?;
    let seconds_per_call = start.elapsed().as_secs_f64() / args.iters.max(1) as f64;
    let gflops = if seconds_per_call > 0.0 {
        flops / seconds_per_call / 1e9
    } else {
        0.0
    };
    tracing::info!(
        target: "num_rs_blas::bench",
        name = %args.name(),
        n = args.n,
        batch_count = args.batches(),
        us = seconds_per_call * 1e6,
        gflops,
        "timing"
    );
    Ok(Timing {
        cold_iters: args.cold_iters,
        hot_iters: args.iters,
        seconds_per_call,
        gflops,
    })
}
