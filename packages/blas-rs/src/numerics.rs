//! NaN/Inf scanning of routine operands, driven by the handle's
//! [`CheckNumerics`] mode.

use crate::batch::{ApiInt, BatchAddress};
use crate::device::{DevicePtr, LaunchConfig};
use crate::element::Element;
use crate::error::{BlasError, BlasResult};
use crate::handle::{CheckNumerics, Handle};
use crate::int64::{batches_per_launch, for_each_batch_chunk};
use crate::layout::negative_inc_shift;

const COUNTERS: usize = 3;

/// Special values found across every batch of one operand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NumericsSummary {
    pub nan: u64,
    pub inf: u64,
    pub zero: u64,
}

impl NumericsSummary {
    pub fn is_clean(&self) -> bool {
        self.nan == 0 && self.inf == 0
    }

    fn add(&mut self, counts: &[u32]) {
        self.nan += counts[0] as u64;
        self.inf += counts[1] as u64;
        self.zero += counts[2] as u64;
    }
}

fn classify<T: Element>(values: &[T]) -> [u32; COUNTERS] {
    let mut counts = [0u32; COUNTERS];
    for value in values {
        if value.has_nan() {
            counts[0] += 1;
        } else if !value.all_finite() {
            counts[1] += 1;
        } else if value.eq_zero() {
            counts[2] += 1;
        }
    }
    counts
}

/// Counts NaN, Inf and zero entries of a strided vector in every batch.
/// `len` is the logical length; `inc` may be negative.
pub(crate) fn scan_vector<T, I, B>(
    handle: &Handle,
    len: i64,
    x: B,
    inc: i64,
    batch_count: i64,
) -> BlasResult<NumericsSummary>
where
    T: Element,
    I: ApiInt,
    B: BatchAddress<T>,
{
    let mut summary = NumericsSummary::default();
    if len <= 0 || batch_count <= 0 {
        return Ok(summary);
    }
    let per_launch = batches_per_launch::<I>(batch_count);
    let lease = handle.workspace(per_launch as usize * COUNTERS * std::mem::size_of::<u32>())?;
    let counts: DevicePtr<u32> = lease.ptr();
    let stream = handle.stream();
    let shift = negative_inc_shift(len, inc);
    for_each_batch_chunk(batch_count, per_launch, |base, count| {
        let x = x.advance(base);
        let batches = count as i64;
        stream.launch(
            "check_numerics",
            LaunchConfig::batched(1, 256, count),
            move |ctx| {
                for batch in ctx.batches(batches) {
                    let start = x.resolve(ctx, batch, shift)?;
                    let values = ctx.load_strided(start, len as usize, inc)?;
                    ctx.store(counts.offset(batch * COUNTERS as i64), &classify(&values));
                }
                Ok(())
            },
        )?;
        stream.synchronize()?;
        let mut host = vec![0u32; count as usize * COUNTERS];
        handle.device().memcpy_dtoh(&mut host, counts)?;
        host.chunks(COUNTERS).for_each(|chunk| summary.add(chunk));
        Ok(())
    })?;
    Ok(summary)
}

/// Applies the handle's mode to a scan result.
pub(crate) fn report(
    mode: CheckNumerics,
    routine: &'static str,
    operand: &'static str,
    is_input: bool,
    summary: NumericsSummary,
) -> BlasResult<()> {
    let stage = if is_input { "input" } else { "output" };
    match mode {
        CheckNumerics::Off => Ok(()),
        CheckNumerics::Info => {
            tracing::info!(
                routine,
                operand,
                stage,
                nan = summary.nan,
                inf = summary.inf,
                zero = summary.zero,
                "numerics"
            );
            Ok(())
        }
        CheckNumerics::Warn => {
            if !summary.is_clean() {
                tracing::warn!(routine, operand, stage, nan = summary.nan, inf = summary.inf, "non-finite values");
            }
            Ok(())
        }
        CheckNumerics::Fail => {
            if summary.is_clean() {
                Ok(())
            } else {
                Err(BlasError::Numerics {
                    routine,
                    detail: format!(
                        "{operand} {stage} has {} NaN and {} Inf values",
                        summary.nan, summary.inf
                    ),
                })
            }
        }
    }
}

/// Scans `x` and reports it if numerics checking is enabled on the handle.
#[allow(clippy::too_many_arguments)]
pub(crate) fn check_vector<T, I, B>(
    handle: &Handle,
    routine: &'static str,
    operand: &'static str,
    len: i64,
    x: B,
    inc: i64,
    batch_count: i64,
    is_input: bool,
) -> BlasResult<()>
where
    T: Element,
    I: ApiInt,
    B: BatchAddress<T>,
{
    let mode = handle.check_numerics();
    if mode == CheckNumerics::Off {
        return Ok(());
    }
    let summary = scan_vector::<T, I, B>(handle, len, x, inc, batch_count)?;
    report(mode, routine, operand, is_input, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Strided;
    use crate::buffer::{DeviceBatch, HostBatch};
    use crate::device::Device;
    use crate::error::Status;

    #[test]
    fn classify_counts_each_kind_once() {
        let counts = classify(&[0.0f64, f64::NAN, f64::INFINITY, -f64::INFINITY, 1.0]);
        assert_eq!(counts, [1, 2, 1]);
    }

    #[test]
    fn scan_sums_over_batches() {
        let device = Device::with_memory(1 << 20);
        let handle = Handle::with_device(device.clone());
        let host = HostBatch::from_vec(vec![1.0f32, f32::NAN, 0.0, f32::INFINITY], 2, 2, 2).expect("layout");
        let dev = DeviceBatch::from_host(&device, &host).expect("upload");
        let summary = scan_vector::<f32, i32, _>(&handle, 2, dev.address::<Strided<f32>>(), 1, 2).expect("scan");
        assert_eq!(summary, NumericsSummary { nan: 1, inf: 1, zero: 1 });
    }

    #[test]
    fn fail_mode_rejects_non_finite() {
        let dirty = NumericsSummary { nan: 1, inf: 0, zero: 0 };
        let err = report(CheckNumerics::Fail, "tpsv", "x", true, dirty).expect_err("nan");
        assert_eq!(err.status(), Status::CheckNumericsFail);
        assert!(report(CheckNumerics::Warn, "tpsv", "x", true, dirty).is_ok());
    }
}
