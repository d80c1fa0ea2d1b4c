use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::phases::{check_modes, solve_tolerance, timing_phase, BadArgs, Operand};
use super::{expect_status, flops, int, new_handle, to_usize, Arguments, HarnessError, ScenarioReport};
use crate::batch::ApiInt;
use crate::blas3::{trtri, trtri_workspace_size};
use crate::buffer::{BindBatch, HostBatch, Shape};
use crate::compare::{CheckFailure, NormType};
use crate::element::StandardElement;
use crate::error::Status;
use crate::handle::{Handle, PointerMode, WorkspaceSize};
use crate::init::{fill_random, init_trtri};
use crate::layout::Fill;
use crate::reference;

/// Largest acceptable `||A * inv(A) - I||_F` for an `n`-by-`n` inverse.
fn residual_tolerance<T: StandardElement>(n: usize) -> f64 {
    10f64.powi(2 - T::DIGITS10) * n.max(1) as f64
}

pub(super) fn trtri_scenario<T, I, B>(args: &Arguments) -> Result<ScenarioReport, HarnessError>
where
    T: StandardElement,
    I: ApiInt + TryFrom<i64>,
    B: BindBatch<T>,
{
    let mut report = ScenarioReport::new(args);
    let mut handle = new_handle();
    let device = Arc::clone(handle.device());
    let (uplo, diag) = (args.uplo, args.diag);
    let n = to_usize("n", args.n)?;
    let batches = to_usize("batch_count", args.batches())?;
    let (lda_value, ldinv_value) = (args.lda_or(args.n), args.ldb_or(args.n));
    let (lda, ldinv) = (to_usize("lda", lda_value)?, to_usize("ldinvA", ldinv_value)?);
    let (n_i, lda_i, ldinv_i, batch_count): (I, I, I, I) = (
        int("n", args.n)?,
        int("lda", lda_value)?,
        int("ldinvA", ldinv_value)?,
        int("batch_count", args.batches())?,
    );
    let (zero, negative): (I, I) = (int("zero", 0)?, int("negative", -1)?);
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    let a_span = Shape::Matrix { rows: n, cols: n, ld: lda }.span();
    let mut ha = HostBatch::<T>::new(a_span, args.stride(a_span), batches);
    init_trtri(&mut rng, uplo, n, lda, &mut ha);
    let a = Operand::upload(&device, ha)?;
    let inv_span = Shape::Matrix { rows: n, cols: n, ld: ldinv }.span();
    let mut hinv = HostBatch::<T>::new(inv_span, args.output_stride(inv_span), batches);
    fill_random(&mut rng, &mut hinv);
    let mut inv = Operand::upload(&device, hinv)?;
    let (a_b, inv_b): (B, B) = (a.device.address(), inv.device.address());

    match trtri_workspace_size::<T, I>(Some(&handle), n_i, batch_count) {
        Ok(WorkspaceSize::Bytes(bytes)) => {
            expect_status("trtri workspace reservation", handle.set_device_memory_size(bytes), Status::Success)?;
        }
        Ok(WorkspaceSize::Unchanged) => {}
        Err(status) => expect_status("trtri_workspace_size", status, Status::Success)?,
    }

    let mut bad = BadArgs::new("trtri");
    let no_handle = trtri_workspace_size::<T, I>(None, n_i, batch_count).err().unwrap_or(Status::Success);
    bad.expect("workspace query without handle", no_handle, Status::InvalidHandle)?;
    for mode in [PointerMode::Host, PointerMode::Device] {
        handle.set_pointer_mode(mode);
        let h = Some(&handle);
        let status = trtri::<T, I, B>(None, uplo, diag, n_i, a_b, lda_i, inv_b, ldinv_i, batch_count);
        bad.expect("without handle", status, Status::InvalidHandle)?;
        let status = trtri::<T, I, B>(h, Fill::Full, diag, n_i, a_b, lda_i, inv_b, ldinv_i, batch_count);
        bad.expect("with a full fill", status, Status::InvalidValue)?;
        let status = trtri::<T, I, B>(h, uplo, diag, negative, a_b, lda_i, inv_b, ldinv_i, batch_count);
        bad.expect("with n < 0", status, Status::InvalidSize)?;
        let status = trtri::<T, I, B>(h, uplo, diag, n_i, a_b, lda_i, inv_b, ldinv_i, negative);
        bad.expect("with batch_count < 0", status, Status::InvalidSize)?;
        if n > 0 {
            let short: I = int("lda", args.n - 1)?;
            let status = trtri::<T, I, B>(h, uplo, diag, n_i, a_b, short, inv_b, ldinv_i, batch_count);
            bad.expect("with lda < n", status, Status::InvalidSize)?;
            let status = trtri::<T, I, B>(h, uplo, diag, n_i, a_b, lda_i, inv_b, short, batch_count);
            bad.expect("with ldinvA < n", status, Status::InvalidSize)?;
        }
        let status = trtri::<T, I, B>(h, uplo, diag, zero, B::null(), lda_i, B::null(), ldinv_i, batch_count);
        bad.expect("with n = 0", status, Status::Success)?;
        let status = trtri::<T, I, B>(h, uplo, diag, n_i, B::null(), lda_i, B::null(), ldinv_i, zero);
        bad.expect("with batch_count 0", status, Status::Success)?;
        if n > 0 && batches > 0 {
            let status = trtri::<T, I, B>(h, uplo, diag, n_i, B::null(), lda_i, inv_b, ldinv_i, batch_count);
            bad.expect("with null A", status, Status::InvalidPointer)?;
            let status = trtri::<T, I, B>(h, uplo, diag, n_i, a_b, lda_i, B::null(), ldinv_i, batch_count);
            bad.expect("with null invA", status, Status::InvalidPointer)?;
        }
    }
    report.bad_arg_checks = bad.checks;

    let mut expected = inv.host.clone();
    for b in 0..batches {
        reference::trtri(uplo, diag, n, a.host.batch(b), lda, expected.batch_mut(b), ldinv);
    }
    let tolerance = solve_tolerance::<T>(n, expected.as_slice());
    let layout = (n, n, ldinv, inv.host.stride());
    let call = |h: &Handle, _: PointerMode| {
        trtri::<T, I, B>(Some(h), uplo, diag, n_i, a_b, lda_i, inv_b, ldinv_i, batch_count)
    };
    check_modes(args, &mut handle, &mut inv, &expected, tolerance, layout, &mut report, call)?;
    a.device.memcheck()?;

    // The last run left the inverses on the device.
    let ran = args.pointer_mode_host || args.pointer_mode_device || args.repeatability > 0;
    let actual = inv.device.to_host()?;
    let limit = residual_tolerance::<T>(n);
    for b in (0..batches).filter(|_| ran) {
        let residual =
            reference::triangular_identity_residual(uplo, diag, n, a.host.batch(b), lda, actual.batch(b), ldinv);
        if residual.is_nan() || residual > limit {
            return Err(HarnessError::Check {
                phase: "identity residual",
                failure: CheckFailure::Norm {
                    norm: NormType::Frobenius,
                    error: residual,
                    tolerance: limit,
                },
            });
        }
    }

    let work = flops::trtri(T::DTYPE, n) * batches as f64;
    timing_phase(args, &mut handle, work, &mut report, call)?;
    Ok(report)
}
