use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::phases::{check_modes, solve_tolerance, timing_phase, BadArgs, Operand, Scalars};
use super::{flops, int, new_handle, to_usize, Arguments, HarnessError, ScenarioReport};
use crate::batch::{ApiInt, ScalarPtr};
use crate::blas2::{hbmv, her2, hpmv, spr2, tpsv};
use crate::buffer::{BindBatch, HostBatch, Shape};
use crate::compare::Tolerance;
use crate::device::Device;
use crate::element::{ComplexElement, Element, RealElement, StandardElement};
use crate::error::Status;
use crate::handle::{Handle, PointerMode};
use crate::init::init_trtri;
use crate::layout::Fill;
use crate::reference;

/// Sizes shared by every level-2 scenario, in both widths.
struct Dims<I> {
    n: usize,
    batches: usize,
    n_i: I,
    incx: I,
    incy: I,
    batch_count: I,
    zero: I,
    negative: I,
}

impl<I: TryFrom<i64>> Dims<I> {
    fn new(args: &Arguments) -> Result<Self, HarnessError> {
        Ok(Self {
            n: to_usize("n", args.n)?,
            batches: to_usize("batch_count", args.batches())?,
            n_i: int("n", args.n)?,
            incx: int("incx", args.incx)?,
            incy: int("incy", args.incy)?,
            batch_count: int("batch_count", args.batches())?,
            zero: int("zero", 0)?,
            negative: int("negative", -1)?,
        })
    }

    /// Whether a call with these sizes reaches its pointer checks.
    fn reaches_operands(&self) -> bool {
        self.n > 0 && self.batches > 0
    }
}

fn input_vector<T: Element>(
    device: &Arc<Device>,
    args: &Arguments,
    rng: &mut ChaCha8Rng,
    n: usize,
    inc: i64,
    batches: usize,
) -> Result<Operand<T>, HarnessError> {
    let span = Shape::Vector { n, inc }.span();
    Operand::random(device, rng, span, args.stride(span), batches)
}

fn output_vector<T: Element>(
    device: &Arc<Device>,
    args: &Arguments,
    rng: &mut ChaCha8Rng,
    n: usize,
    inc: i64,
    batches: usize,
) -> Result<Operand<T>, HarnessError> {
    let span = Shape::Vector { n, inc }.span();
    Operand::random(device, rng, span, args.output_stride(span), batches)
}

/// Compare layout of a strided vector: one row, `n` columns `|inc|` apart.
fn vector_layout(n: usize, inc: i64, stride: usize) -> (usize, usize, usize, usize) {
    (1, n, inc.unsigned_abs().max(1) as usize, stride)
}

pub(super) fn tpsv_scenario<T, I, B>(args: &Arguments) -> Result<ScenarioReport, HarnessError>
where
    T: StandardElement,
    I: ApiInt + TryFrom<i64>,
    B: BindBatch<T>,
{
    let mut report = ScenarioReport::new(args);
    let mut handle = new_handle();
    let device = Arc::clone(handle.device());
    let d = Dims::<I>::new(args)?;
    let (uplo, trans, diag) = (args.uplo, args.trans, args.diag);
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    // Packed copies of well-conditioned dense triangles.
    let dense_ld = d.n.max(1);
    let mut dense = HostBatch::<T>::new(d.n * dense_ld, d.n * dense_ld, d.batches);
    init_trtri(&mut rng, uplo, d.n, dense_ld, &mut dense);
    let span = Shape::Packed { n: d.n }.span();
    let mut hap = HostBatch::<T>::new(span, args.stride(span), d.batches);
    for b in 0..d.batches {
        let packed = reference::regular_to_packed(uplo, d.n, dense.batch(b), dense_ld);
        hap.batch_mut(b).copy_from_slice(&packed);
    }
    let ap = Operand::upload(&device, hap)?;
    let mut x = output_vector::<T>(&device, args, &mut rng, d.n, args.incx, d.batches)?;
    let (ap_b, x_b): (B, B) = (ap.device.address(), x.device.address());

    let mut bad = BadArgs::new("tpsv");
    for mode in [PointerMode::Host, PointerMode::Device] {
        handle.set_pointer_mode(mode);
        let h = Some(&handle);
        let status = tpsv::<T, I, B>(None, uplo, trans, diag, d.n_i, ap_b, x_b, d.incx, d.batch_count);
        bad.expect("without handle", status, Status::InvalidHandle)?;
        let status = tpsv::<T, I, B>(h, Fill::Full, trans, diag, d.n_i, ap_b, x_b, d.incx, d.batch_count);
        bad.expect("with a full fill", status, Status::InvalidValue)?;
        let status = tpsv::<T, I, B>(h, uplo, trans, diag, d.negative, ap_b, x_b, d.incx, d.batch_count);
        bad.expect("with n < 0", status, Status::InvalidSize)?;
        let status = tpsv::<T, I, B>(h, uplo, trans, diag, d.n_i, ap_b, x_b, d.zero, d.batch_count);
        bad.expect("with incx = 0", status, Status::InvalidSize)?;
        let status = tpsv::<T, I, B>(h, uplo, trans, diag, d.n_i, ap_b, x_b, d.incx, d.negative);
        bad.expect("with batch_count < 0", status, Status::InvalidSize)?;
        let status = tpsv::<T, I, B>(h, uplo, trans, diag, d.zero, B::null(), B::null(), d.incx, d.batch_count);
        bad.expect("with n = 0", status, Status::Success)?;
        let status = tpsv::<T, I, B>(h, uplo, trans, diag, d.n_i, B::null(), B::null(), d.incx, d.zero);
        bad.expect("with batch_count 0", status, Status::Success)?;
        if d.reaches_operands() {
            let status = tpsv::<T, I, B>(h, uplo, trans, diag, d.n_i, B::null(), x_b, d.incx, d.batch_count);
            bad.expect("with null AP", status, Status::InvalidPointer)?;
            let status = tpsv::<T, I, B>(h, uplo, trans, diag, d.n_i, ap_b, B::null(), d.incx, d.batch_count);
            bad.expect("with null x", status, Status::InvalidPointer)?;
        }
    }
    report.bad_arg_checks = bad.checks;

    let mut expected = x.host.clone();
    for b in 0..d.batches {
        reference::tpsv(uplo, trans, diag, d.n, ap.host.batch(b), expected.batch_mut(b), args.incx);
    }
    let tolerance = solve_tolerance::<T>(d.n, expected.as_slice());
    let layout = vector_layout(d.n, args.incx, x.host.stride());
    let call =
        |h: &Handle, _: PointerMode| tpsv::<T, I, B>(Some(h), uplo, trans, diag, d.n_i, ap_b, x_b, d.incx, d.batch_count);
    check_modes(args, &mut handle, &mut x, &expected, tolerance, layout, &mut report, call)?;
    ap.device.memcheck()?;

    let work = flops::tpsv(T::DTYPE, d.n) * d.batches as f64;
    timing_phase(args, &mut handle, work, &mut report, call)?;
    Ok(report)
}

pub(super) fn hpmv_scenario<T, I, B>(args: &Arguments) -> Result<ScenarioReport, HarnessError>
where
    T: ComplexElement,
    I: ApiInt + TryFrom<i64>,
    B: BindBatch<T>,
{
    let mut report = ScenarioReport::new(args);
    let mut handle = new_handle();
    let device = Arc::clone(handle.device());
    let d = Dims::<I>::new(args)?;
    let uplo = args.uplo;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    let span = Shape::Packed { n: d.n }.span();
    let ap = Operand::<T>::random(&device, &mut rng, span, args.stride(span), d.batches)?;
    let x = input_vector::<T>(&device, args, &mut rng, d.n, args.incx, d.batches)?;
    let mut y = output_vector::<T>(&device, args, &mut rng, d.n, args.incy, d.batches)?;
    let (ap_b, x_b, y_b): (B, B, B) = (ap.device.address(), x.device.address(), y.device.address());
    let scalars = Scalars::<T>::from_args(&device, args)?;
    let arg_scalars = Scalars::new(&device, T::from_parts(1.0, 0.0), T::from_parts(2.0, 0.0))?;
    let identity = Scalars::new(&device, T::from_parts(0.0, 0.0), T::from_parts(1.0, 0.0))?;
    let null = B::null;

    let mut bad = BadArgs::new("hpmv");
    for mode in [PointerMode::Host, PointerMode::Device] {
        handle.set_pointer_mode(mode);
        let h = Some(&handle);
        let (alpha, beta) = (arg_scalars.alpha(mode), arg_scalars.beta(mode));
        let (n, incx, incy, bc) = (d.n_i, d.incx, d.incy, d.batch_count);
        let status = hpmv::<T, I, B>(None, uplo, n, alpha, ap_b, x_b, incx, beta, y_b, incy, bc);
        bad.expect("without handle", status, Status::InvalidHandle)?;
        let status = hpmv::<T, I, B>(h, Fill::Full, n, alpha, ap_b, x_b, incx, beta, y_b, incy, bc);
        bad.expect("with a full fill", status, Status::InvalidValue)?;
        let status = hpmv::<T, I, B>(h, uplo, d.negative, alpha, ap_b, x_b, incx, beta, y_b, incy, bc);
        bad.expect("with n < 0", status, Status::InvalidSize)?;
        let status = hpmv::<T, I, B>(h, uplo, n, alpha, ap_b, x_b, d.zero, beta, y_b, incy, bc);
        bad.expect("with incx = 0", status, Status::InvalidSize)?;
        let status = hpmv::<T, I, B>(h, uplo, n, alpha, ap_b, x_b, incx, beta, y_b, d.zero, bc);
        bad.expect("with incy = 0", status, Status::InvalidSize)?;
        let status = hpmv::<T, I, B>(h, uplo, d.zero, ScalarPtr::Null, null(), null(), incx, ScalarPtr::Null, null(), incy, bc);
        bad.expect("with n = 0", status, Status::Success)?;
        let status = hpmv::<T, I, B>(h, uplo, n, ScalarPtr::Null, null(), null(), incx, ScalarPtr::Null, null(), incy, d.zero);
        bad.expect("with batch_count 0", status, Status::Success)?;
        if d.reaches_operands() {
            let status = hpmv::<T, I, B>(h, uplo, n, ScalarPtr::Null, ap_b, x_b, incx, beta, y_b, incy, bc);
            bad.expect("with null alpha", status, Status::InvalidPointer)?;
            let status = hpmv::<T, I, B>(h, uplo, n, alpha, ap_b, x_b, incx, ScalarPtr::Null, y_b, incy, bc);
            bad.expect("with null beta", status, Status::InvalidPointer)?;
            let status = hpmv::<T, I, B>(h, uplo, n, arg_scalars.misplaced_alpha(mode), ap_b, x_b, incx, beta, y_b, incy, bc);
            bad.expect("with alpha in the wrong memory space", status, Status::InvalidPointer)?;
            let status = hpmv::<T, I, B>(h, uplo, n, alpha, null(), x_b, incx, beta, y_b, incy, bc);
            bad.expect("with null AP", status, Status::InvalidPointer)?;
            let status = hpmv::<T, I, B>(h, uplo, n, alpha, ap_b, null(), incx, beta, y_b, incy, bc);
            bad.expect("with null x", status, Status::InvalidPointer)?;
            let status = hpmv::<T, I, B>(h, uplo, n, alpha, ap_b, x_b, incx, beta, null(), incy, bc);
            bad.expect("with null y", status, Status::InvalidPointer)?;
            if mode == PointerMode::Host {
                let (zero_alpha, unit_beta) = (identity.alpha(mode), identity.beta(mode));
                let status = hpmv::<T, I, B>(h, uplo, n, zero_alpha, null(), null(), incx, unit_beta, null(), incy, bc);
                bad.expect("with alpha = 0 and beta = 1", status, Status::Success)?;
            }
        }
    }
    report.bad_arg_checks = bad.checks;

    let (alpha, beta) = (scalars.alpha_value(), scalars.beta_value());
    let mut expected = y.host.clone();
    for b in 0..d.batches {
        reference::hpmv(
            uplo,
            d.n,
            alpha,
            ap.host.batch(b),
            x.host.batch(b),
            args.incx,
            beta,
            expected.batch_mut(b),
            args.incy,
        );
    }
    let layout = vector_layout(d.n, args.incy, y.host.stride());
    let call = |h: &Handle, mode: PointerMode| {
        hpmv::<T, I, B>(
            Some(h),
            uplo,
            d.n_i,
            scalars.alpha(mode),
            ap_b,
            x_b,
            d.incx,
            scalars.beta(mode),
            y_b,
            d.incy,
            d.batch_count,
        )
    };
    check_modes(args, &mut handle, &mut y, &expected, Tolerance::Unit, layout, &mut report, call)?;
    ap.device.memcheck()?;
    x.device.memcheck()?;

    let work = flops::hpmv(T::DTYPE, d.n) * d.batches as f64;
    timing_phase(args, &mut handle, work, &mut report, call)?;
    Ok(report)
}

pub(super) fn hbmv_scenario<T, I, B>(args: &Arguments) -> Result<ScenarioReport, HarnessError>
where
    T: ComplexElement,
    I: ApiInt + TryFrom<i64>,
    B: BindBatch<T>,
{
    let mut report = ScenarioReport::new(args);
    let mut handle = new_handle();
    let device = Arc::clone(handle.device());
    let d = Dims::<I>::new(args)?;
    let uplo = args.uplo;
    let k = to_usize("k", args.k)?;
    let lda_value = args.lda_or(args.k + 1);
    let lda = to_usize("lda", lda_value)?;
    let (k_i, lda_i, short_lda): (I, I, I) = (int("k", args.k)?, int("lda", lda_value)?, int("lda", args.k)?);
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    let span = Shape::Matrix { rows: k + 1, cols: d.n, ld: lda }.span();
    let a = Operand::<T>::random(&device, &mut rng, span, args.stride(span), d.batches)?;
    let x = input_vector::<T>(&device, args, &mut rng, d.n, args.incx, d.batches)?;
    let mut y = output_vector::<T>(&device, args, &mut rng, d.n, args.incy, d.batches)?;
    let (a_b, x_b, y_b): (B, B, B) = (a.device.address(), x.device.address(), y.device.address());
    let scalars = Scalars::<T>::from_args(&device, args)?;
    let arg_scalars = Scalars::new(&device, T::from_parts(1.0, 0.0), T::from_parts(2.0, 0.0))?;
    let identity = Scalars::new(&device, T::from_parts(0.0, 0.0), T::from_parts(1.0, 0.0))?;
    let null = B::null;

    let mut bad = BadArgs::new("hbmv");
    for mode in [PointerMode::Host, PointerMode::Device] {
        handle.set_pointer_mode(mode);
        let h = Some(&handle);
        let (alpha, beta) = (arg_scalars.alpha(mode), arg_scalars.beta(mode));
        let (n, incx, incy, bc) = (d.n_i, d.incx, d.incy, d.batch_count);
        let status = hbmv::<T, I, B>(None, uplo, n, k_i, alpha, a_b, lda_i, x_b, incx, beta, y_b, incy, bc);
        bad.expect("without handle", status, Status::InvalidHandle)?;
        let status = hbmv::<T, I, B>(h, Fill::Full, n, k_i, alpha, a_b, lda_i, x_b, incx, beta, y_b, incy, bc);
        bad.expect("with a full fill", status, Status::InvalidValue)?;
        let status = hbmv::<T, I, B>(h, uplo, d.negative, k_i, alpha, a_b, lda_i, x_b, incx, beta, y_b, incy, bc);
        bad.expect("with n < 0", status, Status::InvalidSize)?;
        let status = hbmv::<T, I, B>(h, uplo, n, d.negative, alpha, a_b, lda_i, x_b, incx, beta, y_b, incy, bc);
        bad.expect("with k < 0", status, Status::InvalidSize)?;
        let status = hbmv::<T, I, B>(h, uplo, n, k_i, alpha, a_b, short_lda, x_b, incx, beta, y_b, incy, bc);
        bad.expect("with lda < k + 1", status, Status::InvalidSize)?;
        let status = hbmv::<T, I, B>(h, uplo, n, k_i, alpha, a_b, lda_i, x_b, d.zero, beta, y_b, incy, bc);
        bad.expect("with incx = 0", status, Status::InvalidSize)?;
        let status = hbmv::<T, I, B>(h, uplo, n, k_i, alpha, a_b, lda_i, x_b, incx, beta, y_b, d.zero, bc);
        bad.expect("with incy = 0", status, Status::InvalidSize)?;
        let status = hbmv::<T, I, B>(
            h,
            uplo,
            d.zero,
            k_i,
            ScalarPtr::Null,
            null(),
            lda_i,
            null(),
            incx,
            ScalarPtr::Null,
            null(),
            incy,
            bc,
        );
        bad.expect("with n = 0", status, Status::Success)?;
        if d.reaches_operands() {
            let status = hbmv::<T, I, B>(h, uplo, n, k_i, ScalarPtr::Null, a_b, lda_i, x_b, incx, beta, y_b, incy, bc);
            bad.expect("with null alpha", status, Status::InvalidPointer)?;
            let status = hbmv::<T, I, B>(h, uplo, n, k_i, alpha, a_b, lda_i, x_b, incx, ScalarPtr::Null, y_b, incy, bc);
            bad.expect("with null beta", status, Status::InvalidPointer)?;
            let misplaced = arg_scalars.misplaced_alpha(mode);
            let status = hbmv::<T, I, B>(h, uplo, n, k_i, misplaced, a_b, lda_i, x_b, incx, beta, y_b, incy, bc);
            bad.expect("with alpha in the wrong memory space", status, Status::InvalidPointer)?;
            let status = hbmv::<T, I, B>(h, uplo, n, k_i, alpha, null(), lda_i, x_b, incx, beta, y_b, incy, bc);
            bad.expect("with null A", status, Status::InvalidPointer)?;
            let status = hbmv::<T, I, B>(h, uplo, n, k_i, alpha, a_b, lda_i, x_b, incx, beta, null(), incy, bc);
            bad.expect("with null y", status, Status::InvalidPointer)?;
            if mode == PointerMode::Host {
                let (zero_alpha, unit_beta) = (identity.alpha(mode), identity.beta(mode));
                let status =
                    hbmv::<T, I, B>(h, uplo, n, k_i, zero_alpha, null(), lda_i, null(), incx, unit_beta, null(), incy, bc);
                bad.expect("with alpha = 0 and beta = 1", status, Status::Success)?;
            }
        }
    }
    report.bad_arg_checks = bad.checks;

    let (alpha, beta) = (scalars.alpha_value(), scalars.beta_value());
    let mut expected = y.host.clone();
    for b in 0..d.batches {
        reference::hbmv(
            uplo,
            d.n,
            k,
            alpha,
            a.host.batch(b),
            lda,
            x.host.batch(b),
            args.incx,
            beta,
            expected.batch_mut(b),
            args.incy,
        );
    }
    let layout = vector_layout(d.n, args.incy, y.host.stride());
    let call = |h: &Handle, mode: PointerMode| {
        hbmv::<T, I, B>(
            Some(h),
            uplo,
            d.n_i,
            k_i,
            scalars.alpha(mode),
            a_b,
            lda_i,
            x_b,
            d.incx,
            scalars.beta(mode),
            y_b,
            d.incy,
            d.batch_count,
        )
    };
    check_modes(args, &mut handle, &mut y, &expected, Tolerance::Unit, layout, &mut report, call)?;
    a.device.memcheck()?;
    x.device.memcheck()?;

    let work = flops::hbmv(T::DTYPE, d.n, k) * d.batches as f64;
    timing_phase(args, &mut handle, work, &mut report, call)?;
    Ok(report)
}

pub(super) fn her2_scenario<T, I, B>(args: &Arguments) -> Result<ScenarioReport, HarnessError>
where
    T: ComplexElement,
    I: ApiInt + TryFrom<i64>,
    B: BindBatch<T>,
{
    let mut report = ScenarioReport::new(args);
    let mut handle = new_handle();
    let device = Arc::clone(handle.device());
    let d = Dims::<I>::new(args)?;
    let uplo = args.uplo;
    let lda_value = args.lda_or(args.n);
    let lda = to_usize("lda", lda_value)?;
    let lda_i: I = int("lda", lda_value)?;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    let x = input_vector::<T>(&device, args, &mut rng, d.n, args.incx, d.batches)?;
    let y = input_vector::<T>(&device, args, &mut rng, d.n, args.incy, d.batches)?;
    let span = Shape::Matrix { rows: d.n, cols: d.n, ld: lda }.span();
    let mut a = Operand::<T>::random(&device, &mut rng, span, args.output_stride(span), d.batches)?;
    let (x_b, y_b, a_b): (B, B, B) = (x.device.address(), y.device.address(), a.device.address());
    let scalars = Scalars::<T>::from_args(&device, args)?;
    let arg_scalars = Scalars::new(&device, T::from_parts(1.0, 1.0), T::from_parts(0.0, 0.0))?;
    let zero = Scalars::new(&device, T::from_parts(0.0, 0.0), T::from_parts(0.0, 0.0))?;
    let null = B::null;

    let mut bad = BadArgs::new("her2");
    for mode in [PointerMode::Host, PointerMode::Device] {
        handle.set_pointer_mode(mode);
        let h = Some(&handle);
        let alpha = arg_scalars.alpha(mode);
        let (n, incx, incy, bc) = (d.n_i, d.incx, d.incy, d.batch_count);
        let status = her2::<T, I, B>(None, uplo, n, alpha, x_b, incx, y_b, incy, a_b, lda_i, bc);
        bad.expect("without handle", status, Status::InvalidHandle)?;
        let status = her2::<T, I, B>(h, Fill::Full, n, alpha, x_b, incx, y_b, incy, a_b, lda_i, bc);
        bad.expect("with a full fill", status, Status::InvalidValue)?;
        let status = her2::<T, I, B>(h, uplo, d.negative, alpha, x_b, incx, y_b, incy, a_b, lda_i, bc);
        bad.expect("with n < 0", status, Status::InvalidSize)?;
        let status = her2::<T, I, B>(h, uplo, n, alpha, x_b, d.zero, y_b, incy, a_b, lda_i, bc);
        bad.expect("with incx = 0", status, Status::InvalidSize)?;
        let status = her2::<T, I, B>(h, uplo, n, alpha, x_b, incx, y_b, d.zero, a_b, lda_i, bc);
        bad.expect("with incy = 0", status, Status::InvalidSize)?;
        if d.n > 1 {
            let short_lda: I = int("lda", args.n - 1)?;
            let status = her2::<T, I, B>(h, uplo, n, alpha, x_b, incx, y_b, incy, a_b, short_lda, bc);
            bad.expect("with lda < n", status, Status::InvalidSize)?;
        }
        let status = her2::<T, I, B>(h, uplo, d.zero, ScalarPtr::Null, null(), incx, null(), incy, null(), lda_i, bc);
        bad.expect("with n = 0", status, Status::Success)?;
        let status = her2::<T, I, B>(h, uplo, n, ScalarPtr::Null, null(), incx, null(), incy, null(), lda_i, d.zero);
        bad.expect("with batch_count 0", status, Status::Success)?;
        if d.reaches_operands() {
            let status = her2::<T, I, B>(h, uplo, n, ScalarPtr::Null, x_b, incx, y_b, incy, a_b, lda_i, bc);
            bad.expect("with null alpha", status, Status::InvalidPointer)?;
            let misplaced = arg_scalars.misplaced_alpha(mode);
            let status = her2::<T, I, B>(h, uplo, n, misplaced, x_b, incx, y_b, incy, a_b, lda_i, bc);
            bad.expect("with alpha in the wrong memory space", status, Status::InvalidPointer)?;
            if mode == PointerMode::Host {
                let status = her2::<T, I, B>(h, uplo, n, alpha, null(), incx, y_b, incy, a_b, lda_i, bc);
                bad.expect("with null x", status, Status::InvalidPointer)?;
                let status = her2::<T, I, B>(h, uplo, n, alpha, x_b, incx, null(), incy, a_b, lda_i, bc);
                bad.expect("with null y", status, Status::InvalidPointer)?;
                let status = her2::<T, I, B>(h, uplo, n, alpha, x_b, incx, y_b, incy, null(), lda_i, bc);
                bad.expect("with null A", status, Status::InvalidPointer)?;
                let status = her2::<T, I, B>(h, uplo, n, zero.alpha(mode), null(), incx, null(), incy, null(), lda_i, bc);
                bad.expect("with alpha = 0", status, Status::Success)?;
            }
        }
    }
    report.bad_arg_checks = bad.checks;

    let alpha = scalars.alpha_value();
    let mut expected = a.host.clone();
    for b in 0..d.batches {
        reference::her2(
            uplo,
            d.n,
            alpha,
            x.host.batch(b),
            args.incx,
            y.host.batch(b),
            args.incy,
            expected.batch_mut(b),
            lda,
        );
    }
    let layout = (d.n, d.n, lda, a.host.stride());
    let call = |h: &Handle, mode: PointerMode| {
        her2::<T, I, B>(
            Some(h),
            uplo,
            d.n_i,
            scalars.alpha(mode),
            x_b,
            d.incx,
            y_b,
            d.incy,
            a_b,
            lda_i,
            d.batch_count,
        )
    };
    check_modes(args, &mut handle, &mut a, &expected, Tolerance::Unit, layout, &mut report, call)?;
    x.device.memcheck()?;
    y.device.memcheck()?;

    let work = flops::rank2(T::DTYPE, d.n) * d.batches as f64;
    timing_phase(args, &mut handle, work, &mut report, call)?;
    Ok(report)
}

pub(super) fn spr2_scenario<T, I, B>(args: &Arguments) -> Result<ScenarioReport, HarnessError>
where
    T: RealElement,
    I: ApiInt + TryFrom<i64>,
    B: BindBatch<T>,
{
    let mut report = ScenarioReport::new(args);
    let mut handle = new_handle();
    let device = Arc::clone(handle.device());
    let d = Dims::<I>::new(args)?;
    let uplo = args.uplo;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);

    let x = input_vector::<T>(&device, args, &mut rng, d.n, args.incx, d.batches)?;
    let y = input_vector::<T>(&device, args, &mut rng, d.n, args.incy, d.batches)?;
    let span = Shape::Packed { n: d.n }.span();
    let mut ap = Operand::<T>::random(&device, &mut rng, span, args.output_stride(span), d.batches)?;
    let (x_b, y_b, ap_b): (B, B, B) = (x.device.address(), y.device.address(), ap.device.address());
    let scalars = Scalars::<T>::from_args(&device, args)?;
    let arg_scalars = Scalars::new(&device, T::from_parts(2.0, 0.0), T::from_parts(0.0, 0.0))?;
    let zero = Scalars::new(&device, T::from_parts(0.0, 0.0), T::from_parts(0.0, 0.0))?;
    let null = B::null;

    let mut bad = BadArgs::new("spr2");
    for mode in [PointerMode::Host, PointerMode::Device] {
        handle.set_pointer_mode(mode);
        let h = Some(&handle);
        let alpha = arg_scalars.alpha(mode);
        let (n, incx, incy, bc) = (d.n_i, d.incx, d.incy, d.batch_count);
        let status = spr2::<T, I, B>(None, uplo, n, alpha, x_b, incx, y_b, incy, ap_b, bc);
        bad.expect("without handle", status, Status::InvalidHandle)?;
        let status = spr2::<T, I, B>(h, Fill::Full, n, alpha, x_b, incx, y_b, incy, ap_b, bc);
        bad.expect("with a full fill", status, Status::InvalidValue)?;
        let status = spr2::<T, I, B>(h, uplo, d.negative, alpha, x_b, incx, y_b, incy, ap_b, bc);
        bad.expect("with n < 0", status, Status::InvalidSize)?;
        let status = spr2::<T, I, B>(h, uplo, n, alpha, x_b, d.zero, y_b, incy, ap_b, bc);
        bad.expect("with incx = 0", status, Status::InvalidSize)?;
        let status = spr2::<T, I, B>(h, uplo, n, alpha, x_b, incx, y_b, d.zero, ap_b, bc);
        bad.expect("with incy = 0", status, Status::InvalidSize)?;
        let status = spr2::<T, I, B>(h, uplo, d.zero, ScalarPtr::Null, null(), incx, null(), incy, null(), bc);
        bad.expect("with n = 0", status, Status::Success)?;
        let status = spr2::<T, I, B>(h, uplo, n, ScalarPtr::Null, null(), incx, null(), incy, null(), d.zero);
        bad.expect("with batch_count 0", status, Status::Success)?;
        if d.reaches_operands() {
            let status = spr2::<T, I, B>(h, uplo, n, ScalarPtr::Null, x_b, incx, y_b, incy, ap_b, bc);
            bad.expect("with null alpha", status, Status::InvalidPointer)?;
            let status = spr2::<T, I, B>(h, uplo, n, arg_scalars.misplaced_alpha(mode), x_b, incx, y_b, incy, ap_b, bc);
            bad.expect("with alpha in the wrong memory space", status, Status::InvalidPointer)?;
            if mode == PointerMode::Host {
                let status = spr2::<T, I, B>(h, uplo, n, alpha, null(), incx, y_b, incy, ap_b, bc);
                bad.expect("with null x", status, Status::InvalidPointer)?;
                let status = spr2::<T, I, B>(h, uplo, n, alpha, x_b, incx, null(), incy, ap_b, bc);
                bad.expect("with null y", status, Status::InvalidPointer)?;
                let status = spr2::<T, I, B>(h, uplo, n, alpha, x_b, incx, y_b, incy, null(), bc);
                bad.expect("with null AP", status, Status::InvalidPointer)?;
                let status = spr2::<T, I, B>(h, uplo, n, zero.alpha(mode), null(), incx, null(), incy, null(), bc);
                bad.expect("with alpha = 0", status, Status::Success)?;
            }
        }
    }
    report.bad_arg_checks = bad.checks;

    let alpha = scalars.alpha_value();
    let mut expected = ap.host.clone();
    for b in 0..d.batches {
        reference::spr2(
            uplo,
            d.n,
            alpha,
            x.host.batch(b),
            args.incx,
            y.host.batch(b),
            args.incy,
            expected.batch_mut(b),
        );
    }
    let layout = (1, span, 1, ap.host.stride());
    let call = |h: &Handle, mode: PointerMode| {
        spr2::<T, I, B>(Some(h), uplo, d.n_i, scalars.alpha(mode), x_b, d.incx, y_b, d.incy, ap_b, d.batch_count)
    };
    check_modes(args, &mut handle, &mut ap, &expected, Tolerance::Unit, layout, &mut report, call)?;
    x.device.memcheck()?;
    y.device.memcheck()?;

    let work = flops::rank2(T::DTYPE, d.n) * d.batches as f64;
    timing_phase(args, &mut handle, work, &mut report, call)?;
    Ok(report)
}
