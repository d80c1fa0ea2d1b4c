use num_complex::Complex64;
use num_rs_blas::init::{fill_random, seeded_rng};
use num_rs_blas::layout::packed_len;
use num_rs_blas::{
    hbmv, her2, hpmv, reference, spr2, tpsv, Device, DeviceBatch, Diagonal, Fill, Handle, HostBatch, Operation,
    PointerArray, PointerMode, ScalarPtr, Single, Status, Strided,
};

fn handle() -> Handle {
    Handle::with_device(Device::with_memory(64 << 20))
}

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

#[test]
fn tpsv_solves_an_upper_packed_system() {
    let handle = handle();
    let device = handle.device().clone();
    // A = [[2, 1, 0], [0, 4, 2], [0, 0, 8]], packed upper by columns.
    let ap = vec![2.0, 1.0, 4.0, 0.0, 2.0, 8.0];
    let b = vec![5.0, 16.0, 16.0];
    let dap = DeviceBatch::from_host(&device, &HostBatch::from_vec(ap, 6, 6, 1).unwrap()).unwrap();
    let dx = DeviceBatch::from_host(&device, &HostBatch::from_vec(b, 3, 3, 1).unwrap()).unwrap();
    let status = tpsv::<f64, i32, _>(
        Some(&handle),
        Fill::Upper,
        Operation::None,
        Diagonal::NonUnit,
        3,
        Single::new(dap.ptr()),
        Single::new(dx.ptr()),
        1,
        1,
    );
    assert_eq!(status, Status::Success);
    handle.synchronize().unwrap();
    assert_eq!(dx.to_host().unwrap().as_slice(), &[1.0, 3.0, 2.0]);
}

#[test]
fn tpsv_rejects_a_full_fill() {
    let handle = handle();
    let null = Single::new(num_rs_blas::DevicePtr::<f32>::null());
    let status =
        tpsv::<f32, i32, _>(Some(&handle), Fill::Full, Operation::Transpose, Diagonal::Unit, 4, null, null, 1, 1);
    assert_eq!(status, Status::InvalidValue);
}

#[test]
fn hpmv_pointer_array_batches_match_the_oracle() {
    let handle = handle();
    let device = handle.device().clone();
    let (n, batches) = (5usize, 3usize);
    let mut rng = seeded_rng();
    let mut hap = HostBatch::<Complex64>::new(packed_len(n), packed_len(n), batches);
    let mut hx = HostBatch::<Complex64>::new(n, n, batches);
    let mut hy = HostBatch::<Complex64>::new(2 * n - 1, 2 * n - 1, batches);
    fill_random(&mut rng, &mut hap);
    fill_random(&mut rng, &mut hx);
    fill_random(&mut rng, &mut hy);
    let dap = DeviceBatch::from_host(&device, &hap).unwrap();
    let dx = DeviceBatch::from_host(&device, &hx).unwrap();
    let dy = DeviceBatch::from_host(&device, &hy).unwrap();
    let (alpha, beta) = (c(2.0, -1.0), c(0.5, 0.0));

    let status = hpmv::<Complex64, i64, PointerArray<Complex64>>(
        Some(&handle),
        Fill::Lower,
        n as i64,
        ScalarPtr::Host(&alpha),
        dap.address(),
        dx.address(),
        1,
        ScalarPtr::Host(&beta),
        dy.address(),
        -2,
        batches as i64,
    );
    assert_eq!(status, Status::Success);
    handle.synchronize().unwrap();
    let actual = dy.to_host().unwrap();
    for b in 0..batches {
        let mut expected = hy.batch(b).to_vec();
        reference::hpmv(Fill::Lower, n, alpha, hap.batch(b), hx.batch(b), 1, beta, &mut expected, -2);
        assert_eq!(actual.batch(b), expected.as_slice(), "batch {b}");
    }
}

#[test]
fn hpmv_zero_alpha_unit_beta_touches_nothing() {
    let handle = handle();
    let null = Single::new(num_rs_blas::DevicePtr::<Complex64>::null());
    let (alpha, beta) = (c(0.0, 0.0), c(1.0, 0.0));
    let status = hpmv::<Complex64, i32, _>(
        Some(&handle),
        Fill::Upper,
        16,
        ScalarPtr::Host(&alpha),
        null,
        null,
        1,
        ScalarPtr::Host(&beta),
        null,
        1,
        1,
    );
    assert_eq!(status, Status::Success);
}

#[test]
fn hbmv_matches_the_oracle_for_a_wide_band() {
    let handle = handle();
    let device = handle.device().clone();
    let (n, k, lda) = (6usize, 2usize, 4usize);
    let mut rng = seeded_rng();
    let mut ha = HostBatch::<Complex64>::new(lda * n, lda * n, 1);
    let mut hx = HostBatch::<Complex64>::new(n, n, 1);
    let mut hy = HostBatch::<Complex64>::new(n, n, 1);
    fill_random(&mut rng, &mut ha);
    fill_random(&mut rng, &mut hx);
    fill_random(&mut rng, &mut hy);
    let da = DeviceBatch::from_host(&device, &ha).unwrap();
    let dx = DeviceBatch::from_host(&device, &hx).unwrap();
    let dy = DeviceBatch::from_host(&device, &hy).unwrap();
    let (alpha, beta) = (c(1.0, 1.0), c(0.0, 0.0));

    let status = hbmv::<Complex64, i32, _>(
        Some(&handle),
        Fill::Upper,
        n as i32,
        k as i32,
        ScalarPtr::Host(&alpha),
        Single::new(da.ptr()),
        lda as i32,
        Single::new(dx.ptr()),
        1,
        ScalarPtr::Host(&beta),
        Single::new(dy.ptr()),
        1,
        1,
    );
    assert_eq!(status, Status::Success);
    handle.synchronize().unwrap();

    let mut expected = hy.as_slice().to_vec();
    reference::hbmv(Fill::Upper, n, k, alpha, ha.as_slice(), lda, hx.as_slice(), 1, beta, &mut expected, 1);
    assert_eq!(dy.to_host().unwrap().as_slice(), expected.as_slice());

    let status = hbmv::<Complex64, i32, _>(
        Some(&handle),
        Fill::Upper,
        n as i32,
        k as i32,
        ScalarPtr::Host(&alpha),
        Single::new(da.ptr()),
        k as i32,
        Single::new(dx.ptr()),
        1,
        ScalarPtr::Host(&beta),
        Single::new(dy.ptr()),
        1,
        1,
    );
    assert_eq!(status, Status::InvalidSize);
}

#[test]
fn her2_with_a_device_alpha() {
    let mut handle = handle();
    let device = handle.device().clone();
    let (n, lda) = (4usize, 5usize);
    let mut rng = seeded_rng();
    let mut ha = HostBatch::<Complex64>::new(lda * n, lda * n, 1);
    let mut hx = HostBatch::<Complex64>::new(n, n, 1);
    let mut hy = HostBatch::<Complex64>::new(n, n, 1);
    fill_random(&mut rng, &mut ha);
    fill_random(&mut rng, &mut hx);
    fill_random(&mut rng, &mut hy);
    let da = DeviceBatch::from_host(&device, &ha).unwrap();
    let dx = DeviceBatch::from_host(&device, &hx).unwrap();
    let dy = DeviceBatch::from_host(&device, &hy).unwrap();
    let alpha = c(-1.0, 2.0);
    let dalpha = DeviceBatch::from_host(&device, &HostBatch::from_vec(vec![alpha], 1, 1, 1).unwrap()).unwrap();

    handle.set_pointer_mode(PointerMode::Device);
    let status = her2::<Complex64, i32, _>(
        Some(&handle),
        Fill::Lower,
        n as i32,
        ScalarPtr::Device(dalpha.ptr()),
        Single::new(dx.ptr()),
        1,
        Single::new(dy.ptr()),
        1,
        Single::new(da.ptr()),
        lda as i32,
        1,
    );
    assert_eq!(status, Status::Success);
    handle.synchronize().unwrap();

    let mut expected = ha.as_slice().to_vec();
    reference::her2(Fill::Lower, n, alpha, hx.as_slice(), 1, hy.as_slice(), 1, &mut expected, lda);
    let actual = da.to_host().unwrap();
    assert_eq!(actual.as_slice(), expected.as_slice());
    for i in 0..n {
        assert_eq!(actual.as_slice()[i + i * lda].im, 0.0);
    }
}

#[test]
fn spr2_strided_update() {
    let handle = handle();
    let device = handle.device().clone();
    let (n, batches) = (4usize, 2usize);
    let span = packed_len(n);
    let mut rng = seeded_rng();
    let mut hap = HostBatch::<f32>::new(span, span + 2, batches);
    let mut hx = HostBatch::<f32>::new(n, n, batches);
    let mut hy = HostBatch::<f32>::new(3 * n - 2, 3 * n - 2, batches);
    fill_random(&mut rng, &mut hap);
    fill_random(&mut rng, &mut hx);
    fill_random(&mut rng, &mut hy);
    let dap = DeviceBatch::from_host(&device, &hap).unwrap();
    let dx = DeviceBatch::from_host(&device, &hx).unwrap();
    let dy = DeviceBatch::from_host(&device, &hy).unwrap();
    let alpha = 3.0f32;

    let status = spr2::<f32, i32, _>(
        Some(&handle),
        Fill::Upper,
        n as i32,
        ScalarPtr::Host(&alpha),
        Strided::new(dx.ptr(), n as i64),
        1,
        Strided::new(dy.ptr(), (3 * n - 2) as i64),
        3,
        Strided::new(dap.ptr(), (span + 2) as i64),
        batches as i32,
    );
    assert_eq!(status, Status::Success);
    handle.synchronize().unwrap();

    let actual = dap.to_host().unwrap();
    for b in 0..batches {
        let mut expected = hap.batch(b).to_vec();
        reference::spr2(Fill::Upper, n, alpha, hx.batch(b), 1, hy.batch(b), 3, &mut expected);
        assert_eq!(actual.batch(b), expected.as_slice(), "batch {b}");
    }
}

#[test]
fn non_batched_calls_refuse_several_batches() {
    let handle = handle();
    let device = handle.device().clone();
    let n = 3usize;
    let dx = DeviceBatch::from_host(&device, &HostBatch::from_vec(vec![c(1.0, 0.0); n], n, n, 1).unwrap()).unwrap();
    let da = DeviceBatch::<Complex64>::new(&device, n * n, n * n, 1).unwrap();
    let dap = DeviceBatch::<Complex64>::new(&device, packed_len(n), packed_len(n), 1).unwrap();
    let (x, a, ap) = (Single::new(dx.ptr()), Single::new(da.ptr()), Single::new(dap.ptr()));
    let alpha = c(1.0, 0.0);

    let status = her2::<Complex64, i32, _>(Some(&handle), Fill::Upper, n as i32, ScalarPtr::Host(&alpha), x, 1, x, 1, a, n as i32, 2);
    assert_eq!(status, Status::InvalidSize);
    let status = tpsv::<Complex64, i64, _>(Some(&handle), Fill::Lower, Operation::None, Diagonal::Unit, n as i64, ap, x, 1, 4);
    assert_eq!(status, Status::InvalidSize);
    let scalar = ScalarPtr::Host(&alpha);
    let status = hpmv::<Complex64, i32, _>(Some(&handle), Fill::Upper, n as i32, scalar, ap, x, 1, scalar, x, 1, 2);
    assert_eq!(status, Status::InvalidSize);
    handle.synchronize().unwrap();
    assert!(da.to_host().unwrap().as_slice().iter().all(|v| *v == c(0.0, 0.0)));

    let status = her2::<Complex64, i32, _>(Some(&handle), Fill::Upper, n as i32, ScalarPtr::Host(&alpha), x, 1, x, 1, a, n as i32, 1);
    assert_eq!(status, Status::Success);
    handle.synchronize().unwrap();
    assert_eq!(da.to_host().unwrap().as_slice()[0], c(2.0, 0.0));
}
