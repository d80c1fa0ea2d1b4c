use num_complex::Complex32;
use num_rs_blas::init::{init_trtri, seeded_rng};
use num_rs_blas::{
    reference, trtri, trtri_workspace_size, Device, DeviceBatch, Diagonal, Fill, Handle, HostBatch, Single, Status,
    Strided, WorkspaceSize,
};

fn handle() -> Handle {
    Handle::with_device(Device::with_memory(64 << 20))
}

#[test]
fn unit_upper_strided_batch_inverts_to_identity() {
    let handle = handle();
    let device = handle.device().clone();
    let (n, stride, batches) = (20usize, 400usize, 3usize);
    let mut ha = HostBatch::<f64>::new(n * n, stride, batches);
    init_trtri(&mut seeded_rng(), Fill::Upper, n, n, &mut ha);
    let da = DeviceBatch::from_host(&device, &ha).unwrap();
    let dinv = DeviceBatch::<f64>::new(&device, n * n, stride, batches).unwrap();

    let status = trtri::<f64, i32, _>(
        Some(&handle),
        Fill::Upper,
        Diagonal::Unit,
        n as i32,
        Strided::new(da.ptr(), stride as i64),
        n as i32,
        Strided::new(dinv.ptr(), stride as i64),
        n as i32,
        batches as i32,
    );
    assert_eq!(status, Status::Success);
    handle.synchronize().unwrap();

    let inv = dinv.to_host().unwrap();
    for b in 0..batches {
        let residual = reference::triangular_identity_residual(Fill::Upper, Diagonal::Unit, n, ha.batch(b), n, inv.batch(b), n);
        assert!(residual < 1e-12, "batch {b}: residual {residual}");
        let inv = inv.batch(b);
        for col in 0..n {
            assert_eq!(inv[col + col * n], 1.0);
            for row in col + 1..n {
                assert_eq!(inv[row + col * n], 0.0, "batch {b} ({row}, {col})");
            }
        }
    }
}

#[test]
fn blocked_lower_inverse_matches_the_oracle() {
    let handle = handle();
    let device = handle.device().clone();
    let (n, lda, ldinv) = (40usize, 43usize, 41usize);
    let mut ha = HostBatch::<Complex32>::new(lda * n, lda * n, 1);
    init_trtri(&mut seeded_rng(), Fill::Lower, n, lda, &mut ha);
    let da = DeviceBatch::from_host(&device, &ha).unwrap();
    let dinv = DeviceBatch::<Complex32>::new(&device, ldinv * n, ldinv * n, 1).unwrap();

    let status = trtri::<Complex32, i64, _>(
        Some(&handle),
        Fill::Lower,
        Diagonal::NonUnit,
        n as i64,
        Single::new(da.ptr()),
        lda as i64,
        Single::new(dinv.ptr()),
        ldinv as i64,
        1,
    );
    assert_eq!(status, Status::Success);
    handle.synchronize().unwrap();

    let actual = dinv.to_host().unwrap();
    let mut expected = vec![Complex32::new(0.0, 0.0); ldinv * n];
    reference::trtri(Fill::Lower, Diagonal::NonUnit, n, ha.as_slice(), lda, &mut expected, ldinv);
    for col in 0..n {
        for row in 0..n {
            let (e, a) = (expected[row + col * ldinv], actual.as_slice()[row + col * ldinv]);
            assert!((e - a).norm() <= 1e-4 * e.norm().max(1.0), "({row}, {col}): {e} vs {a}");
        }
    }
    let residual =
        reference::triangular_identity_residual(Fill::Lower, Diagonal::NonUnit, n, ha.as_slice(), lda, actual.as_slice(), ldinv);
    assert!(residual < 1e-3, "residual {residual}");
}

#[test]
fn fixed_workspace_must_fit_the_query() {
    let mut handle = handle();
    let device = handle.device().clone();
    let n = 48usize;
    let size = trtri_workspace_size::<f32, i32>(Some(&handle), n as i32, 2).unwrap();
    let WorkspaceSize::Bytes(bytes) = size else {
        panic!("n = {n} needs scratch memory, got {size:?}");
    };
    assert_eq!(trtri_workspace_size::<f32, i32>(Some(&handle), 16, 2), Ok(WorkspaceSize::Unchanged));

    let mut ha = HostBatch::<f32>::new(n * n, n * n, 2);
    init_trtri(&mut seeded_rng(), Fill::Upper, n, n, &mut ha);
    let da = DeviceBatch::from_host(&device, &ha).unwrap();
    let dinv = DeviceBatch::<f32>::new(&device, n * n, n * n, 2).unwrap();
    let call = |handle: &Handle| {
        trtri::<f32, i32, _>(
            Some(handle),
            Fill::Upper,
            Diagonal::NonUnit,
            n as i32,
            Strided::new(da.ptr(), (n * n) as i64),
            n as i32,
            Strided::new(dinv.ptr(), (n * n) as i64),
            n as i32,
            2,
        )
    };

    assert_eq!(handle.set_device_memory_size(bytes - 4), Status::Success);
    assert_eq!(call(&handle), Status::MemoryError);
    assert_eq!(handle.set_device_memory_size(bytes), Status::Success);
    assert_eq!(call(&handle), Status::Success);
    handle.synchronize().unwrap();
}

#[test]
fn argument_errors() {
    let handle = handle();
    let null = Single::new(num_rs_blas::DevicePtr::<f64>::null());
    let call = |uplo: Fill, n: i32, lda: i32, bc: i32| {
        trtri::<f64, i32, _>(Some(&handle), uplo, Diagonal::NonUnit, n, null, lda, null, n.max(1), bc)
    };
    assert_eq!(call(Fill::Full, 4, 4, 1), Status::InvalidValue);
    assert_eq!(call(Fill::Upper, -1, 4, 1), Status::InvalidSize);
    assert_eq!(call(Fill::Upper, 4, 3, 1), Status::InvalidSize);
    assert_eq!(call(Fill::Upper, 4, 4, -1), Status::InvalidSize);
    assert_eq!(call(Fill::Upper, 4, 4, 2), Status::InvalidSize);
    assert_eq!(call(Fill::Upper, 0, 1, 1), Status::Success);
    assert_eq!(call(Fill::Upper, 4, 4, 0), Status::Success);
    assert_eq!(call(Fill::Lower, 4, 4, 1), Status::InvalidPointer);
    assert_eq!(
        trtri::<f64, i32, _>(None, Fill::Upper, Diagonal::Unit, 4, null, 4, null, 4, 1),
        Status::InvalidHandle
    );
}
