use num_complex::Complex32;
use num_rs_blas::{
    dot, dot_workspace_size, dotc, nrm2, nrm2_workspace_size, reference, Device, DeviceBatch, Handle, HostBatch,
    PointerMode, ResultPtr, Single, Status, Strided, WorkspaceSize,
};

fn handle() -> Handle {
    Handle::with_device(Device::with_memory(64 << 20))
}

fn relative(expected: f64, actual: f64) -> f64 {
    (expected - actual).abs() / expected.abs().max(f64::MIN_POSITIVE)
}

#[test]
fn dot_of_one_hundred_doubles_in_both_pointer_modes() {
    let mut handle = handle();
    let device = handle.device().clone();
    let xs: Vec<f64> = (0..100).map(|i| 1.0 + i as f64 / 7.0).collect();
    let ys: Vec<f64> = (0..100).map(|i| 0.5 - i as f64 / 13.0).collect();
    let expected: f64 = xs.iter().zip(&ys).map(|(x, y)| x * y).sum();
    let dx = DeviceBatch::from_host(&device, &HostBatch::from_vec(xs, 100, 100, 1).unwrap()).unwrap();
    let dy = DeviceBatch::from_host(&device, &HostBatch::from_vec(ys, 100, 100, 1).unwrap()).unwrap();
    let (x, y) = (Single::new(dx.ptr()), Single::new(dy.ptr()));

    let mut host = [0.0f64];
    let status = dot::<f64, i32, _>(Some(&handle), 100, x, 1, y, 1, 1, ResultPtr::Host(&mut host));
    assert_eq!(status, Status::Success);
    assert!(relative(expected, host[0]) < 1e-12, "{} vs {expected}", host[0]);

    handle.set_pointer_mode(PointerMode::Device);
    let result = DeviceBatch::<f64>::new(&device, 1, 1, 1).unwrap();
    let status = dot::<f64, i64, _>(Some(&handle), 100, x, 1, y, 1, 1, ResultPtr::Device(result.ptr()));
    assert_eq!(status, Status::Success);
    handle.synchronize().unwrap();
    let device_value = result.to_host().unwrap().as_slice()[0];
    assert!(relative(expected, device_value) < 1e-12);
    assert_eq!(device_value.to_bits(), host[0].to_bits());
}

#[test]
fn strided_batches_with_negative_increments() {
    let handle = handle();
    let device = handle.device().clone();
    let (n, inc, batches) = (5usize, -2i64, 3usize);
    let span = (n - 1) * 2 + 1;
    let stride = span + 3;
    let mut hx = HostBatch::<f32>::new(span, stride, batches);
    let mut hy = HostBatch::<f32>::new(span, stride, batches);
    for b in 0..batches {
        for (i, v) in hx.batch_mut(b).iter_mut().enumerate() {
            *v = (i + b) as f32;
        }
        for (i, v) in hy.batch_mut(b).iter_mut().enumerate() {
            *v = 1.0 + (i % 3) as f32;
        }
    }
    let dx = DeviceBatch::from_host(&device, &hx).unwrap();
    let dy = DeviceBatch::from_host(&device, &hy).unwrap();

    let mut results = vec![0.0f32; batches];
    let status = dot::<f32, i32, _>(
        Some(&handle),
        n as i32,
        Strided::new(dx.ptr(), stride as i64),
        inc as i32,
        Strided::new(dy.ptr(), stride as i64),
        1,
        batches as i32,
        ResultPtr::Host(&mut results),
    );
    assert_eq!(status, Status::Success);
    for b in 0..batches {
        let expected = reference::dot(n, hx.batch(b), inc, hy.batch(b), 1, false);
        assert_eq!(results[b], expected, "batch {b}");
    }
}

#[test]
fn dotc_conjugates_the_first_operand() {
    let handle = handle();
    let device = handle.device().clone();
    let xs = vec![Complex32::new(1.0, 2.0), Complex32::new(0.0, -1.0)];
    let ys = vec![Complex32::new(3.0, 0.0), Complex32::new(1.0, 1.0)];
    let dx = DeviceBatch::from_host(&device, &HostBatch::from_vec(xs, 2, 2, 1).unwrap()).unwrap();
    let dy = DeviceBatch::from_host(&device, &HostBatch::from_vec(ys, 2, 2, 1).unwrap()).unwrap();
    let (x, y) = (Single::new(dx.ptr()), Single::new(dy.ptr()));

    let mut plain = [Complex32::new(0.0, 0.0)];
    let mut conjugated = [Complex32::new(0.0, 0.0)];
    assert_eq!(dot::<_, i32, _>(Some(&handle), 2, x, 1, y, 1, 1, ResultPtr::Host(&mut plain)), Status::Success);
    assert_eq!(dotc::<_, i32, _>(Some(&handle), 2, x, 1, y, 1, 1, ResultPtr::Host(&mut conjugated)), Status::Success);
    // (1+2i)3 + (-i)(1+i) = 4+5i; conj: (1-2i)3 + (i)(1+i) = 2-5i
    assert_eq!(plain[0], Complex32::new(4.0, 5.0));
    assert_eq!(conjugated[0], Complex32::new(2.0, -5.0));
}

#[test]
fn nrm2_returns_the_real_norm() {
    let handle = handle();
    let device = handle.device().clone();
    let xs = vec![Complex32::new(3.0, 4.0), Complex32::new(0.0, 0.0), Complex32::new(12.0, 0.0)];
    let dx = DeviceBatch::from_host(&device, &HostBatch::from_vec(xs, 3, 3, 1).unwrap()).unwrap();
    let mut norm = [0.0f32];
    let status = nrm2::<Complex32, i32, _>(Some(&handle), 3, Single::new(dx.ptr()), 1, 1, ResultPtr::Host(&mut norm));
    assert_eq!(status, Status::Success);
    assert_eq!(norm[0], 13.0);

    norm[0] = 9.0;
    let status = nrm2::<Complex32, i32, _>(Some(&handle), 3, Single::new(dx.ptr()), -1, 1, ResultPtr::Host(&mut norm));
    assert_eq!(status, Status::Success);
    assert_eq!(norm[0], 0.0);
}

#[test]
fn workspace_queries() {
    let handle = handle();
    assert_eq!(dot_workspace_size::<f64, i32>(None, 10, 1), Err(Status::InvalidHandle));
    assert_eq!(dot_workspace_size::<f64, i32>(Some(&handle), 10, -1), Err(Status::InvalidSize));
    assert!(matches!(
        dot_workspace_size::<f64, i64>(Some(&handle), 1 << 20, 4),
        Ok(WorkspaceSize::Bytes(bytes)) if bytes > 0
    ));
    assert_eq!(nrm2_workspace_size::<f32, i32>(Some(&handle), 100, 0, 2), Ok(WorkspaceSize::Unchanged));
}

#[test]
fn null_device_result_is_rejected_for_empty_vectors() {
    let mut handle = handle();
    handle.set_pointer_mode(PointerMode::Device);
    let null = Single::new(num_rs_blas::DevicePtr::<f64>::null());
    let result = || ResultPtr::Device(num_rs_blas::DevicePtr::<f64>::null());

    assert_eq!(dot::<f64, i32, _>(Some(&handle), 0, null, 1, null, 1, 1, result()), Status::InvalidPointer);
    assert_eq!(nrm2::<f64, i64, _>(Some(&handle), 0, null, 1, 1, result()), Status::InvalidPointer);
    assert_eq!(nrm2::<f64, i32, _>(Some(&handle), 5, null, -2, 1, result()), Status::InvalidPointer);
    assert_eq!(dot::<f64, i32, _>(Some(&handle), 0, null, 1, null, 1, 0, result()), Status::Success);
    handle.synchronize().unwrap();
}

#[test]
fn non_batched_calls_refuse_several_batches() {
    let handle = handle();
    let device = handle.device().clone();
    let dx = DeviceBatch::from_host(&device, &HostBatch::from_vec(vec![1.0f64; 4], 4, 4, 1).unwrap()).unwrap();
    let x = Single::new(dx.ptr());
    let mut out = [7.0f64; 3];

    let status = dot::<f64, i32, _>(Some(&handle), 4, x, 1, x, 1, 3, ResultPtr::Host(&mut out));
    assert_eq!(status, Status::InvalidSize);
    let status = nrm2::<f64, i64, _>(Some(&handle), 4, x, 1, 2, ResultPtr::Host(&mut out));
    assert_eq!(status, Status::InvalidSize);
    assert_eq!(out, [7.0; 3]);

    let status = dot::<f64, i32, _>(Some(&handle), 4, x, 1, x, 1, 1, ResultPtr::Host(&mut out));
    assert_eq!(status, Status::Success);
    assert_eq!(out[0], 4.0);
}
