use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use num_complex::Complex64;
use num_rs_blas::init::{fill_random, init_trtri, seeded_rng};
use num_rs_blas::layout::packed_len;
use num_rs_blas::{
    dot, hpmv, trtri, Device, DeviceBatch, Diagonal, Fill, Handle, HostBatch, ResultPtr, ScalarPtr, Single, Strided,
};

fn handle() -> Handle {
    Handle::with_device(Device::with_memory(512 << 20))
}

fn bench_dot(c: &mut Criterion) {
    let handle = handle();
    let device = handle.device().clone();
    let mut group = c.benchmark_group("ddot");
    for n in [1usize << 10, 1 << 16, 1 << 20] {
        let mut rng = seeded_rng();
        let mut hx = HostBatch::<f64>::contiguous(n, 1);
        let mut hy = HostBatch::<f64>::contiguous(n, 1);
        fill_random(&mut rng, &mut hx);
        fill_random(&mut rng, &mut hy);
        let dx = DeviceBatch::from_host(&device, &hx).expect("upload x");
        let dy = DeviceBatch::from_host(&device, &hy).expect("upload y");
        let (x, y) = (Single::new(dx.ptr()), Single::new(dy.ptr()));
        let mut result = [0.0f64];
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                dot::<f64, i32, _>(Some(&handle), n as i32, x, 1, y, 1, 1, ResultPtr::Host(&mut result));
                black_box(result[0])
            })
        });
    }
    group.finish();
}

fn bench_hpmv(c: &mut Criterion) {
    let handle = handle();
    let device = handle.device().clone();
    let mut group = c.benchmark_group("zhpmv_strided_batched");
    let batches = 16usize;
    for n in [32usize, 128, 512] {
        let mut rng = seeded_rng();
        let span = packed_len(n);
        let mut hap = HostBatch::<Complex64>::contiguous(span, batches);
        let mut hx = HostBatch::<Complex64>::contiguous(n, batches);
        fill_random(&mut rng, &mut hap);
        fill_random(&mut rng, &mut hx);
        let dap = DeviceBatch::from_host(&device, &hap).expect("upload AP");
        let dx = DeviceBatch::from_host(&device, &hx).expect("upload x");
        let dy = DeviceBatch::<Complex64>::new(&device, n, n, batches).expect("allocate y");
        let (alpha, beta) = (Complex64::new(1.0, 0.5), Complex64::new(0.0, 0.0));
        group.throughput(Throughput::Elements((span * batches) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                hpmv::<Complex64, i32, _>(
                    Some(&handle),
                    Fill::Upper,
                    n as i32,
                    ScalarPtr::Host(&alpha),
                    Strided::new(dap.ptr(), span as i64),
                    Strided::new(dx.ptr(), n as i64),
                    1,
                    ScalarPtr::Host(&beta),
                    Strided::new(dy.ptr(), n as i64),
                    1,
                    batches as i32,
                );
                handle.synchronize().expect("synchronize")
            })
        });
    }
    group.finish();
}

fn bench_trtri(c: &mut Criterion) {
    let handle = handle();
    let device = handle.device().clone();
    let mut group = c.benchmark_group("dtrtri");
    group.sample_size(20);
    for n in [16usize, 64, 256] {
        let mut ha = HostBatch::<f64>::contiguous(n * n, 1);
        init_trtri(&mut seeded_rng(), Fill::Lower, n, n, &mut ha);
        let da = DeviceBatch::from_host(&device, &ha).expect("upload A");
        let dinv = DeviceBatch::<f64>::new(&device, n * n, n * n, 1).expect("allocate invA");
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                trtri::<f64, i32, _>(
                    Some(&handle),
                    Fill::Lower,
                    Diagonal::NonUnit,
                    n as i32,
                    Single::new(da.ptr()),
                    n as i32,
                    Single::new(dinv.ptr()),
                    n as i32,
                    1,
                );
                handle.synchronize().expect("synchronize")
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dot, bench_hpmv, bench_trtri);
criterion_main!(benches);
