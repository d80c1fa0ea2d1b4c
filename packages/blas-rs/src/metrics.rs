use std::sync::atomic::{AtomicUsize, Ordering};

static HOST_TO_DEVICE_BYTES: AtomicUsize = AtomicUsize::new(0);
static DEVICE_TO_HOST_BYTES: AtomicUsize = AtomicUsize::new(0);
static KERNEL_LAUNCHES: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn record_h2d_bytes(bytes: usize) {
    HOST_TO_DEVICE_BYTES.fetch_add(bytes, Ordering::Relaxed);
}

pub(crate) fn record_d2h_bytes(bytes: usize) {
    DEVICE_TO_HOST_BYTES.fetch_add(bytes, Ordering::Relaxed);
}

pub(crate) fn record_launch() {
    KERNEL_LAUNCHES.fetch_add(1, Ordering::Relaxed);
}

pub fn h2d_bytes_total() -> u64 {
    HOST_TO_DEVICE_BYTES.load(Ordering::Relaxed) as u64
}

pub fn d2h_bytes_total() -> u64 {
    DEVICE_TO_HOST_BYTES.load(Ordering::Relaxed) as u64
}

pub fn launches_total() -> u64 {
    KERNEL_LAUNCHES.load(Ordering::Relaxed) as u64
}

pub fn take_launches() -> u64 {
    KERNEL_LAUNCHES.swap(0, Ordering::Relaxed) as u64
}

pub fn reset() {
    HOST_TO_DEVICE_BYTES.store(0, Ordering::Relaxed);
    DEVICE_TO_HOST_BYTES.store(0, Ordering::Relaxed);
    KERNEL_LAUNCHES.store(0, Ordering::Relaxed);
}
