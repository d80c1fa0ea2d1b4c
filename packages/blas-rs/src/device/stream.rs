use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use super::launch::{self, BlockCtx, LaunchConfig};
use super::{Device, DeviceError, DevicePtr};
use crate::metrics;

type Work = Box<dyn FnOnce(&Device) -> Result<(), DeviceError> + Send + 'static>;

enum Command {
    Run { label: &'static str, work: Work },
    Fence(Sender<()>),
}

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

struct Shared {
    id: u64,
    device: Arc<Device>,
    sender: Mutex<Option<Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    fault: Arc<Mutex<Option<DeviceError>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Drop for Shared {
    fn drop(&mut self) {
        lock(&self.sender).take();
        if let Some(worker) = lock(&self.worker).take() {
            if worker.join().is_err() {
                tracing::warn!(stream = self.id, "stream worker panicked");
            }
        }
    }
}

/// In-order command queue on a device. Clones share the same queue.
#[derive(Clone)]
pub struct Stream {
    shared: Arc<Shared>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").field("id", &self.shared.id).finish()
    }
}

fn worker_loop(id: u64, device: Arc<Device>, fault: Arc<Mutex<Option<DeviceError>>>, rx: Receiver<Command>) {
    for command in rx {
        match command {
            Command::Run { label, work } => {
                // After a fault the stream stays poisoned until the next
                // synchronize collects the error; queued work is dropped.
                let faulted = lock(&fault).is_some();
                if !faulted {
                    if let Err(err) = work(&device) {
                        tracing::debug!(stream = id, op = label, error = %err, "stream fault");
                        *lock(&fault) = Some(err);
                    }
                }
                device.end_work();
            }
            Command::Fence(done) => {
                let _ = done.send(());
            }
        }
    }
}

impl Stream {
    pub fn new(device: &Arc<Device>) -> Self {
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        let fault = Arc::new(Mutex::new(None));
        let worker = {
            let device = Arc::clone(device);
            let fault = Arc::clone(&fault);
            thread::Builder::new()
                .name(format!("numrs-blas-stream-{id}"))
                .spawn(move || worker_loop(id, device, fault, rx))
        };
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!(stream = id, error = %err, "failed to spawn stream worker");
                None
            }
        };
        tracing::debug!(stream = id, device = device.ordinal(), "stream created");
        Self {
            shared: Arc::new(Shared {
                id,
                device: Arc::clone(device),
                sender: Mutex::new(worker.as_ref().map(|_| tx)),
                worker: Mutex::new(worker),
                fault,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.shared.device
    }

    fn send(&self, command: Command) -> Result<(), DeviceError> {
        let sender = lock(&self.shared.sender);
        let sender = sender.as_ref().ok_or(DeviceError::StreamClosed)?;
        sender.send(command).map_err(|_| DeviceError::StreamClosed)
    }

    /// Queues `work` behind everything already on the stream.
    pub(crate) fn enqueue<F>(&self, label: &'static str, work: F) -> Result<(), DeviceError>
    where
        F: FnOnce(&Device) -> Result<(), DeviceError> + Send + 'static,
    {
        self.shared.device.begin_work();
        let sent = self.send(Command::Run {
            label,
            work: Box::new(work),
        });
        if sent.is_err() {
            self.shared.device.end_work();
        }
        sent
    }

    /// Validates `config` and queues a kernel. Returns once queued.
    pub fn launch<K>(&self, kernel_name: &'static str, config: LaunchConfig, kernel: K) -> Result<(), DeviceError>
    where
        K: Fn(&mut BlockCtx<'_>) -> Result<(), DeviceError> + Send + Sync + 'static,
    {
        config.validate(kernel_name)?;
        metrics::record_launch();
        tracing::trace!(
            stream = self.shared.id,
            kernel = kernel_name,
            grid = ?config.grid,
            block = ?config.block,
            "launch"
        );
        self.enqueue(kernel_name, move |device| {
            let mut heap = device.heap();
            launch::execute(&mut heap, config, &kernel)
        })
    }

    /// Waits for all queued work and returns the first fault since the last call.
    pub fn synchronize(&self) -> Result<(), DeviceError> {
        let (tx, rx) = mpsc::channel();
        self.send(Command::Fence(tx))?;
        rx.recv().map_err(|_| DeviceError::StreamClosed)?;
        match lock(&self.shared.fault).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Queues a host-to-device copy. `src` is staged at call time.
    pub fn memcpy_htod_async<T: bytemuck::Pod + Send>(
        &self,
        dst: DevicePtr<T>,
        src: Vec<T>,
    ) -> Result<(), DeviceError> {
        self.enqueue("memcpy_htod_async", move |device| {
            device.heap().write(dst, &src)?;
            metrics::record_h2d_bytes(mem::size_of_val(src.as_slice()));
            Ok(())
        })
    }

    /// Queues a device-to-host copy of `count` elements into `dst[offset..]`.
    pub fn memcpy_dtoh_async<T: bytemuck::Pod + Send>(
        &self,
        dst: &PinnedBuffer<T>,
        offset: usize,
        src: DevicePtr<T>,
        count: usize,
    ) -> Result<(), DeviceError> {
        let dst = dst.clone();
        self.enqueue("memcpy_dtoh_async", move |device| {
            let values = device.heap().read(src, count)?;
            let mut host = lock(&dst.data);
            let window = host
                .get_mut(offset..offset + count)
                .ok_or(DeviceError::AccessFault {
                    addr: offset as u64,
                    len: count,
                })?;
            window.copy_from_slice(&values);
            metrics::record_d2h_bytes(mem::size_of_val(window));
            Ok(())
        })
    }
}

/// Page-locked host staging memory that async device-to-host copies land in.
/// Contents are only meaningful after the stream that wrote them synchronizes.
pub struct PinnedBuffer<T> {
    data: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for PinnedBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: bytemuck::Pod> PinnedBuffer<T> {
    pub fn zeroed(len: usize) -> Self {
        Self::from_vec(vec![<T as bytemuck::Zeroable>::zeroed(); len])
    }

    pub fn from_vec(values: Vec<T>) -> Self {
        Self {
            data: Arc::new(Mutex::new(values)),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.data).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<T> {
        lock(&self.data).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Dim3;

    #[test]
    fn launches_run_in_order() {
        let device = Device::with_memory(1 << 20);
        let stream = Stream::new(&device);
        let block = device.malloc(4 * 4).expect("malloc");
        let ptr: DevicePtr<u32> = block.ptr();
        stream
            .memcpy_htod_async(ptr, vec![1, 2, 3, 4])
            .expect("upload");
        let config = LaunchConfig::new(Dim3::linear(4), Dim3::linear(1));
        stream
            .launch("double", config, move |ctx| {
                let slot = ptr.offset(ctx.block.x as i64);
                let value = ctx.load_one(slot)?;
                ctx.store_one(slot, value * 2);
                Ok(())
            })
            .expect("launch");
        let host = PinnedBuffer::zeroed(4);
        stream.memcpy_dtoh_async(&host, 0, ptr, 4).expect("download");
        stream.synchronize().expect("sync");
        assert_eq!(host.to_vec(), vec![2, 4, 6, 8]);
    }

    #[test]
    fn faults_surface_at_synchronize_once() {
        let device = Device::with_memory(1 << 20);
        let stream = Stream::new(&device);
        let config = LaunchConfig::new(Dim3::linear(1), Dim3::linear(1));
        stream
            .launch("null_read", config, |ctx| {
                ctx.load_one(DevicePtr::<f32>::null())?;
                Ok(())
            })
            .expect("queued");
        let err = stream.synchronize().expect_err("fault");
        assert!(matches!(err, DeviceError::AccessFault { addr: 0, .. }));
        stream.synchronize().expect("fault is cleared");
    }

    #[test]
    fn blocking_copy_waits_for_queued_work() {
        let device = Device::with_memory(1 << 20);
        let stream = Stream::new(&device);
        let block = device.malloc(8).expect("malloc");
        let ptr: DevicePtr<f64> = block.ptr();
        stream.memcpy_htod_async(ptr, vec![42.0]).expect("upload");
        let mut out = [0.0f64];
        device.memcpy_dtoh(&mut out, ptr).expect("download");
        assert_eq!(out, [42.0]);
    }
}
