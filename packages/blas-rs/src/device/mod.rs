//! Stream-ordered accelerator model.
//!
//! A [`Device`] owns a byte-addressed heap. Allocations are identified by
//! opaque 64-bit device addresses, `0` being the null pointer, and touching
//! bytes outside a live allocation is an access fault. Work is submitted
//! through [`Stream`]s, which execute FIFO on their own worker thread.

mod launch;
mod stream;

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};

use thiserror::Error;

use crate::config;
use crate::metrics;

pub use launch::{BlockCtx, Dim3, LaunchConfig, MAX_GRID_X, MAX_GRID_YZ};
pub use stream::{PinnedBuffer, Stream};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("out of device memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },
    #[error("memory access fault at {addr:#x} ({len} bytes)")]
    AccessFault { addr: u64, len: usize },
    #[error("free of unknown device address {addr:#x}")]
    InvalidFree { addr: u64 },
    #[error("invalid launch configuration for `{kernel}`: {reason}")]
    InvalidLaunch { kernel: &'static str, reason: String },
    #[error("stream worker is no longer running")]
    StreamClosed,
}

/// Typed device address. Carries no ownership; see [`DeviceAllocation`].
pub struct DevicePtr<T> {
    addr: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DevicePtr<T> {
    pub const fn null() -> Self {
        Self::from_addr(0)
    }

    pub const fn from_addr(addr: u64) -> Self {
        Self {
            addr,
            _marker: PhantomData,
        }
    }

    pub const fn addr(self) -> u64 {
        self.addr
    }

    pub const fn is_null(self) -> bool {
        self.addr == 0
    }

    /// Pointer arithmetic in elements of `T`. Wraps like device pointers do;
    /// a wrapped pointer faults on first access.
    pub fn offset(self, elements: i64) -> Self {
        let bytes = elements.wrapping_mul(mem::size_of::<T>() as i64);
        Self::from_addr(self.addr.wrapping_add_signed(bytes))
    }

    pub const fn cast<U>(self) -> DevicePtr<U> {
        DevicePtr::from_addr(self.addr)
    }
}

impl<T> Clone for DevicePtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DevicePtr<T> {}

impl<T> PartialEq for DevicePtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for DevicePtr<T> {}

impl<T> fmt::Debug for DevicePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevicePtr({:#x})", self.addr)
    }
}

impl<T> Default for DevicePtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

#[derive(Clone, Debug)]
pub struct DeviceProperties {
    pub name: String,
    pub total_memory: usize,
    pub max_grid: Dim3,
    pub max_threads_per_block: u32,
    pub warp_size: u32,
}

impl DeviceProperties {
    pub fn simulated(total_memory: usize) -> Self {
        Self {
            name: "numrs-sim".to_string(),
            total_memory,
            max_grid: Dim3::new(MAX_GRID_X, MAX_GRID_YZ, MAX_GRID_YZ),
            max_threads_per_block: 1024,
            warp_size: 64,
        }
    }
}

const HEAP_BASE: u64 = 0x7f00_0000_0000;
const ALLOC_ALIGN: u64 = 256;

/// Backing store of one device. Each allocation is padded by one alignment
/// unit so that running off the end of a buffer never lands in a neighbour.
#[derive(Debug)]
pub(crate) struct Heap {
    allocations: BTreeMap<u64, Vec<u8>>,
    next: u64,
    used: usize,
    capacity: usize,
}

impl Heap {
    fn new(capacity: usize) -> Self {
        Self {
            allocations: BTreeMap::new(),
            next: HEAP_BASE,
            used: 0,
            capacity,
        }
    }

    fn allocate(&mut self, bytes: usize) -> Result<u64, DeviceError> {
        let available = self.capacity - self.used;
        if bytes > available {
            return Err(DeviceError::OutOfMemory {
                requested: bytes,
                available,
            });
        }
        let addr = self.next;
        let padded = (bytes as u64).div_ceil(ALLOC_ALIGN) * ALLOC_ALIGN + ALLOC_ALIGN;
        self.next += padded;
        self.used += bytes;
        self.allocations.insert(addr, vec![0u8; bytes]);
        Ok(addr)
    }

    fn release(&mut self, addr: u64) -> Result<(), DeviceError> {
        match self.allocations.remove(&addr) {
            Some(block) => {
                self.used -= block.len();
                Ok(())
            }
            None => Err(DeviceError::InvalidFree { addr }),
        }
    }

    fn locate(&self, addr: u64, len: usize) -> Result<(u64, usize), DeviceError> {
        let fault = DeviceError::AccessFault { addr, len };
        let (&base, block) = self
            .allocations
            .range(..=addr)
            .next_back()
            .ok_or(fault.clone())?;
        let start = (addr - base) as usize;
        match start.checked_add(len) {
            Some(end) if end <= block.len() => Ok((base, start)),
            _ => Err(fault),
        }
    }

    pub(crate) fn bytes(&self, addr: u64, len: usize) -> Result<&[u8], DeviceError> {
        if len == 0 {
            return Ok(&[]);
        }
        let (base, start) = self.locate(addr, len)?;
        Ok(&self.allocations[&base][start..start + len])
    }

    pub(crate) fn bytes_mut(&mut self, addr: u64, len: usize) -> Result<&mut [u8], DeviceError> {
        if len == 0 {
            return Ok(&mut []);
        }
        let (base, start) = self.locate(addr, len)?;
        let block = self
            .allocations
            .get_mut(&base)
            .ok_or(DeviceError::AccessFault { addr, len })?;
        Ok(&mut block[start..start + len])
    }

    pub(crate) fn read<T: bytemuck::Pod>(
        &self,
        ptr: DevicePtr<T>,
        count: usize,
    ) -> Result<Vec<T>, DeviceError> {
        let bytes = self.bytes(ptr.addr(), count * mem::size_of::<T>())?;
        Ok(bytemuck::pod_collect_to_vec(bytes))
    }

    pub(crate) fn write<T: bytemuck::Pod>(
        &mut self,
        ptr: DevicePtr<T>,
        values: &[T],
    ) -> Result<(), DeviceError> {
        let src: &[u8] = bytemuck::cast_slice(values);
        self.bytes_mut(ptr.addr(), src.len())?.copy_from_slice(src);
        Ok(())
    }
}

/// Counts commands that are queued or running on any stream of a device.
#[derive(Debug, Default)]
struct Activity {
    pending: Mutex<usize>,
    idle: Condvar,
}

pub struct Device {
    ordinal: u32,
    properties: DeviceProperties,
    heap: Mutex<Heap>,
    activity: Activity,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("ordinal", &self.ordinal)
            .field("name", &self.properties.name)
            .field("total_memory", &self.properties.total_memory)
            .finish()
    }
}

static DEFAULT_DEVICE: OnceLock<Arc<Device>> = OnceLock::new();

impl Device {
    pub fn new(ordinal: u32, properties: DeviceProperties) -> Arc<Self> {
        tracing::debug!(
            ordinal,
            name = %properties.name,
            total_memory = properties.total_memory,
            "device created"
        );
        Arc::new(Self {
            ordinal,
            heap: Mutex::new(Heap::new(properties.total_memory)),
            properties,
            activity: Activity::default(),
        })
    }

    /// Device with `total_memory` bytes of heap and default limits.
    pub fn with_memory(total_memory: usize) -> Arc<Self> {
        Self::new(0, DeviceProperties::simulated(total_memory))
    }

    /// Process-wide device sized by `NUMRS_BLAS_DEVICE_MEMORY_MB`.
    pub fn default_device() -> Arc<Self> {
        DEFAULT_DEVICE
            .get_or_init(|| Self::new(0, DeviceProperties::simulated(config::device_memory_bytes())))
            .clone()
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    pub(crate) fn heap(&self) -> MutexGuard<'_, Heap> {
        // A poisoned heap only means a kernel panicked mid-launch; stores are
        // applied after the kernel returns, so the map itself is consistent.
        self.heap.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn memory_in_use(&self) -> usize {
        self.heap().used
    }

    pub fn malloc(self: &Arc<Self>, bytes: usize) -> Result<DeviceAllocation, DeviceError> {
        if bytes == 0 {
            return Ok(DeviceAllocation {
                device: Arc::clone(self),
                addr: 0,
                bytes: 0,
            });
        }
        let addr = self.heap().allocate(bytes)?;
        tracing::trace!(addr = format_args!("{addr:#x}"), bytes, "device malloc");
        Ok(DeviceAllocation {
            device: Arc::clone(self),
            addr,
            bytes,
        })
    }

    /// Blocks until every stream on this device has drained.
    pub fn synchronize(&self) {
        let mut pending = self
            .activity
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while *pending > 0 {
            pending = self
                .activity
                .idle
                .wait(pending)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    pub(crate) fn begin_work(&self) {
        let mut pending = self
            .activity
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *pending += 1;
    }

    pub(crate) fn end_work(&self) {
        let mut pending = self
            .activity
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *pending -= 1;
        if *pending == 0 {
            self.activity.idle.notify_all();
        }
    }

    /// Blocking host-to-device copy. Waits for the device to go idle first.
    pub fn memcpy_htod<T: bytemuck::Pod>(
        &self,
        dst: DevicePtr<T>,
        src: &[T],
    ) -> Result<(), DeviceError> {
        self.synchronize();
        self.heap().write(dst, src)?;
        metrics::record_h2d_bytes(mem::size_of_val(src));
        Ok(())
    }

    /// Blocking device-to-host copy. Waits for the device to go idle first.
    pub fn memcpy_dtoh<T: bytemuck::Pod>(
        &self,
        dst: &mut [T],
        src: DevicePtr<T>,
    ) -> Result<(), DeviceError> {
        self.synchronize();
        let values = self.heap().read(src, dst.len())?;
        dst.copy_from_slice(&values);
        metrics::record_d2h_bytes(mem::size_of_val(dst));
        Ok(())
    }

    fn free(&self, addr: u64) -> Result<(), DeviceError> {
        self.synchronize();
        tracing::trace!(addr = format_args!("{addr:#x}"), "device free");
        self.heap().release(addr)
    }
}

/// Owning handle to a device allocation; frees on drop after the device drains.
pub struct DeviceAllocation {
    device: Arc<Device>,
    addr: u64,
    bytes: usize,
}

impl DeviceAllocation {
    pub fn ptr<T>(&self) -> DevicePtr<T> {
        DevicePtr::from_addr(self.addr)
    }

    pub fn len_bytes(&self) -> usize {
        self.bytes
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl fmt::Debug for DeviceAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceAllocation({:#x}, {} bytes)", self.addr, self.bytes)
    }
}

impl Drop for DeviceAllocation {
    fn drop(&mut self) {
        if self.addr == 0 {
            return;
        }
        if let Err(err) = self.device.free(self.addr) {
            tracing::warn!(error = %err, "failed to release device allocation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_access_faults() {
        let device = Device::with_memory(1 << 20);
        let block = device.malloc(16).expect("malloc");
        let ptr: DevicePtr<f32> = block.ptr();
        device.memcpy_htod(ptr, &[1.0, 2.0, 3.0, 4.0]).expect("copy in");
        let err = device
            .memcpy_htod(ptr.offset(2), &[0.0f32; 3])
            .expect_err("write past end");
        assert!(matches!(err, DeviceError::AccessFault { .. }));
        let mut back = [0.0f32; 4];
        device.memcpy_dtoh(&mut back, ptr).expect("copy out");
        assert_eq!(back, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn null_pointer_faults() {
        let device = Device::with_memory(1 << 20);
        let mut out = [0u8; 1];
        assert!(device.memcpy_dtoh(&mut out, DevicePtr::null()).is_err());
    }

    #[test]
    fn capacity_is_enforced_and_released() {
        let device = Device::with_memory(1024);
        let first = device.malloc(800).expect("first");
        let err = device.malloc(400).expect_err("over capacity");
        assert_eq!(
            err,
            DeviceError::OutOfMemory {
                requested: 400,
                available: 224
            }
        );
        drop(first);
        assert_eq!(device.memory_in_use(), 0);
        device.malloc(1000).expect("after free");
    }

    #[test]
    fn zero_byte_malloc_is_null() {
        let device = Device::with_memory(64);
        let block = device.malloc(0).expect("malloc");
        assert!(block.ptr::<u8>().is_null());
    }

    #[test]
    fn pointer_offsets_are_element_scaled() {
        let ptr = DevicePtr::<f64>::from_addr(0x1000);
        assert_eq!(ptr.offset(3).addr(), 0x1018);
        assert_eq!(ptr.offset(-1).addr(), 0xff8);
    }
}
