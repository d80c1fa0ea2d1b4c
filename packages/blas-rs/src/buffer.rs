//! Host and device storage for batched operands.
//!
//! A batch of `batch_count` problems is laid out as in strided-batched
//! calls: batch `b` starts `b * stride` elements after the first. Device
//! buffers additionally carry a pointer table so the same storage can be
//! addressed as single, strided, or pointer-array batches, and are padded
//! with guard bytes that [`DeviceBatch::memcheck`] verifies.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use crate::batch::{BatchAddress, PointerArray, Single, Strided};
use crate::device::{Device, DeviceAllocation, DevicePtr};
use crate::element::Element;
use crate::error::{BlasError, BlasResult};
use crate::layout::{matrix_span, packed_len, vector_span};

/// Elements of padding on each side of device storage.
const GUARD_ELEMENTS: usize = 16;
const GUARD_BYTE: u8 = 0xA5;

/// Storage footprint of one problem instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    Vector { n: usize, inc: i64 },
    Matrix { rows: usize, cols: usize, ld: usize },
    Packed { n: usize },
}

impl Shape {
    /// Elements one instance occupies, gaps included.
    pub fn span(&self) -> usize {
        match *self {
            Shape::Vector { n, inc } => vector_span(n, inc),
            Shape::Matrix { rows, cols, ld } => matrix_span(rows, cols, ld.max(rows)),
            Shape::Packed { n } => packed_len(n),
        }
    }
}

fn batch_len(span: usize, stride: usize, batch_count: usize) -> usize {
    if batch_count == 0 || span == 0 {
        0
    } else {
        (batch_count - 1) * stride + span
    }
}

/// Batched operand in host memory.
#[derive(Clone, PartialEq)]
pub struct HostBatch<T> {
    data: Vec<T>,
    span: usize,
    stride: usize,
    batch_count: usize,
}

impl<T: fmt::Debug> fmt::Debug for HostBatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBatch")
            .field("span", &self.span)
            .field("stride", &self.stride)
            .field("batch_count", &self.batch_count)
            .finish_non_exhaustive()
    }
}

impl<T: Element> HostBatch<T> {
    /// Zero-filled batch. A `stride` of 0 stores one instance shared by all batches.
    pub fn new(span: usize, stride: usize, batch_count: usize) -> Self {
        let len = batch_len(span, stride, batch_count);
        Self {
            data: vec![<T as bytemuck::Zeroable>::zeroed(); len],
            span,
            stride,
            batch_count,
        }
    }

    /// Batches packed back to back.
    pub fn contiguous(span: usize, batch_count: usize) -> Self {
        Self::new(span, span, batch_count)
    }

    pub fn from_vec(data: Vec<T>, span: usize, stride: usize, batch_count: usize) -> BlasResult<Self> {
        let expected = batch_len(span, stride, batch_count);
        if data.len() != expected {
            return Err(BlasError::invalid_size(format!(
                "host batch holds {} elements, layout needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            span,
            stride,
            batch_count,
        })
    }

    pub fn span(&self) -> usize {
        self.span
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn batch(&self, b: usize) -> &[T] {
        let start = b * self.stride;
        &self.data[start..start + self.span]
    }

    pub fn batch_mut(&mut self, b: usize) -> &mut [T] {
        let start = b * self.stride;
        &mut self.data[start..start + self.span]
    }

    /// Iterates over distinct batches; a broadcast batch is visited once.
    pub fn batches(&self) -> impl Iterator<Item = &[T]> + '_ {
        let distinct = if self.stride == 0 {
            self.batch_count.min(1)
        } else {
            self.batch_count
        };
        (0..distinct).map(move |b| self.batch(b))
    }

    pub fn fill_with<F: FnMut() -> T>(&mut self, fill: F) {
        self.data.fill_with(fill);
    }
}

/// Batched operand in device memory.
pub struct DeviceBatch<T> {
    device: Arc<Device>,
    storage: DeviceAllocation,
    table: DeviceAllocation,
    span: usize,
    stride: usize,
    batch_count: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for DeviceBatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBatch")
            .field("storage", &self.storage)
            .field("span", &self.span)
            .field("stride", &self.stride)
            .field("batch_count", &self.batch_count)
            .finish()
    }
}

impl<T: Element> DeviceBatch<T> {
    /// Allocates zeroed storage for `batch_count` instances `stride` apart.
    pub fn new(device: &Arc<Device>, span: usize, stride: usize, batch_count: usize) -> BlasResult<Self> {
        let len = batch_len(span, stride, batch_count);
        let elem = mem::size_of::<T>();
        let storage = if len == 0 {
            device.malloc(0)?
        } else {
            let storage = device.malloc((len + 2 * GUARD_ELEMENTS) * elem)?;
            let guard = vec![GUARD_BYTE; GUARD_ELEMENTS * elem];
            let base: DevicePtr<u8> = storage.ptr();
            device.memcpy_htod(base, &guard)?;
            device.memcpy_htod(base.offset(((GUARD_ELEMENTS + len) * elem) as i64), &guard)?;
            storage
        };
        let data = if len == 0 {
            DevicePtr::<T>::null()
        } else {
            storage.ptr::<T>().offset(GUARD_ELEMENTS as i64)
        };
        let table = device.malloc(batch_count * mem::size_of::<u64>())?;
        if batch_count > 0 {
            let entries: Vec<u64> = (0..batch_count)
                .map(|b| {
                    if data.is_null() {
                        0
                    } else {
                        data.offset((b * stride) as i64).addr()
                    }
                })
                .collect();
            device.memcpy_htod(table.ptr::<u64>(), &entries)?;
        }
        Ok(Self {
            device: Arc::clone(device),
            storage,
            table,
            span,
            stride,
            batch_count,
            _marker: PhantomData,
        })
    }

    /// Device buffer shaped like `host`, holding a copy of its contents.
    pub fn from_host(device: &Arc<Device>, host: &HostBatch<T>) -> BlasResult<Self> {
        let mut buffer = Self::new(device, host.span, host.stride, host.batch_count)?;
        buffer.transfer_from(host)?;
        Ok(buffer)
    }

    pub fn span(&self) -> usize {
        self.span
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    fn len(&self) -> usize {
        batch_len(self.span, self.stride, self.batch_count)
    }

    /// First element of batch 0; null when the buffer is empty.
    pub fn ptr(&self) -> DevicePtr<T> {
        if self.len() == 0 {
            DevicePtr::null()
        } else {
            self.storage.ptr::<T>().offset(GUARD_ELEMENTS as i64)
        }
    }

    /// Device-resident array of per-batch base pointers.
    pub fn table(&self) -> DevicePtr<DevicePtr<T>> {
        self.table.ptr()
    }

    /// Views the buffer through addressing mode `B`.
    pub fn address<B: BindBatch<T>>(&self) -> B {
        B::bind(self)
    }

    fn check_layout(&self, host: &HostBatch<T>) -> BlasResult<()> {
        if host.span != self.span || host.stride != self.stride || host.batch_count != self.batch_count {
            return Err(BlasError::invalid_size(format!(
                "host layout {}x{}+{} does not match device layout {}x{}+{}",
                host.batch_count, host.span, host.stride, self.batch_count, self.span, self.stride
            )));
        }
        Ok(())
    }

    pub fn transfer_from(&mut self, host: &HostBatch<T>) -> BlasResult<()> {
        self.check_layout(host)?;
        if self.len() > 0 {
            self.device.memcpy_htod(self.ptr(), host.as_slice())?;
        }
        Ok(())
    }

    pub fn copy_to(&self, host: &mut HostBatch<T>) -> BlasResult<()> {
        self.check_layout(host)?;
        if self.len() > 0 {
            self.device.memcpy_dtoh(host.as_mut_slice(), self.ptr())?;
        }
        Ok(())
    }

    pub fn to_host(&self) -> BlasResult<HostBatch<T>> {
        let mut host = HostBatch::new(self.span, self.stride, self.batch_count);
        self.copy_to(&mut host)?;
        Ok(host)
    }

    /// Checks that no kernel wrote into the guard bytes around the data.
    pub fn memcheck(&self) -> BlasResult<()> {
        let len = self.len();
        if len == 0 {
            return Ok(());
        }
        let elem = mem::size_of::<T>();
        let base: DevicePtr<u8> = self.storage.ptr();
        let mut guard = vec![0u8; GUARD_ELEMENTS * elem];
        for (side, offset) in [("leading", 0), ("trailing", (GUARD_ELEMENTS + len) * elem)] {
            self.device.memcpy_dtoh(&mut guard, base.offset(offset as i64))?;
            if guard.iter().any(|&byte| byte != GUARD_BYTE) {
                return Err(BlasError::Internal(format!(
                    "{side} guard of {:?} was overwritten",
                    self.storage
                )));
            }
        }
        Ok(())
    }
}

/// Addressing modes that can view a [`DeviceBatch`].
pub trait BindBatch<T>: BatchAddress<T> {
    fn bind(buffer: &DeviceBatch<T>) -> Self;

    /// The null operand of this mode.
    fn null() -> Self;
}

impl<T: Element> BindBatch<T> for Single<T> {
    fn bind(buffer: &DeviceBatch<T>) -> Self {
        Single::new(buffer.ptr())
    }

    fn null() -> Self {
        Single::new(DevicePtr::null())
    }
}

impl<T: Element> BindBatch<T> for Strided<T> {
    fn bind(buffer: &DeviceBatch<T>) -> Self {
        Strided::new(buffer.ptr(), buffer.stride() as i64)
    }

    fn null() -> Self {
        Strided::new(DevicePtr::null(), 0)
    }
}

impl<T: Element> BindBatch<T> for PointerArray<T> {
    fn bind(buffer: &DeviceBatch<T>) -> Self {
        PointerArray::new(buffer.table())
    }

    fn null() -> Self {
        PointerArray::new(DevicePtr::null())
    }
}
