//! Per-batch addressing of device operands and the argument types shared by
//! every routine: API integer width, scalar pointers, and result pointers.

use std::fmt::Debug;

use crate::device::{BlockCtx, DeviceError, DevicePtr};
use crate::error::{BlasError, BlasResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BatchMode {
    Single,
    Strided,
    PointerArray,
}

impl BatchMode {
    /// Suffix appended to routine names in logs.
    pub const fn suffix(self) -> &'static str {
        match self {
            BatchMode::Single => "",
            BatchMode::Strided => "_strided_batched",
            BatchMode::PointerArray => "_batched",
        }
    }

    /// Rejects a negative `batch_count`, and any count above 1 for a
    /// non-batched call.
    pub(crate) fn check_batch_count(self, batch_count: i64) -> BlasResult<()> {
        if batch_count < 0 || (self == BatchMode::Single && batch_count > 1) {
            return Err(BlasError::invalid_size(format!("batch_count = {batch_count}")));
        }
        Ok(())
    }
}

/// How a routine finds batch `b` of an operand.
///
/// `advance` runs on the host and rebases the operand so that batch `b` of
/// the result is batch `base + b` of `self`; `resolve` runs inside a kernel.
pub trait BatchAddress<T>: Copy + Debug + Send + Sync + 'static {
    const MODE: BatchMode;

    fn is_null(&self) -> bool;

    fn advance(self, batches: i64) -> Self;

    /// Base pointer of batch `batch`, plus `offset` elements.
    fn resolve(&self, ctx: &BlockCtx<'_>, batch: i64, offset: i64) -> Result<DevicePtr<T>, DeviceError>;
}

/// One problem instance; `batch_count` must be 0 or 1.
pub struct Single<T> {
    pub ptr: DevicePtr<T>,
}

/// Batch `b` starts `b * stride` elements after `ptr`. A zero stride
/// broadcasts one operand to every batch.
pub struct Strided<T> {
    pub ptr: DevicePtr<T>,
    pub stride: i64,
}

/// Batch `b` starts at `table[b]`, a device-resident array of device pointers.
pub struct PointerArray<T> {
    pub table: DevicePtr<DevicePtr<T>>,
}

macro_rules! impl_address_value {
    ($name:ident { $($field:ident),+ }) => {
        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $name<T> {}

        impl<T> Debug for $name<T> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    $(.field(stringify!($field), &self.$field))+
                    .finish()
            }
        }
    };
}

impl_address_value!(Single { ptr });
impl_address_value!(Strided { ptr, stride });
impl_address_value!(PointerArray { table });

impl<T> Single<T> {
    pub fn new(ptr: DevicePtr<T>) -> Self {
        Self { ptr }
    }
}

impl<T> Strided<T> {
    pub fn new(ptr: DevicePtr<T>, stride: i64) -> Self {
        Self { ptr, stride }
    }
}

impl<T> PointerArray<T> {
    pub fn new(table: DevicePtr<DevicePtr<T>>) -> Self {
        Self { table }
    }
}

impl<T: 'static> BatchAddress<T> for Single<T> {
    const MODE: BatchMode = BatchMode::Single;

    fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    fn advance(self, _batches: i64) -> Self {
        self
    }

    fn resolve(&self, _ctx: &BlockCtx<'_>, _batch: i64, offset: i64) -> Result<DevicePtr<T>, DeviceError> {
        Ok(self.ptr.offset(offset))
    }
}

impl<T: 'static> BatchAddress<T> for Strided<T> {
    const MODE: BatchMode = BatchMode::Strided;

    fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    fn advance(self, batches: i64) -> Self {
        Self {
            ptr: self.ptr.offset(batches.wrapping_mul(self.stride)),
            stride: self.stride,
        }
    }

    fn resolve(&self, _ctx: &BlockCtx<'_>, batch: i64, offset: i64) -> Result<DevicePtr<T>, DeviceError> {
        Ok(self.ptr.offset(batch.wrapping_mul(self.stride).wrapping_add(offset)))
    }
}

impl<T: 'static> BatchAddress<T> for PointerArray<T> {
    const MODE: BatchMode = BatchMode::PointerArray;

    fn is_null(&self) -> bool {
        self.table.is_null()
    }

    fn advance(self, batches: i64) -> Self {
        Self {
            table: self.table.offset(batches),
        }
    }

    fn resolve(&self, ctx: &BlockCtx<'_>, batch: i64, offset: i64) -> Result<DevicePtr<T>, DeviceError> {
        Ok(ctx.load_pointer(self.table, batch)?.offset(offset))
    }
}

/// Integer width of a public entry point. `i32` is the classic interface,
/// `i64` the 64-bit one routed through the chunking adapter.
pub trait ApiInt: Copy + Debug + Into<i64> + Send + Sync + 'static {
    const WIDE: bool;

    fn get(self) -> i64 {
        self.into()
    }
}

impl ApiInt for i32 {
    const WIDE: bool = false;
}

impl ApiInt for i64 {
    const WIDE: bool = true;
}

/// Scalar argument such as `alpha`. Which variant is valid depends on the
/// handle's pointer mode.
#[derive(Debug)]
pub enum ScalarPtr<'a, T> {
    Null,
    Host(&'a T),
    Device(DevicePtr<T>),
}

impl<T> Clone for ScalarPtr<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ScalarPtr<'_, T> {}

impl<'a, T> From<&'a T> for ScalarPtr<'a, T> {
    fn from(value: &'a T) -> Self {
        ScalarPtr::Host(value)
    }
}

impl<T> From<DevicePtr<T>> for ScalarPtr<'_, T> {
    fn from(ptr: DevicePtr<T>) -> Self {
        ScalarPtr::Device(ptr)
    }
}

impl<T> ScalarPtr<'_, T> {
    pub fn is_null(&self) -> bool {
        match self {
            ScalarPtr::Null => true,
            ScalarPtr::Host(_) => false,
            ScalarPtr::Device(ptr) => ptr.is_null(),
        }
    }
}

/// A scalar as seen by a kernel: a value captured at launch (host pointer
/// mode) or an address read by the kernel (device pointer mode).
#[derive(Clone, Copy, Debug)]
pub(crate) enum ScalarArg<T> {
    Value(T),
    Device(DevicePtr<T>),
}

impl<T: bytemuck::Pod> ScalarArg<T> {
    pub(crate) fn load(&self, ctx: &BlockCtx<'_>) -> Result<T, DeviceError> {
        match self {
            ScalarArg::Value(value) => Ok(*value),
            ScalarArg::Device(ptr) => ctx.load_one(*ptr),
        }
    }

    /// The value when it is known on the host.
    pub(crate) fn host_value(&self) -> Option<T> {
        match self {
            ScalarArg::Value(value) => Some(*value),
            ScalarArg::Device(_) => None,
        }
    }
}

/// Destination of reduction results, one element per batch.
#[derive(Debug)]
pub enum ResultPtr<'a, T> {
    Null,
    Host(&'a mut [T]),
    Device(DevicePtr<T>),
}

impl<T> ResultPtr<'_, T> {
    pub fn is_null(&self) -> bool {
        match self {
            ResultPtr::Null => true,
            ResultPtr::Host(_) => false,
            ResultPtr::Device(ptr) => ptr.is_null(),
        }
    }
}

impl<'a, T> From<&'a mut [T]> for ResultPtr<'a, T> {
    fn from(values: &'a mut [T]) -> Self {
        ResultPtr::Host(values)
    }
}

impl<T> From<DevicePtr<T>> for ResultPtr<'_, T> {
    fn from(ptr: DevicePtr<T>) -> Self {
        ResultPtr::Device(ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strided_advance_moves_by_whole_batches() {
        let base = Strided::new(DevicePtr::<f64>::from_addr(0x1000), 10);
        assert_eq!(base.advance(3).ptr.addr(), 0x1000 + 3 * 10 * 8);
        let broadcast = Strided::new(DevicePtr::<f64>::from_addr(0x1000), 0);
        assert_eq!(broadcast.advance(65_535).ptr.addr(), 0x1000);
    }

    #[test]
    fn pointer_array_advance_moves_table() {
        let table = PointerArray::new(DevicePtr::<DevicePtr<f32>>::from_addr(0x2000));
        assert_eq!(table.advance(4).table.addr(), 0x2000 + 4 * 8);
    }

    #[test]
    fn null_checks() {
        assert!(Single::new(DevicePtr::<f32>::null()).is_null());
        assert!(ScalarPtr::<f32>::Null.is_null());
        assert!(ScalarPtr::Device(DevicePtr::<f32>::null()).is_null());
        assert!(!ScalarPtr::Host(&1.0f32).is_null());
        assert!(ResultPtr::<f32>::Null.is_null());
    }

    #[test]
    fn api_width_flags() {
        assert!(!<i32 as ApiInt>::WIDE);
        assert!(<i64 as ApiInt>::WIDE);
        assert_eq!(7i32.get(), 7i64);
    }
}
