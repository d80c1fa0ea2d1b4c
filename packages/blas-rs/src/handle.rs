use std::cell::{RefCell, RefMut};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use crate::batch::{BatchMode, ScalarArg, ScalarPtr};
use crate::config;
use crate::device::{Device, DeviceAllocation, DeviceError, DevicePtr, Stream};
use crate::dtype::DType;
use crate::error::{BlasError, BlasResult, Status};

/// Where scalar arguments and reduction results live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PointerMode {
    #[default]
    Host,
    Device,
}

/// Bit set selecting per-call log events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayerMode(u32);

impl LayerMode {
    pub const NONE: LayerMode = LayerMode(0);
    pub const LOG_TRACE: LayerMode = LayerMode(1);
    pub const LOG_BENCH: LayerMode = LayerMode(2);
    pub const LOG_PROFILE: LayerMode = LayerMode(4);

    pub const fn from_bits(bits: u32) -> Self {
        LayerMode(bits & 0b111)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: LayerMode) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl BitOr for LayerMode {
    type Output = LayerMode;

    fn bitor(self, rhs: LayerMode) -> LayerMode {
        LayerMode(self.0 | rhs.0)
    }
}

/// What to do when a routine with numerics checking sees NaN or Inf.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CheckNumerics {
    #[default]
    Off,
    Info,
    Warn,
    Fail,
}

impl CheckNumerics {
    pub const fn from_bits(bits: u32) -> Self {
        if bits & 4 != 0 {
            CheckNumerics::Fail
        } else if bits & 2 != 0 {
            CheckNumerics::Warn
        } else if bits & 1 != 0 {
            CheckNumerics::Info
        } else {
            CheckNumerics::Off
        }
    }
}

/// Answer of a workspace-size query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkspaceSize {
    /// The call needs no scratch memory; the handle's workspace is left as is.
    Unchanged,
    Bytes(usize),
}

impl WorkspaceSize {
    pub(crate) fn from_bytes(bytes: usize) -> Self {
        if bytes == 0 {
            WorkspaceSize::Unchanged
        } else {
            WorkspaceSize::Bytes(bytes)
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            WorkspaceSize::Unchanged => 0,
            WorkspaceSize::Bytes(bytes) => bytes,
        }
    }
}

#[derive(Default)]
struct Workspace {
    block: Option<DeviceAllocation>,
    /// Set when the caller fixed the workspace size; growth is then refused.
    fixed: Option<usize>,
}

/// Exclusive loan of the handle's workspace for one call.
pub(crate) struct WorkspaceLease<'h> {
    _slot: RefMut<'h, Workspace>,
    base: DevicePtr<u8>,
}

impl WorkspaceLease<'_> {
    pub(crate) fn ptr<T>(&self) -> DevicePtr<T> {
        self.base.cast()
    }
}

/// Identifies one public entry point in log events.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Routine {
    pub base: &'static str,
    pub dtype: DType,
    pub mode: BatchMode,
    pub wide: bool,
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            self.dtype.blas_prefix(),
            self.base,
            self.mode.suffix(),
            if self.wide { "_64" } else { "" }
        )
    }
}

/// Library context: device, stream, modes, and the cached workspace.
///
/// A handle is used from one thread at a time; it is deliberately `!Sync`.
pub struct Handle {
    device: Arc<Device>,
    stream: Stream,
    pointer_mode: PointerMode,
    layer_mode: LayerMode,
    check_numerics: CheckNumerics,
    workspace: RefCell<Workspace>,
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("device", &self.device.ordinal())
            .field("stream", &self.stream.id())
            .field("pointer_mode", &self.pointer_mode)
            .field("layer_mode", &self.layer_mode)
            .field("check_numerics", &self.check_numerics)
            .finish()
    }
}

impl Handle {
    /// Handle on the process-wide default device with a fresh stream.
    pub fn new() -> Self {
        Self::with_device(Device::default_device())
    }

    pub fn with_device(device: Arc<Device>) -> Self {
        let stream = Stream::new(&device);
        Self {
            device,
            stream,
            pointer_mode: PointerMode::Host,
            layer_mode: LayerMode::from_bits(config::layer_bits()),
            check_numerics: CheckNumerics::from_bits(config::check_numerics_bits()),
            workspace: RefCell::new(Workspace::default()),
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Replaces the stream work is issued on. Queued work on the old stream
    /// is not waited for.
    pub fn set_stream(&mut self, stream: Stream) {
        self.stream = stream;
    }

    pub fn pointer_mode(&self) -> PointerMode {
        self.pointer_mode
    }

    pub fn set_pointer_mode(&mut self, mode: PointerMode) {
        self.pointer_mode = mode;
    }

    pub fn layer_mode(&self) -> LayerMode {
        self.layer_mode
    }

    pub fn set_layer_mode(&mut self, mode: LayerMode) {
        self.layer_mode = mode;
    }

    pub fn check_numerics(&self) -> CheckNumerics {
        self.check_numerics
    }

    pub fn set_check_numerics(&mut self, mode: CheckNumerics) {
        self.check_numerics = mode;
    }

    pub fn synchronize(&self) -> Result<(), DeviceError> {
        self.stream.synchronize()
    }

    /// Reserves exactly `bytes` of workspace and stops automatic growth.
    /// Zero returns the handle to managed mode.
    pub fn set_device_memory_size(&mut self, bytes: usize) -> Status {
        let slot = self.workspace.get_mut();
        slot.block = None;
        if bytes == 0 {
            slot.fixed = None;
            return Status::Success;
        }
        match self.device.malloc(bytes) {
            Ok(block) => {
                slot.block = Some(block);
                slot.fixed = Some(bytes);
                Status::Success
            }
            Err(err) => {
                tracing::debug!(bytes, error = %err, "workspace reservation failed");
                slot.fixed = None;
                BlasError::from(err).status()
            }
        }
    }

    /// Bytes of workspace currently held.
    pub fn device_memory_size(&self) -> usize {
        self.workspace
            .try_borrow()
            .map(|slot| slot.block.as_ref().map_or(0, DeviceAllocation::len_bytes))
            .unwrap_or(0)
    }

    pub fn is_device_memory_size_managed(&self) -> bool {
        self.workspace
            .try_borrow()
            .map(|slot| slot.fixed.is_none())
            .unwrap_or(true)
    }

    /// Lends at least `bytes` of workspace to the calling routine.
    pub(crate) fn workspace(&self, bytes: usize) -> BlasResult<WorkspaceLease<'_>> {
        let mut slot = self
            .workspace
            .try_borrow_mut()
            .map_err(|_| BlasError::WorkspaceBusy)?;
        let held = slot.block.as_ref().map_or(0, DeviceAllocation::len_bytes);
        if bytes > held {
            if let Some(available) = slot.fixed {
                return Err(BlasError::WorkspaceTooSmall {
                    required: bytes,
                    available,
                });
            }
            slot.block = None;
            let block = self.device.malloc(bytes)?;
            tracing::debug!(bytes, "workspace grown");
            slot.block = Some(block);
        }
        let base = slot
            .block
            .as_ref()
            .map_or(DevicePtr::null(), |block| block.ptr());
        Ok(WorkspaceLease {
            _slot: slot,
            base,
        })
    }

    /// Interprets a scalar argument under the current pointer mode.
    /// `None` means the pointer was null.
    pub(crate) fn scalar<T: Copy>(
        &self,
        name: &'static str,
        scalar: ScalarPtr<'_, T>,
    ) -> BlasResult<Option<ScalarArg<T>>> {
        match (self.pointer_mode, scalar) {
            (_, ScalarPtr::Null) => Ok(None),
            (PointerMode::Host, ScalarPtr::Host(value)) => Ok(Some(ScalarArg::Value(*value))),
            (PointerMode::Device, ScalarPtr::Device(ptr)) if ptr.is_null() => Ok(None),
            (PointerMode::Device, ScalarPtr::Device(ptr)) => Ok(Some(ScalarArg::Device(ptr))),
            (PointerMode::Host, ScalarPtr::Device(_)) | (PointerMode::Device, ScalarPtr::Host(_)) => {
                Err(BlasError::InvalidPointer(name))
            }
        }
    }

    /// Emits the per-call events selected by the layer mode.
    pub(crate) fn log_call(&self, routine: &Routine, args: fmt::Arguments<'_>) {
        if self.layer_mode.contains(LayerMode::LOG_TRACE) {
            tracing::trace!(target: "num_rs_blas::trace", "{routine},{args}");
        }
        if self.layer_mode.contains(LayerMode::LOG_BENCH) {
            tracing::info!(
                target: "num_rs_blas::bench",
                "-f {}{} -r {} {args}",
                routine.base,
                routine.mode.suffix(),
                routine.dtype.as_str()
            );
        }
        if self.layer_mode.contains(LayerMode::LOG_PROFILE) {
            tracing::debug!(
                target: "num_rs_blas::profile",
                routine = %routine,
                pointer_mode = ?self.pointer_mode,
                "call"
            );
        }
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_must_match_pointer_mode() {
        let mut handle = Handle::with_device(Device::with_memory(1 << 20));
        let alpha = 2.0f64;
        assert!(matches!(
            handle.scalar("alpha", ScalarPtr::Host(&alpha)),
            Ok(Some(ScalarArg::Value(v))) if v == 2.0
        ));
        assert!(handle
            .scalar("alpha", ScalarPtr::Device(DevicePtr::<f64>::from_addr(64)))
            .is_err());
        handle.set_pointer_mode(PointerMode::Device);
        assert!(handle.scalar("alpha", ScalarPtr::Host(&alpha)).is_err());
        assert!(matches!(
            handle.scalar("alpha", ScalarPtr::Device(DevicePtr::<f64>::null())),
            Ok(None)
        ));
    }

    #[test]
    fn managed_workspace_grows_and_is_exclusive() {
        let handle = Handle::with_device(Device::with_memory(1 << 20));
        {
            let lease = handle.workspace(512).expect("lease");
            assert!(!lease.ptr::<u8>().is_null());
            assert!(matches!(handle.workspace(16), Err(BlasError::WorkspaceBusy)));
        }
        assert_eq!(handle.device_memory_size(), 512);
        drop(handle.workspace(2048).expect("grow"));
        assert_eq!(handle.device_memory_size(), 2048);
        assert!(handle.is_device_memory_size_managed());
    }

    #[test]
    fn fixed_workspace_refuses_growth() {
        let mut handle = Handle::with_device(Device::with_memory(1 << 20));
        assert_eq!(handle.set_device_memory_size(256), Status::Success);
        assert!(!handle.is_device_memory_size_managed());
        let err = handle.workspace(1024).err().expect("too small");
        assert_eq!(err.status(), Status::MemoryError);
        assert_eq!(handle.set_device_memory_size(0), Status::Success);
        assert!(handle.workspace(1024).is_ok());
    }

    #[test]
    fn reservation_beyond_capacity_is_memory_error() {
        let mut handle = Handle::with_device(Device::with_memory(1024));
        assert_eq!(handle.set_device_memory_size(4096), Status::MemoryError);
    }

    #[test]
    fn layer_and_numerics_bits() {
        let mode = LayerMode::LOG_TRACE | LayerMode::LOG_PROFILE;
        assert!(mode.contains(LayerMode::LOG_TRACE));
        assert!(!mode.contains(LayerMode::LOG_BENCH));
        assert!(!mode.contains(LayerMode::NONE));
        assert_eq!(CheckNumerics::from_bits(6), CheckNumerics::Fail);
        assert_eq!(CheckNumerics::from_bits(1), CheckNumerics::Info);
    }

    #[test]
    fn routine_names_carry_type_mode_and_width() {
        let routine = Routine {
            base: "trtri",
            dtype: DType::Float64,
            mode: BatchMode::Strided,
            wide: true,
        };
        assert_eq!(routine.to_string(), "dtrtri_strided_batched_64");
    }
}
