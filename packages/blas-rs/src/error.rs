use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::device::DeviceError;
use crate::handle::Handle;

/// Canonical error codes reported alongside [`Status`]. The codes are stable so
/// that callers can match on them without depending on enum discriminants.
pub mod codes {
    pub const SUCCESS: &str = "S_SUCCESS";
    /// The handle argument was absent.
    pub const INVALID_HANDLE: &str = "E_INVALID_HANDLE";
    /// The requested routine/type combination has no implementation.
    pub const NOT_IMPLEMENTED: &str = "E_NOT_IMPLEMENTED";
    /// A required pointer was null or lives in the wrong memory space.
    pub const INVALID_POINTER: &str = "E_INVALID_POINTER";
    /// Dimensions, increments, or leading dimensions were rejected.
    pub const INVALID_SIZE: &str = "E_INVALID_SIZE";
    /// Device memory could not be provided for the call.
    pub const MEMORY_ERROR: &str = "E_MEMORY_ERROR";
    /// An unexpected failure, including device faults and caught panics.
    pub const INTERNAL_ERROR: &str = "E_INTERNAL_ERROR";
    /// An enum argument is not allowed for this routine.
    pub const INVALID_VALUE: &str = "E_INVALID_VALUE";
    /// NaN or Inf was found while numerics checking was set to fail.
    pub const CHECK_NUMERICS_FAIL: &str = "E_CHECK_NUMERICS_FAIL";
}

/// Result status returned by every public routine.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Success = 0,
    InvalidHandle = 1,
    NotImplemented = 2,
    InvalidPointer = 3,
    InvalidSize = 4,
    MemoryError = 5,
    InternalError = 6,
    InvalidValue = 11,
    CheckNumericsFail = 13,
}

impl Status {
    pub const fn code(self) -> &'static str {
        match self {
            Status::Success => codes::SUCCESS,
            Status::InvalidHandle => codes::INVALID_HANDLE,
            Status::NotImplemented => codes::NOT_IMPLEMENTED,
            Status::InvalidPointer => codes::INVALID_POINTER,
            Status::InvalidSize => codes::INVALID_SIZE,
            Status::MemoryError => codes::MEMORY_ERROR,
            Status::InternalError => codes::INTERNAL_ERROR,
            Status::InvalidValue => codes::INVALID_VALUE,
            Status::CheckNumericsFail => codes::CHECK_NUMERICS_FAIL,
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    /// Converts the status into a `Result`, keeping the failing status as the error.
    pub fn into_result(self) -> Result<(), Status> {
        match self {
            Status::Success => Ok(()),
            other => Err(other),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Internal error type. Everything below the public boundary returns
/// `Result<_, BlasError>`; [`api_boundary`] reduces it to a [`Status`].
#[derive(Debug, Error)]
pub enum BlasError {
    #[error("invalid handle")]
    InvalidHandle,
    #[error("invalid pointer: {0}")]
    InvalidPointer(&'static str),
    #[error("invalid size: {0}")]
    InvalidSize(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("workspace of {required} bytes exceeds the {available} bytes reserved on the handle")]
    WorkspaceTooSmall { required: usize, available: usize },
    #[error("handle workspace is already lent to an in-flight call")]
    WorkspaceBusy,
    #[error("numerics check failed in `{routine}`: {detail}")]
    Numerics { routine: &'static str, detail: String },
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl BlasError {
    pub(crate) fn invalid_size(message: impl Into<String>) -> Self {
        BlasError::InvalidSize(message.into())
    }

    pub(crate) fn invalid_value(message: impl Into<String>) -> Self {
        BlasError::InvalidValue(message.into())
    }

    pub fn status(&self) -> Status {
        match self {
            BlasError::InvalidHandle => Status::InvalidHandle,
            BlasError::InvalidPointer(_) => Status::InvalidPointer,
            BlasError::InvalidSize(_) => Status::InvalidSize,
            BlasError::InvalidValue(_) => Status::InvalidValue,
            BlasError::WorkspaceTooSmall { .. } | BlasError::WorkspaceBusy => Status::MemoryError,
            BlasError::Numerics { .. } => Status::CheckNumericsFail,
            BlasError::NotImplemented(_) => Status::NotImplemented,
            BlasError::Device(DeviceError::OutOfMemory { .. }) => Status::MemoryError,
            BlasError::Device(_) | BlasError::Internal(_) => Status::InternalError,
        }
    }
}

impl From<BlasError> for Status {
    fn from(err: BlasError) -> Self {
        err.status()
    }
}

pub type BlasResult<T> = Result<T, BlasError>;

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Outermost adapter for every public routine: rejects a missing handle,
/// converts `BlasError` into a status, and turns panics into
/// [`Status::InternalError`] so nothing unwinds across the API.
pub(crate) fn api_boundary<F>(handle: Option<&Handle>, routine: &'static str, body: F) -> Status
where
    F: FnOnce(&Handle) -> BlasResult<()>,
{
    let Some(handle) = handle else {
        return Status::InvalidHandle;
    };
    status_boundary(routine, || body(handle))
}

/// Boundary for entry points that take no handle, such as the transfer helpers.
pub(crate) fn status_boundary<F>(routine: &'static str, body: F) -> Status
where
    F: FnOnce() -> BlasResult<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => Status::Success,
        Ok(Err(err)) => {
            let status = err.status();
            tracing::debug!(routine, status = status.code(), error = %err, "call rejected");
            status
        }
        Err(payload) => {
            tracing::error!(
                routine,
                panic = panic_message(payload.as_ref()),
                "internal fault caught at API boundary"
            );
            Status::InternalError
        }
    }
}
