//! Batched dense linear algebra on a stream-ordered accelerator model.
//!
//! Every routine comes in single, strided-batched and pointer-array-batched
//! form through the [`batch::BatchAddress`] operand types, and in 32- and
//! 64-bit API integer widths through [`batch::ApiInt`]. Routines report a
//! [`Status`]; device work is queued on the handle's stream.

pub mod batch;
pub mod blas1;
pub mod blas2;
pub mod blas3;
pub mod buffer;
pub mod compare;
pub mod config;
pub mod device;
pub mod dtype;
pub mod element;
pub mod error;
pub mod handle;
pub mod harness;
pub mod init;
pub mod int64;
pub mod layout;
mod macros;
pub mod metrics;
mod numerics;
pub mod reference;
pub mod transfer;

pub use batch::{ApiInt, BatchAddress, BatchMode, PointerArray, ResultPtr, ScalarPtr, Single, Strided};
pub use blas1::{dot, dot_workspace_size, dotc, nrm2, nrm2_workspace_size};
pub use blas2::{hbmv, her2, hpmv, spr2, tpsv};
pub use blas3::{trtri, trtri_workspace_size};
pub use buffer::{BindBatch, DeviceBatch, HostBatch, Shape};
pub use device::{Device, DeviceError, DevicePtr, PinnedBuffer, Stream};
pub use dtype::DType;
pub use element::{ComplexElement, Element, RealElement, StandardElement};
pub use error::{BlasError, BlasResult, Status};
pub use handle::{CheckNumerics, Handle, LayerMode, PointerMode, WorkspaceSize};
pub use layout::{Diagonal, Fill, Operation};
pub use metrics::{d2h_bytes_total, h2d_bytes_total, launches_total, take_launches};
pub use numerics::NumericsSummary;
pub use transfer::{get_matrix, get_matrix_async, get_vector, set_matrix, set_matrix_async, set_vector};
