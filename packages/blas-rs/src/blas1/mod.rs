//! Level-1 reductions.

mod dot;
mod nrm2;
pub(crate) mod reduction;

pub use dot::{dot, dot_workspace_size, dotc};
pub use nrm2::{nrm2, nrm2_workspace_size};
pub use reduction::REDUCTION_BLOCK;
