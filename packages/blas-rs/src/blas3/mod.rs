//! Level-3 routines.

mod trtri;

pub use trtri::{trtri, trtri_workspace_size, TRTRI_NB};
