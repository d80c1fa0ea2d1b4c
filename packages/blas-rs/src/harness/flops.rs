//! Floating-point operation counts per problem instance, used for GFLOP/s.
//! A complex multiply-add counts as eight real operations.

use crate::dtype::DType;

fn muladd(dtype: DType) -> f64 {
    if dtype.is_complex() {
        8.0
    } else {
        2.0
    }
}

pub(crate) fn dot(dtype: DType, n: usize) -> f64 {
    muladd(dtype) * n as f64
}

pub(crate) fn nrm2(dtype: DType, n: usize) -> f64 {
    let per_element = if dtype.is_complex() { 4.0 } else { 2.0 };
    per_element * n as f64
}

pub(crate) fn tpsv(dtype: DType, n: usize) -> f64 {
    let n = n as f64;
    muladd(dtype) * n * n / 2.0
}

pub(crate) fn hpmv(dtype: DType, n: usize) -> f64 {
    let n = n as f64;
    muladd(dtype) * n * n
}

pub(crate) fn hbmv(dtype: DType, n: usize, k: usize) -> f64 {
    let n = n as f64;
    let k = (k as f64).min(n);
    muladd(dtype) * n * (2.0 * k + 1.0)
}

/// Rank-2 updates touch `n (n + 1) / 2` entries with two multiply-adds each.
pub(crate) fn rank2(dtype: DType, n: usize) -> f64 {
    let n = n as f64;
    muladd(dtype) * n * (n + 1.0)
}

pub(crate) fn trtri(dtype: DType, n: usize) -> f64 {
    let n = n as f64;
    muladd(dtype) * n * n * n / 6.0
}
