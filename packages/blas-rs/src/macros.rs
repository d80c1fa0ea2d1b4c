/// Dispatch a `DType` to its element type (`half::f16` ... `Complex64`).
///
/// ```
/// # use num_rs_blas::{dtype::DType, match_blas_dtype};
/// let dtype = DType::Complex32;
/// let size = match_blas_dtype!(dtype, Ty, {
///     std::mem::size_of::<Ty>()
/// });
/// assert_eq!(size, 8);
/// ```
#[macro_export]
macro_rules! match_blas_dtype {
    ($dtype:expr, $T:ident, $body:block) => {{
        #[allow(non_snake_case)]
        match $dtype {
            $crate::dtype::DType::Float16 => {
                type $T = ::half::f16;
                $body
            }
            $crate::dtype::DType::BFloat16 => {
                type $T = ::half::bf16;
                $body
            }
            $crate::dtype::DType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::Float64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::DType::Complex32 => {
                type $T = ::num_complex::Complex32;
                $body
            }
            $crate::dtype::DType::Complex64 => {
                type $T = ::num_complex::Complex64;
                $body
            }
        }
    }};
}

/// Dispatch to the single and double precision types, real and complex.
#[macro_export]
macro_rules! match_standard_dtype {
    ($dtype:expr, $T:ident, $body:block, fallback $fallback:expr) => {{
        #[allow(non_snake_case)]
        match $dtype {
            $crate::dtype::DType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::Float64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::DType::Complex32 => {
                type $T = ::num_complex::Complex32;
                $body
            }
            $crate::dtype::DType::Complex64 => {
                type $T = ::num_complex::Complex64;
                $body
            }
            _ => $fallback,
        }
    }};
    ($dtype:expr, $T:ident, $body:block) => {{
        $crate::match_standard_dtype!(
            $dtype,
            $T,
            $body,
            fallback panic!("unsupported standard dtype: {:?}", $dtype)
        )
    }};
}

/// Dispatch to `f32` and `f64`.
#[macro_export]
macro_rules! match_real_dtype {
    ($dtype:expr, $T:ident, $body:block, fallback $fallback:expr) => {{
        #[allow(non_snake_case)]
        match $dtype {
            $crate::dtype::DType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::Float64 => {
                type $T = f64;
                $body
            }
            _ => $fallback,
        }
    }};
    ($dtype:expr, $T:ident, $body:block) => {{
        $crate::match_real_dtype!(
            $dtype,
            $T,
            $body,
            fallback panic!("unsupported real dtype: {:?}", $dtype)
        )
    }};
}

/// Dispatch to `Complex32` and `Complex64`.
#[macro_export]
macro_rules! match_complex_dtype {
    ($dtype:expr, $T:ident, $body:block, fallback $fallback:expr) => {{
        #[allow(non_snake_case)]
        match $dtype {
            $crate::dtype::DType::Complex32 => {
                type $T = ::num_complex::Complex32;
                $body
            }
            $crate::dtype::DType::Complex64 => {
                type $T = ::num_complex::Complex64;
                $body
            }
            _ => $fallback,
        }
    }};
    ($dtype:expr, $T:ident, $body:block) => {{
        $crate::match_complex_dtype!(
            $dtype,
            $T,
            $body,
            fallback panic!("unsupported complex dtype: {:?}", $dtype)
        )
    }};
}

/// Helper macro to iterate over all element types.
#[macro_export]
macro_rules! for_each_blas_dtype {
    ($mac:ident) => {
        $mac!($crate::dtype::DType::Float16, ::half::f16);
        $mac!($crate::dtype::DType::BFloat16, ::half::bf16);
        $mac!($crate::dtype::DType::Float32, f32);
        $mac!($crate::dtype::DType::Float64, f64);
        $mac!($crate::dtype::DType::Complex32, ::num_complex::Complex32);
        $mac!($crate::dtype::DType::Complex64, ::num_complex::Complex64);
    };
}
