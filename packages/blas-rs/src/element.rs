use std::fmt::Debug;
use std::ops::Neg;

use half::{bf16, f16};
use num_complex::{Complex, Complex32, Complex64};
use num_traits::{Float, NumAssign};

use crate::dtype::DType;

/// Arithmetic type used for accumulation on the device and in the oracle.
/// Implemented for `f32`, `f64` and their complex counterparts.
pub trait Scalar:
    bytemuck::Pod + NumAssign + Neg<Output = Self> + Debug + PartialEq + Send + Sync + 'static
{
    type Real: RealScalar;

    fn from_real(re: Self::Real) -> Self;
    fn from_wide(value: Complex64) -> Self;
    fn widen(self) -> Complex64;
    fn conj(self) -> Self;
    fn re(self) -> Self::Real;
    /// Squared modulus, `|z|^2`.
    fn abs_sq(self) -> Self::Real;
}

pub trait RealScalar: Scalar<Real = Self> + Float {
    fn as_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_real_scalar {
    ($t:ty) => {
        impl Scalar for $t {
            type Real = $t;

            fn from_real(re: $t) -> Self {
                re
            }
            fn from_wide(value: Complex64) -> Self {
                value.re as $t
            }
            fn widen(self) -> Complex64 {
                Complex64::new(self as f64, 0.0)
            }
            fn conj(self) -> Self {
                self
            }
            fn re(self) -> $t {
                self
            }
            fn abs_sq(self) -> $t {
                self * self
            }
        }

        impl RealScalar for $t {
            fn as_f64(self) -> f64 {
                self as f64
            }
            fn from_f64(value: f64) -> Self {
                value as $t
            }
        }
    };
}

impl_real_scalar!(f32);
impl_real_scalar!(f64);

macro_rules! impl_complex_scalar {
    ($t:ty) => {
        impl Scalar for Complex<$t> {
            type Real = $t;

            fn from_real(re: $t) -> Self {
                Complex::new(re, 0.0)
            }
            fn from_wide(value: Complex64) -> Self {
                Complex::new(value.re as $t, value.im as $t)
            }
            fn widen(self) -> Complex64 {
                Complex64::new(self.re as f64, self.im as f64)
            }
            fn conj(self) -> Self {
                Complex::new(self.re, -self.im)
            }
            fn re(self) -> $t {
                self.re
            }
            fn abs_sq(self) -> $t {
                self.re * self.re + self.im * self.im
            }
        }
    };
}

impl_complex_scalar!(f32);
impl_complex_scalar!(f64);

/// Storage element of a BLAS buffer.
///
/// `Compute` is what kernels accumulate in; `Reference` is what the host oracle
/// accumulates in. They only differ from the storage type for half and
/// bfloat16, which compute in `f32` on the device and `f64` on the host.
pub trait Element: bytemuck::Pod + Debug + PartialEq + Send + Sync + 'static {
    const DTYPE: DType;
    /// Per-element error allowance for long sums, scaled by `n`.
    const SUM_ERROR_TOLERANCE: f64;
    /// Decimal digits the type represents without change.
    const DIGITS10: i32;
    /// ULP slack accepted by the unit check.
    const UNIT_ULPS: u64;

    type Compute: Scalar;
    type Reference: Scalar;
    /// Storage type of real-valued results such as norms.
    type Norm: Element;

    fn to_compute(self) -> Self::Compute;
    fn from_compute(value: Self::Compute) -> Self;
    fn to_reference(self) -> Self::Reference;
    fn from_reference(value: Self::Reference) -> Self;

    /// Builds a value from real and imaginary parts; real types drop `im`.
    fn from_parts(re: f64, im: f64) -> Self;
    fn to_c64(self) -> Complex64;

    fn eq_zero(self) -> bool {
        self.to_c64() == Complex64::new(0.0, 0.0)
    }

    fn eq_one(self) -> bool {
        self.to_c64() == Complex64::new(1.0, 0.0)
    }

    fn all_finite(self) -> bool {
        let value = self.to_c64();
        value.re.is_finite() && value.im.is_finite()
    }

    fn has_nan(self) -> bool {
        let value = self.to_c64();
        value.re.is_nan() || value.im.is_nan()
    }

    /// Largest ULP distance between corresponding components, or `u64::MAX`
    /// when exactly one side is NaN. NaN against NaN counts as equal.
    fn ulps_from(self, other: Self) -> u64;
}

/// Types served by the level-2 and level-3 routines.
pub trait StandardElement: Element<Compute = Self, Reference = Self> + Scalar {}
/// Real standard types (`spr2`).
pub trait RealElement: StandardElement + RealScalar {}
/// Complex standard types (`hpmv`, `her2`, `hbmv`).
pub trait ComplexElement: StandardElement {}

impl StandardElement for f32 {}
impl StandardElement for f64 {}
impl StandardElement for Complex32 {}
impl StandardElement for Complex64 {}
impl RealElement for f32 {}
impl RealElement for f64 {}
impl ComplexElement for Complex32 {}
impl ComplexElement for Complex64 {}

fn ordered_bits(bits: i64, sign_bit: i64) -> i64 {
    if bits & sign_bit != 0 {
        sign_bit - bits
    } else {
        bits
    }
}

fn ulp_distance(a: f64, b: f64, a_bits: i64, b_bits: i64, sign_bit: i64) -> u64 {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => 0,
        (true, false) | (false, true) => u64::MAX,
        (false, false) => {
            let a = ordered_bits(a_bits, sign_bit);
            let b = ordered_bits(b_bits, sign_bit);
            a.abs_diff(b)
        }
    }
}

fn ulps_f32(a: f32, b: f32) -> u64 {
    ulp_distance(
        a as f64,
        b as f64,
        a.to_bits() as i64,
        b.to_bits() as i64,
        1 << 31,
    )
}

fn ulps_f64(a: f64, b: f64) -> u64 {
    if a.is_nan() || b.is_nan() {
        return ulp_distance(a, b, 0, 0, 1);
    }
    let (a, b) = (a.to_bits(), b.to_bits());
    let order = |bits: u64| -> i128 {
        if bits >> 63 == 1 {
            -((bits & !(1u64 << 63)) as i128)
        } else {
            bits as i128
        }
    };
    (order(a) - order(b)).unsigned_abs().min(u64::MAX as u128) as u64
}

fn ulps_16(a: f64, b: f64, a_bits: u16, b_bits: u16) -> u64 {
    ulp_distance(a, b, a_bits as i64, b_bits as i64, 1 << 15)
}

macro_rules! impl_real_element {
    ($t:ty, $dtype:expr, $tol:expr, $digits:expr, $ulps:expr, $ulp_fn:ident) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;
            const SUM_ERROR_TOLERANCE: f64 = $tol;
            const DIGITS10: i32 = $digits;
            const UNIT_ULPS: u64 = $ulps;

            type Compute = $t;
            type Reference = $t;
            type Norm = $t;

            fn to_compute(self) -> $t {
                self
            }
            fn from_compute(value: $t) -> Self {
                value
            }
            fn to_reference(self) -> $t {
                self
            }
            fn from_reference(value: $t) -> Self {
                value
            }
            fn from_parts(re: f64, _im: f64) -> Self {
                re as $t
            }
            fn to_c64(self) -> Complex64 {
                Complex64::new(self as f64, 0.0)
            }
            fn ulps_from(self, other: Self) -> u64 {
                $ulp_fn(self, other)
            }
        }
    };
}

impl_real_element!(f32, DType::Float32, 1.0 / 10_000.0, 6, 4, ulps_f32);
impl_real_element!(f64, DType::Float64, 1.0 / 1_000_000_000_000.0, 15, 4, ulps_f64);

macro_rules! impl_complex_element {
    ($t:ty, $dtype:expr, $ulp_fn:ident) => {
        impl Element for Complex<$t> {
            const DTYPE: DType = $dtype;
            const SUM_ERROR_TOLERANCE: f64 = <$t as Element>::SUM_ERROR_TOLERANCE;
            const DIGITS10: i32 = <$t as Element>::DIGITS10;
            const UNIT_ULPS: u64 = <$t as Element>::UNIT_ULPS;

            type Compute = Complex<$t>;
            type Reference = Complex<$t>;
            type Norm = $t;

            fn to_compute(self) -> Self {
                self
            }
            fn from_compute(value: Self) -> Self {
                value
            }
            fn to_reference(self) -> Self {
                self
            }
            fn from_reference(value: Self) -> Self {
                value
            }
            fn from_parts(re: f64, im: f64) -> Self {
                Complex::new(re as $t, im as $t)
            }
            fn to_c64(self) -> Complex64 {
                Complex64::new(self.re as f64, self.im as f64)
            }
            fn ulps_from(self, other: Self) -> u64 {
                $ulp_fn(self.re, other.re).max($ulp_fn(self.im, other.im))
            }
        }
    };
}

impl_complex_element!(f32, DType::Complex32, ulps_f32);
impl_complex_element!(f64, DType::Complex64, ulps_f64);

macro_rules! impl_reduced_element {
    ($t:ty, $dtype:expr, $tol:expr, $digits:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;
            const SUM_ERROR_TOLERANCE: f64 = $tol;
            const DIGITS10: i32 = $digits;
            const UNIT_ULPS: u64 = 0;

            type Compute = f32;
            type Reference = f64;
            type Norm = $t;

            fn to_compute(self) -> f32 {
                self.to_f32()
            }
            fn from_compute(value: f32) -> Self {
                <$t>::from_f32(value)
            }
            fn to_reference(self) -> f64 {
                self.to_f64()
            }
            fn from_reference(value: f64) -> Self {
                <$t>::from_f64(value)
            }
            fn from_parts(re: f64, _im: f64) -> Self {
                <$t>::from_f64(re)
            }
            fn to_c64(self) -> Complex64 {
                Complex64::new(self.to_f64(), 0.0)
            }
            fn ulps_from(self, other: Self) -> u64 {
                ulps_16(self.to_f64(), other.to_f64(), self.to_bits(), other.to_bits())
            }
        }
    };
}

impl_reduced_element!(f16, DType::Float16, 1.0 / 900.0, 3);
impl_reduced_element!(bf16, DType::BFloat16, 1.0 / 100.0, 2);

/// Converts a compute-type real (norms, squared sums) into the storage real of `T`.
pub(crate) fn norm_from_compute<T: Element>(value: <T::Compute as Scalar>::Real) -> T::Norm {
    <T::Norm as Element>::from_parts(value.as_f64(), 0.0)
}

/// Converts a reference-type real into the storage real of `T`.
pub(crate) fn norm_from_reference<T: Element>(value: <T::Reference as Scalar>::Real) -> T::Norm {
    <T::Norm as Element>::from_parts(value.as_f64(), 0.0)
}
