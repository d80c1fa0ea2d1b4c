#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    Float16,
    BFloat16,
    Float32,
    Float64,
    Complex32,
    Complex64,
}

impl DType {
    pub const fn size_of(self) -> usize {
        match self {
            DType::Float16 | DType::BFloat16 => 2,
            DType::Float32 => 4,
            DType::Float64 | DType::Complex32 => 8,
            DType::Complex64 => 16,
        }
    }

    pub const fn is_complex(self) -> bool {
        matches!(self, DType::Complex32 | DType::Complex64)
    }

    /// Half and bfloat16 accumulate in a wider type and get scaled tolerances.
    pub const fn is_reduced_precision(self) -> bool {
        matches!(self, DType::Float16 | DType::BFloat16)
    }

    /// Routine-name prefix used in log lines (`sdot`, `ztrtri`, ...).
    pub const fn blas_prefix(self) -> &'static str {
        match self {
            DType::Float16 => "h",
            DType::BFloat16 => "bf",
            DType::Float32 => "s",
            DType::Float64 => "d",
            DType::Complex32 => "c",
            DType::Complex64 => "z",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            DType::Float16 => "f16_r",
            DType::BFloat16 => "bf16_r",
            DType::Float32 => "f32_r",
            DType::Float64 => "f64_r",
            DType::Complex32 => "f32_c",
            DType::Complex64 => "f64_c",
        }
    }
}

impl core::str::FromStr for DType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "f16_r" | "h" => Ok(DType::Float16),
            "bf16_r" | "bf" => Ok(DType::BFloat16),
            "f32_r" | "s" => Ok(DType::Float32),
            "f64_r" | "d" => Ok(DType::Float64),
            "f32_c" | "c" => Ok(DType::Complex32),
            "f64_c" | "z" => Ok(DType::Complex64),
            other => Err(format!("unknown dtype '{other}'")),
        }
    }
}

impl core::fmt::Display for DType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
