//! Element types accepted by the attention kernel.

use std::fmt::Debug;

use num_traits::Float;
use serde::{Deserialize, Serialize};

/// Run-time tag for the floating-point element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F32,
    F64,
}

impl DType {
    /// Width of one element in bytes.
    #[must_use]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "f32" => Ok(Self::F32),
            "f64" => Ok(Self::F64),
            other => Err(format!("unknown dtype '{other}' (expected f32 or f64)")),
        }
    }
}

/// Floating-point element contract of the kernel.
///
/// The conversions are plain `as` casts: `from_len` is only used for
/// sequence and feature lengths, which are exact in both widths for any
/// length a real allocation can hold.
pub trait Element: Float + Send + Sync + Debug + Default + 'static {
    const DTYPE: DType;

    fn from_len(n: usize) -> Self;

    fn from_f64_lossy(x: f64) -> Self;

    fn as_f64(self) -> f64;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    #[inline]
    fn from_len(n: usize) -> Self {
        n as f32
    }

    #[inline]
    fn from_f64_lossy(x: f64) -> Self {
        x as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;

    #[inline]
    fn from_len(n: usize) -> Self {
        n as f64
    }

    #[inline]
    fn from_f64_lossy(x: f64) -> Self {
        x
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}
