//! Per-slice attention kernels and the primitives they share.
//!
//! Each backend computes one batch slice (`Lq x D` queries against
//! `Lk x D` keys and `Lk x Dv` values):
//! - [`attention`] -- naive reference that materializes the score matrix
//! - [`flash_attention`] -- tiled online softmax, one query row at a time

// Kernel code naturally uses single-character math variable names (m, n, k, q, v, etc.).
#![allow(
    clippy::many_single_char_names,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::needless_range_loop,
    clippy::float_cmp,
    clippy::doc_markdown
)]

pub mod ulp;
pub mod ops;

pub mod attention;
pub mod flash_attention;

use serde::{Deserialize, Serialize};

/// Backend selector for kernel dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Materializes the per-slice score matrix; parallel over batch slices.
    Naive,
    /// Tiled online softmax; parallel over query rows.
    #[default]
    Flash,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Naive => "naive",
            Self::Flash => "flash",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "naive" => Ok(Self::Naive),
            "flash" => Ok(Self::Flash),
            other => Err(format!("unknown backend '{other}' (expected naive or flash)")),
        }
    }
}
