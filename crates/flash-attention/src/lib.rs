//! # flash-attention
//!
//! Batched scaled-dot-product attention on the CPU.
//!
//! [`forward()`] takes `q: [..., Lq, D]`, `k: [..., Lk, D]` and
//! `v: [..., Lk, Dv]` and returns `softmax(q k^T / sqrt(D)) v` with shape
//! `[..., Lq, Dv]`. The default backend never materializes the score matrix:
//! it streams keys in tiles and keeps a running max and sum per query row,
//! so large logits cannot overflow the exponentials.
//!
//! ## Modules
//!
//! - [`mod@forward`] -- Shape checking and the batched entry points
//! - [`kernels`] -- Per-slice naive and tiled kernels, softmax primitives
//! - [`tensor`] -- Shared-buffer strided tensors
//! - [`layout`] -- Shape/stride arithmetic and batch unravelling
//! - [`dtype`] -- Element types and the [`Element`] trait
//! - [`config`] -- YAML kernel configuration
//! - [`binding`] -- Host export table (`custom_flash_attention.forward`)
//! - [`error`] -- Error types

pub mod binding;
pub mod config;
pub mod dtype;
pub mod error;
pub mod forward;
pub mod kernels;
pub mod layout;
pub mod tensor;

pub use config::KernelConfig;
pub use dtype::{DType, Element};
pub use error::{AttentionError, Result};
pub use forward::{
    AttentionShape, attention_weights, attention_weights_with, check_shapes, forward, forward_dyn,
    forward_dyn_with, forward_with,
};
pub use kernels::Backend;
pub use layout::Layout;
pub use tensor::{DynTensor, Tensor};
