//! Host export table exposing `forward` to a calling environment.
//!
//! An [`ExtensionModule`] is a named table of exported routines, each taking
//! host-side buffers ([`HostTensor`]) and returning one. The only routine
//! registered by [`extension_module`] is `forward`, which marshals its three
//! arguments into [`DynTensor`]s, calls [`crate::forward_dyn_with`] and
//! copies the result back out. All argument checking beyond arity is left to
//! the kernel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::KernelConfig;
use crate::dtype::DType;
use crate::error::AttentionError;
use crate::forward::forward_dyn_with;
use crate::tensor::{DynTensor, Tensor};

/// Name under which the extension module is exported.
pub const MODULE_NAME: &str = "custom_flash_attention";

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("module '{module}' has no function '{name}'")]
    UnknownFunction { module: String, name: String },

    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Kernel(#[from] AttentionError),
}

/// Typed element buffer handed over by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostData {
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl HostData {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(d) => d.len(),
            Self::F64(d) => d.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A host tensor handle: buffer plus optional strided layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostTensor {
    pub shape: Vec<usize>,
    /// Element strides; row-major when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strides: Option<Vec<usize>>,
    #[serde(default)]
    pub offset: usize,
    pub data: HostData,
}

impl HostTensor {
    #[must_use]
    pub fn f32(shape: &[usize], data: Vec<f32>) -> Self {
        Self {
            shape: shape.to_vec(),
            strides: None,
            offset: 0,
            data: HostData::F32(data),
        }
    }

    #[must_use]
    pub fn f64(shape: &[usize], data: Vec<f64>) -> Self {
        Self {
            shape: shape.to_vec(),
            strides: None,
            offset: 0,
            data: HostData::F64(data),
        }
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Wrap the host buffer as a kernel tensor view.
    ///
    /// # Errors
    ///
    /// Returns [`AttentionError::InvalidShape`] if the layout does not fit
    /// the buffer.
    pub fn to_tensor(&self) -> Result<DynTensor, AttentionError> {
        fn wrap<T: crate::dtype::Element>(
            h: &HostTensor,
            data: &[T],
        ) -> Result<Tensor<T>, AttentionError> {
            match (&h.strides, h.offset) {
                (None, 0) => Tensor::from_vec(data.to_vec(), &h.shape),
                (None, offset) => {
                    let strides = crate::layout::contiguous_strides(&h.shape);
                    Tensor::from_strided(data.to_vec(), &h.shape, &strides, offset)
                }
                (Some(strides), offset) => {
                    Tensor::from_strided(data.to_vec(), &h.shape, strides, offset)
                }
            }
        }
        Ok(match &self.data {
            HostData::F32(d) => DynTensor::F32(wrap(self, d)?),
            HostData::F64(d) => DynTensor::F64(wrap(self, d)?),
        })
    }

    /// Copy a kernel tensor out into a row-major host buffer.
    #[must_use]
    pub fn from_tensor(t: &DynTensor) -> Self {
        match t {
            DynTensor::F32(t) => Self::f32(t.shape(), t.to_vec()),
            DynTensor::F64(t) => Self::f64(t.shape(), t.to_vec()),
        }
    }
}

/// Signature of every exported routine.
pub type HostFn = fn(&KernelConfig, &[HostTensor]) -> Result<HostTensor, BindingError>;

#[derive(Clone)]
struct Export {
    func: HostFn,
    doc: &'static str,
}

/// A named table of exported routines.
#[derive(Clone)]
pub struct ExtensionModule {
    name: String,
    config: KernelConfig,
    exports: BTreeMap<&'static str, Export>,
}

impl std::fmt::Debug for ExtensionModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionModule")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("functions", &self.functions())
            .finish()
    }
}

impl ExtensionModule {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: KernelConfig::default(),
            exports: BTreeMap::new(),
        }
    }

    /// Kernel settings passed to every exported call.
    #[must_use]
    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register `func` under `name`, replacing any earlier export.
    pub fn def(&mut self, name: &'static str, func: HostFn, doc: &'static str) -> &mut Self {
        self.exports.insert(name, Export { func, doc });
        self
    }

    /// Exported names in sorted order.
    #[must_use]
    pub fn functions(&self) -> Vec<&'static str> {
        self.exports.keys().copied().collect()
    }

    #[must_use]
    pub fn doc(&self, name: &str) -> Option<&'static str> {
        self.exports.get(name).map(|e| e.doc)
    }

    /// Invoke an exported routine.
    ///
    /// # Errors
    ///
    /// [`BindingError::UnknownFunction`] if nothing is exported under `name`;
    /// otherwise whatever the routine returns.
    pub fn call(&self, name: &str, args: &[HostTensor]) -> Result<HostTensor, BindingError> {
        let export = self
            .exports
            .get(name)
            .ok_or_else(|| BindingError::UnknownFunction {
                module: self.name.clone(),
                name: name.to_string(),
            })?;
        log::debug!(
            "{}.{name}({})",
            self.name,
            args.iter()
                .map(|a| format!("{}{:?}", a.dtype(), a.shape))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let result = (export.func)(&self.config, args);
        if let Err(err) = &result {
            log::debug!("{}.{name} failed: {err}", self.name);
        }
        result
    }
}

/// Exported `forward(q, k, v)`.
fn forward_export(config: &KernelConfig, args: &[HostTensor]) -> Result<HostTensor, BindingError> {
    let [q, k, v] = args else {
        return Err(BindingError::Arity {
            name: "forward".to_string(),
            expected: 3,
            got: args.len(),
        });
    };
    let out = forward_dyn_with(config, &q.to_tensor()?, &k.to_tensor()?, &v.to_tensor()?)?;
    Ok(HostTensor::from_tensor(&out))
}

/// The `custom_flash_attention` module with `forward` registered.
#[must_use]
pub fn extension_module() -> ExtensionModule {
    let mut m = ExtensionModule::new(MODULE_NAME);
    m.def("forward", forward_export, "forward");
    m
}
