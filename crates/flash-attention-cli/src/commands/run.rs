use std::path::Path;

use flash_attention::DType;
use flash_attention::KernelConfig;
use flash_attention::binding::{HostData, HostTensor, extension_module};
use serde::{Deserialize, Serialize};

/// One input tensor. Values are read as numbers and narrowed to `dtype`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InputTensor {
    shape: Vec<usize>,
    data: Vec<f64>,
    dtype: Option<DType>,
    strides: Option<Vec<usize>>,
    #[serde(default)]
    offset: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunInput {
    /// Element type for tensors that do not name their own (default f32).
    dtype: Option<DType>,
    q: InputTensor,
    k: InputTensor,
    v: InputTensor,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OutputData {
    F32(Vec<f32>),
    F64(Vec<f64>),
}

#[derive(Debug, Serialize)]
struct RunOutput {
    dtype: DType,
    shape: Vec<usize>,
    data: OutputData,
}

impl InputTensor {
    fn into_host(self, default: DType) -> HostTensor {
        #[allow(clippy::cast_possible_truncation)]
        let data = match self.dtype.unwrap_or(default) {
            DType::F32 => HostData::F32(self.data.iter().map(|&x| x as f32).collect()),
            DType::F64 => HostData::F64(self.data),
        };
        HostTensor {
            shape: self.shape,
            strides: self.strides,
            offset: self.offset,
            data,
        }
    }
}

fn parse_input(path: &Path) -> Result<RunInput, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    Ok(serde_yaml::from_str(&content)?)
}

pub fn run(config: &KernelConfig, input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let RunInput { dtype, q, k, v } = parse_input(input)?;
    let default = dtype.unwrap_or(DType::F32);
    let args = [q.into_host(default), k.into_host(default), v.into_host(default)];

    let module = extension_module().with_config(config.clone());
    let out = module.call("forward", &args)?;

    let output = RunOutput {
        dtype: out.dtype(),
        shape: out.shape,
        data: match out.data {
            HostData::F32(d) => OutputData::F32(d),
            HostData::F64(d) => OutputData::F64(d),
        },
    };
    print!("{}", serde_yaml::to_string(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_tensor_dtype_overrides_default() {
        let input: RunInput = serde_yaml::from_str(
            "dtype: f64\n\
             q: {shape: [1, 1], data: [1.0]}\n\
             k: {shape: [1, 1], data: [1.0], dtype: f32}\n\
             v: {shape: [1, 1], data: [2.5]}\n",
        )
        .unwrap();
        let default = input.dtype.unwrap();
        assert_eq!(input.q.into_host(default).dtype(), DType::F64);
        assert_eq!(input.k.into_host(default).dtype(), DType::F32);
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = serde_yaml::from_str::<RunInput>(
            "q: {shape: [1, 1], data: [1.0]}\n\
             k: {shape: [1, 1], data: [1.0]}\n\
             v: {shape: [1, 1], data: [1.0]}\n\
             mask: {shape: [1, 1], data: [1.0]}\n",
        );
        assert!(err.is_err());
    }

    #[test]
    fn output_yaml_is_flat() {
        let out = RunOutput {
            dtype: DType::F32,
            shape: vec![1, 2],
            data: OutputData::F32(vec![0.5, 1.5]),
        };
        let yaml = serde_yaml::to_string(&out).unwrap();
        assert!(yaml.contains("dtype: f32"));
        assert!(yaml.contains("- 0.5"));
        assert!(!yaml.contains("F32"));
    }
}
