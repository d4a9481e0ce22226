//! Kernel configuration: backend choice, tiling and parallelism.
//!
//! None of these settings change the result beyond floating-point
//! reassociation between backends; they only trade memory for speed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kernels::Backend;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Execution settings for [`crate::forward_with`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    pub backend: Backend,
    /// Keys per tile in the flash backend.
    pub tile_size: usize,
    /// Spread work across the rayon pool.
    pub parallel: bool,
    /// Smallest number of query rows handed to one rayon task.
    pub min_rows_per_task: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Flash,
            tile_size: 32,
            parallel: true,
            min_rows_per_task: 16,
        }
    }
}

impl KernelConfig {
    /// Same settings, run on the calling thread only.
    #[must_use]
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `tile_size` or
    /// `min_rows_per_task` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size == 0 {
            return Err(ConfigError::Invalid {
                field: "tile_size",
                reason: "must be > 0".to_string(),
            });
        }
        if self.min_rows_per_task == 0 {
            return Err(ConfigError::Invalid {
                field: "min_rows_per_task",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse and validate a YAML config file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read,
/// [`ConfigError::Yaml`] if the YAML is malformed, or
/// [`ConfigError::Invalid`] if a value is out of range.
pub fn load_config(path: &Path) -> Result<KernelConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config_str(&content)?;
    log::debug!("loaded kernel config from {}: {config:?}", path.display());
    Ok(config)
}

/// Parse and validate a YAML config string.
///
/// An empty document yields the defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] or [`ConfigError::Invalid`].
pub fn parse_config_str(yaml: &str) -> Result<KernelConfig, ConfigError> {
    let config: KernelConfig = if yaml.trim().is_empty() {
        KernelConfig::default()
    } else {
        serde_yaml::from_str(yaml)?
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yields_defaults() {
        assert_eq!(parse_config_str("").unwrap(), KernelConfig::default());
    }

    #[test]
    fn partial_overrides() {
        let cfg = parse_config_str("backend: naive\ntile_size: 8\n").unwrap();
        assert_eq!(cfg.backend, Backend::Naive);
        assert_eq!(cfg.tile_size, 8);
        assert!(cfg.parallel);
        assert_eq!(cfg.min_rows_per_task, 16);
    }

    #[test]
    fn unknown_field_rejected() {
        let err = parse_config_str("tile: 8\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn zero_tile_rejected() {
        let err = parse_config_str("tile_size: 0\n").unwrap_err();
        assert!(err.to_string().contains("tile_size"));
    }

    #[test]
    fn zero_rows_per_task_rejected() {
        let err = parse_config_str("min_rows_per_task: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "min_rows_per_task", .. }));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.yaml");
        std::fs::write(&path, "parallel: false\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert!(!cfg.parallel);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/kernel.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn yaml_roundtrip() {
        let cfg = KernelConfig::default().with_backend(Backend::Naive).sequential();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        assert_eq!(parse_config_str(&yaml).unwrap(), cfg);
    }
}
