//! Run configuration.
//!
//! Settings can come from a JSON file; command-line flags are layered on
//! top by the binary. Every field has a default, so `{}` is a valid file.

use crate::cpu::PcOverflow;
use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

/// How the register file is reported when a run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DumpFormat {
    None,
    /// `NAME: 0xHEX`, one register per line.
    #[default]
    Text,
    Json,
}

/// Options for a single run of the machine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Start address. Defaults to the first image's origin.
    pub entry: Option<u16>,
    /// Stop after this many instructions.
    pub max_cycles: Option<u64>,
    pub pc_overflow: PcOverflow,
    /// Log every executed instruction.
    pub trace: bool,
    pub dump: DumpFormat,
}

impl RunConfig {
    /// Load a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(RunConfig::from_json("{}").unwrap(), RunConfig::default());
    }

    #[test]
    fn test_full_config() {
        let config = RunConfig::from_json(
            r#"{"entry": 12288, "max_cycles": 500, "pc_overflow": "fault", "trace": true, "dump": "json"}"#,
        )
        .unwrap();

        assert_eq!(config.entry, Some(0x3000));
        assert_eq!(config.max_cycles, Some(500));
        assert_eq!(config.pc_overflow, PcOverflow::Fault);
        assert!(config.trace);
        assert_eq!(config.dump, DumpFormat::Json);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = RunConfig::from_json(r#"{"turbo": true}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = RunConfig::from_file("/nonexistent/lc3.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
