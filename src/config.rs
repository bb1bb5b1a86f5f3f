//! Runtime configuration for the trust-accounting core

use serde::Deserialize;

use crate::types::TrustResult;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrustConfig {
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub sequence: SequenceConfig,
}

/// Reconciliation matcher settings
#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// Fall back to date/amount/type matching when no reference matches
    #[serde(default = "default_true")]
    pub fuzzy_matching: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            fuzzy_matching: true,
        }
    }
}

/// Approval workflow settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalConfig {
    /// Let the administrator role pass capability checks
    #[serde(default = "default_true")]
    pub administrator_override: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            administrator_override: true,
        }
    }
}

/// Case-number formatting
#[derive(Debug, Clone, Deserialize)]
pub struct SequenceConfig {
    /// Zero-padded width of the numeric part
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            separator: default_separator(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_width() -> usize {
    5
}

fn default_separator() -> String {
    "-".to_string()
}

impl TrustConfig {
    /// Load from an optional `config/iolta` file and `IOLTA__*` environment
    /// variables (e.g. `IOLTA__RECONCILIATION__FUZZY_MATCHING=false`).
    pub fn load() -> TrustResult<Self> {
        Self::load_from("config/iolta")
    }

    /// Load from the given file base name (extension optional) plus the
    /// environment.
    pub fn load_from(path: &str) -> TrustResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("IOLTA").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrustConfig::default();
        assert!(config.reconciliation.fuzzy_matching);
        assert!(config.approval.administrator_override);
        assert_eq!(config.sequence.width, 5);
        assert_eq!(config.sequence.separator, "-");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TrustConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[reconciliation]\nfuzzy_matching = false\n[sequence]\nwidth = 3\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(!config.reconciliation.fuzzy_matching);
        assert!(config.approval.administrator_override);
        assert_eq!(config.sequence.width, 3);
        assert_eq!(config.sequence.separator, "-");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = TrustConfig::load_from("does/not/exist/iolta").unwrap();
        assert_eq!(config.sequence.width, 5);
    }
}
