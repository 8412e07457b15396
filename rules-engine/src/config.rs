use policy_schema::{SchemaVersion, Severity};
use thiserror::Error;

pub const ENV_SCHEMA_VERSION: &str = "GOVERNANCE_SCHEMA_VERSION";
pub const ENV_MAX_CONCURRENCY: &str = "GOVERNANCE_MAX_CONCURRENCY";
pub const ENV_DEFAULT_SEVERITY: &str = "GOVERNANCE_DEFAULT_SEVERITY";

const DEFAULT_MAX_CONCURRENCY: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}='{value}' is invalid: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Schema version for documents that carry no `apiVersion`.
    pub default_schema_version: SchemaVersion,
    /// Upper bound on resources evaluated at once by batch evaluation.
    pub max_concurrency: usize,
    /// Severity for violations whose rule and policy declare none.
    pub default_severity: Severity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_schema_version: SchemaVersion::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            default_severity: Severity::default(),
        }
    }
}

/// Reads engine settings from `GOVERNANCE_*` variables. Unset or blank
/// variables keep their defaults; malformed values are reported.
pub fn load_from_env() -> Result<EngineConfig, ConfigError> {
    let mut cfg = EngineConfig::default();

    if let Some(raw) = read_var(ENV_SCHEMA_VERSION) {
        cfg.default_schema_version =
            SchemaVersion::parse(&raw).map_err(|e| ConfigError::InvalidValue {
                var: ENV_SCHEMA_VERSION,
                value: raw.clone(),
                reason: e.to_string(),
            })?;
    }

    if let Some(raw) = read_var(ENV_MAX_CONCURRENCY) {
        cfg.max_concurrency = match raw.parse::<usize>() {
            Ok(0) => {
                return Err(ConfigError::InvalidValue {
                    var: ENV_MAX_CONCURRENCY,
                    value: raw,
                    reason: "must be at least 1".to_string(),
                })
            }
            Ok(n) => n,
            Err(e) => {
                return Err(ConfigError::InvalidValue {
                    var: ENV_MAX_CONCURRENCY,
                    value: raw,
                    reason: e.to_string(),
                })
            }
        };
    }

    if let Some(raw) = read_var(ENV_DEFAULT_SEVERITY) {
        cfg.default_severity = raw.parse().map_err(|reason| ConfigError::InvalidValue {
            var: ENV_DEFAULT_SEVERITY,
            value: raw.clone(),
            reason,
        })?;
    }

    Ok(cfg)
}

fn read_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.default_schema_version, SchemaVersion::V1_0_0);
        assert_eq!(cfg.max_concurrency, 10);
        assert_eq!(cfg.default_severity, Severity::Medium);
    }
}
