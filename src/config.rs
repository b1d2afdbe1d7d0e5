//! Runtime configuration

use serde::{Deserialize, Serialize};

/// Environment variable toggling output validation
pub const VALIDATE_OUTPUTS_ENV: &str = "FLOW_BLOCKS_VALIDATE_OUTPUTS";
/// Environment variable toggling strict input handling
pub const STRICT_INPUTS_ENV: &str = "FLOW_BLOCKS_STRICT_INPUTS";

/// Knobs for how instances load and run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Validate sent and returned values against their output schemas
    pub validate_outputs: bool,
    /// Treat inputs addressed at unknown pins as errors instead of skipping them
    pub strict_inputs: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            validate_outputs: true,
            strict_inputs: true,
        }
    }
}

impl RuntimeConfig {
    pub fn with_validate_outputs(mut self, enabled: bool) -> Self {
        self.validate_outputs = enabled;
        self
    }

    pub fn with_strict_inputs(mut self, enabled: bool) -> Self {
        self.strict_inputs = enabled;
        self
    }

    /// Defaults overridden by `FLOW_BLOCKS_VALIDATE_OUTPUTS` and
    /// `FLOW_BLOCKS_STRICT_INPUTS`; unparseable values keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            lookup(key)
                .and_then(|value| parse_bool_env(&value))
                .unwrap_or(default)
        };
        Self {
            validate_outputs: flag(VALIDATE_OUTPUTS_ENV, defaults.validate_outputs),
            strict_inputs: flag(STRICT_INPUTS_ENV, defaults.strict_inputs),
        }
    }
}

pub(crate) fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.validate_outputs);
        assert!(config.strict_inputs);
    }

    #[test]
    fn test_parse_bool_env() {
        assert_eq!(parse_bool_env(" YES "), Some(true));
        assert_eq!(parse_bool_env("off"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            (VALIDATE_OUTPUTS_ENV, "0"),
            (STRICT_INPUTS_ENV, "garbage"),
        ]
        .into_iter()
        .collect();
        let config = RuntimeConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert!(!config.validate_outputs);
        assert!(config.strict_inputs);
    }

    #[test]
    fn test_serde_defaults() {
        let config: RuntimeConfig =
            serde_json::from_value(serde_json::json!({ "strict_inputs": false })).unwrap();
        assert_eq!(config, RuntimeConfig::default().with_strict_inputs(false));
    }
}
