use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::FailoverError;

pub const SUPPORT_FAILOVER_KEY: &str = "cask.failover.support_failover";
pub const SUPPORT_PASSIVATION_KEY: &str = "cask.failover.support_passivation";
pub const RESOURCE_HANDLER_KEY: &str = "cask.failover.resource_serialization_handler";

/// Top-level host configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct CaskConfig {
    #[serde(default)]
    pub failover: FailoverConfig,
}

impl CaskConfig {
    pub fn from_file(path: &Path) -> Result<Self, FailoverError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, FailoverError> {
        toml::from_str(content)
            .map_err(|e| FailoverError::Config(format!("Failed to parse config: {e}")))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FailoverConfig {
    #[serde(default)]
    pub support_failover: bool,
    #[serde(default)]
    pub support_passivation: bool,
    /// Name of a handler registered in the [`HandlerRegistry`](crate::HandlerRegistry).
    pub resource_serialization_handler: Option<String>,
}

impl FailoverConfig {
    /// Read the string-keyed property surface. Booleans are true only for a
    /// case-insensitive `"true"`; anything else, or absence, is false.
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        let flag = |key: &str| {
            properties
                .get(key)
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
        };

        Self {
            support_failover: flag(SUPPORT_FAILOVER_KEY),
            support_passivation: flag(SUPPORT_PASSIVATION_KEY),
            resource_serialization_handler: properties
                .get(RESOURCE_HANDLER_KEY)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        }
    }

    /// Whether any feature that serializes sessions is on.
    pub fn is_enabled(&self) -> bool {
        self.support_failover || self.support_passivation
    }
}
