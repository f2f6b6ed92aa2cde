//! Runtime substrate and public API
//!
//! Values and chunks, property stores, the part hierarchy and its lookup,
//! message dispatch, and the threaded [`Runtime`] facade that runs every
//! script on a single worker.

use serde::{Deserialize, Serialize};

// Submodules
pub mod chunk;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod finder;
pub mod hierarchy;
pub mod ordinal;
pub mod part;
pub mod property;
pub mod specifier;
pub mod value;
pub mod worker;

pub use dispatch::{Message, MessageOutcome};
pub use engine::Engine;
pub use error::{Result, RuntimeError, ScriptError, ScriptResult};
pub use worker::{PartSummary, Runtime};

/// Configuration for the stack runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Initial `itemDelimiter` of the application
    pub item_delimiter: char,

    /// Deepest handler nesting before "too much recursion"
    pub max_call_depth: usize,

    /// Seed for the ANY ordinal; entropy when absent
    pub ordinal_seed: Option<u64>,

    /// Enable debug tracing
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            item_delimiter: chunk::DEFAULT_ITEM_DELIMITER,
            max_call_depth: 64,
            ordinal_seed: None,
            debug: false,
        }
    }
}

impl RuntimeConfig {
    /// Reject settings the runtime cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.max_call_depth == 0 {
            return Err(RuntimeError::Config("max_call_depth must be at least 1".into()));
        }
        if self.item_delimiter.is_whitespace() {
            return Err(RuntimeError::Config(
                "item_delimiter cannot be whitespace".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.item_delimiter, ',');
    }

    #[test]
    fn zero_depth_is_rejected() {
        let config = RuntimeConfig {
            max_call_depth: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(config.validate(), Err(RuntimeError::Config(_))));
    }
}
