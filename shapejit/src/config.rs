//! Session configuration.
//!
//! Configuration comes from three layers, later ones winning:
//!
//! 1. [`JitConfig::default`]
//! 2. a TOML document ([`JitConfig::from_toml_str`]), where missing keys keep
//!    their defaults
//! 3. environment switches ([`JitConfig::from_env`]):
//!    - `SHAPEJIT_NO_OPT`: disable the optimizer pipeline
//!    - `SHAPEJIT_VERIFY_SSA`: verify merge lists of every registered function
//!    - `SHAPEJIT_NO_SHAPES`: skip result-shape precomputation

use crate::error::{JitError, JitResult};
use serde::{Deserialize, Serialize};

pub const ENV_NO_OPT: &str = "SHAPEJIT_NO_OPT";
pub const ENV_VERIFY_SSA: &str = "SHAPEJIT_VERIFY_SSA";
pub const ENV_NO_SHAPES: &str = "SHAPEJIT_NO_SHAPES";

/// Knobs for specialization, optimization and compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JitConfig {
    /// Run the optimizer pipeline over every new specialization
    pub optimize: bool,
    /// Include dead code elimination in the pipeline
    pub dead_code_elimination: bool,
    /// Include index elimination in the pipeline
    pub index_elimination: bool,
    /// Precompute result shapes before handing functions to the backend
    pub precompute_shapes: bool,
    /// Check the merge invariant when functions are registered
    pub verify_ssa: bool,
    /// Cap on fixpoint rounds when typing loop merges
    pub max_loop_type_iterations: usize,
    /// Cap on optimizer pipeline rounds
    pub max_pass_iterations: usize,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            optimize: true,
            dead_code_elimination: true,
            index_elimination: true,
            precompute_shapes: true,
            verify_ssa: cfg!(debug_assertions),
            max_loop_type_iterations: 8,
            max_pass_iterations: 10,
        }
    }
}

impl JitConfig {
    /// Parse a TOML document. Unknown keys are rejected.
    pub fn from_toml_str(src: &str) -> JitResult<Self> {
        let raw: RawConfig = toml::from_str(src).map_err(|e| JitError::Config(e.to_string()))?;
        let config = raw.into_config();
        config.validate()?;
        Ok(config)
    }

    /// Apply the `SHAPEJIT_*` environment switches on top of `self`.
    pub fn from_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply switches read through `lookup`. A switch is on when its value
    /// is anything other than empty, `0` or `false`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = |key: &str| {
            lookup(key)
                .map(|v| {
                    let v = v.trim();
                    !(v.is_empty() || v == "0" || v.eq_ignore_ascii_case("false"))
                })
                .unwrap_or(false)
        };
        if enabled(ENV_NO_OPT) {
            self.optimize = false;
        }
        if enabled(ENV_VERIFY_SSA) {
            self.verify_ssa = true;
        }
        if enabled(ENV_NO_SHAPES) {
            self.precompute_shapes = false;
        }
        self
    }

    fn validate(&self) -> JitResult<()> {
        if self.max_loop_type_iterations == 0 {
            return Err(JitError::Config(
                "max_loop_type_iterations must be at least 1".to_string(),
            ));
        }
        if self.max_pass_iterations == 0 {
            return Err(JitError::Config(
                "max_pass_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// TOML layout: settings live under an optional `[jit]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    jit: Option<JitConfig>,
}

impl RawConfig {
    fn into_config(self) -> JitConfig {
        self.jit.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_partial_keeps_defaults() {
        let config = JitConfig::from_toml_str(
            r#"
            [jit]
            index_elimination = false
            max_pass_iterations = 3
            "#,
        )
        .unwrap();
        assert!(!config.index_elimination);
        assert_eq!(config.max_pass_iterations, 3);
        assert!(config.optimize);
        assert_eq!(config.max_loop_type_iterations, 8);
    }

    #[test]
    fn test_toml_empty_document() {
        let config = JitConfig::from_toml_str("").unwrap();
        assert_eq!(config, JitConfig::default());
    }

    #[test]
    fn test_toml_rejects_unknown_key() {
        let err = JitConfig::from_toml_str("[jit]\nturbo = true\n").unwrap_err();
        assert!(matches!(err, JitError::Config(_)));
    }

    #[test]
    fn test_toml_rejects_zero_iterations() {
        let err = JitConfig::from_toml_str("[jit]\nmax_loop_type_iterations = 0\n").unwrap_err();
        assert!(matches!(err, JitError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let config = JitConfig::default().with_overrides(|key| match key {
            ENV_NO_OPT => Some("1".to_string()),
            ENV_NO_SHAPES => Some("false".to_string()),
            _ => None,
        });
        assert!(!config.optimize);
        assert!(config.precompute_shapes);
    }
}
