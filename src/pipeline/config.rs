//! Pipeline configuration.
//!
//! This module provides configuration for the generation pipeline: gate
//! thresholds, refinement limits, integration scoring, wisdom windows and
//! the fixed per-role completion profiles.

use thiserror::Error;

use super::prompts;
use crate::llm::CompletionRole;
use crate::quality::{GateThresholds, IntegrationAdjustment};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// System instruction and sampling settings for one completion role.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleProfile {
    pub system: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

impl RoleProfile {
    fn new(system: &str, temperature: f64, max_tokens: u32) -> Self {
        Self {
            system: system.to_string(),
            temperature,
            max_tokens: Some(max_tokens),
        }
    }
}

/// Profiles for every pipeline role.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleProfiles {
    pub design: RoleProfile,
    pub implement: RoleProfile,
    pub critique: RoleProfile,
    pub refine: RoleProfile,
    pub integrate: RoleProfile,
}

impl Default for RoleProfiles {
    fn default() -> Self {
        Self {
            design: RoleProfile::new(prompts::DESIGN_SYSTEM, 0.4, 4096),
            implement: RoleProfile::new(prompts::IMPLEMENT_SYSTEM, 0.3, 8192),
            critique: RoleProfile::new(prompts::CRITIQUE_SYSTEM, 0.1, 2048),
            refine: RoleProfile::new(prompts::REFINE_SYSTEM, 0.3, 8192),
            integrate: RoleProfile::new(prompts::INTEGRATE_SYSTEM, 0.1, 2048),
        }
    }
}

impl RoleProfiles {
    pub fn get(&self, role: CompletionRole) -> &RoleProfile {
        match role {
            CompletionRole::Design => &self.design,
            CompletionRole::Implement => &self.implement,
            CompletionRole::Critique => &self.critique,
            CompletionRole::Refine => &self.refine,
            CompletionRole::Integrate => &self.integrate,
        }
    }

    fn get_mut(&mut self, role: CompletionRole) -> &mut RoleProfile {
        match role {
            CompletionRole::Design => &mut self.design,
            CompletionRole::Implement => &mut self.implement,
            CompletionRole::Critique => &mut self.critique,
            CompletionRole::Refine => &mut self.refine,
            CompletionRole::Integrate => &mut self.integrate,
        }
    }
}

/// Configuration for the pipeline engine.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Gate settings
    /// Depth and score thresholds for the commit gate and loop exit.
    pub gate: GateThresholds,
    /// Artifacts scoring below this are refined.
    pub refine_threshold: f64,

    // Generation settings
    /// Maximum number of artifacts implemented per task.
    pub max_files: usize,
    /// Score recorded when a critique call fails or cannot be parsed.
    pub critique_fallback_score: f64,

    // Integration settings
    /// Whether the integration stage runs at all.
    pub run_integration: bool,
    /// Characters of each artifact shown to the integrator.
    pub integration_snippet_chars: usize,
    /// Bonus and penalty applied from the integration report.
    pub integration: IntegrationAdjustment,

    // Wisdom settings
    /// Wisdom entries injected at design time.
    pub wisdom_window: usize,
    /// Wisdom entries injected into autopilot prompts.
    pub autopilot_wisdom_window: usize,

    /// Per-role system instruction and sampling settings.
    pub roles: RoleProfiles,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gate: GateThresholds::default(),
            refine_threshold: 90.0,

            max_files: 12,
            critique_fallback_score: 50.0,

            run_integration: true,
            integration_snippet_chars: 1500,
            integration: IntegrationAdjustment::default(),

            wisdom_window: 8,
            autopilot_wisdom_window: 3,

            roles: RoleProfiles::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `POLYPLEX_MIN_DEPTH`: Minimum refinement depth (default: 2)
    /// - `POLYPLEX_MAX_DEPTH`: Maximum refinement depth (default: 5)
    /// - `POLYPLEX_MIN_AVERAGE`: Minimum average score (default: 93)
    /// - `POLYPLEX_MIN_FILE_SCORE`: Per-artifact floor (default: 85)
    /// - `POLYPLEX_REFINE_THRESHOLD`: Refine artifacts below this (default: 90)
    /// - `POLYPLEX_MAX_FILES`: Maximum artifacts per task (default: 12)
    /// - `POLYPLEX_CRITIQUE_FALLBACK`: Score for failed critiques (default: 50)
    /// - `POLYPLEX_RUN_INTEGRATION`: Run the integration stage (default: true)
    /// - `POLYPLEX_SNIPPET_CHARS`: Integration snippet length (default: 1500)
    /// - `POLYPLEX_INTEGRATION_BONUS`: Bonus when compatible (default: 2)
    /// - `POLYPLEX_INTEGRATION_PENALTY`: Penalty when incompatible (default: 5)
    /// - `POLYPLEX_WISDOM_WINDOW`: Wisdom entries at design time (default: 8)
    /// - `POLYPLEX_AUTOPILOT_WISDOM_WINDOW`: Wisdom entries in autopilot prompts (default: 3)
    /// - `POLYPLEX_TEMPERATURE_<ROLE>`: Temperature override per role
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Gate settings
        if let Some(val) = lookup("POLYPLEX_MIN_DEPTH") {
            config.gate.min_depth = parse_env_value(&val, "POLYPLEX_MIN_DEPTH")?;
        }

        if let Some(val) = lookup("POLYPLEX_MAX_DEPTH") {
            config.gate.max_depth = parse_env_value(&val, "POLYPLEX_MAX_DEPTH")?;
        }

        if let Some(val) = lookup("POLYPLEX_MIN_AVERAGE") {
            config.gate.min_average = parse_env_value(&val, "POLYPLEX_MIN_AVERAGE")?;
        }

        if let Some(val) = lookup("POLYPLEX_MIN_FILE_SCORE") {
            config.gate.min_file_score = parse_env_value(&val, "POLYPLEX_MIN_FILE_SCORE")?;
        }

        if let Some(val) = lookup("POLYPLEX_REFINE_THRESHOLD") {
            config.refine_threshold = parse_env_value(&val, "POLYPLEX_REFINE_THRESHOLD")?;
        }

        // Generation settings
        if let Some(val) = lookup("POLYPLEX_MAX_FILES") {
            config.max_files = parse_env_value(&val, "POLYPLEX_MAX_FILES")?;
        }

        if let Some(val) = lookup("POLYPLEX_CRITIQUE_FALLBACK") {
            config.critique_fallback_score = parse_env_value(&val, "POLYPLEX_CRITIQUE_FALLBACK")?;
        }

        // Integration settings
        if let Some(val) = lookup("POLYPLEX_RUN_INTEGRATION") {
            config.run_integration = parse_env_bool(&val, "POLYPLEX_RUN_INTEGRATION")?;
        }

        if let Some(val) = lookup("POLYPLEX_SNIPPET_CHARS") {
            config.integration_snippet_chars = parse_env_value(&val, "POLYPLEX_SNIPPET_CHARS")?;
        }

        if let Some(val) = lookup("POLYPLEX_INTEGRATION_BONUS") {
            config.integration.bonus = parse_env_value(&val, "POLYPLEX_INTEGRATION_BONUS")?;
        }

        if let Some(val) = lookup("POLYPLEX_INTEGRATION_PENALTY") {
            config.integration.penalty = parse_env_value(&val, "POLYPLEX_INTEGRATION_PENALTY")?;
        }

        // Wisdom settings
        if let Some(val) = lookup("POLYPLEX_WISDOM_WINDOW") {
            config.wisdom_window = parse_env_value(&val, "POLYPLEX_WISDOM_WINDOW")?;
        }

        if let Some(val) = lookup("POLYPLEX_AUTOPILOT_WISDOM_WINDOW") {
            config.autopilot_wisdom_window =
                parse_env_value(&val, "POLYPLEX_AUTOPILOT_WISDOM_WINDOW")?;
        }

        // Role temperatures
        for role in CompletionRole::all() {
            let key = format!("POLYPLEX_TEMPERATURE_{}", role.as_str().to_uppercase());
            if let Some(val) = lookup(&key) {
                config.roles.get_mut(role).temperature = parse_env_value(&val, &key)?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Gate validation
        if self.gate.min_depth == 0 {
            return Err(ConfigError::ValidationFailed(
                "min_depth must be greater than 0".to_string(),
            ));
        }

        if self.gate.max_depth < self.gate.min_depth {
            return Err(ConfigError::ValidationFailed(
                "max_depth cannot be less than min_depth".to_string(),
            ));
        }

        for (name, value) in [
            ("min_average", self.gate.min_average),
            ("min_file_score", self.gate.min_file_score),
            ("refine_threshold", self.refine_threshold),
            ("critique_fallback_score", self.critique_fallback_score),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be between 0 and 100",
                    name
                )));
            }
        }

        // Generation validation
        if self.max_files == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_files must be greater than 0".to_string(),
            ));
        }

        // Integration validation
        if self.integration.bonus < 0.0 || self.integration.penalty < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "integration bonus and penalty cannot be negative".to_string(),
            ));
        }

        // Role validation
        for role in CompletionRole::all() {
            let profile = self.roles.get(role);
            if !(0.0..=2.0).contains(&profile.temperature) {
                return Err(ConfigError::ValidationFailed(format!(
                    "temperature for {} must be between 0.0 and 2.0",
                    role
                )));
            }
            if profile.system.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "system instruction for {} cannot be empty",
                    role
                )));
            }
        }

        Ok(())
    }

    /// Builder method to set gate thresholds.
    pub fn with_gate(mut self, gate: GateThresholds) -> Self {
        self.gate = gate;
        self
    }

    /// Builder method to set the refine threshold.
    pub fn with_refine_threshold(mut self, threshold: f64) -> Self {
        self.refine_threshold = threshold;
        self
    }

    /// Builder method to set max files per task.
    pub fn with_max_files(mut self, max: usize) -> Self {
        self.max_files = max;
        self
    }

    /// Builder method to set the critique fallback score.
    pub fn with_critique_fallback_score(mut self, score: f64) -> Self {
        self.critique_fallback_score = score;
        self
    }

    /// Builder method to enable or disable the integration stage.
    pub fn with_integration(mut self, enabled: bool) -> Self {
        self.run_integration = enabled;
        self
    }

    /// Builder method to set the integration snippet length.
    pub fn with_integration_snippet_chars(mut self, chars: usize) -> Self {
        self.integration_snippet_chars = chars;
        self
    }

    /// Builder method to set the design-time wisdom window.
    pub fn with_wisdom_window(mut self, window: usize) -> Self {
        self.wisdom_window = window;
        self
    }

    /// Builder method to set the autopilot wisdom window.
    pub fn with_autopilot_wisdom_window(mut self, window: usize) -> Self {
        self.autopilot_wisdom_window = window;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.gate.min_depth, 2);
        assert_eq!(config.gate.max_depth, 5);
        assert!((config.gate.min_average - 93.0).abs() < f64::EPSILON);
        assert!((config.gate.min_file_score - 85.0).abs() < f64::EPSILON);
        assert!((config.refine_threshold - 90.0).abs() < f64::EPSILON);
        assert_eq!(config.max_files, 12);
        assert!((config.critique_fallback_score - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.integration_snippet_chars, 1500);
        assert_eq!(config.wisdom_window, 8);
        assert_eq!(config.autopilot_wisdom_window, 3);
        assert!(config.run_integration);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_max_files(4)
            .with_refine_threshold(80.0)
            .with_integration(false)
            .with_wisdom_window(2);

        assert_eq!(config.max_files, 4);
        assert!((config.refine_threshold - 80.0).abs() < f64::EPSILON);
        assert!(!config.run_integration);
        assert_eq!(config.wisdom_window, 2);
    }

    #[test]
    fn test_from_lookup() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("POLYPLEX_MIN_DEPTH", "3"),
            ("POLYPLEX_MAX_FILES", " 6 "),
            ("POLYPLEX_RUN_INTEGRATION", "off"),
            ("POLYPLEX_TEMPERATURE_CRITIQUE", "0.0"),
        ]))
        .unwrap();

        assert_eq!(config.gate.min_depth, 3);
        assert_eq!(config.max_files, 6);
        assert!(!config.run_integration);
        assert_eq!(config.roles.get(CompletionRole::Critique).temperature, 0.0);
    }

    #[test]
    fn test_from_lookup_invalid_value() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("POLYPLEX_MAX_DEPTH", "deep")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "POLYPLEX_MAX_DEPTH"));
    }

    #[test]
    fn test_validation_depth_order() {
        let config = PipelineConfig::default().with_gate(GateThresholds {
            min_depth: 4,
            max_depth: 3,
            ..GateThresholds::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_validation_score_range() {
        let config = PipelineConfig::default().with_refine_threshold(120.0);
        assert!(config.validate().is_err());
        let config = PipelineConfig::default().with_max_files(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_role_profiles_have_instructions() {
        let roles = RoleProfiles::default();
        for role in CompletionRole::all() {
            assert!(!roles.get(role).system.is_empty());
        }
        assert!(roles.critique.temperature < roles.design.temperature);
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("YES", "K").unwrap());
        assert!(!parse_env_bool("0", "K").unwrap());
        assert!(parse_env_bool("maybe", "K").is_err());
    }
}
