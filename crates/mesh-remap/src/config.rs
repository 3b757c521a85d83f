//! Configuration for the remap engine.

use serde::{Deserialize, Serialize};

/// How a target value is formed from its valid contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `Σ w·s` over valid sources; weights are used as given.
    #[default]
    Conservative,
    /// `Σ w·s / Σ w` over valid sources.
    Renormalize,
}

impl Normalization {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "renormalize" | "renormalise" | "renorm" => Self::Renormalize,
            _ => Self::Conservative,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Renormalize => "renormalize",
        }
    }
}

impl std::fmt::Display for Normalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for the remap engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemapConfig {
    /// Minimum valid contributing weight for a target cell; below it the
    /// target is written as fill.
    pub coverage_threshold: f64,

    /// Conservative (default) or renormalized remapping.
    pub normalization: Normalization,

    /// Remap vertical levels in parallel.
    pub parallel_levels: bool,
}

impl Default for RemapConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: 1.0e-6,
            normalization: Normalization::Conservative,
            parallel_levels: true,
        }
    }
}

impl RemapConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REMAP_COVERAGE_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                config.coverage_threshold = threshold;
            }
        }

        if let Ok(val) = std::env::var("REMAP_NORMALIZATION") {
            config.normalization = Normalization::from_str(&val);
        }

        if let Ok(val) = std::env::var("REMAP_PARALLEL_LEVELS") {
            config.parallel_levels = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.coverage_threshold.is_finite() || self.coverage_threshold < 0.0 {
            return Err("coverage_threshold must be a finite value >= 0".to_string());
        }

        if self.coverage_threshold > 1.0 {
            return Err("coverage_threshold must be <= 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RemapConfig::default();
        assert_eq!(config.coverage_threshold, 1.0e-6);
        assert_eq!(config.normalization, Normalization::Conservative);
        assert!(config.parallel_levels);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = RemapConfig::default();
        config.coverage_threshold = -0.1;
        assert!(config.validate().is_err());

        config.coverage_threshold = f64::NAN;
        assert!(config.validate().is_err());

        config.coverage_threshold = 1.5;
        assert!(config.validate().is_err());

        config.coverage_threshold = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_normalization_from_str() {
        assert_eq!(Normalization::from_str("RENORMALIZE"), Normalization::Renormalize);
        assert_eq!(Normalization::from_str("conservative"), Normalization::Conservative);
        assert_eq!(Normalization::from_str("bogus"), Normalization::Conservative);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RemapConfig =
            serde_json::from_str(r#"{"normalization": "renormalize"}"#).unwrap();
        assert_eq!(config.normalization, Normalization::Renormalize);
        assert_eq!(config.coverage_threshold, 1.0e-6);

        assert!(serde_json::from_str::<RemapConfig>(r#"{"threshold": 1}"#).is_err());
    }
}
