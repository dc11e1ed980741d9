use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Nemo";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name the trainer stamps into `training_config.json`.
pub const MODEL_NAME: &str = "hebrew-medical-ner";

/// Base model the exported subword datasets are meant for.
pub const BASE_MODEL: &str = "onlplab/alephbert-base";

/// Subdirectory of the training directory holding the loadable model.
pub const FINAL_DIR: &str = "final";

/// Environment variables read by [`NemoConfig::from_env`].
pub mod env_vars {
    pub const CATALOGUE: &str = "NEMO_CATALOGUE";
    pub const MODEL_DIR: &str = "NEMO_MODEL_DIR";
    pub const BIND: &str = "NEMO_BIND";
    pub const CONFIDENCE: &str = "NEMO_CONFIDENCE";
    pub const FUZZY_THRESHOLD: &str = "NEMO_FUZZY_THRESHOLD";
    pub const ANNOTATE_MARKERS: &str = "NEMO_ANNOTATE_MARKERS";
    pub const LOG: &str = "NEMO_LOG";
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Get the application data directory (~/Nemo/)
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the models directory
pub fn models_dir() -> PathBuf {
    app_data_dir().join("models")
}

/// Where the trainer writes checkpoints, logs and inspection files
pub fn default_training_dir() -> PathBuf {
    models_dir().join(MODEL_NAME)
}

/// Default location of the trained token classifier
pub fn default_model_dir() -> PathBuf {
    default_training_dir().join(FINAL_DIR)
}

/// Field catalogue CSV, resolved against the working directory
pub fn default_catalogue_path() -> PathBuf {
    PathBuf::from("transformed_parameters.csv")
}

/// Fallback tracing filter when neither `NEMO_LOG` nor `RUST_LOG` is set.
pub fn default_log_filter() -> String {
    std::env::var(env_vars::LOG).unwrap_or_else(|_| "nemo=info,tower=warn".to_string())
}

/// Knobs for the extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Model spans below this mean token score are dropped.
    pub confidence_threshold: f32,
    /// Minimum token-sort ratio (exclusive) for mapping text onto an option.
    pub fuzzy_threshold: u8,
    /// Wrap known terms in bracketed markers before classification.
    pub annotate_markers: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            fuzzy_threshold: 60,
            annotate_markers: false,
        }
    }
}

/// Process-wide configuration shared by the server and the batch jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NemoConfig {
    pub catalogue_path: PathBuf,
    pub model_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub extraction: ExtractionConfig,
}

impl Default for NemoConfig {
    fn default() -> Self {
        Self {
            catalogue_path: default_catalogue_path(),
            model_dir: default_model_dir(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            extraction: ExtractionConfig::default(),
        }
    }
}

impl NemoConfig {
    /// Defaults overridden by any `NEMO_*` variables present.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(env_vars::CATALOGUE) {
            config.catalogue_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(env_vars::MODEL_DIR) {
            config.model_dir = PathBuf::from(path);
        }
        if let Some(addr) = lookup(env_vars::BIND) {
            config.bind_addr = parse_var(env_vars::BIND, &addr)?;
        }
        if let Some(raw) = lookup(env_vars::CONFIDENCE) {
            let threshold: f32 = parse_var(env_vars::CONFIDENCE, &raw)?;
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidValue {
                    var: env_vars::CONFIDENCE,
                    value: raw,
                });
            }
            config.extraction.confidence_threshold = threshold;
        }
        if let Some(raw) = lookup(env_vars::FUZZY_THRESHOLD) {
            let threshold: u8 = parse_var(env_vars::FUZZY_THRESHOLD, &raw)?;
            if threshold > 100 {
                return Err(ConfigError::InvalidValue {
                    var: env_vars::FUZZY_THRESHOLD,
                    value: raw,
                });
            }
            config.extraction.fuzzy_threshold = threshold;
        }
        if let Some(raw) = lookup(env_vars::ANNOTATE_MARKERS) {
            config.extraction.annotate_markers = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: env_vars::ANNOTATE_MARKERS,
                        value: raw,
                    })
                }
            };
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: raw.to_string(),
    })
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
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("Nemo"));
    }

    #[test]
    fn model_dir_under_models_dir() {
        let model = default_model_dir();
        assert!(model.starts_with(models_dir()));
        assert!(model.ends_with("hebrew-medical-ner/final"));
    }

    #[test]
    fn defaults_match_extractor_settings() {
        let config = NemoConfig::default();
        assert_eq!(config.bind_addr.port(), 8000);
        assert_eq!(config.extraction.confidence_threshold, 0.7);
        assert_eq!(config.extraction.fuzzy_threshold, 60);
        assert!(!config.extraction.annotate_markers);
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = NemoConfig::from_lookup(lookup_from(&[
            ("NEMO_CATALOGUE", "/data/params.csv"),
            ("NEMO_BIND", "127.0.0.1:9100"),
            ("NEMO_CONFIDENCE", "0.55"),
            ("NEMO_FUZZY_THRESHOLD", "75"),
            ("NEMO_ANNOTATE_MARKERS", "yes"),
        ]))
        .unwrap();
        assert_eq!(config.catalogue_path, PathBuf::from("/data/params.csv"));
        assert_eq!(config.bind_addr.port(), 9100);
        assert_eq!(config.extraction.confidence_threshold, 0.55);
        assert_eq!(config.extraction.fuzzy_threshold, 75);
        assert!(config.extraction.annotate_markers);
    }

    #[test]
    fn out_of_range_confidence_rejected() {
        let err = NemoConfig::from_lookup(lookup_from(&[("NEMO_CONFIDENCE", "1.5")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                var: "NEMO_CONFIDENCE",
                value: "1.5".into()
            }
        );
    }

    #[test]
    fn malformed_bind_rejected() {
        assert!(NemoConfig::from_lookup(lookup_from(&[("NEMO_BIND", "nowhere")])).is_err());
    }

    #[test]
    fn unknown_boolean_rejected() {
        assert!(
            NemoConfig::from_lookup(lookup_from(&[("NEMO_ANNOTATE_MARKERS", "maybe")])).is_err()
        );
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
