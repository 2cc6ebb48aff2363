use std::path::{Path, PathBuf};
use std::str::FromStr;

use facegate_core::{MatchMetric, PipelineSettings};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Engine configuration.
///
/// Defaults, then an optional TOML file named by `FACEGATE_CONFIG`, then
/// `FACEGATE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Detections below this confidence are ignored.
    pub detection_confidence: f32,
    /// Minimum confidence (1 − distance) to accept a match.
    pub recognition_threshold: f32,
    /// Distance used for matching; must suit the embedding model.
    pub match_metric: MatchMetric,
    /// Minimum liveness score to pass.
    pub liveness_pass_score: u32,
    /// Reject otherwise-accepted matches whose liveness check failed.
    pub require_liveness: bool,
    /// Re-enrolling an existing name replaces it instead of failing.
    pub replace_on_enroll: bool,
    /// Supplied images are repeated up to this count.
    pub min_enroll_images: usize,
    /// Images beyond this count are ignored.
    pub max_enroll_images: usize,
    /// Default number of recognition log entries returned.
    pub log_limit: usize,
    /// Source tag written to the recognition log.
    pub log_source: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: facegate_core::default_model_dir(),
            db_path: data_dir().join("faces.db"),
            detection_confidence: 0.5,
            recognition_threshold: 0.25,
            match_metric: MatchMetric::Cosine,
            liveness_pass_score: 40,
            require_liveness: false,
            replace_on_enroll: true,
            min_enroll_images: 2,
            max_enroll_images: 10,
            log_limit: 50,
            log_source: "cli".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `FACEGATE_CONFIG` and `FACEGATE_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = match std::env::var("FACEGATE_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        let config = base.with_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `FACEGATE_*` overrides looked up through `lookup`.
    /// Unparseable values keep the current setting.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("FACEGATE_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("FACEGATE_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(source) = lookup("FACEGATE_LOG_SOURCE") {
            self.log_source = source;
        }
        self.detection_confidence = env_parse(
            &lookup,
            "FACEGATE_DETECTION_CONFIDENCE",
            self.detection_confidence,
        );
        self.recognition_threshold = env_parse(
            &lookup,
            "FACEGATE_RECOGNITION_THRESHOLD",
            self.recognition_threshold,
        );
        self.match_metric = env_parse(&lookup, "FACEGATE_MATCH_METRIC", self.match_metric);
        self.liveness_pass_score = env_parse(
            &lookup,
            "FACEGATE_LIVENESS_PASS_SCORE",
            self.liveness_pass_score,
        );
        self.require_liveness =
            env_bool(&lookup, "FACEGATE_REQUIRE_LIVENESS", self.require_liveness);
        self.replace_on_enroll =
            env_bool(&lookup, "FACEGATE_REPLACE_ON_ENROLL", self.replace_on_enroll);
        self.min_enroll_images =
            env_parse(&lookup, "FACEGATE_MIN_ENROLL_IMAGES", self.min_enroll_images);
        self.max_enroll_images =
            env_parse(&lookup, "FACEGATE_MAX_ENROLL_IMAGES", self.max_enroll_images);
        self.log_limit = env_parse(&lookup, "FACEGATE_LOG_LIMIT", self.log_limit);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.recognition_threshold) {
            return Err(ConfigError::Invalid {
                key: "recognition_threshold",
                reason: format!("{} is outside [0, 1]", self.recognition_threshold),
            });
        }
        if !(0.0..=1.0).contains(&self.detection_confidence) {
            return Err(ConfigError::Invalid {
                key: "detection_confidence",
                reason: format!("{} is outside [0, 1]", self.detection_confidence),
            });
        }
        if self.liveness_pass_score > 100 {
            return Err(ConfigError::Invalid {
                key: "liveness_pass_score",
                reason: format!("{} exceeds 100", self.liveness_pass_score),
            });
        }
        if self.min_enroll_images == 0 {
            return Err(ConfigError::Invalid {
                key: "min_enroll_images",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_enroll_images < self.min_enroll_images {
            return Err(ConfigError::Invalid {
                key: "max_enroll_images",
                reason: format!(
                    "{} is below min_enroll_images ({})",
                    self.max_enroll_images, self.min_enroll_images
                ),
            });
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            detection_confidence: self.detection_confidence,
            liveness_pass_score: self.liveness_pass_score,
        }
    }
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate")
}

fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(current)
}

fn env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: bool) -> bool {
    match lookup(key).as_deref().map(str::trim) {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => current,
    }
}
