use crate::decision::Threshold;
use crate::error::ConfigError;
use crate::model::OutputLayout;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "MRI_CONFIG";
pub const THRESHOLD_ENV: &str = "PRED_THRESHOLD";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub prediction: PredictionConfig,
    pub workers: WorkerConfig,
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// Only consulted when the model leaves its output width dynamic.
    pub output_layout: Option<OutputLayout>,
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/brain_tumor_cnn.onnx"),
            output_layout: None,
            intra_threads: 1,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PredictionConfig {
    pub threshold: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct WorkerConfig {
    pub size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { size: 2 }
    }
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
}

impl AppConfig {
    /// Reads the YAML file named by `MRI_CONFIG` (default `config.yaml`),
    /// then applies `PRED_THRESHOLD`. A missing file means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let config = Self::from_file(Path::new(&path))?;
        config.with_threshold_override(std::env::var(THRESHOLD_ENV).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn with_threshold_override(mut self, raw: Option<String>) -> Result<Self, ConfigError> {
        if let Some(raw) = raw {
            self.prediction.threshold = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::ThresholdSyntax(raw.clone()))?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.threshold()?;
        if self.workers.size == 0 {
            return Err(ConfigError::EmptyPool);
        }
        Ok(())
    }

    pub fn threshold(&self) -> Result<Threshold, ConfigError> {
        Threshold::new(self.prediction.threshold)
    }
}
