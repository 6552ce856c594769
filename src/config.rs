use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::recipes::DEFAULT_RECIPE_COUNT;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Spoonacular API key. Recipe lookup is disabled when absent.
    #[serde(default)]
    pub spoonacular_api_key: Option<String>,

    /// Spoonacular API base URL
    #[serde(default = "default_spoonacular_api_url")]
    pub spoonacular_api_url: String,

    /// Number of recipes requested from the search endpoint
    #[serde(default = "default_recipe_count")]
    pub recipe_count: u32,

    /// Timeout applied to each recipe API call
    #[serde(default = "default_recipe_api_timeout_secs")]
    pub recipe_api_timeout_secs: u64,

    /// Roboflow API key. Without it the detector falls back to local weights.
    #[serde(default)]
    pub roboflow_api_key: Option<String>,

    /// Hosted model id in `project/version` form
    #[serde(default = "default_roboflow_model")]
    pub roboflow_model: String,

    /// Roboflow hosted inference base URL
    #[serde(default = "default_roboflow_api_url")]
    pub roboflow_api_url: String,

    /// Minimum confidence for a detection to be reported
    #[serde(default = "default_detection_confidence")]
    pub detection_confidence: f32,

    /// Fine-tuned weight files, tried in order
    #[serde(default = "default_model_search_paths")]
    pub model_search_paths: Vec<PathBuf>,

    /// Generic pretrained weights used when no fine-tuned file exists
    #[serde(default = "default_generic_model_path")]
    pub generic_model_path: PathBuf,

    /// Directory uploaded images are written to
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Age after which uploads are swept. 0 keeps them forever.
    #[serde(default = "default_upload_retention_secs")]
    pub upload_retention_secs: u64,

    #[serde(default = "default_upload_sweep_interval_secs")]
    pub upload_sweep_interval_secs: u64,

    /// Largest accepted multipart body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_spoonacular_api_url() -> String {
    "https://api.spoonacular.com".to_string()
}

fn default_recipe_count() -> u32 {
    DEFAULT_RECIPE_COUNT
}

fn default_recipe_api_timeout_secs() -> u64 {
    10
}

fn default_roboflow_model() -> String {
    "food-in-fridge-jn5is/1".to_string()
}

fn default_roboflow_api_url() -> String {
    "https://detect.roboflow.com".to_string()
}

fn default_detection_confidence() -> f32 {
    0.4
}

fn default_model_search_paths() -> Vec<PathBuf> {
    [
        "runs/weights/best.onnx",
        "../runs/weights/best.onnx",
        "runs/detect/train/weights/best.onnx",
        "../runs/detect/train/weights/best.onnx",
        "best.onnx",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

fn default_generic_model_path() -> PathBuf {
    PathBuf::from("yolov8n.onnx")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("temp_uploads")
}

fn default_upload_retention_secs() -> u64 {
    3600
}

fn default_upload_sweep_interval_secs() -> u64 {
    600
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spoonacular_api_key: None,
            spoonacular_api_url: default_spoonacular_api_url(),
            recipe_count: default_recipe_count(),
            recipe_api_timeout_secs: default_recipe_api_timeout_secs(),
            roboflow_api_key: None,
            roboflow_model: default_roboflow_model(),
            roboflow_api_url: default_roboflow_api_url(),
            detection_confidence: default_detection_confidence(),
            model_search_paths: default_model_search_paths(),
            generic_model_path: default_generic_model_path(),
            upload_dir: default_upload_dir(),
            upload_retention_secs: default_upload_retention_secs(),
            upload_sweep_interval_secs: default_upload_sweep_interval_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Recipe API key, treating an empty value as unset
    pub fn recipe_api_key(&self) -> Option<&str> {
        non_empty(self.spoonacular_api_key.as_deref())
    }

    /// Detector provider key, treating an empty value as unset
    pub fn detector_api_key(&self) -> Option<&str> {
        non_empty(self.roboflow_api_key.as_deref())
    }

    pub fn recipe_api_timeout(&self) -> Duration {
        Duration::from_secs(self.recipe_api_timeout_secs)
    }

    /// `None` when uploads are retained indefinitely
    pub fn upload_retention(&self) -> Option<Duration> {
        (self.upload_retention_secs > 0).then(|| Duration::from_secs(self.upload_retention_secs))
    }

    pub fn upload_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.upload_sweep_interval_secs.max(1))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
