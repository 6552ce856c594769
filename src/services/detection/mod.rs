/// Object detection abstraction
///
/// A detector turns an image on disk into labelled boxes. Two backends exist:
/// Roboflow hosted inference for the fine-tuned fridge model, and local
/// YOLOv8 ONNX weights (behind the `onnx` feature). Which one is used is
/// decided once at startup by [`select_detector`].
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{Detection, IngredientSet},
    services::labels,
};

pub mod hosted;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod yolo;

pub use hosted::RoboflowDetector;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Detector: Send + Sync {
    /// Runs inference on a single image
    ///
    /// Any failure here (unreadable or corrupt image, inference error) fails
    /// the whole analysis.
    async fn detect(&self, image_path: &Path) -> AppResult<Vec<Detection>>;

    /// Backend name for logging and health reporting
    fn name(&self) -> &'static str;
}

/// Detections of one image together with their normalized labels
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutput {
    pub detections: Vec<Detection>,
    pub ingredients: IngredientSet,
}

impl DetectionOutput {
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        let ingredients = labels::normalize(detections.iter().map(|d| d.label.as_str()));
        Self {
            detections,
            ingredients,
        }
    }
}

/// Runs `detector` and normalizes the labels it produced
pub async fn detect(detector: &dyn Detector, image_path: &Path) -> AppResult<DetectionOutput> {
    let detections = detector.detect(image_path).await?;
    Ok(DetectionOutput::from_detections(detections))
}

/// Where the detector's weights come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Fine-tuned model served by Roboflow
    Hosted { model_id: String },
    /// Locally fine-tuned weight file
    FineTuned(PathBuf),
    /// Generic pretrained weights
    Generic(PathBuf),
}

impl ModelSource {
    pub fn kind(&self) -> &'static str {
        match self {
            ModelSource::Hosted { .. } => "hosted",
            ModelSource::FineTuned(_) => "fine_tuned",
            ModelSource::Generic(_) => "generic",
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            ModelSource::Hosted { .. } => None,
            ModelSource::FineTuned(path) | ModelSource::Generic(path) => Some(path),
        }
    }
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSource::Hosted { model_id } => write!(f, "hosted:{}", model_id),
            ModelSource::FineTuned(path) | ModelSource::Generic(path) => {
                write!(f, "{}:{}", self.kind(), path.display())
            }
        }
    }
}

/// Ordered model selection policy
///
/// 1. hosted fine-tuned model when a provider key is configured and it answers
/// 2. the first existing file in `search_paths`
/// 3. `generic_path`
#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub hosted_model: Option<String>,
    pub search_paths: Vec<PathBuf>,
    pub generic_path: PathBuf,
}

impl ModelSelection {
    pub fn from_config(config: &Config) -> Self {
        Self {
            hosted_model: config
                .detector_api_key()
                .map(|_| config.roboflow_model.clone()),
            search_paths: config.model_search_paths.clone(),
            generic_path: config.generic_model_path.clone(),
        }
    }

    /// Source preferred by configuration alone, before anything is loaded
    pub fn resolve(&self) -> ModelSource {
        match &self.hosted_model {
            Some(model_id) => ModelSource::Hosted {
                model_id: model_id.clone(),
            },
            None => self.resolve_local(),
        }
    }

    /// First existing file in `search_paths`, otherwise `generic_path`
    pub fn resolve_local(&self) -> ModelSource {
        if let Some(path) = self.search_paths.iter().find(|p| p.is_file()) {
            return ModelSource::FineTuned(path.clone());
        }

        ModelSource::Generic(self.generic_path.clone())
    }
}

/// Detector picked at startup and the weights it runs
#[derive(Clone)]
pub struct SelectedDetector {
    pub source: ModelSource,
    pub detector: Arc<dyn Detector>,
}

/// Builds the best detector that actually works.
///
/// A hosted model is checked with one request before it is accepted. When it
/// is rejected the local search paths and then the generic weights are tried.
/// Local weights that cannot be loaded leave an [`UnavailableDetector`] in
/// place, so startup never fails on detector problems.
pub async fn select_detector(config: &Config, selection: &ModelSelection) -> SelectedDetector {
    if let Some(model_id) = &selection.hosted_model {
        match connect_hosted(config, model_id).await {
            Ok(detector) => {
                return SelectedDetector {
                    source: ModelSource::Hosted {
                        model_id: model_id.clone(),
                    },
                    detector: Arc::new(detector),
                }
            }
            Err(e) => tracing::warn!(
                model = %model_id,
                error = %e,
                "Hosted model unavailable, falling back to local model search"
            ),
        }
    }

    let source = selection.resolve_local();
    let detector = source
        .local_path()
        .ok_or_else(|| AppError::Internal(format!("{} has no local weights", source)))
        .and_then(|path| load_local(config, path))
        .unwrap_or_else(|e| {
            tracing::error!(source = %source, error = %e, "No working detector, analysis requests will fail");
            Arc::new(UnavailableDetector::new(e.to_string())) as Arc<dyn Detector>
        });

    SelectedDetector { source, detector }
}

async fn connect_hosted(config: &Config, model_id: &str) -> AppResult<RoboflowDetector> {
    let api_key = config.detector_api_key().ok_or_else(|| {
        AppError::Internal("Hosted detector selected without a Roboflow API key".to_string())
    })?;
    let detector = RoboflowDetector::new(
        api_key.to_string(),
        config.roboflow_api_url.clone(),
        model_id.to_string(),
        config.detection_confidence,
    )?;
    detector.verify().await?;
    Ok(detector)
}

#[cfg(feature = "onnx")]
fn load_local(config: &Config, path: &Path) -> AppResult<Arc<dyn Detector>> {
    let detector = onnx::OnnxDetector::load(path, config.detection_confidence)?;
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "onnx"))]
fn load_local(_config: &Config, path: &Path) -> AppResult<Arc<dyn Detector>> {
    Err(AppError::Internal(format!(
        "Local weights {} need the `onnx` feature; set ROBOFLOW_API_KEY or rebuild with --features onnx",
        path.display()
    )))
}

/// Stand-in when no model could be loaded; every detection fails
pub struct UnavailableDetector {
    reason: String,
}

impl UnavailableDetector {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait::async_trait]
impl Detector for UnavailableDetector {
    async fn detect(&self, _image_path: &Path) -> AppResult<Vec<Detection>> {
        Err(AppError::Detection(format!("No detector available: {}", self.reason)))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;
    use tempfile::TempDir;

    fn selection(dir: &TempDir, hosted: Option<&str>) -> ModelSelection {
        ModelSelection {
            hosted_model: hosted.map(str::to_string),
            search_paths: vec![
                dir.path().join("runs/weights/best.onnx"),
                dir.path().join("best.onnx"),
            ],
            generic_path: dir.path().join("yolov8n.onnx"),
        }
    }

    #[test]
    fn test_hosted_model_wins_when_key_present() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("best.onnx"), b"weights").unwrap();

        let source = selection(&dir, Some("fridge/1")).resolve();
        assert_eq!(
            source,
            ModelSource::Hosted {
                model_id: "fridge/1".to_string()
            }
        );
        assert_eq!(source.kind(), "hosted");
    }

    #[test]
    fn test_first_existing_fine_tuned_path_is_used() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("runs/weights")).unwrap();
        std::fs::write(dir.path().join("runs/weights/best.onnx"), b"weights").unwrap();
        std::fs::write(dir.path().join("best.onnx"), b"weights").unwrap();

        let source = selection(&dir, None).resolve();
        assert_eq!(
            source,
            ModelSource::FineTuned(dir.path().join("runs/weights/best.onnx"))
        );
    }

    #[test]
    fn test_later_search_path_is_tried() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("best.onnx"), b"weights").unwrap();

        let source = selection(&dir, None).resolve();
        assert_eq!(source, ModelSource::FineTuned(dir.path().join("best.onnx")));
    }

    #[test]
    fn test_generic_fallback_when_nothing_found() {
        let dir = TempDir::new().unwrap();
        // Directories are not weight files
        std::fs::create_dir_all(dir.path().join("best.onnx")).unwrap();

        let source = selection(&dir, None).resolve();
        assert_eq!(source, ModelSource::Generic(dir.path().join("yolov8n.onnx")));
        assert_eq!(source.kind(), "generic");
    }

    #[test]
    fn test_selection_from_config_follows_detector_key() {
        let mut config = Config::default();
        assert!(ModelSelection::from_config(&config).hosted_model.is_none());

        config.roboflow_api_key = Some("robo".to_string());
        assert_eq!(
            ModelSelection::from_config(&config).hosted_model.as_deref(),
            Some("food-in-fridge-jn5is/1")
        );
    }

    fn config_for(server: &mockito::Server) -> Config {
        Config {
            roboflow_api_key: Some("robo-key".to_string()),
            roboflow_api_url: server.url(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_hosted_model_is_used_when_it_answers() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/fridge/1")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"predictions": []}"#)
            .expect(1)
            .create_async()
            .await;

        let selected = select_detector(&config_for(&server), &selection(&dir, Some("fridge/1"))).await;

        assert_eq!(
            selected.source,
            ModelSource::Hosted {
                model_id: "fridge/1".to_string()
            }
        );
        assert_eq!(selected.detector.name(), "roboflow");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_hosted_key_falls_back_to_local_search() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/fridge/1")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .with_body(r#"{"message": "Unauthorized api_key"}"#)
            .create_async()
            .await;

        let selected = select_detector(&config_for(&server), &selection(&dir, Some("fridge/1"))).await;

        assert_eq!(selected.source, ModelSource::Generic(dir.path().join("yolov8n.onnx")));
    }

    #[tokio::test]
    async fn test_missing_local_weights_degrade_instead_of_failing() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();

        let selected = select_detector(&config, &selection(&dir, None)).await;

        assert_eq!(selected.source.kind(), "generic");
        assert_eq!(selected.detector.name(), "unavailable");
        let result = selected.detector.detect(Path::new("fridge.jpg")).await;
        match result {
            Err(AppError::Detection(msg)) => assert!(msg.starts_with("No detector available")),
            other => panic!("expected detection failure, got {:?}", other.map(|d| d.len())),
        }
    }

    #[tokio::test]
    async fn test_detect_normalizes_labels() {
        let mut detector = MockDetector::new();
        detector.expect_detect().times(1).returning(|_| {
            Ok(vec![
                Detection::new("Tomato", BoundingBox::new(0.0, 0.0, 5.0, 5.0), 0.9),
                Detection::new("tomato", BoundingBox::new(6.0, 0.0, 9.0, 5.0), 0.7),
                Detection::new("Ash Gourd -Kubhindo-", BoundingBox::new(0.0, 6.0, 5.0, 9.0), 0.6),
            ])
        });

        let output = detect(&detector, Path::new("fridge.jpg")).await.unwrap();

        assert_eq!(output.detections.len(), 3);
        assert_eq!(output.ingredients.len(), 2);
        assert!(output.ingredients.contains("tomato"));
        assert!(output.ingredients.contains("ash gourd"));
    }

    #[tokio::test]
    async fn test_detect_propagates_failures() {
        let mut detector = MockDetector::new();
        detector
            .expect_detect()
            .returning(|_| Err(AppError::Detection("corrupt image".to_string())));

        let result = detect(&detector, Path::new("broken.jpg")).await;
        assert!(matches!(result, Err(AppError::Detection(_))));
    }
}
