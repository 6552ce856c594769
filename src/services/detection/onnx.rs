//! Local YOLOv8 inference through ONNX Runtime
//!
//! The session is shared by every request but guarded by a mutex, so at most
//! one inference runs at a time. Inference happens on the blocking pool.

use ndarray::{Axis, Ix2};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::ValueType,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::{
    error::{AppError, AppResult},
    models::Detection,
    services::detection::{
        yolo::{self, DecodeParams},
        Detector,
    },
};

const INPUT_NAME: &str = "images";
const OUTPUT_NAME: &str = "output0";

struct OnnxModel {
    session: Mutex<Session>,
    names: Vec<String>,
    confidence: f32,
    model_path: PathBuf,
}

#[derive(Clone)]
pub struct OnnxDetector {
    model: Arc<OnnxModel>,
}

impl OnnxDetector {
    /// Loads weights from `path`. Class names come from the export metadata,
    /// falling back to COCO for 80-class models. A class count that does not
    /// match the names is a load error.
    pub fn load(path: &Path, confidence: f32) -> AppResult<Self> {
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| {
                AppError::Internal(format!("Failed to load model {}: {}", path.display(), e))
            })?;

        let metadata = session
            .metadata()
            .ok()
            .and_then(|meta| meta.custom("names").ok().flatten());
        if metadata.is_none() {
            tracing::warn!(model = %path.display(), "Model has no class names metadata");
        }

        let names = yolo::resolve_class_names(metadata.as_deref(), static_class_count(&session))
            .map_err(|e| AppError::Internal(format!("Failed to load model {}: {}", path.display(), e)))?;

        tracing::info!(
            model = %path.display(),
            classes = names.len(),
            "ONNX model loaded"
        );

        Ok(Self {
            model: Arc::new(OnnxModel {
                session: Mutex::new(session),
                names,
                confidence,
                model_path: path.to_path_buf(),
            }),
        })
    }
}

/// Class count from the `[1, 4 + classes, anchors]` output, when the export fixes it
fn static_class_count(session: &Session) -> Option<usize> {
    let output = session.outputs.iter().find(|o| o.name == OUTPUT_NAME)?;
    match &output.output_type {
        ValueType::Tensor { dimensions, .. } => dimensions
            .get(1)
            .and_then(|rows| usize::try_from(*rows).ok())
            .and_then(yolo::output_class_count),
        _ => None,
    }
}

impl OnnxModel {
    fn infer(&self, image_path: &Path) -> AppResult<Vec<Detection>> {
        let image = image::open(image_path)
            .map_err(|e| AppError::Detection(format!("Invalid image: {}", e)))?;
        let input = yolo::to_input_tensor(&image, yolo::INPUT_SIZE, yolo::INPUT_SIZE);

        let session = self
            .session
            .lock()
            .map_err(|_| AppError::Internal("ONNX session lock poisoned".to_string()))?;

        let inputs = ort::inputs![INPUT_NAME => input.view()]
            .map_err(|e| AppError::Detection(format!("Failed to build model input: {}", e)))?;
        let outputs = session
            .run(inputs)
            .map_err(|e| AppError::Detection(format!("Inference failed: {}", e)))?;

        let output = outputs[OUTPUT_NAME]
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::Detection(format!("Unexpected model output: {}", e)))?;
        let predictions = output
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|e| AppError::Detection(format!("Unexpected model output shape: {}", e)))?;

        if yolo::output_class_count(predictions.nrows()) != Some(self.names.len()) {
            return Err(AppError::Detection(format!(
                "Model output has {} rows, expected {} for {} classes",
                predictions.nrows(),
                self.names.len() + 4,
                self.names.len()
            )));
        }

        let params = DecodeParams {
            confidence: self.confidence,
            iou: yolo::NMS_IOU,
            input_size: (yolo::INPUT_SIZE, yolo::INPUT_SIZE),
            image_size: (image.width(), image.height()),
        };

        Ok(yolo::decode_predictions(predictions, &self.names, &params))
    }
}

#[async_trait::async_trait]
impl Detector for OnnxDetector {
    async fn detect(&self, image_path: &Path) -> AppResult<Vec<Detection>> {
        let model = Arc::clone(&self.model);
        let path = image_path.to_path_buf();

        let detections = tokio::task::spawn_blocking(move || model.infer(&path))
            .await
            .map_err(|e| AppError::Internal(format!("Inference task failed: {}", e)))??;

        tracing::info!(
            model = %self.model.model_path.display(),
            detections = detections.len(),
            provider = self.name(),
            "Detection completed"
        );

        Ok(detections)
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
