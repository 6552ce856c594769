/// Roboflow hosted inference
///
/// The image is posted base64-encoded to `{api_url}/{model_id}`. Predictions
/// come back in centre format (`x`, `y`, `width`, `height`) and are converted
/// to corner pixel coordinates clamped to the source image.
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{BoundingBox, Detection},
    services::detection::Detector,
};

#[derive(Debug, Deserialize)]
struct HostedResponse {
    #[serde(default)]
    predictions: Vec<HostedPrediction>,
}

#[derive(Debug, Deserialize)]
struct HostedPrediction {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    confidence: f32,
    class: String,
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Edge of the blank image sent by [`RoboflowDetector::verify`]
const CHECK_IMAGE_SIZE: u32 = 32;

#[derive(Clone)]
pub struct RoboflowDetector {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model_id: String,
    confidence: f32,
}

impl RoboflowDetector {
    pub fn new(
        api_key: String,
        api_url: String,
        model_id: String,
        confidence: f32,
    ) -> AppResult<Self> {
        Ok(Self {
            http_client: HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            model_id: model_id.trim_matches('/').to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        })
    }

    /// Sends one blank image to confirm the key and model id are accepted
    pub async fn verify(&self) -> AppResult<()> {
        let mut blank = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::new(CHECK_IMAGE_SIZE, CHECK_IMAGE_SIZE))
            .write_to(&mut Cursor::new(&mut blank), image::ImageOutputFormat::Png)
            .map_err(|e| AppError::Internal(format!("Failed to encode check image: {}", e)))?;

        self.infer(blank).await?;
        tracing::info!(model = %self.model_id, "Roboflow model reachable");
        Ok(())
    }

    async fn infer(&self, image: Vec<u8>) -> AppResult<HostedResponse> {
        let url = format!("{}/{}", self.api_url, self.model_id);
        let confidence_pct = ((self.confidence * 100.0).round() as u32).to_string();

        let response = self
            .http_client
            .post(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("confidence", confidence_pct.as_str()),
            ])
            .header("content-type", "application/x-www-form-urlencoded")
            .body(BASE64.encode(image))
            .send()
            .await
            .map_err(|e| AppError::Detection(format!("Roboflow request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Roboflow inference failed");
            return Err(AppError::Detection(format!(
                "Roboflow returned status {}: {}",
                status, body
            )));
        }

        response.json().await.map_err(|e| {
            AppError::Detection(format!("Failed to parse Roboflow response: {}", e.without_url()))
        })
    }
}

#[async_trait::async_trait]
impl Detector for RoboflowDetector {
    async fn detect(&self, image_path: &Path) -> AppResult<Vec<Detection>> {
        let bytes = tokio::fs::read(image_path).await.map_err(|e| {
            AppError::Detection(format!("Failed to read {}: {}", image_path.display(), e))
        })?;
        let (width, height) = image_dimensions(&bytes)?;

        let response = self.infer(bytes).await?;

        let detections: Vec<Detection> = response
            .predictions
            .into_iter()
            .filter(|p| p.confidence >= self.confidence)
            .map(|p| {
                let bbox = BoundingBox::from_center(p.x, p.y, p.width, p.height)
                    .clamp_to(width as f32, height as f32);
                Detection::new(p.class, bbox, p.confidence)
            })
            .collect();

        tracing::info!(
            model = %self.model_id,
            detections = detections.len(),
            provider = self.name(),
            "Detection completed"
        );

        Ok(detections)
    }

    fn name(&self) -> &'static str {
        "roboflow"
    }
}

/// Reads the image header, rejecting files that are not a supported image
fn image_dimensions(bytes: &[u8]) -> AppResult<(u32, u32)> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::Detection(format!("Failed to read image: {}", e)))?
        .into_dimensions()
        .map_err(|e| AppError::Detection(format!("Invalid image: {}", e)))
}
