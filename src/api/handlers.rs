use axum::{
    extract::{Multipart, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::RequestId;
use crate::models::AnalysisResult;

use super::AppState;

/// Multipart field names accepted for the uploaded image
const IMAGE_FIELDS: &[&str] = &["file", "image"];

// Response types

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub recipe_api_configured: bool,
    pub detector_provider_configured: bool,
    /// `hosted`, `fine_tuned` or `generic`
    pub detector: String,
    pub detector_backend: String,
}

// Handlers

/// Liveness message
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "VisionChef API is running".to_string(),
    })
}

/// Reports which credentials are configured and which detector is in use
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        recipe_api_configured: state.analysis.recipes_configured(),
        detector_provider_configured: state.detector_provider_configured,
        detector: state.model_source.kind().to_string(),
        detector_backend: state.analysis.detector_name().to_string(),
    })
}

/// Detects ingredients in an uploaded fridge photo and looks up recipes
pub async fn analyze_fridge(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    mut multipart: Multipart,
) -> AppResult<Json<AnalysisResult>> {
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read multipart field: {}", e)))?
    {
        let is_image = field.name().is_some_and(|name| IMAGE_FIELDS.contains(&name));
        if !is_image || upload.is_some() {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read file: {}", e)))?;

        upload = Some((file_name, data.to_vec()));
    }

    let (file_name, data) =
        upload.ok_or_else(|| AppError::InvalidInput("Missing file field".to_string()))?;

    if data.is_empty() {
        return Err(AppError::InvalidInput("Uploaded file is empty".to_string()));
    }

    tracing::info!(
        request_id = %request_id,
        file_name = file_name.as_deref().unwrap_or("<none>"),
        bytes = data.len(),
        "Processing fridge analysis request"
    );

    let result = state.analysis.analyze(file_name.as_deref(), &data).await?;

    tracing::info!(
        request_id = %request_id,
        image_id = %result.image_id,
        ingredients = result.detected_ingredients.len(),
        recipes = result.recipes.len(),
        "Fridge analysis completed"
    );

    Ok(Json(result))
}
