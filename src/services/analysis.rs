use std::sync::Arc;

use crate::{
    error::AppResult,
    models::AnalysisResult,
    services::{
        detection::{self, Detector},
        recipes::{RecipeOutcome, RecipeSource},
    },
    storage::UploadStore,
};

/// Runs the fridge analysis pipeline: store → detect → normalize → recipes
///
/// Detection failures are returned to the caller. Recipe failures are logged
/// and turn into an empty recipe list so the detections still reach the client.
#[derive(Clone)]
pub struct AnalysisService {
    detector: Arc<dyn Detector>,
    recipes: Arc<dyn RecipeSource>,
    uploads: UploadStore,
    recipe_count: u32,
}

impl AnalysisService {
    pub fn new(
        detector: Arc<dyn Detector>,
        recipes: Arc<dyn RecipeSource>,
        uploads: UploadStore,
        recipe_count: u32,
    ) -> Self {
        Self {
            detector,
            recipes,
            uploads,
            recipe_count,
        }
    }

    pub async fn analyze(&self, original_name: Option<&str>, image: &[u8]) -> AppResult<AnalysisResult> {
        let upload = self.uploads.save(original_name, image).await?;

        tracing::info!(
            image_id = %upload.id,
            detector = self.detector.name(),
            "Processing image"
        );

        let output = detection::detect(self.detector.as_ref(), &upload.path)
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, image_id = %upload.id, "Detection failed");
            })?;

        tracing::info!(
            image_id = %upload.id,
            detections = output.detections.len(),
            ingredients = ?output.ingredients,
            "Detected ingredients"
        );

        let recipes = if output.ingredients.is_empty() {
            tracing::info!(image_id = %upload.id, "No ingredients detected");
            Vec::new()
        } else {
            let outcome = self
                .recipes
                .find_recipes(&output.ingredients, self.recipe_count)
                .await;
            self.log_outcome(&upload.id, &outcome);
            outcome.into_recipes()
        };

        tracing::info!(
            image_id = %upload.id,
            ingredients = output.ingredients.len(),
            recipes = recipes.len(),
            "Analysis completed"
        );

        Ok(AnalysisResult {
            detected_ingredients: output.ingredients,
            raw_detections: output.detections,
            recipes,
            image_id: upload.id,
        })
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn recipes_configured(&self) -> bool {
        self.recipes.is_configured()
    }

    fn log_outcome(&self, image_id: &str, outcome: &RecipeOutcome) {
        match outcome {
            RecipeOutcome::Found(recipes) => {
                tracing::info!(image_id = %image_id, recipes = recipes.len(), "Retrieved recipes")
            }
            RecipeOutcome::Skipped(reason) => {
                tracing::info!(image_id = %image_id, reason = %reason, "Recipe lookup skipped")
            }
            RecipeOutcome::Failed(e) => tracing::warn!(
                image_id = %image_id,
                provider = self.recipes.name(),
                error = %e,
                "Recipe lookup failed, returning detections only"
            ),
        }
    }
}
