use serde::{Deserialize, Serialize};

mod detection;
mod ingredient;
mod recipe;

pub use detection::{BoundingBox, Detection};
pub use ingredient::IngredientSet;
pub use recipe::{Recipe, RecipeDetails, RecipeIngredient};

/// Response body of a fridge analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub detected_ingredients: IngredientSet,
    pub raw_detections: Vec<Detection>,
    pub recipes: Vec<Recipe>,
    /// Stored file name of the uploaded image
    pub image_id: String,
}
