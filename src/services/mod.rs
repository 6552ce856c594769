pub mod analysis;
pub mod detection;
pub mod labels;
pub mod recipes;

pub use analysis::AnalysisService;
pub use detection::{Detector, ModelSelection, ModelSource};
pub use recipes::{RecipeOutcome, RecipeSource, SpoonacularClient};
