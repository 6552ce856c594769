/// Recipe lookup abstraction
///
/// A recipe source turns an ingredient set into candidate recipes. Lookups
/// never fail from the caller's point of view: every upstream problem is
/// reported through [`RecipeOutcome`] so the analysis can still answer with
/// its detections when the recipe service is down, rate-limited or the key
/// has been revoked.
use crate::models::{IngredientSet, Recipe};

pub mod spoonacular;

pub use spoonacular::SpoonacularClient;

/// Default number of recipes requested per lookup
pub const DEFAULT_RECIPE_COUNT: u32 = 5;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecipeSource: Send + Sync {
    /// Finds up to `count` recipes using the given ingredients
    async fn find_recipes(&self, ingredients: &IngredientSet, count: u32) -> RecipeOutcome;

    /// Whether a credential is available
    fn is_configured(&self) -> bool;

    /// Source name for logging
    fn name(&self) -> &'static str;
}

/// Result of a recipe lookup
#[derive(Debug)]
pub enum RecipeOutcome {
    Found(Vec<Recipe>),
    /// The lookup was not attempted
    Skipped(SkipReason),
    /// The upstream service could not be used
    Failed(RecipeError),
}

impl RecipeOutcome {
    /// Collapses the outcome to a list, empty unless recipes were found
    pub fn into_recipes(self) -> Vec<Recipe> {
        match self {
            RecipeOutcome::Found(recipes) => recipes,
            RecipeOutcome::Skipped(_) | RecipeOutcome::Failed(_) => Vec::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RecipeOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoIngredients,
    NotConfigured,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoIngredients => write!(f, "no ingredients detected"),
            SkipReason::NotConfigured => write!(f, "no recipe API key configured"),
        }
    }
}

/// Why the recipe service could not be used
#[derive(thiserror::Error, Debug)]
pub enum RecipeError {
    #[error("recipe API rejected the key: {body}")]
    Unauthorized { body: String },

    #[error("recipe API quota exhausted: {body}")]
    QuotaExceeded { body: String },

    #[error("recipe API access forbidden: {body}")]
    Forbidden { body: String },

    #[error("recipe API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("recipe API request timed out")]
    Timeout,

    #[error("recipe API request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("recipe API returned a malformed body: {0}")]
    Decode(String),
}

impl RecipeError {
    /// Classifies a non-success status together with its response body
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => RecipeError::Unauthorized { body },
            402 => RecipeError::QuotaExceeded { body },
            403 => RecipeError::Forbidden { body },
            _ => RecipeError::Status { status, body },
        }
    }
}

impl From<reqwest::Error> for RecipeError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the API key as a query parameter
        let err = err.without_url();
        if err.is_timeout() {
            RecipeError::Timeout
        } else if err.is_decode() {
            RecipeError::Decode(err.to_string())
        } else {
            RecipeError::Transport(err)
        }
    }
}
