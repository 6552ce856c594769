use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ingredient entry inside a recipe search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeIngredient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Upstream fields passed through untouched (`aisle`, `unitLong`, `meta`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Recipe returned to the client
///
/// Base fields come from the "find by ingredients" search; `source_url`,
/// `ready_in_minutes` and `summary` are only present once joined with a
/// bulk-information entry carrying the same `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub used_ingredient_count: u32,
    #[serde(default)]
    pub missed_ingredient_count: u32,
    #[serde(default)]
    pub used_ingredients: Vec<RecipeIngredient>,
    #[serde(default)]
    pub missed_ingredients: Vec<RecipeIngredient>,
    #[serde(default)]
    pub unused_ingredients: Vec<RecipeIngredient>,
    #[serde(default)]
    pub likes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_in_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Other search fields, such as `imageType`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Recipe {
    /// Copies the detail fields of a bulk-information entry onto this recipe
    pub fn apply_details(&mut self, details: RecipeDetails) {
        self.source_url = details.source_url;
        self.ready_in_minutes = details.ready_in_minutes;
        self.summary = details.summary;
    }

    pub fn has_details(&self) -> bool {
        self.source_url.is_some() || self.ready_in_minutes.is_some() || self.summary.is_some()
    }
}

/// Subset of the bulk-information response that is merged into a [`Recipe`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeDetails {
    pub id: i64,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub ready_in_minutes: Option<u32>,
    #[serde(default)]
    pub summary: Option<String>,
}
