/// Spoonacular recipe provider
///
/// API Flow:
/// 1. Search: /recipes/findByIngredients → recipes ranked by used ingredients
/// 2. Details: /recipes/informationBulk → source URL, cook time, summary for all ids at once
use crate::{
    config::Config,
    error::AppResult,
    models::{IngredientSet, Recipe, RecipeDetails},
    services::recipes::{RecipeError, RecipeOutcome, RecipeSource, SkipReason},
};
use reqwest::{Client as HttpClient, Response};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Clone)]
pub struct SpoonacularClient {
    http_client: HttpClient,
    api_key: Option<String>,
    api_url: String,
}

impl SpoonacularClient {
    /// Creates a client whose requests each time out after `timeout`
    pub fn new(api_key: Option<String>, api_url: String, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::new(
            config.recipe_api_key().map(str::to_string),
            config.spoonacular_api_url.clone(),
            config.recipe_api_timeout(),
        )
    }

    /// Runs the search then the bulk lookup and joins them
    async fn lookup(
        &self,
        api_key: &str,
        ingredients: &IngredientSet,
        count: u32,
    ) -> Result<Vec<Recipe>, RecipeError> {
        let recipes = self.search_by_ingredients(api_key, ingredients, count).await?;

        if recipes.is_empty() {
            tracing::info!(ingredients = %ingredients.to_query(), "No recipes found for ingredients");
            return Ok(recipes);
        }

        tracing::info!(found = recipes.len(), "Recipe search completed");

        let ids: Vec<i64> = recipes.iter().map(|r| r.id).collect();
        let details = self.information_bulk(api_key, &ids).await?;

        let joined = join_details(recipes, details);

        tracing::info!(
            recipes = joined.len(),
            with_details = joined.iter().filter(|r| r.has_details()).count(),
            "Recipe details joined"
        );

        Ok(joined)
    }

    async fn search_by_ingredients(
        &self,
        api_key: &str,
        ingredients: &IngredientSet,
        count: u32,
    ) -> Result<Vec<Recipe>, RecipeError> {
        let url = format!("{}/recipes/findByIngredients", self.api_url);
        let ingredients_query = ingredients.to_query();
        let number = count.to_string();

        tracing::debug!(ingredients = %ingredients_query, number = count, "Searching recipes");

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("apiKey", api_key),
                ("ingredients", ingredients_query.as_str()),
                ("number", number.as_str()),
                ("ignorePantry", "true"),
                ("ranking", "1"),
            ])
            .send()
            .await?;

        let recipes: Vec<Recipe> = check_status(response).await?.json().await?;
        Ok(recipes)
    }

    async fn information_bulk(
        &self,
        api_key: &str,
        ids: &[i64],
    ) -> Result<Vec<RecipeDetails>, RecipeError> {
        let url = format!("{}/recipes/informationBulk", self.api_url);
        let ids_query = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .http_client
            .get(&url)
            .query(&[("apiKey", api_key), ("ids", ids_query.as_str())])
            .send()
            .await?;

        let details: Vec<RecipeDetails> = check_status(response).await?.json().await?;
        Ok(details)
    }
}

#[async_trait::async_trait]
impl RecipeSource for SpoonacularClient {
    async fn find_recipes(&self, ingredients: &IngredientSet, count: u32) -> RecipeOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!("Cannot fetch recipes: no Spoonacular API key");
            return RecipeOutcome::Skipped(SkipReason::NotConfigured);
        };

        if ingredients.is_empty() {
            return RecipeOutcome::Skipped(SkipReason::NoIngredients);
        }

        match self.lookup(api_key, ingredients, count).await {
            Ok(recipes) => RecipeOutcome::Found(recipes),
            Err(e) => {
                tracing::warn!(error = %e, provider = self.name(), "Recipe lookup failed");
                RecipeOutcome::Failed(e)
            }
        }
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn name(&self) -> &'static str {
        "spoonacular"
    }
}

/// Merges bulk-information fields into search results by recipe id.
///
/// Search order is preserved. Recipes without a matching detail entry are
/// kept with their base fields only.
pub fn join_details(recipes: Vec<Recipe>, details: Vec<RecipeDetails>) -> Vec<Recipe> {
    let mut details_by_id: HashMap<i64, RecipeDetails> =
        details.into_iter().map(|d| (d.id, d)).collect();

    recipes
        .into_iter()
        .map(|mut recipe| {
            match details_by_id.remove(&recipe.id) {
                Some(details) => recipe.apply_details(details),
                None => {
                    tracing::debug!(recipe_id = recipe.id, "No bulk details for recipe");
                }
            }
            recipe
        })
        .collect()
}

async fn check_status(response: Response) -> Result<Response, RecipeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    tracing::warn!(status = %status, body = %body, "Spoonacular returned an error status");

    Err(RecipeError::from_status(status.as_u16(), body))
}
