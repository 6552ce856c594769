use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use visionchef_api::{
    api::{create_router, AppState},
    config::Config,
    services::{
        detection::{self, SelectedDetector},
        AnalysisService, ModelSelection, ModelSource, SpoonacularClient,
    },
    storage::{spawn_sweeper, UploadStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visionchef_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!(
        recipe_api_key = config.recipe_api_key().is_some(),
        detector_api_key = config.detector_api_key().is_some(),
        "Credentials loaded"
    );

    // Detector
    let SelectedDetector {
        source: model_source,
        detector,
    } = detection::select_detector(&config, &ModelSelection::from_config(&config)).await;
    match &model_source {
        ModelSource::Generic(path) => tracing::warn!(
            model = %path.display(),
            backend = detector.name(),
            "Fine-tuned model not found, using generic weights; expect poor results for fridge items"
        ),
        source => tracing::info!(source = %source, backend = detector.name(), "Detector model selected"),
    }

    // Recipes
    let recipes = SpoonacularClient::from_config(&config)?;
    if config.recipe_api_key().is_none() {
        tracing::warn!("No Spoonacular API key found, recipe search is disabled");
    }

    // Uploads
    let uploads = UploadStore::new(config.upload_dir.clone(), config.upload_retention());
    tokio::fs::create_dir_all(uploads.dir()).await?;
    if spawn_sweeper(uploads.clone(), config.upload_sweep_interval()).is_none() {
        tracing::info!(dir = %uploads.dir().display(), "Upload retention disabled, files are kept");
    }

    let analysis = AnalysisService::new(detector, Arc::new(recipes), uploads, config.recipe_count);
    let state = AppState::new(
        analysis,
        model_source,
        config.detector_api_key().is_some(),
        config.max_upload_bytes,
    );

    let app = create_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Server running on http://{}", address);
    axum::serve(listener, app).await?;

    Ok(())
}
