use crate::services::{AnalysisService, ModelSource};

/// Shared application state
///
/// Everything in here is built once at startup and read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub analysis: AnalysisService,
    /// Where the detector weights were resolved from
    pub model_source: ModelSource,
    /// Whether a detector provider key was configured
    pub detector_provider_configured: bool,
    /// Largest accepted upload body
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        analysis: AnalysisService,
        model_source: ModelSource,
        detector_provider_configured: bool,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            analysis,
            model_source,
            detector_provider_configured,
            max_upload_bytes,
        }
    }
}
