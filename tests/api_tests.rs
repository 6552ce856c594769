use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::{
    multipart::{MultipartForm, Part},
    TestServer,
};
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use tempfile::TempDir;
use uuid::Uuid;

use visionchef_api::api::{create_router, AppState};
use visionchef_api::error::{AppError, AppResult};
use visionchef_api::models::{BoundingBox, Detection};
use visionchef_api::services::{AnalysisService, Detector, ModelSource, SpoonacularClient};
use visionchef_api::storage::UploadStore;

/// Detector returning a fixed set of labels, or failing on demand
struct FakeDetector {
    labels: Vec<&'static str>,
    fail_with: Option<&'static str>,
}

#[async_trait::async_trait]
impl Detector for FakeDetector {
    async fn detect(&self, image_path: &Path) -> AppResult<Vec<Detection>> {
        assert!(image_path.exists(), "upload should be on disk before detection");

        if let Some(message) = self.fail_with {
            return Err(AppError::Detection(message.to_string()));
        }

        Ok(self
            .labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let x = i as f32 * 20.0;
                Detection::new(*label, BoundingBox::new(x, 10.0, x + 15.0, 30.0), 0.9)
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

struct TestApp {
    server: TestServer,
    upload_dir: TempDir,
}

fn create_test_app(detector: FakeDetector, recipe_api: Option<(&str, String)>) -> TestApp {
    let upload_dir = TempDir::new().unwrap();

    let (api_key, api_url) = match recipe_api {
        Some((key, url)) => (Some(key.to_string()), url),
        None => (None, "http://127.0.0.1:9".to_string()),
    };
    let recipes = SpoonacularClient::new(api_key, api_url, Duration::from_secs(5)).unwrap();

    let analysis = AnalysisService::new(
        Arc::new(detector),
        Arc::new(recipes),
        UploadStore::new(upload_dir.path(), None),
        5,
    );
    let state = AppState::new(
        analysis,
        ModelSource::Generic(PathBuf::from("yolov8n.onnx")),
        false,
        1024 * 1024,
    );

    TestApp {
        server: TestServer::new(create_router(state)).unwrap(),
        upload_dir,
    }
}

fn fridge_detector() -> FakeDetector {
    FakeDetector {
        labels: vec!["Tomato", "onion_", "ash gourd -kubhindo-"],
        fail_with: None,
    }
}

fn image_form(file_name: &str) -> MultipartForm {
    let part = Part::bytes(b"\xff\xd8\xff\xe0 fake jpeg".to_vec())
        .file_name(file_name)
        .mime_type("image/jpeg");
    MultipartForm::new().add_part("file", part)
}

fn sorted_ingredients(body: &Value) -> Vec<String> {
    let mut ingredients: Vec<String> = body["detected_ingredients"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    ingredients.sort();
    ingredients
}

#[tokio::test]
async fn test_root() {
    let app = create_test_app(fridge_detector(), None);

    let response = app.server.get("/").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "message": "VisionChef API is running" }));
}

#[tokio::test]
async fn test_health_reports_missing_credentials() {
    let app = create_test_app(fridge_detector(), None);

    let response = app.server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["recipe_api_configured"], false);
    assert_eq!(body["detector_provider_configured"], false);
    assert_eq!(body["detector"], "generic");
    assert_eq!(body["detector_backend"], "fake");
}

#[tokio::test]
async fn test_analyze_fridge_without_recipe_key() {
    let app = create_test_app(fridge_detector(), None);

    let response = app
        .server
        .post("/analyze_fridge")
        .multipart(image_form("fridge.jpg"))
        .await;

    response.assert_status_ok();
    assert!(!response.header("x-request-id").is_empty());

    let body: Value = response.json();
    assert_eq!(sorted_ingredients(&body), vec!["ash gourd", "onion", "tomato"]);
    assert_eq!(body["raw_detections"].as_array().unwrap().len(), 3);
    assert_eq!(body["raw_detections"][0]["label"], "Tomato");
    assert_eq!(body["raw_detections"][0]["bbox"], json!([0.0, 10.0, 15.0, 30.0]));
    assert_eq!(body["recipes"], json!([]));

    let image_id = body["image_id"].as_str().unwrap();
    let stem = image_id.strip_suffix(".jpg").expect("extension is preserved");
    assert!(Uuid::parse_str(stem).is_ok(), "unexpected image_id {}", image_id);
    assert!(app.upload_dir.path().join(image_id).exists());
}

#[tokio::test]
async fn test_analyze_fridge_with_recipes() {
    let mut spoonacular = Server::new_async().await;
    let search = spoonacular
        .mock("GET", "/recipes/findByIngredients")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("ingredients".into(), "ash gourd,onion,tomato".into()),
            Matcher::UrlEncoded("number".into(), "5".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([
                {"id": 1, "title": "Gourd Curry", "usedIngredientCount": 3, "missedIngredientCount": 1,
                 "usedIngredients": [{"name": "ash gourd"}], "missedIngredients": [{"name": "cumin"}]},
                {"id": 2, "title": "Tomato Salad", "usedIngredientCount": 2, "missedIngredientCount": 0}
            ])
            .to_string(),
        )
        .create_async()
        .await;
    let bulk = spoonacular
        .mock("GET", "/recipes/informationBulk")
        .match_query(Matcher::UrlEncoded("ids".into(), "1,2".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!([{"id": 2, "sourceUrl": "u", "readyInMinutes": 15}]).to_string())
        .create_async()
        .await;

    let app = create_test_app(fridge_detector(), Some(("spoon-key", spoonacular.url())));

    let response = app
        .server
        .post("/analyze_fridge")
        .multipart(image_form("fridge.png"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let recipes = body["recipes"].as_array().unwrap();

    assert_eq!(recipes.len(), 2);
    assert_eq!(recipes[0]["id"], 1);
    assert!(recipes[0].get("sourceUrl").is_none());
    assert_eq!(recipes[0]["missedIngredients"][0]["name"], "cumin");
    assert_eq!(recipes[1]["id"], 2);
    assert_eq!(recipes[1]["sourceUrl"], "u");
    assert_eq!(recipes[1]["readyInMinutes"], 15);

    search.assert_async().await;
    bulk.assert_async().await;
}

#[tokio::test]
async fn test_recipe_service_errors_still_return_detections() {
    for status in [401, 402, 403] {
        let mut spoonacular = Server::new_async().await;
        spoonacular
            .mock("GET", "/recipes/findByIngredients")
            .match_query(Matcher::Any)
            .with_status(status)
            .with_body(r#"{"status":"failure","message":"nope"}"#)
            .create_async()
            .await;

        let app = create_test_app(fridge_detector(), Some(("spoon-key", spoonacular.url())));

        let response = app
            .server
            .post("/analyze_fridge")
            .multipart(image_form("fridge.jpg"))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["recipes"], json!([]), "status {}", status);
        assert_eq!(sorted_ingredients(&body), vec!["ash gourd", "onion", "tomato"]);
        assert_eq!(body["raw_detections"].as_array().unwrap().len(), 3);
    }
}

#[tokio::test]
async fn test_no_detections_skips_recipe_service() {
    let mut spoonacular = Server::new_async().await;
    let search = spoonacular
        .mock("GET", "/recipes/findByIngredients")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let detector = FakeDetector {
        labels: vec![],
        fail_with: None,
    };
    let app = create_test_app(detector, Some(("spoon-key", spoonacular.url())));

    let response = app
        .server
        .post("/analyze_fridge")
        .multipart(image_form("empty.jpg"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["detected_ingredients"], json!([]));
    assert_eq!(body["recipes"], json!([]));
    search.assert_async().await;
}

#[tokio::test]
async fn test_detection_failure_is_server_error() {
    let detector = FakeDetector {
        labels: vec![],
        fail_with: Some("cannot identify image file"),
    };
    let app = create_test_app(detector, None);

    let response = app
        .server
        .post("/analyze_fridge")
        .multipart(image_form("broken.jpg"))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["detail"], "Detection failed: cannot identify image file");
}

#[tokio::test]
async fn test_missing_file_field_is_bad_request() {
    let app = create_test_app(fridge_detector(), None);

    let form = MultipartForm::new().add_text("note", "no image here");
    let response = app.server.post("/analyze_fridge").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["detail"], "Missing file field");
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = create_test_app(fridge_detector(), None);
    let id = Uuid::new_v4().to_string();

    let response = app
        .server
        .get("/health")
        .add_header(
            axum::http::HeaderName::from_static("x-request-id"),
            axum::http::HeaderValue::from_str(&id).unwrap(),
        )
        .await;

    assert_eq!(response.header("x-request-id"), id.as_str());
}

#[tokio::test]
async fn test_empty_file_is_bad_request() {
    let app = create_test_app(fridge_detector(), None);

    let part = Part::bytes(Vec::new()).file_name("fridge.jpg").mime_type("image/jpeg");
    let form = MultipartForm::new().add_part("file", part);
    let response = app.server.post("/analyze_fridge").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["detail"], "Uploaded file is empty");
    assert_eq!(std::fs::read_dir(app.upload_dir.path()).unwrap().count(), 0);
}
