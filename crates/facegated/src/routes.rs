//! HTTP surface of the gateway.
//!
//! All identity routes live under `/api/v1`; `/health` sits outside the
//! prefix and is never counted by the request tracker.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::engine::EngineHandle;
use crate::error::ApiError;
use crate::store::{FacePayload, FaceStore};
use crate::tracker::{PathStats, RequestTracker};

const API_PREFIX: &str = "/api/v1";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub store: Arc<dyn FaceStore>,
    pub tracker: Arc<RequestTracker>,
    /// Number of hits returned by recognition.
    pub search_limit: u64,
}

pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let api = Router::new()
        .route("/register", post(register_face))
        .route("/recognize", post(recognize_face))
        .route("/face", delete(delete_face))
        .route("/admin/stats", get(system_stats));

    Router::new()
        .route("/health", get(health))
        .nest(API_PREFIX, api)
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Counts API requests before they reach their handler, so failed
/// requests show up in the stats too.
async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if path.starts_with(API_PREFIX) {
        state.tracker.record(path).await;
    }
    next.run(request).await
}

#[derive(Serialize)]
struct RegisterResponse {
    id: String,
    message: String,
    face_image: String,
}

#[derive(Serialize)]
struct MatchEntry {
    id: String,
    score: f32,
    metadata: serde_json::Value,
    face_image: Option<String>,
}

#[derive(Serialize)]
struct RecognizeResponse {
    matches: Vec<MatchEntry>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct StatsResponse {
    memory_usage_mb: f64,
    total_face_vectors: serde_json::Value,
    db_segments: serde_json::Value,
    api_performance: BTreeMap<String, PathStats>,
}

#[derive(Deserialize)]
struct IdentityParams {
    name: String,
    phone_number: String,
}

struct UploadedFile {
    filename: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

async fn register_face(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<RegisterResponse>, ApiError> {
    let mut file = None;
    let mut name = None;
    let mut age = None;
    let mut phone_number = None;

    while let Some(field) = multipart.next_field().await.map_err(|_| malformed())? {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "file" => file = Some(read_file_field(field).await?),
            "name" => name = Some(field.text().await.map_err(|_| malformed())?),
            "age" => age = Some(field.text().await.map_err(|_| malformed())?),
            "phone_number" => phone_number = Some(field.text().await.map_err(|_| malformed())?),
            _ => {}
        }
    }

    let file = require(file, "file")?;
    let name = require(name, "name")?;
    let age_raw = require(age, "age")?;
    let phone_number = require(phone_number, "phone_number")?;

    let age: i64 = age_raw
        .trim()
        .parse()
        .map_err(|_| ApiError::validation("Age must be an integer"))?;
    validate_name(&name)?;
    validate_phone(&phone_number)?;

    if state.store.is_registered(&name, &phone_number).await? {
        return Err(ApiError::AlreadyRegistered { name, phone_number });
    }

    ensure_image_content_type(file.content_type.as_deref())?;
    let image = facegate_core::decode_image(&file.data).map_err(|_| ApiError::UndecodableImage)?;
    let analysis = state.engine.analyze(image).await?;

    let payload = FacePayload {
        name: name.clone(),
        age,
        phone_number,
        filename: file.filename,
        face_image: analysis.thumbnail_b64.clone(),
        registered_at: chrono::Utc::now().to_rfc3339(),
    };
    let id = state.store.insert(&analysis.embedding, payload).await?;
    tracing::info!(%id, name = %name, "face registered");

    Ok(Json(RegisterResponse {
        id,
        message: "Face registered successfully".to_string(),
        face_image: analysis.thumbnail_b64,
    }))
}

async fn recognize_face(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(|_| malformed())? {
        if field.name() == Some("file") {
            file = Some(read_file_field(field).await?);
        }
    }
    let file = require(file, "file")?;

    ensure_image_content_type(file.content_type.as_deref())?;
    let image = facegate_core::decode_image(&file.data).map_err(|_| ApiError::UndecodableImage)?;
    let analysis = state.engine.analyze(image).await?;

    let matches = state
        .store
        .search(&analysis.embedding, state.search_limit)
        .await?
        .into_iter()
        .map(|m| MatchEntry {
            id: m.id,
            score: m.score,
            metadata: m.metadata,
            face_image: m.face_image,
        })
        .collect();

    Ok(Json(RecognizeResponse { matches }))
}

async fn delete_face(
    State(state): State<AppState>,
    Query(params): Query<IdentityParams>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state
        .store
        .is_registered(&params.name, &params.phone_number)
        .await?
    {
        return Err(ApiError::UnknownIdentity {
            name: params.name,
            phone_number: params.phone_number,
        });
    }

    state
        .store
        .delete_by_identity(&params.name, &params.phone_number)
        .await?;
    tracing::info!(name = %params.name, "faces deleted");

    Ok(Json(MessageResponse {
        message: format!("Face(s) for user '{}' deleted successfully", params.name),
    }))
}

/// Memory, collection counters and per-path request statistics. Collection
/// counters degrade to `"Unavailable"` when the store cannot be reached;
/// the rest of the report is still served.
async fn system_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let (total_face_vectors, db_segments) = match state.store.collection_info().await {
        Ok(info) => (json!(info.vectors), json!(info.segments)),
        Err(err) => {
            tracing::warn!(error = %err, "collection info unavailable");
            (json!("Unavailable"), json!("Unavailable"))
        }
    };

    Json(StatsResponse {
        memory_usage_mb: process_memory_mb(),
        total_face_vectors,
        db_segments,
        api_performance: state.tracker.stats().await,
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn read_file_field(
    field: axum::extract::multipart::Field<'_>,
) -> Result<UploadedFile, ApiError> {
    let filename = field.file_name().map(|s| s.to_string());
    let content_type = field.content_type().map(|s| s.to_string());
    let data = field.bytes().await.map_err(|_| malformed())?.to_vec();
    Ok(UploadedFile {
        filename,
        content_type,
        data,
    })
}

fn malformed() -> ApiError {
    ApiError::validation("Malformed multipart body")
}

fn require<T>(value: Option<T>, field: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::validation(format!("Missing field: {field}")))
}

/// Length check runs on the trimmed name; the stored name keeps its
/// original whitespace.
fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.trim().chars().count() < 2 {
        return Err(ApiError::validation(
            "Name must be at least 2 characters long",
        ));
    }
    Ok(())
}

fn validate_phone(phone: &str) -> Result<(), ApiError> {
    if phone.chars().count() != 10 || !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::validation("Phone number must be exactly 10 digits"));
    }
    Ok(())
}

fn ensure_image_content_type(content_type: Option<&str>) -> Result<(), ApiError> {
    match content_type {
        Some(ct) if ct.starts_with("image/") => Ok(()),
        _ => Err(ApiError::validation("File must be an image")),
    }
}

/// Resident memory of this process in MB, rounded to two decimals.
fn process_memory_mb() -> f64 {
    let mut sys = sysinfo::System::new_all();
    sys.refresh_all();
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0.0;
    };
    let Some(process) = sys.process(pid) else {
        return 0.0;
    };
    let mb = process.memory() as f64 / (1024.0 * 1024.0);
    (mb * 100.0).round() / 100.0
}
