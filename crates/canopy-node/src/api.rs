//! HTTP API for Canopy.

use crate::node::NodeState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use canopy_tree::{Node, PlacementEngine, TreeError, TreeReader, TreeView};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type AppState = Arc<NodeState>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(now))
        .route("/health", get(health))
        // Policyholders
        .route(
            "/api/policyholders",
            get(get_policyholder_tree).post(create_policyholder),
        )
        .route("/api/policyholders/:code/top", get(get_top_tree))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Errors ---

/// JSON error body: `{"message": "..."}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

/// An error response with a status and a client-facing message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<TreeError> for ApiError {
    fn from(e: TreeError) -> Self {
        let (status, message) = match &e {
            TreeError::RootAlreadyExists => (StatusCode::BAD_REQUEST, "root has been created."),
            TreeError::IntroducerNotFound(_) => (StatusCode::BAD_REQUEST, "introducer not found."),
            TreeError::NodeNotFound(_) => (StatusCode::NOT_FOUND, "policyholder not found."),
            TreeError::NodeIsRoot(_) => (StatusCode::BAD_REQUEST, "node is root."),
            TreeError::StoreUnavailable(_) | TreeError::CorruptTree(_) => {
                tracing::error!("request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error.")
            }
        };
        Self {
            status,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { message: self.message })).into_response()
    }
}

// --- Health endpoints ---

#[derive(Debug, Serialize)]
struct NowResponse {
    now: String,
}

async fn now() -> Json<NowResponse> {
    Json(NowResponse {
        now: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    })
}

async fn health() -> &'static str {
    "OK"
}

// --- Policyholder endpoints ---

#[derive(Debug, Deserialize)]
struct CreatePolicyholderRequest {
    name: Option<String>,
    introducer_code: Option<String>,
}

/// Create the root (no introducer) or place a child under an introducer.
async fn create_policyholder(
    State(state): State<AppState>,
    Json(req): Json<CreatePolicyholderRequest>,
) -> Result<Json<Node>, ApiError> {
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("name is required."))?;

    let introducer = req.introducer_code.as_deref().filter(|c| !c.is_empty());

    let _guard = state.placement_lock.lock().await;
    let placement = PlacementEngine::new(state.storage.as_ref(), state.config.code_format());
    let node = match introducer {
        None => placement.place_root(name)?,
        Some(code) => placement.place_node(code, name)?,
    };

    Ok(Json(node))
}

#[derive(Debug, Deserialize)]
struct TreeQuery {
    code: Option<String>,
}

/// Tree rooted at the given code.
async fn get_policyholder_tree(
    State(state): State<AppState>,
    Query(query): Query<TreeQuery>,
) -> Result<Json<TreeView>, ApiError> {
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("code is required."))?;

    let view = TreeReader::new(state.storage.as_ref()).subtree(&code, state.config.view_depth)?;
    Ok(Json(view))
}

/// Tree rooted at the structural parent of the given code.
async fn get_top_tree(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<TreeView>, ApiError> {
    let view =
        TreeReader::new(state.storage.as_ref()).ancestor_view(&code, state.config.view_depth)?;
    Ok(Json(view))
}
