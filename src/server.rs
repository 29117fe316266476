use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::RecommendError;
use crate::recommend::ModelState;
use crate::song::SongItem;

pub struct AppState {
    pub model: ModelState,
    pub default_count: usize,
}

/// Response body of both recommendation endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationOutput {
    pub query: String,
    pub input_song: Option<SongItem>,
    pub results: Vec<SongItem>,
}

#[derive(Debug, Deserialize)]
pub struct CountParams {
    n: Option<usize>,
}

impl CountParams {
    fn count(&self, state: &AppState) -> usize {
        self.n.unwrap_or(state.default_count)
    }
}

/// [`RecommendError`] mapped onto an HTTP status with a `{"detail": ..}` body.
pub struct ApiError(RecommendError);

impl From<RecommendError> for ApiError {
    fn from(e: RecommendError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RecommendError::NotFound(_) => StatusCode::NOT_FOUND,
            RecommendError::InvalidFeatures { .. }
            | RecommendError::InvalidCount(_)
            | RecommendError::EmptyQuery => StatusCode::BAD_REQUEST,
            RecommendError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(read_root))
        .route("/recommend/song/{song_name}", get(recommend_by_name))
        .route("/recommend/features", post(recommend_by_features))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn start_server(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(Arc::new(state));
    let listener = TcpListener::bind(addr).await?;
    info!("Recommendation API available at http://{}", addr);
    axum::serve(listener, app).await
}

async fn read_root(State(state): State<Arc<AppState>>) -> Json<Value> {
    let songs = state.model.recommender().map(|r| r.len()).unwrap_or(0);
    Json(json!({
        "status": "running",
        "model_loaded": matches!(state.model, ModelState::Ready(_)),
        "songs": songs,
    }))
}

async fn recommend_by_name(
    State(state): State<Arc<AppState>>,
    Path(song_name): Path<String>,
    Query(params): Query<CountParams>,
) -> Result<Json<RecommendationOutput>, ApiError> {
    let recommender = state.model.recommender()?;
    let rec = recommender.recommend_by_name(&song_name, params.count(&state))?;
    Ok(Json(RecommendationOutput {
        query: song_name,
        input_song: Some(rec.input_song),
        results: rec.results,
    }))
}

async fn recommend_by_features(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CountParams>,
    Json(body): Json<Value>,
) -> Result<Json<RecommendationOutput>, ApiError> {
    let recommender = state.model.recommender()?;
    let features = recommender.parse_features(&body)?;
    let results = recommender.recommend_by_features(&features, params.count(&state))?;
    Ok(Json(RecommendationOutput {
        query: "Custom Features".to_string(),
        input_song: None,
        results,
    }))
}
