//! Producer-facing HTTP API.
//!
//! - `POST /client/process`: enqueue `{"data": [...]}`
//! - `GET /client/total`: items confirmed by the acceptor so far
//! - `POST /client/stop`: ask the drain loop to stop (idempotent)
//! - `GET /client/status`: loop state and counters

use crate::wire::{
    ProcessRequest, ProcessResponse, StatusResponse, StopResponse, TotalProcessedResponse,
    INVALID_REQUEST, NO_ITEMS_PROVIDED,
};
use crate::Item;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use quotadrain::{DrainError, DrainHandle};

/// Shared state for the client API.
#[derive(Clone, Debug)]
pub struct ApiState {
    pub handle: DrainHandle<Item>,
}

/// Build the client router around a drain handle.
pub fn router(handle: DrainHandle<Item>) -> Router {
    Router::new()
        .route("/client/process", post(process))
        .route("/client/total", get(total))
        .route("/client/stop", post(stop))
        .route("/client/status", get(status))
        .with_state(ApiState { handle })
}

async fn process(
    State(state): State<ApiState>,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> (StatusCode, Json<ProcessResponse>) {
    let Ok(Json(request)) = body.map_err(|rejection| {
        tracing::warn!(target: "quotadrain::api", error = %rejection, "invalid process request");
    }) else {
        return (StatusCode::BAD_REQUEST, Json(ProcessResponse::failed(INVALID_REQUEST)));
    };

    match state.handle.enqueue(request.data) {
        Ok(queued) => {
            tracing::debug!(target: "quotadrain::api", queued, "items enqueued");
            (StatusCode::OK, Json(ProcessResponse::ok()))
        }
        Err(DrainError::EmptyBatch) => {
            (StatusCode::BAD_REQUEST, Json(ProcessResponse::failed(NO_ITEMS_PROVIDED)))
        }
        Err(other) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ProcessResponse::failed(other.to_string())),
        ),
    }
}

async fn total(State(state): State<ApiState>) -> Json<TotalProcessedResponse> {
    Json(TotalProcessedResponse { total_processed: state.handle.total_processed() })
}

async fn stop(State(state): State<ApiState>) -> Json<StopResponse> {
    state.handle.stop();
    Json(StopResponse { success: true })
}

async fn status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse::from_handle(&state.handle))
}
