use crate::errors::Error;
use crate::model::TriggerEvent;
use crate::scheduler::RunStatus;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info};

pub const HTTP_SOURCE: &str = "http";

#[derive(Debug, Clone)]
struct AppState {
    status: RunStatus,
    triggers: mpsc::Sender<TriggerEvent>,
}

#[derive(Debug, Serialize)]
pub struct TriggerAccepted {
    pub trigger_id: uuid::Uuid,
    pub source: String,
}

pub fn create_router(status: RunStatus, triggers: mpsc::Sender<TriggerEvent>) -> Router {
    let state = AppState { status, triggers };

    Router::new()
        .route("/api/v1/runs", post(trigger_run))
        .route("/api/v1/runs/last", get(last_run))
        .with_state(state)
}

async fn last_run(State(state): State<AppState>) -> Response {
    match state.status.last().await {
        Some(last) => Json(last).into_response(),
        None => (StatusCode::NOT_FOUND, "No run has finished yet").into_response(),
    }
}

async fn trigger_run(State(state): State<AppState>) -> Result<Response, AppError> {
    let trigger = TriggerEvent::new(HTTP_SOURCE);
    let accepted = TriggerAccepted {
        trigger_id: trigger.id,
        source: trigger.source.clone(),
    };

    match state.triggers.try_send(trigger) {
        Ok(()) => {
            info!("Manual run {} queued", accepted.trigger_id);
            Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
        }
        Err(TrySendError::Full(_)) => {
            Ok((StatusCode::CONFLICT, "A run is already queued").into_response())
        }
        Err(TrySendError::Closed(_)) => Err(AppError(Error::TriggerQueue)),
    }
}

struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Service unavailable: {}", self.0),
        )
            .into_response()
    }
}
