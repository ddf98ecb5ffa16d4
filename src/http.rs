//! REST fallback surface: read-only task listing plus a health check. The
//! write path lives entirely on the WebSocket event protocol; this exists
//! for clients (or monitoring) that want a plain request/response view.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{CoordinatorError, ErrorCode};
use crate::model::{Task, TaskId};
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    code: ErrorCode,
    message: String,
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = match self.code() {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ApiErrorBody {
            code: self.code(),
            message: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Task>>, CoordinatorError> {
    let tasks = state.service.get_all_tasks().await?;
    Ok(Json(tasks))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TaskId>,
) -> Result<Json<Task>, CoordinatorError> {
    match state.service.get_task(&id).await? {
        Some(task) => Ok(Json(task)),
        None => Err(CoordinatorError::NotFound(id)),
    }
}

pub async fn health() -> &'static str {
    "ok"
}
