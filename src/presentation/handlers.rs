// HTTP request handlers
use crate::application::session_engine::{ExportSummary, LogInfo, SessionView};
use crate::domain::command::{CommandRequest, CommandResult};
use crate::domain::connection::ConnectionTarget;
use crate::domain::error::SessionError;
use crate::presentation::app_state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectBody {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: f64,
}

fn default_refresh_interval() -> f64 {
    1.0
}

#[derive(Deserialize, Default)]
pub struct PathBody {
    pub path: Option<PathBuf>,
}

pub struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn status_for(err: &SessionError) -> StatusCode {
    match err {
        SessionError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::Precondition(_) | SessionError::EmptyHistory => StatusCode::CONFLICT,
        SessionError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Current session view
pub async fn session_view(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.engine.view().as_ref().clone())
}

pub async fn connect(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConnectBody>,
) -> Result<Json<SessionView>, ApiError> {
    // Field checks happen in the engine so a bad target is logged as an event
    let target = ConnectionTarget {
        host: body.host.trim().to_string(),
        port: body.port,
        refresh_interval_seconds: body.refresh_interval_seconds,
    };
    state.engine.connect(target).await?;
    Ok(Json(state.engine.view().as_ref().clone()))
}

pub async fn disconnect(State(state): State<Arc<AppState>>) -> Result<Json<SessionView>, ApiError> {
    state.engine.disconnect().await?;
    Ok(Json(state.engine.view().as_ref().clone()))
}

pub async fn send_command(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandResult>, ApiError> {
    let result = state.engine.send_command(request).await?;
    Ok(Json(result))
}

pub async fn start_logging(
    State(state): State<Arc<AppState>>,
    body: Option<Json<PathBody>>,
) -> Result<Json<LogInfo>, ApiError> {
    let path = body.and_then(|Json(b)| b.path);
    Ok(Json(state.engine.start_logging(path).await?))
}

pub async fn stop_logging(State(state): State<Arc<AppState>>) -> Result<Json<Option<LogInfo>>, ApiError> {
    Ok(Json(state.engine.stop_logging().await?))
}

pub async fn export_session(
    State(state): State<Arc<AppState>>,
    body: Option<Json<PathBody>>,
) -> Result<Json<ExportSummary>, ApiError> {
    let path = body.and_then(|Json(b)| b.path);
    Ok(Json(state.engine.export_session(path).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ValidationError;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(&SessionError::Validation(ValidationError::InvalidPort)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&SessionError::Precondition("not connected".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(status_for(&SessionError::EmptyHistory), StatusCode::CONFLICT);
    }
}
