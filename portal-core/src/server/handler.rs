use super::types::{QueryRequest, QueryResponse};
use super::AppState;
use crate::provider::{Message, ProviderError};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

const NO_HISTORY_MESSAGE: &str = "No conversation history provided";

/// Errors returned to HTTP clients as `{ "error": ... }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// Server-side setup problem such as a missing API key.
    #[error("Configuration error: {0}. Please check server setup.")]
    Configuration(String),

    #[error("An internal server error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    /// Classifies a query failure by its root cause.
    fn from_query_error(err: anyhow::Error) -> Self {
        match err.downcast_ref::<ProviderError>() {
            Some(e) if matches!(e, ProviderError::MissingApiKey(_)) => ApiError::Configuration(e.to_string()),
            _ => ApiError::Internal(format!("{:#}", err)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Configuration(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `POST /api/query`: answers the last turn of the supplied history.
pub async fn query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let history = request.history.unwrap_or_default();
    if history.is_empty() {
        return Err(ApiError::BadRequest(NO_HISTORY_MESSAGE.to_string()));
    }

    let messages = history
        .iter()
        .map(|turn| {
            turn.to_message()
                .ok_or_else(|| ApiError::BadRequest(format!("Unsupported role '{}' in history", turn.role)))
        })
        .collect::<Result<Vec<Message>, _>>()?;

    info!(turns = messages.len(), "Received query");

    match state.chat.respond(messages).await {
        Ok(response) => Ok(Json(QueryResponse { response })),
        Err(err) => {
            error!(error = %format!("{:#}", err), "Query failed");
            Err(ApiError::from_query_error(err))
        }
    }
}
