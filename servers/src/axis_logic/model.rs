//! Request/response shapes of the HTTP surface and the mapping from engine
//! errors to status codes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use lib_axis::{ConsoleError, OperatingMode, ProviderError, StatusLabel};

#[derive(Debug, Default, Deserialize)]
pub struct ModeQuery {
    pub set: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModeResponse {
    pub mode: OperatingMode,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub id: String,
    pub status: StatusLabel,
}

#[derive(Debug, Default, Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}

impl IdQuery {
    pub fn require(self) -> Result<String, ApiError> {
        self.id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing id".to_string()))
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unavailable(String),
    Console(ConsoleError),
}

impl From<ConsoleError> for ApiError {
    fn from(err: ConsoleError) -> Self {
        ApiError::Console(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Console(err) => match err {
                ConsoleError::Mode(_) | ConsoleError::Overlay(_) => StatusCode::BAD_REQUEST,
                ConsoleError::ModeLocked { .. } => StatusCode::FORBIDDEN,
                ConsoleError::Provider(ProviderError::NotFound(_)) => StatusCode::NOT_FOUND,
                ConsoleError::Provider(ProviderError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
                ConsoleError::Provider(_) => StatusCode::BAD_GATEWAY,
                ConsoleError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::BadRequest(msg) | ApiError::Unavailable(msg) => msg.clone(),
            ApiError::Console(err) => err.to_string(),
        };
        if status.is_server_error() {
            tracing::error!("{} {}", status, message);
        } else {
            tracing::debug!("{} {}", status, message);
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
