//! API error type and its JSON body: `{"error": {"message", "status"}}`.

use crate::driver::DriverError;
use crate::executor::ExecError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use serra_core::SerraError;
use std::fmt;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn locked(message: impl Into<String>) -> Self {
        Self::new(StatusCode::LOCKED, message)
    }

    pub fn rate_limited() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<SerraError> for ApiError {
    fn from(err: SerraError) -> Self {
        let status = match &err {
            SerraError::NotFound { .. } => StatusCode::NOT_FOUND,
            SerraError::Validation(_) | SerraError::Format(_) => StatusCode::BAD_REQUEST,
            SerraError::Conflict(_)
            | SerraError::SceneInactive(_)
            | SerraError::NoSensorData(_) => StatusCode::CONFLICT,
            SerraError::KillSwitchActive => StatusCode::LOCKED,
            SerraError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<DriverError> for ApiError {
    fn from(err: DriverError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, err.to_string())
    }
}

impl From<ExecError> for ApiError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Core(e) => e.into(),
            ExecError::Driver(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serra_core::{SceneId, ZoneId};

    #[test]
    fn core_errors_map_to_statuses() {
        let cases = [
            (
                SerraError::NotFound {
                    kind: "zone",
                    id: 1,
                },
                StatusCode::NOT_FOUND,
            ),
            (SerraError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (SerraError::Conflict("x".into()), StatusCode::CONFLICT),
            (SerraError::KillSwitchActive, StatusCode::LOCKED),
            (SerraError::SceneInactive(SceneId(1)), StatusCode::CONFLICT),
            (SerraError::NoSensorData(ZoneId(1)), StatusCode::CONFLICT),
            (
                SerraError::Storage("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn rejected_switch_is_bad_gateway() {
        let err = ApiError::from(DriverError::Rejected("offline".into()));
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert!(err.message.contains("offline"));
    }
}
