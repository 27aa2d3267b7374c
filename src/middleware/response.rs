use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

/// Success envelope: `{"success": true, "code", "message", "data"}`
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub code: &'static str,
    pub message: String,
    pub data: T,
    pub status_code: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 OK with the generic success code
    pub fn success(data: T) -> Self {
        Self::with_message(data, "OK", "Success")
    }

    /// 200 OK with a specific machine code and human message
    pub fn with_message(data: T, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
            status_code: StatusCode::OK,
        }
    }

    pub fn created(data: T, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::CREATED,
            ..Self::with_message(data, code, message)
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "success": false,
                        "code": "INTERNAL_SERVER_ERROR",
                        "message": "Failed to serialize response data"
                    })),
                )
                    .into_response();
            }
        };

        let envelope = json!({
            "success": true,
            "code": self.code,
            "message": self.message,
            "data": data_value
        });

        (self.status_code, Json(envelope)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;
