use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pbi_core::PbiError;
use serde_json::json;
use tracing::{error, warn};

/// 处理器错误，统一输出 `{"success": false, "error": "..."}`
#[derive(Debug)]
pub struct ApiError(pub PbiError);

impl From<PbiError> for ApiError {
    fn from(error: PbiError) -> Self {
        Self(error)
    }
}

/// 请求体无法解析或缺少字段
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(PbiError::validation(rejection.body_text()))
    }
}

/// 查询参数缺失或取值无效
impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(PbiError::validation(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PbiError::Validation(_) => StatusCode::BAD_REQUEST,
            PbiError::Auth(_) => StatusCode::UNAUTHORIZED,
            PbiError::NotFound(_) => StatusCode::NOT_FOUND,
            PbiError::Conflict(_) => StatusCode::CONFLICT,
            PbiError::Api { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("请求处理失败: {}", self.0);
        } else {
            warn!("请求被拒绝 ({}): {}", status, self.0);
        }

        let body = json!({
            "success": false,
            "error": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PbiError::validation("x"), StatusCode::BAD_REQUEST),
            (PbiError::auth("x"), StatusCode::UNAUTHORIZED),
            (PbiError::not_found("x"), StatusCode::NOT_FOUND),
            (PbiError::conflict("x"), StatusCode::CONFLICT),
            (PbiError::api(500, "x"), StatusCode::BAD_GATEWAY),
            (PbiError::import("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError(error).status(), expected);
        }
    }
}
