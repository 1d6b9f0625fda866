//! API 错误类型定义
//!
//! 所有错误都渲染为 V2 错误信封：
//! `{"status":{"success":false,"description":...},"fieldErrors":...,"validationErrors":[...]}`

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use badgr_core::{CoreError, FieldErrors};
use serde_json::{Value, json};

const INTERNAL_DESCRIPTION: &str = "Internal server error";

/// API 错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    /// 对象不存在或无权访问，两者不做区分
    #[error("Not found")]
    NotFound,

    #[error("bad request")]
    FieldErrors(FieldErrors),
    /// 批量请求中按条目顺序排列的字段错误
    #[error("bad request")]
    ItemFieldErrors(Vec<FieldErrors>),
    /// 非字段校验错误，原样放入 validationErrors
    #[error("bad request")]
    Validation(Vec<String>),
    #[error("You already have this badge in your backpack")]
    DuplicateBadge,
    #[error("{0}")]
    BadRequest(String),

    /// OAuth 令牌端点的错误，形如 `{"error": "invalid_grant"}`
    #[error("{error}")]
    OAuth {
        status: StatusCode,
        error: &'static str,
    },

    #[error("数据库错误: {0}")]
    Database(sqlx::Error),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::FieldErrors(FieldErrors::single(field, message))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }

    pub fn oauth(error: &'static str) -> Self {
        let status = if error == "invalid_client" {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::BAD_REQUEST
        };
        Self::OAuth { status, error }
    }

    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::FieldErrors(_)
            | Self::ItemFieldErrors(_)
            | Self::Validation(_)
            | Self::DuplicateBadge
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::OAuth { status, .. } => *status,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn envelope(description: &str, field_errors: Value, validation_errors: Value) -> Value {
        json!({
            "status": {
                "success": false,
                "description": description,
            },
            "fieldErrors": field_errors,
            "validationErrors": validation_errors,
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            Self::OAuth { error, .. } => json!({ "error": error }),
            Self::FieldErrors(errors) => Self::envelope("bad request", json!(errors), json!([])),
            Self::ItemFieldErrors(items) => Self::envelope("bad request", json!(items), json!([])),
            Self::Validation(messages) => Self::envelope("bad request", json!({}), json!(messages)),
            Self::DuplicateBadge => Self::envelope(
                "bad request",
                json!({}),
                json!([{ "name": "DUPLICATE_BADGE", "description": self.to_string() }]),
            ),
            // 系统级错误只返回通用提示，详细信息仅记录日志
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                Self::envelope(INTERNAL_DESCRIPTION, json!({}), json!([]))
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                Self::envelope(INTERNAL_DESCRIPTION, json!({}), json!([]))
            }
            other => Self::envelope(&other.to_string(), json!({}), json!([])),
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { .. } => Self::NotFound,
            CoreError::FieldErrors(errors) => Self::FieldErrors(errors),
            CoreError::Validation(message) => Self::Validation(vec![message]),
            CoreError::BadgeCheck(messages) => Self::Validation(messages),
            CoreError::DuplicateBadge => Self::DuplicateBadge,
            e @ (CoreError::AlreadyRevoked
            | CoreError::BadgeClassAlreadyIssued
            | CoreError::IssuerHasAssertions) => Self::Validation(vec![e.to_string()]),
            CoreError::Database(e) => Self::Database(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// validator 错误转为字段错误，字段名沿用请求体中的字段名
pub fn field_errors_from(errors: &validator::ValidationErrors) -> FieldErrors {
    let mut fields = FieldErrors::new();
    for (field, errs) in errors.field_errors() {
        for e in errs {
            let message = e
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| e.code.to_string());
            fields.add(&field, message);
        }
    }
    fields
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::FieldErrors(field_errors_from(&errors))
    }
}

/// 请求体无法解析为 JSON 时仍返回 V2 信封
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// API 层 Result 类型别名
pub type Result<T> = std::result::Result<T, ApiError>;
