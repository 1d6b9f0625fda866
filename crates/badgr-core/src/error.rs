//! 核心领域错误类型
//!
//! 区分字段校验错误、非字段校验错误、状态冲突与系统错误，
//! 上层 HTTP 服务据此决定状态码与 V2 错误信封的形状。

use std::collections::BTreeMap;

use badgr_shared::error::BadgrError;
use serde::Serialize;
use thiserror::Error;

/// 字段级校验错误：字段名 -> 错误消息列表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单字段单消息的便捷构造
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// 有错误时转为 Err，便于在校验末尾使用 `?`
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CoreError::FieldErrors(self))
        }
    }
}

/// 核心领域错误
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{entity} 不存在: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("字段校验失败: {0:?}")]
    FieldErrors(FieldErrors),

    /// 非字段校验错误，消息原样返回给调用方
    #[error("{0}")]
    Validation(String),

    #[error("Assertion is already revoked")]
    AlreadyRevoked,

    #[error("BadgeClass couldn't be deleted. It may have already been issued.")]
    BadgeClassAlreadyIssued,

    #[error("Issuer couldn't be deleted. It has already issued badges.")]
    IssuerHasAssertions,

    #[error("You already have this badge in your backpack")]
    DuplicateBadge,

    /// 外部徽章导入失败，可能包含多条消息
    #[error("徽章校验失败: {}", .0.join("; "))]
    BadgeCheck(Vec<String>),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("基础设施错误: {0}")]
    Infrastructure(#[from] BadgrError),

    #[error("内部错误: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::FieldErrors(FieldErrors::single(field, message))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// 是否为系统错误（需要隐藏细节并记录日志）
    pub fn is_system_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Serialization(_) | Self::Infrastructure(_) | Self::Internal(_)
        )
    }

    /// 唯一约束冲突（并发 get_or_create 时用于回退为查询）
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_accumulate() {
        let mut errors = FieldErrors::new();
        assert!(errors.is_empty());
        errors.add("name", "This field is required");
        errors.add("name", "too long");
        errors.add("email", "Enter a valid email address.");

        assert_eq!(errors.get("name").map(<[String]>::len), Some(2));
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["email"][0], "Enter a valid email address.");
        assert!(matches!(
            errors.into_result(),
            Err(CoreError::FieldErrors(_))
        ));
    }

    #[test]
    fn test_empty_field_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_state_conflict_messages() {
        assert_eq!(
            CoreError::AlreadyRevoked.to_string(),
            "Assertion is already revoked"
        );
        assert_eq!(
            CoreError::BadgeClassAlreadyIssued.to_string(),
            "BadgeClass couldn't be deleted. It may have already been issued."
        );
        assert!(!CoreError::DuplicateBadge.is_system_error());
    }

    #[test]
    fn test_system_errors() {
        assert!(CoreError::Database(sqlx::Error::PoolTimedOut).is_system_error());
        assert!(CoreError::Internal("x".into()).is_system_error());
        assert!(!CoreError::not_found("Issuer", "abc").is_system_error());
        assert!(!CoreError::Database(sqlx::Error::PoolTimedOut).is_unique_violation());
    }
}
