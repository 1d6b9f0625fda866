//! 密码与客户端密钥处理
//!
//! 用户口令与 OAuth 客户端密钥都以 bcrypt 哈希保存

use bcrypt::{DEFAULT_COST, hash, verify};

use crate::error::ApiError;

/// 对明文进行 bcrypt 哈希
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    hash(password, DEFAULT_COST).map_err(|e| ApiError::Internal(format!("密码哈希失败: {}", e)))
}

/// 比较明文与存储的哈希值；哈希格式损坏视为不匹配
pub fn verify_password(password: &str, hashed: &str) -> bool {
    match verify(password, hashed) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::warn!(error = %e, "存储的密码哈希无法解析");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = "correct horse battery staple";
        let hashed = hash_password(password).unwrap();

        assert!(verify_password(password, &hashed));
        assert!(!verify_password("wrong_password", &hashed));
    }

    #[test]
    fn test_malformed_hash_does_not_match() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
