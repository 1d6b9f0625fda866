//! OAuth 应用与访问令牌

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

/// 口令模式下未提供 client_id 时使用的公共应用
pub const PUBLIC_CLIENT_ID: &str = "public";

const TOKEN_LENGTH: usize = 30;

/// OAuth 客户端应用
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Application {
    pub id: i64,
    pub client_id: String,
    #[serde(skip_serializing)]
    #[sqlx(default)]
    pub client_secret_hash: Option<String>,
    pub name: String,
    /// 应用所属用户；客户端模式签发的令牌以此用户身份行事
    #[sqlx(default)]
    pub user_id: Option<i64>,
    pub allowed_scopes: String,
    pub created_at: DateTime<Utc>,
}

impl Application {
    pub fn scope_list(&self) -> Vec<&str> {
        split_scopes(&self.allowed_scopes)
    }

    /// 请求的全部 scope 是否都在允许范围内
    pub fn allows(&self, requested: &[&str]) -> bool {
        let allowed = self.scope_list();
        requested.iter().all(|s| allowed.contains(s))
    }
}

/// 访问令牌
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessToken {
    pub id: i64,
    pub token: String,
    #[sqlx(default)]
    pub user_id: Option<i64>,
    #[sqlx(default)]
    pub application_id: Option<i64>,
    pub scope: String,
    pub expires: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn scopes(&self) -> Vec<&str> {
        split_scopes(&self.scope)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    /// 对外展示的伪实体标识：`AccessTokenProxy.id=<pk>` 的 URL 安全 Base64，去掉尾部 `=`
    pub fn entity_id(&self) -> String {
        let encoded = URL_SAFE.encode(format!("AccessTokenProxy.id={}", self.id));
        encoded.trim_end_matches('=').to_string()
    }

    pub fn obscured_token(&self) -> String {
        let prefix: String = self.token.chars().take(4).collect();
        format!("{}***", prefix)
    }

    pub fn seconds_to_expiration(&self, now: DateTime<Utc>) -> i64 {
        let remaining = self.expires - now;
        (remaining.num_milliseconds() as f64 / 1000.0).round() as i64
    }
}

/// 新建令牌参数
#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub token: String,
    pub user_id: Option<i64>,
    pub application_id: Option<i64>,
    pub scope: String,
    pub expires: DateTime<Utc>,
}

/// 生成随机令牌串
pub fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// 按空白切分 scope 串
pub fn split_scopes(scopes: &str) -> Vec<&str> {
    scopes.split_whitespace().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn token(id: i64, value: &str) -> AccessToken {
        let now = Utc::now();
        AccessToken {
            id,
            token: value.to_string(),
            user_id: Some(1),
            application_id: None,
            scope: "rw:issuer  r:assertions\nrw:backpack".to_string(),
            expires: now + TimeDelta::seconds(100),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_entity_id_trims_padding() {
        assert_eq!(token(1, "abcdefgh").entity_id(), "QWNjZXNzVG9rZW5Qcm94eS5pZD0x");
        // 22 字节编码后带两个 '='
        assert_eq!(token(10, "abcdefgh").entity_id(), "QWNjZXNzVG9rZW5Qcm94eS5pZD0xMA");
    }

    #[test]
    fn test_obscured_token() {
        assert_eq!(token(1, "abcdefgh").obscured_token(), "abcd***");
        assert_eq!(token(1, "ab").obscured_token(), "ab***");
    }

    #[test]
    fn test_scopes_split_on_whitespace() {
        let t = token(1, "x");
        assert_eq!(t.scopes(), vec!["rw:issuer", "r:assertions", "rw:backpack"]);
    }

    #[test]
    fn test_expiration() {
        let t = token(1, "x");
        let now = t.created_at;
        assert!(!t.is_expired(now));
        assert!(t.is_expired(now + TimeDelta::seconds(100)));
        assert_eq!(t.seconds_to_expiration(now), 100);
    }

    #[test]
    fn test_generate_token() {
        let a = generate_token();
        assert_eq!(a.len(), TOKEN_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, generate_token());
    }

    #[test]
    fn test_application_allows() {
        let app = Application {
            id: 1,
            client_id: "c".into(),
            client_secret_hash: None,
            name: "n".into(),
            user_id: None,
            allowed_scopes: "rw:issuer r:assertions".into(),
            created_at: Utc::now(),
        };
        assert!(app.allows(&["rw:issuer"]));
        assert!(!app.allows(&["rw:issuer", "rw:backpack"]));
    }
}
