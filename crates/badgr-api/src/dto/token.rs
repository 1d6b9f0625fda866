//! OAuth 令牌端点与发行方令牌 DTO

use serde::{Deserialize, Serialize};

/// `/o/token` 请求，表单与 JSON 两种编码共用
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub scope: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssuerTokensRequest {
    pub issuers: Option<Vec<String>>,
}
