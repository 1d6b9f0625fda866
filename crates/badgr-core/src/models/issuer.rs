//! 发行方与成员关系

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::StaffRole;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Issuer {
    pub id: i64,
    pub entity_id: String,
    pub name: String,
    #[sqlx(default)]
    pub description: Option<String>,
    pub email: String,
    pub url: String,
    #[sqlx(default)]
    pub image: Option<String>,
    /// 扩展字段，键为 `extensions:XxxExtension`
    pub extensions: Value,
    /// 从外部导入时的源地址
    #[sqlx(default)]
    pub source_url: Option<String>,
    #[sqlx(default)]
    pub original_json: Option<Value>,
    #[sqlx(default)]
    pub created_by: Option<i64>,
    #[sqlx(default)]
    pub created_by_entity_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新建发行方参数
#[derive(Debug, Clone)]
pub struct NewIssuer {
    pub entity_id: String,
    pub name: String,
    pub description: Option<String>,
    pub email: String,
    pub url: String,
    pub image: Option<String>,
    pub extensions: Value,
    pub source_url: Option<String>,
    pub original_json: Option<Value>,
    pub created_by: Option<i64>,
}

/// 发行方成员
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IssuerStaff {
    pub id: i64,
    pub issuer_id: i64,
    pub user_id: i64,
    pub user_entity_id: String,
    pub role: StaffRole,
    pub created_at: DateTime<Utc>,
}

impl Issuer {
    /// 本地创建的发行方没有 source_url
    pub fn is_local(&self) -> bool {
        self.source_url.is_none()
    }
}

/// 在成员列表中查找用户角色
pub fn role_of(staff: &[IssuerStaff], user_id: i64) -> Option<StaffRole> {
    staff.iter().find(|s| s.user_id == user_id).map(|s| s.role)
}
