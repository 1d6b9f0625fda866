//! 徽章定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;

use super::enums::ExpiresDuration;

/// 对齐的教育目标或能力标准
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alignment {
    pub target_name: String,
    pub target_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BadgeClass {
    pub id: i64,
    pub entity_id: String,
    pub issuer_id: i64,
    pub issuer_entity_id: String,
    pub name: String,
    pub description: String,
    #[sqlx(default)]
    pub image: Option<String>,
    #[sqlx(default)]
    pub criteria_url: Option<String>,
    /// Markdown 格式的获得条件
    #[sqlx(default)]
    pub criteria_text: Option<String>,
    pub alignments: Json<Vec<Alignment>>,
    pub tags: Json<Vec<String>>,
    #[sqlx(default)]
    pub expires_amount: Option<i32>,
    #[sqlx(default)]
    pub expires_duration: Option<ExpiresDuration>,
    pub extensions: Value,
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

impl BadgeClass {
    /// 按有效期规则计算颁发时间对应的过期时间，未配置时返回 None
    pub fn expiration_for(&self, issued_on: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match (self.expires_amount, self.expires_duration) {
            (Some(amount), Some(duration)) if amount > 0 => duration.add_to(issued_on, amount),
            _ => None,
        }
    }
}

/// 新建徽章定义参数
#[derive(Debug, Clone)]
pub struct NewBadgeClass {
    pub entity_id: String,
    pub issuer_id: i64,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub criteria_url: Option<String>,
    pub criteria_text: Option<String>,
    pub alignments: Vec<Alignment>,
    pub tags: Vec<String>,
    pub expires_amount: Option<i32>,
    pub expires_duration: Option<ExpiresDuration>,
    pub extensions: Value,
    pub source_url: Option<String>,
    pub original_json: Option<Value>,
    pub created_by: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn badge_class(amount: Option<i32>, duration: Option<ExpiresDuration>) -> BadgeClass {
        let now = Utc::now();
        BadgeClass {
            id: 1,
            entity_id: "bc".into(),
            issuer_id: 1,
            issuer_entity_id: "iss".into(),
            name: "Badge".into(),
            description: "d".into(),
            image: None,
            criteria_url: None,
            criteria_text: None,
            alignments: Json(vec![]),
            tags: Json(vec![]),
            expires_amount: amount,
            expires_duration: duration,
            extensions: Value::Object(Default::default()),
            source_url: None,
            original_json: None,
            created_by: None,
            created_by_entity_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_expiration_rule() {
        let issued = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let bc = badge_class(Some(10), Some(ExpiresDuration::Days));
        assert_eq!(
            bc.expiration_for(issued),
            Some(Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap())
        );
        assert_eq!(badge_class(None, None).expiration_for(issued), None);
        assert_eq!(
            badge_class(Some(0), Some(ExpiresDuration::Years)).expiration_for(issued),
            None
        );
    }

    #[test]
    fn test_alignment_camel_case() {
        let alignment: Alignment = serde_json::from_value(serde_json::json!({
            "targetName": "Skill",
            "targetUrl": "https://example.org/skill",
            "targetCode": "S1"
        }))
        .unwrap();
        assert_eq!(alignment.target_code.as_deref(), Some("S1"));
        let back = serde_json::to_value(&alignment).unwrap();
        assert!(back.get("targetFramework").is_none());
    }
}
