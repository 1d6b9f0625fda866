//! 徽章实例（assertion）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;

use super::enums::{Acceptance, RecipientType};
use crate::error::{CoreError, Result};
use crate::hashing::generate_sha256_hashstring;

/// 证据条目，url 与 narrative 至少其一
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
}

impl EvidenceItem {
    pub fn is_empty(&self) -> bool {
        self.url.as_deref().is_none_or(str::is_empty)
            && self.narrative.as_deref().is_none_or(str::is_empty)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BadgeInstance {
    pub id: i64,
    pub entity_id: String,
    pub badgeclass_id: i64,
    pub badgeclass_entity_id: String,
    pub issuer_id: i64,
    pub issuer_entity_id: String,
    pub recipient_identifier: String,
    pub recipient_type: RecipientType,
    pub hashed: bool,
    #[sqlx(default)]
    pub salt: Option<String>,
    pub issued_on: DateTime<Utc>,
    #[sqlx(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub narrative: Option<String>,
    pub evidence: Json<Vec<EvidenceItem>>,
    pub extensions: Value,
    pub revoked: bool,
    #[sqlx(default)]
    pub revocation_reason: Option<String>,
    pub acceptance: Acceptance,
    #[sqlx(default)]
    pub image: Option<String>,
    #[sqlx(default)]
    pub source_url: Option<String>,
    #[sqlx(default)]
    pub original_json: Option<Value>,
    pub create_notification: bool,
    #[sqlx(default)]
    pub created_by: Option<i64>,
    #[sqlx(default)]
    pub created_by_entity_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BadgeInstance {
    /// 撤销实例，撤销不可逆且必须给出原因
    pub fn revoke(&mut self, reason: &str) -> Result<()> {
        if self.revoked {
            return Err(CoreError::AlreadyRevoked);
        }
        if reason.trim().is_empty() {
            return Err(CoreError::validation("revocation_reason is required"));
        }
        self.revoked = true;
        self.revocation_reason = Some(reason.to_string());
        // 撤销后不再保留烘焙图片
        self.image = None;
        Ok(())
    }

    pub fn accept(&mut self) {
        self.acceptance = Acceptance::Accepted;
    }

    pub fn reject(&mut self) {
        self.acceptance = Acceptance::Rejected;
    }

    pub fn pending(&self) -> bool {
        self.acceptance == Acceptance::Unaccepted
    }

    /// expires_at 非空且早于 now
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| e < now)
    }

    /// 未撤销且未过期
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired(now)
    }

    /// 对外的接收者身份：散列时为 `sha256$...`，否则为明文
    pub fn recipient_identity(&self) -> String {
        if self.hashed {
            generate_sha256_hashstring(
                &self.recipient_identifier.to_lowercase(),
                self.salt.as_deref(),
            )
        } else {
            self.recipient_identifier.clone()
        }
    }

    pub fn is_imported(&self) -> bool {
        self.source_url.is_some()
    }
}

/// 新建徽章实例参数
#[derive(Debug, Clone)]
pub struct NewBadgeInstance {
    pub entity_id: String,
    pub badgeclass_id: i64,
    pub issuer_id: i64,
    pub recipient_identifier: String,
    pub recipient_type: RecipientType,
    pub hashed: bool,
    pub salt: Option<String>,
    pub issued_on: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub narrative: Option<String>,
    pub evidence: Vec<EvidenceItem>,
    pub extensions: Value,
    pub acceptance: Acceptance,
    pub image: Option<String>,
    pub source_url: Option<String>,
    pub original_json: Option<Value>,
    pub create_notification: bool,
    pub created_by: Option<i64>,
}

/// 徽章实例列表的过滤条件
#[derive(Debug, Clone, Default)]
pub struct AssertionFilter {
    pub badgeclass_id: Option<i64>,
    pub issuer_id: Option<i64>,
    /// 非空时只返回接收者在列表中的实例
    pub recipients: Vec<String>,
    pub include_expired: bool,
    pub include_revoked: bool,
}

impl AssertionFilter {
    pub fn for_badgeclass(badgeclass_id: i64) -> Self {
        Self {
            badgeclass_id: Some(badgeclass_id),
            // 徽章定义下的列表不过滤过期实例
            include_expired: true,
            ..Default::default()
        }
    }

    pub fn for_issuer(issuer_id: i64) -> Self {
        Self {
            issuer_id: Some(issuer_id),
            ..Default::default()
        }
    }

    pub fn with_recipients(mut self, recipients: Vec<String>) -> Self {
        self.recipients = recipients;
        self
    }

    /// 内存实现与单元测试共用的判定逻辑，与 SQL 条件保持一致
    pub fn matches(&self, instance: &BadgeInstance, now: DateTime<Utc>) -> bool {
        if self.badgeclass_id.is_some_and(|id| id != instance.badgeclass_id) {
            return false;
        }
        if self.issuer_id.is_some_and(|id| id != instance.issuer_id) {
            return false;
        }
        if !self.recipients.is_empty()
            && !self
                .recipients
                .iter()
                .any(|r| r == &instance.recipient_identifier)
        {
            return false;
        }
        if !self.include_expired && instance.is_expired(now) {
            return false;
        }
        if !self.include_revoked && instance.revoked {
            return false;
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn instance(id: i64, recipient: &str) -> BadgeInstance {
        let now = Utc::now();
        BadgeInstance {
            id,
            entity_id: format!("assertion{:013}", id),
            badgeclass_id: 1,
            badgeclass_entity_id: "badgeclass000000000001".into(),
            issuer_id: 1,
            issuer_entity_id: "issuer0000000000000001".into(),
            recipient_identifier: recipient.to_string(),
            recipient_type: RecipientType::Email,
            hashed: true,
            salt: Some("salt".into()),
            issued_on: now,
            expires_at: None,
            narrative: None,
            evidence: Json(vec![]),
            extensions: Value::Object(Default::default()),
            revoked: false,
            revocation_reason: None,
            acceptance: Acceptance::Accepted,
            image: None,
            source_url: None,
            original_json: None,
            create_notification: false,
            created_by: None,
            created_by_entity_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::instance;
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_revoke_is_one_way() {
        let mut a = instance(1, "a@example.org");
        a.image = Some("img.png".into());
        assert!(matches!(a.revoke("  "), Err(CoreError::Validation(_))));
        assert!(!a.revoked);

        a.revoke("issued in error").unwrap();
        assert!(a.revoked);
        assert_eq!(a.revocation_reason.as_deref(), Some("issued in error"));
        assert!(a.image.is_none());
        assert!(matches!(a.revoke("again"), Err(CoreError::AlreadyRevoked)));
    }

    #[test]
    fn test_pending_and_acceptance() {
        let mut a = instance(1, "a@example.org");
        assert!(!a.pending());
        a.acceptance = Acceptance::Unaccepted;
        assert!(a.pending());
        a.accept();
        assert_eq!(a.acceptance, Acceptance::Accepted);
        a.reject();
        assert_eq!(a.acceptance, Acceptance::Rejected);
    }

    #[test]
    fn test_recipient_identity_hashing() {
        let mut a = instance(1, "Alice@Example.org");
        assert_eq!(
            a.recipient_identity(),
            generate_sha256_hashstring("alice@example.org", Some("salt"))
        );
        a.hashed = false;
        assert_eq!(a.recipient_identity(), "Alice@Example.org");
    }

    #[test]
    fn test_filter_defaults_exclude_expired_and_revoked() {
        let now = Utc::now();
        let current = instance(1, "a@example.org");
        let mut expired = instance(2, "a@example.org");
        expired.expires_at = Some(now - TimeDelta::days(1));
        let mut revoked = instance(3, "b@example.org");
        revoked.revoked = true;
        let mut future = instance(4, "b@example.org");
        future.expires_at = Some(now + TimeDelta::days(1));

        let filter = AssertionFilter::for_issuer(1);
        assert!(filter.matches(&current, now));
        assert!(!filter.matches(&expired, now));
        assert!(!filter.matches(&revoked, now));
        assert!(filter.matches(&future, now));

        let relaxed = AssertionFilter {
            include_expired: true,
            ..AssertionFilter::for_issuer(1)
        };
        assert!(relaxed.matches(&expired, now));
        assert!(!relaxed.matches(&revoked, now));

        let relaxed = AssertionFilter {
            include_revoked: true,
            ..AssertionFilter::for_issuer(1)
        };
        assert!(!relaxed.matches(&expired, now));
        assert!(relaxed.matches(&revoked, now));
    }

    #[test]
    fn test_filter_by_recipient() {
        let now = Utc::now();
        let filter =
            AssertionFilter::for_issuer(1).with_recipients(vec!["a@example.org".to_string()]);
        assert!(filter.matches(&instance(1, "a@example.org"), now));
        assert!(!filter.matches(&instance(2, "b@example.org"), now));
        assert!(!AssertionFilter::for_issuer(2).matches(&instance(3, "a@example.org"), now));
    }

    #[test]
    fn test_evidence_item_empty() {
        assert!(EvidenceItem::default().is_empty());
        assert!(EvidenceItem { url: Some(String::new()), narrative: None }.is_empty());
        assert!(!EvidenceItem { url: None, narrative: Some("did it".into()) }.is_empty());
    }
}
