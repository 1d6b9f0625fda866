//! 徽章实例请求与响应 DTO

use serde::{Deserialize, Serialize};
use serde_json::Value;

use badgr_core::FieldErrors;
use badgr_core::models::{Acceptance, BadgeInstance, EvidenceItem, RecipientType};
use badgr_core::openbadges::format_timestamp;
use badgr_core::service::issuance::validate_recipient;
use badgr_core::service::{AssertionChanges, AssertionDraft, BadgeClassRef};
use badgr_core::text::{is_truthy, is_valid_url};

use super::present;
use super::query::parse_datetime;

const REQUIRED: &str = "This field is required";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipientRequest {
    pub identity: Option<String>,
    pub hashed: Option<bool>,
    #[serde(rename = "type")]
    pub recipient_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvidenceRequest {
    pub url: Option<String>,
    pub narrative: Option<String>,
}

/// 发放与更新徽章实例的请求体
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionRequest {
    pub badgeclass: Option<String>,
    pub badgeclass_open_badge_id: Option<String>,
    pub badgeclass_name: Option<String>,
    pub recipient: Option<RecipientRequest>,
    pub issued_on: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub narrative: Option<Option<String>>,
    pub evidence: Option<Vec<EvidenceRequest>>,
    #[serde(default, deserialize_with = "present")]
    pub expires: Option<Option<String>>,
    /// 布尔值或 "1"/"true" 字符串
    pub notify: Option<Value>,
    pub allow_duplicate_awards: Option<bool>,
    pub extensions: Option<Value>,
    /// 批量发放时由外层统一写入
    #[serde(rename = "create_notification", alias = "createNotification")]
    pub create_notification: Option<bool>,
}

impl AssertionRequest {
    /// 请求中指定的徽章定义，优先级：entityId > openBadgeId > 名称
    pub fn badge_class_ref(&self) -> Option<BadgeClassRef> {
        let non_empty = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();
        non_empty(&self.badgeclass)
            .map(BadgeClassRef::EntityId)
            .or_else(|| non_empty(&self.badgeclass_open_badge_id).map(BadgeClassRef::OpenBadgeId))
            .or_else(|| non_empty(&self.badgeclass_name).map(BadgeClassRef::Name))
    }

    fn notify_requested(&self) -> bool {
        let notify = match &self.notify {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => is_truthy(Some(s)),
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            _ => false,
        };
        notify || self.create_notification.unwrap_or(false)
    }

    /// 创建时的字段校验，返回待发放草稿
    pub fn into_draft(self) -> Result<AssertionDraft, FieldErrors> {
        let mut errors = FieldErrors::new();

        let recipient = self.recipient.clone().unwrap_or_default();
        let recipient_type = parse_recipient_type(recipient.recipient_type.as_deref(), RecipientType::Email, &mut errors);
        let identity = recipient.identity.as_deref().map(str::trim).filter(|i| !i.is_empty());
        match identity {
            None => errors.add("recipient", REQUIRED),
            Some(identity) => {
                if let Err(message) = validate_recipient(identity, recipient_type) {
                    errors.add("recipient", message);
                }
            }
        }

        let mut draft = AssertionDraft::new(identity.unwrap_or_default(), recipient_type);
        draft.hashed = recipient.hashed;
        draft.create_notification = self.notify_requested();
        draft.allow_duplicate_awards = self.allow_duplicate_awards.unwrap_or(true);
        draft.issued_on = parse_optional_datetime("issuedOn", self.issued_on.as_deref(), &mut errors);
        draft.expires_at = match &self.expires {
            Some(Some(value)) => parse_optional_datetime("expires", Some(value), &mut errors),
            _ => None,
        };
        draft.narrative = self.narrative.flatten();
        draft.evidence = parse_evidence(self.evidence.unwrap_or_default(), &mut errors);
        if let Some(extensions) = self.extensions {
            if extensions.is_object() {
                draft.extensions = extensions;
            } else if !extensions.is_null() {
                errors.add("extensions", "Extensions must be an object");
            }
        }

        if errors.is_empty() {
            Ok(draft)
        } else {
            Err(errors)
        }
    }

    /// 更新时只处理请求中出现的可修改字段；徽章定义与发行方不可改
    pub fn into_changes(self, current_type: RecipientType) -> Result<AssertionChanges, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut changes = AssertionChanges::default();

        if let Some(recipient) = self.recipient {
            let recipient_type = parse_recipient_type(recipient.recipient_type.as_deref(), current_type, &mut errors);
            if let Some(identity) = recipient.identity.as_deref().map(str::trim) {
                match validate_recipient(identity, recipient_type) {
                    Ok(()) => changes.recipient_identifier = Some(identity.to_string()),
                    Err(message) => errors.add("recipient", message),
                }
            }
            if recipient.recipient_type.is_some() {
                changes.recipient_type = Some(recipient_type);
            }
            changes.hashed = recipient.hashed;
        }

        changes.issued_on = parse_optional_datetime("issuedOn", self.issued_on.as_deref(), &mut errors);
        if let Some(expires) = self.expires {
            changes.expires_at = Some(match expires {
                Some(value) => parse_optional_datetime("expires", Some(&value), &mut errors),
                None => None,
            });
        }
        changes.narrative = self.narrative;
        if let Some(evidence) = self.evidence {
            changes.evidence = Some(parse_evidence(evidence, &mut errors));
        }
        match self.extensions {
            Some(extensions) if extensions.is_object() => changes.extensions = Some(extensions),
            Some(Value::Null) | None => {}
            Some(_) => errors.add("extensions", "Extensions must be an object"),
        }

        if errors.is_empty() {
            Ok(changes)
        } else {
            Err(errors)
        }
    }
}

fn parse_recipient_type(value: Option<&str>, default: RecipientType, errors: &mut FieldErrors) -> RecipientType {
    match value {
        None => default,
        Some(value) => RecipientType::parse(value).unwrap_or_else(|| {
            errors.add("recipient", format!("\"{}\" is not a valid choice.", value));
            default
        }),
    }
}

fn parse_optional_datetime(
    field: &str,
    value: Option<&str>,
    errors: &mut FieldErrors,
) -> Option<chrono::DateTime<chrono::Utc>> {
    let value = value.filter(|v| !v.trim().is_empty())?;
    match parse_datetime(value) {
        Ok(dt) => Some(dt),
        Err(message) => {
            errors.add(field, message);
            None
        }
    }
}

fn parse_evidence(items: Vec<EvidenceRequest>, errors: &mut FieldErrors) -> Vec<EvidenceItem> {
    let mut evidence = Vec::with_capacity(items.len());
    for item in items {
        let item = EvidenceItem {
            url: item.url.filter(|u| !u.is_empty()),
            narrative: item.narrative.filter(|n| !n.is_empty()),
        };
        if item.is_empty() {
            errors.add("evidence", "Either url or narrative is required");
        } else if item.url.as_deref().is_some_and(|u| !is_valid_url(u) || u.len() > 1024) {
            errors.add("evidence", "Enter a valid URL.");
        } else {
            evidence.push(item);
        }
    }
    evidence
}

/// 批量发放请求体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchIssueRequest {
    pub assertions: Option<Vec<Value>>,
    #[serde(default)]
    pub create_notification: bool,
}

/// 批量撤销的单条结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeResult {
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RevokeResult {
    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientDto {
    pub identity: String,
    pub hashed: bool,
    #[serde(rename = "type")]
    pub recipient_type: RecipientType,
    pub plaintext_identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionDto {
    pub entity_type: &'static str,
    pub entity_id: String,
    pub open_badge_id: String,
    pub created_at: String,
    pub created_by: Option<String>,
    /// entityId，展开时为徽章定义文档
    pub badgeclass: Value,
    pub badgeclass_open_badge_id: String,
    pub issuer: String,
    pub issuer_open_badge_id: String,
    pub image: Option<String>,
    pub recipient: RecipientDto,
    pub issued_on: String,
    pub narrative: Option<String>,
    pub evidence: Vec<EvidenceItem>,
    pub revoked: bool,
    pub revocation_reason: Option<String>,
    pub acceptance: Acceptance,
    pub expires: Option<String>,
    pub extensions: Value,
    /// 仅背包表示包含
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<bool>,
}

impl AssertionDto {
    pub fn new(
        instance: BadgeInstance,
        open_badge_id: String,
        badgeclass_open_badge_id: String,
        issuer_open_badge_id: String,
    ) -> Self {
        let recipient = RecipientDto {
            identity: instance.recipient_identity(),
            hashed: instance.hashed,
            recipient_type: instance.recipient_type,
            plaintext_identity: instance.recipient_identifier.clone(),
            salt: if instance.hashed { instance.salt.clone() } else { None },
        };
        Self {
            entity_type: "Assertion",
            open_badge_id,
            badgeclass_open_badge_id,
            issuer_open_badge_id,
            created_at: format_timestamp(&instance.created_at),
            issued_on: format_timestamp(&instance.issued_on),
            expires: instance.expires_at.as_ref().map(format_timestamp),
            recipient,
            entity_id: instance.entity_id,
            created_by: instance.created_by_entity_id,
            badgeclass: Value::String(instance.badgeclass_entity_id),
            issuer: instance.issuer_entity_id,
            image: instance.image,
            narrative: instance.narrative,
            evidence: instance.evidence.0,
            revoked: instance.revoked,
            revocation_reason: instance.revocation_reason,
            acceptance: instance.acceptance,
            extensions: instance.extensions,
            pending: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn request(body: Value) -> AssertionRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_recipient_required() {
        let errors = request(json!({"badgeclass": "abc"})).into_draft().unwrap_err();
        assert_eq!(errors.get("recipient"), Some(&[REQUIRED.to_string()][..]));
    }

    #[test]
    fn test_recipient_validated_per_type() {
        let errors = request(json!({"recipient": {"identity": "nope", "type": "url"}}))
            .into_draft()
            .unwrap_err();
        assert_eq!(errors.get("recipient"), Some(&["Enter a valid URL.".to_string()][..]));

        let errors = request(json!({"recipient": {"identity": "a@example.org", "type": "fax"}}))
            .into_draft()
            .unwrap_err();
        assert_eq!(
            errors.get("recipient"),
            Some(&["\"fax\" is not a valid choice.".to_string()][..])
        );
    }

    #[test]
    fn test_draft_fields() {
        let draft = request(json!({
            "recipient": {"identity": "a@example.org"},
            "issuedOn": "2024-01-02T03:04:05Z",
            "expires": null,
            "narrative": "Did it",
            "evidence": [{"url": "https://example.org/e"}],
            "notify": "true",
            "allowDuplicateAwards": false
        }))
        .into_draft()
        .unwrap();
        assert_eq!(draft.recipient_type, RecipientType::Email);
        assert_eq!(draft.hashed, None);
        assert_eq!(draft.issued_on, Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()));
        assert_eq!(draft.expires_at, None);
        assert_eq!(draft.narrative.as_deref(), Some("Did it"));
        assert_eq!(draft.evidence.len(), 1);
        assert!(draft.create_notification);
        assert!(!draft.allow_duplicate_awards);
    }

    #[test]
    fn test_evidence_requires_url_or_narrative() {
        let errors = request(json!({
            "recipient": {"identity": "a@example.org"},
            "evidence": [{}]
        }))
        .into_draft()
        .unwrap_err();
        assert_eq!(
            errors.get("evidence"),
            Some(&["Either url or narrative is required".to_string()][..])
        );
    }

    #[test]
    fn test_badge_class_ref_priority() {
        let req = request(json!({
            "badgeclassOpenBadgeId": "https://x/public/badges/b",
            "badgeclassName": "Gold"
        }));
        assert!(matches!(req.badge_class_ref(), Some(BadgeClassRef::OpenBadgeId(_))));
        assert!(request(json!({})).badge_class_ref().is_none());
    }

    #[test]
    fn test_changes_only_present_fields() {
        let changes = request(json!({"expires": null, "narrative": "updated"}))
            .into_changes(RecipientType::Email)
            .unwrap();
        assert_eq!(changes.expires_at, Some(None));
        assert_eq!(changes.narrative, Some(Some("updated".to_string())));
        assert!(changes.evidence.is_none());
        assert!(changes.recipient_identifier.is_none());

        let errors = request(json!({"issuedOn": "yesterday"}))
            .into_changes(RecipientType::Email)
            .unwrap_err();
        assert!(errors.get("issuedOn").is_some());
    }
}
