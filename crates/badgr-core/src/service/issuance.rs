//! 徽章发放
//!
//! 负责徽章定义的解析、重复发放检查、实例构建与持久化。
//! 请求体的字段级校验在 HTTP 层完成，这里接收已校验的草稿。

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, instrument};

use badgr_shared::observability::metrics;

use crate::entity_id;
use crate::error::{CoreError, Result};
use crate::hashing::generate_salt;
use crate::models::{
    Acceptance, BadgeClass, BadgeInstance, EvidenceItem, Issuer, NewBadgeInstance, RecipientType,
};
use crate::openbadges::OpenBadgesUrls;
use crate::repository::Repositories;
use crate::text::{is_valid_email, is_valid_telephone, is_valid_url};

pub const DUPLICATE_AWARD: &str = "A previous award of this badge already exists for this recipient.";
pub const ISSUER_MISMATCH: &str = "Could not find matching badgeclass for this issuer.";

/// 按接收者类型校验标识格式
pub fn validate_recipient(
    identifier: &str,
    recipient_type: RecipientType,
) -> std::result::Result<(), &'static str> {
    let valid = match recipient_type {
        RecipientType::Email => is_valid_email(identifier),
        RecipientType::Url | RecipientType::Id => is_valid_url(identifier),
        RecipientType::Telephone => is_valid_telephone(identifier),
    };
    if valid {
        return Ok(());
    }
    Err(match recipient_type {
        RecipientType::Email => "Enter a valid email address.",
        RecipientType::Url | RecipientType::Id => "Enter a valid URL.",
        RecipientType::Telephone => "Enter a valid telephone number.",
    })
}

/// 请求中指定徽章定义的几种方式
#[derive(Debug, Clone)]
pub enum BadgeClassRef {
    EntityId(String),
    OpenBadgeId(String),
    /// 发行方内大小写不敏感的名称
    Name(String),
}

/// 已通过字段校验的发放草稿
#[derive(Debug, Clone)]
pub struct AssertionDraft {
    pub recipient_identifier: String,
    pub recipient_type: RecipientType,
    /// None 时按接收者类型取默认值
    pub hashed: Option<bool>,
    pub issued_on: Option<DateTime<Utc>>,
    /// None 时按徽章定义的有效期规则计算
    pub expires_at: Option<DateTime<Utc>>,
    pub narrative: Option<String>,
    pub evidence: Vec<EvidenceItem>,
    pub extensions: Value,
    pub create_notification: bool,
    pub allow_duplicate_awards: bool,
}

impl AssertionDraft {
    pub fn new(recipient_identifier: impl Into<String>, recipient_type: RecipientType) -> Self {
        Self {
            recipient_identifier: recipient_identifier.into(),
            recipient_type,
            hashed: None,
            issued_on: None,
            expires_at: None,
            narrative: None,
            evidence: vec![],
            extensions: Value::Object(Default::default()),
            create_notification: false,
            allow_duplicate_awards: true,
        }
    }
}

/// 更新时允许修改的字段，None 表示请求中未出现
#[derive(Debug, Clone, Default)]
pub struct AssertionChanges {
    pub evidence: Option<Vec<EvidenceItem>>,
    /// Some(None) 表示清空过期时间
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub extensions: Option<Value>,
    pub hashed: Option<bool>,
    pub issued_on: Option<DateTime<Utc>>,
    pub narrative: Option<Option<String>>,
    pub recipient_identifier: Option<String>,
    pub recipient_type: Option<RecipientType>,
}

impl AssertionChanges {
    pub fn apply(self, instance: &mut BadgeInstance) {
        if let Some(evidence) = self.evidence {
            instance.evidence.0 = evidence;
        }
        if let Some(expires_at) = self.expires_at {
            instance.expires_at = expires_at;
        }
        if let Some(extensions) = self.extensions {
            instance.extensions = extensions;
        }
        if let Some(hashed) = self.hashed {
            instance.hashed = hashed;
        }
        if let Some(issued_on) = self.issued_on {
            instance.issued_on = issued_on;
        }
        if let Some(narrative) = self.narrative {
            instance.narrative = narrative;
        }
        if let Some(identifier) = self.recipient_identifier {
            instance.recipient_identifier = identifier;
        }
        if let Some(recipient_type) = self.recipient_type {
            instance.recipient_type = recipient_type;
        }
        if instance.hashed && instance.salt.is_none() {
            instance.salt = Some(generate_salt());
        }
    }
}

pub struct IssuanceService {
    repos: Repositories,
    urls: OpenBadgesUrls,
}

impl IssuanceService {
    pub fn new(repos: Repositories, urls: OpenBadgesUrls) -> Self {
        Self { repos, urls }
    }

    /// 解析请求中的徽章定义；按名称查找时限定在 `issuer` 内
    #[instrument(skip(self, issuer))]
    pub async fn resolve_badge_class(
        &self,
        reference: BadgeClassRef,
        issuer: Option<&Issuer>,
    ) -> Result<BadgeClass> {
        match reference {
            BadgeClassRef::EntityId(id) => self
                .repos
                .badge_classes
                .get_by_entity_id(&id)
                .await?
                .ok_or_else(|| CoreError::field("badgeclass", format!("Invalid badgeclass {}", id))),
            BadgeClassRef::OpenBadgeId(url) => {
                let local_prefix = self.urls.badge_class("");
                let found = match url.strip_prefix(&local_prefix) {
                    Some(entity_id) => self.repos.badge_classes.get_by_entity_id(entity_id).await?,
                    None => self.repos.badge_classes.find_by_source_url(&url).await?,
                };
                found.ok_or_else(|| {
                    CoreError::field("badgeclassOpenBadgeId", format!("Invalid badgeclass {}", url))
                })
            }
            BadgeClassRef::Name(name) => {
                let mut matches = match issuer {
                    Some(issuer) => self.repos.badge_classes.find_by_name(issuer.id, &name).await?,
                    None => vec![],
                };
                match matches.len() {
                    1 => Ok(matches.remove(0)),
                    0 => Err(CoreError::validation(format!(
                        "No matching BadgeClass found with name {}",
                        name
                    ))),
                    n => Err(CoreError::validation(format!(
                        "Could not award; {} BadgeClasses with name {}",
                        n, name
                    ))),
                }
            }
        }
    }

    /// 草稿与徽章定义、发行方之间的一致性检查
    pub async fn check_award(
        &self,
        badge_class: &BadgeClass,
        expected_issuer: Option<&Issuer>,
        draft: &AssertionDraft,
    ) -> Result<()> {
        if !draft.allow_duplicate_awards
            && self
                .repos
                .assertions
                .has_current_award(badge_class.id, &draft.recipient_identifier, Utc::now())
                .await?
        {
            return Err(CoreError::validation(DUPLICATE_AWARD));
        }
        if expected_issuer.is_some_and(|issuer| issuer.id != badge_class.issuer_id) {
            return Err(CoreError::field("badgeclass", ISSUER_MISMATCH));
        }
        Ok(())
    }

    /// 由草稿构建待写入的实例：生成 entity_id 与盐值，补齐默认值
    pub fn prepare(
        badge_class: &BadgeClass,
        draft: AssertionDraft,
        created_by: Option<i64>,
        now: DateTime<Utc>,
    ) -> NewBadgeInstance {
        let issued_on = draft.issued_on.unwrap_or(now);
        let expires_at = draft
            .expires_at
            .or_else(|| badge_class.expiration_for(issued_on));
        let extensions = if draft.extensions.is_null() {
            Value::Object(Default::default())
        } else {
            draft.extensions
        };

        NewBadgeInstance {
            entity_id: entity_id::generate(),
            badgeclass_id: badge_class.id,
            issuer_id: badge_class.issuer_id,
            hashed: draft
                .hashed
                .unwrap_or_else(|| draft.recipient_type.hashed_by_default()),
            recipient_identifier: draft.recipient_identifier,
            recipient_type: draft.recipient_type,
            salt: Some(generate_salt()),
            issued_on,
            expires_at,
            narrative: draft.narrative,
            evidence: draft.evidence,
            extensions,
            acceptance: Acceptance::Accepted,
            image: badge_class.image.clone(),
            source_url: None,
            original_json: None,
            create_notification: draft.create_notification,
            created_by,
        }
    }

    /// 单个发放
    #[instrument(skip(self, badge_class, expected_issuer, draft), fields(badgeclass = %badge_class.entity_id))]
    pub async fn issue(
        &self,
        badge_class: &BadgeClass,
        expected_issuer: Option<&Issuer>,
        draft: AssertionDraft,
        created_by: Option<i64>,
    ) -> Result<BadgeInstance> {
        self.check_award(badge_class, expected_issuer, &draft).await?;
        let instance = self
            .repos
            .assertions
            .create(Self::prepare(badge_class, draft, created_by, Utc::now()))
            .await?;

        log_created(&instance);
        metrics::record_assertions_issued("single", 1);
        Ok(instance)
    }

    /// 批量发放，草稿须已逐条通过 `check_award`；写入是原子的
    #[instrument(skip(self, badge_class, drafts), fields(badgeclass = %badge_class.entity_id, count = drafts.len()))]
    pub async fn issue_batch(
        &self,
        badge_class: &BadgeClass,
        drafts: Vec<AssertionDraft>,
        created_by: Option<i64>,
    ) -> Result<Vec<BadgeInstance>> {
        let now = Utc::now();
        let prepared = drafts
            .into_iter()
            .map(|draft| Self::prepare(badge_class, draft, created_by, now))
            .collect();
        let instances = self.repos.assertions.create_many(prepared).await?;

        for instance in &instances {
            log_created(instance);
        }
        metrics::record_assertions_issued("batch", instances.len() as u64);
        Ok(instances)
    }

    /// 更新实例的可修改字段
    #[instrument(skip(self, instance, changes), fields(assertion = %instance.entity_id))]
    pub async fn update(
        &self,
        mut instance: BadgeInstance,
        changes: AssertionChanges,
    ) -> Result<BadgeInstance> {
        changes.apply(&mut instance);
        self.repos.assertions.update(&instance).await
    }
}

fn log_created(instance: &BadgeInstance) {
    info!(
        event = "BadgeInstanceCreated",
        assertion = %instance.entity_id,
        badgeclass = %instance.badgeclass_entity_id,
        issuer = %instance.issuer_entity_id,
        recipient_type = instance.recipient_type.as_str(),
        create_notification = instance.create_notification,
        "Badge instance created"
    );
    if instance.create_notification {
        // 不投递邮件，仅记录
        info!(assertion = %instance.entity_id, "Recipient notification requested");
    }
}
