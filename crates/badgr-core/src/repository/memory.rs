//! 基于 DashMap 的内存仓储
//!
//! 与 PostgreSQL 实现保持相同的可见性与过滤语义，供路由测试和本地演示使用。

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::types::Json;

use super::{
    AssertionRepositoryTrait, BadgeClassRepositoryTrait, CollectionRepositoryTrait,
    IssuerRepositoryTrait, OAuthRepositoryTrait, PageRequest, UserRepositoryTrait,
};
use crate::entity_id;
use crate::error::{CoreError, Result};
use crate::models::{
    AccessToken, Acceptance, Application, AssertionFilter, BackpackCollection, BadgeClass,
    BadgeInstance, IdentifierType, Issuer, IssuerStaff, NewAccessToken, NewBadgeClass,
    NewBadgeInstance, NewCollection, NewIssuer, StaffRole, User, UserAccount, UserIdentifier,
};

#[derive(Default)]
pub struct MemoryStore {
    seq: AtomicI64,
    /// get_or_create 与唯一性检查的串行化
    write_lock: Mutex<()>,
    users: DashMap<i64, User>,
    identifiers: DashMap<i64, UserIdentifier>,
    applications: DashMap<i64, Application>,
    tokens: DashMap<i64, AccessToken>,
    issuers: DashMap<i64, Issuer>,
    staff: DashMap<i64, IssuerStaff>,
    badge_classes: DashMap<i64, BadgeClass>,
    instances: DashMap<i64, BadgeInstance>,
    collections: DashMap<i64, BackpackCollection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| CoreError::Internal("memory store lock poisoned".to_string()))
    }

    fn user_entity_id(&self, user_id: Option<i64>) -> Option<String> {
        user_id.and_then(|id| self.users.get(&id).map(|u| u.entity_id.clone()))
    }

    fn issuer_entity_id(&self, issuer_id: i64) -> Result<String> {
        self.issuers
            .get(&issuer_id)
            .map(|i| i.entity_id.clone())
            .ok_or_else(|| CoreError::not_found("Issuer", issuer_id.to_string()))
    }

    fn badge_class_entity_id(&self, badgeclass_id: i64) -> Result<String> {
        self.badge_classes
            .get(&badgeclass_id)
            .map(|b| b.entity_id.clone())
            .ok_or_else(|| CoreError::not_found("BadgeClass", badgeclass_id.to_string()))
    }

    fn is_staff(&self, issuer_id: i64, user_id: i64) -> bool {
        self.staff
            .iter()
            .any(|s| s.issuer_id == issuer_id && s.user_id == user_id)
    }

    /// 接收者是否由某个授权给 `app_user_id` 所属应用的背包令牌持有者认领
    fn recipient_shared_with(&self, recipient: &str, app_user_id: i64) -> bool {
        let owners: Vec<i64> = self
            .identifiers
            .iter()
            .filter(|i| i.verified && i.identifier.eq_ignore_ascii_case(recipient))
            .map(|i| i.user_id)
            .collect();

        self.tokens.iter().any(|t| {
            let Some(owner) = t.user_id else { return false };
            if !owners.contains(&owner) {
                return false;
            }
            let app_matches = t
                .application_id
                .and_then(|app_id| self.applications.get(&app_id).and_then(|a| a.user_id))
                == Some(app_user_id);
            app_matches
                && t
                    .scopes()
                    .iter()
                    .any(|s| *s == "r:backpack" || *s == "rw:backpack")
        })
    }

    fn insert_token(&self, token: NewAccessToken) -> AccessToken {
        let now = Utc::now();
        let created = AccessToken {
            id: self.next_id(),
            token: token.token,
            user_id: token.user_id,
            application_id: token.application_id,
            scope: token.scope,
            expires: token.expires,
            created_at: now,
            updated_at: now,
        };
        self.tokens.insert(created.id, created.clone());
        created
    }

    fn build_instance(&self, id: i64, new: &NewBadgeInstance, now: DateTime<Utc>) -> Result<BadgeInstance> {
        Ok(BadgeInstance {
            id,
            entity_id: new.entity_id.clone(),
            badgeclass_id: new.badgeclass_id,
            badgeclass_entity_id: self.badge_class_entity_id(new.badgeclass_id)?,
            issuer_id: new.issuer_id,
            issuer_entity_id: self.issuer_entity_id(new.issuer_id)?,
            recipient_identifier: new.recipient_identifier.clone(),
            recipient_type: new.recipient_type,
            hashed: new.hashed,
            salt: new.salt.clone(),
            issued_on: new.issued_on,
            expires_at: new.expires_at,
            narrative: new.narrative.clone(),
            evidence: Json(new.evidence.clone()),
            extensions: new.extensions.clone(),
            revoked: false,
            revocation_reason: None,
            acceptance: new.acceptance,
            image: new.image.clone(),
            source_url: new.source_url.clone(),
            original_json: new.original_json.clone(),
            create_notification: new.create_notification,
            created_by: new.created_by,
            created_by_entity_id: self.user_entity_id(new.created_by),
            created_at: now,
            updated_at: now,
        })
    }

    fn check_unique_source_url<'a, I>(mut existing: I, source_url: &Option<String>) -> Result<()>
    where
        I: Iterator<Item = Option<String>> + 'a,
    {
        if let Some(url) = source_url {
            if existing.any(|s| s.as_deref() == Some(url.as_str())) {
                return Err(CoreError::Internal(format!(
                    "duplicate source_url: {}",
                    url
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepositoryTrait for MemoryStore {
    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn get_user_by_entity_id(&self, entity_id: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.entity_id == entity_id)
            .map(|u| u.clone()))
    }

    async fn get_account(&self, user_id: i64) -> Result<Option<UserAccount>> {
        let Some(user) = self.users.get(&user_id).map(|u| u.clone()) else {
            return Ok(None);
        };
        let mut identifiers: Vec<UserIdentifier> = self
            .identifiers
            .iter()
            .filter(|i| i.user_id == user_id)
            .map(|i| i.clone())
            .collect();
        identifiers.sort_by_key(|i| i.id);
        Ok(Some(UserAccount::new(user, identifiers)))
    }

    async fn find_account_by_identifier(
        &self,
        identifier: &str,
        identifier_type: IdentifierType,
    ) -> Result<Option<UserAccount>> {
        let user_id = self
            .identifiers
            .iter()
            .find(|i| {
                i.verified
                    && i.identifier_type == identifier_type
                    && i.identifier.eq_ignore_ascii_case(identifier)
            })
            .map(|i| i.user_id);

        match user_id {
            Some(id) => self.get_account(id).await,
            None => Ok(None),
        }
    }

    async fn create_user<'a>(
        &self,
        first_name: &str,
        last_name: &str,
        password_hash: Option<&'a str>,
    ) -> Result<User> {
        let now = Utc::now();
        let user = User {
            id: self.next_id(),
            entity_id: entity_id::generate(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            password_hash: password_hash.map(str::to_string),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn add_identifier(
        &self,
        user_id: i64,
        identifier: &str,
        identifier_type: IdentifierType,
        verified: bool,
    ) -> Result<()> {
        let _guard = self.lock()?;
        if self.identifiers.iter().any(|i| {
            i.identifier_type == identifier_type && i.identifier.eq_ignore_ascii_case(identifier)
        }) {
            return Err(CoreError::Internal(format!(
                "duplicate identifier: {}",
                identifier
            )));
        }
        let id = self.next_id();
        self.identifiers.insert(
            id,
            UserIdentifier {
                id,
                user_id,
                identifier: identifier.to_string(),
                identifier_type,
                verified,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl OAuthRepositoryTrait for MemoryStore {
    async fn get_application(&self, id: i64) -> Result<Option<Application>> {
        Ok(self.applications.get(&id).map(|a| a.clone()))
    }

    async fn get_application_by_client_id(&self, client_id: &str) -> Result<Option<Application>> {
        Ok(self
            .applications
            .iter()
            .find(|a| a.client_id == client_id)
            .map(|a| a.clone()))
    }

    async fn create_application<'a>(
        &self,
        client_id: &str,
        client_secret_hash: Option<&'a str>,
        name: &str,
        user_id: Option<i64>,
        allowed_scopes: &str,
    ) -> Result<Application> {
        let app = Application {
            id: self.next_id(),
            client_id: client_id.to_string(),
            client_secret_hash: client_secret_hash.map(str::to_string),
            name: name.to_string(),
            user_id,
            allowed_scopes: allowed_scopes.to_string(),
            created_at: Utc::now(),
        };
        self.applications.insert(app.id, app.clone());
        Ok(app)
    }

    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>> {
        Ok(self
            .tokens
            .iter()
            .find(|t| t.token == token)
            .map(|t| t.clone()))
    }

    async fn create_token(&self, token: NewAccessToken) -> Result<AccessToken> {
        Ok(self.insert_token(token))
    }

    async fn get_or_create_token(&self, defaults: NewAccessToken) -> Result<(AccessToken, bool)> {
        let _guard = self.lock()?;
        let existing = self
            .tokens
            .iter()
            .filter(|t| {
                t.user_id == defaults.user_id
                    && t.application_id == defaults.application_id
                    && t.scope == defaults.scope
            })
            .min_by_key(|t| t.id)
            .map(|t| t.clone());
        if let Some(token) = existing {
            return Ok((token, false));
        }
        Ok((self.insert_token(defaults), true))
    }
}

#[async_trait]
impl IssuerRepositoryTrait for MemoryStore {
    async fn get(&self, id: i64) -> Result<Option<Issuer>> {
        Ok(self.issuers.get(&id).map(|i| i.clone()))
    }

    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<Issuer>> {
        Ok(self
            .issuers
            .iter()
            .find(|i| i.entity_id == entity_id)
            .map(|i| i.clone()))
    }

    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<Issuer>> {
        Ok(self
            .issuers
            .iter()
            .find(|i| i.source_url.as_deref() == Some(source_url))
            .map(|i| i.clone()))
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Issuer>> {
        let mut issuers: Vec<Issuer> = self
            .issuers
            .iter()
            .filter(|i| self.is_staff(i.id, user_id))
            .map(|i| i.clone())
            .collect();
        issuers.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(issuers)
    }

    async fn create(&self, issuer: NewIssuer, owner_id: Option<i64>) -> Result<Issuer> {
        let _guard = self.lock()?;
        Self::check_unique_source_url(
            self.issuers.iter().map(|i| i.source_url.clone()),
            &issuer.source_url,
        )?;

        let now = Utc::now();
        let created = Issuer {
            id: self.next_id(),
            entity_id: issuer.entity_id,
            name: issuer.name,
            description: issuer.description,
            email: issuer.email,
            url: issuer.url,
            image: issuer.image,
            extensions: issuer.extensions,
            source_url: issuer.source_url,
            original_json: issuer.original_json,
            created_by: issuer.created_by,
            created_by_entity_id: self.user_entity_id(issuer.created_by),
            created_at: now,
            updated_at: now,
        };
        self.issuers.insert(created.id, created.clone());

        if let Some(owner_id) = owner_id {
            let staff_id = self.next_id();
            self.staff.insert(
                staff_id,
                IssuerStaff {
                    id: staff_id,
                    issuer_id: created.id,
                    user_id: owner_id,
                    user_entity_id: self.user_entity_id(Some(owner_id)).unwrap_or_default(),
                    role: StaffRole::Owner,
                    created_at: now,
                },
            );
        }
        Ok(created)
    }

    async fn update(&self, issuer: &Issuer) -> Result<Issuer> {
        let mut stored = self
            .issuers
            .get_mut(&issuer.id)
            .ok_or_else(|| CoreError::not_found("Issuer", issuer.entity_id.clone()))?;
        stored.name = issuer.name.clone();
        stored.description = issuer.description.clone();
        stored.email = issuer.email.clone();
        stored.url = issuer.url.clone();
        stored.image = issuer.image.clone();
        stored.extensions = issuer.extensions.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.issuers.remove(&id);
        self.staff.retain(|_, s| s.issuer_id != id);
        let class_ids: Vec<i64> = self
            .badge_classes
            .iter()
            .filter(|b| b.issuer_id == id)
            .map(|b| b.id)
            .collect();
        for class_id in class_ids {
            self.badge_classes.remove(&class_id);
        }
        Ok(())
    }

    async fn list_staff(&self, issuer_id: i64) -> Result<Vec<IssuerStaff>> {
        let mut staff: Vec<IssuerStaff> = self
            .staff
            .iter()
            .filter(|s| s.issuer_id == issuer_id)
            .map(|s| s.clone())
            .collect();
        staff.sort_by_key(|s| s.id);
        Ok(staff)
    }

    async fn get_or_create_staff(
        &self,
        issuer_id: i64,
        user_id: i64,
        role: StaffRole,
    ) -> Result<(IssuerStaff, bool)> {
        let _guard = self.lock()?;
        let existing = self
            .staff
            .iter()
            .find(|s| s.issuer_id == issuer_id && s.user_id == user_id)
            .map(|s| s.clone());
        if let Some(staff) = existing {
            return Ok((staff, false));
        }
        let id = self.next_id();
        let staff = IssuerStaff {
            id,
            issuer_id,
            user_id,
            user_entity_id: self.user_entity_id(Some(user_id)).unwrap_or_default(),
            role,
            created_at: Utc::now(),
        };
        self.staff.insert(id, staff.clone());
        Ok((staff, true))
    }
}

#[async_trait]
impl BadgeClassRepositoryTrait for MemoryStore {
    async fn get(&self, id: i64) -> Result<Option<BadgeClass>> {
        Ok(self.badge_classes.get(&id).map(|b| b.clone()))
    }

    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<BadgeClass>> {
        Ok(self
            .badge_classes
            .iter()
            .find(|b| b.entity_id == entity_id)
            .map(|b| b.clone()))
    }

    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<BadgeClass>> {
        Ok(self
            .badge_classes
            .iter()
            .find(|b| b.source_url.as_deref() == Some(source_url))
            .map(|b| b.clone()))
    }

    async fn find_by_name(&self, issuer_id: i64, name: &str) -> Result<Vec<BadgeClass>> {
        let mut matches: Vec<BadgeClass> = self
            .badge_classes
            .iter()
            .filter(|b| b.issuer_id == issuer_id && b.name.to_lowercase() == name.to_lowercase())
            .map(|b| b.clone())
            .collect();
        matches.sort_by_key(|b| b.id);
        Ok(matches)
    }

    async fn list_for_issuer(&self, issuer_id: i64) -> Result<Vec<BadgeClass>> {
        let mut classes: Vec<BadgeClass> = self
            .badge_classes
            .iter()
            .filter(|b| b.issuer_id == issuer_id)
            .map(|b| b.clone())
            .collect();
        classes.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(classes)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<BadgeClass>> {
        let mut classes: Vec<BadgeClass> = self
            .badge_classes
            .iter()
            .filter(|b| self.is_staff(b.issuer_id, user_id))
            .map(|b| b.clone())
            .collect();
        classes.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(classes)
    }

    async fn create(&self, badge_class: NewBadgeClass) -> Result<BadgeClass> {
        let _guard = self.lock()?;
        Self::check_unique_source_url(
            self.badge_classes.iter().map(|b| b.source_url.clone()),
            &badge_class.source_url,
        )?;

        let now = Utc::now();
        let created = BadgeClass {
            id: self.next_id(),
            entity_id: badge_class.entity_id,
            issuer_id: badge_class.issuer_id,
            issuer_entity_id: self.issuer_entity_id(badge_class.issuer_id)?,
            name: badge_class.name,
            description: badge_class.description,
            image: badge_class.image,
            criteria_url: badge_class.criteria_url,
            criteria_text: badge_class.criteria_text,
            alignments: Json(badge_class.alignments),
            tags: Json(badge_class.tags),
            expires_amount: badge_class.expires_amount,
            expires_duration: badge_class.expires_duration,
            extensions: badge_class.extensions,
            source_url: badge_class.source_url,
            original_json: badge_class.original_json,
            created_by: badge_class.created_by,
            created_by_entity_id: self.user_entity_id(badge_class.created_by),
            created_at: now,
            updated_at: now,
        };
        self.badge_classes.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, badge_class: &BadgeClass) -> Result<BadgeClass> {
        let mut stored = self
            .badge_classes
            .get_mut(&badge_class.id)
            .ok_or_else(|| CoreError::not_found("BadgeClass", badge_class.entity_id.clone()))?;
        stored.name = badge_class.name.clone();
        stored.description = badge_class.description.clone();
        stored.image = badge_class.image.clone();
        stored.criteria_url = badge_class.criteria_url.clone();
        stored.criteria_text = badge_class.criteria_text.clone();
        stored.alignments = badge_class.alignments.clone();
        stored.tags = badge_class.tags.clone();
        stored.expires_amount = badge_class.expires_amount;
        stored.expires_duration = badge_class.expires_duration;
        stored.extensions = badge_class.extensions.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        if self.instances.iter().any(|i| i.badgeclass_id == id) {
            return Err(CoreError::BadgeClassAlreadyIssued);
        }
        self.badge_classes.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl AssertionRepositoryTrait for MemoryStore {
    async fn get(&self, id: i64) -> Result<Option<BadgeInstance>> {
        Ok(self.instances.get(&id).map(|i| i.clone()))
    }

    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<BadgeInstance>> {
        Ok(self
            .instances
            .iter()
            .find(|i| i.entity_id == entity_id)
            .map(|i| i.clone()))
    }

    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<BadgeInstance>> {
        Ok(self
            .instances
            .iter()
            .find(|i| i.source_url.as_deref() == Some(source_url))
            .map(|i| i.clone()))
    }

    async fn list(
        &self,
        filter: &AssertionFilter,
        now: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Vec<BadgeInstance>> {
        let mut matches: Vec<BadgeInstance> = self
            .instances
            .iter()
            .filter(|i| filter.matches(i, now))
            .map(|i| i.clone())
            .collect();
        matches.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(page.apply(matches))
    }

    async fn list_for_recipients(&self, identifiers: &[String]) -> Result<Vec<BadgeInstance>> {
        let mut matches: Vec<BadgeInstance> = self
            .instances
            .iter()
            .filter(|i| {
                !i.revoked
                    && i.acceptance != Acceptance::Rejected
                    && identifiers
                        .iter()
                        .any(|id| id.eq_ignore_ascii_case(&i.recipient_identifier))
            })
            .map(|i| i.clone())
            .collect();
        matches.sort_by(|a, b| (b.issued_on, b.id).cmp(&(a.issued_on, a.id)));
        Ok(matches)
    }

    async fn list_changed_since(
        &self,
        user_id: i64,
        since: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> Result<Vec<BadgeInstance>> {
        let candidates: Vec<BadgeInstance> = self
            .instances
            .iter()
            .filter(|i| since.is_none_or(|s| i.updated_at > s))
            .map(|i| i.clone())
            .collect();

        let mut visible: Vec<BadgeInstance> = candidates
            .into_iter()
            .filter(|i| {
                self.is_staff(i.issuer_id, user_id)
                    || self.recipient_shared_with(&i.recipient_identifier, user_id)
            })
            .collect();
        visible.sort_by(|a, b| (a.updated_at, a.id).cmp(&(b.updated_at, b.id)));
        Ok(page.apply(visible))
    }

    async fn has_current_award(
        &self,
        badgeclass_id: i64,
        recipient_identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.instances.iter().any(|i| {
            i.badgeclass_id == badgeclass_id
                && i.recipient_identifier == recipient_identifier
                && i.is_current(now)
        }))
    }

    async fn create(&self, instance: NewBadgeInstance) -> Result<BadgeInstance> {
        let mut created = self.create_many(vec![instance]).await?;
        created
            .pop()
            .ok_or_else(|| CoreError::Internal("create_many returned nothing".to_string()))
    }

    async fn create_many(&self, instances: Vec<NewBadgeInstance>) -> Result<Vec<BadgeInstance>> {
        let _guard = self.lock()?;
        let now = Utc::now();

        // 先全部构建，任一失败则不写入
        let mut built = Vec::with_capacity(instances.len());
        for new in &instances {
            Self::check_unique_source_url(
                self.instances.iter().map(|i| i.source_url.clone()),
                &new.source_url,
            )?;
            built.push(self.build_instance(self.next_id(), new, now)?);
        }
        for instance in &built {
            self.instances.insert(instance.id, instance.clone());
        }
        Ok(built)
    }

    async fn update(&self, instance: &BadgeInstance) -> Result<BadgeInstance> {
        let mut stored = self
            .instances
            .get_mut(&instance.id)
            .ok_or_else(|| CoreError::not_found("BadgeInstance", instance.entity_id.clone()))?;
        stored.recipient_identifier = instance.recipient_identifier.clone();
        stored.recipient_type = instance.recipient_type;
        stored.hashed = instance.hashed;
        stored.salt = instance.salt.clone();
        stored.issued_on = instance.issued_on;
        stored.expires_at = instance.expires_at;
        stored.narrative = instance.narrative.clone();
        stored.evidence = instance.evidence.clone();
        stored.extensions = instance.extensions.clone();
        stored.acceptance = instance.acceptance;
        if !stored.revoked {
            stored.image = instance.image.clone();
        }
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn revoke(&self, id: i64, reason: &str) -> Result<BadgeInstance> {
        let mut stored = self
            .instances
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("BadgeInstance", id.to_string()))?;
        stored.revoke(reason)?;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn count_for_badgeclass(&self, badgeclass_id: i64) -> Result<i64> {
        Ok(self
            .instances
            .iter()
            .filter(|i| i.badgeclass_id == badgeclass_id)
            .count() as i64)
    }

    async fn count_for_issuer(&self, issuer_id: i64) -> Result<i64> {
        Ok(self
            .instances
            .iter()
            .filter(|i| i.issuer_id == issuer_id)
            .count() as i64)
    }
}

#[async_trait]
impl CollectionRepositoryTrait for MemoryStore {
    async fn list_for_owner(&self, owner_id: i64) -> Result<Vec<BackpackCollection>> {
        let mut collections: Vec<BackpackCollection> = self
            .collections
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .map(|c| c.clone())
            .collect();
        collections.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(collections)
    }

    async fn get_by_entity_id(&self, entity_id: &str) -> Result<Option<BackpackCollection>> {
        Ok(self
            .collections
            .iter()
            .find(|c| c.entity_id == entity_id)
            .map(|c| c.clone()))
    }

    async fn get_by_share_hash(&self, share_hash: &str) -> Result<Option<BackpackCollection>> {
        Ok(self
            .collections
            .iter()
            .find(|c| c.share_hash.as_deref() == Some(share_hash))
            .map(|c| c.clone()))
    }

    async fn create(&self, collection: NewCollection) -> Result<BackpackCollection> {
        let now = Utc::now();
        let mut assertions = collection.assertions;
        assertions.dedup();
        let created = BackpackCollection {
            id: self.next_id(),
            entity_id: collection.entity_id,
            owner_id: collection.owner_id,
            name: collection.name,
            description: collection.description,
            share_hash: collection.share_hash,
            created_at: now,
            updated_at: now,
            assertions,
        };
        self.collections.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, collection: &BackpackCollection) -> Result<BackpackCollection> {
        let mut stored = self.collections.get_mut(&collection.id).ok_or_else(|| {
            CoreError::not_found("BackpackCollection", collection.entity_id.clone())
        })?;
        stored.name = collection.name.clone();
        stored.description = collection.description.clone();
        stored.share_hash = collection.share_hash.clone();
        stored.assertions = collection.assertions.clone();
        stored.assertions.dedup();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.collections.remove(&id);
        Ok(())
    }

    async fn remove_assertion(&self, badge_instance_id: i64) -> Result<()> {
        let Some(entity_id) = self
            .instances
            .get(&badge_instance_id)
            .map(|i| i.entity_id.clone())
        else {
            return Ok(());
        };
        for mut collection in self.collections.iter_mut() {
            collection.assertions.retain(|a| a != &entity_id);
        }
        Ok(())
    }
}
