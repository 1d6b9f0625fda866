//! 导入校验的默认实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use super::{BadgeCheck, DocumentFetcher, ImportOutcome, ImportSource, png};
use crate::entity_id;
use crate::error::{CoreError, Result};
use crate::hashing::identity_matches;
use crate::models::{
    Acceptance, Alignment, BadgeClass, EvidenceItem, Issuer, NewBadgeClass, NewBadgeInstance,
    NewIssuer, RecipientType, UserAccount,
};
use crate::repository::Repositories;
use crate::text::{is_valid_url, strip_tags};

const NOT_YOURS: &str =
    "The badge you are trying to import does not belong to one of your verified accounts";

fn check_error(message: impl Into<String>) -> CoreError {
    CoreError::BadgeCheck(vec![message.into()])
}

/// 文档及其来源地址（即本地记录的 source_url）
struct Node {
    doc: Value,
    source_url: String,
}

/// 已校验的接收者
struct VerifiedRecipient {
    identifier: String,
    recipient_type: RecipientType,
    hashed: bool,
    salt: Option<String>,
}

pub struct BadgeCheckService {
    repos: Repositories,
    fetcher: Arc<dyn DocumentFetcher>,
}

impl BadgeCheckService {
    pub fn new(repos: Repositories, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        Self { repos, fetcher }
    }

    async fn load_assertion(&self, source: ImportSource) -> Result<Node> {
        match source {
            ImportSource::Url(url) => self.fetch_node(&url).await,
            ImportSource::Image(bytes) => {
                let payload = png::extract_openbadges(&bytes)?.ok_or_else(|| {
                    check_error("Image does not contain Open Badges metadata")
                })?;
                self.load_from_text(payload.trim()).await
            }
            ImportSource::Assertion(Value::String(text)) => self.load_from_text(text.trim()).await,
            ImportSource::Assertion(doc) => self.load_inline(doc).await,
        }
    }

    /// 文本载荷可能是 JSON，也可能是托管地址
    async fn load_from_text(&self, text: &str) -> Result<Node> {
        if text.starts_with('{') {
            let doc: Value = serde_json::from_str(text)
                .map_err(|_| check_error("Embedded assertion is not valid JSON"))?;
            self.load_inline(doc).await
        } else if is_valid_url(text) {
            self.fetch_node(text).await
        } else {
            Err(check_error("Embedded assertion is neither JSON nor a URL"))
        }
    }

    /// 内联文档的 id 为 URL 时取其托管副本为准
    async fn load_inline(&self, doc: Value) -> Result<Node> {
        if !doc.is_object() {
            return Err(check_error("Assertion must be a JSON object"));
        }
        match doc.get("id").and_then(Value::as_str) {
            Some(id) if is_valid_url(id) => self.fetch_node(id).await,
            Some(id) => Ok(Node {
                source_url: id.to_string(),
                doc,
            }),
            None => Err(check_error("Assertion must have an id")),
        }
    }

    async fn fetch_node(&self, url: &str) -> Result<Node> {
        let doc = self.fetcher.fetch_json(url).await?;
        if !doc.is_object() {
            return Err(check_error(format!("Document at {} is not a JSON object", url)));
        }
        // 以文档自述的 id 为准，缺失时使用请求地址
        let source_url = doc
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| is_valid_url(id))
            .unwrap_or(url)
            .to_string();
        Ok(Node { doc, source_url })
    }

    /// 子文档可以是内嵌对象或 URL
    async fn resolve_child(&self, parent: &Value, key: &str, label: &str) -> Result<Node> {
        match parent.get(key) {
            Some(Value::String(url)) if is_valid_url(url) => self.fetch_node(url).await,
            Some(Value::Object(obj)) => {
                let source_url = obj
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| check_error(format!("{} must have an id", label)))?
                    .to_string();
                Ok(Node {
                    doc: Value::Object(obj.clone()),
                    source_url,
                })
            }
            _ => Err(check_error(format!(
                "Assertion is missing a valid '{}' property",
                key
            ))),
        }
    }

    async fn get_or_create_issuer(&self, node: &Node) -> Result<Issuer> {
        if let Some(existing) = self.repos.issuers.find_by_source_url(&node.source_url).await? {
            return Ok(existing);
        }
        let doc = &node.doc;
        let name = str_field(doc, "name").ok_or_else(|| check_error("Issuer must have a name"))?;

        let new = NewIssuer {
            entity_id: entity_id::generate(),
            name: strip_tags(&name),
            description: str_field(doc, "description"),
            email: str_field(doc, "email").unwrap_or_default(),
            url: str_field(doc, "url").unwrap_or_default(),
            image: image_field(doc),
            extensions: extensions_of(doc),
            source_url: Some(node.source_url.clone()),
            original_json: Some(doc.clone()),
            created_by: None,
        };
        match self.repos.issuers.create(new, None).await {
            Ok(issuer) => Ok(issuer),
            // 并发导入同一发行方
            Err(e) if e.is_unique_violation() => self
                .repos
                .issuers
                .find_by_source_url(&node.source_url)
                .await?
                .ok_or(e),
            Err(e) => Err(e),
        }
    }

    async fn get_or_create_badge_class(&self, node: &Node, issuer: &Issuer) -> Result<BadgeClass> {
        if let Some(existing) = self
            .repos
            .badge_classes
            .find_by_source_url(&node.source_url)
            .await?
        {
            return Ok(existing);
        }
        let doc = &node.doc;
        let name =
            str_field(doc, "name").ok_or_else(|| check_error("BadgeClass must have a name"))?;

        let (criteria_url, criteria_text) = match doc.get("criteria") {
            Some(Value::String(url)) => (Some(url.clone()), None),
            Some(Value::Object(c)) => (
                c.get("id").and_then(Value::as_str).map(str::to_string),
                c.get("narrative").and_then(Value::as_str).map(str::to_string),
            ),
            _ => (None, None),
        };
        let alignments: Vec<Alignment> = doc
            .get("alignment")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let tags: Vec<String> = doc
            .get("tags")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let new = NewBadgeClass {
            entity_id: entity_id::generate(),
            issuer_id: issuer.id,
            name: strip_tags(&name),
            description: str_field(doc, "description").unwrap_or_default(),
            image: image_field(doc),
            criteria_url,
            criteria_text,
            alignments,
            tags,
            expires_amount: None,
            expires_duration: None,
            extensions: extensions_of(doc),
            source_url: Some(node.source_url.clone()),
            original_json: Some(doc.clone()),
            created_by: None,
        };
        match self.repos.badge_classes.create(new).await {
            Ok(badge_class) => Ok(badge_class),
            Err(e) if e.is_unique_violation() => self
                .repos
                .badge_classes
                .find_by_source_url(&node.source_url)
                .await?
                .ok_or(e),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl BadgeCheck for BadgeCheckService {
    #[instrument(skip(self, source, account), fields(kind = source.kind(), user = %account.entity_id()))]
    async fn get_or_create_assertion(
        &self,
        source: ImportSource,
        account: &UserAccount,
    ) -> Result<ImportOutcome> {
        let assertion = self.load_assertion(source).await?;
        validate_assertion(&assertion.doc)?;
        let recipient = verify_recipient(&assertion.doc, account)?;

        if let Some(existing) = self
            .repos
            .assertions
            .find_by_source_url(&assertion.source_url)
            .await?
        {
            return Ok(ImportOutcome {
                instance: existing,
                created: false,
            });
        }

        let badge = self.resolve_child(&assertion.doc, "badge", "BadgeClass").await?;
        let issuer_node = self.resolve_child(&badge.doc, "issuer", "Issuer").await?;
        let issuer = self.get_or_create_issuer(&issuer_node).await?;
        let badge_class = self.get_or_create_badge_class(&badge, &issuer).await?;

        let doc = &assertion.doc;
        let new = NewBadgeInstance {
            entity_id: entity_id::generate(),
            badgeclass_id: badge_class.id,
            issuer_id: issuer.id,
            recipient_identifier: recipient.identifier,
            recipient_type: recipient.recipient_type,
            hashed: recipient.hashed,
            salt: recipient.salt,
            issued_on: doc.get("issuedOn").and_then(parse_datetime).unwrap_or_else(Utc::now),
            expires_at: doc.get("expires").and_then(parse_datetime),
            narrative: str_field(doc, "narrative"),
            evidence: evidence_of(doc),
            extensions: extensions_of(doc),
            acceptance: Acceptance::Accepted,
            image: image_field(doc),
            source_url: Some(assertion.source_url.clone()),
            original_json: Some(doc.clone()),
            create_notification: false,
            created_by: Some(account.id()),
        };

        let instance = match self.repos.assertions.create(new).await {
            Ok(instance) => instance,
            Err(e) if e.is_unique_violation() => {
                let existing = self
                    .repos
                    .assertions
                    .find_by_source_url(&assertion.source_url)
                    .await?
                    .ok_or(e)?;
                return Ok(ImportOutcome {
                    instance: existing,
                    created: false,
                });
            }
            Err(e) => return Err(e),
        };

        info!(
            event = "BadgeInstanceImported",
            assertion = %instance.entity_id,
            source_url = %assertion.source_url,
            "外部徽章已导入"
        );
        Ok(ImportOutcome {
            instance,
            created: true,
        })
    }
}

/// 结构校验，汇总全部缺失项
fn validate_assertion(doc: &Value) -> Result<()> {
    let mut errors = Vec::new();
    if !doc.get("recipient").is_some_and(Value::is_object) {
        errors.push("Assertion is missing a valid 'recipient' property".to_string());
    }
    if doc.get("badge").is_none() {
        errors.push("Assertion is missing a valid 'badge' property".to_string());
    }
    if doc.get("revoked").and_then(Value::as_bool) == Some(true) {
        errors.push("Assertion has been revoked".to_string());
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoreError::BadgeCheck(errors))
    }
}

fn verify_recipient(doc: &Value, account: &UserAccount) -> Result<VerifiedRecipient> {
    let recipient = doc
        .get("recipient")
        .ok_or_else(|| check_error("Assertion is missing a valid 'recipient' property"))?;
    let identity = recipient
        .get("identity")
        .and_then(Value::as_str)
        .ok_or_else(|| check_error("Recipient must have an identity"))?;
    let type_name = recipient
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("email");
    let recipient_type = RecipientType::parse(type_name)
        .ok_or_else(|| check_error(format!("Unsupported recipient type: {}", type_name)))?;
    let hashed = recipient
        .get("hashed")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let salt = recipient
        .get("salt")
        .and_then(Value::as_str)
        .map(str::to_string);

    let wanted = recipient_type.identifier_type();
    let matched = account
        .identifiers
        .iter()
        .filter(|i| i.verified && i.identifier_type == wanted)
        .find(|i| identity_matches(identity, hashed, salt.as_deref(), &i.identifier))
        .ok_or_else(|| check_error(NOT_YOURS))?;

    Ok(VerifiedRecipient {
        identifier: matched.identifier.clone(),
        recipient_type,
        hashed,
        salt,
    })
}

fn str_field(doc: &Value, key: &str) -> Option<String> {
    doc.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// image 可以是 URL 字符串或带 id 的 Image 对象
fn image_field(doc: &Value) -> Option<String> {
    match doc.get("image") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Object(obj)) => obj.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn extensions_of(doc: &Value) -> Value {
    let extensions: Map<String, Value> = doc
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(k, _)| k.starts_with("extensions:"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();
    Value::Object(extensions)
}

fn evidence_of(doc: &Value) -> Vec<EvidenceItem> {
    fn item(value: &Value) -> Option<EvidenceItem> {
        let item = match value {
            Value::String(url) => EvidenceItem {
                url: Some(url.clone()),
                narrative: None,
            },
            Value::Object(obj) => EvidenceItem {
                url: obj.get("id").and_then(Value::as_str).map(str::to_string),
                narrative: obj.get("narrative").and_then(Value::as_str).map(str::to_string),
            },
            _ => return None,
        };
        (!item.is_empty()).then_some(item)
    }

    match doc.get("evidence") {
        Some(Value::Array(items)) => items.iter().filter_map(item).collect(),
        Some(value) => item(value).into_iter().collect(),
        None => vec![],
    }
}

/// ISO-8601 时间、纯日期或 Unix 秒
fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|naive| Utc.from_utc_datetime(&naive))
            })
            .or_else(|| s.parse::<i64>().ok().and_then(|ts| Utc.timestamp_opt(ts, 0).single())),
        Value::Number(n) => n.as_i64().and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use base64::Engine;
    use serde_json::json;

    use super::*;
    use crate::badgecheck::MockDocumentFetcher;
    use crate::badgecheck::png::fixtures::baked_png;
    use crate::hashing::generate_sha256_hashstring;
    use crate::models::IdentifierType;
    use crate::repository::memory::MemoryStore;
    use crate::repository::UserRepositoryTrait;

    const ASSERTION_URL: &str = "https://issuer.example.org/assertions/1";
    const BADGE_URL: &str = "https://issuer.example.org/badges/1";
    const ISSUER_URL: &str = "https://issuer.example.org/issuer";

    /// 固定文档集合
    struct StaticFetcher(HashMap<String, Value>);

    #[async_trait]
    impl DocumentFetcher for StaticFetcher {
        async fn fetch_json(&self, url: &str) -> Result<Value> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| check_error(format!("Unable to fetch {}", url)))
        }
    }

    fn hosted_documents(recipient: Value) -> HashMap<String, Value> {
        HashMap::from([
            (
                ASSERTION_URL.to_string(),
                json!({
                    "@context": "https://w3id.org/openbadges/v2",
                    "type": "Assertion",
                    "id": ASSERTION_URL,
                    "recipient": recipient,
                    "badge": BADGE_URL,
                    "issuedOn": "2024-01-02T03:04:05Z",
                    "evidence": [{"id": "https://example.org/work"}, {"narrative": "Did it"}],
                    "extensions:Note": {"text": "hi"}
                }),
            ),
            (
                BADGE_URL.to_string(),
                json!({
                    "type": "BadgeClass",
                    "id": BADGE_URL,
                    "name": "Hosted Badge",
                    "description": "A badge",
                    "criteria": {"narrative": "Be great"},
                    "issuer": ISSUER_URL
                }),
            ),
            (
                ISSUER_URL.to_string(),
                json!({
                    "type": "Issuer",
                    "id": ISSUER_URL,
                    "name": "Remote Issuer",
                    "url": "https://issuer.example.org",
                    "email": "badges@issuer.example.org"
                }),
            ),
        ])
    }

    async fn setup(documents: HashMap<String, Value>) -> (BadgeCheckService, UserAccount) {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user("Back", "Pack", None).await.unwrap();
        store
            .add_identifier(user.id, "owner@example.org", IdentifierType::Email, true)
            .await
            .unwrap();
        let account = store.get_account(user.id).await.unwrap().unwrap();
        let service = BadgeCheckService::new(
            Repositories::in_memory(store),
            Arc::new(StaticFetcher(documents)),
        );
        (service, account)
    }

    #[tokio::test]
    async fn test_import_by_url_creates_then_reuses() {
        let recipient = json!({"type": "email", "identity": "Owner@example.org", "hashed": false});
        let (service, account) = setup(hosted_documents(recipient)).await;

        let first = service
            .get_or_create_assertion(ImportSource::Url(ASSERTION_URL.into()), &account)
            .await
            .unwrap();
        assert!(first.created);
        assert_eq!(first.instance.recipient_identifier, "owner@example.org");
        assert_eq!(first.instance.evidence.0.len(), 2);
        assert_eq!(first.instance.acceptance, Acceptance::Accepted);
        assert_eq!(first.instance.source_url.as_deref(), Some(ASSERTION_URL));

        let second = service
            .get_or_create_assertion(ImportSource::Url(ASSERTION_URL.into()), &account)
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.instance.id, first.instance.id);
    }

    #[tokio::test]
    async fn test_hashed_recipient_matches() {
        let identity = generate_sha256_hashstring("owner@example.org", Some("pepper"));
        let recipient = json!({"type": "email", "identity": identity, "hashed": true, "salt": "pepper"});
        let (service, account) = setup(hosted_documents(recipient)).await;

        let outcome = service
            .get_or_create_assertion(ImportSource::Url(ASSERTION_URL.into()), &account)
            .await
            .unwrap();
        assert!(outcome.instance.hashed);
        assert_eq!(outcome.instance.salt.as_deref(), Some("pepper"));
    }

    #[tokio::test]
    async fn test_foreign_recipient_rejected() {
        let recipient = json!({"type": "email", "identity": "someone@else.org", "hashed": false});
        let (service, account) = setup(hosted_documents(recipient)).await;

        let err = service
            .get_or_create_assertion(ImportSource::Url(ASSERTION_URL.into()), &account)
            .await
            .unwrap_err();
        match err {
            CoreError::BadgeCheck(messages) => assert_eq!(messages, vec![NOT_YOURS.to_string()]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_import_from_baked_image() {
        let recipient = json!({"identity": "owner@example.org"});
        let (service, account) = setup(hosted_documents(recipient)).await;

        let png = baked_png(ASSERTION_URL);
        let outcome = service
            .get_or_create_assertion(ImportSource::Image(png), &account)
            .await
            .unwrap();
        assert!(outcome.created);

        // data URI 解码后同样可用
        let encoded = base64::engine::general_purpose::STANDARD.encode(baked_png(ASSERTION_URL));
        let decoded = png::decode_upload(&format!("data:image/png;base64,{}", encoded)).unwrap();
        let again = service
            .get_or_create_assertion(ImportSource::Image(decoded), &account)
            .await
            .unwrap();
        assert!(!again.created);
    }

    #[tokio::test]
    async fn test_inline_assertion_with_embedded_documents() {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user("In", "Line", None).await.unwrap();
        store
            .add_identifier(user.id, "owner@example.org", IdentifierType::Email, true)
            .await
            .unwrap();
        let account = store.get_account(user.id).await.unwrap().unwrap();
        // 内联文档 id 不是 URL，不应发起任何网络请求
        let service =
            BadgeCheckService::new(Repositories::in_memory(store), Arc::new(MockDocumentFetcher::new()));

        let doc = json!({
            "id": "urn:uuid:6d1d0b9e-46f4-4a3c-8d6f-0a3f5f8c1d11",
            "recipient": {"type": "email", "identity": "owner@example.org"},
            "issuedOn": "2024-05-01",
            "badge": {
                "id": "urn:uuid:badge-1",
                "name": "Inline Badge",
                "issuer": {"id": "urn:uuid:issuer-1", "name": "<b>Inline</b> Issuer"}
            }
        });
        let outcome = service
            .get_or_create_assertion(ImportSource::Assertion(doc), &account)
            .await
            .unwrap();
        assert!(outcome.created);
        assert_eq!(
            outcome.instance.issued_on,
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_properties_are_reported_together() {
        let (service, account) = setup(HashMap::new()).await;
        let err = service
            .get_or_create_assertion(ImportSource::Assertion(json!({"id": "urn:x"})), &account)
            .await
            .unwrap_err();
        match err {
            CoreError::BadgeCheck(messages) => assert_eq!(messages.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_datetime_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_datetime(&json!("2024-01-02T03:04:05Z")), Some(expected));
        assert_eq!(parse_datetime(&json!(expected.timestamp())), Some(expected));
        assert_eq!(parse_datetime(&json!("not a date")), None);
    }
}
