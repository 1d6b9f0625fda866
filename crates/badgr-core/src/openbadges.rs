//! Open Badges 2.0 JSON-LD 文档渲染
//!
//! 本地实体的 `id` 指向 `/public/...` 下的公开文档地址；导入的实体使用其源地址。

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use crate::models::{BadgeClass, BadgeInstance, Issuer};

pub const OPEN_BADGES_CONTEXT: &str = "https://w3id.org/openbadges/v2";

/// 统一的时间格式：UTC，结尾为 Z
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// 渲染选项
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// 合并导入时原始 JSON 中未被覆盖的字段
    pub include_extra: bool,
    /// 导入实体使用原始文档中的 id
    pub use_canonical_id: bool,
}

impl RenderOptions {
    pub fn expanded() -> Self {
        Self {
            include_extra: true,
            use_canonical_id: true,
        }
    }
}

/// 公开文档地址生成器
#[derive(Debug, Clone)]
pub struct OpenBadgesUrls {
    origin: String,
}

impl OpenBadgesUrls {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn issuer(&self, entity_id: &str) -> String {
        format!("{}/public/issuers/{}", self.origin, entity_id)
    }

    pub fn badge_class(&self, entity_id: &str) -> String {
        format!("{}/public/badges/{}", self.origin, entity_id)
    }

    pub fn assertion(&self, entity_id: &str) -> String {
        format!("{}/public/assertions/{}", self.origin, entity_id)
    }

    pub fn collection(&self, share_hash: &str) -> String {
        format!("{}/public/collections/{}", self.origin, share_hash)
    }

    pub fn issuer_jsonld_id(&self, issuer: &Issuer) -> String {
        issuer
            .source_url
            .clone()
            .unwrap_or_else(|| self.issuer(&issuer.entity_id))
    }

    pub fn badge_class_jsonld_id(&self, badge_class: &BadgeClass) -> String {
        badge_class
            .source_url
            .clone()
            .unwrap_or_else(|| self.badge_class(&badge_class.entity_id))
    }

    pub fn assertion_jsonld_id(&self, instance: &BadgeInstance) -> String {
        instance
            .source_url
            .clone()
            .unwrap_or_else(|| self.assertion(&instance.entity_id))
    }

    /// 发行方 JSON-LD
    pub fn issuer_json(&self, issuer: &Issuer, options: RenderOptions) -> Value {
        let mut doc = Map::new();
        doc.insert("@context".into(), json!(OPEN_BADGES_CONTEXT));
        doc.insert("type".into(), json!("Issuer"));
        doc.insert(
            "id".into(),
            json!(canonical_id(
                self.issuer_jsonld_id(issuer),
                issuer.original_json.as_ref(),
                options
            )),
        );
        doc.insert("name".into(), json!(issuer.name));
        doc.insert("url".into(), json!(issuer.url));
        doc.insert("email".into(), json!(issuer.email));
        if let Some(description) = issuer.description.as_deref().filter(|d| !d.is_empty()) {
            doc.insert("description".into(), json!(description));
        }
        if let Some(image) = &issuer.image {
            doc.insert("image".into(), json!(image));
        }
        merge_extensions(&mut doc, &issuer.extensions);
        finish(doc, issuer.original_json.as_ref(), options)
    }

    /// 徽章定义 JSON-LD，issuer 字段为发行方文档地址
    pub fn badge_class_json(&self, badge_class: &BadgeClass, issuer_id: &str, options: RenderOptions) -> Value {
        let mut doc = Map::new();
        doc.insert("@context".into(), json!(OPEN_BADGES_CONTEXT));
        doc.insert("type".into(), json!("BadgeClass"));
        doc.insert(
            "id".into(),
            json!(canonical_id(
                self.badge_class_jsonld_id(badge_class),
                badge_class.original_json.as_ref(),
                options
            )),
        );
        doc.insert("name".into(), json!(badge_class.name));
        doc.insert("description".into(), json!(badge_class.description));
        if let Some(image) = &badge_class.image {
            doc.insert("image".into(), json!(image));
        }

        let mut criteria = Map::new();
        if let Some(url) = &badge_class.criteria_url {
            criteria.insert("id".into(), json!(url));
        }
        if let Some(text) = &badge_class.criteria_text {
            criteria.insert("narrative".into(), json!(text));
        }
        doc.insert("criteria".into(), Value::Object(criteria));
        doc.insert("issuer".into(), json!(issuer_id));

        if !badge_class.alignments.is_empty() {
            doc.insert("alignment".into(), json!(badge_class.alignments.0));
        }
        if !badge_class.tags.is_empty() {
            doc.insert("tags".into(), json!(badge_class.tags.0));
        }
        merge_extensions(&mut doc, &badge_class.extensions);
        finish(doc, badge_class.original_json.as_ref(), options)
    }

    /// 徽章实例 JSON-LD，badge 字段为徽章定义文档地址
    pub fn assertion_json(&self, instance: &BadgeInstance, badge_id: &str, options: RenderOptions) -> Value {
        let mut doc = Map::new();
        doc.insert("@context".into(), json!(OPEN_BADGES_CONTEXT));
        doc.insert("type".into(), json!("Assertion"));
        doc.insert(
            "id".into(),
            json!(canonical_id(
                self.assertion_jsonld_id(instance),
                instance.original_json.as_ref(),
                options
            )),
        );
        doc.insert("badge".into(), json!(badge_id));

        let mut recipient = Map::new();
        recipient.insert("type".into(), json!(instance.recipient_type.as_str()));
        recipient.insert("hashed".into(), json!(instance.hashed));
        recipient.insert("identity".into(), json!(instance.recipient_identity()));
        if instance.hashed {
            if let Some(salt) = &instance.salt {
                recipient.insert("salt".into(), json!(salt));
            }
        }
        doc.insert("recipient".into(), Value::Object(recipient));

        doc.insert("issuedOn".into(), json!(format_timestamp(&instance.issued_on)));
        doc.insert("verification".into(), json!({ "type": "HostedBadge" }));
        if let Some(image) = &instance.image {
            doc.insert("image".into(), json!(image));
        }
        if let Some(expires) = &instance.expires_at {
            doc.insert("expires".into(), json!(format_timestamp(expires)));
        }
        if let Some(narrative) = &instance.narrative {
            doc.insert("narrative".into(), json!(narrative));
        }
        if !instance.evidence.is_empty() {
            let evidence: Vec<Value> = instance
                .evidence
                .iter()
                .map(|e| {
                    let mut item = Map::new();
                    if let Some(url) = &e.url {
                        item.insert("id".into(), json!(url));
                    }
                    if let Some(narrative) = &e.narrative {
                        item.insert("narrative".into(), json!(narrative));
                    }
                    Value::Object(item)
                })
                .collect();
            doc.insert("evidence".into(), Value::Array(evidence));
        }
        if instance.revoked {
            doc.insert("revoked".into(), json!(true));
            if let Some(reason) = &instance.revocation_reason {
                doc.insert("revocationReason".into(), json!(reason));
            }
        }
        merge_extensions(&mut doc, &instance.extensions);
        finish(doc, instance.original_json.as_ref(), options)
    }

    /// 已撤销实例的公开响应体
    pub fn revoked_assertion_json(&self, instance: &BadgeInstance) -> Value {
        json!({
            "@context": OPEN_BADGES_CONTEXT,
            "id": self.assertion_jsonld_id(instance),
            "revoked": true,
            "revocationReason": instance.revocation_reason,
        })
    }
}

fn canonical_id(local_id: String, original: Option<&Value>, options: RenderOptions) -> String {
    if options.use_canonical_id {
        if let Some(id) = original.and_then(|o| o.get("id")).and_then(Value::as_str) {
            return id.to_string();
        }
    }
    local_id
}

fn merge_extensions(doc: &mut Map<String, Value>, extensions: &Value) {
    if let Some(map) = extensions.as_object() {
        for (key, value) in map {
            doc.insert(key.clone(), value.clone());
        }
    }
}

fn finish(mut doc: Map<String, Value>, original: Option<&Value>, options: RenderOptions) -> Value {
    if options.include_extra {
        if let Some(original) = original.and_then(Value::as_object) {
            for (key, value) in original {
                doc.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
    Value::Object(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::instance;
    use chrono::TimeZone;

    fn urls() -> OpenBadgesUrls {
        OpenBadgesUrls::new("https://badgr.example.org/")
    }

    #[test]
    fn test_format_timestamp_ends_with_z() {
        let dt = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        assert_eq!(format_timestamp(&dt), "2024-05-01T08:30:00Z");
    }

    #[test]
    fn test_public_urls() {
        let urls = urls();
        assert_eq!(urls.origin(), "https://badgr.example.org");
        assert_eq!(
            urls.assertion("abc"),
            "https://badgr.example.org/public/assertions/abc"
        );
        assert_eq!(urls.badge_class("b"), "https://badgr.example.org/public/badges/b");
        assert_eq!(urls.issuer("i"), "https://badgr.example.org/public/issuers/i");
    }

    #[test]
    fn test_assertion_json_hashed_recipient() {
        let mut a = instance(7, "someone@example.org");
        a.extensions = json!({"extensions:RecipientProfile": {"name": "Someone"}});
        let doc = urls().assertion_json(&a, "https://badgr.example.org/public/badges/b", RenderOptions::default());

        assert_eq!(doc["type"], "Assertion");
        assert_eq!(doc["id"], urls().assertion(&a.entity_id));
        assert_eq!(doc["recipient"]["hashed"], true);
        assert_eq!(doc["recipient"]["salt"], "salt");
        assert!(doc["recipient"]["identity"].as_str().unwrap().starts_with("sha256$"));
        assert_eq!(doc["extensions:RecipientProfile"]["name"], "Someone");
        assert!(doc.get("revoked").is_none());
    }

    #[test]
    fn test_imported_assertion_uses_source_and_extra_fields() {
        let mut a = instance(8, "someone@example.org");
        a.source_url = Some("https://other.example.org/a/1".into());
        a.original_json = Some(json!({
            "id": "https://other.example.org/a/1?v=2",
            "x-custom": "kept",
            "type": "ShouldNotOverride"
        }));

        let plain = urls().assertion_json(&a, "b", RenderOptions::default());
        assert_eq!(plain["id"], "https://other.example.org/a/1");
        assert!(plain.get("x-custom").is_none());

        let expanded = urls().assertion_json(&a, "b", RenderOptions::expanded());
        assert_eq!(expanded["id"], "https://other.example.org/a/1?v=2");
        assert_eq!(expanded["x-custom"], "kept");
        assert_eq!(expanded["type"], "Assertion");
    }

    #[test]
    fn test_revoked_assertion_json() {
        let mut a = instance(9, "someone@example.org");
        a.revoke("mistake").unwrap();
        let doc = urls().revoked_assertion_json(&a);
        assert_eq!(doc["revoked"], true);
        assert_eq!(doc["revocationReason"], "mistake");
    }
}
