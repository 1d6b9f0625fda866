//! 背包收藏集 DTO

use serde::{Deserialize, Serialize};
use validator::Validate;

use badgr_core::models::BackpackCollection;
use badgr_core::openbadges::format_timestamp;

use super::non_blank;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CollectionRequest {
    #[validate(
        required(message = "This field is required."),
        custom(function = "non_blank"),
        length(max = 128, message = "Ensure this field has no more than 128 characters.")
    )]
    pub name: Option<String>,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub description: Option<String>,
    pub published: Option<bool>,
    /// 背包中徽章实例的 entity_id，保持顺序
    pub assertions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDto {
    pub entity_type: &'static str,
    pub entity_id: String,
    pub created_at: String,
    pub created_by: String,
    pub name: String,
    pub description: String,
    pub published: bool,
    #[serde(rename = "share_url")]
    pub share_url: Option<String>,
    pub assertions: Vec<String>,
}

impl CollectionDto {
    pub fn new(collection: BackpackCollection, owner_entity_id: &str, origin: &str) -> Self {
        Self {
            entity_type: "Collection",
            created_at: format_timestamp(&collection.created_at),
            created_by: owner_entity_id.to_string(),
            published: collection.published(),
            share_url: collection.share_url(origin),
            entity_id: collection.entity_id,
            name: collection.name,
            description: collection.description,
            assertions: collection.assertions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::field_errors_from;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_name_required() {
        let request: CollectionRequest = serde_json::from_value(json!({"name": " "})).unwrap();
        let errors = field_errors_from(&request.validate().unwrap_err());
        assert_eq!(
            errors.get("name"),
            Some(&["This field may not be blank.".to_string()][..])
        );
    }

    #[test]
    fn test_share_url_only_when_published() {
        let now = Utc::now();
        let mut collection = BackpackCollection {
            id: 1,
            entity_id: "col".into(),
            owner_id: 1,
            name: "Mine".into(),
            description: String::new(),
            share_hash: None,
            created_at: now,
            updated_at: now,
            assertions: vec!["a1".into()],
        };
        let dto = serde_json::to_value(CollectionDto::new(collection.clone(), "u1", "https://x.org")).unwrap();
        assert_eq!(dto["published"], false);
        assert_eq!(dto["share_url"], serde_json::Value::Null);

        collection.share_hash = Some("hash".into());
        let dto = serde_json::to_value(CollectionDto::new(collection, "u1", "https://x.org")).unwrap();
        assert_eq!(dto["share_url"], "https://x.org/public/collections/hash");
        assert_eq!(dto["assertions"], json!(["a1"]));
    }
}
