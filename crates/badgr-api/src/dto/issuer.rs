//! 发行方请求与响应 DTO

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use badgr_core::models::{Issuer, IssuerStaff, NewIssuer, StaffRole};
use badgr_core::openbadges::{OpenBadgesUrls, format_timestamp};
use badgr_core::{entity_id, text::strip_tags};

use super::{empty_object, non_blank, validate_extensions};

/// 创建与更新发行方（PUT 为整体校验）
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct IssuerRequest {
    #[validate(
        required(message = "This field is required."),
        custom(function = "non_blank"),
        length(max = 1024, message = "Ensure this field has no more than 1024 characters.")
    )]
    pub name: Option<String>,
    #[validate(
        required(message = "This field is required."),
        email(message = "Enter a valid email address."),
        length(max = 255, message = "Ensure this field has no more than 255 characters.")
    )]
    pub email: Option<String>,
    #[validate(
        required(message = "This field is required."),
        url(message = "Enter a valid URL."),
        length(max = 1024, message = "Ensure this field has no more than 1024 characters.")
    )]
    pub url: Option<String>,
    #[validate(length(max = 16384, message = "Ensure this field has no more than 16384 characters."))]
    pub description: Option<String>,
    pub image: Option<String>,
    #[validate(custom(function = "validate_extensions"))]
    pub extensions: Option<Value>,
}

impl IssuerRequest {
    /// 校验通过后调用
    pub fn into_new_issuer(self, created_by: i64) -> NewIssuer {
        NewIssuer {
            entity_id: entity_id::generate(),
            name: strip_tags(self.name.as_deref().unwrap_or_default()),
            description: self.description.as_deref().map(strip_tags),
            email: self.email.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            image: self.image,
            extensions: self.extensions.unwrap_or_else(empty_object),
            source_url: None,
            original_json: None,
            created_by: Some(created_by),
        }
    }

    /// 整体覆盖可编辑字段；未提供的 extensions 保持原值
    pub fn apply_to(self, issuer: &mut Issuer) {
        issuer.name = strip_tags(self.name.as_deref().unwrap_or_default());
        issuer.description = self.description.as_deref().map(strip_tags);
        issuer.email = self.email.unwrap_or_default();
        issuer.url = self.url.unwrap_or_default();
        if self.image.is_some() {
            issuer.image = self.image;
        }
        if let Some(extensions) = self.extensions {
            issuer.extensions = extensions;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StaffDto {
    pub user: String,
    pub role: StaffRole,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerDto {
    pub entity_type: &'static str,
    pub entity_id: String,
    pub open_badge_id: String,
    pub created_at: String,
    pub created_by: Option<String>,
    pub name: String,
    pub image: Option<String>,
    pub email: String,
    pub description: Option<String>,
    pub url: String,
    pub staff: Vec<StaffDto>,
    pub extensions: Value,
}

impl IssuerDto {
    pub fn new(issuer: Issuer, staff: &[IssuerStaff], urls: &OpenBadgesUrls) -> Self {
        Self {
            entity_type: "Issuer",
            open_badge_id: urls.issuer_jsonld_id(&issuer),
            created_at: format_timestamp(&issuer.created_at),
            entity_id: issuer.entity_id,
            created_by: issuer.created_by_entity_id,
            name: issuer.name,
            image: issuer.image,
            email: issuer.email,
            description: issuer.description,
            url: issuer.url,
            staff: staff
                .iter()
                .map(|s| StaffDto {
                    user: s.user_entity_id.clone(),
                    role: s.role,
                })
                .collect(),
            extensions: issuer.extensions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::field_errors_from;
    use serde_json::json;

    fn request(body: Value) -> IssuerRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_missing_and_invalid_fields() {
        let errors = request(json!({"email": "not-an-email", "url": "nope"}))
            .validate()
            .unwrap_err();
        let fields = field_errors_from(&errors);
        assert_eq!(fields.get("name"), Some(&["This field is required.".to_string()][..]));
        assert_eq!(fields.get("email"), Some(&["Enter a valid email address.".to_string()][..]));
        assert_eq!(fields.get("url"), Some(&["Enter a valid URL.".to_string()][..]));
    }

    #[test]
    fn test_extensions_must_be_object() {
        let errors = request(json!({
            "name": "Issuer",
            "email": "issuer@example.org",
            "url": "https://issuer.example.org",
            "extensions": ["x"]
        }))
        .validate()
        .unwrap_err();
        assert!(field_errors_from(&errors).get("extensions").is_some());
    }

    #[test]
    fn test_into_new_issuer_strips_tags() {
        let req = request(json!({
            "name": "<b>Badge</b> Maker",
            "email": "issuer@example.org",
            "url": "https://issuer.example.org",
            "description": "<p>We issue</p>"
        }));
        req.validate().unwrap();
        let new = req.into_new_issuer(7);
        assert_eq!(new.name, "Badge Maker");
        assert_eq!(new.description.as_deref(), Some("We issue"));
        assert_eq!(new.created_by, Some(7));
        assert_eq!(new.extensions, json!({}));
    }
}
