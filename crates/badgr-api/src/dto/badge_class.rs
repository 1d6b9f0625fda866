//! 徽章定义请求与响应 DTO

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use validator::Validate;

use badgr_core::models::{Alignment, BadgeClass, ExpiresDuration, NewBadgeClass};
use badgr_core::openbadges::format_timestamp;
use badgr_core::text::{is_valid_url, strip_tags};
use badgr_core::{FieldErrors, entity_id};

use super::{empty_object, non_blank, present, validate_extensions};
use crate::error::field_errors_from;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentRequest {
    pub target_name: Option<String>,
    pub target_url: Option<String>,
    pub target_description: Option<String>,
    pub target_framework: Option<String>,
    pub target_code: Option<String>,
}

/// 创建与更新徽章定义；description 缺失与 null 不同：null 视为空串
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BadgeClassRequest {
    pub issuer: Option<String>,
    #[validate(
        required(message = "This field is required."),
        custom(function = "non_blank"),
        length(max = 1024, message = "Ensure this field has no more than 1024 characters.")
    )]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub image: Option<String>,
    #[serde(rename = "criteriaUrl")]
    pub criteria_url: Option<String>,
    #[serde(rename = "criteriaNarrative")]
    pub criteria_narrative: Option<String>,
    pub alignments: Option<Vec<AlignmentRequest>>,
    pub tags: Option<Vec<String>>,
    pub expires: Option<Value>,
    #[validate(custom(function = "validate_extensions"))]
    pub extensions: Option<Value>,
}

/// 校验后的可写字段
#[derive(Debug, Clone)]
pub struct BadgeClassFields {
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub criteria_url: Option<String>,
    pub criteria_text: Option<String>,
    pub alignments: Vec<Alignment>,
    pub tags: Vec<String>,
    pub expires: Option<(i32, ExpiresDuration)>,
    pub extensions: Option<Value>,
}

impl BadgeClassRequest {
    pub fn validated(self) -> Result<BadgeClassFields, FieldErrors> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => field_errors_from(&e),
        };

        let description = match &self.description {
            None => {
                errors.add("description", "This field is required.");
                String::new()
            }
            Some(d) => strip_tags(d.as_deref().unwrap_or_default()),
        };
        if description.chars().count() > 16384 {
            errors.add("description", "Ensure this field has no more than 16384 characters.");
        }

        let criteria_url = self.criteria_url.filter(|u| !u.trim().is_empty());
        if criteria_url.as_deref().is_some_and(|u| !is_valid_url(u)) {
            errors.add("criteriaUrl", "Enter a valid URL.");
        }

        let mut alignments = Vec::new();
        for item in self.alignments.unwrap_or_default() {
            match alignment(item) {
                Ok(a) => alignments.push(a),
                Err(message) => errors.add("alignments", message),
            }
        }

        let tags: Vec<String> = self
            .tags
            .unwrap_or_default()
            .iter()
            .map(|t| strip_tags(t))
            .filter(|t| !t.is_empty())
            .collect();
        if tags.iter().any(|t| t.chars().count() > 1024) {
            errors.add("tags", "Ensure this field has no more than 1024 characters.");
        }

        let expires = match parse_expires(self.expires.as_ref()) {
            Ok(expires) => expires,
            Err(message) => {
                errors.add("expires", message);
                None
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(BadgeClassFields {
            name: strip_tags(self.name.as_deref().unwrap_or_default()),
            description,
            image: self.image,
            criteria_url,
            criteria_text: self.criteria_narrative,
            alignments,
            tags,
            expires,
            extensions: self.extensions,
        })
    }
}

impl BadgeClassFields {
    pub fn into_new(self, issuer_id: i64, created_by: i64) -> NewBadgeClass {
        NewBadgeClass {
            entity_id: entity_id::generate(),
            issuer_id,
            name: self.name,
            description: self.description,
            image: self.image,
            criteria_url: self.criteria_url,
            criteria_text: self.criteria_text,
            alignments: self.alignments,
            tags: self.tags,
            expires_amount: self.expires.map(|(amount, _)| amount),
            expires_duration: self.expires.map(|(_, duration)| duration),
            extensions: self.extensions.unwrap_or_else(empty_object),
            source_url: None,
            original_json: None,
            created_by: Some(created_by),
        }
    }

    /// 发行方不可修改
    pub fn apply_to(self, badge_class: &mut BadgeClass) {
        badge_class.name = self.name;
        badge_class.description = self.description;
        if self.image.is_some() {
            badge_class.image = self.image;
        }
        badge_class.criteria_url = self.criteria_url;
        badge_class.criteria_text = self.criteria_text;
        badge_class.alignments.0 = self.alignments;
        badge_class.tags.0 = self.tags;
        badge_class.expires_amount = self.expires.map(|(amount, _)| amount);
        badge_class.expires_duration = self.expires.map(|(_, duration)| duration);
        if let Some(extensions) = self.extensions {
            badge_class.extensions = extensions;
        }
    }
}

fn alignment(item: AlignmentRequest) -> Result<Alignment, &'static str> {
    let target_name = item
        .target_name
        .as_deref()
        .map(strip_tags)
        .filter(|n| !n.is_empty())
        .ok_or("targetName is required")?;
    let target_url = item
        .target_url
        .filter(|u| is_valid_url(u))
        .ok_or("targetUrl must be a valid URL")?;
    let optional = |v: Option<String>| v.as_deref().map(strip_tags).filter(|s| !s.is_empty());
    Ok(Alignment {
        target_name,
        target_url,
        target_description: optional(item.target_description),
        target_framework: optional(item.target_framework),
        target_code: optional(item.target_code),
    })
}

/// 空的 expires（null、{}、amount 与 duration 都为空）视为未设置
fn parse_expires(value: Option<&Value>) -> Result<Option<(i32, ExpiresDuration)>, String> {
    let Some(object) = value.and_then(Value::as_object) else {
        return match value {
            None | Some(Value::Null) => Ok(None),
            Some(_) => Err("Expected an object with amount and duration.".to_string()),
        };
    };

    let amount = object.get("amount").filter(|v| !v.is_null());
    let duration = object.get("duration").filter(|v| !v.is_null() && v.as_str() != Some(""));
    match (amount, duration) {
        (None, None) => Ok(None),
        (Some(amount), Some(duration)) => {
            let amount = amount
                .as_i64()
                .filter(|a| *a > 0)
                .and_then(|a| i32::try_from(a).ok())
                .ok_or_else(|| "amount must be a positive integer.".to_string())?;
            let duration = duration
                .as_str()
                .and_then(ExpiresDuration::parse)
                .ok_or_else(|| format!("{} is not a valid choice for duration.", duration))?;
            Ok(Some((amount, duration)))
        }
        _ => Err("Both amount and duration are required.".to_string()),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeClassDto {
    pub entity_type: &'static str,
    pub entity_id: String,
    pub open_badge_id: String,
    pub created_at: String,
    pub created_by: Option<String>,
    pub issuer: String,
    pub issuer_open_badge_id: String,
    pub name: String,
    pub image: Option<String>,
    pub description: String,
    pub criteria_url: Option<String>,
    pub criteria_narrative: Option<String>,
    pub alignments: Vec<Alignment>,
    pub tags: Vec<String>,
    pub expires: Value,
    pub extensions: Value,
}

impl BadgeClassDto {
    pub fn new(badge_class: BadgeClass, open_badge_id: String, issuer_open_badge_id: String) -> Self {
        let expires = match (badge_class.expires_amount, badge_class.expires_duration) {
            (Some(amount), Some(duration)) => json!({ "amount": amount, "duration": duration }),
            _ => Value::Null,
        };
        Self {
            entity_type: "BadgeClass",
            open_badge_id,
            issuer_open_badge_id,
            created_at: format_timestamp(&badge_class.created_at),
            entity_id: badge_class.entity_id,
            created_by: badge_class.created_by_entity_id,
            issuer: badge_class.issuer_entity_id,
            name: badge_class.name,
            image: badge_class.image,
            description: badge_class.description,
            criteria_url: badge_class.criteria_url,
            criteria_narrative: badge_class.criteria_text,
            alignments: badge_class.alignments.0,
            tags: badge_class.tags.0,
            expires,
            extensions: badge_class.extensions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: Value) -> BadgeClassRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_description_required_but_null_allowed() {
        let errors = request(json!({"name": "Gold"})).validated().unwrap_err();
        assert_eq!(
            errors.get("description"),
            Some(&["This field is required.".to_string()][..])
        );

        let fields = request(json!({"name": "Gold", "description": null}))
            .validated()
            .unwrap();
        assert_eq!(fields.description, "");
    }

    #[test]
    fn test_empty_expires_is_ignored() {
        for expires in [json!(null), json!({}), json!({"amount": null, "duration": null})] {
            let fields = request(json!({"name": "Gold", "description": "d", "expires": expires}))
                .validated()
                .unwrap();
            assert_eq!(fields.expires, None);
        }
    }

    #[test]
    fn test_expires_validation() {
        let fields = request(json!({
            "name": "Gold",
            "description": "d",
            "expires": {"amount": 3, "duration": "months"}
        }))
        .validated()
        .unwrap();
        assert_eq!(fields.expires, Some((3, ExpiresDuration::Months)));

        for bad in [
            json!({"amount": 0, "duration": "days"}),
            json!({"amount": 2, "duration": "fortnights"}),
            json!({"amount": 2}),
        ] {
            let errors = request(json!({"name": "Gold", "description": "d", "expires": bad}))
                .validated()
                .unwrap_err();
            assert!(errors.get("expires").is_some());
        }
    }

    #[test]
    fn test_alignments_and_tags() {
        let fields = request(json!({
            "name": "<i>Gold</i>",
            "description": "d",
            "criteriaUrl": "https://example.org/criteria",
            "alignments": [{"targetName": "Skill", "targetUrl": "https://example.org/s"}],
            "tags": ["<b>a</b>", " "]
        }))
        .validated()
        .unwrap();
        assert_eq!(fields.name, "Gold");
        assert_eq!(fields.alignments[0].target_name, "Skill");
        assert_eq!(fields.tags, vec!["a".to_string()]);

        let errors = request(json!({
            "name": "Gold",
            "description": "d",
            "criteriaUrl": "not a url",
            "alignments": [{"targetName": "Skill"}]
        }))
        .validated()
        .unwrap_err();
        assert!(errors.get("criteriaUrl").is_some());
        assert!(errors.get("alignments").is_some());
    }
}
