//! 数据传输对象
//!
//! 请求体校验、响应表示以及 V2 信封与分页

pub mod assertion;
pub mod backpack;
pub mod badge_class;
pub mod collection;
pub mod envelope;
pub mod import;
pub mod issuer;
pub mod pagination;
pub mod query;
pub mod related;
pub mod token;

pub use assertion::{AssertionDto, AssertionRequest, BatchIssueRequest, RevokeResult};
pub use backpack::AcceptanceRequest;
pub use badge_class::{BadgeClassDto, BadgeClassRequest};
pub use collection::{CollectionDto, CollectionRequest};
pub use envelope::{Pagination, V2Response};
pub use import::ImportRequest;
pub use issuer::{IssuerDto, IssuerRequest};
pub use pagination::{Paginator, parse_num};
pub use query::{ChangedSinceQuery, Expands, ListQuery};
pub use related::Related;
pub use token::{IssuerTokensRequest, TokenRequest, TokenResponse};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use validator::ValidationError;

pub(crate) fn empty_object() -> Value {
    Value::Object(Default::default())
}

pub(crate) fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("This field may not be blank.".into()));
    }
    Ok(())
}

pub(crate) fn validate_extensions(value: &Value) -> Result<(), ValidationError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(ValidationError::new("extensions").with_message("Extensions must be an object".into()))
    }
}

/// 区分字段缺失（None）与显式 null（Some(None)），需配合 `#[serde(default)]`
pub(crate) fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "present")]
        value: Option<Option<String>>,
    }

    #[test]
    fn test_present_distinguishes_null() {
        let missing: Holder = serde_json::from_value(json!({})).unwrap();
        assert_eq!(missing.value, None);
        let null: Holder = serde_json::from_value(json!({"value": null})).unwrap();
        assert_eq!(null.value, Some(None));
        let set: Holder = serde_json::from_value(json!({"value": "x"})).unwrap();
        assert_eq!(set.value, Some(Some("x".into())));
    }

    #[test]
    fn test_non_blank() {
        assert!(non_blank("a").is_ok());
        assert!(non_blank("  ").is_err());
    }
}
