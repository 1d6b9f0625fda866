//! 背包导入请求

use serde::Deserialize;
use serde_json::Value;

use badgr_core::badgecheck::{ImportSource, png};
use badgr_core::text::is_valid_url;

use crate::error::{ApiError, Result};

const ONLY_ONE: &str = "Must provide only one of 'url', 'image' or 'assertion'.";

/// url、image、assertion 三者必须恰好提供一个
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportRequest {
    pub url: Option<String>,
    /// data URI 或裸 base64 编码的 PNG
    pub image: Option<String>,
    pub assertion: Option<Value>,
}

impl ImportRequest {
    pub fn into_source(self) -> Result<ImportSource> {
        let url = self.url.filter(|u| !u.trim().is_empty());
        let image = self.image.filter(|i| !i.trim().is_empty());
        let assertion = self.assertion.filter(|a| !a.is_null());

        let provided = [url.is_some(), image.is_some(), assertion.is_some()]
            .into_iter()
            .filter(|p| *p)
            .count();
        if provided != 1 {
            return Err(ApiError::validation(ONLY_ONE));
        }

        if let Some(url) = url {
            if !is_valid_url(&url) {
                return Err(ApiError::field("url", "Enter a valid URL."));
            }
            return Ok(ImportSource::Url(url));
        }
        if let Some(image) = image {
            return Ok(ImportSource::Image(png::decode_upload(&image)?));
        }
        match assertion {
            Some(assertion) if assertion.is_object() => Ok(ImportSource::Assertion(assertion)),
            _ => Err(ApiError::field("assertion", "Expected a JSON object.")),
        }
    }
}
