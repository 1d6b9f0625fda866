//! 查询参数与时间解析

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use badgr_core::text::is_truthy;

use crate::error::{ApiError, Result};

pub const DATETIME_FORMAT_ERROR: &str = "Datetime has wrong format. Use one of these formats instead: YYYY-MM-DDThh:mm[:ss[.uuuuuu]][+HH:MM|-HH:MM|Z].";
pub const SINCE_FORMAT_ERROR: &str = "must be ISO-8601 format with time zone";

/// 列表接口的查询参数；`recipient` 与 `expand` 可重复出现
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub recipient: Vec<String>,
    pub num: Option<String>,
    pub cursor: Option<String>,
    pub include_expired: Option<String>,
    pub include_revoked: Option<String>,
    #[serde(default)]
    pub expand: Vec<String>,
    #[serde(default)]
    pub expands: Vec<String>,
}

impl ListQuery {
    pub fn include_expired(&self) -> bool {
        is_truthy(self.include_expired.as_deref())
    }

    pub fn include_revoked(&self) -> bool {
        is_truthy(self.include_revoked.as_deref())
    }

    pub fn expands(&self) -> Expands {
        Expands::parse(self.expand.iter().chain(self.expands.iter()).map(String::as_str))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangedSinceQuery {
    pub since: Option<String>,
    pub num: Option<String>,
    pub cursor: Option<String>,
}

/// 背包表示中需要内联的关联对象
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expands {
    pub badgeclass: bool,
    pub issuer: bool,
}

impl Expands {
    /// 每个值可以是逗号分隔的列表
    pub fn parse<'a>(values: impl Iterator<Item = &'a str>) -> Self {
        let mut expands = Self::default();
        for name in values.flat_map(|v| v.split(',')).map(str::trim) {
            match name {
                "badgeclass" => expands.badgeclass = true,
                "issuer" => expands.issuer = true,
                _ => {}
            }
        }
        expands
    }
}

/// 解析变更流的 since：必须带时区；查询串中未编码的 `+` 会变成空格，这里还原
pub fn parse_since(raw: &str) -> Result<DateTime<Utc>> {
    let value = raw.trim().replace(' ', "+");
    DateTime::parse_from_rfc3339(&value)
        .or_else(|_| DateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .or_else(|_| DateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ApiError::field("since", SINCE_FORMAT_ERROR))
}

/// 解析请求体中的时间字段；未带时区时按 UTC 处理
pub fn parse_datetime(value: &str) -> std::result::Result<DateTime<Utc>, &'static str> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(DATETIME_FORMAT_ERROR)
}
