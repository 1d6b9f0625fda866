//! 游标分页
//!
//! 游标是 `o=<offset>` 的 URL 安全 Base64（无填充），对调用方不透明。
//! 查询时多取一条判断是否还有下一页。

use axum::http::Uri;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use badgr_core::repository::PageRequest;

use super::envelope::Pagination;
use crate::error::{ApiError, Result};

const CURSOR_PARAM: &str = "cursor";

pub fn encode_cursor(offset: i64) -> String {
    URL_SAFE_NO_PAD.encode(format!("o={}", offset))
}

pub fn decode_cursor(cursor: &str) -> Option<i64> {
    let bytes = URL_SAFE_NO_PAD.decode(cursor.trim_end_matches('=')).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    text.strip_prefix("o=")?.parse::<i64>().ok().filter(|o| *o >= 0)
}

/// 解析 `num` 查询参数
pub fn parse_num(num: Option<&str>) -> Result<Option<i64>> {
    match num.map(str::trim).filter(|n| !n.is_empty()) {
        None => Ok(None),
        Some(n) => n
            .parse::<i64>()
            .ok()
            .filter(|n| *n > 0)
            .map(Some)
            .ok_or_else(|| ApiError::field("num", "A valid positive integer is required.")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    offset: i64,
    limit: i64,
}

impl Paginator {
    pub fn new(limit: i64, cursor: Option<&str>) -> Result<Self> {
        let offset = match cursor.filter(|c| !c.is_empty()) {
            None => 0,
            Some(c) => decode_cursor(c).ok_or_else(|| ApiError::field(CURSOR_PARAM, "Invalid cursor"))?,
        };
        Ok(Self {
            offset,
            limit: limit.max(1),
        })
    }

    /// 传给仓储的分页参数（多取一条）
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.offset, self.limit).lookahead()
    }

    /// 截掉多取的那一条并生成前后页链接
    pub fn finish<T>(&self, mut items: Vec<T>, origin: &str, uri: &Uri) -> (Vec<T>, Pagination) {
        let limit = usize::try_from(self.limit).unwrap_or(usize::MAX);
        let has_more = items.len() > limit;
        items.truncate(limit);

        let next_results = has_more.then(|| link(origin, uri, Some(self.offset + self.limit)));
        let previous_results = (self.offset > 0).then(|| {
            let previous = self.offset - self.limit;
            link(origin, uri, (previous > 0).then_some(previous))
        });

        (
            items,
            Pagination {
                next_results,
                previous_results,
            },
        )
    }
}

/// 保留原查询参数（除 cursor 外），按需附加新的 cursor
fn link(origin: &str, uri: &Uri, offset: Option<i64>) -> String {
    let mut pairs: Vec<String> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|p| !p.is_empty())
        .filter(|p| p.split('=').next() != Some(CURSOR_PARAM))
        .map(str::to_string)
        .collect();
    if let Some(offset) = offset {
        pairs.push(format!("{}={}", CURSOR_PARAM, encode_cursor(offset)));
    }

    let base = format!("{}{}", origin.trim_end_matches('/'), uri.path());
    if pairs.is_empty() {
        base
    } else {
        format!("{}?{}", base, pairs.join("&"))
    }
}
