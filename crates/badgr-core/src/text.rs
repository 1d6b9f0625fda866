//! 文本清理与格式校验

use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("valid regex")
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(https?|ftp)://[^\s/?#]+(?:[/?#][^\s]*)?$").expect("valid regex")
});

// E.164
static TELEPHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("valid regex"));

/// 去除 HTML 标签并裁剪首尾空白
pub fn strip_tags(value: &str) -> String {
    TAG_RE.replace_all(value, "").trim().to_string()
}

pub fn is_valid_email(value: &str) -> bool {
    value.len() <= 254 && EMAIL_RE.is_match(value)
}

pub fn is_valid_url(value: &str) -> bool {
    URL_RE.is_match(value)
}

pub fn is_valid_telephone(value: &str) -> bool {
    TELEPHONE_RE.is_match(value)
}

/// 查询参数中的布尔值："1"/"true"（大小写不敏感）为真
pub fn is_truthy(value: Option<&str>) -> bool {
    value.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}
