//! OAuth scope 匹配
//!
//! 以 `:*` 结尾的有效 scope 匹配同前缀的任意实体 scope，例如
//! `rw:issuer:*` 匹配 `rw:issuer:abc`。

pub const RW_ISSUER: &str = "rw:issuer";
pub const R_BACKPACK: &str = "r:backpack";
pub const RW_BACKPACK: &str = "rw:backpack";
pub const R_ASSERTIONS: &str = "r:assertions";

/// 发行方相关接口接受全局或实体 scope
pub const ISSUER_SCOPES: &[&str] = &[RW_ISSUER, "rw:issuer:*"];
pub const BACKPACK_READ_SCOPES: &[&str] = &[R_BACKPACK, RW_BACKPACK];
pub const BACKPACK_WRITE_SCOPES: &[&str] = &[RW_BACKPACK];

/// 口令模式下未指定 scope 时授予的默认集合
pub const DEFAULT_PASSWORD_SCOPES: &str = "rw:issuer rw:backpack r:assertions";

pub fn scope_matches(granted: &str, valid: &str) -> bool {
    match valid.strip_suffix('*') {
        Some(prefix) => granted.len() > prefix.len() && granted.starts_with(prefix),
        None => granted == valid,
    }
}

pub fn has_scope(granted: &[&str], valid: &[&str]) -> bool {
    granted
        .iter()
        .any(|g| valid.iter().any(|v| scope_matches(g, v)))
}

pub fn has_entity_scope(granted: &[&str], issuer_entity_id: &str) -> bool {
    let entity_scope = format!("{}:{}", RW_ISSUER, issuer_entity_id);
    granted
        .iter()
        .any(|g| *g == RW_ISSUER || *g == entity_scope)
}
