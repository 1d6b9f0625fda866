//! 实体标识生成
//!
//! URL 中使用的不透明标识：随机 UUID 的 16 字节经 URL 安全 Base64（无填充）编码，固定 22 个字符。

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use uuid::Uuid;

pub const ENTITY_ID_LEN: usize = 22;

/// 生成新的实体标识
pub fn generate() -> String {
    URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}

/// 粗略判断字符串是否可能是实体标识，用于在查库前过滤明显非法的输入
pub fn looks_valid(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= 64
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
