//! 接收者身份散列
//!
//! Open Badges 的散列身份格式为 `sha256$<hex>`，其中 hex 为 sha256(identity + salt)。

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// 生成 `sha256$` 前缀的散列串
pub fn generate_sha256_hashstring(identity: &str, salt: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    if let Some(salt) = salt {
        hasher.update(salt.as_bytes());
    }
    format!("sha256${}", hex_encode(&hasher.finalize()))
}

/// 接收者盐值：uuid4 的 32 位十六进制表示
pub fn generate_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 校验外部徽章中的接收者身份是否匹配某个明文标识
///
/// `hashed` 为 false 时做大小写不敏感比较；为 true 时仅支持 sha256 算法。
pub fn identity_matches(identity: &str, hashed: bool, salt: Option<&str>, candidate: &str) -> bool {
    if !hashed {
        return identity.eq_ignore_ascii_case(candidate);
    }

    let Some((algorithm, _)) = identity.split_once('$') else {
        return false;
    };
    if !algorithm.eq_ignore_ascii_case("sha256") {
        return false;
    }

    let lowered = candidate.to_lowercase();
    [candidate, lowered.as_str()]
        .iter()
        .any(|c| generate_sha256_hashstring(c, salt).eq_ignore_ascii_case(identity))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
