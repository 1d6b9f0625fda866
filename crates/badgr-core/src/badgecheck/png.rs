//! 烘焙 PNG 的元数据提取
//!
//! Open Badges 2.0 把 assertion 写在 keyword 为 `openbadges` 的 iTXt 块中，
//! 1.x 时代的徽章使用 tEXt 块，两者都支持。不校验 CRC。

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{CoreError, Result};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
const KEYWORD: &[u8] = b"openbadges";

fn invalid_image() -> CoreError {
    CoreError::BadgeCheck(vec!["Invalid image upload".to_string()])
}

/// 解码上传的图片：支持 data URI 与裸 base64
pub fn decode_upload(value: &str) -> Result<Vec<u8>> {
    let payload = match value.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => value,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(|_| invalid_image())
}

/// 提取 `openbadges` 元数据文本，未找到时返回 None
pub fn extract_openbadges(png: &[u8]) -> Result<Option<String>> {
    if png.len() < PNG_SIGNATURE.len() || png[..8] != PNG_SIGNATURE {
        return Err(invalid_image());
    }

    let mut pos = PNG_SIGNATURE.len();
    while pos + 8 <= png.len() {
        let len = u32::from_be_bytes([png[pos], png[pos + 1], png[pos + 2], png[pos + 3]]) as usize;
        let kind = &png[pos + 4..pos + 8];
        let data_start = pos + 8;
        let data_end = data_start.checked_add(len).ok_or_else(invalid_image)?;
        // 数据之后还有 4 字节 CRC
        if data_end + 4 > png.len() {
            return Err(invalid_image());
        }
        let data = &png[data_start..data_end];

        match kind {
            b"iTXt" => {
                if let Some(text) = parse_itxt(data)? {
                    return Ok(Some(text));
                }
            }
            b"tEXt" => {
                if let Some(text) = parse_text(data) {
                    return Ok(Some(text));
                }
            }
            b"IEND" => break,
            _ => {}
        }
        pos = data_end + 4;
    }
    Ok(None)
}

/// keyword \0 flag method language \0 translated \0 text
fn parse_itxt(data: &[u8]) -> Result<Option<String>> {
    let Some((keyword, rest)) = split_nul(data) else {
        return Ok(None);
    };
    if keyword != KEYWORD {
        return Ok(None);
    }
    if rest.len() < 2 {
        return Err(invalid_image());
    }
    if rest[0] != 0 {
        return Err(CoreError::BadgeCheck(vec![
            "Compressed openbadges metadata is not supported".to_string(),
        ]));
    }
    let rest = &rest[2..];
    let (_, rest) = split_nul(rest).ok_or_else(invalid_image)?;
    let (_, text) = split_nul(rest).ok_or_else(invalid_image)?;

    String::from_utf8(text.to_vec())
        .map(Some)
        .map_err(|_| invalid_image())
}

fn parse_text(data: &[u8]) -> Option<String> {
    let (keyword, text) = split_nul(data)?;
    (keyword == KEYWORD).then(|| String::from_utf8_lossy(text).into_owned())
}

fn split_nul(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let idx = data.iter().position(|b| *b == 0)?;
    Some((&data[..idx], &data[idx + 1..]))
}


#[cfg(test)]
mod tests {
    use super::fixtures::{baked_png, plain_png};
    use super::*;

    #[test]
    fn test_extract_itxt_payload() {
        let png = baked_png(r#"{"id":"https://example.org/a/1"}"#);
        assert_eq!(
            extract_openbadges(&png).unwrap().as_deref(),
            Some(r#"{"id":"https://example.org/a/1"}"#)
        );
    }

    #[test]
    fn test_png_without_metadata() {
        assert_eq!(extract_openbadges(&plain_png()).unwrap(), None);
    }

    #[test]
    fn test_rejects_non_png() {
        assert!(matches!(
            extract_openbadges(b"GIF89a..."),
            Err(CoreError::BadgeCheck(_))
        ));
    }

    #[test]
    fn test_decode_data_uri_and_raw_base64() {
        let png = baked_png("https://example.org/a/1");
        let raw = STANDARD.encode(&png);
        assert_eq!(decode_upload(&raw).unwrap(), png);
        assert_eq!(
            decode_upload(&format!("data:image/png;base64,{}", raw)).unwrap(),
            png
        );
        assert!(decode_upload("not base64 !!").is_err());
    }
}
