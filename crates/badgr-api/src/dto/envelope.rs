//! V2 响应信封
//!
//! 成功响应统一为 `{"status":{"success":true,"description":"ok"},"result":[...]}`，
//! 单个对象也放在长度为 1 的 result 数组中。

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub success: bool,
    pub description: String,
}

/// 游标分页链接，均为绝对地址
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub next_results: Option<String>,
    pub previous_results: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct V2Response<T> {
    pub status: Status,
    pub result: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    /// 变更流返回的服务端时间，作为下一次轮询的 since
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl<T> V2Response<T> {
    pub fn ok(result: Vec<T>) -> Self {
        Self {
            status: Status {
                success: true,
                description: "ok".to_string(),
            },
            result,
            pagination: None,
            timestamp: None,
        }
    }

    pub fn single(item: T) -> Self {
        Self::ok(vec![item])
    }

    pub fn empty() -> Self {
        Self::ok(Vec::new())
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.status.description = description.into();
        self
    }

    pub fn with_pagination(mut self, pagination: Option<Pagination>) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn with_timestamp(mut self, timestamp: String) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let body = serde_json::to_value(V2Response::single(json!({"entityId": "abc"}))).unwrap();
        assert_eq!(
            body,
            json!({
                "status": {"success": true, "description": "ok"},
                "result": [{"entityId": "abc"}]
            })
        );
    }

    #[test]
    fn test_pagination_and_timestamp() {
        let body = serde_json::to_value(
            V2Response::<i32>::empty()
                .with_pagination(Some(Pagination {
                    next_results: Some("https://x/next".into()),
                    previous_results: None,
                }))
                .with_timestamp("2024-01-01T00:00:00Z".into()),
        )
        .unwrap();
        assert_eq!(body["pagination"]["nextResults"], "https://x/next");
        assert_eq!(body["pagination"]["previousResults"], serde_json::Value::Null);
        assert_eq!(body["timestamp"], "2024-01-01T00:00:00Z");
    }
}
