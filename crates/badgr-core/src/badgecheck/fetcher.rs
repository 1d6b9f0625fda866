//! 基于 reqwest 的文档获取

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_LENGTH};
use serde_json::Value;
use tracing::{debug, instrument};

use super::DocumentFetcher;
use crate::error::{CoreError, Result};

pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("创建 HTTP 客户端失败: {e}")))?;
        Ok(Self { client, max_bytes })
    }

    fn unreachable(url: &str) -> CoreError {
        CoreError::BadgeCheck(vec![format!("Unable to fetch {}", url)])
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "application/ld+json, application/json")
            .send()
            .await
            .map_err(|e| {
                debug!(url = %url, error = %e, "获取远程文档失败");
                Self::unreachable(url)
            })?;

        if !resp.status().is_success() {
            debug!(url = %url, status = %resp.status(), "远程文档返回非成功状态");
            return Err(Self::unreachable(url));
        }

        let declared = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_bytes) {
            return Err(CoreError::BadgeCheck(vec![format!(
                "Document at {} is too large",
                url
            )]));
        }

        let bytes = resp.bytes().await.map_err(|_| Self::unreachable(url))?;
        // Content-Length 缺失时按实际大小再检查一次
        if bytes.len() > self.max_bytes {
            return Err(CoreError::BadgeCheck(vec![format!(
                "Document at {} is too large",
                url
            )]));
        }

        serde_json::from_slice(&bytes)
            .map_err(|_| CoreError::BadgeCheck(vec![format!("Document at {} is not valid JSON", url)]))
    }
}
