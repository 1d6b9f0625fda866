//! 外部徽章导入校验
//!
//! 从 URL、烘焙 PNG 或内联 JSON 取得 Open Badges 2.0 assertion，
//! 解析徽章定义与发行方文档，校验接收者身份，然后按 source_url
//! 在本地 get-or-create 对应的发行方、徽章定义与徽章实例。

mod checker;
mod fetcher;
pub mod png;

pub use checker::BadgeCheckService;
pub use fetcher::HttpFetcher;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{BadgeInstance, UserAccount};

/// 导入来源，三选一
#[derive(Debug, Clone)]
pub enum ImportSource {
    Url(String),
    /// 已解码的 PNG 字节
    Image(Vec<u8>),
    Assertion(Value),
}

impl ImportSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Url(_) => "url",
            Self::Image(_) => "image",
            Self::Assertion(_) => "assertion",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub instance: BadgeInstance,
    /// false 表示本地已存在同一 source_url 的实例
    pub created: bool,
}

/// 导入校验接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BadgeCheck: Send + Sync {
    async fn get_or_create_assertion(
        &self,
        source: ImportSource,
        account: &UserAccount,
    ) -> Result<ImportOutcome>;
}

/// 远程 JSON 文档获取接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<Value>;
}
